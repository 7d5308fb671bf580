use core::fmt::Display;

#[cfg(feature = "std")]
use serde::Serialize;
use thiserror::Error;

/// Configuration rejected before any hardware is touched.
#[cfg_attr(feature = "no_std", derive(defmt::Format))]
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("nominal pulse range {min_us}..{max_us} us is empty")]
    PulseRange { min_us: u16, max_us: u16 },

    #[error("maximum angle must be positive")]
    MaxAngle,

    #[error("rated speed must be positive")]
    Speed,

    #[error("sensor resolution must be at least 2 steps")]
    SensorResolution,

    #[error("step sizes must be positive and the fine step no larger than the coarse step")]
    StepSize,

    #[error("fine step {step_us} us is below the actuator resolution of {resolution_us} us")]
    StepBelowResolution { step_us: u16, resolution_us: u16 },

    #[error("high overrun must cover one coarse step and stay inside u16")]
    Overrun,

    #[error("backoff of {steps} steps must be at least one step and stay short of the midpoint")]
    Backoff { steps: u16 },

    #[error("error-map step must be positive and below {max_deg} deg")]
    MapStep { max_deg: u16 },

    #[error("settle delay {settle_ms} ms is shorter than the {required_ms} ms transit + latency")]
    SettleTooShort { settle_ms: u32, required_ms: u32 },
}

/// Why a calibration step could not complete.
#[cfg_attr(feature = "no_std", derive(defmt::Format))]
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalError {
    #[error("no stall detected before the {bound_us} us bound")]
    EndpointNotFound { bound_us: u16 },

    #[error("servo did not move when stepped to {pulse_us} us")]
    NoMotion { pulse_us: u16 },

    #[error("angle sensor read failed")]
    SensorReadFailure,

    #[error("actuator write failed")]
    ActuatorWriteFailure,

    #[error("not enough distinct samples for a linear fit")]
    DegenerateFit,

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(#[from] ConfigError),

    #[error("measured minimum is not below measured maximum")]
    InconsistentEndpoints,

    #[error("cancelled")]
    Cancelled,

    #[error("run exceeded its time budget after {elapsed_ms} ms")]
    Timeout { elapsed_ms: u64 },
}

/// Stage of a calibration run.
#[cfg_attr(feature = "no_std", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Serialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    ConfigurationCheck,
    LowEndpoint,
    SensorZero,
    HighEndpoint,
    PulseNormalization,
    ErrorMapping,
}

impl Display for Phase {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let phase = match self {
            Phase::ConfigurationCheck => "configuration check",
            Phase::LowEndpoint => "low-endpoint sweep",
            Phase::SensorZero => "sensor zeroing",
            Phase::HighEndpoint => "high-endpoint sweep",
            Phase::PulseNormalization => "pulse normalization",
            Phase::ErrorMapping => "error-mapping sweep",
        };
        write!(f, "{}", phase)
    }
}

/// Whatever a run had measured when it stopped.
#[cfg_attr(feature = "no_std", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Serialize))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PartialCalibration {
    pub measured_min_pulse_us: Option<u16>,
    pub measured_max_pulse_us: Option<u16>,
    pub pwm_offset_us: Option<f32>,
    pub pwm_multiplier: Option<f32>,
    pub samples: u32,
    pub last_pulse_us: Option<u16>,
    pub elapsed_ms: u64,
}

#[cfg_attr(feature = "no_std", derive(defmt::Format))]
#[derive(Error, Debug, Clone, Copy, PartialEq)]
#[error("{phase} failed: {error}")]
pub struct CalibrationFailure {
    pub phase: Phase,
    pub error: CalError,
    pub partial: PartialCalibration,
}
