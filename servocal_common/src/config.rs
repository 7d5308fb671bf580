#[cfg(feature = "std")]
use serde::{Deserialize, Serialize};
use static_assertions::const_assert;

use crate::error::ConfigError;

// Bench defaults for a 270 degree, 500-2500 us servo read by an AS5600.
pub const DEFAULT_MIN_PULSE_US: u16 = 500;
pub const DEFAULT_MAX_PULSE_US: u16 = 2500;
pub const DEFAULT_MAX_ANGLE_DEG: f32 = 270.0;
pub const DEFAULT_SPEED_DEG_PER_S: f32 = 45.0;
pub const DEFAULT_SENSOR_RESOLUTION: u16 = 4096;
pub const DEFAULT_SENSOR_LATENCY_US: u32 = 2200;
pub const DEFAULT_COARSE_STEP_US: u16 = 10;
pub const DEFAULT_FINE_STEP_US: u16 = 1;
pub const DEFAULT_BACKOFF_STEPS: u16 = 2;
/// How far past the nominal maximum the high-end sweep may go before the
/// endpoint is declared unresolved.
pub const DEFAULT_HIGH_OVERRUN_US: u16 = 1000;
pub const DEFAULT_RUN_TIMEOUT_MS: u64 = 15 * 60 * 1000;
/// Largest error-map step. Encoder readings are unwrapped assuming less than
/// half a turn between samples; this leaves room for a servo gain of 2.
pub const MAX_MAP_STEP_DEG: u16 = 90;

const_assert!(DEFAULT_MIN_PULSE_US < DEFAULT_MAX_PULSE_US);
const_assert!(DEFAULT_FINE_STEP_US <= DEFAULT_COARSE_STEP_US);

/// Nominal (datasheet) behaviour of the servo under test.
#[cfg_attr(feature = "no_std", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "std", serde(default))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ServoSpec {
    pub min_pulse_us: u16,
    pub max_pulse_us: u16,
    pub max_angle_deg: f32,
    /// Rated angular speed, degrees per second.
    pub speed_deg_per_s: f32,
}

impl Default for ServoSpec {
    fn default() -> Self {
        Self {
            min_pulse_us: DEFAULT_MIN_PULSE_US,
            max_pulse_us: DEFAULT_MAX_PULSE_US,
            max_angle_deg: DEFAULT_MAX_ANGLE_DEG,
            speed_deg_per_s: DEFAULT_SPEED_DEG_PER_S,
        }
    }
}

impl ServoSpec {
    pub fn mid_pulse_us(&self) -> u16 {
        ((self.max_pulse_us as u32 + self.min_pulse_us as u32) / 2) as u16
    }

    pub fn degrees_per_us(&self) -> f32 {
        self.max_angle_deg / (self.max_pulse_us - self.min_pulse_us) as f32
    }

    /// Nominal forward kinematics: commanded angle to pulse width.
    ///
    /// Angles outside `0..=max_angle_deg` are clamped.
    pub fn pulse_for_angle(&self, angle_deg: f32) -> u16 {
        let angle = angle_deg.clamp(0.0, self.max_angle_deg);
        let scaled = angle / self.max_angle_deg;
        let pulse_range = (self.max_pulse_us - self.min_pulse_us) as f32;
        let pulse = libm::roundf(pulse_range * scaled) + self.min_pulse_us as f32;
        pulse as u16
    }

    /// Time the horn needs to cover `delta_us` of pulse width at rated speed.
    pub fn travel_ms(&self, delta_us: u32) -> u32 {
        let degrees = delta_us as f32 * self.degrees_per_us();
        ceil_ms(degrees / self.speed_deg_per_s * 1000.0)
    }
}

/// The absolute encoder reading the output shaft.
#[cfg_attr(feature = "no_std", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "std", serde(default))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorSpec {
    /// Steps per revolution.
    pub resolution: u16,
    /// Time from a physical change to it showing up in a reading.
    pub latency_us: u32,
}

impl Default for SensorSpec {
    fn default() -> Self {
        Self {
            resolution: DEFAULT_SENSOR_RESOLUTION,
            latency_us: DEFAULT_SENSOR_LATENCY_US,
        }
    }
}

impl SensorSpec {
    pub fn latency_ms(&self) -> u32 {
        self.latency_us.div_ceil(1000)
    }

    pub fn degrees_per_step(&self) -> f32 {
        360.0 / self.resolution as f32
    }
}

#[cfg_attr(feature = "no_std", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "std", serde(default))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EndpointConfig {
    pub coarse_step_us: u16,
    pub fine_step_us: u16,
    pub coarse_settle_ms: u32,
    pub fine_settle_ms: u32,
    /// Steps retreated after a stall, both before the fine pass and when
    /// recording the endpoint.
    pub backoff_steps: u16,
    pub high_overrun_us: u16,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            coarse_step_us: DEFAULT_COARSE_STEP_US,
            fine_step_us: DEFAULT_FINE_STEP_US,
            // 10 us at 45 deg/s is 30 ms of travel, plus 2.2 ms sensor latency
            coarse_settle_ms: 40,
            fine_settle_ms: 8,
            backoff_steps: DEFAULT_BACKOFF_STEPS,
            high_overrun_us: DEFAULT_HIGH_OVERRUN_US,
        }
    }
}

#[cfg_attr(feature = "no_std", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "std", serde(default))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ErrorMapConfig {
    /// Commanded-angle increment between samples.
    pub step_deg: f32,
    pub settle_ms: u32,
}

impl Default for ErrorMapConfig {
    fn default() -> Self {
        Self {
            step_deg: 1.0,
            settle_ms: 30,
        }
    }
}

#[cfg_attr(feature = "no_std", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "std", serde(default))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationConfig {
    pub servo: ServoSpec,
    pub sensor: SensorSpec,
    pub endpoint: EndpointConfig,
    pub error_map: ErrorMapConfig,
    /// Upper bound on the summed settle time of a whole run. Zero disables it.
    pub run_timeout_ms: u64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            servo: ServoSpec::default(),
            sensor: SensorSpec::default(),
            endpoint: EndpointConfig::default(),
            error_map: ErrorMapConfig::default(),
            run_timeout_ms: DEFAULT_RUN_TIMEOUT_MS,
        }
    }
}

impl CalibrationConfig {
    /// Exclusive bound of the high-end sweep.
    pub fn high_bound_us(&self) -> u16 {
        self.servo
            .max_pulse_us
            .saturating_add(self.endpoint.high_overrun_us)
    }

    /// Check the configuration against itself and against the resolution of
    /// the actuator that will execute it.
    pub fn validate(&self, actuator_resolution_us: u16) -> Result<(), ConfigError> {
        let servo = &self.servo;
        let ep = &self.endpoint;

        if servo.min_pulse_us >= servo.max_pulse_us {
            return Err(ConfigError::PulseRange {
                min_us: servo.min_pulse_us,
                max_us: servo.max_pulse_us,
            });
        }
        if !(servo.max_angle_deg > 0.0) {
            return Err(ConfigError::MaxAngle);
        }
        if !(servo.speed_deg_per_s > 0.0) {
            return Err(ConfigError::Speed);
        }
        if self.sensor.resolution < 2 {
            return Err(ConfigError::SensorResolution);
        }
        if ep.coarse_step_us == 0 || ep.fine_step_us == 0 || ep.fine_step_us > ep.coarse_step_us {
            return Err(ConfigError::StepSize);
        }
        if !(self.error_map.step_deg > 0.0 && self.error_map.step_deg <= MAX_MAP_STEP_DEG as f32) {
            return Err(ConfigError::MapStep {
                max_deg: MAX_MAP_STEP_DEG,
            });
        }
        if ep.fine_step_us < actuator_resolution_us {
            return Err(ConfigError::StepBelowResolution {
                step_us: ep.fine_step_us,
                resolution_us: actuator_resolution_us,
            });
        }
        // the high sweep starts at the midpoint and must be able to take at
        // least one coarse step past the nominal maximum
        if ep.high_overrun_us < ep.coarse_step_us
            || servo.max_pulse_us.checked_add(ep.high_overrun_us).is_none()
        {
            return Err(ConfigError::Overrun);
        }
        // the fine pass starts this far back from the coarse stall, toward
        // the midpoint
        let backoff_us = ep.backoff_steps as u32 * ep.coarse_step_us as u32;
        if ep.backoff_steps == 0 || backoff_us >= servo.mid_pulse_us() as u32 {
            return Err(ConfigError::Backoff {
                steps: ep.backoff_steps,
            });
        }

        let coarse_required =
            self.required_settle_ms(ep.coarse_step_us as f32 * servo.degrees_per_us());
        if ep.coarse_settle_ms < coarse_required {
            return Err(ConfigError::SettleTooShort {
                settle_ms: ep.coarse_settle_ms,
                required_ms: coarse_required,
            });
        }
        let fine_required =
            self.required_settle_ms(ep.fine_step_us as f32 * servo.degrees_per_us());
        if ep.fine_settle_ms < fine_required {
            return Err(ConfigError::SettleTooShort {
                settle_ms: ep.fine_settle_ms,
                required_ms: fine_required,
            });
        }
        let map_required = self.required_settle_ms(self.error_map.step_deg);
        if self.error_map.settle_ms < map_required {
            return Err(ConfigError::SettleTooShort {
                settle_ms: self.error_map.settle_ms,
                required_ms: map_required,
            });
        }

        Ok(())
    }

    /// Defaults retuned for a PCA9685 at 50 Hz, whose 12-bit counts are about
    /// 4.9 us apart: 5 us fine steps with a settle long enough for them.
    pub fn pca9685_bench() -> Self {
        let mut config = Self::default();
        config.endpoint.fine_step_us = 5;
        config.endpoint.fine_settle_ms = 20;
        config
    }

    /// Minimum wait after a move of `degrees`: transit at rated speed plus
    /// sensor latency.
    pub fn required_settle_ms(&self, degrees: f32) -> u32 {
        let transit_ms = ceil_ms(degrees / self.servo.speed_deg_per_s * 1000.0);
        transit_ms.saturating_add(self.sensor.latency_ms())
    }
}

// f32 noise below a microsecond must not push a whole millisecond on top
fn ceil_ms(ms: f32) -> u32 {
    libm::ceilf(ms - 1e-3).max(0.0) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn defaults_are_valid() {
        let cfg = CalibrationConfig::default();
        assert_eq!(cfg.validate(1), Ok(()));
        assert_eq!(cfg.servo.mid_pulse_us(), 1500);
        assert_eq!(cfg.high_bound_us(), 3500);
    }

    #[test]
    fn pca9685_profile_fits_its_resolution() {
        assert!(CalibrationConfig::default().validate(5).is_err());
        assert_eq!(CalibrationConfig::pca9685_bench().validate(5), Ok(()));
    }

    #[test]
    fn forward_kinematics_spans_nominal_range() {
        let servo = ServoSpec::default();
        assert_eq!(servo.pulse_for_angle(0.0), 500);
        assert_eq!(servo.pulse_for_angle(135.0), 1500);
        assert_eq!(servo.pulse_for_angle(270.0), 2500);
        assert_eq!(servo.pulse_for_angle(400.0), 2500);
        assert_eq!(servo.pulse_for_angle(-5.0), 500);
        assert_relative_eq!(servo.degrees_per_us(), 0.135);
    }

    #[test]
    fn travel_time_follows_rated_speed() {
        let servo = ServoSpec::default();
        // 1000 us = 135 deg, 3 s at 45 deg/s
        assert_eq!(servo.travel_ms(1000), 3000);
        assert_eq!(servo.travel_ms(0), 0);
    }

    #[test]
    fn rejects_inverted_pulse_range() {
        let mut cfg = CalibrationConfig::default();
        cfg.servo.min_pulse_us = 2500;
        cfg.servo.max_pulse_us = 500;
        assert_eq!(
            cfg.validate(1),
            Err(ConfigError::PulseRange {
                min_us: 2500,
                max_us: 500
            })
        );
    }

    #[test]
    fn rejects_zero_steps() {
        let mut cfg = CalibrationConfig::default();
        cfg.endpoint.fine_step_us = 0;
        assert_eq!(cfg.validate(1), Err(ConfigError::StepSize));

        let mut cfg = CalibrationConfig::default();
        cfg.error_map.step_deg = 0.0;
        assert_eq!(cfg.validate(1), Err(ConfigError::MapStep { max_deg: 90 }));
    }

    #[test]
    fn map_step_must_stay_well_inside_half_a_turn() {
        let mut cfg = CalibrationConfig::default();
        cfg.error_map.step_deg = 200.0;
        cfg.error_map.settle_ms = 5000;
        assert_eq!(cfg.validate(1), Err(ConfigError::MapStep { max_deg: 90 }));

        cfg.error_map.step_deg = 90.0;
        assert_eq!(cfg.validate(1), Ok(()));
    }

    #[test]
    fn backoff_needs_at_least_one_step() {
        let mut cfg = CalibrationConfig::default();
        cfg.endpoint.backoff_steps = 0;
        assert_eq!(cfg.validate(1), Err(ConfigError::Backoff { steps: 0 }));

        cfg.endpoint.backoff_steps = 1;
        assert_eq!(cfg.validate(1), Ok(()));
    }

    #[test]
    fn backoff_cannot_reach_the_midpoint() {
        let mut cfg = CalibrationConfig::default();
        // 7000 coarse steps of 10 us would overflow u16
        cfg.endpoint.backoff_steps = 7000;
        assert_eq!(cfg.validate(1), Err(ConfigError::Backoff { steps: 7000 }));

        // 150 * 10 us is exactly the 1500 us midpoint
        cfg.endpoint.backoff_steps = 150;
        assert_eq!(cfg.validate(1), Err(ConfigError::Backoff { steps: 150 }));
        cfg.endpoint.backoff_steps = 149;
        assert_eq!(cfg.validate(1), Ok(()));
    }

    #[test]
    fn vanishing_speed_is_rejected_not_overflowed() {
        let mut cfg = CalibrationConfig::default();
        cfg.servo.speed_deg_per_s = 1e-9;
        assert_eq!(cfg.required_settle_ms(1.0), u32::MAX);
        assert_eq!(
            cfg.validate(1),
            Err(ConfigError::SettleTooShort {
                settle_ms: 40,
                required_ms: u32::MAX
            })
        );
    }

    #[test]
    fn rejects_overrun_past_u16() {
        let mut cfg = CalibrationConfig::default();
        cfg.endpoint.high_overrun_us = u16::MAX;
        assert_eq!(cfg.validate(1), Err(ConfigError::Overrun));
    }

    #[test]
    fn rejects_fine_step_below_actuator_resolution() {
        let cfg = CalibrationConfig::default();
        assert_eq!(
            cfg.validate(5),
            Err(ConfigError::StepBelowResolution {
                step_us: 1,
                resolution_us: 5
            })
        );
    }

    #[test]
    fn rejects_settle_shorter_than_transit() {
        let mut cfg = CalibrationConfig::default();
        cfg.endpoint.coarse_settle_ms = 10;
        assert_eq!(
            cfg.validate(1),
            Err(ConfigError::SettleTooShort {
                settle_ms: 10,
                required_ms: 33
            })
        );
    }
}
