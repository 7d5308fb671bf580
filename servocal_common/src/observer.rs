#[cfg(feature = "std")]
use serde::Serialize;

use crate::error::Phase;

/// One point of the error-mapping sweep.
#[cfg_attr(feature = "no_std", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Serialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub commanded_deg: f32,
    pub pulse_us: u16,
    pub raw_step: u16,
    pub true_deg: f32,
}

/// Hooks into a running calibration.
///
/// All methods have no-op defaults. `should_abort` is polled before every
/// actuator command and is the only way to stop a run early.
pub trait CalibrationObserver {
    fn phase(&mut self, _phase: Phase) {}

    fn sample(&mut self, _sample: &Sample) {}

    fn should_abort(&mut self) -> bool {
        false
    }
}

pub struct NoopObserver;

impl CalibrationObserver for NoopObserver {}
