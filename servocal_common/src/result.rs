#[cfg(feature = "std")]
use serde::Serialize;

use crate::error_map::ErrorModel;
use crate::normalize::PwmCorrection;

/// Outcome of a successful calibration run.
///
/// Built once every phase has succeeded and never modified afterwards.
#[cfg_attr(feature = "no_std", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Serialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationResult {
    measured_min_pulse_us: f32,
    measured_max_pulse_us: f32,
    pwm_offset_us: f32,
    pwm_multiplier: f32,
    dc_offset_deg: f32,
    dc_multiplier: f32,
}

impl CalibrationResult {
    pub(crate) fn new(
        measured_min_pulse_us: u16,
        measured_max_pulse_us: u16,
        pwm: PwmCorrection,
        error: ErrorModel,
    ) -> Self {
        Self {
            measured_min_pulse_us: measured_min_pulse_us as f32,
            measured_max_pulse_us: measured_max_pulse_us as f32,
            pwm_offset_us: pwm.offset_us,
            pwm_multiplier: pwm.multiplier,
            dc_offset_deg: error.offset_deg,
            dc_multiplier: error.multiplier,
        }
    }

    pub fn measured_min_pulse_us(&self) -> f32 {
        self.measured_min_pulse_us
    }

    pub fn measured_max_pulse_us(&self) -> f32 {
        self.measured_max_pulse_us
    }

    pub fn pwm_offset_us(&self) -> f32 {
        self.pwm_offset_us
    }

    pub fn pwm_multiplier(&self) -> f32 {
        self.pwm_multiplier
    }

    pub fn dc_offset_deg(&self) -> f32 {
        self.dc_offset_deg
    }

    pub fn dc_multiplier(&self) -> f32 {
        self.dc_multiplier
    }

    /// Map a nominal pulse width into the measured pulse-width space.
    pub fn corrected_pulse_us(&self, nominal_pulse_us: f32) -> f32 {
        (nominal_pulse_us + self.pwm_offset_us) * self.pwm_multiplier
    }

    /// Commanded angle expected to put the horn at `true_deg`, inverting the
    /// error model.
    pub fn commanded_angle_for(&self, true_deg: f32) -> f32 {
        (true_deg - self.dc_offset_deg) / self.dc_multiplier
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize;
    use approx::assert_relative_eq;

    fn bench() -> CalibrationResult {
        CalibrationResult::new(
            520,
            2470,
            normalize(520.0, 2470.0, 500.0, 2500.0),
            ErrorModel {
                offset_deg: 5.0,
                multiplier: 2.0,
                samples: 271,
            },
        )
    }

    #[test]
    fn nominal_max_maps_to_measured_max() {
        let result = bench();
        assert_relative_eq!(result.corrected_pulse_us(2500.0), 2470.0, epsilon = 1e-3);
    }

    #[test]
    fn inverse_error_model() {
        let result = bench();
        assert_relative_eq!(result.commanded_angle_for(5.0), 0.0);
        assert_relative_eq!(result.commanded_angle_for(205.0), 100.0);
    }

    #[test]
    fn serializes_every_field() {
        let json = serde_json::to_value(bench()).unwrap();
        assert_eq!(json["measured_min_pulse_us"], 520.0);
        assert_eq!(json["measured_max_pulse_us"], 2470.0);
        assert_eq!(json["pwm_offset_us"], -5.0);
        assert_eq!(json["dc_multiplier"], 2.0);
    }
}
