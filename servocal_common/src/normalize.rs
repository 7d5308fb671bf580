#[cfg_attr(feature = "no_std", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PwmCorrection {
    pub offset_us: f32,
    pub multiplier: f32,
}

/// Linear correction from nominal to measured pulse-width space.
///
/// The offset is the shift between the measured and nominal midpoints; the
/// multiplier scales the shifted nominal maximum onto the measured maximum.
pub fn normalize(
    measured_min_us: f32,
    measured_max_us: f32,
    nominal_min_us: f32,
    nominal_max_us: f32,
) -> PwmCorrection {
    let measured_mid = (measured_max_us + measured_min_us) / 2.0;
    let nominal_mid = (nominal_max_us + nominal_min_us) / 2.0;
    let offset_us = measured_mid - nominal_mid;
    let multiplier = measured_max_us / (nominal_max_us + offset_us);

    PwmCorrection {
        offset_us,
        multiplier,
    }
}
