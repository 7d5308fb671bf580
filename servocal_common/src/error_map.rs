use embedded_hal::delay::DelayNs;

use crate::config::CalibrationConfig;
use crate::error::CalError;
use crate::fit::LinearFit;
use crate::observer::{CalibrationObserver, Sample};
use crate::rig::Rig;
use crate::{Actuator, AngleSensor};

/// Commanded-to-true angle model, `true = multiplier * commanded + offset`.
#[cfg_attr(feature = "no_std", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ErrorModel {
    pub offset_deg: f32,
    pub multiplier: f32,
    pub samples: u32,
}

/// Turns wrapping encoder steps into a continuous signed count relative to
/// the zero reference. Consecutive readings are assumed less than half a
/// turn apart.
#[derive(Debug, Clone, Copy)]
pub struct Unwrapper {
    resolution: i32,
    last_raw: Option<u16>,
    total: i32,
}

impl Unwrapper {
    pub fn new(resolution: u16) -> Self {
        Self {
            resolution: resolution as i32,
            last_raw: None,
            total: 0,
        }
    }

    pub fn push(&mut self, raw: u16) -> i32 {
        let delta = match self.last_raw {
            Some(last) => raw as i32 - last as i32,
            // first reading: nearest representation to the zero reference
            None => raw as i32,
        };
        let mut delta = delta.rem_euclid(self.resolution);
        if delta > self.resolution / 2 {
            delta -= self.resolution;
        }
        self.last_raw = Some(raw);
        self.total += delta;
        self.total
    }
}

/// Sweep the nominal working range from 0 to the maximum angle and fit
/// true angle against commanded angle.
///
/// Assumes the sensor was zeroed at the low endpoint.
pub fn map_error<A, S, D, O>(
    rig: &mut Rig<'_, A, S, D, O>,
    config: &CalibrationConfig,
) -> Result<ErrorModel, CalError>
where
    A: Actuator,
    S: AngleSensor,
    D: DelayNs,
    O: CalibrationObserver,
{
    let servo = config.servo;
    let step_deg = config.error_map.step_deg;
    let degrees_per_step = config.sensor.degrees_per_step();

    let mut fit = LinearFit::new();
    let mut unwrapper = Unwrapper::new(config.sensor.resolution);
    let mut index = 0u32;

    loop {
        let commanded_deg = (index as f32 * step_deg).min(servo.max_angle_deg);
        let pulse_us = servo.pulse_for_angle(commanded_deg);

        if index == 0 {
            rig.move_to(pulse_us)?;
        } else {
            rig.command(pulse_us)?;
            rig.settle(config.error_map.settle_ms)?;
        }
        let raw_step = rig.read()?;
        let true_deg = unwrapper.push(raw_step) as f32 * degrees_per_step;

        let sample = Sample {
            commanded_deg,
            pulse_us,
            raw_step,
            true_deg,
        };
        trace!("{} deg ({} us) -> {} deg", commanded_deg, pulse_us, true_deg);
        rig.record_sample(&sample);
        fit.push(commanded_deg, true_deg);

        if commanded_deg >= servo.max_angle_deg {
            break;
        }
        index += 1;
    }

    let line = fit.solve()?;
    info!(
        "error model: true = {} * commanded + {} ({} samples)",
        line.multiplier,
        line.offset,
        fit.len()
    );

    Ok(ErrorModel {
        offset_deg: line.offset,
        multiplier: line.multiplier,
        samples: fit.len(),
    })
}
