use embedded_hal::delay::DelayNs;

use crate::error::CalError;
use crate::observer::CalibrationObserver;
use crate::rig::Rig;
use crate::{Actuator, AngleSensor};

#[cfg_attr(feature = "no_std", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepParams {
    pub start_us: u16,
    /// Signed: negative sweeps toward shorter pulses.
    pub step_us: i32,
    pub settle_ms: u32,
    /// Never commanded. Reaching it means no stall was found.
    pub bound_us: u16,
}

#[cfg_attr(feature = "no_std", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stall {
    /// Pulse width whose reading matched the one before it.
    pub pulse_us: u16,
    /// Steps commanded after the start position.
    pub steps: u32,
}

/// Step from `start_us` until two consecutive readings are equal.
///
/// The rig is first moved to `start_us` and given its full travel time, so
/// the baseline reading is taken at rest.
pub fn sweep_until_stall<A, S, D, O>(
    rig: &mut Rig<'_, A, S, D, O>,
    params: SweepParams,
) -> Result<Stall, CalError>
where
    A: Actuator,
    S: AngleSensor,
    D: DelayNs,
    O: CalibrationObserver,
{
    debug_assert!(params.step_us != 0);

    rig.move_to(params.start_us)?;
    let mut last = rig.read()?;

    let bound = params.bound_us as i32;
    let mut pulse = params.start_us as i32;
    let mut steps = 0u32;

    loop {
        pulse += params.step_us;
        let at_bound = if params.step_us > 0 {
            pulse >= bound
        } else {
            pulse <= bound
        };
        if at_bound {
            warn!(
                "no stall between {} us and the {} us bound",
                params.start_us, params.bound_us
            );
            return Err(CalError::EndpointNotFound {
                bound_us: params.bound_us,
            });
        }

        // pulse lies strictly between start and bound, both u16
        let reading = rig.step_to(pulse as u16, params.settle_ms)?;
        steps += 1;
        trace!("{} us -> {}", pulse, reading);

        if reading == last {
            debug!("stall at {} us after {} steps", pulse, steps);
            return Ok(Stall {
                pulse_us: pulse as u16,
                steps,
            });
        }
        last = reading;
    }
}
