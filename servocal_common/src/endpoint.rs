use embedded_hal::delay::DelayNs;

use crate::config::CalibrationConfig;
use crate::error::CalError;
use crate::observer::CalibrationObserver;
use crate::rig::Rig;
use crate::sweep::{sweep_until_stall, SweepParams};
use crate::{Actuator, AngleSensor};

#[cfg_attr(feature = "no_std", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Low,
    High,
}

impl Direction {
    fn sign(self) -> i32 {
        match self {
            Direction::Low => -1,
            Direction::High => 1,
        }
    }
}

#[cfg_attr(feature = "no_std", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    /// Recorded endpoint: fine stall pulled back into the working range.
    pub pulse_us: u16,
    pub coarse_stall_us: u16,
    pub fine_stall_us: u16,
}

/// Locate the mechanical stop in `direction`, starting from the nominal
/// midpoint. Leaves the servo parked on the recorded endpoint.
pub fn find_endpoint<A, S, D, O>(
    rig: &mut Rig<'_, A, S, D, O>,
    config: &CalibrationConfig,
    direction: Direction,
) -> Result<Endpoint, CalError>
where
    A: Actuator,
    S: AngleSensor,
    D: DelayNs,
    O: CalibrationObserver,
{
    let ep = &config.endpoint;
    let sign = direction.sign();
    let bound_us = match direction {
        Direction::Low => 0,
        Direction::High => config.high_bound_us(),
    };

    let coarse = sweep_until_stall(
        rig,
        SweepParams {
            start_us: config.servo.mid_pulse_us(),
            step_us: sign * ep.coarse_step_us as i32,
            settle_ms: ep.coarse_settle_ms,
            bound_us,
        },
    )?;
    if coarse.steps == 1 {
        error!("no movement out of the midpoint, check servo power and magnet");
        return Err(CalError::NoMotion {
            pulse_us: coarse.pulse_us,
        });
    }

    // re-enter the free-moving zone before refining
    let fine_start = retreat(
        coarse.pulse_us,
        sign,
        ep.backoff_steps as u32 * ep.coarse_step_us as u32,
    );
    let fine = sweep_until_stall(
        rig,
        SweepParams {
            start_us: fine_start,
            step_us: sign * ep.fine_step_us as i32,
            settle_ms: ep.fine_settle_ms,
            bound_us,
        },
    )?;

    let pulse_us = retreat(
        fine.pulse_us,
        sign,
        ep.backoff_steps as u32 * ep.fine_step_us as u32,
    );
    rig.move_to(pulse_us)?;

    info!(
        "{} endpoint {} us (coarse stall {} us, fine stall {} us)",
        match direction {
            Direction::Low => "low",
            Direction::High => "high",
        },
        pulse_us,
        coarse.pulse_us,
        fine.pulse_us
    );

    Ok(Endpoint {
        pulse_us,
        coarse_stall_us: coarse.pulse_us,
        fine_stall_us: fine.pulse_us,
    })
}

/// Move `by_us` against the sweep direction.
fn retreat(pulse_us: u16, sign: i32, by_us: u32) -> u16 {
    let pulse = pulse_us as i64 - sign as i64 * by_us as i64;
    pulse.clamp(0, u16::MAX as i64) as u16
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::NoopObserver;
    use crate::sim::{SimDelay, SimParams, SimServo};

    fn find(params: SimParams, direction: Direction) -> Result<Endpoint, CalError> {
        let servo = SimServo::new(params);
        let mut actuator = servo.actuator();
        let mut sensor = servo.sensor();
        let mut delay = SimDelay::default();
        let mut observer = NoopObserver;
        let config = CalibrationConfig::default();
        let mut rig = Rig::new(&mut actuator, &mut sensor, &mut delay, &mut observer, &config);
        find_endpoint(&mut rig, &config, direction)
    }

    #[test]
    fn low_endpoint_lands_next_to_the_stop() {
        let params = SimParams {
            stall_low_us: 523,
            ..SimParams::default()
        };
        let endpoint = find(params, Direction::Low).unwrap();

        assert!(endpoint.pulse_us.abs_diff(523) <= 2);
        assert!(endpoint.pulse_us >= 523, "recorded inside the working range");
        assert!(endpoint.fine_stall_us < 523);
    }

    #[test]
    fn high_endpoint_lands_next_to_the_stop() {
        let params = SimParams {
            stall_high_us: 2467,
            ..SimParams::default()
        };
        let endpoint = find(params, Direction::High).unwrap();

        assert!(endpoint.pulse_us.abs_diff(2467) <= 2);
        assert!(endpoint.pulse_us <= 2467);
        assert!(endpoint.coarse_stall_us > 2467);
    }

    #[test]
    fn servo_is_parked_on_the_endpoint() {
        let servo = SimServo::new(SimParams::default());
        let mut actuator = servo.actuator();
        let mut sensor = servo.sensor();
        let mut delay = SimDelay::default();
        let mut observer = NoopObserver;
        let config = CalibrationConfig::default();
        let mut rig = Rig::new(&mut actuator, &mut sensor, &mut delay, &mut observer, &config);

        let endpoint = find_endpoint(&mut rig, &config, Direction::Low).unwrap();

        assert_eq!(servo.pulse_us(), endpoint.pulse_us);
    }

    #[test]
    fn restless_sensor_never_resolves() {
        let params = SimParams {
            jitter: true,
            ..SimParams::default()
        };
        assert_eq!(
            find(params, Direction::Low),
            Err(CalError::EndpointNotFound { bound_us: 0 })
        );
        assert_eq!(
            find(params, Direction::High),
            Err(CalError::EndpointNotFound { bound_us: 3500 })
        );
    }

    #[test]
    fn frozen_sensor_is_no_motion() {
        let params = SimParams {
            frozen: true,
            ..SimParams::default()
        };
        assert_eq!(
            find(params, Direction::Low),
            Err(CalError::NoMotion { pulse_us: 1490 })
        );
    }

    #[test]
    fn retreat_clamps_at_zero() {
        assert_eq!(retreat(1470, -1, 20), 1490);
        assert_eq!(retreat(2480, 1, 20), 2460);
        assert_eq!(retreat(5, 1, 20), 0);
        // products beyond u16 saturate instead of wrapping
        assert_eq!(retreat(60_000, -1, 70_000), u16::MAX);
        assert_eq!(retreat(3000, 1, 70_000), 0);
    }

    #[test]
    fn single_step_backoff_stays_inside_the_stop() {
        let servo = SimServo::new(SimParams::default());
        let mut actuator = servo.actuator();
        let mut sensor = servo.sensor();
        let mut delay = SimDelay::default();
        let mut observer = NoopObserver;
        let mut config = CalibrationConfig::default();
        config.endpoint.backoff_steps = 1;
        let mut rig = Rig::new(&mut actuator, &mut sensor, &mut delay, &mut observer, &config);

        let low = find_endpoint(&mut rig, &config, Direction::Low).unwrap();
        let high = find_endpoint(&mut rig, &config, Direction::High).unwrap();

        assert!(low.pulse_us >= 520 && low.pulse_us <= 521);
        assert!(high.pulse_us <= 2470 && high.pulse_us >= 2469);
    }
}
