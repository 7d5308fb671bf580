use embedded_hal::delay::DelayNs;

use crate::config::{CalibrationConfig, SensorSpec, ServoSpec};
use crate::error::CalError;
use crate::observer::{CalibrationObserver, Sample};
use crate::{Actuator, AngleSensor};

/// The actuator, sensor and clock of one run, with the bookkeeping every
/// phase shares: cancellation, time budget and the last commanded pulse.
pub struct Rig<'a, A, S, D, O> {
    actuator: &'a mut A,
    sensor: &'a mut S,
    delay: &'a mut D,
    observer: &'a mut O,
    servo: ServoSpec,
    sensor_spec: SensorSpec,
    timeout_ms: u64,
    elapsed_ms: u64,
    last_pulse_us: Option<u16>,
    samples: u32,
}

impl<'a, A, S, D, O> Rig<'a, A, S, D, O>
where
    A: Actuator,
    S: AngleSensor,
    D: DelayNs,
    O: CalibrationObserver,
{
    pub fn new(
        actuator: &'a mut A,
        sensor: &'a mut S,
        delay: &'a mut D,
        observer: &'a mut O,
        config: &CalibrationConfig,
    ) -> Self {
        Self {
            actuator,
            sensor,
            delay,
            observer,
            servo: config.servo,
            sensor_spec: config.sensor,
            timeout_ms: config.run_timeout_ms,
            elapsed_ms: 0,
            last_pulse_us: None,
            samples: 0,
        }
    }

    pub fn command(&mut self, pulse_us: u16) -> Result<(), CalError> {
        if self.observer.should_abort() {
            warn!("calibration cancelled at {} us", pulse_us);
            return Err(CalError::Cancelled);
        }
        self.actuator.set_pulse_width(pulse_us).map_err(|e| {
            driver_error!("actuator write", e);
            CalError::ActuatorWriteFailure
        })?;
        self.last_pulse_us = Some(pulse_us);
        Ok(())
    }

    pub fn settle(&mut self, ms: u32) -> Result<(), CalError> {
        self.delay.delay_ms(ms);
        self.elapsed_ms += ms as u64;
        if self.timeout_ms != 0 && self.elapsed_ms > self.timeout_ms {
            error!("time budget of {} ms exhausted", self.timeout_ms);
            return Err(CalError::Timeout {
                elapsed_ms: self.elapsed_ms,
            });
        }
        Ok(())
    }

    pub fn read(&mut self) -> Result<u16, CalError> {
        self.sensor.read_step().map_err(|e| {
            driver_error!("sensor read", e);
            CalError::SensorReadFailure
        })
    }

    pub fn zero(&mut self) -> Result<(), CalError> {
        self.sensor.zero().map_err(|e| {
            driver_error!("sensor zero", e);
            CalError::SensorReadFailure
        })
    }

    /// Command, settle, read.
    pub fn step_to(&mut self, pulse_us: u16, settle_ms: u32) -> Result<u16, CalError> {
        self.command(pulse_us)?;
        self.settle(settle_ms)?;
        self.read()
    }

    /// Command `pulse_us` and wait for the horn to arrive from wherever it
    /// was, at rated speed. With no previous command the full nominal range
    /// is assumed.
    pub fn move_to(&mut self, pulse_us: u16) -> Result<(), CalError> {
        let delta_us = match self.last_pulse_us {
            Some(last) => last.abs_diff(pulse_us),
            None => self.servo.max_pulse_us - self.servo.min_pulse_us,
        };
        let wait_ms = self
            .servo
            .travel_ms(delta_us as u32)
            .saturating_add(self.sensor_spec.latency_ms());
        trace!("move to {} us, wait {} ms", pulse_us, wait_ms);
        self.command(pulse_us)?;
        self.settle(wait_ms)
    }

    pub fn observer(&mut self) -> &mut O {
        &mut *self.observer
    }

    pub fn record_sample(&mut self, sample: &Sample) {
        self.samples += 1;
        self.observer.sample(sample);
    }

    pub fn samples(&self) -> u32 {
        self.samples
    }

    pub fn servo(&self) -> &ServoSpec {
        &self.servo
    }

    pub fn sensor_spec(&self) -> &SensorSpec {
        &self.sensor_spec
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ms
    }

    pub fn last_pulse_us(&self) -> Option<u16> {
        self.last_pulse_us
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::NoopObserver;
    use crate::sim::{RecordingActuator, ScriptedSensor, SimDelay};

    #[test]
    fn endless_travel_time_ends_in_timeout() {
        let mut actuator = RecordingActuator::default();
        let mut sensor = ScriptedSensor::new(&[]);
        let mut delay = SimDelay::default();
        let mut observer = NoopObserver;
        let mut config = CalibrationConfig::default();
        config.servo.speed_deg_per_s = 1e-9;
        let mut rig = Rig::new(&mut actuator, &mut sensor, &mut delay, &mut observer, &config);

        let err = rig.move_to(1500).unwrap_err();

        assert_eq!(
            err,
            CalError::Timeout {
                elapsed_ms: u32::MAX as u64
            }
        );
        assert_eq!(actuator.commands, vec![1500]);
    }
}
