use embedded_hal::delay::DelayNs;

use crate::config::CalibrationConfig;
use crate::endpoint::{find_endpoint, Direction};
use crate::error::{CalError, CalibrationFailure, PartialCalibration, Phase};
use crate::error_map::map_error;
use crate::normalize::normalize;
use crate::observer::CalibrationObserver;
use crate::result::CalibrationResult;
use crate::rig::Rig;
use crate::{Actuator, AngleSensor};

/// Owns the servo, the encoder and a delay source for the duration of a
/// calibration. Nothing else may drive the servo while a run is in progress.
pub struct Calibrator<A, S, D> {
    actuator: A,
    sensor: S,
    delay: D,
    config: CalibrationConfig,
}

struct Progress {
    phase: Phase,
    partial: PartialCalibration,
}

impl Progress {
    fn enter<O: CalibrationObserver>(&mut self, observer: &mut O, phase: Phase) {
        info!("{}", phase);
        self.phase = phase;
        observer.phase(phase);
    }
}

impl<A, S, D> Calibrator<A, S, D>
where
    A: Actuator,
    S: AngleSensor,
    D: DelayNs,
{
    pub fn new(actuator: A, sensor: S, delay: D, config: CalibrationConfig) -> Self {
        Self {
            actuator,
            sensor,
            delay,
            config,
        }
    }

    pub fn config(&self) -> &CalibrationConfig {
        &self.config
    }

    /// Hand the hardware back.
    pub fn release(self) -> (A, S, D) {
        (self.actuator, self.sensor, self.delay)
    }

    /// Low endpoint, sensor zero, high endpoint, pulse normalization, error
    /// mapping. Stops at the first failure.
    pub fn run<O: CalibrationObserver>(
        &mut self,
        observer: &mut O,
    ) -> Result<CalibrationResult, CalibrationFailure> {
        let config = self.config;
        let mut progress = Progress {
            phase: Phase::ConfigurationCheck,
            partial: PartialCalibration::default(),
        };

        progress.enter(observer, Phase::ConfigurationCheck);
        if let Err(e) = config.validate(self.actuator.resolution_us()) {
            error!("rejected configuration: {}", e);
            return Err(CalibrationFailure {
                phase: progress.phase,
                error: e.into(),
                partial: progress.partial,
            });
        }

        let mut rig = Rig::new(
            &mut self.actuator,
            &mut self.sensor,
            &mut self.delay,
            observer,
            &config,
        );
        let outcome = run_phases(&mut rig, &config, &mut progress);

        progress.partial.samples = rig.samples();
        progress.partial.last_pulse_us = rig.last_pulse_us();
        progress.partial.elapsed_ms = rig.elapsed_ms();

        match outcome {
            Ok(result) => {
                info!("calibration finished in {} ms", rig.elapsed_ms());
                Ok(result)
            }
            Err(error) => {
                let failure = CalibrationFailure {
                    phase: progress.phase,
                    error,
                    partial: progress.partial,
                };
                error!("{} failed: {}", failure.phase, failure.error);
                Err(failure)
            }
        }
    }
}

fn run_phases<A, S, D, O>(
    rig: &mut Rig<'_, A, S, D, O>,
    config: &CalibrationConfig,
    progress: &mut Progress,
) -> Result<CalibrationResult, CalError>
where
    A: Actuator,
    S: AngleSensor,
    D: DelayNs,
    O: CalibrationObserver,
{
    progress.enter(rig.observer(), Phase::LowEndpoint);
    let low = find_endpoint(rig, config, Direction::Low)?;
    progress.partial.measured_min_pulse_us = Some(low.pulse_us);

    // every later reading is relative to the low endpoint
    progress.enter(rig.observer(), Phase::SensorZero);
    rig.zero()?;

    progress.enter(rig.observer(), Phase::HighEndpoint);
    let high = find_endpoint(rig, config, Direction::High)?;
    progress.partial.measured_max_pulse_us = Some(high.pulse_us);

    progress.enter(rig.observer(), Phase::PulseNormalization);
    if low.pulse_us >= high.pulse_us {
        return Err(CalError::InconsistentEndpoints);
    }
    let pwm = normalize(
        low.pulse_us as f32,
        high.pulse_us as f32,
        config.servo.min_pulse_us as f32,
        config.servo.max_pulse_us as f32,
    );
    progress.partial.pwm_offset_us = Some(pwm.offset_us);
    progress.partial.pwm_multiplier = Some(pwm.multiplier);
    info!(
        "pwm offset {} us, multiplier {}",
        pwm.offset_us, pwm.multiplier
    );

    progress.enter(rig.observer(), Phase::ErrorMapping);
    let model = map_error(rig, config)?;
    if !(model.multiplier > 0.0) {
        warn!(
            "non-positive error multiplier {}, sensor or servo may be inverted",
            model.multiplier
        );
    }

    Ok(CalibrationResult::new(low.pulse_us, high.pulse_us, pwm, model))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigError;
    use crate::observer::{NoopObserver, Sample};
    use crate::sim::{SimDelay, SimParams, SimServo};
    use approx::assert_relative_eq;

    fn calibrator(
        params: SimParams,
        config: CalibrationConfig,
    ) -> (
        SimServo,
        Calibrator<crate::sim::SimActuator, crate::sim::SimSensor, SimDelay>,
    ) {
        let servo = SimServo::new(params);
        let calibrator =
            Calibrator::new(servo.actuator(), servo.sensor(), SimDelay::default(), config);
        (servo, calibrator)
    }

    #[derive(Default)]
    struct Trace {
        phases: Vec<Phase>,
        samples: Vec<Sample>,
        abort_after_commands: Option<u32>,
        commands: u32,
    }

    impl CalibrationObserver for Trace {
        fn phase(&mut self, phase: Phase) {
            self.phases.push(phase);
        }

        fn sample(&mut self, sample: &Sample) {
            self.samples.push(*sample);
        }

        fn should_abort(&mut self) -> bool {
            self.commands += 1;
            self.abort_after_commands
                .is_some_and(|limit| self.commands > limit)
        }
    }

    #[test]
    fn bench_servo_end_to_end() {
        let (servo, mut calibrator) = calibrator(SimParams::default(), CalibrationConfig::default());
        let mut trace = Trace::default();

        let result = calibrator.run(&mut trace).unwrap();

        // stops at 520 / 2470, endpoints recorded one fine step inside
        assert!((result.measured_min_pulse_us() - 520.0).abs() <= 2.0);
        assert!((result.measured_max_pulse_us() - 2470.0).abs() <= 2.0);
        let expected = normalize(
            result.measured_min_pulse_us(),
            result.measured_max_pulse_us(),
            500.0,
            2500.0,
        );
        assert_eq!(result.pwm_offset_us(), expected.offset_us);
        assert_eq!(result.pwm_multiplier(), expected.multiplier);
        assert_relative_eq!(result.pwm_offset_us(), -5.0, epsilon = 1.0);
        assert_relative_eq!(result.pwm_multiplier(), 0.99, epsilon = 1e-3);
        assert!(result.dc_multiplier() > 0.0);

        assert_eq!(
            trace.phases,
            vec![
                Phase::ConfigurationCheck,
                Phase::LowEndpoint,
                Phase::SensorZero,
                Phase::HighEndpoint,
                Phase::PulseNormalization,
                Phase::ErrorMapping,
            ]
        );
        assert_eq!(trace.samples.len(), 271);
        assert_eq!(servo.zero_count(), 1);
    }

    #[test]
    fn error_model_of_a_servo_covering_the_nominal_range() {
        let params = SimParams {
            stall_low_us: 450,
            stall_high_us: 2560,
            degrees_per_us: 0.135 * 0.97,
            ..SimParams::default()
        };
        let (_servo, mut calibrator) = calibrator(params, CalibrationConfig::default());

        let result = calibrator.run(&mut NoopObserver).unwrap();

        assert_relative_eq!(result.dc_multiplier(), 0.97, epsilon = 2e-3);
        // zero sits at the low endpoint, about 50 us below commanded 0 deg
        let zero_to_nominal_min = 500.0 - result.measured_min_pulse_us();
        assert_relative_eq!(
            result.dc_offset_deg(),
            zero_to_nominal_min * 0.135 * 0.97,
            epsilon = 0.15
        );
    }

    #[test]
    fn invalid_configuration_touches_no_hardware() {
        let mut config = CalibrationConfig::default();
        config.endpoint.coarse_step_us = 0;
        let (servo, mut calibrator) = calibrator(SimParams::default(), config);

        let failure = calibrator.run(&mut NoopObserver).unwrap_err();

        assert_eq!(failure.phase, Phase::ConfigurationCheck);
        assert_eq!(
            failure.error,
            CalError::InvalidConfiguration(ConfigError::StepSize)
        );
        assert_eq!(failure.partial, PartialCalibration::default());
        assert_eq!(servo.pulse_us(), 1500);
    }

    #[test]
    fn oversized_backoff_is_rejected_before_any_motion() {
        let mut config = CalibrationConfig::default();
        config.endpoint.backoff_steps = 7000;
        let (servo, mut calibrator) = calibrator(SimParams::default(), config);

        let failure = calibrator.run(&mut NoopObserver).unwrap_err();

        assert_eq!(failure.phase, Phase::ConfigurationCheck);
        assert_eq!(
            failure.error,
            CalError::InvalidConfiguration(ConfigError::Backoff { steps: 7000 })
        );
        assert_eq!(servo.pulse_us(), 1500);
    }

    #[test]
    fn high_sweep_failure_keeps_the_low_endpoint() {
        let params = SimParams {
            // horn never stops inside the overrun margin
            stall_high_us: 4000,
            ..SimParams::default()
        };
        let (servo, mut calibrator) = calibrator(params, CalibrationConfig::default());

        let failure = calibrator.run(&mut NoopObserver).unwrap_err();

        assert_eq!(failure.phase, Phase::HighEndpoint);
        assert_eq!(failure.error, CalError::EndpointNotFound { bound_us: 3500 });
        assert!(failure.partial.measured_min_pulse_us.is_some());
        assert_eq!(failure.partial.measured_max_pulse_us, None);
        assert_eq!(failure.partial.last_pulse_us, Some(3490));
        assert_eq!(servo.zero_count(), 1);
        assert!(failure
            .to_string()
            .starts_with("high-endpoint sweep failed"));
    }

    #[test]
    fn sensor_fault_is_reported_against_its_phase() {
        let params = SimParams {
            fail_after_reads: Some(3),
            ..SimParams::default()
        };
        let (_servo, mut calibrator) = calibrator(params, CalibrationConfig::default());

        let failure = calibrator.run(&mut NoopObserver).unwrap_err();

        assert_eq!(failure.phase, Phase::LowEndpoint);
        assert_eq!(failure.error, CalError::SensorReadFailure);
    }

    #[test]
    fn observer_can_cancel() {
        let (_servo, mut calibrator) = calibrator(SimParams::default(), CalibrationConfig::default());
        let mut trace = Trace {
            abort_after_commands: Some(5),
            ..Trace::default()
        };

        let failure = calibrator.run(&mut trace).unwrap_err();

        assert_eq!(failure.error, CalError::Cancelled);
        assert_eq!(failure.phase, Phase::LowEndpoint);
        assert_eq!(trace.commands, 6);
    }

    #[test]
    fn time_budget_is_enforced() {
        let config = CalibrationConfig {
            run_timeout_ms: 10_000,
            ..CalibrationConfig::default()
        };
        let (_servo, mut calibrator) = calibrator(SimParams::default(), config);

        let failure = calibrator.run(&mut NoopObserver).unwrap_err();

        match failure.error {
            CalError::Timeout { elapsed_ms } => assert!(elapsed_ms > 10_000),
            other => panic!("expected timeout, got {:?}", other),
        }
        assert!(failure.partial.elapsed_ms > 10_000);
    }

    #[test]
    fn release_returns_the_hardware() {
        let (servo, calibrator) = calibrator(SimParams::default(), CalibrationConfig::default());
        let (mut actuator, _sensor, delay) = calibrator.release();
        actuator.set_pulse_width(900).unwrap();
        assert_eq!(servo.pulse_us(), 900);
        assert_eq!(delay.elapsed_ms(), 0);
    }
}
