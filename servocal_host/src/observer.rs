use std::time::Instant;

use log::{debug, info};
use serde::Serialize;
use servocal_common::{CalibrationObserver, Phase, Sample};

#[derive(Debug, Clone, Serialize)]
pub struct PhaseMark {
    pub phase: Phase,
    /// Wall-clock time since the run started.
    pub at_ms: u128,
}

/// Keeps everything a run reports so it can be written out afterwards.
pub struct RecordingObserver {
    started: Instant,
    pub phases: Vec<PhaseMark>,
    pub samples: Vec<Sample>,
    /// Cancel the run once this many error-mapping samples are in.
    pub sample_limit: Option<usize>,
}

impl RecordingObserver {
    pub fn new(sample_limit: Option<usize>) -> Self {
        Self {
            started: Instant::now(),
            phases: Vec::new(),
            samples: Vec::new(),
            sample_limit,
        }
    }
}

impl CalibrationObserver for RecordingObserver {
    fn phase(&mut self, phase: Phase) {
        let at_ms = self.started.elapsed().as_millis();
        info!("[{:>6} ms] {}", at_ms, phase);
        self.phases.push(PhaseMark { phase, at_ms });
    }

    fn sample(&mut self, sample: &Sample) {
        debug!(
            "{:6.1} deg ({} us) -> {:7.2} deg",
            sample.commanded_deg, sample.pulse_us, sample.true_deg
        );
        self.samples.push(*sample);
    }

    fn should_abort(&mut self) -> bool {
        self.sample_limit
            .is_some_and(|limit| self.samples.len() >= limit)
    }
}
