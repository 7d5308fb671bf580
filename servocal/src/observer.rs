use defmt::{debug, info};
use embedded_hal::digital::InputPin;
use servocal_common::{CalibrationObserver, Phase, Sample};

/// Reports progress over RTT and cancels the run while the abort button
/// (active low) is held.
pub struct BenchObserver<P> {
    abort: P,
    samples: u32,
    /// Every n-th error-mapping sample is logged at info, the rest at debug.
    stride: u32,
}

impl<P: InputPin> BenchObserver<P> {
    pub fn new(abort: P, stride: u32) -> Self {
        Self {
            abort,
            samples: 0,
            stride: stride.max(1),
        }
    }

    pub fn samples(&self) -> u32 {
        self.samples
    }
}

impl<P: InputPin> CalibrationObserver for BenchObserver<P> {
    fn phase(&mut self, phase: Phase) {
        info!("-> {}", phase);
    }

    fn sample(&mut self, sample: &Sample) {
        if self.samples % self.stride == 0 {
            info!("{}", sample);
        } else {
            debug!("{}", sample);
        }
        self.samples += 1;
    }

    fn should_abort(&mut self) -> bool {
        // a pin that cannot be read never aborts
        self.abort.is_low().unwrap_or(false)
    }
}
