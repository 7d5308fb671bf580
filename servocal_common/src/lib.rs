#![cfg_attr(feature = "no_std", no_std)]

#[cfg(all(feature = "std", feature = "no_std"))]
compile_error!("features `std` and `no_std` are mutually exclusive");

#[macro_use]
mod fmt;

pub mod calibrate;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod error_map;
pub mod fit;
pub mod hw;
pub mod normalize;
pub mod observer;
pub mod result;
pub mod rig;
pub mod sweep;

#[cfg(any(test, feature = "std"))]
pub mod sim;

pub use calibrate::Calibrator;
pub use config::{CalibrationConfig, EndpointConfig, ErrorMapConfig, SensorSpec, ServoSpec};
pub use error::{CalError, CalibrationFailure, ConfigError, PartialCalibration, Phase};
pub use observer::{CalibrationObserver, NoopObserver, Sample};
pub use result::CalibrationResult;

/// Pulse-width output capability of a servo driver.
///
/// The channel is fixed when the implementor is built; every call addresses
/// that one output.
pub trait Actuator {
    type Error: core::fmt::Debug;

    /// Command a pulse width in microseconds. Returns as soon as the driver
    /// has accepted the value; the mechanism still needs time to get there.
    fn set_pulse_width(&mut self, pulse_us: u16) -> Result<(), Self::Error>;

    /// Smallest pulse-width change (µs) the output can actually express.
    fn resolution_us(&self) -> u16 {
        1
    }
}

/// Absolute angle capability of an encoder driver.
pub trait AngleSensor {
    type Error: core::fmt::Debug;

    /// Raw position on the sensor's circular scale, `0..resolution`.
    fn read_step(&mut self) -> Result<u16, Self::Error>;

    /// Make the current physical position read as step 0.
    fn zero(&mut self) -> Result<(), Self::Error>;
}
