/// embedded-hal adapters for the bench hardware: PCA9685 PWM output and
/// AS5600 magnetic encoder, usually sharing one I2C bus.
pub mod as5600;
pub mod pca9685;

pub use as5600::As5600;
pub use pca9685::PcaActuator;
