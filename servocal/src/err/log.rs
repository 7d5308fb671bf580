use defmt::error;
use servocal_common::{CalError, CalibrationFailure, Phase};
use stm32f4xx_hal::i2c;

// enum containing all possible error types.
pub enum ErrLog {
    I2C(u8),
    PCA9685(u8),
    Calibration(Phase, CalError),
}

// handler for logging i2c errors
pub fn err_i2c_h(err: i2c::Error) -> ErrLog {
    let e: u8 = match err {
        i2c::Error::Overrun => 0x01,
        i2c::Error::Timeout => 0x02,
        i2c::Error::Bus => 0x03,
        i2c::Error::ArbitrationLoss => 0x04,
        i2c::Error::NoAcknowledge(source) => match source {
            i2c::NoAcknowledgeSource::Address => 0x05,
            i2c::NoAcknowledgeSource::Unknown => 0x06,
            i2c::NoAcknowledgeSource::Data => 0x07,
        },
        i2c::Error::Crc => 0x08,
        _ => 0x09,
    };
    ErrLog::I2C(e)
}

// handler for pca9685 errors, bus errors are reported as such
pub fn err_pwm_h(err: pwm_pca9685::Error<i2c::Error>) -> ErrLog {
    match err {
        pwm_pca9685::Error::I2C(e) => err_i2c_h(e),
        pwm_pca9685::Error::InvalidInputData => ErrLog::PCA9685(0x01),
    }
}

// handler for a failed calibration run
pub fn err_cal_h(failure: &CalibrationFailure) -> ErrLog {
    ErrLog::Calibration(failure.phase, failure.error)
}

pub fn log_err(err: ErrLog) {
    match err {
        ErrLog::I2C(e) => error!("I2C {:x}", e),
        ErrLog::PCA9685(e) => error!("PCA9685 {:x}", e),
        ErrLog::Calibration(phase, e) => error!("{} failed: {}", phase, e),
    }
}
