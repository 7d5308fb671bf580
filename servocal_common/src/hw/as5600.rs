use embedded_hal::i2c::I2c;

use crate::AngleSensor;

pub const AS5600_ADDR: u8 = 0x36;

/// Power mode, hysteresis, output stage, slow filter and watchdog all at
/// their reset values.
pub const DEFAULT_CONF: u16 = 0x0000;

const REG_ZPOS: u8 = 0x01;
const REG_CONF: u8 = 0x07;
const REG_STATUS: u8 = 0x0B;
const REG_RAW_ANGLE: u8 = 0x0C;
const REG_ANGLE: u8 = 0x0E;

const STATUS_MH: u8 = 0x08;
const STATUS_ML: u8 = 0x10;
const STATUS_MD: u8 = 0x20;

const TWELVE_BITS: u16 = 0x0FFF;

#[cfg_attr(feature = "no_std", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MagnetStatus {
    pub detected: bool,
    pub too_weak: bool,
    pub too_strong: bool,
}

impl MagnetStatus {
    fn from_bits(bits: u8) -> Self {
        Self {
            detected: bits & STATUS_MD != 0,
            too_weak: bits & STATUS_ML != 0,
            too_strong: bits & STATUS_MH != 0,
        }
    }
}

/// AS5600 12-bit magnetic rotary encoder.
pub struct As5600<I2C> {
    i2c: I2C,
}

impl<I2C: I2c> As5600<I2C> {
    pub fn new(i2c: I2C) -> Self {
        Self { i2c }
    }

    pub fn configure(&mut self, conf: u16) -> Result<(), I2C::Error> {
        self.write_u16(REG_CONF, conf & 0x3FFF)
    }

    pub fn magnet_status(&mut self) -> Result<MagnetStatus, I2C::Error> {
        let mut buf = [0u8; 1];
        self.i2c.write_read(AS5600_ADDR, &[REG_STATUS], &mut buf)?;
        Ok(MagnetStatus::from_bits(buf[0]))
    }

    /// Unscaled angle, unaffected by the zero position.
    pub fn raw_angle(&mut self) -> Result<u16, I2C::Error> {
        self.read_u12(REG_RAW_ANGLE)
    }

    /// Angle relative to the zero position.
    pub fn angle(&mut self) -> Result<u16, I2C::Error> {
        self.read_u12(REG_ANGLE)
    }

    pub fn set_zero_position(&mut self, raw: u16) -> Result<(), I2C::Error> {
        self.write_u16(REG_ZPOS, raw & TWELVE_BITS)
    }

    pub fn release(self) -> I2C {
        self.i2c
    }

    fn read_u12(&mut self, reg: u8) -> Result<u16, I2C::Error> {
        let mut buf = [0u8; 2];
        self.i2c.write_read(AS5600_ADDR, &[reg], &mut buf)?;
        Ok(u16::from_be_bytes(buf) & TWELVE_BITS)
    }

    fn write_u16(&mut self, reg: u8, value: u16) -> Result<(), I2C::Error> {
        let [hi, lo] = value.to_be_bytes();
        self.i2c.write(AS5600_ADDR, &[reg, hi, lo])
    }
}

impl<I2C: I2c> AngleSensor for As5600<I2C> {
    type Error = I2C::Error;

    fn read_step(&mut self) -> Result<u16, Self::Error> {
        self.angle()
    }

    /// Makes the current horn position read as step 0. ZPOS is written to
    /// volatile registers only, it does not burn the OTP.
    fn zero(&mut self) -> Result<(), Self::Error> {
        let raw = self.raw_angle()?;
        self.set_zero_position(raw)
    }
}
