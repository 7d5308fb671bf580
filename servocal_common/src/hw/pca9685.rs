use embedded_hal::i2c::I2c;
use pwm_pca9685::{Channel, Error, Pca9685};

use crate::Actuator;

const OSCILLATOR_HZ: u32 = 25_000_000;
const COUNTS: u32 = 4096;

/// Prescale register value for an output frequency, per the datasheet
/// formula `round(osc / (4096 * f)) - 1`.
pub fn prescale_for(frequency_hz: u32) -> u8 {
    let prescale =
        libm::roundf(OSCILLATOR_HZ as f32 / (COUNTS as f32 * frequency_hz as f32)) - 1.0;
    prescale.clamp(3.0, 255.0) as u8
}

/// PWM period in microseconds for a prescale value.
pub fn period_us(prescale: u8) -> u32 {
    (prescale as u32 + 1) * COUNTS * 1000 / (OSCILLATOR_HZ / 1000)
}

/// Off-count for a pulse width, with the pulse starting at count 0.
pub fn counts_for(period_us: u32, pulse_us: u16) -> u16 {
    let counts = libm::roundf(pulse_us as f32 * COUNTS as f32 / period_us as f32);
    counts.min((COUNTS - 1) as f32) as u16
}

pub fn channel(index: u8) -> Option<Channel> {
    let channel = match index {
        0 => Channel::C0,
        1 => Channel::C1,
        2 => Channel::C2,
        3 => Channel::C3,
        4 => Channel::C4,
        5 => Channel::C5,
        6 => Channel::C6,
        7 => Channel::C7,
        8 => Channel::C8,
        9 => Channel::C9,
        10 => Channel::C10,
        11 => Channel::C11,
        12 => Channel::C12,
        13 => Channel::C13,
        14 => Channel::C14,
        15 => Channel::C15,
        _ => return None,
    };
    Some(channel)
}

/// One PCA9685 channel driving the servo under test.
pub struct PcaActuator<I2C> {
    pwm: Pca9685<I2C>,
    channel: Channel,
    period_us: u32,
}

impl<I2C, E> PcaActuator<I2C>
where
    I2C: I2c<Error = E>,
    E: core::fmt::Debug,
{
    pub fn new(mut pwm: Pca9685<I2C>, channel: Channel, prescale: u8) -> Result<Self, Error<E>> {
        pwm.enable()?;
        pwm.set_prescale(prescale)?;
        Ok(Self {
            pwm,
            channel,
            period_us: period_us(prescale),
        })
    }

    pub fn period_us(&self) -> u32 {
        self.period_us
    }

    pub fn release(self) -> Pca9685<I2C> {
        self.pwm
    }
}

impl<I2C, E> Actuator for PcaActuator<I2C>
where
    I2C: I2c<Error = E>,
    E: core::fmt::Debug,
{
    type Error = Error<E>;

    fn set_pulse_width(&mut self, pulse_us: u16) -> Result<(), Self::Error> {
        let off = counts_for(self.period_us, pulse_us);
        self.pwm.set_channel_on_off(self.channel, 0, off)
    }

    fn resolution_us(&self) -> u16 {
        self.period_us.div_ceil(COUNTS) as u16
    }
}
