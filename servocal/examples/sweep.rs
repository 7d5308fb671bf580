#![deny(unsafe_code)]
#![no_main]
#![no_std]

use defmt::info;
use defmt_rtt as _;
use panic_probe as _;
use pwm_pca9685::{Channel, Pca9685};
use rtic_monotonics::systick_monotonic;
use rtic_monotonics::Monotonic;
systick_monotonic!(Mono, 1000);
use servocal_common::hw::pca9685::{prescale_for, PcaActuator};
use servocal_common::{Actuator, ServoSpec};
use stm32f4xx_hal::{i2c::I2c1, prelude::*};

const PCA_9685_ADDR: u8 = 0x40;

/// Sweeps the nominal range open-loop, one degree per step at the rated
/// speed, to check wiring and the output-enable line before calibrating.
#[rtic::app(device = stm32f4xx_hal::pac, peripherals = true, dispatchers = [USART1])]
mod app {

    use super::*;

    #[shared]
    struct Shared {}

    #[local]
    struct Local {
        servo: PcaActuator<I2c1>,
    }

    #[init]
    fn init(cx: init::Context) -> (Shared, Local) {
        let dp = cx.device;
        let rcc = dp.RCC.constrain();
        let hse = 16.MHz();
        let sysclk = 64.MHz();
        let clocks = rcc.cfgr.use_hse(hse).sysclk(sysclk).freeze();

        let _syscfg = dp.SYSCFG.constrain();
        Mono::start(cx.core.SYST, sysclk.to_Hz());

        info!("pca 9685 sweep");
        let gpiob = dp.GPIOB.split();
        let gpioc = dp.GPIOC.split();

        let i2c1_scl = gpiob.pb8.into_alternate_open_drain();
        let i2c1_sda = gpiob.pb9.into_alternate_open_drain();
        let i2c1 = I2c1::new(dp.I2C1, (i2c1_scl, i2c1_sda), 400.kHz(), &clocks);

        let pwm = Pca9685::new(i2c1, PCA_9685_ADDR).unwrap();
        let servo = PcaActuator::new(pwm, Channel::C0, prescale_for(50)).unwrap();

        info!("pwm enable pin");
        let mut servo_en = gpioc.pc3.into_push_pull_output();
        servo_en.set_low();

        sweep_task::spawn().unwrap();

        (Shared {}, Local { servo })
    }

    #[task(local = [servo])]
    async fn sweep_task(cx: sweep_task::Context) {
        let spec = ServoSpec::default();
        // time to turn one degree at rated speed
        let step_ms = libm::ceilf(1000.0 / spec.speed_deg_per_s) as u32;
        let max = spec.max_angle_deg as u32;

        loop {
            for angle in (0..=max).chain((0..max).rev()) {
                let now = Mono::now();
                let pulse_us = spec.pulse_for_angle(angle as f32);
                if angle % 45 == 0 {
                    info!("{} deg -> {} us", angle, pulse_us);
                }
                cx.local.servo.set_pulse_width(pulse_us).unwrap();
                Mono::delay_until(now + step_ms.millis()).await;
            }
        }
    }
}
