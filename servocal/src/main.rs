#![no_std]
#![no_main]

/// modules
use servocal::err::log::{err_cal_h, err_i2c_h, err_pwm_h, log_err};
use servocal::observer::BenchObserver;

/// configuration
use defmt_rtt as _;
use panic_probe as _;

/// system
use rtic_monotonics::systick_monotonic;
systick_monotonic!(Mono, 1000);

/// hal
use core::cell::RefCell;
use embedded_hal_bus::i2c::RefCellDevice;
use pwm_pca9685::{Channel, Pca9685};
use servocal_common::hw::as5600::{As5600, DEFAULT_CONF};
use servocal_common::hw::pca9685::{prescale_for, PcaActuator};
use servocal_common::{Actuator, CalibrationConfig, Calibrator};
use stm32f4xx_hal::i2c::I2c1;
use stm32f4xx_hal::prelude::*;
use stm32f4xx_hal::{gpio, pac, timer};

/// type
type I2cBus = RefCellDevice<'static, I2c1>;
type ServoOut = PcaActuator<I2cBus>;
type Encoder = As5600<I2cBus>;
type BenchDelay = timer::Delay<pac::TIM10, 1000>;
type BenchCalibrator = Calibrator<ServoOut, Encoder, BenchDelay>;
type AbortButton = gpio::PA0<gpio::Input>;

const PCA_9685_ADDR: u8 = 0x40;
const SERVO_CHANNEL: Channel = Channel::C0;
const PWM_FREQUENCY_HZ: u32 = 50;
/// info-level sample logging, one in this many
const SAMPLE_LOG_STRIDE: u32 = 10;

static_assertions::const_assert!(PWM_FREQUENCY_HZ >= 24 && PWM_FREQUENCY_HZ <= 1526);

#[rtic::app(device = stm32f4xx_hal::pac, peripherals = true)]
mod app {

    use super::*;
    use rtic_monotonics::Monotonic;

    #[shared]
    struct Shared {}

    #[local]
    struct Local {
        calibrator: Option<BenchCalibrator>,
        observer: BenchObserver<AbortButton>,
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

        // delay
        let tim10 = dp.TIM10.delay_ms(&clocks);

        let gpioa = dp.GPIOA.split();
        let gpiob = dp.GPIOB.split();
        let gpioc = dp.GPIOC.split();

        // I2C1, shared by the PWM driver and the encoder
        let i2c1_scl = gpiob.pb8.into_alternate_open_drain();
        let i2c1_sda = gpiob.pb9.into_alternate_open_drain();
        let i2c1 = I2c1::new(dp.I2C1, (i2c1_scl, i2c1_sda), 400.kHz(), &clocks);
        let bus: &'static RefCell<I2c1> =
            cortex_m::singleton!(: RefCell<I2c1> = RefCell::new(i2c1)).unwrap();

        // PWM
        let pwm = match Pca9685::new(RefCellDevice::new(bus), PCA_9685_ADDR) {
            Ok(pwm) => pwm,
            Err(e) => {
                log_err(err_pwm_h(e));
                panic!();
            }
        };
        let servo = match PcaActuator::new(pwm, SERVO_CHANNEL, prescale_for(PWM_FREQUENCY_HZ)) {
            Ok(servo) => servo,
            Err(e) => {
                log_err(err_pwm_h(e));
                panic!();
            }
        };
        defmt::info!(
            "pwm period {} us, resolution {} us",
            servo.period_us(),
            servo.resolution_us()
        );

        // output enable, active low
        let mut servo_en = gpioc.pc3.into_push_pull_output();
        servo_en.set_low();

        // encoder
        let mut encoder = As5600::new(RefCellDevice::new(bus));
        if let Err(e) = encoder.configure(DEFAULT_CONF) {
            log_err(err_i2c_h(e));
        }
        match encoder.magnet_status() {
            Ok(status) if !status.detected => defmt::warn!("no magnet detected: {}", status),
            Ok(status) => defmt::info!("magnet: {}", status),
            Err(e) => log_err(err_i2c_h(e)),
        }

        let abort = gpioa.pa0.into_pull_up_input();
        let observer = BenchObserver::new(abort, SAMPLE_LOG_STRIDE);

        let calibrator = Calibrator::new(
            servo,
            encoder,
            tim10,
            CalibrationConfig::pca9685_bench(),
        );
        defmt::info!("config: {}", calibrator.config());

        (
            Shared {},
            Local {
                calibrator: Some(calibrator),
                observer,
            },
        )
    }

    #[idle(local = [calibrator, observer])]
    fn idle(cx: idle::Context) -> ! {
        if let Some(mut calibrator) = cx.local.calibrator.take() {
            let start = Mono::now();
            let outcome = calibrator.run(cx.local.observer);
            let took = Mono::now() - start;
            defmt::info!(
                "run took {} ms, {} samples",
                took.to_millis(),
                cx.local.observer.samples()
            );

            let mid = calibrator.config().servo.mid_pulse_us();
            let park_us = match outcome {
                Ok(result) => {
                    defmt::info!("{}", result);
                    libm::roundf(result.corrected_pulse_us(mid as f32)) as u16
                }
                Err(failure) => {
                    log_err(err_cal_h(&failure));
                    defmt::info!("partial: {}", failure.partial);
                    mid
                }
            };

            let (mut servo, _encoder, _delay) = calibrator.release();
            match servo.set_pulse_width(park_us) {
                Ok(()) => defmt::info!("parked at {} us", park_us),
                Err(e) => log_err(err_pwm_h(e)),
            }
        }

        loop {
            cortex_m::asm::wfi();
        }
    }
}
