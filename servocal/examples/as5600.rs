#![no_std]
#![no_main]

use cortex_m_rt::entry;
use embedded_hal::delay::DelayNs;
use defmt_rtt as _;
use panic_probe as _;

use servocal_common::hw::as5600::{As5600, AS5600_ADDR, DEFAULT_CONF};
use stm32f4xx_hal::{i2c::I2c1, pac, prelude::*};

const VALID_ADDR_RANGE: core::ops::Range<u8> = 0x08..0x78;

#[entry]
fn main() -> ! {
    let dp = pac::Peripherals::take().unwrap();
    let rcc = dp.RCC.constrain();
    let clocks = rcc.cfgr.use_hse(16.MHz()).sysclk(64.MHz()).freeze();
    let mut delay = dp.TIM10.delay_ms(&clocks);

    let gpiob = dp.GPIOB.split();
    let scl = gpiob.pb8.into_alternate_open_drain();
    let sda = gpiob.pb9.into_alternate_open_drain();
    let mut i2c = I2c1::new(dp.I2C1, (scl, sda), 400.kHz(), &clocks);

    defmt::info!("scanning i2c1...");
    for addr in VALID_ADDR_RANGE {
        if i2c.write(addr, &[0u8]).is_ok() {
            defmt::info!("found 0x{:02x}", addr);
        }
    }

    let mut encoder = As5600::new(i2c);
    if let Err(e) = encoder.configure(DEFAULT_CONF) {
        defmt::error!("AS5600 at 0x{:02x} not responding: {}", AS5600_ADDR, e);
    }

    loop {
        match (encoder.magnet_status(), encoder.raw_angle(), encoder.angle()) {
            (Ok(status), Ok(raw), Ok(angle)) => {
                defmt::info!("{} raw {} angle {}", status, raw, angle)
            }
            _ => defmt::error!("read failed"),
        }
        delay.delay_ms(250);
    }
}
