use std::cell::RefCell;
use std::error::Error;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::PathBuf;

use clap::Parser;
use embedded_hal::delay::DelayNs;
use embedded_hal_bus::i2c::RefCellDevice;
use log::{error, info, warn};
use pwm_pca9685::Pca9685;
use rppal::hal::Delay;
use rppal::i2c::I2c;
use servocal_common::hw::as5600::{As5600, DEFAULT_CONF};
use servocal_common::hw::pca9685::{channel, prescale_for, PcaActuator};
use servocal_common::sim::{SimDelay, SimParams, SimServo};
use servocal_common::{
    Actuator, AngleSensor, CalibrationConfig, CalibrationFailure, CalibrationResult, Calibrator,
};

// Modules
mod observer;
mod utils;

use observer::RecordingObserver;
use utils::{export_report, export_to_csv, parse_address, Report};

/// Closed-loop servo calibration: finds the mechanical endpoints, normalizes
/// the pulse range and maps commanded against measured angle.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON calibration config; missing fields take their defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run against the simulated servo instead of the I2C hardware
    #[arg(long)]
    simulate: bool,

    /// I2C bus number (/dev/i2c-N)
    #[arg(long, default_value = "1")]
    bus: u8,

    /// PCA9685 address, decimal or 0x-prefixed
    #[arg(long, default_value = "0x40", value_parser = parse_address)]
    pca_address: u8,

    /// PCA9685 output channel driving the servo
    #[arg(long, default_value = "0")]
    channel: u8,

    /// PWM frequency in Hz, within what the PCA9685 prescaler can reach
    #[arg(long, default_value = "50", value_parser = clap::value_parser!(u32).range(24..=1526))]
    frequency: u32,

    /// Where to write the JSON report
    #[arg(short, long, default_value = "calibration.json")]
    output: PathBuf,

    /// Also write the error-mapping samples as CSV
    #[arg(short, long)]
    samples: Option<PathBuf>,

    /// Cancel once this many error-mapping samples are taken
    #[arg(long)]
    sample_limit: Option<usize>,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = load_config(&args)?;
    let mut observer = RecordingObserver::new(args.sample_limit);

    let outcome = if args.simulate {
        info!("running against the simulated servo");
        let servo = SimServo::new(SimParams::default());
        let calibrator =
            Calibrator::new(servo.actuator(), servo.sensor(), SimDelay::default(), config);
        calibrate_and_park(calibrator, &mut observer)
    } else {
        let bus = RefCell::new(I2c::with_bus(args.bus)?);
        let channel = channel(args.channel).ok_or("channel must be 0..=15")?;

        let pwm = Pca9685::new(RefCellDevice::new(&bus), args.pca_address)
            .map_err(|e| format!("PCA9685 at 0x{:02x}: {:?}", args.pca_address, e))?;
        let servo = PcaActuator::new(pwm, channel, prescale_for(args.frequency))
            .map_err(|e| format!("PCA9685 setup: {:?}", e))?;
        info!(
            "PCA9685 at 0x{:02x}, channel {}, period {} us",
            args.pca_address,
            args.channel,
            servo.period_us()
        );

        let mut encoder = As5600::new(RefCellDevice::new(&bus));
        encoder.configure(DEFAULT_CONF)?;
        let status = encoder.magnet_status()?;
        if !status.detected {
            warn!("AS5600 reports no magnet: {:?}", status);
        }

        let calibrator = Calibrator::new(servo, encoder, Delay::new(), config);
        calibrate_and_park(calibrator, &mut observer)
    };

    let report = Report::new(&config, &outcome, &observer.phases);
    fs::write(&args.output, export_report(&report)?)?;
    info!("report written to {}", args.output.display());

    if let Some(path) = &args.samples {
        fs::write(path, export_to_csv(&observer.samples)?)?;
        info!("{} samples written to {}", observer.samples.len(), path.display());
    }

    match outcome {
        Ok(result) => {
            println!(
                "measured pulse range : {} .. {} us",
                result.measured_min_pulse_us(),
                result.measured_max_pulse_us()
            );
            println!("pwm offset           : {} us", result.pwm_offset_us());
            println!("pwm multiplier       : {}", result.pwm_multiplier());
            println!("angle offset         : {} deg", result.dc_offset_deg());
            println!("angle multiplier     : {}", result.dc_multiplier());
            Ok(())
        }
        Err(failure) => Err(failure.into()),
    }
}

fn load_config(args: &Args) -> Result<CalibrationConfig, Box<dyn Error>> {
    match &args.config {
        Some(path) => {
            let reader = BufReader::new(File::open(path)?);
            Ok(serde_json::from_reader(reader)?)
        }
        None if args.simulate => Ok(CalibrationConfig::default()),
        None => Ok(CalibrationConfig::pca9685_bench()),
    }
}

/// Runs the calibration, then leaves the servo at its midpoint: corrected if
/// the run succeeded, nominal otherwise.
fn calibrate_and_park<A, S, D>(
    mut calibrator: Calibrator<A, S, D>,
    observer: &mut RecordingObserver,
) -> Result<CalibrationResult, CalibrationFailure>
where
    A: Actuator,
    S: AngleSensor,
    D: DelayNs,
{
    let outcome = calibrator.run(observer);

    let mid = calibrator.config().servo.mid_pulse_us();
    let park_us = match &outcome {
        Ok(result) => result.corrected_pulse_us(mid as f32).round() as u16,
        Err(failure) => {
            error!("{}", failure);
            mid
        }
    };

    let (mut actuator, _sensor, _delay) = calibrator.release();
    match actuator.set_pulse_width(park_us) {
        Ok(()) => info!("parked at {} us", park_us),
        Err(e) => error!("could not park the servo: {:?}", e),
    }

    outcome
}
