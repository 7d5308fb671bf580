// Software stand-ins for the servo rig.
//
// `SimServo` models a horn that follows the commanded pulse width linearly
// between two mechanical stops and an encoder that reads it, including the
// encoder's zero register. The scripted and recording doubles drive the
// sweep in isolation.

use std::cell::RefCell;
use std::rc::Rc;

use embedded_hal::delay::DelayNs;

use crate::{Actuator, AngleSensor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimError {
    /// A scripted sensor ran out of readings.
    Exhausted,
    /// Injected bus fault.
    Bus,
}

/// Delay that only keeps count.
#[derive(Debug, Default)]
pub struct SimDelay {
    elapsed_ns: u64,
}

impl SimDelay {
    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ns / 1_000_000
    }
}

impl DelayNs for SimDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.elapsed_ns += ns as u64;
    }
}

/// Actuator that records every command.
#[derive(Debug, Default)]
pub struct RecordingActuator {
    pub commands: Vec<u16>,
}

impl Actuator for RecordingActuator {
    type Error = SimError;

    fn set_pulse_width(&mut self, pulse_us: u16) -> Result<(), SimError> {
        self.commands.push(pulse_us);
        Ok(())
    }
}

/// Sensor that replays a fixed list of readings.
#[derive(Debug)]
pub struct ScriptedSensor {
    readings: Vec<u16>,
    next: usize,
    counting: Option<u16>,
}

impl ScriptedSensor {
    pub fn new(readings: &[u16]) -> Self {
        Self {
            readings: readings.to_vec(),
            next: 0,
            counting: None,
        }
    }

    /// A sensor whose reading changes on every call and never repeats
    /// consecutively.
    pub fn counting(start: u16) -> Self {
        Self {
            readings: Vec::new(),
            next: 0,
            counting: Some(start),
        }
    }
}

impl AngleSensor for ScriptedSensor {
    type Error = SimError;

    fn read_step(&mut self) -> Result<u16, SimError> {
        if let Some(value) = self.counting.as_mut() {
            let reading = *value;
            *value = value.wrapping_add(1) % 4096;
            return Ok(reading);
        }
        let reading = self.readings.get(self.next).copied();
        self.next += 1;
        reading.ok_or(SimError::Exhausted)
    }

    fn zero(&mut self) -> Result<(), SimError> {
        Ok(())
    }
}

/// Physical parameters of a simulated servo.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimParams {
    /// Pulse widths beyond which the horn no longer moves.
    pub stall_low_us: u16,
    pub stall_high_us: u16,
    /// Real horn rotation per microsecond of pulse width.
    pub degrees_per_us: f32,
    /// Angle of the magnet, as seen by the encoder, at the low stop.
    pub mount_deg: f32,
    pub resolution: u16,
    /// Add one step on every other read, so no two readings ever match.
    pub jitter: bool,
    /// The encoder reports the same value whatever the horn does.
    pub frozen: bool,
    /// Reads after this many succeed fail with a bus error.
    pub fail_after_reads: Option<u32>,
}

impl Default for SimParams {
    fn default() -> Self {
        Self {
            stall_low_us: 520,
            stall_high_us: 2470,
            degrees_per_us: 0.135,
            mount_deg: 100.0,
            resolution: 4096,
            jitter: false,
            frozen: false,
            fail_after_reads: None,
        }
    }
}

#[derive(Debug)]
struct Mechanism {
    params: SimParams,
    pulse_us: u16,
    zero_step: u16,
    reads: u32,
    zeroed: u32,
}

impl Mechanism {
    fn horn_deg(&self) -> f32 {
        let p = self.params;
        let pulse = self.pulse_us.clamp(p.stall_low_us, p.stall_high_us);
        (pulse - p.stall_low_us) as f32 * p.degrees_per_us + p.mount_deg
    }

    fn absolute_step(&self) -> u16 {
        let res = self.params.resolution as f32;
        let steps = libm::roundf(self.horn_deg() * res / 360.0);
        (steps.rem_euclid(res)) as u16
    }
}

/// Simulated servo + encoder pair. Clone the handles out with
/// [`SimServo::actuator`] and [`SimServo::sensor`].
#[derive(Debug, Clone)]
pub struct SimServo {
    mechanism: Rc<RefCell<Mechanism>>,
}

impl SimServo {
    pub fn new(params: SimParams) -> Self {
        Self {
            mechanism: Rc::new(RefCell::new(Mechanism {
                params,
                pulse_us: 1500,
                zero_step: 0,
                reads: 0,
                zeroed: 0,
            })),
        }
    }

    pub fn actuator(&self) -> SimActuator {
        SimActuator {
            mechanism: self.mechanism.clone(),
        }
    }

    pub fn sensor(&self) -> SimSensor {
        SimSensor {
            mechanism: self.mechanism.clone(),
        }
    }

    pub fn pulse_us(&self) -> u16 {
        self.mechanism.borrow().pulse_us
    }

    pub fn zero_count(&self) -> u32 {
        self.mechanism.borrow().zeroed
    }

    /// Horn angle relative to the low mechanical stop.
    pub fn horn_deg(&self) -> f32 {
        let m = self.mechanism.borrow();
        m.horn_deg() - m.params.mount_deg
    }
}

pub struct SimActuator {
    mechanism: Rc<RefCell<Mechanism>>,
}

impl Actuator for SimActuator {
    type Error = SimError;

    fn set_pulse_width(&mut self, pulse_us: u16) -> Result<(), SimError> {
        self.mechanism.borrow_mut().pulse_us = pulse_us;
        Ok(())
    }
}

pub struct SimSensor {
    mechanism: Rc<RefCell<Mechanism>>,
}

impl AngleSensor for SimSensor {
    type Error = SimError;

    fn read_step(&mut self) -> Result<u16, SimError> {
        let mut m = self.mechanism.borrow_mut();
        if let Some(limit) = m.params.fail_after_reads {
            if m.reads >= limit {
                return Err(SimError::Bus);
            }
        }
        m.reads += 1;
        if m.params.frozen {
            return Ok(m.zero_step);
        }
        let res = m.params.resolution;
        let relative = (m.absolute_step() + res - m.zero_step) % res;
        let jitter = (m.params.jitter && m.reads % 2 == 0) as u16;
        Ok((relative + jitter) % res)
    }

    fn zero(&mut self) -> Result<(), SimError> {
        let mut m = self.mechanism.borrow_mut();
        m.zero_step = m.absolute_step();
        m.zeroed += 1;
        Ok(())
    }
}
