use csv::WriterBuilder;
use serde::Serialize;
use servocal_common::{
    CalibrationConfig, CalibrationFailure, CalibrationResult, PartialCalibration, Phase, Sample,
};
use std::error::Error;

use crate::observer::PhaseMark;

pub fn export_to_csv(samples: &[Sample]) -> Result<String, Box<dyn Error>> {
    let mut wtr = WriterBuilder::new().from_writer(vec![]);

    wtr.write_record(["commanded_deg", "pulse_us", "raw_step", "true_deg"])?;

    for sample in samples {
        wtr.write_record(&[
            sample.commanded_deg.to_string(),
            sample.pulse_us.to_string(),
            sample.raw_step.to_string(),
            sample.true_deg.to_string(),
        ])?;
    }

    wtr.flush()?;
    Ok(String::from_utf8(wtr.into_inner()?)?)
}

#[derive(Debug, Clone, Serialize)]
pub struct FailureReport {
    pub phase: Phase,
    pub error: String,
    pub partial: PartialCalibration,
}

impl From<&CalibrationFailure> for FailureReport {
    fn from(failure: &CalibrationFailure) -> Self {
        Self {
            phase: failure.phase,
            error: failure.error.to_string(),
            partial: failure.partial,
        }
    }
}

/// Everything written to the JSON report: the configuration used, the
/// outcome and the phase timeline.
#[derive(Debug, Clone, Serialize)]
pub struct Report<'a> {
    pub config: &'a CalibrationConfig,
    pub result: Option<CalibrationResult>,
    pub failure: Option<FailureReport>,
    pub phases: &'a [PhaseMark],
}

impl<'a> Report<'a> {
    pub fn new(
        config: &'a CalibrationConfig,
        outcome: &Result<CalibrationResult, CalibrationFailure>,
        phases: &'a [PhaseMark],
    ) -> Self {
        let (result, failure) = match outcome {
            Ok(result) => (Some(*result), None),
            Err(failure) => (None, Some(FailureReport::from(failure))),
        };
        Self {
            config,
            result,
            failure,
            phases,
        }
    }
}

pub fn export_report(report: &Report) -> Result<String, Box<dyn Error>> {
    Ok(serde_json::to_string_pretty(report)?)
}

/// Accepts decimal or `0x`-prefixed hex.
pub fn parse_address(s: &str) -> Result<u8, std::num::ParseIntError> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse(),
    }
}
