use std::collections::HashMap;

use chrono::{Datelike, NaiveDateTime, Timelike};

use super::stop_context::ContextFix;
use super::{PipelineError, PipelineResult, RawFix};
use crate::schedule::artifacts::StopMeanEtaRow;

/// A fix with its vendor timestamp parsed and time-of-week features derived.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedFix {
    pub raw: RawFix,
    pub timestamp: NaiveDateTime,
    /// Day of week, Monday = 0.
    pub day: u32,
    /// Hour of day, 0-23.
    pub hour: u32,
}

const TIMESTAMP_FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%d/%m/%Y %H:%M:%S"];

fn parse_timestamp(raw: &str) -> PipelineResult<NaiveDateTime> {
    if let Ok(with_offset) = chrono::DateTime::parse_from_rfc3339(raw) {
        return Ok(with_offset.naive_local());
    }
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .ok_or_else(|| PipelineError::Timestamp(raw.to_string()))
}

/// Normalize one vehicle's batch: parse timestamps, derive day/hour, sort
/// ascending by time. Pure, and idempotent over its own output.
pub fn preprocess(batch: Vec<RawFix>) -> PipelineResult<Vec<PreparedFix>> {
    let mut prepared = batch
        .into_iter()
        .map(|raw| {
            let timestamp = parse_timestamp(&raw.gpsdatetime)?;
            Ok(PreparedFix {
                day: timestamp.weekday().num_days_from_monday(),
                hour: timestamp.hour(),
                timestamp,
                raw,
            })
        })
        .collect::<PipelineResult<Vec<_>>>()?;
    prepared.sort_by_key(|fix| fix.timestamp);
    Ok(prepared)
}

/// Congestion bin per global stop sequence index, derived by uniform binning
/// of mean scheduled ETAs over [0, max].
pub struct StopBinning {
    bins: HashMap<i64, u8>,
}

impl StopBinning {
    pub fn build(rows: &[StopMeanEtaRow], num_bins: usize) -> StopBinning {
        let labels = num_bins.saturating_sub(1).max(1);
        let max_eta = rows.iter().map(|row| row.eta).fold(0.0, f64::max);
        let bins = rows
            .iter()
            .map(|row| {
                let bin = if max_eta <= 0.0 {
                    1
                } else {
                    let width = max_eta / labels as f64;
                    ((row.eta / width).ceil() as i64).clamp(1, labels as i64)
                };
                (row.seq, bin as u8)
            })
            .collect();
        StopBinning { bins }
    }

    pub fn bin_for(&self, seq: i64) -> Option<u8> {
        self.bins.get(&seq).copied()
    }
}

/// A fix carrying the congestion bin of its next stop.
#[derive(Debug, Clone)]
pub struct BinnedFix {
    pub context: ContextFix,
    pub congestion_bin: u8,
}

impl BinnedFix {
    pub fn raw(&self) -> &RawFix {
        self.context.raw()
    }

    pub fn prepared(&self) -> &PreparedFix {
        self.context.prepared()
    }
}

pub fn bin_next_stop_congestion(
    batch: Vec<ContextFix>,
    binning: &StopBinning,
) -> PipelineResult<Vec<BinnedFix>> {
    batch
        .into_iter()
        .map(|context| {
            let congestion_bin = binning.bin_for(context.next_stop_seq).ok_or_else(|| {
                PipelineError::Configuration(format!(
                    "no mean eta for stop sequence {}",
                    context.next_stop_seq
                ))
            })?;
            Ok(BinnedFix {
                context,
                congestion_bin,
            })
        })
        .collect()
}
