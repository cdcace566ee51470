use std::collections::HashMap;

use serde::Serialize;

use super::preprocess::BinnedFix;
use super::{PipelineError, PipelineResult};
use crate::geometry::GeometryIndex;
use crate::model::{corridor_feature_index, FeatureRow, SegmentTimeModel};

/// One published prediction: seconds until the vehicle reaches the stop.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StopEta {
    pub stop_id: String,
    pub eta_seconds: f64,
}

/// A synthesized prediction row: the segment ending at `next_stop`.
struct VirtualRow {
    next_stop: String,
    features: FeatureRow,
}

/// Project per-stop arrival times for a window of fixes.
///
/// Each fix spawns a virtual row per downstream stop, continuing onto the
/// paired return trip and halting when the lap closes at the fix's own
/// previous stop. Segment predictions are summed in order, accumulated per
/// stop, and a stop is published only when every fix in the window reached
/// it; the configured percentile of the accumulator is the ETA.
pub fn project_horizon(
    geometry: &GeometryIndex,
    model: &dyn SegmentTimeModel,
    window: &[BinnedFix],
    percentile: f64,
) -> PipelineResult<Vec<StopEta>> {
    let mut accumulators: HashMap<String, Vec<f64>> = HashMap::new();

    for fix in window {
        let rows = virtual_rows(geometry, fix)?;
        let features: Vec<FeatureRow> = rows.iter().map(|row| row.features).collect();
        let predictions = model.predict(&features)?;

        let mut running = 0.0;
        for (row, segment_seconds) in rows.iter().zip(predictions) {
            running += segment_seconds;
            accumulators
                .entry(row.next_stop.clone())
                .or_default()
                .push(running);
        }
    }

    let mut etas: Vec<StopEta> = accumulators
        .into_iter()
        .filter(|(_, arrivals)| arrivals.len() == window.len())
        .map(|(stop_id, mut arrivals)| StopEta {
            stop_id,
            eta_seconds: percentile_of(&mut arrivals, percentile),
        })
        .collect();
    etas.sort_by(|a, b| a.stop_id.cmp(&b.stop_id));
    Ok(etas)
}

fn virtual_rows(geometry: &GeometryIndex, fix: &BinnedFix) -> PipelineResult<Vec<VirtualRow>> {
    let context = &fix.context;
    let lap_anchor = context.prev_stop.as_str();
    let base = feature_row(fix)?;

    // The fix itself is the first row of its own segment.
    let mut rows = vec![VirtualRow {
        next_stop: context.next_stop.clone(),
        features: base,
    }];

    let mut trip = geometry.trip(&context.resolved.trip_id)?;
    for leg in 0..3 {
        let start = if leg == 0 {
            trip.stop_position(&context.next_stop)? + 1
        } else {
            1
        };

        for i in start..trip.stop_sequence.len() {
            let (ref prev_stop, prev_vertex) = trip.stop_sequence[i - 1];
            let (ref next_stop, _) = trip.stop_sequence[i];
            if next_stop.as_str() == lap_anchor {
                return Ok(rows);
            }
            let position = trip.points[prev_vertex];
            rows.push(VirtualRow {
                next_stop: next_stop.clone(),
                features: FeatureRow {
                    next_stop_km: trip.next_stop_cum_km(prev_stop)?,
                    latitude: position.y(),
                    longitude: position.x(),
                    ..base
                },
            });
        }

        match &trip.pair {
            Some(pair) => trip = geometry.trip(pair)?,
            None => break,
        }
    }

    Ok(rows)
}

fn feature_row(fix: &BinnedFix) -> PipelineResult<FeatureRow> {
    let raw = fix.raw();
    let prepared = fix.prepared();
    let corridor = corridor_feature_index(&raw.koridor).ok_or_else(|| {
        PipelineError::Configuration(format!("corridor {} has no model encoding", raw.koridor))
    })?;

    Ok(FeatureRow {
        corridor,
        day: prepared.day as f64,
        hour: prepared.hour as f64,
        heading: raw.gpsheading,
        speed: raw.gpsspeed,
        congestion_bin: fix.congestion_bin as f64,
        next_stop_km: fix.context.next_stop_km,
        latitude: raw.latitude,
        longitude: raw.longitude,
    })
}

/// Percentile with linear interpolation between order statistics.
fn percentile_of(values: &mut [f64], percentile: f64) -> f64 {
    values.sort_by(f64::total_cmp);
    let rank = (values.len() - 1) as f64 * percentile / 100.0;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        values[lower]
    } else {
        values[lower] + (values[upper] - values[lower]) * (rank - lower as f64)
    }
}
