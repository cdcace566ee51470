pub mod adherence;
pub mod direction;
pub mod horizon;
pub mod preprocess;
pub mod stop_context;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::geometry::{GeometryError, GeometryIndex};
use crate::model::{ModelError, SegmentTimeModel};
use adherence::route_adherence;
use direction::resolve_directions;
use horizon::{project_horizon, StopEta};
use preprocess::{bin_next_stop_congestion, preprocess, StopBinning};
use stop_context::resolve_stop_context;

/// One GPS sample as ingested from the vendor or replayed from history.
/// `is_new` marks samples first seen this polling tick; it is not persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawFix {
    pub bus_code: String,
    pub koridor: String,
    pub trip_id: String,
    pub gpsdatetime: String,
    pub latitude: f64,
    pub longitude: f64,
    pub gpsheading: f64,
    pub gpsspeed: f64,
    #[serde(skip)]
    pub is_new: bool,
}

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("Vehicle is off route")]
    OffRoute,

    #[error("No fresh gps data")]
    NoFreshData,

    #[error("Insufficient history: {0} fixes")]
    InsufficientHistory(usize),

    #[error("No trip direction could be committed")]
    DirectionUnresolved,

    #[error("Unparseable gps timestamp: {0}")]
    Timestamp(String),

    #[error("Predictor failure: {0}")]
    Predictor(#[from] ModelError),

    #[error(transparent)]
    Geometry(#[from] GeometryError),

    #[error("Static data gap: {0}")]
    Configuration(String),
}

impl PipelineError {
    /// Expected per-vehicle conditions: the tick yields no result for the
    /// vehicle and that is not worth an error-level log line.
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            PipelineError::OffRoute
                | PipelineError::NoFreshData
                | PipelineError::InsufficientHistory(_)
                | PipelineError::DirectionUnresolved
        )
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;

/// The per-vehicle output of one tick: the resolved context of the most
/// recent fix plus the ETA for every publishable downstream stop.
#[derive(Debug, Clone)]
pub struct VehicleEtas {
    pub bus_code: String,
    pub corridor: String,
    pub trip_id: String,
    pub prev_stop: String,
    pub next_stop: String,
    pub next_stop_km: f64,
    pub latest: RawFix,
    pub timestamp: NaiveDateTime,
    pub etas: Vec<StopEta>,
}

/// Run the full pipeline for one vehicle's window of fixes.
///
/// Reads only the shared immutable indexes; safe to call concurrently
/// across vehicles.
pub fn run_vehicle(
    geometry: &GeometryIndex,
    binning: &StopBinning,
    model: &dyn SegmentTimeModel,
    config: &Config,
    batch: Vec<RawFix>,
) -> PipelineResult<VehicleEtas> {
    let mut prepared = preprocess(batch)?;

    if !prepared.iter().any(|fix| fix.raw.is_new) {
        return Err(PipelineError::NoFreshData);
    }
    if prepared.len() > config.history_cap {
        let excess = prepared.len() - config.history_cap;
        prepared.drain(..excess);
    }
    if prepared.len() < config.min_window {
        return Err(PipelineError::InsufficientHistory(prepared.len()));
    }

    let latest = prepared
        .last()
        .ok_or(PipelineError::InsufficientHistory(0))?;
    let corridor = latest.raw.koridor.clone();
    let bus_code = latest.raw.bus_code.clone();

    let adhering = route_adherence(geometry, &corridor, prepared, config.on_route_threshold_m)?;
    match adhering.last() {
        Some(last) if last.on_route => {}
        _ => return Err(PipelineError::OffRoute),
    }

    let resolved = resolve_directions(
        geometry,
        &corridor,
        &config.trip_overrides,
        adhering,
        config,
    )?;
    let contexts = resolve_stop_context(geometry, &corridor, resolved)?;
    let window = bin_next_stop_congestion(contexts, binning)?;

    let etas = project_horizon(geometry, model, &window, config.eta_percentile)?;

    let last = window
        .last()
        .ok_or(PipelineError::InsufficientHistory(0))?;
    Ok(VehicleEtas {
        bus_code,
        corridor,
        trip_id: last.context.resolved.trip_id.clone(),
        prev_stop: last.context.prev_stop.clone(),
        next_stop: last.context.next_stop.clone(),
        next_stop_km: last.context.next_stop_km,
        latest: last.raw().clone(),
        timestamp: last.prepared().timestamp,
        etas,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_utils;

    fn run(batch: Vec<RawFix>) -> PipelineResult<VehicleEtas> {
        let geometry = test_utils::geometry();
        let binning = test_utils::binning();
        let config = test_utils::config();
        let model = test_utils::StubModel::constant(60.0);
        run_vehicle(&geometry, &binning, &model, &config, batch)
    }

    #[test]
    fn test_short_history_is_skipped() {
        let batch: Vec<RawFix> = (0..9)
            .map(|i| test_utils::fix_at(0.02, 0.00045, i * 10, i == 8))
            .collect();
        assert!(matches!(
            run(batch),
            Err(PipelineError::InsufficientHistory(9))
        ));
    }

    #[test]
    fn test_stale_window_is_skipped() {
        let batch: Vec<RawFix> = (0..12)
            .map(|i| test_utils::fix_at(0.02, 0.00045, i * 10, false))
            .collect();
        assert!(matches!(run(batch), Err(PipelineError::NoFreshData)));
    }

    #[test]
    fn test_off_route_last_fix_aborts() {
        let mut batch: Vec<RawFix> = (0..11)
            .map(|i| test_utils::fix_at(0.02, 0.00045, i * 10, false))
            .collect();
        batch.push(test_utils::fix_at(0.02, 0.05, 110, true));
        assert!(matches!(run(batch), Err(PipelineError::OffRoute)));
    }

    #[test]
    fn test_static_idle_vehicle_predicts_from_first_context() {
        let batch: Vec<RawFix> = (0..12)
            .map(|i| test_utils::fix_at(0.02, 0.00045, i * 10, i == 11))
            .collect();
        let outcome = run(batch).unwrap();

        assert_eq!(outcome.trip_id, "4B-R01_shp");
        assert_eq!(outcome.prev_stop, "A2");
        assert_eq!(outcome.next_stop, "A3");
        let stops: Vec<&str> = outcome.etas.iter().map(|eta| eta.stop_id.as_str()).collect();
        assert_eq!(stops, vec!["A3", "A4", "B2", "B3"]);
    }

    #[test]
    fn test_vendor_override_resolves_without_voting() {
        let batch: Vec<RawFix> = (0..12)
            .map(|i| {
                let mut fix = test_utils::fix_at(0.02, 0.00045, i * 10, i == 11);
                fix.trip_id = "4.B001".to_string();
                fix
            })
            .collect();
        let outcome = run(batch).unwrap();
        assert_eq!(outcome.trip_id, "4B-R01_shp");
    }

    #[test]
    fn test_window_is_capped_to_most_recent_fixes() {
        // 25 fixes: only the newest 20 survive. The oldest five sit far off
        // route but are trimmed away before adherence runs.
        let mut batch: Vec<RawFix> = (0..5)
            .map(|i| test_utils::fix_at(0.02, 0.05, i * 10, false))
            .collect();
        batch.extend((5..25).map(|i| test_utils::fix_at(0.02, 0.00045, i * 10, i == 24)));
        let outcome = run(batch).unwrap();
        assert_eq!(outcome.next_stop, "A3");
    }

    #[test]
    fn test_identical_runs_are_identical() {
        let batch: Vec<RawFix> = (0..12)
            .map(|i| test_utils::fix_at(0.02, 0.00045, i * 10, i == 11))
            .collect();
        let a = run(batch.clone()).unwrap();
        let b = run(batch).unwrap();
        assert_eq!(a.etas, b.etas);
    }
}
