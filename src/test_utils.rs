use std::collections::HashMap;

use chrono::{Duration, NaiveDate};

use crate::config::Config;
use crate::geometry::GeometryIndex;
use crate::model::{FeatureRow, ModelResult, SegmentTimeModel};
use crate::pipeline::adherence::route_adherence;
use crate::pipeline::direction::resolve_directions;
use crate::pipeline::preprocess::{
    bin_next_stop_congestion, preprocess, BinnedFix, StopBinning,
};
use crate::pipeline::stop_context::resolve_stop_context;
use crate::pipeline::RawFix;
use crate::schedule::artifacts::{NextPrevRow, StopMeanEtaRow, TripMapEntry};
use crate::schedule::tables::{RouteRow, ShapeRow, StopRow, StopTimeRow, TripRow};
use crate::schedule::Schedule;

pub fn config() -> Config {
    Config::from_env()
}

/// A one-corridor schedule: two mutually paired directional shapes running
/// along the equator, a tenth of a degree long, the return shape offset a
/// thousandth of a degree north.
///
/// Outbound `4B-R01_shp` stops: A1@v0, A2@v2, A3@v4, A4@v5.
/// Return `4B-R02_shp` stops: B1@v0, B2@v3, B3@v5.
pub fn schedule() -> Schedule {
    let outbound_lons = [0.00, 0.01, 0.02, 0.03, 0.04, 0.05];
    let return_lons = [0.05, 0.04, 0.03, 0.02, 0.01, 0.00];

    let trip_map = HashMap::from([
        (
            "4B-R01_shp".to_string(),
            TripMapEntry {
                shape: outbound_lons.iter().map(|lon| [0.0, *lon]).collect(),
                status: ["A1", ".", "A2", ".", "A3", "A4"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                pair: Some("4B-R02_shp".to_string()),
                jarak: HashMap::new(),
            },
        ),
        (
            "4B-R02_shp".to_string(),
            TripMapEntry {
                shape: return_lons.iter().map(|lon| [0.001, *lon]).collect(),
                status: ["B1", ".", ".", "B2", ".", "B3"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                pair: Some("4B-R01_shp".to_string()),
                jarak: HashMap::new(),
            },
        ),
    ]);

    let outbound_pairs = [
        ("A1", 0, "A2", 1),
        ("A1", 0, "A2", 1),
        ("A2", 1, "A3", 2),
        ("A2", 1, "A3", 2),
        ("A3", 2, "A4", 3),
        ("A3", 2, "A4", 3),
    ];
    let return_pairs = [
        ("B1", 4, "B2", 5),
        ("B1", 4, "B2", 5),
        ("B1", 4, "B2", 5),
        ("B2", 5, "B3", 6),
        ("B2", 5, "B3", 6),
        ("B2", 5, "B3", 6),
    ];

    let mut next_prev = Vec::new();
    for (vertex, (prev, prev_seq, next, next_seq)) in outbound_pairs.iter().enumerate() {
        next_prev.push(NextPrevRow {
            koridor: "4B".to_string(),
            trip: "4B-R01_shp".to_string(),
            lat: 0.0,
            lon: outbound_lons[vertex],
            next_stop: next.to_string(),
            prev_stop: prev.to_string(),
            next_stop_seq: *next_seq,
            prev_stop_seq: *prev_seq,
        });
    }
    for (vertex, (prev, prev_seq, next, next_seq)) in return_pairs.iter().enumerate() {
        next_prev.push(NextPrevRow {
            koridor: "4B".to_string(),
            trip: "4B-R02_shp".to_string(),
            lat: 0.001,
            lon: return_lons[vertex],
            next_stop: next.to_string(),
            prev_stop: prev.to_string(),
            next_stop_seq: *next_seq,
            prev_stop_seq: *prev_seq,
        });
    }

    let stop_mean_eta = (0..7)
        .map(|seq| StopMeanEtaRow {
            seq,
            eta: seq as f64 * 600.0,
        })
        .collect();

    let stop = |id: &str, lat: f64, lon: f64| StopRow {
        stop_id: id.to_string(),
        stop_name: format!("Stop {id}"),
        stop_lat: lat,
        stop_lon: lon,
    };

    let stop_time = |trip: &str, stop: &str, seq: u32| StopTimeRow {
        trip_id: trip.to_string(),
        stop_id: stop.to_string(),
        stop_sequence: seq,
    };

    let mut shapes = Vec::new();
    for (sequence, lon) in outbound_lons.iter().enumerate() {
        shapes.push(ShapeRow {
            shape_id: "4B-R01_shp".to_string(),
            shape_pt_sequence: sequence as u32,
            shape_pt_lat: 0.0,
            shape_pt_lon: *lon,
        });
    }
    for (sequence, lon) in return_lons.iter().enumerate() {
        shapes.push(ShapeRow {
            shape_id: "4B-R02_shp".to_string(),
            shape_pt_sequence: sequence as u32,
            shape_pt_lat: 0.001,
            shape_pt_lon: *lon,
        });
    }

    Schedule {
        routes: vec![RouteRow {
            route_id: "4B".to_string(),
            route_color: "D93A36".to_string(),
            route_text_color: "FFFFFF".to_string(),
        }],
        trips: vec![
            TripRow {
                trip_id: "4B-R01".to_string(),
                route_id: "4B".to_string(),
                trip_headsign: "Kalideres - Senen".to_string(),
                direction_id: 0,
                shape_id: "4B-R01_shp".to_string(),
            },
            TripRow {
                trip_id: "4B-R02".to_string(),
                route_id: "4B".to_string(),
                trip_headsign: "Senen - Kalideres".to_string(),
                direction_id: 1,
                shape_id: "4B-R02_shp".to_string(),
            },
        ],
        stops: vec![
            stop("A1", 0.0, 0.00),
            stop("A2", 0.0, 0.02),
            stop("A3", 0.0, 0.04),
            stop("A4", 0.0, 0.05),
            stop("B1", 0.001, 0.05),
            stop("B2", 0.001, 0.02),
            stop("B3", 0.001, 0.00),
        ],
        stop_times: vec![
            stop_time("4B-R01", "A1", 1),
            stop_time("4B-R01", "A2", 2),
            stop_time("4B-R01", "A3", 3),
            stop_time("4B-R01", "A4", 4),
            stop_time("4B-R02", "B1", 1),
            stop_time("4B-R02", "B2", 2),
            stop_time("4B-R02", "B3", 3),
        ],
        shapes,
        trip_map,
        stop_mean_eta,
        next_prev,
    }
}

pub fn geometry() -> GeometryIndex {
    GeometryIndex::build(&schedule()).unwrap()
}

pub fn binning() -> StopBinning {
    StopBinning::build(&schedule().stop_mean_eta, 8)
}

/// A fix on corridor 4B, `seconds` after the base instant (a Monday, 08:30
/// local). The vendor trip id has no static override.
pub fn fix_at(lon: f64, lat: f64, seconds: u32, is_new: bool) -> RawFix {
    let timestamp = NaiveDate::from_ymd_opt(2024, 3, 4)
        .unwrap()
        .and_hms_opt(8, 30, 0)
        .unwrap()
        + Duration::seconds(seconds as i64);
    RawFix {
        bus_code: "TJ3845".to_string(),
        koridor: "4B".to_string(),
        trip_id: "4B.X99".to_string(),
        gpsdatetime: timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
        latitude: lat,
        longitude: lon,
        gpsheading: 90.0,
        gpsspeed: 30.0,
        is_new,
    }
}

/// Run a batch through every stage up to (excluding) the horizon projector.
pub fn binned_window(fixes: Vec<RawFix>) -> Vec<BinnedFix> {
    let geometry = geometry();
    let config = config();
    let prepared = preprocess(fixes).unwrap();
    let adhering =
        route_adherence(&geometry, "4B", prepared, config.on_route_threshold_m).unwrap();
    let resolved =
        resolve_directions(&geometry, "4B", &config.trip_overrides, adhering, &config).unwrap();
    let contexts = resolve_stop_context(&geometry, "4B", resolved).unwrap();
    bin_next_stop_congestion(contexts, &binning()).unwrap()
}

/// Deterministic stand-in for the trained regressor.
pub struct StubModel {
    fast_seconds: f64,
    slow_seconds: f64,
}

impl StubModel {
    pub fn constant(seconds: f64) -> StubModel {
        StubModel {
            fast_seconds: seconds,
            slow_seconds: seconds,
        }
    }

    /// Rows with speed under 20 km/h score `slow_seconds`, others
    /// `fast_seconds`.
    pub fn speed_stepped(fast_seconds: f64, slow_seconds: f64) -> StubModel {
        StubModel {
            fast_seconds,
            slow_seconds,
        }
    }
}

impl SegmentTimeModel for StubModel {
    fn predict(&self, rows: &[FeatureRow]) -> ModelResult<Vec<f64>> {
        Ok(rows
            .iter()
            .map(|row| {
                if row.speed < 20.0 {
                    self.slow_seconds
                } else {
                    self.fast_seconds
                }
            })
            .collect())
    }
}
