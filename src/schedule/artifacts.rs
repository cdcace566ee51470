use std::collections::HashMap;

use serde::Deserialize;

/// Precomputed per-trip geometry: the full shape, a status column aligned
/// with the shape ("." for a plain vertex, a stop id for a stop boundary),
/// the paired opposite trip, and the legacy per-stop distance table.
#[derive(Debug, Clone, Deserialize)]
pub struct TripMapEntry {
    /// Shape vertices as [lat, lon] pairs.
    pub shape: Vec<[f64; 2]>,
    pub status: Vec<String>,
    pub pair: Option<String>,
    /// Upstream ships (stop time, cumulative next-stop km) per stop. The
    /// distances are re-derived from the shape at build time, so this column
    /// is accepted but not read.
    #[serde(default)]
    pub jarak: HashMap<String, (f64, f64)>,
}

/// Mean scheduled ETA per global stop sequence index, in seconds from the
/// start of the trip.
#[derive(Debug, Clone, Deserialize)]
pub struct StopMeanEtaRow {
    pub seq: i64,
    pub eta: f64,
}

/// One row per shape vertex per directional trip: the stops behind and
/// ahead of that vertex.
#[derive(Debug, Clone, Deserialize)]
pub struct NextPrevRow {
    pub koridor: String,
    pub trip: String,
    pub lat: f64,
    pub lon: f64,
    pub next_stop: String,
    pub prev_stop: String,
    pub next_stop_seq: i64,
    pub prev_stop_seq: i64,
}
