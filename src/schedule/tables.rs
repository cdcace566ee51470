use serde::{Deserialize, Serialize};

/// Rows of the static schedule tables, one struct per file.
///
/// Only the columns the service consumes are kept; extra columns in the
/// source files are ignored.

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteRow {
    pub route_id: String,
    pub route_color: String,
    pub route_text_color: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripRow {
    pub trip_id: String,
    pub route_id: String,
    pub trip_headsign: String,
    pub direction_id: u8,
    pub shape_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopRow {
    pub stop_id: String,
    pub stop_name: String,
    pub stop_lat: f64,
    pub stop_lon: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopTimeRow {
    pub trip_id: String,
    pub stop_id: String,
    pub stop_sequence: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShapeRow {
    pub shape_id: String,
    pub shape_pt_sequence: u32,
    pub shape_pt_lat: f64,
    pub shape_pt_lon: f64,
}
