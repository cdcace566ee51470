use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use geo::Point;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::artifacts::{NextPrevRow, StopMeanEtaRow, TripMapEntry};
use super::tables::{RouteRow, ShapeRow, StopRow, StopTimeRow, TripRow};
use super::{ScheduleError, ScheduleResult};
use crate::geometry::distance::ground_distance_km;

/// Static schedule data, loaded once at startup and filtered down to the
/// corridor whitelist. Immutable afterwards.
pub struct Schedule {
    pub routes: Vec<RouteRow>,
    pub trips: Vec<TripRow>,
    pub stops: Vec<StopRow>,
    pub stop_times: Vec<StopTimeRow>,
    pub shapes: Vec<ShapeRow>,
    pub trip_map: HashMap<String, TripMapEntry>,
    pub stop_mean_eta: Vec<StopMeanEtaRow>,
    pub next_prev: Vec<NextPrevRow>,
}

/// Route as returned by the API.
#[derive(Debug, Clone, Serialize)]
pub struct RouteSummary {
    pub id: String,
    pub color: String,
    pub text_color: String,
    pub origin: String,
    pub destination: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TripDetail {
    pub id: String,
    pub route: String,
    pub direction: u8,
    pub num_stops: usize,
    pub distance_km: f64,
    pub origin: String,
    pub destination: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TripStop {
    pub id: String,
    pub order: u32,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
}

impl Schedule {
    pub fn load(dir: &Path, corridors: &[String]) -> ScheduleResult<Schedule> {
        let routes: Vec<RouteRow> = read_table(&dir.join("routes.txt"))?;
        let trips: Vec<TripRow> = read_table(&dir.join("trips.txt"))?;
        let stops: Vec<StopRow> = read_table(&dir.join("stops.txt"))?;
        let stop_times: Vec<StopTimeRow> = read_table(&dir.join("stop_times.txt"))?;
        let shapes: Vec<ShapeRow> = read_table(&dir.join("shapes.txt"))?;

        let trip_map: HashMap<String, TripMapEntry> = read_artifact(&dir.join("trip_map.json"))?;
        let stop_mean_eta: Vec<StopMeanEtaRow> = read_artifact(&dir.join("stop_mean_eta.json"))?;
        let next_prev: Vec<NextPrevRow> = read_artifact(&dir.join("next_prev.json"))?;

        let routes: Vec<_> = routes
            .into_iter()
            .filter(|r| corridors.contains(&r.route_id))
            .collect();
        let trips: Vec<_> = trips
            .into_iter()
            .filter(|t| corridors.contains(&t.route_id))
            .collect();

        for corridor in corridors {
            if !trips.iter().any(|t| &t.route_id == corridor) {
                return Err(ScheduleError::EmptyCorridor(corridor.clone()));
            }
        }

        let trip_ids: Vec<&str> = trips.iter().map(|t| t.trip_id.as_str()).collect();
        let stop_times: Vec<_> = stop_times
            .into_iter()
            .filter(|st| trip_ids.contains(&st.trip_id.as_str()))
            .collect();

        let mut shapes: Vec<_> = shapes
            .into_iter()
            .filter(|s| trips.iter().any(|t| t.shape_id == s.shape_id))
            .collect();
        shapes.sort_by(|a, b| {
            (&a.shape_id, a.shape_pt_sequence).cmp(&(&b.shape_id, b.shape_pt_sequence))
        });

        log::info!(
            "Loaded schedule: {} routes, {} trips, {} stops, {} shape points",
            routes.len(),
            trips.len(),
            stops.len(),
            shapes.len()
        );

        Ok(Schedule {
            routes,
            trips,
            stops,
            stop_times,
            shapes,
            trip_map,
            stop_mean_eta,
            next_prev,
        })
    }

    pub fn route_summaries(&self) -> Vec<RouteSummary> {
        self.routes
            .iter()
            .filter_map(|route| {
                let trip = self
                    .trips
                    .iter()
                    .find(|t| t.route_id == route.route_id && t.direction_id == 0)?;
                let (origin, destination) = split_headsign(&trip.trip_headsign);
                Some(RouteSummary {
                    id: route.route_id.clone(),
                    color: route.route_color.clone(),
                    text_color: route.route_text_color.clone(),
                    origin,
                    destination,
                })
            })
            .collect()
    }

    pub fn trip_detail(&self, trip_id: &str) -> Option<TripDetail> {
        let trip = self.trips.iter().find(|t| t.trip_id == trip_id)?;
        let (origin, destination) = split_headsign(&trip.trip_headsign);

        let num_stops = self
            .stop_times
            .iter()
            .filter(|st| st.trip_id == trip_id)
            .count();

        let points: Vec<Point<f64>> = self
            .shapes
            .iter()
            .filter(|s| s.shape_id == trip.shape_id)
            .map(|s| Point::new(s.shape_pt_lon, s.shape_pt_lat))
            .collect();
        let distance_km = points
            .windows(2)
            .map(|pair| ground_distance_km(pair[0], pair[1]))
            .sum();

        Some(TripDetail {
            id: trip.trip_id.clone(),
            route: trip.route_id.clone(),
            direction: trip.direction_id,
            num_stops,
            distance_km,
            origin,
            destination,
        })
    }

    pub fn trip_stops(&self, trip_id: &str) -> Option<Vec<TripStop>> {
        let mut stop_times: Vec<&StopTimeRow> = self
            .stop_times
            .iter()
            .filter(|st| st.trip_id == trip_id)
            .collect();
        if stop_times.is_empty() {
            return None;
        }
        stop_times.sort_by_key(|st| st.stop_sequence);

        let stops = stop_times
            .into_iter()
            .filter_map(|st| {
                let stop = self.stops.iter().find(|s| s.stop_id == st.stop_id)?;
                Some(TripStop {
                    id: stop.stop_id.clone(),
                    order: st.stop_sequence,
                    name: stop.stop_name.clone(),
                    lat: stop.stop_lat,
                    lon: stop.stop_lon,
                })
            })
            .collect();
        Some(stops)
    }

    pub fn stop(&self, stop_id: &str) -> Option<&StopRow> {
        self.stops.iter().find(|s| s.stop_id == stop_id)
    }
}

fn split_headsign(headsign: &str) -> (String, String) {
    match headsign.split_once(" - ") {
        Some((origin, destination)) => (origin.to_string(), destination.to_string()),
        None => (headsign.to_string(), headsign.to_string()),
    }
}

fn read_table<T: DeserializeOwned>(path: &PathBuf) -> ScheduleResult<Vec<T>> {
    if !path.exists() {
        return Err(ScheduleError::Missing(path.clone()));
    }
    let mut reader = csv::Reader::from_path(path).map_err(|source| ScheduleError::Table {
        file: path.clone(),
        source,
    })?;
    reader
        .deserialize()
        .collect::<Result<Vec<T>, _>>()
        .map_err(|source| ScheduleError::Table {
            file: path.clone(),
            source,
        })
}

fn read_artifact<T: DeserializeOwned>(path: &PathBuf) -> ScheduleResult<T> {
    if !path.exists() {
        return Err(ScheduleError::Missing(path.clone()));
    }
    let data = fs::read_to_string(path)?;
    serde_json::from_str(&data).map_err(|source| ScheduleError::Artifact {
        file: path.clone(),
        source,
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_split_headsign() {
        let (origin, destination) = split_headsign("Pulo Gadung - Tosari");
        assert_eq!(origin, "Pulo Gadung");
        assert_eq!(destination, "Tosari");
    }

    #[test]
    fn test_split_headsign_without_separator() {
        let (origin, destination) = split_headsign("Loop");
        assert_eq!(origin, "Loop");
        assert_eq!(destination, "Loop");
    }
}
