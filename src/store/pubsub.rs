use redis::AsyncCommands;
use serde::Serialize;

use super::{bus_channel, trip_channel, Store, StoreResult};
use crate::pipeline::VehicleEtas;

/// Per-vehicle position update, published on `bus.<bus_code>`.
#[derive(Debug, Serialize)]
pub struct PositionUpdate<'a> {
    pub bus_code: &'a str,
    pub koridor: &'a str,
    pub trip_id: &'a str,
    pub latitude: f64,
    pub longitude: f64,
    pub heading: f64,
    pub speed: f64,
    pub timestamp: String,
}

/// Per-trip row, published on `trip.<trip_id>`.
#[derive(Debug, Serialize)]
pub struct TripUpdate<'a> {
    pub trip_id: &'a str,
    pub bus_code: &'a str,
    pub latitude: f64,
    pub longitude: f64,
    pub prev_stop: &'a str,
    pub next_stop: &'a str,
    pub next_stop_km: f64,
    pub timestamp: String,
}

impl Store {
    pub async fn publish_vehicle(&self, outcome: &VehicleEtas) -> StoreResult<()> {
        let timestamp = outcome.timestamp.format("%Y-%m-%dT%H:%M:%S").to_string();

        let position = PositionUpdate {
            bus_code: &outcome.bus_code,
            koridor: &outcome.corridor,
            trip_id: &outcome.trip_id,
            latitude: outcome.latest.latitude,
            longitude: outcome.latest.longitude,
            heading: outcome.latest.gpsheading,
            speed: outcome.latest.gpsspeed,
            timestamp: timestamp.clone(),
        };
        let trip = TripUpdate {
            trip_id: &outcome.trip_id,
            bus_code: &outcome.bus_code,
            latitude: outcome.latest.latitude,
            longitude: outcome.latest.longitude,
            prev_stop: &outcome.prev_stop,
            next_stop: &outcome.next_stop,
            next_stop_km: outcome.next_stop_km,
            timestamp,
        };

        let mut con = self.connection();
        let _: i64 = con
            .publish(
                bus_channel(&outcome.bus_code),
                serde_json::to_string(&position)?,
            )
            .await?;
        let _: i64 = con
            .publish(trip_channel(&outcome.trip_id), serde_json::to_string(&trip)?)
            .await?;
        Ok(())
    }
}
