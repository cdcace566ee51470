mod error;
pub mod etas;
pub mod history;
pub mod pubsub;

use redis::aio::MultiplexedConnection;

pub use error::{StoreError, StoreResult};
pub use etas::StopEtaEntry;

/// Handle to the key-value store and pub/sub broker. Cheap to clone; every
/// operation works on its own connection handle.
#[derive(Clone)]
pub struct Store {
    con: MultiplexedConnection,
}

impl Store {
    pub async fn connect(url: &str) -> StoreResult<Store> {
        let client = redis::Client::open(url)?;
        let con = client.get_multiplexed_tokio_connection().await?;
        log::info!("Connected to store at {}", url);
        Ok(Store { con })
    }

    pub(crate) fn connection(&self) -> MultiplexedConnection {
        self.con.clone()
    }
}

pub(crate) fn history_key(bus_code: &str) -> String {
    format!("bus.{bus_code}")
}

pub(crate) fn stop_key(stop_id: &str) -> String {
    format!("stop.{stop_id}")
}

pub(crate) fn bus_channel(bus_code: &str) -> String {
    format!("bus.{bus_code}")
}

pub(crate) fn trip_channel(trip_id: &str) -> String {
    format!("trip.{trip_id}")
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_key_layout() {
        assert_eq!(history_key("TJ3845"), "bus.TJ3845");
        assert_eq!(stop_key("G001"), "stop.G001");
        assert_eq!(bus_channel("TJ3845"), "bus.TJ3845");
        assert_eq!(trip_channel("4B-R01"), "trip.4B-R01");
    }
}
