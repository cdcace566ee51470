use std::collections::HashMap;

use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};

use super::{stop_key, Store, StoreResult};

/// Value stored per (stop, vehicle): the projected arrival instant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StopEtaEntry {
    pub eta: String,
    pub bus_id: String,
}

impl Store {
    /// Record a vehicle's ETA at a stop. Last write wins per
    /// (stop, vehicle).
    pub async fn put_stop_eta(
        &self,
        stop_id: &str,
        bus_code: &str,
        eta_iso: String,
    ) -> StoreResult<()> {
        let entry = StopEtaEntry {
            eta: eta_iso,
            bus_id: bus_code.to_string(),
        };
        let mut con = self.connection();
        let _: () = con
            .hset(stop_key(stop_id), bus_code, serde_json::to_string(&entry)?)
            .await?;
        Ok(())
    }

    /// Live ETA entries for one stop, one per vehicle.
    pub async fn stop_etas(&self, stop_id: &str) -> StoreResult<Vec<StopEtaEntry>> {
        let mut con = self.connection();
        let raw: HashMap<String, String> = con.hgetall(stop_key(stop_id)).await?;
        let mut entries = raw
            .values()
            .map(|value| Ok(serde_json::from_str(value)?))
            .collect::<StoreResult<Vec<StopEtaEntry>>>()?;
        entries.sort_by(|a, b| a.eta.cmp(&b.eta));
        Ok(entries)
    }

    /// Delete entries whose ETA has passed. Unparseable entries are
    /// deleted too.
    pub async fn prune_expired_etas(
        &self,
        stop_ids: &[String],
        now: DateTime<Utc>,
    ) -> StoreResult<usize> {
        let mut pruned = 0;
        let mut con = self.connection();

        for stop_id in stop_ids {
            let key = stop_key(stop_id);
            let raw: HashMap<String, String> = con.hgetall(&key).await?;
            for (field, value) in raw {
                let expired = match serde_json::from_str::<StopEtaEntry>(&value) {
                    Ok(entry) => match DateTime::parse_from_rfc3339(&entry.eta) {
                        Ok(eta) => eta.with_timezone(&Utc) < now,
                        Err(_) => true,
                    },
                    Err(_) => true,
                };
                if expired {
                    let _: i64 = con.hdel(&key, field).await?;
                    pruned += 1;
                }
            }
        }

        if pruned > 0 {
            log::debug!("Pruned {} expired eta entries", pruned);
        }
        Ok(pruned)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_entry_wire_format() {
        let entry = StopEtaEntry {
            eta: "2024-03-04T08:35:00+07:00".to_string(),
            bus_id: "TJ3845".to_string(),
        };
        let json = serde_json::to_string(&entry).unwrap();
        assert_eq!(
            json,
            r#"{"eta":"2024-03-04T08:35:00+07:00","bus_id":"TJ3845"}"#
        );
        let back: StopEtaEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, entry);
    }
}
