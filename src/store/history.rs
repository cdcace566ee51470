use redis::AsyncCommands;

use super::{history_key, Store, StoreResult};
use crate::pipeline::RawFix;

impl Store {
    /// The vehicle's retained fixes, newest first. Fixes read back from the
    /// store are history, never fresh.
    pub async fn history(&self, bus_code: &str, cap: usize) -> StoreResult<Vec<RawFix>> {
        let mut con = self.connection();
        let raw: Vec<String> = con
            .lrange(history_key(bus_code), 0, cap as isize - 1)
            .await?;
        raw.iter()
            .map(|entry| Ok(serde_json::from_str(entry)?))
            .collect()
    }

    /// Push this tick's fixes (oldest first) onto the vehicle's history,
    /// trim to `cap`, and schedule the key to expire at `expire_at_unix`.
    pub async fn push_fixes(
        &self,
        bus_code: &str,
        fixes: &[RawFix],
        cap: usize,
        expire_at_unix: i64,
    ) -> StoreResult<()> {
        if fixes.is_empty() {
            return Ok(());
        }
        let key = history_key(bus_code);
        let mut con = self.connection();

        for fix in fixes {
            let entry = serde_json::to_string(fix)?;
            let _: i64 = con.lpush(&key, entry).await?;
        }
        let _: () = con.ltrim(&key, 0, cap as isize - 1).await?;
        let _: bool = con.expire_at(&key, expire_at_unix).await?;

        Ok(())
    }
}
