use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono_tz::Tz;

/// Service configuration. Every knob has a code default; environment
/// variables override.
#[derive(Debug, Clone)]
pub struct Config {
    /// Corridors the service predicts for.
    pub corridors: Vec<String>,
    /// A fix farther than this from its corridor is off-route, metres.
    pub on_route_threshold_m: f64,
    /// Consecutive fixes closer than this are treated as standing still.
    pub skip_threshold_m: f64,
    /// Below this gap the two directional shapes count as equally near.
    pub tie_threshold_m: f64,
    /// Direction votes kept in the sliding window.
    pub vote_window: usize,
    /// Fixes required before a vehicle is predicted for.
    pub min_window: usize,
    /// Fixes retained per vehicle.
    pub history_cap: usize,
    /// Bin edges for the stop congestion feature.
    pub congestion_bins: usize,
    /// Percentile published as the ETA.
    pub eta_percentile: f64,
    pub poll_period: Duration,
    /// Local hours [start, end) during which ingestion is paused.
    pub quiet_start_hour: u32,
    pub quiet_end_hour: u32,
    pub timezone: Tz,
    /// Vendor trip ids that map straight to a directional shape.
    pub trip_overrides: HashMap<String, String>,
    pub data_dir: PathBuf,
    pub model_path: PathBuf,
    pub redis_url: String,
    pub listen_address: String,
    pub vendor_base_url: String,
    pub vendor_username: String,
    pub vendor_password: String,
}

impl Config {
    pub fn from_env() -> Config {
        let corridors = env::var("CORRIDORS")
            .map(|raw| raw.split(',').map(|s| s.trim().to_string()).collect())
            .unwrap_or_else(|_| vec!["4B".to_string(), "D21".to_string(), "9H".to_string()]);

        let timezone = env::var("SERVICE_TIMEZONE")
            .ok()
            .and_then(|raw| Tz::from_str(&raw).ok())
            .unwrap_or(chrono_tz::Asia::Jakarta);

        Config {
            corridors,
            on_route_threshold_m: env_parse("ON_ROUTE_THRESHOLD_M", 100.0),
            skip_threshold_m: env_parse("SKIP_THRESHOLD_M", 15.0),
            tie_threshold_m: env_parse("TIE_THRESHOLD_M", 20.0),
            vote_window: env_parse("VOTE_WINDOW", 5),
            min_window: env_parse("MIN_WINDOW", 10),
            history_cap: env_parse("HISTORY_CAP", 20),
            congestion_bins: env_parse("CONGESTION_BINS", 8),
            eta_percentile: env_parse("ETA_PERCENTILE", 25.0),
            poll_period: Duration::from_secs(env_parse("POLL_PERIOD_SECONDS", 5)),
            quiet_start_hour: env_parse("QUIET_START_HOUR", 1),
            quiet_end_hour: env_parse("QUIET_END_HOUR", 5),
            timezone,
            trip_overrides: default_trip_overrides(),
            data_dir: PathBuf::from(env::var("DATA_DIR").unwrap_or("./data".to_string())),
            model_path: PathBuf::from(
                env::var("MODEL_PATH").unwrap_or("./data/segment_model.json".to_string()),
            ),
            redis_url: env::var("REDIS_URL").unwrap_or("redis://127.0.0.1:6379".to_string()),
            listen_address: env::var("LISTEN_ADDRESS").unwrap_or("127.0.0.1:8080".to_string()),
            vendor_base_url: env::var("VENDOR_BASE_URL")
                .unwrap_or("https://gps.example.invalid/".to_string()),
            vendor_username: env::var("VENDOR_USERNAME").unwrap_or_default(),
            vendor_password: env::var("VENDOR_PASSWORD").unwrap_or_default(),
        }
    }

    pub fn is_quiet_hour(&self, hour: u32) -> bool {
        hour >= self.quiet_start_hour && hour < self.quiet_end_hour
    }
}

fn default_trip_overrides() -> HashMap<String, String> {
    HashMap::from([
        ("4.B001".to_string(), "4B-R01_shp".to_string()),
        ("4.B011".to_string(), "4B-R02_shp".to_string()),
        ("9H.R04".to_string(), "9H-R04_shp".to_string()),
        ("9H.L03".to_string(), "9H-R05_shp".to_string()),
    ])
}

fn env_parse<T: FromStr + Copy>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::from_env();
        assert_eq!(config.on_route_threshold_m, 100.0);
        assert_eq!(config.vote_window, 5);
        assert_eq!(config.history_cap, 20);
        assert_eq!(
            config.trip_overrides.get("4.B001").map(String::as_str),
            Some("4B-R01_shp")
        );
    }

    #[test]
    fn test_quiet_hours() {
        let config = Config::from_env();
        assert!(config.is_quiet_hour(1));
        assert!(config.is_quiet_hour(4));
        assert!(!config.is_quiet_hour(0));
        assert!(!config.is_quiet_hour(5));
    }
}
