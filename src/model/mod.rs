pub mod ensemble;

pub use ensemble::GradientBoostedModel;

/// Feature-vector width expected by the trained artifact.
pub const FEATURE_COUNT: usize = 9;

/// Corridor ids the model was trained on, in their trained encoding.
pub fn corridor_feature_index(corridor: &str) -> Option<f64> {
    match corridor {
        "4B" => Some(0.0),
        "9H" => Some(1.0),
        "D21" => Some(2.0),
        _ => None,
    }
}

/// One row of model input. Field order is part of the trained artifact's
/// contract and must not change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureRow {
    pub corridor: f64,
    pub day: f64,
    pub hour: f64,
    pub heading: f64,
    pub speed: f64,
    pub congestion_bin: f64,
    pub next_stop_km: f64,
    pub latitude: f64,
    pub longitude: f64,
}

impl FeatureRow {
    pub fn to_vector(&self) -> [f64; FEATURE_COUNT] {
        [
            self.corridor,
            self.day,
            self.hour,
            self.heading,
            self.speed,
            self.congestion_bin,
            self.next_stop_km,
            self.latitude,
            self.longitude,
        ]
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ModelError {
    #[error("Model artifact error: {0}")]
    Artifact(#[from] serde_json::Error),

    #[error("Model io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Split on feature {0} is out of range")]
    FeatureOutOfRange(usize),

    #[error("Malformed tree: node {0} is out of range")]
    NodeOutOfRange(usize),
}

pub type ModelResult<T> = Result<T, ModelError>;

/// The pre-trained per-segment travel-time regressor, seconds per virtual
/// row. Implementations must be deterministic and callable concurrently.
pub trait SegmentTimeModel: Send + Sync {
    fn predict(&self, rows: &[FeatureRow]) -> ModelResult<Vec<f64>>;
}
