pub mod artifacts;
mod loader;
pub mod tables;

use std::path::PathBuf;

pub use loader::{RouteSummary, Schedule, TripDetail, TripStop};

#[derive(thiserror::Error, Debug)]
pub enum ScheduleError {
    #[error("Missing schedule file: {0:?}")]
    Missing(PathBuf),

    #[error("Error reading {file:?}: {source}")]
    Table {
        file: PathBuf,
        source: csv::Error,
    },

    #[error("Error reading {file:?}: {source}")]
    Artifact {
        file: PathBuf,
        source: serde_json::Error,
    },

    #[error("No trips found for corridor {0}")]
    EmptyCorridor(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type ScheduleResult<T> = Result<T, ScheduleError>;
