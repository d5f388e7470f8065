//! hn-results: per-run time series storage and the on-disk run archive.

pub mod archive;
pub mod hash;
pub mod store;
pub mod types;

pub use archive::{RunArchive, timestamp_now};
pub use hash::fingerprint;
pub use store::{ResultsStore, RunWriter, SeriesIter, SeriesKey, SeriesQuery, capacity_for};
pub use types::*;

use hn_core::{Attribute, ElementKey, RunId};

pub type ResultsResult<T> = Result<T, ResultsError>;

#[derive(thiserror::Error, Debug)]
pub enum ResultsError {
    #[error("Unknown run: {run_id}")]
    UnknownRun { run_id: RunId },

    #[error("Run already registered: {run_id}")]
    RunExists { run_id: RunId },

    #[error("Unknown series: {run_id} {key} {attribute}")]
    UnknownSeries {
        run_id: RunId,
        key: ElementKey,
        attribute: Attribute,
    },

    #[error("Non-monotonic timestamp for {key} {attribute}: {time_s}s after {last_s}s")]
    NonMonotonicTimestamp {
        key: ElementKey,
        attribute: Attribute,
        last_s: i64,
        time_s: i64,
    },

    #[error("Run is finalized: {run_id}")]
    RunFinalized { run_id: RunId },

    #[error("Run not found in archive: {run_id}")]
    RunNotArchived { run_id: RunId },

    #[error("Invalid archive path: {message}")]
    InvalidPath { message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
