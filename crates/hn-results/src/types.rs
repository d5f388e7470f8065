//! Result data types.

use hn_core::{Attribute, ElementKey, RunId};
use serde::{Deserialize, Serialize};

/// One recorded value of a series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub time_s: i64,
    pub value: f64,
}

/// Inclusive time window for queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start_s: i64,
    pub end_s: i64,
}

impl TimeRange {
    pub fn new(start_s: i64, end_s: i64) -> Self {
        Self { start_s, end_s }
    }

    pub fn all() -> Self {
        Self {
            start_s: i64::MIN,
            end_s: i64::MAX,
        }
    }

    pub fn contains(&self, time_s: i64) -> bool {
        self.start_s <= time_s && time_s <= self.end_s
    }

    pub fn is_empty(&self) -> bool {
        self.start_s > self.end_s
    }
}

impl Default for TimeRange {
    fn default() -> Self {
        Self::all()
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RunOutcome {
    Completed,
    Failed { message: String },
    Cancelled,
}

impl RunOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            RunOutcome::Completed => "completed",
            RunOutcome::Failed { .. } => "failed",
            RunOutcome::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub run_id: RunId,
    pub name: String,
    pub outcome: RunOutcome,
    /// Last simulation time recorded.
    pub completed_time_s: Option<i64>,
    pub duration_s: i64,
    pub steps: usize,
    /// SHA-256 of the network records and scenario.
    pub fingerprint: String,
    pub engine: String,
    /// RFC 3339, UTC.
    pub created_at: String,
}

/// One archived series; one JSON line per series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesRecord {
    pub key: ElementKey,
    pub attribute: Attribute,
    pub points: Vec<Point>,
}

/// Counts for one run held in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunStats {
    pub series: usize,
    pub samples: usize,
    pub first_time_s: Option<i64>,
    pub last_time_s: Option<i64>,
    pub finalized: bool,
}
