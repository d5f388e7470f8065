//! Application service layer for hydronet.
//!
//! Owns the run lifecycle ([`Controller`]), the editable network
//! ([`NetworkSession`]), the event boundary and project file handling, so
//! the CLI and any UI share one implementation.

pub mod controller;
pub mod error;
pub mod events;
pub mod progress;
pub mod project_service;
pub mod query;
pub mod session;

pub use controller::{Controller, ControllerState, RunRecord, validate_inputs};
pub use error::{AppError, AppResult, ValidationFailure};
pub use events::{ChannelSink, EventSink, NullSink, SimEvent};
pub use progress::{RunProgress, RunState};
pub use project_service::{
    LoadedProject, load_and_open, load_project, open_project, save_project, to_project_file,
    validate_project,
};
pub use query::{
    RunSummary, archive_run, decimate, extract_series, get_run_summary, parse_element,
    restore_run, series_csv,
};
pub use session::NetworkSession;
