//! Error types for the hn-app service layer.

use std::fmt;
use std::path::PathBuf;

use hn_core::RunId;
use hn_network::TopologyIssue;
use hn_project::Violation;

/// Everything that kept a run from starting, topology and configuration
/// problems together.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValidationFailure {
    pub topology: Vec<TopologyIssue>,
    pub configuration: Vec<Violation>,
}

impl ValidationFailure {
    pub fn is_empty(&self) -> bool {
        self.topology.is_empty() && self.configuration.is_empty()
    }

    /// One line per problem.
    pub fn messages(&self) -> Vec<String> {
        self.topology
            .iter()
            .map(ToString::to_string)
            .chain(self.configuration.iter().map(ToString::to_string))
            .collect()
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.messages().join("; "))
    }
}

impl std::error::Error for ValidationFailure {}

/// Application error wrapping the backend crates for CLI and UI callers.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Project error: {0}")]
    Project(String),

    #[error("Project file not found: {}", path.display())]
    ProjectFileMissing { path: PathBuf },

    #[error(transparent)]
    Import(#[from] hn_project::ImportError),

    #[error("Network error: {0}")]
    Network(#[from] hn_network::NetworkError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationFailure),

    #[error("A run is already active: {run_id}")]
    Busy { run_id: RunId },

    #[error("Run is still active: {run_id}")]
    RunActive { run_id: RunId },

    #[error("Run not found: {0}")]
    RunNotFound(RunId),

    #[error("Engine error: {0}")]
    Engine(#[from] hn_engine::EngineError),

    #[error("Results error: {0}")]
    Results(#[from] hn_results::ResultsError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;

impl From<hn_project::ProjectError> for AppError {
    fn from(err: hn_project::ProjectError) -> Self {
        match err {
            hn_project::ProjectError::Import(e) => AppError::Import(e),
            other => AppError::Project(other.to_string()),
        }
    }
}

impl From<hn_project::ConfigurationError> for AppError {
    fn from(err: hn_project::ConfigurationError) -> Self {
        AppError::ValidationFailed(ValidationFailure {
            topology: Vec::new(),
            configuration: err.violations,
        })
    }
}
