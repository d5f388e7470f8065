//! hn-project: persistence records, network import/export and scenario configuration.

pub mod export;
pub mod import;
pub mod scenario;
pub mod schema;

pub use export::export_network;
pub use import::{ImportError, ImportProblem, import_network, import_network_with_policy};
pub use scenario::{
    ConfigurationError, HeadlossFormula, QualityModel, ScenarioConfig, ScenarioOptions, Violation,
};
pub use schema::*;

pub type ProjectResult<T> = Result<T, ProjectError>;

/// Current project file version.
pub const LATEST_VERSION: u32 = 1;

#[derive(thiserror::Error, Debug)]
pub enum ProjectError {
    #[error("Import error: {0}")]
    Import(#[from] ImportError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Unsupported version: {version}")]
    UnsupportedVersion { version: u32 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn check_version(project: &ProjectFile) -> ProjectResult<()> {
    if project.version > LATEST_VERSION {
        return Err(ProjectError::UnsupportedVersion {
            version: project.version,
        });
    }
    Ok(())
}

pub fn load_yaml(path: &std::path::Path) -> ProjectResult<ProjectFile> {
    let content = std::fs::read_to_string(path)?;
    let project: ProjectFile = serde_yaml::from_str(&content)?;
    check_version(&project)?;
    Ok(project)
}

pub fn save_yaml(path: &std::path::Path, project: &ProjectFile) -> ProjectResult<()> {
    let content = serde_yaml::to_string(project)?;
    std::fs::write(path, content)?;
    Ok(())
}

pub fn load_json(path: &std::path::Path) -> ProjectResult<ProjectFile> {
    let content = std::fs::read_to_string(path)?;
    let project: ProjectFile = serde_json::from_str(&content)?;
    check_version(&project)?;
    Ok(project)
}

pub fn save_json(path: &std::path::Path, project: &ProjectFile) -> ProjectResult<()> {
    let content = serde_json::to_string_pretty(project)?;
    std::fs::write(path, content)?;
    Ok(())
}
