//! Project loading, saving and validation.

use std::path::Path;

use hn_network::Network;
use hn_project::{
    LATEST_VERSION, ProjectFile, ScenarioConfig, ScenarioOptions, export_network, import_network,
};

use crate::controller::validate_inputs;
use crate::error::{AppError, AppResult, ValidationFailure};

/// A project file turned into a live network and scenario.
#[derive(Debug, Clone)]
pub struct LoadedProject {
    pub name: String,
    pub network: Network,
    pub scenario: ScenarioConfig,
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"))
}

/// Load a project file: JSON by `.json` extension, YAML otherwise.
pub fn load_project(path: &Path) -> AppResult<ProjectFile> {
    if !path.exists() {
        return Err(AppError::ProjectFileMissing {
            path: path.to_path_buf(),
        });
    }
    let project = if is_json(path) {
        hn_project::load_json(path)?
    } else {
        hn_project::load_yaml(path)?
    };
    Ok(project)
}

pub fn save_project(path: &Path, project: &ProjectFile) -> AppResult<()> {
    if is_json(path) {
        hn_project::save_json(path, project)?;
    } else {
        hn_project::save_yaml(path, project)?;
    }
    Ok(())
}

/// Import the records into a network. The scenario is not validated here.
pub fn open_project(project: &ProjectFile) -> AppResult<LoadedProject> {
    let network = import_network(&project.network)?;
    Ok(LoadedProject {
        name: project.name.clone(),
        network,
        scenario: ScenarioConfig::create(project.scenario.clone()),
    })
}

pub fn load_and_open(path: &Path) -> AppResult<LoadedProject> {
    open_project(&load_project(path)?)
}

/// Snapshot a live network and scenario back into a project file.
pub fn to_project_file(name: &str, network: &Network, scenario: &ScenarioOptions) -> ProjectFile {
    ProjectFile {
        version: LATEST_VERSION,
        name: name.to_string(),
        network: export_network(network),
        scenario: scenario.clone(),
    }
}

/// Every problem that would stop a run of this project.
pub fn validate_project(project: &LoadedProject) -> Result<(), ValidationFailure> {
    validate_inputs(&project.network, &project.scenario)
}
