//! On-disk run archive: `<root>/<run-id>/manifest.json` + `series.jsonl`.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use hn_core::RunId;
use tracing::debug;

use crate::types::{RunManifest, SeriesRecord};
use crate::{ResultsError, ResultsResult};

const MANIFEST: &str = "manifest.json";
const SERIES: &str = "series.jsonl";

/// Current UTC time in the manifest's timestamp format.
pub fn timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[derive(Debug, Clone)]
pub struct RunArchive {
    root_dir: PathBuf,
}

impl RunArchive {
    pub fn new(root_dir: PathBuf) -> ResultsResult<Self> {
        if !root_dir.exists() {
            fs::create_dir_all(&root_dir)?;
        }
        Ok(Self { root_dir })
    }

    /// Archive beside a project file, under `.hydronet/runs`.
    pub fn for_project(project_path: &Path) -> ResultsResult<Self> {
        let project_dir = project_path
            .parent()
            .ok_or_else(|| ResultsError::InvalidPath {
                message: "project path has no parent directory".to_string(),
            })?;
        Self::new(project_dir.join(".hydronet").join("runs"))
    }

    pub fn root(&self) -> &Path {
        &self.root_dir
    }

    fn run_dir(&self, run_id: RunId) -> PathBuf {
        self.root_dir.join(run_id.to_string())
    }

    pub fn has_run(&self, run_id: RunId) -> bool {
        self.run_dir(run_id).join(MANIFEST).exists()
    }

    pub fn save_run(&self, manifest: &RunManifest, series: &[SeriesRecord]) -> ResultsResult<()> {
        let run_dir = self.run_dir(manifest.run_id);
        fs::create_dir_all(&run_dir)?;

        let mut content = String::new();
        for record in series {
            content.push_str(&serde_json::to_string(record)?);
            content.push('\n');
        }
        fs::write(run_dir.join(SERIES), content)?;

        // Manifest last: its presence marks a complete archive entry.
        fs::write(
            run_dir.join(MANIFEST),
            serde_json::to_string_pretty(manifest)?,
        )?;
        debug!(run_id = %manifest.run_id, series = series.len(), "run archived");
        Ok(())
    }

    pub fn load_manifest(&self, run_id: RunId) -> ResultsResult<RunManifest> {
        let path = self.run_dir(run_id).join(MANIFEST);
        if !path.exists() {
            return Err(ResultsError::RunNotArchived { run_id });
        }
        Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
    }

    pub fn load_series(&self, run_id: RunId) -> ResultsResult<Vec<SeriesRecord>> {
        let path = self.run_dir(run_id).join(SERIES);
        if !path.exists() {
            return Err(ResultsError::RunNotArchived { run_id });
        }
        let content = fs::read_to_string(path)?;
        let mut records = Vec::new();
        for line in content.lines() {
            if !line.trim().is_empty() {
                records.push(serde_json::from_str(line)?);
            }
        }
        Ok(records)
    }

    /// Manifests of every archived run, by run id.
    pub fn list_runs(&self) -> ResultsResult<Vec<RunManifest>> {
        let mut runs = Vec::new();
        if !self.root_dir.exists() {
            return Ok(runs);
        }
        for entry in fs::read_dir(&self.root_dir)? {
            let path = entry?.path();
            if !path.is_dir() {
                continue;
            }
            let manifest = path.join(MANIFEST);
            if let Ok(content) = fs::read_to_string(&manifest)
                && let Ok(manifest) = serde_json::from_str::<RunManifest>(&content)
            {
                runs.push(manifest);
            }
        }
        runs.sort_by_key(|m| m.run_id);
        Ok(runs)
    }

    /// Next id not used by any archived run.
    pub fn next_run_id(&self) -> ResultsResult<RunId> {
        Ok(self
            .list_runs()?
            .last()
            .map_or(RunId(1), |m| m.run_id.next()))
    }

    pub fn delete_run(&self, run_id: RunId) -> ResultsResult<()> {
        let run_dir = self.run_dir(run_id);
        if run_dir.exists() {
            fs::remove_dir_all(run_dir)?;
        }
        Ok(())
    }
}
