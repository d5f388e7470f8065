//! Read-side helpers over the results store and the run archive.

use hn_core::{Attribute, ElementKey, RunId};
use hn_results::{
    Point, ResultsError, ResultsStore, RunArchive, RunManifest, RunOutcome, TimeRange,
    timestamp_now,
};

use crate::controller::{Controller, RunRecord};
use crate::error::{AppError, AppResult};
use crate::progress::RunState;

/// Summary of a run's stored series.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub run_id: RunId,
    pub series_count: usize,
    pub sample_count: usize,
    pub time_range: Option<(i64, i64)>,
    pub finalized: bool,
}

pub fn get_run_summary(store: &ResultsStore, run_id: RunId) -> AppResult<RunSummary> {
    let stats = store.stats(run_id)?;
    Ok(RunSummary {
        run_id,
        series_count: stats.series,
        sample_count: stats.samples,
        time_range: stats.first_time_s.zip(stats.last_time_s),
        finalized: stats.finalized,
    })
}

/// Parse `node:<id>` or `link:<id>`.
pub fn parse_element(text: &str) -> AppResult<ElementKey> {
    match text.split_once(':') {
        Some(("node", id)) if !id.is_empty() => Ok(ElementKey::node(id)),
        Some(("link", id)) if !id.is_empty() => Ok(ElementKey::link(id)),
        _ => Err(AppError::InvalidInput(format!(
            "Element must be node:<id> or link:<id>, got '{}'",
            text
        ))),
    }
}

/// Keep the points on the reporting grid `report_start_s + k * report_step_s`.
pub fn decimate(points: &[Point], report_start_s: i64, report_step_s: i64) -> Vec<Point> {
    let step = report_step_s.max(1);
    points
        .iter()
        .filter(|p| p.time_s >= report_start_s && (p.time_s - report_start_s) % step == 0)
        .copied()
        .collect()
}

/// A series on the reporting grid of its run's scenario.
pub fn extract_series(
    store: &ResultsStore,
    run_id: RunId,
    key: &ElementKey,
    attribute: Attribute,
    report: Option<(i64, i64)>,
) -> AppResult<Vec<Point>> {
    let points = store
        .query(run_id, key, attribute, TimeRange::all())?
        .to_vec();
    Ok(match report {
        Some((start_s, step_s)) => decimate(&points, start_s, step_s),
        None => points,
    })
}

/// CSV with a `time_s,<attribute>` header.
pub fn series_csv(attribute: Attribute, points: &[Point]) -> String {
    let mut out = format!("time_s,{}\n", attribute.name());
    for p in points {
        out.push_str(&format!("{},{}\n", p.time_s, p.value));
    }
    out
}

fn outcome(record: &RunRecord) -> AppResult<RunOutcome> {
    match record.state {
        RunState::Completed => Ok(RunOutcome::Completed),
        RunState::Cancelled => Ok(RunOutcome::Cancelled),
        RunState::Failed => Ok(RunOutcome::Failed {
            message: record.error.clone().unwrap_or_default(),
        }),
        RunState::Preparing | RunState::Running => Err(AppError::RunActive {
            run_id: record.run_id,
        }),
    }
}

/// Write a terminal run to the archive.
pub fn archive_run(
    controller: &Controller,
    archive: &RunArchive,
    run_id: RunId,
    name: &str,
) -> AppResult<RunManifest> {
    let record = controller.run(run_id).ok_or(AppError::RunNotFound(run_id))?;
    let manifest = RunManifest {
        run_id,
        name: name.to_string(),
        outcome: outcome(&record)?,
        completed_time_s: record.completed_time_s,
        duration_s: record.duration_s,
        steps: record.steps,
        fingerprint: record.fingerprint.clone(),
        engine: record.engine.clone(),
        created_at: timestamp_now(),
    };
    let series = match controller.store().export_run(run_id) {
        Ok(series) => series,
        Err(ResultsError::UnknownRun { .. }) => Vec::new(),
        Err(err) => return Err(err.into()),
    };
    archive.save_run(&manifest, &series)?;
    Ok(manifest)
}

/// Load an archived run into `store` as a finalized run.
pub fn restore_run(
    store: &ResultsStore,
    archive: &RunArchive,
    run_id: RunId,
) -> AppResult<RunManifest> {
    let manifest = archive.load_manifest(run_id)?;
    if !store.contains_run(run_id) {
        store.import_run(run_id, &archive.load_series(run_id)?)?;
    }
    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn points(times: &[i64]) -> Vec<Point> {
        times
            .iter()
            .map(|t| Point {
                time_s: *t,
                value: *t as f64,
            })
            .collect()
    }

    #[test]
    fn decimation_follows_report_grid() {
        let all = points(&[0, 900, 1800, 2700, 3600, 4500, 5400, 7200]);
        let kept: Vec<i64> = decimate(&all, 1800, 1800).iter().map(|p| p.time_s).collect();
        assert_eq!(kept, vec![1800, 3600, 5400, 7200]);
    }

    #[test]
    fn element_keys_parse() {
        assert_eq!(parse_element("node:J1").unwrap(), ElementKey::node("J1"));
        assert_eq!(parse_element("link:P-9").unwrap(), ElementKey::link("P-9"));
        assert!(parse_element("J1").is_err());
        assert!(parse_element("pipe:P1").is_err());
        assert!(parse_element("node:").is_err());
    }

    #[test]
    fn csv_has_header_and_rows() {
        let csv = series_csv(Attribute::Pressure, &points(&[0, 3600]));
        assert_eq!(csv, "time_s,pressure\n0,0\n3600,3600\n");
    }
}
