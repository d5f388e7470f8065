use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use hn_core::{Attribute, ElementKey, RunId};
use hn_results::{
    ResultsError, ResultsStore, RunArchive, RunManifest, RunOutcome, TimeRange, timestamp_now,
};

fn unique_temp_dir(prefix: &str) -> PathBuf {
    let mut dir = std::env::temp_dir();
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    dir.push(format!("{}_{}", prefix, nanos));
    dir
}

fn manifest(run_id: RunId, outcome: RunOutcome) -> RunManifest {
    RunManifest {
        run_id,
        name: "two nodes".into(),
        outcome,
        completed_time_s: Some(7200),
        duration_s: 7200,
        steps: 3,
        fingerprint: "abc".into(),
        engine: "reference".into(),
        created_at: timestamp_now(),
    }
}

fn filled_store(run_id: RunId) -> ResultsStore {
    let store = ResultsStore::new();
    let j1 = ElementKey::node("J1");
    let p1 = ElementKey::link("P1");
    store
        .begin_run_with(
            run_id,
            [
                (j1.clone(), Attribute::Pressure),
                (p1.clone(), Attribute::Flow),
            ],
            3,
        )
        .unwrap();
    for (i, t) in [0, 3600, 7200].into_iter().enumerate() {
        store
            .append(run_id, &j1, Attribute::Pressure, t, 49.0 + i as f64)
            .unwrap();
        store.append(run_id, &p1, Attribute::Flow, t, 10.0).unwrap();
    }
    store.finalize(run_id).unwrap();
    store
}

#[test]
fn save_list_load_roundtrip() {
    let project_dir = unique_temp_dir("hn_results_project");
    fs::create_dir_all(&project_dir).expect("failed to create temp project dir");
    let project_path = project_dir.join("project.yaml");
    fs::write(&project_path, "version: 1\nname: test\n").expect("failed to write project file");

    let archive = RunArchive::for_project(&project_path).expect("failed to create archive");
    assert_eq!(archive.next_run_id().unwrap(), RunId(1));

    let store = filled_store(RunId(4));
    let series = store.export_run(RunId(4)).unwrap();
    archive
        .save_run(&manifest(RunId(4), RunOutcome::Completed), &series)
        .unwrap();

    assert!(archive.has_run(RunId(4)));
    assert_eq!(archive.next_run_id().unwrap(), RunId(5));
    let listed = archive.list_runs().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].outcome, RunOutcome::Completed);

    let loaded = archive.load_series(RunId(4)).unwrap();
    assert_eq!(loaded, series);

    let restored = ResultsStore::new();
    restored.import_run(RunId(4), &loaded).unwrap();
    assert!(restored.is_finalized(RunId(4)).unwrap());
    let values: Vec<f64> = restored
        .query(
            RunId(4),
            &ElementKey::node("J1"),
            Attribute::Pressure,
            TimeRange::all(),
        )
        .unwrap()
        .iter()
        .map(|p| p.value)
        .collect();
    assert_eq!(values, vec![49.0, 50.0, 51.0]);

    fs::remove_dir_all(&project_dir).ok();
}

#[test]
fn failed_outcome_keeps_its_message() {
    let root = unique_temp_dir("hn_results_failed");
    let archive = RunArchive::new(root.clone()).unwrap();
    let outcome = RunOutcome::Failed {
        message: "engine step failed at 3600s".into(),
    };
    archive.save_run(&manifest(RunId(2), outcome.clone()), &[]).unwrap();

    let loaded = archive.load_manifest(RunId(2)).unwrap();
    assert_eq!(loaded.outcome, outcome);
    assert!(archive.load_series(RunId(2)).unwrap().is_empty());

    fs::remove_dir_all(&root).ok();
}

#[test]
fn deleted_run_is_gone() {
    let root = unique_temp_dir("hn_results_delete");
    let archive = RunArchive::new(root.clone()).unwrap();
    archive
        .save_run(&manifest(RunId(1), RunOutcome::Cancelled), &[])
        .unwrap();
    archive.delete_run(RunId(1)).unwrap();

    assert!(!archive.has_run(RunId(1)));
    assert!(matches!(
        archive.load_manifest(RunId(1)),
        Err(ResultsError::RunNotArchived { .. })
    ));
    fs::remove_dir_all(&root).ok();
}
