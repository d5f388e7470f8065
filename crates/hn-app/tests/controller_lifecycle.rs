mod support;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};
use std::thread;
use std::time::Duration;

use hn_app::{AppError, ChannelSink, Controller, ControllerState, EventSink, RunState, SimEvent};
use hn_core::RunId;
use hn_core::{Attribute, ElementKey};
use hn_engine::ReferenceFactory;
use hn_network::{Junction, Link, Node, Pipe, Valve, ValveType};
use hn_project::{ScenarioConfig, ScenarioOptions};
use hn_results::TimeRange;

use support::{Gate, Scripted, day_config, hours_config, source_and_junction};

#[test]
fn day_long_run_completes_with_hourly_pressures() {
    let (sink, events) = ChannelSink::new();
    let controller = Controller::new(Arc::new(ReferenceFactory)).with_sink(Arc::new(sink));

    let run_id = controller
        .start_run(&source_and_junction(), &day_config())
        .unwrap();
    let record = controller.wait().unwrap();
    assert_eq!(record.state, RunState::Completed);
    assert_eq!(record.steps, 25);
    assert_eq!(record.completed_time_s, Some(86_400));
    assert!(!controller.is_busy());

    let store = controller.store();
    let pressures = store
        .query(
            run_id,
            &ElementKey::node("J1"),
            Attribute::Pressure,
            TimeRange::all(),
        )
        .unwrap()
        .to_vec();
    assert_eq!(pressures.len(), 25);
    assert!(pressures.windows(2).all(|w| w[0].time_s < w[1].time_s));
    assert!(pressures.iter().all(|p| p.value >= 0.0));

    // Every registered series holds one point per executed step.
    for (key, attribute) in store.series_keys(run_id).unwrap() {
        let q = store.query(run_id, &key, attribute, TimeRange::all()).unwrap();
        assert_eq!(q.count(), record.steps);
    }
    assert!(store.is_finalized(run_id).unwrap());

    let received: Vec<SimEvent> = events.try_iter().collect();
    let progress: Vec<i64> = received
        .iter()
        .filter_map(|e| match e {
            SimEvent::Progress(p) => Some(p.time_s),
            _ => None,
        })
        .collect();
    assert_eq!(progress.len(), 25);
    assert!(progress.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(received.last(), Some(&SimEvent::RunCompleted { run_id }));
}

#[test]
fn invalid_inputs_are_rejected_without_a_run() {
    let controller = Controller::new(Arc::new(ReferenceFactory));
    let mut net = source_and_junction();
    net.add_node(Node::junction("LONELY", 10.0, Junction::default()))
        .unwrap();
    let config = ScenarioConfig::create(ScenarioOptions {
        hydraulic_step_s: 0,
        accuracy: 0.0,
        ..ScenarioOptions::default()
    });

    let err = controller.start_run(&net, &config).unwrap_err();
    let AppError::ValidationFailed(failure) = err else {
        panic!("expected validation failure, got {err:?}");
    };
    assert!(!failure.topology.is_empty());
    assert!(failure.configuration.len() >= 2);
    assert_eq!(controller.state(), ControllerState::Idle);
    assert!(controller.runs().is_empty());
    assert!(controller.store().run_ids().is_empty());
}

#[test]
fn cancel_before_first_step_leaves_empty_finalized_series() {
    let (scripted, gate) = Scripted::gated(10);
    let controller = Controller::new(Arc::new(scripted.clone()));

    let run_id = controller
        .start_run(&source_and_junction(), &day_config())
        .unwrap();
    assert!(controller.is_busy());
    assert!(controller.cancel());
    gate.release();

    let record = controller.wait().unwrap();
    assert_eq!(record.state, RunState::Cancelled);
    assert_eq!(record.steps, 0);
    assert_eq!(scripted.closes(), 1);

    let store = controller.store();
    assert!(store.is_finalized(run_id).unwrap());
    let q = store
        .query(
            run_id,
            &ElementKey::node("J1"),
            Attribute::Pressure,
            TimeRange::all(),
        )
        .unwrap();
    assert_eq!(q.count(), 0);
    assert!(!controller.cancel());
}

#[test]
fn second_start_while_running_is_busy() {
    let (scripted, gate) = Scripted::gated(3);
    let controller = Controller::new(Arc::new(scripted));
    let net = source_and_junction();

    let first = controller.start_run(&net, &hours_config(2)).unwrap();
    let err = controller.start_run(&net, &hours_config(2)).unwrap_err();
    assert!(matches!(err, AppError::Busy { run_id } if run_id == first));

    gate.release();
    assert_eq!(controller.wait().unwrap().state, RunState::Completed);
    let second = controller.start_run(&net, &hours_config(2)).unwrap();
    assert_ne!(first, second);
    controller.wait().unwrap();
}

#[test]
fn failed_step_keeps_partial_results() {
    let (sink, events) = ChannelSink::new();
    let scripted = Scripted {
        fail_at: Some(3),
        ..Scripted::new(10)
    };
    let controller = Controller::new(Arc::new(scripted.clone())).with_sink(Arc::new(sink));

    let run_id = controller
        .start_run(&source_and_junction(), &day_config())
        .unwrap();
    let record = controller.wait().unwrap();
    assert_eq!(record.state, RunState::Failed);
    assert_eq!(record.steps, 3);
    assert!(record.error.unwrap().contains("scripted failure"));
    assert_eq!(scripted.closes(), 1);

    let store = controller.store();
    assert!(store.is_finalized(run_id).unwrap());
    let q = store
        .query(run_id, &ElementKey::link("P1"), Attribute::Flow, TimeRange::all())
        .unwrap();
    assert_eq!(q.count(), 3);

    let failed = events
        .try_iter()
        .any(|e| matches!(e, SimEvent::RunFailed { run_id: id, .. } if id == run_id));
    assert!(failed);
}

#[test]
fn engine_rejection_fails_the_run_with_the_element() {
    let controller = Controller::new(Arc::new(ReferenceFactory));
    let mut net = source_and_junction();
    net.add_node(Node::junction("J2", 45.0, Junction::default()))
        .unwrap();
    net.add_link(Link::valve(
        "V1",
        "J1",
        "J2",
        Valve::new(ValveType::Gpv, 150.0, 0.0),
    ))
    .unwrap();

    let run_id = controller.start_run(&net, &day_config()).unwrap();
    let record = controller.wait().unwrap();
    assert_eq!(record.state, RunState::Failed);
    assert!(record.error.unwrap().contains("V1"));
    assert!(!controller.store().contains_run(run_id));
    controller.discard_run(run_id).unwrap();
}

#[test]
fn discarding_one_run_leaves_the_other_queryable() {
    let controller = Controller::new(Arc::new(Scripted::new(4)));
    let net = source_and_junction();

    let first = controller.start_run(&net, &hours_config(3)).unwrap();
    assert_eq!(controller.wait().unwrap().state, RunState::Completed);
    let second = controller.start_run(&net, &hours_config(3)).unwrap();
    assert_eq!(controller.wait().unwrap().state, RunState::Completed);
    assert_ne!(first, second);

    controller.discard_run(first).unwrap();
    assert!(controller.run(first).is_none());
    assert!(matches!(
        controller.discard_run(first),
        Err(AppError::RunNotFound(_))
    ));

    let q = controller
        .store()
        .query(
            second,
            &ElementKey::node("J1"),
            Attribute::Pressure,
            TimeRange::all(),
        )
        .unwrap();
    assert_eq!(q.count(), 4);
}

#[test]
fn active_run_cannot_be_discarded() {
    let (scripted, gate) = Scripted::gated(2);
    let controller = Controller::new(Arc::new(scripted));
    let run_id = controller
        .start_run(&source_and_junction(), &day_config())
        .unwrap();

    assert!(matches!(
        controller.discard_run(run_id),
        Err(AppError::RunActive { .. })
    ));
    gate.release();
    controller.wait().unwrap();
    controller.discard_run(run_id).unwrap();
}

#[test]
fn edits_after_start_do_not_reach_the_run() {
    let (scripted, gate) = Scripted::gated(2);
    let controller = Controller::new(Arc::new(scripted));
    let mut net = source_and_junction();

    let run_id = controller.start_run(&net, &day_config()).unwrap();
    net.add_node(Node::junction("J2", 40.0, Junction::default()))
        .unwrap();
    net.add_link(Link::pipe("P2", "J1", "J2", Pipe::new(100.0, 150.0, 100.0)))
        .unwrap();
    gate.release();
    controller.wait().unwrap();

    let keys = controller.store().series_keys(run_id).unwrap();
    assert!(keys.iter().all(|(k, _)| &*k.id != "J2" && &*k.id != "P2"));
}

#[test]
fn engine_stopping_before_the_duration_fails_the_run() {
    let scripted = Scripted::new(4);
    let controller = Controller::new(Arc::new(scripted.clone()));

    let run_id = controller
        .start_run(&source_and_junction(), &day_config())
        .unwrap();
    let record = controller.wait().unwrap();
    assert_eq!(record.state, RunState::Failed);
    assert_eq!(record.steps, 4);
    assert_eq!(record.completed_time_s, Some(10_800));
    let error = record.error.unwrap();
    assert!(error.contains("stopped at t=10800s"), "{error}");
    assert!(error.contains("86400"), "{error}");
    assert_eq!(scripted.closes(), 1);

    let store = controller.store();
    assert!(store.is_finalized(run_id).unwrap());
    let q = store
        .query(run_id, &ElementKey::link("P1"), Attribute::Flow, TimeRange::all())
        .unwrap();
    assert_eq!(q.count(), 4);
}

#[test]
fn run_completes_at_the_duration_even_if_the_engine_goes_on() {
    let scripted = Scripted::new(40);
    let controller = Controller::new(Arc::new(scripted.clone()));

    let run_id = controller
        .start_run(&source_and_junction(), &day_config())
        .unwrap();
    let record = controller.wait().unwrap();
    assert_eq!(record.state, RunState::Completed);
    assert_eq!(record.steps, 25);
    assert_eq!(record.completed_time_s, Some(86_400));
    assert_eq!(scripted.closes(), 1);

    let points = controller
        .store()
        .query(
            run_id,
            &ElementKey::node("J1"),
            Attribute::Pressure,
            TimeRange::all(),
        )
        .unwrap()
        .to_vec();
    assert_eq!(points.len(), 25);
    assert!(points.iter().all(|p| p.time_s <= 86_400));
}

#[test]
fn cancel_mid_run_keeps_the_steps_already_taken() {
    // Steps 0 and 1 are appended, then `advance` blocks producing step 2.
    let (scripted, gate) = Scripted::paused_at(25, 2);
    let controller = Controller::new(Arc::new(scripted.clone()));

    let run_id = controller
        .start_run(&source_and_junction(), &day_config())
        .unwrap();
    gate.wait_arrived();
    assert_eq!(controller.state(), ControllerState::Running(run_id));
    assert!(controller.cancel());
    gate.release();

    let record = controller.wait().unwrap();
    assert_eq!(record.state, RunState::Cancelled);
    // The step in flight when cancel arrived still completes.
    assert_eq!(record.steps, 3);
    assert_eq!(record.completed_time_s, Some(7200));
    assert_eq!(scripted.closes(), 1);

    let store = controller.store();
    assert!(store.is_finalized(run_id).unwrap());
    for (key, attribute) in store.series_keys(run_id).unwrap() {
        let points = store
            .query(run_id, &key, attribute, TimeRange::all())
            .unwrap()
            .to_vec();
        let times: Vec<i64> = points.iter().map(|p| p.time_s).collect();
        assert_eq!(times, vec![0, 3600, 7200]);
    }
}

/// Sink that asks the controller for its state from inside the completion
/// callback, holding the first callback until released.
struct ReentrantSink {
    controller: OnceLock<Weak<Controller>>,
    hold: Arc<Gate>,
    completions: AtomicUsize,
    busy_seen: Mutex<Vec<bool>>,
}

impl EventSink for ReentrantSink {
    fn on_run_completed(&self, _run_id: RunId) {
        if self.completions.fetch_add(1, Ordering::SeqCst) == 0 {
            self.hold.pass();
        }
        if let Some(controller) = self.controller.get().and_then(Weak::upgrade) {
            self.busy_seen.lock().unwrap().push(controller.is_busy());
        }
    }
}

#[test]
fn sink_callbacks_may_query_the_controller_during_a_new_start() {
    let hold = Arc::new(Gate::default());
    let sink = Arc::new(ReentrantSink {
        controller: OnceLock::new(),
        hold: Arc::clone(&hold),
        completions: AtomicUsize::new(0),
        busy_seen: Mutex::new(Vec::new()),
    });
    let controller =
        Arc::new(Controller::new(Arc::new(Scripted::new(3))).with_sink(sink.clone()));
    sink.controller.set(Arc::downgrade(&controller)).ok();
    let net = source_and_junction();

    controller.start_run(&net, &hours_config(2)).unwrap();
    // The first run is terminal and its worker is parked in the callback.
    hold.wait_arrived();
    let releaser = {
        let hold = Arc::clone(&hold);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            hold.release();
        })
    };
    let second = controller.start_run(&net, &hours_config(2)).unwrap();
    let record = controller.wait().unwrap();
    releaser.join().unwrap();

    assert_eq!(record.run_id, second);
    assert_eq!(record.state, RunState::Completed);
    assert_eq!(sink.busy_seen.lock().unwrap().len(), 2);
}
