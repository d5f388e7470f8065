//! Simulation controller: owns the lifecycle of every run.
//!
//! One run at a time. `start_run` validates and snapshots its inputs on the
//! caller's thread, then a worker thread opens the engine, registers the
//! series, steps to the horizon and finalizes. Cancellation is a flag the
//! worker checks before each step.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use hn_core::RunId;
use hn_engine::{EngineFactory, EngineSession};
use hn_network::Network;
use hn_project::{ScenarioConfig, export_network};
use hn_results::{ResultsStore, capacity_for, fingerprint};
use tracing::{debug, error, info, warn};

use crate::error::{AppError, AppResult, ValidationFailure};
use crate::events::{EventSink, NullSink};
use crate::progress::{RunProgress, RunState};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// What the controller knows about one run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunRecord {
    pub run_id: RunId,
    pub state: RunState,
    /// Steps executed and appended.
    pub steps: usize,
    /// Simulation time of the last executed step.
    pub completed_time_s: Option<i64>,
    pub duration_s: i64,
    pub error: Option<String>,
    pub engine: String,
    /// SHA-256 of the frozen network and scenario.
    pub fingerprint: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    Preparing(RunId),
    Running(RunId),
}

/// Check a network and scenario the way `start_run` does.
pub fn validate_inputs(network: &Network, config: &ScenarioConfig) -> Result<(), ValidationFailure> {
    let failure = ValidationFailure {
        topology: network.validate_topology().issues,
        configuration: config
            .validate_for(network)
            .err()
            .map(|e| e.violations)
            .unwrap_or_default(),
    };
    if failure.is_empty() {
        Ok(())
    } else {
        Err(failure)
    }
}

#[derive(Default)]
struct Shared {
    runs: Mutex<BTreeMap<RunId, RunRecord>>,
    changed: Condvar,
}

impl Shared {
    fn update(&self, run_id: RunId, f: impl FnOnce(&mut RunRecord)) {
        if let Some(record) = lock(&self.runs).get_mut(&run_id) {
            f(record);
        }
        self.changed.notify_all();
    }

    fn get(&self, run_id: RunId) -> Option<RunRecord> {
        lock(&self.runs).get(&run_id).cloned()
    }

    fn is_terminal(&self, run_id: RunId) -> bool {
        lock(&self.runs)
            .get(&run_id)
            .is_none_or(|r| r.state.is_terminal())
    }

    fn wait_terminal(&self, run_id: RunId) -> Option<RunRecord> {
        let mut runs = lock(&self.runs);
        loop {
            match runs.get(&run_id) {
                None => return None,
                Some(r) if r.state.is_terminal() => return Some(r.clone()),
                Some(_) => {
                    runs = self
                        .changed
                        .wait(runs)
                        .unwrap_or_else(PoisonError::into_inner);
                }
            }
        }
    }
}

struct ActiveRun {
    run_id: RunId,
    cancel: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

pub struct Controller {
    factory: Arc<dyn EngineFactory>,
    store: Arc<ResultsStore>,
    sink: Arc<dyn EventSink>,
    shared: Arc<Shared>,
    active: Mutex<Option<ActiveRun>>,
    next_id: AtomicU64,
}

impl Controller {
    pub fn new(factory: Arc<dyn EngineFactory>) -> Self {
        Self {
            factory,
            store: Arc::new(ResultsStore::new()),
            sink: Arc::new(NullSink),
            shared: Arc::new(Shared::default()),
            active: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_store(mut self, store: Arc<ResultsStore>) -> Self {
        self.store = store;
        self
    }

    /// Allocate run ids from `first` on, e.g. past those already archived.
    pub fn starting_at(self, first: RunId) -> Self {
        self.next_id.store(first.0.max(1), Ordering::SeqCst);
        self
    }

    pub fn store(&self) -> &Arc<ResultsStore> {
        &self.store
    }

    pub fn engine_name(&self) -> &str {
        self.factory.name()
    }

    /// Validate, freeze the inputs and start stepping on a worker thread.
    ///
    /// Validation failures leave the controller exactly as it was.
    pub fn start_run(&self, network: &Network, config: &ScenarioConfig) -> AppResult<RunId> {
        let mut previous = None;
        let started = self.launch(network, config, &mut previous);
        // The previous worker may still be inside a sink callback that calls
        // back into the controller, so it is joined with no lock held.
        if let Some(worker) = previous {
            let _ = worker.join();
        }
        started
    }

    fn launch(
        &self,
        network: &Network,
        config: &ScenarioConfig,
        previous: &mut Option<JoinHandle<()>>,
    ) -> AppResult<RunId> {
        let mut active = lock(&self.active);
        if let Some(run) = active.as_ref()
            && !self.shared.is_terminal(run.run_id)
        {
            return Err(AppError::Busy { run_id: run.run_id });
        }
        validate_inputs(network, config)?;

        let network = network.snapshot();
        let config = config.clone();
        let fingerprint = fingerprint(&export_network(&network), config.options());
        let run_id = RunId(self.next_id.fetch_add(1, Ordering::SeqCst));

        *previous = active.take().and_then(|run| run.worker);

        lock(&self.shared.runs).insert(
            run_id,
            RunRecord {
                run_id,
                state: RunState::Preparing,
                steps: 0,
                completed_time_s: None,
                duration_s: config.duration_s() as i64,
                error: None,
                engine: self.factory.name().to_string(),
                fingerprint,
            },
        );
        info!(run_id = %run_id, engine = self.factory.name(), "run preparing");

        let cancel = Arc::new(AtomicBool::new(false));
        let job = RunJob {
            run_id,
            network,
            config,
            factory: Arc::clone(&self.factory),
            store: Arc::clone(&self.store),
            sink: Arc::clone(&self.sink),
            shared: Arc::clone(&self.shared),
            cancel: Arc::clone(&cancel),
        };
        let worker = thread::Builder::new()
            .name(format!("hn-{run_id}"))
            .spawn(move || job.execute());
        let worker = match worker {
            Ok(worker) => worker,
            Err(err) => {
                self.shared.update(run_id, |r| {
                    r.state = RunState::Failed;
                    r.error = Some(err.to_string());
                });
                return Err(AppError::Io(err));
            }
        };

        *active = Some(ActiveRun {
            run_id,
            cancel,
            worker: Some(worker),
        });
        Ok(run_id)
    }

    /// Ask the active run to stop before its next step.
    ///
    /// Returns false when no run is in progress.
    pub fn cancel(&self) -> bool {
        let active = lock(&self.active);
        match active.as_ref() {
            Some(run) if !self.shared.is_terminal(run.run_id) => {
                run.cancel.store(true, Ordering::SeqCst);
                info!(run_id = %run.run_id, "cancellation requested");
                true
            }
            _ => false,
        }
    }

    /// Block until the active run is terminal and return its record.
    pub fn wait(&self) -> Option<RunRecord> {
        let (run_id, worker) = {
            let mut active = lock(&self.active);
            let run = active.as_mut()?;
            (run.run_id, run.worker.take())
        };
        match worker {
            Some(worker) => {
                if worker.join().is_err() {
                    self.shared.update(run_id, |r| {
                        if !r.state.is_terminal() {
                            r.state = RunState::Failed;
                            r.error = Some("run worker panicked".into());
                        }
                    });
                }
                self.shared.get(run_id)
            }
            // Another caller is joining; wait on the record instead.
            None => self.shared.wait_terminal(run_id),
        }
    }

    pub fn state(&self) -> ControllerState {
        let active = lock(&self.active);
        let Some(run) = active.as_ref() else {
            return ControllerState::Idle;
        };
        match self.shared.get(run.run_id).map(|r| r.state) {
            Some(RunState::Preparing) => ControllerState::Preparing(run.run_id),
            Some(RunState::Running) => ControllerState::Running(run.run_id),
            _ => ControllerState::Idle,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.state() != ControllerState::Idle
    }

    pub fn run(&self, run_id: RunId) -> Option<RunRecord> {
        self.shared.get(run_id)
    }

    pub fn runs(&self) -> Vec<RunRecord> {
        lock(&self.shared.runs).values().cloned().collect()
    }

    /// Forget a terminal run and release its series.
    pub fn discard_run(&self, run_id: RunId) -> AppResult<()> {
        if !self.shared.is_terminal(run_id) {
            return Err(AppError::RunActive { run_id });
        }
        if lock(&self.shared.runs).remove(&run_id).is_none() {
            return Err(AppError::RunNotFound(run_id));
        }
        match self.store.discard(run_id) {
            // A run that failed to open never registered series.
            Ok(()) | Err(hn_results::ResultsError::UnknownRun { .. }) => {}
            Err(err) => return Err(err.into()),
        }
        info!(run_id = %run_id, "run discarded");
        Ok(())
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        let active = self
            .active
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(mut run) = active {
            run.cancel.store(true, Ordering::SeqCst);
            if let Some(worker) = run.worker.take() {
                let _ = worker.join();
            }
        }
    }
}

/// Everything the worker thread needs, moved in at start.
struct RunJob {
    run_id: RunId,
    network: Network,
    config: ScenarioConfig,
    factory: Arc<dyn EngineFactory>,
    store: Arc<ResultsStore>,
    sink: Arc<dyn EventSink>,
    shared: Arc<Shared>,
    cancel: Arc<AtomicBool>,
}

impl RunJob {
    fn execute(self) {
        let run_id = self.run_id;
        let mut registered = false;
        let result = self.drive(&mut registered);

        // Partial series stay queryable after cancellation or failure.
        if registered && let Err(err) = self.store.finalize(run_id) {
            warn!(run_id = %run_id, error = %err, "could not finalize results");
        }

        match result {
            Ok(RunState::Cancelled) => {
                warn!(run_id = %run_id, "run cancelled");
                self.shared.update(run_id, |r| r.state = RunState::Cancelled);
                self.sink.on_run_cancelled(run_id);
            }
            Ok(state) => {
                info!(run_id = %run_id, "run completed");
                self.shared.update(run_id, |r| r.state = state);
                self.sink.on_run_completed(run_id);
            }
            Err(err) => {
                error!(run_id = %run_id, error = %err, "run failed");
                self.shared.update(run_id, |r| {
                    r.state = RunState::Failed;
                    r.error = Some(err.to_string());
                });
                self.sink.on_run_failed(run_id, &err);
            }
        }
    }

    /// Open, register and step. The session is closed on every return.
    fn drive(&self, registered: &mut bool) -> AppResult<RunState> {
        let run_id = self.run_id;
        let mut session = EngineSession::open(self.factory.as_ref(), &self.network, &self.config)?;
        let duration_s = session.duration_s();
        let capacity = capacity_for(duration_s, self.config.hydraulic_step_s() as i64);

        self.store
            .begin_run_with(run_id, session.series_keys(), capacity)?;
        *registered = true;
        let writer = self.store.writer(run_id)?;
        self.shared.update(run_id, |r| r.state = RunState::Running);
        info!(run_id = %run_id, duration_s, "run started");

        let mut step = 0;
        loop {
            if self.cancel.load(Ordering::SeqCst) {
                session.close();
                return Ok(RunState::Cancelled);
            }
            let Some(snapshot) = session.run_step()? else {
                session.close();
                return Ok(RunState::Completed);
            };
            for sample in &snapshot.samples {
                writer.append(&sample.key, sample.attribute, snapshot.time_s, sample.value)?;
            }
            self.shared.update(run_id, |r| {
                r.steps = step + 1;
                r.completed_time_s = Some(snapshot.time_s);
            });
            debug!(run_id = %run_id, step, time_s = snapshot.time_s, "step recorded");
            self.sink.on_progress(&RunProgress {
                run_id,
                step,
                time_s: snapshot.time_s,
                duration_s,
            });
            step += 1;
            if session.reached_horizon() {
                session.close();
                return Ok(RunState::Completed);
            }
        }
    }
}
