//! Shared fixtures: the two-node network and a scripted, gated engine.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use hn_engine::{EngineFactory, EngineInput, LinkValues, NodeValues, RawStep, Solver, SolverFault};
use hn_network::{Junction, Link, Network, Node, Pipe, Reservoir};
use hn_project::{ScenarioConfig, ScenarioOptions};

pub fn source_and_junction() -> Network {
    let mut net = Network::new();
    net.add_node(Node::reservoir("R1", Reservoir::with_head(100.0)))
        .unwrap();
    net.add_node(Node::junction("J1", 50.0, Junction::with_demand(10.0)))
        .unwrap();
    net.add_link(Link::pipe("P1", "R1", "J1", Pipe::new(500.0, 200.0, 100.0)))
        .unwrap();
    net.drain_changes();
    net
}

pub fn day_config() -> ScenarioConfig {
    ScenarioConfig::validated(ScenarioOptions::default()).unwrap()
}

/// Hourly steps over `hours`, i.e. `hours + 1` steps to the horizon.
pub fn hours_config(hours: u64) -> ScenarioConfig {
    ScenarioConfig::validated(ScenarioOptions {
        duration_s: hours * 3600,
        ..ScenarioOptions::default()
    })
    .unwrap()
}

#[derive(Default)]
struct GateState {
    open: bool,
    arrived: bool,
}

/// A latch: threads calling `pass` block until `release`.
#[derive(Default)]
pub struct Gate {
    state: Mutex<GateState>,
    cv: Condvar,
}

impl Gate {
    pub fn release(&self) {
        self.state.lock().unwrap().open = true;
        self.cv.notify_all();
    }

    /// Block until some thread has reached `pass`.
    pub fn wait_arrived(&self) {
        let mut state = self.state.lock().unwrap();
        while !state.arrived {
            state = self.cv.wait(state).unwrap();
        }
    }

    pub fn pass(&self) {
        let mut state = self.state.lock().unwrap();
        state.arrived = true;
        self.cv.notify_all();
        while !state.open {
            state = self.cv.wait(state).unwrap();
        }
    }
}

/// Engine that reports `steps` hourly steps, optionally failing at one.
///
/// `gate` holds `open`; `pause` holds the `advance` that produces the given
/// step.
#[derive(Clone)]
pub struct Scripted {
    pub steps: usize,
    pub fail_at: Option<usize>,
    pub gate: Option<Arc<Gate>>,
    pub pause: Option<(usize, Arc<Gate>)>,
    pub closes: Arc<AtomicUsize>,
}

impl Scripted {
    pub fn new(steps: usize) -> Self {
        Self {
            steps,
            fail_at: None,
            gate: None,
            pause: None,
            closes: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn gated(steps: usize) -> (Self, Arc<Gate>) {
        let gate = Arc::new(Gate::default());
        let scripted = Self {
            gate: Some(Arc::clone(&gate)),
            ..Self::new(steps)
        };
        (scripted, gate)
    }

    /// Blocks inside `advance` before producing step `step`.
    pub fn paused_at(steps: usize, step: usize) -> (Self, Arc<Gate>) {
        let gate = Arc::new(Gate::default());
        let scripted = Self {
            pause: Some((step, Arc::clone(&gate))),
            ..Self::new(steps)
        };
        (scripted, gate)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

struct ScriptedSolver {
    script: Scripted,
    nodes: usize,
    links: usize,
    step: usize,
}

impl EngineFactory for Scripted {
    fn create(&self) -> Box<dyn Solver> {
        Box::new(ScriptedSolver {
            script: self.clone(),
            nodes: 0,
            links: 0,
            step: 0,
        })
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

impl Solver for ScriptedSolver {
    fn open(&mut self, input: &EngineInput) -> Result<(), SolverFault> {
        if let Some(gate) = &self.script.gate {
            gate.pass();
        }
        self.nodes = input.nodes.len();
        self.links = input.links.len();
        Ok(())
    }

    fn advance(&mut self) -> Result<Option<RawStep>, SolverFault> {
        let step = self.step;
        if step >= self.script.steps {
            return Ok(None);
        }
        if let Some((at, gate)) = &self.script.pause
            && *at == step
        {
            gate.pass();
        }
        if self.script.fail_at == Some(step) {
            return Err(SolverFault::ConvergenceFailed {
                what: format!("scripted failure at step {step}"),
            });
        }
        self.step += 1;
        Ok(Some(RawStep {
            time_s: step as i64 * 3600,
            nodes: vec![
                NodeValues {
                    pressure: 40.0,
                    ..NodeValues::default()
                };
                self.nodes
            ],
            links: vec![LinkValues::default(); self.links],
        }))
    }

    fn close(&mut self) {
        self.script.closes.fetch_add(1, Ordering::SeqCst);
    }
}
