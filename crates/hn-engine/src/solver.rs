//! The engine contract.

use crate::error::SolverFault;
use crate::input::EngineInput;

/// Values at one node for one instant, SI.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct NodeValues {
    /// Net inflow from links (m³/s); consumption at junctions.
    pub demand: f64,
    pub head: f64,
    /// Metres of water column.
    pub pressure: f64,
    pub quality: f64,
}

/// Values on one link for one instant, SI.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LinkValues {
    /// Positive from start to end node.
    pub flow: f64,
    pub velocity: f64,
    /// Head at start minus head at end; negative across a running pump.
    pub headloss: f64,
    pub open: bool,
    pub quality: f64,
}

/// One solved instant, indexed by handle.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawStep {
    pub time_s: i64,
    pub nodes: Vec<NodeValues>,
    pub links: Vec<LinkValues>,
}

/// A stateful simulation engine.
///
/// The session calls `open` once, `advance` until it yields `None`, and
/// `close` exactly once after a successful `open`.
pub trait Solver: Send {
    fn open(&mut self, input: &EngineInput) -> Result<(), SolverFault>;

    /// Solve the next reporting instant, or `None` once the horizon is done.
    fn advance(&mut self) -> Result<Option<RawStep>, SolverFault>;

    fn close(&mut self);
}

/// Creates one fresh solver per run.
pub trait EngineFactory: Send + Sync {
    fn create(&self) -> Box<dyn Solver>;

    fn name(&self) -> &str {
        "engine"
    }
}
