//! hn-engine: the bridge between the network model and a simulation engine.
//!
//! - [`Solver`] is the stateful engine contract (open, advance, close) over
//!   numeric handles and SI values.
//! - [`EngineInput`] is the network and scenario translated into that contract.
//! - [`EngineSession`] owns one opened solver for one run, maps handles back to
//!   element ids and project units, and closes the solver on every exit path.
//! - [`reference`] is a built-in solver so runs work without an external engine.

pub mod error;
pub mod handles;
pub mod input;
pub mod reference;
pub mod session;
pub mod solver;

pub use error::{EngineError, EngineResult, SolverFault};
pub use handles::HandleMap;
pub use input::{
    ControlCondition, ControlSpec, EngineInput, EngineOptions, LinkSpec, LinkSpecKind, NodeSpec,
    NodeSpecKind, QualityMode, SourceSpec,
};
pub use reference::{ReferenceFactory, ReferenceSolver};
pub use session::{EngineSession, Sample, StepSnapshot, series_attributes};
pub use solver::{EngineFactory, LinkValues, NodeValues, RawStep, Solver};
