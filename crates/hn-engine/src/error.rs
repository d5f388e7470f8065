//! Error types for engine operations.

use hn_core::{ElementKey, ElementKind, Handle, HnError};
use thiserror::Error;

/// Failure reported by a [`crate::Solver`] in its own handle space.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolverFault {
    #[error("unsupported {kind:?} {handle}: {reason}")]
    Unsupported {
        kind: ElementKind,
        handle: Handle,
        reason: String,
    },

    #[error("Convergence failed: {what}")]
    ConvergenceFailed { what: String },

    #[error("Numeric error: {what}")]
    Numeric { what: String },

    #[error("Solver is not open")]
    NotOpen,
}

/// Errors surfaced by an [`crate::EngineSession`], in element-id terms.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Engine open failed{}: {reason}", on_element(element))]
    Open {
        element: Option<ElementKey>,
        reason: String,
    },

    #[error("Engine step failed at t={time_s}s: {reason}")]
    Step { time_s: i64, reason: String },

    #[error("Handle mapping error: {0}")]
    Mapping(#[from] HnError),
}

fn on_element(element: &Option<ElementKey>) -> String {
    match element {
        Some(key) => format!(" for {key}"),
        None => String::new(),
    }
}

impl EngineError {
    /// Id of the element the engine rejected, if any.
    pub fn element(&self) -> Option<&ElementKey> {
        match self {
            EngineError::Open { element, .. } => element.as_ref(),
            _ => None,
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
