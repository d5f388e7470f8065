//! Structural error types for the network model.

use thiserror::Error;

pub type NetworkResult<T> = Result<T, NetworkError>;

/// Rejected mutations and lookups. A failed mutation leaves the network unchanged.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NetworkError {
    #[error("Duplicate {what} id: {id}")]
    DuplicateId { what: &'static str, id: String },

    #[error("Node not found: {id}")]
    UnknownNode { id: String },

    #[error("Link not found: {id}")]
    UnknownLink { id: String },

    #[error("Curve not found: {id}")]
    UnknownCurve { id: String },

    #[error("Pattern not found: {id}")]
    UnknownPattern { id: String },

    #[error("Link {link} refers to non-existent node {node}")]
    UnknownEndpoint { link: String, node: String },

    #[error("Link {link} starts and ends at node {node}")]
    SelfLoop { link: String, node: String },

    #[error("Node {node} is connected to links {links:?}")]
    NodeInUse { node: String, links: Vec<String> },

    #[error("{element} refers to non-existent curve {curve}")]
    MissingCurve { element: String, curve: String },

    #[error("{element} refers to non-existent pattern {pattern}")]
    MissingPattern { element: String, pattern: String },

    #[error("Curve {curve} is referenced by pump {pump}")]
    CurveInUse { curve: String, pump: String },

    #[error("Pattern {pattern} is referenced by {element}")]
    PatternInUse { pattern: String, element: String },

    #[error("Patch for {expected} cannot be applied to {id} ({found})")]
    PatchMismatch {
        id: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Invalid attribute {field} on {id}: {reason}")]
    InvalidAttribute {
        id: String,
        field: &'static str,
        reason: String,
    },

    #[error("Invalid control '{control}': {reason}")]
    InvalidControl { control: String, reason: String },

    #[error("Control '{control}' refers to non-existent {what} {id}")]
    UnknownControlTarget {
        control: String,
        what: &'static str,
        id: String,
    },

    #[error("No control at position {index}")]
    UnknownControl { index: usize },

    #[error("{element} is referenced by controls {controls:?}")]
    ControlledBy {
        element: String,
        controls: Vec<String>,
    },

    #[error("Adjacency index inconsistent at node {node}: {what}")]
    InconsistentIndex { node: String, what: &'static str },
}

impl NetworkError {
    pub(crate) fn invalid(id: &str, field: &'static str, reason: impl Into<String>) -> Self {
        NetworkError::InvalidAttribute {
            id: id.to_string(),
            field,
            reason: reason.into(),
        }
    }
}
