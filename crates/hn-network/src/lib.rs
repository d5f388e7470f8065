//! hn-network: the in-memory water distribution network model.
//!
//! Provides:
//! - Typed nodes (junction, reservoir, tank) and links (pipe, pump, valve)
//! - Curves and time patterns referenced by elements
//! - Simple link controls keyed to node values or times
//! - A `Network` that keeps its adjacency index consistent with every mutation
//! - Typed attribute patches checked against the element's declared type
//! - Topology validation used before a run is permitted
//!
//! # Example
//!
//! ```
//! use hn_network::{Junction, Link, Network, Node, Pipe, RemovalMode, Reservoir};
//!
//! let mut net = Network::new();
//! net.add_node(Node::reservoir("R1", Reservoir::with_head(100.0))).unwrap();
//! net.add_node(Node::junction("J1", 50.0, Junction::with_demand(10.0))).unwrap();
//! net.add_link(Link::pipe("P1", "R1", "J1", Pipe::new(500.0, 200.0, 100.0))).unwrap();
//!
//! assert_eq!(net.neighbors("J1").unwrap().len(), 1);
//! assert!(net.remove_node("J1", RemovalMode::Reject).is_err());
//! assert!(net.validate_topology().is_ok());
//! ```

pub mod change;
pub mod control;
pub mod curve;
pub mod element;
pub mod error;
pub mod network;
pub mod patch;
pub mod topology;

// Re-exports for ergonomics
pub use change::{ChangeTarget, NetworkChange};
pub use control::{Control, ControlAction, ControlTrigger};
pub use curve::{Curve, CurveKind, Pattern};
pub use element::{
    Coordinate, Junction, Link, LinkKind, LinkStatus, LinkType, Node, NodeKind, NodeType, Pipe,
    Pump, PumpDrive, QualitySource, Reservoir, SourceKind, Tank, Valve, ValveType,
};
pub use error::{NetworkError, NetworkResult};
pub use network::{Neighbor, Network, RemovalMode, RemovedNode, TopologyPolicy};
pub use patch::{
    JunctionPatch, LinkKindPatch, LinkPatch, NodeKindPatch, NodePatch, Patch, PipePatch,
    PumpPatch, ReservoirPatch, TankPatch, ValvePatch,
};
pub use topology::{TopologyIssue, TopologyReport, TopologyWarning};
