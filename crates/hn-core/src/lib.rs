//! hn-core: stable foundation for hydronet.
//!
//! Contains:
//! - ids (run ids and compact engine handles)
//! - keys (element keys and result attributes shared by engine and store)
//! - numeric (Real + tolerances + float helpers)
//! - units (uom SI types, flow units and project/SI conversion)
//! - error (shared error types)

pub mod error;
pub mod ids;
pub mod keys;
pub mod numeric;
pub mod units;

// Re-exports: nice ergonomics for downstream crates
pub use error::{HnError, HnResult};
pub use ids::*;
pub use keys::*;
pub use numeric::*;
pub use units::*;
