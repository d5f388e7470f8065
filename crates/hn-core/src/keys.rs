//! Keys shared by the engine adapter and the results store.
//!
//! Node and link ids live in separate namespaces, so a result series is
//! addressed by `(ElementKey, Attribute)` where the key carries its kind.

use core::fmt;
use core::str::FromStr;
use std::sync::Arc;

use crate::HnError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ElementKind {
    Node,
    Link,
}

/// Identity of one network element as seen by results consumers.
///
/// The id is shared (`Arc<str>`) so per-step samples clone cheaply.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ElementKey {
    pub kind: ElementKind,
    pub id: Arc<str>,
}

impl ElementKey {
    pub fn node(id: impl AsRef<str>) -> Self {
        Self {
            kind: ElementKind::Node,
            id: Arc::from(id.as_ref()),
        }
    }

    pub fn link(id: impl AsRef<str>) -> Self {
        Self {
            kind: ElementKind::Link,
            id: Arc::from(id.as_ref()),
        }
    }
}

impl fmt::Display for ElementKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ElementKind::Node => write!(f, "node {}", self.id),
            ElementKind::Link => write!(f, "link {}", self.id),
        }
    }
}

/// Result attribute reported per element per step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Attribute {
    /// Node outflow (project flow units).
    Demand,
    /// Hydraulic head (project length units).
    Head,
    /// Pressure (m or psi).
    Pressure,
    /// Link flow (project flow units).
    Flow,
    Velocity,
    Headloss,
    /// 1.0 when open, 0.0 when closed.
    Status,
    /// Concentration, age (hours) or trace percentage; nodes and links.
    Quality,
}

impl Attribute {
    pub const NODE_HYDRAULICS: [Attribute; 3] =
        [Attribute::Demand, Attribute::Head, Attribute::Pressure];
    pub const LINK_HYDRAULICS: [Attribute; 4] = [
        Attribute::Flow,
        Attribute::Velocity,
        Attribute::Headloss,
        Attribute::Status,
    ];

    pub fn applies_to(self, kind: ElementKind) -> bool {
        match self {
            Attribute::Demand | Attribute::Head | Attribute::Pressure => kind == ElementKind::Node,
            Attribute::Flow | Attribute::Velocity | Attribute::Headloss | Attribute::Status => {
                kind == ElementKind::Link
            }
            Attribute::Quality => true,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Attribute::Demand => "demand",
            Attribute::Head => "head",
            Attribute::Pressure => "pressure",
            Attribute::Flow => "flow",
            Attribute::Velocity => "velocity",
            Attribute::Headloss => "headloss",
            Attribute::Status => "status",
            Attribute::Quality => "quality",
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Attribute {
    type Err = HnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let attr = match s.to_ascii_lowercase().as_str() {
            "demand" => Attribute::Demand,
            "head" => Attribute::Head,
            "pressure" => Attribute::Pressure,
            "flow" | "flowrate" => Attribute::Flow,
            "velocity" => Attribute::Velocity,
            "headloss" => Attribute::Headloss,
            "status" => Attribute::Status,
            "quality" => Attribute::Quality,
            _ => {
                return Err(HnError::InvalidArg {
                    what: "unknown attribute name",
                });
            }
        };
        Ok(attr)
    }
}
