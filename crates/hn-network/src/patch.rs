//! Typed attribute patches.
//!
//! A patch names the element type it expects. Applying a tank patch to a
//! junction fails with `PatchMismatch` instead of silently ignoring fields.
//! Every field is optional; `None` leaves the attribute untouched.

use crate::element::{
    Coordinate, Link, LinkKind, LinkStatus, Node, NodeKind, PumpDrive, QualitySource, ValveType,
};
use crate::error::{NetworkError, NetworkResult};

#[derive(Debug, Clone, PartialEq)]
pub enum Patch {
    Node(NodePatch),
    Link(LinkPatch),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct NodePatch {
    pub coordinate: Option<Coordinate>,
    pub elevation: Option<f64>,
    pub initial_quality: Option<f64>,
    /// `Some(None)` removes the quality source.
    pub source: Option<Option<QualitySource>>,
    pub kind: Option<NodeKindPatch>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKindPatch {
    Junction(JunctionPatch),
    Reservoir(ReservoirPatch),
    Tank(TankPatch),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct JunctionPatch {
    pub base_demand: Option<f64>,
    /// `Some(None)` clears the pattern.
    pub demand_pattern: Option<Option<String>>,
    pub emitter_coeff: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReservoirPatch {
    pub total_head: Option<f64>,
    pub head_pattern: Option<Option<String>>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TankPatch {
    pub init_level: Option<f64>,
    pub min_level: Option<f64>,
    pub max_level: Option<f64>,
    pub diameter: Option<f64>,
    pub min_volume: Option<f64>,
    pub can_overflow: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct LinkPatch {
    pub status: Option<LinkStatus>,
    pub kind: Option<LinkKindPatch>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LinkKindPatch {
    Pipe(PipePatch),
    Pump(PumpPatch),
    Valve(ValvePatch),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PipePatch {
    pub length: Option<f64>,
    pub diameter: Option<f64>,
    pub roughness: Option<f64>,
    pub minor_loss: Option<f64>,
    pub bulk_coeff: Option<f64>,
    pub wall_coeff: Option<f64>,
    pub check_valve: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PumpPatch {
    pub drive: Option<PumpDrive>,
    pub speed: Option<f64>,
    pub speed_pattern: Option<Option<String>>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ValvePatch {
    pub valve_type: Option<ValveType>,
    pub diameter: Option<f64>,
    pub setting: Option<f64>,
    pub minor_loss: Option<f64>,
}

fn set<T>(slot: &mut T, value: Option<T>) {
    if let Some(v) = value {
        *slot = v;
    }
}

impl NodeKindPatch {
    fn expected(&self) -> &'static str {
        match self {
            NodeKindPatch::Junction(_) => "junction",
            NodeKindPatch::Reservoir(_) => "reservoir",
            NodeKindPatch::Tank(_) => "tank",
        }
    }
}

impl LinkKindPatch {
    fn expected(&self) -> &'static str {
        match self {
            LinkKindPatch::Pipe(_) => "pipe",
            LinkKindPatch::Pump(_) => "pump",
            LinkKindPatch::Valve(_) => "valve",
        }
    }
}

impl NodePatch {
    /// Apply onto `node` in place. Callers work on a copy so failure is atomic.
    pub(crate) fn apply(self, node: &mut Node) -> NetworkResult<()> {
        set(&mut node.coordinate, self.coordinate);
        set(&mut node.elevation, self.elevation);
        set(&mut node.initial_quality, self.initial_quality);
        set(&mut node.source, self.source);
        let Some(kind) = self.kind else {
            return Ok(());
        };
        let expected = kind.expected();
        match (kind, &mut node.kind) {
            (NodeKindPatch::Junction(p), NodeKind::Junction(j)) => {
                set(&mut j.base_demand, p.base_demand);
                set(&mut j.demand_pattern, p.demand_pattern);
                set(&mut j.emitter_coeff, p.emitter_coeff);
            }
            (NodeKindPatch::Reservoir(p), NodeKind::Reservoir(r)) => {
                set(&mut r.total_head, p.total_head);
                set(&mut r.head_pattern, p.head_pattern);
            }
            (NodeKindPatch::Tank(p), NodeKind::Tank(t)) => {
                set(&mut t.init_level, p.init_level);
                set(&mut t.min_level, p.min_level);
                set(&mut t.max_level, p.max_level);
                set(&mut t.diameter, p.diameter);
                set(&mut t.min_volume, p.min_volume);
                set(&mut t.can_overflow, p.can_overflow);
            }
            (_, other) => {
                return Err(NetworkError::PatchMismatch {
                    id: node.id.clone(),
                    expected,
                    found: other.node_type().name(),
                });
            }
        }
        Ok(())
    }
}

impl LinkPatch {
    /// Apply onto `link` in place. Callers work on a copy so failure is atomic.
    pub(crate) fn apply(self, link: &mut Link) -> NetworkResult<()> {
        set(&mut link.status, self.status);
        let Some(kind) = self.kind else {
            return Ok(());
        };
        let expected = kind.expected();
        match (kind, &mut link.kind) {
            (LinkKindPatch::Pipe(p), LinkKind::Pipe(pipe)) => {
                set(&mut pipe.length, p.length);
                set(&mut pipe.diameter, p.diameter);
                set(&mut pipe.roughness, p.roughness);
                set(&mut pipe.minor_loss, p.minor_loss);
                set(&mut pipe.bulk_coeff, p.bulk_coeff);
                set(&mut pipe.wall_coeff, p.wall_coeff);
                set(&mut pipe.check_valve, p.check_valve);
            }
            (LinkKindPatch::Pump(p), LinkKind::Pump(pump)) => {
                set(&mut pump.drive, p.drive);
                set(&mut pump.speed, p.speed);
                set(&mut pump.speed_pattern, p.speed_pattern);
            }
            (LinkKindPatch::Valve(p), LinkKind::Valve(valve)) => {
                set(&mut valve.valve_type, p.valve_type);
                set(&mut valve.diameter, p.diameter);
                set(&mut valve.setting, p.setting);
                set(&mut valve.minor_loss, p.minor_loss);
            }
            (_, other) => {
                return Err(NetworkError::PatchMismatch {
                    id: link.id.clone(),
                    expected,
                    found: other.link_type().name(),
                });
            }
        }
        Ok(())
    }
}
