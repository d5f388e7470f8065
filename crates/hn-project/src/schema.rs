//! Record types at the persistence boundary.
//!
//! Records carry no file syntax of their own; they serialise with serde
//! to whatever format the caller picks.

use serde::{Deserialize, Serialize};

use crate::scenario::ScenarioOptions;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectFile {
    pub version: u32,
    pub name: String,
    #[serde(default)]
    pub network: NetworkRecords,
    #[serde(default)]
    pub scenario: ScenarioOptions,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct NetworkRecords {
    #[serde(default)]
    pub nodes: Vec<NodeRecord>,
    #[serde(default)]
    pub links: Vec<LinkRecord>,
    #[serde(default)]
    pub curves: Vec<CurveRecord>,
    #[serde(default)]
    pub patterns: Vec<PatternRecord>,
    /// Applied in list order; not reordered by `sorted`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub controls: Vec<ControlRecord>,
}

impl NetworkRecords {
    /// Sort every list by id so two record sets compare independent of order.
    pub fn sorted(mut self) -> Self {
        self.nodes.sort_by(|a, b| a.id.cmp(&b.id));
        self.links.sort_by(|a, b| a.id.cmp(&b.id));
        self.curves.sort_by(|a, b| a.id.cmp(&b.id));
        self.patterns.sort_by(|a, b| a.id.cmp(&b.id));
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeRecord {
    pub id: String,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub elevation: f64,
    #[serde(default)]
    pub initial_quality: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceRecord>,
    pub kind: NodeKindRecord,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum SourceKindRecord {
    #[default]
    Concen,
    Mass,
    Setpoint,
    Flowpaced,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceRecord {
    #[serde(default)]
    pub kind: SourceKindRecord,
    pub strength: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum NodeKindRecord {
    Junction {
        #[serde(default)]
        base_demand: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        demand_pattern: Option<String>,
        #[serde(default)]
        emitter_coeff: f64,
    },
    Reservoir {
        total_head: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        head_pattern: Option<String>,
    },
    Tank {
        init_level: f64,
        #[serde(default)]
        min_level: f64,
        max_level: f64,
        diameter: f64,
        #[serde(default)]
        min_volume: f64,
        #[serde(default)]
        can_overflow: bool,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum StatusRecord {
    #[default]
    Open,
    Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LinkRecord {
    pub id: String,
    pub start: String,
    pub end: String,
    #[serde(default)]
    pub status: StatusRecord,
    pub kind: LinkKindRecord,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum LinkKindRecord {
    Pipe {
        length: f64,
        diameter: f64,
        roughness: f64,
        #[serde(default)]
        minor_loss: f64,
        #[serde(default)]
        bulk_coeff: f64,
        #[serde(default)]
        wall_coeff: f64,
        #[serde(default)]
        check_valve: bool,
    },
    /// Exactly one of `curve` or `power_kw` must be given.
    Pump {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        curve: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        power_kw: Option<f64>,
        #[serde(default = "default_speed")]
        speed: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        speed_pattern: Option<String>,
    },
    Valve {
        valve_type: ValveTypeRecord,
        diameter: f64,
        setting: f64,
        #[serde(default)]
        minor_loss: f64,
    },
}

fn default_speed() -> f64 {
    1.0
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ValveTypeRecord {
    Prv,
    Psv,
    Pbv,
    Fcv,
    Tcv,
    Gpv,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum CurveKindRecord {
    Volume,
    Pump,
    Efficiency,
    Headloss,
    #[default]
    Generic,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CurveRecord {
    pub id: String,
    #[serde(default)]
    pub kind: CurveKindRecord,
    /// (x, y) pairs in increasing x.
    pub points: Vec<(f64, f64)>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatternRecord {
    pub id: String,
    pub multipliers: Vec<f64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ControlActionRecord {
    Open,
    Closed,
    Setting { value: f64 },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ControlTriggerRecord {
    NodeAbove { node: String, value: f64 },
    NodeBelow { node: String, value: f64 },
    AtTime { time_s: u64 },
    AtClockTime { time_of_day_s: u64 },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ControlRecord {
    pub link: String,
    pub action: ControlActionRecord,
    pub trigger: ControlTriggerRecord,
}
