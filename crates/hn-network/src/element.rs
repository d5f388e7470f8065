//! Node and link element types.
//!
//! Type-specific attributes are a closed set of tagged variants: a junction
//! cannot carry tank levels, and patches are checked against the variant.

use hn_core::{HnResult, ensure_finite, ensure_non_negative, ensure_positive};

use crate::error::{NetworkError, NetworkResult};

/// Map position, used for topology checks only.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Coordinate {
    pub x: f64,
    pub y: f64,
}

impl Coordinate {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    Junction,
    Reservoir,
    Tank,
}

impl NodeType {
    pub fn name(self) -> &'static str {
        match self {
            NodeType::Junction => "junction",
            NodeType::Reservoir => "reservoir",
            NodeType::Tank => "tank",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Junction {
    /// Base demand in project flow units.
    pub base_demand: f64,
    pub demand_pattern: Option<String>,
    pub emitter_coeff: f64,
}

impl Junction {
    pub fn with_demand(base_demand: f64) -> Self {
        Self {
            base_demand,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Reservoir {
    /// Fixed total head in project length units.
    pub total_head: f64,
    pub head_pattern: Option<String>,
}

impl Reservoir {
    pub fn with_head(total_head: f64) -> Self {
        Self {
            total_head,
            head_pattern: None,
        }
    }
}

/// Cylindrical storage tank; levels are measured above the tank elevation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Tank {
    pub init_level: f64,
    pub min_level: f64,
    pub max_level: f64,
    pub diameter: f64,
    pub min_volume: f64,
    pub can_overflow: bool,
}

impl Tank {
    pub fn area(&self) -> f64 {
        let r = self.diameter / 2.0;
        core::f64::consts::PI * r * r
    }

    pub fn volume_at_level(&self, level: f64) -> f64 {
        self.area() * level
    }

    pub fn level_at_volume(&self, volume: f64) -> f64 {
        let area = self.area();
        if area > 0.0 { volume / area } else { 0.0 }
    }
}

/// How a source node injects its constituent into the water it releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SourceKind {
    /// Fixes the concentration of external inflow (reservoirs, negative demands).
    #[default]
    Concentration,
    /// Adds a fixed mass rate, in mass units per minute, to the outflow.
    Mass,
    /// Raises the outflow concentration to at least the strength.
    Setpoint,
    /// Adds the strength to the outflow concentration.
    FlowPaced,
}

impl SourceKind {
    pub fn name(self) -> &'static str {
        match self {
            SourceKind::Concentration => "CONCEN",
            SourceKind::Mass => "MASS",
            SourceKind::Setpoint => "SETPOINT",
            SourceKind::FlowPaced => "FLOWPACED",
        }
    }
}

/// Water quality source attached to a node.
#[derive(Debug, Clone, PartialEq)]
pub struct QualitySource {
    pub kind: SourceKind,
    /// Concentration in mg/L, or mg/min for mass sources.
    pub strength: f64,
    pub pattern: Option<String>,
}

impl QualitySource {
    pub fn new(kind: SourceKind, strength: f64) -> Self {
        Self {
            kind,
            strength,
            pattern: None,
        }
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Junction(Junction),
    Reservoir(Reservoir),
    Tank(Tank),
}

impl NodeKind {
    pub fn node_type(&self) -> NodeType {
        match self {
            NodeKind::Junction(_) => NodeType::Junction,
            NodeKind::Reservoir(_) => NodeType::Reservoir,
            NodeKind::Tank(_) => NodeType::Tank,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: String,
    pub coordinate: Coordinate,
    pub elevation: f64,
    pub initial_quality: f64,
    pub source: Option<QualitySource>,
    pub kind: NodeKind,
}

impl Node {
    pub fn new(id: impl Into<String>, elevation: f64, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            coordinate: Coordinate::default(),
            elevation,
            initial_quality: 0.0,
            source: None,
            kind,
        }
    }

    pub fn junction(id: impl Into<String>, elevation: f64, junction: Junction) -> Self {
        Self::new(id, elevation, NodeKind::Junction(junction))
    }

    pub fn reservoir(id: impl Into<String>, reservoir: Reservoir) -> Self {
        Self::new(id, 0.0, NodeKind::Reservoir(reservoir))
    }

    pub fn tank(id: impl Into<String>, elevation: f64, tank: Tank) -> Self {
        Self::new(id, elevation, NodeKind::Tank(tank))
    }

    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.coordinate = Coordinate::new(x, y);
        self
    }

    pub fn with_source(mut self, source: QualitySource) -> Self {
        self.source = Some(source);
        self
    }

    pub fn node_type(&self) -> NodeType {
        self.kind.node_type()
    }

    /// Reservoirs and tanks fix the head at their node.
    pub fn is_fixed_head(&self) -> bool {
        !matches!(self.kind, NodeKind::Junction(_))
    }

    pub fn demand_pattern(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Junction(j) => j.demand_pattern.as_deref(),
            NodeKind::Reservoir(r) => r.head_pattern.as_deref(),
            NodeKind::Tank(_) => None,
        }
    }

    pub(crate) fn validate(&self) -> NetworkResult<()> {
        let id = self.id.as_str();
        if id.is_empty() {
            return Err(NetworkError::invalid(id, "id", "must not be empty"));
        }
        finite(id, "elevation", self.elevation)?;
        finite(id, "x", self.coordinate.x)?;
        finite(id, "y", self.coordinate.y)?;
        non_negative(id, "initial_quality", self.initial_quality)?;
        if let Some(source) = &self.source {
            non_negative(id, "source_strength", source.strength)?;
        }
        match &self.kind {
            NodeKind::Junction(j) => {
                finite(id, "base_demand", j.base_demand)?;
                non_negative(id, "emitter_coeff", j.emitter_coeff)?;
            }
            NodeKind::Reservoir(r) => {
                finite(id, "total_head", r.total_head)?;
            }
            NodeKind::Tank(t) => {
                non_negative(id, "min_level", t.min_level)?;
                non_negative(id, "diameter", t.diameter)?;
                non_negative(id, "min_volume", t.min_volume)?;
                finite(id, "max_level", t.max_level)?;
                finite(id, "init_level", t.init_level)?;
                if t.max_level < t.min_level {
                    return Err(NetworkError::invalid(id, "max_level", "below min_level"));
                }
                if t.init_level < t.min_level || t.init_level > t.max_level {
                    return Err(NetworkError::invalid(
                        id,
                        "init_level",
                        "outside [min_level, max_level]",
                    ));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LinkStatus {
    #[default]
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkType {
    Pipe,
    Pump,
    Valve,
}

impl LinkType {
    pub fn name(self) -> &'static str {
        match self {
            LinkType::Pipe => "pipe",
            LinkType::Pump => "pump",
            LinkType::Valve => "valve",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pipe {
    /// Length in project length units.
    pub length: f64,
    /// Diameter in mm or inches.
    pub diameter: f64,
    /// Hazen-Williams C, Darcy-Weisbach roughness (mm) or Manning n.
    pub roughness: f64,
    pub minor_loss: f64,
    pub bulk_coeff: f64,
    pub wall_coeff: f64,
    pub check_valve: bool,
}

impl Pipe {
    pub fn new(length: f64, diameter: f64, roughness: f64) -> Self {
        Self {
            length,
            diameter,
            roughness,
            minor_loss: 0.0,
            bulk_coeff: 0.0,
            wall_coeff: 0.0,
            check_valve: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PumpDrive {
    /// Head curve id.
    Curve(String),
    /// Constant power in kW.
    Power(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pump {
    pub drive: PumpDrive,
    /// Relative speed setting.
    pub speed: f64,
    pub speed_pattern: Option<String>,
}

impl Pump {
    pub fn with_curve(curve: impl Into<String>) -> Self {
        Self {
            drive: PumpDrive::Curve(curve.into()),
            speed: 1.0,
            speed_pattern: None,
        }
    }

    pub fn with_power(kw: f64) -> Self {
        Self {
            drive: PumpDrive::Power(kw),
            speed: 1.0,
            speed_pattern: None,
        }
    }

    pub fn curve_id(&self) -> Option<&str> {
        match &self.drive {
            PumpDrive::Curve(id) => Some(id),
            PumpDrive::Power(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValveType {
    /// Pressure reducing
    Prv,
    /// Pressure sustaining
    Psv,
    /// Pressure breaker
    Pbv,
    /// Flow control
    Fcv,
    /// Throttle control
    Tcv,
    /// General purpose
    Gpv,
}

impl ValveType {
    pub fn name(self) -> &'static str {
        match self {
            ValveType::Prv => "Pressure Reducing Valve",
            ValveType::Psv => "Pressure Sustaining Valve",
            ValveType::Pbv => "Pressure Breaker Valve",
            ValveType::Fcv => "Flow Control Valve",
            ValveType::Tcv => "Throttle Control Valve",
            ValveType::Gpv => "General Purpose Valve",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Valve {
    pub valve_type: ValveType,
    pub diameter: f64,
    /// Pressure, flow or loss coefficient depending on the valve type.
    pub setting: f64,
    pub minor_loss: f64,
}

impl Valve {
    pub fn new(valve_type: ValveType, diameter: f64, setting: f64) -> Self {
        Self {
            valve_type,
            diameter,
            setting,
            minor_loss: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LinkKind {
    Pipe(Pipe),
    Pump(Pump),
    Valve(Valve),
}

impl LinkKind {
    pub fn link_type(&self) -> LinkType {
        match self {
            LinkKind::Pipe(_) => LinkType::Pipe,
            LinkKind::Pump(_) => LinkType::Pump,
            LinkKind::Valve(_) => LinkType::Valve,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    pub id: String,
    pub start: String,
    pub end: String,
    pub status: LinkStatus,
    pub kind: LinkKind,
}

impl Link {
    pub fn new(
        id: impl Into<String>,
        start: impl Into<String>,
        end: impl Into<String>,
        kind: LinkKind,
    ) -> Self {
        Self {
            id: id.into(),
            start: start.into(),
            end: end.into(),
            status: LinkStatus::Open,
            kind,
        }
    }

    pub fn pipe(
        id: impl Into<String>,
        start: impl Into<String>,
        end: impl Into<String>,
        pipe: Pipe,
    ) -> Self {
        Self::new(id, start, end, LinkKind::Pipe(pipe))
    }

    pub fn pump(
        id: impl Into<String>,
        start: impl Into<String>,
        end: impl Into<String>,
        pump: Pump,
    ) -> Self {
        Self::new(id, start, end, LinkKind::Pump(pump))
    }

    pub fn valve(
        id: impl Into<String>,
        start: impl Into<String>,
        end: impl Into<String>,
        valve: Valve,
    ) -> Self {
        Self::new(id, start, end, LinkKind::Valve(valve))
    }

    pub fn closed(mut self) -> Self {
        self.status = LinkStatus::Closed;
        self
    }

    pub fn link_type(&self) -> LinkType {
        self.kind.link_type()
    }

    /// The endpoint across this link from `node`, if `node` is an endpoint.
    pub fn other_end(&self, node: &str) -> Option<&str> {
        if self.start == node {
            Some(&self.end)
        } else if self.end == node {
            Some(&self.start)
        } else {
            None
        }
    }

    pub(crate) fn validate(&self) -> NetworkResult<()> {
        let id = self.id.as_str();
        if id.is_empty() {
            return Err(NetworkError::invalid(id, "id", "must not be empty"));
        }
        match &self.kind {
            LinkKind::Pipe(p) => {
                positive(id, "length", p.length)?;
                positive(id, "diameter", p.diameter)?;
                positive(id, "roughness", p.roughness)?;
                non_negative(id, "minor_loss", p.minor_loss)?;
                finite(id, "bulk_coeff", p.bulk_coeff)?;
                finite(id, "wall_coeff", p.wall_coeff)?;
            }
            LinkKind::Pump(p) => {
                non_negative(id, "speed", p.speed)?;
                if let PumpDrive::Power(kw) = p.drive {
                    positive(id, "power", kw)?;
                }
            }
            LinkKind::Valve(v) => {
                positive(id, "diameter", v.diameter)?;
                finite(id, "setting", v.setting)?;
                non_negative(id, "minor_loss", v.minor_loss)?;
            }
        }
        Ok(())
    }
}

fn finite(id: &str, field: &'static str, v: f64) -> NetworkResult<()> {
    attribute(id, field, ensure_finite(v, field))
}

fn non_negative(id: &str, field: &'static str, v: f64) -> NetworkResult<()> {
    attribute(id, field, ensure_non_negative(v, field))
}

fn positive(id: &str, field: &'static str, v: f64) -> NetworkResult<()> {
    attribute(id, field, ensure_positive(v, field))
}

fn attribute(id: &str, field: &'static str, checked: HnResult<f64>) -> NetworkResult<()> {
    checked
        .map(|_| ())
        .map_err(|err| NetworkError::invalid(id, field, err.to_string()))
}
