//! Network + scenario translated into the engine's input contract.
//!
//! Everything here is SI (m, m³/s, s) and addressed by handle. Curves and
//! patterns are resolved inline so a solver never looks ids up.

use hn_core::{ElementKey, LinkHandle, NodeHandle, UnitConverter};
use hn_network::{
    ControlAction, ControlTrigger, LinkKind, LinkStatus, Network, NodeKind, PumpDrive, SourceKind,
    ValveType,
};
use hn_project::{HeadlossFormula, QualityModel, ScenarioConfig};
use uom::si::length::meter;
use uom::si::volume_rate::cubic_meter_per_second;

use crate::error::{EngineError, EngineResult};
use crate::handles::HandleMap;

#[derive(Debug, Clone, PartialEq)]
pub enum QualityMode {
    None,
    /// First order decay; coefficient in 1/s, negative for decay.
    Chemical { bulk_coeff: f64 },
    Age,
    Trace { node: NodeHandle },
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineOptions {
    pub duration_s: i64,
    pub hydraulic_step_s: i64,
    pub quality_step_s: i64,
    pub pattern_step_s: i64,
    pub pattern_start_s: i64,
    /// Time of day at t = 0.
    pub start_clock_s: i64,
    pub headloss: HeadlossFormula,
    /// Relative to water at 20 °C.
    pub viscosity: f64,
    pub accuracy: f64,
    pub max_trials: u32,
    pub demand_multiplier: f64,
    pub emitter_exponent: f64,
    pub quality: QualityMode,
}

impl EngineOptions {
    /// 0-based pattern period in effect at `time_s`.
    pub fn pattern_period(&self, time_s: i64) -> usize {
        let step = self.pattern_step_s.max(1);
        ((time_s + self.pattern_start_s).max(0) / step) as usize
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeSpecKind {
    Junction {
        demand: f64,
        pattern: Vec<f64>,
        /// Flow per (metre of head)^exponent.
        emitter_coeff: f64,
    },
    Reservoir {
        head: f64,
        pattern: Vec<f64>,
    },
    Tank {
        init_level: f64,
        min_level: f64,
        max_level: f64,
        diameter: f64,
        can_overflow: bool,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceSpec {
    pub kind: SourceKind,
    /// mg/L, or mg/s for mass sources.
    pub strength: f64,
    pub pattern: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeSpec {
    pub handle: NodeHandle,
    pub elevation: f64,
    pub initial_quality: f64,
    pub source: Option<SourceSpec>,
    pub kind: NodeSpecKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LinkSpecKind {
    Pipe {
        length: f64,
        diameter: f64,
        /// HW coefficient, DW roughness height (m) or Manning n.
        roughness: f64,
        minor_loss: f64,
        /// 1/s; `None` uses the scenario's global coefficient.
        bulk_coeff: Option<f64>,
        check_valve: bool,
    },
    Pump {
        /// (flow, head) points, increasing flow.
        curve: Option<Vec<(f64, f64)>>,
        power_kw: Option<f64>,
        speed: f64,
        speed_pattern: Vec<f64>,
    },
    Valve {
        valve_type: ValveType,
        diameter: f64,
        /// Head for PRV/PSV/PBV, flow for FCV, loss coefficient for TCV.
        setting: f64,
        minor_loss: f64,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinkSpec {
    pub handle: LinkHandle,
    pub start: NodeHandle,
    pub end: NodeHandle,
    pub initially_open: bool,
    pub kind: LinkSpecKind,
}

/// Threshold values are SI: pressure head in m at junctions, level in m
/// at tanks, total head in m at reservoirs.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlCondition {
    NodeAbove { node: NodeHandle, value: f64 },
    NodeBelow { node: NodeHandle, value: f64 },
    AtTime { time_s: i64 },
    AtClockTime { time_of_day_s: i64 },
}

/// A link control with its setting already in SI.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlSpec {
    pub link: LinkHandle,
    pub action: ControlAction,
    pub condition: ControlCondition,
}

/// Complete request handed to `Solver::open`.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineInput {
    pub nodes: Vec<NodeSpec>,
    pub links: Vec<LinkSpec>,
    /// In network order; later controls win when several fire together.
    pub controls: Vec<ControlSpec>,
    pub options: EngineOptions,
}

const SECONDS_PER_DAY: f64 = 86_400.0;

impl EngineInput {
    /// Translate `net` under `config`, using the handles in `map`.
    pub fn build(net: &Network, config: &ScenarioConfig, map: &HandleMap) -> EngineResult<Self> {
        let conv = config.converter();
        let o = config.options();

        let pattern = |id: Option<&str>| -> Vec<f64> {
            id.and_then(|id| net.pattern(id))
                .map(|p| p.multipliers.clone())
                .unwrap_or_default()
        };

        let mut nodes = Vec::with_capacity(map.node_count());
        for node in net.nodes() {
            let handle = node_handle(map, &node.id)?;
            let kind = match &node.kind {
                NodeKind::Junction(j) => NodeSpecKind::Junction {
                    demand: flow_si(&conv, j.base_demand),
                    pattern: pattern(j.demand_pattern.as_deref()),
                    emitter_coeff: emitter_si(&conv, j.emitter_coeff, o.emitter_exponent),
                },
                NodeKind::Reservoir(r) => NodeSpecKind::Reservoir {
                    head: length_si(&conv, r.total_head),
                    pattern: pattern(r.head_pattern.as_deref()),
                },
                NodeKind::Tank(t) => NodeSpecKind::Tank {
                    init_level: length_si(&conv, t.init_level),
                    min_level: length_si(&conv, t.min_level),
                    max_level: length_si(&conv, t.max_level),
                    diameter: length_si(&conv, t.diameter),
                    can_overflow: t.can_overflow,
                },
            };
            let source = node.source.as_ref().map(|s| SourceSpec {
                kind: s.kind,
                strength: match s.kind {
                    SourceKind::Mass => s.strength / 60.0,
                    _ => s.strength,
                },
                pattern: pattern(s.pattern.as_deref()),
            });
            nodes.push(NodeSpec {
                handle,
                elevation: length_si(&conv, node.elevation),
                initial_quality: node.initial_quality,
                source,
                kind,
            });
        }

        let mut links = Vec::with_capacity(map.link_count());
        for link in net.links() {
            let handle = map
                .link_handle(&link.id)
                .ok_or_else(|| unmapped(ElementKey::link(&link.id)))?;
            let kind = match &link.kind {
                LinkKind::Pipe(p) => LinkSpecKind::Pipe {
                    length: length_si(&conv, p.length),
                    diameter: conv.diameter_to_si(p.diameter).get::<meter>(),
                    roughness: match o.headloss {
                        HeadlossFormula::Dw => conv.roughness_to_si(p.roughness).get::<meter>(),
                        HeadlossFormula::Hw | HeadlossFormula::Cm => p.roughness,
                    },
                    minor_loss: p.minor_loss,
                    bulk_coeff: (p.bulk_coeff != 0.0).then(|| p.bulk_coeff / SECONDS_PER_DAY),
                    check_valve: p.check_valve,
                },
                LinkKind::Pump(p) => {
                    let (curve, power_kw) = match &p.drive {
                        PumpDrive::Curve(id) => {
                            let points = net
                                .curve(id)
                                .map(|c| {
                                    c.points()
                                        .iter()
                                        .map(|&(q, h)| (flow_si(&conv, q), length_si(&conv, h)))
                                        .collect()
                                })
                                .unwrap_or_default();
                            (Some(points), None)
                        }
                        PumpDrive::Power(kw) => (None, Some(*kw)),
                    };
                    LinkSpecKind::Pump {
                        curve,
                        power_kw,
                        speed: p.speed,
                        speed_pattern: pattern(p.speed_pattern.as_deref()),
                    }
                }
                LinkKind::Valve(v) => LinkSpecKind::Valve {
                    valve_type: v.valve_type,
                    diameter: conv.diameter_to_si(v.diameter).get::<meter>(),
                    setting: valve_setting_si(&conv, v.valve_type, v.setting),
                    minor_loss: v.minor_loss,
                },
            };
            links.push(LinkSpec {
                handle,
                start: node_handle(map, &link.start)?,
                end: node_handle(map, &link.end)?,
                initially_open: link.status == LinkStatus::Open,
                kind,
            });
        }

        let mut controls = Vec::with_capacity(net.controls().len());
        for control in net.controls() {
            let link = net
                .get_link(&control.link)
                .ok_or_else(|| unmapped(ElementKey::link(&control.link)))?;
            let action = match (control.action, &link.kind) {
                (ControlAction::Setting(v), LinkKind::Valve(valve)) => {
                    ControlAction::Setting(valve_setting_si(&conv, valve.valve_type, v))
                }
                (action, _) => action,
            };
            let threshold = |node: &str, value: f64| -> EngineResult<(NodeHandle, f64)> {
                let handle = node_handle(map, node)?;
                let si = match net.get_node(node).map(|n| &n.kind) {
                    Some(NodeKind::Junction(_)) => conv.pressure_to_si(value).get::<meter>(),
                    _ => length_si(&conv, value),
                };
                Ok((handle, si))
            };
            let condition = match &control.trigger {
                ControlTrigger::NodeAbove { node, value } => {
                    let (node, value) = threshold(node, *value)?;
                    ControlCondition::NodeAbove { node, value }
                }
                ControlTrigger::NodeBelow { node, value } => {
                    let (node, value) = threshold(node, *value)?;
                    ControlCondition::NodeBelow { node, value }
                }
                ControlTrigger::AtTime { time_s } => ControlCondition::AtTime {
                    time_s: secs(*time_s),
                },
                ControlTrigger::AtClockTime { time_of_day_s } => ControlCondition::AtClockTime {
                    time_of_day_s: secs(*time_of_day_s),
                },
            };
            controls.push(ControlSpec {
                link: map
                    .link_handle(&control.link)
                    .ok_or_else(|| unmapped(ElementKey::link(&control.link)))?,
                action,
                condition,
            });
        }

        let quality = match &o.quality {
            QualityModel::None => QualityMode::None,
            QualityModel::Chemical { bulk_coeff, .. } => QualityMode::Chemical {
                bulk_coeff: bulk_coeff / SECONDS_PER_DAY,
            },
            QualityModel::Age => QualityMode::Age,
            QualityModel::Trace { node } => QualityMode::Trace {
                node: node_handle(map, node)?,
            },
        };

        Ok(Self {
            nodes,
            links,
            controls,
            options: EngineOptions {
                duration_s: secs(o.duration_s),
                hydraulic_step_s: secs(o.hydraulic_step_s),
                quality_step_s: secs(o.quality_step_s),
                pattern_step_s: secs(o.pattern_step_s),
                pattern_start_s: secs(o.pattern_start_s),
                start_clock_s: secs(o.start_clocktime_s),
                headloss: o.headloss,
                viscosity: o.viscosity,
                accuracy: o.accuracy,
                max_trials: o.max_trials,
                demand_multiplier: o.demand_multiplier,
                emitter_exponent: o.emitter_exponent,
                quality,
            },
        })
    }
}

fn secs(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

fn length_si(conv: &UnitConverter, v: f64) -> f64 {
    conv.length_to_si(v).get::<meter>()
}

fn flow_si(conv: &UnitConverter, v: f64) -> f64 {
    conv.flow_to_si(v).get::<cubic_meter_per_second>()
}

/// Head for PRV/PSV/PBV, flow for FCV, unitless otherwise.
pub(crate) fn valve_setting_si(conv: &UnitConverter, valve_type: ValveType, setting: f64) -> f64 {
    match valve_type {
        ValveType::Prv | ValveType::Psv | ValveType::Pbv => {
            conv.pressure_to_si(setting).get::<meter>()
        }
        ValveType::Fcv => flow_si(conv, setting),
        ValveType::Tcv | ValveType::Gpv => setting,
    }
}

fn emitter_si(conv: &UnitConverter, coeff: f64, exponent: f64) -> f64 {
    if coeff == 0.0 {
        return 0.0;
    }
    let unit_pressure = conv.pressure_to_si(1.0).get::<meter>();
    flow_si(conv, coeff) / unit_pressure.powf(exponent)
}

fn node_handle(map: &HandleMap, id: &str) -> EngineResult<NodeHandle> {
    map.node_handle(id)
        .ok_or_else(|| unmapped(ElementKey::node(id)))
}

fn unmapped(key: ElementKey) -> EngineError {
    EngineError::Open {
        element: Some(key),
        reason: "element has no engine handle".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hn_core::FlowUnits;
    use hn_network::{
        Control, Junction, Link, Node, Pipe, QualitySource, Reservoir, Tank, Valve,
    };
    use hn_project::ScenarioOptions;

    #[test]
    fn us_units_are_converted_to_si() {
        let mut net = Network::new();
        net.add_node(Node::reservoir("R1", Reservoir::with_head(100.0)))
            .unwrap();
        net.add_node(Node::junction("J1", 10.0, Junction::with_demand(100.0)))
            .unwrap();
        net.add_link(Link::pipe("P1", "R1", "J1", Pipe::new(1000.0, 12.0, 130.0)))
            .unwrap();
        net.add_link(Link::valve(
            "V1",
            "R1",
            "J1",
            Valve::new(ValveType::Prv, 12.0, 1.421_970_2),
        ))
        .unwrap();
        let config = ScenarioConfig::create(ScenarioOptions {
            flow_units: FlowUnits::Gpm,
            ..ScenarioOptions::default()
        });
        let map = HandleMap::from_network(&net);
        let input = EngineInput::build(&net, &config, &map).unwrap();

        let j1 = &input.nodes[map.node_handle("J1").unwrap().index() as usize];
        assert!((j1.elevation - 3.048).abs() < 1e-9);
        let NodeSpecKind::Junction { demand, .. } = j1.kind else {
            panic!("J1 is a junction");
        };
        assert!((demand - 100.0 / 15_850.3).abs() < 1e-9);

        let p1 = &input.links[map.link_handle("P1").unwrap().index() as usize];
        let LinkSpecKind::Pipe { diameter, roughness, .. } = p1.kind else {
            panic!("P1 is a pipe");
        };
        assert!((diameter - 0.3048).abs() < 1e-9);
        assert_eq!(roughness, 130.0);

        let v1 = &input.links[map.link_handle("V1").unwrap().index() as usize];
        let LinkSpecKind::Valve { setting, .. } = v1.kind else {
            panic!("V1 is a valve");
        };
        assert!((setting - 1.0).abs() < 1e-6);
        assert_eq!(input.options.duration_s, 86_400);
    }

    #[test]
    fn controls_and_sources_are_converted() {
        let mut net = Network::new();
        net.add_node(
            Node::reservoir("R1", Reservoir::with_head(100.0))
                .with_source(QualitySource::new(SourceKind::Mass, 120.0)),
        )
        .unwrap();
        net.add_node(Node::junction("J1", 10.0, Junction::with_demand(100.0)))
            .unwrap();
        net.add_node(Node::tank(
            "T1",
            20.0,
            Tank {
                init_level: 5.0,
                min_level: 0.0,
                max_level: 20.0,
                diameter: 30.0,
                ..Tank::default()
            },
        ))
        .unwrap();
        net.add_link(Link::valve(
            "V1",
            "R1",
            "J1",
            Valve::new(ValveType::Prv, 12.0, 10.0),
        ))
        .unwrap();
        net.add_link(Link::pipe("P1", "J1", "T1", Pipe::new(1000.0, 12.0, 130.0)))
            .unwrap();
        for text in [
            "LINK V1 1.421970 IF NODE J1 BELOW 1.421970",
            "LINK P1 CLOSED IF NODE T1 ABOVE 10",
            "LINK P1 OPEN AT CLOCKTIME 6:00",
        ] {
            net.add_control(text.parse::<Control>().unwrap()).unwrap();
        }
        let config = ScenarioConfig::create(ScenarioOptions {
            flow_units: FlowUnits::Gpm,
            start_clocktime_s: 3600,
            ..ScenarioOptions::default()
        });
        let map = HandleMap::from_network(&net);
        let input = EngineInput::build(&net, &config, &map).unwrap();

        let r1 = &input.nodes[map.node_handle("R1").unwrap().index() as usize];
        let source = r1.source.as_ref().unwrap();
        assert_eq!(source.kind, SourceKind::Mass);
        assert!((source.strength - 2.0).abs() < 1e-12);

        assert_eq!(input.controls.len(), 3);
        let ControlAction::Setting(setting) = input.controls[0].action else {
            panic!("valve control carries a setting");
        };
        assert!((setting - 1.0).abs() < 1e-6);
        let ControlCondition::NodeBelow { value, .. } = input.controls[0].condition else {
            panic!("junction pressure trigger");
        };
        assert!((value - 1.0).abs() < 1e-6);
        let ControlCondition::NodeAbove { node, value } = input.controls[1].condition else {
            panic!("tank level trigger");
        };
        assert_eq!(node, map.node_handle("T1").unwrap());
        assert!((value - 3.048).abs() < 1e-9);
        assert_eq!(
            input.controls[2].condition,
            ControlCondition::AtClockTime {
                time_of_day_s: 21_600
            }
        );
        assert_eq!(input.options.start_clock_s, 3600);
    }
}
