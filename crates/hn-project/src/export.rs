//! Network -> records.

use hn_network::{
    Control, ControlAction, ControlTrigger, CurveKind, LinkKind, LinkStatus, Network, NodeKind,
    PumpDrive, QualitySource, SourceKind, ValveType,
};

use crate::schema::{
    ControlActionRecord, ControlRecord, ControlTriggerRecord, CurveKindRecord, CurveRecord,
    LinkKindRecord, LinkRecord, NetworkRecords, NodeKindRecord, NodeRecord, PatternRecord,
    SourceKindRecord, SourceRecord, StatusRecord, ValveTypeRecord,
};

/// Records for every element, each list in id order; controls keep
/// their network order.
pub fn export_network(net: &Network) -> NetworkRecords {
    NetworkRecords {
        nodes: net
            .nodes()
            .map(|n| NodeRecord {
                id: n.id.clone(),
                x: n.coordinate.x,
                y: n.coordinate.y,
                elevation: n.elevation,
                initial_quality: n.initial_quality,
                source: n.source.as_ref().map(source_record),
                kind: match &n.kind {
                    NodeKind::Junction(j) => NodeKindRecord::Junction {
                        base_demand: j.base_demand,
                        demand_pattern: j.demand_pattern.clone(),
                        emitter_coeff: j.emitter_coeff,
                    },
                    NodeKind::Reservoir(r) => NodeKindRecord::Reservoir {
                        total_head: r.total_head,
                        head_pattern: r.head_pattern.clone(),
                    },
                    NodeKind::Tank(t) => NodeKindRecord::Tank {
                        init_level: t.init_level,
                        min_level: t.min_level,
                        max_level: t.max_level,
                        diameter: t.diameter,
                        min_volume: t.min_volume,
                        can_overflow: t.can_overflow,
                    },
                },
            })
            .collect(),
        links: net
            .links()
            .map(|l| LinkRecord {
                id: l.id.clone(),
                start: l.start.clone(),
                end: l.end.clone(),
                status: match l.status {
                    LinkStatus::Open => StatusRecord::Open,
                    LinkStatus::Closed => StatusRecord::Closed,
                },
                kind: link_kind_record(&l.kind),
            })
            .collect(),
        curves: net
            .curves()
            .map(|c| CurveRecord {
                id: c.id.clone(),
                kind: match c.kind {
                    CurveKind::Volume => CurveKindRecord::Volume,
                    CurveKind::Pump => CurveKindRecord::Pump,
                    CurveKind::Efficiency => CurveKindRecord::Efficiency,
                    CurveKind::Headloss => CurveKindRecord::Headloss,
                    CurveKind::Generic => CurveKindRecord::Generic,
                },
                points: c.points().to_vec(),
            })
            .collect(),
        patterns: net
            .patterns()
            .map(|p| PatternRecord {
                id: p.id.clone(),
                multipliers: p.multipliers.clone(),
            })
            .collect(),
        controls: net.controls().iter().map(control_record).collect(),
    }
}

fn source_record(source: &QualitySource) -> SourceRecord {
    SourceRecord {
        kind: match source.kind {
            SourceKind::Concentration => SourceKindRecord::Concen,
            SourceKind::Mass => SourceKindRecord::Mass,
            SourceKind::Setpoint => SourceKindRecord::Setpoint,
            SourceKind::FlowPaced => SourceKindRecord::Flowpaced,
        },
        strength: source.strength,
        pattern: source.pattern.clone(),
    }
}

fn control_record(control: &Control) -> ControlRecord {
    ControlRecord {
        link: control.link.clone(),
        action: match control.action {
            ControlAction::Open => ControlActionRecord::Open,
            ControlAction::Closed => ControlActionRecord::Closed,
            ControlAction::Setting(value) => ControlActionRecord::Setting { value },
        },
        trigger: match &control.trigger {
            ControlTrigger::NodeAbove { node, value } => ControlTriggerRecord::NodeAbove {
                node: node.clone(),
                value: *value,
            },
            ControlTrigger::NodeBelow { node, value } => ControlTriggerRecord::NodeBelow {
                node: node.clone(),
                value: *value,
            },
            ControlTrigger::AtTime { time_s } => ControlTriggerRecord::AtTime { time_s: *time_s },
            ControlTrigger::AtClockTime { time_of_day_s } => ControlTriggerRecord::AtClockTime {
                time_of_day_s: *time_of_day_s,
            },
        },
    }
}

fn link_kind_record(kind: &LinkKind) -> LinkKindRecord {
    match kind {
        LinkKind::Pipe(p) => LinkKindRecord::Pipe {
            length: p.length,
            diameter: p.diameter,
            roughness: p.roughness,
            minor_loss: p.minor_loss,
            bulk_coeff: p.bulk_coeff,
            wall_coeff: p.wall_coeff,
            check_valve: p.check_valve,
        },
        LinkKind::Pump(p) => {
            let (curve, power_kw) = match &p.drive {
                PumpDrive::Curve(id) => (Some(id.clone()), None),
                PumpDrive::Power(kw) => (None, Some(*kw)),
            };
            LinkKindRecord::Pump {
                curve,
                power_kw,
                speed: p.speed,
                speed_pattern: p.speed_pattern.clone(),
            }
        }
        LinkKind::Valve(v) => LinkKindRecord::Valve {
            valve_type: match v.valve_type {
                ValveType::Prv => ValveTypeRecord::Prv,
                ValveType::Psv => ValveTypeRecord::Psv,
                ValveType::Pbv => ValveTypeRecord::Pbv,
                ValveType::Fcv => ValveTypeRecord::Fcv,
                ValveType::Tcv => ValveTypeRecord::Tcv,
                ValveType::Gpv => ValveTypeRecord::Gpv,
            },
            diameter: v.diameter,
            setting: v.setting,
            minor_loss: v.minor_loss,
        },
    }
}
