//! Records -> Network.

use std::fmt;

use hn_network::{
    Control, ControlAction, ControlTrigger, Coordinate, Curve, CurveKind, Junction, Link,
    LinkKind, LinkStatus, Network, NetworkError, Node, NodeKind, Pattern, Pipe, Pump, PumpDrive,
    QualitySource, Reservoir, SourceKind, Tank, TopologyPolicy, Valve, ValveType,
};

use crate::schema::{
    ControlActionRecord, ControlRecord, ControlTriggerRecord, CurveKindRecord, CurveRecord,
    LinkKindRecord, LinkRecord, NetworkRecords, NodeKindRecord, NodeRecord, PatternRecord,
    SourceKindRecord, SourceRecord, StatusRecord, ValveTypeRecord,
};

/// One record that could not be imported.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportProblem {
    /// `"node J1"`, `"link P3"`, ...
    pub record: String,
    pub error: NetworkError,
}

impl fmt::Display for ImportProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.record, self.error)
    }
}

/// Every record that failed, in the order they were tried.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("{} record(s) could not be imported: {}", problems.len(), join(problems))]
pub struct ImportError {
    pub problems: Vec<ImportProblem>,
}

fn join(problems: &[ImportProblem]) -> String {
    problems
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

pub fn import_network(records: &NetworkRecords) -> Result<Network, ImportError> {
    import_network_with_policy(records, TopologyPolicy::default())
}

/// Build a network from records, collecting every failure instead of
/// stopping at the first one.
///
/// Patterns and curves go in first so that elements can reference them;
/// controls go in last.
pub fn import_network_with_policy(
    records: &NetworkRecords,
    policy: TopologyPolicy,
) -> Result<Network, ImportError> {
    let mut net = Network::with_policy(policy);
    let mut problems = Vec::new();

    for rec in &records.patterns {
        let result = Pattern::new(rec.id.clone(), rec.multipliers.clone())
            .and_then(|p| net.add_pattern(p));
        note(&mut problems, "pattern", &rec.id, result);
    }
    for rec in &records.curves {
        let result = curve_from(rec).and_then(|c| net.add_curve(c));
        note(&mut problems, "curve", &rec.id, result);
    }
    for rec in &records.nodes {
        let result = net.add_node(node_from(rec));
        note(&mut problems, "node", &rec.id, result);
    }
    for rec in &records.links {
        let result = link_from(rec).and_then(|l| net.add_link(l));
        note(&mut problems, "link", &rec.id, result);
    }
    for (i, rec) in records.controls.iter().enumerate() {
        let result = net.add_control(control_from(rec));
        note(&mut problems, "control", &format!("#{i} on {}", rec.link), result);
    }

    if problems.is_empty() {
        // Import is a load, not an edit.
        net.drain_changes();
        Ok(net)
    } else {
        Err(ImportError { problems })
    }
}

fn note(problems: &mut Vec<ImportProblem>, what: &str, id: &str, result: Result<(), NetworkError>) {
    if let Err(error) = result {
        problems.push(ImportProblem {
            record: format!("{what} {id}"),
            error,
        });
    }
}

fn curve_from(rec: &CurveRecord) -> Result<Curve, NetworkError> {
    let kind = match rec.kind {
        CurveKindRecord::Volume => CurveKind::Volume,
        CurveKindRecord::Pump => CurveKind::Pump,
        CurveKindRecord::Efficiency => CurveKind::Efficiency,
        CurveKindRecord::Headloss => CurveKind::Headloss,
        CurveKindRecord::Generic => CurveKind::Generic,
    };
    Curve::new(rec.id.clone(), kind, rec.points.clone())
}

fn node_from(rec: &NodeRecord) -> Node {
    let kind = match &rec.kind {
        NodeKindRecord::Junction {
            base_demand,
            demand_pattern,
            emitter_coeff,
        } => NodeKind::Junction(Junction {
            base_demand: *base_demand,
            demand_pattern: demand_pattern.clone(),
            emitter_coeff: *emitter_coeff,
        }),
        NodeKindRecord::Reservoir {
            total_head,
            head_pattern,
        } => NodeKind::Reservoir(Reservoir {
            total_head: *total_head,
            head_pattern: head_pattern.clone(),
        }),
        NodeKindRecord::Tank {
            init_level,
            min_level,
            max_level,
            diameter,
            min_volume,
            can_overflow,
        } => NodeKind::Tank(Tank {
            init_level: *init_level,
            min_level: *min_level,
            max_level: *max_level,
            diameter: *diameter,
            min_volume: *min_volume,
            can_overflow: *can_overflow,
        }),
    };
    let mut node = Node::new(rec.id.clone(), rec.elevation, kind);
    node.coordinate = Coordinate::new(rec.x, rec.y);
    node.initial_quality = rec.initial_quality;
    node.source = rec.source.as_ref().map(source_from);
    node
}

fn source_from(rec: &SourceRecord) -> QualitySource {
    QualitySource {
        kind: match rec.kind {
            SourceKindRecord::Concen => SourceKind::Concentration,
            SourceKindRecord::Mass => SourceKind::Mass,
            SourceKindRecord::Setpoint => SourceKind::Setpoint,
            SourceKindRecord::Flowpaced => SourceKind::FlowPaced,
        },
        strength: rec.strength,
        pattern: rec.pattern.clone(),
    }
}

fn control_from(rec: &ControlRecord) -> Control {
    let action = match rec.action {
        ControlActionRecord::Open => ControlAction::Open,
        ControlActionRecord::Closed => ControlAction::Closed,
        ControlActionRecord::Setting { value } => ControlAction::Setting(value),
    };
    let trigger = match &rec.trigger {
        ControlTriggerRecord::NodeAbove { node, value } => ControlTrigger::NodeAbove {
            node: node.clone(),
            value: *value,
        },
        ControlTriggerRecord::NodeBelow { node, value } => ControlTrigger::NodeBelow {
            node: node.clone(),
            value: *value,
        },
        ControlTriggerRecord::AtTime { time_s } => ControlTrigger::AtTime { time_s: *time_s },
        ControlTriggerRecord::AtClockTime { time_of_day_s } => ControlTrigger::AtClockTime {
            time_of_day_s: *time_of_day_s,
        },
    };
    Control::new(rec.link.clone(), action, trigger)
}

fn link_from(rec: &LinkRecord) -> Result<Link, NetworkError> {
    let kind = match &rec.kind {
        LinkKindRecord::Pipe {
            length,
            diameter,
            roughness,
            minor_loss,
            bulk_coeff,
            wall_coeff,
            check_valve,
        } => LinkKind::Pipe(Pipe {
            length: *length,
            diameter: *diameter,
            roughness: *roughness,
            minor_loss: *minor_loss,
            bulk_coeff: *bulk_coeff,
            wall_coeff: *wall_coeff,
            check_valve: *check_valve,
        }),
        LinkKindRecord::Pump {
            curve,
            power_kw,
            speed,
            speed_pattern,
        } => {
            let drive = match (curve, power_kw) {
                (Some(curve), None) => PumpDrive::Curve(curve.clone()),
                (None, Some(kw)) => PumpDrive::Power(*kw),
                _ => {
                    return Err(NetworkError::InvalidAttribute {
                        id: rec.id.clone(),
                        field: "drive",
                        reason: "exactly one of curve or power_kw is required".into(),
                    });
                }
            };
            LinkKind::Pump(Pump {
                drive,
                speed: *speed,
                speed_pattern: speed_pattern.clone(),
            })
        }
        LinkKindRecord::Valve {
            valve_type,
            diameter,
            setting,
            minor_loss,
        } => LinkKind::Valve(Valve {
            valve_type: valve_type_from(*valve_type),
            diameter: *diameter,
            setting: *setting,
            minor_loss: *minor_loss,
        }),
    };
    let status = match rec.status {
        StatusRecord::Open => LinkStatus::Open,
        StatusRecord::Closed => LinkStatus::Closed,
    };
    let mut link = Link::new(rec.id.clone(), rec.start.clone(), rec.end.clone(), kind);
    link.status = status;
    Ok(link)
}

fn valve_type_from(rec: ValveTypeRecord) -> ValveType {
    match rec {
        ValveTypeRecord::Prv => ValveType::Prv,
        ValveTypeRecord::Psv => ValveType::Psv,
        ValveTypeRecord::Pbv => ValveType::Pbv,
        ValveTypeRecord::Fcv => ValveType::Fcv,
        ValveTypeRecord::Tcv => ValveType::Tcv,
        ValveTypeRecord::Gpv => ValveType::Gpv,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn junction(id: &str) -> NodeRecord {
        NodeRecord {
            id: id.into(),
            x: 0.0,
            y: 0.0,
            elevation: 10.0,
            initial_quality: 0.0,
            source: None,
            kind: NodeKindRecord::Junction {
                base_demand: 1.0,
                demand_pattern: None,
                emitter_coeff: 0.0,
            },
        }
    }

    #[test]
    fn all_failures_are_collected() {
        let records = NetworkRecords {
            nodes: vec![junction("J1"), junction("J1")],
            links: vec![
                LinkRecord {
                    id: "P1".into(),
                    start: "J1".into(),
                    end: "J9".into(),
                    status: StatusRecord::Open,
                    kind: LinkKindRecord::Pipe {
                        length: 10.0,
                        diameter: 100.0,
                        roughness: 100.0,
                        minor_loss: 0.0,
                        bulk_coeff: 0.0,
                        wall_coeff: 0.0,
                        check_valve: false,
                    },
                },
                LinkRecord {
                    id: "PU1".into(),
                    start: "J1".into(),
                    end: "J1".into(),
                    status: StatusRecord::Open,
                    kind: LinkKindRecord::Pump {
                        curve: None,
                        power_kw: None,
                        speed: 1.0,
                        speed_pattern: None,
                    },
                },
            ],
            ..NetworkRecords::default()
        };

        let err = import_network(&records).unwrap_err();
        let names: Vec<_> = err.problems.iter().map(|p| p.record.as_str()).collect();
        assert_eq!(names, vec!["node J1", "link P1", "link PU1"]);
        assert!(matches!(
            err.problems[1].error,
            NetworkError::UnknownEndpoint { .. }
        ));
        assert!(matches!(
            err.problems[2].error,
            NetworkError::InvalidAttribute { field: "drive", .. }
        ));
    }

    #[test]
    fn imported_network_has_empty_journal() {
        let records = NetworkRecords {
            nodes: vec![junction("J1")],
            ..NetworkRecords::default()
        };
        let mut net = import_network(&records).unwrap();
        assert!(net.drain_changes().is_empty());
        assert_eq!(net.node_count(), 1);
    }

    #[test]
    fn controls_on_missing_links_are_reported() {
        let records = NetworkRecords {
            nodes: vec![junction("J1")],
            controls: vec![ControlRecord {
                link: "P7".into(),
                action: ControlActionRecord::Closed,
                trigger: ControlTriggerRecord::NodeAbove {
                    node: "J1".into(),
                    value: 30.0,
                },
            }],
            ..NetworkRecords::default()
        };

        let err = import_network(&records).unwrap_err();
        assert_eq!(err.problems.len(), 1);
        assert_eq!(err.problems[0].record, "control #0 on P7");
        assert!(matches!(
            err.problems[0].error,
            NetworkError::UnknownControlTarget { what: "link", .. }
        ));
    }
}
