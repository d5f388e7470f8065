//! Pre-run topology validation.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use petgraph::unionfind::UnionFind;

use crate::network::Network;

/// A structural problem that blocks a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopologyIssue {
    EmptyNetwork,
    /// Node with no incident links.
    OrphanNode { node: String },
    /// More than one connected component.
    Disconnected { components: usize },
    /// Link whose endpoint is not in the node set.
    InvalidLink { link: String, node: String },
    /// Component with no reservoir or tank to fix its head.
    NoSource { nodes: Vec<String> },
}

impl fmt::Display for TopologyIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TopologyIssue::EmptyNetwork => f.write_str("network has no nodes"),
            TopologyIssue::OrphanNode { node } => write!(f, "node {node} has no links"),
            TopologyIssue::Disconnected { components } => {
                write!(f, "network is split into {components} components")
            }
            TopologyIssue::InvalidLink { link, node } => {
                write!(f, "link {link} references missing node {node}")
            }
            TopologyIssue::NoSource { nodes } => {
                write!(f, "no reservoir or tank feeds nodes [{}]", nodes.join(", "))
            }
        }
    }
}

/// Something suspicious that does not block a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopologyWarning {
    DuplicateCoordinates { first: String, second: String },
}

impl fmt::Display for TopologyWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TopologyWarning::DuplicateCoordinates { first, second } => {
                write!(f, "nodes {first} and {second} share a coordinate")
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopologyReport {
    pub issues: Vec<TopologyIssue>,
    pub warnings: Vec<TopologyWarning>,
    /// Connected components as sorted node id lists, ordered by first id.
    pub components: Vec<Vec<String>>,
}

impl TopologyReport {
    /// True when nothing blocks a run. Warnings do not count.
    pub fn is_ok(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn orphans(&self) -> impl Iterator<Item = &str> {
        self.issues.iter().filter_map(|i| match i {
            TopologyIssue::OrphanNode { node } => Some(node.as_str()),
            _ => None,
        })
    }
}

impl Network {
    /// Check the network is fit to simulate.
    ///
    /// Nodes left at the origin are treated as unplaced and never reported
    /// as duplicate coordinates.
    pub fn validate_topology(&self) -> TopologyReport {
        let mut report = TopologyReport::default();
        if self.node_count() == 0 {
            report.issues.push(TopologyIssue::EmptyNetwork);
            return report;
        }

        let ids: Vec<&str> = self.nodes().map(|n| n.id.as_str()).collect();
        let index: HashMap<&str, usize> = ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();

        let mut sets = UnionFind::<usize>::new(ids.len());
        for link in self.links() {
            let mut ends = [0usize; 2];
            let mut valid = true;
            for (slot, endpoint) in [&link.start, &link.end].into_iter().enumerate() {
                match index.get(endpoint.as_str()) {
                    Some(&i) => ends[slot] = i,
                    None => {
                        valid = false;
                        report.issues.push(TopologyIssue::InvalidLink {
                            link: link.id.clone(),
                            node: endpoint.clone(),
                        });
                    }
                }
            }
            if valid {
                sets.union(ends[0], ends[1]);
            }
        }

        for node in self.nodes() {
            if self.degree(&node.id) == 0 {
                report.issues.push(TopologyIssue::OrphanNode {
                    node: node.id.clone(),
                });
            }
        }

        let labels = sets.into_labeling();
        let mut grouped: BTreeMap<usize, Vec<String>> = BTreeMap::new();
        for (i, label) in labels.iter().enumerate() {
            grouped.entry(*label).or_default().push(ids[i].to_string());
        }
        let mut components: Vec<Vec<String>> = grouped.into_values().collect();
        components.sort_by(|a, b| a.first().cmp(&b.first()));

        if components.len() > 1 {
            report.issues.push(TopologyIssue::Disconnected {
                components: components.len(),
            });
        }

        for component in &components {
            let fed = component
                .iter()
                .filter_map(|id| self.get_node(id))
                .any(|n| n.is_fixed_head());
            // A lone unlinked node is already reported as an orphan.
            let orphan = component.len() == 1 && self.degree(&component[0]) == 0;
            if !fed && !orphan {
                report.issues.push(TopologyIssue::NoSource {
                    nodes: component.clone(),
                });
            }
        }
        report.components = components;

        let mut seen: HashMap<(u64, u64), &str> = HashMap::new();
        for node in self.nodes() {
            let c = node.coordinate;
            if c.x == 0.0 && c.y == 0.0 {
                continue;
            }
            // Normalise -0.0 so it hashes like 0.0.
            let key = ((c.x + 0.0).to_bits(), (c.y + 0.0).to_bits());
            match seen.get(&key) {
                Some(first) => report.warnings.push(TopologyWarning::DuplicateCoordinates {
                    first: first.to_string(),
                    second: node.id.clone(),
                }),
                None => {
                    seen.insert(key, &node.id);
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use crate::element::{Junction, Link, Node, Pipe, Reservoir};
    use crate::network::Network;

    use super::*;

    fn pipe(id: &str, a: &str, b: &str) -> Link {
        Link::pipe(id, a, b, Pipe::new(100.0, 150.0, 120.0))
    }

    #[test]
    fn empty_network_is_not_runnable() {
        let report = Network::new().validate_topology();
        assert_eq!(report.issues, vec![TopologyIssue::EmptyNetwork]);
    }

    #[test]
    fn orphan_and_split_are_reported() {
        let mut net = Network::new();
        net.add_node(Node::reservoir("R1", Reservoir::with_head(50.0)))
            .unwrap();
        net.add_node(Node::junction("J1", 0.0, Junction::with_demand(1.0)))
            .unwrap();
        net.add_node(Node::junction("J2", 0.0, Junction::default()))
            .unwrap();
        net.add_link(pipe("P1", "R1", "J1")).unwrap();

        let report = net.validate_topology();
        assert!(!report.is_ok());
        assert_eq!(report.orphans().collect::<Vec<_>>(), vec!["J2"]);
        assert!(report
            .issues
            .contains(&TopologyIssue::Disconnected { components: 2 }));
        assert_eq!(report.components.len(), 2);
        assert!(!report
            .issues
            .iter()
            .any(|i| matches!(i, TopologyIssue::NoSource { .. })));
    }

    #[test]
    fn unfed_component_blocks_run() {
        let mut net = Network::new();
        net.add_node(Node::junction("J1", 0.0, Junction::with_demand(1.0)))
            .unwrap();
        net.add_node(Node::junction("J2", 0.0, Junction::default()))
            .unwrap();
        net.add_link(pipe("P1", "J1", "J2")).unwrap();

        let report = net.validate_topology();
        assert_eq!(
            report.issues,
            vec![TopologyIssue::NoSource {
                nodes: vec!["J1".into(), "J2".into()]
            }]
        );
    }

    #[test]
    fn duplicate_coordinates_only_warn() {
        let mut net = Network::new();
        net.add_node(Node::reservoir("R1", Reservoir::with_head(50.0)).at(3.0, 4.0))
            .unwrap();
        net.add_node(Node::junction("J1", 0.0, Junction::default()).at(3.0, 4.0))
            .unwrap();
        net.add_link(pipe("P1", "R1", "J1")).unwrap();

        let report = net.validate_topology();
        assert!(report.is_ok());
        assert_eq!(report.warnings.len(), 1);
    }
}
