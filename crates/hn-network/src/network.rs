//! The network container and its mutation operations.

use std::collections::{BTreeMap, BTreeSet};

use crate::change::{ChangeTarget, NetworkChange};
use crate::control::{Control, ControlAction};
use crate::curve::{Curve, Pattern};
use crate::element::{Link, LinkKind, Node, NodeKind, NodeType};
use crate::error::{NetworkError, NetworkResult};
use crate::patch::Patch;

/// Structural rules beyond the fixed invariants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TopologyPolicy {
    /// Accept links whose start and end node are the same.
    pub allow_self_loops: bool,
}

/// What `remove_node` does with links still attached to the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalMode {
    /// Fail with `NodeInUse` if any link is attached.
    Reject,
    /// Remove the attached links first.
    Cascade,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemovedNode {
    pub node: Node,
    /// Links removed along with the node (cascade only).
    pub links: Vec<Link>,
    /// Controls on those links or watching the node (cascade only).
    pub controls: Vec<Control>,
}

/// One step across an incident link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Neighbor<'a> {
    pub link: &'a str,
    pub node: &'a str,
}

/// Nodes and links keyed by id, with a derived node -> incident links index.
///
/// Every mutation is all-or-nothing: it validates first and only then
/// touches the maps and the adjacency index together.
#[derive(Debug, Clone, Default)]
pub struct Network {
    nodes: BTreeMap<String, Node>,
    links: BTreeMap<String, Link>,
    curves: BTreeMap<String, Curve>,
    patterns: BTreeMap<String, Pattern>,
    controls: Vec<Control>,
    adjacency: BTreeMap<String, BTreeSet<String>>,
    policy: TopologyPolicy,
    revision: u64,
    journal: Vec<NetworkChange>,
}

impl Network {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: TopologyPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    pub fn policy(&self) -> TopologyPolicy {
        self.policy
    }

    // ---- queries ----

    pub fn get_node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn get_link(&self, id: &str) -> Option<&Link> {
        self.links.get(id)
    }

    pub fn curve(&self, id: &str) -> Option<&Curve> {
        self.curves.get(id)
    }

    pub fn pattern(&self, id: &str) -> Option<&Pattern> {
        self.patterns.get(id)
    }

    /// Nodes in id order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Links in id order.
    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.links.values()
    }

    pub fn curves(&self) -> impl Iterator<Item = &Curve> {
        self.curves.values()
    }

    pub fn patterns(&self) -> impl Iterator<Item = &Pattern> {
        self.patterns.values()
    }

    /// Controls in insertion order.
    pub fn controls(&self) -> &[Control] {
        &self.controls
    }

    pub fn nodes_of_type(&self, node_type: NodeType) -> impl Iterator<Item = &Node> {
        self.nodes
            .values()
            .filter(move |n| n.node_type() == node_type)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.links.is_empty()
    }

    /// Ids of links attached to `node`, in id order.
    pub fn incident_links(&self, node: &str) -> NetworkResult<impl Iterator<Item = &str>> {
        let set = self
            .adjacency
            .get(node)
            .ok_or_else(|| NetworkError::UnknownNode {
                id: node.to_string(),
            })?;
        Ok(set.iter().map(String::as_str))
    }

    pub fn degree(&self, node: &str) -> usize {
        self.adjacency.get(node).map_or(0, BTreeSet::len)
    }

    /// Nodes reachable over one link, paired with the link used.
    pub fn neighbors(&self, node: &str) -> NetworkResult<Vec<Neighbor<'_>>> {
        let mut out = Vec::new();
        for link_id in self.incident_links(node)? {
            let Some(link) = self.links.get(link_id) else {
                continue;
            };
            if let Some(other) = link.other_end(node) {
                out.push(Neighbor {
                    link: &link.id,
                    node: other,
                });
            }
        }
        Ok(out)
    }

    /// Count of successful mutations so far.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Take the change descriptions recorded since the last drain.
    pub fn drain_changes(&mut self) -> Vec<NetworkChange> {
        std::mem::take(&mut self.journal)
    }

    /// Independent copy for a run; later edits to `self` do not reach it.
    pub fn snapshot(&self) -> Network {
        Network {
            journal: Vec::new(),
            ..self.clone()
        }
    }

    fn record(&mut self, change: NetworkChange) {
        self.revision += 1;
        self.journal.push(change);
    }

    // ---- reference checks ----

    fn check_node_refs(&self, node: &Node) -> NetworkResult<()> {
        if let Some(pattern) = node.demand_pattern()
            && !self.patterns.contains_key(pattern)
        {
            return Err(NetworkError::MissingPattern {
                element: format!("node {}", node.id),
                pattern: pattern.to_string(),
            });
        }
        if let Some(pattern) = node.source.as_ref().and_then(|s| s.pattern.as_deref())
            && !self.patterns.contains_key(pattern)
        {
            return Err(NetworkError::MissingPattern {
                element: format!("source at node {}", node.id),
                pattern: pattern.to_string(),
            });
        }
        Ok(())
    }

    fn check_link_refs(&self, link: &Link) -> NetworkResult<()> {
        if let LinkKind::Pump(pump) = &link.kind {
            if let Some(curve) = pump.curve_id()
                && !self.curves.contains_key(curve)
            {
                return Err(NetworkError::MissingCurve {
                    element: format!("pump {}", link.id),
                    curve: curve.to_string(),
                });
            }
            if let Some(pattern) = &pump.speed_pattern
                && !self.patterns.contains_key(pattern)
            {
                return Err(NetworkError::MissingPattern {
                    element: format!("pump {}", link.id),
                    pattern: pattern.clone(),
                });
            }
        }
        Ok(())
    }

    fn check_control_refs(&self, control: &Control) -> NetworkResult<()> {
        let missing = |what, id: &str| NetworkError::UnknownControlTarget {
            control: control.to_string(),
            what,
            id: id.to_string(),
        };
        let link = self
            .links
            .get(&control.link)
            .ok_or_else(|| missing("link", &control.link))?;
        if let Some(node) = control.node()
            && !self.nodes.contains_key(node)
        {
            return Err(missing("node", node));
        }
        if matches!(control.action, ControlAction::Setting(_))
            && matches!(link.kind, LinkKind::Pipe(_))
        {
            return Err(NetworkError::InvalidControl {
                control: control.to_string(),
                reason: "settings apply to pumps and valves only".into(),
            });
        }
        Ok(())
    }

    // ---- node mutations ----

    pub fn add_node(&mut self, node: Node) -> NetworkResult<()> {
        if self.nodes.contains_key(&node.id) {
            return Err(NetworkError::DuplicateId {
                what: "node",
                id: node.id,
            });
        }
        node.validate()?;
        self.check_node_refs(&node)?;

        let id = node.id.clone();
        self.adjacency.insert(id.clone(), BTreeSet::new());
        self.nodes.insert(id.clone(), node);
        self.record(NetworkChange::Added {
            target: ChangeTarget::Node,
            id,
        });
        Ok(())
    }

    pub fn remove_node(&mut self, id: &str, mode: RemovalMode) -> NetworkResult<RemovedNode> {
        if !self.nodes.contains_key(id) {
            return Err(NetworkError::UnknownNode { id: id.to_string() });
        }
        let incident: Vec<String> = self
            .adjacency
            .get(id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        if mode == RemovalMode::Reject {
            if !incident.is_empty() {
                return Err(NetworkError::NodeInUse {
                    node: id.to_string(),
                    links: incident,
                });
            }
            let watching: Vec<String> = self
                .controls
                .iter()
                .filter(|c| c.node() == Some(id))
                .map(ToString::to_string)
                .collect();
            if !watching.is_empty() {
                return Err(NetworkError::ControlledBy {
                    element: format!("node {id}"),
                    controls: watching,
                });
            }
        }

        let mut links = Vec::with_capacity(incident.len());
        let mut controls = Vec::new();
        for link_id in &incident {
            if let Some(link) = self.detach_link(link_id) {
                controls.extend(self.drop_controls(|c| c.link == link.id));
                self.record(NetworkChange::Removed {
                    target: ChangeTarget::Link,
                    id: link.id.clone(),
                });
                links.push(link);
            }
        }
        controls.extend(self.drop_controls(|c| c.node() == Some(id)));

        self.adjacency.remove(id);
        let node = self
            .nodes
            .remove(id)
            .ok_or_else(|| NetworkError::UnknownNode { id: id.to_string() })?;
        self.record(NetworkChange::Removed {
            target: ChangeTarget::Node,
            id: id.to_string(),
        });
        Ok(RemovedNode {
            node,
            links,
            controls,
        })
    }

    // ---- link mutations ----

    pub fn add_link(&mut self, link: Link) -> NetworkResult<()> {
        if self.links.contains_key(&link.id) {
            return Err(NetworkError::DuplicateId {
                what: "link",
                id: link.id,
            });
        }
        for endpoint in [&link.start, &link.end] {
            if !self.nodes.contains_key(endpoint) {
                return Err(NetworkError::UnknownEndpoint {
                    link: link.id.clone(),
                    node: endpoint.clone(),
                });
            }
        }
        if link.start == link.end && !self.policy.allow_self_loops {
            return Err(NetworkError::SelfLoop {
                link: link.id.clone(),
                node: link.start.clone(),
            });
        }
        link.validate()?;
        self.check_link_refs(&link)?;

        let id = link.id.clone();
        for endpoint in [&link.start, &link.end] {
            self.adjacency
                .entry(endpoint.clone())
                .or_default()
                .insert(id.clone());
        }
        self.links.insert(id.clone(), link);
        self.record(NetworkChange::Added {
            target: ChangeTarget::Link,
            id,
        });
        Ok(())
    }

    /// Remove a link together with the controls acting on it.
    pub fn remove_link(&mut self, id: &str) -> NetworkResult<Link> {
        let link = self
            .detach_link(id)
            .ok_or_else(|| NetworkError::UnknownLink { id: id.to_string() })?;
        self.drop_controls(|c| c.link == id);
        self.record(NetworkChange::Removed {
            target: ChangeTarget::Link,
            id: id.to_string(),
        });
        Ok(link)
    }

    fn detach_link(&mut self, id: &str) -> Option<Link> {
        let link = self.links.remove(id)?;
        for endpoint in [&link.start, &link.end] {
            if let Some(set) = self.adjacency.get_mut(endpoint) {
                set.remove(id);
            }
        }
        Some(link)
    }

    // ---- controls ----

    pub fn add_control(&mut self, control: Control) -> NetworkResult<()> {
        control.validate()?;
        self.check_control_refs(&control)?;
        let id = control.to_string();
        self.controls.push(control);
        self.record(NetworkChange::Added {
            target: ChangeTarget::Control,
            id,
        });
        Ok(())
    }

    /// Remove the control at `index` in `controls()` order.
    pub fn remove_control(&mut self, index: usize) -> NetworkResult<Control> {
        if index >= self.controls.len() {
            return Err(NetworkError::UnknownControl { index });
        }
        let control = self.controls.remove(index);
        self.record(NetworkChange::Removed {
            target: ChangeTarget::Control,
            id: control.to_string(),
        });
        Ok(control)
    }

    fn drop_controls(&mut self, doomed: impl Fn(&Control) -> bool) -> Vec<Control> {
        let (dropped, kept): (Vec<Control>, Vec<Control>) = std::mem::take(&mut self.controls)
            .into_iter()
            .partition(|c| doomed(c));
        self.controls = kept;
        for control in &dropped {
            self.record(NetworkChange::Removed {
                target: ChangeTarget::Control,
                id: control.to_string(),
            });
        }
        dropped
    }

    /// Swap a link's start and end node.
    pub fn reverse_link(&mut self, id: &str) -> NetworkResult<()> {
        let link = self
            .links
            .get_mut(id)
            .ok_or_else(|| NetworkError::UnknownLink { id: id.to_string() })?;
        std::mem::swap(&mut link.start, &mut link.end);
        self.record(NetworkChange::LinkReversed { id: id.to_string() });
        Ok(())
    }

    // ---- attributes ----

    /// Apply a typed patch to the node or link named `id`.
    ///
    /// Node patches address the node namespace and link patches the link
    /// namespace. The patched copy is validated before it replaces the original.
    pub fn update_attributes(&mut self, id: &str, patch: Patch) -> NetworkResult<()> {
        match patch {
            Patch::Node(patch) => {
                let mut node = self
                    .nodes
                    .get(id)
                    .cloned()
                    .ok_or_else(|| NetworkError::UnknownNode { id: id.to_string() })?;
                patch.apply(&mut node)?;
                node.validate()?;
                self.check_node_refs(&node)?;
                self.nodes.insert(id.to_string(), node);
                self.record(NetworkChange::Updated {
                    target: ChangeTarget::Node,
                    id: id.to_string(),
                });
            }
            Patch::Link(patch) => {
                let mut link = self
                    .links
                    .get(id)
                    .cloned()
                    .ok_or_else(|| NetworkError::UnknownLink { id: id.to_string() })?;
                patch.apply(&mut link)?;
                link.validate()?;
                self.check_link_refs(&link)?;
                self.links.insert(id.to_string(), link);
                self.record(NetworkChange::Updated {
                    target: ChangeTarget::Link,
                    id: id.to_string(),
                });
            }
        }
        Ok(())
    }

    // ---- curves and patterns ----

    pub fn add_curve(&mut self, curve: Curve) -> NetworkResult<()> {
        if self.curves.contains_key(&curve.id) {
            return Err(NetworkError::DuplicateId {
                what: "curve",
                id: curve.id,
            });
        }
        let id = curve.id.clone();
        self.curves.insert(id.clone(), curve);
        self.record(NetworkChange::Added {
            target: ChangeTarget::Curve,
            id,
        });
        Ok(())
    }

    pub fn remove_curve(&mut self, id: &str) -> NetworkResult<Curve> {
        if !self.curves.contains_key(id) {
            return Err(NetworkError::UnknownCurve { id: id.to_string() });
        }
        let user = self.links.values().find(|l| match &l.kind {
            LinkKind::Pump(p) => p.curve_id() == Some(id),
            _ => false,
        });
        if let Some(pump) = user {
            return Err(NetworkError::CurveInUse {
                curve: id.to_string(),
                pump: pump.id.clone(),
            });
        }
        let curve = self
            .curves
            .remove(id)
            .ok_or_else(|| NetworkError::UnknownCurve { id: id.to_string() })?;
        self.record(NetworkChange::Removed {
            target: ChangeTarget::Curve,
            id: id.to_string(),
        });
        Ok(curve)
    }

    pub fn add_pattern(&mut self, pattern: Pattern) -> NetworkResult<()> {
        if self.patterns.contains_key(&pattern.id) {
            return Err(NetworkError::DuplicateId {
                what: "pattern",
                id: pattern.id,
            });
        }
        let id = pattern.id.clone();
        self.patterns.insert(id.clone(), pattern);
        self.record(NetworkChange::Added {
            target: ChangeTarget::Pattern,
            id,
        });
        Ok(())
    }

    pub fn remove_pattern(&mut self, id: &str) -> NetworkResult<Pattern> {
        if !self.patterns.contains_key(id) {
            return Err(NetworkError::UnknownPattern { id: id.to_string() });
        }
        if let Some(element) = self.pattern_user(id) {
            return Err(NetworkError::PatternInUse {
                pattern: id.to_string(),
                element,
            });
        }
        let pattern = self
            .patterns
            .remove(id)
            .ok_or_else(|| NetworkError::UnknownPattern { id: id.to_string() })?;
        self.record(NetworkChange::Removed {
            target: ChangeTarget::Pattern,
            id: id.to_string(),
        });
        Ok(pattern)
    }

    fn pattern_user(&self, id: &str) -> Option<String> {
        if let Some(node) = self.nodes.values().find(|n| n.demand_pattern() == Some(id)) {
            let what = match node.kind {
                NodeKind::Reservoir(_) => "reservoir",
                _ => "junction",
            };
            return Some(format!("{what} {}", node.id));
        }
        if let Some(node) = self
            .nodes
            .values()
            .find(|n| n.source.as_ref().and_then(|s| s.pattern.as_deref()) == Some(id))
        {
            return Some(format!("source at node {}", node.id));
        }
        self.links
            .values()
            .find(|l| match &l.kind {
                LinkKind::Pump(p) => p.speed_pattern.as_deref() == Some(id),
                _ => false,
            })
            .map(|l| format!("pump {}", l.id))
    }

    // ---- invariants ----

    /// Check that the adjacency index is exactly what the link set implies.
    pub fn verify_index(&self) -> NetworkResult<()> {
        let mut expected: BTreeMap<&str, BTreeSet<&str>> = self
            .nodes
            .keys()
            .map(|id| (id.as_str(), BTreeSet::new()))
            .collect();

        for link in self.links.values() {
            for endpoint in [&link.start, &link.end] {
                let set = expected.get_mut(endpoint.as_str()).ok_or_else(|| {
                    NetworkError::InconsistentIndex {
                        node: endpoint.clone(),
                        what: "link endpoint is not a node",
                    }
                })?;
                set.insert(&link.id);
            }
        }

        if expected.len() != self.adjacency.len() {
            let stray = self
                .adjacency
                .keys()
                .find(|k| !expected.contains_key(k.as_str()))
                .cloned()
                .unwrap_or_default();
            return Err(NetworkError::InconsistentIndex {
                node: stray,
                what: "index has entries for unknown nodes",
            });
        }

        for (node, links) in &expected {
            let actual = self.adjacency.get(*node).ok_or_else(|| {
                NetworkError::InconsistentIndex {
                    node: node.to_string(),
                    what: "node missing from index",
                }
            })?;
            if actual.len() != links.len() || actual.iter().any(|l| !links.contains(l.as_str())) {
                return Err(NetworkError::InconsistentIndex {
                    node: node.to_string(),
                    what: "incident links differ from link set",
                });
            }
        }

        for control in &self.controls {
            self.check_control_refs(control)?;
        }
        Ok(())
    }
}
