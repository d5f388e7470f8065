//! Stable element id <-> engine handle mapping.
//!
//! Handles are dense: node handle `i` is the i-th node in id order, and the
//! same for links. The map is built once at open and kept for the run.

use std::collections::HashMap;
use std::sync::Arc;

use hn_core::{ElementKey, ElementKind, Handle, HnError, HnResult, LinkHandle, NodeHandle};
use hn_network::Network;

#[derive(Debug, Clone)]
pub struct HandleMap {
    node_keys: Vec<ElementKey>,
    link_keys: Vec<ElementKey>,
    node_to_handle: HashMap<Arc<str>, NodeHandle>,
    link_to_handle: HashMap<Arc<str>, LinkHandle>,
}

impl HandleMap {
    pub fn from_network(net: &Network) -> Self {
        let node_keys: Vec<ElementKey> = net.nodes().map(|n| ElementKey::node(&n.id)).collect();
        let link_keys: Vec<ElementKey> = net.links().map(|l| ElementKey::link(&l.id)).collect();

        let node_to_handle = node_keys
            .iter()
            .enumerate()
            .map(|(i, k)| (k.id.clone(), Handle::from_index(i as u32)))
            .collect();
        let link_to_handle = link_keys
            .iter()
            .enumerate()
            .map(|(i, k)| (k.id.clone(), Handle::from_index(i as u32)))
            .collect();

        Self {
            node_keys,
            link_keys,
            node_to_handle,
            link_to_handle,
        }
    }

    pub fn node_count(&self) -> usize {
        self.node_keys.len()
    }

    pub fn link_count(&self) -> usize {
        self.link_keys.len()
    }

    pub fn node_handle(&self, id: &str) -> Option<NodeHandle> {
        self.node_to_handle.get(id).copied()
    }

    pub fn link_handle(&self, id: &str) -> Option<LinkHandle> {
        self.link_to_handle.get(id).copied()
    }

    /// Element key for a handle of the given kind.
    pub fn key(&self, kind: ElementKind, handle: Handle) -> HnResult<&ElementKey> {
        let (keys, what) = match kind {
            ElementKind::Node => (&self.node_keys, "node handle"),
            ElementKind::Link => (&self.link_keys, "link handle"),
        };
        let index = handle.index() as usize;
        keys.get(index).ok_or(HnError::HandleOob {
            what,
            index,
            len: keys.len(),
        })
    }

    /// Node keys in handle order.
    pub fn node_keys(&self) -> &[ElementKey] {
        &self.node_keys
    }

    /// Link keys in handle order.
    pub fn link_keys(&self) -> &[ElementKey] {
        &self.link_keys
    }
}
