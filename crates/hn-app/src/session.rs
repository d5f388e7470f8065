//! The live, editable network and its change notifications.

use std::sync::Arc;

use hn_network::{
    Control, Link, Network, NetworkChange, NetworkResult, Node, Patch, RemovalMode, RemovedNode,
};

use crate::events::EventSink;

/// Owner of the network being edited.
///
/// Each successful edit drains the model's change journal and publishes
/// one `on_network_changed` per change. A rejected edit publishes nothing.
pub struct NetworkSession {
    network: Network,
    sink: Arc<dyn EventSink>,
}

impl NetworkSession {
    pub fn new(mut network: Network, sink: Arc<dyn EventSink>) -> Self {
        network.drain_changes();
        Self { network, sink }
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn into_network(self) -> Network {
        self.network
    }

    /// Run an arbitrary edit, then publish what it changed.
    pub fn edit<R>(&mut self, f: impl FnOnce(&mut Network) -> NetworkResult<R>) -> NetworkResult<R> {
        let result = f(&mut self.network);
        self.publish();
        result
    }

    /// Swap in a freshly loaded network.
    pub fn replace(&mut self, mut network: Network) {
        network.drain_changes();
        self.network = network;
        self.sink.on_network_changed(&NetworkChange::Replaced);
    }

    pub fn add_node(&mut self, node: Node) -> NetworkResult<()> {
        self.edit(|net| net.add_node(node))
    }

    pub fn remove_node(&mut self, id: &str, mode: RemovalMode) -> NetworkResult<RemovedNode> {
        self.edit(|net| net.remove_node(id, mode))
    }

    pub fn add_link(&mut self, link: Link) -> NetworkResult<()> {
        self.edit(|net| net.add_link(link))
    }

    pub fn remove_link(&mut self, id: &str) -> NetworkResult<Link> {
        self.edit(|net| net.remove_link(id))
    }

    pub fn update_attributes(&mut self, id: &str, patch: Patch) -> NetworkResult<()> {
        self.edit(|net| net.update_attributes(id, patch))
    }

    pub fn add_control(&mut self, control: Control) -> NetworkResult<()> {
        self.edit(|net| net.add_control(control))
    }

    pub fn remove_control(&mut self, index: usize) -> NetworkResult<Control> {
        self.edit(|net| net.remove_control(index))
    }

    fn publish(&mut self) {
        for change in self.network.drain_changes() {
            self.sink.on_network_changed(&change);
        }
    }
}
