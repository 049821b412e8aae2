//! Connected node bookkeeping
//!
//! Each open discovery stream registers its node here and receives a watch
//! channel through which new snapshots for its fleet are delivered.

use crate::xds::snapshot::Snapshot;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::watch;

/// Handle held by a discovery stream for as long as the node is connected
#[derive(Debug)]
pub struct NodeRegistration {
    pub connection: u64,
    pub snapshots: watch::Receiver<Arc<Snapshot>>,
}

#[derive(Debug)]
struct NodeEntry {
    fleet: String,
    connection: u64,
    sender: watch::Sender<Arc<Snapshot>>,
}

#[derive(Debug, Default)]
pub struct NodeDirectory {
    nodes: RwLock<HashMap<String, NodeEntry>>,
    next_connection: AtomicU64,
}

impl NodeDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node, replacing any previous connection with the same id
    pub fn register(&self, node_id: &str, fleet: &str, initial: Arc<Snapshot>) -> NodeRegistration {
        let connection = self.next_connection.fetch_add(1, Ordering::Relaxed) + 1;
        let (sender, snapshots) = watch::channel(initial);

        let mut nodes = self.nodes.write().unwrap_or_else(|e| e.into_inner());
        nodes.insert(node_id.to_string(), NodeEntry { fleet: fleet.to_string(), connection, sender });

        NodeRegistration { connection, snapshots }
    }

    /// Forget a node if `connection` is the one that registered it
    pub fn unregister(&self, node_id: &str, connection: u64) -> bool {
        let mut nodes = self.nodes.write().unwrap_or_else(|e| e.into_inner());
        match nodes.get(node_id) {
            Some(entry) if entry.connection == connection => {
                nodes.remove(node_id);
                true
            }
            _ => false,
        }
    }

    pub fn fleet_of(&self, node_id: &str) -> Option<String> {
        let nodes = self.nodes.read().unwrap_or_else(|e| e.into_inner());
        nodes.get(node_id).map(|entry| entry.fleet.clone())
    }

    /// Node ids of a fleet, sorted
    pub fn nodes_in(&self, fleet: &str) -> Vec<String> {
        let nodes = self.nodes.read().unwrap_or_else(|e| e.into_inner());
        let mut ids: Vec<String> =
            nodes.iter().filter(|(_, entry)| entry.fleet == fleet).map(|(id, _)| id.clone()).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.nodes.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver a snapshot to every node of a fleet.
    ///
    /// Nodes already holding this snapshot are not notified again. Returns
    /// `(node id, result)` per node; a node whose stream has gone away yields
    /// an error message.
    pub fn push(&self, fleet: &str, snapshot: &Arc<Snapshot>) -> Vec<(String, Result<(), String>)> {
        let nodes = self.nodes.read().unwrap_or_else(|e| e.into_inner());
        nodes
            .iter()
            .filter(|(_, entry)| entry.fleet == fleet)
            .map(|(node_id, entry)| {
                if entry.sender.is_closed() {
                    return (node_id.clone(), Err(format!("node {} is no longer receiving snapshots", node_id)));
                }
                entry.sender.send_if_modified(|current| {
                    if Arc::ptr_eq(current, snapshot) {
                        return false;
                    }
                    *current = Arc::clone(snapshot);
                    true
                });
                (node_id.clone(), Ok(()))
            })
            .collect()
    }
}
