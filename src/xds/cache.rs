//! Per-fleet snapshot cache
//!
//! Holds the single active snapshot of every fleet. Applying a snapshot
//! swaps it in under the write lock and then pushes it, outside the lock, to
//! every node currently connected for that fleet.

use crate::errors::{Error, Result};
use crate::observability::recorder;
use crate::xds::nodes::{NodeDirectory, NodeRegistration};
use crate::xds::snapshot::Snapshot;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

#[derive(Debug)]
pub struct FleetSnapshotCache {
    active: RwLock<HashMap<String, Arc<Snapshot>>>,
    nodes: Arc<NodeDirectory>,
}

impl Default for FleetSnapshotCache {
    fn default() -> Self {
        Self::new(Arc::new(NodeDirectory::new()))
    }
}

impl FleetSnapshotCache {
    pub fn new(nodes: Arc<NodeDirectory>) -> Self {
        Self { active: RwLock::new(HashMap::new()), nodes }
    }

    /// Validate and activate a snapshot, then push it to the fleet's nodes.
    ///
    /// The snapshot stays active even when some pushes fail; those failures
    /// are returned together as one [`Error::Distribution`].
    pub fn apply(&self, fleet: &str, snapshot: Snapshot) -> Result<Arc<Snapshot>> {
        snapshot.check_consistency()?;
        let snapshot = Arc::new(snapshot);

        {
            let mut active = self.active.write().unwrap_or_else(|e| e.into_inner());
            active.insert(fleet.to_string(), Arc::clone(&snapshot));
        }

        recorder().record_snapshot_applied(fleet, snapshot.clusters().len(), snapshot.route_count());
        info!(
            fleet = %fleet,
            version = %snapshot.version(),
            clusters = snapshot.clusters().len(),
            routes = snapshot.route_count(),
            "Activated snapshot"
        );

        let mut failures = Vec::new();
        for (node_id, outcome) in self.nodes.push(fleet, &snapshot) {
            recorder().record_node_push(fleet, outcome.is_ok());
            if let Err(message) = outcome {
                warn!(fleet = %fleet, node_id = %node_id, error = %message, "Failed to push snapshot");
                failures.push(message);
            }
        }

        if failures.is_empty() {
            Ok(snapshot)
        } else {
            Err(Error::Distribution { fleet: fleet.to_string(), failures: failures.join("\n") })
        }
    }

    /// Register a node and hand it the fleet's active snapshot.
    ///
    /// Fails with [`Error::UnknownFleet`] until a snapshot has been applied
    /// for the fleet.
    ///
    /// The read guard is held while the node is registered, so a concurrent
    /// [`apply`](Self::apply) either happens first and is seen here, or
    /// happens after and finds the node when it pushes.
    pub fn on_node_connect(&self, node_id: &str, fleet: &str) -> Result<NodeRegistration> {
        let registration = {
            let active = self.active.read().unwrap_or_else(|e| e.into_inner());
            let snapshot = active.get(fleet).cloned().ok_or_else(|| Error::UnknownFleet(fleet.to_string()))?;
            self.nodes.register(node_id, fleet, snapshot)
        };
        recorder().record_xds_connection(fleet, true);
        info!(node_id = %node_id, fleet = %fleet, connection = registration.connection, "Node registered");
        Ok(registration)
    }

    pub fn on_node_disconnect(&self, node_id: &str, connection: u64) {
        let fleet = self.nodes.fleet_of(node_id);
        if self.nodes.unregister(node_id, connection) {
            if let Some(fleet) = fleet {
                recorder().record_xds_connection(&fleet, false);
            }
            info!(node_id = %node_id, connection, "Node unregistered");
        }
    }

    pub fn active(&self, fleet: &str) -> Option<Arc<Snapshot>> {
        let active = self.active.read().unwrap_or_else(|e| e.into_inner());
        active.get(fleet).cloned()
    }

    pub fn fleet_of(&self, node_id: &str) -> Option<String> {
        self.nodes.fleet_of(node_id)
    }

    pub fn nodes_in(&self, fleet: &str) -> Vec<String> {
        self.nodes.nodes_in(fleet)
    }

    pub fn fleets(&self) -> Vec<String> {
        let active = self.active.read().unwrap_or_else(|e| e.into_inner());
        let mut fleets: Vec<String> = active.keys().cloned().collect();
        fleets.sort();
        fleets
    }
}
