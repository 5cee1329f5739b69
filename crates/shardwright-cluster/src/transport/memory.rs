//! In-memory fleet simulation
//!
//! Each node keeps the handful of facts the engine can observe: whether it
//! answers, whether it is read-only, what it replicates from, its schema and
//! the ids of the rows it holds. Failures can be injected per operation and
//! node to exercise partial-failure paths.

use async_trait::async_trait;
use parking_lot::RwLock;
use shardwright_core::types::{InventorySnapshot, NodeAddr, ShardRange};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::debug;

use super::{NodeTransport, ReplicationStatus, Schema};
use crate::error::{ClusterError, ClusterResult};

/// Transport operations, for failure injection and call tracing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimOp {
    Probe,
    StartService,
    StopService,
    CloneData,
    ExportSchema,
    ImportSchema,
    ChangeReplicationSource,
    PauseReplication,
    ResumeReplication,
    SeverReplication,
    ReplicationStatus,
    ListReplicas,
    EnableReadOnly,
    DisableReadOnly,
    RevokeAccess,
    PruneRows,
    StartQueryKiller,
    StopQueryKiller,
    SuppressMonitoring,
    RestoreMonitoring,
}

#[derive(Debug, Clone)]
struct SimNode {
    reachable: bool,
    running: bool,
    read_only: bool,
    source: Option<NodeAddr>,
    replicating: bool,
    lag_secs: u64,
    schema: Vec<String>,
    rows: BTreeSet<u64>,
    access_revoked: bool,
    query_killer: bool,
    monitoring_suppressed: bool,
}

impl Default for SimNode {
    fn default() -> Self {
        Self {
            reachable: true,
            running: true,
            read_only: false,
            source: None,
            replicating: false,
            lag_secs: 0,
            schema: Vec::new(),
            rows: BTreeSet::new(),
            access_revoked: false,
            query_killer: false,
            monitoring_suppressed: false,
        }
    }
}

#[derive(Debug, Default)]
struct FleetState {
    nodes: BTreeMap<NodeAddr, SimNode>,
    failures: HashSet<(SimOp, NodeAddr)>,
    calls: Vec<(SimOp, NodeAddr)>,
}

/// Simulated transport over an in-memory fleet
#[derive(Debug, Default)]
pub struct MemoryTransport {
    state: RwLock<FleetState>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the fleet from inventory records: replicas replicate from their
    /// recorded master, every node answers.
    pub fn from_snapshot(snapshot: &InventorySnapshot) -> Self {
        let transport = Self::new();
        {
            let mut state = transport.state.write();
            for node in &snapshot.nodes {
                state.nodes.insert(
                    node.address.clone(),
                    SimNode {
                        read_only: node.master.is_some(),
                        source: node.master.clone(),
                        replicating: node.master.is_some(),
                        ..Default::default()
                    },
                );
            }
            for spare in &snapshot.spares {
                state
                    .nodes
                    .entry(spare.address().clone())
                    .or_insert_with(SimNode::default);
            }
        }
        transport
    }

    pub fn add_node(&self, node: impl Into<NodeAddr>) {
        self.state.write().nodes.insert(node.into(), SimNode::default());
    }

    /// Make `op` fail on `node` until cleared
    pub fn fail(&self, op: SimOp, node: impl Into<NodeAddr>) {
        self.state.write().failures.insert((op, node.into()));
    }

    pub fn clear_failures(&self) {
        self.state.write().failures.clear();
    }

    pub fn set_reachable(&self, node: &NodeAddr, reachable: bool) {
        if let Some(sim) = self.state.write().nodes.get_mut(node) {
            sim.reachable = reachable;
        }
    }

    pub fn set_lag(&self, node: &NodeAddr, lag_secs: u64) {
        if let Some(sim) = self.state.write().nodes.get_mut(node) {
            sim.lag_secs = lag_secs;
        }
    }

    pub fn set_schema<I, S>(&self, node: &NodeAddr, statements: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Some(sim) = self.state.write().nodes.get_mut(node) {
            sim.schema = statements.into_iter().map(Into::into).collect();
        }
    }

    pub fn insert_rows(&self, node: &NodeAddr, ids: impl IntoIterator<Item = u64>) {
        if let Some(sim) = self.state.write().nodes.get_mut(node) {
            sim.rows.extend(ids);
        }
    }

    pub fn rows(&self, node: &NodeAddr) -> Vec<u64> {
        self.state
            .read()
            .nodes
            .get(node)
            .map(|sim| sim.rows.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn schema(&self, node: &NodeAddr) -> Vec<String> {
        self.state
            .read()
            .nodes
            .get(node)
            .map(|sim| sim.schema.clone())
            .unwrap_or_default()
    }

    pub fn source(&self, node: &NodeAddr) -> Option<NodeAddr> {
        self.state.read().nodes.get(node).and_then(|sim| {
            if sim.replicating {
                sim.source.clone()
            } else {
                None
            }
        })
    }

    pub fn is_read_only(&self, node: &NodeAddr) -> bool {
        self.state
            .read()
            .nodes
            .get(node)
            .map_or(false, |sim| sim.read_only)
    }

    pub fn is_revoked(&self, node: &NodeAddr) -> bool {
        self.state
            .read()
            .nodes
            .get(node)
            .map_or(false, |sim| sim.access_revoked)
    }

    /// Whether the node is currently under a maintenance window
    pub fn in_maintenance(&self, node: &NodeAddr) -> bool {
        self.state
            .read()
            .nodes
            .get(node)
            .map_or(false, |sim| sim.query_killer || sim.monitoring_suppressed)
    }

    /// Calls made so far, in order
    pub fn calls(&self) -> Vec<(SimOp, NodeAddr)> {
        self.state.read().calls.clone()
    }

    pub fn calls_of(&self, op: SimOp) -> usize {
        self.state.read().calls.iter().filter(|(o, _)| *o == op).count()
    }

    /// Record the call and run `f` on the node, honoring injected failures
    /// and reachability.
    fn with_node<R>(
        &self,
        op: SimOp,
        node: &NodeAddr,
        f: impl FnOnce(&mut SimNode) -> R,
    ) -> ClusterResult<R> {
        let mut state = self.state.write();
        state.calls.push((op, node.clone()));
        if state.failures.contains(&(op, node.clone())) {
            return Err(ClusterError::transport(
                node,
                format!("injected failure in {:?}", op),
            ));
        }
        let sim = state
            .nodes
            .get_mut(node)
            .ok_or_else(|| ClusterError::transport(node, "unknown host"))?;
        if !sim.reachable {
            return Err(ClusterError::transport(node, "host unreachable"));
        }
        Ok(f(sim))
    }
}

#[async_trait]
impl NodeTransport for MemoryTransport {
    async fn probe(&self, node: &NodeAddr) -> ClusterResult<bool> {
        let mut state = self.state.write();
        state.calls.push((SimOp::Probe, node.clone()));
        if state.failures.contains(&(SimOp::Probe, node.clone())) {
            return Err(ClusterError::transport(node, "probe timed out"));
        }
        Ok(state.nodes.get(node).map_or(false, |sim| sim.reachable))
    }

    async fn start_service(&self, node: &NodeAddr) -> ClusterResult<()> {
        self.with_node(SimOp::StartService, node, |sim| sim.running = true)
    }

    async fn stop_service(&self, node: &NodeAddr) -> ClusterResult<()> {
        self.with_node(SimOp::StopService, node, |sim| sim.running = false)
    }

    async fn clone_data(&self, source: &NodeAddr, targets: &[NodeAddr]) -> ClusterResult<()> {
        let (schema, rows) = self.with_node(SimOp::CloneData, source, |sim| {
            (sim.schema.clone(), sim.rows.clone())
        })?;
        for target in targets {
            self.with_node(SimOp::CloneData, target, |sim| {
                sim.schema = schema.clone();
                sim.rows = rows.clone();
                sim.running = true;
                sim.read_only = true;
            })?;
        }
        debug!("Cloned {} rows from {} to {} targets", rows.len(), source, targets.len());
        Ok(())
    }

    async fn export_schema(&self, node: &NodeAddr) -> ClusterResult<Schema> {
        self.with_node(SimOp::ExportSchema, node, |sim| Schema {
            statements: sim.schema.clone(),
        })
    }

    async fn import_schema(&self, node: &NodeAddr, schema: &Schema) -> ClusterResult<()> {
        self.with_node(SimOp::ImportSchema, node, |sim| {
            sim.schema = schema.statements.clone();
        })
    }

    async fn change_replication_source(
        &self,
        replica: &NodeAddr,
        source: &NodeAddr,
    ) -> ClusterResult<()> {
        self.with_node(SimOp::ChangeReplicationSource, replica, |sim| {
            sim.source = Some(source.clone());
            sim.replicating = true;
            sim.read_only = true;
            sim.lag_secs = 0;
        })
    }

    async fn pause_replication(&self, node: &NodeAddr) -> ClusterResult<()> {
        self.with_node(SimOp::PauseReplication, node, |sim| sim.replicating = false)
    }

    async fn resume_replication(&self, node: &NodeAddr) -> ClusterResult<()> {
        self.with_node(SimOp::ResumeReplication, node, |sim| {
            sim.replicating = sim.source.is_some();
        })
    }

    async fn sever_replication(&self, node: &NodeAddr) -> ClusterResult<()> {
        self.with_node(SimOp::SeverReplication, node, |sim| {
            sim.source = None;
            sim.replicating = false;
        })
    }

    async fn replication_status(&self, node: &NodeAddr) -> ClusterResult<ReplicationStatus> {
        self.with_node(SimOp::ReplicationStatus, node, |sim| ReplicationStatus {
            running: sim.replicating,
            lag_secs: sim.replicating.then_some(sim.lag_secs),
            source: sim.source.clone(),
        })
    }

    async fn list_replicas(&self, master: &NodeAddr) -> ClusterResult<Vec<NodeAddr>> {
        self.with_node(SimOp::ListReplicas, master, |_| ())?;
        Ok(self
            .state
            .read()
            .nodes
            .iter()
            .filter(|(_, sim)| sim.source.as_ref() == Some(master))
            .map(|(addr, _)| addr.clone())
            .collect())
    }

    async fn enable_read_only(&self, node: &NodeAddr) -> ClusterResult<()> {
        self.with_node(SimOp::EnableReadOnly, node, |sim| sim.read_only = true)
    }

    async fn disable_read_only(&self, node: &NodeAddr) -> ClusterResult<()> {
        self.with_node(SimOp::DisableReadOnly, node, |sim| sim.read_only = false)
    }

    async fn revoke_access(&self, node: &NodeAddr) -> ClusterResult<()> {
        self.with_node(SimOp::RevokeAccess, node, |sim| sim.access_revoked = true)
    }

    async fn prune_rows_outside(&self, node: &NodeAddr, keep: ShardRange) -> ClusterResult<u64> {
        self.with_node(SimOp::PruneRows, node, |sim| {
            let before = sim.rows.len();
            sim.rows.retain(|id| keep.contains(*id));
            (before - sim.rows.len()) as u64
        })
    }

    async fn start_query_killer(&self, node: &NodeAddr) -> ClusterResult<()> {
        self.with_node(SimOp::StartQueryKiller, node, |sim| sim.query_killer = true)
    }

    async fn stop_query_killer(&self, node: &NodeAddr) -> ClusterResult<()> {
        self.with_node(SimOp::StopQueryKiller, node, |sim| sim.query_killer = false)
    }

    async fn suppress_monitoring(&self, node: &NodeAddr) -> ClusterResult<()> {
        self.with_node(SimOp::SuppressMonitoring, node, |sim| {
            sim.monitoring_suppressed = true
        })
    }

    async fn restore_monitoring(&self, node: &NodeAddr) -> ClusterResult<()> {
        self.with_node(SimOp::RestoreMonitoring, node, |sim| {
            sim.monitoring_suppressed = false
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shardwright_core::types::{Node, NodeRole};

    fn addr(s: &str) -> NodeAddr {
        NodeAddr::from(s)
    }

    #[tokio::test]
    async fn test_snapshot_seeds_replication() {
        let mut replica = Node::new("10.0.0.2:3306", NodeRole::StandbyReplica);
        replica.master = Some(addr("10.0.0.1:3306"));
        let snapshot = InventorySnapshot {
            nodes: vec![Node::new("10.0.0.1:3306", NodeRole::Master), replica],
            ..Default::default()
        };
        let transport = MemoryTransport::from_snapshot(&snapshot);

        let replicas = transport.list_replicas(&addr("10.0.0.1:3306")).await.unwrap();
        assert_eq!(replicas, vec![addr("10.0.0.2:3306")]);
        let status = transport.replication_status(&addr("10.0.0.2:3306")).await.unwrap();
        assert!(status.running);
        assert_eq!(status.lag_secs, Some(0));
    }

    #[tokio::test]
    async fn test_clone_and_prune() {
        let transport = MemoryTransport::new();
        transport.add_node("src");
        transport.add_node("dst");
        transport.insert_rows(&addr("src"), 0..10);
        transport.set_schema(&addr("src"), ["CREATE TABLE users (id BIGINT)"]);

        transport.clone_data(&addr("src"), &[addr("dst")]).await.unwrap();
        assert_eq!(transport.rows(&addr("dst")).len(), 10);
        assert_eq!(transport.schema(&addr("dst")), transport.schema(&addr("src")));

        let keep = ShardRange::bounded(0, 4).unwrap();
        let pruned = transport.prune_rows_outside(&addr("dst"), keep).await.unwrap();
        assert_eq!(pruned, 5);
        assert_eq!(transport.rows(&addr("dst")), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_injected_failures_and_unreachable_hosts() {
        let transport = MemoryTransport::new();
        transport.add_node("a");
        transport.fail(SimOp::EnableReadOnly, "a");
        assert!(transport.enable_read_only(&addr("a")).await.is_err());
        transport.clear_failures();
        transport.enable_read_only(&addr("a")).await.unwrap();

        transport.set_reachable(&addr("a"), false);
        assert!(!transport.probe(&addr("a")).await.unwrap());
        assert!(transport.disable_read_only(&addr("a")).await.is_err());
        assert!(transport.probe(&addr("ghost")).await.map(|up| !up).unwrap());
        assert_eq!(transport.calls_of(SimOp::EnableReadOnly), 2);
    }
}
