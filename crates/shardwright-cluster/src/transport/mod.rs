//! Remote node actions
//!
//! The engine never talks to a database host directly. Everything that
//! touches a node (service control, cloning, replication wiring, read-only
//! toggles, row pruning) goes through a [`NodeTransport`]. Production
//! deployments plug in their own SSH/SQL implementation; [`MemoryTransport`]
//! simulates a fleet for tests and dry runs.

mod memory;

pub use memory::{MemoryTransport, SimOp};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shardwright_core::types::{NodeAddr, ShardRange};

use crate::error::ClusterResult;

/// Replication health of one node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationStatus {
    pub running: bool,
    pub lag_secs: Option<u64>,
    pub source: Option<NodeAddr>,
}

/// Table definitions exported from a master, in creation order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub statements: Vec<String>,
}

/// Transport executing actions on database nodes
#[async_trait]
pub trait NodeTransport: Send + Sync {
    /// Whether the node answers at all
    async fn probe(&self, node: &NodeAddr) -> ClusterResult<bool>;

    async fn start_service(&self, node: &NodeAddr) -> ClusterResult<()>;

    async fn stop_service(&self, node: &NodeAddr) -> ClusterResult<()>;

    /// Full data-set copy from `source` onto every target
    async fn clone_data(&self, source: &NodeAddr, targets: &[NodeAddr]) -> ClusterResult<()>;

    async fn export_schema(&self, node: &NodeAddr) -> ClusterResult<Schema>;

    async fn import_schema(&self, node: &NodeAddr, schema: &Schema) -> ClusterResult<()>;

    /// Point `replica` at `source` and start replicating
    async fn change_replication_source(
        &self,
        replica: &NodeAddr,
        source: &NodeAddr,
    ) -> ClusterResult<()>;

    async fn pause_replication(&self, node: &NodeAddr) -> ClusterResult<()>;

    async fn resume_replication(&self, node: &NodeAddr) -> ClusterResult<()>;

    /// Stop replicating and forget the source. Irreversible.
    async fn sever_replication(&self, node: &NodeAddr) -> ClusterResult<()>;

    async fn replication_status(&self, node: &NodeAddr) -> ClusterResult<ReplicationStatus>;

    /// Replicas currently connected to `master`
    async fn list_replicas(&self, master: &NodeAddr) -> ClusterResult<Vec<NodeAddr>>;

    async fn enable_read_only(&self, node: &NodeAddr) -> ClusterResult<()>;

    async fn disable_read_only(&self, node: &NodeAddr) -> ClusterResult<()>;

    /// Drop application grants so nothing can write to the node again
    async fn revoke_access(&self, node: &NodeAddr) -> ClusterResult<()>;

    /// Delete rows whose id falls outside `keep`; returns rows deleted
    async fn prune_rows_outside(&self, node: &NodeAddr, keep: ShardRange) -> ClusterResult<u64>;

    async fn start_query_killer(&self, node: &NodeAddr) -> ClusterResult<()>;

    async fn stop_query_killer(&self, node: &NodeAddr) -> ClusterResult<()>;

    async fn suppress_monitoring(&self, node: &NodeAddr) -> ClusterResult<()>;

    async fn restore_monitoring(&self, node: &NodeAddr) -> ClusterResult<()>;
}
