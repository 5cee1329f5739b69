//! In-memory inventory
//!
//! Keeps every record in ordered maps keyed by identity. A JSON snapshot can
//! be loaded at startup and saved back after each command.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use shardwright_core::types::{
    AppConfig, InventorySnapshot, Node, NodeAddr, NodeRole, PoolRecord, ShardRecord, SpareNode,
};
use shardwright_core::{Error, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::traits::Inventory;

#[derive(Debug, Default)]
struct State {
    nodes: BTreeMap<NodeAddr, Node>,
    pools: BTreeMap<String, PoolRecord>,
    shards: BTreeMap<String, ShardRecord>,
    spares: BTreeMap<NodeAddr, SpareNode>,
    claims: BTreeMap<NodeAddr, DateTime<Utc>>,
    retired: BTreeSet<NodeAddr>,
    released: BTreeSet<NodeAddr>,
    app_config: Option<AppConfig>,
    config_writes: u64,
}

pub struct MemoryInventory {
    state: RwLock<State>,
    app_config_path: Option<PathBuf>,
}

impl MemoryInventory {
    pub fn new() -> Self {
        Self::from_snapshot(InventorySnapshot::default())
    }

    pub fn from_snapshot(snapshot: InventorySnapshot) -> Self {
        let mut state = State::default();
        for node in snapshot.nodes {
            state.nodes.insert(node.address.clone(), node);
        }
        for pool in snapshot.pools {
            state.pools.insert(pool.name.clone(), pool);
        }
        for shard in snapshot.shards {
            state.shards.insert(shard.name.clone(), shard);
        }
        for spare in snapshot.spares {
            state.spares.insert(spare.address().clone(), spare);
        }

        Self {
            state: RwLock::new(state),
            app_config_path: None,
        }
    }

    /// Load a JSON snapshot written by [`MemoryInventory::save_snapshot`]
    pub fn load_snapshot(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Inventory(format!("Failed to read snapshot {}: {}", path.display(), e))
        })?;
        let snapshot: InventorySnapshot = serde_json::from_str(&content)?;
        info!(
            "Loaded inventory snapshot {} ({} nodes, {} shards, {} spares)",
            path.display(),
            snapshot.nodes.len(),
            snapshot.shards.len(),
            snapshot.spares.len()
        );
        Ok(Self::from_snapshot(snapshot))
    }

    /// Also write every rendered app config to `path`
    pub fn with_app_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.app_config_path = Some(path.into());
        self
    }

    pub fn save_snapshot(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.snapshot())?;
        std::fs::write(path.as_ref(), json)?;
        debug!("Saved inventory snapshot to {}", path.as_ref().display());
        Ok(())
    }

    /// Current contents, spares already claimed excluded
    pub fn snapshot(&self) -> InventorySnapshot {
        let state = self.state.read();
        InventorySnapshot {
            nodes: state.nodes.values().cloned().collect(),
            pools: state.pools.values().cloned().collect(),
            shards: state.shards.values().cloned().collect(),
            spares: state.spares.values().cloned().collect(),
        }
    }

    pub fn node(&self, address: &NodeAddr) -> Option<Node> {
        self.state.read().nodes.get(address).cloned()
    }

    pub fn shard(&self, name: &str) -> Option<ShardRecord> {
        self.state.read().shards.get(name).cloned()
    }

    pub fn pool(&self, name: &str) -> Option<PoolRecord> {
        self.state.read().pools.get(name).cloned()
    }

    pub fn spare_count(&self) -> usize {
        self.state.read().spares.len()
    }

    pub fn claimed_at(&self, address: &NodeAddr) -> Option<DateTime<Utc>> {
        self.state.read().claims.get(address).copied()
    }

    pub fn is_retired(&self, address: &NodeAddr) -> bool {
        self.state.read().retired.contains(address)
    }

    pub fn released(&self) -> Vec<NodeAddr> {
        self.state.read().released.iter().cloned().collect()
    }

    /// Last published application config
    pub fn app_config(&self) -> Option<AppConfig> {
        self.state.read().app_config.clone()
    }

    pub fn config_writes(&self) -> u64 {
        self.state.read().config_writes
    }

    fn upsert_members(state: &mut State, members: &[Node]) {
        for node in members {
            state.nodes.insert(node.address.clone(), node.clone());
        }
    }
}

impl Default for MemoryInventory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Inventory for MemoryInventory {
    async fn load(&self) -> Result<InventorySnapshot> {
        Ok(self.snapshot())
    }

    async fn upsert_pool(&self, pool: &PoolRecord, members: &[Node]) -> Result<()> {
        let mut state = self.state.write();
        state.pools.insert(pool.name.clone(), pool.clone());
        Self::upsert_members(&mut state, members);
        debug!("Upserted pool {} with {} members", pool.name, members.len());
        Ok(())
    }

    async fn upsert_shard(&self, shard: &ShardRecord, members: &[Node]) -> Result<()> {
        let mut state = self.state.write();
        state.shards.insert(shard.name.clone(), shard.clone());
        Self::upsert_members(&mut state, members);
        debug!(
            "Upserted shard {} ({}) with {} members",
            shard.name,
            shard.state,
            members.len()
        );
        Ok(())
    }

    async fn upsert_nodes(&self, nodes: &[Node]) -> Result<()> {
        let mut state = self.state.write();
        Self::upsert_members(&mut state, nodes);
        Ok(())
    }

    async fn remove_shard(&self, name: &str) -> Result<()> {
        self.state.write().shards.remove(name);
        Ok(())
    }

    async fn record_claims(&self, claimed: &[NodeAddr]) -> Result<()> {
        let mut state = self.state.write();
        if let Some(missing) = claimed.iter().find(|a| !state.spares.contains_key(*a)) {
            return Err(Error::RecordNotFound(format!("spare {}", missing)));
        }
        let now = Utc::now();
        for address in claimed {
            state.spares.remove(address);
            state.claims.insert(address.clone(), now);
        }
        info!("Recorded {} spare claims", claimed.len());
        Ok(())
    }

    async fn return_spares(&self, spares: &[SpareNode]) -> Result<()> {
        let mut state = self.state.write();
        for spare in spares {
            state.claims.remove(spare.address());
            state.spares.insert(spare.address().clone(), spare.clone());
        }
        info!("Returned {} spares", spares.len());
        Ok(())
    }

    async fn retire_node(&self, address: &NodeAddr) -> Result<()> {
        let mut state = self.state.write();
        state.nodes.remove(address);
        state.retired.insert(address.clone());
        info!("Retired node {}", address);
        Ok(())
    }

    async fn release_nodes(&self, addresses: &[NodeAddr]) -> Result<()> {
        let mut state = self.state.write();
        for address in addresses {
            if let Some(mut node) = state.nodes.remove(address) {
                node.pool = None;
                node.master = None;
                node.weight = 0;
                node.role = NodeRole::Spare;
                state.claims.remove(address);
                state.spares.insert(address.clone(), SpareNode { node, fills: Vec::new() });
            }
            state.released.insert(address.clone());
        }
        info!("Released {} nodes for reuse", addresses.len());
        Ok(())
    }

    async fn write_config(&self, config: &AppConfig) -> Result<()> {
        if let Some(path) = &self.app_config_path {
            let json = serde_json::to_string_pretty(config)?;
            std::fs::write(path, json)?;
        }
        let mut state = self.state.write();
        state.app_config = Some(config.clone());
        state.config_writes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shardwright_core::types::{HardwareProfile, ShardRange, ShardState};

    fn shard_record() -> ShardRecord {
        ShardRecord {
            name: "shard-1-inf".to_string(),
            master: Some(NodeAddr::from("10.0.0.1:3306")),
            min_id: 1,
            max_id: None,
            state: ShardState::Ready,
            parent: None,
        }
    }

    fn master() -> Node {
        let mut node = Node::new("10.0.0.1:3306", NodeRole::Master);
        node.pool = Some("shard-1-inf".to_string());
        node
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let inventory = MemoryInventory::new();
        let record = shard_record();

        inventory.upsert_shard(&record, &[master()]).await.unwrap();
        let first = serde_json::to_string(&inventory.snapshot()).unwrap();
        inventory.upsert_shard(&record, &[master()]).await.unwrap();
        let second = serde_json::to_string(&inventory.snapshot()).unwrap();

        assert_eq!(first, second);
        assert_eq!(inventory.snapshot().shards.len(), 1);
        assert_eq!(inventory.snapshot().nodes.len(), 1);
    }

    #[tokio::test]
    async fn test_record_claims_removes_spares() {
        let hw = HardwareProfile::new("db-large", 256, "dc1");
        let inventory = MemoryInventory::from_snapshot(InventorySnapshot {
            spares: vec![
                SpareNode::new("10.9.0.1:3306", hw.clone()),
                SpareNode::new("10.9.0.2:3306", hw),
            ],
            ..Default::default()
        });

        let claimed = NodeAddr::from("10.9.0.1:3306");
        inventory.record_claims(&[claimed.clone()]).await.unwrap();
        assert_eq!(inventory.spare_count(), 1);
        assert!(inventory.claimed_at(&claimed).is_some());

        let missing = inventory.record_claims(&[claimed]).await;
        assert!(matches!(missing, Err(Error::RecordNotFound(_))));
    }

    #[tokio::test]
    async fn test_release_turns_nodes_into_spares() {
        let inventory = MemoryInventory::new();
        inventory.upsert_nodes(&[master()]).await.unwrap();

        let addr = NodeAddr::from("10.0.0.1:3306");
        inventory.release_nodes(&[addr.clone()]).await.unwrap();
        assert!(inventory.node(&addr).is_none());
        assert_eq!(inventory.released(), vec![addr.clone()]);

        let spares = inventory.snapshot().spares;
        assert_eq!(spares.len(), 1);
        assert_eq!(spares[0].address(), &addr);
        assert_eq!(spares[0].node.role, NodeRole::Spare);
        assert!(spares[0].node.pool.is_none());
        assert!(spares[0].can_fill(NodeRole::Master));
    }

    #[tokio::test]
    async fn test_returned_spares_can_be_claimed_again() {
        let hw = HardwareProfile::new("db-large", 256, "dc1");
        let spare = SpareNode::new("10.9.0.1:3306", hw.clone());
        let inventory = MemoryInventory::from_snapshot(InventorySnapshot {
            spares: vec![spare.clone(), SpareNode::new("10.9.0.2:3306", hw)],
            ..Default::default()
        });

        let claimed = [spare.address().clone(), NodeAddr::from("10.9.0.3:3306")];
        assert!(inventory.record_claims(&claimed).await.is_err());
        assert_eq!(inventory.spare_count(), 2);

        inventory.record_claims(&claimed[..1]).await.unwrap();
        inventory.return_spares(&[spare.clone()]).await.unwrap();
        assert_eq!(inventory.spare_count(), 2);
        assert!(inventory.claimed_at(spare.address()).is_none());
        inventory.record_claims(&claimed[..1]).await.unwrap();
    }

    #[tokio::test]
    async fn test_snapshot_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inventory.json");

        let inventory = MemoryInventory::new();
        inventory.upsert_shard(&shard_record(), &[master()]).await.unwrap();
        inventory.save_snapshot(&path).unwrap();

        let loaded = MemoryInventory::load_snapshot(&path).unwrap();
        let shard = loaded.shard("shard-1-inf").unwrap();
        assert_eq!(shard.range(), ShardRange::unbounded(1));
        assert!(loaded.node(&NodeAddr::from("10.0.0.1:3306")).is_some());
    }

    #[tokio::test]
    async fn test_write_config_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.json");
        let inventory = MemoryInventory::new().with_app_config_path(&path);

        inventory.write_config(&AppConfig::default()).await.unwrap();
        assert_eq!(inventory.config_writes(), 1);
        let written: AppConfig =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written, AppConfig::default());
    }
}
