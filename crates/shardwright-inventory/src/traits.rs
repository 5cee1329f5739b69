//! Inventory trait
//!
//! Defines the interface between the orchestration engine and the asset
//! tracker that records the fleet. Every write is a last-writer-wins upsert
//! keyed by the record's identity, so repeating a call with unchanged input
//! leaves the inventory unchanged.

use async_trait::async_trait;
use shardwright_core::types::{
    AppConfig, InventorySnapshot, Node, NodeAddr, PoolRecord, ShardRecord, SpareNode,
};
use shardwright_core::Result;

/// Inventory collaborator
#[async_trait]
pub trait Inventory: Send + Sync {
    // ============= Loading =============

    /// Load every pool, shard, node and spare
    async fn load(&self) -> Result<InventorySnapshot>;

    // ============= Upserts =============

    /// Upsert a plain pool and its member nodes
    async fn upsert_pool(&self, pool: &PoolRecord, members: &[Node]) -> Result<()>;

    /// Upsert a shard and its member nodes
    async fn upsert_shard(&self, shard: &ShardRecord, members: &[Node]) -> Result<()>;

    /// Upsert individual node records (e.g. a node leaving its pool)
    async fn upsert_nodes(&self, nodes: &[Node]) -> Result<()>;

    /// Drop a shard record that was re-keyed under a new name
    async fn remove_shard(&self, name: &str) -> Result<()>;

    // ============= Spares & hardware =============

    /// Mark spares as taken so no other caller can allocate them
    async fn record_claims(&self, claimed: &[NodeAddr]) -> Result<()>;

    /// Undo claims on spares that never entered service
    async fn return_spares(&self, spares: &[SpareNode]) -> Result<()>;

    /// Take a node out of service for good
    async fn retire_node(&self, address: &NodeAddr) -> Result<()>;

    /// Turn the nodes of a recycled shard back into spares
    async fn release_nodes(&self, addresses: &[NodeAddr]) -> Result<()>;

    // ============= Application config =============

    /// Publish the rendered application configuration
    async fn write_config(&self, config: &AppConfig) -> Result<()>;
}
