//! Persisted record shapes and the rendered application configuration
//!
//! Nodes are persisted as their own serde shape (`Node` skips the probed
//! status). Pool membership is not stored on the pool record; it is rebuilt
//! from each node's `pool` back-reference and role.

use serde::{Deserialize, Serialize};

use super::node::{Node, NodeAddr};
use super::pool::Pool;
use super::shard::{Shard, ShardRange, ShardState};
use super::spare::SpareNode;

/// Persisted pool identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolRecord {
    pub name: String,
    pub master: Option<NodeAddr>,
}

impl From<&Pool> for PoolRecord {
    fn from(pool: &Pool) -> Self {
        Self {
            name: pool.name.clone(),
            master: pool.master.clone(),
        }
    }
}

/// Persisted shard identity, range and lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardRecord {
    pub name: String,
    pub master: Option<NodeAddr>,
    pub min_id: u64,
    /// `None` for the open-ended shard
    pub max_id: Option<u64>,
    pub state: ShardState,
    /// Pool name of the parent shard
    #[serde(default)]
    pub parent: Option<String>,
}

impl ShardRecord {
    pub fn range(&self) -> ShardRange {
        ShardRange {
            min_id: self.min_id,
            max_id: self.max_id.into(),
        }
    }
}

impl From<&Shard> for ShardRecord {
    fn from(shard: &Shard) -> Self {
        Self {
            name: shard.pool.name.clone(),
            master: shard.pool.master.clone(),
            min_id: shard.range.min_id,
            max_id: shard.range.max_bound(),
            state: shard.state,
            parent: shard.parent.map(|p| p.pool_name()),
        }
    }
}

/// Everything the inventory knows, as loaded at startup
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InventorySnapshot {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub pools: Vec<PoolRecord>,
    #[serde(default)]
    pub shards: Vec<ShardRecord>,
    #[serde(default)]
    pub spares: Vec<SpareNode>,
}

/// A read destination and its share of traffic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightedTarget {
    pub address: NodeAddr,
    pub weight: u32,
}

/// Routing entry for a plain pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolRoute {
    pub name: String,
    pub master: Option<NodeAddr>,
    pub reads: Vec<WeightedTarget>,
}

/// Routing entry for one slice of the key space
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardRoute {
    pub min_id: u64,
    pub max_id: Option<u64>,
    pub state: ShardState,
    /// Node receiving writes, `None` when writes are refused
    pub writes: Option<NodeAddr>,
    pub reads: Vec<WeightedTarget>,
}

/// Application configuration derived from the topology
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    pub pools: Vec<PoolRoute>,
    pub shards: Vec<ShardRoute>,
}

impl AppConfig {
    /// Route covering `id`, if any
    pub fn route_for(&self, id: u64) -> Option<&ShardRoute> {
        self.shards.iter().find(|route| {
            id >= route.min_id && route.max_id.map_or(true, |max| id <= max)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shard_record_from_shard() {
        let parent = ShardRange::bounded(0, 999).unwrap();
        let mut child = Shard::new(ShardRange::bounded(0, 499).unwrap())
            .with_state(ShardState::Replicating);
        child.parent = Some(parent);
        child.pool.master = Some(NodeAddr::from("10.0.0.5:3306"));

        let record = ShardRecord::from(&child);
        assert_eq!(record.name, "shard-0-499");
        assert_eq!(record.max_id, Some(499));
        assert_eq!(record.parent.as_deref(), Some("shard-0-999"));
        assert_eq!(record.range(), child.range);
    }

    #[test]
    fn test_route_for() {
        let config = AppConfig {
            pools: vec![],
            shards: vec![
                ShardRoute {
                    min_id: 0,
                    max_id: Some(999),
                    state: ShardState::Ready,
                    writes: None,
                    reads: vec![],
                },
                ShardRoute {
                    min_id: 1000,
                    max_id: None,
                    state: ShardState::Ready,
                    writes: None,
                    reads: vec![],
                },
            ],
        };
        assert_eq!(config.route_for(5).map(|r| r.min_id), Some(0));
        assert_eq!(config.route_for(1_000_000).map(|r| r.min_id), Some(1000));
    }
}
