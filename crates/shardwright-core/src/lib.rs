//! Shardwright Core Library
//!
//! Data model shared by the orchestration engine, the inventory
//! collaborator and the command surface: nodes and their roles, pools,
//! shards with their key ranges and lifecycle, spare hardware profiles and
//! the persisted record shapes.

pub mod config;
pub mod error;
pub mod types;

pub use config::ShardwrightConfig;
pub use error::{Error, Result};

/// Shardwright version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Weight given to a replica activated without an explicit weight
pub const DEFAULT_REPLICA_WEIGHT: u32 = 100;

/// Standby replicas provisioned alongside every new master
pub const DEFAULT_STANDBYS_PER_POOL: usize = 2;

/// Worker concurrency for fan-out steps (probing, cloning, reparenting)
pub const DEFAULT_MAX_CONCURRENCY: usize = 8;

/// Replication lag tolerated on a promotion candidate
pub const DEFAULT_MAX_REPLICATION_LAG_SECS: u64 = 30;
