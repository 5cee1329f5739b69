//! Shardwright Cluster - pool and shard orchestration engine
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          Topology                            │
//! │   catalog of pools / shards / nodes, resolution, config      │
//! ├──────────────────────────────────────────────────────────────┤
//! │                                                              │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────────┐   │
//! │  │  Promotion   │  │    Split     │  │ Cutover / Pool   │   │
//! │  │  Protocol    │  │   Pipeline   │  │   role changes   │   │
//! │  └──────┬───────┘  └──────┬───────┘  └────────┬─────────┘   │
//! │         └─────────────────┼───────────────────┘             │
//! │                 ┌─────────┴──────────┐                       │
//! │                 │ CallbackDispatcher │  pre/post hooks       │
//! │                 └─────────┬──────────┘                       │
//! │        ┌──────────────────┼──────────────────┐               │
//! │  ┌─────┴──────┐   ┌───────┴───────┐   ┌──────┴──────┐        │
//! │  │  Spare     │   │ NodeTransport │   │  Inventory  │        │
//! │  │ Allocator  │   │ (remote ops)  │   │ (records)   │        │
//! │  └────────────┘   └───────────────┘   └─────────────┘        │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every mutating operation runs through the [`CallbackDispatcher`], mutates
//! the in-memory catalog, then persists the touched records through the
//! [`Inventory`](shardwright_inventory::Inventory).

mod callbacks;
mod context;
mod cutover;
mod error;
mod fanout;
pub mod metrics;
mod pool_ops;
mod promotion;
mod spares;
mod split;
mod topology;
pub mod transport;

pub use callbacks::{
    hook_fn, CallbackAbort, CallbackDispatcher, HookContext, HookResult, Intercepted,
    MaintenanceHooks, Operation, OperationHook, Phase, DEFAULT_PRIORITY,
};
pub use context::ExecutionContext;
pub use cutover::CutoverReport;
pub use error::{ClusterError, ClusterResult, ErrorKind, OutcomeStatus, TargetOutcome};
pub use promotion::{DemotedRole, PromotionOutcome, PromotionProtocol, PromotionReport, PromotionRequest};
pub use spares::{SpareAllocator, SpareRequest};
pub use split::{SplitPipeline, SplitPlan, SplitReport};
pub use topology::{PoolSummary, PoolView, Topology};
pub use transport::{MemoryTransport, NodeTransport, ReplicationStatus, Schema};

// Re-export types from core
pub use shardwright_core::types::{
    AppConfig, HardwareProfile, Node, NodeAddr, NodeRole, NodeStatus, Pool, RangeEnd, Shard,
    ShardRange, ShardState, SpareFilter, SpareNode,
};
