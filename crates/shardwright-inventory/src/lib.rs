//! Inventory for Shardwright
//!
//! The inventory is the external system of record for nodes, pools, shards
//! and spares. The orchestration engine only talks to it through the
//! [`Inventory`] trait. [`MemoryInventory`] is the reference implementation,
//! optionally backed by a JSON snapshot file.

pub mod memory;
pub mod traits;

pub use memory::MemoryInventory;
pub use traits::*;
