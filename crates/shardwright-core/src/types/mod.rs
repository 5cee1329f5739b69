//! Core types for Shardwright

mod node;
mod pool;
mod records;
mod shard;
mod spare;

pub use node::*;
pub use pool::*;
pub use records::*;
pub use shard::*;
pub use spare::*;
