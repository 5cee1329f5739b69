//! Pool types
//!
//! A pool is one master plus its replicas, administered as one unit.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::node::NodeAddr;

/// A master and its replicas
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    /// Pool identity
    pub name: String,
    /// Current master (exclusive owner of the master slot)
    pub master: Option<NodeAddr>,
    /// Replicas of the master, any replica role
    #[serde(default)]
    pub replicas: BTreeSet<NodeAddr>,
}

impl Pool {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            master: None,
            replicas: BTreeSet::new(),
        }
    }

    pub fn with_master(mut self, master: impl Into<NodeAddr>) -> Self {
        self.master = Some(master.into());
        self
    }

    pub fn with_replicas<I, A>(mut self, replicas: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<NodeAddr>,
    {
        self.replicas.extend(replicas.into_iter().map(Into::into));
        self
    }

    pub fn is_master(&self, addr: &NodeAddr) -> bool {
        self.master.as_ref() == Some(addr)
    }

    pub fn has_replica(&self, addr: &NodeAddr) -> bool {
        self.replicas.contains(addr)
    }

    /// Whether the node belongs to this pool in any role
    pub fn contains(&self, addr: &NodeAddr) -> bool {
        self.is_master(addr) || self.has_replica(addr)
    }

    /// Master first, then replicas in address order
    pub fn members(&self) -> impl Iterator<Item = &NodeAddr> {
        self.master.iter().chain(self.replicas.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_membership() {
        let pool = Pool::new("users")
            .with_master("10.0.0.1:3306")
            .with_replicas(["10.0.0.2:3306", "10.0.0.3:3306"]);

        let master = NodeAddr::from("10.0.0.1:3306");
        let replica = NodeAddr::from("10.0.0.2:3306");
        let stranger = NodeAddr::from("10.0.0.9:3306");

        assert!(pool.is_master(&master));
        assert!(pool.has_replica(&replica));
        assert!(!pool.contains(&stranger));
        assert_eq!(pool.members().count(), 3);
        assert_eq!(pool.members().next(), Some(&master));
    }
}
