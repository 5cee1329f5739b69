//! Database node types
//!
//! A node is a single database instance. It carries attributes only; every
//! behavior (probing, cloning, replication changes) lives behind the node
//! transport in the cluster crate.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identity of a database node (`host:port`)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeAddr(String);

impl NodeAddr {
    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeAddr {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NodeAddr {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Role of a node within its pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRole {
    /// Accepts writes for the pool
    Master,
    /// Replica serving live read traffic, in proportion to its weight
    ActiveReplica,
    /// Replica kept warm for promotion or activation, no traffic
    StandbyReplica,
    /// Replica dedicated to backups, never promoted
    BackupReplica,
    /// Unassigned node available for allocation
    Spare,
}

impl NodeRole {
    pub fn is_replica(&self) -> bool {
        matches!(
            self,
            NodeRole::ActiveReplica | NodeRole::StandbyReplica | NodeRole::BackupReplica
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeRole::Master => "master",
            NodeRole::ActiveReplica => "active_replica",
            NodeRole::StandbyReplica => "standby_replica",
            NodeRole::BackupReplica => "backup_replica",
            NodeRole::Spare => "spare",
        }
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reachability of a node, derived by probing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    /// Not probed yet
    #[default]
    Unknown,
    Reachable,
    Unreachable,
}

/// Hardware class used to match spares against an existing node
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct HardwareProfile {
    /// Hardware class name (e.g. "db-large")
    pub class: String,
    /// Installed memory in GiB
    pub memory_gb: u32,
    /// Datacenter the node lives in
    pub datacenter: String,
}

impl HardwareProfile {
    pub fn new(class: impl Into<String>, memory_gb: u32, datacenter: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            memory_gb,
            datacenter: datacenter.into(),
        }
    }

    /// Two profiles are alike when a node of one can stand in for the other
    pub fn is_like(&self, other: &HardwareProfile) -> bool {
        self.class == other.class
            && self.memory_gb == other.memory_gb
            && self.datacenter == other.datacenter
    }
}

/// A single database instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub address: NodeAddr,
    pub role: NodeRole,
    /// Read weight, only meaningful for active replicas
    #[serde(default)]
    pub weight: u32,
    /// Name of the owning pool (lookup only)
    #[serde(default)]
    pub pool: Option<String>,
    /// Recorded replication source
    #[serde(default)]
    pub master: Option<NodeAddr>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub hardware: HardwareProfile,
    #[serde(skip)]
    pub status: NodeStatus,
}

impl Node {
    pub fn new(address: impl Into<NodeAddr>, role: NodeRole) -> Self {
        Self {
            address: address.into(),
            role,
            weight: 0,
            pool: None,
            master: None,
            version: None,
            hardware: HardwareProfile::default(),
            status: NodeStatus::Unknown,
        }
    }

    pub fn with_hardware(mut self, hardware: HardwareProfile) -> Self {
        self.hardware = hardware;
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// An active replica must carry a positive weight
    pub fn has_valid_weight(&self) -> bool {
        match self.role {
            NodeRole::ActiveReplica => self.weight > 0,
            _ => true,
        }
    }
}

/// Compare dotted version strings numerically ("8.0.10" > "8.0.9")
pub fn compare_versions(a: &str, b: &str) -> std::cmp::Ordering {
    let parse = |v: &str| -> Vec<u64> {
        v.split(|c: char| c == '.' || c == '-')
            .map(|p| p.parse::<u64>().unwrap_or(0))
            .collect()
    };
    parse(a).cmp(&parse(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cmp::Ordering;

    #[test]
    fn test_node_role_serde() {
        let json = serde_json::to_string(&NodeRole::StandbyReplica).unwrap();
        assert_eq!(json, "\"standby_replica\"");
        let role: NodeRole = serde_json::from_str("\"backup_replica\"").unwrap();
        assert_eq!(role, NodeRole::BackupReplica);
        assert!(role.is_replica());
        assert!(!NodeRole::Spare.is_replica());
    }

    #[test]
    fn test_hardware_likeness() {
        let a = HardwareProfile::new("db-large", 256, "dc1");
        let b = HardwareProfile::new("db-large", 256, "dc1");
        let c = HardwareProfile::new("db-large", 128, "dc1");
        assert!(a.is_like(&b));
        assert!(!a.is_like(&c));
    }

    #[test]
    fn test_active_replica_weight() {
        let mut node = Node::new("10.0.0.1:3306", NodeRole::ActiveReplica);
        assert!(!node.has_valid_weight());
        node.weight = 50;
        assert!(node.has_valid_weight());
    }

    #[test]
    fn test_status_is_not_persisted() {
        let mut node = Node::new("10.0.0.1:3306", NodeRole::Master);
        node.status = NodeStatus::Reachable;
        let json = serde_json::to_string(&node).unwrap();
        assert!(!json.contains("status"));
        let back: Node = serde_json::from_str(&json).unwrap();
        assert_eq!(back.status, NodeStatus::Unknown);
    }

    #[test]
    fn test_compare_versions() {
        assert_eq!(compare_versions("8.0.10", "8.0.9"), Ordering::Greater);
        assert_eq!(compare_versions("5.7.44", "8.0.1"), Ordering::Less);
        assert_eq!(compare_versions("8.0.30", "8.0.30"), Ordering::Equal);
    }
}
