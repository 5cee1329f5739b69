//! Spare node types

use serde::{Deserialize, Serialize};

use super::node::{HardwareProfile, Node, NodeAddr, NodeRole};

/// An unassigned node available for allocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpareNode {
    pub node: Node,
    /// Roles this spare may fill; empty means master or standby replica
    #[serde(default)]
    pub fills: Vec<NodeRole>,
}

impl SpareNode {
    pub fn new(address: impl Into<NodeAddr>, hardware: HardwareProfile) -> Self {
        Self {
            node: Node::new(address, NodeRole::Spare).with_hardware(hardware),
            fills: Vec::new(),
        }
    }

    pub fn filling(mut self, roles: impl IntoIterator<Item = NodeRole>) -> Self {
        self.fills = roles.into_iter().collect();
        self
    }

    pub fn address(&self) -> &NodeAddr {
        &self.node.address
    }

    pub fn hardware(&self) -> &HardwareProfile {
        &self.node.hardware
    }

    pub fn can_fill(&self, role: NodeRole) -> bool {
        if self.fills.is_empty() {
            matches!(role, NodeRole::Master | NodeRole::StandbyReplica)
        } else {
            self.fills.contains(&role)
        }
    }

    pub fn matches(&self, filter: &SpareFilter) -> bool {
        self.node.role == NodeRole::Spare
            && filter.role.map_or(true, |role| self.can_fill(role))
            && filter
                .like
                .as_ref()
                .map_or(true, |like| self.hardware().is_like(like))
    }
}

/// Criteria for counting or claiming spares
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpareFilter {
    /// Role the claimed node will take
    pub role: Option<NodeRole>,
    /// Hardware the claimed node must resemble
    pub like: Option<HardwareProfile>,
}

impl SpareFilter {
    pub fn role(role: NodeRole) -> Self {
        Self {
            role: Some(role),
            like: None,
        }
    }

    pub fn like(mut self, hardware: &HardwareProfile) -> Self {
        self.like = Some(hardware.clone());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn large() -> HardwareProfile {
        HardwareProfile::new("db-large", 256, "dc1")
    }

    #[test]
    fn test_default_fills() {
        let spare = SpareNode::new("10.1.0.1:3306", large());
        assert!(spare.can_fill(NodeRole::Master));
        assert!(spare.can_fill(NodeRole::StandbyReplica));
        assert!(!spare.can_fill(NodeRole::BackupReplica));
    }

    #[test]
    fn test_filter_matching() {
        let backup = SpareNode::new("10.1.0.2:3306", large()).filling([NodeRole::BackupReplica]);
        assert!(backup.matches(&SpareFilter::role(NodeRole::BackupReplica)));
        assert!(!backup.matches(&SpareFilter::role(NodeRole::Master)));

        let small = HardwareProfile::new("db-small", 64, "dc1");
        let spare = SpareNode::new("10.1.0.3:3306", large());
        assert!(spare.matches(&SpareFilter::role(NodeRole::Master).like(&large())));
        assert!(!spare.matches(&SpareFilter::role(NodeRole::Master).like(&small)));
        assert!(spare.matches(&SpareFilter::default()));
    }
}
