//! Cluster error types

use std::fmt;

use shardwright_core::types::NodeRole;
use thiserror::Error;

/// Result type for cluster operations
pub type ClusterResult<T> = Result<T, ClusterError>;

/// Broad class of a [`ClusterError`], deciding how an operator recovers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Precondition violated before any mutation; fix the input and retry
    Validation,
    NotFound,
    /// Not enough matching spares; nothing was claimed
    InsufficientResource,
    /// Discovered state disagrees with the catalog; nothing was changed
    InconsistentTopology,
    /// A fan-out step partly succeeded; resume per target
    PartialFailure,
    Transport,
    Internal,
}

/// Cluster-related errors
#[derive(Error, Debug)]
pub enum ClusterError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("{0} is not the master of a pool")]
    NotAMaster(String),

    #[error("{node} does not replicate from {master}")]
    NotAReplica { node: String, master: String },

    #[error("{node} cannot be promoted: {reason}")]
    NotPromotable { node: String, reason: String },

    #[error("Invalid state transition for {shard}: {from} -> {to}")]
    InvalidTransition {
        shard: String,
        from: String,
        to: String,
    },

    #[error("Invalid range: {0}")]
    InvalidRange(String),

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Pool not found: {0}")]
    PoolNotFound(String),

    #[error("Shard not found: {0}")]
    ShardNotFound(String),

    #[error("Insufficient spares for {role}: needed {needed}, available {available}")]
    InsufficientSpares {
        role: String,
        needed: usize,
        available: usize,
    },

    #[error("Inconsistent topology: {0}")]
    InconsistentTopology(String),

    #[error("{operation} partially failed ({failed} of {total} targets failed)",
        failed = .outcomes.iter().filter(|o| !o.succeeded()).count(),
        total = .outcomes.len())]
    PartialFailure {
        operation: String,
        outcomes: Vec<TargetOutcome>,
    },

    #[error("Transport error on {node}: {message}")]
    Transport { node: String, message: String },

    #[error("Inventory error: {0}")]
    Inventory(#[from] shardwright_core::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ClusterError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClusterError::Validation(_)
            | ClusterError::NotAMaster(_)
            | ClusterError::NotAReplica { .. }
            | ClusterError::NotPromotable { .. }
            | ClusterError::InvalidTransition { .. }
            | ClusterError::InvalidRange(_) => ErrorKind::Validation,
            ClusterError::NodeNotFound(_)
            | ClusterError::PoolNotFound(_)
            | ClusterError::ShardNotFound(_) => ErrorKind::NotFound,
            ClusterError::InsufficientSpares { .. } => ErrorKind::InsufficientResource,
            ClusterError::InconsistentTopology(_) => ErrorKind::InconsistentTopology,
            ClusterError::PartialFailure { .. } => ErrorKind::PartialFailure,
            ClusterError::Transport { .. } => ErrorKind::Transport,
            ClusterError::Inventory(e) if e.is_validation() => ErrorKind::Validation,
            ClusterError::Inventory(_) | ClusterError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn transport(node: impl fmt::Display, message: impl fmt::Display) -> Self {
        ClusterError::Transport {
            node: node.to_string(),
            message: message.to_string(),
        }
    }

    pub fn insufficient(role: Option<NodeRole>, needed: usize, available: usize) -> Self {
        ClusterError::InsufficientSpares {
            role: role.map_or_else(|| "any role".to_string(), |r| r.to_string()),
            needed,
            available,
        }
    }

    /// Per-target outcomes of a partial failure
    pub fn outcomes(&self) -> &[TargetOutcome] {
        match self {
            ClusterError::PartialFailure { outcomes, .. } => outcomes,
            _ => &[],
        }
    }
}

/// Map core model errors onto the cluster taxonomy
pub(crate) fn model_error(err: shardwright_core::Error) -> ClusterError {
    match err {
        shardwright_core::Error::InvalidRange(msg) => ClusterError::InvalidRange(msg),
        shardwright_core::Error::InvalidTransition { shard, from, to } => {
            ClusterError::InvalidTransition { shard, from, to }
        }
        shardwright_core::Error::InvalidArgument(msg) => ClusterError::Validation(msg),
        other => ClusterError::Inventory(other),
    }
}

/// Whether one target of a fan-out step finished
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutcomeStatus {
    Succeeded,
    Failed(String),
}

/// Result of one target (node or child shard) of a fan-out step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetOutcome {
    pub target: String,
    pub status: OutcomeStatus,
}

impl TargetOutcome {
    pub fn succeeded(&self) -> bool {
        self.status == OutcomeStatus::Succeeded
    }

    pub fn from_result<T>(target: impl fmt::Display, result: &ClusterResult<T>) -> Self {
        Self {
            target: target.to_string(),
            status: match result {
                Ok(_) => OutcomeStatus::Succeeded,
                Err(e) => OutcomeStatus::Failed(e.to_string()),
            },
        }
    }
}

impl fmt::Display for TargetOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.status {
            OutcomeStatus::Succeeded => write!(f, "{}: ok", self.target),
            OutcomeStatus::Failed(reason) => write!(f, "{}: FAILED ({})", self.target, reason),
        }
    }
}

/// Turn collected outcomes into an error when any target failed
pub(crate) fn check_outcomes(operation: &str, outcomes: Vec<TargetOutcome>) -> ClusterResult<()> {
    if outcomes.iter().all(TargetOutcome::succeeded) {
        Ok(())
    } else {
        Err(ClusterError::PartialFailure {
            operation: operation.to_string(),
            outcomes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let err = ClusterError::NotAReplica {
            node: "a".into(),
            master: "b".into(),
        };
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(
            ClusterError::insufficient(Some(NodeRole::Master), 2, 1).kind(),
            ErrorKind::InsufficientResource
        );
        let err = model_error(shardwright_core::Error::InvalidRange("gap".into()));
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_partial_failure_message() {
        let ok: ClusterResult<()> = Ok(());
        let failed: ClusterResult<()> = Err(ClusterError::transport("10.0.0.2:3306", "timeout"));
        let outcomes = vec![
            TargetOutcome::from_result("10.0.0.1:3306", &ok),
            TargetOutcome::from_result("10.0.0.2:3306", &failed),
        ];
        let err = check_outcomes("promote", outcomes).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PartialFailure);
        assert_eq!(
            err.to_string(),
            "promote partially failed (1 of 2 targets failed)"
        );
        assert!(err.outcomes()[1].to_string().contains("timeout"));
    }
}
