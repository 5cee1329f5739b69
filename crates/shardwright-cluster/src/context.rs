//! Execution context threaded through every protocol call

use shardwright_core::config::OrchestrationConfig;

/// Validation toggles and limits for one operator command
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// Check replication health before promoting or moving traffic
    pub verify_replication: bool,
    pub max_replication_lag_secs: u64,
    /// Worker limit for fan-out steps
    pub concurrency: usize,
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::from_config(&OrchestrationConfig::default())
    }
}

impl ExecutionContext {
    pub fn from_config(config: &OrchestrationConfig) -> Self {
        Self {
            verify_replication: true,
            max_replication_lag_secs: config.max_replication_lag_secs,
            concurrency: config.max_concurrency.max(1),
        }
    }

    /// Skip replication health checks (e.g. the old master is gone for good)
    pub fn without_replication_check(mut self) -> Self {
        self.verify_replication = false;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_strict() {
        let ctx = ExecutionContext::default();
        assert!(ctx.verify_replication);
        assert_eq!(ctx.concurrency, 8);
        assert_eq!(ctx.max_replication_lag_secs, 30);

        let relaxed = ctx.without_replication_check().with_concurrency(0);
        assert!(!relaxed.verify_replication);
        assert_eq!(relaxed.concurrency, 1);
    }
}
