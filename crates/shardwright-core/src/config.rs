//! Configuration for Shardwright

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShardwrightConfig {
    #[serde(default)]
    pub orchestration: OrchestrationConfig,

    #[serde(default)]
    pub inventory: InventoryConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ShardwrightConfig {
    pub fn from_file(path: &str) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::Config(format!("Failed to read config: {}", e)))?;

        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> crate::Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(n) = std::env::var("SHARDWRIGHT_STANDBYS_PER_POOL") {
            if let Ok(n) = n.parse() {
                config.orchestration.standbys_per_pool = n;
            }
        }
        if let Ok(n) = std::env::var("SHARDWRIGHT_MAX_CONCURRENCY") {
            if let Ok(n) = n.parse() {
                config.orchestration.max_concurrency = n;
            }
        }
        if let Ok(lag) = std::env::var("SHARDWRIGHT_MAX_REPLICATION_LAG_SECS") {
            if let Ok(lag) = lag.parse() {
                config.orchestration.max_replication_lag_secs = lag;
            }
        }
        if let Ok(path) = std::env::var("SHARDWRIGHT_SNAPSHOT") {
            config.inventory.snapshot_path = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("SHARDWRIGHT_APP_CONFIG") {
            config.inventory.app_config_path = Some(PathBuf::from(path));
        }
        if let Ok(level) = std::env::var("SHARDWRIGHT_LOG_LEVEL") {
            config.logging.level = level;
        }

        config
    }

    pub fn validate(&self) -> crate::Result<()> {
        self.orchestration.validate()
    }
}

/// Knobs for the orchestration engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationConfig {
    /// Standby replicas claimed alongside every new master
    pub standbys_per_pool: usize,
    /// Worker limit for fan-out steps
    pub max_concurrency: usize,
    /// Maximum replication lag accepted on a promotion candidate
    pub max_replication_lag_secs: u64,
    /// Weight used when activating a replica without one
    pub default_replica_weight: u32,
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            standbys_per_pool: crate::DEFAULT_STANDBYS_PER_POOL,
            max_concurrency: crate::DEFAULT_MAX_CONCURRENCY,
            max_replication_lag_secs: crate::DEFAULT_MAX_REPLICATION_LAG_SECS,
            default_replica_weight: crate::DEFAULT_REPLICA_WEIGHT,
        }
    }
}

impl OrchestrationConfig {
    pub fn validate(&self) -> crate::Result<()> {
        if self.max_concurrency == 0 {
            return Err(crate::Error::Config(
                "max_concurrency must be at least 1".into(),
            ));
        }
        if self.default_replica_weight == 0 {
            return Err(crate::Error::Config(
                "default_replica_weight must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Where the snapshot inventory and the rendered app config live
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryConfig {
    /// JSON snapshot backing the in-memory inventory
    pub snapshot_path: PathBuf,
    /// Destination of the rendered application config
    pub app_config_path: Option<PathBuf>,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            snapshot_path: PathBuf::from("shardwright.json"),
            app_config_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ShardwrightConfig::default();
        assert_eq!(config.orchestration.standbys_per_pool, 2);
        assert_eq!(config.orchestration.max_concurrency, 8);
        assert_eq!(config.logging.level, "info");
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_toml() {
        let config = ShardwrightConfig::from_toml_str(
            r#"
            [orchestration]
            standbys_per_pool = 1
            max_concurrency = 4
            max_replication_lag_secs = 10
            default_replica_weight = 50
            "#,
        )
        .unwrap();
        assert_eq!(config.orchestration.standbys_per_pool, 1);
        assert_eq!(config.orchestration.default_replica_weight, 50);
        assert_eq!(config.inventory.snapshot_path, PathBuf::from("shardwright.json"));
    }

    #[test]
    fn test_rejects_zero_concurrency() {
        let result = ShardwrightConfig::from_toml_str(
            r#"
            [orchestration]
            standbys_per_pool = 1
            max_concurrency = 0
            max_replication_lag_secs = 10
            default_replica_weight = 50
            "#,
        );
        assert!(result.is_err());
    }
}
