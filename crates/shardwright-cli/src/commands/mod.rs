//! CLI command implementations

pub mod config;
pub mod promote;
pub mod replica;
pub mod shard;
pub mod split;
pub mod summary;

use anyhow::{Context, Result};
use colored::Colorize;
use shardwright_cluster::{
    CallbackDispatcher, ClusterError, ClusterResult, ErrorKind, ExecutionContext, Intercepted,
    MaintenanceHooks, MemoryTransport, Operation, Topology,
};
use shardwright_core::ShardwrightConfig;
use shardwright_inventory::MemoryInventory;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use crate::Cli;

/// Operations wrapped in a maintenance window with `--maintenance`
const MAINTENANCE_OPERATIONS: [Operation; 4] = [
    Operation::Promote,
    Operation::MoveWritesToChildren,
    Operation::Cleanup,
    Operation::Cutover,
];

/// Context passed to all commands
pub struct CommandContext {
    pub topology: Topology,
    pub inventory: Arc<MemoryInventory>,
    pub exec: ExecutionContext,
    pub snapshot_path: PathBuf,
    pub verbose: bool,
    pub quiet: bool,
}

impl CommandContext {
    /// Load the snapshot and build the engine around it
    pub async fn open(cli: &Cli, config: ShardwrightConfig) -> Result<Self> {
        let snapshot_path = config.inventory.snapshot_path.clone();
        let mut inventory = MemoryInventory::load_snapshot(&snapshot_path)
            .with_context(|| format!("loading {}", snapshot_path.display()))?;
        if let Some(path) = &config.inventory.app_config_path {
            inventory = inventory.with_app_config_path(path);
        }
        let inventory = Arc::new(inventory);
        let transport = Arc::new(MemoryTransport::from_snapshot(&inventory.snapshot()));

        let callbacks = CallbackDispatcher::new();
        if cli.maintenance {
            MaintenanceHooks::install(&callbacks, transport.clone(), &MAINTENANCE_OPERATIONS);
        }

        let topology = Topology::load(
            inventory.clone(),
            transport,
            config.orchestration.clone(),
        )
        .await?
        .with_callbacks(Arc::new(callbacks));

        let mut exec = ExecutionContext::from_config(&config.orchestration);
        if cli.skip_replication_check {
            exec = exec.without_replication_check();
        }
        if let Some(n) = cli.concurrency {
            exec = exec.with_concurrency(n);
        }

        Ok(Self {
            topology,
            inventory,
            exec,
            snapshot_path,
            verbose: cli.verbose,
            quiet: cli.quiet,
        })
    }

    /// Print info message if not quiet
    pub fn info(&self, msg: &str) {
        if !self.quiet {
            println!("{}", msg);
        }
    }

    /// Print verbose message if verbose mode
    pub fn debug(&self, msg: &str) {
        if self.verbose {
            eprintln!("[DEBUG] {}", msg);
        }
    }

    /// Print error message
    pub fn error(&self, msg: &str) {
        eprintln!("{}", msg);
    }

    /// Publish config and save the snapshot after a mutating command.
    ///
    /// A partial failure still persists what was reached, so the snapshot
    /// is saved before the error is returned.
    pub async fn finish<T>(&self, result: ClusterResult<Intercepted<T>>) -> Result<Option<T>> {
        let value = match result {
            Ok(Intercepted::Completed(value)) => Some(value),
            Ok(Intercepted::Skipped) => {
                self.info(&format!("{} operation skipped by a callback", "!".yellow()));
                None
            }
            Err(e @ ClusterError::PartialFailure { .. }) => {
                self.error(&format!("{} {}", "partial failure:".red().bold(), e));
                for outcome in e.outcomes() {
                    self.error(&format!("  {}", outcome));
                }
                self.publish().await?;
                return Err(e.into());
            }
            Err(e) => {
                if e.kind() == ErrorKind::InsufficientResource {
                    self.error("nothing was claimed; add spares and retry");
                }
                self.save()?;
                return Err(e.into());
            }
        };
        self.publish().await?;
        Ok(value)
    }

    async fn publish(&self) -> Result<()> {
        let config = self.topology.write_config().await?;
        self.debug(&format!(
            "published config with {} shard routes",
            config.shards.len()
        ));
        self.save()
    }

    fn save(&self) -> Result<()> {
        self.inventory
            .save_snapshot(&self.snapshot_path)
            .with_context(|| format!("saving {}", self.snapshot_path.display()))?;
        debug!("Snapshot saved to {}", self.snapshot_path.display());
        Ok(())
    }
}
