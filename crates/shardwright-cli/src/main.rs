//! Shardwright - database pool and shard orchestration
//!
//! Drives the orchestration engine against a JSON inventory snapshot and a
//! simulated fleet. Every mutating command republishes the application
//! config and saves the snapshot.

mod commands;
mod utils;

use clap::{Parser, Subcommand, ValueEnum};
use commands::CommandContext;
use shardwright_core::ShardwrightConfig;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "shardwright")]
#[command(author = "Shardwright Team")]
#[command(version = shardwright_core::VERSION)]
#[command(about = "Database pool and shard orchestration", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true, env = "SHARDWRIGHT_CONFIG")]
    config: Option<String>,

    /// Inventory snapshot (JSON)
    #[arg(short, long, global = true, env = "SHARDWRIGHT_SNAPSHOT")]
    snapshot: Option<String>,

    /// Where to write the rendered application config
    #[arg(long, global = true, env = "SHARDWRIGHT_APP_CONFIG")]
    app_config: Option<String>,

    /// Worker limit for fan-out steps
    #[arg(long, global = true)]
    concurrency: Option<usize>,

    /// Skip replication health checks (for dead or lagging masters)
    #[arg(long, global = true)]
    skip_replication_check: bool,

    /// Suspend monitoring and kill long queries around disruptive operations
    #[arg(long, global = true)]
    maintenance: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "SHARDWRIGHT_LOG_LEVEL")]
    log_level: Option<String>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show a pool or shard, or every pool and shard
    Summary {
        /// Pool or shard name
        name: Option<String>,
    },

    /// List unclaimed spare nodes
    Spares,

    /// Replace a pool master with one of its replicas
    Promote {
        /// Current master
        master: String,

        /// Replica to promote; omit to list candidates
        #[arg(long, requires = "demote_to")]
        replica: Option<String>,

        /// What becomes of the old master (required with --replica)
        #[arg(long, value_enum)]
        demote_to: Option<DemoteTo>,

        /// Replica set to use when the master cannot be asked (repeatable)
        #[arg(long = "replica-set")]
        replica_set: Vec<String>,
    },

    /// Start sending reads to a standby replica
    Activate {
        replica: String,
        /// Read weight (defaults to the configured replica weight)
        #[arg(long)]
        weight: Option<u32>,
    },

    /// Change the read weight of an active replica
    Weight { replica: String, weight: u32 },

    /// Stop sending reads to an active replica
    Standby { replica: String },

    /// Detach a standby or backup replica from its pool
    RemoveReplica { replica: String },

    /// Clone new standby replicas from spares
    AddStandbys {
        pool: String,
        #[arg(default_value = "1")]
        count: usize,
    },

    /// Set a shard ready, read-only or offline
    ShardState {
        /// Shard range, e.g. 0-999 or 3000-inf
        range: String,
        #[arg(value_enum)]
        state: StateArg,
    },

    /// Phase 1: split a shard onto spare hardware
    Split {
        /// Shard range, e.g. 0-999
        range: String,

        /// Number of equal children
        #[arg(long, default_value = "2", conflicts_with = "ranges")]
        children: usize,

        /// Explicit child ranges (repeatable)
        #[arg(long = "range")]
        ranges: Vec<String>,
    },

    /// Re-run the clone of a split child stuck initializing
    SplitResume { child: String },

    /// Phase 2: route reads to the split children
    SplitReads {
        /// Parent range, when more than one split is in flight
        #[arg(long)]
        parent: Option<String>,
    },

    /// Phase 3: route writes to the split children
    SplitWrites {
        #[arg(long)]
        parent: Option<String>,
    },

    /// Phase 4: prune the children and retire the parent
    SplitCleanup {
        #[arg(long)]
        parent: Option<String>,
    },

    /// Cap the last shard and start a new one at `cutover_id`
    Cutover { cutover_id: u64 },

    /// Re-render and publish the application config
    WriteConfig {
        /// Also print the config
        #[arg(long)]
        print: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum DemoteTo {
    Retire,
    Standby,
}

#[derive(Clone, Copy, ValueEnum)]
enum StateArg {
    Ready,
    ReadOnly,
    Offline,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ShardwrightConfig::from_file(path)?,
        None => ShardwrightConfig::from_env(),
    };
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    if let Some(path) = &cli.snapshot {
        config.inventory.snapshot_path = path.into();
    }
    if let Some(path) = &cli.app_config {
        config.inventory.app_config_path = Some(path.into());
    }
    init_logging(&config, cli.quiet);

    let ctx = CommandContext::open(&cli, config).await?;

    match cli.command {
        Commands::Summary { name } => commands::summary::execute(&ctx, name.as_deref()),
        Commands::Spares => commands::summary::spares(&ctx),
        Commands::Promote {
            master,
            replica,
            demote_to,
            replica_set,
        } => {
            commands::promote::execute(
                &ctx,
                &master,
                replica.as_deref(),
                demote_to.map(|role| match role {
                    DemoteTo::Retire => shardwright_cluster::DemotedRole::Retired,
                    DemoteTo::Standby => shardwright_cluster::DemotedRole::StandbyCandidate,
                }),
                replica_set,
            )
            .await
        }
        Commands::Activate { replica, weight } => {
            commands::replica::activate(&ctx, &replica, weight).await
        }
        Commands::Weight { replica, weight } => {
            commands::replica::weight(&ctx, &replica, weight).await
        }
        Commands::Standby { replica } => commands::replica::standby(&ctx, &replica).await,
        Commands::RemoveReplica { replica } => commands::replica::remove(&ctx, &replica).await,
        Commands::AddStandbys { pool, count } => {
            commands::replica::add_standbys(&ctx, &pool, count).await
        }
        Commands::ShardState { range, state } => {
            let state = match state {
                StateArg::Ready => shardwright_cluster::ShardState::Ready,
                StateArg::ReadOnly => shardwright_cluster::ShardState::ReadOnly,
                StateArg::Offline => shardwright_cluster::ShardState::Offline,
            };
            commands::shard::set_state(&ctx, &range, state).await
        }
        Commands::Split {
            range,
            children,
            ranges,
        } => commands::split::split(&ctx, &range, children, &ranges).await,
        Commands::SplitResume { child } => commands::split::resume(&ctx, &child).await,
        Commands::SplitReads { parent } => {
            commands::split::move_reads(&ctx, parent.as_deref()).await
        }
        Commands::SplitWrites { parent } => {
            commands::split::move_writes(&ctx, parent.as_deref()).await
        }
        Commands::SplitCleanup { parent } => {
            commands::split::cleanup(&ctx, parent.as_deref()).await
        }
        Commands::Cutover { cutover_id } => commands::shard::cutover(&ctx, cutover_id).await,
        Commands::WriteConfig { print } => commands::config::execute(&ctx, print).await,
    }
}

fn init_logging(config: &ShardwrightConfig, quiet: bool) {
    let level = if quiet { "error" } else { config.logging.level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if config.logging.format == "json" {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(true))
            .with(filter)
            .init();
    }
}
