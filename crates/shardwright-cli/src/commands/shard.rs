//! shard-state and cutover commands

use super::CommandContext;
use crate::utils::parse_range;
use anyhow::Result;
use colored::Colorize;
use shardwright_cluster::ShardState;

pub async fn set_state(ctx: &CommandContext, range: &str, state: ShardState) -> Result<()> {
    let range = parse_range(range)?;
    let result = ctx.topology.set_shard_state(range, state).await;
    if ctx.finish(result).await?.is_some() {
        ctx.info(&format!("{} is now {}", range, state.as_str().bold()));
    }
    Ok(())
}

pub async fn cutover(ctx: &CommandContext, cutover_id: u64) -> Result<()> {
    let result = ctx.topology.cutover(cutover_id, &ctx.exec).await;
    if let Some(report) = ctx.finish(result).await? {
        ctx.info(&format!("{} capped at {}", "cutover".green(), report.capped));
        ctx.info(&format!(
            "new shard {} on {} with {} standbys",
            report.new_range,
            report.master,
            report.standbys.len()
        ));
    }
    Ok(())
}
