//! Replica role commands: activate, weight, standby, remove-replica, add-standbys

use super::CommandContext;
use crate::utils::parse_addr;
use anyhow::Result;
use colored::Colorize;

pub async fn activate(ctx: &CommandContext, replica: &str, weight: Option<u32>) -> Result<()> {
    let address = parse_addr(replica)?;
    let weight = weight.unwrap_or(ctx.topology.config().default_replica_weight);
    let result = ctx.topology.mark_replica_active(&address, weight).await;
    if ctx.finish(result).await?.is_some() {
        ctx.info(&format!("{} {} (weight {})", "active".green(), address, weight));
    }
    Ok(())
}

pub async fn weight(ctx: &CommandContext, replica: &str, weight: u32) -> Result<()> {
    let address = parse_addr(replica)?;
    let result = ctx.topology.set_replica_weight(&address, weight).await;
    if ctx.finish(result).await?.is_some() {
        ctx.info(&format!("{} now has weight {}", address, weight));
    }
    Ok(())
}

pub async fn standby(ctx: &CommandContext, replica: &str) -> Result<()> {
    let address = parse_addr(replica)?;
    let result = ctx.topology.mark_replica_standby(&address).await;
    if ctx.finish(result).await?.is_some() {
        ctx.info(&format!("{} {}", "standby".yellow(), address));
    }
    Ok(())
}

pub async fn remove(ctx: &CommandContext, replica: &str) -> Result<()> {
    let address = parse_addr(replica)?;
    let result = ctx.topology.remove_replica(&address).await;
    if ctx.finish(result).await?.is_some() {
        ctx.info(&format!("{} {}", "removed".red(), address));
    }
    Ok(())
}

pub async fn add_standbys(ctx: &CommandContext, pool: &str, count: usize) -> Result<()> {
    let result = ctx.topology.add_standby_replicas(pool, count, &ctx.exec).await;
    if let Some(added) = ctx.finish(result).await? {
        for address in &added {
            ctx.info(&format!("{} {} -> {}", "added".green(), address, pool));
        }
    }
    Ok(())
}
