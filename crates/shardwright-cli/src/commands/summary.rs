//! summary and spares commands - read-only views of the topology

use super::CommandContext;
use anyhow::Result;
use colored::Colorize;

pub fn execute(ctx: &CommandContext, name: Option<&str>) -> Result<()> {
    let names: Vec<String> = match name {
        Some(name) => vec![name.to_string()],
        None => ctx
            .topology
            .pools()
            .into_iter()
            .map(|p| p.name)
            .chain(ctx.topology.shards().into_iter().map(|s| s.pool.name))
            .collect(),
    };

    for name in &names {
        let summary = ctx.topology.summary(name)?;
        ctx.info(&summary.to_string());
    }

    if name.is_none() {
        if let Ok(parent) = ctx.topology.shard_mid_split(None) {
            ctx.info(&format!(
                "{} split of {} in progress ({} children)",
                "*".yellow(),
                parent.range,
                parent.children.len()
            ));
        }
    }
    Ok(())
}

pub fn spares(ctx: &CommandContext) -> Result<()> {
    let spares = ctx.topology.available_spares();
    if spares.is_empty() {
        ctx.info("No spares available");
        return Ok(());
    }

    for spare in &spares {
        let hardware = spare.hardware();
        let fills = if spare.fills.is_empty() {
            "master, standby_replica".to_string()
        } else {
            spare
                .fills
                .iter()
                .map(|r| r.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        };
        ctx.info(&format!(
            "{:<24} {:<12} {:>4} GB  {:<6} fills: {}",
            spare.address().to_string().cyan(),
            hardware.class,
            hardware.memory_gb,
            hardware.datacenter,
            fills
        ));
    }
    ctx.info(&format!("\nTotal: {} spares", spares.len()));
    Ok(())
}
