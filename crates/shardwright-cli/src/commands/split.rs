//! Split phase commands: split, split-resume, split-reads, split-writes, split-cleanup

use super::CommandContext;
use crate::utils::{parse_optional_range, parse_range};
use anyhow::Result;
use colored::Colorize;
use shardwright_cluster::{SplitPipeline, SplitPlan};

pub async fn split(ctx: &CommandContext, range: &str, children: usize, ranges: &[String]) -> Result<()> {
    let parent = parse_range(range)?;
    let plan = if ranges.is_empty() {
        SplitPlan::Even(children)
    } else {
        SplitPlan::Ranges(
            ranges
                .iter()
                .map(|r| parse_range(r))
                .collect::<Result<Vec<_>>>()?,
        )
    };
    ctx.debug(&format!("Splitting {} with {:?}", parent, plan));

    let result = SplitPipeline::new(&ctx.topology)
        .split(parent, plan, &ctx.exec)
        .await;
    if let Some(report) = ctx.finish(result).await? {
        for child in &report.children {
            ctx.info(&format!("{} {}", "replicating".green(), child));
        }
        ctx.info("Next: split-reads once the children have caught up");
    }
    Ok(())
}

pub async fn resume(ctx: &CommandContext, child: &str) -> Result<()> {
    let child = parse_range(child)?;
    let result = SplitPipeline::new(&ctx.topology)
        .resume_child(child, &ctx.exec)
        .await;
    if ctx.finish(result).await?.is_some() {
        ctx.info(&format!("{} {}", "replicating".green(), child));
    }
    Ok(())
}

pub async fn move_reads(ctx: &CommandContext, parent: Option<&str>) -> Result<()> {
    let selector = parse_optional_range(parent)?;
    let result = SplitPipeline::new(&ctx.topology)
        .move_reads_to_children(selector, &ctx.exec)
        .await;
    if ctx.finish(result).await?.is_some() {
        ctx.info("Reads now go to the split children");
    }
    Ok(())
}

pub async fn move_writes(ctx: &CommandContext, parent: Option<&str>) -> Result<()> {
    let selector = parse_optional_range(parent)?;
    let result = SplitPipeline::new(&ctx.topology)
        .move_writes_to_children(selector, &ctx.exec)
        .await;
    if ctx.finish(result).await?.is_some() {
        ctx.info("Writes now go to the split children");
    }
    Ok(())
}

pub async fn cleanup(ctx: &CommandContext, parent: Option<&str>) -> Result<()> {
    let selector = parse_optional_range(parent)?;
    let result = SplitPipeline::new(&ctx.topology)
        .cleanup(selector, &ctx.exec)
        .await;
    if let Some(report) = ctx.finish(result).await? {
        ctx.info(&format!(
            "{} {} retired, {} children ready",
            "done".green(),
            report.parent,
            report.children.len()
        ));
    }
    Ok(())
}
