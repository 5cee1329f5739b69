//! write-config command

use super::CommandContext;
use anyhow::Result;

pub async fn execute(ctx: &CommandContext, print: bool) -> Result<()> {
    ctx.publish().await?;
    let config = ctx.topology.render_config();
    if print {
        println!("{}", serde_json::to_string_pretty(&config)?);
    } else {
        ctx.info(&format!(
            "Wrote config: {} pools, {} shard routes",
            config.pools.len(),
            config.shards.len()
        ));
    }
    Ok(())
}
