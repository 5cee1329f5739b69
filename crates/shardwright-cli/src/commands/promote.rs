//! promote command - replace a pool master

use super::CommandContext;
use crate::utils::parse_addr;
use anyhow::{bail, Result};
use colored::Colorize;
use shardwright_cluster::{DemotedRole, PromotionOutcome, PromotionProtocol, PromotionRequest};

pub async fn execute(
    ctx: &CommandContext,
    master: &str,
    replica: Option<&str>,
    demoted_role: Option<DemotedRole>,
    replica_set: Vec<String>,
) -> Result<()> {
    let role = match (demoted_role, replica) {
        (Some(role), _) => role,
        // Listing candidates never demotes anything
        (None, None) => DemotedRole::Retired,
        (None, Some(_)) => bail!("--demote-to is required when promoting a replica"),
    };
    let mut request = PromotionRequest::new(parse_addr(master)?, role);
    if let Some(replica) = replica {
        request = request.promote(parse_addr(replica)?);
    }
    if !replica_set.is_empty() {
        let replicas = replica_set
            .iter()
            .map(|r| parse_addr(r))
            .collect::<Result<Vec<_>>>()?;
        request = request.with_replicas_override(replicas);
    }
    ctx.debug(&format!("Promotion request: {:?}", request));

    let result = PromotionProtocol::new(&ctx.topology)
        .run(request, &ctx.exec)
        .await;

    match result {
        Ok(PromotionOutcome::AwaitingChoice { pool, candidates }) => {
            ctx.info(&format!("Promotable replicas of {}:", pool.bold()));
            for candidate in &candidates {
                ctx.info(&format!("  {}", candidate));
            }
            ctx.info("Re-run with --replica <host:port> to promote one");
            Ok(())
        }
        Ok(PromotionOutcome::Promoted(report)) => {
            ctx.publish().await?;
            ctx.info(&format!(
                "{} {} is now master of {} ({} replicas reparented)",
                "promoted".green(),
                report.new_master,
                report.pool,
                report.reparented.len()
            ));
            Ok(())
        }
        Ok(PromotionOutcome::Skipped) => {
            ctx.info(&format!("{} promotion skipped by a callback", "!".yellow()));
            Ok(())
        }
        Err(e) => ctx.finish::<()>(Err(e)).await.map(|_| ()),
    }
}
