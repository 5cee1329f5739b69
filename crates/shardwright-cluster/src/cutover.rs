//! Growing the key space past the open-ended last shard

use shardwright_core::types::{NodeAddr, NodeRole, Shard, ShardRange, ShardState, SpareFilter};
use tracing::{info, instrument, warn};

use crate::callbacks::{HookContext, Intercepted, Operation};
use crate::context::ExecutionContext;
use crate::error::{check_outcomes, model_error, ClusterError, ClusterResult};
use crate::fanout::{fan_out, outcomes};
use crate::metrics;
use crate::spares::SpareRequest;
use crate::topology::Topology;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CutoverReport {
    /// The old last shard, now bounded
    pub capped: ShardRange,
    pub new_range: ShardRange,
    pub master: NodeAddr,
    pub standbys: Vec<NodeAddr>,
}

impl Topology {
    /// Cap the open-ended last shard just before `cutover_id` and start a
    /// fresh open-ended shard there on spare hardware. Only the schema is
    /// copied; the new shard starts empty.
    ///
    /// The new shard is registered `offline` and only turns `ready` once
    /// every node has the schema, so a failed copy never routes writes to it.
    #[instrument(skip(self, ctx))]
    pub async fn cutover(
        &self,
        cutover_id: u64,
        ctx: &ExecutionContext,
    ) -> ClusterResult<Intercepted<CutoverReport>> {
        let last = self
            .read(|c| {
                c.shards
                    .values()
                    .filter(|s| s.is_top_level())
                    .last()
                    .cloned()
            })
            .ok_or_else(|| ClusterError::ShardNotFound("no shards are registered".into()))?;
        if !last.range.is_unbounded() {
            return Err(ClusterError::InconsistentTopology(format!(
                "last shard {} is not open-ended",
                last.range
            )));
        }
        if last.state != ShardState::Ready {
            return Err(ClusterError::Validation(format!(
                "last shard {} is {}, expected ready",
                last.range, last.state
            )));
        }
        let (capped, new_range) = last.range.split_at(cutover_id).map_err(model_error)?;
        let old_master = last.master.clone().ok_or_else(|| {
            ClusterError::Validation(format!("shard {} has no master", last.range))
        })?;
        let hardware = self.node(&old_master)?.hardware;
        let version = self.node(&old_master)?.version;

        let hook = HookContext::new(Operation::Cutover, &last.pool.name)
            .with_nodes([old_master.clone()])
            .with_detail("cutover_id", cutover_id);
        self.callbacks()
            .intercept(&hook, async {
                let standby_count = self.config().standbys_per_pool;
                let mut groups = self
                    .claim_spare_batch(&[
                        SpareRequest::new(1, SpareFilter::role(NodeRole::Master).like(&hardware)),
                        SpareRequest::new(
                            standby_count,
                            SpareFilter::role(NodeRole::StandbyReplica).like(&hardware),
                        ),
                    ])
                    .await?;
                let standby_spares = groups.pop().unwrap_or_default();
                let master_spare = groups
                    .pop()
                    .and_then(|mut g| g.pop())
                    .ok_or_else(|| ClusterError::Internal("master claim came back empty".into()))?;
                let master = master_spare.address().clone();
                let standbys: Vec<NodeAddr> =
                    standby_spares.iter().map(|s| s.address().clone()).collect();

                self.write(|c| -> ClusterResult<()> {
                    let mut shard = c
                        .shards
                        .remove(&last.range)
                        .ok_or_else(|| ClusterError::ShardNotFound(last.range.to_string()))?;
                    shard.rekey(capped);
                    for address in shard.members() {
                        if let Some(node) = c.nodes.get_mut(address) {
                            node.pool = Some(shard.pool.name.clone());
                        }
                    }
                    c.shards.insert(capped, shard);

                    let name = new_range.pool_name();
                    let mut fresh = Shard::new(new_range).with_state(ShardState::Offline);
                    fresh.master = Some(master.clone());

                    let mut node = master_spare.node;
                    node.role = NodeRole::Master;
                    node.pool = Some(name.clone());
                    node.version = version.clone();
                    c.nodes.insert(master.clone(), node);
                    for spare in standby_spares {
                        let mut node = spare.node;
                        node.role = NodeRole::StandbyReplica;
                        node.pool = Some(name.clone());
                        node.master = Some(master.clone());
                        node.version = version.clone();
                        fresh.replicas.insert(node.address.clone());
                        c.nodes.insert(node.address.clone(), node);
                    }
                    c.shards.insert(new_range, fresh);
                    Ok(())
                })?;

                self.inventory().remove_shard(&last.pool.name).await?;
                self.persist_shard(&capped).await?;
                self.persist_shard(&new_range).await?;
                info!("Capped {} at {} and registered {}", last.range, capped, new_range);

                let schema = self.transport().export_schema(&old_master).await?;
                let mut targets = vec![master.clone()];
                targets.extend(standbys.iter().cloned());
                let results = fan_out(targets, ctx.concurrency, |node| {
                    let schema = &schema;
                    let master = &master;
                    async move {
                        self.transport().import_schema(&node, schema).await?;
                        if &node == master {
                            self.transport().disable_read_only(&node).await
                        } else {
                            self.transport().change_replication_source(&node, master).await
                        }
                    }
                })
                .await;

                let failed = results.iter().any(|(_, r)| r.is_err());
                if failed {
                    warn!("{} stays offline until its nodes have the schema", new_range);
                } else {
                    self.write(|c| -> ClusterResult<()> {
                        c.shard_mut(&new_range)?
                            .transition(ShardState::Ready)
                            .map_err(model_error)
                    })?;
                    self.persist_shard(&new_range).await?;
                    metrics::record_cutover();
                }
                self.write_config().await?;
                check_outcomes("cutover", outcomes(&results))?;

                Ok::<_, ClusterError>(CutoverReport {
                    capped,
                    new_range,
                    master: master.clone(),
                    standbys: standbys.clone(),
                })
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use crate::topology::tests::{addr, fleet, harness};
    use crate::transport::SimOp;
    use crate::{ErrorKind, ExecutionContext, ShardRange, ShardState};

    const SCHEMA: [&str; 2] = [
        "CREATE TABLE users (id BIGINT PRIMARY KEY, name VARCHAR(64))",
        "CREATE INDEX users_name ON users (name)",
    ];

    #[tokio::test]
    async fn test_cutover_at_5000() {
        let h = harness(fleet(3)).await;
        let old_master = addr("10.1.2.1:3306");
        h.transport.set_schema(&old_master, SCHEMA);

        let report = h
            .topology
            .cutover(5000, &ExecutionContext::default())
            .await
            .unwrap()
            .completed()
            .unwrap();

        let capped = ShardRange::bounded(3000, 4999).unwrap();
        let fresh = ShardRange::unbounded(5000);
        assert_eq!(report.capped, capped);
        assert_eq!(report.new_range, fresh);

        let old = h.topology.shard_at(&capped).unwrap();
        assert_eq!(old.master, Some(old_master.clone()));
        assert_eq!(old.replicas.len(), 2);
        assert_eq!(
            h.topology.node(&old_master).unwrap().pool.as_deref(),
            Some("shard-3000-4999")
        );

        let new = h.topology.shard_at(&fresh).unwrap();
        assert_eq!(new.state, ShardState::Ready);
        assert_eq!(new.master, Some(report.master.clone()));
        assert_eq!(new.replicas.len(), 2);
        assert_eq!(h.transport.schema(&report.master), h.transport.schema(&old_master));
        assert!(h.transport.rows(&report.master).is_empty());
        for standby in &report.standbys {
            assert_eq!(h.transport.source(standby), Some(report.master.clone()));
        }

        assert!(h.inventory.shard("shard-3000-inf").is_none());
        assert!(h.inventory.shard("shard-3000-4999").is_some());
        let config = h.inventory.app_config().unwrap();
        assert_eq!(config.route_for(4999).unwrap().writes, Some(old_master));
        assert_eq!(config.route_for(1_000_000).unwrap().writes, Some(report.master));
    }

    #[tokio::test]
    async fn test_cutover_validates_before_claiming() {
        let h = harness(fleet(3)).await;
        let ctx = ExecutionContext::default();

        let err = h.topology.cutover(3000, &ctx).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(h.topology.available_spares().len(), 3);

        let short = harness(fleet(2)).await;
        let err = short.topology.cutover(5000, &ctx).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientResource);
        assert_eq!(short.inventory.spare_count(), 2);
        assert!(short
            .topology
            .shard_at(&ShardRange::unbounded(3000))
            .is_ok());
    }

    #[tokio::test]
    async fn test_failed_schema_import_leaves_new_shard_offline() {
        let h = harness(fleet(3)).await;
        h.transport.fail(SimOp::ImportSchema, "10.9.0.2:3306");

        let err = h
            .topology
            .cutover(5000, &ExecutionContext::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PartialFailure);

        let new = h.topology.shard_at(&ShardRange::unbounded(5000)).unwrap();
        assert_eq!(new.state, ShardState::Offline);
        let config = h.inventory.app_config().unwrap();
        let route = config.route_for(6000).unwrap();
        assert!(route.writes.is_none());
        assert!(route.reads.is_empty());
    }
}
