//! Shard split pipeline
//!
//! A split runs in four phases that an operator triggers one at a time,
//! possibly days apart. Progress lives entirely in the persisted shard
//! states, so every phase can be re-run after a crash.
//!
//! ```text
//!  parent:   ready ──split──> deprecated ─────────────────────────────> recycle
//!  child:        initializing ──> replicating ──writes──> needs_cleanup ──cleanup──> ready
//!                       (clone)          │                         (prune rows)
//!                                     reads: config only
//! ```

use shardwright_core::types::{Node, NodeAddr, NodeRole, Shard, ShardRange, ShardState, SpareFilter};
use tracing::{info, instrument, warn};

use crate::callbacks::{HookContext, Intercepted, Operation};
use crate::context::ExecutionContext;
use crate::error::{check_outcomes, model_error, ClusterError, ClusterResult, TargetOutcome};
use crate::fanout::{fan_out, outcomes};
use crate::metrics;
use crate::spares::SpareRequest;
use crate::topology::Topology;

/// How to carve up the parent range
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SplitPlan {
    /// `n` children of near-equal size
    Even(usize),
    /// Explicit child ranges covering the parent exactly
    Ranges(Vec<ShardRange>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitReport {
    pub parent: ShardRange,
    pub children: Vec<ShardRange>,
}

pub struct SplitPipeline<'a> {
    topology: &'a Topology,
}

impl<'a> SplitPipeline<'a> {
    pub fn new(topology: &'a Topology) -> Self {
        Self { topology }
    }

    // ============= Phase 1 =============

    /// Provision one child shard per range and start cloning the parent
    /// into each. Children that fail to clone stay `initializing` and can be
    /// retried with [`SplitPipeline::resume_child`].
    #[instrument(skip(self, ctx))]
    pub async fn split(
        &self,
        range: ShardRange,
        plan: SplitPlan,
        ctx: &ExecutionContext,
    ) -> ClusterResult<Intercepted<SplitReport>> {
        let topology = self.topology;
        let parent = topology.shard_at(&range)?;
        if parent.state != ShardState::Ready {
            return Err(ClusterError::Validation(format!(
                "shard {} is {}, only ready shards can be split",
                range, parent.state
            )));
        }
        if range.is_unbounded() {
            return Err(ClusterError::Validation(format!(
                "{} is open-ended; grow it with a cutover instead",
                range
            )));
        }
        let master = parent.master.clone().ok_or_else(|| {
            ClusterError::Validation(format!("shard {} has no master", range))
        })?;
        let master_node = topology.node(&master)?;

        let children = match plan {
            SplitPlan::Even(count) => range.even_partition(count).map_err(model_error)?,
            SplitPlan::Ranges(ranges) => {
                range.validate_partition(&ranges).map_err(model_error)?;
                ranges
            }
        };
        if let Some(taken) = children.iter().find(|c| topology.shard_at(c).is_ok()) {
            return Err(ClusterError::Validation(format!(
                "a shard {} already exists",
                taken
            )));
        }

        let hook = HookContext::new(Operation::Split, &parent.pool.name)
            .with_nodes([master.clone()])
            .with_detail("children", children.len());
        topology
            .callbacks()
            .intercept(&hook, async {
                let standbys = topology.config().standbys_per_pool;
                let hardware = &master_node.hardware;
                let mut groups = topology
                    .claim_spare_batch(&[
                        SpareRequest::new(
                            children.len(),
                            SpareFilter::role(NodeRole::Master).like(hardware),
                        ),
                        SpareRequest::new(
                            children.len() * standbys,
                            SpareFilter::role(NodeRole::StandbyReplica).like(hardware),
                        ),
                    ])
                    .await?;
                let mut standby_spares = groups.pop().unwrap_or_default().into_iter();
                let master_spares = groups.pop().unwrap_or_default();

                topology.write(|c| -> ClusterResult<()> {
                    for (child, spare) in children.iter().zip(master_spares) {
                        let name = child.pool_name();
                        let child_master = spare.address().clone();
                        let mut shard = Shard::new(*child).with_state(ShardState::Initializing);
                        shard.parent = Some(range);
                        shard.master = Some(child_master.clone());

                        let mut node = spare.node;
                        node.role = NodeRole::Master;
                        node.pool = Some(name.clone());
                        node.master = Some(master.clone());
                        node.version = master_node.version.clone();
                        c.nodes.insert(child_master.clone(), node);

                        for spare in standby_spares.by_ref().take(standbys) {
                            let mut node: Node = spare.node;
                            node.role = NodeRole::StandbyReplica;
                            node.pool = Some(name.clone());
                            node.master = Some(child_master.clone());
                            node.version = master_node.version.clone();
                            shard.replicas.insert(node.address.clone());
                            c.nodes.insert(node.address.clone(), node);
                        }
                        c.shards.insert(*child, shard);
                    }
                    let parent = c.shard_mut(&range)?;
                    parent.children = children.clone();
                    parent.transition(ShardState::Deprecated).map_err(model_error)
                })?;

                topology.persist_shard(&range).await?;
                for child in &children {
                    topology.persist_shard(child).await?;
                }
                info!("Split {} into {} children, cloning", range, children.len());

                let results = fan_out(children.clone(), ctx.concurrency, |child| {
                    self.clone_child(child)
                })
                .await;
                check_outcomes("split", outcomes(&results))?;

                Ok::<_, ClusterError>(SplitReport {
                    parent: range,
                    children: children.clone(),
                })
            })
            .await
    }

    /// Retry the clone of a child that is still `initializing`
    #[instrument(skip(self, _ctx))]
    pub async fn resume_child(
        &self,
        child: ShardRange,
        _ctx: &ExecutionContext,
    ) -> ClusterResult<Intercepted<()>> {
        let shard = self.topology.shard_at(&child)?;
        if shard.state != ShardState::Initializing || shard.parent.is_none() {
            return Err(ClusterError::Validation(format!(
                "shard {} is {}, only initializing split children can be resumed",
                child, shard.state
            )));
        }

        let hook = HookContext::new(Operation::ResumeSplitChild, &shard.pool.name)
            .with_nodes(shard.master.clone());
        self.topology
            .callbacks()
            .intercept(&hook, self.clone_child(child))
            .await
    }

    /// Clone the parent master onto a child's nodes and wire replication:
    /// child master from the parent master, standbys from the child master.
    async fn clone_child(&self, child: ShardRange) -> ClusterResult<()> {
        let topology = self.topology;
        let transport = topology.transport();
        let shard = topology.shard_at(&child)?;
        let parent_range = shard.parent.ok_or_else(|| {
            ClusterError::Internal(format!("split child {} lost its parent", child))
        })?;
        let source = topology
            .shard_at(&parent_range)?
            .master
            .clone()
            .ok_or_else(|| ClusterError::Validation(format!("{} has no master", parent_range)))?;
        let child_master = shard
            .master
            .clone()
            .ok_or_else(|| ClusterError::Internal(format!("child {} has no master", child)))?;

        let result: ClusterResult<()> = async {
            let targets: Vec<NodeAddr> = shard.members().cloned().collect();
            transport.clone_data(&source, &targets).await?;
            transport.change_replication_source(&child_master, &source).await?;
            for standby in &shard.replicas {
                transport
                    .change_replication_source(standby, &child_master)
                    .await?;
            }
            Ok(())
        }
        .await;

        if let Err(e) = result {
            warn!("Clone of child {} failed: {}", child, e);
            metrics::record_split_child("failed");
            return Err(e);
        }

        topology.write(|c| -> ClusterResult<()> {
            c.shard_mut(&child)?
                .transition(ShardState::Replicating)
                .map_err(model_error)
        })?;
        topology.persist_shard(&child).await?;
        metrics::record_split_child("replicating");
        info!("Child {} is replicating from {}", child, source);
        Ok(())
    }

    // ============= Phase 2 =============

    /// Publish a config that sends reads for the parent range to the
    /// children. Nothing in the catalog changes.
    #[instrument(skip(self, ctx))]
    pub async fn move_reads_to_children(
        &self,
        selector: Option<ShardRange>,
        ctx: &ExecutionContext,
    ) -> ClusterResult<Intercepted<()>> {
        let topology = self.topology;
        let parent = topology.shard_mid_split(selector)?;
        let children = self.children_in(&parent, &[ShardState::Replicating])?;

        if ctx.verify_replication {
            let masters: Vec<NodeAddr> = children.iter().filter_map(|c| c.master.clone()).collect();
            let results = fan_out(masters, ctx.concurrency, |master| async move {
                let status = topology.transport().replication_status(&master).await?;
                match status.lag_secs {
                    Some(lag) if status.running && lag <= ctx.max_replication_lag_secs => Ok(()),
                    _ => Err(ClusterError::Validation(format!(
                        "{} is not caught up with the parent (running: {}, lag: {:?})",
                        master, status.running, status.lag_secs
                    ))),
                }
            })
            .await;
            if let Some((_, Err(e))) = results.into_iter().find(|(_, r)| r.is_err()) {
                return Err(e);
            }
        }

        let hook = HookContext::new(Operation::MoveReadsToChildren, &parent.pool.name);
        topology
            .callbacks()
            .intercept(&hook, async {
                topology.write_config().await?;
                info!("Reads for {} now go to its children", parent.range);
                Ok::<(), ClusterError>(())
            })
            .await
    }

    // ============= Phase 3 =============

    /// Detach each child master from the parent and route writes to it
    #[instrument(skip(self, ctx))]
    pub async fn move_writes_to_children(
        &self,
        selector: Option<ShardRange>,
        ctx: &ExecutionContext,
    ) -> ClusterResult<Intercepted<()>> {
        let topology = self.topology;
        let parent = topology.shard_mid_split(selector)?;
        if parent.state != ShardState::Deprecated {
            return Err(ClusterError::Validation(format!(
                "shard {} is {}, expected deprecated",
                parent.range, parent.state
            )));
        }
        let children = self.children_in(
            &parent,
            &[ShardState::Replicating, ShardState::NeedsCleanup],
        )?;
        let pending: Vec<ShardRange> = children
            .iter()
            .filter(|c| c.state == ShardState::Replicating)
            .map(|c| c.range)
            .collect();

        let hook = HookContext::new(Operation::MoveWritesToChildren, &parent.pool.name)
            .with_nodes(children.iter().filter_map(|c| c.master.clone()));
        topology
            .callbacks()
            .intercept(&hook, async {
                let results = fan_out(pending, ctx.concurrency, |child| async move {
                    let shard = topology.shard_at(&child)?;
                    let master = shard.master.clone().ok_or_else(|| {
                        ClusterError::Internal(format!("child {} has no master", child))
                    })?;
                    topology.transport().sever_replication(&master).await?;
                    topology.transport().disable_read_only(&master).await?;

                    topology.write(|c| -> ClusterResult<()> {
                        c.node_mut(&master)?.master = None;
                        c.shard_mut(&child)?
                            .transition(ShardState::NeedsCleanup)
                            .map_err(model_error)
                    })?;
                    topology.persist_shard(&child).await
                })
                .await;

                topology.write_config().await?;
                check_outcomes("move_writes_to_children", outcomes(&results))?;
                info!("Writes for {} now go to its children", parent.range);
                Ok::<(), ClusterError>(())
            })
            .await
    }

    // ============= Phase 4 =============

    /// Prune every child down to its own range, then retire the parent.
    /// If any child fails, nothing changes and the phase can be re-run.
    #[instrument(skip(self, ctx))]
    pub async fn cleanup(
        &self,
        selector: Option<ShardRange>,
        ctx: &ExecutionContext,
    ) -> ClusterResult<Intercepted<SplitReport>> {
        let topology = self.topology;
        let parent = topology.shard_mid_split(selector)?;
        let children = self.children_in(&parent, &[ShardState::NeedsCleanup])?;

        let hook = HookContext::new(Operation::Cleanup, &parent.pool.name)
            .with_nodes(children.iter().filter_map(|c| c.master.clone()));
        topology
            .callbacks()
            .intercept(&hook, async {
                let targets: Vec<(ShardRange, NodeAddr)> = children
                    .iter()
                    .filter_map(|c| c.master.clone().map(|m| (c.range, m)))
                    .collect();
                let results = fan_out(targets, ctx.concurrency, |(range, master)| async move {
                    let pruned = topology
                        .transport()
                        .prune_rows_outside(&master, range)
                        .await?;
                    info!("Pruned {} foreign rows from child {}", pruned, range);
                    Ok::<_, ClusterError>(pruned)
                })
                .await;
                let outcomes = results
                    .iter()
                    .map(|((range, _), r)| TargetOutcome::from_result(range, r))
                    .collect();
                check_outcomes("cleanup", outcomes)?;

                let released = topology.write(|c| -> ClusterResult<Vec<Node>> {
                    for child in &parent.children {
                        let shard = c.shard_mut(child)?;
                        shard.transition(ShardState::Ready).map_err(model_error)?;
                        shard.parent = None;
                    }
                    let shard = c.shard_mut(&parent.range)?;
                    shard.transition(ShardState::Recycle).map_err(model_error)?;
                    shard.children.clear();
                    let members: Vec<NodeAddr> = shard.members().cloned().collect();
                    shard.master = None;
                    shard.replicas.clear();
                    Ok(members
                        .iter()
                        .filter_map(|address| c.nodes.remove(address))
                        .collect())
                })?;

                topology.persist_shard(&parent.range).await?;
                for child in &parent.children {
                    topology.persist_shard(child).await?;
                }
                let count = released.len();
                topology.release_nodes(released).await?;
                topology.write_config().await?;
                info!("Split of {} complete, {} nodes released", parent.range, count);

                Ok::<_, ClusterError>(SplitReport {
                    parent: parent.range,
                    children: parent.children.clone(),
                })
            })
            .await
    }

    /// The children of `parent`, all of which must be in one of `allowed`
    fn children_in(&self, parent: &Shard, allowed: &[ShardState]) -> ClusterResult<Vec<Shard>> {
        let children: Vec<Shard> = parent
            .children
            .iter()
            .map(|range| self.topology.shard_at(range))
            .collect::<ClusterResult<_>>()?;
        let stragglers: Vec<String> = children
            .iter()
            .filter(|c| !allowed.contains(&c.state))
            .map(|c| format!("{} ({})", c.range, c.state))
            .collect();
        if !stragglers.is_empty() {
            return Err(ClusterError::Validation(format!(
                "children of {} must be {}; not ready: {}",
                parent.range,
                allowed
                    .iter()
                    .map(ShardState::as_str)
                    .collect::<Vec<_>>()
                    .join(" or "),
                stragglers.join(", ")
            )));
        }
        Ok(children)
    }
}
