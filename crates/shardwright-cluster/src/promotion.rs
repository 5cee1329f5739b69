//! Master promotion
//!
//! Replaces the master of a pool with one of its replicas. Everything up to
//! the first remote write is validation and leaves the fleet untouched; from
//! then on the protocol runs to the end and reports per-node outcomes
//! instead of rolling back.
//!
//! ```text
//!  validate ──> read-only old master ──> reparent replicas ──> detach new
//!                     (point of no return)      (fan-out)        master
//!                                                                  │
//!       write config <── sync pool record <── demote old master <──┘
//! ```

use shardwright_core::types::{compare_versions, NodeAddr, NodeRole, NodeStatus, ShardState};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use tracing::{info, instrument, warn};

use crate::callbacks::{HookContext, Intercepted, Operation};
use crate::context::ExecutionContext;
use crate::error::{check_outcomes, ClusterError, ClusterResult, TargetOutcome};
use crate::fanout::{fan_out, outcomes};
use crate::metrics;
use crate::topology::Topology;

/// What becomes of the old master
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemotedRole {
    /// Dropped from the pool and retired in the inventory
    Retired,
    /// Kept as a standby replica of the new master
    StandbyCandidate,
}

#[derive(Debug, Clone)]
pub struct PromotionRequest {
    pub demoted: NodeAddr,
    pub promoted: Option<NodeAddr>,
    pub demoted_role: DemotedRole,
    /// Replica list to trust when the old master cannot be asked
    pub replicas_override: Option<Vec<NodeAddr>>,
}

impl PromotionRequest {
    pub fn new(demoted: impl Into<NodeAddr>, demoted_role: DemotedRole) -> Self {
        Self {
            demoted: demoted.into(),
            promoted: None,
            demoted_role,
            replicas_override: None,
        }
    }

    pub fn promote(mut self, promoted: impl Into<NodeAddr>) -> Self {
        self.promoted = Some(promoted.into());
        self
    }

    pub fn with_replicas_override(mut self, replicas: Vec<NodeAddr>) -> Self {
        self.replicas_override = Some(replicas);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromotionReport {
    pub pool: String,
    pub old_master: NodeAddr,
    pub new_master: NodeAddr,
    pub reparented: Vec<NodeAddr>,
    pub demoted_role: DemotedRole,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromotionOutcome {
    /// No replica was named; these are the ones that could be
    AwaitingChoice {
        pool: String,
        candidates: Vec<NodeAddr>,
    },
    Promoted(PromotionReport),
    /// A pre hook vetoed the promotion
    Skipped,
}

/// Validated promotion, ready to execute
struct Plan {
    pool: String,
    demoted: NodeAddr,
    promoted: NodeAddr,
    demoted_reachable: bool,
    others: Vec<NodeAddr>,
    demoted_role: DemotedRole,
}

pub struct PromotionProtocol<'a> {
    topology: &'a Topology,
}

impl<'a> PromotionProtocol<'a> {
    pub fn new(topology: &'a Topology) -> Self {
        Self { topology }
    }

    #[instrument(skip(self, ctx), fields(demoted = %request.demoted))]
    pub async fn run(
        &self,
        request: PromotionRequest,
        ctx: &ExecutionContext,
    ) -> ClusterResult<PromotionOutcome> {
        let topology = self.topology;
        let demoted = request.demoted.clone();

        let view = topology
            .pool_of(&demoted)
            .map_err(|_| ClusterError::NotAMaster(demoted.to_string()))?;
        if !view.pool().is_master(&demoted) {
            return Err(ClusterError::NotAMaster(demoted.to_string()));
        }
        if let Some(shard) = view.as_shard() {
            if matches!(
                shard.state,
                ShardState::Deprecated | ShardState::Recycle | ShardState::Initializing
            ) {
                return Err(ClusterError::Validation(format!(
                    "shard {} is {}; finish the split before promoting",
                    shard.range, shard.state
                )));
            }
        }
        let pool_name = view.name().to_string();
        topology.check_pool(&pool_name)?;

        let recorded: BTreeSet<NodeAddr> = view.pool().replicas.clone();
        if recorded.is_empty() {
            return Err(ClusterError::Validation(
                "cannot demote a master with no replicas".into(),
            ));
        }

        let demoted_reachable = topology.probe(&demoted).await == NodeStatus::Reachable;
        if demoted_reachable {
            let live: BTreeSet<NodeAddr> = topology
                .transport()
                .list_replicas(&demoted)
                .await?
                .into_iter()
                .collect();
            if live != recorded {
                return Err(ClusterError::InconsistentTopology(format!(
                    "{} reports replicas {:?}, catalog has {:?}",
                    demoted, live, recorded
                )));
            }
        } else {
            let supplied: BTreeSet<NodeAddr> = request
                .replicas_override
                .clone()
                .ok_or_else(|| {
                    ClusterError::Validation(format!(
                        "{} is unreachable; supply its replica list",
                        demoted
                    ))
                })?
                .into_iter()
                .collect();
            if supplied != recorded {
                return Err(ClusterError::InconsistentTopology(format!(
                    "supplied replicas {:?} do not match catalog replicas {:?} of {}",
                    supplied, recorded, demoted
                )));
            }
            if request.demoted_role == DemotedRole::StandbyCandidate {
                return Err(ClusterError::Validation(format!(
                    "{} is unreachable and can only be retired",
                    demoted
                )));
            }
        }

        let promoted = match request.promoted.clone() {
            Some(promoted) => promoted,
            None => {
                let candidates = self.candidates(&recorded);
                info!(
                    "No replica named for {}; {} candidates",
                    pool_name,
                    candidates.len()
                );
                metrics::record_promotion("awaiting_choice");
                return Ok(PromotionOutcome::AwaitingChoice {
                    pool: pool_name,
                    candidates,
                });
            }
        };

        let promoted_node = topology.node(&promoted)?;
        if promoted_node.master.as_ref() != Some(&demoted) || !recorded.contains(&promoted) {
            return Err(ClusterError::NotAReplica {
                node: promoted.to_string(),
                master: demoted.to_string(),
            });
        }
        self.check_eligible(&promoted, &recorded, demoted_reachable, ctx)
            .await?;

        let plan = Plan {
            pool: pool_name.clone(),
            demoted: demoted.clone(),
            promoted: promoted.clone(),
            demoted_reachable,
            others: recorded.iter().filter(|r| **r != promoted).cloned().collect(),
            demoted_role: request.demoted_role,
        };

        let maintenance: Vec<NodeAddr> = if demoted_reachable {
            vec![demoted.clone()]
        } else {
            Vec::new()
        };
        let hook = HookContext::new(Operation::Promote, &pool_name)
            .with_nodes(maintenance)
            .with_detail("demoted", &demoted)
            .with_detail("promoted", &promoted);

        match topology.callbacks().intercept(&hook, self.execute(plan, ctx)).await {
            Ok(Intercepted::Completed(report)) => {
                metrics::record_promotion("completed");
                Ok(PromotionOutcome::Promoted(report))
            }
            Ok(Intercepted::Skipped) => Ok(PromotionOutcome::Skipped),
            Err(e) => {
                if matches!(e, ClusterError::PartialFailure { .. }) {
                    metrics::record_promotion("partial");
                }
                Err(e)
            }
        }
    }

    /// Replicas that could take over, best first
    fn candidates(&self, replicas: &BTreeSet<NodeAddr>) -> Vec<NodeAddr> {
        let mut nodes: Vec<_> = replicas
            .iter()
            .filter_map(|r| self.topology.node(r).ok())
            .filter(|n| n.role != NodeRole::BackupReplica)
            .collect();
        nodes.sort_by_key(|n| match n.role {
            NodeRole::StandbyReplica => 0,
            _ => 1,
        });
        nodes.into_iter().map(|n| n.address).collect()
    }

    async fn check_eligible(
        &self,
        promoted: &NodeAddr,
        replicas: &BTreeSet<NodeAddr>,
        demoted_reachable: bool,
        ctx: &ExecutionContext,
    ) -> ClusterResult<()> {
        let topology = self.topology;
        let node = topology.node(promoted)?;
        let refuse = |reason: String| ClusterError::NotPromotable {
            node: promoted.to_string(),
            reason,
        };

        if node.role == NodeRole::BackupReplica {
            return Err(refuse("backup replicas are never promoted".into()));
        }
        if topology.probe(promoted).await != NodeStatus::Reachable {
            return Err(refuse("not reachable".into()));
        }

        if ctx.verify_replication && demoted_reachable {
            let status = topology.transport().replication_status(promoted).await?;
            if !status.running {
                return Err(refuse("replication is not running".into()));
            }
            match status.lag_secs {
                Some(lag) if lag <= ctx.max_replication_lag_secs => {}
                Some(lag) => {
                    return Err(refuse(format!(
                        "replication lag {}s exceeds {}s",
                        lag, ctx.max_replication_lag_secs
                    )))
                }
                None => return Err(refuse("replication lag unknown".into())),
            }
        }

        if let Some(version) = &node.version {
            for replica in replicas.iter().filter(|r| *r != promoted) {
                let other = topology.node(replica)?;
                if let Some(other_version) = &other.version {
                    if compare_versions(other_version, version) == Ordering::Less {
                        return Err(refuse(format!(
                            "replica {} runs older version {} than {}",
                            replica, other_version, version
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Point of no return: every step runs, failures are collected
    async fn execute(&self, plan: Plan, ctx: &ExecutionContext) -> ClusterResult<PromotionReport> {
        let topology = self.topology;
        let transport = topology.transport();

        if plan.demoted_reachable {
            transport.enable_read_only(&plan.demoted).await?;
        }

        let promoted = plan.promoted.clone();
        let reparent = fan_out(plan.others.clone(), ctx.concurrency, |replica| {
            let promoted = promoted.clone();
            async move {
                transport
                    .change_replication_source(&replica, &promoted)
                    .await
            }
        })
        .await;
        let mut results: Vec<TargetOutcome> = outcomes(&reparent);

        let detach = async {
            transport.sever_replication(&plan.promoted).await?;
            transport.disable_read_only(&plan.promoted).await
        }
        .await;
        results.push(TargetOutcome::from_result(&plan.promoted, &detach));

        if plan.demoted_reachable {
            let demote = match plan.demoted_role {
                DemotedRole::StandbyCandidate => {
                    transport
                        .change_replication_source(&plan.demoted, &plan.promoted)
                        .await
                }
                DemotedRole::Retired => transport.revoke_access(&plan.demoted).await,
            };
            results.push(TargetOutcome::from_result(&plan.demoted, &demote));
        }

        topology.write(|c| -> ClusterResult<()> {
            let pool = c
                .pool_mut(&plan.pool)
                .ok_or_else(|| ClusterError::PoolNotFound(plan.pool.clone()))?;
            pool.master = Some(plan.promoted.clone());
            pool.replicas.remove(&plan.promoted);
            if plan.demoted_role == DemotedRole::StandbyCandidate {
                pool.replicas.insert(plan.demoted.clone());
            }

            let new_master = c.node_mut(&plan.promoted)?;
            new_master.role = NodeRole::Master;
            new_master.master = None;
            new_master.weight = 0;

            for replica in &plan.others {
                c.node_mut(replica)?.master = Some(plan.promoted.clone());
            }

            match plan.demoted_role {
                DemotedRole::StandbyCandidate => {
                    let old = c.node_mut(&plan.demoted)?;
                    old.role = NodeRole::StandbyReplica;
                    old.master = Some(plan.promoted.clone());
                    old.weight = 0;
                }
                DemotedRole::Retired => {
                    c.nodes.remove(&plan.demoted);
                }
            }
            Ok(())
        })?;

        let synced = match topology.sync_configuration(&plan.pool).await {
            Ok(Intercepted::Completed(())) => Ok(()),
            Ok(Intercepted::Skipped) => Err(ClusterError::Internal(
                "pool record sync was skipped by a callback".into(),
            )),
            Err(e) => Err(e),
        };
        results.push(TargetOutcome::from_result(
            format!("inventory record of {}", plan.pool),
            &synced,
        ));
        if plan.demoted_role == DemotedRole::Retired {
            let retired = topology
                .inventory()
                .retire_node(&plan.demoted)
                .await
                .map_err(ClusterError::from);
            results.push(TargetOutcome::from_result(
                format!("retirement of {}", plan.demoted),
                &retired,
            ));
        }
        let published = topology.write_config().await;
        results.push(TargetOutcome::from_result("application config", &published));

        let failed: Vec<&TargetOutcome> = results.iter().filter(|o| !o.succeeded()).collect();
        if failed.is_empty() {
            info!(
                "Promoted {} to master of {} (old master {} {:?})",
                plan.promoted, plan.pool, plan.demoted, plan.demoted_role
            );
        } else {
            for outcome in &failed {
                warn!("Promotion of {} needs manual repair: {}", plan.pool, outcome);
            }
        }
        check_outcomes("promote", results)?;

        Ok(PromotionReport {
            pool: plan.pool,
            old_master: plan.demoted,
            new_master: plan.promoted,
            reparented: plan.others,
            demoted_role: plan.demoted_role,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callbacks::{hook_fn, CallbackAbort, Phase, DEFAULT_PRIORITY};
    use crate::topology::tests::{addr, fleet, harness};
    use crate::transport::{MemoryTransport, NodeTransport, SimOp};
    use crate::ErrorKind;
    use async_trait::async_trait;
    use shardwright_core::config::OrchestrationConfig;
    use shardwright_core::types::{
        AppConfig, InventorySnapshot, Node, PoolRecord, ShardRecord, SpareNode,
    };
    use shardwright_inventory::{Inventory, MemoryInventory};
    use std::sync::Arc;

    /// Inventory whose pool upserts fail
    struct PoolWritesFail(MemoryInventory);

    #[async_trait]
    impl Inventory for PoolWritesFail {
        async fn load(&self) -> shardwright_core::Result<InventorySnapshot> {
            self.0.load().await
        }
        async fn upsert_pool(&self, _: &PoolRecord, _: &[Node]) -> shardwright_core::Result<()> {
            Err(shardwright_core::Error::Inventory("asset tracker unavailable".into()))
        }
        async fn upsert_shard(&self, shard: &ShardRecord, members: &[Node]) -> shardwright_core::Result<()> {
            self.0.upsert_shard(shard, members).await
        }
        async fn upsert_nodes(&self, nodes: &[Node]) -> shardwright_core::Result<()> {
            self.0.upsert_nodes(nodes).await
        }
        async fn remove_shard(&self, name: &str) -> shardwright_core::Result<()> {
            self.0.remove_shard(name).await
        }
        async fn record_claims(&self, claimed: &[NodeAddr]) -> shardwright_core::Result<()> {
            self.0.record_claims(claimed).await
        }
        async fn return_spares(&self, spares: &[SpareNode]) -> shardwright_core::Result<()> {
            self.0.return_spares(spares).await
        }
        async fn retire_node(&self, address: &NodeAddr) -> shardwright_core::Result<()> {
            self.0.retire_node(address).await
        }
        async fn release_nodes(&self, addresses: &[NodeAddr]) -> shardwright_core::Result<()> {
            self.0.release_nodes(addresses).await
        }
        async fn write_config(&self, config: &AppConfig) -> shardwright_core::Result<()> {
            self.0.write_config(config).await
        }
    }

    const MASTER: &str = "10.0.0.1:3306";
    const ACTIVE: &str = "10.0.0.2:3306";
    const STANDBY: &str = "10.0.0.3:3306";
    const BACKUP: &str = "10.0.0.4:3306";

    #[tokio::test]
    async fn test_promote_standby_and_keep_old_master() {
        let h = harness(fleet(0)).await;
        let ctx = ExecutionContext::default();
        let request =
            PromotionRequest::new(MASTER, DemotedRole::StandbyCandidate).promote(STANDBY);

        let outcome = PromotionProtocol::new(&h.topology)
            .run(request, &ctx)
            .await
            .unwrap();
        let PromotionOutcome::Promoted(report) = outcome else {
            panic!("expected a completed promotion");
        };
        assert_eq!(report.new_master, addr(STANDBY));

        let pool = h.topology.pool("users").unwrap();
        assert!(pool.pool().is_master(&addr(STANDBY)));
        assert!(pool.pool().has_replica(&addr(MASTER)));
        for replica in [ACTIVE, BACKUP, MASTER] {
            assert_eq!(h.transport.source(&addr(replica)), Some(addr(STANDBY)));
            assert_eq!(
                h.inventory.node(&addr(replica)).unwrap().master,
                Some(addr(STANDBY))
            );
        }
        assert!(!h.transport.is_read_only(&addr(STANDBY)));
        assert!(h.transport.source(&addr(STANDBY)).is_none());
        assert_eq!(
            h.inventory.pool("users").unwrap().master,
            Some(addr(STANDBY))
        );
        let config = h.inventory.app_config().unwrap();
        assert_eq!(config.pools[0].master, Some(addr(STANDBY)));
    }

    #[tokio::test]
    async fn test_retired_master_leaves_the_pool() {
        let h = harness(fleet(0)).await;
        let request = PromotionRequest::new(MASTER, DemotedRole::Retired).promote(STANDBY);

        PromotionProtocol::new(&h.topology)
            .run(request, &ExecutionContext::default())
            .await
            .unwrap();

        assert!(h.inventory.is_retired(&addr(MASTER)));
        assert!(h.transport.is_revoked(&addr(MASTER)));
        assert!(!h.topology.pool("users").unwrap().pool().contains(&addr(MASTER)));
    }

    #[tokio::test]
    async fn test_rejections_leave_everything_untouched() {
        let h = harness(fleet(0)).await;
        let ctx = ExecutionContext::default();
        let protocol = PromotionProtocol::new(&h.topology);
        let before = serde_json::to_string(&h.inventory.snapshot()).unwrap();

        let stranger = PromotionRequest::new(MASTER, DemotedRole::Retired).promote("10.1.0.2:3306");
        let err = protocol.run(stranger, &ctx).await.unwrap_err();
        assert!(matches!(err, ClusterError::NotAReplica { .. }));
        assert_eq!(err.kind(), ErrorKind::Validation);

        let backup = PromotionRequest::new(MASTER, DemotedRole::Retired).promote(BACKUP);
        let err = protocol.run(backup, &ctx).await.unwrap_err();
        assert!(matches!(err, ClusterError::NotPromotable { .. }));

        let not_master = PromotionRequest::new(ACTIVE, DemotedRole::Retired).promote(STANDBY);
        let err = protocol.run(not_master, &ctx).await.unwrap_err();
        assert!(matches!(err, ClusterError::NotAMaster(_)));

        h.transport.set_lag(&addr(STANDBY), 120);
        let lagging = PromotionRequest::new(MASTER, DemotedRole::Retired).promote(STANDBY);
        let err = protocol.run(lagging, &ctx).await.unwrap_err();
        assert!(matches!(err, ClusterError::NotPromotable { .. }));

        let after = serde_json::to_string(&h.inventory.snapshot()).unwrap();
        assert_eq!(before, after);
        assert_eq!(h.transport.calls_of(SimOp::EnableReadOnly), 0);
        assert_eq!(h.transport.calls_of(SimOp::ChangeReplicationSource), 0);
        assert!(h.topology.pool("users").unwrap().pool().is_master(&addr(MASTER)));
    }

    #[tokio::test]
    async fn test_skipping_replication_check_allows_lagging_candidate() {
        let h = harness(fleet(0)).await;
        h.transport.set_lag(&addr(STANDBY), 120);
        let ctx = ExecutionContext::default().without_replication_check();
        let request = PromotionRequest::new(MASTER, DemotedRole::Retired).promote(STANDBY);

        let outcome = PromotionProtocol::new(&h.topology).run(request, &ctx).await.unwrap();
        assert!(matches!(outcome, PromotionOutcome::Promoted(_)));
    }

    #[tokio::test]
    async fn test_older_replica_blocks_promotion() {
        let mut snapshot = fleet(0);
        for node in snapshot.nodes.iter_mut() {
            if node.address.as_str() == ACTIVE {
                node.version = Some("8.0.20".into());
            }
        }
        let h = harness(snapshot).await;
        let request = PromotionRequest::new(MASTER, DemotedRole::Retired).promote(STANDBY);
        let err = PromotionProtocol::new(&h.topology)
            .run(request, &ExecutionContext::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("older version"));
    }

    #[tokio::test]
    async fn test_without_candidate_lists_choices() {
        let h = harness(fleet(0)).await;
        let request = PromotionRequest::new(MASTER, DemotedRole::Retired);

        let outcome = PromotionProtocol::new(&h.topology)
            .run(request, &ExecutionContext::default())
            .await
            .unwrap();
        assert_eq!(
            outcome,
            PromotionOutcome::AwaitingChoice {
                pool: "users".into(),
                candidates: vec![addr(STANDBY), addr(ACTIVE)],
            }
        );
        assert!(h.topology.pool("users").unwrap().pool().is_master(&addr(MASTER)));
    }

    #[tokio::test]
    async fn test_dead_master_needs_matching_replica_list() {
        let h = harness(fleet(0)).await;
        h.transport.set_reachable(&addr(MASTER), false);
        let ctx = ExecutionContext::default();
        let protocol = PromotionProtocol::new(&h.topology);

        let request = PromotionRequest::new(MASTER, DemotedRole::Retired).promote(STANDBY);
        let err = protocol.run(request, &ctx).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let partial = PromotionRequest::new(MASTER, DemotedRole::Retired)
            .promote(STANDBY)
            .with_replicas_override(vec![addr(STANDBY)]);
        let err = protocol.run(partial, &ctx).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InconsistentTopology);

        let full = PromotionRequest::new(MASTER, DemotedRole::Retired)
            .promote(STANDBY)
            .with_replicas_override(vec![addr(ACTIVE), addr(STANDBY), addr(BACKUP)]);
        let outcome = protocol.run(full, &ctx).await.unwrap();
        assert!(matches!(outcome, PromotionOutcome::Promoted(_)));
        assert!(h.inventory.is_retired(&addr(MASTER)));
    }

    #[tokio::test]
    async fn test_live_replica_mismatch_is_inconsistent() {
        let h = harness(fleet(0)).await;
        h.transport
            .change_replication_source(&addr(ACTIVE), &addr("10.1.0.1:3306"))
            .await
            .unwrap();
        let request = PromotionRequest::new(MASTER, DemotedRole::Retired).promote(STANDBY);
        let err = PromotionProtocol::new(&h.topology)
            .run(request, &ExecutionContext::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InconsistentTopology);
    }

    #[tokio::test]
    async fn test_failed_reparent_is_partial_and_persisted() {
        let h = harness(fleet(0)).await;
        h.transport.fail(SimOp::ChangeReplicationSource, BACKUP);
        let request = PromotionRequest::new(MASTER, DemotedRole::Retired).promote(STANDBY);

        let err = PromotionProtocol::new(&h.topology)
            .run(request, &ExecutionContext::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PartialFailure);
        let failed: Vec<_> = err.outcomes().iter().filter(|o| !o.succeeded()).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].target, BACKUP);

        assert_eq!(
            h.inventory.pool("users").unwrap().master,
            Some(addr(STANDBY))
        );
        assert!(h.inventory.app_config().is_some());
    }

    #[tokio::test]
    async fn test_inventory_failure_after_reparent_keeps_node_report() {
        let snapshot = fleet(0);
        let transport = Arc::new(MemoryTransport::from_snapshot(&snapshot));
        let inventory = Arc::new(PoolWritesFail(MemoryInventory::from_snapshot(snapshot)));
        let topology = Topology::load(inventory.clone(), transport.clone(), OrchestrationConfig::default())
            .await
            .unwrap();
        let request = PromotionRequest::new(MASTER, DemotedRole::Retired).promote(STANDBY);

        let err = PromotionProtocol::new(&topology)
            .run(request, &ExecutionContext::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PartialFailure);
        let outcomes = err.outcomes();
        assert!(outcomes
            .iter()
            .any(|o| o.target == BACKUP && o.succeeded()));
        let failed: Vec<_> = outcomes.iter().filter(|o| !o.succeeded()).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].target, "inventory record of users");

        assert_eq!(transport.source(&addr(BACKUP)), Some(addr(STANDBY)));
        assert!(inventory.0.is_retired(&addr(MASTER)));
        assert!(inventory.0.app_config().is_some());
    }

    #[tokio::test]
    async fn test_skipped_record_sync_is_reported() {
        let h = harness(fleet(0)).await;
        h.topology.callbacks().register(
            Operation::SyncConfiguration,
            Phase::Pre,
            DEFAULT_PRIORITY,
            hook_fn(|_| Err(CallbackAbort::new("inventory frozen"))),
        );
        let request = PromotionRequest::new(MASTER, DemotedRole::Retired).promote(STANDBY);

        let err = PromotionProtocol::new(&h.topology)
            .run(request, &ExecutionContext::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PartialFailure);
        assert!(err
            .outcomes()
            .iter()
            .any(|o| o.target == "inventory record of users" && !o.succeeded()));
        assert!(h.topology.pool("users").unwrap().pool().is_master(&addr(STANDBY)));
    }

    #[tokio::test]
    async fn test_pre_hook_can_veto() {
        let h = harness(fleet(0)).await;
        h.topology.callbacks().register(
            Operation::Promote,
            Phase::Pre,
            DEFAULT_PRIORITY,
            hook_fn(|_| Err(CallbackAbort::new("change freeze"))),
        );
        let request = PromotionRequest::new(MASTER, DemotedRole::Retired).promote(STANDBY);

        let outcome = PromotionProtocol::new(&h.topology)
            .run(request, &ExecutionContext::default())
            .await
            .unwrap();
        assert_eq!(outcome, PromotionOutcome::Skipped);
        assert!(h.topology.pool("users").unwrap().pool().is_master(&addr(MASTER)));
    }
}
