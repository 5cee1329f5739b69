//! Replica role management within one pool

use shardwright_core::types::{Node, NodeAddr, NodeRole, SpareFilter};
use tracing::{info, instrument, warn};

use crate::callbacks::{HookContext, Intercepted, Operation};
use crate::context::ExecutionContext;
use crate::error::{check_outcomes, ClusterError, ClusterResult};
use crate::fanout::{fan_out, outcomes};
use crate::topology::Topology;

impl Topology {
    /// Resolve a node, check its role and return its pool name
    fn replica_in_role(&self, address: &NodeAddr, allowed: &[NodeRole]) -> ClusterResult<(Node, String)> {
        let node = self.node(address)?;
        if !allowed.contains(&node.role) {
            return Err(ClusterError::Validation(format!(
                "{} is a {}, expected {}",
                address,
                node.role,
                allowed
                    .iter()
                    .map(NodeRole::as_str)
                    .collect::<Vec<_>>()
                    .join(" or ")
            )));
        }
        let pool = node.pool.clone().ok_or_else(|| {
            ClusterError::InconsistentTopology(format!("replica {} has no pool", address))
        })?;
        Ok((node, pool))
    }

    /// Start sending read traffic to a standby replica
    #[instrument(skip(self))]
    pub async fn mark_replica_active(
        &self,
        address: &NodeAddr,
        weight: u32,
    ) -> ClusterResult<Intercepted<()>> {
        if weight == 0 {
            return Err(ClusterError::Validation(
                "an active replica needs a positive weight".into(),
            ));
        }
        let (_, pool) = self.replica_in_role(address, &[NodeRole::StandbyReplica])?;

        let hook = HookContext::new(Operation::MarkReplicaActive, &pool)
            .with_nodes([address.clone()])
            .with_detail("weight", weight);
        self.callbacks()
            .intercept(&hook, async {
                self.write(|c| -> ClusterResult<()> {
                    let node = c.node_mut(address)?;
                    node.role = NodeRole::ActiveReplica;
                    node.weight = weight;
                    Ok(())
                })?;
                self.persist(&pool).await?;
                info!("{} is now an active replica of {} (weight {})", address, pool, weight);
                Ok::<(), ClusterError>(())
            })
            .await
    }

    #[instrument(skip(self))]
    pub async fn set_replica_weight(
        &self,
        address: &NodeAddr,
        weight: u32,
    ) -> ClusterResult<Intercepted<()>> {
        if weight == 0 {
            return Err(ClusterError::Validation(
                "weight must be positive; use mark_replica_standby to stop reads".into(),
            ));
        }
        let (node, pool) = self.replica_in_role(address, &[NodeRole::ActiveReplica])?;

        let hook = HookContext::new(Operation::SetReplicaWeight, &pool)
            .with_nodes([address.clone()])
            .with_detail("from", node.weight)
            .with_detail("to", weight);
        self.callbacks()
            .intercept(&hook, async {
                self.write(|c| -> ClusterResult<()> {
                    c.node_mut(address)?.weight = weight;
                    Ok(())
                })?;
                self.persist(&pool).await?;
                Ok::<(), ClusterError>(())
            })
            .await
    }

    /// Stop sending read traffic to an active replica
    #[instrument(skip(self))]
    pub async fn mark_replica_standby(&self, address: &NodeAddr) -> ClusterResult<Intercepted<()>> {
        let (_, pool) = self.replica_in_role(address, &[NodeRole::ActiveReplica])?;

        let hook =
            HookContext::new(Operation::MarkReplicaStandby, &pool).with_nodes([address.clone()]);
        self.callbacks()
            .intercept(&hook, async {
                self.write(|c| -> ClusterResult<()> {
                    let node = c.node_mut(address)?;
                    node.role = NodeRole::StandbyReplica;
                    node.weight = 0;
                    Ok(())
                })?;
                self.persist(&pool).await?;
                info!("{} is now a standby replica of {}", address, pool);
                Ok::<(), ClusterError>(())
            })
            .await
    }

    /// Detach a non-serving replica from its pool for good. The replication
    /// link is severed first; the node keeps its data but no longer belongs
    /// anywhere.
    #[instrument(skip(self))]
    pub async fn remove_replica(&self, address: &NodeAddr) -> ClusterResult<Intercepted<()>> {
        let (_, pool) = self.replica_in_role(
            address,
            &[NodeRole::StandbyReplica, NodeRole::BackupReplica],
        )?;

        let hook = HookContext::new(Operation::RemoveReplica, &pool).with_nodes([address.clone()]);
        self.callbacks()
            .intercept(&hook, async {
                self.transport().sever_replication(address).await?;

                let detached = self.write(|c| -> ClusterResult<Node> {
                    if let Some(p) = c.pool_mut(&pool) {
                        p.replicas.remove(address);
                    }
                    let node = c.node_mut(address)?;
                    node.pool = None;
                    node.master = None;
                    node.weight = 0;
                    Ok(node.clone())
                })?;
                self.persist(&pool).await?;
                self.inventory().upsert_nodes(&[detached]).await?;
                info!("Removed replica {} from {}", address, pool);
                Ok::<(), ClusterError>(())
            })
            .await
    }

    /// Provision `count` new standby replicas from spares like the master
    #[instrument(skip(self, ctx))]
    pub async fn add_standby_replicas(
        &self,
        pool_name: &str,
        count: usize,
        ctx: &ExecutionContext,
    ) -> ClusterResult<Intercepted<Vec<NodeAddr>>> {
        if count == 0 {
            return Err(ClusterError::Validation(
                "at least one standby must be requested".into(),
            ));
        }
        let view = self.pool(pool_name)?;
        let pool = view.pool().clone();
        let master = pool.master.clone().ok_or_else(|| {
            ClusterError::Validation(format!("{} has no master to replicate from", pool_name))
        })?;
        let master_node = self.node(&master)?;
        let source = self
            .read(|c| {
                pool.replicas
                    .iter()
                    .filter_map(|r| c.nodes.get(r))
                    .find(|n| n.role == NodeRole::StandbyReplica)
                    .map(|n| n.address.clone())
            })
            .unwrap_or_else(|| master.clone());

        let hook = HookContext::new(Operation::AddStandbyReplicas, pool_name)
            .with_nodes([master.clone()])
            .with_detail("count", count)
            .with_detail("source", &source);
        self.callbacks()
            .intercept(&hook, async {
                let filter =
                    SpareFilter::role(NodeRole::StandbyReplica).like(&master_node.hardware);
                let claimed = self.claim_spares(count, &filter).await?;
                let targets: Vec<NodeAddr> =
                    claimed.iter().map(|s| s.address().clone()).collect();

                let results = fan_out(targets, ctx.concurrency, |target| {
                    let source = source.clone();
                    let master = master.clone();
                    async move {
                        self.transport()
                            .clone_data(&source, std::slice::from_ref(&target))
                            .await?;
                        self.transport()
                            .change_replication_source(&target, &master)
                            .await
                    }
                })
                .await;

                let mut added = Vec::new();
                let mut unused = Vec::new();
                self.write(|c| {
                    for (spare, (target, result)) in claimed.into_iter().zip(&results) {
                        if result.is_err() {
                            warn!("Standby {} for {} failed to clone", target, pool_name);
                            unused.push(spare);
                            continue;
                        }
                        let mut node = spare.node;
                        node.role = NodeRole::StandbyReplica;
                        node.pool = Some(pool_name.to_string());
                        node.master = Some(master.clone());
                        node.version = master_node.version.clone();
                        c.nodes.insert(target.clone(), node);
                        if let Some(p) = c.pool_mut(pool_name) {
                            p.replicas.insert(target.clone());
                        }
                        added.push(target.clone());
                    }
                });
                self.persist(pool_name).await?;
                self.return_spares(unused).await?;
                info!("Added {} standby replicas to {}", added.len(), pool_name);

                check_outcomes("add_standby_replicas", outcomes(&results))?;
                Ok::<_, ClusterError>(added)
            })
            .await
    }
}
