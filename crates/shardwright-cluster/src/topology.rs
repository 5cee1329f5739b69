//! Topology catalog
//!
//! In-memory registry of every node, plain pool and shard, rebuilt from the
//! inventory at startup. All mutation goes through closures run under the
//! catalog lock so a guard is never held across an `.await`.

use parking_lot::RwLock;
use shardwright_core::config::OrchestrationConfig;
use shardwright_core::types::{
    check_contiguous, AppConfig, InventorySnapshot, Node, NodeAddr, NodeRole, NodeStatus, Pool,
    PoolRecord, PoolRoute, Shard, ShardRange, ShardRecord, ShardRoute, ShardState, SpareFilter,
    SpareNode, WeightedTarget,
};
use shardwright_inventory::Inventory;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::callbacks::{CallbackDispatcher, HookContext, Intercepted, Operation};
use crate::context::ExecutionContext;
use crate::error::{model_error, ClusterError, ClusterResult, TargetOutcome};
use crate::fanout::{fan_out, outcomes};
use crate::metrics;
use crate::spares::{SpareAllocator, SpareRequest};
use crate::transport::NodeTransport;

/// Pools, shards and nodes known to the engine
#[derive(Debug, Default, Clone)]
pub(crate) struct Catalog {
    pub nodes: BTreeMap<NodeAddr, Node>,
    pub pools: BTreeMap<String, Pool>,
    pub shards: BTreeMap<ShardRange, Shard>,
}

impl Catalog {
    fn build(snapshot: InventorySnapshot) -> ClusterResult<Self> {
        let mut catalog = Catalog::default();

        for node in snapshot.nodes {
            catalog.nodes.insert(node.address.clone(), node);
        }
        for record in snapshot.pools {
            let mut pool = Pool::new(record.name.clone());
            pool.master = record.master;
            catalog.pools.insert(record.name, pool);
        }

        let mut parents: Vec<(ShardRange, String)> = Vec::new();
        for record in snapshot.shards {
            let range = record.range();
            let mut pool = Pool::new(record.name.clone());
            pool.master = record.master.clone();
            if let Some(parent) = record.parent {
                parents.push((range, parent));
            }
            let shard = Shard::new(range).with_pool(pool).with_state(record.state);
            if catalog.shards.insert(range, shard).is_some() {
                return Err(ClusterError::InconsistentTopology(format!(
                    "shard {} recorded twice",
                    range
                )));
            }
        }
        for (child, parent_name) in parents {
            let parent = catalog.shard_range(&parent_name).ok_or_else(|| {
                ClusterError::InconsistentTopology(format!(
                    "shard {} references unknown parent {}",
                    child, parent_name
                ))
            })?;
            if let Some(shard) = catalog.shards.get_mut(&child) {
                shard.parent = Some(parent);
            }
            if let Some(shard) = catalog.shards.get_mut(&parent) {
                shard.children.push(child);
            }
        }
        for shard in catalog.shards.values_mut() {
            shard.children.sort();
        }

        let members: Vec<(NodeAddr, String, NodeRole)> = catalog
            .nodes
            .values()
            .filter_map(|n| n.pool.clone().map(|p| (n.address.clone(), p, n.role)))
            .collect();
        for (address, pool_name, role) in members {
            let pool = catalog.pool_mut(&pool_name).ok_or_else(|| {
                ClusterError::InconsistentTopology(format!(
                    "{} belongs to unknown pool {}",
                    address, pool_name
                ))
            })?;
            if role.is_replica() {
                pool.replicas.insert(address);
            } else if role == NodeRole::Master && !pool.is_master(&address) {
                return Err(ClusterError::InconsistentTopology(format!(
                    "{} is recorded as a master of {} but the pool names {:?}",
                    address, pool_name, pool.master
                )));
            }
        }

        catalog.validate()?;
        Ok(catalog)
    }

    fn validate(&self) -> ClusterResult<()> {
        if let Some(node) = self.nodes.values().find(|n| !n.has_valid_weight()) {
            return Err(ClusterError::InconsistentTopology(format!(
                "active replica {} has weight 0",
                node.address
            )));
        }
        let pools = self
            .pools
            .values()
            .chain(self.shards.values().filter(|s| s.state != ShardState::Recycle).map(|s| &s.pool));
        for pool in pools {
            if let Some(master) = &pool.master {
                if !self.nodes.contains_key(master) {
                    return Err(ClusterError::InconsistentTopology(format!(
                        "master {} of {} has no node record",
                        master, pool.name
                    )));
                }
            }
            self.check_replicas(pool)?;
        }

        let top_level: Vec<ShardRange> = self
            .shards
            .values()
            .filter(|s| s.is_top_level())
            .map(|s| s.range)
            .collect();
        check_contiguous(&top_level)
            .map_err(|e| ClusterError::InconsistentTopology(e.to_string()))?;

        for shard in self.shards.values().filter(|s| s.is_mid_split()) {
            shard
                .range
                .validate_partition(&shard.children)
                .map_err(|e| {
                    ClusterError::InconsistentTopology(format!(
                        "children of {} do not cover it: {}",
                        shard.range, e
                    ))
                })?;
        }
        Ok(())
    }

    /// Every replica must record the pool's master as its source
    pub fn check_replicas(&self, pool: &Pool) -> ClusterResult<()> {
        for replica in &pool.replicas {
            let node = self
                .nodes
                .get(replica)
                .ok_or_else(|| ClusterError::NodeNotFound(replica.to_string()))?;
            if node.master != pool.master {
                return Err(ClusterError::InconsistentTopology(format!(
                    "replica {} of {} replicates from {:?}, pool master is {:?}",
                    replica, pool.name, node.master, pool.master
                )));
            }
        }
        Ok(())
    }

    pub fn shard_range(&self, name: &str) -> Option<ShardRange> {
        self.shards
            .values()
            .find(|s| s.pool.name == name)
            .map(|s| s.range)
    }

    pub fn pool_ref(&self, name: &str) -> Option<&Pool> {
        self.pools.get(name).or_else(|| {
            self.shards
                .values()
                .find(|s| s.pool.name == name)
                .map(|s| &s.pool)
        })
    }

    pub fn pool_mut(&mut self, name: &str) -> Option<&mut Pool> {
        if self.pools.contains_key(name) {
            return self.pools.get_mut(name);
        }
        self.shards
            .values_mut()
            .find(|s| s.pool.name == name)
            .map(|s| &mut s.pool)
    }

    pub fn shard_mut(&mut self, range: &ShardRange) -> ClusterResult<&mut Shard> {
        self.shards
            .get_mut(range)
            .ok_or_else(|| ClusterError::ShardNotFound(range.to_string()))
    }

    pub fn node_mut(&mut self, address: &NodeAddr) -> ClusterResult<&mut Node> {
        self.nodes
            .get_mut(address)
            .ok_or_else(|| ClusterError::NodeNotFound(address.to_string()))
    }

    fn members(&self, pool: &Pool) -> Vec<Node> {
        pool.members()
            .filter_map(|addr| self.nodes.get(addr).cloned())
            .collect()
    }

    /// Active replicas carrying weight, or the master when there are none
    fn read_targets(&self, pool: &Pool, default_weight: u32) -> Vec<WeightedTarget> {
        let active: Vec<WeightedTarget> = pool
            .replicas
            .iter()
            .filter_map(|addr| self.nodes.get(addr))
            .filter(|n| n.role == NodeRole::ActiveReplica && n.weight > 0)
            .map(|n| WeightedTarget {
                address: n.address.clone(),
                weight: n.weight,
            })
            .collect();
        if !active.is_empty() {
            return active;
        }
        pool.master
            .iter()
            .map(|master| WeightedTarget {
                address: master.clone(),
                weight: default_weight,
            })
            .collect()
    }

    fn render(&self, default_weight: u32) -> AppConfig {
        let pools = self
            .pools
            .values()
            .map(|pool| PoolRoute {
                name: pool.name.clone(),
                master: pool.master.clone(),
                reads: self.read_targets(pool, default_weight),
            })
            .collect();

        let mut shards = Vec::new();
        for shard in self.shards.values().filter(|s| s.is_top_level()) {
            if shard.state == ShardState::Deprecated && shard.is_mid_split() {
                for range in &shard.children {
                    let Some(child) = self.shards.get(range) else {
                        continue;
                    };
                    let owns_writes =
                        matches!(child.state, ShardState::NeedsCleanup | ShardState::Ready);
                    let owns_reads = owns_writes || child.state == ShardState::Replicating;
                    shards.push(ShardRoute {
                        min_id: range.min_id,
                        max_id: range.max_bound(),
                        state: child.state,
                        writes: if owns_writes {
                            child.master.clone()
                        } else {
                            shard.master.clone()
                        },
                        reads: if owns_reads {
                            self.read_targets(child, default_weight)
                        } else {
                            self.read_targets(shard, default_weight)
                        },
                    });
                }
                continue;
            }

            shards.push(ShardRoute {
                min_id: shard.range.min_id,
                max_id: shard.range.max_bound(),
                state: shard.state,
                writes: if shard.state == ShardState::Ready {
                    shard.master.clone()
                } else {
                    None
                },
                reads: if shard.state == ShardState::Offline {
                    Vec::new()
                } else {
                    self.read_targets(shard, default_weight)
                },
            });
        }

        AppConfig { pools, shards }
    }
}

/// A resolved pool, which may be a shard
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolView {
    Pool(Pool),
    Shard(Shard),
}

impl PoolView {
    pub fn pool(&self) -> &Pool {
        match self {
            PoolView::Pool(pool) => pool,
            PoolView::Shard(shard) => &shard.pool,
        }
    }

    pub fn name(&self) -> &str {
        &self.pool().name
    }

    pub fn as_shard(&self) -> Option<&Shard> {
        match self {
            PoolView::Shard(shard) => Some(shard),
            PoolView::Pool(_) => None,
        }
    }
}

/// Human-readable description of one pool or shard
#[derive(Debug, Clone)]
pub struct PoolSummary {
    pub name: String,
    pub range: Option<ShardRange>,
    pub state: Option<ShardState>,
    pub parent: Option<ShardRange>,
    pub children: Vec<ShardRange>,
    pub master: Option<Node>,
    pub replicas: Vec<Node>,
}

impl fmt::Display for PoolSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if let (Some(range), Some(state)) = (self.range, self.state) {
            write!(f, " {} ({})", range, state)?;
        }
        writeln!(f)?;
        if let Some(parent) = self.parent {
            writeln!(f, "  parent          {}", parent)?;
        }
        for child in &self.children {
            writeln!(f, "  child           {}", child)?;
        }
        match &self.master {
            Some(master) => writeln!(f, "  {:<15} {}", "master", describe(master))?,
            None => writeln!(f, "  master          (none)")?,
        }
        for replica in &self.replicas {
            writeln!(f, "  {:<15} {}", replica.role.as_str(), describe(replica))?;
        }
        Ok(())
    }
}

fn describe(node: &Node) -> String {
    let mut line = node.address.to_string();
    if node.role == NodeRole::ActiveReplica {
        line.push_str(&format!("  weight {}", node.weight));
    }
    match node.status {
        NodeStatus::Reachable => line.push_str("  up"),
        NodeStatus::Unreachable => line.push_str("  DOWN"),
        NodeStatus::Unknown => {}
    }
    if let Some(version) = &node.version {
        line.push_str(&format!("  v{}", version));
    }
    line
}

/// The orchestration entry point
pub struct Topology {
    catalog: RwLock<Catalog>,
    spares: SpareAllocator,
    inventory: Arc<dyn Inventory>,
    transport: Arc<dyn NodeTransport>,
    callbacks: Arc<CallbackDispatcher>,
    config: OrchestrationConfig,
}

impl Topology {
    /// Build the catalog from the inventory and check its invariants
    pub async fn load(
        inventory: Arc<dyn Inventory>,
        transport: Arc<dyn NodeTransport>,
        config: OrchestrationConfig,
    ) -> ClusterResult<Self> {
        let snapshot = inventory.load().await?;
        let spares = snapshot.spares.clone();
        let catalog = Catalog::build(snapshot)?;
        info!(
            "Loaded topology: {} pools, {} shards, {} nodes, {} spares",
            catalog.pools.len(),
            catalog.shards.len(),
            catalog.nodes.len(),
            spares.len()
        );

        Ok(Self {
            catalog: RwLock::new(catalog),
            spares: SpareAllocator::new(spares),
            inventory,
            transport,
            callbacks: Arc::new(CallbackDispatcher::new()),
            config,
        })
    }

    /// Share a dispatcher with other components
    pub fn with_callbacks(mut self, callbacks: Arc<CallbackDispatcher>) -> Self {
        self.callbacks = callbacks;
        self
    }

    pub fn callbacks(&self) -> &Arc<CallbackDispatcher> {
        &self.callbacks
    }

    pub fn transport(&self) -> &Arc<dyn NodeTransport> {
        &self.transport
    }

    pub fn inventory(&self) -> &Arc<dyn Inventory> {
        &self.inventory
    }

    pub fn config(&self) -> &OrchestrationConfig {
        &self.config
    }

    pub(crate) fn read<R>(&self, f: impl FnOnce(&Catalog) -> R) -> R {
        f(&self.catalog.read())
    }

    pub(crate) fn write<R>(&self, f: impl FnOnce(&mut Catalog) -> R) -> R {
        f(&mut self.catalog.write())
    }

    // ============= Resolution =============

    pub fn node(&self, address: &NodeAddr) -> ClusterResult<Node> {
        self.read(|c| c.nodes.get(address).cloned())
            .ok_or_else(|| ClusterError::NodeNotFound(address.to_string()))
    }

    pub fn nodes(&self) -> Vec<Node> {
        self.read(|c| c.nodes.values().cloned().collect())
    }

    pub fn pool(&self, name: &str) -> ClusterResult<PoolView> {
        self.read(|c| {
            if let Some(pool) = c.pools.get(name) {
                return Some(PoolView::Pool(pool.clone()));
            }
            c.shards
                .values()
                .find(|s| s.pool.name == name)
                .map(|s| PoolView::Shard(s.clone()))
        })
        .ok_or_else(|| ClusterError::PoolNotFound(name.to_string()))
    }

    /// Pool the node belongs to
    pub fn pool_of(&self, address: &NodeAddr) -> ClusterResult<PoolView> {
        let node = self.node(address)?;
        let name = node.pool.ok_or_else(|| {
            ClusterError::Validation(format!("{} does not belong to a pool", address))
        })?;
        self.pool(&name)
    }

    pub fn shard(&self, min_id: u64, max_id: Option<u64>) -> ClusterResult<Shard> {
        self.shard_at(&ShardRange {
            min_id,
            max_id: max_id.into(),
        })
    }

    pub fn shard_at(&self, range: &ShardRange) -> ClusterResult<Shard> {
        self.read(|c| c.shards.get(range).cloned())
            .ok_or_else(|| ClusterError::ShardNotFound(range.to_string()))
    }

    /// Top-level shard owning `id`
    pub fn shard_for_id(&self, id: u64) -> ClusterResult<Shard> {
        self.read(|c| {
            c.shards
                .values()
                .find(|s| s.is_top_level() && s.range.contains(id))
                .cloned()
        })
        .ok_or_else(|| ClusterError::ShardNotFound(format!("no shard owns id {}", id)))
    }

    pub fn shards(&self) -> Vec<Shard> {
        self.read(|c| c.shards.values().cloned().collect())
    }

    pub fn pools(&self) -> Vec<Pool> {
        self.read(|c| c.pools.values().cloned().collect())
    }

    /// The shard a split phase acts on. Without a selector, the single shard
    /// with children is picked.
    pub fn shard_mid_split(&self, selector: Option<ShardRange>) -> ClusterResult<Shard> {
        if let Some(range) = selector {
            let shard = self.shard_at(&range)?;
            if !shard.is_mid_split() {
                return Err(ClusterError::Validation(format!(
                    "shard {} is not being split",
                    range
                )));
            }
            return Ok(shard);
        }

        let mut candidates: Vec<Shard> = self
            .read(|c| c.shards.values().filter(|s| s.is_mid_split()).cloned().collect());
        match candidates.len() {
            0 => Err(ClusterError::ShardNotFound(
                "no shard is being split".to_string(),
            )),
            1 => Ok(candidates.remove(0)),
            n => Err(ClusterError::Validation(format!(
                "{} shards are being split ({}); pick one by range",
                n,
                candidates
                    .iter()
                    .map(|s| s.range.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ))),
        }
    }

    // ============= Spares =============

    pub fn count_spares(&self, filter: &SpareFilter) -> usize {
        self.spares.count(filter)
    }

    pub fn available_spares(&self) -> Vec<SpareNode> {
        self.spares.available()
    }

    pub async fn claim_spares(
        &self,
        count: usize,
        filter: &SpareFilter,
    ) -> ClusterResult<Vec<SpareNode>> {
        let mut groups = self
            .claim_spare_batch(&[SpareRequest::new(count, filter.clone())])
            .await?;
        Ok(groups.pop().unwrap_or_default())
    }

    pub async fn claim_spare(&self, filter: &SpareFilter) -> ClusterResult<SpareNode> {
        self.claim_spares(1, filter)
            .await?
            .pop()
            .ok_or_else(|| ClusterError::insufficient(filter.role, 1, 0))
    }

    /// Claim several groups atomically and record the claims. If the
    /// inventory refuses, the spares go back to the pool.
    pub async fn claim_spare_batch(
        &self,
        requests: &[SpareRequest],
    ) -> ClusterResult<Vec<Vec<SpareNode>>> {
        let groups = self.spares.claim_batch(requests)?;
        let claimed: Vec<NodeAddr> = groups
            .iter()
            .flatten()
            .map(|s| s.address().clone())
            .collect();

        if let Err(e) = self.inventory.record_claims(&claimed).await {
            warn!("Could not record spare claims, returning them: {}", e);
            self.spares.restore(groups.into_iter().flatten().collect());
            return Err(e.into());
        }
        metrics::record_spares_claimed(claimed.len());
        info!("Claimed {} spares", claimed.len());
        Ok(groups)
    }

    /// Hand claimed spares that never entered service back to the pool
    pub(crate) async fn return_spares(&self, returned: Vec<SpareNode>) -> ClusterResult<()> {
        if returned.is_empty() {
            return Ok(());
        }
        self.inventory.return_spares(&returned).await?;
        info!("Returned {} unused spares", returned.len());
        self.spares.restore(returned);
        Ok(())
    }

    /// Turn nodes dropped from the catalog back into spares
    pub(crate) async fn release_nodes(&self, nodes: Vec<Node>) -> ClusterResult<()> {
        let addresses: Vec<NodeAddr> = nodes.iter().map(|n| n.address.clone()).collect();
        self.inventory.release_nodes(&addresses).await?;
        self.spares.restore(
            nodes
                .into_iter()
                .map(|mut node| {
                    node.pool = None;
                    node.master = None;
                    node.weight = 0;
                    node.role = NodeRole::Spare;
                    SpareNode { node, fills: Vec::new() }
                })
                .collect(),
        );
        Ok(())
    }

    // ============= Persistence =============

    /// Upsert the record of `name` and every member node
    pub(crate) async fn persist(&self, name: &str) -> ClusterResult<()> {
        enum Pending {
            Pool(PoolRecord, Vec<Node>),
            Shard(ShardRecord, Vec<Node>),
        }

        let pending = self.read(|c| {
            if let Some(pool) = c.pools.get(name) {
                return Some(Pending::Pool(PoolRecord::from(pool), c.members(pool)));
            }
            c.shards
                .values()
                .find(|s| s.pool.name == name)
                .map(|s| Pending::Shard(ShardRecord::from(s), c.members(&s.pool)))
        });

        match pending {
            Some(Pending::Pool(record, members)) => {
                self.inventory.upsert_pool(&record, &members).await?
            }
            Some(Pending::Shard(record, members)) => {
                self.inventory.upsert_shard(&record, &members).await?
            }
            None => return Err(ClusterError::PoolNotFound(name.to_string())),
        }
        debug!("Persisted {}", name);
        Ok(())
    }

    pub(crate) async fn persist_shard(&self, range: &ShardRange) -> ClusterResult<()> {
        let name = self.shard_at(range)?.pool.name;
        self.persist(&name).await
    }

    /// Upsert the pool or shard record and all of its member nodes.
    /// Repeating the call without a state change leaves the inventory as is.
    pub async fn sync_configuration(&self, name: &str) -> ClusterResult<Intercepted<()>> {
        let hook = HookContext::new(Operation::SyncConfiguration, name);
        self.callbacks.intercept(&hook, self.persist(name)).await
    }

    /// Application configuration derived from the current catalog
    pub fn render_config(&self) -> AppConfig {
        let weight = self.config.default_replica_weight;
        self.read(|c| c.render(weight))
    }

    /// Render and publish the application configuration
    pub async fn write_config(&self) -> ClusterResult<AppConfig> {
        let config = self.render_config();
        self.inventory.write_config(&config).await?;
        info!(
            "Wrote application config ({} pools, {} shard routes)",
            config.pools.len(),
            config.shards.len()
        );
        Ok(config)
    }

    // ============= Probing =============

    /// Probe one node and record whether it answered
    pub async fn probe(&self, address: &NodeAddr) -> NodeStatus {
        let status = match self.transport.probe(address).await {
            Ok(true) => NodeStatus::Reachable,
            Ok(false) => NodeStatus::Unreachable,
            Err(e) => {
                debug!("Probe of {} failed: {}", address, e);
                NodeStatus::Unreachable
            }
        };
        self.write(|c| {
            if let Some(node) = c.nodes.get_mut(address) {
                node.status = status;
            }
        });
        status
    }

    /// Probe every node concurrently
    #[instrument(skip(self, ctx))]
    pub async fn probe_all(&self, ctx: &ExecutionContext) -> Vec<TargetOutcome> {
        let addresses: Vec<NodeAddr> = self.read(|c| c.nodes.keys().cloned().collect());
        let results = fan_out(addresses, ctx.concurrency, |address| async move {
            match self.transport.probe(&address).await {
                Ok(true) => Ok(()),
                Ok(false) => Err(ClusterError::transport(&address, "not responding")),
                Err(e) => Err(e),
            }
        })
        .await;

        self.write(|c| {
            for (address, result) in &results {
                if let Some(node) = c.nodes.get_mut(address) {
                    node.status = if result.is_ok() {
                        NodeStatus::Reachable
                    } else {
                        NodeStatus::Unreachable
                    };
                }
            }
        });
        let outcomes = outcomes(&results);
        let down = outcomes.iter().filter(|o| !o.succeeded()).count();
        if down > 0 {
            warn!("{} of {} nodes unreachable", down, outcomes.len());
        }
        outcomes
    }

    pub fn summary(&self, name: &str) -> ClusterResult<PoolSummary> {
        let view = self.pool(name)?;
        let pool = view.pool();
        self.read(|c| {
            let master = pool.master.as_ref().and_then(|m| c.nodes.get(m)).cloned();
            let replicas = pool
                .replicas
                .iter()
                .filter_map(|r| c.nodes.get(r))
                .cloned()
                .collect();
            let shard = view.as_shard();
            Ok(PoolSummary {
                name: pool.name.clone(),
                range: shard.map(|s| s.range),
                state: shard.map(|s| s.state),
                parent: shard.and_then(|s| s.parent),
                children: shard.map(|s| s.children.clone()).unwrap_or_default(),
                master,
                replicas,
            })
        })
    }

    /// Check that the catalog still agrees with itself for one pool
    pub(crate) fn check_pool(&self, name: &str) -> ClusterResult<()> {
        self.read(|c| {
            let pool = c
                .pool_ref(name)
                .ok_or_else(|| ClusterError::PoolNotFound(name.to_string()))?;
            c.check_replicas(pool)
        })
    }

    // ============= Shard state =============

    /// Toggle a shard between ready, read-only and offline
    #[instrument(skip(self))]
    pub async fn set_shard_state(
        &self,
        range: ShardRange,
        state: ShardState,
    ) -> ClusterResult<Intercepted<()>> {
        if !state.is_operational() {
            return Err(ClusterError::Validation(format!(
                "{} cannot be set directly",
                state
            )));
        }
        let shard = self.shard_at(&range)?;
        let mut probe = shard.clone();
        probe.transition(state).map_err(model_error)?;

        let hook = HookContext::new(Operation::SetShardState, &shard.pool.name)
            .with_detail("from", shard.state)
            .with_detail("to", state);
        self.callbacks
            .intercept(&hook, async {
                self.write(|c| -> ClusterResult<()> {
                    c.shard_mut(&range)?.transition(state).map_err(model_error)
                })?;
                self.persist(&shard.pool.name).await?;
                self.write_config().await?;
                info!("Shard {} is now {}", range, state);
                Ok::<(), ClusterError>(())
            })
            .await
    }
}
