//! Priority-ordered interception of mutating operations
//!
//! Extensions register pre and post hooks per [`Operation`]. Within a phase,
//! hooks run from the highest priority to the lowest; hooks sharing a
//! priority run in registration order.
//!
//! ```text
//!   pre(150) -> pre(100) -> [ operation ] -> post(150) -> post(100) -> post(85)
//!       |                                                   |
//!     abort: operation and all post hooks skipped         abort: post(85) skipped
//! ```

use async_trait::async_trait;
use parking_lot::RwLock;
use shardwright_core::types::NodeAddr;
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::metrics;
use crate::transport::NodeTransport;

/// Priority given to hooks that do not ask for one
pub const DEFAULT_PRIORITY: i32 = 100;

/// Every mutating operation that can be intercepted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    MarkReplicaActive,
    SetReplicaWeight,
    MarkReplicaStandby,
    RemoveReplica,
    AddStandbyReplicas,
    SyncConfiguration,
    SetShardState,
    Promote,
    Split,
    ResumeSplitChild,
    MoveReadsToChildren,
    MoveWritesToChildren,
    Cleanup,
    Cutover,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MarkReplicaActive => "mark_replica_active",
            Self::SetReplicaWeight => "set_replica_weight",
            Self::MarkReplicaStandby => "mark_replica_standby",
            Self::RemoveReplica => "remove_replica",
            Self::AddStandbyReplicas => "add_standby_replicas",
            Self::SyncConfiguration => "sync_configuration",
            Self::SetShardState => "set_shard_state",
            Self::Promote => "promote",
            Self::Split => "split",
            Self::ResumeSplitChild => "resume_split_child",
            Self::MoveReadsToChildren => "move_reads_to_children",
            Self::MoveWritesToChildren => "move_writes_to_children",
            Self::Cleanup => "cleanup",
            Self::Cutover => "cutover",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Pre,
    Post,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Pre => "pre",
            Phase::Post => "post",
        }
    }
}

/// Raised by a hook to stop the rest of its chain. Never leaves the
/// dispatcher.
#[derive(Debug, Clone, Error)]
#[error("callback aborted: {reason}")]
pub struct CallbackAbort {
    pub reason: String,
}

impl CallbackAbort {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

pub type HookResult = Result<(), CallbackAbort>;

/// What a hook gets to see about the intercepted call
#[derive(Debug, Clone)]
pub struct HookContext {
    /// Correlates the pre and post hooks of one call
    pub id: Uuid,
    pub operation: Operation,
    /// Pool, shard or node the operation acts on
    pub target: String,
    /// Nodes the operation touches
    pub nodes: Vec<NodeAddr>,
    pub detail: BTreeMap<String, String>,
}

impl HookContext {
    pub fn new(operation: Operation, target: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            operation,
            target: target.into(),
            nodes: Vec::new(),
            detail: BTreeMap::new(),
        }
    }

    pub fn with_nodes(mut self, nodes: impl IntoIterator<Item = NodeAddr>) -> Self {
        self.nodes.extend(nodes);
        self
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        self.detail.insert(key.into(), value.to_string());
        self
    }
}

/// A pre or post hook
#[async_trait]
pub trait OperationHook: Send + Sync {
    async fn call(&self, ctx: &HookContext) -> HookResult;
}

struct FnHook<F>(F);

#[async_trait]
impl<F> OperationHook for FnHook<F>
where
    F: Fn(&HookContext) -> HookResult + Send + Sync,
{
    async fn call(&self, ctx: &HookContext) -> HookResult {
        (self.0)(ctx)
    }
}

/// Wrap a synchronous closure as a hook
pub fn hook_fn<F>(f: F) -> Arc<dyn OperationHook>
where
    F: Fn(&HookContext) -> HookResult + Send + Sync + 'static,
{
    Arc::new(FnHook(f))
}

#[derive(Clone)]
struct Registration {
    priority: i32,
    hook: Arc<dyn OperationHook>,
}

/// Outcome of an intercepted call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intercepted<T> {
    Completed(T),
    /// A pre hook aborted; the operation did not run
    Skipped,
}

impl<T> Intercepted<T> {
    pub fn completed(self) -> Option<T> {
        match self {
            Intercepted::Completed(value) => Some(value),
            Intercepted::Skipped => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Intercepted::Skipped)
    }
}

/// Interceptor table keyed by operation and phase
#[derive(Default)]
pub struct CallbackDispatcher {
    hooks: RwLock<HashMap<(Operation, Phase), Vec<Registration>>>,
}

impl CallbackDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        operation: Operation,
        phase: Phase,
        priority: i32,
        hook: Arc<dyn OperationHook>,
    ) {
        let mut hooks = self.hooks.write();
        let list = hooks.entry((operation, phase)).or_default();
        list.push(Registration { priority, hook });
        list.sort_by_key(|r| Reverse(r.priority));
        debug!(
            "Registered {} hook for {} at priority {}",
            phase.as_str(),
            operation,
            priority
        );
    }

    /// Priorities registered for an operation, in run order
    pub fn priorities(&self, operation: Operation, phase: Phase) -> Vec<i32> {
        self.hooks
            .read()
            .get(&(operation, phase))
            .map(|list| list.iter().map(|r| r.priority).collect())
            .unwrap_or_default()
    }

    fn snapshot(&self, operation: Operation, phase: Phase) -> Vec<Registration> {
        self.hooks
            .read()
            .get(&(operation, phase))
            .cloned()
            .unwrap_or_default()
    }

    /// Run the hook chain of one phase; `false` when a hook aborted
    async fn run_phase(&self, ctx: &HookContext, phase: Phase) -> bool {
        for registration in self.snapshot(ctx.operation, phase) {
            if let Err(abort) = registration.hook.call(ctx).await {
                info!(
                    operation = ctx.operation.as_str(),
                    phase = phase.as_str(),
                    priority = registration.priority,
                    "Hook aborted: {}",
                    abort.reason
                );
                metrics::record_callback_abort(ctx.operation.as_str(), phase.as_str());
                return false;
            }
        }
        true
    }

    /// Run `operation` between its pre and post hooks.
    ///
    /// A pre hook abort skips the operation and every post hook. An error
    /// from the operation itself is returned as is and skips the post hooks.
    pub async fn intercept<T, E, Fut>(
        &self,
        ctx: &HookContext,
        operation: Fut,
    ) -> Result<Intercepted<T>, E>
    where
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.run_phase(ctx, Phase::Pre).await {
            return Ok(Intercepted::Skipped);
        }
        let value = operation.await?;
        self.run_phase(ctx, Phase::Post).await;
        Ok(Intercepted::Completed(value))
    }
}

/// Built-in hooks that put a node into a maintenance window for the length
/// of an operation: monitoring is suppressed and the query killer runs.
pub struct MaintenanceHooks;

impl MaintenanceHooks {
    pub const PRE_PRIORITY: i32 = 200;
    pub const POST_PRIORITY: i32 = 10;

    pub fn install(
        dispatcher: &CallbackDispatcher,
        transport: Arc<dyn NodeTransport>,
        operations: &[Operation],
    ) {
        for operation in operations {
            dispatcher.register(
                *operation,
                Phase::Pre,
                Self::PRE_PRIORITY,
                Arc::new(EnterMaintenance {
                    transport: Arc::clone(&transport),
                }),
            );
            dispatcher.register(
                *operation,
                Phase::Post,
                Self::POST_PRIORITY,
                Arc::new(LeaveMaintenance {
                    transport: Arc::clone(&transport),
                }),
            );
        }
    }
}

struct EnterMaintenance {
    transport: Arc<dyn NodeTransport>,
}

#[async_trait]
impl OperationHook for EnterMaintenance {
    async fn call(&self, ctx: &HookContext) -> HookResult {
        for node in &ctx.nodes {
            self.transport
                .suppress_monitoring(node)
                .await
                .map_err(|e| CallbackAbort::new(format!("cannot suppress monitoring: {}", e)))?;
            self.transport
                .start_query_killer(node)
                .await
                .map_err(|e| CallbackAbort::new(format!("cannot start query killer: {}", e)))?;
        }
        Ok(())
    }
}

struct LeaveMaintenance {
    transport: Arc<dyn NodeTransport>,
}

#[async_trait]
impl OperationHook for LeaveMaintenance {
    async fn call(&self, ctx: &HookContext) -> HookResult {
        for node in &ctx.nodes {
            if let Err(e) = self.transport.stop_query_killer(node).await {
                warn!("Query killer still running on {}: {}", node, e);
            }
            if let Err(e) = self.transport.restore_monitoring(node).await {
                warn!("Monitoring still suppressed on {}: {}", node, e);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryTransport;
    use parking_lot::Mutex;

    fn recorder(
        log: &Arc<Mutex<Vec<i32>>>,
        priority: i32,
        abort: bool,
    ) -> Arc<dyn OperationHook> {
        let log = Arc::clone(log);
        hook_fn(move |_| {
            log.lock().push(priority);
            if abort {
                Err(CallbackAbort::new("stop"))
            } else {
                Ok(())
            }
        })
    }

    #[tokio::test]
    async fn test_post_hooks_run_high_to_low_and_abort_stops_chain() {
        let dispatcher = CallbackDispatcher::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        dispatcher.register(Operation::Promote, Phase::Post, 85, recorder(&log, 85, false));
        dispatcher.register(Operation::Promote, Phase::Post, 150, recorder(&log, 150, false));
        dispatcher.register(Operation::Promote, Phase::Post, 100, recorder(&log, 100, false));
        assert_eq!(
            dispatcher.priorities(Operation::Promote, Phase::Post),
            vec![150, 100, 85]
        );

        let ctx = HookContext::new(Operation::Promote, "users");
        let result: Result<_, ()> = dispatcher.intercept(&ctx, async { Ok(7) }).await;
        assert_eq!(result, Ok(Intercepted::Completed(7)));
        assert_eq!(*log.lock(), vec![150, 100, 85]);

        let aborting = CallbackDispatcher::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        aborting.register(Operation::Promote, Phase::Post, 150, recorder(&log, 150, false));
        aborting.register(Operation::Promote, Phase::Post, 100, recorder(&log, 100, true));
        aborting.register(Operation::Promote, Phase::Post, 85, recorder(&log, 85, false));
        let result: Result<_, ()> = aborting.intercept(&ctx, async { Ok(()) }).await;
        assert_eq!(result, Ok(Intercepted::Completed(())));
        assert_eq!(*log.lock(), vec![150, 100]);
    }

    #[tokio::test]
    async fn test_pre_abort_skips_operation_and_post_hooks() {
        let dispatcher = CallbackDispatcher::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        dispatcher.register(Operation::Split, Phase::Pre, 120, recorder(&log, 120, true));
        dispatcher.register(Operation::Split, Phase::Pre, 90, recorder(&log, 90, false));
        dispatcher.register(Operation::Split, Phase::Post, 100, recorder(&log, 100, false));

        let ran = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&ran);
        let ctx = HookContext::new(Operation::Split, "shard-0-999");
        let result: Result<Intercepted<()>, ()> = dispatcher
            .intercept(&ctx, async move {
                *flag.lock() = true;
                Ok(())
            })
            .await;

        assert!(result.unwrap().is_skipped());
        assert!(!*ran.lock());
        assert_eq!(*log.lock(), vec![120]);
    }

    #[tokio::test]
    async fn test_operation_error_skips_post_hooks() {
        let dispatcher = CallbackDispatcher::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        dispatcher.register(Operation::Cleanup, Phase::Pre, DEFAULT_PRIORITY, recorder(&log, 1, false));
        dispatcher.register(Operation::Cleanup, Phase::Post, DEFAULT_PRIORITY, recorder(&log, 2, false));

        let ctx = HookContext::new(Operation::Cleanup, "shard-0-999");
        let result: Result<Intercepted<()>, &str> =
            dispatcher.intercept(&ctx, async { Err("prune failed") }).await;
        assert_eq!(result, Err("prune failed"));
        assert_eq!(*log.lock(), vec![1]);
    }

    #[tokio::test]
    async fn test_equal_priorities_keep_registration_order() {
        let dispatcher = CallbackDispatcher::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        for tag in [1, 2, 3] {
            let log = Arc::clone(&log);
            dispatcher.register(
                Operation::Cutover,
                Phase::Pre,
                DEFAULT_PRIORITY,
                hook_fn(move |_| {
                    log.lock().push(tag);
                    Ok(())
                }),
            );
        }
        let ctx = HookContext::new(Operation::Cutover, "shard-3000-inf");
        let _: Result<_, ()> = dispatcher.intercept(&ctx, async { Ok(()) }).await;
        assert_eq!(*log.lock(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_maintenance_window_wraps_operation() {
        let transport = Arc::new(MemoryTransport::new());
        transport.add_node("10.0.0.1:3306");
        let node = NodeAddr::from("10.0.0.1:3306");

        let dispatcher = CallbackDispatcher::new();
        MaintenanceHooks::install(&dispatcher, transport.clone(), &[Operation::Promote]);

        let ctx = HookContext::new(Operation::Promote, "users").with_nodes([node.clone()]);
        let observed = {
            let transport = Arc::clone(&transport);
            let node = node.clone();
            dispatcher
                .intercept(&ctx, async move { Ok::<_, ()>(transport.in_maintenance(&node)) })
                .await
        };
        assert_eq!(observed, Ok(Intercepted::Completed(true)));
        assert!(!transport.in_maintenance(&node));
    }
}
