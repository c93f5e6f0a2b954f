//! Top-level state machine: `ReroutePhase` resolves the target shard from
//! cluster state and routes locally or remotely; `AsyncPrimaryAction`
//! acquires the primary lock and drives `ReplicationOperation`;
//! `AsyncReplicaAction` is the receiving side, acquiring the replica lock
//! and running the domain operation, retrying while its local term is
//! behind the sender's (§2, §4.1–§4.4).

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::ReplicationError;
use crate::ids::{AllocationId, NodeId, PrimaryTerm, ShardId};
use crate::observer::{ClusterStateObserver, ObservedChange};
use crate::replicas_proxy::ReplicasProxy;
use crate::replication_operation::{HasShardInfo, ReplicationOperation};
use crate::request::{
    HasPrimaryTerm, HasRoutingWatermark, HasShardId, HasTimeout, HasWaitForActiveShards,
};
use crate::routing::IndexMetadata;
use crate::shard::{IndexShard, ShardOperationOnPrimary, ShardOperationOnReplica};

/// Looks up the local in-process copy of a shard by id; the storage
/// engine owns the real registry, this is its interface as seen here.
pub trait LocalShardRegistry: Send + Sync {
    fn get(&self, shard_id: ShardId) -> Option<Arc<dyn IndexShard>>;
}

/// The transport / RPC layer this core consumes (§1 "deliberately out of
/// scope"; §6 "typed request/response channel abstraction").
#[async_trait]
pub trait Transport<Req, Resp>: Send + Sync {
    /// Forward a write to the primary hosted on `node` (§4.1 step 7,
    /// remote dispatch).
    async fn forward_to_primary(&self, node: &NodeId, request: Req) -> Result<Resp, ReplicationError>;

    /// Forward a write to the relocation target of a primary that has
    /// finished relocating (§4.2 step 2).
    async fn forward_to_relocation_target(
        &self,
        node: &NodeId,
        relocation_id: AllocationId,
        primary_term: PrimaryTerm,
        request: Req,
    ) -> Result<Resp, ReplicationError>;
}

/// Fills in `shard_id` and applies `waitForActiveShards` defaults from
/// index settings (§4.1 step 4). Also resolves the concrete index name a
/// request targets (§4.1 step 3 — multi-index requests are rejected
/// upstream, outside this core).
pub trait ResolveRequest<Req>: Send + Sync {
    fn index_name(&self, request: &Req) -> String;

    fn resolve(
        &self,
        request: &mut Req,
        metadata: &IndexMetadata,
        default_wait_for_active_shards: crate::request::WaitForActiveShards,
    ) -> Result<ShardId, ReplicationError>;
}

/// Ties a request/replica-request/response type triple to the executor,
/// transport options, and collaborators it needs — constructed once per
/// logical write action (index/delete/bulk/refresh/flush), per §6's
/// per-action `executor`/`transportOptions` configuration.
pub struct ReplicationAction<Req, ReplicaReq, Resp> {
    pub local_node: NodeId,
    pub observer: Arc<dyn ClusterStateObserver>,
    pub resolver: Arc<dyn ResolveRequest<Req>>,
    pub local_shards: Arc<dyn LocalShardRegistry>,
    pub primary_op:
        Arc<dyn ShardOperationOnPrimary<Request = Req, ReplicaRequest = ReplicaReq, Response = Resp>>,
    pub replicas_proxy: Arc<dyn ReplicasProxy>,
    pub transport: Arc<dyn Transport<Req, Resp>>,
    pub settings: crate::config::ReplicationSettings,
}

impl<Req, ReplicaReq, Resp> ReplicationAction<Req, ReplicaReq, Resp>
where
    Req: HasShardId
        + HasPrimaryTerm
        + HasTimeout
        + HasWaitForActiveShards
        + HasRoutingWatermark
        + Clone
        + Send
        + 'static,
    ReplicaReq: Clone + Send + serde::Serialize + 'static,
    Resp: HasShardInfo + Send + 'static,
{
    /// Entry point: hand a request to the top-level action (§2 "Data flow
    /// for one write").
    pub async fn dispatch(&self, request: Req) -> Result<Resp, ReplicationError> {
        ReroutePhase { action: self }.run(request).await
    }
}

/// Resolves the request against observed cluster state and dispatches it,
/// retrying on observed cluster-state changes until it finishes (§4.1).
/// `request` is cloned for each attempt rather than consumed so a retry
/// can replay it unchanged.
struct ReroutePhase<'a, Req, ReplicaReq, Resp> {
    action: &'a ReplicationAction<Req, ReplicaReq, Resp>,
}

impl<'a, Req, ReplicaReq, Resp> ReroutePhase<'a, Req, ReplicaReq, Resp>
where
    Req: HasShardId
        + HasPrimaryTerm
        + HasTimeout
        + HasWaitForActiveShards
        + HasRoutingWatermark
        + Clone
        + Send
        + 'static,
    ReplicaReq: Clone + Send + serde::Serialize + 'static,
    Resp: HasShardInfo + Send + 'static,
{
    #[tracing::instrument(skip(self, request), fields(shard_id = ?request.shard_id()))]
    async fn run(&self, request: Req) -> Result<Resp, ReplicationError> {
        loop {
            match self.attempt(request.clone()).await {
                Ok(resp) => return Ok(resp),
                Err(err) if self.retryable(&err) => {
                    if self.action.observer.is_timed_out() {
                        return Err(err);
                    }
                    if let Some(shard_id) = request.shard_id() {
                        crate::metrics::record_retry(&shard_id, err.retry_reason());
                    }
                    debug!(error = %err, "retrying after observing next cluster state change");
                    match self
                        .action
                        .observer
                        .wait_for_next_change(Some(request.timeout()))
                        .await
                    {
                        ObservedChange::NewState(_) => continue,
                        ObservedChange::Timeout => return self.attempt(request.clone()).await,
                        ObservedChange::Closed => return Err(ReplicationError::NodeClosed),
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn retryable(&self, err: &ReplicationError) -> bool {
        err.is_routing_retryable() || err.is_primary_retryable() || err.is_replica_retryable()
    }

    async fn attempt(&self, mut request: Req) -> Result<Resp, ReplicationError> {
        let state = self.action.observer.observed_state();
        let index_name = self.action.resolver.index_name(&request);

        if let Some(block) = state.blocks.blocking(
            &index_name,
            self.action.settings.global_block_level,
            self.action.settings.index_block_level,
        ) {
            return Err(ReplicationError::ClusterBlocked(block.description.clone()));
        }

        let metadata = state
            .index_by_name(&index_name)
            .ok_or_else(|| ReplicationError::IndexNotFound(index_name.clone()))?;
        if metadata.closed {
            return Err(ReplicationError::IndexClosed(index_name));
        }

        let shard_id = self.action.resolver.resolve(
            &mut request,
            metadata,
            self.action.settings.default_wait_for_active_shards,
        )?;
        debug_assert_eq!(request.shard_id(), Some(shard_id));

        if request.is_stale_against(state.version) {
            // This node's view of cluster state is older than what the
            // sender already observed; wait rather than route on stale
            // information (§8 boundary scenario 5).
            return Err(ReplicationError::UnavailableShards {
                shard: shard_id,
                last_observed_version: state.version,
            });
        }
        request.bump_watermark(state.version);

        let routing_table =
            state
                .routing_for(&shard_id)
                .ok_or(ReplicationError::UnavailableShards {
                    shard: shard_id,
                    last_observed_version: state.version,
                })?;
        let primary = &routing_table.primary;
        if !primary.active() || !state.has_node(&primary.current_node_id) {
            return Err(ReplicationError::UnavailableShards {
                shard: shard_id,
                last_observed_version: state.version,
            });
        }

        let primary_term = state.primary_term(&shard_id);
        request.set_primary_term(primary_term);

        if primary.current_node_id == self.action.local_node {
            info!(shard = %shard_id, "routing locally");
            let action = AsyncPrimaryAction {
                action: self.action,
                execute_on_replicas: !metadata.shadow_replicas,
            };
            action
                .run(
                    request,
                    shard_id,
                    primary.allocation_id.clone(),
                    primary_term,
                    primary.clone(),
                )
                .await
        } else {
            debug!(shard = %shard_id, node = %primary.current_node_id, "routing remotely to primary");
            self.action
                .transport
                .forward_to_primary(&primary.current_node_id, request)
                .await
        }
    }
}

/// Acquires the primary operation lock, validates identity, runs the
/// user's primary operation, and drives `ReplicationOperation` (§4.2).
struct AsyncPrimaryAction<'a, Req, ReplicaReq, Resp> {
    action: &'a ReplicationAction<Req, ReplicaReq, Resp>,
    execute_on_replicas: bool,
}

impl<'a, Req, ReplicaReq, Resp> AsyncPrimaryAction<'a, Req, ReplicaReq, Resp>
where
    Req: HasShardId
        + HasPrimaryTerm
        + HasTimeout
        + HasWaitForActiveShards
        + HasRoutingWatermark
        + Clone
        + Send
        + 'static,
    ReplicaReq: Clone + Send + serde::Serialize + 'static,
    Resp: HasShardInfo + Send + 'static,
{
    async fn run(
        &self,
        request: Req,
        shard_id: ShardId,
        target_allocation_id: AllocationId,
        primary_term: PrimaryTerm,
        cluster_primary_entry: crate::routing::RoutingEntry,
    ) -> Result<Resp, ReplicationError> {
        let shard = self
            .action
            .local_shards
            .get(shard_id)
            .ok_or(ReplicationError::RetryOnPrimary(shard_id))?;

        let primary_ref = crate::primary_reference::PrimaryShardReference::acquire(
            shard.clone(),
            &target_allocation_id,
            primary_term,
        )
        .await?;
        crate::metrics::record_primary_acquired(&shard_id);

        if primary_ref.is_relocated() {
            // The cluster-state routing table, not the shard's own
            // self-report, is authoritative for where a relocation hands
            // off to.
            let relocation_id = cluster_primary_entry.relocation_id.clone().ok_or_else(|| {
                ReplicationError::Other(format!("relocated shard {shard_id} missing relocation id"))
            })?;
            let relocating_node = cluster_primary_entry.relocating_node_id.clone().ok_or_else(|| {
                ReplicationError::Other(format!("relocated shard {shard_id} missing target node"))
            })?;
            let term = primary_ref.primary_term();
            drop(primary_ref); // release the lock before forwarding (§4.2 step 2)
            crate::metrics::record_primary_released(&shard_id);

            return self
                .action
                .transport
                .forward_to_relocation_target(&relocating_node, relocation_id, term, request)
                .await;
        }

        let wait_for_active_shards = request.wait_for_active_shards();

        let primary_result = match self.action.primary_op.execute(request, shard.as_ref()).await {
            Ok(result) => result,
            Err(err) => {
                crate::metrics::record_primary_released(&shard_id);
                return Err(err);
            }
        };

        let state = self.action.observer.observed_state();
        let routing_table = state
            .routing_for(&shard_id)
            .ok_or(ReplicationError::RetryOnPrimary(shard_id))?;

        let replication_operation = ReplicationOperation::new(
            shard_id,
            routing_table,
            wait_for_active_shards,
            self.execute_on_replicas,
            self.action.replicas_proxy.clone(),
            primary_ref.primary_term(),
        );
        let payload = serde_json::to_vec(&primary_result.replica_request)
            .map_err(crate::wire::WireError::from)?;
        let shard_info = replication_operation.execute(payload).await?;

        crate::metrics::record_primary_released(&shard_id);
        let mut response = primary_result.response;
        response.set_shard_info(shard_info);
        Ok(response)
    }
}

/// The receiving side of a replica RPC (§4.4): acquire the replica
/// operation lock (rejecting or waiting out a stale local term), run the
/// domain operation, release. Retries while the local copy's term lags
/// the sender's, waiting for cluster state to catch the local node up.
pub struct AsyncReplicaAction<ReplicaReq> {
    pub local_shards: Arc<dyn LocalShardRegistry>,
    pub replica_op: Arc<dyn ShardOperationOnReplica<ReplicaRequest = ReplicaReq>>,
    pub observer: Arc<dyn ClusterStateObserver>,
}

impl<ReplicaReq> AsyncReplicaAction<ReplicaReq>
where
    ReplicaReq: Clone + Send,
{
    pub async fn run(
        &self,
        shard_id: ShardId,
        target_allocation_id: AllocationId,
        primary_term: PrimaryTerm,
        replica_request: ReplicaReq,
        timeout: std::time::Duration,
    ) -> Result<(), ReplicationError> {
        loop {
            let attempt_result = self
                .attempt(
                    shard_id,
                    &target_allocation_id,
                    primary_term,
                    replica_request.clone(),
                )
                .await;
            match attempt_result {
                Ok(()) => return Ok(()),
                Err(err) if err.is_replica_retryable() => {
                    match self.observer.wait_for_next_change(Some(timeout)).await {
                        ObservedChange::NewState(_) => continue,
                        ObservedChange::Timeout => return Err(err),
                        ObservedChange::Closed => return Err(ReplicationError::NodeClosed),
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn attempt(
        &self,
        shard_id: ShardId,
        target_allocation_id: &AllocationId,
        primary_term: PrimaryTerm,
        replica_request: ReplicaReq,
    ) -> Result<(), ReplicationError> {
        let shard = self
            .local_shards
            .get(shard_id)
            .ok_or(ReplicationError::RetryOnReplica(shard_id))?;

        let routing_entry = shard.routing_entry();
        if routing_entry.allocation_id != *target_allocation_id {
            return Err(ReplicationError::ShardNotFound {
                shard: shard_id,
                expected: target_allocation_id.clone(),
                actual: routing_entry.allocation_id,
            });
        }

        let lock = match shard.acquire_replica_operation_lock(primary_term).await {
            Ok(lock) => lock,
            Err(ReplicationError::StaleTerm { shard, .. }) => {
                return Err(ReplicationError::RetryOnReplica(shard))
            }
            Err(err) => return Err(err),
        };

        let result = self.replica_op.execute(replica_request, shard.as_ref()).await;
        drop(lock);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::NodeId;
    use crate::test_support::TestIndexShard;
    use std::sync::Mutex;

    struct EchoReplicaOp {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ShardOperationOnReplica for EchoReplicaOp {
        type ReplicaRequest = String;

        async fn execute(
            &self,
            request: Self::ReplicaRequest,
            _shard: &dyn IndexShard,
        ) -> Result<(), ReplicationError> {
            self.calls.lock().unwrap().push(request);
            Ok(())
        }
    }

    struct RegistryOf(Arc<TestIndexShard>);

    impl LocalShardRegistry for RegistryOf {
        fn get(&self, shard_id: ShardId) -> Option<Arc<dyn IndexShard>> {
            if shard_id == self.0.shard_id() {
                Some(self.0.clone())
            } else {
                None
            }
        }
    }

    #[tokio::test]
    async fn replica_action_runs_operation_under_matching_term() {
        let shard = Arc::new(TestIndexShard::new_replica(uuid::Uuid::nil(), 0, PrimaryTerm(3)));
        let alloc = shard.allocation_id();
        let shard_id = ShardId::new(uuid::Uuid::nil(), 0);
        let op = Arc::new(EchoReplicaOp {
            calls: Mutex::new(Vec::new()),
        });
        let observer = Arc::new(crate::test_support::TestClusterStateObserver::new(
            crate::routing::ClusterState {
                version: 1,
                nodes: vec![NodeId::new("local")],
                routing_table: Default::default(),
                indices: Default::default(),
                blocks: Default::default(),
            },
        ));
        let action = AsyncReplicaAction {
            local_shards: Arc::new(RegistryOf(shard.clone())),
            replica_op: op.clone(),
            observer,
        };
        action
            .run(
                shard_id,
                alloc,
                PrimaryTerm(3),
                "payload".to_string(),
                std::time::Duration::from_millis(50),
            )
            .await
            .unwrap();
        assert_eq!(op.calls.lock().unwrap().as_slice(), ["payload".to_string()]);
    }

    #[tokio::test]
    async fn replica_action_rejects_mismatched_allocation_id() {
        let shard = Arc::new(TestIndexShard::new_replica(uuid::Uuid::nil(), 0, PrimaryTerm(3)));
        let shard_id = ShardId::new(uuid::Uuid::nil(), 0);
        let op = Arc::new(EchoReplicaOp {
            calls: Mutex::new(Vec::new()),
        });
        let observer = Arc::new(crate::test_support::TestClusterStateObserver::new(
            crate::routing::ClusterState {
                version: 1,
                nodes: vec![NodeId::new("local")],
                routing_table: Default::default(),
                indices: Default::default(),
                blocks: Default::default(),
            },
        ));
        let action = AsyncReplicaAction {
            local_shards: Arc::new(RegistryOf(shard)),
            replica_op: op,
            observer,
        };
        let wrong = AllocationId::new("not-the-one");
        let result = action
            .run(
                shard_id,
                wrong,
                PrimaryTerm(3),
                "payload".to_string(),
                std::time::Duration::from_millis(10),
            )
            .await;
        assert!(matches!(result, Err(ReplicationError::ShardNotFound { .. })));
    }
}
