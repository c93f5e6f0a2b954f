use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::ReplicationError;
use crate::ids::{AllocationId, NodeId, PrimaryTerm, ShardId};
use crate::replicas_proxy::{FailShardOutcome, ReplicaFailureKind, ReplicasProxy};
use crate::request::WaitForActiveShards;
use crate::routing::IndexShardRoutingTable;

/// One replica copy's outcome, exactly one of three per §3 invariant
/// ("A replicated operation's response lists, for each replica copy,
/// exactly one outcome: success, failed-and-removed, or stale-marked").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedReplica {
    pub node_id: NodeId,
    pub allocation_id: AllocationId,
    pub reason: String,
    pub marked_stale: bool,
}

/// Aggregate response attached to the primary's result (§4.3 step 5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardInfo {
    pub total: usize,
    pub successful: usize,
    pub failed: Vec<FailedReplica>,
}

impl ShardInfo {
    /// §8 invariant: `|successful| + |failed| == |replicasTargeted|`.
    pub fn is_consistent(&self) -> bool {
        self.successful + self.failed.len() == self.total
    }
}

/// Capability a user-level response type implements so `AsyncPrimaryAction`
/// can attach the replication outcome before returning to the caller
/// (§4.3 step 5: "assemble a ShardInfo ... and attach it to the primary
/// response").
pub trait HasShardInfo {
    fn set_shard_info(&mut self, info: ShardInfo);
}

/// Drives parallel RPCs to every assigned replica for one primary result,
/// enforces `waitForActiveShards`, detects primary demotion, and assembles
/// the aggregate response (§2, §4.3). Reporting a failed replica to the
/// master (the `ShardStateAction` capability of §6) is the `ReplicasProxy`
/// implementation's own responsibility via `fail_shard`; this type only
/// needs the proxy, not a second handle to the same capability.
pub struct ReplicationOperation<'a> {
    shard_id: ShardId,
    routing_table: &'a IndexShardRoutingTable,
    wait_for_active_shards: WaitForActiveShards,
    execute_on_replicas: bool,
    proxy: Arc<dyn ReplicasProxy>,
    primary_term: PrimaryTerm,
}

impl<'a> ReplicationOperation<'a> {
    pub fn new(
        shard_id: ShardId,
        routing_table: &'a IndexShardRoutingTable,
        wait_for_active_shards: WaitForActiveShards,
        execute_on_replicas: bool,
        proxy: Arc<dyn ReplicasProxy>,
        primary_term: PrimaryTerm,
    ) -> Self {
        Self {
            shard_id,
            routing_table,
            wait_for_active_shards,
            execute_on_replicas,
            proxy,
            primary_term,
        }
    }

    /// Run the replication fan-out and return the aggregate `ShardInfo`,
    /// or a fatal/retryable error if the operation must abort (§4.3).
    #[tracing::instrument(skip(self, replica_payload), fields(shard_id = %self.shard_id))]
    pub async fn execute(&self, replica_payload: Vec<u8>) -> Result<ShardInfo, ReplicationError> {
        let started = std::time::Instant::now();
        let result = self.execute_inner(replica_payload).await;
        crate::metrics::record_operation_duration_ms(
            &self.shard_id,
            started.elapsed().as_secs_f64() * 1000.0,
        );
        result
    }

    async fn execute_inner(&self, replica_payload: Vec<u8>) -> Result<ShardInfo, ReplicationError> {
        // §4.3 step 2: wait-for-active-shards is checked *before* issuing
        // any replica RPC.
        let total_configured = 1 + self.routing_table.replicas.len();
        let required = self.wait_for_active_shards.required(total_configured);
        let active = self.routing_table.total_active_copies();
        if active < required {
            return Err(ReplicationError::UnavailableShards {
                shard: self.shard_id,
                last_observed_version: 0,
            });
        }

        // Shadow replicas skip data replication entirely (§4.2 step 4,
        // §12 "Shadow-replica skip flag").
        if !self.execute_on_replicas {
            return Ok(ShardInfo {
                total: 0,
                successful: 0,
                failed: Vec::new(),
            });
        }

        let targets: Vec<_> = self.routing_table.replication_targets().cloned().collect();
        let total = targets.len();
        let outstanding = Arc::new(AtomicUsize::new(total));
        crate::metrics::record_in_flight_replicas(&self.shard_id, total);

        info!(shard = %self.shard_id, replicas = total, "dispatching replica RPCs");

        let futures = targets.into_iter().map(|replica| {
            let proxy = self.proxy.clone();
            let shard_id = self.shard_id;
            let primary_term = self.primary_term;
            let payload = replica_payload.clone();
            let outstanding = outstanding.clone();
            async move {
                let result = proxy.perform_on(&replica, shard_id, primary_term, payload).await;
                let remaining = outstanding.fetch_sub(1, Ordering::AcqRel) - 1;
                crate::metrics::record_in_flight_replicas(&shard_id, remaining);
                (replica, result)
            }
        });

        let outcomes = join_all(futures).await;

        let mut successful = 0usize;
        let mut failed = Vec::new();

        for (replica, result) in outcomes {
            match result {
                Ok(()) => successful += 1,
                Err(err) => {
                    let kind = ReplicaFailureKind::classify(&err);
                    crate::metrics::record_replica_failure(&self.shard_id);
                    warn!(
                        shard = %self.shard_id,
                        node = %replica.current_node_id,
                        error = %err,
                        "replica RPC failed"
                    );
                    let outcome = self
                        .proxy
                        .fail_shard(
                            &replica,
                            self.shard_id,
                            replica.allocation_id.clone(),
                            self.primary_term,
                            err.to_string(),
                        )
                        .await;

                    match outcome {
                        FailShardOutcome::PrimaryDemoted(term) => {
                            // §4.3 tie-break: the whole operation fails
                            // upward so ReroutePhase can retry against the
                            // new primary.
                            return Err(ReplicationError::NoLongerPrimary {
                                shard: self.shard_id,
                                term,
                            });
                        }
                        FailShardOutcome::Acknowledged | FailShardOutcome::Ignored => {
                            failed.push(FailedReplica {
                                node_id: replica.current_node_id.clone(),
                                allocation_id: replica.allocation_id.clone(),
                                reason: err.to_string(),
                                marked_stale: kind == ReplicaFailureKind::MarkStale,
                            });
                        }
                    }
                }
            }
        }

        debug_assert_eq!(outstanding.load(Ordering::Acquire), 0);

        let info = ShardInfo {
            total,
            successful,
            failed,
        };
        debug_assert!(info.is_consistent());
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::AllocationId;
    use crate::routing::{RoutingEntry, ShardRole, ShardRoutingState};
    use crate::test_support::TestReplicasProxy;

    fn routing_entry(node: &str, state: ShardRoutingState) -> RoutingEntry {
        RoutingEntry {
            allocation_id: AllocationId::new(format!("alloc-{node}")),
            role: ShardRole::Replica,
            state,
            current_node_id: NodeId::new(node),
            relocating_node_id: None,
            relocation_id: None,
        }
    }

    fn table(replicas: Vec<RoutingEntry>) -> IndexShardRoutingTable {
        IndexShardRoutingTable {
            shard_id: ShardId::new(uuid::Uuid::nil(), 0),
            primary: routing_entry("n0", ShardRoutingState::Started),
            replicas,
        }
    }

    #[tokio::test]
    async fn happy_path_replicates_to_every_started_copy() {
        let table = table(vec![routing_entry("n1", ShardRoutingState::Started)]);
        let proxy = Arc::new(TestReplicasProxy::always_succeeds());
        let op = ReplicationOperation::new(
            table.shard_id,
            &table,
            WaitForActiveShards::All,
            true,
            proxy,
            PrimaryTerm(1),
        );
        let info = op.execute(b"payload".to_vec()).await.unwrap();
        assert_eq!(info.total, 1);
        assert_eq!(info.successful, 1);
        assert!(info.failed.is_empty());
    }

    #[tokio::test]
    async fn replica_failure_is_reported_but_request_still_succeeds() {
        let table = table(vec![routing_entry("n1", ShardRoutingState::Started)]);
        let proxy = Arc::new(TestReplicasProxy::fails_for(&["n1"]));
        let op = ReplicationOperation::new(
            table.shard_id,
            &table,
            WaitForActiveShards::One,
            true,
            proxy,
            PrimaryTerm(1),
        );
        let info = op.execute(b"payload".to_vec()).await.unwrap();
        assert_eq!(info.total, 1);
        assert_eq!(info.successful, 0);
        assert_eq!(info.failed.len(), 1);
    }

    #[tokio::test]
    async fn unresponsive_replica_is_reported_as_marked_stale() {
        let table = table(vec![routing_entry("n1", ShardRoutingState::Started)]);
        let proxy = Arc::new(TestReplicasProxy::goes_stale_for(&["n1"]));
        let op = ReplicationOperation::new(
            table.shard_id,
            &table,
            WaitForActiveShards::One,
            true,
            proxy,
            PrimaryTerm(1),
        );
        let info = op.execute(b"payload".to_vec()).await.unwrap();
        assert_eq!(info.failed.len(), 1);
        assert!(info.failed[0].marked_stale);
    }

    #[tokio::test]
    async fn primary_demotion_mid_replication_fails_the_whole_operation() {
        let table = table(vec![routing_entry("n1", ShardRoutingState::Started)]);
        let proxy = Arc::new(TestReplicasProxy::demotes_for(&["n1"]));
        let op = ReplicationOperation::new(
            table.shard_id,
            &table,
            WaitForActiveShards::One,
            true,
            proxy,
            PrimaryTerm(1),
        );
        let result = op.execute(b"payload".to_vec()).await;
        assert!(matches!(result, Err(ReplicationError::NoLongerPrimary { .. })));
    }

    #[tokio::test]
    async fn wait_for_all_fails_before_any_replica_rpc_when_one_is_unassigned() {
        let table = table(vec![routing_entry("n1", ShardRoutingState::Unassigned)]);
        let proxy = Arc::new(TestReplicasProxy::always_succeeds());
        let op = ReplicationOperation::new(
            table.shard_id,
            &table,
            WaitForActiveShards::All,
            true,
            proxy.clone(),
            PrimaryTerm(1),
        );
        let result = op.execute(b"payload".to_vec()).await;
        assert!(matches!(
            result,
            Err(ReplicationError::UnavailableShards { .. })
        ));
        assert_eq!(proxy.calls(), 0);
    }

    #[tokio::test]
    async fn shadow_replicas_skip_replication_entirely() {
        let table = table(vec![routing_entry("n1", ShardRoutingState::Started)]);
        let proxy = Arc::new(TestReplicasProxy::always_succeeds());
        let op = ReplicationOperation::new(
            table.shard_id,
            &table,
            WaitForActiveShards::None,
            false,
            proxy.clone(),
            PrimaryTerm(1),
        );
        let info = op.execute(b"payload".to_vec()).await.unwrap();
        assert_eq!(info.total, 0);
        assert_eq!(proxy.calls(), 0);
    }
}
