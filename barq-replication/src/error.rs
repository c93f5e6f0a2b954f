use thiserror::Error;

use crate::ids::{AllocationId, NodeId, PrimaryTerm, ShardId};

/// Errors the replication core can raise. Every variant that reaches the
/// caller carries enough context (shard id, last-observed cluster version
/// where relevant) to act on without re-deriving it from logs, per §7's
/// "user-visible failures" requirement.
#[derive(Debug, Error)]
pub enum ReplicationError {
    #[error("index {0:?} not found")]
    IndexNotFound(String),

    #[error("index {0:?} is closed")]
    IndexClosed(String),

    #[error("cluster blocked: {0}")]
    ClusterBlocked(String),

    #[error("no active primary available for shard {shard}, last observed cluster version {last_observed_version}")]
    UnavailableShards {
        shard: ShardId,
        last_observed_version: u64,
    },

    #[error("shard {shard} not found: allocation {expected} does not match local {actual}")]
    ShardNotFound {
        shard: ShardId,
        expected: AllocationId,
        actual: AllocationId,
    },

    #[error("local copy of shard {0} is a replica; retry against the primary")]
    RetryOnPrimary(ShardId),

    #[error("shard {0} must be replayed once cluster state advances")]
    RetryOnReplica(ShardId),

    #[error("primary of shard {shard} was demoted at term {term}; no longer primary")]
    NoLongerPrimary { shard: ShardId, term: PrimaryTerm },

    #[error("node is shutting down")]
    NodeClosed,

    #[error("shard {shard} rejected term {received}: local term is {local}")]
    StaleTerm {
        shard: ShardId,
        received: PrimaryTerm,
        local: PrimaryTerm,
    },

    #[error("connection to node {0:?} failed")]
    ConnectTransport(NodeId),

    #[error("replica copy of shard {shard} on {node:?} stopped responding; marking stale")]
    ReplicaUnresponsive { shard: ShardId, node: NodeId },

    #[error("relocation target {target:?} runs a newer major version than this node")]
    RelocationVersionMismatch { target: NodeId },

    #[error("operation lock already released for shard {0}")]
    DoubleRelease(ShardId),

    #[error("wire codec error: {0}")]
    Wire(#[from] crate::wire::WireError),

    #[error("request retry exhausted for shard {shard}: {message}")]
    RetryExhausted { shard: ShardId, message: String },

    #[error("{0}")]
    Other(String),
}

impl ReplicationError {
    /// §7 kind (1): routing-stale — retried by `ClusterStateObserver.waitForNextChange`.
    pub fn is_routing_retryable(&self) -> bool {
        matches!(
            self,
            ReplicationError::IndexNotFound(_)
                | ReplicationError::UnavailableShards { .. }
                | ReplicationError::ConnectTransport(_)
        )
    }

    /// §7 kind (2)/(4): primary-retry and demotion both re-enter routing.
    pub fn is_primary_retryable(&self) -> bool {
        matches!(
            self,
            ReplicationError::RetryOnPrimary(_) | ReplicationError::NoLongerPrimary { .. }
        )
    }

    /// §7 kind (3): replica-retry — re-dispatch the same replica RPC after
    /// the next cluster-state change, without touching routing.
    pub fn is_replica_retryable(&self) -> bool {
        matches!(self, ReplicationError::RetryOnReplica(_))
    }

    /// §7 kind (6): a retryable cluster/index block.
    pub fn is_block_retryable(&self, retryable: bool) -> bool {
        matches!(self, ReplicationError::ClusterBlocked(_)) && retryable
    }

    /// Short, metric-label-friendly name for the retry cause (§9 second
    /// Open Question's classification list, reused for the `reason` label
    /// on `replication_retries_total`).
    pub fn retry_reason(&self) -> &'static str {
        match self {
            ReplicationError::IndexNotFound(_) => "index_not_found",
            ReplicationError::UnavailableShards { .. } => "unavailable_shards",
            ReplicationError::ConnectTransport(_) => "connect_transport",
            ReplicationError::RetryOnPrimary(_) => "retry_on_primary",
            ReplicationError::NoLongerPrimary { .. } => "no_longer_primary",
            ReplicationError::RetryOnReplica(_) => "retry_on_replica",
            ReplicationError::ClusterBlocked(_) => "cluster_blocked",
            _ => "other",
        }
    }

    pub fn shard_id(&self) -> Option<ShardId> {
        match self {
            ReplicationError::UnavailableShards { shard, .. }
            | ReplicationError::ShardNotFound { shard, .. }
            | ReplicationError::RetryOnPrimary(shard)
            | ReplicationError::RetryOnReplica(shard)
            | ReplicationError::NoLongerPrimary { shard, .. }
            | ReplicationError::StaleTerm { shard, .. }
            | ReplicationError::DoubleRelease(shard)
            | ReplicationError::ReplicaUnresponsive { shard, .. }
            | ReplicationError::RetryExhausted { shard, .. } => Some(*shard),
            _ => None,
        }
    }
}

/// Tagged outcome replacing exception-based control flow (§9 design note:
/// "Exceptions for control flow"). `Fatal` finishes the request exactly
/// once; the `Retry*` variants re-enter the state machine per §7.
#[derive(Debug)]
pub enum OperationOutcome<R> {
    Ok(R),
    RetryPrimary(ReplicationError),
    RetryReplica(ReplicationError),
    Fatal(ReplicationError),
}

impl<R> OperationOutcome<R> {
    pub fn is_ok(&self) -> bool {
        matches!(self, OperationOutcome::Ok(_))
    }

    pub fn into_result(self) -> Result<R, ReplicationError> {
        match self {
            OperationOutcome::Ok(r) => Ok(r),
            OperationOutcome::RetryPrimary(e)
            | OperationOutcome::RetryReplica(e)
            | OperationOutcome::Fatal(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_routing_stale_causes() {
        assert!(ReplicationError::IndexNotFound("logs".into()).is_routing_retryable());
        assert!(ReplicationError::ConnectTransport(NodeId::new("n1")).is_routing_retryable());
        assert!(!ReplicationError::NodeClosed.is_routing_retryable());
    }

    #[test]
    fn classifies_primary_retry_and_demotion_together() {
        let shard = ShardId::new(uuid::Uuid::nil(), 0);
        assert!(ReplicationError::RetryOnPrimary(shard).is_primary_retryable());
        assert!(ReplicationError::NoLongerPrimary {
            shard,
            term: PrimaryTerm(3)
        }
        .is_primary_retryable());
        assert!(!ReplicationError::RetryOnReplica(shard).is_primary_retryable());
    }

    #[test]
    fn outcome_converts_to_result() {
        let ok: OperationOutcome<u32> = OperationOutcome::Ok(7);
        assert_eq!(ok.into_result().unwrap(), 7);

        let shard = ShardId::new(uuid::Uuid::nil(), 1);
        let retry: OperationOutcome<u32> =
            OperationOutcome::RetryPrimary(ReplicationError::RetryOnPrimary(shard));
        assert!(retry.into_result().is_err());
    }
}
