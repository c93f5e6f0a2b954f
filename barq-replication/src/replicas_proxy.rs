use async_trait::async_trait;

use crate::error::ReplicationError;
use crate::ids::{AllocationId, PrimaryTerm, ShardId};
use crate::routing::RoutingEntry;

/// How a replica failure should be classified before reporting it (§4.3
/// step 4, §12 "Stale-copy marking").
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ReplicaFailureKind {
    /// `ShardNotFoundException` / allocation-id mismatch: the copy has
    /// been reallocated out from under us.
    ShardNotFound,
    /// Any transient connect/I-O failure reaching the replica.
    Transient,
    /// The replica responded but reported its own copy unusable.
    MarkStale,
}

impl ReplicaFailureKind {
    pub fn classify(error: &ReplicationError) -> Self {
        match error {
            ReplicationError::ShardNotFound { .. } => ReplicaFailureKind::ShardNotFound,
            ReplicationError::ReplicaUnresponsive { .. } => ReplicaFailureKind::MarkStale,
            ReplicationError::ConnectTransport(_) => ReplicaFailureKind::Transient,
            _ => ReplicaFailureKind::Transient,
        }
    }
}

/// Outcome of asking the master to fail a replica copy (§4.3 step 4): the
/// three callbacks of the source system collapsed into one return value
/// since this core uses async/await instead of callback registration.
#[derive(Debug)]
pub enum FailShardOutcome {
    /// The master acknowledged the replica is out.
    Acknowledged,
    /// The master told us we are no longer primary; abandon the operation.
    PrimaryDemoted(PrimaryTerm),
    /// Failure during shutdown or similar — ignorable.
    Ignored,
}

/// Fire-and-track replica RPCs, and report replica failures or stale
/// copies back to the master (§2, component "ReplicasProxy").
#[async_trait]
pub trait ReplicasProxy: Send + Sync {
    /// Dispatch `request` (the serialized inner replica-request payload) to
    /// one replica copy under `primary_term`. A real implementation wraps
    /// `request` together with `replica.allocation_id` and `primary_term`
    /// in the `ConcreteShardRequest<R>` envelope (`wire.rs`) before putting
    /// it on the transport, so the receiving `AsyncReplicaAction` can
    /// enforce §3's "a replica never accepts a request whose
    /// primaryTerm < self.primaryTerm" invariant.
    async fn perform_on(
        &self,
        replica: &RoutingEntry,
        shard_id: ShardId,
        primary_term: PrimaryTerm,
        request: Vec<u8>,
    ) -> Result<(), ReplicationError>;

    /// Ask the master to fail this replica copy. Does not block
    /// replication on acknowledgement (§4.3 step 5).
    async fn fail_shard(
        &self,
        replica: &RoutingEntry,
        shard_id: ShardId,
        allocation_id: AllocationId,
        primary_term: PrimaryTerm,
        reason: String,
    ) -> FailShardOutcome;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_shard_not_found_distinctly_from_transient() {
        let shard = ShardId::new(uuid::Uuid::nil(), 0);
        let not_found = ReplicationError::ShardNotFound {
            shard,
            expected: AllocationId::new("a"),
            actual: AllocationId::new("b"),
        };
        assert_eq!(
            ReplicaFailureKind::classify(&not_found),
            ReplicaFailureKind::ShardNotFound
        );

        let transient = ReplicationError::ConnectTransport(crate::ids::NodeId::new("n1"));
        assert_eq!(
            ReplicaFailureKind::classify(&transient),
            ReplicaFailureKind::Transient
        );

        let unresponsive = ReplicationError::ReplicaUnresponsive {
            shard,
            node: crate::ids::NodeId::new("n2"),
        };
        assert_eq!(
            ReplicaFailureKind::classify(&unresponsive),
            ReplicaFailureKind::MarkStale
        );
    }
}
