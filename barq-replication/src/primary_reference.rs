use std::sync::Arc;

use crate::error::ReplicationError;
use crate::ids::{AllocationId, PrimaryTerm};
use crate::lock::OperationLock;
use crate::routing::{RoutingEntry, ShardRoutingState};
use crate::shard::{IndexShard, PrimaryResult, ShardOperationOnPrimary};

/// Scoped exclusive hold on the primary copy's operation lock. At most one
/// instance exists per `(shardId, primaryTerm)` at any time (§3 invariant);
/// enforced by the underlying `acquire_primary_operation_lock` semaphore.
pub struct PrimaryShardReference {
    shard: Arc<dyn IndexShard>,
    lock: Option<OperationLock>,
    routing_entry: RoutingEntry,
    primary_term: PrimaryTerm,
}

impl PrimaryShardReference {
    /// Acquire the lock and validate identity per §4.2 step 1: the local
    /// shard must still be primary, its allocation id must match
    /// `target_allocation_id`, and its term must match `primary_term`
    /// unless the caller passed `UNKNOWN` (accepted speculatively; the
    /// term observed at lock time is trusted).
    pub async fn acquire(
        shard: Arc<dyn IndexShard>,
        target_allocation_id: &AllocationId,
        primary_term: PrimaryTerm,
    ) -> Result<Self, ReplicationError> {
        let lock = shard.acquire_primary_operation_lock().await?;
        let routing_entry = shard.routing_entry();
        let shard_id = lock.shard_id();

        if routing_entry.role != crate::routing::ShardRole::Primary {
            return Err(ReplicationError::RetryOnPrimary(shard_id));
        }
        if routing_entry.allocation_id != *target_allocation_id {
            return Err(ReplicationError::ShardNotFound {
                shard: shard_id,
                expected: target_allocation_id.clone(),
                actual: routing_entry.allocation_id,
            });
        }

        let observed_term = shard.get_primary_term();
        if !primary_term.is_unknown() && observed_term != primary_term {
            return Err(ReplicationError::ShardNotFound {
                shard: shard_id,
                expected: target_allocation_id.clone(),
                actual: routing_entry.allocation_id,
            });
        }

        Ok(Self {
            shard,
            lock: Some(lock),
            routing_entry,
            primary_term: observed_term,
        })
    }

    pub fn routing_entry(&self) -> &RoutingEntry {
        &self.routing_entry
    }

    pub fn primary_term(&self) -> PrimaryTerm {
        self.primary_term
    }

    pub fn is_relocated(&self) -> bool {
        self.routing_entry.state == ShardRoutingState::Relocated
    }

    /// Run the user's primary operation with the lock held (§4.2 step 3).
    pub async fn perform<Op>(
        &self,
        op: &Op,
        request: Op::Request,
    ) -> Result<PrimaryResult<Op::ReplicaRequest, Op::Response>, ReplicationError>
    where
        Op: ShardOperationOnPrimary,
    {
        op.execute(request, self.shard.as_ref()).await
    }

    pub fn fail_shard(&self, reason: &str) {
        self.shard.fail_shard(reason);
    }

    /// Release the lock, e.g. for the relocation-handoff path (§4.2 step
    /// 2) where the lock must be dropped before forwarding. All other
    /// exit paths release via `Drop`.
    pub fn release(&mut self) {
        if let Some(mut lock) = self.lock.take() {
            lock.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestIndexShard;
    use std::sync::Arc as StdArc;

    #[tokio::test]
    async fn acquire_rejects_mismatched_allocation_id() {
        let shard = StdArc::new(TestIndexShard::new_primary(uuid::Uuid::nil(), 0, PrimaryTerm(1)));
        let wrong = AllocationId::new("not-the-one");
        let result = PrimaryShardReference::acquire(shard, &wrong, PrimaryTerm(1)).await;
        assert!(matches!(
            result,
            Err(ReplicationError::ShardNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn acquire_rejects_replica_local_shard() {
        let shard = StdArc::new(TestIndexShard::new_replica(uuid::Uuid::nil(), 0, PrimaryTerm(1)));
        let alloc = shard.allocation_id();
        let result = PrimaryShardReference::acquire(shard, &alloc, PrimaryTerm(1)).await;
        assert!(matches!(result, Err(ReplicationError::RetryOnPrimary(_))));
    }

    #[tokio::test]
    async fn acquire_accepts_unknown_term_speculatively() {
        let shard = StdArc::new(TestIndexShard::new_primary(uuid::Uuid::nil(), 0, PrimaryTerm(5)));
        let alloc = shard.allocation_id();
        let reference = PrimaryShardReference::acquire(shard, &alloc, PrimaryTerm::UNKNOWN)
            .await
            .unwrap();
        assert_eq!(reference.primary_term(), PrimaryTerm(5));
    }

    #[tokio::test]
    async fn only_one_reference_can_be_held_at_a_time() {
        let shard = StdArc::new(TestIndexShard::new_primary(uuid::Uuid::nil(), 0, PrimaryTerm(1)));
        let alloc = shard.allocation_id();
        let _first = PrimaryShardReference::acquire(shard.clone(), &alloc, PrimaryTerm(1))
            .await
            .unwrap();

        let second = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            PrimaryShardReference::acquire(shard, &alloc, PrimaryTerm(1)),
        )
        .await;
        assert!(second.is_err(), "second acquire should block while the first is held");
    }
}
