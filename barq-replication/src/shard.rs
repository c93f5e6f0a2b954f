use async_trait::async_trait;

use crate::error::ReplicationError;
use crate::ids::{AllocationId, PrimaryTerm};
use crate::lock::OperationLock;
use crate::routing::{RoutingEntry, ShardRoutingState};

/// The per-shard storage-engine capability this core consumes (§6,
/// "IndexShard capability"). The storage engine (Lucene-like index) is out
/// of scope; this trait is its interface as seen from the replication core.
#[async_trait]
pub trait IndexShard: Send + Sync {
    fn routing_entry(&self) -> RoutingEntry;

    fn state(&self) -> ShardRoutingState {
        self.routing_entry().state
    }

    fn allocation_id(&self) -> AllocationId {
        self.routing_entry().allocation_id
    }

    fn get_primary_term(&self) -> PrimaryTerm;

    /// Grants a scoped permit that also blocks primary-term advancement
    /// and relocation hand-off while any permits are out (§4.5). A
    /// `primaryTerm` of `UNKNOWN` is accepted speculatively; the term
    /// observed at lock time is trusted.
    async fn acquire_primary_operation_lock(&self) -> Result<OperationLock, ReplicationError>;

    /// Same shape as the primary lock, plus term validation: terms lower
    /// than the shard's known term are rejected (§4.4 step 2).
    async fn acquire_replica_operation_lock(
        &self,
        primary_term: PrimaryTerm,
    ) -> Result<OperationLock, ReplicationError>;

    /// Report this copy to the master as failed, e.g. because of a fatal
    /// local error independent of replication (§6, `IndexShard::failShard`).
    fn fail_shard(&self, reason: &str);
}

/// Result of running the user-supplied primary operation: the request to
/// forward to replicas, and the response to hand back to the caller on
/// success (§4.2 step 3). `replica_request` may itself be a no-op marker
/// (e.g. the write was already applied) — replaying such a request must be
/// a no-op on every replica (§8 round-trip law); that's a property of the
/// concrete `ReplicaRequest` type, not of this wrapper.
pub struct PrimaryResult<ReplicaRequest, Response> {
    pub replica_request: ReplicaRequest,
    pub response: Response,
}

impl<ReplicaRequest, Response> PrimaryResult<ReplicaRequest, Response> {
    pub fn new(replica_request: ReplicaRequest, response: Response) -> Self {
        Self {
            replica_request,
            response,
        }
    }
}

/// User-supplied domain operation executed with the primary operation lock
/// held (§4.2 step 3): index a document, delete, bulk write, refresh,
/// flush, etc.
#[async_trait]
pub trait ShardOperationOnPrimary: Send + Sync {
    type Request: Send;
    type ReplicaRequest: Clone + Send;
    type Response: Send;

    async fn execute(
        &self,
        request: Self::Request,
        shard: &dyn IndexShard,
    ) -> Result<PrimaryResult<Self::ReplicaRequest, Self::Response>, ReplicationError>;
}

/// User-supplied domain operation executed with the replica operation lock
/// held (§4.4 step 3).
#[async_trait]
pub trait ShardOperationOnReplica: Send + Sync {
    type ReplicaRequest: Send;

    async fn execute(
        &self,
        request: Self::ReplicaRequest,
        shard: &dyn IndexShard,
    ) -> Result<(), ReplicationError>;
}
