use async_trait::async_trait;

use crate::error::ReplicationError;
use crate::ids::{AllocationId, PrimaryTerm, ShardId};

/// The shard-state reporting subsystem this core consumes (§6
/// `ShardStateAction` capability). How a failed replica is reported to the
/// master is out of scope; this is its interface.
#[async_trait]
pub trait ShardStateAction: Send + Sync {
    /// Tell the master a replica copy should be failed/removed. The
    /// returned `Ok(())` means the master acknowledged the report, not
    /// that replication waited for it — `ReplicationOperation` never
    /// blocks on this (§4.3 step 5).
    async fn remote_shard_failed(
        &self,
        shard_id: ShardId,
        allocation_id: AllocationId,
        primary_term: PrimaryTerm,
        reason: String,
    ) -> Result<(), ReplicationError>;
}
