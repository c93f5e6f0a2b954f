use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::OwnedSemaphorePermit;
use tracing::warn;

use crate::ids::ShardId;

/// Scoped, exclusive hold on a shard's primary or replica operation
/// permit. Releasing twice is a bug (§4.5): debug builds assert, release
/// builds log and swallow (§9 design note "Double-completion guard" —
/// the same pattern applies here).
pub struct OperationLock {
    shard_id: ShardId,
    permit: Option<OwnedSemaphorePermit>,
    released: Arc<AtomicBool>,
    kind: &'static str,
}

impl OperationLock {
    pub(crate) fn new(shard_id: ShardId, permit: OwnedSemaphorePermit, kind: &'static str) -> Self {
        Self {
            shard_id,
            permit: Some(permit),
            released: Arc::new(AtomicBool::new(false)),
            kind,
        }
    }

    /// Release the permit exactly once. Safe to call explicitly; `Drop`
    /// calls it again, harmlessly, if the caller didn't.
    pub fn release(&mut self) {
        if self.released.swap(true, Ordering::AcqRel) {
            debug_assert!(false, "operation lock for shard {} released twice", self.shard_id);
            warn!(shard = %self.shard_id, kind = self.kind, "operation lock released twice");
            return;
        }
        self.permit.take();
    }

    pub fn shard_id(&self) -> ShardId {
        self.shard_id
    }
}

impl Drop for OperationLock {
    fn drop(&mut self) {
        if !self.released.load(Ordering::Acquire) {
            self.release();
        }
    }
}
