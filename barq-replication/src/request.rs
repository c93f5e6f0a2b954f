use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ids::{PrimaryTerm, ShardId};

/// Gate on the number of `STARTED` copies before replication proceeds.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum WaitForActiveShards {
    /// Not yet resolved; `ReroutePhase::resolveRequest` must fill this in
    /// from index settings before the request is valid.
    Default,
    None,
    One,
    All,
    Count(u32),
}

impl WaitForActiveShards {
    /// Number of active copies (including the primary) required, given the
    /// total configured copies for the shard.
    pub fn required(self, total_configured_copies: usize) -> usize {
        match self {
            WaitForActiveShards::Default => 1,
            WaitForActiveShards::None => 0,
            WaitForActiveShards::One => 1,
            WaitForActiveShards::All => total_configured_copies,
            WaitForActiveShards::Count(n) => n as usize,
        }
    }
}

/// Capability traits replacing the Request/ReplicaRequest/Response
/// inheritance hierarchy of the source system (§9 design note): each
/// payload type implements only the capabilities it actually carries.
pub trait HasShardId {
    fn shard_id(&self) -> Option<ShardId>;
    fn set_shard_id(&mut self, shard_id: ShardId);
}

pub trait HasPrimaryTerm {
    fn primary_term(&self) -> PrimaryTerm;
    fn set_primary_term(&mut self, term: PrimaryTerm);
}

pub trait HasTimeout {
    fn timeout(&self) -> Duration;
}

pub trait HasWaitForActiveShards {
    fn wait_for_active_shards(&self) -> WaitForActiveShards;
    fn set_wait_for_active_shards(&mut self, wait: WaitForActiveShards);
}

/// Hop-prevention watermark capability (§3 invariant, §8 boundary scenario
/// 5, §12 "routedBasedOnClusterVersion watermark helper"): lets
/// `ReroutePhase` detect that the locally observed cluster state is older
/// than what the sender already knew, and wait for it to catch up instead
/// of routing on stale information.
pub trait HasRoutingWatermark {
    fn bump_watermark(&mut self, observed_version: u64);
    fn is_stale_against(&self, observed_version: u64) -> bool;
}

/// The user-level write request as it travels through the state machine:
/// payload plus the routing/identity/retry fields §3 requires.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReplicationRequest<P> {
    pub payload: P,
    pub shard_id: Option<ShardId>,
    pub timeout: Duration,
    pub wait_for_active_shards: WaitForActiveShards,
    pub primary_term: PrimaryTerm,
    /// Hop-prevention watermark: the cluster-state version the sender had
    /// observed when it last routed this request. Non-decreasing along any
    /// retry chain for a single client request (§3 invariant, §8 boundary
    /// scenario 5).
    pub routed_based_on_cluster_version: u64,
    pub retries: u32,
}

impl<P> ReplicationRequest<P> {
    pub fn new(payload: P, timeout: Duration) -> Self {
        Self {
            payload,
            shard_id: None,
            timeout,
            wait_for_active_shards: WaitForActiveShards::Default,
            primary_term: PrimaryTerm::UNKNOWN,
            routed_based_on_cluster_version: 0,
            retries: 0,
        }
    }

    /// Returns `true` if `new_version` would move the watermark backward,
    /// meaning the receiver is staler than the sender and should retry
    /// (§4.1 step 7, §8 scenario 5).
    pub fn is_stale_against(&self, observed_version: u64) -> bool {
        observed_version < self.routed_based_on_cluster_version
    }

    /// Advance the watermark; never moves it backward (§3 invariant).
    pub fn bump_watermark(&mut self, observed_version: u64) {
        self.routed_based_on_cluster_version =
            self.routed_based_on_cluster_version.max(observed_version);
    }

    pub fn record_retry(&mut self) {
        self.retries += 1;
    }
}

impl<P> HasShardId for ReplicationRequest<P> {
    fn shard_id(&self) -> Option<ShardId> {
        self.shard_id
    }

    fn set_shard_id(&mut self, shard_id: ShardId) {
        self.shard_id = Some(shard_id);
    }
}

impl<P> HasPrimaryTerm for ReplicationRequest<P> {
    fn primary_term(&self) -> PrimaryTerm {
        self.primary_term
    }

    fn set_primary_term(&mut self, term: PrimaryTerm) {
        self.primary_term = term;
    }
}

impl<P> HasTimeout for ReplicationRequest<P> {
    fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl<P> HasWaitForActiveShards for ReplicationRequest<P> {
    fn wait_for_active_shards(&self) -> WaitForActiveShards {
        self.wait_for_active_shards
    }

    fn set_wait_for_active_shards(&mut self, wait: WaitForActiveShards) {
        self.wait_for_active_shards = wait;
    }
}

impl<P> HasRoutingWatermark for ReplicationRequest<P> {
    fn bump_watermark(&mut self, observed_version: u64) {
        ReplicationRequest::bump_watermark(self, observed_version);
    }

    fn is_stale_against(&self, observed_version: u64) -> bool {
        ReplicationRequest::is_stale_against(self, observed_version)
    }
}
