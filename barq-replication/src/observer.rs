use std::time::Duration;

use async_trait::async_trait;

use crate::routing::ClusterState;

/// Result of waiting for the next cluster-state change (§6
/// `ClusterStateObserver` capability; §9 design note: modeled as a
/// subscription yielding one of three outcomes rather than three separate
/// callbacks).
#[derive(Debug)]
pub enum ObservedChange {
    NewState(ClusterState),
    Timeout,
    Closed,
}

/// Read-only capability over the (externally owned) cluster-state gossip
/// service. `ReroutePhase` is the only consumer.
#[async_trait]
pub trait ClusterStateObserver: Send + Sync {
    fn observed_state(&self) -> ClusterState;

    /// Suspend until the next cluster-state change, `timeout` elapses, or
    /// the node is shutting down. `timeout = Some(Duration::ZERO)` means
    /// "do not wait" — the first routing failure becomes terminal (§8
    /// boundary behavior).
    async fn wait_for_next_change(&self, timeout: Option<Duration>) -> ObservedChange;

    fn is_timed_out(&self) -> bool;
}
