//! In-memory fakes for the capabilities this crate consumes (§10). Used by
//! this crate's own test suite; exported behind the `test-support` feature
//! so downstream crates (e.g. `barq-api`, once it wires a real `IndexShard`)
//! can reuse them for their own integration tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::error::ReplicationError;
use crate::ids::{AllocationId, NodeId, PrimaryTerm, ShardId};
use crate::lock::OperationLock;
use crate::observer::{ClusterStateObserver, ObservedChange};
use crate::replicas_proxy::{FailShardOutcome, ReplicasProxy};
use crate::routing::{ClusterState, RoutingEntry, ShardRole, ShardRoutingState};
use crate::shard::IndexShard;
use crate::shard_failure::ShardStateAction;

/// A single-node, in-memory `IndexShard` used by unit tests.
pub struct TestIndexShard {
    shard_id: ShardId,
    allocation_id: AllocationId,
    role: Mutex<ShardRole>,
    state: Mutex<ShardRoutingState>,
    term: Mutex<PrimaryTerm>,
    semaphore: Arc<Semaphore>,
    failed: Mutex<Option<String>>,
}

impl TestIndexShard {
    pub fn new_primary(index_uuid: uuid::Uuid, shard: u32, term: PrimaryTerm) -> Self {
        Self::new(index_uuid, shard, term, ShardRole::Primary)
    }

    pub fn new_replica(index_uuid: uuid::Uuid, shard: u32, term: PrimaryTerm) -> Self {
        Self::new(index_uuid, shard, term, ShardRole::Replica)
    }

    fn new(index_uuid: uuid::Uuid, shard: u32, term: PrimaryTerm, role: ShardRole) -> Self {
        Self {
            shard_id: ShardId::new(index_uuid, shard),
            allocation_id: AllocationId::new(format!("alloc-{index_uuid}-{shard}")),
            role: Mutex::new(role),
            state: Mutex::new(ShardRoutingState::Started),
            term: Mutex::new(term),
            semaphore: Arc::new(Semaphore::new(1)),
            failed: Mutex::new(None),
        }
    }

    pub fn shard_id(&self) -> ShardId {
        self.shard_id
    }

    pub fn set_state(&self, state: ShardRoutingState) {
        *self.state.lock().unwrap() = state;
    }

    pub fn set_term(&self, term: PrimaryTerm) {
        *self.term.lock().unwrap() = term;
    }

    pub fn failure_reason(&self) -> Option<String> {
        self.failed.lock().unwrap().clone()
    }
}

#[async_trait]
impl IndexShard for TestIndexShard {
    fn routing_entry(&self) -> RoutingEntry {
        RoutingEntry {
            allocation_id: self.allocation_id.clone(),
            role: *self.role.lock().unwrap(),
            state: *self.state.lock().unwrap(),
            current_node_id: NodeId::new("local"),
            relocating_node_id: None,
            relocation_id: None,
        }
    }

    fn get_primary_term(&self) -> PrimaryTerm {
        *self.term.lock().unwrap()
    }

    async fn acquire_primary_operation_lock(&self) -> Result<OperationLock, ReplicationError> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("semaphore never closed");
        Ok(OperationLock::new(self.shard_id, permit, "primary"))
    }

    async fn acquire_replica_operation_lock(
        &self,
        primary_term: PrimaryTerm,
    ) -> Result<OperationLock, ReplicationError> {
        let local = self.get_primary_term();
        if !primary_term.is_unknown() && primary_term < local {
            return Err(ReplicationError::StaleTerm {
                shard: self.shard_id,
                received: primary_term,
                local,
            });
        }
        if primary_term > local {
            self.set_term(primary_term);
        }
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("semaphore never closed");
        Ok(OperationLock::new(self.shard_id, permit, "replica"))
    }

    fn fail_shard(&self, reason: &str) {
        *self.failed.lock().unwrap() = Some(reason.to_string());
    }
}

/// A `ClusterStateObserver` driven entirely by test code: `push_state`
/// enqueues the next state delivered by `wait_for_next_change`.
#[derive(Default)]
pub struct TestClusterStateObserver {
    current: Mutex<Option<ClusterState>>,
    notify: tokio::sync::Notify,
    timed_out: std::sync::atomic::AtomicBool,
}

impl TestClusterStateObserver {
    pub fn new(initial: ClusterState) -> Self {
        Self {
            current: Mutex::new(Some(initial)),
            notify: tokio::sync::Notify::new(),
            timed_out: std::sync::atomic::AtomicBool::new(false),
        }
    }

    pub fn push_state(&self, state: ClusterState) {
        *self.current.lock().unwrap() = Some(state);
        self.notify.notify_waiters();
    }
}

#[async_trait]
impl ClusterStateObserver for TestClusterStateObserver {
    fn observed_state(&self) -> ClusterState {
        self.current
            .lock()
            .unwrap()
            .clone()
            .expect("observer initialized with a state")
    }

    async fn wait_for_next_change(&self, timeout: Option<Duration>) -> ObservedChange {
        if timeout == Some(Duration::ZERO) {
            self.timed_out
                .store(true, std::sync::atomic::Ordering::Release);
            return ObservedChange::Timeout;
        }
        match timeout {
            Some(duration) => {
                match tokio::time::timeout(duration, self.notify.notified()).await {
                    Ok(()) => ObservedChange::NewState(self.observed_state()),
                    Err(_) => {
                        self.timed_out
                            .store(true, std::sync::atomic::Ordering::Release);
                        ObservedChange::Timeout
                    }
                }
            }
            None => {
                self.notify.notified().await;
                ObservedChange::NewState(self.observed_state())
            }
        }
    }

    fn is_timed_out(&self) -> bool {
        self.timed_out.load(std::sync::atomic::Ordering::Acquire)
    }
}

/// A `ReplicasProxy` whose behavior per node is configured up front.
#[derive(Default)]
pub struct TestReplicasProxy {
    failing_nodes: HashSet<String>,
    demoting_nodes: HashSet<String>,
    stale_nodes: HashSet<String>,
    calls: AtomicUsize,
}

impl TestReplicasProxy {
    pub fn always_succeeds() -> Self {
        Self::default()
    }

    pub fn fails_for(nodes: &[&str]) -> Self {
        Self {
            failing_nodes: nodes.iter().map(|n| n.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn demotes_for(nodes: &[&str]) -> Self {
        Self {
            demoting_nodes: nodes.iter().map(|n| n.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn goes_stale_for(nodes: &[&str]) -> Self {
        Self {
            stale_nodes: nodes.iter().map(|n| n.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Acquire)
    }
}

#[async_trait]
impl ReplicasProxy for TestReplicasProxy {
    async fn perform_on(
        &self,
        replica: &RoutingEntry,
        shard_id: ShardId,
        _primary_term: PrimaryTerm,
        _request: Vec<u8>,
    ) -> Result<(), ReplicationError> {
        self.calls.fetch_add(1, Ordering::AcqRel);
        let node = &replica.current_node_id.0;
        if self.stale_nodes.contains(node) {
            return Err(ReplicationError::ReplicaUnresponsive {
                shard: shard_id,
                node: replica.current_node_id.clone(),
            });
        }
        if self.failing_nodes.contains(node) || self.demoting_nodes.contains(node) {
            return Err(ReplicationError::ShardNotFound {
                shard: shard_id,
                expected: replica.allocation_id.clone(),
                actual: replica.allocation_id.clone(),
            });
        }
        Ok(())
    }

    async fn fail_shard(
        &self,
        replica: &RoutingEntry,
        _shard_id: ShardId,
        _allocation_id: AllocationId,
        primary_term: PrimaryTerm,
        _reason: String,
    ) -> FailShardOutcome {
        if self.demoting_nodes.contains(&replica.current_node_id.0) {
            FailShardOutcome::PrimaryDemoted(primary_term.next())
        } else {
            FailShardOutcome::Acknowledged
        }
    }
}

/// A `ShardStateAction` that just records what it was told.
#[derive(Default)]
pub struct TestShardStateAction {
    reports: Mutex<Vec<(ShardId, AllocationId, String)>>,
}

impl TestShardStateAction {
    pub fn reports(&self) -> Vec<(ShardId, AllocationId, String)> {
        self.reports.lock().unwrap().clone()
    }
}

#[async_trait]
impl ShardStateAction for TestShardStateAction {
    async fn remote_shard_failed(
        &self,
        shard_id: ShardId,
        allocation_id: AllocationId,
        _primary_term: PrimaryTerm,
        reason: String,
    ) -> Result<(), ReplicationError> {
        self.reports
            .lock()
            .unwrap()
            .push((shard_id, allocation_id, reason));
        Ok(())
    }
}
