//! Core write-replication state machine for a sharded, leader-per-shard
//! cluster: routes a write to the current primary, runs it there, and
//! fans it out to replica copies before acknowledging the caller.
//!
//! The storage engine, transport layer, and cluster-state gossip service
//! are all out of scope here (§1) — this crate consumes them through the
//! capability traits in [`shard`], [`action`], and [`observer`].

mod action;
mod config;
mod error;
mod ids;
mod lock;
mod metrics;
mod observer;
mod primary_reference;
mod replicas_proxy;
mod replication_operation;
mod request;
mod routing;
mod shard;
mod shard_failure;
mod wire;

#[cfg(feature = "test-support")]
pub mod test_support;

pub use action::{
    AsyncReplicaAction, LocalShardRegistry, ReplicationAction, ResolveRequest, Transport,
};
pub use config::{ConfigError, ReplicationSettings, TransportPriority};
pub use error::{OperationOutcome, ReplicationError};
pub use ids::{AllocationId, NodeId, PrimaryTerm, ShardId};
pub use lock::OperationLock;
pub use observer::{ClusterStateObserver, ObservedChange};
pub use primary_reference::PrimaryShardReference;
pub use replicas_proxy::{FailShardOutcome, ReplicaFailureKind, ReplicasProxy};
pub use replication_operation::{FailedReplica, HasShardInfo, ReplicationOperation, ShardInfo};
pub use request::{
    HasPrimaryTerm, HasRoutingWatermark, HasShardId, HasTimeout, HasWaitForActiveShards,
    ReplicationRequest, WaitForActiveShards,
};
pub use routing::{
    BlockLevel, ClusterBlock, ClusterBlocks, ClusterState, IndexMetadata, IndexShardRoutingTable,
    RoutingEntry, ShardRole, ShardRoutingState,
};
pub use shard::{IndexShard, PrimaryResult, ShardOperationOnPrimary, ShardOperationOnReplica};
pub use shard_failure::ShardStateAction;
pub use wire::{ConcreteShardRequest, InnerPrimaryTerm, ProtocolVersion, WireError};
