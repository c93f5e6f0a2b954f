use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::ids::{AllocationId, NodeId, PrimaryTerm, ShardId};

/// Role a shard copy plays in its replication group.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum ShardRole {
    Primary,
    Replica,
}

/// Lifecycle state of one shard copy, as reported by the cluster-state service.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum ShardRoutingState {
    Unassigned,
    Initializing,
    Started,
    Relocated,
}

/// The cluster-state record describing where, and in what state, one shard
/// copy lives.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RoutingEntry {
    pub allocation_id: AllocationId,
    pub role: ShardRole,
    pub state: ShardRoutingState,
    pub current_node_id: NodeId,
    pub relocating_node_id: Option<NodeId>,
    pub relocation_id: Option<AllocationId>,
}

impl RoutingEntry {
    /// A copy is "active" once it has finished initializing; `RELOCATED`
    /// copies are active too (ReroutePhase step 5 only rejects
    /// `UNASSIGNED`/missing primaries).
    pub fn active(&self) -> bool {
        matches!(
            self.state,
            ShardRoutingState::Started | ShardRoutingState::Relocated
        )
    }

    /// `STARTED` only — the set that counts toward `waitForActiveShards`.
    pub fn started(&self) -> bool {
        self.state == ShardRoutingState::Started
    }

    pub fn initializing(&self) -> bool {
        self.state == ShardRoutingState::Initializing
    }

    pub fn relocated(&self) -> bool {
        self.state == ShardRoutingState::Relocated
    }
}

/// All copies of one shard: exactly one primary plus zero or more replicas.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IndexShardRoutingTable {
    pub shard_id: ShardId,
    pub primary: RoutingEntry,
    pub replicas: Vec<RoutingEntry>,
}

impl IndexShardRoutingTable {
    /// Replica copies eligible to receive a write: every `STARTED` or
    /// `INITIALIZING` assigned copy other than the primary (§4.3 step 1 —
    /// initializing copies receive operations to stay caught up).
    pub fn replication_targets(&self) -> impl Iterator<Item = &RoutingEntry> {
        self.replicas
            .iter()
            .filter(|r| r.started() || r.initializing())
    }

    pub fn active_replica_count(&self) -> usize {
        self.replicas.iter().filter(|r| r.started()).count()
    }

    /// Total active copies including the primary, used to resolve
    /// `waitForActiveShards::All`.
    pub fn total_active_copies(&self) -> usize {
        let primary = usize::from(self.primary.started());
        primary + self.active_replica_count()
    }
}

/// Severity of a cluster/index block; blocks at or above the configured
/// level stop write traffic.
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BlockLevel {
    Read,
    Write,
    Metadata,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClusterBlock {
    pub level: BlockLevel,
    pub retryable: bool,
    pub description: String,
}

/// Global and per-index write blocks consulted by `ReroutePhase` step 2.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ClusterBlocks {
    pub global: Vec<ClusterBlock>,
    pub indices: HashMap<String, Vec<ClusterBlock>>,
}

impl ClusterBlocks {
    /// Returns the first global block at or above `level` (§4.1 step 2's
    /// `globalBlockLevel`).
    pub fn global_blocking(&self, level: BlockLevel) -> Option<&ClusterBlock> {
        self.global.iter().find(|b| b.level >= level)
    }

    /// Returns the first block on `index` at or above `level` (§4.1 step
    /// 2's `indexBlockLevel`, checked independently of the global level).
    pub fn index_blocking(&self, index: &str, level: BlockLevel) -> Option<&ClusterBlock> {
        self.indices
            .get(index)
            .and_then(|blocks| blocks.iter().find(|b| b.level >= level))
    }

    /// Consults the global block at `global_level` and the per-index block
    /// at `index_level`, preferring the global block since either is
    /// sufficient to stop the request (§4.1 step 2: "global blocks at the
    /// configured globalBlockLevel and index blocks at indexBlockLevel").
    pub fn blocking(
        &self,
        index: &str,
        global_level: BlockLevel,
        index_level: BlockLevel,
    ) -> Option<&ClusterBlock> {
        self.global_blocking(global_level)
            .or_else(|| self.index_blocking(index, index_level))
    }
}

/// Per-index metadata the core needs: whether the index is closed, its
/// current primary term per shard, and whether replicas are "shadow"
/// copies that skip data replication.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IndexMetadata {
    pub index_uuid: uuid::Uuid,
    pub index_name: String,
    pub closed: bool,
    pub shadow_replicas: bool,
    pub primary_terms: HashMap<u32, PrimaryTerm>,
}

impl IndexMetadata {
    pub fn primary_term(&self, shard: u32) -> PrimaryTerm {
        self.primary_terms
            .get(&shard)
            .copied()
            .unwrap_or(PrimaryTerm::UNKNOWN)
    }
}

/// Versioned, immutable snapshot of cluster topology and metadata.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClusterState {
    pub version: u64,
    pub nodes: Vec<NodeId>,
    pub routing_table: HashMap<ShardId, IndexShardRoutingTable>,
    pub indices: HashMap<uuid::Uuid, IndexMetadata>,
    pub blocks: ClusterBlocks,
}

impl ClusterState {
    pub fn has_node(&self, node: &NodeId) -> bool {
        self.nodes.contains(node)
    }

    pub fn routing_for(&self, shard_id: &ShardId) -> Option<&IndexShardRoutingTable> {
        self.routing_table.get(shard_id)
    }

    pub fn index_metadata(&self, index_uuid: &uuid::Uuid) -> Option<&IndexMetadata> {
        self.indices.get(index_uuid)
    }

    pub fn index_by_name(&self, name: &str) -> Option<&IndexMetadata> {
        self.indices.values().find(|m| m.index_name == name)
    }

    /// Primary term for a shard as recorded in index metadata; `UNKNOWN`
    /// if the index isn't present (e.g. it was just deleted).
    pub fn primary_term(&self, shard_id: &ShardId) -> PrimaryTerm {
        self.indices
            .get(&shard_id.index_uuid)
            .map(|meta| meta.primary_term(shard_id.shard))
            .unwrap_or(PrimaryTerm::UNKNOWN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(node: &str, state: ShardRoutingState) -> RoutingEntry {
        RoutingEntry {
            allocation_id: AllocationId::new(format!("alloc-{node}")),
            role: ShardRole::Replica,
            state,
            current_node_id: NodeId::new(node),
            relocating_node_id: None,
            relocation_id: None,
        }
    }

    #[test]
    fn initializing_replicas_receive_writes_but_dont_count_as_active() {
        let table = IndexShardRoutingTable {
            shard_id: ShardId::new(uuid::Uuid::nil(), 0),
            primary: entry("n0", ShardRoutingState::Started),
            replicas: vec![
                entry("n1", ShardRoutingState::Started),
                entry("n2", ShardRoutingState::Initializing),
            ],
        };
        assert_eq!(table.replication_targets().count(), 2);
        assert_eq!(table.active_replica_count(), 1);
        assert_eq!(table.total_active_copies(), 2);
    }

    #[test]
    fn unassigned_replicas_are_skipped_for_replication() {
        let table = IndexShardRoutingTable {
            shard_id: ShardId::new(uuid::Uuid::nil(), 0),
            primary: entry("n0", ShardRoutingState::Started),
            replicas: vec![entry("n1", ShardRoutingState::Unassigned)],
        };
        assert_eq!(table.replication_targets().count(), 0);
    }

    #[test]
    fn global_block_takes_precedence_and_honors_level() {
        let mut blocks = ClusterBlocks::default();
        blocks.global.push(ClusterBlock {
            level: BlockLevel::Read,
            retryable: true,
            description: "read-only".into(),
        });
        assert!(blocks
            .blocking("any-index", BlockLevel::Read, BlockLevel::Read)
            .is_some());
        assert!(blocks
            .blocking("any-index", BlockLevel::Write, BlockLevel::Write)
            .is_some());
    }

    #[test]
    fn index_block_applies_only_to_its_index() {
        let mut blocks = ClusterBlocks::default();
        blocks.indices.insert(
            "logs".into(),
            vec![ClusterBlock {
                level: BlockLevel::Write,
                retryable: false,
                description: "closed".into(),
            }],
        );
        assert!(blocks
            .blocking("logs", BlockLevel::Write, BlockLevel::Write)
            .is_some());
        assert!(blocks
            .blocking("metrics", BlockLevel::Write, BlockLevel::Write)
            .is_none());
    }

    #[test]
    fn index_block_level_is_checked_independently_of_global_block_level() {
        let mut blocks = ClusterBlocks::default();
        blocks.indices.insert(
            "logs".into(),
            vec![ClusterBlock {
                level: BlockLevel::Write,
                retryable: false,
                description: "index write-blocked".into(),
            }],
        );
        // global_level Metadata has nothing to match, so a single shared
        // level would miss this block entirely; index_level Write must
        // still catch it on its own.
        assert!(blocks
            .blocking("logs", BlockLevel::Metadata, BlockLevel::Write)
            .is_some());
        // Raising index_level past the block's own severity suppresses it,
        // independently of whatever global_level is configured to.
        assert!(blocks
            .blocking("logs", BlockLevel::Metadata, BlockLevel::Metadata)
            .is_none());
    }
}
