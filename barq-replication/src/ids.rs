use std::fmt;

use serde::{Deserialize, Serialize};

pub use barq_cluster::NodeId;

/// Identity of one shard, stable across its lifetime: the owning index's
/// UUID plus the shard number within that index.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ShardId {
    pub index_uuid: uuid::Uuid,
    pub shard: u32,
}

impl ShardId {
    pub fn new(index_uuid: uuid::Uuid, shard: u32) -> Self {
        Self { index_uuid, shard }
    }
}

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.index_uuid, self.shard)
    }
}

/// Opaque identity of one particular shard copy on one particular node.
/// A relocating primary's handoff target gets its own distinct `AllocationId`.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct AllocationId(pub String);

impl AllocationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for AllocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonically increasing primary "reign" counter, one per shard.
/// Term 0 means "unknown; treat the current cluster-state term as
/// speculative and revalidate after lock acquisition" (see `AsyncPrimaryAction`).
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PrimaryTerm(pub u64);

impl PrimaryTerm {
    pub const UNKNOWN: PrimaryTerm = PrimaryTerm(0);

    pub fn is_unknown(self) -> bool {
        self == Self::UNKNOWN
    }

    pub fn next(self) -> PrimaryTerm {
        PrimaryTerm(self.0 + 1)
    }
}

impl fmt::Display for PrimaryTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn term_zero_is_unknown() {
        assert!(PrimaryTerm::UNKNOWN.is_unknown());
        assert!(!PrimaryTerm(1).is_unknown());
    }

    #[test]
    fn terms_order_monotonically() {
        assert!(PrimaryTerm(1) < PrimaryTerm(2));
        assert_eq!(PrimaryTerm(4).next(), PrimaryTerm(5));
    }

    #[test]
    fn shard_id_displays_index_and_number() {
        let id = ShardId::new(uuid::Uuid::nil(), 3);
        assert_eq!(
            format!("{id}"),
            "00000000-0000-0000-0000-000000000000[3]"
        );
    }
}
