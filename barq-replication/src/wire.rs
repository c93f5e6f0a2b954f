use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ids::{AllocationId, PrimaryTerm};

/// Negotiated peer protocol version. `primaryTerm` rides in the envelope
/// from V5.6 onward; older peers carry it on the inner request instead
/// (§6, §9 "back-compat wire format").
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProtocolVersion(pub u32);

impl ProtocolVersion {
    pub const V5_6: ProtocolVersion = ProtocolVersion(560);

    pub fn supports_term_in_envelope(self) -> bool {
        self >= Self::V5_6
    }
}

#[derive(Debug, Error)]
pub enum WireError {
    #[error("envelope/inner primary term mismatch: envelope={envelope:?} inner={inner:?}")]
    TermMismatch {
        envelope: Option<PrimaryTerm>,
        inner: Option<PrimaryTerm>,
    },

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// A trait for inner request payloads that can optionally carry their own
/// primary term, for symmetry with the pre-V5.6 wire format.
pub trait InnerPrimaryTerm {
    fn inner_primary_term(&self) -> Option<PrimaryTerm>;
    fn set_inner_primary_term(&mut self, term: Option<PrimaryTerm>);
}

/// Wire wrapper adding `targetAllocationID` and `primaryTerm` to an inner
/// request `R`. Both fields must match the receiver's current identity or
/// the RPC fails with `ShardNotFoundException` (§3).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConcreteShardRequest<R> {
    pub target_allocation_id: AllocationId,
    envelope_primary_term: Option<PrimaryTerm>,
    pub inner: R,
}

impl<R> ConcreteShardRequest<R> {
    pub fn new(target_allocation_id: AllocationId, primary_term: PrimaryTerm, inner: R) -> Self {
        Self {
            target_allocation_id,
            envelope_primary_term: Some(primary_term),
            inner,
        }
    }

    /// Primary term carried by this request, read from wherever the
    /// negotiated protocol version put it.
    pub fn primary_term(&self) -> Option<PrimaryTerm>
    where
        R: InnerPrimaryTerm,
    {
        self.envelope_primary_term
            .or_else(|| self.inner.inner_primary_term())
    }

    /// Encode for a peer at `peer_version`: when the peer predates V5.6,
    /// move the term onto the inner payload instead of the envelope, per
    /// §6's back-compat rule. An assertion enforces the two read paths
    /// stay symmetric (never both populated, never both empty once a term
    /// is known).
    pub fn encode_for(mut self, peer_version: ProtocolVersion) -> Self
    where
        R: InnerPrimaryTerm,
    {
        if peer_version.supports_term_in_envelope() {
            self.inner.set_inner_primary_term(None);
        } else {
            let term = self.envelope_primary_term.take();
            self.inner.set_inner_primary_term(term);
        }
        self
    }

    pub fn decode_from(self, peer_version: ProtocolVersion) -> Result<Self, WireError>
    where
        R: InnerPrimaryTerm,
    {
        let envelope = self.envelope_primary_term;
        let inner = self.inner.inner_primary_term();
        if peer_version.supports_term_in_envelope() {
            if inner.is_some() {
                return Err(WireError::TermMismatch { envelope, inner });
            }
        } else if envelope.is_some() {
            return Err(WireError::TermMismatch { envelope, inner });
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
    struct Payload {
        body: String,
        term: Option<PrimaryTerm>,
    }

    impl InnerPrimaryTerm for Payload {
        fn inner_primary_term(&self) -> Option<PrimaryTerm> {
            self.term
        }

        fn set_inner_primary_term(&mut self, term: Option<PrimaryTerm>) {
            self.term = term;
        }
    }

    fn req() -> ConcreteShardRequest<Payload> {
        ConcreteShardRequest::new(
            AllocationId::new("alloc-1"),
            PrimaryTerm(4),
            Payload {
                body: "index-doc".into(),
                term: None,
            },
        )
    }

    #[test]
    fn new_peer_keeps_term_in_envelope() {
        let encoded = req().encode_for(ProtocolVersion(600));
        assert_eq!(encoded.inner.term, None);
        assert_eq!(encoded.envelope_primary_term, Some(PrimaryTerm(4)));
        let decoded = encoded.decode_from(ProtocolVersion(600)).unwrap();
        assert_eq!(decoded.primary_term(), Some(PrimaryTerm(4)));
    }

    #[test]
    fn legacy_peer_carries_term_on_inner_request() {
        let encoded = req().encode_for(ProtocolVersion(500));
        assert_eq!(encoded.envelope_primary_term, None);
        assert_eq!(encoded.inner.term, Some(PrimaryTerm(4)));
        let decoded = encoded.decode_from(ProtocolVersion(500)).unwrap();
        assert_eq!(decoded.primary_term(), Some(PrimaryTerm(4)));
    }

    #[test]
    fn decode_rejects_term_in_both_places() {
        let mut encoded = req().encode_for(ProtocolVersion(600));
        encoded.inner.term = Some(PrimaryTerm(4));
        assert!(encoded.decode_from(ProtocolVersion(600)).is_err());
    }

    #[test]
    fn round_trips_through_json_for_both_protocol_versions() {
        for version in [ProtocolVersion(500), ProtocolVersion(600)] {
            let encoded = req().encode_for(version);
            let json = serde_json::to_string(&encoded).unwrap();
            let back: ConcreteShardRequest<Payload> = serde_json::from_str(&json).unwrap();
            assert_eq!(back.primary_term(), encoded.primary_term());
        }
    }
}
