//! Reciprocal Rank Fusion.
//!
//! Merges the semantic and lexical candidate lists into one scored set:
//! each channel contributes `1 / (k + rank)` for the entries it ranked, and
//! a channel that missed an entry contributes nothing. The result is the
//! outer union of both lists, so an entry found by either channel always
//! survives fusion.

use std::cmp::Ordering;
use std::collections::HashMap;

use uuid::Uuid;

use crate::core::entry::{CandidateRank, Channel};

/// RRF smoothing constant. Rank 1 in both channels scores 2/61; rank 1 in a
/// single channel scores 1/61.
pub const RRF_K: f64 = 60.0;

/// One fused candidate with its score and channel provenance.
#[derive(Debug, Clone)]
pub struct FusedCandidate {
    pub uuid: Uuid,
    pub score: f64,
    pub in_semantic: bool,
    pub in_lexical: bool,
}

/// Fuse two ranked candidate lists into one scored, sorted list.
///
/// Sorted by score descending; exact ties order by entry id ascending so
/// repeated queries produce a stable order. Truncated to `limit`.
pub fn fuse(
    semantic: &[CandidateRank],
    lexical: &[CandidateRank],
    limit: usize,
) -> Vec<FusedCandidate> {
    let mut by_id: HashMap<Uuid, FusedCandidate> = HashMap::new();

    for candidate in semantic.iter().chain(lexical) {
        let fused = by_id.entry(candidate.uuid).or_insert(FusedCandidate {
            uuid: candidate.uuid,
            score: 0.0,
            in_semantic: false,
            in_lexical: false,
        });
        fused.score += 1.0 / (RRF_K + candidate.rank as f64);
        match candidate.channel {
            Channel::Semantic => fused.in_semantic = true,
            Channel::Lexical => fused.in_lexical = true,
        }
    }

    let mut fused: Vec<FusedCandidate> = by_id.into_values().collect();
    fused.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.uuid.cmp(&b.uuid))
    });
    fused.truncate(limit);
    fused
}
