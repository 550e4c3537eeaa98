use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// A journal entry as maintained by the ingestion side.
///
/// The retrieval core only reads these. `embedding` stays `None` until the
/// ingestion side computes it; such entries are invisible to the semantic
/// channel and to similarity lookups, but still reachable by keyword.
#[derive(Debug, Clone)]
pub struct JournalEntry {
    pub uuid: Uuid,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub city: Option<String>,
    pub weather: Option<String>,
    pub starred: bool,
    pub embedding: Option<Vec<f32>>,
}

/// A media attachment, consumed read-only during hydration.
#[derive(Debug, Clone, Serialize)]
pub struct MediaItem {
    pub media_type: String,
    pub access_ref: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Which retrieval channel produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Semantic,
    Lexical,
}

/// One row of a single channel's ranked output. Lives for one query only.
#[derive(Debug, Clone)]
pub struct CandidateRank {
    pub uuid: Uuid,
    /// 1-based position within the channel.
    pub rank: usize,
    pub channel: Channel,
}

/// A fully expanded display record.
///
/// Tag names are deduplicated; `media_counts` covers every attachment by
/// type, while `media` lists only attachments with a resolved access
/// reference, in stored order.
#[derive(Debug, Clone, Serialize)]
pub struct HydratedEntry {
    pub uuid: Uuid,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub city: Option<String>,
    pub weather: Option<String>,
    pub starred: bool,
    pub tags: Vec<String>,
    pub media_counts: BTreeMap<String, usize>,
    pub media: Vec<MediaItem>,
}

/// A fused search result with its score and channel provenance.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    #[serde(flatten)]
    pub entry: HydratedEntry,
    pub score: f64,
    pub matched_semantic: bool,
    pub matched_lexical: bool,
}

/// A nearest-neighbor result from the similarity path.
#[derive(Debug, Clone, Serialize)]
pub struct SimilarHit {
    #[serde(flatten)]
    pub entry: HydratedEntry,
    pub similarity: f32,
}
