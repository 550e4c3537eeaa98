//! Retrieval engine: one query in, one fused and hydrated result list out.
//!
//! Pipeline: compile filter, embed query, run the semantic and lexical
//! channels against the same compiled filter, fuse with RRF, truncate to
//! the caller's limit, hydrate. The whole pipeline reads one snapshot and
//! mutates nothing, so a failed query can simply be retried.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::time::Instant;

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::core::entry::{CandidateRank, Channel, HydratedEntry, SearchHit, SimilarHit};
use crate::core::error::Result;
use crate::core::filter::{CompiledFilter, SearchFilters};
use crate::search::embedding::{cosine_distance, EmbeddingProvider};
use crate::search::fusion;
use crate::store::db::JournalStore;

lazy_static! {
    // Word terms for the FTS MATCH expression; everything else is syntax
    // to FTS5 and must not leak through.
    static ref TERM_RE: Regex = Regex::new(r"[\p{Alphabetic}\p{N}_]+").unwrap();
}

/// Engine tunables.
///
/// `candidate_pool` is the per-channel cap, deliberately independent of the
/// caller's result limit: fusion needs headroom so an entry strong in one
/// channel but outside the other channel's very top can still surface.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub candidate_pool: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self { candidate_pool: 20 }
    }
}

pub struct RetrievalEngine<P: EmbeddingProvider> {
    store: JournalStore,
    provider: P,
    config: SearchConfig,
}

impl<P: EmbeddingProvider> RetrievalEngine<P> {
    pub fn new(store: JournalStore, provider: P) -> Self {
        Self::with_config(store, provider, SearchConfig::default())
    }

    pub fn with_config(store: JournalStore, provider: P, config: SearchConfig) -> Self {
        Self {
            store,
            provider,
            config,
        }
    }

    pub fn store(&self) -> &JournalStore {
        &self.store
    }

    /// Hybrid search. An empty result is a valid outcome, distinct from
    /// `Err`: it means nothing matched, not that something broke.
    pub fn search(
        &self,
        query: &str,
        filters: &SearchFilters,
        limit: usize,
    ) -> Result<Vec<SearchHit>> {
        let started = Instant::now();

        // Filters are validated before any retrieval or embedding work.
        let filter = filters.compile()?;

        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let query_vector = self.provider.embed(query)?;

        let semantic = self.semantic_channel(&query_vector, &filter)?;
        let lexical = self.lexical_channel(query, &filter)?;
        debug!(
            semantic_hits = semantic.len(),
            lexical_hits = lexical.len(),
            "channel retrieval complete"
        );

        let fused = fusion::fuse(&semantic, &lexical, limit);

        let ids: Vec<Uuid> = fused.iter().map(|f| f.uuid).collect();
        let mut by_id = self.hydrate_map(&ids)?;

        let hits: Vec<SearchHit> = fused
            .into_iter()
            .filter_map(|f| {
                by_id.remove(&f.uuid).map(|entry| SearchHit {
                    entry,
                    score: f.score,
                    matched_semantic: f.in_semantic,
                    matched_lexical: f.in_lexical,
                })
            })
            .collect();

        info!(
            results = hits.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "search complete"
        );
        Ok(hits)
    }

    /// Nearest neighbors of one entry's stored vector. Empty when the
    /// source is unknown, has no vector, or has no embedded peers.
    pub fn find_similar(&self, source: Uuid, limit: usize) -> Result<Vec<SimilarHit>> {
        let Some(entry) = self.store.get_entry(source)? else {
            return Ok(Vec::new());
        };
        let Some(source_vector) = entry.embedding else {
            return Ok(Vec::new());
        };

        let mut scored: Vec<(Uuid, f32)> = self
            .store
            .embedded_peers(source)?
            .into_iter()
            .map(|(uuid, vector)| (uuid, cosine_distance(&source_vector, &vector)))
            .collect();
        scored.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        scored.truncate(limit);

        let ids: Vec<Uuid> = scored.iter().map(|(uuid, _)| *uuid).collect();
        let mut by_id = self.hydrate_map(&ids)?;

        let hits = scored
            .into_iter()
            .filter_map(|(uuid, distance)| {
                by_id.remove(&uuid).map(|entry| SimilarHit {
                    entry,
                    similarity: 1.0 - distance,
                })
            })
            .collect();

        Ok(hits)
    }

    /// Semantic channel: filter in SQL, rank all qualifying vectors by
    /// ascending distance, cap at the candidate pool. An all-zero query
    /// vector ranks nothing.
    fn semantic_channel(
        &self,
        query_vector: &[f32],
        filter: &CompiledFilter,
    ) -> Result<Vec<CandidateRank>> {
        if query_vector.iter().all(|v| *v == 0.0) {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(Uuid, f32)> = self
            .store
            .embedded_entries(filter)?
            .into_iter()
            .map(|(uuid, vector)| (uuid, cosine_distance(query_vector, &vector)))
            .collect();
        scored.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        scored.truncate(self.config.candidate_pool);

        Ok(scored
            .into_iter()
            .enumerate()
            .map(|(i, (uuid, _))| CandidateRank {
                uuid,
                rank: i + 1,
                channel: Channel::Semantic,
            })
            .collect())
    }

    /// Lexical channel: same compiled filter, bm25 ranking in SQL, same cap.
    fn lexical_channel(&self, query: &str, filter: &CompiledFilter) -> Result<Vec<CandidateRank>> {
        let Some(match_expr) = build_match_expr(query) else {
            return Ok(Vec::new());
        };

        let ids = self
            .store
            .lexical_ranked(&match_expr, filter, self.config.candidate_pool)?;

        Ok(ids
            .into_iter()
            .enumerate()
            .map(|(i, uuid)| CandidateRank {
                uuid,
                rank: i + 1,
                channel: Channel::Lexical,
            })
            .collect())
    }

    fn hydrate_map(&self, ids: &[Uuid]) -> Result<HashMap<Uuid, HydratedEntry>> {
        Ok(self
            .store
            .hydrate(ids)?
            .into_iter()
            .map(|entry| (entry.uuid, entry))
            .collect())
    }
}

/// Build an FTS5 MATCH expression from free text: word terms, each quoted,
/// OR-joined. `None` when the query carries no indexable terms.
fn build_match_expr(query: &str) -> Option<String> {
    let terms: Vec<String> = TERM_RE
        .find_iter(query)
        .map(|m| format!("\"{}\"", m.as_str()))
        .collect();
    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" OR "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::entry::JournalEntry;
    use crate::core::error::RetrievalError;
    use crate::search::embedding::IndexedEmbedding;
    use chrono::Utc;

    /// Provider that returns one fixed vector for every text.
    struct StubProvider(Vec<f32>);

    impl EmbeddingProvider for StubProvider {
        fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(self.0.clone())
        }

        fn embed_batch(&self, texts: &[&str]) -> Result<Vec<IndexedEmbedding>> {
            Ok(texts
                .iter()
                .enumerate()
                .map(|(index, _)| IndexedEmbedding {
                    index,
                    vector: self.0.clone(),
                })
                .collect())
        }
    }

    struct FailingProvider;

    impl EmbeddingProvider for FailingProvider {
        fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Err(RetrievalError::EmbeddingUnavailable(
                "provider offline".to_string(),
            ))
        }

        fn embed_batch(&self, _texts: &[&str]) -> Result<Vec<IndexedEmbedding>> {
            Err(RetrievalError::EmbeddingUnavailable(
                "provider offline".to_string(),
            ))
        }
    }

    fn store_with(entries: &[(&str, Option<Vec<f32>>)]) -> (JournalStore, Vec<Uuid>) {
        let store = JournalStore::open_in_memory().unwrap();
        let mut ids = Vec::new();
        for (text, embedding) in entries {
            let entry = JournalEntry {
                uuid: Uuid::new_v4(),
                text: text.to_string(),
                created_at: Utc::now(),
                city: None,
                weather: None,
                starred: false,
                embedding: embedding.clone(),
            };
            store.upsert_entry(&entry).unwrap();
            ids.push(entry.uuid);
        }
        (store, ids)
    }

    #[test]
    fn match_expr_quotes_and_or_joins_terms() {
        assert_eq!(
            build_match_expr("rainy day in Lisbon").as_deref(),
            Some("\"rainy\" OR \"day\" OR \"in\" OR \"Lisbon\"")
        );
        assert_eq!(
            build_match_expr("c'est \"la\" vie!").as_deref(),
            Some("\"c\" OR \"est\" OR \"la\" OR \"vie\"")
        );
        assert!(build_match_expr("!!! ...").is_none());
    }

    #[test]
    fn close_vectors_both_surface_even_with_one_keyword_match() {
        let (store, ids) = store_with(&[
            ("kayaking on the lake at dawn", Some(vec![1.0, 0.0, 0.01])),
            ("paddling before sunrise", Some(vec![1.0, 0.01, 0.0])),
        ]);
        let engine = RetrievalEngine::new(store, StubProvider(vec![1.0, 0.0, 0.0]));

        let hits = engine
            .search("kayaking", &SearchFilters::default(), 10)
            .unwrap();

        assert_eq!(hits.len(), 2);
        // The dual-channel entry wins on combined score, not by which
        // channel happened to match.
        assert_eq!(hits[0].entry.uuid, ids[0]);
        assert!(hits[0].matched_semantic && hits[0].matched_lexical);
        assert!(hits[1].matched_semantic && !hits[1].matched_lexical);
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn inverted_date_range_is_no_results_not_an_error() {
        let (store, _) = store_with(&[("summer trip notes", Some(vec![1.0]))]);
        let engine = RetrievalEngine::new(store, StubProvider(vec![1.0]));

        let filters = SearchFilters {
            date_from: Some("2024-06-01".to_string()),
            date_to: Some("2024-01-01".to_string()),
            ..Default::default()
        };
        let hits = engine.search("summer", &filters, 10).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn limit_caps_fused_output_at_the_best_hit() {
        let (store, _) = store_with(&[
            ("harbor walk one", Some(vec![1.0, 0.0])),
            ("harbor walk two", Some(vec![0.9, 0.1])),
            ("harbor walk three", Some(vec![0.8, 0.2])),
            ("harbor walk four", Some(vec![0.7, 0.3])),
            ("harbor walk five", Some(vec![0.6, 0.4])),
        ]);
        let engine = RetrievalEngine::new(store, StubProvider(vec![1.0, 0.0]));

        let all = engine
            .search("harbor", &SearchFilters::default(), 10)
            .unwrap();
        assert_eq!(all.len(), 5);

        let one = engine
            .search("harbor", &SearchFilters::default(), 1)
            .unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].entry.uuid, all[0].entry.uuid);
    }

    #[test]
    fn lexical_only_hit_scores_one_over_sixty_one() {
        let (store, ids) = store_with(&[("midnight ramen run", None)]);
        let engine = RetrievalEngine::new(store, StubProvider(vec![1.0]));

        let hits = engine
            .search("ramen", &SearchFilters::default(), 10)
            .unwrap();

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].entry.uuid, ids[0]);
        assert!((hits[0].score - 1.0 / 61.0).abs() < 1e-12);
        assert!(hits[0].matched_lexical && !hits[0].matched_semantic);
    }

    #[test]
    fn entries_without_vectors_never_enter_the_semantic_channel() {
        let (store, ids) = store_with(&[
            ("vectorless entry about tea", None),
            ("embedded entry about tea", Some(vec![1.0])),
        ]);
        let engine = RetrievalEngine::new(store, StubProvider(vec![1.0]));

        let hits = engine.search("tea", &SearchFilters::default(), 10).unwrap();
        let vectorless = hits.iter().find(|h| h.entry.uuid == ids[0]).unwrap();
        assert!(!vectorless.matched_semantic);
    }

    #[test]
    fn find_similar_excludes_the_source() {
        let (store, ids) = store_with(&[
            ("source entry", Some(vec![1.0, 0.0])),
            ("close neighbor", Some(vec![0.9, 0.1])),
            ("far neighbor", Some(vec![0.0, 1.0])),
        ]);
        let engine = RetrievalEngine::new(store, StubProvider(vec![1.0]));

        let hits = engine.find_similar(ids[0], 10).unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h.entry.uuid != ids[0]));
        assert_eq!(hits[0].entry.uuid, ids[1]);
        assert!(hits[0].similarity > hits[1].similarity);
    }

    #[test]
    fn find_similar_without_vector_is_empty_not_an_error() {
        let (store, ids) = store_with(&[
            ("no vector here", None),
            ("embedded peer", Some(vec![1.0])),
        ]);
        let engine = RetrievalEngine::new(store, StubProvider(vec![1.0]));

        assert!(engine.find_similar(ids[0], 10).unwrap().is_empty());
        // Unknown ids behave the same way.
        assert!(engine.find_similar(Uuid::new_v4(), 10).unwrap().is_empty());
    }

    #[test]
    fn provider_failure_surfaces_as_embedding_unavailable() {
        let (store, _) = store_with(&[("anything", Some(vec![1.0]))]);
        let engine = RetrievalEngine::new(store, FailingProvider);

        let err = engine
            .search("anything", &SearchFilters::default(), 10)
            .unwrap_err();
        assert!(matches!(err, RetrievalError::EmbeddingUnavailable(_)));
    }

    #[test]
    fn invalid_filter_is_rejected_before_embedding() {
        let (store, _) = store_with(&[("anything", Some(vec![1.0]))]);
        // The failing provider proves the filter check runs first.
        let engine = RetrievalEngine::new(store, FailingProvider);

        let filters = SearchFilters {
            date_from: Some("not-a-date".to_string()),
            ..Default::default()
        };
        let err = engine.search("anything", &filters, 10).unwrap_err();
        assert!(matches!(err, RetrievalError::InvalidFilter(_)));
    }

    #[test]
    fn blank_query_is_no_results() {
        let (store, _) = store_with(&[("anything", Some(vec![1.0]))]);
        let engine = RetrievalEngine::new(store, StubProvider(vec![1.0]));
        assert!(engine
            .search("   ", &SearchFilters::default(), 10)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn fused_output_is_sorted_by_score() {
        let (store, _) = store_with(&[
            ("harbor lights", Some(vec![1.0, 0.0])),
            ("harbor mist", Some(vec![0.5, 0.5])),
            ("city lights", Some(vec![0.9, 0.1])),
        ]);
        let engine = RetrievalEngine::new(store, StubProvider(vec![1.0, 0.0]));

        let hits = engine
            .search("harbor lights", &SearchFilters::default(), 10)
            .unwrap();
        for pair in hits.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }
}
