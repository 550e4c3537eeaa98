use thiserror::Error;

/// Failures surfaced by the retrieval pipeline.
///
/// The pipeline is read-only and performs no local recovery: the first
/// failing dependency aborts the whole query and there is nothing to roll
/// back. An empty result set is not a failure; callers receive it as an
/// ordinary `Ok` with no hits.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// The embedding provider could not produce a usable vector.
    #[error("embedding provider unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// A caller-supplied filter could not be compiled.
    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    /// The underlying SQLite store failed.
    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, RetrievalError>;
