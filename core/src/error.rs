//! Error types for the engine.
//!
//! Absence (an unknown document id, a term nobody uses) is never an error:
//! lookups return `Option` or an empty collection instead.

use crate::DocId;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A regex supplied to a regex-based query failed to compile.
    #[error("invalid pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// The centrality recompute failed as a whole; no scores were committed.
    #[error("centrality recompute failed: {0}")]
    RecomputeFailure(String),

    #[error("a centrality recompute is already running")]
    RecomputeInProgress,

    #[error("centrality recompute cancelled")]
    Cancelled,

    #[error("invalid pagination: {0}")]
    InvalidPagination(String),

    #[error("unknown document {0}")]
    UnknownDocument(DocId),

    #[error("store error: {0}")]
    Store(String),

    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
