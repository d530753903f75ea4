//! Search and recommendation engine over a fixed corpus of books.
//!
//! Documents carry a precomputed bag of top terms. From those bags the engine
//! derives an inverted [`TermIndex`] for keyword and regex lookup, and a dense
//! [`SimilarityGraph`] whose mean pairwise Jaccard similarity becomes each
//! document's centrality, the ranking signal used by [`SearchEngine`].

pub mod config;
pub mod engine;
pub mod error;
pub mod index;
pub mod model;
pub mod neighbors;
pub mod persist;
pub mod similarity;
pub mod store;

pub use config::EngineConfig;
pub use engine::{CategoryCount, RecomputeReport, SearchEngine, Snapshot};
pub use error::{Error, Result};
pub use index::{normalize_term, TermEntry, TermIndex};
pub use model::{DocId, Document, Page, SimilarityEdge};
pub use neighbors::NeighborStore;
pub use persist::SledStore;
pub use similarity::{jaccard, link_edges, Progress, ProgressSnapshot, SimilarityGraph};
pub use store::{DocumentStore, EdgeStore, MemoryDocumentStore, MemoryEdgeStore};

pub use tokio_util::sync::CancellationToken;
