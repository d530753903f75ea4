//! Collaborator interfaces for the durable document and edge records, plus
//! in-memory implementations.

use crate::error::{Error, Result};
use crate::{DocId, Document, SimilarityEdge};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

pub trait DocumentStore: Send + Sync {
    /// Full snapshot of every document.
    fn load_all(&self) -> Result<Vec<Document>>;

    fn upsert_many(&self, docs: &[Document]) -> Result<()>;

    fn update_centrality(&self, id: DocId, score: f64) -> Result<()> {
        self.update_centralities(&[(id, score)])
    }

    /// Write back a batch of scores. Must be all-or-nothing: if any id is
    /// unknown or the write fails, no score in the batch is changed.
    fn update_centralities(&self, scores: &[(DocId, f64)]) -> Result<()>;
}

pub trait EdgeStore: Send + Sync {
    /// `(neighbor_id, weight)` for every edge touching `id`, from either end.
    fn edges_for(&self, id: DocId) -> Result<Vec<(DocId, f64)>>;

    /// Replace the whole edge set.
    fn replace_all(&self, edges: &[SimilarityEdge]) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    docs: RwLock<BTreeMap<DocId, Document>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self { Self::default() }

    pub fn with_documents(docs: impl IntoIterator<Item = Document>) -> Self {
        let store = Self::new();
        store.docs.write().extend(docs.into_iter().map(|d| (d.id, d)));
        store
    }

    pub fn get(&self, id: DocId) -> Option<Document> { self.docs.read().get(&id).cloned() }

    pub fn len(&self) -> usize { self.docs.read().len() }

    pub fn is_empty(&self) -> bool { self.docs.read().is_empty() }
}

impl DocumentStore for MemoryDocumentStore {
    fn load_all(&self) -> Result<Vec<Document>> {
        Ok(self.docs.read().values().cloned().collect())
    }

    fn upsert_many(&self, docs: &[Document]) -> Result<()> {
        let mut guard = self.docs.write();
        for doc in docs {
            guard.insert(doc.id, doc.clone());
        }
        Ok(())
    }

    fn update_centralities(&self, scores: &[(DocId, f64)]) -> Result<()> {
        let mut guard = self.docs.write();
        if let Some((id, _)) = scores.iter().find(|(id, _)| !guard.contains_key(id)) {
            return Err(Error::UnknownDocument(*id));
        }
        for (id, score) in scores {
            if let Some(doc) = guard.get_mut(id) {
                doc.centrality = *score;
            }
        }
        Ok(())
    }
}

/// Adjacency kept in both directions so lookups from either endpoint are direct.
#[derive(Debug, Default)]
pub struct MemoryEdgeStore {
    adjacency: RwLock<HashMap<DocId, Vec<(DocId, f64)>>>,
}

impl MemoryEdgeStore {
    pub fn new() -> Self { Self::default() }

    pub fn with_edges(edges: &[SimilarityEdge]) -> Self {
        let store = Self::new();
        store.adjacency.write().extend(adjacency(edges));
        store
    }
}

fn adjacency(edges: &[SimilarityEdge]) -> HashMap<DocId, Vec<(DocId, f64)>> {
    let mut out: HashMap<DocId, Vec<(DocId, f64)>> = HashMap::new();
    for e in edges {
        out.entry(e.a).or_default().push((e.b, e.weight));
        out.entry(e.b).or_default().push((e.a, e.weight));
    }
    out
}

impl EdgeStore for MemoryEdgeStore {
    fn edges_for(&self, id: DocId) -> Result<Vec<(DocId, f64)>> {
        Ok(self.adjacency.read().get(&id).cloned().unwrap_or_default())
    }

    fn replace_all(&self, edges: &[SimilarityEdge]) -> Result<()> {
        let fresh = adjacency(edges);
        *self.adjacency.write() = fresh;
        Ok(())
    }
}
