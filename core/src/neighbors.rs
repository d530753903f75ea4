use crate::error::Result;
use crate::store::EdgeStore;
use crate::DocId;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Read-only neighbor lookup over the externally maintained edge list.
#[derive(Clone)]
pub struct NeighborStore {
    edges: Arc<dyn EdgeStore>,
}

impl NeighborStore {
    pub fn new(edges: Arc<dyn EdgeStore>) -> Self { Self { edges } }

    /// Up to `limit` neighbors of `id`, by descending neighbor centrality then
    /// ascending id. Neighbors `centrality` knows nothing about are dropped.
    pub fn neighbors_of<F>(&self, id: DocId, limit: usize, centrality: F) -> Result<Vec<DocId>>
    where
        F: Fn(DocId) -> Option<f64>,
    {
        let ids: BTreeSet<DocId> = self
            .edges
            .edges_for(id)?
            .into_iter()
            .map(|(n, _)| n)
            .filter(|n| *n != id)
            .collect();
        let mut scored: Vec<(DocId, f64)> = ids.into_iter().filter_map(|n| centrality(n).map(|c| (n, c))).collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.truncate(limit);
        Ok(scored.into_iter().map(|(n, _)| n).collect())
    }
}
