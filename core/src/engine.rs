//! Query orchestration over an immutable document snapshot.
//!
//! Every query clones the current `Arc<Snapshot>` and works on it without
//! holding any lock, so readers never block each other. Refresh and recompute
//! build a complete new snapshot off to the side and publish it with a single
//! pointer swap: a reader sees the old snapshot or the new one, never a mix.

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::index::{compile_pattern, normalize_term, TermIndex};
use crate::neighbors::NeighborStore;
use crate::similarity::{Progress, ProgressSnapshot, SimilarityGraph};
use crate::store::{DocumentStore, EdgeStore};
use crate::{DocId, Document, Page};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Point-in-time view of the corpus: documents, their term index, and the
/// centrality ordering used by the full listing.
#[derive(Debug, Default)]
pub struct Snapshot {
    docs: BTreeMap<DocId, Arc<Document>>,
    index: TermIndex,
    by_centrality: Vec<DocId>,
}

impl Snapshot {
    pub fn build(docs: Vec<Document>) -> Self {
        let docs: BTreeMap<DocId, Arc<Document>> = docs.into_iter().map(|d| (d.id, Arc::new(d))).collect();
        let index = TermIndex::build(docs.values().map(|d| d.as_ref()));
        let mut by_centrality: Vec<&Arc<Document>> = docs.values().collect();
        by_centrality.sort_by(|a, b| b.centrality.total_cmp(&a.centrality).then(a.id.cmp(&b.id)));
        let by_centrality = by_centrality.into_iter().map(|d| d.id).collect();
        Self { docs, index, by_centrality }
    }

    pub fn len(&self) -> usize { self.docs.len() }

    pub fn is_empty(&self) -> bool { self.docs.is_empty() }

    pub fn get(&self, id: DocId) -> Option<&Arc<Document>> { self.docs.get(&id) }

    pub fn centrality(&self, id: DocId) -> Option<f64> { self.docs.get(&id).map(|d| d.centrality) }

    pub fn index(&self) -> &TermIndex { &self.index }

    pub fn documents(&self) -> impl Iterator<Item = &Arc<Document>> { self.docs.values() }

    /// Title flag first, then centrality, then ascending id.
    fn rank<F>(&self, candidates: BTreeSet<DocId>, title_match: F) -> Vec<Arc<Document>>
    where
        F: Fn(&str) -> bool,
    {
        let mut hits: Vec<(bool, &Arc<Document>)> = candidates
            .into_iter()
            .filter_map(|id| self.docs.get(&id))
            .map(|d| (title_match(&d.title), d))
            .collect();
        hits.sort_by(|a, b| {
            b.0.cmp(&a.0)
                .then_with(|| b.1.centrality.total_cmp(&a.1.centrality))
                .then_with(|| a.1.id.cmp(&b.1.id))
        });
        hits.into_iter().map(|(_, d)| Arc::clone(d)).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryCount {
    pub label: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecomputeReport {
    pub documents: usize,
    pub pairs: usize,
    pub took_s: f64,
}

/// Clears the published progress handle however the recompute ends.
struct ProgressSlot<'a> {
    slot: &'a RwLock<Option<Arc<Progress>>>,
}

impl<'a> ProgressSlot<'a> {
    fn install(slot: &'a RwLock<Option<Arc<Progress>>>, progress: Arc<Progress>) -> Self {
        *slot.write() = Some(progress);
        Self { slot }
    }
}

impl Drop for ProgressSlot<'_> {
    fn drop(&mut self) {
        *self.slot.write() = None;
    }
}

pub struct SearchEngine {
    config: EngineConfig,
    documents: Arc<dyn DocumentStore>,
    neighbors: NeighborStore,
    snapshot: RwLock<Arc<Snapshot>>,
    recompute_lock: Mutex<()>,
    /// Held from store load through publish, by refresh and by recompute.
    store_lock: Mutex<()>,
    progress: RwLock<Option<Arc<Progress>>>,
}

impl SearchEngine {
    /// Load the initial snapshot from `documents`.
    pub fn new(config: EngineConfig, documents: Arc<dyn DocumentStore>, edges: Arc<dyn EdgeStore>) -> Result<Self> {
        let engine = Self {
            config,
            documents,
            neighbors: NeighborStore::new(edges),
            snapshot: RwLock::new(Arc::new(Snapshot::default())),
            recompute_lock: Mutex::new(()),
            store_lock: Mutex::new(()),
            progress: RwLock::new(None),
        };
        engine.refresh()?;
        Ok(engine)
    }

    pub fn config(&self) -> &EngineConfig { &self.config }

    pub fn snapshot(&self) -> Arc<Snapshot> { Arc::clone(&self.snapshot.read()) }

    fn publish(&self, snapshot: Snapshot) {
        *self.snapshot.write() = Arc::new(snapshot);
    }

    /// Reload every document and rebuild the term index. Centralities are
    /// taken as stored. Waits for a running recompute to publish first.
    pub fn refresh(&self) -> Result<()> {
        let _store = self.store_lock.lock();
        let docs = self.documents.load_all()?;
        let snapshot = Snapshot::build(docs);
        tracing::info!(documents = snapshot.len(), terms = snapshot.index().len(), "snapshot refreshed");
        self.publish(snapshot);
        Ok(())
    }

    pub fn get(&self, id: DocId) -> Option<Arc<Document>> { self.snapshot().get(id).cloned() }

    /// Documents whose top terms contain the normalized keyword, title matches first.
    pub fn search_by_keyword(&self, raw: &str) -> Vec<Arc<Document>> {
        let keyword = normalize_term(raw);
        if keyword.is_empty() {
            return Vec::new();
        }
        let snap = self.snapshot();
        let candidates = snap.index().lookup_exact(&keyword);
        let hits = snap.rank(candidates, |title| title.to_lowercase().contains(&keyword));
        tracing::debug!(%keyword, hits = hits.len(), "keyword search");
        hits
    }

    /// Documents having any index term matching `pattern`, title matches first.
    pub fn search_by_regex(&self, pattern: &str) -> Result<Vec<Arc<Document>>> {
        let re = compile_pattern(pattern)?;
        let snap = self.snapshot();
        let candidates = snap.index().lookup_matching(&re);
        let hits = snap.rank(candidates, |title| re.is_match(title));
        tracing::debug!(pattern, hits = hits.len(), "regex search");
        Ok(hits)
    }

    pub fn top_downloaded(&self, limit: usize) -> Vec<Arc<Document>> {
        let snap = self.snapshot();
        let mut docs: Vec<&Arc<Document>> = snap.documents().collect();
        docs.sort_by(|a, b| b.download_count.cmp(&a.download_count).then(a.id.cmp(&b.id)));
        docs.into_iter().take(limit).cloned().collect()
    }

    pub fn top_categories(&self, limit: usize) -> Vec<CategoryCount> {
        let snap = self.snapshot();
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for doc in snap.documents() {
            for label in doc.categories.split(self.config.category_delimiter.as_str()) {
                let label = label.trim();
                if !label.is_empty() {
                    *counts.entry(label).or_insert(0) += 1;
                }
            }
        }
        let mut out: Vec<CategoryCount> =
            counts.into_iter().map(|(label, count)| CategoryCount { label: label.to_string(), count }).collect();
        out.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));
        out.truncate(limit);
        out
    }

    /// Case-insensitive substring match against the whole category list.
    pub fn by_category(&self, label: &str, limit: usize) -> Vec<Arc<Document>> {
        let needle = label.trim().to_lowercase();
        let snap = self.snapshot();
        let mut docs: Vec<&Arc<Document>> =
            snap.documents().filter(|d| d.categories.to_lowercase().contains(&needle)).collect();
        docs.sort_by(|a, b| b.download_count.cmp(&a.download_count).then(a.id.cmp(&b.id)));
        docs.into_iter().take(limit).cloned().collect()
    }

    pub fn suggestions_for(&self, id: DocId, limit: usize) -> Result<Vec<Arc<Document>>> {
        let snap = self.snapshot();
        let ids = self.neighbors.neighbors_of(id, limit, |n| snap.centrality(n))?;
        Ok(ids.into_iter().filter_map(|n| snap.get(n).cloned()).collect())
    }

    /// Full listing by centrality descending, ties by ascending id.
    pub fn list_by_centrality(&self, page_index: usize, page_size: usize) -> Result<Page<Arc<Document>>> {
        if page_size == 0 {
            return Err(Error::InvalidPagination("page size must be greater than zero".into()));
        }
        let snap = self.snapshot();
        let total_items = snap.by_centrality.len();
        let items = snap
            .by_centrality
            .iter()
            .skip(page_index.saturating_mul(page_size))
            .take(page_size)
            .filter_map(|id| snap.get(*id).cloned())
            .collect();
        Ok(Page { items, page_index, page_size, total_items, total_pages: total_items.div_ceil(page_size) })
    }

    pub fn recompute_progress(&self) -> Option<ProgressSnapshot> {
        self.progress.read().as_ref().map(|p| p.snapshot())
    }

    /// Rebuild the similarity graph over the stored corpus, write every
    /// centrality back in one batch, then publish the refreshed snapshot.
    ///
    /// At most one recompute runs at a time. On cancellation or any failure
    /// nothing is written and the current snapshot stays published.
    pub fn recompute_centrality(&self, cancel: &CancellationToken) -> Result<RecomputeReport> {
        let _running = self.recompute_lock.try_lock().ok_or(Error::RecomputeInProgress)?;
        let _store = self.store_lock.lock();
        let progress = Arc::new(Progress::new(self.config.progress_every_pct));
        let _slot = ProgressSlot::install(&self.progress, Arc::clone(&progress));

        tracing::info!("centrality recompute started");
        let result = self.run_recompute(cancel, &progress);
        match &result {
            Ok(report) => tracing::info!(documents = report.documents, pairs = report.pairs, took_s = report.took_s, "centrality recompute finished"),
            Err(Error::Cancelled) => tracing::warn!("centrality recompute cancelled"),
            Err(e) => tracing::error!(error = %e, "centrality recompute failed"),
        }
        result
    }

    fn run_recompute(&self, cancel: &CancellationToken, progress: &Progress) -> Result<RecomputeReport> {
        let start = Instant::now();
        let mut docs = self
            .documents
            .load_all()
            .map_err(|e| Error::RecomputeFailure(format!("loading documents: {e}")))?;

        let refs: Vec<&Document> = docs.iter().collect();
        let graph = SimilarityGraph::build_cancellable(&refs, cancel, progress)?;
        let scores = graph.centrality();
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        self.documents
            .update_centralities(&scores)
            .map_err(|e| Error::RecomputeFailure(format!("writing back {} scores: {e}", scores.len())))?;

        let by_id: HashMap<DocId, f64> = scores.into_iter().collect();
        for doc in docs.iter_mut() {
            if let Some(score) = by_id.get(&doc.id) {
                doc.centrality = *score;
            }
        }
        self.publish(Snapshot::build(docs));

        Ok(RecomputeReport { documents: graph.len(), pairs: graph.pair_count(), took_s: start.elapsed().as_secs_f64() })
    }
}
