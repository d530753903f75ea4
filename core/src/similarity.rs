//! Pairwise Jaccard similarity over top-term key sets and the centrality
//! derived from it.
//!
//! Centrality of a document is the arithmetic mean of its similarity to every
//! other document in the corpus. Building the graph is an O(n^2) pass and is
//! meant for offline/administrative use: scores go stale as soon as any bag
//! changes and are only refreshed by running the whole pass again.

use crate::error::{Error, Result};
use crate::{DocId, Document, SimilarityEdge};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;

/// Jaccard similarity of two documents' term key sets. 0 when either is empty.
pub fn jaccard(a: &Document, b: &Document) -> f64 {
    let ka: Vec<String> = a.term_keys().into_iter().collect();
    let kb: Vec<String> = b.term_keys().into_iter().collect();
    jaccard_sorted(&ka, &kb)
}

/// Both slices must be sorted and free of duplicates.
fn jaccard_sorted<T: Ord>(a: &[T], b: &[T]) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let inter = intersection_len(a, b);
    let union = a.len() + b.len() - inter;
    if union == 0 { 0.0 } else { inter as f64 / union as f64 }
}

fn intersection_len<T: Ord>(a: &[T], b: &[T]) -> usize {
    let (mut i, mut j, mut n) = (0, 0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                n += 1;
                i += 1;
                j += 1;
            }
        }
    }
    n
}

/// Row counter for a running graph build. Logs every `every_pct` percent.
#[derive(Debug)]
pub struct Progress {
    done: AtomicUsize,
    total: AtomicUsize,
    every_pct: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    pub rows_done: usize,
    pub rows_total: usize,
}

impl Progress {
    pub fn new(every_pct: usize) -> Self {
        Self { done: AtomicUsize::new(0), total: AtomicUsize::new(0), every_pct: every_pct.clamp(1, 100) }
    }

    fn start(&self, total: usize) {
        self.done.store(0, Ordering::Relaxed);
        self.total.store(total, Ordering::Relaxed);
    }

    fn advance(&self) {
        let done = self.done.fetch_add(1, Ordering::Relaxed) + 1;
        let total = self.total.load(Ordering::Relaxed);
        let step = (total * self.every_pct / 100).max(1);
        if done % step == 0 || done == total {
            tracing::info!(rows_done = done, rows_total = total, "similarity rows computed");
        }
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            rows_done: self.done.load(Ordering::Relaxed),
            rows_total: self.total.load(Ordering::Relaxed),
        }
    }
}

impl Default for Progress {
    fn default() -> Self { Self::new(10) }
}

/// Dense symmetric similarity relation over a document set.
///
/// Only the strict upper triangle is stored (row-major over documents sorted
/// by id), so `similarity(a, a)` is never computed.
#[derive(Debug, Default)]
pub struct SimilarityGraph {
    ids: Vec<DocId>,
    position: HashMap<DocId, usize>,
    upper: Vec<f64>,
}

impl SimilarityGraph {
    pub fn build(docs: &[&Document]) -> Self {
        let progress = Progress::default();
        match Self::compute(docs, None, &progress) {
            Some(graph) => graph,
            None => unreachable!("graph build without a cancellation token cannot be cancelled"),
        }
    }

    /// Like [`build`](Self::build) but checks `cancel` before each row and
    /// reports rows through `progress`.
    pub fn build_cancellable(docs: &[&Document], cancel: &CancellationToken, progress: &Progress) -> Result<Self> {
        Self::compute(docs, Some(cancel), progress).ok_or(Error::Cancelled)
    }

    fn compute(docs: &[&Document], cancel: Option<&CancellationToken>, progress: &Progress) -> Option<Self> {
        let mut sorted: Vec<&Document> = docs.to_vec();
        sorted.sort_by_key(|d| d.id);
        sorted.dedup_by_key(|d| d.id);

        // Intern terms so the pairwise pass compares integers.
        let mut vocab: HashMap<String, u32> = HashMap::new();
        let sets: Vec<Vec<u32>> = sorted
            .iter()
            .map(|d| {
                let mut set: Vec<u32> = d
                    .term_keys()
                    .into_iter()
                    .map(|t| {
                        let next = vocab.len() as u32;
                        *vocab.entry(t).or_insert(next)
                    })
                    .collect();
                set.sort_unstable();
                set.dedup();
                set
            })
            .collect();

        let n = sorted.len();
        progress.start(n);
        let rows: Option<Vec<Vec<f64>>> = (0..n)
            .into_par_iter()
            .map(|i| {
                if cancel.is_some_and(|c| c.is_cancelled()) {
                    return None;
                }
                let row: Vec<f64> = ((i + 1)..n).map(|j| jaccard_sorted(&sets[i], &sets[j])).collect();
                progress.advance();
                Some(row)
            })
            .collect();
        let rows = rows?;
        if cancel.is_some_and(|c| c.is_cancelled()) {
            return None;
        }

        let ids: Vec<DocId> = sorted.iter().map(|d| d.id).collect();
        let position = ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        let upper = rows.into_iter().flatten().collect();
        Some(Self { ids, position, upper })
    }

    pub fn len(&self) -> usize { self.ids.len() }

    pub fn is_empty(&self) -> bool { self.ids.is_empty() }

    pub fn pair_count(&self) -> usize { self.upper.len() }

    fn offset(&self, i: usize, j: usize) -> usize {
        // i < j; rows before i hold (n-1) + (n-2) + ... + (n-i) entries
        let n = self.ids.len();
        i * (2 * n - i - 1) / 2 + (j - i - 1)
    }

    /// `None` for a self-pair or an id outside the graph.
    pub fn similarity(&self, a: DocId, b: DocId) -> Option<f64> {
        let (&pa, &pb) = (self.position.get(&a)?, self.position.get(&b)?);
        let (i, j) = match pa.cmp(&pb) {
            std::cmp::Ordering::Less => (pa, pb),
            std::cmp::Ordering::Greater => (pb, pa),
            std::cmp::Ordering::Equal => return None,
        };
        Some(self.upper[self.offset(i, j)])
    }

    /// Mean similarity of every document to all others, in ascending id order.
    /// All zeros for a corpus of zero or one document.
    pub fn centrality(&self) -> Vec<(DocId, f64)> {
        let n = self.ids.len();
        if n <= 1 {
            return self.ids.iter().map(|id| (*id, 0.0)).collect();
        }
        let mut sums = vec![0.0f64; n];
        let mut k = 0;
        for i in 0..n {
            for j in (i + 1)..n {
                let s = self.upper[k];
                sums[i] += s;
                sums[j] += s;
                k += 1;
            }
        }
        let denom = (n - 1) as f64;
        self.ids.iter().zip(sums).map(|(id, s)| (*id, (s / denom).clamp(0.0, 1.0))).collect()
    }

    /// Every unordered pair whose similarity is at least `threshold`.
    pub fn edges(&self, threshold: f64) -> Vec<SimilarityEdge> {
        let n = self.ids.len();
        let mut out = Vec::new();
        let mut k = 0;
        for i in 0..n {
            for j in (i + 1)..n {
                let w = self.upper[k];
                k += 1;
                if w >= threshold {
                    if let Some(edge) = SimilarityEdge::new(self.ids[i], self.ids[j], w) {
                        out.push(edge);
                    }
                }
            }
        }
        out
    }
}

/// Build the thresholded neighbor edge list consumed by the edge store.
pub fn link_edges(docs: &[&Document], threshold: f64) -> Vec<SimilarityEdge> {
    let graph = SimilarityGraph::build(docs);
    let edges = graph.edges(threshold);
    tracing::info!(documents = graph.len(), edges = edges.len(), threshold, "linked documents");
    edges
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: DocId, terms: &[&str]) -> Document {
        Document::new(id, format!("doc {id}")).with_terms(terms.iter().map(|t| (*t, 1)))
    }

    fn refs(docs: &[Document]) -> Vec<&Document> { docs.iter().collect() }

    #[test]
    fn worked_example() {
        let docs = vec![doc(1, &["a", "b", "c"]), doc(2, &["b", "c", "d"]), doc(3, &["x", "y"])];
        let graph = SimilarityGraph::build(&refs(&docs));
        assert_eq!(graph.similarity(1, 2), Some(0.5));
        assert_eq!(graph.similarity(1, 3), Some(0.0));
        assert_eq!(graph.similarity(2, 3), Some(0.0));
        assert_eq!(graph.centrality(), vec![(1, 0.25), (2, 0.25), (3, 0.0)]);
    }

    #[test]
    fn symmetric_and_no_self_pairs() {
        let docs = vec![doc(5, &["a", "b"]), doc(2, &["b", "c"]), doc(9, &["a", "c", "d"])];
        let graph = SimilarityGraph::build(&refs(&docs));
        for a in [2, 5, 9] {
            assert_eq!(graph.similarity(a, a), None);
            for b in [2, 5, 9] {
                assert_eq!(graph.similarity(a, b), graph.similarity(b, a));
            }
        }
        assert_eq!(graph.pair_count(), 3);
    }

    #[test]
    fn disjoint_and_identical_sets() {
        let a = doc(1, &["x", "y"]);
        let b = doc(2, &["p", "q"]);
        let c = doc(3, &["y", "x"]);
        assert_eq!(jaccard(&a, &b), 0.0);
        assert_eq!(jaccard(&a, &c), 1.0);
    }

    #[test]
    fn case_variants_are_one_term() {
        let docs = vec![doc(1, &["Whale", "sea"]), doc(2, &["whale", " SEA "])];
        assert_eq!(jaccard(&docs[0], &docs[1]), 1.0);
        let graph = SimilarityGraph::build(&refs(&docs));
        assert_eq!(graph.similarity(1, 2), Some(1.0));
    }

    #[test]
    fn empty_bags_contribute_zero() {
        let docs = vec![doc(1, &[]), doc(2, &[]), doc(3, &["a"])];
        let graph = SimilarityGraph::build(&refs(&docs));
        assert_eq!(graph.similarity(1, 2), Some(0.0));
        for (_, c) in graph.centrality() {
            assert_eq!(c, 0.0);
        }
    }

    #[test]
    fn singleton_and_empty_corpus() {
        let docs = vec![doc(1, &["a"])];
        assert_eq!(SimilarityGraph::build(&refs(&docs)).centrality(), vec![(1, 0.0)]);
        assert!(SimilarityGraph::build(&[]).centrality().is_empty());
    }

    #[test]
    fn centrality_is_bounded() {
        let docs: Vec<Document> = (0..20u32)
            .map(|i| {
                let terms: Vec<String> = (i..i + 5).map(|t| format!("t{}", t % 7)).collect();
                let keys: Vec<&str> = terms.iter().map(String::as_str).collect();
                doc(i, &keys)
            })
            .collect();
        let graph = SimilarityGraph::build(&refs(&docs));
        for (_, c) in graph.centrality() {
            assert!((0.0..=1.0).contains(&c));
        }
    }

    #[test]
    fn cancelled_build_returns_error() {
        let docs = vec![doc(1, &["a"]), doc(2, &["a"])];
        let token = CancellationToken::new();
        token.cancel();
        let err = SimilarityGraph::build_cancellable(&refs(&docs), &token, &Progress::default()).unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[test]
    fn progress_counts_rows() {
        let docs = vec![doc(1, &["a"]), doc(2, &["a"]), doc(3, &["b"])];
        let progress = Progress::new(50);
        SimilarityGraph::build_cancellable(&refs(&docs), &CancellationToken::new(), &progress).unwrap();
        assert_eq!(progress.snapshot(), ProgressSnapshot { rows_done: 3, rows_total: 3 });
    }

    #[test]
    fn link_edges_applies_threshold() {
        let docs = vec![doc(1, &["a", "b", "c"]), doc(2, &["b", "c", "d"]), doc(3, &["c", "x", "y", "z"])];
        let edges = link_edges(&refs(&docs), 0.2);
        assert_eq!(edges.len(), 1);
        assert_eq!((edges[0].a, edges[0].b, edges[0].weight), (1, 2, 0.5));
    }
}
