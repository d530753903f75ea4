use serde::{Deserialize, Serialize};
use crate::index::normalize_term;
use std::collections::{BTreeMap, BTreeSet};

/// Corpus-assigned external id (the Gutenberg number for this corpus).
pub type DocId = u32;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocId,
    pub title: String,
    /// Author names joined with ", ".
    pub authors: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    /// Category labels joined with the configured delimiter.
    pub categories: String,
    pub download_count: u32,
    pub language: Option<String>,
    pub word_count: Option<u32>,
    pub text_url: Option<String>,
    /// Top terms of the text with their occurrence counts, extracted upstream.
    pub top_terms: BTreeMap<String, u32>,
    #[serde(default)]
    pub centrality: f64,
}

impl Document {
    pub fn new(id: DocId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            authors: String::new(),
            description: None,
            image_url: None,
            categories: String::new(),
            download_count: 0,
            language: None,
            word_count: None,
            text_url: None,
            top_terms: BTreeMap::new(),
            centrality: 0.0,
        }
    }

    pub fn with_terms<I, S>(mut self, terms: I) -> Self
    where
        I: IntoIterator<Item = (S, u32)>,
        S: Into<String>,
    {
        self.top_terms = terms.into_iter().map(|(t, c)| (t.into(), c)).collect();
        self
    }

    pub fn with_categories(mut self, categories: impl Into<String>) -> Self {
        self.categories = categories.into();
        self
    }

    pub fn with_downloads(mut self, download_count: u32) -> Self {
        self.download_count = download_count;
        self
    }

    pub fn with_centrality(mut self, centrality: f64) -> Self {
        self.centrality = centrality;
        self
    }

    /// Normalized terms with a positive count, as the term index keys them.
    /// Zero-count entries are not part of the key set.
    pub fn term_keys(&self) -> BTreeSet<String> {
        self.top_terms
            .iter()
            .filter(|(_, c)| **c > 0)
            .map(|(t, _)| normalize_term(t))
            .filter(|t| !t.is_empty())
            .collect()
    }
}

/// Unordered pair of documents with their Jaccard similarity. `a < b` always.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimilarityEdge {
    pub a: DocId,
    pub b: DocId,
    pub weight: f64,
}

impl SimilarityEdge {
    /// Returns `None` for a self-edge.
    pub fn new(x: DocId, y: DocId, weight: f64) -> Option<Self> {
        match x.cmp(&y) {
            std::cmp::Ordering::Less => Some(Self { a: x, b: y, weight }),
            std::cmp::Ordering::Greater => Some(Self { a: y, b: x, weight }),
            std::cmp::Ordering::Equal => None,
        }
    }

    pub fn other(&self, id: DocId) -> Option<DocId> {
        if id == self.a {
            Some(self.b)
        } else if id == self.b {
            Some(self.a)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page_index: usize,
    pub page_size: usize,
    pub total_items: usize,
    pub total_pages: usize,
}
