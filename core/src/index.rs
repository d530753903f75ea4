use crate::error::{Error, Result};
use crate::{DocId, Document};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Lowercase and trim. The single normalization applied at the query boundary
/// and to index keys.
pub fn normalize_term(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Compile a case-insensitive pattern as used by regex queries over index
/// terms and titles.
pub fn compile_pattern(pattern: &str) -> Result<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|source| Error::InvalidPattern { pattern: pattern.to_string(), source })
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TermEntry {
    /// document id -> occurrences of the term in that document
    pub docs: BTreeMap<DocId, u32>,
    pub total_docs: u32,
}

/// Inverted index from normalized term to the documents whose top-term bag
/// contains it. Derived data: always rebuilt from a full document snapshot.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct TermIndex {
    terms: HashMap<String, TermEntry>,
    num_docs: u32,
}

impl TermIndex {
    pub fn new() -> Self { Self::default() }

    pub fn build<'a, I>(docs: I) -> Self
    where
        I: IntoIterator<Item = &'a Document>,
    {
        let mut index = Self::new();
        for doc in docs {
            index.num_docs += 1;
            for (term, count) in &doc.top_terms {
                if *count == 0 { continue; }
                let key = normalize_term(term);
                if key.is_empty() { continue; }
                let entry = index.terms.entry(key).or_default();
                *entry.docs.entry(doc.id).or_insert(0) += count;
            }
        }
        for entry in index.terms.values_mut() {
            entry.total_docs = entry.docs.len() as u32;
        }
        index
    }

    pub fn len(&self) -> usize { self.terms.len() }

    pub fn is_empty(&self) -> bool { self.terms.is_empty() }

    pub fn num_docs(&self) -> u32 { self.num_docs }

    pub fn entry(&self, term: &str) -> Option<&TermEntry> { self.terms.get(term) }

    pub fn occurrences(&self, term: &str, doc: DocId) -> u32 {
        self.terms.get(term).and_then(|e| e.docs.get(&doc)).copied().unwrap_or(0)
    }

    /// Documents containing exactly `term`. The term must already be normalized.
    pub fn lookup_exact(&self, term: &str) -> BTreeSet<DocId> {
        self.terms
            .get(term)
            .map(|e| e.docs.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Union of the documents of every index term matching `pattern`.
    pub fn lookup_regex(&self, pattern: &str) -> Result<BTreeSet<DocId>> {
        let re = compile_pattern(pattern)?;
        Ok(self.lookup_matching(&re))
    }

    pub fn lookup_matching(&self, re: &Regex) -> BTreeSet<DocId> {
        let mut out = BTreeSet::new();
        for (term, entry) in &self.terms {
            if re.is_match(term) {
                out.extend(entry.docs.keys().copied());
            }
        }
        out
    }
}
