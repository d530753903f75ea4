use crate::error::{Error, Result};
use crate::store::{DocumentStore, EdgeStore};
use crate::{DocId, Document, SimilarityEdge};
use serde::{Deserialize, Serialize};
use std::path::Path;

const DOCS_TREE: &str = "documents";
const EDGES_TREE: &str = "edges";
const META_TREE: &str = "meta";
const CORPUS_META_KEY: &str = "corpus";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusMeta {
    pub num_docs: u32,
    pub num_edges: u64,
    pub updated_at: String,
    pub version: u32,
}

/// Document and edge records on one sled database.
///
/// Documents are bincode-encoded under their big-endian id. Each edge is
/// stored twice, under `(from, to)` and `(to, from)` big-endian keys with the
/// weight as the value, so a prefix scan on one id yields all its neighbors.
#[derive(Clone)]
pub struct SledStore {
    db: sled::Db,
    docs: sled::Tree,
    edges: sled::Tree,
    meta: sled::Tree,
}

impl SledStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Throwaway database removed on drop.
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> Result<Self> {
        let docs = db.open_tree(DOCS_TREE)?;
        let edges = db.open_tree(EDGES_TREE)?;
        let meta = db.open_tree(META_TREE)?;
        Ok(Self { db, docs, edges, meta })
    }

    pub fn get(&self, id: DocId) -> Result<Option<Document>> {
        match self.docs.get(id.to_be_bytes())? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn num_docs(&self) -> usize { self.docs.len() }

    /// Directed entries; every undirected edge counts twice.
    pub fn num_edge_entries(&self) -> usize { self.edges.len() }

    pub fn save_meta(&self, meta: &CorpusMeta) -> Result<()> {
        let json = serde_json::to_vec_pretty(meta)?;
        self.meta.insert(CORPUS_META_KEY, json)?;
        self.db.flush()?;
        Ok(())
    }

    pub fn load_meta(&self) -> Result<Option<CorpusMeta>> {
        match self.meta.get(CORPUS_META_KEY)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }
}

fn edge_key(from: DocId, to: DocId) -> [u8; 8] {
    let mut key = [0u8; 8];
    key[..4].copy_from_slice(&from.to_be_bytes());
    key[4..].copy_from_slice(&to.to_be_bytes());
    key
}

fn decode_edge(key: &[u8], value: &[u8]) -> Result<(DocId, f64)> {
    let to: [u8; 4] = key
        .get(4..8)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| Error::Store(format!("malformed edge key of {} bytes", key.len())))?;
    let weight: [u8; 8] = value
        .try_into()
        .map_err(|_| Error::Store(format!("malformed edge weight of {} bytes", value.len())))?;
    Ok((DocId::from_be_bytes(to), f64::from_be_bytes(weight)))
}

impl DocumentStore for SledStore {
    fn load_all(&self) -> Result<Vec<Document>> {
        let mut out = Vec::with_capacity(self.docs.len());
        for item in self.docs.iter() {
            let (_, bytes) = item?;
            out.push(bincode::deserialize(&bytes)?);
        }
        Ok(out)
    }

    fn upsert_many(&self, docs: &[Document]) -> Result<()> {
        let mut batch = sled::Batch::default();
        for doc in docs {
            batch.insert(&doc.id.to_be_bytes()[..], bincode::serialize(doc)?);
        }
        self.docs.apply_batch(batch)?;
        self.db.flush()?;
        Ok(())
    }

    fn update_centralities(&self, scores: &[(DocId, f64)]) -> Result<()> {
        // Encode every record first; the batch is only applied once all ids resolve.
        let mut batch = sled::Batch::default();
        for (id, score) in scores {
            let mut doc = self.get(*id)?.ok_or(Error::UnknownDocument(*id))?;
            doc.centrality = *score;
            batch.insert(&id.to_be_bytes()[..], bincode::serialize(&doc)?);
        }
        self.docs.apply_batch(batch)?;
        self.db.flush()?;
        Ok(())
    }
}

impl EdgeStore for SledStore {
    fn edges_for(&self, id: DocId) -> Result<Vec<(DocId, f64)>> {
        let mut out = Vec::new();
        for item in self.edges.scan_prefix(id.to_be_bytes()) {
            let (key, value) = item?;
            out.push(decode_edge(&key, &value)?);
        }
        Ok(out)
    }

    fn replace_all(&self, edges: &[SimilarityEdge]) -> Result<()> {
        // Removals and inserts go in one batch; a later insert of the same key wins.
        let mut batch = sled::Batch::default();
        for key in self.edges.iter().keys() {
            batch.remove(key?);
        }
        for e in edges {
            let w = e.weight.to_be_bytes();
            batch.insert(&edge_key(e.a, e.b)[..], &w[..]);
            batch.insert(&edge_key(e.b, e.a)[..], &w[..]);
        }
        self.edges.apply_batch(batch)?;
        self.db.flush()?;
        Ok(())
    }
}
