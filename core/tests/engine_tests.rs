use bookrank_core::{
    CancellationToken, DocId, Document, DocumentStore, EdgeStore, EngineConfig, Error, MemoryDocumentStore,
    MemoryEdgeStore, SearchEngine, SimilarityEdge, SledStore,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;

fn book(id: DocId, title: &str, terms: &[&str], centrality: f64) -> Document {
    Document::new(id, title).with_terms(terms.iter().map(|t| (*t, 1))).with_centrality(centrality)
}

fn corpus() -> Vec<Document> {
    vec![
        book(1, "Alice in Wonderland", &["a", "b", "c"], 0.5),
        book(2, "Through the Looking-Glass", &["b", "c", "d"], 0.5),
        book(3, "Moby Dick", &["x", "y"], 0.5),
    ]
}

/// Memory store whose batch write-back always fails.
struct FailingWrites(MemoryDocumentStore);

impl DocumentStore for FailingWrites {
    fn load_all(&self) -> bookrank_core::Result<Vec<Document>> { self.0.load_all() }

    fn upsert_many(&self, docs: &[Document]) -> bookrank_core::Result<()> { self.0.upsert_many(docs) }

    fn update_centralities(&self, _scores: &[(DocId, f64)]) -> bookrank_core::Result<()> {
        Err(Error::Store("disk full".into()))
    }
}

/// Memory store that, once armed, parks `load_all` until released.
struct GatedStore {
    inner: MemoryDocumentStore,
    armed: AtomicBool,
    entered: Mutex<Sender<()>>,
    release: Mutex<Receiver<()>>,
}

impl DocumentStore for GatedStore {
    fn load_all(&self) -> bookrank_core::Result<Vec<Document>> {
        if self.armed.swap(false, Ordering::SeqCst) {
            self.entered.lock().unwrap().send(()).unwrap();
            self.release.lock().unwrap().recv().unwrap();
        }
        self.inner.load_all()
    }

    fn upsert_many(&self, docs: &[Document]) -> bookrank_core::Result<()> { self.inner.upsert_many(docs) }

    fn update_centralities(&self, scores: &[(DocId, f64)]) -> bookrank_core::Result<()> {
        self.inner.update_centralities(scores)
    }
}

fn gated_store() -> (Arc<GatedStore>, Receiver<()>, Sender<()>) {
    let (entered_tx, entered_rx) = channel();
    let (release_tx, release_rx) = channel();
    let store = Arc::new(GatedStore {
        inner: MemoryDocumentStore::with_documents(corpus()),
        armed: AtomicBool::new(false),
        entered: Mutex::new(entered_tx),
        release: Mutex::new(release_rx),
    });
    (store, entered_rx, release_tx)
}

#[test]
fn failed_write_back_commits_nothing() {
    let store = Arc::new(FailingWrites(MemoryDocumentStore::with_documents(corpus())));
    let engine = SearchEngine::new(EngineConfig::default(), store.clone(), Arc::new(MemoryEdgeStore::new())).unwrap();

    let err = engine.recompute_centrality(&CancellationToken::new()).unwrap_err();
    assert!(matches!(err, Error::RecomputeFailure(_)), "{err}");
    for id in [1, 2, 3] {
        assert_eq!(engine.get(id).unwrap().centrality, 0.5);
        assert_eq!(store.0.get(id).unwrap().centrality, 0.5);
    }
    assert!(engine.recompute_progress().is_none());
}

#[test]
fn only_one_recompute_in_flight() {
    let (store, entered_rx, release_tx) = gated_store();
    let engine = Arc::new(SearchEngine::new(EngineConfig::default(), store.clone(), Arc::new(MemoryEdgeStore::new())).unwrap());
    store.armed.store(true, Ordering::SeqCst);

    let worker = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || engine.recompute_centrality(&CancellationToken::new()))
    };
    entered_rx.recv().unwrap();

    assert!(engine.recompute_progress().is_some());
    let err = engine.recompute_centrality(&CancellationToken::new()).unwrap_err();
    assert!(matches!(err, Error::RecomputeInProgress));
    // Readers are not blocked by the running recompute.
    assert_eq!(engine.search_by_keyword("b").len(), 2);

    release_tx.send(()).unwrap();
    let report = worker.join().unwrap().unwrap();
    assert_eq!(report.documents, 3);
    assert_eq!(engine.get(1).unwrap().centrality, 0.25);
}

#[test]
fn readers_never_observe_a_partial_snapshot() {
    let store = Arc::new(MemoryDocumentStore::with_documents(corpus()));
    let engine = Arc::new(SearchEngine::new(EngineConfig::default(), store, Arc::new(MemoryEdgeStore::new())).unwrap());
    let stop = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let engine = Arc::clone(&engine);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    let page = engine.list_by_centrality(0, 10).unwrap();
                    let mut scores: Vec<(DocId, f64)> = page.items.iter().map(|d| (d.id, d.centrality)).collect();
                    scores.sort_by_key(|(id, _)| *id);
                    let old = vec![(1, 0.5), (2, 0.5), (3, 0.5)];
                    let new = vec![(1, 0.25), (2, 0.25), (3, 0.0)];
                    assert!(scores == old || scores == new, "mixed snapshot: {scores:?}");
                }
            })
        })
        .collect();

    for _ in 0..20 {
        engine.recompute_centrality(&CancellationToken::new()).unwrap();
    }
    stop.store(true, Ordering::Relaxed);
    for r in readers {
        r.join().unwrap();
    }
}

#[test]
fn refresh_picks_up_store_changes() {
    let store = Arc::new(MemoryDocumentStore::with_documents(corpus()));
    let engine = SearchEngine::new(EngineConfig::default(), store.clone(), Arc::new(MemoryEdgeStore::new())).unwrap();
    store.upsert_many(&[book(4, "New Arrival", &["zebra"], 0.0)]).unwrap();

    assert!(engine.search_by_keyword("zebra").is_empty());
    engine.refresh().unwrap();
    assert_eq!(engine.search_by_keyword("zebra").len(), 1);
}

#[test]
fn sled_backed_engine_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SledStore::open(dir.path().join("db")).unwrap());
    store.upsert_many(&corpus()).unwrap();

    let docs = store.load_all().unwrap();
    let doc_refs: Vec<&Document> = docs.iter().collect();
    let edges: Vec<SimilarityEdge> = bookrank_core::link_edges(&doc_refs, 0.1);
    store.replace_all(&edges).unwrap();

    let engine = SearchEngine::new(EngineConfig::default(), store.clone(), store.clone()).unwrap();
    engine.recompute_centrality(&CancellationToken::new()).unwrap();

    assert_eq!(store.get(1).unwrap().unwrap().centrality, 0.25);
    assert_eq!(store.get(3).unwrap().unwrap().centrality, 0.0);
    let suggestions: Vec<DocId> = engine.suggestions_for(1, 5).unwrap().iter().map(|d| d.id).collect();
    assert_eq!(suggestions, vec![2]);
    let hits: Vec<DocId> = engine.search_by_keyword("C").iter().map(|d| d.id).collect();
    assert_eq!(hits, vec![1, 2]);
}

#[test]
fn refresh_loaded_before_recompute_does_not_roll_back_scores() {
    let (store, entered, release) = gated_store();
    let engine = Arc::new(SearchEngine::new(EngineConfig::default(), store.clone(), Arc::new(MemoryEdgeStore::new())).unwrap());
    store.armed.store(true, Ordering::SeqCst);

    let refresher = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || engine.refresh())
    };
    // The refresh now holds the pre-recompute corpus.
    entered.recv().unwrap();
    let recomputer = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || engine.recompute_centrality(&CancellationToken::new()))
    };
    release.send(()).unwrap();
    refresher.join().unwrap().unwrap();
    recomputer.join().unwrap().unwrap();

    for (id, expected) in [(1, 0.25), (2, 0.25), (3, 0.0)] {
        assert_eq!(store.inner.get(id).unwrap().centrality, expected);
        assert_eq!(engine.get(id).unwrap().centrality, expected);
    }
}

#[test]
fn refresh_during_recompute_serves_the_new_scores() {
    let (store, entered, release) = gated_store();
    let engine = Arc::new(SearchEngine::new(EngineConfig::default(), store.clone(), Arc::new(MemoryEdgeStore::new())).unwrap());
    store.armed.store(true, Ordering::SeqCst);

    let recomputer = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || engine.recompute_centrality(&CancellationToken::new()))
    };
    entered.recv().unwrap();
    let refresher = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || engine.refresh())
    };
    release.send(()).unwrap();
    recomputer.join().unwrap().unwrap();
    refresher.join().unwrap().unwrap();

    assert_eq!(store.inner.get(1).unwrap().centrality, 0.25);
    assert_eq!(engine.get(1).unwrap().centrality, 0.25);
}
