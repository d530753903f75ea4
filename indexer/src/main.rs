use anyhow::{Context, Result};
use bookrank_core::persist::CorpusMeta;
use bookrank_core::{
    link_edges, CancellationToken, DocId, Document, DocumentStore, EdgeStore, EngineConfig, SearchEngine, SledStore,
};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tracing_subscriber::{fmt, EnvFilter};
use walkdir::WalkDir;

use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One book as produced by the upstream harvesting step.
#[derive(Debug, Deserialize)]
struct InputBook {
    id: DocId,
    title: String,
    #[serde(default)]
    authors: Vec<String>,
    description: Option<String>,
    image_url: Option<String>,
    #[serde(default)]
    categories: Vec<String>,
    #[serde(default)]
    download_count: u32,
    language: Option<String>,
    word_count: Option<u32>,
    text_url: Option<String>,
    #[serde(default)]
    top_words: BTreeMap<String, u32>,
}

impl InputBook {
    fn into_document(self, delimiter: &str) -> Document {
        Document {
            id: self.id,
            title: self.title,
            authors: self.authors.join(", "),
            description: self.description,
            image_url: self.image_url,
            categories: self.categories.join(delimiter),
            download_count: self.download_count,
            language: self.language,
            word_count: self.word_count,
            text_url: self.text_url,
            top_terms: self.top_words,
            centrality: 0.0,
        }
    }
}

#[derive(Parser)]
#[command(name = "bookrank-indexer")]
#[command(about = "Load the book corpus and maintain centrality scores and neighbor links", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load books from JSON/JSONL files or a directory into the store
    Load {
        /// Input path (file or directory)
        #[arg(long)]
        input: String,
        /// sled database directory
        #[arg(long)]
        db: String,
    },
    /// Recompute every book's centrality (O(n^2) over the whole corpus)
    Recompute {
        #[arg(long)]
        db: String,
    },
    /// Rebuild the neighbor edge list from pairwise similarity
    Link {
        #[arg(long)]
        db: String,
        /// Keep only pairs at least this similar
        #[arg(long, default_value_t = 0.1)]
        threshold: f64,
    },
    /// Print corpus metadata
    Stats {
        #[arg(long)]
        db: String,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Load { input, db } => {
            let store = SledStore::open(&db)?;
            load_corpus(&store, Path::new(&input), &EngineConfig::default())?;
            Ok(())
        }
        Commands::Recompute { db } => {
            let store = Arc::new(SledStore::open(&db)?);
            recompute(store)
        }
        Commands::Link { db, threshold } => {
            let store = SledStore::open(&db)?;
            link(&store, threshold)?;
            Ok(())
        }
        Commands::Stats { db } => stats(&db),
    }
}

fn input_files(input: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    if input.is_dir() {
        for entry in WalkDir::new(input).into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file() && matches!(p.extension().and_then(|s| s.to_str()), Some("json" | "jsonl")) {
                files.push(p.to_path_buf());
            }
        }
        files.sort();
    } else if input.is_file() {
        files.push(input.to_path_buf());
    }
    files
}

fn read_books(file: &Path) -> Result<Vec<InputBook>> {
    let reader = BufReader::new(File::open(file).with_context(|| format!("opening {}", file.display()))?);
    if file.extension().and_then(|s| s.to_str()) == Some("jsonl") {
        let mut books = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() { continue; }
            books.push(serde_json::from_str(&line).with_context(|| format!("parsing {}", file.display()))?);
        }
        return Ok(books);
    }
    let json: serde_json::Value = serde_json::from_reader(reader)?;
    match json {
        serde_json::Value::Array(arr) => Ok(arr.into_iter().map(serde_json::from_value).collect::<std::result::Result<Vec<InputBook>, _>>()?),
        serde_json::Value::Object(_) => Ok(vec![serde_json::from_value(json)?]),
        _ => Ok(Vec::new()),
    }
}

/// Insert books not yet in the store. Existing records, and their
/// centrality, are left untouched.
fn load_corpus(store: &SledStore, input: &Path, config: &EngineConfig) -> Result<usize> {
    let mut seen: HashSet<DocId> = store.load_all()?.into_iter().map(|d| d.id).collect();
    let mut fresh: Vec<Document> = Vec::new();
    let mut skipped = 0usize;
    for file in input_files(input) {
        for book in read_books(&file)? {
            if !seen.insert(book.id) {
                skipped += 1;
                continue;
            }
            fresh.push(book.into_document(&config.category_delimiter));
        }
    }
    store.upsert_many(&fresh)?;
    tracing::info!(inserted = fresh.len(), skipped, "books loaded");
    write_meta(store)?;
    Ok(fresh.len())
}

fn recompute(store: Arc<SledStore>) -> Result<()> {
    let engine = SearchEngine::new(EngineConfig::default(), store.clone(), store.clone())?;
    let report = engine.recompute_centrality(&CancellationToken::new())?;
    tracing::info!(documents = report.documents, pairs = report.pairs, took_s = report.took_s, "centralities saved");
    write_meta(&store)
}

fn link(store: &SledStore, threshold: f64) -> Result<usize> {
    let docs = store.load_all()?;
    let refs: Vec<&Document> = docs.iter().collect();
    let edges = link_edges(&refs, threshold);
    store.replace_all(&edges)?;
    write_meta(store)?;
    Ok(edges.len())
}

fn write_meta(store: &SledStore) -> Result<()> {
    let meta = CorpusMeta {
        num_docs: store.num_docs() as u32,
        num_edges: (store.num_edge_entries() / 2) as u64,
        updated_at: time::OffsetDateTime::now_utc()
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_else(|_| "".into()),
        version: 1,
    };
    store.save_meta(&meta)?;
    Ok(())
}

fn stats(db: &str) -> Result<()> {
    let store = SledStore::open(db)?;
    match store.load_meta()? {
        Some(meta) => println!("{}", serde_json::to_string_pretty(&meta)?),
        None => println!("{{\"num_docs\": {}}}", store.num_docs()),
    }
    Ok(())
}
