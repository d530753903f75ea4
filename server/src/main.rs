use anyhow::Result;
use axum::Router;
use bookrank_core::{EngineConfig, SearchEngine, SledStore};
use clap::Parser;
use server::build_app;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
struct Args {
    /// sled database directory written by bookrank-indexer
    #[arg(long, default_value = "./bookrank.db")]
    db: String,
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 8080)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();

    let store = Arc::new(SledStore::open(&args.db)?);
    let engine = SearchEngine::new(EngineConfig::default(), store.clone(), store)?;
    tracing::info!(db = %args.db, documents = engine.snapshot().len(), "engine ready");
    let app: Router = build_app(Arc::new(engine));

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
