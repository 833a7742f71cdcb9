//! # ObsidianRAG
//!
//! A local-first hybrid-retrieval, streaming question-answering system over
//! a personal Markdown vault.
//!
//! ## Architecture
//!
//! ```text
//! Vault (.md files) → Indexer → Vector Store + Lexical Store
//!                                        |
//! Question → Hybrid Retriever → Reranker → Graph Expander → QA Orchestrator
//!                                                                  |
//!                                             Language model host (streaming)
//!                                                                  |
//!                                              HTTP/SSE surface → Client
//! ```
//!
//! ## Modules
//!
//! - [`config`] — TOML + environment configuration, composed once at startup
//! - [`models`] — Core data types: `Chunk`, `VectorRecord`, `RetrievalCandidate`, `ScoredSource`
//! - [`chunk`] — Overlapping-window text chunker and wiki-link extraction
//! - [`embedder`] — Embedding provider trait, HTTP and local (fastembed) implementations
//! - [`vector_store`] — Persisted (vector, metadata, text) store, cosine-scored
//! - [`lexical_store`] — In-memory BM25 index over chunk text
//! - [`manifest`] — Per-file content-hash bookkeeping for incremental reindexing
//! - [`indexer`] — Walks the vault, diffs against the Manifest, drives the two stores
//! - [`retriever`] — Hybrid Retriever: fuses lexical and vector results
//! - [`reranker`] — Cross-encoder re-scoring and score-threshold filtering
//! - [`graph_expander`] — Depth-1 wiki-link expansion of retrieved candidates
//! - [`llm_client`] — Client for the upstream streaming language-model host
//! - [`orchestrator`] — The question-session state machine and its event sequence
//! - [`server`] — HTTP/SSE surface (Axum)
//! - [`stats`] — Vault statistics

mod chunk;
mod config;
mod embedder;
mod error;
mod graph_expander;
mod indexer;
mod lexical_store;
mod llm_client;
mod manifest;
mod models;
mod orchestrator;
mod reranker;
mod retriever;
mod server;
mod stats;
mod vector_store;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use config::Config;
use embedder::{create_embedder, Embedder};
use graph_expander::GraphExpander;
use indexer::Indexer;
use lexical_store::LexicalStore;
use llm_client::LlmClient;
use orchestrator::QaOrchestrator;
use reranker::Reranker;
use retriever::HybridRetriever;
use vector_store::VectorStore;

#[derive(Parser)]
#[command(
    name = "obsidianrag",
    about = "ObsidianRAG — local-first hybrid retrieval and streaming Q&A over a Markdown vault",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index the vault (if needed) and start the HTTP/SSE server.
    Serve {
        /// Path to the Obsidian vault root.
        #[arg(long)]
        vault: PathBuf,

        /// Port to bind the HTTP server to.
        #[arg(long)]
        port: Option<u16>,

        /// Language model to request from the upstream host.
        #[arg(long)]
        model: Option<String>,

        /// Disable the cross-encoder reranking stage.
        #[arg(long)]
        no_reranker: bool,
    },

    /// Index the vault without starting the server.
    Index {
        /// Path to the Obsidian vault root.
        #[arg(long)]
        vault: PathBuf,

        /// Ignore the Manifest and reindex every file from scratch.
        #[arg(long)]
        force: bool,
    },

    /// Print vault statistics.
    Stats {
        /// Path to the Obsidian vault root.
        #[arg(long)]
        vault: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "obsidianrag=info,tower_http=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { vault, port, model, no_reranker } => {
            let use_reranker = if no_reranker { Some(false) } else { None };
            let config = config::from_cli(vault, port, model, use_reranker)?;
            run_serve(config).await?;
        }
        Commands::Index { vault, force } => {
            let config = config::from_cli(vault, None, None, None)?;
            run_index(config, force).await?;
        }
        Commands::Stats { vault } => {
            let config = config::from_cli(vault, None, None, None)?;
            run_stats_command(config).await?;
        }
    }

    Ok(())
}

/// Build the three indexing-side collaborators (embedder, stores, Indexer)
/// shared by every subcommand.
async fn build_indexer(config: &Config) -> anyhow::Result<Arc<Indexer>> {
    std::fs::create_dir_all(config.state_dir())?;

    let embedder: Arc<dyn Embedder> = Arc::from(create_embedder(config)?);
    let vector_store = Arc::new(VectorStore::open(&config.db_dir()).await?);
    let lexical_store = Arc::new(LexicalStore::new()?);

    let indexer = Indexer::new(
        config.vault_path.clone(),
        config.manifest_path(),
        config.chunk_size,
        config.chunk_overlap,
        vector_store,
        lexical_store,
        embedder,
    )?;

    Ok(Arc::new(indexer))
}

async fn run_index(config: Config, force: bool) -> anyhow::Result<()> {
    let indexer = build_indexer(&config).await?;
    let report = indexer.index(force).await?;
    println!("Indexed {} chunks from {}.", report.total_chunks, config.vault_path.display());
    Ok(())
}

async fn run_stats_command(config: Config) -> anyhow::Result<()> {
    let indexer = build_indexer(&config).await?;
    indexer.index(false).await?;
    stats::run_stats(&config, indexer.vector_store()).await
}

async fn run_serve(config: Config) -> anyhow::Result<()> {
    let indexer = build_indexer(&config).await?;
    indexer.index(false).await?;

    let retriever = Arc::new(HybridRetriever::new(
        indexer.vector_store().clone(),
        indexer.lexical_store().clone(),
        indexer.embedder().clone(),
        &config,
    ));
    let reranker = Arc::new(Reranker::new(&config));
    let graph_expander = Arc::new(GraphExpander::new(indexer.vector_store().clone()));
    let llm_client = Arc::new(LlmClient::new(config.ollama_base_url.clone()));

    let orchestrator = Arc::new(QaOrchestrator::new(
        retriever,
        reranker,
        graph_expander,
        llm_client,
        config.llm_model.clone(),
    ));

    server::run_server(Arc::new(config), orchestrator, indexer).await
}
