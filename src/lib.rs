//! # ObsidianRAG
//!
//! **A local-first hybrid-retrieval, streaming question-answering system
//! over a personal Markdown vault.**
//!
//! ObsidianRAG indexes a folder of Markdown notes into a vector store and a
//! lexical (BM25) index, then answers questions by fusing both retrieval
//! paths, optionally reranking and following wiki-links, and streaming the
//! generated answer back over Server-Sent Events.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌─────────┐   ┌──────────────┐   ┌───────────────┐
//! │   Vault   │──▶│ Indexer │──▶│ Vector Store │   │ Lexical Store │
//! │ (*.md)    │   │         │──▶│ (SQLite)     │   │ (in-RAM BM25) │
//! └───────────┘   └─────────┘   └──────┬───────┘   └───────┬───────┘
//!                                      │                   │
//!                                      ▼                   ▼
//!                              ┌───────────────────────────────┐
//!                              │       Hybrid Retriever         │
//!                              └───────────────┬───────────────┘
//!                                              ▼
//!                              ┌───────────────────────────────┐
//!                              │  Reranker → Graph Expander     │
//!                              └───────────────┬───────────────┘
//!                                              ▼
//!                              ┌───────────────────────────────┐
//!                              │       QA Orchestrator          │──▶ Language model host
//!                              └───────────────┬───────────────┘
//!                                              ▼
//!                              ┌───────────────────────────────┐
//!                              │     HTTP/SSE surface (Axum)    │──▶ Client
//!                              └───────────────────────────────┘
//! ```
//!
//! ## Data Flow
//!
//! 1. The **Indexer** ([`indexer`]) walks the vault, diffs file content
//!    hashes against the **Manifest** ([`manifest`]), and chunks
//!    ([`chunk`]) changed files.
//! 2. Chunks are embedded via the configured **Embedder** ([`embedder`])
//!    and upserted into the **Vector Store** ([`vector_store`]); the
//!    **Lexical Store** ([`lexical_store`]) is rebuilt from the same
//!    persisted chunk text.
//! 3. A question is answered by the **Hybrid Retriever** ([`retriever`]),
//!    which fuses concurrent lexical and vector queries, then optionally
//!    reranked ([`reranker`]) and graph-expanded ([`graph_expander`]).
//! 4. The **QA Orchestrator** ([`orchestrator`]) assembles the context,
//!    calls the **language model client** ([`llm_client`]), and emits a
//!    strictly ordered sequence of progress events.
//! 5. The **HTTP/SSE surface** ([`server`]) exposes `/health`, `/stats`,
//!    `/ask`, `/ask/stream`, and `/rebuild_db` over loopback HTTP.
//!
//! ## Quick Start
//!
//! ```bash
//! obsidianrag index --vault ~/notes           # build the index
//! obsidianrag stats --vault ~/notes           # inspect what was indexed
//! obsidianrag serve --vault ~/notes --port 8000
//! curl -N -X POST localhost:8000/ask/stream -d '{"text":"what did I decide about X?"}'
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML + environment configuration, composed once at startup |
//! | [`models`] | Core data types: `Chunk`, `VectorRecord`, `RetrievalCandidate`, `ScoredSource` |
//! | [`chunk`] | Overlapping-window text chunker and wiki-link extraction |
//! | [`embedder`] | Embedding provider trait, HTTP and local (`fastembed`) implementations |
//! | [`vector_store`] | Persisted (vector, metadata, text) store, cosine-scored |
//! | [`lexical_store`] | In-memory BM25 index over chunk text (`tantivy`) |
//! | [`manifest`] | Per-file content-hash bookkeeping for incremental reindexing |
//! | [`indexer`] | Walks the vault, diffs against the Manifest, drives the two stores |
//! | [`retriever`] | Hybrid Retriever: concurrent lexical + vector queries, fused and sorted |
//! | [`reranker`] | Cross-encoder re-scoring and minimum-score filtering |
//! | [`graph_expander`] | Depth-1 wiki-link expansion of retrieved candidates |
//! | [`llm_client`] | Client for the upstream streaming language-model host |
//! | [`orchestrator`] | The question-session state machine and its event sequence |
//! | [`server`] | HTTP/SSE surface (Axum) |
//! | [`stats`] | Vault statistics |
//! | [`error`] | The error category surface shared by the HTTP and SSE paths |
//!
//! ## Configuration
//!
//! ObsidianRAG is configured via CLI flags composed with built-in defaults
//! and `OBSIDIANRAG_*` environment overrides. See [`config`] for all
//! available fields and validation rules.

pub mod chunk;
pub mod config;
pub mod embedder;
pub mod error;
pub mod graph_expander;
pub mod indexer;
pub mod lexical_store;
pub mod llm_client;
pub mod manifest;
pub mod models;
pub mod orchestrator;
pub mod reranker;
pub mod retriever;
pub mod server;
pub mod stats;
pub mod vector_store;
