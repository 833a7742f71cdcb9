//! The QA Orchestrator: the Idle → Retrieving → Generating state machine
//! that drives one question from receipt to a final answer, emitting
//! progress events along the way.
//!
//! Event tagging is grounded in `vyotiq-ai-vyotiq-agent/src/state.rs`'s
//! `ServerEvent` broadcast enum, adapted here to a per-session bounded
//! `mpsc` channel (one producer, one SSE consumer) rather than a fan-out
//! broadcast, since each session needs a strict, private event order
//! rather than all-client delivery.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::AppError;
use crate::graph_expander::GraphExpander;
use crate::llm_client::LlmClient;
use crate::models::ScoredSource;
use crate::reranker::Reranker;
use crate::retriever::HybridRetriever;

/// Temperature passed to the generator, fixed low for deterministic,
/// grounded answers over creative ones.
const GENERATION_TEMPERATURE: f64 = 0.1;

/// How long the token loop waits for the next fragment before concluding the
/// generator has stalled and tearing the session down.
const TOKEN_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// One progress event in a question session's lazy sequence.
#[derive(Debug, Clone)]
pub enum SseEvent {
    Start { session_id: String },
    Phase { phase: &'static str, message: String },
    RetrievalInfo { total_found: usize, after_filter: usize },
    ContextInfo { num_docs: usize, total_chars: usize },
    Ttft { seconds: f64 },
    Token { content: String },
    Sources { sources: Vec<ScoredSource> },
    Done,
    Error { message: String, category: &'static str },
}

impl SseEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SseEvent::Start { .. } => "start",
            SseEvent::Phase { .. } => "phase",
            SseEvent::RetrievalInfo { .. } => "retrieval_info",
            SseEvent::ContextInfo { .. } => "context_info",
            SseEvent::Ttft { .. } => "ttft",
            SseEvent::Token { .. } => "token",
            SseEvent::Sources { .. } => "sources",
            SseEvent::Done => "done",
            SseEvent::Error { .. } => "error",
        }
    }

    pub fn payload(&self) -> serde_json::Value {
        match self {
            SseEvent::Start { session_id } => serde_json::json!({ "session_id": session_id }),
            SseEvent::Phase { phase, message } => serde_json::json!({ "phase": phase, "message": message }),
            SseEvent::RetrievalInfo { total_found, after_filter } => {
                serde_json::json!({ "total_found": total_found, "after_filter": after_filter })
            }
            SseEvent::ContextInfo { num_docs, total_chars } => {
                serde_json::json!({ "num_docs": num_docs, "total_chars": total_chars })
            }
            SseEvent::Ttft { seconds } => serde_json::json!({ "seconds": seconds }),
            SseEvent::Token { content } => serde_json::json!({ "content": content }),
            SseEvent::Sources { sources } => serde_json::json!({ "sources": sources }),
            SseEvent::Done => serde_json::json!({}),
            SseEvent::Error { message, category } => serde_json::json!({ "message": message, "category": category }),
        }
    }
}

pub struct QaOrchestrator {
    retriever: Arc<HybridRetriever>,
    reranker: Arc<Reranker>,
    graph_expander: Arc<GraphExpander>,
    llm_client: Arc<LlmClient>,
    llm_model: String,
}

/// Outcome of a completed (possibly partial, on error) session.
pub struct SessionOutcome {
    pub result: String,
    pub sources: Vec<ScoredSource>,
}

impl QaOrchestrator {
    pub fn new(
        retriever: Arc<HybridRetriever>,
        reranker: Arc<Reranker>,
        graph_expander: Arc<GraphExpander>,
        llm_client: Arc<LlmClient>,
        llm_model: String,
    ) -> Self {
        Self {
            retriever,
            reranker,
            graph_expander,
            llm_client,
            llm_model,
        }
    }

    /// Run one question session to completion, emitting events on `tx` in a
    /// fixed order. Returns the aggregated answer text and final sources
    /// list, for callers (`/ask`) that want a single aggregated response
    /// rather than the raw event stream.
    pub async fn run(
        &self,
        session_id: &str,
        question: &str,
        tx: mpsc::Sender<SseEvent>,
        cancel: CancellationToken,
    ) -> SessionOutcome {
        let _ = tx.send(SseEvent::Start { session_id: session_id.to_string() }).await;

        match self.run_inner(question, &tx, &cancel).await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(session_id, error = %err, category = err.category(), "question session failed");
                let _ = tx
                    .send(SseEvent::Error {
                        message: err.to_string(),
                        category: err.category(),
                    })
                    .await;
                let _ = tx.send(SseEvent::Done).await;
                SessionOutcome {
                    result: String::new(),
                    sources: Vec::new(),
                }
            }
        }
    }

    async fn run_inner(
        &self,
        question: &str,
        tx: &mpsc::Sender<SseEvent>,
        cancel: &CancellationToken,
    ) -> Result<SessionOutcome, AppError> {
        if question.trim().is_empty() {
            return Err(AppError::MalformedRequest("question text must not be empty".to_string()));
        }

        // --- Retrieving ---
        send(tx, SseEvent::Phase { phase: "retrieve", message: "searching your notes".to_string() }).await;

        let retrieved = self
            .retriever
            .retrieve(question)
            .await
            .map_err(|err| AppError::EmbedderUnavailable(err.to_string()))?;
        let total_found = retrieved.len();

        if self.reranker.is_enabled() {
            send(tx, SseEvent::Phase { phase: "rerank", message: "reordering candidates".to_string() }).await;
        }
        let reranked = self.reranker.rerank(question, retrieved);
        let after_filter = reranked.len();

        let expanded = self
            .graph_expander
            .expand(reranked)
            .await
            .map_err(AppError::Internal)?;

        send(tx, SseEvent::RetrievalInfo { total_found, after_filter }).await;

        let context = format_context(&expanded);
        send(tx, SseEvent::ContextInfo { num_docs: expanded.len(), total_chars: context.chars().count() }).await;

        // --- Generating ---
        send(tx, SseEvent::Phase { phase: "generate", message: "composing an answer".to_string() }).await;

        let prompt = build_prompt(&context, question);
        let started = Instant::now();

        let mut stream = self
            .llm_client
            .generate_stream(&self.llm_model, &prompt, GENERATION_TEMPERATURE)
            .await
            .map_err(|err| AppError::LlmUnavailable(err.to_string()))?;

        let mut result = String::new();
        let mut first_token = true;
        let mut any_token = false;

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(AppError::ClientCancelled);
                }
                res = tokio::time::timeout(TOKEN_IDLE_TIMEOUT, stream.next()) => {
                    match res {
                        Ok(item) => item,
                        Err(_) => {
                            return Err(AppError::GenerationStreamBroken(
                                "generation stalled: no token arrived within the idle window".to_string(),
                            ));
                        }
                    }
                }
            };
            let Some(item) = next else { break };
            match item {
                Ok(fragment) => {
                    if first_token {
                        send(tx, SseEvent::Ttft { seconds: started.elapsed().as_secs_f64() }).await;
                        first_token = false;
                    }
                    any_token = true;
                    result.push_str(&fragment);
                    send(tx, SseEvent::Token { content: fragment }).await;
                }
                Err(err) => {
                    if any_token {
                        return Err(AppError::GenerationStreamBroken(err.to_string()));
                    }
                    return Err(AppError::LlmUnavailable(err.to_string()));
                }
            }
        }

        let sources: Vec<ScoredSource> = expanded.iter().map(ScoredSource::from).collect();
        send(tx, SseEvent::Sources { sources: sources.clone() }).await;
        send(tx, SseEvent::Done).await;

        Ok(SessionOutcome { result, sources })
    }
}

async fn send(tx: &mpsc::Sender<SseEvent>, event: SseEvent) {
    if tx.send(event).await.is_err() {
        info!("client disconnected, dropping remaining events");
    }
}

/// Render candidates into the fixed-template context block.
fn format_context(candidates: &[crate::models::RetrievalCandidate]) -> String {
    candidates
        .iter()
        .map(|c| format!("--- From: {} ---\n{}", c.source_path, c.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn build_prompt(context: &str, question: &str) -> String {
    format!(
        "You are a helpful assistant answering questions about the user's personal notes.\n\
         Use only the context below. If the context is insufficient, say \
         \"I could not find this in your notes.\"\n\n\
         Context:\n{context}\n\nQuestion: {question}\n\nAnswer:"
    )
}
