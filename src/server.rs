//! HTTP/SSE surface.
//!
//! Exposes health, stats, reindex, synchronous ask, and streaming ask
//! endpoints over loopback HTTP, translating orchestrator events to the wire
//! format. Structurally grounded in teacher's `server.rs`: same `AppState`/
//! `CorsLayer`/`axum::serve` shape. `/ask/stream`'s SSE handler has no direct
//! corpus precedent — hand-authored from axum's ordinary `Sse`/`Event` API,
//! consistent with the Router/State idiom used everywhere else in the pack.

use axum::{
    error_handling::HandleErrorLayer,
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    BoxError, Json, Router,
};
use futures_util::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tracing::info;
use uuid::Uuid;

use crate::config::Config;
use crate::error::AppError;
use crate::indexer::Indexer;
use crate::models::ScoredSource;
use crate::orchestrator::{QaOrchestrator, SseEvent};
use crate::stats::VaultStats;

#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    orchestrator: Arc<QaOrchestrator>,
    indexer: Arc<Indexer>,
}

/// Start the HTTP/SSE server. Binds to loopback on `config.bind_port` and
/// serves until the process is terminated.
pub async fn run_server(
    config: Arc<Config>,
    orchestrator: Arc<QaOrchestrator>,
    indexer: Arc<Indexer>,
) -> anyhow::Result<()> {
    let bind_addr = format!("127.0.0.1:{}", config.bind_port);

    let state = AppState {
        config,
        orchestrator,
        indexer,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // `/health` and `/stats` each get their own hard deadline; a route whose
    // handler hangs past it fails closed with a 503 rather than tying up the
    // connection indefinitely. `/ask` and `/ask/stream` are intentionally
    // unbounded here — their own cancellation/idle-timeout machinery governs
    // how long a generation is allowed to run.
    let health_route = Router::new().route("/health", get(handle_health)).layer(
        ServiceBuilder::new()
            .layer(HandleErrorLayer::new(handle_timeout_error))
            .layer(TimeoutLayer::new(Duration::from_secs(2))),
    );
    let stats_route = Router::new().route("/stats", get(handle_stats)).layer(
        ServiceBuilder::new()
            .layer(HandleErrorLayer::new(handle_timeout_error))
            .layer(TimeoutLayer::new(Duration::from_secs(10))),
    );

    let app = Router::new()
        .merge(health_route)
        .merge(stats_route)
        .route("/ask", post(handle_ask))
        .route("/ask/stream", post(handle_ask_stream))
        .route("/rebuild_db", post(handle_rebuild_db))
        .layer(cors)
        .with_state(state);

    info!(%bind_addr, "obsidianrag server listening");

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    model: String,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        model: state.config.llm_model.clone(),
    })
}

// ============ GET /stats ============

async fn handle_stats(State(state): State<AppState>) -> Result<Json<VaultStats>, AppError> {
    let stats = crate::stats::compute_stats(&state.config, state.indexer.vector_store())
        .await
        .map_err(AppError::Internal)?;
    Ok(Json(stats))
}

// ============ POST /ask and /ask/stream ============

#[derive(Deserialize)]
struct AskRequest {
    text: String,
}

#[derive(Serialize)]
struct AskResponse {
    question: String,
    result: String,
    sources: Vec<ScoredSource>,
    process_time: f64,
    session_id: String,
}

/// Drives the same orchestrator state machine as `/ask/stream`, draining its
/// event channel internally and aggregating `token` events into `result`
/// (decided in DESIGN.md's Open Question ledger — a single code path keeps
/// the two endpoints trivially consistent).
async fn handle_ask(
    State(state): State<AppState>,
    Json(req): Json<AskRequest>,
) -> Result<Json<AskResponse>, AppError> {
    if req.text.trim().is_empty() {
        return Err(AppError::MalformedRequest("question text must not be empty".to_string()));
    }

    let started = Instant::now();
    let session_id = Uuid::new_v4().to_string();
    let (tx, mut rx) = tokio::sync::mpsc::channel(32);
    let cancel = CancellationToken::new();

    // If axum drops this handler's future (the client disconnected before a
    // response went out), `guard` drops with it and cancels the in-flight
    // generation the same way `handle_ask_stream`'s guard does.
    let guard = CancelOnDrop(cancel.clone());

    let orchestrator = state.orchestrator.clone();
    let question = req.text.clone();
    let sid = session_id.clone();
    let run_handle = tokio::spawn(async move { orchestrator.run(&sid, &question, tx, cancel).await });

    let mut result = String::new();
    let mut sources = Vec::new();
    let mut error: Option<AppError> = None;

    while let Some(event) = rx.recv().await {
        match event {
            SseEvent::Token { content } => result.push_str(&content),
            SseEvent::Sources { sources: s } => sources = s,
            SseEvent::Error { message, category } => {
                error = Some(map_category_to_error(category, message));
            }
            _ => {}
        }
    }

    let outcome = run_handle.await.map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?;
    if result.is_empty() {
        result = outcome.result;
    }
    if sources.is_empty() {
        sources = outcome.sources;
    }

    if let Some(err) = error {
        return Err(err);
    }

    Ok(Json(AskResponse {
        question: req.text,
        result,
        sources,
        process_time: started.elapsed().as_secs_f64(),
        session_id,
    }))
}

async fn handle_ask_stream(
    State(state): State<AppState>,
    Json(req): Json<AskRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    if req.text.trim().is_empty() {
        return Err(AppError::MalformedRequest("question text must not be empty".to_string()));
    }

    let session_id = Uuid::new_v4().to_string();
    let (tx, rx) = tokio::sync::mpsc::channel(32);
    let cancel = CancellationToken::new();

    let orchestrator = state.orchestrator.clone();
    let question = req.text;
    let sid = session_id.clone();
    let cancel_for_run = cancel.clone();
    tokio::spawn(async move {
        orchestrator.run(&sid, &question, tx, cancel_for_run).await;
    });

    // axum drops this stream (and its guard) when the client disconnects;
    // the guard fires the CancellationToken so the upstream generation call
    // is aborted promptly.
    let guard = CancelOnDrop(cancel);
    let event_stream = stream::unfold((rx, guard), |(mut rx, guard)| async move {
        let event = rx.recv().await?;
        let sse_event = Event::default().event(event.name()).json_data(event.payload()).ok()?;
        Some((Ok(sse_event), (rx, guard)))
    });

    Ok(Sse::new(event_stream).keep_alive(KeepAlive::default()))
}

struct CancelOnDrop(CancellationToken);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

async fn handle_timeout_error(err: BoxError) -> AppError {
    if err.is::<tower::timeout::error::Elapsed>() {
        AppError::LlmUnavailable("request exceeded its deadline".to_string())
    } else {
        AppError::Internal(anyhow::anyhow!(err))
    }
}

fn map_category_to_error(category: &'static str, message: String) -> AppError {
    match category {
        "embedder_unavailable" => AppError::EmbedderUnavailable(message),
        "llm_unavailable" => AppError::LlmUnavailable(message),
        "generation_stream_broken" => AppError::GenerationStreamBroken(message),
        "malformed_request" => AppError::MalformedRequest(message),
        "client_cancelled" => AppError::ClientCancelled,
        _ => AppError::Internal(anyhow::anyhow!(message)),
    }
}

// ============ POST /rebuild_db ============

#[derive(Serialize)]
struct RebuildResponse {
    status: &'static str,
    total_chunks: i64,
}

async fn handle_rebuild_db(State(state): State<AppState>) -> Result<Json<RebuildResponse>, AppError> {
    let report = state.indexer.index(true).await.map_err(AppError::Internal)?;
    Ok(Json(RebuildResponse {
        status: "ok",
        total_chunks: report.total_chunks,
    }))
}
