//! End-to-end tests against the HTTP/SSE surface: a real `server::run_server`
//! bound to a loopback port, backed by a deterministic stub embedder (no
//! fastembed model download) and a stub model host standing in for Ollama.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::Json as AxumJson;
use axum::routing::{get, post};
use axum::Router;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use obsidianrag::config::{self, Config};
use obsidianrag::embedder::Embedder;
use obsidianrag::graph_expander::GraphExpander;
use obsidianrag::indexer::Indexer;
use obsidianrag::lexical_store::LexicalStore;
use obsidianrag::llm_client::LlmClient;
use obsidianrag::orchestrator::QaOrchestrator;
use obsidianrag::reranker::Reranker;
use obsidianrag::retriever::HybridRetriever;
use obsidianrag::server;
use obsidianrag::vector_store::VectorStore;

/// Deterministic stand-in embedder: same shape teacher-adjacent tests use
/// (`indexer.rs`'s own `StubEmbedder`), so tests never need a downloaded
/// model.
struct StubEmbedder;

#[async_trait]
impl Embedder for StubEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
    }
    fn dims(&self) -> usize {
        2
    }
}

/// Bind to an ephemeral loopback port, read back the assigned port, and
/// release it immediately so the caller's real listener can claim it.
async fn reserve_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

/// Start a stub Ollama-style host: `/api/tags` for the catalog probe, and
/// `/api/generate` returning a fixed NDJSON token sequence followed by a
/// `done` line, matching `llm_client.rs`'s expected wire shape.
async fn spawn_stub_model_host(tokens: &'static [&'static str]) -> u16 {
    let app = Router::new()
        .route("/api/tags", get(|| async { AxumJson(json!({"models": [{"name": "llama3"}]})) }))
        .route(
            "/api/generate",
            post(move |AxumJson(_): AxumJson<Value>| async move {
                let mut body = String::new();
                for token in tokens {
                    body.push_str(&json!({"response": token, "done": false}).to_string());
                    body.push('\n');
                }
                body.push_str(&json!({"response": "", "done": true}).to_string());
                body.push('\n');
                body
            }),
        );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    port
}

async fn write_vault(dir: &Path) {
    std::fs::write(dir.join("a.md"), "Project kickoff notes. See [[b]] for the follow-up.").unwrap();
    std::fs::write(dir.join("b.md"), "Follow-up: the answer is 42.").unwrap();
}

/// Build a full collaborator graph (stub embedder, real stores, real
/// retrieval/orchestration stack) and serve it on `port`, pointed at
/// `ollama_base_url` for generation.
async fn spawn_app(vault: &Path, port: u16, ollama_base_url: String) {
    let mut config = config::from_cli(vault.to_path_buf(), Some(port), None, Some(false)).unwrap();
    config.ollama_base_url = ollama_base_url;

    std::fs::create_dir_all(config.state_dir()).unwrap();
    let embedder: Arc<dyn Embedder> = Arc::new(StubEmbedder);
    let vector_store = Arc::new(VectorStore::open(&config.db_dir()).await.unwrap());
    let lexical_store = Arc::new(LexicalStore::new().unwrap());
    let indexer = Arc::new(
        Indexer::new(
            config.vault_path.clone(),
            config.manifest_path(),
            config.chunk_size,
            config.chunk_overlap,
            vector_store,
            lexical_store,
            embedder,
        )
        .unwrap(),
    );
    indexer.index(false).await.unwrap();

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

    tokio::spawn(server::run_server(Arc::new(config), orchestrator, indexer));
}

/// Poll `/health` until the listener is accepting connections or give up.
async fn wait_for_ready(base_url: &str) {
    let client = reqwest::Client::new();
    for _ in 0..100 {
        if client.get(format!("{base_url}/health")).send().await.is_ok() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("server at {base_url} never became ready");
}

async fn start_test_server(
    tmp: &tempfile::TempDir,
    tokens: &'static [&'static str],
) -> (String, reqwest::Client) {
    write_vault(tmp.path()).await;
    let app_port = reserve_port().await;
    let model_port = spawn_stub_model_host(tokens).await;
    spawn_app(tmp.path(), app_port, format!("http://127.0.0.1:{model_port}")).await;
    let base_url = format!("http://127.0.0.1:{app_port}");
    wait_for_ready(&base_url).await;
    (base_url, reqwest::Client::new())
}

#[tokio::test]
async fn health_and_stats_reflect_indexed_vault() {
    let tmp = tempfile::tempdir().unwrap();
    let (base_url, client) = start_test_server(&tmp, &["hi"]).await;

    let health: Value = client.get(format!("{base_url}/health")).send().await.unwrap().json().await.unwrap();
    assert_eq!(health["status"], "ok");

    let stats: Value = client.get(format!("{base_url}/stats")).send().await.unwrap().json().await.unwrap();
    assert_eq!(stats["total_notes"], 2);
    assert!(stats["total_chunks"].as_i64().unwrap() >= 2);
    assert!(stats["internal_links"].as_u64().unwrap() >= 1);
}

#[tokio::test]
async fn ask_returns_aggregated_answer_with_sources() {
    let tmp = tempfile::tempdir().unwrap();
    let (base_url, client) = start_test_server(&tmp, &["The ", "answer ", "is 42."]).await;

    let resp = client
        .post(format!("{base_url}/ask"))
        .json(&json!({"text": "What is the answer?"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["result"], "The answer is 42.");
    assert!(!body["sources"].as_array().unwrap().is_empty());
    assert!(!body["session_id"].as_str().unwrap().is_empty());
    assert!(body["process_time"].as_f64().unwrap() >= 0.0);
}

#[tokio::test]
async fn ask_rejects_empty_question_with_400() {
    let tmp = tempfile::tempdir().unwrap();
    let (base_url, client) = start_test_server(&tmp, &["unused"]).await;

    let resp = client
        .post(format!("{base_url}/ask"))
        .json(&json!({"text": "   "}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["category"], "malformed_request");
}

#[tokio::test]
async fn ask_stream_emits_events_in_a_fixed_order() {
    let tmp = tempfile::tempdir().unwrap();
    let (base_url, client) = start_test_server(&tmp, &["42"]).await;

    let resp = client
        .post(format!("{base_url}/ask/stream"))
        .json(&json!({"text": "What is the answer?"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let body = resp.text().await.unwrap();
    let pos = |needle: &str| body.find(needle).unwrap_or_else(|| panic!("missing event {needle:?} in:\n{body}"));

    let start = pos("event: start");
    let retrieval_info = pos("event: retrieval_info");
    let context_info = pos("event: context_info");
    let ttft = pos("event: ttft");
    let token = pos("event: token");
    let sources = pos("event: sources");
    let done = pos("event: done");

    assert!(start < retrieval_info);
    assert!(retrieval_info < context_info);
    assert!(context_info < ttft);
    assert!(ttft < token);
    assert!(token < sources);
    assert!(sources < done);
}

#[tokio::test]
async fn llm_unavailable_surfaces_as_service_unavailable() {
    let tmp = tempfile::tempdir().unwrap();
    write_vault(tmp.path()).await;
    let app_port = reserve_port().await;
    // Nothing is listening on this port, so the generation call fails to connect.
    let dead_port = reserve_port().await;
    spawn_app(tmp.path(), app_port, format!("http://127.0.0.1:{dead_port}")).await;
    let base_url = format!("http://127.0.0.1:{app_port}");
    wait_for_ready(&base_url).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base_url}/ask"))
        .json(&json!({"text": "anything"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 503);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["category"], "llm_unavailable");
}

#[tokio::test]
async fn rebuild_db_reports_total_chunks() {
    let tmp = tempfile::tempdir().unwrap();
    let (base_url, client) = start_test_server(&tmp, &["ok"]).await;

    let resp = client.post(format!("{base_url}/rebuild_db")).send().await.unwrap();
    assert_eq!(resp.status(), 200);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert!(body["total_chunks"].as_i64().unwrap() >= 2);
}
