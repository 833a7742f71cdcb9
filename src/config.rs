//! Configuration loading and validation.
//!
//! ObsidianRAG is configured via a TOML file plus `OBSIDIANRAG_*` environment
//! overrides, composed once at startup into a frozen [`Config`] record that
//! the rest of the crate reads by reference. There is no dynamic
//! reconfiguration: a changed file or environment variable has no effect
//! until the process restarts.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;

/// The single frozen configuration record, composed from TOML defaults and
/// environment overrides at startup.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub vault_path: PathBuf,
    #[serde(default = "default_bind_port")]
    pub bind_port: u16,
    #[serde(default = "default_llm_model")]
    pub llm_model: String,
    #[serde(default = "default_embedder_provider")]
    pub embedder_provider: String,
    #[serde(default = "default_embedder_model")]
    pub embedder_model: String,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default = "default_retrieval_k")]
    pub retrieval_k: usize,
    #[serde(default = "default_bm25_k")]
    pub bm25_k: usize,
    #[serde(default = "default_vector_weight")]
    pub vector_weight: f64,
    #[serde(default = "default_bm25_weight")]
    pub bm25_weight: f64,
    #[serde(default = "default_use_reranker")]
    pub use_reranker: bool,
    #[serde(default = "default_reranker_top_n")]
    pub reranker_top_n: usize,
    #[serde(default = "default_min_score")]
    pub min_score: f64,
    #[serde(default = "default_ollama_base_url")]
    pub ollama_base_url: String,
}

fn default_bind_port() -> u16 {
    8000
}
fn default_llm_model() -> String {
    "llama3".to_string()
}
fn default_embedder_provider() -> String {
    "local".to_string()
}
fn default_embedder_model() -> String {
    "BAAI/bge-small-en-v1.5".to_string()
}
fn default_chunk_size() -> usize {
    1500
}
fn default_chunk_overlap() -> usize {
    300
}
fn default_retrieval_k() -> usize {
    12
}
fn default_bm25_k() -> usize {
    5
}
fn default_vector_weight() -> f64 {
    0.6
}
fn default_bm25_weight() -> f64 {
    0.4
}
fn default_use_reranker() -> bool {
    false
}
fn default_reranker_top_n() -> usize {
    6
}
fn default_min_score() -> f64 {
    0.3
}
fn default_ollama_base_url() -> String {
    "http://127.0.0.1:11434".to_string()
}

impl Config {
    /// Directory holding all persisted state for this vault.
    pub fn state_dir(&self) -> PathBuf {
        self.vault_path.join(".obsidianrag")
    }

    /// Vector store directory.
    pub fn db_dir(&self) -> PathBuf {
        self.state_dir().join("db")
    }

    /// Manifest file path.
    pub fn manifest_path(&self) -> PathBuf {
        self.state_dir().join("manifest.json")
    }
}

/// Load configuration from a TOML file, apply `OBSIDIANRAG_*` environment
/// overrides, and validate the result. Mirrors teacher's load-then-validate
/// shape in `config::load_config`.
pub fn load_config(path: &std::path::Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
    let mut config: Config =
        toml::from_str(&content).with_context(|| "failed to parse config file")?;

    apply_env_overrides(&mut config);
    validate(&config)?;
    Ok(config)
}

/// Compose a [`Config`] directly from CLI flags plus the same defaults
/// `load_config` would fall back to, without requiring a TOML file on disk.
/// Used by `obsidianrag serve`/`index`/`stats`, whose surface is flags, not
/// a config file path.
pub fn from_cli(
    vault_path: PathBuf,
    bind_port: Option<u16>,
    llm_model: Option<String>,
    use_reranker: Option<bool>,
) -> Result<Config> {
    let mut config = Config {
        vault_path,
        bind_port: default_bind_port(),
        llm_model: default_llm_model(),
        embedder_provider: default_embedder_provider(),
        embedder_model: default_embedder_model(),
        chunk_size: default_chunk_size(),
        chunk_overlap: default_chunk_overlap(),
        retrieval_k: default_retrieval_k(),
        bm25_k: default_bm25_k(),
        vector_weight: default_vector_weight(),
        bm25_weight: default_bm25_weight(),
        use_reranker: default_use_reranker(),
        reranker_top_n: default_reranker_top_n(),
        min_score: default_min_score(),
        ollama_base_url: default_ollama_base_url(),
    };

    if let Some(port) = bind_port {
        config.bind_port = port;
    }
    if let Some(model) = llm_model {
        config.llm_model = model;
    }
    if let Some(reranker) = use_reranker {
        config.use_reranker = reranker;
    }

    apply_env_overrides(&mut config);
    validate(&config)?;
    Ok(config)
}

fn apply_env_overrides(config: &mut Config) {
    if let Ok(v) = std::env::var("OBSIDIANRAG_VAULT_PATH") {
        config.vault_path = PathBuf::from(v);
    }
    if let Ok(v) = std::env::var("OBSIDIANRAG_BIND_PORT") {
        if let Ok(port) = v.parse() {
            config.bind_port = port;
        }
    }
    if let Ok(v) = std::env::var("OBSIDIANRAG_LLM_MODEL") {
        config.llm_model = v;
    }
    if let Ok(v) = std::env::var("OBSIDIANRAG_EMBEDDER_PROVIDER") {
        config.embedder_provider = v;
    }
    if let Ok(v) = std::env::var("OBSIDIANRAG_EMBEDDER_MODEL") {
        config.embedder_model = v;
    }
    if let Ok(v) = std::env::var("OBSIDIANRAG_USE_RERANKER") {
        config.use_reranker = v == "1" || v.eq_ignore_ascii_case("true");
    }
    if let Ok(v) = std::env::var("OBSIDIANRAG_OLLAMA_BASE_URL") {
        config.ollama_base_url = v;
    }
}

fn validate(config: &Config) -> Result<()> {
    if !config.vault_path.exists() || !config.vault_path.is_dir() {
        anyhow::bail!(
            "vault_path does not exist or is not a directory: {}",
            config.vault_path.display()
        );
    }
    if config.chunk_size == 0 {
        anyhow::bail!("chunk_size must be > 0");
    }
    if config.chunk_overlap >= config.chunk_size {
        anyhow::bail!("chunk_overlap must be smaller than chunk_size");
    }
    if config.retrieval_k == 0 {
        anyhow::bail!("retrieval_k must be >= 1");
    }
    if !(0.0..=1.0).contains(&config.vector_weight) || !(0.0..=1.0).contains(&config.bm25_weight) {
        anyhow::bail!("vector_weight and bm25_weight must each be in [0.0, 1.0]");
    }
    if !(0.0..=1.0).contains(&config.min_score) {
        anyhow::bail!("min_score must be in [0.0, 1.0]");
    }
    match config.embedder_provider.as_str() {
        "local" | "openai" => {}
        other => anyhow::bail!(
            "unknown embedder_provider: '{}'. Must be 'local' or 'openai'.",
            other
        ),
    }
    Ok(())
}
