//! Vault statistics.
//!
//! A quick summary of what's indexed: note counts, chunk counts, word
//! counts, and link density. Backs both `GET /stats` and `obsidianrag
//! stats`.

use anyhow::Result;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;

use crate::config::Config;
use crate::vector_store::VectorStore;

#[derive(Debug, Serialize)]
pub struct VaultStats {
    pub total_notes: usize,
    pub total_chunks: i64,
    pub total_words: usize,
    pub total_chars: usize,
    pub avg_words_per_chunk: f64,
    pub folders: usize,
    pub internal_links: usize,
    pub vault_path: String,
}

/// Compute a fresh snapshot by scanning every persisted Chunk. Cheap enough
/// to run on every `/stats` request for a single personal vault; no
/// separate counters table is maintained.
pub async fn compute_stats(config: &Config, vector_store: &Arc<VectorStore>) -> Result<VaultStats> {
    let records = vector_store.all_records().await?;
    let total_chunks = vector_store.count().await?;

    let total_words: usize = records.iter().map(|r| r.text.split_whitespace().count()).sum();
    let total_chars: usize = records.iter().map(|r| r.text.chars().count()).sum();
    let internal_links: usize = records.iter().map(|r| r.outbound_links.len()).sum();

    let source_paths: HashSet<&str> = records.iter().map(|r| r.source_path.as_str()).collect();
    let total_notes = source_paths.len();

    let folders: HashSet<&std::path::Path> = source_paths
        .iter()
        .filter_map(|p| std::path::Path::new(p).parent())
        .collect();

    let avg_words_per_chunk = if total_chunks > 0 {
        total_words as f64 / total_chunks as f64
    } else {
        0.0
    };

    Ok(VaultStats {
        total_notes,
        total_chunks,
        total_words,
        total_chars,
        avg_words_per_chunk,
        folders: folders.len(),
        internal_links,
        vault_path: config.vault_path.display().to_string(),
    })
}

/// Run the `obsidianrag stats` subcommand: compute and print a summary.
pub async fn run_stats(config: &Config, vector_store: &Arc<VectorStore>) -> Result<()> {
    let stats = compute_stats(config, vector_store).await?;

    println!("ObsidianRAG — Vault Stats");
    println!("=========================");
    println!();
    println!("  Vault:       {}", stats.vault_path);
    println!();
    println!("  Notes:       {}", stats.total_notes);
    println!("  Folders:     {}", stats.folders);
    println!("  Chunks:      {}", stats.total_chunks);
    println!("  Words:       {}", stats.total_words);
    println!("  Chars:       {}", stats.total_chars);
    println!("  Avg words/chunk: {:.1}", stats.avg_words_per_chunk);
    println!("  Internal links:  {}", stats.internal_links);
    println!();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::models::VectorRecord;

    fn test_config() -> Config {
        Config {
            vault_path: "/tmp/vault".into(),
            bind_port: 8000,
            llm_model: "llama3".into(),
            embedder_provider: "fastembed".into(),
            embedder_model: "bge-small".into(),
            chunk_size: 500,
            chunk_overlap: 50,
            retrieval_k: 10,
            bm25_k: 10,
            vector_weight: 0.5,
            bm25_weight: 0.5,
            use_reranker: true,
            reranker_top_n: 6,
            min_score: 0.1,
            ollama_base_url: "http://localhost:11434".into(),
        }
    }

    #[tokio::test]
    async fn empty_vault_reports_zero_chunks() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(VectorStore::open(tmp.path()).await.unwrap());
        let stats = compute_stats(&test_config(), &store).await.unwrap();
        assert_eq!(stats.total_chunks, 0);
        assert_eq!(stats.total_notes, 0);
        assert_eq!(stats.avg_words_per_chunk, 0.0);
    }

    #[tokio::test]
    async fn counts_words_chars_links_and_folders() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(VectorStore::open(tmp.path()).await.unwrap());
        store
            .upsert(&[
                VectorRecord {
                    chunk_id: "notes/a.md-0".into(),
                    embedding: vec![1.0],
                    source_path: "notes/a.md".into(),
                    chunk_index: 0,
                    text: "hello world".into(),
                    outbound_links: vec!["b".into()],
                },
                VectorRecord {
                    chunk_id: "journal/b.md-0".into(),
                    embedding: vec![1.0],
                    source_path: "journal/b.md".into(),
                    chunk_index: 0,
                    text: "three short words".into(),
                    outbound_links: vec![],
                },
            ])
            .await
            .unwrap();

        let stats = compute_stats(&test_config(), &store).await.unwrap();
        assert_eq!(stats.total_chunks, 2);
        assert_eq!(stats.total_notes, 2);
        assert_eq!(stats.total_words, 5);
        assert_eq!(stats.folders, 2);
        assert_eq!(stats.internal_links, 1);
    }
}
