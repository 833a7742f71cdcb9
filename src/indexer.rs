//! The Indexer: walks the vault, diffs against the Manifest, and drives
//! add/update/delete through the Vector Store and Lexical Store.
//!
//! Vault walking is grounded in teacher's `connector_fs.rs` (`WalkDir` +
//! `globset` include/exclude, deterministic sort by relative path),
//! simplified to a single root and a fixed Markdown extension — the vault
//! has no multi-connector concept. Concurrent indexing passes are
//! serialized by a single mutex; per-file failures are logged and skipped
//! without touching that file's Manifest entry.

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::chunk::chunk_text;
use crate::embedder::Embedder;
use crate::lexical_store::{LexicalDoc, LexicalStore};
use crate::manifest::Manifest;
use crate::models::VectorRecord;
use crate::vector_store::VectorStore;

/// Summary of one completed indexing pass.
#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct IndexReport {
    pub files_scanned: usize,
    pub files_reindexed: usize,
    pub files_deleted: usize,
    pub files_failed: usize,
    pub total_chunks: i64,
}

pub struct Indexer {
    vault_path: PathBuf,
    manifest_path: PathBuf,
    chunk_size: usize,
    chunk_overlap: usize,
    vector_store: Arc<VectorStore>,
    lexical_store: Arc<LexicalStore>,
    embedder: Arc<dyn Embedder>,
    manifest: Mutex<Manifest>,
}

impl Indexer {
    pub fn new(
        vault_path: PathBuf,
        manifest_path: PathBuf,
        chunk_size: usize,
        chunk_overlap: usize,
        vector_store: Arc<VectorStore>,
        lexical_store: Arc<LexicalStore>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self> {
        let manifest = Manifest::load(&manifest_path)?;
        Ok(Self {
            vault_path,
            manifest_path,
            chunk_size,
            chunk_overlap,
            vector_store,
            lexical_store,
            embedder,
            manifest: Mutex::new(manifest),
        })
    }

    /// Reconcile the vault with the stores. `force` re-processes every file
    /// regardless of content hash.
    pub async fn index(&self, force: bool) -> Result<IndexReport> {
        let mut manifest = self.manifest.lock().await;
        let mut report = IndexReport::default();

        let discovered = walk_markdown_files(&self.vault_path)?;
        report.files_scanned = discovered.len();
        let discovered_set: std::collections::HashSet<&String> =
            discovered.iter().map(|(rel, _)| rel).collect();

        // Deletions: paths in the manifest no longer present on disk.
        let known: Vec<String> = manifest.known_paths().cloned().collect();
        for path in known {
            if !discovered_set.contains(&path) {
                if let Some(entry) = manifest.remove(&path) {
                    if let Err(err) = self.vector_store.delete(&entry.chunk_ids).await {
                        warn!(path, %err, "failed to delete vectors for removed file");
                    }
                    for id in &entry.chunk_ids {
                        let _ = self.lexical_store.delete(id);
                    }
                    report.files_deleted += 1;
                }
            }
        }

        // Additions/updates.
        for (rel_path, abs_path) in &discovered {
            match self.reindex_file(&mut manifest, rel_path, abs_path, force).await {
                Ok(true) => report.files_reindexed += 1,
                Ok(false) => {}
                Err(err) => {
                    warn!(path = rel_path.as_str(), %err, "indexing file failed, skipping");
                    report.files_failed += 1;
                }
            }
        }

        manifest.save(&self.manifest_path)?;
        report.total_chunks = self.vector_store.count().await?;

        // Rebuild the Lexical Store once at the end of the pass.
        let all_records = self.vector_store.all_records().await?;
        self.lexical_store
            .rebuild(all_records.iter().map(LexicalDoc::from))?;

        info!(
            scanned = report.files_scanned,
            reindexed = report.files_reindexed,
            deleted = report.files_deleted,
            failed = report.files_failed,
            total_chunks = report.total_chunks,
            "indexing pass complete"
        );
        Ok(report)
    }

    pub fn vector_store(&self) -> &Arc<VectorStore> {
        &self.vector_store
    }

    pub fn lexical_store(&self) -> &Arc<LexicalStore> {
        &self.lexical_store
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    /// Returns `Ok(true)` if the file was (re)processed, `Ok(false)` if it
    /// was unchanged and skipped.
    async fn reindex_file(
        &self,
        manifest: &mut Manifest,
        rel_path: &str,
        abs_path: &Path,
        force: bool,
    ) -> Result<bool> {
        let bytes = std::fs::read(abs_path)
            .with_context(|| format!("failed to read {}", abs_path.display()))?;
        let content_hash = hash_bytes(&bytes);

        if !force && manifest.contains_hash(rel_path, &content_hash) {
            return Ok(false);
        }

        let text = String::from_utf8_lossy(&bytes).into_owned();
        let old_chunk_ids: Vec<String> = manifest
            .get(rel_path)
            .map(|e| e.chunk_ids.clone())
            .unwrap_or_default();

        let chunks = chunk_text(rel_path, &text, self.chunk_size, self.chunk_overlap);
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self
            .embedder
            .embed_batch(&texts)
            .await
            .with_context(|| format!("embedding failed for {rel_path}"))?;

        let new_chunk_ids: Vec<String> = chunks.iter().map(|c| c.id.clone()).collect();
        let records: Vec<VectorRecord> = chunks
            .iter()
            .zip(embeddings.into_iter())
            .map(|(chunk, embedding)| VectorRecord {
                chunk_id: chunk.id.clone(),
                embedding,
                source_path: chunk.source_path.clone(),
                chunk_index: chunk.chunk_index,
                text: chunk.text.clone(),
                outbound_links: chunk.outbound_links.clone(),
            })
            .collect();

        self.vector_store.upsert(&records).await?;

        // Drop chunk IDs from the old set that no longer exist in the new one.
        let stale: Vec<String> = old_chunk_ids
            .into_iter()
            .filter(|id| !new_chunk_ids.contains(id))
            .collect();
        if !stale.is_empty() {
            self.vector_store.delete(&stale).await?;
            for id in &stale {
                let _ = self.lexical_store.delete(id);
            }
        }

        manifest.upsert(rel_path, content_hash, new_chunk_ids);
        Ok(true)
    }
}

fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Walk `root` recursively and return `(relative_path, absolute_path)` pairs
/// for every Markdown file, sorted by relative path for deterministic
/// ordering.
fn walk_markdown_files(root: &Path) -> Result<Vec<(String, PathBuf)>> {
    let include = build_globset(&["**/*.md".to_string()])?;
    let exclude = build_globset(&[
        "**/.git/**".to_string(),
        "**/.obsidianrag/**".to_string(),
        "**/node_modules/**".to_string(),
    ])?;

    let mut items = Vec::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().replace('\\', "/");

        if exclude.is_match(&rel_str) || !include.is_match(&rel_str) {
            continue;
        }
        items.push((rel_str, path.to_path_buf()));
    }
    items.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(items)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::Embedder;
    use async_trait::async_trait;

    struct StubEmbedder;

    #[async_trait]
    impl Embedder for StubEmbedder {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }
        fn dims(&self) -> usize {
            2
        }
    }

    async fn build_indexer(vault: &Path) -> Indexer {
        let vector_store = Arc::new(VectorStore::open(&vault.join(".obsidianrag/db")).await.unwrap());
        let lexical_store = Arc::new(LexicalStore::new().unwrap());
        Indexer::new(
            vault.to_path_buf(),
            vault.join(".obsidianrag/manifest.json"),
            200,
            50,
            vector_store,
            lexical_store,
            Arc::new(StubEmbedder),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn fresh_index_discovers_and_chunks_files() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("a.md"), "Hello [[b]]").unwrap();
        std::fs::write(tmp.path().join("b.md"), "World").unwrap();

        let indexer = build_indexer(tmp.path()).await;
        let report = indexer.index(false).await.unwrap();

        assert_eq!(report.files_scanned, 2);
        assert_eq!(report.files_reindexed, 2);
        assert!(report.total_chunks >= 2);
    }

    #[tokio::test]
    async fn second_pass_with_no_changes_reindexes_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("a.md"), "Hello world").unwrap();

        let indexer = build_indexer(tmp.path()).await;
        indexer.index(false).await.unwrap();
        let second = indexer.index(false).await.unwrap();

        assert_eq!(second.files_reindexed, 0);
        assert_eq!(second.files_deleted, 0);
    }

    #[tokio::test]
    async fn deleted_file_is_removed_from_manifest_and_store() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("a.md");
        std::fs::write(&path, "Hello world").unwrap();

        let indexer = build_indexer(tmp.path()).await;
        indexer.index(false).await.unwrap();

        std::fs::remove_file(&path).unwrap();
        let report = indexer.index(false).await.unwrap();

        assert_eq!(report.files_deleted, 1);
        assert_eq!(indexer.vector_store().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn non_markdown_files_are_ignored() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("notes.md"), "keep me").unwrap();
        std::fs::write(tmp.path().join("image.png"), "binary-ish").unwrap();

        let indexer = build_indexer(tmp.path()).await;
        let report = indexer.index(false).await.unwrap();
        assert_eq!(report.files_scanned, 1);
    }
}
