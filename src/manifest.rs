//! The Manifest: a process-wide keyed structure mapping each source file's
//! relative path to {content hash, last-indexed timestamp, chunk-ID list}.
//!
//! Persisted as a single JSON file; writes go through a temp-file-and-rename
//! so the on-disk manifest is never torn. The Manifest is loaded once at
//! startup and rewritten once after each successful indexing pass; its
//! single owner is the Indexer.

use anyhow::{Context, Result};
use chrono::Utc;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use crate::models::ManifestEntry;

#[derive(Debug, Clone, Default)]
pub struct Manifest {
    entries: BTreeMap<String, ManifestEntry>,
}

impl Manifest {
    /// Load the manifest from `path`, or start empty if it does not exist
    /// yet (first run against a fresh vault).
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read manifest: {}", path.display()))?;
        let entries: BTreeMap<String, ManifestEntry> =
            serde_json::from_str(&content).with_context(|| "failed to parse manifest JSON")?;
        Ok(Self { entries })
    }

    /// Atomically persist the manifest to `path` via temp-file + rename.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create manifest directory: {}", parent.display()))?;
        }
        let body = serde_json::to_string_pretty(&self.entries)?;
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(parent)
            .with_context(|| format!("failed to create temp file in {}", parent.display()))?;
        tmp.write_all(body.as_bytes())?;
        tmp.flush()?;
        tmp.persist(path)
            .with_context(|| format!("failed to atomically replace manifest at {}", path.display()))?;
        Ok(())
    }

    pub fn get(&self, source_path: &str) -> Option<&ManifestEntry> {
        self.entries.get(source_path)
    }

    pub fn contains_hash(&self, source_path: &str, content_hash: &str) -> bool {
        self.entries
            .get(source_path)
            .map(|e| e.content_hash == content_hash)
            .unwrap_or(false)
    }

    pub fn upsert(&mut self, source_path: &str, content_hash: String, chunk_ids: Vec<String>) {
        self.entries.insert(
            source_path.to_string(),
            ManifestEntry {
                source_path: source_path.to_string(),
                content_hash,
                indexed_at: Utc::now(),
                chunk_ids,
            },
        );
    }

    pub fn remove(&mut self, source_path: &str) -> Option<ManifestEntry> {
        self.entries.remove(source_path)
    }

    pub fn known_paths(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    pub fn all_chunk_ids(&self) -> Vec<String> {
        self.entries.values().flat_map(|e| e.chunk_ids.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
