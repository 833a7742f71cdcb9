//! Core data types shared across the indexing and retrieval pipelines.
//!
//! A [`Chunk`] is the unit of indexing; a [`VectorRecord`] is what the Vector
//! Store persists; a [`ManifestEntry`] is what the Manifest tracks per source
//! file; a [`RetrievalCandidate`] is the transient, tagged shape produced and
//! consumed by the Hybrid Retriever, Reranker, and Graph Expander alike; a
//! [`ScoredSource`] is what finally reaches the client.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A bounded slice of a source document, the unit of indexing and retrieval.
///
/// Immutable once created; replaced wholesale when its source file changes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    /// Deterministic hash of (relative path, ordinal, text). Stable across
    /// reindexes of unchanged content.
    pub id: String,
    /// Path relative to the vault root, using `/` separators.
    pub source_path: String,
    /// 0-based, dense within a source file.
    pub chunk_index: usize,
    pub text: String,
    /// Wiki-link targets extracted from `text`, case-preserved, deduplicated
    /// in first-seen order.
    pub outbound_links: Vec<String>,
}

/// A Chunk ID paired with its dense embedding and enough cached metadata to
/// reconstruct a retrieval result without re-reading the source file. Owned
/// by the Vector Store.
#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub chunk_id: String,
    pub embedding: Vec<f32>,
    pub source_path: String,
    /// 0-based, dense within `source_path` — the order chunks appeared in
    /// the source file, used to reassemble whole-document text.
    pub chunk_index: usize,
    pub text: String,
    pub outbound_links: Vec<String>,
}

/// Per-source-file bookkeeping tracked by the Manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub source_path: String,
    pub content_hash: String,
    pub indexed_at: DateTime<Utc>,
    pub chunk_ids: Vec<String>,
}

/// Where a [`RetrievalCandidate`] came from. Closed vocabulary.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    Lexical,
    Vector,
    Linked,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::Lexical => "lexical",
            Provenance::Vector => "vector",
            Provenance::Linked => "linked",
        }
    }
}

/// A transient candidate produced by the retrieval stack, scoped to a single
/// question's lifecycle. The Hybrid Retriever, Reranker, and Graph Expander
/// all produce and consume this one shape — there is no class hierarchy.
#[derive(Debug, Clone)]
pub struct RetrievalCandidate {
    pub chunk_id: String,
    pub text: String,
    pub source_path: String,
    pub score: f64,
    pub provenance: Provenance,
}

/// The final per-source record returned to the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredSource {
    pub source: String,
    pub score: f64,
    pub retrieval_type: String,
}

impl From<&RetrievalCandidate> for ScoredSource {
    fn from(candidate: &RetrievalCandidate) -> Self {
        ScoredSource {
            source: candidate.source_path.clone(),
            score: candidate.score,
            retrieval_type: candidate.provenance.as_str().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provenance_as_str() {
        assert_eq!(Provenance::Lexical.as_str(), "lexical");
        assert_eq!(Provenance::Vector.as_str(), "vector");
        assert_eq!(Provenance::Linked.as_str(), "linked");
    }

    #[test]
    fn scored_source_from_candidate() {
        let candidate = RetrievalCandidate {
            chunk_id: "abc".into(),
            text: "hello".into(),
            source_path: "notes/a.md".into(),
            score: 0.75,
            provenance: Provenance::Vector,
        };
        let source = ScoredSource::from(&candidate);
        assert_eq!(source.source, "notes/a.md");
        assert_eq!(source.retrieval_type, "vector");
    }
}
