//! The Graph Expander: follows outbound wiki-link targets from retrieved
//! chunks to depth 1, pulling in directly linked documents as additional
//! context.
//!
//! Structurally modeled on the Hybrid Retriever's Retrieval Candidate
//! production — same shape, `linked` provenance tag — rather than a
//! separate class hierarchy for this stage.

use std::collections::HashSet;
use std::sync::Arc;

use crate::models::{Provenance, RetrievalCandidate};
use crate::vector_store::VectorStore;

/// Fixed provenance score for `linked` candidates — lower than any
/// reranker output, so graph-expanded context never outranks retrieved
/// context.
pub const LINKED_SCORE: f64 = 0.05;

pub struct GraphExpander {
    vector_store: Arc<VectorStore>,
}

impl GraphExpander {
    pub fn new(vector_store: Arc<VectorStore>) -> Self {
        Self { vector_store }
    }

    /// Given a candidate list, collect every link target mentioned in the
    /// chunk text, resolve each against known source paths, and append
    /// whole-document candidates for the ones not already represented.
    /// Broken links are silently dropped.
    pub async fn expand(&self, candidates: Vec<RetrievalCandidate>) -> anyhow::Result<Vec<RetrievalCandidate>> {
        let known_paths = self.vector_store.distinct_source_paths().await?;
        let represented: HashSet<&str> = candidates.iter().map(|c| c.source_path.as_str()).collect();

        let targets: HashSet<String> = candidates
            .iter()
            .flat_map(|c| crate::chunk::extract_wiki_links(&c.text))
            .collect();

        let mut expanded = candidates;
        for target in targets {
            let resolved = resolve_target(&target, &known_paths);
            let Some(path) = resolved else { continue };
            if represented.contains(path.as_str()) {
                continue;
            }
            if expanded.iter().any(|c| c.source_path == path) {
                continue;
            }
            let Some(text) = self.vector_store.full_document_text(&path).await? else {
                continue;
            };
            expanded.push(RetrievalCandidate {
                chunk_id: format!("linked:{path}"),
                text,
                source_path: path,
                score: LINKED_SCORE,
                provenance: Provenance::Linked,
            });
        }

        Ok(expanded)
    }
}

/// Resolve a wiki-link target against known source paths: exact match
/// preferred, falling back to case-insensitive basename match.
fn resolve_target(target: &str, known_paths: &[String]) -> Option<String> {
    let candidate_exact = format!("{target}.md");
    if known_paths.iter().any(|p| p == &candidate_exact) {
        return Some(candidate_exact);
    }
    if known_paths.iter().any(|p| p == target) {
        return Some(target.to_string());
    }

    let target_lower = target.to_lowercase();
    known_paths
        .iter()
        .find(|p| {
            let basename = std::path::Path::new(p.as_str())
                .file_stem()
                .map(|s| s.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            basename == target_lower
        })
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn expands_with_linked_document_when_target_resolves() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(VectorStore::open(tmp.path()).await.unwrap());
        store
            .upsert(&[crate::models::VectorRecord {
                chunk_id: "b-0".into(),
                embedding: vec![1.0],
                source_path: "b.md".into(),
                chunk_index: 0,
                text: "World".into(),
                outbound_links: vec![],
            }])
            .await
            .unwrap();

        let expander = GraphExpander::new(store);
        let candidates = vec![RetrievalCandidate {
            chunk_id: "a-0".into(),
            text: "Hello [[b]]".into(),
            source_path: "a.md".into(),
            score: 0.9,
            provenance: Provenance::Vector,
        }];

        let expanded = expander.expand(candidates).await.unwrap();
        assert_eq!(expanded.len(), 2);
        let linked = expanded.iter().find(|c| c.provenance == Provenance::Linked).unwrap();
        assert_eq!(linked.source_path, "b.md");
        assert_eq!(linked.score, LINKED_SCORE);
    }

    #[tokio::test]
    async fn broken_links_are_silently_dropped() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(VectorStore::open(tmp.path()).await.unwrap());
        let expander = GraphExpander::new(store);
        let candidates = vec![RetrievalCandidate {
            chunk_id: "a-0".into(),
            text: "Hello [[nonexistent]]".into(),
            source_path: "a.md".into(),
            score: 0.9,
            provenance: Provenance::Vector,
        }];
        let expanded = expander.expand(candidates).await.unwrap();
        assert_eq!(expanded.len(), 1);
    }

    #[tokio::test]
    async fn already_represented_target_is_not_duplicated() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(VectorStore::open(tmp.path()).await.unwrap());
        store
            .upsert(&[crate::models::VectorRecord {
                chunk_id: "b-0".into(),
                embedding: vec![1.0],
                source_path: "b.md".into(),
                chunk_index: 0,
                text: "World".into(),
                outbound_links: vec![],
            }])
            .await
            .unwrap();
        let expander = GraphExpander::new(store);
        let candidates = vec![
            RetrievalCandidate {
                chunk_id: "a-0".into(),
                text: "Hello [[b]]".into(),
                source_path: "a.md".into(),
                score: 0.9,
                provenance: Provenance::Vector,
            },
            RetrievalCandidate {
                chunk_id: "b-0".into(),
                text: "World".into(),
                source_path: "b.md".into(),
                score: 0.3,
                provenance: Provenance::Lexical,
            },
        ];
        let expanded = expander.expand(candidates).await.unwrap();
        assert_eq!(expanded.len(), 2);
    }
}
