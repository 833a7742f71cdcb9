//! The Hybrid Retriever: runs lexical and vector queries concurrently and
//! fuses their results with configurable weights.
//!
//! Grounded in teacher's `search.rs` normalize/fuse logic, with two
//! deliberate deviations: the two source queries run via `tokio::join!`
//! for genuine concurrency (teacher runs them sequentially), and the final
//! sort applies a fully deterministic tie-break (teacher's tie-break is
//! weaker — it falls through to `updated_at` then `id`, fields this system
//! doesn't carry on a candidate).

use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::Config;
use crate::embedder::Embedder;
use crate::lexical_store::LexicalStore;
use crate::models::{Provenance, RetrievalCandidate};
use crate::vector_store::VectorStore;

pub struct HybridRetriever {
    vector_store: Arc<VectorStore>,
    lexical_store: Arc<LexicalStore>,
    embedder: Arc<dyn Embedder>,
    retrieval_k: usize,
    bm25_k: usize,
    vector_weight: f64,
    bm25_weight: f64,
}

impl HybridRetriever {
    pub fn new(
        vector_store: Arc<VectorStore>,
        lexical_store: Arc<LexicalStore>,
        embedder: Arc<dyn Embedder>,
        config: &Config,
    ) -> Self {
        Self {
            vector_store,
            lexical_store,
            embedder,
            retrieval_k: config.retrieval_k,
            bm25_k: config.bm25_k,
            vector_weight: config.vector_weight,
            bm25_weight: config.bm25_weight,
        }
    }

    /// Given a question, return a fused, ordered candidate list.
    pub async fn retrieve(&self, question: &str) -> Result<Vec<RetrievalCandidate>> {
        let query_vector = self.embedder.embed_query(question).await?;

        let (vector_hits, lexical_hits) = tokio::join!(
            self.vector_store.query(&query_vector, self.retrieval_k),
            async { self.lexical_store.query(question, self.bm25_k) }
        );
        let vector_hits = vector_hits?;
        let lexical_hits = lexical_hits?;

        let vector_scores = normalize(vector_hits.iter().map(|(_, s)| *s));
        let lexical_scores = normalize(lexical_hits.iter().map(|(_, s)| *s));

        struct Entry {
            text: String,
            source_path: String,
            vector_score: f64,
            bm25_score: f64,
        }

        let mut by_id: HashMap<String, Entry> = HashMap::new();

        for ((record, _raw), norm) in vector_hits.iter().zip(vector_scores.iter()) {
            by_id
                .entry(record.chunk_id.clone())
                .or_insert_with(|| Entry {
                    text: record.text.clone(),
                    source_path: record.source_path.clone(),
                    vector_score: 0.0,
                    bm25_score: 0.0,
                })
                .vector_score = *norm;
        }

        // Lexical hits only carry a chunk_id/score; fetch text/path via the
        // vector store since every indexed chunk lives there too.
        let all_records = self.vector_store.all_records().await?;
        let records_by_id: HashMap<&str, &crate::models::VectorRecord> =
            all_records.iter().map(|r| (r.chunk_id.as_str(), r)).collect();

        for ((chunk_id, _raw), norm) in lexical_hits.iter().zip(lexical_scores.iter()) {
            let entry = by_id.entry(chunk_id.clone()).or_insert_with(|| {
                let (text, source_path) = records_by_id
                    .get(chunk_id.as_str())
                    .map(|r| (r.text.clone(), r.source_path.clone()))
                    .unwrap_or_default();
                Entry {
                    text,
                    source_path,
                    vector_score: 0.0,
                    bm25_score: 0.0,
                }
            });
            entry.bm25_score = *norm;
        }

        let mut candidates: Vec<RetrievalCandidate> = by_id
            .into_iter()
            .map(|(chunk_id, entry)| {
                let fused = self.vector_weight * entry.vector_score + self.bm25_weight * entry.bm25_score;
                let provenance = if entry.vector_score > 0.0 && entry.bm25_score == 0.0 {
                    Provenance::Vector
                } else if entry.bm25_score > 0.0 && entry.vector_score == 0.0 {
                    Provenance::Lexical
                } else if entry.vector_score >= entry.bm25_score {
                    Provenance::Vector
                } else {
                    Provenance::Lexical
                };
                RetrievalCandidate {
                    chunk_id,
                    text: entry.text,
                    source_path: entry.source_path,
                    score: fused,
                    provenance,
                }
            })
            .collect();

        sort_candidates(&mut candidates, &by_id_vector_scores(&vector_hits, &vector_scores));
        Ok(candidates)
    }
}

/// Max-normalize a score sequence into `[0, 1]` (see DESIGN.md's Open
/// Question note on score normalization).
fn normalize<I: IntoIterator<Item = f64>>(scores: I) -> Vec<f64> {
    let scores: Vec<f64> = scores.into_iter().collect();
    let max = scores.iter().cloned().fold(0.0_f64, f64::max);
    if max <= 0.0 {
        return scores.iter().map(|_| 0.0).collect();
    }
    scores.iter().map(|s| s / max).collect()
}

fn by_id_vector_scores(
    vector_hits: &[(crate::models::VectorRecord, f64)],
    vector_scores: &[f64],
) -> HashMap<String, f64> {
    vector_hits
        .iter()
        .zip(vector_scores.iter())
        .map(|((record, _), score)| (record.chunk_id.clone(), *score))
        .collect()
}

/// Sort by fused score desc; tie-break on higher vector score, then lower
/// Chunk ID lexicographically.
fn sort_candidates(candidates: &mut [RetrievalCandidate], vector_scores: &HashMap<String, f64>) {
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                let va = vector_scores.get(&a.chunk_id).copied().unwrap_or(0.0);
                let vb = vector_scores.get(&b.chunk_id).copied().unwrap_or(0.0);
                vb.partial_cmp(&va).unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });
}
