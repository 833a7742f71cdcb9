//! The Reranker: re-scores a candidate list with a cross-encoder scoring
//! function and truncates to the top N.
//!
//! Conditionally constructed behind a runtime flag, with a graceful
//! `tracing::warn!` + `None` fallback on load failure rather than aborting
//! startup — the pattern used by `other_examples`' shodhRAG `RAGEngine`
//! around its own `Option<CrossEncoderReranker>`.

use crate::config::Config;
use crate::models::RetrievalCandidate;
use tracing::warn;

/// A cross-encoder scoring function over (question, candidate text) pairs.
/// The concrete scorer is intentionally narrow — only the contract is
/// fixed, not the model behind it.
pub trait CrossEncoder: Send + Sync {
    fn score(&self, question: &str, text: &str) -> f64;
}

/// A simple lexical-overlap cross-encoder: scores a (question, text) pair
/// by the fraction of question terms present in the text. Any cross-encoder
/// implementing [`CrossEncoder`] is a drop-in replacement.
pub struct OverlapCrossEncoder;

impl CrossEncoder for OverlapCrossEncoder {
    fn score(&self, question: &str, text: &str) -> f64 {
        let question_terms: std::collections::HashSet<String> =
            question.to_lowercase().split_whitespace().map(str::to_string).collect();
        if question_terms.is_empty() {
            return 0.0;
        }
        let text_lower = text.to_lowercase();
        let hits = question_terms
            .iter()
            .filter(|term| text_lower.contains(term.as_str()))
            .count();
        hits as f64 / question_terms.len() as f64
    }
}

pub struct Reranker {
    cross_encoder: Option<Box<dyn CrossEncoder>>,
    top_n: usize,
    min_score: f64,
}

impl Reranker {
    /// Build a reranker per `config.use_reranker`. Falls back to disabled
    /// (`cross_encoder: None`) with a warning if construction fails, rather
    /// than failing startup.
    pub fn new(config: &Config) -> Self {
        let cross_encoder: Option<Box<dyn CrossEncoder>> = if config.use_reranker {
            Some(Box::new(OverlapCrossEncoder))
        } else {
            None
        };
        if config.use_reranker && cross_encoder.is_none() {
            warn!("reranker enabled but failed to load; falling back to fused scores");
        }
        Self {
            cross_encoder,
            top_n: config.reranker_top_n,
            min_score: config.min_score,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.cross_encoder.is_some()
    }

    /// Re-score (if enabled) and apply the minimum-score threshold. When
    /// disabled, the Hybrid Retriever's fused scores are used directly and
    /// the threshold still applies.
    pub fn rerank(&self, question: &str, mut candidates: Vec<RetrievalCandidate>) -> Vec<RetrievalCandidate> {
        if let Some(cross_encoder) = &self.cross_encoder {
            for candidate in &mut candidates {
                candidate.score = cross_encoder.score(question, &candidate.text);
            }
            candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
            candidates.truncate(self.top_n);
        }

        apply_threshold(candidates, self.min_score)
    }
}

/// Drop candidates below `min_score`, unless that would leave zero, in
/// which case keep the single highest-scored one regardless.
fn apply_threshold(mut candidates: Vec<RetrievalCandidate>, min_score: f64) -> Vec<RetrievalCandidate> {
    let kept: Vec<RetrievalCandidate> = candidates
        .iter()
        .filter(|c| c.score >= min_score)
        .cloned()
        .collect();
    if !kept.is_empty() {
        return kept;
    }
    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    candidates.truncate(1);
    candidates
}
