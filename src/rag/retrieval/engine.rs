// Retriever: one similarity search, soft-failing, then score fusion
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::clients::{SearchRequest, SimilaritySearch};
use crate::config::RetrievalConfig;
use crate::errors::ChatError;
use crate::rag::reranking::{RankedCandidate, ReRankConfig, ReRanker};
use crate::telemetry::{TelemetryCollector, TelemetryEvent};
use crate::types::{RetrievalCandidate, RetrievalFilter};

/// Bounds on `top_k`
pub const MIN_TOP_K: usize = 8;
pub const MAX_TOP_K: usize = 20;

/// Summary statistics the router consumes
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalStats {
    pub candidate_count: usize,
    pub top_score: f64,
    /// Normalized Shannon entropy of the fused scores, in [0, 1]
    pub entropy: f64,
}

impl RetrievalStats {
    pub fn from_ranked(ranked: &[RankedCandidate]) -> Self {
        let top_score = ranked.first().map_or(0.0, |r| r.fused_score);
        Self {
            candidate_count: ranked.len(),
            top_score,
            entropy: normalized_entropy(ranked.iter().map(|r| r.fused_score)),
        }
    }
}

/// Entropy of a score list treated as a distribution; 0.0 for fewer than two scores
pub fn normalized_entropy(scores: impl Iterator<Item = f64>) -> f64 {
    let scores: Vec<f64> = scores.map(|s| s.max(0.0)).collect();
    let total: f64 = scores.iter().sum();
    if scores.len() < 2 || total <= 0.0 {
        return 0.0;
    }

    let entropy: f64 = scores
        .iter()
        .filter(|s| **s > 0.0)
        .map(|s| {
            let p = s / total;
            -p * p.ln()
        })
        .sum();

    (entropy / (scores.len() as f64).ln()).clamp(0.0, 1.0)
}

/// Result of one retrieval stage
#[derive(Debug, Clone, Default)]
pub struct RetrievalOutcome {
    pub candidates: Vec<RankedCandidate>,
    pub stats: RetrievalStats,
    /// Set when the search call timed out or errored
    pub failure: Option<String>,
}

/// Retrieval engine for similarity search
pub struct RetrievalEngine {
    search: Arc<dyn SimilaritySearch>,
    reranker: ReRanker,
    top_k: usize,
    timeout: Duration,
    telemetry: TelemetryCollector,
}

impl RetrievalEngine {
    pub fn new(
        search: Arc<dyn SimilaritySearch>,
        config: &RetrievalConfig,
        timeout: Duration,
        telemetry: TelemetryCollector,
    ) -> Self {
        Self {
            search,
            reranker: ReRanker::with_config(ReRankConfig::from(config)),
            top_k: config.top_k.clamp(MIN_TOP_K, MAX_TOP_K),
            timeout,
            telemetry,
        }
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Search once; timeouts and errors yield an empty result
    pub async fn retrieve(&self, query: &str, filter: Option<&RetrievalFilter>) -> RetrievalOutcome {
        let request = SearchRequest {
            query: query.to_string(),
            top_k: self.top_k,
            filter: filter.cloned(),
        };

        let started = Instant::now();
        let result = match tokio::time::timeout(self.timeout, self.search.search(&request)).await {
            Ok(inner) => inner,
            Err(_) => Err(ChatError::timeout(self.timeout)),
        };

        let raw = match result {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "similarity search failed; continuing without evidence");
                self.telemetry.record(TelemetryEvent::RetrievalFailed {
                    reason: e.to_string(),
                    timestamp: Instant::now(),
                });
                return RetrievalOutcome {
                    failure: Some(e.to_string()),
                    ..Default::default()
                };
            }
        };

        let raw = sanitize_scores(raw);
        let mut candidates = self.reranker.rerank(raw, query, filter);
        candidates.truncate(self.top_k);
        let stats = RetrievalStats::from_ranked(&candidates);

        let duration_ms = started.elapsed().as_millis() as u64;
        debug!(
            candidates = candidates.len(),
            top_score = stats.top_score,
            duration_ms,
            "retrieval completed"
        );
        self.telemetry.record(TelemetryEvent::RetrievalCompleted {
            candidates: candidates.len(),
            duration_ms,
            timestamp: Instant::now(),
        });

        RetrievalOutcome {
            candidates,
            stats,
            failure: None,
        }
    }
}

/// Clamp collaborator scores into [0, 1]; hits without a finite score are dropped
fn sanitize_scores(raw: Vec<RetrievalCandidate>) -> Vec<RetrievalCandidate> {
    let before = raw.len();
    let kept: Vec<RetrievalCandidate> = raw
        .into_iter()
        .filter(|c| c.score.is_finite())
        .map(|mut c| {
            c.score = c.score.clamp(0.0, 1.0);
            c
        })
        .collect();
    if kept.len() < before {
        warn!(dropped = before - kept.len(), "search returned hits without a finite score");
    }
    kept
}
