// Score-fusion re-ranking for retrieved listings
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::config::RetrievalConfig;
use crate::rag::tokens::content_tokens;
use crate::types::{RetrievalCandidate, RetrievalFilter};

/// Re-ranking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReRankConfig {
    /// Multiplicative boost per satisfied filter constraint
    pub constraint_boost: f64,
    /// Cap on the multiplicative boost from description keyword hits
    pub keyword_boost: f64,
}

impl Default for ReRankConfig {
    fn default() -> Self {
        Self {
            constraint_boost: 0.25,
            keyword_boost: 0.1,
        }
    }
}

impl From<&RetrievalConfig> for ReRankConfig {
    fn from(config: &RetrievalConfig) -> Self {
        Self {
            constraint_boost: config.constraint_boost,
            keyword_boost: config.keyword_boost,
        }
    }
}

/// Candidate with its fused score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedCandidate {
    pub candidate: RetrievalCandidate,
    pub fused_score: f64,
    /// Multiplier applied on top of cosine similarity
    pub boost: f64,
    pub matched_constraints: usize,
}

/// Re-ranker: fused = cosine × field boost
pub struct ReRanker {
    config: ReRankConfig,
}

impl ReRanker {
    /// Create new re-ranker with default config
    pub fn new() -> Self {
        Self {
            config: ReRankConfig::default(),
        }
    }

    /// Create with custom configuration
    pub fn with_config(config: ReRankConfig) -> Self {
        Self { config }
    }

    /// Re-rank candidates, descending by fused score, ties by id ascending
    pub fn rerank(
        &self,
        candidates: Vec<RetrievalCandidate>,
        query: &str,
        filter: Option<&RetrievalFilter>,
    ) -> Vec<RankedCandidate> {
        let mut ranked: Vec<RankedCandidate> = candidates
            .into_iter()
            .map(|candidate| {
                let matched = filter.map_or(0, |f| f.matched_constraints(&candidate.metadata));
                let boost = self.field_boost(&candidate, query, matched);
                RankedCandidate {
                    fused_score: candidate.score * boost,
                    boost,
                    matched_constraints: matched,
                    candidate,
                }
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.fused_score
                .partial_cmp(&a.fused_score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.candidate.id.cmp(&b.candidate.id))
        });

        ranked
    }

    /// Deterministic multiplier ≥ 1.0
    pub fn field_boost(&self, candidate: &RetrievalCandidate, query: &str, matched: usize) -> f64 {
        1.0 + matched as f64 * self.config.constraint_boost
            + self.keyword_boost(candidate, query)
    }

    /// Share of query content tokens found in the description, scaled to the cap
    fn keyword_boost(&self, candidate: &RetrievalCandidate, query: &str) -> f64 {
        let query_tokens = content_tokens(query);
        if query_tokens.is_empty() || self.config.keyword_boost == 0.0 {
            return 0.0;
        }

        let description = content_tokens(&candidate.metadata.description);
        let matches = query_tokens.intersection(&description).count();
        self.config.keyword_boost * matches as f64 / query_tokens.len() as f64
    }

    /// Get current configuration
    pub fn config(&self) -> &ReRankConfig {
        &self.config
    }
}

impl Default for ReRanker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PropertyMetadata;

    fn listing(id: &str, score: f64, price: f64, beds: f64) -> RetrievalCandidate {
        RetrievalCandidate::new(
            id,
            score,
            PropertyMetadata {
                price: Some(price),
                bedrooms: Some(beds),
                ..Default::default()
            },
        )
    }

    fn no_keywords() -> ReRanker {
        ReRanker::with_config(ReRankConfig {
            constraint_boost: 0.25,
            keyword_boost: 0.0,
        })
    }

    #[test]
    fn test_matching_candidate_boosted_above_higher_cosine() {
        let filter = RetrievalFilter {
            price_min: Some(300_000.0),
            price_max: Some(500_000.0),
            beds_min: Some(3.0),
            ..Default::default()
        };
        let candidates = vec![
            listing("high-cosine", 0.90, 800_000.0, 2.0),
            listing("matches-both", 0.70, 420_000.0, 3.0),
            listing("matches-price", 0.70, 350_000.0, 1.0),
        ];

        let ranked = no_keywords().rerank(candidates, "homes", Some(&filter));

        assert_eq!(ranked[0].candidate.id, "matches-both");
        assert_eq!(ranked[0].matched_constraints, 2);
        assert!((ranked[0].fused_score - 0.70 * 1.5).abs() < 1e-9);
        assert_eq!(ranked[1].candidate.id, "high-cosine");
        assert!(ranked
            .windows(2)
            .all(|w| w[0].fused_score >= w[1].fused_score));
    }

    #[test]
    fn test_ties_broken_by_id() {
        let candidates = vec![
            listing("c", 0.5, 1.0, 1.0),
            listing("a", 0.5, 1.0, 1.0),
            listing("b", 0.5, 1.0, 1.0),
        ];
        let ranked = no_keywords().rerank(candidates, "", None);
        let ids: Vec<&str> = ranked.iter().map(|r| r.candidate.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_keyword_boost_from_description() {
        let ranker = ReRanker::new();
        let mut with_pool = listing("1", 0.8, 1.0, 1.0);
        with_pool.metadata.description = "Renovated home with a pool and large yard".to_string();
        let plain = listing("2", 0.8, 1.0, 1.0);

        let ranked = ranker.rerank(vec![plain, with_pool], "pool yard", None);
        assert_eq!(ranked[0].candidate.id, "1");
        assert!((ranked[0].boost - 1.1).abs() < 1e-9);
        assert_eq!(ranked[1].boost, 1.0);
    }
}
