//! Expert router
//!
//! Turns the conversation's weight vector into this turn's distribution and
//! fan-out set. Adjustments applied before renormalizing:
//! - the keyword-hinted role is multiplied by `topic_boost`
//! - with no retrieved evidence, `data` and `cluster` are multiplied by
//!   `empty_retrieval_damping`
//! - with evidence, a flat score spread (high entropy) favors `cluster`, a
//!   strong top hit favors `data`
//!
//! Selection walks roles by descending weight (ties in lexical order) until
//! the covered mass reaches `coverage`, capped at `max_concurrency`.

use serde::{Deserialize, Serialize};

use crate::config::RouterConfig;
use crate::rag::retrieval::RetrievalStats;
use crate::rag::tokens::raw_tokens;
use crate::types::{ConversationContext, ExpertRole};
use crate::weights::ExpertWeightVector;

pub const MIN_CONCURRENCY: usize = 2;
pub const MAX_CONCURRENCY: usize = 5;

const COVERAGE_EPSILON: f64 = 1e-9;

/// Entropy above which candidates look like several market segments
const HIGH_ENTROPY: f64 = 0.9;
/// Fused score above which the top hit is treated as a direct answer
const STRONG_TOP_SCORE: f64 = 0.85;
const EVIDENCE_BOOST: f64 = 1.2;

/// Keyword stems per role; a token matches when it starts with the stem
const TOPIC_STEMS: &[(ExpertRole, &[&str])] = &[
    (
        ExpertRole::Finance,
        &["pric", "afford", "mortgage", "payment", "budget", "loan", "cost", "tax"],
    ),
    (
        ExpertRole::Neighborhood,
        &["location", "neighborhood", "neighbourhood", "school", "commute", "safety", "safe", "crime", "district"],
    ),
    (
        ExpertRole::Lifestyle,
        &["lifestyle", "walkab", "walk", "park", "restaurant", "shop", "amenit", "gym", "nightlife", "outdoor"],
    ),
    (ExpertRole::Cluster, &["similar", "comparable", "alternative", "compare"]),
    (ExpertRole::Data, &["stat", "average", "median", "market", "trend", "data"]),
];

/// Multi-word cues checked against the lowercased text
const TOPIC_PHRASES: &[(ExpertRole, &str)] = &[
    (ExpertRole::Cluster, "like this"),
    (ExpertRole::Cluster, "more like"),
    (ExpertRole::Data, "how many"),
    (ExpertRole::Finance, "how much"),
    (ExpertRole::Finance, "interest rate"),
];

/// Keyword classifier over one text; the role with most hits wins,
/// ties in lexical role order
pub fn classify_topic(text: &str) -> Option<ExpertRole> {
    let lowered = text.to_lowercase();
    let tokens = raw_tokens(&lowered);
    let mut hits = [0usize; ExpertRole::COUNT];

    for (role, stems) in TOPIC_STEMS {
        hits[role.index()] += tokens
            .iter()
            .filter(|t| stems.iter().any(|s| t.starts_with(s)))
            .count();
    }
    for (role, phrase) in TOPIC_PHRASES {
        if lowered.contains(phrase) {
            hits[role.index()] += 1;
        }
    }

    ExpertRole::ALL
        .iter()
        .copied()
        .filter(|r| hits[r.index()] > 0)
        .max_by(|a, b| hits[a.index()].cmp(&hits[b.index()]).then_with(|| b.cmp(a)))
}

/// Topic hint from the query, falling back to the previous user turn
pub fn topic_signal(query: &str, context: &ConversationContext) -> Option<ExpertRole> {
    classify_topic(query).or_else(|| {
        context
            .last_user_turn()
            .and_then(|turn| classify_topic(&turn.content))
    })
}

/// Router output for one turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub distribution: ExpertWeightVector,
    /// Roles to invoke, highest weight first
    pub selected: Vec<ExpertRole>,
    pub topic: Option<ExpertRole>,
    /// Distribution mass covered by `selected`
    pub covered_mass: f64,
}

impl RoutingDecision {
    pub fn weight(&self, role: ExpertRole) -> f64 {
        self.distribution.get(role)
    }
}

#[derive(Debug, Clone)]
pub struct ExpertRouter {
    coverage: f64,
    max_concurrency: usize,
    topic_boost: f64,
    empty_retrieval_damping: f64,
}

impl ExpertRouter {
    pub fn new(config: &RouterConfig) -> Self {
        Self {
            coverage: config.coverage.clamp(0.0, 1.0),
            max_concurrency: config.max_concurrency.clamp(MIN_CONCURRENCY, MAX_CONCURRENCY),
            topic_boost: config.topic_boost.max(0.0),
            empty_retrieval_damping: config.empty_retrieval_damping.max(0.0),
        }
    }

    /// Routing from weights and topic alone, before any retrieval
    pub fn prior(&self, weights: &ExpertWeightVector, topic: Option<ExpertRole>) -> RoutingDecision {
        let factors = self.topic_factors(topic);
        self.decide(weights.scaled(&factors), topic)
    }

    /// Full routing with retrieval statistics
    pub fn route(
        &self,
        weights: &ExpertWeightVector,
        topic: Option<ExpertRole>,
        stats: &RetrievalStats,
    ) -> RoutingDecision {
        let mut factors = self.topic_factors(topic);

        if stats.candidate_count == 0 {
            factors[ExpertRole::Data.index()] *= self.empty_retrieval_damping;
            factors[ExpertRole::Cluster.index()] *= self.empty_retrieval_damping;
        } else {
            if stats.candidate_count >= 2 && stats.entropy >= HIGH_ENTROPY {
                factors[ExpertRole::Cluster.index()] *= EVIDENCE_BOOST;
            }
            if stats.top_score >= STRONG_TOP_SCORE {
                factors[ExpertRole::Data.index()] *= EVIDENCE_BOOST;
            }
        }

        self.decide(weights.scaled(&factors), topic)
    }

    fn topic_factors(&self, topic: Option<ExpertRole>) -> [f64; ExpertRole::COUNT] {
        let mut factors = [1.0; ExpertRole::COUNT];
        if let Some(role) = topic {
            factors[role.index()] *= self.topic_boost;
        }
        factors
    }

    fn decide(&self, distribution: ExpertWeightVector, topic: Option<ExpertRole>) -> RoutingDecision {
        let (selected, covered_mass) = self.select(&distribution);
        RoutingDecision {
            distribution,
            selected,
            topic,
            covered_mass,
        }
    }

    /// Smallest descending-weight prefix reaching `coverage`, capped
    pub fn select(&self, distribution: &ExpertWeightVector) -> (Vec<ExpertRole>, f64) {
        let mut selected = Vec::new();
        let mut mass = 0.0;

        for (role, weight) in distribution.ranked() {
            if selected.len() >= self.max_concurrency {
                break;
            }
            if !selected.is_empty() && mass + COVERAGE_EPSILON >= self.coverage {
                break;
            }
            selected.push(role);
            mass += weight;
        }

        (selected, mass)
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }
}
