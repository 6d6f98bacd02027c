// Retrieval stage: gate -> search -> rerank -> cluster -> insights -> evidence
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::clients::SimilaritySearch;
use crate::config::Config;
use crate::rag::cluster::{ClusterAdvice, ClusterAdvisor};
use crate::rag::context::{AssembledContext, ContextBuilder, ContextConfig};
use crate::rag::gate::{GateDecision, RetrievalGate};
use crate::rag::insights::MarketInsights;
use crate::rag::reranking::RankedCandidate;
use crate::rag::retrieval::{RetrievalEngine, RetrievalStats};
use crate::telemetry::{TelemetryCollector, TelemetryEvent};
use crate::types::{BoundingBox, ConversationContext, RetrievalCandidate};

/// Everything the retrieval stage hands to the router and the experts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagResult {
    pub decision: GateDecision,
    /// Query sent to search (may be reformulated)
    pub search_query: String,
    pub candidates: Vec<RankedCandidate>,
    pub stats: RetrievalStats,
    pub cluster: ClusterAdvice,
    pub insights: MarketInsights,
    pub evidence: AssembledContext,
    /// Soft failure from the search call, if any
    pub failure: Option<String>,
}

impl RagResult {
    /// Result for a turn where the gate declined retrieval
    pub fn skipped(decision: GateDecision, query: &str) -> Self {
        Self {
            search_query: query.to_string(),
            decision,
            candidates: Vec::new(),
            stats: RetrievalStats::default(),
            cluster: ClusterAdvice::default(),
            insights: MarketInsights::default(),
            evidence: AssembledContext::default(),
            failure: None,
        }
    }

    /// Whether search actually ran this turn
    pub fn retrieved(&self) -> bool {
        self.decision.retrieve
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn raw_candidates(&self) -> impl Iterator<Item = &RetrievalCandidate> {
        self.candidates.iter().map(|r| &r.candidate)
    }
}

/// End-to-end retrieval stage
pub struct RagPipeline {
    gate: RetrievalGate,
    engine: RetrievalEngine,
    advisor: ClusterAdvisor,
    context_builder: ContextBuilder,
    telemetry: TelemetryCollector,
}

impl RagPipeline {
    /// Create the stage from configuration
    pub fn new(
        search: Arc<dyn SimilaritySearch>,
        config: &Config,
        telemetry: TelemetryCollector,
    ) -> Self {
        Self::with_context_config(search, config, ContextConfig::default(), telemetry)
    }

    /// Create with a custom evidence layout
    pub fn with_context_config(
        search: Arc<dyn SimilaritySearch>,
        config: &Config,
        context: ContextConfig,
        telemetry: TelemetryCollector,
    ) -> Self {
        Self {
            gate: RetrievalGate::from_config(&config.retrieval),
            engine: RetrievalEngine::new(
                search,
                &config.retrieval,
                config.search.timeout(),
                telemetry.clone(),
            ),
            advisor: ClusterAdvisor::new(&config.clustering),
            context_builder: ContextBuilder::with_config(context),
            telemetry,
        }
    }

    /// Gate decision only; no network
    pub fn gate(
        &self,
        query: &str,
        context: &ConversationContext,
        bounds: Option<BoundingBox>,
    ) -> GateDecision {
        self.gate.decide(query, context, bounds)
    }

    /// Run retrieval for an already gated turn. Never fails.
    pub async fn run(
        &self,
        query: &str,
        context: &ConversationContext,
        decision: GateDecision,
    ) -> RagResult {
        if !decision.retrieve {
            debug!(reason = ?decision.reason, drift = decision.features.drift, "retrieval skipped");
            self.telemetry.record(TelemetryEvent::RetrievalSkipped {
                timestamp: Instant::now(),
            });
            return RagResult::skipped(decision, query);
        }

        let search_query = decision.search_query(query).to_string();

        // Step 1: Search and re-rank
        let outcome = self
            .engine
            .retrieve(&search_query, decision.filter.as_ref())
            .await;

        // Step 2: Cluster for similar-home hints
        let raw: Vec<RetrievalCandidate> =
            outcome.candidates.iter().map(|r| r.candidate.clone()).collect();
        let cluster = self
            .advisor
            .advise(&raw, decision.filter.as_ref(), &context.last_recommended);

        // Step 3: Market summary and evidence text
        let insights = MarketInsights::from_candidates(&raw);
        let evidence = self.context_builder.build(&outcome.candidates);

        debug!(
            query = %search_query,
            candidates = outcome.candidates.len(),
            clusters = cluster.assignment.cluster_count(),
            hints = cluster.similar_homes.len(),
            "retrieval stage complete"
        );

        RagResult {
            decision,
            search_query,
            candidates: outcome.candidates,
            stats: outcome.stats,
            cluster,
            insights,
            evidence,
            failure: outcome.failure,
        }
    }

    /// Gate and retrieve in one call
    pub async fn execute(
        &self,
        query: &str,
        context: &ConversationContext,
        bounds: Option<BoundingBox>,
    ) -> RagResult {
        let decision = self.gate(query, context, bounds);
        self.run(query, context, decision).await
    }

    pub fn top_k(&self) -> usize {
        self.engine.top_k()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::SearchRequest;
    use crate::errors::Result;
    use crate::types::{PropertyMetadata, Turn};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSearch {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SimilaritySearch for CountingSearch {
        async fn search(&self, request: &SearchRequest) -> Result<Vec<RetrievalCandidate>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![
                RetrievalCandidate::new(
                    "h1",
                    0.8,
                    PropertyMetadata {
                        price: Some(420_000.0),
                        bedrooms: Some(3.0),
                        city: Some("Austin".to_string()),
                        description: request.query.clone(),
                        ..Default::default()
                    },
                ),
                RetrievalCandidate::new(
                    "h2",
                    0.7,
                    PropertyMetadata {
                        price: Some(390_000.0),
                        bedrooms: Some(4.0),
                        city: Some("Austin".to_string()),
                        ..Default::default()
                    },
                ),
            ])
        }
    }

    fn pipeline() -> (RagPipeline, Arc<CountingSearch>) {
        let search = Arc::new(CountingSearch {
            calls: AtomicUsize::new(0),
        });
        let pipeline = RagPipeline::new(search.clone(), &Config::default(), TelemetryCollector::new());
        (pipeline, search)
    }

    #[tokio::test]
    async fn test_constrained_query_runs_full_stage() {
        let (pipeline, search) = pipeline();
        let context = ConversationContext::new("c1");
        let result = pipeline
            .execute("3 bedroom homes under $450k in Austin", &context, None)
            .await;

        assert!(result.retrieved());
        assert_eq!(search.calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.candidates.len(), 2);
        assert_eq!(result.stats.candidate_count, 2);
        assert_eq!(result.insights.total_listings, 2);
        assert_eq!(result.evidence.listing_count, 2);
        assert!(!result.cluster.similar_homes.is_empty());
    }

    #[tokio::test]
    async fn test_skipped_turn_makes_no_search_call() {
        let (pipeline, search) = pipeline();
        let context = ConversationContext::new("c1")
            .with_turn(Turn::user("show me homes with a pool"))
            .with_turn(Turn::assistant("Here are some listings", true));

        let result = pipeline.execute("thanks, that's helpful", &context, None).await;

        assert!(!result.retrieved());
        assert!(result.is_empty());
        assert_eq!(search.calls.load(Ordering::SeqCst), 0);
    }
}
