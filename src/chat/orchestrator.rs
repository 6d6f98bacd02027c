//! Chat orchestrator - the pipeline entry point
//!
//! Coordinates one turn end to end:
//! - retrieval gate and cache lookup (keyed on the prior routing)
//! - retrieval, clustering and evidence assembly
//! - routing, parallel expert fan-out and merge
//! - ownership ledger and cache write
//!
//! `handle_turn` never fails; every soft dependency degrades locally.
//! `handle_rating` surfaces weight-store failures to the caller.

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::cache::{CacheBackend, CacheKey, InMemoryCacheBackend, ResponseCache};
use crate::clients::{
    CompletionService, HttpSearchClient, OllamaCompletionClient, SimilaritySearch,
};
use crate::config::Config;
use crate::errors::Result;
use crate::experts::{topic_signal, ExpertInvoker, ExpertRouter, PromptBuilder, ResponseMerger};
use crate::rag::RagPipeline;
use crate::telemetry::{TelemetryCollector, TelemetryEvent};
use crate::types::{BoundingBox, ConversationContext, MergedReply, RatingEvent};
use crate::weights::store::Clock;
use crate::weights::{
    ExpertWeightVector, FeedbackProcessor, FileWeightBackend, InMemoryWeightBackend,
    ReplyLedger, WeightBackend, WeightStore,
};

/// One chat message as handed over by the HTTP layer
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub context: ConversationContext,
    pub query: String,
    /// Map viewport, when the client sends one
    pub bounds: Option<BoundingBox>,
}

impl TurnRequest {
    pub fn new(context: ConversationContext, query: impl Into<String>) -> Self {
        Self {
            context,
            query: query.into(),
            bounds: None,
        }
    }

    pub fn with_bounds(mut self, bounds: BoundingBox) -> Self {
        self.bounds = Some(bounds);
        self
    }
}

/// Collaborators for an orchestrator; anything unset gets the default
pub struct OrchestratorBuilder {
    config: Config,
    search: Option<Arc<dyn SimilaritySearch>>,
    completion: Option<Arc<dyn CompletionService>>,
    weight_backend: Option<Arc<dyn WeightBackend>>,
    cache_backend: Option<Arc<dyn CacheBackend>>,
    clock: Option<Clock>,
    telemetry: Option<TelemetryCollector>,
}

impl OrchestratorBuilder {
    pub fn search(mut self, search: Arc<dyn SimilaritySearch>) -> Self {
        self.search = Some(search);
        self
    }

    pub fn completion(mut self, completion: Arc<dyn CompletionService>) -> Self {
        self.completion = Some(completion);
        self
    }

    pub fn weight_backend(mut self, backend: Arc<dyn WeightBackend>) -> Self {
        self.weight_backend = Some(backend);
        self
    }

    pub fn cache_backend(mut self, backend: Arc<dyn CacheBackend>) -> Self {
        self.cache_backend = Some(backend);
        self
    }

    pub fn clock(mut self, clock: Clock) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn telemetry(mut self, telemetry: TelemetryCollector) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Validate the configuration and wire every stage.
    ///
    /// Unset search/completion fall back to the HTTP clients; unset
    /// backends fall back to in-memory stores.
    pub fn build(self) -> Result<ChatOrchestrator> {
        let config = self.config;
        config.validate()?;

        let telemetry = self.telemetry.unwrap_or_default();

        let search: Arc<dyn SimilaritySearch> = match self.search {
            Some(search) => search,
            None => Arc::new(HttpSearchClient::with_config(&config.search)?),
        };
        let completion: Arc<dyn CompletionService> = match self.completion {
            Some(completion) => completion,
            None => Arc::new(OllamaCompletionClient::with_config(&config.completion)?),
        };
        let weight_backend = self
            .weight_backend
            .unwrap_or_else(|| Arc::new(InMemoryWeightBackend::new()));
        let cache_backend = self
            .cache_backend
            .unwrap_or_else(|| Arc::new(InMemoryCacheBackend::new()));

        let mut store = WeightStore::new(weight_backend, &config.weights, telemetry.clone());
        if let Some(clock) = self.clock {
            store = store.with_clock(clock);
        }
        let weights = Arc::new(store);
        let ledger = Arc::new(ReplyLedger::new());

        Ok(ChatOrchestrator {
            rag: RagPipeline::new(search, &config, telemetry.clone()),
            router: ExpertRouter::new(&config.router),
            prompts: PromptBuilder::new(),
            invoker: ExpertInvoker::new(completion, &config.invoker, telemetry.clone()),
            merger: ResponseMerger::new(&config.merger, telemetry.clone())?,
            cache: ResponseCache::new(cache_backend, &config.cache, telemetry.clone()),
            feedback: FeedbackProcessor::new(
                ledger.clone(),
                weights.clone(),
                config.weights.epsilon,
                telemetry.clone(),
            ),
            weights,
            ledger,
            telemetry,
            config,
        })
    }
}

pub struct ChatOrchestrator {
    rag: RagPipeline,
    router: ExpertRouter,
    prompts: PromptBuilder,
    invoker: ExpertInvoker,
    merger: ResponseMerger,
    cache: ResponseCache,
    feedback: FeedbackProcessor,
    weights: Arc<WeightStore>,
    ledger: Arc<ReplyLedger>,
    telemetry: TelemetryCollector,
    config: Config,
}

impl ChatOrchestrator {
    pub fn builder(config: Config) -> OrchestratorBuilder {
        OrchestratorBuilder {
            config,
            search: None,
            completion: None,
            weight_backend: None,
            cache_backend: None,
            clock: None,
            telemetry: None,
        }
    }

    /// Production wiring: HTTP clients and file-backed weights.
    /// Configuration errors are fatal here.
    pub async fn from_config(config: Config) -> Result<Self> {
        config.validate()?;
        let backend = FileWeightBackend::new(config.weights_dir()).await?;
        Self::builder(config).weight_backend(Arc::new(backend)).build()
    }

    /// Run one chat turn. Always returns a reply.
    pub async fn handle_turn(&self, request: &TurnRequest) -> MergedReply {
        let started = Instant::now();
        let context = &request.context;
        let conversation_id = context.conversation_id.as_str();
        let query = request.query.as_str();

        self.telemetry.record(TelemetryEvent::TurnStarted {
            conversation_id: conversation_id.to_string(),
            timestamp: Instant::now(),
        });

        // Step 1: Gate (pure) and the prior routing used for the cache key
        let decision = self.rag.gate(query, context, request.bounds);
        let weights = self.current_weights(conversation_id).await;
        let topic = topic_signal(query, context);
        let prior = self.router.prior(&weights, topic);
        let key = CacheKey::derive(query, decision.filter.as_ref(), &prior.selected, &weights);

        // Step 2: Cache
        if let Some(cached) = self.cache.get(&key).await {
            let reply = cached.reissue(conversation_id);
            self.ledger.record(&reply);
            self.finish(conversation_id, started, &reply);
            return reply;
        }

        // Step 3: Retrieval must finish before routing
        let rag = self.rag.run(query, context, decision).await;

        // Step 4: Route and fan out
        let routing = self.router.route(&weights, topic, &rag.stats);
        debug!(
            conversation_id,
            selected = ?routing.selected,
            covered = routing.covered_mass,
            topic = ?routing.topic,
            "experts routed"
        );
        let requests = self.prompts.build_all(&routing.selected, query, context, &rag);
        let outcome = self.invoker.invoke(requests).await;

        // Step 5: Merge, attribute, cache
        let reply = self
            .merger
            .merge(conversation_id, &outcome.slices, &routing.distribution, &rag);
        self.ledger.record(&reply);
        self.cache.put(key, &reply).await;

        self.finish(conversation_id, started, &reply);
        reply
    }

    /// Apply one rating to the weights of the reply's owning expert
    pub async fn handle_rating(&self, event: &RatingEvent) -> Result<ExpertWeightVector> {
        self.feedback.process(event).await
    }

    /// Weights as the router would see them now
    pub async fn weights(&self, conversation_id: &str) -> Result<ExpertWeightVector> {
        self.weights.get(conversation_id).await
    }

    /// One explicit decay step toward uniform
    pub async fn decay_weights(&self, conversation_id: &str) -> Result<ExpertWeightVector> {
        self.weights.decay(conversation_id).await
    }

    pub async fn reset_weights(&self, conversation_id: &str) -> Result<()> {
        self.weights.reset(conversation_id).await
    }

    pub fn telemetry(&self) -> &TelemetryCollector {
        &self.telemetry
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn ledger(&self) -> &ReplyLedger {
        &self.ledger
    }

    async fn current_weights(&self, conversation_id: &str) -> ExpertWeightVector {
        match self.weights.get(conversation_id).await {
            Ok(weights) => weights,
            Err(e) => {
                warn!(conversation_id, error = %e, "weight store unavailable; routing with uniform weights");
                ExpertWeightVector::uniform()
            }
        }
    }

    fn finish(&self, conversation_id: &str, started: Instant, reply: &MergedReply) {
        let duration_ms = started.elapsed().as_millis() as u64;
        info!(
            conversation_id,
            message_id = %reply.message_id,
            primary = ?reply.primary_role,
            degraded = reply.degraded,
            cached = reply.from_cache,
            duration_ms,
            "turn complete"
        );
        self.telemetry.record(TelemetryEvent::TurnCompleted {
            conversation_id: conversation_id.to_string(),
            duration_ms,
            degraded: reply.degraded,
            timestamp: Instant::now(),
        });
    }
}

impl std::fmt::Debug for ChatOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatOrchestrator")
            .field("top_k", &self.rag.top_k())
            .field("max_concurrency", &self.router.max_concurrency())
            .field("ledger_entries", &self.ledger.len())
            .finish()
    }
}
