//! In-process fakes for the search and completion collaborators

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use estatewise::clients::{CompletionRequest, CompletionService, SearchRequest, SimilaritySearch};
use estatewise::types::{ExpertRole, PropertyMetadata, RetrievalCandidate};
use estatewise::{ChatError, ChatOrchestrator, Config, Result};

pub fn listing(id: &str, score: f64, price: f64, beds: f64) -> RetrievalCandidate {
    RetrievalCandidate::new(
        id,
        score,
        PropertyMetadata {
            price: Some(price),
            bedrooms: Some(beds),
            bathrooms: Some(2.0),
            living_area: Some(1_800.0),
            city: Some("Austin".to_string()),
            state: Some("TX".to_string()),
            zipcode: Some("78704".to_string()),
            description: "Updated kitchen and a shaded backyard".to_string(),
            ..Default::default()
        },
    )
}

pub fn austin_listings() -> Vec<RetrievalCandidate> {
    vec![
        listing("L1", 0.91, 410_000.0, 3.0),
        listing("L2", 0.88, 455_000.0, 3.0),
        listing("L3", 0.84, 620_000.0, 4.0),
        listing("L4", 0.80, 389_000.0, 2.0),
        listing("L5", 0.77, 1_150_000.0, 5.0),
    ]
}

/// Returns a fixed result set and counts calls
pub struct StaticSearch {
    results: Vec<RetrievalCandidate>,
    pub calls: AtomicUsize,
}

impl StaticSearch {
    pub fn new(results: Vec<RetrievalCandidate>) -> Arc<Self> {
        Arc::new(Self {
            results,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl SimilaritySearch for StaticSearch {
    async fn search(&self, request: &SearchRequest) -> Result<Vec<RetrievalCandidate>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.results.iter().take(request.top_k).cloned().collect())
    }
}

pub struct FailingSearch;

#[async_trait]
impl SimilaritySearch for FailingSearch {
    async fn search(&self, _request: &SearchRequest) -> Result<Vec<RetrievalCandidate>> {
        Err(ChatError::SearchError("index offline".to_string()))
    }
}

pub struct SlowSearch(pub Duration);

#[async_trait]
impl SimilaritySearch for SlowSearch {
    async fn search(&self, _request: &SearchRequest) -> Result<Vec<RetrievalCandidate>> {
        tokio::time::sleep(self.0).await;
        Ok(austin_listings())
    }
}

/// Per-role latency, failures and a fixed answer body
pub struct ScriptedCompletion {
    answer: String,
    delays: HashMap<ExpertRole, Duration>,
    default_delay: Duration,
    failing: bool,
    pub calls: AtomicUsize,
}

impl ScriptedCompletion {
    pub fn answering(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            delays: HashMap::new(),
            default_delay: Duration::ZERO,
            failing: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::answering("")
        }
    }

    /// Every role sleeps `delay` except the listed fast ones
    pub fn slow_except(mut self, delay: Duration, fast: &[ExpertRole]) -> Self {
        self.default_delay = delay;
        for role in fast {
            self.delays.insert(*role, Duration::ZERO);
        }
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionService for ScriptedCompletion {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = self
            .delays
            .get(&request.role)
            .copied()
            .unwrap_or(self.default_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.failing {
            return Err(ChatError::CompletionError("model not loaded".to_string()));
        }
        Ok(format!(
            "RATIONALE: {} perspective.\nANSWER: {}",
            request.role, self.answer
        ))
    }
}

pub fn orchestrator(
    config: Config,
    search: Arc<dyn SimilaritySearch>,
    completion: Arc<dyn CompletionService>,
) -> ChatOrchestrator {
    ChatOrchestrator::builder(config)
        .search(search)
        .completion(completion)
        .build()
        .expect("test configuration is valid")
}
