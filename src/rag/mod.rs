// Retrieval stage of the chat pipeline
//
// Components:
// - Gate: decide whether this turn needs evidence at all
// - Retrieval: one similarity search plus score fusion
// - Cluster: similar-home hints from k-means over the candidates
// - Insights: market summary for the data and finance experts
// - Context: evidence text for expert prompts
// - Pipeline: the stage end to end

pub mod cluster;
pub mod context;
pub mod gate;
pub mod insights;
pub mod pipeline;
pub mod reranking;
pub mod retrieval;
pub mod tokens;

// Re-export key types
pub use cluster::{ClusterAdvice, ClusterAdvisor, ClusterAssignment};
pub use context::{AssembledContext, ContextBuilder};
pub use gate::{GateDecision, GateReason, RetrievalGate};
pub use insights::MarketInsights;
pub use pipeline::{RagPipeline, RagResult};
pub use reranking::{RankedCandidate, ReRanker};
pub use retrieval::{RetrievalEngine, RetrievalStats};
