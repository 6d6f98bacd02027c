//! EstateWise - real-estate chat orchestration
//!
//! Answers natural-language real-estate questions by combining retrieval over
//! listings, a k-means similar-homes advisor and a feedback-weighted panel of
//! expert prompts whose answers are merged into one reply.
//!
//! # Architecture
//!
//! - **rag**: retrieval gate, search + re-rank, clustering, market insights
//! - **experts**: router, prompts, parallel invoker, merger, output policy
//! - **cache**: deterministic response cache with TTL
//! - **weights**: per-conversation expert weights, decay, feedback
//! - **chat**: `ChatOrchestrator`, the single entry point per turn and rating

pub mod cache;
pub mod chat;
pub mod cli;
pub mod clients;
pub mod config;
pub mod errors;
pub mod experts;
pub mod rag;
pub mod telemetry;
pub mod types;
pub mod weights;

// Re-export commonly used types
pub use chat::{ChatOrchestrator, TurnRequest};
pub use config::Config;
pub use errors::{ChatError, Result};
pub use types::{ConversationContext, ExpertRole, MergedReply, RatingEvent, RatingValue, Turn};
