//! Produced interface: one call per chat message, one per rating

pub mod orchestrator;

pub use orchestrator::{ChatOrchestrator, OrchestratorBuilder, TurnRequest};
