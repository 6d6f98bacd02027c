//! Per-conversation expert weights and the feedback path that adapts them

pub mod backend;
pub mod feedback;
pub mod ledger;
pub mod store;
pub mod vector;

pub use backend::{FileWeightBackend, InMemoryWeightBackend, WeightBackend, WeightRecord};
pub use feedback::FeedbackProcessor;
pub use ledger::{LedgerEntry, ReplyLedger};
pub use store::WeightStore;
pub use vector::ExpertWeightVector;
