pub mod engine;

pub use engine::{normalized_entropy, RetrievalEngine, RetrievalOutcome, RetrievalStats};
