pub mod scorer;

pub use scorer::{RankedCandidate, ReRankConfig, ReRanker};
