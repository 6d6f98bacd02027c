//! Response cache: deterministic keys and TTL-bounded storage

pub mod key;
pub mod store;

pub use key::CacheKey;
pub use store::{CacheBackend, InMemoryCacheBackend, ResponseCache};
