//! External collaborator clients
//!
//! Both services are consumed as black boxes; timeouts are enforced by the
//! pipeline stage that calls them.

pub mod completion;
pub mod search;

pub use completion::{CompletionRequest, CompletionService, OllamaCompletionClient};
pub use search::{HttpSearchClient, SearchRequest, SimilaritySearch};
