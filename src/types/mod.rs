//! Type definitions module
//!
//! Core data model shared by the retrieval, routing and feedback stages.

pub mod conversation;
pub mod expert;
pub mod property;
pub mod rating;
pub mod reply;

// Re-export commonly used types
pub use conversation::{ConversationContext, Turn, TurnRole};
pub use expert::{ExpertRole, ExpertSlice, Unavailability};
pub use property::{BoundingBox, PropertyMetadata, RetrievalCandidate, RetrievalFilter};
pub use rating::{RatingEvent, RatingValue};
pub use reply::MergedReply;
