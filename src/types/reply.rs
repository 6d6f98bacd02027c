//! Terminal artifact of one pipeline run

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::expert::{ExpertRole, ExpertSlice};

/// Final reply returned to the HTTP layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedReply {
    pub message_id: Uuid,
    pub conversation_id: String,
    pub text: String,
    /// Expert whose content became the primary answer body
    pub primary_role: Option<ExpertRole>,
    /// Lower-scoring slices surfaced as auxiliary panes
    #[serde(default)]
    pub auxiliary: Vec<ExpertSlice>,
    #[serde(default)]
    pub similar_homes: Vec<String>,
    #[serde(default)]
    pub unavailable_experts: Vec<ExpertRole>,
    pub truncated: bool,
    pub redacted: bool,
    pub degraded: bool,
    /// Whether the retrieval stage ran for this reply
    #[serde(default)]
    pub retrieved: bool,
    #[serde(default)]
    pub from_cache: bool,
}

impl MergedReply {
    pub fn new(conversation_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            conversation_id: conversation_id.into(),
            text: text.into(),
            primary_role: None,
            auxiliary: Vec::new(),
            similar_homes: Vec::new(),
            unavailable_experts: Vec::new(),
            truncated: false,
            redacted: false,
            degraded: false,
            retrieved: false,
            from_cache: false,
        }
    }

    /// Fixed fallback reply for turns with nothing usable
    pub fn fallback(conversation_id: impl Into<String>, text: impl Into<String>) -> Self {
        let mut reply = Self::new(conversation_id, text);
        reply.degraded = true;
        reply
    }

    /// Copy of a cached reply re-issued under a fresh message id
    pub fn reissue(&self, conversation_id: &str) -> Self {
        let mut reply = self.clone();
        reply.message_id = Uuid::new_v4();
        reply.conversation_id = conversation_id.to_string();
        reply.from_cache = true;
        reply
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_is_degraded() {
        let reply = MergedReply::fallback("c1", "sorry");
        assert!(reply.degraded);
        assert!(reply.primary_role.is_none());
        assert!(!reply.truncated && !reply.redacted);
    }

    #[test]
    fn test_reissue_changes_identity_only() {
        let mut original = MergedReply::new("c1", "answer");
        original.primary_role = Some(ExpertRole::Finance);
        let copy = original.reissue("c2");

        assert_ne!(copy.message_id, original.message_id);
        assert_eq!(copy.conversation_id, "c2");
        assert_eq!(copy.text, original.text);
        assert_eq!(copy.primary_role, Some(ExpertRole::Finance));
        assert!(copy.from_cache);
    }
}
