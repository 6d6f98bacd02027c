//! User feedback events

use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
use uuid::Uuid;

use crate::errors::ChatError;
use crate::types::ExpertRole;

/// Signed unit rating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum RatingValue {
    Up,
    Down,
}

impl RatingValue {
    pub fn sign(&self) -> f64 {
        match self {
            RatingValue::Up => 1.0,
            RatingValue::Down => -1.0,
        }
    }
}

impl TryFrom<i64> for RatingValue {
    type Error = ChatError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(RatingValue::Up),
            -1 => Ok(RatingValue::Down),
            other => Err(ChatError::InvalidRating(other)),
        }
    }
}

impl From<RatingValue> for i64 {
    fn from(value: RatingValue) -> Self {
        match value {
            RatingValue::Up => 1,
            RatingValue::Down => -1,
        }
    }
}

/// A rating on one assistant reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingEvent {
    pub message_id: Uuid,
    pub conversation_id: String,
    pub value: RatingValue,
    /// Owner as stored alongside the reply by the caller; used when this
    /// process has no record of the message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_role: Option<ExpertRole>,
}

impl RatingEvent {
    pub fn new(message_id: Uuid, conversation_id: impl Into<String>, value: RatingValue) -> Self {
        Self {
            message_id,
            conversation_id: conversation_id.into(),
            value,
            primary_role: None,
        }
    }

    pub fn with_owner(mut self, role: ExpertRole) -> Self {
        self.primary_role = Some(role);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rating_from_signed_unit() {
        assert_eq!(RatingValue::try_from(1).unwrap(), RatingValue::Up);
        assert_eq!(RatingValue::try_from(-1).unwrap(), RatingValue::Down);
        assert!(matches!(
            RatingValue::try_from(3),
            Err(ChatError::InvalidRating(3))
        ));
    }

    #[test]
    fn test_rating_event_json() {
        let id = Uuid::new_v4();
        let json = format!(
            r#"{{"message_id":"{}","conversation_id":"c1","value":-1}}"#,
            id
        );
        let event: RatingEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event.value, RatingValue::Down);
        assert_eq!(event.message_id, id);
        assert_eq!(event.primary_role, None);

        let owned = format!(
            r#"{{"message_id":"{}","conversation_id":"c1","value":1,"primary_role":"finance"}}"#,
            id
        );
        let event: RatingEvent = serde_json::from_str(&owned).unwrap();
        assert_eq!(event.primary_role, Some(ExpertRole::Finance));

        let bad = format!(r#"{{"message_id":"{}","conversation_id":"c1","value":0}}"#, id);
        assert!(serde_json::from_str::<RatingEvent>(&bad).is_err());
    }
}
