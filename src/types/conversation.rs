//! Conversation snapshots handed to the pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Default number of turns kept in a context
pub const DEFAULT_MAX_TURNS: usize = 20;

/// Author of a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Assistant,
}

/// A single conversation turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Assistant turns record whether retrieval ran for them
    #[serde(default)]
    pub retrieved: bool,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
            timestamp: Utc::now(),
            retrieved: false,
        }
    }

    pub fn assistant(content: impl Into<String>, retrieved: bool) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
            retrieved,
        }
    }
}

/// Read-only snapshot of recent conversation state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationContext {
    pub conversation_id: String,
    turns: VecDeque<Turn>,
    max_turns: usize,
    /// Candidate ids surfaced as similar homes on the previous turn
    #[serde(default)]
    pub last_recommended: Vec<String>,
}

impl ConversationContext {
    pub fn new(conversation_id: impl Into<String>) -> Self {
        Self::with_capacity(conversation_id, DEFAULT_MAX_TURNS)
    }

    pub fn with_capacity(conversation_id: impl Into<String>, max_turns: usize) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            turns: VecDeque::with_capacity(max_turns.max(1)),
            max_turns: max_turns.max(1),
            last_recommended: Vec::new(),
        }
    }

    /// Append a turn, dropping the oldest beyond capacity
    pub fn push_turn(&mut self, turn: Turn) {
        if self.turns.len() >= self.max_turns {
            self.turns.pop_front();
        }
        self.turns.push_back(turn);
    }

    /// Builder form of `push_turn`
    pub fn with_turn(mut self, turn: Turn) -> Self {
        self.push_turn(turn);
        self
    }

    pub fn turns(&self) -> impl DoubleEndedIterator<Item = &Turn> + ExactSizeIterator {
        self.turns.iter()
    }

    /// Last `n` turns, oldest first
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &Turn> {
        let skip = self.turns.len().saturating_sub(n);
        self.turns.iter().skip(skip)
    }

    pub fn last_user_turn(&self) -> Option<&Turn> {
        self.turns.iter().rev().find(|t| t.role == TurnRole::User)
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn max_turns(&self) -> usize {
        self.max_turns
    }
}
