// Reply ownership: which expert's content became each reply's primary body
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

use crate::types::{ExpertRole, MergedReply};

/// Default number of replies remembered
pub const DEFAULT_LEDGER_CAPACITY: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub conversation_id: String,
    pub primary_role: ExpertRole,
}

#[derive(Default)]
struct LedgerInner {
    entries: HashMap<Uuid, LedgerEntry>,
    order: VecDeque<Uuid>,
}

/// Bounded message_id → owning role map; oldest entries are evicted first
pub struct ReplyLedger {
    inner: Mutex<LedgerInner>,
    capacity: usize,
}

impl ReplyLedger {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_LEDGER_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(LedgerInner::default()),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LedgerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a reply's owner. Replies without a primary role (fallbacks)
    /// are not attributable and are skipped.
    pub fn record(&self, reply: &MergedReply) -> bool {
        let Some(role) = reply.primary_role else {
            return false;
        };

        let mut inner = self.lock();
        let entry = LedgerEntry {
            conversation_id: reply.conversation_id.clone(),
            primary_role: role,
        };
        if inner.entries.insert(reply.message_id, entry).is_none() {
            inner.order.push_back(reply.message_id);
        }
        while inner.order.len() > self.capacity {
            if let Some(oldest) = inner.order.pop_front() {
                inner.entries.remove(&oldest);
            }
        }
        true
    }

    pub fn lookup(&self, message_id: &Uuid) -> Option<LedgerEntry> {
        self.lock().entries.get(message_id).cloned()
    }

    /// Owning role, only if the message belongs to `conversation_id`
    pub fn owner(&self, message_id: &Uuid, conversation_id: &str) -> Option<ExpertRole> {
        self.lookup(message_id)
            .filter(|entry| entry.conversation_id == conversation_id)
            .map(|entry| entry.primary_role)
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ReplyLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(conversation: &str, role: Option<ExpertRole>) -> MergedReply {
        let mut reply = MergedReply::new(conversation, "text");
        reply.primary_role = role;
        reply
    }

    #[test]
    fn test_record_and_owner() {
        let ledger = ReplyLedger::new();
        let r = reply("c1", Some(ExpertRole::Finance));
        assert!(ledger.record(&r));

        assert_eq!(ledger.owner(&r.message_id, "c1"), Some(ExpertRole::Finance));
        assert_eq!(ledger.owner(&r.message_id, "other"), None);
        assert_eq!(ledger.owner(&Uuid::new_v4(), "c1"), None);
    }

    #[test]
    fn test_fallback_not_recorded() {
        let ledger = ReplyLedger::new();
        assert!(!ledger.record(&MergedReply::fallback("c1", "sorry")));
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_oldest_evicted() {
        let ledger = ReplyLedger::with_capacity(2);
        let first = reply("c1", Some(ExpertRole::Data));
        let second = reply("c1", Some(ExpertRole::Data));
        let third = reply("c1", Some(ExpertRole::Data));
        ledger.record(&first);
        ledger.record(&second);
        ledger.record(&third);

        assert_eq!(ledger.len(), 2);
        assert!(ledger.lookup(&first.message_id).is_none());
        assert!(ledger.lookup(&third.message_id).is_some());
    }
}
