//! Telemetry system for the chat pipeline
//!
//! Collects typed pipeline events and keeps the counters soft failures are
//! reported through. Log lines go through `tracing`; this module only counts.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use crate::types::ExpertRole;

/// Telemetry event types
#[derive(Debug, Clone)]
pub enum TelemetryEvent {
    // Turn events
    TurnStarted {
        conversation_id: String,
        timestamp: Instant,
    },
    TurnCompleted {
        conversation_id: String,
        duration_ms: u64,
        degraded: bool,
        timestamp: Instant,
    },

    // Cache events
    CacheHit {
        timestamp: Instant,
    },
    CacheMiss {
        timestamp: Instant,
    },
    CacheUnavailable {
        reason: String,
        timestamp: Instant,
    },

    // Retrieval events
    RetrievalSkipped {
        timestamp: Instant,
    },
    RetrievalCompleted {
        candidates: usize,
        duration_ms: u64,
        timestamp: Instant,
    },
    RetrievalFailed {
        reason: String,
        timestamp: Instant,
    },

    // Expert events
    ExpertDispatch {
        experts: usize,
        timestamp: Instant,
    },
    ExpertCompleted {
        role: ExpertRole,
        duration_ms: u64,
        timestamp: Instant,
    },
    ExpertTimedOut {
        role: ExpertRole,
        timestamp: Instant,
    },
    ExpertFailed {
        role: ExpertRole,
        reason: String,
        timestamp: Instant,
    },
    ExpertAbandoned {
        role: ExpertRole,
        timestamp: Instant,
    },

    // Output policy events
    ReplyTruncated {
        timestamp: Instant,
    },
    ReplyRedacted {
        matches: usize,
        timestamp: Instant,
    },

    // Weight events
    FeedbackApplied {
        conversation_id: String,
        role: ExpertRole,
        delta: f64,
        timestamp: Instant,
    },
    FeedbackFailed {
        conversation_id: String,
        reason: String,
        timestamp: Instant,
    },
    WeightsDecayed {
        conversation_id: String,
        steps: u32,
        timestamp: Instant,
    },
}

/// Telemetry statistics
#[derive(Debug, Clone, Default)]
pub struct TelemetryStats {
    pub turns_started: usize,
    pub turns_completed: usize,
    pub degraded_turns: usize,
    pub cache_hits: usize,
    pub cache_misses: usize,
    pub cache_errors: usize,
    pub retrievals: usize,
    pub retrievals_skipped: usize,
    pub retrieval_failures: usize,
    pub experts_invoked: usize,
    pub experts_succeeded: usize,
    pub expert_timeouts: usize,
    pub expert_failures: usize,
    pub experts_abandoned: usize,
    pub truncations: usize,
    pub redactions: usize,
    pub feedback_applied: usize,
    pub feedback_failed: usize,
    pub decays: usize,
}

/// Maximum events retained for inspection
const MAX_EVENTS: usize = 1_000;

/// Telemetry collector
#[derive(Clone)]
pub struct TelemetryCollector {
    events: Arc<Mutex<Vec<TelemetryEvent>>>,
    stats: Arc<Mutex<TelemetryStats>>,
    start_time: Instant,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl TelemetryCollector {
    /// Create a new telemetry collector
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
            stats: Arc::new(Mutex::new(TelemetryStats::default())),
            start_time: Instant::now(),
        }
    }

    /// Record an event
    pub fn record(&self, event: TelemetryEvent) {
        {
            let mut stats = lock(&self.stats);
            match &event {
                TelemetryEvent::TurnStarted { .. } => stats.turns_started += 1,
                TelemetryEvent::TurnCompleted { degraded, .. } => {
                    stats.turns_completed += 1;
                    if *degraded {
                        stats.degraded_turns += 1;
                    }
                }
                TelemetryEvent::CacheHit { .. } => stats.cache_hits += 1,
                TelemetryEvent::CacheMiss { .. } => stats.cache_misses += 1,
                TelemetryEvent::CacheUnavailable { .. } => stats.cache_errors += 1,
                TelemetryEvent::RetrievalSkipped { .. } => stats.retrievals_skipped += 1,
                TelemetryEvent::RetrievalCompleted { .. } => stats.retrievals += 1,
                TelemetryEvent::RetrievalFailed { .. } => {
                    stats.retrievals += 1;
                    stats.retrieval_failures += 1;
                }
                TelemetryEvent::ExpertDispatch { experts, .. } => {
                    stats.experts_invoked += experts;
                }
                TelemetryEvent::ExpertCompleted { .. } => stats.experts_succeeded += 1,
                TelemetryEvent::ExpertTimedOut { .. } => stats.expert_timeouts += 1,
                TelemetryEvent::ExpertFailed { .. } => stats.expert_failures += 1,
                TelemetryEvent::ExpertAbandoned { .. } => stats.experts_abandoned += 1,
                TelemetryEvent::ReplyTruncated { .. } => stats.truncations += 1,
                TelemetryEvent::ReplyRedacted { .. } => stats.redactions += 1,
                TelemetryEvent::FeedbackApplied { .. } => stats.feedback_applied += 1,
                TelemetryEvent::FeedbackFailed { .. } => stats.feedback_failed += 1,
                TelemetryEvent::WeightsDecayed { steps, .. } => stats.decays += *steps as usize,
            }
        }

        let mut events = lock(&self.events);
        if events.len() >= MAX_EVENTS {
            events.remove(0);
        }
        events.push(event);
    }

    /// Get current statistics
    pub fn get_stats(&self) -> TelemetryStats {
        lock(&self.stats).clone()
    }

    /// Get elapsed time since start
    pub fn elapsed(&self) -> std::time::Duration {
        self.start_time.elapsed()
    }

    /// Get event count
    pub fn event_count(&self) -> usize {
        lock(&self.events).len()
    }

    /// Get recent events (last n)
    pub fn recent_events(&self, n: usize) -> Vec<TelemetryEvent> {
        let events = lock(&self.events);
        let start = events.len().saturating_sub(n);
        events[start..].to_vec()
    }

    /// Share of dispatched experts that delivered a slice
    pub fn expert_success_rate(&self) -> f64 {
        let stats = lock(&self.stats);
        if stats.experts_invoked == 0 {
            1.0
        } else {
            stats.experts_succeeded as f64 / stats.experts_invoked as f64
        }
    }

    /// Share of cache lookups that hit
    pub fn cache_hit_rate(&self) -> f64 {
        let stats = lock(&self.stats);
        let total = stats.cache_hits + stats.cache_misses + stats.cache_errors;
        if total == 0 {
            0.0
        } else {
            stats.cache_hits as f64 / total as f64
        }
    }

    /// Multi-line human readable summary
    pub fn summary(&self) -> String {
        let stats = self.get_stats();
        format!(
            "Duration:          {:?}\n\
             Turns:             {} ({} degraded)\n\
             Cache hit rate:    {:.1}%\n\
             Retrievals:        {} ({} failed, {} skipped)\n\
             Experts invoked:   {} ({:.1}% delivered)\n\
             Timeouts/aborts:   {} / {}\n\
             Feedback applied:  {} ({} failed)\n",
            self.elapsed(),
            stats.turns_completed,
            stats.degraded_turns,
            self.cache_hit_rate() * 100.0,
            stats.retrievals,
            stats.retrieval_failures,
            stats.retrievals_skipped,
            stats.experts_invoked,
            self.expert_success_rate() * 100.0,
            stats.expert_timeouts,
            stats.experts_abandoned,
            stats.feedback_applied,
            stats.feedback_failed,
        )
    }
}

impl Default for TelemetryCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collector_creation() {
        let collector = TelemetryCollector::new();
        assert_eq!(collector.event_count(), 0);
        assert_eq!(collector.get_stats().turns_started, 0);
    }

    #[test]
    fn test_record_expert_events() {
        let collector = TelemetryCollector::new();
        collector.record(TelemetryEvent::ExpertDispatch {
            experts: 3,
            timestamp: Instant::now(),
        });
        collector.record(TelemetryEvent::ExpertCompleted {
            role: ExpertRole::Data,
            duration_ms: 40,
            timestamp: Instant::now(),
        });
        collector.record(TelemetryEvent::ExpertTimedOut {
            role: ExpertRole::Finance,
            timestamp: Instant::now(),
        });
        collector.record(TelemetryEvent::ExpertAbandoned {
            role: ExpertRole::Cluster,
            timestamp: Instant::now(),
        });

        let stats = collector.get_stats();
        assert_eq!(stats.experts_invoked, 3);
        assert_eq!(stats.experts_succeeded, 1);
        assert_eq!(stats.expert_timeouts, 1);
        assert_eq!(stats.experts_abandoned, 1);
        assert!((collector.expert_success_rate() - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_degraded_turn_counter() {
        let collector = TelemetryCollector::new();
        collector.record(TelemetryEvent::TurnCompleted {
            conversation_id: "c1".to_string(),
            duration_ms: 10,
            degraded: true,
            timestamp: Instant::now(),
        });
        let stats = collector.get_stats();
        assert_eq!(stats.turns_completed, 1);
        assert_eq!(stats.degraded_turns, 1);
    }

    #[test]
    fn test_cache_hit_rate() {
        let collector = TelemetryCollector::new();
        assert_eq!(collector.cache_hit_rate(), 0.0);
        collector.record(TelemetryEvent::CacheHit { timestamp: Instant::now() });
        collector.record(TelemetryEvent::CacheMiss { timestamp: Instant::now() });
        assert!((collector.cache_hit_rate() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_recent_events_bounded() {
        let collector = TelemetryCollector::new();
        for _ in 0..(MAX_EVENTS + 10) {
            collector.record(TelemetryEvent::RetrievalSkipped { timestamp: Instant::now() });
        }
        assert_eq!(collector.event_count(), MAX_EVENTS);
        assert_eq!(collector.recent_events(3).len(), 3);
        assert_eq!(collector.get_stats().retrievals_skipped, MAX_EVENTS + 10);
    }
}
