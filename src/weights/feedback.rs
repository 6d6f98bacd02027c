// Rating events → one weight mutation on the owning expert
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::errors::{ChatError, Result};
use crate::telemetry::{TelemetryCollector, TelemetryEvent};
use crate::types::{ExpertRole, RatingEvent};
use crate::weights::ledger::ReplyLedger;
use crate::weights::store::WeightStore;
use crate::weights::vector::ExpertWeightVector;

/// Applies `±epsilon` to the role that owned the rated reply.
///
/// The owner comes from the ledger when this process recorded the reply,
/// else from the role the caller stored with it. A ledger entry for another
/// conversation always rejects the rating.
///
/// Ratings are cumulative: rating the same message twice shifts the weights
/// twice. Nothing is retried or queued here.
pub struct FeedbackProcessor {
    ledger: Arc<ReplyLedger>,
    store: Arc<WeightStore>,
    epsilon: f64,
    telemetry: TelemetryCollector,
}

impl FeedbackProcessor {
    pub fn new(
        ledger: Arc<ReplyLedger>,
        store: Arc<WeightStore>,
        epsilon: f64,
        telemetry: TelemetryCollector,
    ) -> Self {
        Self {
            ledger,
            store,
            epsilon,
            telemetry,
        }
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    pub async fn process(&self, event: &RatingEvent) -> Result<ExpertWeightVector> {
        let Some(role) = self.resolve_owner(event) else {
            let err = ChatError::UnknownMessage {
                message_id: event.message_id.to_string(),
                conversation_id: event.conversation_id.clone(),
            };
            self.record_failure(event, &err);
            return Err(err);
        };

        let delta = event.value.sign() * self.epsilon;
        match self.store.update(&event.conversation_id, role, delta).await {
            Ok(weights) => {
                info!(
                    conversation_id = %event.conversation_id,
                    %role,
                    delta,
                    "feedback applied"
                );
                self.telemetry.record(TelemetryEvent::FeedbackApplied {
                    conversation_id: event.conversation_id.clone(),
                    role,
                    delta,
                    timestamp: Instant::now(),
                });
                Ok(weights)
            }
            Err(e) => {
                self.record_failure(event, &e);
                Err(e)
            }
        }
    }

    fn resolve_owner(&self, event: &RatingEvent) -> Option<ExpertRole> {
        match self.ledger.lookup(&event.message_id) {
            Some(entry) if entry.conversation_id == event.conversation_id => Some(entry.primary_role),
            Some(_) => None,
            None => event.primary_role,
        }
    }

    fn record_failure(&self, event: &RatingEvent, error: &ChatError) {
        warn!(
            conversation_id = %event.conversation_id,
            message_id = %event.message_id,
            error = %error,
            "feedback rejected"
        );
        self.telemetry.record(TelemetryEvent::FeedbackFailed {
            conversation_id: event.conversation_id.clone(),
            reason: error.to_string(),
            timestamp: Instant::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WeightsConfig;
    use crate::types::{MergedReply, RatingValue};
    use crate::weights::backend::InMemoryWeightBackend;
    use uuid::Uuid;

    fn processor() -> (FeedbackProcessor, Arc<ReplyLedger>, TelemetryCollector) {
        let telemetry = TelemetryCollector::new();
        let ledger = Arc::new(ReplyLedger::new());
        let store = Arc::new(WeightStore::new(
            Arc::new(InMemoryWeightBackend::new()),
            &WeightsConfig::default(),
            telemetry.clone(),
        ));
        (
            FeedbackProcessor::new(ledger.clone(), store, 0.05, telemetry.clone()),
            ledger,
            telemetry,
        )
    }

    fn owned_reply(ledger: &ReplyLedger, role: ExpertRole) -> MergedReply {
        let mut reply = MergedReply::new("c1", "answer");
        reply.primary_role = Some(role);
        ledger.record(&reply);
        reply
    }

    #[tokio::test]
    async fn test_upvote_boosts_owner() {
        let (processor, ledger, telemetry) = processor();
        let reply = owned_reply(&ledger, ExpertRole::Finance);

        let weights = processor
            .process(&RatingEvent::new(reply.message_id, "c1", RatingValue::Up))
            .await
            .unwrap();

        assert!((weights.get(ExpertRole::Finance) - 0.25 / 1.05).abs() < 1e-12);
        assert!((weights.get(ExpertRole::Data) - 0.2 / 1.05).abs() < 1e-12);
        assert_eq!(telemetry.get_stats().feedback_applied, 1);
    }

    #[tokio::test]
    async fn test_repeat_ratings_are_cumulative() {
        let (processor, ledger, _) = processor();
        let reply = owned_reply(&ledger, ExpertRole::Data);
        let event = RatingEvent::new(reply.message_id, "c1", RatingValue::Down);

        let once = processor.process(&event).await.unwrap();
        let twice = processor.process(&event).await.unwrap();
        assert!(twice.get(ExpertRole::Data) < once.get(ExpertRole::Data));
    }

    #[tokio::test]
    async fn test_unknown_message_is_error() {
        let (processor, _, telemetry) = processor();
        let result = processor
            .process(&RatingEvent::new(Uuid::new_v4(), "c1", RatingValue::Up))
            .await;

        assert!(matches!(result, Err(ChatError::UnknownMessage { .. })));
        assert_eq!(telemetry.get_stats().feedback_failed, 1);
    }

    #[tokio::test]
    async fn test_caller_supplied_owner_when_ledger_has_no_record() {
        let (processor, _, _) = processor();
        let event = RatingEvent::new(Uuid::new_v4(), "c1", RatingValue::Up).with_owner(ExpertRole::Lifestyle);

        let weights = processor.process(&event).await.unwrap();
        assert!((weights.get(ExpertRole::Lifestyle) - 0.25 / 1.05).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_ledger_owner_wins_over_caller() {
        let (processor, ledger, _) = processor();
        let reply = owned_reply(&ledger, ExpertRole::Data);
        let event = RatingEvent::new(reply.message_id, "c1", RatingValue::Up).with_owner(ExpertRole::Finance);

        let weights = processor.process(&event).await.unwrap();
        assert!(weights.get(ExpertRole::Data) > weights.get(ExpertRole::Finance));
    }

    #[tokio::test]
    async fn test_foreign_message_rejected_even_with_owner() {
        let (processor, ledger, _) = processor();
        let reply = owned_reply(&ledger, ExpertRole::Data);
        let result = processor
            .process(&RatingEvent::new(reply.message_id, "c2", RatingValue::Up).with_owner(ExpertRole::Data))
            .await;
        assert!(matches!(result, Err(ChatError::UnknownMessage { .. })));
    }

    #[tokio::test]
    async fn test_wrong_conversation_is_error() {
        let (processor, ledger, _) = processor();
        let reply = owned_reply(&ledger, ExpertRole::Data);
        let result = processor
            .process(&RatingEvent::new(reply.message_id, "c2", RatingValue::Up))
            .await;
        assert!(result.is_err());
    }
}
