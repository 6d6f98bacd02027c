//! Keyed per-conversation weight store
//!
//! Every mutation is one read-modify-renormalize-write step under a
//! per-conversation lock. The durable write happens first; the in-memory copy
//! is replaced only once it succeeds, so a failed write leaves the previous
//! state visible and the error goes back to the caller.
//!
//! Decay toward uniform is lazy: on each access, one step is applied for
//! every full `decay_interval` elapsed since the record's `last_decay`.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::config::WeightsConfig;
use crate::errors::Result;
use crate::telemetry::{TelemetryCollector, TelemetryEvent};
use crate::types::ExpertRole;
use crate::weights::backend::{WeightBackend, WeightRecord};
use crate::weights::vector::ExpertWeightVector;

/// Source of "now" for lazy decay
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

type Slot = Arc<Mutex<Option<WeightRecord>>>;

pub struct WeightStore {
    backend: Arc<dyn WeightBackend>,
    slots: RwLock<HashMap<String, Slot>>,
    decay_rate: f64,
    decay_interval: Option<Duration>,
    clock: Clock,
    telemetry: TelemetryCollector,
}

impl WeightStore {
    pub fn new(
        backend: Arc<dyn WeightBackend>,
        config: &WeightsConfig,
        telemetry: TelemetryCollector,
    ) -> Self {
        Self {
            backend,
            slots: RwLock::new(HashMap::new()),
            decay_rate: config.decay_rate,
            decay_interval: config.decay_interval(),
            clock: Arc::new(Utc::now),
            telemetry,
        }
    }

    /// Replace the wall clock
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    async fn slot(&self, conversation_id: &str) -> Slot {
        if let Some(slot) = self.slots.read().await.get(conversation_id) {
            return slot.clone();
        }
        self.slots
            .write()
            .await
            .entry(conversation_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone()
    }

    /// Hot copy, else durable copy, else uniform
    async fn current(&self, conversation_id: &str, hot: &Option<WeightRecord>) -> Result<WeightRecord> {
        if let Some(record) = hot {
            return Ok(record.clone());
        }
        let loaded = self.backend.load(conversation_id).await?;
        Ok(loaded.unwrap_or_else(|| WeightRecord::uniform(conversation_id, (self.clock)())))
    }

    /// Number of whole decay intervals elapsed since `last_decay`
    fn pending_steps(&self, record: &WeightRecord, now: DateTime<Utc>) -> u32 {
        let Some(interval) = self.decay_interval else {
            return 0;
        };
        let elapsed = match (now - record.last_decay).to_std() {
            Ok(elapsed) => elapsed,
            Err(_) => return 0,
        };
        (elapsed.as_nanos() / interval.as_nanos().max(1)).min(u32::MAX as u128) as u32
    }

    /// Apply pending lazy decay in place; returns the steps applied
    fn apply_pending_decay(&self, record: &mut WeightRecord, now: DateTime<Utc>) -> u32 {
        let steps = self.pending_steps(record, now);
        if steps > 0 {
            record.weights.decay(self.decay_rate, steps);
            if let Some(interval) = self.decay_interval {
                let advance = chrono::Duration::from_std(interval * steps)
                    .unwrap_or_else(|_| now - record.last_decay);
                record.last_decay += advance;
            }
        }
        steps
    }

    async fn commit(
        &self,
        hot: &mut Option<WeightRecord>,
        record: WeightRecord,
        decay_steps: u32,
    ) -> Result<()> {
        self.backend.save(&record).await?;

        if decay_steps > 0 {
            debug!(
                conversation_id = %record.conversation_id,
                steps = decay_steps,
                "applied lazy weight decay"
            );
            self.telemetry.record(TelemetryEvent::WeightsDecayed {
                conversation_id: record.conversation_id.clone(),
                steps: decay_steps,
                timestamp: Instant::now(),
            });
        }

        *hot = Some(record);
        Ok(())
    }

    /// Current weights, uniform if the conversation has none yet
    pub async fn get(&self, conversation_id: &str) -> Result<ExpertWeightVector> {
        let slot = self.slot(conversation_id).await;
        let mut hot = slot.lock().await;

        let mut record = self.current(conversation_id, &hot).await?;
        let steps = self.apply_pending_decay(&mut record, (self.clock)());
        if steps == 0 {
            if hot.is_none() {
                *hot = Some(record.clone());
            }
            return Ok(record.weights);
        }

        let weights = record.weights;
        if let Err(e) = self.commit(&mut hot, record, steps).await {
            // Reads still see the decayed view; the next access retries the write
            warn!(conversation_id, error = %e, "failed to persist lazy decay");
        }
        Ok(weights)
    }

    /// Add `delta` to `role`, clamp, renormalize and persist atomically
    pub async fn update(
        &self,
        conversation_id: &str,
        role: ExpertRole,
        delta: f64,
    ) -> Result<ExpertWeightVector> {
        let slot = self.slot(conversation_id).await;
        let mut hot = slot.lock().await;

        let mut record = self.current(conversation_id, &hot).await?;
        let steps = self.apply_pending_decay(&mut record, (self.clock)());
        record.weights.apply_delta(role, delta);
        record.updates += 1;

        let weights = record.weights;
        self.commit(&mut hot, record, steps).await?;
        Ok(weights)
    }

    /// One explicit decay step toward uniform, persisted
    pub async fn decay(&self, conversation_id: &str) -> Result<ExpertWeightVector> {
        let slot = self.slot(conversation_id).await;
        let mut hot = slot.lock().await;

        let now = (self.clock)();
        let mut record = self.current(conversation_id, &hot).await?;
        let pending = self.apply_pending_decay(&mut record, now);
        record.weights.decay(self.decay_rate, 1);
        record.last_decay = now;

        let weights = record.weights;
        self.commit(&mut hot, record, pending + 1).await?;
        Ok(weights)
    }

    /// Drop a conversation's weights everywhere
    pub async fn reset(&self, conversation_id: &str) -> Result<()> {
        let slot = self.slot(conversation_id).await;
        let mut hot = slot.lock().await;
        self.backend.delete(conversation_id).await?;
        *hot = None;
        Ok(())
    }

    pub fn decay_rate(&self) -> f64 {
        self.decay_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ChatError;
    use crate::weights::backend::InMemoryWeightBackend;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    fn config(interval_secs: u64) -> WeightsConfig {
        WeightsConfig {
            decay_interval_secs: interval_secs,
            ..Default::default()
        }
    }

    fn store(interval_secs: u64) -> WeightStore {
        WeightStore::new(
            Arc::new(InMemoryWeightBackend::new()),
            &config(interval_secs),
            TelemetryCollector::new(),
        )
    }

    struct ReadOnlyBackend;

    #[async_trait]
    impl WeightBackend for ReadOnlyBackend {
        async fn load(&self, _id: &str) -> Result<Option<WeightRecord>> {
            Ok(None)
        }
        async fn save(&self, _record: &WeightRecord) -> Result<()> {
            Err(ChatError::WeightStoreError("disk full".to_string()))
        }
        async fn delete(&self, _id: &str) -> Result<()> {
            Ok(())
        }
        async fn list(&self) -> Result<Vec<String>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_unknown_conversation_is_uniform() {
        let weights = store(0).get("new").await.unwrap();
        assert!(weights.is_uniform());
    }

    #[tokio::test]
    async fn test_update_persists_and_renormalizes() {
        let backend = Arc::new(InMemoryWeightBackend::new());
        let store = WeightStore::new(backend.clone(), &config(0), TelemetryCollector::new());

        let weights = store.update("c1", ExpertRole::Finance, 0.05).await.unwrap();
        assert!((weights.get(ExpertRole::Finance) - 0.25 / 1.05).abs() < 1e-12);
        assert!((weights.sum() - 1.0).abs() < 1e-9);

        let durable = backend.load("c1").await.unwrap().unwrap();
        assert_eq!(durable.updates, 1);
        assert_eq!(store.get("c1").await.unwrap(), weights);
    }

    #[tokio::test]
    async fn test_failed_write_keeps_previous_state() {
        let store = WeightStore::new(Arc::new(ReadOnlyBackend), &config(0), TelemetryCollector::new());

        let result = store.update("c1", ExpertRole::Data, 0.05).await;
        assert!(matches!(result, Err(ChatError::WeightStoreError(_))));
        assert!(store.get("c1").await.unwrap().is_uniform());
    }

    #[tokio::test]
    async fn test_concurrent_updates_are_not_lost() {
        let store = Arc::new(store(0));
        let mut handles = Vec::new();
        for _ in 0..20 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.update("c1", ExpertRole::Finance, 0.05).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let mut expected = ExpertWeightVector::uniform();
        for _ in 0..20 {
            expected.apply_delta(ExpertRole::Finance, 0.05);
        }
        let actual = store.get("c1").await.unwrap();
        assert!((actual.get(ExpertRole::Finance) - expected.get(ExpertRole::Finance)).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_lazy_decay_on_access() {
        let start = Utc::now();
        let now = Arc::new(StdMutex::new(start));
        let clock_now = now.clone();
        let telemetry = TelemetryCollector::new();
        let store = WeightStore::new(Arc::new(InMemoryWeightBackend::new()), &config(60), telemetry.clone())
            .with_clock(Arc::new(move || *clock_now.lock().unwrap()));

        let boosted = store.update("c1", ExpertRole::Finance, 0.5).await.unwrap();
        let distance = |w: &ExpertWeightVector| (w.get(ExpertRole::Finance) - 0.2).abs();

        *now.lock().unwrap() = start + chrono::Duration::seconds(59);
        assert_eq!(store.get("c1").await.unwrap(), boosted);

        *now.lock().unwrap() = start + chrono::Duration::seconds(125);
        let decayed = store.get("c1").await.unwrap();
        assert!((distance(&decayed) - distance(&boosted) * 0.9 * 0.9).abs() < 1e-9);
        assert_eq!(telemetry.get_stats().decays, 2);

        // Same window again: nothing further to apply
        assert_eq!(store.get("c1").await.unwrap(), decayed);
    }

    #[tokio::test]
    async fn test_explicit_decay_is_contraction() {
        let store = store(0);
        let boosted = store.update("c1", ExpertRole::Lifestyle, 0.3).await.unwrap();
        let decayed = store.decay("c1").await.unwrap();

        for role in ExpertRole::ALL {
            let before = (boosted.get(role) - 0.2).abs();
            let after = (decayed.get(role) - 0.2).abs();
            assert!(after < before);
        }
        assert!((decayed.sum() - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_reset_returns_to_uniform() {
        let store = store(0);
        store.update("c1", ExpertRole::Data, 0.2).await.unwrap();
        store.reset("c1").await.unwrap();
        assert!(store.get("c1").await.unwrap().is_uniform());
    }
}
