//! Response cache with TTL expiry
//!
//! Backend errors and slow operations are treated as misses; the cache is a
//! soft dependency and never fails a turn.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::cache::key::CacheKey;
use crate::config::CacheConfig;
use crate::errors::{ChatError, Result};
use crate::telemetry::{TelemetryCollector, TelemetryEvent};
use crate::types::MergedReply;

/// Key/value store with per-entry TTL
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &CacheKey) -> Result<Option<MergedReply>>;
    async fn put(&self, key: CacheKey, reply: MergedReply, ttl: Duration) -> Result<()>;
}

struct CacheEntry {
    reply: MergedReply,
    expires_at: Instant,
}

/// Default entry cap for the in-memory backend
pub const DEFAULT_CACHE_CAPACITY: usize = 10_000;

/// Puts between full sweeps of expired entries
const PURGE_INTERVAL: usize = 256;

/// Process-local backend, bounded by `capacity`.
///
/// Expired entries are dropped on read, swept every `PURGE_INTERVAL` puts and
/// whenever the map is full. A full map with nothing expired evicts the entry
/// closest to expiry.
pub struct InMemoryCacheBackend {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
    capacity: usize,
    puts: AtomicUsize,
}

impl InMemoryCacheBackend {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
            puts: AtomicUsize::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Remove every expired entry, returning how many were dropped
    pub async fn purge_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        sweep(&mut entries, Instant::now())
    }
}

impl Default for InMemoryCacheBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn sweep(entries: &mut HashMap<CacheKey, CacheEntry>, now: Instant) -> usize {
    let before = entries.len();
    entries.retain(|_, e| e.expires_at > now);
    before - entries.len()
}

#[async_trait]
impl CacheBackend for InMemoryCacheBackend {
    async fn get(&self, key: &CacheKey) -> Result<Option<MergedReply>> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if entry.expires_at > now => return Ok(Some(entry.reply.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }

        self.entries.write().await.remove(key);
        Ok(None)
    }

    async fn put(&self, key: CacheKey, reply: MergedReply, ttl: Duration) -> Result<()> {
        let now = Instant::now();
        let entry = CacheEntry {
            reply,
            expires_at: now + ttl,
        };
        let due = self.puts.fetch_add(1, Ordering::Relaxed) % PURGE_INTERVAL == PURGE_INTERVAL - 1;

        let mut entries = self.entries.write().await;
        if due || (entries.len() >= self.capacity && !entries.contains_key(&key)) {
            let dropped = sweep(&mut entries, now);
            if dropped > 0 {
                debug!(dropped, "purged expired cache entries");
            }
        }
        if entries.len() >= self.capacity && !entries.contains_key(&key) {
            let soonest = entries
                .iter()
                .min_by_key(|(_, e)| e.expires_at)
                .map(|(k, _)| k.clone());
            if let Some(soonest) = soonest {
                entries.remove(&soonest);
            }
        }
        entries.insert(key, entry);
        Ok(())
    }
}

/// Pipeline-facing cache: bounded operations, soft failures
pub struct ResponseCache {
    backend: Arc<dyn CacheBackend>,
    enabled: bool,
    ttl: Duration,
    op_timeout: Duration,
    telemetry: TelemetryCollector,
}

impl ResponseCache {
    pub fn new(backend: Arc<dyn CacheBackend>, config: &CacheConfig, telemetry: TelemetryCollector) -> Self {
        Self {
            backend,
            enabled: config.enabled,
            ttl: config.ttl(),
            op_timeout: config.op_timeout(),
            telemetry,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Lookup; any failure reads as a miss
    pub async fn get(&self, key: &CacheKey) -> Option<MergedReply> {
        if !self.enabled {
            return None;
        }

        let result = tokio::time::timeout(self.op_timeout, self.backend.get(key))
            .await
            .unwrap_or_else(|_| Err(ChatError::timeout(self.op_timeout)));

        match result {
            Ok(Some(reply)) => {
                debug!(key = %key, "cache hit");
                self.telemetry.record(TelemetryEvent::CacheHit {
                    timestamp: Instant::now(),
                });
                Some(reply)
            }
            Ok(None) => {
                self.telemetry.record(TelemetryEvent::CacheMiss {
                    timestamp: Instant::now(),
                });
                None
            }
            Err(e) => {
                self.unavailable("get", e);
                None
            }
        }
    }

    /// Store a reply; degraded replies are never cached
    pub async fn put(&self, key: CacheKey, reply: &MergedReply) -> bool {
        if !self.enabled || reply.degraded {
            return false;
        }

        let result = tokio::time::timeout(self.op_timeout, self.backend.put(key, reply.clone(), self.ttl))
            .await
            .unwrap_or_else(|_| Err(ChatError::timeout(self.op_timeout)));

        match result {
            Ok(()) => true,
            Err(e) => {
                self.unavailable("put", e);
                false
            }
        }
    }

    fn unavailable(&self, op: &str, error: ChatError) {
        warn!(op, error = %error, "response cache unavailable");
        self.telemetry.record(TelemetryEvent::CacheUnavailable {
            reason: error.to_string(),
            timestamp: Instant::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenBackend;

    #[async_trait]
    impl CacheBackend for BrokenBackend {
        async fn get(&self, _key: &CacheKey) -> Result<Option<MergedReply>> {
            Err(ChatError::CacheError("connection refused".to_string()))
        }

        async fn put(&self, _key: CacheKey, _reply: MergedReply, _ttl: Duration) -> Result<()> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        }
    }

    fn key(text: &str) -> CacheKey {
        CacheKey::derive(text, None, &[], &crate::weights::ExpertWeightVector::uniform())
    }

    fn cache(backend: Arc<dyn CacheBackend>, ttl_ms: u64) -> (ResponseCache, TelemetryCollector) {
        let telemetry = TelemetryCollector::new();
        let config = CacheConfig {
            enabled: true,
            ttl_secs: 0,
            op_timeout_ms: 50,
        };
        let mut cache = ResponseCache::new(backend, &config, telemetry.clone());
        cache.ttl = Duration::from_millis(ttl_ms);
        (cache, telemetry)
    }

    #[tokio::test]
    async fn test_put_then_get_returns_reply() {
        let (cache, telemetry) = cache(Arc::new(InMemoryCacheBackend::new()), 5_000);
        let reply = MergedReply::new("c1", "Three homes match.");

        assert!(cache.get(&key("q")).await.is_none());
        assert!(cache.put(key("q"), &reply).await);
        assert_eq!(cache.get(&key("q")).await, Some(reply));

        let stats = telemetry.get_stats();
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(stats.cache_misses, 1);
    }

    #[tokio::test]
    async fn test_entries_expire() {
        let backend = Arc::new(InMemoryCacheBackend::new());
        let (cache, _) = cache(backend.clone(), 40);
        cache.put(key("q"), &MergedReply::new("c1", "answer")).await;

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(cache.get(&key("q")).await.is_none());
        assert_eq!(backend.len().await, 0);
    }

    #[tokio::test]
    async fn test_degraded_replies_not_cached() {
        let (cache, _) = cache(Arc::new(InMemoryCacheBackend::new()), 5_000);
        assert!(!cache.put(key("q"), &MergedReply::fallback("c1", "sorry")).await);
        assert!(cache.get(&key("q")).await.is_none());
    }

    #[tokio::test]
    async fn test_backend_failures_are_misses() {
        let (cache, telemetry) = cache(Arc::new(BrokenBackend), 5_000);
        assert!(cache.get(&key("q")).await.is_none());
        assert!(!cache.put(key("q"), &MergedReply::new("c1", "answer")).await);
        assert_eq!(telemetry.get_stats().cache_errors, 2);
    }

    #[tokio::test]
    async fn test_distinct_expired_keys_stay_bounded() {
        let backend = InMemoryCacheBackend::with_capacity(16);
        for i in 0..200 {
            backend
                .put(key(&format!("question {}", i)), MergedReply::new("c1", "a"), Duration::ZERO)
                .await
                .unwrap();
            assert!(backend.len().await <= 16);
        }

        // A sweep on the next full put clears every expired entry
        backend
            .put(key("fresh"), MergedReply::new("c1", "b"), Duration::from_secs(60))
            .await
            .unwrap();
        assert!(backend.len().await <= 16);
        assert!(backend.get(&key("fresh")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_full_cache_evicts_closest_to_expiry() {
        let backend = InMemoryCacheBackend::with_capacity(2);
        backend
            .put(key("short"), MergedReply::new("c1", "a"), Duration::from_secs(10))
            .await
            .unwrap();
        backend
            .put(key("long"), MergedReply::new("c1", "b"), Duration::from_secs(600))
            .await
            .unwrap();
        backend
            .put(key("newest"), MergedReply::new("c1", "c"), Duration::from_secs(300))
            .await
            .unwrap();

        assert_eq!(backend.len().await, 2);
        assert!(backend.get(&key("short")).await.unwrap().is_none());
        assert!(backend.get(&key("long")).await.unwrap().is_some());
        assert!(backend.get(&key("newest")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let backend = InMemoryCacheBackend::new();
        backend
            .put(key("old"), MergedReply::new("c1", "a"), Duration::from_millis(1))
            .await
            .unwrap();
        backend
            .put(key("new"), MergedReply::new("c1", "b"), Duration::from_secs(60))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(backend.purge_expired().await, 1);
        assert_eq!(backend.len().await, 1);
    }
}
