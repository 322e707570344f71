use crate::cache::Cache;
use crate::error::Result;
use crate::idempotency::envelope::ResultEnvelope;
use crate::idempotency::operation::Operation;
use crate::idempotency::outcome::Outcome;
use crate::observability::{get_metrics, mask_key};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counters for idempotent executions handled by one provider.
#[derive(Debug, Default)]
pub struct IdempotencyMetrics {
    pub total_requests: AtomicU64,
    pub passthrough_requests: AtomicU64,
    pub replayed_requests: AtomicU64,
    pub executed_requests: AtomicU64,
    pub cached_outcomes: AtomicU64,
    pub cache_errors: AtomicU64,
}

impl IdempotencyMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_passthrough(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.passthrough_requests.fetch_add(1, Ordering::Relaxed);
        get_metrics().record_idempotent_request("passthrough");
    }

    pub fn record_replayed(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.replayed_requests.fetch_add(1, Ordering::Relaxed);
        get_metrics().record_idempotent_request("replayed");
    }

    pub fn record_executed(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.executed_requests.fetch_add(1, Ordering::Relaxed);
        get_metrics().record_idempotent_request("executed");
    }

    pub fn record_cached(&self, status: u16) {
        self.cached_outcomes.fetch_add(1, Ordering::Relaxed);
        get_metrics().record_outcome_cached(status);
    }

    pub fn record_cache_error(&self, stage: &'static str, kind: &'static str) {
        self.cache_errors.fetch_add(1, Ordering::Relaxed);
        get_metrics().record_cache_error(stage, kind);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            passthrough_requests: self.passthrough_requests.load(Ordering::Relaxed),
            replayed_requests: self.replayed_requests.load(Ordering::Relaxed),
            executed_requests: self.executed_requests.load(Ordering::Relaxed),
            cached_outcomes: self.cached_outcomes.load(Ordering::Relaxed),
            cache_errors: self.cache_errors.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub passthrough_requests: u64,
    pub replayed_requests: u64,
    pub executed_requests: u64,
    pub cached_outcomes: u64,
    pub cache_errors: u64,
}

impl MetricsSnapshot {
    pub fn replay_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.replayed_requests as f64 / self.total_requests as f64
        }
    }
}

/// Replays cached outcomes for repeated idempotency keys and caches fresh successful ones.
///
/// The provider holds no per-key state and takes no locks: two concurrent
/// first attempts with the same key may both run their operation, and the
/// last successful write wins. Once an outcome is cached, later calls for
/// that key replay it without running their operation.
///
/// Cache failures never reach the caller; they are logged and counted.
pub struct IdempotentProvider {
    cache: Arc<dyn Cache>,
    metrics: Arc<IdempotencyMetrics>,
}

impl IdempotentProvider {
    pub fn new(cache: Arc<dyn Cache>) -> Self {
        Self::with_metrics(cache, Arc::new(IdempotencyMetrics::new()))
    }

    pub fn with_metrics(cache: Arc<dyn Cache>, metrics: Arc<IdempotencyMetrics>) -> Self {
        Self { cache, metrics }
    }

    pub fn cache(&self) -> Arc<dyn Cache> {
        Arc::clone(&self.cache)
    }

    pub fn metrics(&self) -> Arc<IdempotencyMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Runs `operation` unless a cached outcome exists for `idempotency_key`.
    ///
    /// An absent or empty key disables idempotency: the operation runs and
    /// its outcome is returned without touching the cache.
    pub async fn execute<O: Operation>(&self, idempotency_key: Option<&str>, operation: O) -> Outcome {
        let key = match idempotency_key {
            Some(key) if !key.is_empty() => key,
            _ => {
                self.metrics.record_passthrough();
                return operation.run().await;
            }
        };

        match self.retrieve(key).await {
            Ok(Some(outcome)) => {
                self.metrics.record_replayed();
                tracing::debug!(key = %mask_key(key), status = outcome.status, "Replaying cached outcome");
                return outcome;
            }
            Ok(None) => {}
            Err(e) => {
                self.metrics.record_cache_error("retrieve", e.kind());
                tracing::warn!(key = %mask_key(key), "Cannot retrieve cached outcome, executing: {}", e);
            }
        }

        let outcome = operation.run().await;
        self.metrics.record_executed();

        if outcome.is_success() {
            match self.store(key, &outcome).await {
                Ok(()) => self.metrics.record_cached(outcome.status),
                Err(e) => {
                    self.metrics.record_cache_error("store", e.kind());
                    tracing::warn!(key = %mask_key(key), status = outcome.status, "Cannot cache outcome: {}", e);
                }
            }
        }

        outcome
    }

    async fn retrieve(&self, key: &str) -> Result<Option<Outcome>> {
        match self.cache.get(key).await? {
            Some(raw) => Ok(Some(ResultEnvelope::decode(&raw)?.into_outcome())),
            None => Ok(None),
        }
    }

    async fn store(&self, key: &str, outcome: &Outcome) -> Result<()> {
        let raw = ResultEnvelope::from(outcome).encode()?;
        self.cache.put(key, &raw).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCache;

    #[test]
    fn test_metrics_snapshot() {
        let metrics = IdempotencyMetrics::new();
        metrics.record_executed();
        metrics.record_replayed();
        metrics.record_replayed();
        metrics.record_passthrough();
        metrics.record_cached(202);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_requests, 4);
        assert_eq!(snapshot.replayed_requests, 2);
        assert_eq!(snapshot.executed_requests, 1);
        assert_eq!(snapshot.passthrough_requests, 1);
        assert_eq!(snapshot.cached_outcomes, 1);
        assert_eq!(snapshot.replay_rate(), 0.5);
    }

    #[tokio::test]
    async fn test_stored_value_is_an_envelope() {
        let cache = Arc::new(InMemoryCache::new());
        let provider = IdempotentProvider::new(cache.clone());

        provider
            .execute(Some("key-1"), || async { Outcome::status(202) })
            .await;

        let raw = cache.get("key-1").await.unwrap().unwrap();
        assert_eq!(ResultEnvelope::decode(&raw).unwrap().status, 202);
    }
}
