use crate::cache::expiry::{CacheEntry, Clock, ExpiryPolicy, SystemClock};
use crate::cache::{Cache, PurgeExpired};
use crate::error::Result;
use crate::observability::{get_metrics, LatencyTimer};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

const BACKEND: &str = "memory";

/// In-process cache with creation/expiry bookkeeping.
///
/// Expired entries are filtered on read and only physically removed by
/// [`PurgeExpired::purge_expired`], an overwrite, or an explicit remove.
pub struct InMemoryCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    policy: ExpiryPolicy,
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCache {
    /// Cache whose entries never expire.
    pub fn new() -> Self {
        Self::with_policy(ExpiryPolicy::none())
    }

    pub fn with_policy(policy: ExpiryPolicy) -> Self {
        Self::with_clock(policy, Arc::new(SystemClock))
    }

    pub fn with_clock(policy: ExpiryPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            policy,
            clock,
        }
    }

    pub fn policy(&self) -> &ExpiryPolicy {
        &self.policy
    }

    /// Returns the raw entry, expired or not.
    pub async fn entry(&self, key: &str) -> Option<CacheEntry> {
        self.entries.read().await.get(key).cloned()
    }

    /// Number of physically stored entries, including expired ones.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl Cache for InMemoryCache {
    async fn put(&self, key: &str, value: &str) -> Result<()> {
        let timer = LatencyTimer::new();
        let entry = CacheEntry::new(key, value, self.clock.now_millis(), &self.policy);

        self.entries.write().await.insert(key.to_string(), entry);

        get_metrics().record_cache_operation(BACKEND, "put", timer.elapsed_ms(), true);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let timer = LatencyTimer::new();
        let now = self.clock.now_millis();

        let value = if self.policy.renews_on_read() {
            let mut entries = self.entries.write().await;
            match entries.get_mut(key) {
                Some(entry) if !entry.is_expired(now) => {
                    entry.expiry_time = self.policy.renewed_expiry_time(now);
                    Some(entry.value.clone())
                }
                _ => None,
            }
        } else {
            let entries = self.entries.read().await;
            entries
                .get(key)
                .filter(|entry| !entry.is_expired(now))
                .map(|entry| entry.value.clone())
        };

        get_metrics().record_cache_operation(BACKEND, "get", timer.elapsed_ms(), true);
        Ok(value)
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let timer = LatencyTimer::new();
        self.entries.write().await.remove(key);
        get_metrics().record_cache_operation(BACKEND, "remove", timer.elapsed_ms(), true);
        Ok(())
    }
}

#[async_trait]
impl PurgeExpired for InMemoryCache {
    async fn purge_expired(&self) -> Result<u64> {
        let now = self.clock.now_millis();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        let purged = (before - entries.len()) as u64;

        if purged > 0 {
            get_metrics().record_entries_purged(BACKEND, purged);
        }
        Ok(purged)
    }
}
