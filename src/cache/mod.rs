pub mod expiry;
pub mod memory_cache;
pub mod postgres_cache;
pub mod redis_cache;
pub mod sweeper;

use crate::error::Result;
use crate::observability::{get_metrics, mask_key};
use async_trait::async_trait;
use std::future::Future;

pub use expiry::{is_expired, CacheEntry, Clock, ExpiryPolicy, ManualClock, SystemClock};
pub use memory_cache::InMemoryCache;
pub use postgres_cache::PostgresCache;
pub use redis_cache::RedisCache;
pub use sweeper::CacheSweeper;

/// Key-value storage capability used by the idempotency provider.
///
/// Implementations must be safe to call concurrently for the same or
/// different keys. Expiring implementations filter expired entries on read.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Unconditional upsert; replaces any existing entry and refreshes its creation time.
    async fn put(&self, key: &str, value: &str) -> Result<()>;

    /// Returns the live value for `key`, renewing its idle expiry when configured.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Deletes `key`. Removing an absent key is not an error.
    async fn remove(&self, key: &str) -> Result<()>;
}

/// Physical removal of entries that are already unreadable.
#[async_trait]
pub trait PurgeExpired: Send + Sync {
    /// Deletes expired entries and returns how many were removed.
    async fn purge_expired(&self) -> Result<u64>;
}

/// Awaits a time-to-idle renewal for `key`.
///
/// A failed renewal is logged and counted but never fails the read that
/// triggered it; the entry keeps its previous expiry. Returns whether the
/// renewal was applied.
pub(crate) async fn renew_idle_expiry<F>(backend: &'static str, key: &str, renewal: F) -> bool
where
    F: Future<Output = Result<()>>,
{
    match renewal.await {
        Ok(()) => true,
        Err(e) => {
            get_metrics().record_ttl_renewal_failure(backend);
            tracing::info!(backend, key = %mask_key(key), "Failed to update last access time: {}", e);
            false
        }
    }
}
