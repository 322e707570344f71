use crate::cache::PurgeExpired;
use crate::error::Result;
use std::sync::Arc;
use std::time::Duration;

/// Background job that physically removes expired cache entries.
///
/// Reads already filter expired entries; the sweep only reclaims space.
pub struct CacheSweeper {
    target: Arc<dyn PurgeExpired>,
    interval: Duration,
}

impl CacheSweeper {
    pub fn new(target: Arc<dyn PurgeExpired>, interval: Duration) -> Self {
        Self { target, interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Runs the sweep once.
    pub async fn run_once(&self) -> Result<u64> {
        self.target.purge_expired().await
    }

    /// Starts the sweep in a background task.
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);

            loop {
                interval.tick().await;

                match self.target.purge_expired().await {
                    Ok(count) => {
                        if count > 0 {
                            tracing::info!("Purged {} expired cache entries", count);
                        }
                    }
                    Err(e) => {
                        tracing::error!("Failed to purge expired cache entries: {}", e);
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{Cache, ExpiryPolicy, InMemoryCache, ManualClock};

    #[tokio::test]
    async fn test_run_once_purges_expired_entries() {
        let clock = Arc::new(ManualClock::new(0));
        let cache = Arc::new(InMemoryCache::with_clock(
            ExpiryPolicy::time_to_live(Duration::from_millis(10)),
            clock.clone(),
        ));
        cache.put("a", "1").await.unwrap();
        cache.put("b", "2").await.unwrap();

        let sweeper = CacheSweeper::new(cache.clone(), Duration::from_secs(60));
        assert_eq!(sweeper.run_once().await.unwrap(), 0);

        clock.advance(Duration::from_millis(11));
        cache.put("c", "3").await.unwrap();

        assert_eq!(sweeper.run_once().await.unwrap(), 2);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_background_task_sweeps() {
        let clock = Arc::new(ManualClock::new(0));
        let cache = Arc::new(InMemoryCache::with_clock(
            ExpiryPolicy::time_to_live(Duration::from_millis(10)),
            clock.clone(),
        ));
        cache.put("a", "1").await.unwrap();
        clock.advance(Duration::from_millis(20));

        let handle = CacheSweeper::new(cache.clone(), Duration::from_millis(5)).start();
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.abort();

        assert!(cache.is_empty().await);
    }
}
