use crate::cache::{
    Cache, CacheSweeper, ExpiryPolicy, InMemoryCache, PostgresCache, PurgeExpired, RedisCache,
};
use crate::config::{IdempotencySettings, StorageBackend};
use crate::error::{AppError, Result};
use crate::idempotency::IdempotentProvider;
use std::sync::Arc;
use std::time::Duration;

/// A provider together with the optional sweeper for its cache.
pub struct IdempotencyComponents {
    pub provider: Arc<IdempotentProvider>,
    pub sweeper: Option<CacheSweeper>,
}

/// Builds providers from [`IdempotencySettings`].
pub struct IdempotencyFactory;

impl IdempotencyFactory {
    /// Validates `settings`, connects the configured backend and wraps it in a provider.
    ///
    /// Fails on unsupported backends, missing endpoints, or an unreachable store.
    pub async fn build(settings: &IdempotencySettings) -> Result<IdempotencyComponents> {
        settings.check()?;

        let policy = ExpiryPolicy::new(settings.time_to_live(), settings.time_to_idle());
        let backend = settings.backend()?;

        let (cache, purge): (Arc<dyn Cache>, Arc<dyn PurgeExpired>) = match backend {
            StorageBackend::Memory => {
                let cache = Arc::new(InMemoryCache::with_policy(policy));
                (cache.clone() as Arc<dyn Cache>, cache as Arc<dyn PurgeExpired>)
            }
            StorageBackend::Redis => {
                let url = required(&settings.redis_url, "redis_url")?;
                let cache = Arc::new(RedisCache::connect(url, &settings.cache_name, policy).await?);
                (cache.clone() as Arc<dyn Cache>, cache as Arc<dyn PurgeExpired>)
            }
            StorageBackend::Postgres => {
                let url = required(&settings.database_url, "database_url")?;
                let cache = Arc::new(PostgresCache::connect(url, &settings.cache_name, policy).await?);
                (cache.clone() as Arc<dyn Cache>, cache as Arc<dyn PurgeExpired>)
            }
        };

        tracing::info!(
            backend = %backend,
            cache = %settings.cache_name,
            time_to_live_ms = settings.time_to_live_ms,
            time_to_idle_ms = settings.time_to_idle_ms,
            "Idempotency cache ready"
        );

        let sweeper = settings
            .sweep_interval_secs
            .filter(|secs| *secs > 0)
            .map(|secs| CacheSweeper::new(purge, Duration::from_secs(secs)));

        Ok(IdempotencyComponents {
            provider: Arc::new(IdempotentProvider::new(cache)),
            sweeper,
        })
    }
}

fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str> {
    value
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| AppError::Configuration(format!("{} is required", name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MEMORY;

    #[test]
    fn test_required_setting() {
        assert_eq!(required(&Some("redis://x".to_string()), "redis_url").unwrap(), "redis://x");
        assert!(required(&None, "redis_url").is_err());
        assert!(required(&Some(" ".to_string()), "redis_url").is_err());
    }

    #[tokio::test]
    async fn test_build_memory_provider_with_sweeper() {
        let settings = IdempotencySettings {
            storage_implementation: MEMORY.to_string(),
            cache_name: "testing".to_string(),
            time_to_live_ms: 1_000,
            sweep_interval_secs: Some(30),
            ..Default::default()
        };

        let components = IdempotencyFactory::build(&settings).await.unwrap();
        let sweeper = components.sweeper.expect("sweeper should be configured");
        assert_eq!(sweeper.interval(), Duration::from_secs(30));
        assert_eq!(sweeper.run_once().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unsupported_backend_fails_fast() {
        let settings = IdempotencySettings {
            storage_implementation: "hazelcast".to_string(),
            ..Default::default()
        };

        let err = IdempotencyFactory::build(&settings).await.err().unwrap();
        assert!(matches!(err, AppError::Configuration(_)));
        assert!(err.to_string().contains("hazelcast"));
    }
}
