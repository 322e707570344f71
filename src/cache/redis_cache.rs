use crate::cache::expiry::{is_expired, Clock, ExpiryPolicy, SystemClock};
use crate::cache::{renew_idle_expiry, Cache, PurgeExpired};
use crate::error::{AppError, Result};
use crate::observability::{get_metrics, LatencyTimer};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::sync::Arc;

const BACKEND: &str = "redis";

const VALUE_FIELD: &str = "value";
const CREATION_TIME_FIELD: &str = "creation_time";
const EXPIRY_TIME_FIELD: &str = "expiry_time";

// Only touches entries that still exist, so a renewal racing a remove
// cannot resurrect a value-less hash.
const RENEW_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 1 then
    redis.call('HSET', KEYS[1], 'expiry_time', ARGV[1])
    return 1
end
return 0
"#;

const PURGE_IF_EXPIRED_SCRIPT: &str = r#"
local expiry = redis.call('HGET', KEYS[1], 'expiry_time')
if expiry and tonumber(expiry) < tonumber(ARGV[1]) then
    return redis.call('DEL', KEYS[1])
end
return 0
"#;

/// Redis-backed cache; each entry is a hash holding the value and its timestamps.
///
/// Keys are namespaced by the cache name. Expiry is enforced by filtering on
/// read; Redis key expiration is not used.
pub struct RedisCache {
    client: redis::Client,
    cache_name: String,
    policy: ExpiryPolicy,
    clock: Arc<dyn Clock>,
}

impl RedisCache {
    pub fn new(client: redis::Client, cache_name: impl Into<String>, policy: ExpiryPolicy) -> Self {
        Self::with_clock(client, cache_name, policy, Arc::new(SystemClock))
    }

    pub fn with_clock(
        client: redis::Client,
        cache_name: impl Into<String>,
        policy: ExpiryPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            client,
            cache_name: cache_name.into(),
            policy,
            clock,
        }
    }

    /// Opens a client for `url` and verifies the server answers PING.
    pub async fn connect(url: &str, cache_name: impl Into<String>, policy: ExpiryPolicy) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let mut conn = client.get_multiplexed_async_connection().await?;
        let _: () = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(Self::new(client, cache_name, policy))
    }

    fn make_key(&self, key: &str) -> String {
        format!("{}:{}", self.cache_name, key)
    }

    async fn connection(&self) -> Result<MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(AppError::Redis)
    }

    fn parse_time(fields: &HashMap<String, String>, name: &str) -> Result<Option<i64>> {
        fields
            .get(name)
            .map(|raw| {
                raw.parse::<i64>().map_err(|e| {
                    AppError::Internal(anyhow::anyhow!("Invalid {} '{}' in cache entry: {}", name, raw, e))
                })
            })
            .transpose()
    }

    async fn renew(&self, conn: &mut MultiplexedConnection, redis_key: &str, expiry_time: i64) -> Result<()> {
        let _: i64 = redis::Script::new(RENEW_SCRIPT)
            .key(redis_key)
            .arg(expiry_time)
            .invoke_async(conn)
            .await?;
        Ok(())
    }

    async fn read(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection().await?;
        let redis_key = self.make_key(key);
        let mut fields: HashMap<String, String> = conn.hgetall(&redis_key).await?;

        let now = self.clock.now_millis();
        let expiry_time = Self::parse_time(&fields, EXPIRY_TIME_FIELD)?;
        if is_expired(expiry_time, now) {
            return Ok(None);
        }

        let value = match fields.remove(VALUE_FIELD) {
            Some(value) => value,
            None => return Ok(None),
        };

        if let Some(renewed) = self.policy.renewed_expiry_time(now) {
            renew_idle_expiry(BACKEND, key, self.renew(&mut conn, &redis_key, renewed)).await;
        }

        Ok(Some(value))
    }

    async fn write(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.connection().await?;
        let redis_key = self.make_key(key);

        let now = self.clock.now_millis();
        let mut fields = vec![
            (VALUE_FIELD, value.to_string()),
            (CREATION_TIME_FIELD, now.to_string()),
        ];
        if let Some(expiry_time) = self.policy.expiry_time(now) {
            fields.push((EXPIRY_TIME_FIELD, expiry_time.to_string()));
        }

        let _: () = redis::pipe()
            .atomic()
            .del(&redis_key)
            .ignore()
            .hset_multiple(&redis_key, &fields)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.connection().await?;
        let _: i64 = conn.del(self.make_key(key)).await?;
        Ok(())
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn put(&self, key: &str, value: &str) -> Result<()> {
        let timer = LatencyTimer::new();
        let result = self.write(key, value).await;
        get_metrics().record_cache_operation(BACKEND, "put", timer.elapsed_ms(), result.is_ok());
        result
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let timer = LatencyTimer::new();
        let result = self.read(key).await;
        get_metrics().record_cache_operation(BACKEND, "get", timer.elapsed_ms(), result.is_ok());
        result
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let timer = LatencyTimer::new();
        let result = self.delete(key).await;
        get_metrics().record_cache_operation(BACKEND, "remove", timer.elapsed_ms(), result.is_ok());
        result
    }
}

#[async_trait]
impl PurgeExpired for RedisCache {
    async fn purge_expired(&self) -> Result<u64> {
        if !self.policy.expires() {
            return Ok(0);
        }

        let mut conn = self.connection().await?;
        let pattern = format!("{}:*", self.cache_name);
        let script = redis::Script::new(PURGE_IF_EXPIRED_SCRIPT);
        let now = self.clock.now_millis();

        let mut purged = 0u64;
        let mut cursor: u64 = 0;
        loop {
            let (new_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await?;

            for key in keys {
                let deleted: i64 = script.key(&key).arg(now).invoke_async(&mut conn).await?;
                purged += deleted as u64;
            }

            cursor = new_cursor;
            if cursor == 0 {
                break;
            }
        }

        if purged > 0 {
            get_metrics().record_entries_purged(BACKEND, purged);
        }
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_format() {
        let client = redis::Client::open("redis://localhost:6379").unwrap();
        let cache = RedisCache::new(client, "responses", ExpiryPolicy::none());
        assert_eq!(cache.make_key("abc-123"), "responses:abc-123");
    }

    #[test]
    fn test_parse_time_fields() {
        let mut fields = HashMap::new();
        fields.insert(EXPIRY_TIME_FIELD.to_string(), "1700".to_string());
        fields.insert(CREATION_TIME_FIELD.to_string(), "not-a-number".to_string());

        assert_eq!(RedisCache::parse_time(&fields, EXPIRY_TIME_FIELD).unwrap(), Some(1700));
        assert!(RedisCache::parse_time(&fields, CREATION_TIME_FIELD).is_err());
        assert_eq!(RedisCache::parse_time(&fields, "missing").unwrap(), None);
    }
}
