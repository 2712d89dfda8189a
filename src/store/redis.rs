//! Redis ephemeral store
//!
//! Code records are stored as hashes so attempt counting can ride on
//! `HINCRBY`, which is atomic and leaves the key's TTL untouched. The
//! existence check around the increment and the rate-limit
//! increment-and-compare both run as Lua scripts, so concurrent callers
//! against the same key are serialized inside Redis.

use crate::error::{FactorgateError, Result};
use crate::store::{OtpRecord, OtpStore};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

const INCREMENT_ATTEMPTS_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 1 then
  return redis.call('HINCRBY', KEYS[1], 'attempts', 1)
else
  return nil
end
"#;

const RATE_LIMIT_SCRIPT: &str = r#"
local count = redis.call('INCR', KEYS[1])
if count == 1 then
  redis.call('EXPIRE', KEYS[1], ARGV[1])
end
return count
"#;

/// Redis-backed [`OtpStore`] for multi-process deployments.
#[derive(Clone)]
pub struct RedisOtpStore {
    client: redis::Client,
}

impl RedisOtpStore {
    /// Create a store from a Redis connection URL.
    pub fn new(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| FactorgateError::store(format!("Failed to create Redis client: {}", e)))?;

        Ok(Self { client })
    }

    async fn get_connection(&self) -> Result<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| FactorgateError::store(format!("Failed to get Redis connection: {}", e)))
    }
}

#[async_trait]
impl OtpStore for RedisOtpStore {
    async fn put_code(&self, key: &str, record: OtpRecord, ttl: Duration) -> Result<()> {
        let mut conn = self.get_connection().await?;

        // DEL + HSET + EXPIRE in one transaction so a reader never sees a
        // half-written record or a stale attempt count.
        redis::pipe()
            .atomic()
            .cmd("DEL")
            .arg(key)
            .ignore()
            .cmd("HSET")
            .arg(key)
            .arg("code")
            .arg(&record.code)
            .arg("attempts")
            .arg(record.attempts)
            .arg("created_at")
            .arg(record.created_at)
            .ignore()
            .cmd("EXPIRE")
            .arg(key)
            .arg(ttl.as_secs().max(1))
            .ignore()
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| FactorgateError::store(format!("Redis put failed: {}", e)))?;

        Ok(())
    }

    async fn get_code(&self, key: &str) -> Result<Option<OtpRecord>> {
        let mut conn = self.get_connection().await?;

        let fields: HashMap<String, String> = redis::cmd("HGETALL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| FactorgateError::store(format!("Redis HGETALL failed: {}", e)))?;

        if fields.is_empty() {
            return Ok(None);
        }

        let code = fields
            .get("code")
            .cloned()
            .ok_or_else(|| FactorgateError::store("Code record missing 'code' field"))?;
        let attempts = fields
            .get("attempts")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let created_at = fields
            .get("created_at")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);

        Ok(Some(OtpRecord {
            code,
            attempts,
            created_at,
        }))
    }

    async fn increment_attempts(&self, key: &str) -> Result<Option<u32>> {
        let mut conn = self.get_connection().await?;

        let count: Option<i64> = redis::Script::new(INCREMENT_ATTEMPTS_SCRIPT)
            .key(key)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| FactorgateError::store(format!("Redis increment failed: {}", e)))?;

        Ok(count.map(|c| c.max(0) as u32))
    }

    async fn delete_code(&self, key: &str) -> Result<()> {
        let mut conn = self.get_connection().await?;

        redis::cmd("DEL")
            .arg(key)
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| FactorgateError::store(format!("Redis DEL failed: {}", e)))?;

        Ok(())
    }

    async fn rate_limit(&self, key: &str, max: u32, window: Duration) -> Result<bool> {
        let mut conn = self.get_connection().await?;

        let count: i64 = redis::Script::new(RATE_LIMIT_SCRIPT)
            .key(key)
            .arg(window.as_secs().max(1))
            .invoke_async(&mut conn)
            .await
            .map_err(|e| FactorgateError::store(format!("Redis rate limit failed: {}", e)))?;

        Ok(count > i64::from(max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // These require a running Redis instance; run with
    // `cargo test --features redis-store -- --ignored`.

    #[tokio::test]
    #[ignore] // Requires Redis
    async fn test_redis_code_lifecycle() {
        let store = RedisOtpStore::new("redis://127.0.0.1/").unwrap();

        store
            .put_code("otp:test:m1", OtpRecord::new("123456"), Duration::from_secs(30))
            .await
            .unwrap();

        let record = store.get_code("otp:test:m1").await.unwrap().unwrap();
        assert_eq!(record.code, "123456");
        assert_eq!(record.attempts, 0);

        assert_eq!(store.increment_attempts("otp:test:m1").await.unwrap(), Some(1));
        assert_eq!(store.increment_attempts("otp:test:m1").await.unwrap(), Some(2));

        store.delete_code("otp:test:m1").await.unwrap();
        assert!(store.get_code("otp:test:m1").await.unwrap().is_none());
        assert_eq!(store.increment_attempts("otp:test:m1").await.unwrap(), None);
    }

    #[tokio::test]
    #[ignore] // Requires Redis
    async fn test_redis_rate_limit() {
        let store = RedisOtpStore::new("redis://127.0.0.1/").unwrap();
        let key = "rl:test:redis";
        store.delete_code(key).await.unwrap();

        for _ in 0..3 {
            assert!(!store.rate_limit(key, 3, Duration::from_secs(30)).await.unwrap());
        }
        assert!(store.rate_limit(key, 3, Duration::from_secs(30)).await.unwrap());

        store.delete_code(key).await.unwrap();
    }
}
