//! In-memory ephemeral store backed by moka
//!
//! Uses moka's per-key atomic entry operations so attempt increments and
//! rate-limit counters are race-safe without any locking in this crate.
//! A per-entry `Expiry` keeps the remaining TTL intact when a record is
//! updated in place (attempt increments) while letting overwrites and
//! fresh counters start a new window.

use crate::error::Result;
use crate::store::{OtpRecord, OtpStore};
use async_trait::async_trait;
use moka::future::Cache as MokaCache;
use moka::ops::compute::{CompResult, Op};
use moka::Expiry;
use std::time::{Duration, Instant};

/// Either a live code record or a rate-limit counter.
#[derive(Clone)]
enum Slot {
    Code(OtpRecord),
    Counter(u32),
}

/// Cache entry carrying its own TTL and whether that TTL should be applied
/// on the next write (fresh insert) or preserved (in-place update).
#[derive(Clone)]
struct StoreEntry {
    slot: Slot,
    ttl: Duration,
    refresh: bool,
}

struct StoreExpiry;

impl Expiry<String, StoreEntry> for StoreExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &StoreEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_read(
        &self,
        _key: &String,
        _value: &StoreEntry,
        _read_at: Instant,
        duration_until_expiry: Option<Duration>,
        _last_modified_at: Instant,
    ) -> Option<Duration> {
        // TTL, not TTI: reads never extend the lifetime.
        duration_until_expiry
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &StoreEntry,
        _updated_at: Instant,
        duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        if value.refresh {
            Some(value.ttl)
        } else {
            // Attempt increments and in-window counter bumps keep the
            // remaining TTL.
            duration_until_expiry
        }
    }
}

/// In-memory [`OtpStore`] suitable for single-process deployments and tests.
#[derive(Clone)]
pub struct InMemoryOtpStore {
    inner: MokaCache<String, StoreEntry>,
}

impl InMemoryOtpStore {
    /// Create a store bounded to the given number of entries.
    pub fn new(max_entries: u64) -> Self {
        let cache = MokaCache::builder()
            .max_capacity(max_entries)
            .expire_after(StoreExpiry)
            .build();

        Self { inner: cache }
    }

    /// Force pending expirations to run (useful in tests).
    pub async fn run_pending_tasks(&self) {
        self.inner.run_pending_tasks().await;
    }
}

impl Default for InMemoryOtpStore {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[async_trait]
impl OtpStore for InMemoryOtpStore {
    async fn put_code(&self, key: &str, record: OtpRecord, ttl: Duration) -> Result<()> {
        let entry = StoreEntry {
            slot: Slot::Code(record),
            ttl,
            refresh: true,
        };
        self.inner.insert(key.to_string(), entry).await;
        Ok(())
    }

    async fn get_code(&self, key: &str) -> Result<Option<OtpRecord>> {
        Ok(self.inner.get(key).await.and_then(|entry| match entry.slot {
            Slot::Code(record) => Some(record),
            Slot::Counter(_) => None,
        }))
    }

    async fn increment_attempts(&self, key: &str) -> Result<Option<u32>> {
        let result = self
            .inner
            .entry(key.to_string())
            .and_compute_with(|maybe| {
                let op = match maybe {
                    Some(entry) => {
                        let current = entry.into_value();
                        match current.slot {
                            Slot::Code(mut record) => {
                                record.attempts += 1;
                                Op::Put(StoreEntry {
                                    slot: Slot::Code(record),
                                    ttl: current.ttl,
                                    refresh: false,
                                })
                            }
                            Slot::Counter(_) => Op::Nop,
                        }
                    }
                    None => Op::Nop,
                };
                std::future::ready(op)
            })
            .await;

        match result {
            CompResult::ReplacedWith(entry) => match entry.into_value().slot {
                Slot::Code(record) => Ok(Some(record.attempts)),
                Slot::Counter(_) => Ok(None),
            },
            _ => Ok(None),
        }
    }

    async fn delete_code(&self, key: &str) -> Result<()> {
        self.inner.remove(key).await;
        Ok(())
    }

    async fn rate_limit(&self, key: &str, max: u32, window: Duration) -> Result<bool> {
        let entry = self
            .inner
            .entry(key.to_string())
            .and_upsert_with(|maybe| {
                let next = match maybe.map(|e| e.into_value()) {
                    Some(StoreEntry {
                        slot: Slot::Counter(count),
                        ttl,
                        ..
                    }) => StoreEntry {
                        slot: Slot::Counter(count.saturating_add(1)),
                        ttl,
                        refresh: false,
                    },
                    // Absent (or clobbered by a code record, which the key
                    // scheme prevents): start a fresh window.
                    _ => StoreEntry {
                        slot: Slot::Counter(1),
                        ttl: window,
                        refresh: true,
                    },
                };
                std::future::ready(next)
            })
            .await;

        let count = match entry.into_value().slot {
            Slot::Counter(count) => count,
            Slot::Code(_) => 0,
        };
        Ok(count > max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = InMemoryOtpStore::new(100);
        store
            .put_code("otp:u1:m1", OtpRecord::new("123456"), Duration::from_secs(60))
            .await
            .unwrap();

        let record = store.get_code("otp:u1:m1").await.unwrap().unwrap();
        assert_eq!(record.code, "123456");
        assert_eq!(record.attempts, 0);

        store.delete_code("otp:u1:m1").await.unwrap();
        assert!(store.get_code("otp:u1:m1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_overwrite_resets_attempts() {
        let store = InMemoryOtpStore::new(100);
        store
            .put_code("otp:u1:m1", OtpRecord::new("111111"), Duration::from_secs(60))
            .await
            .unwrap();
        store.increment_attempts("otp:u1:m1").await.unwrap();
        store.increment_attempts("otp:u1:m1").await.unwrap();

        store
            .put_code("otp:u1:m1", OtpRecord::new("222222"), Duration::from_secs(60))
            .await
            .unwrap();

        let record = store.get_code("otp:u1:m1").await.unwrap().unwrap();
        assert_eq!(record.code, "222222");
        assert_eq!(record.attempts, 0);
    }

    #[tokio::test]
    async fn test_code_expires() {
        let store = InMemoryOtpStore::new(100);
        store
            .put_code("otp:u1:m1", OtpRecord::new("123456"), Duration::from_millis(30))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(80)).await;
        store.run_pending_tasks().await;

        assert!(store.get_code("otp:u1:m1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_increment_preserves_remaining_ttl() {
        let store = InMemoryOtpStore::new(100);
        store
            .put_code("otp:u1:m1", OtpRecord::new("123456"), Duration::from_millis(120))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(70)).await;
        // Incrementing must not restart the 120ms clock.
        let count = store.increment_attempts("otp:u1:m1").await.unwrap();
        assert_eq!(count, Some(1));

        tokio::time::sleep(Duration::from_millis(80)).await;
        store.run_pending_tasks().await;
        assert!(store.get_code("otp:u1:m1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_increment_absent_returns_none() {
        let store = InMemoryOtpStore::new(100);
        assert_eq!(store.increment_attempts("otp:missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_concurrent_increments_do_not_undercount() {
        let store = Arc::new(InMemoryOtpStore::new(100));
        store
            .put_code("otp:u1:m1", OtpRecord::new("123456"), Duration::from_secs(60))
            .await
            .unwrap();

        let mut handles = vec![];
        for _ in 0..20 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.increment_attempts("otp:u1:m1").await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let record = store.get_code("otp:u1:m1").await.unwrap().unwrap();
        assert_eq!(record.attempts, 20);
    }

    #[tokio::test]
    async fn test_rate_limit_exceeds_after_max() {
        let store = InMemoryOtpStore::new(100);
        for _ in 0..3 {
            let exceeded = store
                .rate_limit("rl:resend:u1:m1", 3, Duration::from_secs(60))
                .await
                .unwrap();
            assert!(!exceeded);
        }

        let exceeded = store
            .rate_limit("rl:resend:u1:m1", 3, Duration::from_secs(60))
            .await
            .unwrap();
        assert!(exceeded);
    }

    #[tokio::test]
    async fn test_rate_limit_window_rolls_over() {
        let store = InMemoryOtpStore::new(100);
        for _ in 0..2 {
            store
                .rate_limit("rl:resend:u1:m1", 1, Duration::from_millis(40))
                .await
                .unwrap();
        }
        assert!(store
            .rate_limit("rl:resend:u1:m1", 1, Duration::from_millis(40))
            .await
            .unwrap());

        tokio::time::sleep(Duration::from_millis(90)).await;
        store.run_pending_tasks().await;

        let exceeded = store
            .rate_limit("rl:resend:u1:m1", 1, Duration::from_millis(40))
            .await
            .unwrap();
        assert!(!exceeded, "counter should reset after the window expires");
    }

    #[tokio::test]
    async fn test_rate_limit_keys_are_independent() {
        let store = InMemoryOtpStore::new(100);
        for _ in 0..4 {
            store
                .rate_limit("rl:resend:u1:m1", 3, Duration::from_secs(60))
                .await
                .unwrap();
        }

        let exceeded = store
            .rate_limit("rl:resend:u2:m1", 3, Duration::from_secs(60))
            .await
            .unwrap();
        assert!(!exceeded);
    }
}
