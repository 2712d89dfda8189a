//! Ephemeral code store
//!
//! Expiring key-value storage for one-time codes and rate-limit counters.
//! Atomicity lives in the backend primitives (atomic increment, conditional
//! update) so callers never need in-process locking: two concurrent failed
//! verifications against the same code must not under-count attempts.
//!
//! Backends: in-memory (moka, default) and Redis (feature `redis-store`).

mod in_memory;

#[cfg(feature = "redis-store")]
mod redis;

pub use in_memory::InMemoryOtpStore;

#[cfg(feature = "redis-store")]
pub use redis::RedisOtpStore;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A live one-time code with its attempt counter.
///
/// At most one record exists per (subject, method); storing a new record
/// overwrites the previous one and resets the counter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtpRecord {
    /// The numeric code value.
    pub code: String,
    /// Failed verification attempts against this code.
    pub attempts: u32,
    /// Unix timestamp (seconds) at creation.
    pub created_at: u64,
}

impl OtpRecord {
    /// Create a fresh record with zero attempts.
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            attempts: 0,
            created_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
        }
    }
}

/// Expiring key-value store for one-time codes and rate-limit counters.
///
/// Implementations must make `increment_attempts` and `rate_limit` atomic
/// across concurrent callers for the same key, and `increment_attempts`
/// must preserve the record's remaining TTL rather than resetting it.
#[async_trait]
pub trait OtpStore: Send + Sync {
    /// Store a code record, overwriting any previous one and (re)setting
    /// its TTL.
    async fn put_code(&self, key: &str, record: OtpRecord, ttl: Duration) -> Result<()>;

    /// Fetch the live record, or `None` if absent or expired.
    async fn get_code(&self, key: &str) -> Result<Option<OtpRecord>>;

    /// Atomically bump the attempt counter, keeping the remaining TTL.
    ///
    /// Returns the new count, or `None` if no live record exists.
    async fn increment_attempts(&self, key: &str) -> Result<Option<u32>>;

    /// Remove the record.
    async fn delete_code(&self, key: &str) -> Result<()>;

    /// Atomic increment-and-compare against a fixed window.
    ///
    /// The first increment in a window sets the window TTL; later increments
    /// leave it untouched. Returns `true` when the counter has exceeded
    /// `max` for the current window.
    async fn rate_limit(&self, key: &str, max: u32, window: Duration) -> Result<bool>;
}

/// Generate a uniformly random numeric code of the given length.
///
/// Digits are drawn from OS randomness via rejection sampling: byte values
/// 250..=255 are discarded before `byte % 10`, so every digit is equally
/// likely.
pub fn generate_numeric_code(length: usize) -> String {
    use rand::RngCore;

    let mut rng = rand::rngs::OsRng;
    let mut out = String::with_capacity(length);
    let mut buf = [0u8; 16];

    while out.len() < length {
        rng.fill_bytes(&mut buf);
        for &byte in &buf {
            if byte >= 250 {
                continue;
            }
            out.push(char::from(b'0' + byte % 10));
            if out.len() == length {
                break;
            }
        }
    }

    out
}

/// Key for the live code of a (subject, method) pair.
pub fn code_key(subject_id: &str, method_id: &str) -> String {
    format!("otp:{}:{}", subject_id, method_id)
}

/// Key for a rate-limit counter scoped to a subject and purpose.
pub fn rate_key(purpose: &str, subject_id: &str, qualifier: Option<&str>) -> String {
    match qualifier {
        Some(q) => format!("rl:{}:{}:{}", purpose, subject_id, q),
        None => format!("rl:{}:{}", purpose, subject_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_has_configured_length_and_is_numeric() {
        for len in [4, 6, 8] {
            let code = generate_numeric_code(len);
            assert_eq!(code.len(), len);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_back_to_back_codes_differ() {
        // 10^12 possibilities; a collision here means the sampler is broken.
        let a = generate_numeric_code(12);
        let b = generate_numeric_code(12);
        assert_ne!(a, b);
    }

    #[test]
    fn test_all_digits_reachable() {
        let mut seen = [false; 10];
        for _ in 0..50 {
            for c in generate_numeric_code(10).bytes() {
                seen[(c - b'0') as usize] = true;
            }
        }
        assert!(seen.iter().all(|&s| s), "some digit never generated");
    }

    #[test]
    fn test_key_formats() {
        assert_eq!(code_key("u1", "m1"), "otp:u1:m1");
        assert_eq!(rate_key("resend", "u1", Some("m1")), "rl:resend:u1:m1");
        assert_eq!(rate_key("verify", "u1", None), "rl:verify:u1");
    }

    #[test]
    fn test_fresh_record_has_zero_attempts() {
        let record = OtpRecord::new("123456");
        assert_eq!(record.attempts, 0);
        assert_eq!(record.code, "123456");
        assert!(record.created_at > 0);
    }
}
