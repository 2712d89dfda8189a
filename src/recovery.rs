//! Recovery code vault
//!
//! Single-use backup codes issued in fixed-size batches. Plaintext is
//! returned to the caller exactly once; only a slow salted hash is
//! persisted. Consuming a code is a compare-and-swap on its unused state,
//! so the same code cannot validate twice even under concurrent
//! resubmission.

use crate::error::{FactorgateError, Result};
use argon2::{
    password_hash::{rand_core::OsRng as SaltRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Characters used in recovery codes. No 0, O, 1, I to avoid confusion
/// when read back over the phone.
const CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Characters per group; codes are two groups joined by a hyphen.
const GROUP_LENGTH: usize = 4;

/// A stored (hashed) recovery code.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RecoveryCode {
    pub id: String,
    pub subject_id: String,
    /// PHC-formatted argon2 hash of the normalized code.
    pub hash: String,
    /// Set when the code is consumed; a used code never validates again.
    pub used_at: Option<SystemTime>,
}

impl RecoveryCode {
    pub fn new(subject_id: impl Into<String>, hash: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            subject_id: subject_id.into(),
            hash: hash.into(),
            used_at: None,
        }
    }

    pub fn is_used(&self) -> bool {
        self.used_at.is_some()
    }
}

/// Trait for persisting recovery codes.
#[async_trait]
pub trait RecoveryCodeStore: Send + Sync {
    /// Atomically replace the subject's batch: the old batch is fully
    /// deleted alongside the insert, with no partial state visible to a
    /// concurrent reader.
    async fn replace_batch(&self, subject_id: &str, batch: &[RecoveryCode]) -> Result<()>;

    /// All codes for a subject, used and unused.
    async fn list_codes(&self, subject_id: &str) -> Result<Vec<RecoveryCode>>;

    /// Mark a code used, conditioned on it still being unused.
    ///
    /// Returns `false` when a concurrent caller consumed it first.
    async fn mark_used(&self, code_id: &str, used_at: SystemTime) -> Result<bool>;

    /// Delete every code for a subject. Returns the number removed.
    async fn delete_all(&self, subject_id: &str) -> Result<usize>;

    /// Count of codes still available.
    async fn count_unused(&self, subject_id: &str) -> Result<usize> {
        Ok(self
            .list_codes(subject_id)
            .await?
            .iter()
            .filter(|c| !c.is_used())
            .count())
    }
}

/// Configuration for the argon2 hashing of recovery codes.
#[derive(Clone, Debug)]
pub struct HashConfig {
    /// Memory cost in KiB (default: 19456 = 19 MiB).
    pub memory_cost: u32,
    /// Time cost / iterations (default: 2).
    pub time_cost: u32,
    /// Parallelism (default: 1).
    pub parallelism: u32,
}

impl Default for HashConfig {
    fn default() -> Self {
        // OWASP recommended minimum for Argon2id
        Self {
            memory_cost: 19 * 1024,
            time_cost: 2,
            parallelism: 1,
        }
    }
}

impl HashConfig {
    /// Faster settings for development and tests. Not for production.
    pub fn fast() -> Self {
        Self {
            memory_cost: 1024,
            time_cost: 1,
            parallelism: 1,
        }
    }
}

/// Configuration for recovery code batches.
#[derive(Clone, Debug)]
pub struct RecoveryConfig {
    /// Codes per batch (default: 10).
    pub batch_size: usize,
    /// Hashing parameters.
    pub hash: HashConfig,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            hash: HashConfig::default(),
        }
    }
}

impl RecoveryConfig {
    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    pub fn hash(mut self, hash: HashConfig) -> Self {
        self.hash = hash;
        self
    }
}

/// Generate one human-typeable recovery code (`XXXX-XXXX`).
pub fn generate_recovery_code() -> String {
    use rand::Rng;

    let mut rng = rand::rngs::OsRng;
    let mut group = |out: &mut String| {
        for _ in 0..GROUP_LENGTH {
            let idx = rng.gen_range(0..CHARSET.len());
            out.push(CHARSET[idx] as char);
        }
    };

    let mut code = String::with_capacity(GROUP_LENGTH * 2 + 1);
    group(&mut code);
    code.push('-');
    group(&mut code);
    code
}

/// Strip the hyphen and uppercase before hashing or comparing.
fn normalize(code: &str) -> String {
    code.replace(['-', ' '], "").to_uppercase()
}

/// The vault: generation, hashing, and single-use verification of
/// recovery codes.
pub struct RecoveryVault<S> {
    store: S,
    config: RecoveryConfig,
}

impl<S: RecoveryCodeStore> RecoveryVault<S> {
    pub fn new(store: S, config: RecoveryConfig) -> Self {
        Self { store, config }
    }

    /// Generate a fresh batch, replacing any previous one, and return the
    /// plaintext codes. This is the only time the plaintext exists.
    ///
    /// The caller must verify the subject currently has two-factor enabled
    /// before invoking this; the vault itself has no view of that flag.
    pub async fn regenerate(&self, subject_id: &str) -> Result<Vec<String>> {
        let plaintext: Vec<String> = (0..self.config.batch_size)
            .map(|_| generate_recovery_code())
            .collect();

        let mut batch = Vec::with_capacity(plaintext.len());
        for code in &plaintext {
            let hash = self.hash(&normalize(code))?;
            batch.push(RecoveryCode::new(subject_id, hash));
        }

        self.store.replace_batch(subject_id, &batch).await?;

        tracing::info!(
            target: "mfa.recovery.regenerated",
            subject_id = %subject_id,
            count = batch.len(),
            "Recovery code batch replaced"
        );

        Ok(plaintext)
    }

    /// Verify a submitted code and consume it on match.
    ///
    /// Scans the subject's unused codes with early exit; a match is marked
    /// used via compare-and-swap. A code that only matches an already-used
    /// row reports `AlreadyUsed`; no match at all reports `InvalidCode`.
    /// On no match, no state changes.
    pub async fn verify_and_consume(&self, subject_id: &str, code: &str) -> Result<()> {
        let normalized = normalize(code);
        let codes = self.store.list_codes(subject_id).await?;

        for stored in codes.iter().filter(|c| !c.is_used()) {
            if self.verify_hash(&normalized, &stored.hash)? {
                if self.store.mark_used(&stored.id, SystemTime::now()).await? {
                    return Ok(());
                }
                // Lost the race to a concurrent submission of the same code.
                return Err(FactorgateError::already_used("recovery code"));
            }
        }

        for stored in codes.iter().filter(|c| c.is_used()) {
            if self.verify_hash(&normalized, &stored.hash)? {
                return Err(FactorgateError::already_used("recovery code"));
            }
        }

        Err(FactorgateError::InvalidCode)
    }

    /// Remove every code for a subject (used when the last method is
    /// disabled).
    pub async fn purge(&self, subject_id: &str) -> Result<usize> {
        self.store.delete_all(subject_id).await
    }

    /// Codes still available to the subject.
    pub async fn remaining(&self, subject_id: &str) -> Result<usize> {
        self.store.count_unused(subject_id).await
    }

    fn hash(&self, normalized: &str) -> Result<String> {
        let salt = SaltString::generate(&mut SaltRng);
        let argon2 = self.build_argon2()?;

        argon2
            .hash_password(normalized.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| FactorgateError::internal(format!("Recovery code hashing failed: {}", e)))
    }

    fn verify_hash(&self, normalized: &str, hash: &str) -> Result<bool> {
        let parsed = PasswordHash::new(hash)
            .map_err(|e| FactorgateError::internal(format!("Invalid recovery code hash: {}", e)))?;

        // Argon2 verification is already constant-time.
        Ok(Argon2::default()
            .verify_password(normalized.as_bytes(), &parsed)
            .is_ok())
    }

    fn build_argon2(&self) -> Result<Argon2<'static>> {
        let params = Params::new(
            self.config.hash.memory_cost,
            self.config.hash.time_cost,
            self.config.hash.parallelism,
            None,
        )
        .map_err(|e| FactorgateError::internal(format!("Invalid argon2 params: {}", e)))?;

        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }
}

/// In-memory [`RecoveryCodeStore`] for development and tests.
pub mod memory {
    use super::*;
    use std::collections::HashMap;
    use std::sync::RwLock;

    /// HashMap-backed recovery code store.
    #[derive(Default)]
    pub struct InMemoryRecoveryCodeStore {
        codes: RwLock<HashMap<String, RecoveryCode>>,
    }

    impl InMemoryRecoveryCodeStore {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl RecoveryCodeStore for InMemoryRecoveryCodeStore {
        async fn replace_batch(&self, subject_id: &str, batch: &[RecoveryCode]) -> Result<()> {
            let mut codes = self.codes.write().unwrap();
            codes.retain(|_, c| c.subject_id != subject_id);
            for code in batch {
                codes.insert(code.id.clone(), code.clone());
            }
            Ok(())
        }

        async fn list_codes(&self, subject_id: &str) -> Result<Vec<RecoveryCode>> {
            let codes = self.codes.read().unwrap();
            Ok(codes
                .values()
                .filter(|c| c.subject_id == subject_id)
                .cloned()
                .collect())
        }

        async fn mark_used(&self, code_id: &str, used_at: SystemTime) -> Result<bool> {
            let mut codes = self.codes.write().unwrap();
            match codes.get_mut(code_id) {
                Some(code) if code.used_at.is_none() => {
                    code.used_at = Some(used_at);
                    Ok(true)
                }
                Some(_) => Ok(false),
                None => Ok(false),
            }
        }

        async fn delete_all(&self, subject_id: &str) -> Result<usize> {
            let mut codes = self.codes.write().unwrap();
            let before = codes.len();
            codes.retain(|_, c| c.subject_id != subject_id);
            Ok(before - codes.len())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::InMemoryRecoveryCodeStore;
    use super::*;

    fn vault() -> RecoveryVault<InMemoryRecoveryCodeStore> {
        RecoveryVault::new(
            InMemoryRecoveryCodeStore::new(),
            RecoveryConfig::default().hash(HashConfig::fast()),
        )
    }

    #[test]
    fn test_code_format() {
        for _ in 0..20 {
            let code = generate_recovery_code();
            assert_eq!(code.len(), 9);
            let (a, b) = code.split_once('-').unwrap();
            assert_eq!(a.len(), 4);
            assert_eq!(b.len(), 4);
            assert!(code
                .bytes()
                .all(|c| c == b'-' || CHARSET.contains(&c)));
        }
    }

    #[tokio::test]
    async fn test_batch_size_and_plaintext_returned_once() {
        let vault = vault();
        let codes = vault.regenerate("u1").await.unwrap();
        assert_eq!(codes.len(), 10);
        assert_eq!(vault.remaining("u1").await.unwrap(), 10);

        // Stored form is hashed, never the plaintext.
        let stored = vault.store.list_codes("u1").await.unwrap();
        for code in &codes {
            assert!(stored.iter().all(|s| s.hash != *code));
            assert!(stored.iter().all(|s| s.hash.starts_with("$argon2")));
        }
    }

    #[tokio::test]
    async fn test_code_validates_exactly_once() {
        let vault = vault();
        let codes = vault.regenerate("u1").await.unwrap();

        vault.verify_and_consume("u1", &codes[0]).await.unwrap();
        assert_eq!(vault.remaining("u1").await.unwrap(), 9);

        let err = vault.verify_and_consume("u1", &codes[0]).await.unwrap_err();
        assert!(matches!(err, FactorgateError::AlreadyUsed(_)));
    }

    #[tokio::test]
    async fn test_codes_accepted_lowercase_and_without_hyphen() {
        let vault = vault();
        let codes = vault.regenerate("u1").await.unwrap();

        let sloppy = codes[0].replace('-', "").to_lowercase();
        vault.verify_and_consume("u1", &sloppy).await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_code_rejected_without_state_change() {
        let vault = vault();
        vault.regenerate("u1").await.unwrap();

        let err = vault
            .verify_and_consume("u1", "ZZZZ-ZZZZ")
            .await
            .unwrap_err();
        assert!(matches!(err, FactorgateError::InvalidCode));
        assert_eq!(vault.remaining("u1").await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_regeneration_invalidates_previous_batch() {
        let vault = vault();
        let old = vault.regenerate("u1").await.unwrap();
        let fresh = vault.regenerate("u1").await.unwrap();

        assert_eq!(vault.remaining("u1").await.unwrap(), 10);

        let err = vault.verify_and_consume("u1", &old[0]).await.unwrap_err();
        assert!(matches!(err, FactorgateError::InvalidCode));

        vault.verify_and_consume("u1", &fresh[0]).await.unwrap();
    }

    #[tokio::test]
    async fn test_purge_removes_all() {
        let vault = vault();
        let codes = vault.regenerate("u1").await.unwrap();

        assert_eq!(vault.purge("u1").await.unwrap(), 10);
        assert_eq!(vault.remaining("u1").await.unwrap(), 0);

        let err = vault.verify_and_consume("u1", &codes[0]).await.unwrap_err();
        assert!(matches!(err, FactorgateError::InvalidCode));
    }

    #[tokio::test]
    async fn test_mark_used_is_compare_and_swap() {
        let store = InMemoryRecoveryCodeStore::new();
        let code = RecoveryCode::new("u1", "$argon2id$fake");
        store.replace_batch("u1", &[code.clone()]).await.unwrap();

        assert!(store.mark_used(&code.id, SystemTime::now()).await.unwrap());
        assert!(!store.mark_used(&code.id, SystemTime::now()).await.unwrap());
    }
}
