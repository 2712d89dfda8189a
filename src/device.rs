//! Trusted device registry
//!
//! Lets a subject skip the second factor on a device they have already
//! verified on. The device holds an opaque random token; the registry
//! stores only its SHA-256 hash, so a leaked registry cannot mint valid
//! tokens. Trust expires after a fixed lifetime regardless of use.

use crate::error::{FactorgateError, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::{Duration, SystemTime};

/// Raw token entropy in bytes (32 bytes, base64url-encoded for the client).
const TOKEN_BYTES: usize = 32;

/// A trusted device record. The token itself is never stored.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrustedDevice {
    pub id: String,
    pub subject_id: String,
    /// SHA-256 hex digest of the device token.
    pub token_hash: String,
    /// Optional human label ("Work laptop").
    pub label: Option<String>,
    pub created_at: SystemTime,
    pub expires_at: SystemTime,
    pub last_used_at: SystemTime,
}

impl TrustedDevice {
    pub fn is_expired(&self) -> bool {
        self.expires_at <= SystemTime::now()
    }
}

/// Trait for persisting trusted devices.
#[async_trait]
pub trait TrustedDeviceStore: Send + Sync {
    async fn insert_device(&self, device: &TrustedDevice) -> Result<()>;

    async fn find_by_token_hash(
        &self,
        subject_id: &str,
        token_hash: &str,
    ) -> Result<Option<TrustedDevice>>;

    /// All of the subject's devices, expired ones included.
    async fn list_devices(&self, subject_id: &str) -> Result<Vec<TrustedDevice>>;

    /// Record that the device was just used.
    async fn touch_device(&self, device_id: &str, used_at: SystemTime) -> Result<()>;

    /// Delete one device. Returns whether a row was removed.
    async fn delete_device(&self, subject_id: &str, device_id: &str) -> Result<bool>;

    /// Delete every device for a subject. Returns the number removed.
    async fn delete_all_devices(&self, subject_id: &str) -> Result<usize>;

    /// Delete devices whose trust has lapsed. Returns the number removed.
    async fn delete_expired(&self, now: SystemTime) -> Result<usize>;
}

/// Configuration for device trust.
#[derive(Clone, Debug)]
pub struct TrustedDeviceConfig {
    /// How long a device stays trusted (default: 30 days, not extended by
    /// use).
    pub lifetime: Duration,
    /// Maximum devices per subject; trusting one more evicts the least
    /// recently used (default: 10).
    pub max_devices: usize,
}

impl Default for TrustedDeviceConfig {
    fn default() -> Self {
        Self {
            lifetime: Duration::from_secs(30 * 24 * 60 * 60),
            max_devices: 10,
        }
    }
}

impl TrustedDeviceConfig {
    pub fn lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = lifetime;
        self
    }

    pub fn max_devices(mut self, max: usize) -> Self {
        self.max_devices = max;
        self
    }
}

/// Issued when a device is trusted; the token goes to the client, the
/// record stays server-side.
pub struct DeviceTrust {
    /// Opaque token for the client to present later (e.g. in a cookie).
    pub token: String,
    pub device: TrustedDevice,
}

/// Registry over a [`TrustedDeviceStore`]: issues tokens, verifies them,
/// and enforces the per-subject device cap.
pub struct TrustedDeviceRegistry<S> {
    store: S,
    config: TrustedDeviceConfig,
}

impl<S: TrustedDeviceStore> TrustedDeviceRegistry<S> {
    pub fn new(store: S, config: TrustedDeviceConfig) -> Self {
        Self { store, config }
    }

    /// Trust the current device and return its token.
    ///
    /// If the subject is at the device cap, the least recently used device
    /// is evicted first.
    pub async fn trust(&self, subject_id: &str, label: Option<&str>) -> Result<DeviceTrust> {
        let mut devices = self.store.list_devices(subject_id).await?;
        devices.retain(|d| !d.is_expired());

        if devices.len() >= self.config.max_devices {
            devices.sort_by_key(|d| d.last_used_at);
            let evict = devices.len() + 1 - self.config.max_devices;
            for device in devices.iter().take(evict) {
                self.store.delete_device(subject_id, &device.id).await?;
                tracing::debug!(
                    target: "mfa.trusted_device.evicted",
                    subject_id = %subject_id,
                    device_id = %device.id,
                    "Evicted least recently used trusted device"
                );
            }
        }

        let token = generate_token();
        let now = SystemTime::now();
        let device = TrustedDevice {
            id: uuid::Uuid::new_v4().to_string(),
            subject_id: subject_id.to_string(),
            token_hash: hash_token(&token),
            label: label.map(|l| l.to_string()),
            created_at: now,
            expires_at: now + self.config.lifetime,
            last_used_at: now,
        };

        self.store.insert_device(&device).await?;

        tracing::info!(
            target: "mfa.trusted_device.trusted",
            subject_id = %subject_id,
            device_id = %device.id,
            "Device trusted"
        );

        Ok(DeviceTrust { token, device })
    }

    /// Check whether a presented token identifies a live trusted device.
    ///
    /// An expired record is deleted on sight; a live one has its
    /// `last_used_at` refreshed (use never extends `expires_at`).
    pub async fn verify(&self, subject_id: &str, token: &str) -> Result<bool> {
        let hash = hash_token(token);

        let Some(device) = self.store.find_by_token_hash(subject_id, &hash).await? else {
            return Ok(false);
        };

        if device.is_expired() {
            self.store.delete_device(subject_id, &device.id).await?;
            tracing::debug!(
                target: "mfa.trusted_device.expired",
                subject_id = %subject_id,
                device_id = %device.id,
                "Removed expired trusted device"
            );
            return Ok(false);
        }

        self.store.touch_device(&device.id, SystemTime::now()).await?;
        Ok(true)
    }

    /// The subject's current (non-expired) devices.
    pub async fn list(&self, subject_id: &str) -> Result<Vec<TrustedDevice>> {
        let mut devices = self.store.list_devices(subject_id).await?;
        devices.retain(|d| !d.is_expired());
        devices.sort_by(|a, b| b.last_used_at.cmp(&a.last_used_at));
        Ok(devices)
    }

    /// Revoke one device.
    pub async fn revoke(&self, subject_id: &str, device_id: &str) -> Result<()> {
        if !self.store.delete_device(subject_id, device_id).await? {
            return Err(FactorgateError::not_found("trusted device"));
        }

        tracing::info!(
            target: "mfa.trusted_device.revoked",
            subject_id = %subject_id,
            device_id = %device_id,
            "Device trust revoked"
        );
        Ok(())
    }

    /// Revoke all of the subject's devices. Returns the number revoked.
    pub async fn revoke_all(&self, subject_id: &str) -> Result<usize> {
        let count = self.store.delete_all_devices(subject_id).await?;

        tracing::info!(
            target: "mfa.trusted_device.revoked_all",
            subject_id = %subject_id,
            count = count,
            "All device trust revoked"
        );
        Ok(count)
    }

    /// Sweep expired records. Intended for a periodic maintenance task.
    pub async fn purge_expired(&self) -> Result<usize> {
        let count = self.store.delete_expired(SystemTime::now()).await?;
        if count > 0 {
            tracing::debug!(
                target: "mfa.trusted_device.purged",
                count = count,
                "Purged expired trusted devices"
            );
        }
        Ok(count)
    }
}

fn generate_token() -> String {
    use rand::RngCore;

    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// In-memory [`TrustedDeviceStore`] for development and tests.
pub mod memory {
    use super::*;
    use std::collections::HashMap;
    use std::sync::RwLock;

    /// HashMap-backed trusted device store.
    #[derive(Default)]
    pub struct InMemoryTrustedDeviceStore {
        devices: RwLock<HashMap<String, TrustedDevice>>,
    }

    impl InMemoryTrustedDeviceStore {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl TrustedDeviceStore for InMemoryTrustedDeviceStore {
        async fn insert_device(&self, device: &TrustedDevice) -> Result<()> {
            self.devices
                .write()
                .unwrap()
                .insert(device.id.clone(), device.clone());
            Ok(())
        }

        async fn find_by_token_hash(
            &self,
            subject_id: &str,
            token_hash: &str,
        ) -> Result<Option<TrustedDevice>> {
            let devices = self.devices.read().unwrap();
            Ok(devices
                .values()
                .find(|d| d.subject_id == subject_id && d.token_hash == token_hash)
                .cloned())
        }

        async fn list_devices(&self, subject_id: &str) -> Result<Vec<TrustedDevice>> {
            let devices = self.devices.read().unwrap();
            Ok(devices
                .values()
                .filter(|d| d.subject_id == subject_id)
                .cloned()
                .collect())
        }

        async fn touch_device(&self, device_id: &str, used_at: SystemTime) -> Result<()> {
            let mut devices = self.devices.write().unwrap();
            if let Some(device) = devices.get_mut(device_id) {
                device.last_used_at = used_at;
            }
            Ok(())
        }

        async fn delete_device(&self, subject_id: &str, device_id: &str) -> Result<bool> {
            let mut devices = self.devices.write().unwrap();
            match devices.get(device_id) {
                Some(d) if d.subject_id == subject_id => {
                    devices.remove(device_id);
                    Ok(true)
                }
                _ => Ok(false),
            }
        }

        async fn delete_all_devices(&self, subject_id: &str) -> Result<usize> {
            let mut devices = self.devices.write().unwrap();
            let before = devices.len();
            devices.retain(|_, d| d.subject_id != subject_id);
            Ok(before - devices.len())
        }

        async fn delete_expired(&self, now: SystemTime) -> Result<usize> {
            let mut devices = self.devices.write().unwrap();
            let before = devices.len();
            devices.retain(|_, d| d.expires_at > now);
            Ok(before - devices.len())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::InMemoryTrustedDeviceStore;
    use super::*;

    fn registry() -> TrustedDeviceRegistry<InMemoryTrustedDeviceStore> {
        TrustedDeviceRegistry::new(
            InMemoryTrustedDeviceStore::new(),
            TrustedDeviceConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_trust_and_verify() {
        let registry = registry();
        let trust = registry.trust("u1", Some("Work laptop")).await.unwrap();

        assert!(registry.verify("u1", &trust.token).await.unwrap());
        // Another subject cannot use the token.
        assert!(!registry.verify("u2", &trust.token).await.unwrap());
    }

    #[tokio::test]
    async fn test_token_not_stored_in_plaintext() {
        let registry = registry();
        let trust = registry.trust("u1", None).await.unwrap();

        let devices = registry.store.list_devices("u1").await.unwrap();
        assert_eq!(devices.len(), 1);
        assert_ne!(devices[0].token_hash, trust.token);
        assert_eq!(devices[0].token_hash.len(), 64);
    }

    #[tokio::test]
    async fn test_unknown_token_rejected() {
        let registry = registry();
        registry.trust("u1", None).await.unwrap();

        assert!(!registry.verify("u1", "bogus-token").await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_device_rejected_and_deleted() {
        let registry = TrustedDeviceRegistry::new(
            InMemoryTrustedDeviceStore::new(),
            TrustedDeviceConfig::default().lifetime(Duration::ZERO),
        );

        let trust = registry.trust("u1", None).await.unwrap();
        assert!(!registry.verify("u1", &trust.token).await.unwrap());

        // Lazy-deleted on the failed verify.
        let devices = registry.store.list_devices("u1").await.unwrap();
        assert!(devices.is_empty());
    }

    #[tokio::test]
    async fn test_device_cap_evicts_least_recently_used() {
        let registry = TrustedDeviceRegistry::new(
            InMemoryTrustedDeviceStore::new(),
            TrustedDeviceConfig::default().max_devices(2),
        );

        let first = registry.trust("u1", Some("first")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = registry.trust("u1", Some("second")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        // Use the first device so the second becomes the LRU.
        assert!(registry.verify("u1", &first.token).await.unwrap());

        let third = registry.trust("u1", Some("third")).await.unwrap();

        assert!(registry.verify("u1", &first.token).await.unwrap());
        assert!(!registry.verify("u1", &second.token).await.unwrap());
        assert!(registry.verify("u1", &third.token).await.unwrap());
    }

    #[tokio::test]
    async fn test_revoke_single_device() {
        let registry = registry();
        let trust = registry.trust("u1", None).await.unwrap();

        registry.revoke("u1", &trust.device.id).await.unwrap();
        assert!(!registry.verify("u1", &trust.token).await.unwrap());

        let err = registry.revoke("u1", &trust.device.id).await.unwrap_err();
        assert!(matches!(err, FactorgateError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_revoke_all() {
        let registry = registry();
        let a = registry.trust("u1", None).await.unwrap();
        let b = registry.trust("u1", None).await.unwrap();
        let other = registry.trust("u2", None).await.unwrap();

        assert_eq!(registry.revoke_all("u1").await.unwrap(), 2);
        assert!(!registry.verify("u1", &a.token).await.unwrap());
        assert!(!registry.verify("u1", &b.token).await.unwrap());
        assert!(registry.verify("u2", &other.token).await.unwrap());
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let registry = TrustedDeviceRegistry::new(
            InMemoryTrustedDeviceStore::new(),
            TrustedDeviceConfig::default().lifetime(Duration::ZERO),
        );
        registry.trust("u1", None).await.unwrap();
        registry.trust("u1", None).await.unwrap();

        assert_eq!(registry.purge_expired().await.unwrap(), 2);
        assert!(registry.list("u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_excludes_expired() {
        let registry = registry();
        registry.trust("u1", Some("laptop")).await.unwrap();

        let devices = registry.list("u1").await.unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].label.as_deref(), Some("laptop"));
    }
}
