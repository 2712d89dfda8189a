//! Persistent second-factor method storage.
//!
//! The engine never talks to a database directly; implement [`MethodStore`]
//! for your persistence layer. Implementations must provide
//! read-your-writes consistency within a request, and
//! `set_two_factor_enabled` must land in the same transaction as the method
//! change that caused it where the backend supports transactions.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// The kind of second factor a method provides.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MethodKind {
    /// Code derived from a shared secret and the current time step.
    TimeBased,
    /// Code delivered over SMS.
    Sms,
    /// Code delivered over email.
    Email,
}

impl std::fmt::Display for MethodKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TimeBased => write!(f, "totp"),
            Self::Sms => write!(f, "sms"),
            Self::Email => write!(f, "email"),
        }
    }
}

/// Method-specific binding data.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MethodBinding {
    /// Base32 shared secret for the time-based verifier.
    TimeBased { secret: String },
    /// Destination phone number.
    Sms { phone: String },
    /// Destination email address.
    Email { address: String },
}

impl MethodBinding {
    pub fn kind(&self) -> MethodKind {
        match self {
            Self::TimeBased { .. } => MethodKind::TimeBased,
            Self::Sms { .. } => MethodKind::Sms,
            Self::Email { .. } => MethodKind::Email,
        }
    }

    /// The delivery destination, if this binding has one.
    pub fn destination(&self) -> Option<&str> {
        match self {
            Self::TimeBased { .. } => None,
            Self::Sms { phone } => Some(phone),
            Self::Email { address } => Some(address),
        }
    }
}

/// A second-factor method owned by a subject.
///
/// A subject may hold multiple enabled methods at once; any one of them
/// verifying satisfies a pending session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SecondFactorMethod {
    pub id: String,
    pub subject_id: String,
    pub binding: MethodBinding,
    /// Enabled methods participate in verification; disabled ones are
    /// pending enrollment.
    pub enabled: bool,
    /// When the owner proved control of this method.
    pub verified_at: Option<SystemTime>,
}

impl SecondFactorMethod {
    /// Create a pending (not yet enabled) method.
    pub fn pending(subject_id: impl Into<String>, binding: MethodBinding) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            subject_id: subject_id.into(),
            binding,
            enabled: false,
            verified_at: None,
        }
    }

    pub fn kind(&self) -> MethodKind {
        self.binding.kind()
    }
}

/// Trait for persisting second-factor methods and the subject's
/// two-factor-enabled flag.
///
/// The flag is derived state: it must be true iff the subject has at least
/// one enabled method. The engine maintains it through
/// `set_two_factor_enabled` on every enable/disable transition.
#[async_trait]
pub trait MethodStore: Send + Sync {
    /// Insert a new method row.
    async fn insert_method(&self, method: &SecondFactorMethod) -> Result<()>;

    /// Find one of the subject's methods by id.
    async fn find_method(
        &self,
        subject_id: &str,
        method_id: &str,
    ) -> Result<Option<SecondFactorMethod>>;

    /// All methods for a subject, enabled or pending.
    async fn list_methods(&self, subject_id: &str) -> Result<Vec<SecondFactorMethod>>;

    /// Only the subject's enabled methods.
    async fn list_enabled_methods(&self, subject_id: &str) -> Result<Vec<SecondFactorMethod>> {
        Ok(self
            .list_methods(subject_id)
            .await?
            .into_iter()
            .filter(|m| m.enabled)
            .collect())
    }

    /// The subject's methods of one kind (used to replace a prior
    /// time-based method on re-enrollment).
    async fn find_by_kind(
        &self,
        subject_id: &str,
        kind: MethodKind,
    ) -> Result<Vec<SecondFactorMethod>> {
        Ok(self
            .list_methods(subject_id)
            .await?
            .into_iter()
            .filter(|m| m.kind() == kind)
            .collect())
    }

    /// Mark a method enabled with its verification timestamp.
    async fn enable_method(
        &self,
        subject_id: &str,
        method_id: &str,
        verified_at: SystemTime,
    ) -> Result<()>;

    /// Delete a method row. Returns whether a row was removed.
    async fn delete_method(&self, subject_id: &str, method_id: &str) -> Result<bool>;

    /// Set the subject's two-factor-enabled flag.
    async fn set_two_factor_enabled(&self, subject_id: &str, enabled: bool) -> Result<()>;

    /// Read the subject's two-factor-enabled flag.
    async fn is_two_factor_enabled(&self, subject_id: &str) -> Result<bool>;
}

/// In-memory [`MethodStore`] for development and tests.
pub mod memory {
    use super::*;
    use std::collections::HashMap;
    use std::sync::RwLock;

    /// HashMap-backed method store.
    #[derive(Default)]
    pub struct InMemoryMethodStore {
        methods: RwLock<HashMap<String, SecondFactorMethod>>,
        flags: RwLock<HashMap<String, bool>>,
    }

    impl InMemoryMethodStore {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl MethodStore for InMemoryMethodStore {
        async fn insert_method(&self, method: &SecondFactorMethod) -> Result<()> {
            self.methods
                .write()
                .unwrap()
                .insert(method.id.clone(), method.clone());
            Ok(())
        }

        async fn find_method(
            &self,
            subject_id: &str,
            method_id: &str,
        ) -> Result<Option<SecondFactorMethod>> {
            let methods = self.methods.read().unwrap();
            Ok(methods
                .get(method_id)
                .filter(|m| m.subject_id == subject_id)
                .cloned())
        }

        async fn list_methods(&self, subject_id: &str) -> Result<Vec<SecondFactorMethod>> {
            let methods = self.methods.read().unwrap();
            let mut result: Vec<_> = methods
                .values()
                .filter(|m| m.subject_id == subject_id)
                .cloned()
                .collect();
            result.sort_by(|a, b| a.id.cmp(&b.id));
            Ok(result)
        }

        async fn enable_method(
            &self,
            subject_id: &str,
            method_id: &str,
            verified_at: SystemTime,
        ) -> Result<()> {
            let mut methods = self.methods.write().unwrap();
            if let Some(method) = methods
                .get_mut(method_id)
                .filter(|m| m.subject_id == subject_id)
            {
                method.enabled = true;
                method.verified_at = Some(verified_at);
            }
            Ok(())
        }

        async fn delete_method(&self, subject_id: &str, method_id: &str) -> Result<bool> {
            let mut methods = self.methods.write().unwrap();
            match methods.get(method_id) {
                Some(m) if m.subject_id == subject_id => {
                    methods.remove(method_id);
                    Ok(true)
                }
                _ => Ok(false),
            }
        }

        async fn set_two_factor_enabled(&self, subject_id: &str, enabled: bool) -> Result<()> {
            self.flags
                .write()
                .unwrap()
                .insert(subject_id.to_string(), enabled);
            Ok(())
        }

        async fn is_two_factor_enabled(&self, subject_id: &str) -> Result<bool> {
            Ok(self
                .flags
                .read()
                .unwrap()
                .get(subject_id)
                .copied()
                .unwrap_or(false))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::InMemoryMethodStore;
    use super::*;

    #[test]
    fn test_binding_kind_and_destination() {
        let sms = MethodBinding::Sms {
            phone: "+15551234".into(),
        };
        assert_eq!(sms.kind(), MethodKind::Sms);
        assert_eq!(sms.destination(), Some("+15551234"));

        let totp = MethodBinding::TimeBased {
            secret: "JBSWY3DP".into(),
        };
        assert_eq!(totp.kind(), MethodKind::TimeBased);
        assert_eq!(totp.destination(), None);
    }

    #[tokio::test]
    async fn test_insert_enable_list() {
        let store = InMemoryMethodStore::new();
        let method = SecondFactorMethod::pending(
            "u1",
            MethodBinding::Email {
                address: "user@example.com".into(),
            },
        );
        store.insert_method(&method).await.unwrap();

        assert!(store.list_enabled_methods("u1").await.unwrap().is_empty());

        store
            .enable_method("u1", &method.id, SystemTime::now())
            .await
            .unwrap();

        let enabled = store.list_enabled_methods("u1").await.unwrap();
        assert_eq!(enabled.len(), 1);
        assert!(enabled[0].verified_at.is_some());
    }

    #[tokio::test]
    async fn test_find_method_scoped_to_subject() {
        let store = InMemoryMethodStore::new();
        let method = SecondFactorMethod::pending(
            "u1",
            MethodBinding::Sms {
                phone: "+15551234".into(),
            },
        );
        store.insert_method(&method).await.unwrap();

        assert!(store.find_method("u1", &method.id).await.unwrap().is_some());
        assert!(store.find_method("u2", &method.id).await.unwrap().is_none());
        assert!(!store.delete_method("u2", &method.id).await.unwrap());
        assert!(store.delete_method("u1", &method.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_two_factor_flag_defaults_false() {
        let store = InMemoryMethodStore::new();
        assert!(!store.is_two_factor_enabled("u1").await.unwrap());

        store.set_two_factor_enabled("u1", true).await.unwrap();
        assert!(store.is_two_factor_enabled("u1").await.unwrap());
    }

    #[tokio::test]
    async fn test_find_by_kind() {
        let store = InMemoryMethodStore::new();
        store
            .insert_method(&SecondFactorMethod::pending(
                "u1",
                MethodBinding::TimeBased {
                    secret: "AAA".into(),
                },
            ))
            .await
            .unwrap();
        store
            .insert_method(&SecondFactorMethod::pending(
                "u1",
                MethodBinding::Sms {
                    phone: "+1555".into(),
                },
            ))
            .await
            .unwrap();

        let totp = store.find_by_kind("u1", MethodKind::TimeBased).await.unwrap();
        assert_eq!(totp.len(), 1);
        assert_eq!(totp[0].kind(), MethodKind::TimeBased);
    }
}
