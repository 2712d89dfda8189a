//! Pending verification sessions
//!
//! A pending session is the window between a successful first factor and a
//! successful second factor. It is represented as a short-lived signed
//! token so it can cross process boundaries without server-side state; the
//! signature binds the subject and a fixed purpose claim so a session
//! token can never pass for anything else.

use crate::error::{FactorgateError, Result};
use jsonwebtoken::{encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Purpose claim value; tokens with any other purpose are rejected.
const SESSION_PURPOSE: &str = "2fa-pending";

/// Claims carried by a pending session token.
#[derive(Debug, Serialize, Deserialize)]
struct SessionClaims {
    /// Subject awaiting second-factor verification.
    sub: String,
    /// Fixed purpose discriminator.
    purpose: String,
    /// Issued-at (Unix seconds).
    iat: u64,
    /// Expiry (Unix seconds).
    exp: u64,
}

/// Issues and validates pending session tokens (HS256).
#[derive(Clone)]
pub struct SessionSigner {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
}

impl SessionSigner {
    /// Create a signer from a shared secret.
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a pending session token for a subject.
    pub fn issue(&self, subject_id: &str) -> Result<String> {
        let now = unix_now()?;

        let claims = SessionClaims {
            sub: subject_id.to_string(),
            purpose: SESSION_PURPOSE.to_string(),
            iat: now,
            exp: now + self.ttl.as_secs(),
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| FactorgateError::internal(format!("Failed to sign session token: {}", e)))
    }

    /// Validate a session token and return the subject it was issued for.
    ///
    /// Expired, tampered, or wrong-purpose tokens all report the same
    /// `InvalidSession`; the caller learns nothing about which check failed.
    pub fn decode(&self, token: &str) -> Result<String> {
        let mut validation = Validation::default();
        validation.leeway = 0;

        let data = jsonwebtoken::decode::<SessionClaims>(token, &self.decoding_key, &validation)
            .map_err(|_| FactorgateError::invalid_session("session token rejected"))?;

        if data.claims.purpose != SESSION_PURPOSE {
            return Err(FactorgateError::invalid_session("wrong token purpose"));
        }

        // The library treats `exp == now` as still valid; a token at its
        // exact boundary is expired here.
        if data.claims.exp <= unix_now()? {
            return Err(FactorgateError::invalid_session("session expired"));
        }

        Ok(data.claims.sub)
    }
}

fn unix_now() -> Result<u64> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|e| FactorgateError::internal(format!("System clock before Unix epoch: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> SessionSigner {
        SessionSigner::new(b"test-secret-at-least-32-bytes-long!", Duration::from_secs(300))
    }

    #[test]
    fn test_issue_and_decode() {
        let signer = signer();
        let token = signer.issue("user-1").unwrap();
        assert_eq!(signer.decode(&token).unwrap(), "user-1");
    }

    #[test]
    fn test_tampered_token_rejected() {
        let signer = signer();
        let token = signer.issue("user-1").unwrap();
        let mut tampered = token.clone();
        tampered.push('x');

        let err = signer.decode(&tampered).unwrap_err();
        assert!(matches!(err, FactorgateError::InvalidSession(_)));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let signer = signer();
        let other = SessionSigner::new(b"a-different-secret-entirely-here!!", Duration::from_secs(300));

        let token = signer.issue("user-1").unwrap();
        assert!(other.decode(&token).is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        // Zero TTL makes the token expired the moment it is issued.
        let signer = SessionSigner::new(b"test-secret-at-least-32-bytes-long!", Duration::ZERO);
        let token = signer.issue("user-1").unwrap();

        let err = signer.decode(&token).unwrap_err();
        assert!(matches!(err, FactorgateError::InvalidSession(_)));
    }

    #[test]
    fn test_wrong_purpose_rejected() {
        let secret = b"test-secret-at-least-32-bytes-long!";
        let claims = SessionClaims {
            sub: "user-1".into(),
            purpose: "password-reset".into(),
            iat: unix_now().unwrap(),
            exp: unix_now().unwrap() + 300,
        };
        let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(secret)).unwrap();

        let signer = SessionSigner::new(secret, Duration::from_secs(300));
        let err = signer.decode(&token).unwrap_err();
        assert!(matches!(err, FactorgateError::InvalidSession(_)));
    }

    #[test]
    fn test_garbage_token_rejected() {
        let signer = signer();
        assert!(signer.decode("not-a-token").is_err());
        assert!(signer.decode("").is_err());
    }
}
