//! Time-based code verifier
//!
//! Stateless verification of a rolling numeric code against a shared
//! secret. A tolerance of ±2 time steps (roughly ±60 seconds at the
//! default 30-second step) absorbs clock drift between the server and the
//! code-generator app. Replay of a still-valid code within that window is
//! not prevented here; callers wanting replay protection must track the
//! last accepted time step themselves.

use crate::error::{FactorgateError, Result};
use totp_rs::{Algorithm, Secret, TOTP};

/// Accepted clock skew in time steps on either side of "now".
const SKEW_STEPS: u8 = 2;

/// Configuration for time-based codes.
#[derive(Clone)]
pub struct TotpConfig {
    /// Issuer name shown in authenticator apps.
    pub issuer: String,
    /// Number of digits in the code (default: 6).
    pub digits: usize,
    /// Time step in seconds (default: 30).
    pub step: u64,
    /// Algorithm (default: SHA1 for authenticator-app compatibility).
    pub algorithm: Algorithm,
}

impl Default for TotpConfig {
    fn default() -> Self {
        Self {
            issuer: "App".to_string(),
            digits: 6,
            step: 30,
            algorithm: Algorithm::SHA1,
        }
    }
}

impl TotpConfig {
    /// Create a new config with the given issuer name.
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            ..Default::default()
        }
    }

    /// Set the number of digits.
    pub fn digits(mut self, digits: usize) -> Self {
        self.digits = digits;
        self
    }

    /// Set the time step in seconds.
    pub fn step(mut self, step: u64) -> Self {
        self.step = step;
        self
    }
}

/// Data returned when starting time-based enrollment.
pub struct TotpSetup {
    /// Base32-encoded secret; becomes an enabled method only after the
    /// caller round-trips a valid code.
    pub secret: String,
    /// Provisioning URI (otpauth://...) for code-generator-app enrollment.
    pub uri: String,
}

/// Stateless time-based code verifier.
#[derive(Clone)]
pub struct TotpVerifier {
    config: TotpConfig,
}

impl TotpVerifier {
    /// Create a verifier with the given configuration.
    pub fn new(config: TotpConfig) -> Self {
        Self { config }
    }

    /// Generate a fresh secret and provisioning URI for a subject.
    pub fn generate_setup(&self, account_name: &str) -> Result<TotpSetup> {
        let secret = Secret::generate_secret();
        let secret_base32 = secret.to_encoded().to_string();

        let totp = self.build_totp(&secret_base32, account_name)?;
        let uri = totp.get_url();

        Ok(TotpSetup {
            secret: secret_base32,
            uri,
        })
    }

    /// Verify a submitted code against a stored secret.
    ///
    /// Accepts codes for the current step and ±2 adjacent steps.
    pub fn verify(&self, secret: &str, code: &str, account_name: &str) -> Result<bool> {
        let totp = self.build_totp(secret, account_name)?;

        // Users paste codes with spaces or dashes; strip them.
        let code = code.replace([' ', '-'], "");

        match totp.check_current(&code) {
            Ok(valid) => Ok(valid),
            Err(e) => {
                tracing::warn!(
                    target: "mfa.totp.clock_error",
                    error = %e,
                    "Time-based verification error (system time issue?)"
                );
                // Report a plain mismatch rather than leaking why.
                Ok(false)
            }
        }
    }

    /// Verify against a specific Unix timestamp (useful for testing drift).
    pub fn verify_at(&self, secret: &str, code: &str, account_name: &str, time: u64) -> Result<bool> {
        let totp = self.build_totp(secret, account_name)?;
        let code = code.replace([' ', '-'], "");
        Ok(totp.check(&code, time))
    }

    /// Generate the code for the current time step.
    pub fn generate_current(&self, secret: &str, account_name: &str) -> Result<String> {
        let totp = self.build_totp(secret, account_name)?;
        totp.generate_current()
            .map_err(|e| FactorgateError::internal(format!("Failed to generate code: {}", e)))
    }

    /// Generate the code for a specific Unix timestamp.
    pub fn generate_at(&self, secret: &str, account_name: &str, time: u64) -> Result<String> {
        let totp = self.build_totp(secret, account_name)?;
        Ok(totp.generate(time))
    }

    fn build_totp(&self, secret: &str, account_name: &str) -> Result<TOTP> {
        TOTP::new(
            self.config.algorithm,
            self.config.digits,
            SKEW_STEPS,
            self.config.step,
            Secret::Encoded(secret.to_string())
                .to_bytes()
                .map_err(|e| FactorgateError::internal(format!("Invalid secret: {}", e)))?,
            Some(self.config.issuer.clone()),
            account_name.to_string(),
        )
        .map_err(|e| FactorgateError::internal(format!("Failed to create TOTP: {}", e)))
    }
}
