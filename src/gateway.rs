//! Code delivery gateways
//!
//! The engine hands a destination and a plaintext code to a
//! [`CodeGateway`] and cares only about success or failure; SMS providers,
//! SMTP relays, and test doubles all live behind this trait.

use crate::error::Result;
use async_trait::async_trait;

/// Trait for delivering one-time codes out of band.
#[async_trait]
pub trait CodeGateway: Send + Sync {
    /// Deliver a code to a destination (phone number or email address).
    async fn send_code(&self, destination: &str, code: &str) -> Result<()>;

    /// Whether the gateway is reachable. Defaults to healthy; providers
    /// with a ping endpoint should override.
    async fn is_healthy(&self) -> bool {
        true
    }
}

/// Gateway that logs deliveries instead of sending them. For development.
///
/// The code is printed in full (you need it to log in); the destination is
/// redacted so logs do not accumulate contact details.
#[derive(Clone, Default)]
pub struct ConsoleGateway;

impl ConsoleGateway {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CodeGateway for ConsoleGateway {
    async fn send_code(&self, destination: &str, code: &str) -> Result<()> {
        tracing::info!(
            target: "mfa.gateway.console",
            destination = %redact(destination),
            code = %code,
            "Verification code (console delivery)"
        );

        println!("=== Verification code ===");
        println!("To:   {}", redact(destination));
        println!("Code: {}", code);
        println!("=========================");

        Ok(())
    }
}

/// Keep just enough of the destination to recognize it.
fn redact(destination: &str) -> String {
    if let Some((local, domain)) = destination.split_once('@') {
        let head: String = local.chars().take(2).collect();
        return format!("{}***@{}", head, domain);
    }

    let visible = 4.min(destination.len());
    let hidden = destination.len() - visible;
    format!("{}{}", "*".repeat(hidden), &destination[destination.len() - visible..])
}

/// Test doubles.
pub mod test {
    use super::*;
    use crate::error::FactorgateError;
    use std::sync::Mutex;

    /// Records every send for later assertions.
    #[derive(Default)]
    pub struct RecordingGateway {
        sent: Mutex<Vec<(String, String)>>,
    }

    impl RecordingGateway {
        pub fn new() -> Self {
            Self::default()
        }

        /// `(destination, code)` pairs in send order.
        pub fn sent(&self) -> Vec<(String, String)> {
            self.sent.lock().unwrap().clone()
        }

        /// The most recently sent code, if any.
        pub fn last_code(&self) -> Option<String> {
            self.sent.lock().unwrap().last().map(|(_, c)| c.clone())
        }
    }

    #[async_trait]
    impl CodeGateway for RecordingGateway {
        async fn send_code(&self, destination: &str, code: &str) -> Result<()> {
            self.sent
                .lock()
                .unwrap()
                .push((destination.to_string(), code.to_string()));
            Ok(())
        }
    }

    /// Always fails, for exercising delivery-error paths.
    #[derive(Default)]
    pub struct FailingGateway;

    #[async_trait]
    impl CodeGateway for FailingGateway {
        async fn send_code(&self, _destination: &str, _code: &str) -> Result<()> {
            Err(FactorgateError::delivery_failure("provider unavailable"))
        }

        async fn is_healthy(&self) -> bool {
            false
        }
    }
}
