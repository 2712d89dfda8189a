//! Factorgate: a two-factor verification engine.
//!
//! Everything between "password accepted" and "fully signed in": pending
//! verification sessions, one-time codes over SMS/email, authenticator-app
//! (time-based) codes, single-use recovery codes, and trusted devices that
//! skip the second factor.
//!
//! # Features
//!
//! - **Sessions**: short-lived signed tokens bridging the two factors
//! - **Delivered codes**: expiring numeric codes with attempt ceilings and
//!   resend rate limits
//! - **Time-based codes**: authenticator-app enrollment and verification
//! - **Recovery codes**: hashed, single-use batches
//! - **Trusted devices**: hashed opaque tokens with fixed-lifetime trust
//! - **Storage**: bring your own stores, or use the bundled in-memory ones
//!   (Redis for the ephemeral store behind the `redis-store` feature)
//!
//! # Quick start
//!
//! ```rust,no_run
//! use factorgate::{
//!     ConsoleGateway, EngineConfig, VerificationEngine,
//!     InMemoryMethodStore, InMemoryOtpStore, InMemoryRecoveryCodeStore,
//!     InMemoryTrustedDeviceStore,
//! };
//! use std::sync::Arc;
//!
//! # struct MyIssuer;
//! # #[async_trait::async_trait]
//! # impl factorgate::CredentialIssuer for MyIssuer {
//! #     async fn issue(&self, _: &str) -> factorgate::Result<factorgate::Credentials> {
//! #         unimplemented!()
//! #     }
//! # }
//! #[tokio::main]
//! async fn main() {
//!     factorgate::init_tracing();
//!
//!     let engine = VerificationEngine::new(
//!         b"a-32-byte-minimum-signing-secret",
//!         InMemoryMethodStore::new(),
//!         InMemoryOtpStore::default(),
//!         InMemoryRecoveryCodeStore::new(),
//!         InMemoryTrustedDeviceStore::new(),
//!         MyIssuer,
//!         EngineConfig::new("MyApp"),
//!     )
//!     .sms_gateway(Arc::new(ConsoleGateway::new()));
//!
//!     let _ = engine.begin_verification("user-1", None).await;
//! }
//! ```

pub mod device;
pub mod engine;
pub mod error;
pub mod events;
pub mod gateway;
pub mod recovery;
pub mod session;
pub mod storage;
pub mod store;
pub mod totp;

pub use device::{
    memory::InMemoryTrustedDeviceStore, DeviceTrust, TrustedDevice, TrustedDeviceConfig,
    TrustedDeviceRegistry, TrustedDeviceStore,
};
pub use engine::{
    BeginOutcome, CredentialIssuer, Credentials, EngineConfig, TotpEnrollment, TrustRequest,
    VerificationEngine, VerifyOutcome,
};
pub use error::{FactorgateError, Result};
pub use events::{ChannelSink, Event, EventKind, EventSink, NullSink};
pub use gateway::{CodeGateway, ConsoleGateway};
pub use recovery::{
    memory::InMemoryRecoveryCodeStore, HashConfig, RecoveryCode, RecoveryCodeStore,
    RecoveryConfig, RecoveryVault,
};
pub use session::SessionSigner;
pub use storage::{
    memory::InMemoryMethodStore, MethodBinding, MethodKind, MethodStore, SecondFactorMethod,
};
pub use store::{InMemoryOtpStore, OtpRecord, OtpStore};
#[cfg(feature = "redis-store")]
pub use store::RedisOtpStore;
pub use totp::{TotpConfig, TotpSetup, TotpVerifier};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing/logging with sensible defaults.
///
/// Call early, typically in `main()` before constructing the engine.
///
/// # Environment Variables
///
/// - `RUST_LOG`: set log level (e.g. "info", "debug", "factorgate=debug")
/// - `FACTORGATE_LOG_JSON`: set to "true" for JSON formatted logs
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let json_logs = std::env::var("FACTORGATE_LOG_JSON")
        .map(|v| v.parse::<bool>().unwrap_or(false))
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}
