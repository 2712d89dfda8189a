//! Verification engine
//!
//! Ties the pieces together: pending sessions, code delivery and checking,
//! time-based verification, recovery codes, and trusted devices. The
//! engine is generic over its storage traits so hosts can plug in their
//! own persistence; the bundled in-memory stores cover development and
//! tests.

use crate::device::{TrustedDevice, TrustedDeviceConfig, TrustedDeviceRegistry, TrustedDeviceStore};
use crate::error::{FactorgateError, Result};
use crate::events::{Event, EventKind, EventSink, NullSink};
use crate::gateway::CodeGateway;
use crate::recovery::{RecoveryCodeStore, RecoveryConfig, RecoveryVault};
use crate::session::SessionSigner;
use crate::storage::{MethodBinding, MethodKind, MethodStore, SecondFactorMethod};
use crate::store::{code_key, generate_numeric_code, rate_key, OtpRecord, OtpStore};
use crate::totp::{TotpConfig, TotpVerifier};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Credentials issued once verification completes. What they contain is
/// the host's business; the engine just hands them through.
#[derive(Clone, Debug)]
pub struct Credentials {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
}

/// Issues the host application's credentials for a fully verified subject.
#[async_trait::async_trait]
pub trait CredentialIssuer: Send + Sync {
    async fn issue(&self, subject_id: &str) -> Result<Credentials>;
}

/// Engine tuning knobs. Defaults follow common practice for login codes.
#[derive(Clone)]
pub struct EngineConfig {
    /// Issuer name (shows up in authenticator apps).
    pub issuer: String,
    /// Pending session lifetime (default: 5 minutes).
    pub session_ttl: Duration,
    /// Digits per delivered code (default: 6).
    pub code_length: usize,
    /// Delivered code lifetime (default: 5 minutes).
    pub code_ttl: Duration,
    /// Failed attempts before a delivered code is invalidated (default: 5).
    pub max_attempts: u32,
    /// Sends allowed per method per window (default: 3).
    pub resend_limit: u32,
    /// Resend window (default: 1 hour).
    pub resend_window: Duration,
    /// Code submissions allowed per subject per window (default: 10).
    pub verify_limit: u32,
    /// Verify window (default: 1 hour).
    pub verify_window: Duration,
    /// Ceiling on a single gateway delivery (default: 10 seconds).
    pub gateway_timeout: Duration,
    pub totp: TotpConfig,
    pub recovery: RecoveryConfig,
    pub device: TrustedDeviceConfig,
}

impl EngineConfig {
    pub fn new(issuer: impl Into<String>) -> Self {
        let issuer = issuer.into();
        Self {
            totp: TotpConfig::new(issuer.clone()),
            issuer,
            session_ttl: Duration::from_secs(300),
            code_length: 6,
            code_ttl: Duration::from_secs(300),
            max_attempts: 5,
            resend_limit: 3,
            resend_window: Duration::from_secs(3600),
            verify_limit: 10,
            verify_window: Duration::from_secs(3600),
            gateway_timeout: Duration::from_secs(10),
            recovery: RecoveryConfig::default(),
            device: TrustedDeviceConfig::default(),
        }
    }

    pub fn session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    pub fn code_ttl(mut self, ttl: Duration) -> Self {
        self.code_ttl = ttl;
        self
    }

    pub fn code_length(mut self, length: usize) -> Self {
        self.code_length = length;
        self
    }

    pub fn max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = max;
        self
    }

    pub fn resend_limit(mut self, max: u32, window: Duration) -> Self {
        self.resend_limit = max;
        self.resend_window = window;
        self
    }

    pub fn verify_limit(mut self, max: u32, window: Duration) -> Self {
        self.verify_limit = max;
        self.verify_window = window;
        self
    }

    pub fn recovery(mut self, recovery: RecoveryConfig) -> Self {
        self.recovery = recovery;
        self
    }

    pub fn device(mut self, device: TrustedDeviceConfig) -> Self {
        self.device = device;
        self
    }
}

/// Result of opening a verification for a subject.
#[derive(Debug)]
pub enum BeginOutcome {
    /// The presented device token matched a live trusted device; no second
    /// factor is needed.
    Trusted(Credentials),
    /// A second factor is required.
    Pending {
        /// Signed session token to carry through `submit_code` / `resend`.
        session_token: String,
        /// The subject's enabled methods, for the caller's method picker.
        methods: Vec<SecondFactorMethod>,
    },
}

/// Request to trust the current device alongside a successful verification.
#[derive(Default)]
pub struct TrustRequest {
    pub label: Option<String>,
}

/// Result of a successful code or recovery submission.
#[derive(Debug)]
pub struct VerifyOutcome {
    pub credentials: Credentials,
    /// Present when a `TrustRequest` accompanied the submission.
    pub trusted_device_token: Option<String>,
}

/// Data for finishing time-based enrollment.
pub struct TotpEnrollment {
    pub method_id: String,
    /// Base32 secret to show once alongside the QR code.
    pub secret: String,
    /// otpauth:// provisioning URI.
    pub uri: String,
}

/// The two-factor verification engine.
pub struct VerificationEngine<M, R, D, O, C> {
    methods: M,
    otp: O,
    vault: RecoveryVault<R>,
    devices: TrustedDeviceRegistry<D>,
    totp: TotpVerifier,
    sessions: SessionSigner,
    credentials: C,
    sms_gateway: Option<Arc<dyn CodeGateway>>,
    email_gateway: Option<Arc<dyn CodeGateway>>,
    events: Arc<dyn EventSink>,
    config: EngineConfig,
}

impl<M, R, D, O, C> VerificationEngine<M, R, D, O, C>
where
    M: MethodStore,
    R: RecoveryCodeStore,
    D: TrustedDeviceStore,
    O: OtpStore,
    C: CredentialIssuer,
{
    pub fn new(
        session_secret: &[u8],
        methods: M,
        otp: O,
        recovery_store: R,
        device_store: D,
        credentials: C,
        config: EngineConfig,
    ) -> Self {
        Self {
            methods,
            otp,
            vault: RecoveryVault::new(recovery_store, config.recovery.clone()),
            devices: TrustedDeviceRegistry::new(device_store, config.device.clone()),
            totp: TotpVerifier::new(config.totp.clone()),
            sessions: SessionSigner::new(session_secret, config.session_ttl),
            credentials,
            sms_gateway: None,
            email_gateway: None,
            events: Arc::new(NullSink),
            config,
        }
    }

    pub fn sms_gateway(mut self, gateway: Arc<dyn CodeGateway>) -> Self {
        self.sms_gateway = Some(gateway);
        self
    }

    pub fn email_gateway(mut self, gateway: Arc<dyn CodeGateway>) -> Self {
        self.email_gateway = Some(gateway);
        self
    }

    pub fn events(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = sink;
        self
    }

    // ---- verification flow ----

    /// Open verification for a subject that passed its first factor.
    ///
    /// A valid trusted-device token short-circuits the whole flow. The
    /// subject must have two-factor enabled; callers should not route
    /// subjects without it through here.
    pub async fn begin_verification(
        &self,
        subject_id: &str,
        device_token: Option<&str>,
    ) -> Result<BeginOutcome> {
        if let Some(token) = device_token {
            if self.devices.verify(subject_id, token).await? {
                tracing::info!(
                    target: "mfa.engine.trusted_skip",
                    subject_id = %subject_id,
                    "Second factor skipped for trusted device"
                );
                let credentials = self.credentials.issue(subject_id).await?;
                self.events.emit(Event::new(
                    subject_id,
                    EventKind::VerificationSucceeded { method: None },
                ));
                return Ok(BeginOutcome::Trusted(credentials));
            }
        }

        let methods = self.methods.list_enabled_methods(subject_id).await?;
        if methods.is_empty() {
            return Err(FactorgateError::method_not_configured(
                "subject has no enabled second factor",
            ));
        }

        let session_token = self.sessions.issue(subject_id)?;
        self.events
            .emit(Event::new(subject_id, EventKind::VerificationStarted));

        Ok(BeginOutcome::Pending {
            session_token,
            methods,
        })
    }

    /// Generate and deliver a code for one of the subject's delivery
    /// methods. Doubles as the initial send and as a resend; each send
    /// overwrites the previous code and resets its attempt counter.
    pub async fn resend(&self, session_token: &str, method_id: &str) -> Result<()> {
        let subject_id = self.sessions.decode(session_token)?;
        let method = self.require_enabled_method(&subject_id, method_id).await?;
        self.send_code_for(&method).await
    }

    /// Check a submitted code against every enabled method.
    ///
    /// Delivered codes are matched in constant time and consumed on
    /// success; time-based codes are checked against the shared secret. On
    /// success the pending session is satisfied and credentials are
    /// issued. Optionally trusts the current device.
    pub async fn submit_code(
        &self,
        session_token: &str,
        code: &str,
        trust: Option<TrustRequest>,
    ) -> Result<VerifyOutcome> {
        let subject_id = self.sessions.decode(session_token)?;
        self.check_verify_limit(&subject_id).await?;

        let methods = self.methods.list_enabled_methods(&subject_id).await?;
        let mut saw_ceiling = false;

        for method in &methods {
            match &method.binding {
                MethodBinding::TimeBased { secret } => {
                    if self.totp.verify(secret, code, &subject_id)? {
                        return self
                            .complete(&subject_id, Some(method.kind()), trust)
                            .await;
                    }
                }
                MethodBinding::Sms { .. } | MethodBinding::Email { .. } => {
                    match self.check_delivered_code(&subject_id, &method.id, code).await? {
                        CodeCheck::Match => {
                            return self
                                .complete(&subject_id, Some(method.kind()), trust)
                                .await;
                        }
                        CodeCheck::CeilingHit => saw_ceiling = true,
                        CodeCheck::NoMatch => {}
                    }
                }
            }
        }

        if saw_ceiling {
            self.events
                .emit(Event::new(&subject_id, EventKind::AttemptsExhausted));
            tracing::warn!(
                target: "mfa.engine.attempts_exhausted",
                subject_id = %subject_id,
                "Attempt ceiling reached; code invalidated"
            );
            return Err(FactorgateError::attempts_exceeded(
                "code invalidated, request a new one",
            ));
        }

        self.events
            .emit(Event::new(&subject_id, EventKind::VerificationFailed));
        Err(FactorgateError::InvalidCode)
    }

    /// Satisfy a pending session with a recovery code instead of a second
    /// factor. The code is consumed on success.
    pub async fn submit_recovery_code(
        &self,
        session_token: &str,
        code: &str,
        trust: Option<TrustRequest>,
    ) -> Result<VerifyOutcome> {
        let subject_id = self.sessions.decode(session_token)?;
        self.check_verify_limit(&subject_id).await?;

        match self.vault.verify_and_consume(&subject_id, code).await {
            Ok(()) => {
                let remaining = self.vault.remaining(&subject_id).await?;
                self.events.emit(Event::new(
                    &subject_id,
                    EventKind::RecoveryCodeUsed { remaining },
                ));
                tracing::info!(
                    target: "mfa.engine.recovery_used",
                    subject_id = %subject_id,
                    remaining = remaining,
                    "Recovery code consumed"
                );
                self.complete(&subject_id, None, trust).await
            }
            Err(e) => {
                self.events
                    .emit(Event::new(&subject_id, EventKind::VerificationFailed));
                Err(e)
            }
        }
    }

    // ---- enrollment ----

    /// Start time-based enrollment: a pending method holding a fresh
    /// secret. Becomes enabled only after [`confirm_enrollment`] proves
    /// the authenticator app has the secret.
    ///
    /// `account_name` is what the authenticator app displays, typically the
    /// subject's email or username.
    ///
    /// [`confirm_enrollment`]: VerificationEngine::confirm_enrollment
    pub async fn begin_totp_enrollment(
        &self,
        subject_id: &str,
        account_name: &str,
    ) -> Result<TotpEnrollment> {
        let setup = self.totp.generate_setup(account_name)?;
        let method = SecondFactorMethod::pending(
            subject_id,
            MethodBinding::TimeBased {
                secret: setup.secret.clone(),
            },
        );
        self.methods.insert_method(&method).await?;

        Ok(TotpEnrollment {
            method_id: method.id,
            secret: setup.secret,
            uri: setup.uri,
        })
    }

    /// Start SMS enrollment: a pending method plus an initial code to the
    /// phone number.
    pub async fn begin_sms_enrollment(&self, subject_id: &str, phone: &str) -> Result<String> {
        self.begin_delivery_enrollment(subject_id, MethodBinding::Sms {
            phone: phone.to_string(),
        })
        .await
    }

    /// Start email enrollment: a pending method plus an initial code to the
    /// address.
    pub async fn begin_email_enrollment(&self, subject_id: &str, address: &str) -> Result<String> {
        self.begin_delivery_enrollment(subject_id, MethodBinding::Email {
            address: address.to_string(),
        })
        .await
    }

    async fn begin_delivery_enrollment(
        &self,
        subject_id: &str,
        binding: MethodBinding,
    ) -> Result<String> {
        // Fail before inserting if no gateway can ever confirm this method.
        self.gateway_for(binding.kind())?;

        let method = SecondFactorMethod::pending(subject_id, binding);
        self.methods.insert_method(&method).await?;
        self.send_code_for(&method).await?;

        Ok(method.id)
    }

    /// Prove control of a pending method and enable it.
    ///
    /// For a time-based method the code comes from the authenticator app;
    /// for delivery methods it is the code sent at enrollment start. On a
    /// time-based confirm any previously enabled time-based method is
    /// replaced. A recovery code batch is generated and returned when this
    /// enables the subject's first method, and on every time-based confirm
    /// (the new secret gets a new batch); show it exactly once.
    pub async fn confirm_enrollment(
        &self,
        subject_id: &str,
        method_id: &str,
        code: &str,
    ) -> Result<Vec<String>> {
        let method = self
            .methods
            .find_method(subject_id, method_id)
            .await?
            .ok_or_else(|| FactorgateError::not_found("enrollment"))?;

        if method.enabled {
            return Err(FactorgateError::already_used("method already enabled"));
        }

        match &method.binding {
            MethodBinding::TimeBased { secret } => {
                if !self.totp.verify(secret, code, subject_id)? {
                    return Err(FactorgateError::InvalidCode);
                }
                // One time-based method per subject; drop any prior one,
                // enabled or still pending from an abandoned enrollment.
                for old in self
                    .methods
                    .find_by_kind(subject_id, MethodKind::TimeBased)
                    .await?
                {
                    if old.id != method.id {
                        self.methods.delete_method(subject_id, &old.id).await?;
                    }
                }
            }
            MethodBinding::Sms { .. } | MethodBinding::Email { .. } => {
                match self.check_delivered_code(subject_id, &method.id, code).await? {
                    CodeCheck::Match => {}
                    CodeCheck::CeilingHit => {
                        return Err(FactorgateError::attempts_exceeded(
                            "code invalidated, request a new one",
                        ))
                    }
                    CodeCheck::NoMatch => return Err(FactorgateError::InvalidCode),
                }
            }
        }

        let had_two_factor = self.methods.is_two_factor_enabled(subject_id).await?;

        self.methods
            .enable_method(subject_id, &method.id, SystemTime::now())
            .await?;
        self.methods.set_two_factor_enabled(subject_id, true).await?;

        self.events.emit(Event::new(
            subject_id,
            EventKind::MethodEnabled {
                method: method.kind(),
            },
        ));
        tracing::info!(
            target: "mfa.engine.method_enabled",
            subject_id = %subject_id,
            method = %method.kind(),
            "Second factor enabled"
        );

        // First method enabled, or a fresh time-based secret: issue a
        // recovery batch alongside it.
        if !had_two_factor || method.kind() == MethodKind::TimeBased {
            let codes = self.vault.regenerate(subject_id).await?;
            self.events
                .emit(Event::new(subject_id, EventKind::RecoveryCodesRegenerated));
            return Ok(codes);
        }

        Ok(Vec::new())
    }

    /// Disable a method. Disabling the last one turns two-factor off
    /// entirely: the recovery batch is purged and device trust revoked.
    pub async fn disable_method(&self, subject_id: &str, method_id: &str) -> Result<()> {
        let method = self
            .methods
            .find_method(subject_id, method_id)
            .await?
            .ok_or_else(|| FactorgateError::not_found("method"))?;

        self.methods.delete_method(subject_id, method_id).await?;
        self.otp.delete_code(&code_key(subject_id, method_id)).await?;

        self.events.emit(Event::new(
            subject_id,
            EventKind::MethodDisabled {
                method: method.kind(),
            },
        ));

        if self.methods.list_enabled_methods(subject_id).await?.is_empty() {
            self.methods.set_two_factor_enabled(subject_id, false).await?;
            self.vault.purge(subject_id).await?;
            self.devices.revoke_all(subject_id).await?;
            tracing::info!(
                target: "mfa.engine.two_factor_disabled",
                subject_id = %subject_id,
                "Last method removed; two-factor disabled"
            );
        }

        Ok(())
    }

    /// The subject's enabled methods.
    pub async fn list_enabled_methods(&self, subject_id: &str) -> Result<Vec<SecondFactorMethod>> {
        self.methods.list_enabled_methods(subject_id).await
    }

    // ---- recovery codes ----

    /// Replace the subject's recovery batch with a fresh one. Requires
    /// two-factor to be enabled.
    pub async fn regenerate_recovery_codes(&self, subject_id: &str) -> Result<Vec<String>> {
        if !self.methods.is_two_factor_enabled(subject_id).await? {
            return Err(FactorgateError::method_not_configured(
                "two-factor is not enabled",
            ));
        }

        let codes = self.vault.regenerate(subject_id).await?;
        self.events
            .emit(Event::new(subject_id, EventKind::RecoveryCodesRegenerated));
        Ok(codes)
    }

    /// Unused recovery codes left in the current batch.
    pub async fn remaining_recovery_codes(&self, subject_id: &str) -> Result<usize> {
        self.vault.remaining(subject_id).await
    }

    // ---- trusted devices ----

    /// The subject's live trusted devices.
    pub async fn list_trusted_devices(&self, subject_id: &str) -> Result<Vec<TrustedDevice>> {
        self.devices.list(subject_id).await
    }

    /// Revoke trust for one device.
    pub async fn revoke_trusted_device(&self, subject_id: &str, device_id: &str) -> Result<()> {
        self.devices.revoke(subject_id, device_id).await?;
        self.events
            .emit(Event::new(subject_id, EventKind::DeviceRevoked));
        Ok(())
    }

    /// Revoke trust for every device. Returns the number revoked.
    pub async fn revoke_all_trusted_devices(&self, subject_id: &str) -> Result<usize> {
        let count = self.devices.revoke_all(subject_id).await?;
        if count > 0 {
            self.events
                .emit(Event::new(subject_id, EventKind::DeviceRevoked));
        }
        Ok(count)
    }

    /// Sweep expired trusted devices; for a periodic maintenance task.
    pub async fn purge_expired_devices(&self) -> Result<usize> {
        self.devices.purge_expired().await
    }

    // ---- internals ----

    async fn complete(
        &self,
        subject_id: &str,
        method: Option<MethodKind>,
        trust: Option<TrustRequest>,
    ) -> Result<VerifyOutcome> {
        let credentials = self.credentials.issue(subject_id).await?;

        self.events.emit(Event::new(
            subject_id,
            EventKind::VerificationSucceeded { method },
        ));
        tracing::info!(
            target: "mfa.engine.verified",
            subject_id = %subject_id,
            "Second factor verified"
        );

        let trusted_device_token = match trust {
            Some(request) => {
                let issued = self
                    .devices
                    .trust(subject_id, request.label.as_deref())
                    .await?;
                self.events
                    .emit(Event::new(subject_id, EventKind::DeviceTrusted));
                Some(issued.token)
            }
            None => None,
        };

        Ok(VerifyOutcome {
            credentials,
            trusted_device_token,
        })
    }

    async fn send_code_for(&self, method: &SecondFactorMethod) -> Result<()> {
        let destination = method.binding.destination().ok_or_else(|| {
            FactorgateError::method_not_configured("time-based methods have no delivery channel")
        })?;
        let gateway = self.gateway_for(method.kind())?;

        let limited = self
            .otp
            .rate_limit(
                &rate_key("resend", &method.subject_id, Some(&method.id)),
                self.config.resend_limit,
                self.config.resend_window,
            )
            .await?;
        if limited {
            self.events
                .emit(Event::new(&method.subject_id, EventKind::RateLimited));
            tracing::warn!(
                target: "mfa.engine.resend_limited",
                subject_id = %method.subject_id,
                method_id = %method.id,
                "Resend rate limit hit"
            );
            return Err(FactorgateError::rate_limited_for(self.config.resend_window));
        }

        let code = generate_numeric_code(self.config.code_length);
        self.otp
            .put_code(
                &code_key(&method.subject_id, &method.id),
                OtpRecord::new(&code),
                self.config.code_ttl,
            )
            .await?;

        self.deliver(gateway, destination, &code).await?;

        self.events.emit(Event::new(
            &method.subject_id,
            EventKind::CodeSent {
                method: method.kind(),
            },
        ));
        tracing::info!(
            target: "mfa.engine.code_sent",
            subject_id = %method.subject_id,
            method = %method.kind(),
            "Verification code sent"
        );

        Ok(())
    }

    async fn deliver(
        &self,
        gateway: &Arc<dyn CodeGateway>,
        destination: &str,
        code: &str,
    ) -> Result<()> {
        match tokio::time::timeout(self.config.gateway_timeout, gateway.send_code(destination, code))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(FactorgateError::delivery_failure("delivery timed out")),
        }
    }

    /// Check a submitted code against the live delivered code for a method.
    async fn check_delivered_code(
        &self,
        subject_id: &str,
        method_id: &str,
        code: &str,
    ) -> Result<CodeCheck> {
        let key = code_key(subject_id, method_id);

        let Some(record) = self.otp.get_code(&key).await? else {
            return Ok(CodeCheck::NoMatch);
        };

        // A record that already burned its attempts is dead even if the
        // submitted code would match now. The submission that finds the
        // burned record is the one that reports the ceiling and deletes it.
        if record.attempts >= self.config.max_attempts {
            self.otp.delete_code(&key).await?;
            return Ok(CodeCheck::CeilingHit);
        }

        if codes_match(code, &record.code) {
            self.otp.delete_code(&key).await?;
            return Ok(CodeCheck::Match);
        }

        // A wrong guess is a plain mismatch, including the one that lands
        // exactly on the ceiling; the counter decides the fate of the NEXT
        // submission.
        self.otp.increment_attempts(&key).await?;
        Ok(CodeCheck::NoMatch)
    }

    async fn check_verify_limit(&self, subject_id: &str) -> Result<()> {
        let limited = self
            .otp
            .rate_limit(
                &rate_key("verify", subject_id, None),
                self.config.verify_limit,
                self.config.verify_window,
            )
            .await?;

        if limited {
            self.events
                .emit(Event::new(subject_id, EventKind::RateLimited));
            tracing::warn!(
                target: "mfa.engine.verify_limited",
                subject_id = %subject_id,
                "Verify rate limit hit"
            );
            return Err(FactorgateError::rate_limited_for(self.config.verify_window));
        }
        Ok(())
    }

    async fn require_enabled_method(
        &self,
        subject_id: &str,
        method_id: &str,
    ) -> Result<SecondFactorMethod> {
        self.methods
            .find_method(subject_id, method_id)
            .await?
            .filter(|m| m.enabled)
            .ok_or_else(|| FactorgateError::not_found("method"))
    }

    fn gateway_for(&self, kind: MethodKind) -> Result<&Arc<dyn CodeGateway>> {
        let gateway = match kind {
            MethodKind::Sms => self.sms_gateway.as_ref(),
            MethodKind::Email => self.email_gateway.as_ref(),
            MethodKind::TimeBased => None,
        };

        gateway.ok_or_else(|| {
            FactorgateError::method_not_configured(format!("no {} gateway configured", kind))
        })
    }
}

enum CodeCheck {
    Match,
    NoMatch,
    CeilingHit,
}

/// Length check first, then constant-time byte comparison.
fn codes_match(submitted: &str, expected: &str) -> bool {
    use subtle::ConstantTimeEq;

    submitted.len() == expected.len()
        && bool::from(submitted.as_bytes().ct_eq(expected.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_match_is_exact() {
        assert!(codes_match("123456", "123456"));
        assert!(!codes_match("123457", "123456"));
        assert!(!codes_match("12345", "123456"));
        assert!(!codes_match("", "123456"));
    }

    #[test]
    fn test_config_defaults() {
        let config = EngineConfig::new("TestApp");
        assert_eq!(config.session_ttl, Duration::from_secs(300));
        assert_eq!(config.code_length, 6);
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.resend_limit, 3);
        assert_eq!(config.totp.issuer, "TestApp");
    }

    #[test]
    fn test_config_builders() {
        let config = EngineConfig::new("TestApp")
            .max_attempts(3)
            .code_length(8)
            .resend_limit(1, Duration::from_secs(60));
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.code_length, 8);
        assert_eq!(config.resend_limit, 1);
        assert_eq!(config.resend_window, Duration::from_secs(60));
    }
}
