use std::time::Duration;

/// The main error type for the verification engine.
///
/// Every failure a caller can act on is a distinct variant; the HTTP layer
/// (out of scope here) maps these to status codes.
#[derive(Debug, thiserror::Error)]
pub enum FactorgateError {
    /// The pending session token is missing, malformed, expired, or was
    /// minted for a different purpose.
    #[error("Invalid session: {0}")]
    InvalidSession(String),

    /// No enabled method produced a match for the submitted code.
    #[error("Invalid code")]
    InvalidCode,

    /// The attempt ceiling for the live one-time code was hit. The code has
    /// been invalidated; the caller must request a resend.
    #[error("Attempts exceeded: {0}")]
    AttemptsExceeded(String),

    /// A resend or verify rate window was exceeded.
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// The requested method has no configured delivery channel.
    #[error("Method not configured: {0}")]
    MethodNotConfigured(String),

    /// A recovery code was presented a second time.
    #[error("Already used: {0}")]
    AlreadyUsed(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// An outbound gateway reported or timed out a delivery.
    #[error("Upstream delivery failure: {0}")]
    UpstreamDeliveryFailure(String),

    /// The ephemeral or persistent store failed.
    #[error("Store error: {0}")]
    Store(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl FactorgateError {
    pub fn invalid_session(msg: impl Into<String>) -> Self {
        Self::InvalidSession(msg.into())
    }

    pub fn attempts_exceeded(msg: impl Into<String>) -> Self {
        Self::AttemptsExceeded(msg.into())
    }

    pub fn rate_limited(msg: impl Into<String>) -> Self {
        Self::RateLimited(msg.into())
    }

    /// Rate-limited with a retry hint, phrased the way callers display it.
    pub fn rate_limited_for(window: Duration) -> Self {
        Self::RateLimited(format!(
            "Too many requests. Please try again within {} seconds.",
            window.as_secs()
        ))
    }

    pub fn method_not_configured(msg: impl Into<String>) -> Self {
        Self::MethodNotConfigured(msg.into())
    }

    pub fn already_used(msg: impl Into<String>) -> Self {
        Self::AlreadyUsed(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn delivery_failure(msg: impl Into<String>) -> Self {
        Self::UpstreamDeliveryFailure(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error means the caller supplied something wrong, as
    /// opposed to an infrastructure fault.
    pub fn is_caller_fault(&self) -> bool {
        matches!(
            self,
            Self::InvalidSession(_)
                | Self::InvalidCode
                | Self::AttemptsExceeded(_)
                | Self::RateLimited(_)
                | Self::AlreadyUsed(_)
                | Self::NotFound(_)
        )
    }
}

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, FactorgateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_display() {
        let err = FactorgateError::invalid_session("token expired");
        assert_eq!(err.to_string(), "Invalid session: token expired");

        let err = FactorgateError::InvalidCode;
        assert_eq!(err.to_string(), "Invalid code");

        let err = FactorgateError::attempts_exceeded("code invalidated");
        assert_eq!(err.to_string(), "Attempts exceeded: code invalidated");
    }

    #[test]
    fn test_rate_limited_for_mentions_window() {
        let err = FactorgateError::rate_limited_for(Duration::from_secs(3600));
        assert!(err.to_string().contains("3600"));
    }

    #[test]
    fn test_caller_fault_classification() {
        assert!(FactorgateError::InvalidCode.is_caller_fault());
        assert!(FactorgateError::not_found("subject").is_caller_fault());
        assert!(!FactorgateError::store("redis down").is_caller_fault());
        assert!(!FactorgateError::internal("oops").is_caller_fault());
    }

    #[test]
    fn test_anyhow_passthrough() {
        let err: FactorgateError = anyhow::anyhow!("wrapped").into();
        assert!(matches!(err, FactorgateError::Anyhow(_)));
    }
}
