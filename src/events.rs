//! Verification event stream
//!
//! The engine emits an event for every security-relevant transition so the
//! host application can feed audit logs or alerting. Emission is
//! fire-and-forget: a slow or closed sink never blocks or fails a
//! verification.

use crate::storage::MethodKind;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// What happened.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    /// A pending session was opened for the subject.
    VerificationStarted,
    /// A second factor verified; the session is satisfied.
    VerificationSucceeded { method: Option<MethodKind> },
    /// A submitted code did not match.
    VerificationFailed,
    /// The attempt ceiling was reached for a code.
    AttemptsExhausted,
    /// A resend or verify rate window was exceeded.
    RateLimited,
    /// A code was (re)sent to a delivery method.
    CodeSent { method: MethodKind },
    /// A recovery code was consumed.
    RecoveryCodeUsed { remaining: usize },
    /// A recovery code batch was generated, replacing any previous batch.
    RecoveryCodesRegenerated,
    /// A method finished enrollment and became enabled.
    MethodEnabled { method: MethodKind },
    /// A method was disabled.
    MethodDisabled { method: MethodKind },
    /// A device was trusted for future logins.
    DeviceTrusted,
    /// Device trust was revoked.
    DeviceRevoked,
}

/// An event with its subject and time of occurrence.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Event {
    pub subject_id: String,
    pub kind: EventKind,
    pub at: SystemTime,
}

impl Event {
    pub fn new(subject_id: impl Into<String>, kind: EventKind) -> Self {
        Self {
            subject_id: subject_id.into(),
            kind,
            at: SystemTime::now(),
        }
    }
}

/// Receives engine events. Implementations must not block.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: Event);
}

/// Discards all events. The default sink.
#[derive(Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: Event) {}
}

/// Forwards events onto a tokio channel for async consumption.
///
/// If the receiver has been dropped the event is logged and discarded;
/// verification never fails because nobody is listening.
pub struct ChannelSink {
    tx: tokio::sync::mpsc::UnboundedSender<Event>,
}

impl ChannelSink {
    /// Create a sink and the receiver to consume events from.
    pub fn new() -> (Self, tokio::sync::mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: Event) {
        if self.tx.send(event).is_err() {
            tracing::warn!(
                target: "mfa.events.dropped",
                "Event receiver closed; event discarded"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_sink_delivers() {
        let (sink, mut rx) = ChannelSink::new();
        sink.emit(Event::new("u1", EventKind::VerificationStarted));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.subject_id, "u1");
        assert_eq!(event.kind, EventKind::VerificationStarted);
    }

    #[test]
    fn test_closed_receiver_does_not_panic() {
        let (sink, rx) = ChannelSink::new();
        drop(rx);
        sink.emit(Event::new("u1", EventKind::VerificationFailed));
    }

    #[test]
    fn test_null_sink() {
        NullSink.emit(Event::new(
            "u1",
            EventKind::CodeSent {
                method: MethodKind::Sms,
            },
        ));
    }
}
