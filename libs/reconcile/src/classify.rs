//! Failure classification for provider errors.
//!
//! Capacity exhaustion is the expected, recurring outcome of a launch request
//! against a busy pool; it must never page the operator. Everything else is
//! split between faults a later tick can plausibly get past and faults that
//! need a human.

use std::fmt;

/// Message fragments the provider uses to report capacity exhaustion.
///
/// Matched case-insensitively against both the error code and message,
/// independent of the HTTP status that carried them.
pub const CAPACITY_SIGNATURES: &[&str] = &["out of host capacity", "out of capacity"];

/// HTTP status the provider uses for request throttling.
const TOO_MANY_REQUESTS: u16 = 429;

/// How a failure reached us.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// The provider answered with a non-success HTTP status.
    Status(u16),

    /// The request never got a response (connect, reset, client timeout).
    Connection,

    /// A bounded wait for a lifecycle state ran out of time or attempts.
    WaitTimeout,

    /// The instance reached a state it cannot leave while we were waiting.
    UnexpectedState,

    /// The response could not be understood, or anything else.
    Other,
}

/// A borrowed view of a failure, as seen by the classifier.
#[derive(Debug, Clone, Copy)]
pub struct Fault<'a> {
    pub kind: FaultKind,
    pub code: Option<&'a str>,
    pub message: &'a str,
}

impl<'a> Fault<'a> {
    /// Fault carrying an HTTP status.
    pub fn status(status: u16, code: Option<&'a str>, message: &'a str) -> Self {
        Self {
            kind: FaultKind::Status(status),
            code,
            message,
        }
    }

    /// Fault of the given kind without a provider error code.
    pub fn new(kind: FaultKind, message: &'a str) -> Self {
        Self {
            kind,
            code: None,
            message,
        }
    }

    fn mentions_capacity(&self) -> bool {
        let message = self.message.to_ascii_lowercase();
        let code = self.code.unwrap_or_default().to_ascii_lowercase();
        CAPACITY_SIGNATURES
            .iter()
            .any(|sig| message.contains(sig) || code.contains(sig))
    }
}

/// Errors that can be mapped to a [`Fault`].
pub trait Classify {
    fn fault(&self) -> Fault<'_>;
}

/// Outcome class of a failed provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureClass {
    /// The pool has no room right now. Expected; retry silently.
    CapacityExhausted,

    /// Provider-side hiccup. Unexpected but safe to retry.
    TransientProviderError,

    /// Misconfiguration, auth, quota or a broken reference. Needs an operator.
    Fatal,
}

impl FailureClass {
    /// Returns true if the operator should be alerted.
    pub fn should_notify(&self) -> bool {
        matches!(self, Self::Fatal)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CapacityExhausted => "capacity_exhausted",
            Self::TransientProviderError => "transient_provider_error",
            Self::Fatal => "fatal",
        }
    }
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a fault.
pub fn classify(fault: &Fault<'_>) -> FailureClass {
    if fault.mentions_capacity() {
        return FailureClass::CapacityExhausted;
    }

    match fault.kind {
        FaultKind::Status(status) if status >= 500 => FailureClass::TransientProviderError,
        FaultKind::Status(TOO_MANY_REQUESTS) => FailureClass::TransientProviderError,
        FaultKind::Status(_) => FailureClass::Fatal,
        FaultKind::Connection | FaultKind::WaitTimeout => FailureClass::TransientProviderError,
        FaultKind::UnexpectedState | FaultKind::Other => FailureClass::Fatal,
    }
}

/// Classify any error that exposes a [`Fault`].
pub fn classify_error<E: Classify + ?Sized>(error: &E) -> FailureClass {
    classify(&error.fault())
}
