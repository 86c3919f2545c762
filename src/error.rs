//! Error types for the extraction and replication engine.

use thiserror::Error;

/// Classification of a remote transport failure.
///
/// `Auth` is distinguished so the caller can route authentication failures
/// to a re-authorization flow before offering a generic retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportErrorKind {
    /// The backend rejected the credentials or token.
    Auth,
    /// The backend throttled the request.
    RateLimit,
    /// Connection-level failure (DNS, TLS, reset, timeout).
    Network,
    /// The operation was cancelled at the caller's request.
    Aborted,
    /// Anything else the transport could not classify.
    Other,
}

impl TransportErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TransportErrorKind::Auth => "auth",
            TransportErrorKind::RateLimit => "rate_limit",
            TransportErrorKind::Network => "network",
            TransportErrorKind::Aborted => "aborted",
            TransportErrorKind::Other => "other",
        }
    }
}

/// Failure reported by the remote transport for one operation.
#[derive(Debug, Clone, Error)]
#[error("transport error ({}): {message}", kind.as_str())]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn aborted() -> Self {
        Self::new(TransportErrorKind::Aborted, "operation aborted")
    }

    pub fn is_abort(&self) -> bool {
        self.kind == TransportErrorKind::Aborted
    }
}

/// Failure while decoding an archive entry's payload.
#[derive(Debug, Clone, Error)]
pub enum DecodeError {
    #[error("checksum mismatch while decompressing entry")]
    ChecksumMismatch,

    #[error("archive entry payload was truncated")]
    Truncated,

    #[error("decode I/O failure: {0}")]
    Io(String),
}

/// Engine-level errors.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("session is closed and cannot accept further calls")]
    SessionClosed,

    #[error("archive record has an invalid path: {0:?}")]
    InvalidRecordPath(String),

    #[error("target parent cannot change after execution has started")]
    TargetParentLocked,

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<config::ConfigError> for EngineError {
    fn from(err: config::ConfigError) -> Self {
        EngineError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_error_display_includes_kind() {
        let err = TransportError::new(TransportErrorKind::Auth, "token expired");
        assert_eq!(err.to_string(), "transport error (auth): token expired");
        assert!(!err.is_abort());
        assert!(TransportError::aborted().is_abort());
    }
}
