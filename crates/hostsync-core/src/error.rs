//! Error types for the hostsync system
//!
//! Every failure is classified into an [`ErrorKind`]. The classification
//! decides retry behaviour (only [`ErrorKind::Transient`] is retried) and is
//! what ends up in a failed [`SyncOutcome`](crate::engine::SyncOutcome).

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for hostsync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the hostsync system
#[derive(Error, Debug)]
pub enum Error {
    /// Credentials or token rejected by a remote endpoint
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Network failure, timeout, 429 or 5xx; safe to retry
    #[error("Transient failure: {0}")]
    Transient(String),

    /// Input record or request payload is unusable
    #[error("Validation error: {0}")]
    Validation(String),

    /// Data conflict reported by the IPAM appliance (e.g. duplicate address)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Unexpected response shape or status
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Work was not started because the run was cancelled
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

/// Machine-readable error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    Auth,
    Transient,
    Validation,
    Conflict,
    Protocol,
    Config,
    Cancelled,
}

impl ErrorKind {
    /// Lowercase name used in logs and serialized outcomes
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Auth => "auth",
            ErrorKind::Transient => "transient",
            ErrorKind::Validation => "validation",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Protocol => "protocol",
            ErrorKind::Config => "config",
            ErrorKind::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }

    /// Create a transient (retryable) error
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a conflict error
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Create a protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a cancellation error
    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self::Cancelled(msg.into())
    }

    /// Classify an unsuccessful HTTP status from a remote service.
    ///
    /// 401/403 are authentication failures, 429 and 5xx are transient,
    /// 400/422 are validation failures and everything else is a protocol
    /// error. Callers with service-specific knowledge (e.g. conflict bodies)
    /// should check for those before falling back to this.
    pub fn from_status(service: &str, status: u16, detail: &str) -> Self {
        let detail = detail.trim();
        match status {
            401 | 403 => Self::auth(format!("{service} rejected credentials (HTTP {status})")),
            429 => Self::transient(format!("{service} rate limit exceeded (HTTP 429)")),
            500..=599 => Self::transient(format!("{service} server error (HTTP {status}): {detail}")),
            400 | 422 => Self::validation(format!("{service} rejected request (HTTP {status}): {detail}")),
            _ => Self::protocol(format!("{service} returned unexpected HTTP {status}: {detail}")),
        }
    }

    /// The classification of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Auth(_) => ErrorKind::Auth,
            Error::Transient(_) => ErrorKind::Transient,
            Error::Validation(_) => ErrorKind::Validation,
            Error::Conflict(_) => ErrorKind::Conflict,
            Error::Protocol(_) | Error::Json(_) | Error::Other(_) => ErrorKind::Protocol,
            Error::Config(_) => ErrorKind::Config,
            Error::Cancelled(_) => ErrorKind::Cancelled,
        }
    }

    /// Whether a retry may succeed where this attempt failed
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert_eq!(Error::from_status("wug", 401, "").kind(), ErrorKind::Auth);
        assert_eq!(Error::from_status("wug", 403, "").kind(), ErrorKind::Auth);
        assert_eq!(Error::from_status("wug", 429, "").kind(), ErrorKind::Transient);
        assert_eq!(Error::from_status("wug", 503, "busy").kind(), ErrorKind::Transient);
        assert_eq!(Error::from_status("wug", 400, "bad").kind(), ErrorKind::Validation);
        assert_eq!(Error::from_status("wug", 404, "").kind(), ErrorKind::Protocol);
    }

    #[test]
    fn only_transient_is_retryable() {
        assert!(Error::transient("timeout").is_retryable());
        assert!(!Error::auth("nope").is_retryable());
        assert!(!Error::conflict("dup").is_retryable());
        assert!(!Error::protocol("garbage").is_retryable());
        assert!(!Error::Other("x".into()).is_retryable());
    }

    #[test]
    fn kind_serializes_lowercase() {
        let json = serde_json::to_string(&ErrorKind::Conflict).unwrap();
        assert_eq!(json, "\"conflict\"");
    }
}
