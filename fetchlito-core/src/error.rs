//! # Errors
//!
//! Error types shared by every reader of the cache.
//!
//! Fetch failures are captured into the cache, so the same error value is handed to
//! every current and future reader of a key until the key is rewritten. For that reason
//! all error types here are `Clone`.

use crate::pending::Pending;
use serde_json::Value;
use thiserror::Error;

/// HTTP status that is cached as `null` instead of as an error.
pub const STATUS_NOT_FOUND: u16 = 404;

/// Status used for failures that never produced an HTTP response (DNS, connection reset, ...).
pub const STATUS_UNREACHABLE: u16 = 0;

/// A failed transport call: the status code and the response body, if any.
///
/// # Examples
///
/// ```
/// use fetchlito_core::TransportError;
/// use serde_json::json;
///
/// let err = TransportError::new(500, json!({"message": "boom"}));
/// assert_eq!(err.status, 500);
/// assert!(!err.is_not_found());
///
/// let missing = TransportError::status(404);
/// assert!(missing.is_not_found());
/// ```
#[derive(Debug, Clone, PartialEq, Error)]
#[error("request failed with status {status}")]
pub struct TransportError {
    pub status: u16,
    pub body: Value,
}

impl TransportError {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    /// A failure with an empty body.
    pub fn status(status: u16) -> Self {
        Self::new(status, Value::Null)
    }

    /// A connection-level failure; the message is kept in the body.
    pub fn unreachable(message: impl Into<String>) -> Self {
        Self::new(STATUS_UNREACHABLE, Value::String(message.into()))
    }

    pub fn is_not_found(&self) -> bool {
        self.status == STATUS_NOT_FOUND
    }
}

/// Errors observable by cache readers.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CacheError {
    /// A non-404 transport failure, cached for the key until it is overwritten.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The cache was driven outside of the suspending or direct protocols.
    #[error("cache misuse: {0}")]
    Misuse(String),
}

impl CacheError {
    pub fn misuse(message: impl Into<String>) -> Self {
        CacheError::Misuse(message.into())
    }

    /// Returns the HTTP status for transport failures.
    pub fn status(&self) -> Option<u16> {
        match self {
            CacheError::Transport(err) => Some(err.status),
            CacheError::Misuse(_) => None,
        }
    }
}

/// Result of a read inside an evaluation pass.
///
/// `Pending` is the "not ready yet" signal: the caller must await the handle and re-run
/// the whole pass from its start. `Failed` is an ordinary error and is never turned into
/// another pending signal.
#[derive(Debug, Clone, Error)]
pub enum ReadError {
    #[error("resource `{}` is still loading", .0.key())]
    Pending(Pending),

    #[error(transparent)]
    Failed(#[from] CacheError),
}

impl From<TransportError> for ReadError {
    fn from(err: TransportError) -> Self {
        ReadError::Failed(CacheError::Transport(err))
    }
}

impl ReadError {
    pub fn is_pending(&self) -> bool {
        matches!(self, ReadError::Pending(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_transport_error_display() {
        let err = TransportError::new(503, json!("unavailable"));
        assert_eq!(err.to_string(), "request failed with status 503");
    }

    #[test]
    fn test_unreachable_keeps_message() {
        let err = TransportError::unreachable("connection reset");
        assert_eq!(err.status, STATUS_UNREACHABLE);
        assert_eq!(err.body, json!("connection reset"));
    }

    #[test]
    fn test_cache_error_status() {
        let err: CacheError = TransportError::status(500).into();
        assert_eq!(err.status(), Some(500));
        assert_eq!(CacheError::misuse("no runtime").status(), None);
    }

    #[test]
    fn test_read_error_from_transport() {
        let err: ReadError = TransportError::status(401).into();
        assert!(!err.is_pending());
        match err {
            ReadError::Failed(CacheError::Transport(inner)) => assert_eq!(inner.status, 401),
            other => panic!("unexpected {other:?}"),
        }
    }
}
