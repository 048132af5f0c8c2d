//! Error types for the remote signing service API.
//!
//! Failures are categorized into two kinds, and the distinction drives what
//! callers do next:
//!
//! - **Transient** errors (network failures, 429, 5xx) are safe to retry; the
//!   poll cadence itself is the retry policy, so no retry happens here.
//! - **Permanent** errors (document not found, unparseable payload, auth
//!   failures) will not resolve on their own.
//!
//! Either way the caller records that a check happened, so a permanently
//! broken document does not get re-fetched on every cycle forever.

use std::fmt;
use thiserror::Error;

/// The kind of remote API error, categorized for retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteErrorKind {
    /// Transient error - safe to retry on a later cycle.
    ///
    /// Examples:
    /// - HTTP 5xx (server errors)
    /// - HTTP 429 (rate limited)
    /// - Network timeouts and connection failures
    Transient,

    /// Permanent error - retrying the same request will fail again.
    ///
    /// Examples:
    /// - Document not found on the remote service
    /// - Response body that does not parse as a document payload
    /// - Authentication failures (401, 403)
    Permanent,
}

impl RemoteErrorKind {
    /// Returns true if this error is retriable.
    pub fn is_retriable(&self) -> bool {
        matches!(self, RemoteErrorKind::Transient)
    }
}

/// A remote signing service error with categorization for retry decisions.
#[derive(Debug, Error)]
pub struct RemoteApiError {
    /// The kind of error (transient or permanent).
    pub kind: RemoteErrorKind,

    /// The HTTP status code, if available.
    pub status_code: Option<u16>,

    /// A human-readable description of the error.
    pub message: String,

    /// The underlying HTTP error, if available.
    #[source]
    pub source: Option<reqwest::Error>,
}

impl fmt::Display for RemoteApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status_code {
            Some(code) => write!(f, "signing API error (HTTP {}): {}", code, self.message),
            None => write!(f, "signing API error: {}", self.message),
        }
    }
}

impl RemoteApiError {
    /// Creates a transient error without an HTTP source.
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: RemoteErrorKind::Transient,
            status_code: None,
            message: message.into(),
            source: None,
        }
    }

    /// Creates a permanent error without an HTTP source.
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: RemoteErrorKind::Permanent,
            status_code: None,
            message: message.into(),
            source: None,
        }
    }

    /// Creates a permanent error carrying an HTTP status code.
    pub fn permanent_with_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            kind: RemoteErrorKind::Permanent,
            status_code: Some(status),
            message: message.into(),
            source: None,
        }
    }

    /// Categorizes an HTTP status code returned by the signing service.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let kind = match status {
            429 => RemoteErrorKind::Transient,
            code if (500..600).contains(&code) => RemoteErrorKind::Transient,
            _ => RemoteErrorKind::Permanent,
        };
        Self {
            kind,
            status_code: Some(status),
            message: message.into(),
            source: None,
        }
    }

    /// Categorizes a reqwest transport error.
    ///
    /// Errors that never reached the server (timeouts, connect failures,
    /// request build errors) are transient. Errors raised after a response
    /// arrived are categorized by its status code.
    pub fn from_transport(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            let mut categorized = Self::from_status(status.as_u16(), err.to_string());
            categorized.source = Some(err);
            return categorized;
        }

        let kind = if err.is_timeout() || err.is_connect() || err.is_request() {
            RemoteErrorKind::Transient
        } else if err.is_decode() {
            // The server answered but the body was not what we asked for.
            RemoteErrorKind::Permanent
        } else {
            RemoteErrorKind::Transient
        };

        Self {
            kind,
            status_code: None,
            message: err.to_string(),
            source: Some(err),
        }
    }

    pub fn is_retriable(&self) -> bool {
        self.kind.is_retriable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kind_retriable() {
        assert!(RemoteErrorKind::Transient.is_retriable());
        assert!(!RemoteErrorKind::Permanent.is_retriable());
    }

    #[test]
    fn rate_limit_is_transient() {
        let err = RemoteApiError::from_status(429, "rate limited");
        assert_eq!(err.kind, RemoteErrorKind::Transient);
        assert_eq!(err.status_code, Some(429));
    }

    #[test]
    fn server_errors_are_transient() {
        for code in [500, 502, 503, 504] {
            let err = RemoteApiError::from_status(code, "upstream failure");
            assert_eq!(err.kind, RemoteErrorKind::Transient, "HTTP {}", code);
        }
    }

    #[test]
    fn client_errors_are_permanent() {
        for code in [400, 401, 403, 404, 422] {
            let err = RemoteApiError::from_status(code, "rejected");
            assert_eq!(err.kind, RemoteErrorKind::Permanent, "HTTP {}", code);
        }
    }

    #[test]
    fn display_includes_status_when_present() {
        let err = RemoteApiError::from_status(404, "document not found");
        assert_eq!(
            err.to_string(),
            "signing API error (HTTP 404): document not found"
        );
        let err = RemoteApiError::transient("connection reset");
        assert_eq!(err.to_string(), "signing API error: connection reset");
    }
}
