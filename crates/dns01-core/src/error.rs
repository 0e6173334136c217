//! Error types for DNS-01 challenge fulfillment
//!
//! Every fallible operation in the workspace returns [`Error`]. The variants
//! follow the failure taxonomy of the challenge flow: configuration and
//! authentication failures are fatal for the whole run, zone and propagation
//! failures are fatal for a single domain, and API failures carry an
//! [`ApiErrorKind`] that decides whether the Record Manager retries.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for DNS-01 operations
pub type Result<T> = std::result::Result<T, Error>;

/// Classification of a failed Azure DNS management API call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// Rate limiting, 5xx, timeouts and connection failures
    Transient,
    /// Precondition failed (etag mismatch): someone else wrote the record set
    Conflict,
    /// The addressed resource does not exist
    NotFound,
    /// 401/403: the credential lacks access to the zone
    Unauthorized,
    /// Any other rejection; retrying will not help
    Fatal,
}

impl ApiErrorKind {
    /// Classify an HTTP status code returned by the management API
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => ApiErrorKind::Unauthorized,
            404 => ApiErrorKind::NotFound,
            412 => ApiErrorKind::Conflict,
            408 | 429 => ApiErrorKind::Transient,
            500..=599 => ApiErrorKind::Transient,
            _ => ApiErrorKind::Fatal,
        }
    }
}

/// Core error type for DNS-01 challenge fulfillment
#[derive(Error, Debug)]
pub enum Error {
    /// Bad, ambiguous or incomplete configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Credential acquisition failed
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// No configured zone covers the requested domain
    #[error("No configured Azure DNS zone matches domain {domain}")]
    NoMatchingZone {
        /// The domain as requested (wildcard marker included)
        domain: String,
    },

    /// Azure DNS management API call failed
    #[error("Azure DNS API error ({kind:?}{}): {message}", status.map(|s| format!(", HTTP {s}")).unwrap_or_default())]
    Api {
        /// Retry classification
        kind: ApiErrorKind,
        /// HTTP status, when a response was received
        status: Option<u16>,
        /// Error message
        message: String,
    },

    /// The TXT record did not become visible before the deadline
    #[error("TXT record {record_name} did not propagate within {waited:?} (last seen: {last_seen:?})")]
    PropagationTimeout {
        /// Fully qualified record name that was polled
        record_name: String,
        /// The value that was expected
        expected: String,
        /// Values returned by the last successful lookup
        last_seen: Vec<String>,
        /// How long the waiter polled
        waited: Duration,
    },

    /// The operation was aborted by the caller
    #[error("Operation cancelled")]
    Cancelled,

    /// Pending-record store errors
    #[error("State store error: {0}")]
    StateStore(String),

    /// HTTP transport errors that are not tied to an API response
    #[error("HTTP error: {0}")]
    Http(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }

    /// Create a "no matching zone" error
    pub fn no_matching_zone(domain: impl Into<String>) -> Self {
        Self::NoMatchingZone {
            domain: domain.into(),
        }
    }

    /// Create an API error with an explicit classification
    pub fn api(kind: ApiErrorKind, status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Api {
            kind,
            status,
            message: message.into(),
        }
    }

    /// Create an API error from an HTTP status code
    pub fn api_status(status: u16, message: impl Into<String>) -> Self {
        Self::api(ApiErrorKind::from_status(status), Some(status), message)
    }

    /// Create a transient API error without a status (network failure, timeout)
    pub fn transient(message: impl Into<String>) -> Self {
        Self::api(ApiErrorKind::Transient, None, message)
    }

    /// Create a state store error
    pub fn state_store(msg: impl Into<String>) -> Self {
        Self::StateStore(msg.into())
    }

    /// Create an HTTP error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// The API classification, if this is an API error
    pub fn api_kind(&self) -> Option<ApiErrorKind> {
        match self {
            Error::Api { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Whether the Record Manager should retry the operation
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.api_kind(),
            Some(ApiErrorKind::Transient) | Some(ApiErrorKind::Conflict)
        )
    }

    /// Whether this error aborts the whole run rather than a single domain
    pub fn is_fatal_for_run(&self) -> bool {
        matches!(self, Error::Config(_) | Error::Auth(_))
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
        assert_eq!(ApiErrorKind::from_status(429), ApiErrorKind::Transient);
        assert_eq!(ApiErrorKind::from_status(503), ApiErrorKind::Transient);
        assert_eq!(ApiErrorKind::from_status(412), ApiErrorKind::Conflict);
        assert_eq!(ApiErrorKind::from_status(403), ApiErrorKind::Unauthorized);
        assert_eq!(ApiErrorKind::from_status(404), ApiErrorKind::NotFound);
        assert_eq!(ApiErrorKind::from_status(400), ApiErrorKind::Fatal);
    }

    #[test]
    fn only_transient_and_conflict_retry() {
        assert!(Error::api_status(500, "boom").is_retryable());
        assert!(Error::api_status(412, "etag").is_retryable());
        assert!(!Error::api_status(403, "denied").is_retryable());
        assert!(!Error::api_status(404, "gone").is_retryable());
        assert!(!Error::config("bad").is_retryable());
    }

    #[test]
    fn api_error_display_includes_status() {
        let err = Error::api_status(429, "slow down");
        let text = err.to_string();
        assert!(text.contains("HTTP 429"));
        assert!(text.contains("slow down"));
    }
}
