//! Typed lookup failures
//!
//! Collaborator clients construct these where the failure is first observed
//! (HTTP status, transport error, decode step). Criticality is a property of
//! the variant; nothing downstream re-derives it from message text.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    RateLimited,
    QuotaExceeded,
    ServiceUnavailable,
    Timeout,
    ConnectionReset,
    NotFound,
    EmptyResult,
    Malformed,
}

impl ErrorKind {
    /// Critical kinds abort the whole funnel run
    pub fn is_critical(self) -> bool {
        matches!(
            self,
            ErrorKind::RateLimited
                | ErrorKind::QuotaExceeded
                | ErrorKind::ServiceUnavailable
                | ErrorKind::Timeout
                | ErrorKind::ConnectionReset
        )
    }

    /// Suggested wait before retrying a run that failed with this kind
    pub fn default_retry_after(self) -> Duration {
        match self {
            ErrorKind::QuotaExceeded => Duration::from_secs(3600),
            ErrorKind::RateLimited => Duration::from_secs(60),
            ErrorKind::ServiceUnavailable => Duration::from_secs(30),
            ErrorKind::Timeout => Duration::from_secs(15),
            ErrorKind::ConnectionReset => Duration::from_secs(10),
            ErrorKind::NotFound | ErrorKind::EmptyResult | ErrorKind::Malformed => Duration::ZERO,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::QuotaExceeded => "quota_exceeded",
            ErrorKind::ServiceUnavailable => "service_unavailable",
            ErrorKind::Timeout => "timeout",
            ErrorKind::ConnectionReset => "connection_reset",
            ErrorKind::NotFound => "not_found",
            ErrorKind::EmptyResult => "empty_result",
            ErrorKind::Malformed => "malformed",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum LookupError {
    /// Collaborator throttled us; `retry_after` comes from the response when given
    #[error("Rate limited")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Remote 5xx or connection refused
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// Connection reset / premature close; the only retried subclass
    #[error("Connection reset: {0}")]
    ConnectionReset(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Empty result")]
    EmptyResult,

    /// Response could not be decoded into the expected structure
    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl LookupError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LookupError::RateLimited { .. } => ErrorKind::RateLimited,
            LookupError::QuotaExceeded(_) => ErrorKind::QuotaExceeded,
            LookupError::ServiceUnavailable(_) => ErrorKind::ServiceUnavailable,
            LookupError::Timeout(_) => ErrorKind::Timeout,
            LookupError::ConnectionReset(_) => ErrorKind::ConnectionReset,
            LookupError::NotFound(_) => ErrorKind::NotFound,
            LookupError::EmptyResult => ErrorKind::EmptyResult,
            LookupError::Malformed(_) => ErrorKind::Malformed,
        }
    }

    pub fn is_critical(&self) -> bool {
        self.kind().is_critical()
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, LookupError::ConnectionReset(_))
    }

    /// Server-provided delay if any, else the kind's default
    pub fn retry_after(&self) -> Duration {
        match self {
            LookupError::RateLimited {
                retry_after: Some(delay),
            } => *delay,
            other => other.kind().default_retry_after(),
        }
    }
}

/// A critical lookup failure, tagged with the collaborator that raised it
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{collaborator}: {error}")]
pub struct CriticalError {
    pub collaborator: String,
    pub error: LookupError,
}

impl CriticalError {
    pub fn new(collaborator: impl Into<String>, error: LookupError) -> Self {
        Self {
            collaborator: collaborator.into(),
            error,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }

    pub fn retry_after(&self) -> Duration {
        self.error.retry_after()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_criticality_split() {
        assert!(LookupError::RateLimited { retry_after: None }.is_critical());
        assert!(LookupError::QuotaExceeded("monthly".into()).is_critical());
        assert!(LookupError::ServiceUnavailable("502".into()).is_critical());
        assert!(LookupError::Timeout(Duration::from_secs(15)).is_critical());
        assert!(LookupError::ConnectionReset("reset".into()).is_critical());

        assert!(!LookupError::NotFound("octocat".into()).is_critical());
        assert!(!LookupError::EmptyResult.is_critical());
        assert!(!LookupError::Malformed("no json".into()).is_critical());
    }

    #[test]
    fn test_only_connection_reset_retries() {
        assert!(LookupError::ConnectionReset("eof".into()).is_retryable());
        assert!(!LookupError::ServiceUnavailable("503".into()).is_retryable());
        assert!(!LookupError::Timeout(Duration::from_secs(1)).is_retryable());
    }

    #[test]
    fn test_retry_hint_longer_for_quota() {
        let quota = LookupError::QuotaExceeded("plan".into()).retry_after();
        let transient = LookupError::ConnectionReset("reset".into()).retry_after();
        assert!(quota > transient);
    }

    #[test]
    fn test_server_retry_after_wins() {
        let err = LookupError::RateLimited {
            retry_after: Some(Duration::from_secs(7)),
        };
        assert_eq!(err.retry_after(), Duration::from_secs(7));
        assert_eq!(
            LookupError::RateLimited { retry_after: None }.retry_after(),
            Duration::from_secs(60)
        );
    }

    #[test]
    fn test_critical_error_display() {
        let err = CriticalError::new("github", LookupError::ServiceUnavailable("502".into()));
        assert_eq!(err.to_string(), "github: Service unavailable: 502");
        assert_eq!(err.kind(), ErrorKind::ServiceUnavailable);
    }
}
