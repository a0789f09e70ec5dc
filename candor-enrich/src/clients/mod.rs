//! External collaborator clients
//!
//! Thin `reqwest` clients for the code host, the search API and the
//! text-generation service. Each call returns `Result<T, LookupError>`:
//! failures are classified here, where the HTTP status or transport error is
//! first seen. Caching, retry and pacing live in the lookup adapters.

pub mod github;
pub mod search;
pub mod textgen;

pub use github::{GithubClient, GithubRepo};
pub use search::{PatentHit, PatentPage, ScholarHit, ScholarPage, SearchClient};
pub use textgen::TextGenClient;

use crate::lookup::LookupError;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::error::Error as StdError;
use std::io;
use std::time::Duration;

pub(crate) const USER_AGENT: &str = concat!("candor-enrich/", env!("CARGO_PKG_VERSION"));

/// Build the shared HTTP client for one collaborator
pub(crate) fn build_http_client(timeout: Duration) -> Result<reqwest::Client, LookupError> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .map_err(|e| LookupError::ServiceUnavailable(format!("HTTP client setup failed: {}", e)))
}

/// `Retry-After` in delta-seconds form
pub(crate) fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Structured quota signal in an error body (`{"error": {"code": "insufficient_quota"}}`)
fn body_signals_quota(body: &str) -> bool {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return false;
    };
    let error = &value["error"];
    ["code", "type"].iter().any(|field| {
        matches!(
            error[field].as_str(),
            Some("insufficient_quota") | Some("quota_exceeded")
        )
    })
}

/// Classify a non-success HTTP response
pub(crate) fn classify_status(
    status: StatusCode,
    headers: &HeaderMap,
    body: &str,
    what: &str,
) -> LookupError {
    match status {
        StatusCode::TOO_MANY_REQUESTS if body_signals_quota(body) => {
            LookupError::QuotaExceeded(format!("{} (HTTP 429)", what))
        }
        StatusCode::TOO_MANY_REQUESTS => LookupError::RateLimited {
            retry_after: parse_retry_after(headers),
        },
        StatusCode::PAYMENT_REQUIRED => LookupError::QuotaExceeded(format!("{} (HTTP 402)", what)),
        StatusCode::NOT_FOUND | StatusCode::GONE => LookupError::NotFound(what.to_string()),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            LookupError::ServiceUnavailable(format!("{}: access denied (HTTP {})", what, status.as_u16()))
        }
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
            LookupError::ServiceUnavailable(format!("{}: upstream timeout (HTTP {})", what, status.as_u16()))
        }
        s if s.is_server_error() => {
            LookupError::ServiceUnavailable(format!("{}: HTTP {}", what, s.as_u16()))
        }
        s => LookupError::Malformed(format!("{}: unexpected HTTP {}", what, s.as_u16())),
    }
}

/// Walk the source chain for an I/O error kind
fn io_kind_in_chain(err: &(dyn StdError + 'static)) -> Option<io::ErrorKind> {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(io_err) = e.downcast_ref::<io::Error>() {
            return Some(io_err.kind());
        }
        current = e.source();
    }
    None
}

fn is_reset_kind(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
    )
}

/// Classify a transport-level failure
pub(crate) fn classify_transport(err: &reqwest::Error, timeout: Duration) -> LookupError {
    if err.is_timeout() {
        return LookupError::Timeout(timeout);
    }
    if io_kind_in_chain(err).is_some_and(is_reset_kind) {
        return LookupError::ConnectionReset(err.to_string());
    }
    if err.is_decode() {
        return LookupError::Malformed(err.to_string());
    }
    // Connection refused, DNS failure, TLS failure
    LookupError::ServiceUnavailable(err.to_string())
}

/// Send a request and decode a JSON success body
pub(crate) async fn send_json<T: DeserializeOwned>(
    request: reqwest::RequestBuilder,
    timeout: Duration,
    what: &str,
) -> Result<T, LookupError> {
    send_json_with(request, timeout, what, |_, _| None).await
}

/// Like [`send_json`], with a collaborator-specific look at failed responses
///
/// `inspect` sees the status and headers of a non-success response first;
/// when it returns `None` the generic status classification applies.
pub(crate) async fn send_json_with<T, H>(
    request: reqwest::RequestBuilder,
    timeout: Duration,
    what: &str,
    inspect: H,
) -> Result<T, LookupError>
where
    T: DeserializeOwned,
    H: Fn(StatusCode, &HeaderMap) -> Option<LookupError>,
{
    let response = request
        .send()
        .await
        .map_err(|e| classify_transport(&e, timeout))?;

    let status = response.status();
    if !status.is_success() {
        let headers = response.headers().clone();
        if let Some(err) = inspect(status, &headers) {
            return Err(err);
        }
        let body = response.text().await.unwrap_or_default();
        return Err(classify_status(status, &headers, &body, what));
    }

    let body = response
        .text()
        .await
        .map_err(|e| classify_transport(&e, timeout))?;
    serde_json::from_str(&body).map_err(|e| LookupError::Malformed(format!("{}: {}", what, e)))
}
