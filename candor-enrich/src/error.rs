//! Error types for candor-enrich
//!
//! Maps funnel failures onto HTTP: throttling → 429 with `Retry-After`,
//! connectivity → 503, timeouts → 504.

use crate::funnel::RunFailure;
use crate::lookup::ErrorKind;
use axum::{
    http::{header::RETRY_AFTER, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Funnel run aborted on a critical lookup failure
    #[error(transparent)]
    RunFailed(#[from] RunFailure),
}

fn run_failure_status(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::RateLimited | ErrorKind::QuotaExceeded => StatusCode::TOO_MANY_REQUESTS,
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::SERVICE_UNAVAILABLE,
    }
}

fn run_failure_response(failure: RunFailure) -> Response {
    let status = run_failure_status(failure.kind);
    let retry_after = failure.retry_after_secs;
    let body = Json(json!({
        "error": {
            "code": failure.kind.as_str().to_uppercase(),
            "message": failure.to_string(),
            "retry_after_secs": retry_after,
            "failure": failure,
        }
    }));

    let mut response = (status, body).into_response();
    if let Ok(value) = HeaderValue::from_str(&retry_after.to_string()) {
        response.headers_mut().insert(RETRY_AFTER, value);
    }
    response
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::RunFailed(failure) => run_failure_response(failure),
            ApiError::BadRequest(message) => {
                let body = Json(json!({
                    "error": {
                        "code": "BAD_REQUEST",
                        "message": message,
                    }
                }));
                (StatusCode::BAD_REQUEST, body).into_response()
            }
        }
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn failure(kind: ErrorKind, retry_after_secs: u64) -> RunFailure {
        RunFailure {
            run_id: Uuid::new_v4(),
            kind,
            stage: "publications".into(),
            collaborator: "scholar".into(),
            candidate: "octocat".into(),
            message: "throttled".into(),
            retry_after_secs,
            completed_stages: Vec::new(),
        }
    }

    #[test]
    fn test_rate_limit_maps_to_429_with_retry_after() {
        let response = ApiError::from(failure(ErrorKind::RateLimited, 60)).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(RETRY_AFTER).unwrap(), "60");
    }

    #[test]
    fn test_connectivity_and_timeout_statuses() {
        let unavailable = ApiError::from(failure(ErrorKind::ServiceUnavailable, 30)).into_response();
        assert_eq!(unavailable.status(), StatusCode::SERVICE_UNAVAILABLE);

        let reset = ApiError::from(failure(ErrorKind::ConnectionReset, 10)).into_response();
        assert_eq!(reset.status(), StatusCode::SERVICE_UNAVAILABLE);

        let timeout = ApiError::from(failure(ErrorKind::Timeout, 15)).into_response();
        assert_eq!(timeout.status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn test_bad_request() {
        let response = ApiError::BadRequest("no candidates".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(response.headers().get(RETRY_AFTER).is_none());
    }
}
