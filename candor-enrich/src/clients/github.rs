//! GitHub REST client
//!
//! Profiles and public repositories. Unauthenticated access works but has a
//! much smaller hourly quota; a token is sent when configured.

use super::{build_http_client, parse_retry_after, send_json_with};
use crate::candidate::Profile;
use crate::lookup::LookupError;
use chrono::Utc;
use reqwest::header::{HeaderMap, ACCEPT, AUTHORIZATION};
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const GITHUB_BASE_URL: &str = "https://api.github.com";
pub const GITHUB_TIMEOUT: Duration = Duration::from_secs(15);
const REPOS_PER_PAGE: u32 = 100;
const MAX_LOGIN_LEN: usize = 39;

/// Repository as returned by `/users/{login}/repos`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GithubRepo {
    pub name: String,
    #[serde(default)]
    pub stargazers_count: u32,
    pub language: Option<String>,
    #[serde(default)]
    pub fork: bool,
}

/// ASCII letters, digits and inner hyphens, at most 39 characters
pub fn is_valid_login(login: &str) -> bool {
    !login.is_empty()
        && login.len() <= MAX_LOGIN_LEN
        && !login.starts_with('-')
        && !login.ends_with('-')
        && login.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

pub struct GithubClient {
    http: reqwest::Client,
    base_url: Url,
    token: Option<String>,
}

impl GithubClient {
    pub fn with_base_url(base_url: &str, token: Option<String>) -> Result<Self, LookupError> {
        let base_url = Url::parse(base_url)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| {
                LookupError::ServiceUnavailable(format!("invalid GitHub base URL '{}'", base_url))
            })?;

        Ok(Self {
            http: build_http_client(GITHUB_TIMEOUT)?,
            base_url,
            token,
        })
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    /// Base URL plus `segments`, each percent-encoded as one path segment
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Fetch a user profile
    pub async fn user(&self, login: &str) -> Result<Profile, LookupError> {
        let what = format!("user {}", login);
        if !is_valid_login(login) {
            return Err(LookupError::NotFound(format!("{}: not a valid login", what)));
        }
        self.get_json(self.endpoint(&["users", login]), &what).await
    }

    /// Fetch a user's public repositories (first page, most recently pushed)
    pub async fn repos(&self, login: &str) -> Result<Vec<GithubRepo>, LookupError> {
        let what = format!("repos of {}", login);
        if !is_valid_login(login) {
            return Err(LookupError::NotFound(format!("{}: not a valid login", what)));
        }
        let mut url = self.endpoint(&["users", login, "repos"]);
        url.query_pairs_mut()
            .append_pair("per_page", &REPOS_PER_PAGE.to_string())
            .append_pair("sort", "pushed");
        self.get_json(url, &what).await
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url, what: &str) -> Result<T, LookupError> {
        tracing::debug!(url = %url, "Querying GitHub API");

        let mut request = self
            .http
            .get(url)
            .header(ACCEPT, "application/vnd.github+json");
        if let Some(token) = &self.token {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token));
        }

        send_json_with(request, GITHUB_TIMEOUT, what, primary_rate_limit).await
    }
}

/// GitHub reports quota exhaustion as 403/429 with `x-ratelimit-remaining: 0`
fn primary_rate_limit(status: StatusCode, headers: &HeaderMap) -> Option<LookupError> {
    if status != StatusCode::FORBIDDEN && status != StatusCode::TOO_MANY_REQUESTS {
        return None;
    }

    let remaining = headers
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());

    match remaining {
        Some(0) => {
            let until_reset = headers
                .get("x-ratelimit-reset")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<i64>().ok())
                .map(|reset| Duration::from_secs((reset - Utc::now().timestamp()).max(1) as u64));
            Some(LookupError::RateLimited {
                retry_after: until_reset,
            })
        }
        // Secondary limits carry Retry-After instead
        _ => parse_retry_after(headers).map(|delay| LookupError::RateLimited {
            retry_after: Some(delay),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::ErrorKind;
    use reqwest::header::{HeaderValue, RETRY_AFTER};

    #[test]
    fn test_exhausted_quota_is_rate_limited() {
        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-remaining", HeaderValue::from_static("0"));
        let reset = (Utc::now().timestamp() + 120).to_string();
        headers.insert("x-ratelimit-reset", HeaderValue::from_str(&reset).unwrap());

        let err = primary_rate_limit(StatusCode::FORBIDDEN, &headers).unwrap();
        assert_eq!(err.kind(), ErrorKind::RateLimited);
        let wait = err.retry_after();
        assert!(wait > Duration::from_secs(100) && wait <= Duration::from_secs(120));
    }

    #[test]
    fn test_secondary_limit_uses_retry_after() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("30"));

        let err = primary_rate_limit(StatusCode::FORBIDDEN, &headers).unwrap();
        assert_eq!(err.retry_after(), Duration::from_secs(30));
    }

    #[test]
    fn test_plain_forbidden_is_not_rate_limit() {
        assert!(primary_rate_limit(StatusCode::FORBIDDEN, &HeaderMap::new()).is_none());
        assert!(primary_rate_limit(StatusCode::NOT_FOUND, &HeaderMap::new()).is_none());
    }

    #[test]
    fn test_repo_payload_shape() {
        let json = r#"[{"name": "hello", "stargazers_count": 12, "language": "Rust", "fork": false, "id": 1}]"#;
        let repos: Vec<GithubRepo> = serde_json::from_str(json).unwrap();
        assert_eq!(repos[0].stargazers_count, 12);
        assert_eq!(repos[0].language.as_deref(), Some("Rust"));
    }

    #[test]
    fn test_login_charset() {
        assert!(is_valid_login("octocat"));
        assert!(is_valid_login("mona-lisa-42"));
        assert!(!is_valid_login(""));
        assert!(!is_valid_login("-octocat"));
        assert!(!is_valid_login("octocat-"));
        assert!(!is_valid_login("../orgs/rust-lang"));
        assert!(!is_valid_login("octocat?per_page=1"));
        assert!(!is_valid_login("a/repos"));
        assert!(!is_valid_login(&"a".repeat(40)));
    }

    #[test]
    fn test_endpoint_encodes_segments() {
        let client = GithubClient::with_base_url("http://localhost:9999/", None).unwrap();
        assert_eq!(
            client.endpoint(&["users", "octocat"]).as_str(),
            "http://localhost:9999/users/octocat"
        );
        assert_eq!(
            client.endpoint(&["users", "a/b?c"]).as_str(),
            "http://localhost:9999/users/a%2Fb%3Fc"
        );
        assert!(!client.has_token());

        let nested = GithubClient::with_base_url("http://localhost:9999/api/v3/", None).unwrap();
        assert_eq!(
            nested.endpoint(&["users", "octocat", "repos"]).as_str(),
            "http://localhost:9999/api/v3/users/octocat/repos"
        );
    }

    #[test]
    fn test_bad_base_url_rejected() {
        assert!(GithubClient::with_base_url("not a url", None).is_err());
        assert!(GithubClient::with_base_url("mailto:someone@example.com", None).is_err());
    }

    #[tokio::test]
    async fn test_invalid_login_never_requested() {
        // Nothing listens on port 9; a request would fail as unavailable
        let client = GithubClient::with_base_url("http://127.0.0.1:9", None).unwrap();

        let err = client.user("../orgs/rust-lang").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = client.repos("a/repos").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
