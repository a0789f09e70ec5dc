//! Search API client (SerpAPI-compatible)
//!
//! Two engines are used: Google Scholar for publications and Google Patents
//! for patents. Results are reduced to the few fields the stages read, which
//! keeps cached payloads small.

use super::{build_http_client, send_json};
use crate::lookup::LookupError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const SEARCH_BASE_URL: &str = "https://serpapi.com";
pub const SEARCH_TIMEOUT: Duration = Duration::from_secs(30);
pub const SCHOLAR_PAGE_SIZE: u32 = 20;
const PATENT_PAGE_SIZE: u32 = 20;

/// One scholar result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScholarHit {
    pub title: String,
    /// Author line, e.g. "J Smith, A Doe - Nature, 2020 - nature.com"
    pub summary: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScholarPage {
    pub hits: Vec<ScholarHit>,
    pub has_more: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatentHit {
    pub title: String,
    pub patent_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatentPage {
    pub hits: Vec<PatentHit>,
    /// Total reported by the engine, when given
    pub total: Option<u32>,
}

// Wire shapes

#[derive(Debug, Deserialize)]
struct RawResponse<T> {
    #[serde(default = "Vec::new")]
    organic_results: Vec<T>,
    error: Option<String>,
    serpapi_pagination: Option<RawPagination>,
    search_information: Option<RawSearchInfo>,
}

#[derive(Debug, Deserialize)]
struct RawPagination {
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawSearchInfo {
    total_results: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct RawScholarResult {
    title: String,
    publication_info: Option<RawPublicationInfo>,
}

#[derive(Debug, Deserialize)]
struct RawPublicationInfo {
    summary: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawPatentResult {
    title: String,
    patent_id: Option<String>,
}

/// Map an in-body `error` string onto the taxonomy
fn classify_body_error(message: &str) -> LookupError {
    let lower = message.to_lowercase();
    if lower.contains("run out of searches") {
        LookupError::QuotaExceeded(message.to_string())
    } else if lower.contains("hasn't returned any results") {
        LookupError::EmptyResult
    } else {
        LookupError::Malformed(message.to_string())
    }
}

pub struct SearchClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl SearchClient {
    pub fn with_base_url(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, LookupError> {
        Ok(Self {
            http: build_http_client(SEARCH_TIMEOUT)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    async fn search<T: serde::de::DeserializeOwned>(
        &self,
        params: &[(&str, String)],
        what: &str,
    ) -> Result<RawResponse<T>, LookupError> {
        let url = format!("{}/search.json", self.base_url);
        tracing::debug!(url = %url, what, "Querying search API");

        let request = self
            .http
            .get(&url)
            .query(params)
            .query(&[("api_key", self.api_key.as_str())]);
        let raw: RawResponse<T> = send_json(request, SEARCH_TIMEOUT, what).await?;

        if let Some(message) = &raw.error {
            return Err(classify_body_error(message));
        }
        Ok(raw)
    }

    /// One page of scholar results for `author:"<name>"`
    pub async fn scholar_page(&self, author: &str, page: u32) -> Result<ScholarPage, LookupError> {
        let params = [
            ("engine", "google_scholar".to_string()),
            ("q", format!("author:\"{}\"", author)),
            ("num", SCHOLAR_PAGE_SIZE.to_string()),
            ("start", (page * SCHOLAR_PAGE_SIZE).to_string()),
        ];
        let raw: RawResponse<RawScholarResult> = self
            .search(&params, &format!("scholar page {} for {}", page, author))
            .await?;

        let has_more = raw.serpapi_pagination.and_then(|p| p.next).is_some();
        Ok(ScholarPage {
            hits: raw
                .organic_results
                .into_iter()
                .map(|r| ScholarHit {
                    title: r.title,
                    summary: r.publication_info.and_then(|i| i.summary).unwrap_or_default(),
                })
                .collect(),
            has_more,
        })
    }

    /// First page of patents naming `inventor`
    pub async fn patents(&self, inventor: &str) -> Result<PatentPage, LookupError> {
        let params = [
            ("engine", "google_patents".to_string()),
            ("inventor", inventor.to_string()),
            ("num", PATENT_PAGE_SIZE.to_string()),
        ];
        let raw: RawResponse<RawPatentResult> = self
            .search(&params, &format!("patents for {}", inventor))
            .await?;

        Ok(PatentPage {
            total: raw.search_information.and_then(|i| i.total_results),
            hits: raw
                .organic_results
                .into_iter()
                .map(|r| PatentHit {
                    title: r.title,
                    patent_id: r.patent_id,
                })
                .collect(),
        })
    }
}
