//! Standard enrichment stages
//!
//! identity → publications → patents → repositories → employment
//!
//! Later stages read fields filled in by earlier ones (the publication and
//! patent searches use the display name from the identity stage). A stage
//! whose collaborator is not configured is left out of the funnel.

pub mod employment;
pub mod identity;
pub mod patents;
pub mod publications;
pub mod repositories;

pub use employment::EmploymentStage;
pub use identity::IdentityStage;
pub use patents::PatentStage;
pub use publications::{PublicationOptions, PublicationStage, StopRule};
pub use repositories::RepositoryStage;

use crate::cache::CacheStore;
use crate::candidate::{Candidate, FilterCriteria};
use crate::clients::github::{GITHUB_BASE_URL, GITHUB_TIMEOUT};
use crate::clients::search::{SEARCH_BASE_URL, SEARCH_TIMEOUT};
use crate::clients::textgen::TEXTGEN_TIMEOUT;
use crate::clients::{GithubClient, SearchClient, TextGenClient};
use crate::config::EnrichConfig;
use crate::lookup::{AdapterConfig, AdapterStats, Fetched, LookupAdapter, LookupError};
use crate::scheduler::BatchOptions;
use crate::stage::Stage;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

pub const IDENTITY: &str = "identity";
pub const PUBLICATIONS: &str = "publications";
pub const PATENTS: &str = "patents";
pub const REPOSITORIES: &str = "repositories";
pub const EMPLOYMENT: &str = "employment";

/// Code host: one client, one adapter for profiles and repositories
pub struct GithubLookup {
    pub client: GithubClient,
    pub adapter: LookupAdapter,
}

/// Search API: separate adapters keep scholar and patent keys apart
pub struct SearchLookup {
    pub client: SearchClient,
    pub scholar: LookupAdapter,
    pub patents: LookupAdapter,
}

pub struct TextGenLookup {
    pub client: TextGenClient,
    pub adapter: LookupAdapter,
}

/// Configured collaborators sharing one cache
#[derive(Clone)]
pub struct Collaborators {
    pub github: Arc<GithubLookup>,
    pub search: Option<Arc<SearchLookup>>,
    pub textgen: Option<Arc<TextGenLookup>>,
}

impl Collaborators {
    pub fn from_config(config: &EnrichConfig, cache: &CacheStore) -> Result<Self, LookupError> {
        let github = Arc::new(GithubLookup {
            client: GithubClient::with_base_url(
                config.github_base_url.as_deref().unwrap_or(GITHUB_BASE_URL),
                config.github_token.clone(),
            )?,
            adapter: LookupAdapter::new(AdapterConfig::new("github", GITHUB_TIMEOUT), cache.clone()),
        });

        let politeness = Duration::from_millis(config.search_politeness_ms);
        let search = match &config.search_api_key {
            Some(key) => Some(Arc::new(SearchLookup {
                client: SearchClient::with_base_url(
                    config.search_base_url.as_deref().unwrap_or(SEARCH_BASE_URL),
                    key.clone(),
                )?,
                scholar: LookupAdapter::new(
                    AdapterConfig::new("scholar", SEARCH_TIMEOUT).with_politeness_delay(politeness),
                    cache.clone(),
                ),
                patents: LookupAdapter::new(
                    AdapterConfig::new("patents", SEARCH_TIMEOUT).with_politeness_delay(politeness),
                    cache.clone(),
                ),
            })),
            None => None,
        };

        let textgen = match &config.textgen_api_key {
            Some(key) => Some(Arc::new(TextGenLookup {
                client: TextGenClient::new(
                    config.textgen_base_url.clone(),
                    key.clone(),
                    config.textgen_model.clone(),
                )?,
                adapter: LookupAdapter::new(AdapterConfig::new("textgen", TEXTGEN_TIMEOUT), cache.clone()),
            })),
            None => None,
        };

        Ok(Self {
            github,
            search,
            textgen,
        })
    }

    /// Stages `standard_funnel` builds with these collaborators, in order
    pub fn stage_names(&self) -> Vec<&'static str> {
        let mut names = vec![IDENTITY];
        if self.search.is_some() {
            names.extend([PUBLICATIONS, PATENTS]);
        }
        names.push(REPOSITORIES);
        if self.textgen.is_some() {
            names.push(EMPLOYMENT);
        }
        names
    }

    /// Activity counters per adapter
    pub fn adapter_stats(&self) -> Vec<(String, AdapterStats)> {
        let mut adapters = vec![&self.github.adapter];
        if let Some(search) = &self.search {
            adapters.push(&search.scholar);
            adapters.push(&search.patents);
        }
        if let Some(textgen) = &self.textgen {
            adapters.push(&textgen.adapter);
        }
        adapters
            .into_iter()
            .map(|a| (a.name().to_string(), a.stats()))
            .collect()
    }
}

/// Record a degraded lookup on the candidate and pass the payload through
pub(crate) fn absorb<T>(candidate: &mut Candidate, stage: &str, fetched: Fetched<T>) -> T {
    if let Some((kind, reason)) = fetched.degraded() {
        candidate.note(stage, kind, reason);
    }
    fetched.payload
}

/// Build the standard funnel for one run
///
/// Every stage gets `batch` as its scheduling parameters; per-run overrides
/// are applied by the controller.
pub fn standard_funnel(
    collaborators: &Collaborators,
    criteria: &FilterCriteria,
    publication_options: PublicationOptions,
    batch: BatchOptions,
) -> Vec<Stage<Candidate>> {
    let criteria = Arc::new(criteria.clone());
    let mut stages = Vec::with_capacity(5);

    let c = criteria.clone();
    stages.push(
        Stage::new(IDENTITY, IdentityStage::new(collaborators.github.clone()))
            .with_filter(move |cand| c.location_matches(cand))
            .with_options(batch),
    );

    match &collaborators.search {
        Some(search) => {
            let c = criteria.clone();
            stages.push(
                Stage::new(
                    PUBLICATIONS,
                    PublicationStage::new(search.clone(), publication_options),
                )
                .with_filter(move |cand| c.publications_match(cand))
                .with_options(batch),
            );
            let c = criteria.clone();
            stages.push(
                Stage::new(PATENTS, PatentStage::new(search.clone()))
                    .with_filter(move |cand| c.patents_match(cand))
                    .with_options(batch),
            );
        }
        None => warn!("No search API key configured, skipping publication and patent stages"),
    }

    let c = criteria.clone();
    stages.push(
        Stage::new(REPOSITORIES, RepositoryStage::new(collaborators.github.clone()))
            .with_filter(move |cand| c.repositories_match(cand))
            .with_options(batch),
    );

    match &collaborators.textgen {
        Some(textgen) => {
            let c = criteria;
            stages.push(
                Stage::new(EMPLOYMENT, EmploymentStage::new(textgen.clone()))
                    .with_filter(move |cand| c.employment_matches(cand))
                    .with_options(batch),
            );
        }
        None => warn!("No text-generation API key configured, skipping employment stage"),
    }

    stages
}
