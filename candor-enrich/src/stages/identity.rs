//! Identity resolution: attach the code-host profile

use super::{absorb, GithubLookup, IDENTITY};
use crate::candidate::Candidate;
use crate::stage::{StageError, Transform};
use async_trait::async_trait;
use std::sync::Arc;

pub struct IdentityStage {
    github: Arc<GithubLookup>,
}

impl IdentityStage {
    pub fn new(github: Arc<GithubLookup>) -> Self {
        Self { github }
    }
}

#[async_trait]
impl Transform<Candidate> for IdentityStage {
    async fn apply(&self, mut candidate: Candidate) -> Result<Candidate, StageError> {
        if candidate.id.trim().is_empty() {
            return Err(StageError::Rejected("empty candidate id".to_string()));
        }

        let github = &self.github;
        let login = candidate.id.clone();
        let key = github.adapter.entity_key(&login);
        let fetched = github
            .adapter
            .fetch_or_cache(&key, || github.client.user(&login))
            .await?;

        let degraded = fetched.is_degraded();
        let profile = absorb(&mut candidate, IDENTITY, fetched);
        if !degraded {
            candidate.profile = Some(profile);
        }
        Ok(candidate)
    }
}
