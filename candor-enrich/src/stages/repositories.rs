//! Code repository lookup

use super::{absorb, GithubLookup, REPOSITORIES};
use crate::candidate::{Candidate, RepoBrief, RepositorySummary};
use crate::clients::GithubRepo;
use crate::stage::{StageError, Transform};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

const TOP_REPOS: usize = 5;

pub struct RepositoryStage {
    github: Arc<GithubLookup>,
}

impl RepositoryStage {
    pub fn new(github: Arc<GithubLookup>) -> Self {
        Self { github }
    }
}

/// Summarize owned (non-fork) repositories
pub(crate) fn summarize(repos: Vec<GithubRepo>) -> RepositorySummary {
    let mut owned: Vec<GithubRepo> = repos.into_iter().filter(|r| !r.fork).collect();

    let mut language_counts: HashMap<String, usize> = HashMap::new();
    for lang in owned.iter().filter_map(|r| r.language.as_ref()) {
        *language_counts.entry(lang.clone()).or_default() += 1;
    }
    let mut languages: Vec<(String, usize)> = language_counts.into_iter().collect();
    languages.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    owned.sort_by(|a, b| b.stargazers_count.cmp(&a.stargazers_count));

    RepositorySummary {
        count: owned.len() as u32,
        total_stars: owned.iter().map(|r| r.stargazers_count).sum(),
        languages: languages.into_iter().map(|(lang, _)| lang).collect(),
        top: owned
            .into_iter()
            .take(TOP_REPOS)
            .map(|r| RepoBrief {
                name: r.name,
                stars: r.stargazers_count,
                language: r.language,
            })
            .collect(),
    }
}

#[async_trait]
impl Transform<Candidate> for RepositoryStage {
    async fn apply(&self, mut candidate: Candidate) -> Result<Candidate, StageError> {
        let github = &self.github;
        let login = candidate.id.clone();
        let key = github.adapter.params_key(&[("login", login.as_str()), ("resource", "repos")]);

        let fetched = github
            .adapter
            .fetch_or_cache(&key, || github.client.repos(&login))
            .await?;

        let repos = absorb(&mut candidate, REPOSITORIES, fetched);
        candidate.repositories = summarize(repos);
        Ok(candidate)
    }
}
