//! Patent lookup by inventor name

use super::{absorb, SearchLookup, PATENTS};
use crate::candidate::{Candidate, PatentTally};
use crate::clients::PatentPage;
use crate::stage::{StageError, Transform};
use async_trait::async_trait;
use std::sync::Arc;

pub struct PatentStage {
    search: Arc<SearchLookup>,
}

impl PatentStage {
    pub fn new(search: Arc<SearchLookup>) -> Self {
        Self { search }
    }
}

pub(crate) fn tally(page: PatentPage) -> PatentTally {
    let listed = page.hits.len() as u32;
    PatentTally {
        total: page.total.map_or(listed, |reported| reported.max(listed)),
        titles: page.hits.into_iter().map(|h| h.title).collect(),
    }
}

#[async_trait]
impl Transform<Candidate> for PatentStage {
    async fn apply(&self, mut candidate: Candidate) -> Result<Candidate, StageError> {
        let search = &self.search;
        let inventor = candidate.display_name().to_string();
        let key = search.patents.query_key(&inventor);

        let fetched = search
            .patents
            .fetch_or_cache(&key, || search.client.patents(&inventor))
            .await?;

        let page = absorb(&mut candidate, PATENTS, fetched);
        candidate.patents = tally(page);
        Ok(candidate)
    }
}
