//! Publication lookup
//!
//! Pages through scholar results for the candidate's name, tallying total
//! and first-author hits. Paging ends when results run out, the page limit
//! is reached, or the stop rule holds for the tally so far.

use super::{absorb, SearchLookup, PUBLICATIONS};
use crate::candidate::{Candidate, PublicationTally};
use crate::cache::key::normalize_text;
use crate::clients::{ScholarHit, ScholarPage};
use crate::lookup::{CriticalError, Fetched};
use crate::stage::{accumulate_until, StageError, Transform};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;

/// When to stop scanning
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopRule {
    /// Stop at the first first-author hit
    #[default]
    FirstMatch,
    /// Count everything up to the page limit
    Exhaustive,
}

impl StopRule {
    pub fn should_stop(self, tally: &PublicationTally) -> bool {
        match self {
            StopRule::FirstMatch => tally.first_author > 0,
            StopRule::Exhaustive => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublicationOptions {
    pub stop_rule: StopRule,
    pub max_pages: u32,
}

impl Default for PublicationOptions {
    fn default() -> Self {
        Self {
            stop_rule: StopRule::FirstMatch,
            max_pages: 3,
        }
    }
}

/// True if the first listed author in `summary` looks like `name`
///
/// Scholar author lines abbreviate given names ("J Smith, A Doe - Venue"),
/// so this compares the surname and the first initial.
pub fn is_first_author(summary: &str, name: &str) -> bool {
    let authors = summary.split(" - ").next().unwrap_or_default();
    let first = normalize_text(authors.split(',').next().unwrap_or_default());
    let wanted = normalize_text(name);

    let (Some(first_surname), Some(wanted_surname)) =
        (first.split(' ').last(), wanted.split(' ').last())
    else {
        return false;
    };
    if first_surname.is_empty() || first_surname != wanted_surname {
        return false;
    }

    let first_initial = first.chars().next();
    let wanted_initial = wanted.chars().next();
    first_initial == wanted_initial
}

fn fold_hit(tally: &mut PublicationTally, hit: ScholarHit, name: &str) {
    tally.total += 1;
    if is_first_author(&hit.summary, name) {
        tally.first_author += 1;
    }
    tally.titles.push(hit.title);
}

/// Page through results with `fetch_page` until done
///
/// Degraded pages end the scan; `on_degraded` sees each one.
pub async fn scan_publications<F, Fut>(
    name: &str,
    options: PublicationOptions,
    fetch_page: F,
    mut on_degraded: impl FnMut(&Fetched<ScholarPage>),
) -> Result<PublicationTally, CriticalError>
where
    F: Fn(u32) -> Fut,
    Fut: Future<Output = Result<Fetched<ScholarPage>, CriticalError>>,
{
    let mut tally = PublicationTally::default();

    for page in 0..options.max_pages {
        let fetched = fetch_page(page).await?;
        if fetched.is_degraded() {
            on_degraded(&fetched);
            break;
        }
        tally.pages_scanned += 1;

        let ScholarPage { hits, has_more } = fetched.payload;
        let scanned = accumulate_until(
            hits,
            tally,
            |t, hit| fold_hit(t, hit, name),
            |t| options.stop_rule.should_stop(t),
        );
        tally = scanned.state;

        if scanned.stopped_early {
            tally.stopped_early = true;
            break;
        }
        if !has_more {
            break;
        }
    }

    Ok(tally)
}

pub struct PublicationStage {
    search: Arc<SearchLookup>,
    options: PublicationOptions,
}

impl PublicationStage {
    pub fn new(search: Arc<SearchLookup>, options: PublicationOptions) -> Self {
        Self { search, options }
    }
}

#[async_trait]
impl Transform<Candidate> for PublicationStage {
    async fn apply(&self, mut candidate: Candidate) -> Result<Candidate, StageError> {
        let search = &self.search;
        let name = candidate.display_name().to_string();

        let mut degraded = None;
        let tally = scan_publications(
            &name,
            self.options,
            |page| {
                let name = name.as_str();
                async move {
                    let page_str = page.to_string();
                    let key = search
                        .scholar
                        .params_key(&[("author", name), ("page", page_str.as_str())]);
                    search
                        .scholar
                        .fetch_or_cache(&key, || search.client.scholar_page(name, page))
                        .await
                }
            },
            |fetched| degraded = Some(fetched.clone()),
        )
        .await?;

        if let Some(fetched) = degraded {
            absorb(&mut candidate, PUBLICATIONS, fetched);
        }
        candidate.publications = tally;
        Ok(candidate)
    }
}
