//! Employment history extraction
//!
//! Asks the text-generation service to turn what is known about the
//! candidate into a JSON list of positions. The reply goes through the
//! decode step; an undecodable reply degrades to an empty history with the
//! decode failure as the reason.

use super::{absorb, TextGenLookup, EMPLOYMENT};
use crate::candidate::{Candidate, EmploymentRecord};
use crate::clients::TextGenClient;
use crate::decode::{decode_json, Decoded};
use crate::lookup::LookupError;
use crate::stage::{StageError, Transform};
use async_trait::async_trait;
use std::sync::Arc;

const SYSTEM_PROMPT: &str = "You extract employment history. Reply with a JSON array only. \
Each element has the fields company, title, start and end. Use null for unknown values. \
Reply with [] if nothing is known.";

pub struct EmploymentStage {
    textgen: Arc<TextGenLookup>,
}

impl EmploymentStage {
    pub fn new(textgen: Arc<TextGenLookup>) -> Self {
        Self { textgen }
    }
}

/// Prompt body from the candidate's known facts
pub(crate) fn describe(candidate: &Candidate) -> String {
    let mut lines = vec![format!("Name: {}", candidate.display_name())];
    if let Some(profile) = &candidate.profile {
        if let Some(company) = &profile.company {
            lines.push(format!("Current company: {}", company));
        }
        if let Some(bio) = &profile.bio {
            lines.push(format!("Bio: {}", bio));
        }
        if let Some(blog) = &profile.blog {
            lines.push(format!("Website: {}", blog));
        }
    }
    lines.join("\n")
}

async fn extract(client: &TextGenClient, prompt: &str) -> Result<Vec<EmploymentRecord>, LookupError> {
    let reply = client.complete(SYSTEM_PROMPT, prompt).await?;
    match decode_json::<Vec<EmploymentRecord>>(&reply) {
        Decoded::Decoded(records) => Ok(records
            .into_iter()
            .filter(|r| !r.company.trim().is_empty())
            .collect()),
        Decoded::Malformed { reason, .. } => Err(LookupError::Malformed(reason)),
    }
}

#[async_trait]
impl Transform<Candidate> for EmploymentStage {
    async fn apply(&self, mut candidate: Candidate) -> Result<Candidate, StageError> {
        let textgen = &self.textgen;
        let prompt = describe(&candidate);
        let key = textgen
            .adapter
            .params_key(&[("model", textgen.client.model()), ("prompt", prompt.as_str())]);

        let fetched = textgen
            .adapter
            .fetch_or_cache(&key, || extract(&textgen.client, &prompt))
            .await?;

        let records = absorb(&mut candidate, EMPLOYMENT, fetched);
        candidate.employment = records;
        Ok(candidate)
    }
}
