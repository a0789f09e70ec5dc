//! Candidate record and filter criteria
//!
//! A candidate starts as a bare identifier (a code-host login) and picks up
//! facts as it moves through the funnel. Each stage owns the fields it fills.

use crate::lookup::ErrorKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Public code-host profile
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub login: String,
    pub name: Option<String>,
    pub company: Option<String>,
    pub location: Option<String>,
    pub bio: Option<String>,
    pub blog: Option<String>,
    #[serde(default)]
    pub public_repos: u32,
    #[serde(default)]
    pub followers: u32,
}

/// Scholarly publications attributed to the candidate
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PublicationTally {
    pub total: u32,
    /// Results where the candidate is listed first
    pub first_author: u32,
    pub titles: Vec<String>,
    pub pages_scanned: u32,
    /// Scan ended on the stop rule rather than running out of results
    pub stopped_early: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatentTally {
    pub total: u32,
    pub titles: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoBrief {
    pub name: String,
    pub stars: u32,
    pub language: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepositorySummary {
    pub count: u32,
    pub total_stars: u32,
    /// Distinct primary languages, most used first
    pub languages: Vec<String>,
    pub top: Vec<RepoBrief>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmploymentRecord {
    pub company: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
}

/// Why a field is empty: one note per degraded lookup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentNote {
    pub stage: String,
    pub kind: ErrorKind,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// External identifier (code-host login)
    pub id: String,
    /// Display name, when known before the run
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub profile: Option<Profile>,
    #[serde(default)]
    pub publications: PublicationTally,
    #[serde(default)]
    pub patents: PatentTally,
    #[serde(default)]
    pub repositories: RepositorySummary,
    #[serde(default)]
    pub employment: Vec<EmploymentRecord>,
    #[serde(default)]
    pub notes: Vec<EnrichmentNote>,
}

impl Candidate {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Best available display name: profile name, given name, then id
    pub fn display_name(&self) -> &str {
        self.profile
            .as_ref()
            .and_then(|p| p.name.as_deref())
            .or(self.name.as_deref())
            .unwrap_or(&self.id)
    }

    pub fn note(&mut self, stage: &str, kind: ErrorKind, reason: impl Into<String>) {
        self.notes.push(EnrichmentNote {
            stage: stage.to_string(),
            kind,
            reason: reason.into(),
        });
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// Filter criteria supplied with a run
///
/// Every field is optional; an unset field keeps every candidate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterCriteria {
    /// Case-insensitive substring of the profile location
    pub location: Option<String>,
    pub min_publications: Option<u32>,
    pub require_first_author: bool,
    pub min_patents: Option<u32>,
    pub min_stars: Option<u32>,
    /// Keep candidates using any of these languages
    pub languages: Vec<String>,
    /// Keep candidates who worked at any of these companies
    pub companies: Vec<String>,
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

impl FilterCriteria {
    pub fn location_matches(&self, candidate: &Candidate) -> bool {
        let Some(wanted) = self.location.as_deref() else {
            return true;
        };
        candidate
            .profile
            .as_ref()
            .and_then(|p| p.location.as_deref())
            .is_some_and(|loc| contains_ci(loc, wanted))
    }

    pub fn publications_match(&self, candidate: &Candidate) -> bool {
        let tally = &candidate.publications;
        if self.require_first_author && tally.first_author == 0 {
            return false;
        }
        self.min_publications.map_or(true, |min| tally.total >= min)
    }

    pub fn patents_match(&self, candidate: &Candidate) -> bool {
        self.min_patents
            .map_or(true, |min| candidate.patents.total >= min)
    }

    pub fn repositories_match(&self, candidate: &Candidate) -> bool {
        let repos = &candidate.repositories;
        if let Some(min) = self.min_stars {
            if repos.total_stars < min {
                return false;
            }
        }
        self.languages.is_empty()
            || self
                .languages
                .iter()
                .any(|want| repos.languages.iter().any(|l| l.eq_ignore_ascii_case(want)))
    }

    pub fn employment_matches(&self, candidate: &Candidate) -> bool {
        if self.companies.is_empty() {
            return true;
        }
        let profile_company = candidate.profile.as_ref().and_then(|p| p.company.as_deref());
        self.companies.iter().any(|want| {
            candidate
                .employment
                .iter()
                .any(|job| contains_ci(&job.company, want))
                || profile_company.is_some_and(|c| contains_ci(c, want))
        })
    }
}
