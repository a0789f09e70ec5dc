//! Enrichment endpoint
//!
//! POST /enrich runs the standard funnel over the posted candidates and
//! returns the run summary. A run that aborts on a critical lookup failure
//! comes back as an error response with a retry hint.

use crate::candidate::{Candidate, FilterCriteria};
use crate::error::{ApiError, ApiResult};
use crate::funnel::{FunnelController, RunOptions, RunSummary};
use crate::scheduler::BatchOptions;
use crate::stages::{standard_funnel, PublicationOptions};
use crate::AppState;
use axum::{extract::State, routing::post, Json, Router};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::{info, warn};

/// A candidate as posted: a bare id or an id with a display name
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CandidateInput {
    Id(String),
    Detailed { id: String, name: Option<String> },
}

impl CandidateInput {
    fn id(&self) -> &str {
        match self {
            CandidateInput::Id(id) => id,
            CandidateInput::Detailed { id, .. } => id,
        }
    }

    fn into_candidate(self) -> Candidate {
        match self {
            CandidateInput::Id(id) => Candidate::new(id.trim()),
            CandidateInput::Detailed { id, name } => {
                let candidate = Candidate::new(id.trim());
                match name {
                    Some(name) if !name.trim().is_empty() => candidate.with_name(name.trim()),
                    _ => candidate,
                }
            }
        }
    }
}

/// Scheduling override; unset fields keep the configured value
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BatchOverride {
    pub batch_size: Option<usize>,
    pub inter_batch_delay_ms: Option<u64>,
    pub per_item_timeout_secs: Option<u64>,
}

impl BatchOverride {
    fn apply(&self, base: BatchOptions) -> BatchOptions {
        BatchOptions {
            batch_size: self.batch_size.unwrap_or(base.batch_size),
            inter_batch_delay: self
                .inter_batch_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(base.inter_batch_delay),
            per_item_timeout: self
                .per_item_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(base.per_item_timeout),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EnrichOptions {
    pub max_results: Option<usize>,
    pub max_candidates_to_consider: Option<usize>,
    /// Applies to every stage
    #[serde(flatten)]
    pub batch: BatchOverride,
    /// Per-stage overrides keyed by stage name
    pub stages: HashMap<String, BatchOverride>,
    pub publications: PublicationOptions,
}

/// POST /enrich request body
#[derive(Debug, Clone, Deserialize)]
pub struct EnrichRequest {
    pub candidates: Vec<CandidateInput>,
    #[serde(default)]
    pub criteria: FilterCriteria,
    #[serde(default)]
    pub options: EnrichOptions,
}

/// Validate and normalize the posted candidate list
///
/// Blank ids are rejected; repeated ids keep their first occurrence.
pub fn prepare_candidates(inputs: Vec<CandidateInput>) -> ApiResult<Vec<Candidate>> {
    if inputs.is_empty() {
        return Err(ApiError::BadRequest("candidates must not be empty".to_string()));
    }
    if let Some(pos) = inputs.iter().position(|c| c.id().trim().is_empty()) {
        return Err(ApiError::BadRequest(format!("candidate {} has an empty id", pos)));
    }

    let mut seen = HashSet::new();
    let mut candidates = Vec::with_capacity(inputs.len());
    for input in inputs {
        let candidate = input.into_candidate();
        if seen.insert(candidate.id.to_lowercase()) {
            candidates.push(candidate);
        } else {
            warn!(candidate = %candidate.id, "Duplicate candidate dropped");
        }
    }
    Ok(candidates)
}

/// Combine configured defaults with request overrides
pub fn resolve_options(
    state: &AppState,
    options: &EnrichOptions,
    stage_names: &[String],
) -> ApiResult<(RunOptions, BatchOptions)> {
    let mut run = RunOptions::from(&state.funnel);
    if let Some(max) = options.max_results {
        run.max_results = max;
    }
    if run.max_results == 0 {
        return Err(ApiError::BadRequest("max_results must be at least 1".to_string()));
    }
    run.max_candidates_to_consider = options.max_candidates_to_consider;

    let batch = options.batch.apply(BatchOptions::from(&state.funnel));
    for (stage, over) in &options.stages {
        if !stage_names.iter().any(|name| name == stage) {
            return Err(ApiError::BadRequest(format!("unknown stage '{}'", stage)));
        }
        run.batch_overrides.insert(stage.clone(), over.apply(batch));
    }
    Ok((run, batch))
}

/// POST /enrich
pub async fn enrich(
    State(state): State<AppState>,
    Json(request): Json<EnrichRequest>,
) -> ApiResult<Json<RunSummary<Candidate>>> {
    let candidates = prepare_candidates(request.candidates)?;
    let stage_names: Vec<String> = state
        .collaborators
        .stage_names()
        .into_iter()
        .map(str::to_string)
        .collect();
    let (run_options, batch) = resolve_options(&state, &request.options, &stage_names)?;

    let stages = standard_funnel(
        &state.collaborators,
        &request.criteria,
        request.options.publications,
        batch,
    );
    let controller = FunnelController::new(stages).with_events(state.event_bus.clone());

    info!(
        candidates = candidates.len(),
        max_results = run_options.max_results,
        "Enrichment requested"
    );

    match controller.run(candidates, &run_options).await {
        Ok(summary) => Ok(Json(summary)),
        Err(failure) => {
            state.record_error(failure.to_string()).await;
            Err(ApiError::RunFailed(failure))
        }
    }
}

/// Build enrichment routes
pub fn enrich_routes() -> Router<AppState> {
    Router::new().route("/enrich", post(enrich))
}
