//! Funnel controller
//!
//! Runs an ordered list of stages over a candidate set. For each stage the
//! current set goes through the batch scheduler, failed items drop out, the
//! stage filter is applied to the rest, and the kept subset feeds the next
//! stage. The run ends early with an empty result when a stage keeps nobody,
//! and aborts with a single [`RunFailure`] on the first critical error.

use crate::lookup::ErrorKind;
use crate::scheduler::{run_batches_until, BatchOptions, ItemError};
use crate::stage::{Stage, StageError};
use candor_common::config::FunnelSettings;
use candor_common::events::{CandorEvent, EventBus};
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Per-run execution options
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Cap on returned survivors
    pub max_results: usize,
    /// Cap on candidates entering the first stage; defaults to
    /// `max_results * over_provision_factor`
    pub max_candidates_to_consider: Option<usize>,
    pub over_provision_factor: usize,
    /// Scheduling overrides keyed by stage name
    pub batch_overrides: HashMap<String, BatchOptions>,
}

impl RunOptions {
    pub fn new(max_results: usize) -> Self {
        Self {
            max_results,
            ..Self::default()
        }
    }

    pub fn with_max_candidates(mut self, max: usize) -> Self {
        self.max_candidates_to_consider = Some(max);
        self
    }

    pub fn with_batch_override(mut self, stage: impl Into<String>, options: BatchOptions) -> Self {
        self.batch_overrides.insert(stage.into(), options);
        self
    }

    /// Number of input candidates the run will consider
    pub fn consider_limit(&self) -> usize {
        self.max_candidates_to_consider.unwrap_or_else(|| {
            self.max_results
                .saturating_mul(self.over_provision_factor.max(1))
        })
    }
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            max_results: 10,
            max_candidates_to_consider: None,
            over_provision_factor: 3,
            batch_overrides: HashMap::new(),
        }
    }
}

impl From<&FunnelSettings> for RunOptions {
    fn from(settings: &FunnelSettings) -> Self {
        Self {
            max_results: settings.max_results,
            max_candidates_to_consider: None,
            over_provision_factor: settings.over_provision_factor,
            batch_overrides: HashMap::new(),
        }
    }
}

/// A candidate that did not come out of a stage
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ItemFailure {
    pub candidate: String,
    pub reason: String,
}

/// Diagnostics for one stage
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StageReport {
    pub stage: String,
    pub before: usize,
    pub after: usize,
    /// Candidates whose transform failed (non-critically)
    pub failed: usize,
    /// Candidates removed by the filter
    pub filtered_out: usize,
    pub elapsed_ms: u64,
    pub failures: Vec<ItemFailure>,
}

/// Result of a completed run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary<C> {
    pub run_id: Uuid,
    /// Candidates supplied by the caller
    pub input_count: usize,
    /// Candidates that entered the first stage
    pub considered: usize,
    pub stages: Vec<StageReport>,
    /// Stage that eliminated everyone, when the run exited early
    pub emptied_at: Option<String>,
    pub survivors: Vec<C>,
    pub elapsed_ms: u64,
}

/// Single structured failure for an aborted run
#[derive(Debug, Clone, Error, Serialize, PartialEq)]
#[error("run aborted in stage '{stage}' ({kind}): {message}")]
pub struct RunFailure {
    pub run_id: Uuid,
    pub kind: ErrorKind,
    pub stage: String,
    pub collaborator: String,
    /// Candidate whose lookup raised the error
    pub candidate: String,
    pub message: String,
    pub retry_after_secs: u64,
    /// Diagnostics for the stages that finished before the abort
    pub completed_stages: Vec<StageReport>,
}

impl RunFailure {
    pub fn retry_after(&self) -> Duration {
        Duration::from_secs(self.retry_after_secs)
    }
}

fn is_critical(error: &ItemError<StageError>) -> bool {
    match error {
        ItemError::Failed(e) => e.is_critical(),
        ItemError::TimedOut(_) => true,
        ItemError::Skipped => false,
    }
}

/// Drives candidates through an ordered list of stages
///
/// Candidates are identified in diagnostics by their `Display` output.
pub struct FunnelController<C> {
    stages: Vec<Arc<Stage<C>>>,
    events: Option<EventBus>,
}

impl<C> FunnelController<C>
where
    C: Clone + Send + fmt::Display + 'static,
{
    pub fn new(stages: Vec<Stage<C>>) -> Self {
        Self::from_shared(stages.into_iter().map(Arc::new).collect())
    }

    /// Build from stages shared with other controllers
    pub fn from_shared(stages: Vec<Arc<Stage<C>>>) -> Self {
        Self {
            stages,
            events: None,
        }
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn stage_names(&self) -> Vec<String> {
        self.stages.iter().map(|s| s.name().to_string()).collect()
    }

    fn emit(&self, event: CandorEvent) {
        if let Some(bus) = &self.events {
            bus.emit_lossy(event);
        }
    }

    pub async fn run(
        &self,
        candidates: Vec<C>,
        options: &RunOptions,
    ) -> Result<RunSummary<C>, RunFailure> {
        let run_id = Uuid::new_v4();
        let start = Instant::now();
        let input_count = candidates.len();

        let mut current = candidates;
        current.truncate(options.consider_limit());
        let considered = current.len();

        info!(
            %run_id,
            input = input_count,
            considered,
            stages = self.stages.len(),
            "Funnel run started"
        );
        self.emit(CandorEvent::RunStarted {
            run_id,
            candidates: considered,
            stages: self.stage_names(),
            timestamp: Utc::now(),
        });

        let mut reports = Vec::with_capacity(self.stages.len());
        let mut emptied_at = None;

        for stage in &self.stages {
            let stage_start = Instant::now();
            let batch = options
                .batch_overrides
                .get(stage.name())
                .copied()
                .unwrap_or(*stage.options());
            let before = current.len();

            self.emit(CandorEvent::StageStarted {
                run_id,
                stage: stage.name().to_string(),
                candidates: before,
                timestamp: Utc::now(),
            });

            let stage_ref = stage.as_ref();
            let report = run_batches_until(
                current,
                |candidate| stage_ref.transform(candidate),
                &batch,
                is_critical,
            )
            .await;

            let first_critical = report.outcomes.iter().find_map(|o| match &o.result {
                Err(e) if is_critical(e) => Some((o.item.to_string(), e)),
                _ => None,
            });

            if let Some((candidate, cause)) = first_critical {
                let failure = match cause {
                    ItemError::Failed(StageError::Critical(critical)) => RunFailure {
                        run_id,
                        kind: critical.kind(),
                        stage: stage.name().to_string(),
                        collaborator: critical.collaborator.clone(),
                        candidate,
                        message: critical.error.to_string(),
                        retry_after_secs: critical.retry_after().as_secs(),
                        completed_stages: reports,
                    },
                    // The stage as a whole overran its per-item budget
                    other => RunFailure {
                        run_id,
                        kind: ErrorKind::Timeout,
                        stage: stage.name().to_string(),
                        collaborator: stage.name().to_string(),
                        candidate,
                        message: other.to_string(),
                        retry_after_secs: ErrorKind::Timeout.default_retry_after().as_secs(),
                        completed_stages: reports,
                    },
                };

                error!(
                    %run_id,
                    stage = %failure.stage,
                    kind = %failure.kind,
                    collaborator = %failure.collaborator,
                    candidate = %failure.candidate,
                    retry_after_secs = failure.retry_after_secs,
                    "Funnel run aborted on critical error"
                );
                self.emit(CandorEvent::RunFailed {
                    run_id,
                    stage: failure.stage.clone(),
                    kind: failure.kind.to_string(),
                    message: failure.message.clone(),
                    retry_after_secs: failure.retry_after_secs,
                    timestamp: Utc::now(),
                });
                return Err(failure);
            }

            let mut failures = Vec::new();
            let mut transformed = Vec::with_capacity(before);
            for outcome in report.outcomes {
                match outcome.result {
                    Ok(candidate) => transformed.push(candidate),
                    Err(e) => failures.push(ItemFailure {
                        candidate: outcome.item.to_string(),
                        reason: e.to_string(),
                    }),
                }
            }

            let ok_count = transformed.len();
            current = transformed
                .into_iter()
                .filter(|c| stage.keeps(c))
                .collect();

            let stage_report = StageReport {
                stage: stage.name().to_string(),
                before,
                after: current.len(),
                failed: failures.len(),
                filtered_out: ok_count - current.len(),
                elapsed_ms: stage_start.elapsed().as_millis() as u64,
                failures,
            };

            if stage_report.failed > 0 {
                warn!(
                    %run_id,
                    stage = stage.name(),
                    failed = stage_report.failed,
                    "Stage completed with per-candidate failures"
                );
            }
            info!(
                %run_id,
                stage = stage.name(),
                before = stage_report.before,
                after = stage_report.after,
                filtered_out = stage_report.filtered_out,
                elapsed_ms = stage_report.elapsed_ms,
                "Stage completed"
            );
            self.emit(CandorEvent::StageCompleted {
                run_id,
                stage: stage_report.stage.clone(),
                before: stage_report.before,
                after: stage_report.after,
                failed: stage_report.failed,
                elapsed_ms: stage_report.elapsed_ms,
                timestamp: Utc::now(),
            });
            reports.push(stage_report);

            if current.is_empty() {
                info!(%run_id, stage = stage.name(), "No candidates left, skipping remaining stages");
                emptied_at = Some(stage.name().to_string());
                break;
            }
        }

        current.truncate(options.max_results);
        let elapsed_ms = start.elapsed().as_millis() as u64;

        info!(
            %run_id,
            survivors = current.len(),
            elapsed_ms,
            "Funnel run completed"
        );
        self.emit(CandorEvent::RunCompleted {
            run_id,
            survivors: current.len(),
            emptied_at: emptied_at.clone(),
            elapsed_ms,
            timestamp: Utc::now(),
        });

        Ok(RunSummary {
            run_id,
            input_count,
            considered,
            stages: reports,
            emptied_at,
            survivors: current,
            elapsed_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast() -> BatchOptions {
        BatchOptions::new(4, Duration::ZERO, Duration::from_secs(5))
    }

    #[test]
    fn test_consider_limit_defaults_to_over_provision() {
        let options = RunOptions::new(5);
        assert_eq!(options.consider_limit(), 15);
        assert_eq!(options.with_max_candidates(7).consider_limit(), 7);
    }

    #[tokio::test]
    async fn test_input_truncated_and_output_capped() {
        let controller = FunnelController::new(vec![
            Stage::from_fn("identity", |n: u32| async move { Ok(n) }).with_options(fast()),
        ]);
        let options = RunOptions {
            max_results: 2,
            max_candidates_to_consider: None,
            over_provision_factor: 2,
            batch_overrides: HashMap::new(),
        };

        let summary = controller.run((1..=10).collect(), &options).await.unwrap();
        assert_eq!(summary.input_count, 10);
        assert_eq!(summary.considered, 4);
        assert_eq!(summary.stages[0].before, 4);
        assert_eq!(summary.survivors, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_rejected_candidates_drop_without_abort() {
        let controller = FunnelController::new(vec![Stage::from_fn(
            "needs-even",
            |n: u32| async move {
                if n % 2 == 0 {
                    Ok(n)
                } else {
                    Err(StageError::Rejected(format!("{} is odd", n)))
                }
            },
        )
        .with_options(fast())]);

        let summary = controller
            .run(vec![1, 2, 3, 4], &RunOptions::new(10))
            .await
            .unwrap();

        assert_eq!(summary.survivors, vec![2, 4]);
        assert_eq!(summary.stages[0].failed, 2);
        assert_eq!(summary.stages[0].failures[0].candidate, "1");
        assert_eq!(summary.stages[0].failures[0].reason, "Rejected: 1 is odd");
    }

    #[tokio::test]
    async fn test_stage_timeout_is_critical() {
        let controller = FunnelController::new(vec![Stage::from_fn("slow", |n: u64| async move {
            tokio::time::sleep(Duration::from_millis(n)).await;
            Ok(n)
        })
        .with_options(BatchOptions::new(4, Duration::ZERO, Duration::from_millis(50)))]);

        let failure = controller
            .run(vec![1, 400], &RunOptions::new(10))
            .await
            .unwrap_err();

        assert_eq!(failure.kind, ErrorKind::Timeout);
        assert_eq!(failure.candidate, "400");
        assert_eq!(failure.stage, "slow");
    }

    #[tokio::test]
    async fn test_events_emitted_in_order() {
        let bus = EventBus::new(32);
        let mut rx = bus.subscribe();
        let controller = FunnelController::new(vec![
            Stage::from_fn("a", |n: u32| async move { Ok(n) }).with_options(fast()),
            Stage::from_fn("b", |n: u32| async move { Ok(n) }).with_options(fast()),
        ])
        .with_events(bus);

        controller.run(vec![1], &RunOptions::new(1)).await.unwrap();

        let mut types = Vec::new();
        while let Ok(event) = rx.try_recv() {
            types.push(event.event_type().to_string());
        }
        assert_eq!(
            types,
            vec![
                "RunStarted",
                "StageStarted",
                "StageCompleted",
                "StageStarted",
                "StageCompleted",
                "RunCompleted"
            ]
        );
    }
}
