//! Liveness and funnel shape
//!
//! Reports which stages a run would execute given the keys this process
//! was started with, and the most recent aborted run's message.

use axum::{extract::State, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::AppState;

const MODULE_NAME: &str = "candor-enrich";

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub module: &'static str,
    pub version: &'static str,
    pub uptime_seconds: u64,
    /// Stage order for a run with the configured collaborators
    pub stages: Vec<&'static str>,
    /// Message of the last run that aborted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Whole seconds between `started` and `now`; zero if the clock went backwards
fn seconds_since(started: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    u64::try_from(now.signed_duration_since(started).num_seconds()).unwrap_or(0)
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        module: MODULE_NAME,
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: seconds_since(state.startup_time, Utc::now()),
        stages: state.collaborators.stage_names(),
        last_error: state.last_error.read().await.clone(),
    })
}

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health))
}
