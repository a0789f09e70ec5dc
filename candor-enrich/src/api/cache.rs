//! Cache maintenance endpoints

use crate::cache::CacheStats;
use crate::error::ApiResult;
use crate::lookup::AdapterStats;
use crate::AppState;
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::info;

#[derive(Debug, Serialize)]
pub struct CacheStatsResponse {
    pub directory: String,
    pub policy: String,
    #[serde(flatten)]
    pub stats: CacheStats,
    /// Per-adapter activity since startup
    pub adapters: BTreeMap<String, AdapterStats>,
}

#[derive(Debug, Serialize)]
pub struct RemovedResponse {
    pub removed: usize,
}

/// GET /cache/stats
pub async fn cache_stats(State(state): State<AppState>) -> ApiResult<Json<CacheStatsResponse>> {
    let stats = state.cache.stats().await;

    Ok(Json(CacheStatsResponse {
        directory: state.cache.dir().display().to_string(),
        policy: state.cache.policy().to_string(),
        stats,
        adapters: state.collaborators.adapter_stats().into_iter().collect(),
    }))
}

/// POST /cache/invalidate - remove expired (and corrupt) records
pub async fn invalidate_expired(State(state): State<AppState>) -> ApiResult<Json<RemovedResponse>> {
    let removed = state.cache.invalidate_expired().await;
    info!(removed, "Expired cache records removed on request");
    Ok(Json(RemovedResponse { removed }))
}

/// DELETE /cache - remove every record
pub async fn clear_cache(State(state): State<AppState>) -> ApiResult<Json<RemovedResponse>> {
    let removed = state.cache.clear_all().await;
    info!(removed, "Cache cleared on request");
    Ok(Json(RemovedResponse { removed }))
}

/// Build cache routes
pub fn cache_routes() -> Router<AppState> {
    Router::new()
        .route("/cache/stats", get(cache_stats))
        .route("/cache/invalidate", post(invalidate_expired))
        .route("/cache", axum::routing::delete(clear_cache))
}
