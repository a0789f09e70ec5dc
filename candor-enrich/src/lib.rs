//! candor-enrich library interface
//!
//! Staged candidate enrichment: a funnel of lookup-and-filter stages over a
//! shared disk-backed response cache.

pub mod api;
pub mod cache;
pub mod candidate;
pub mod clients;
pub mod config;
pub mod decode;
pub mod error;
pub mod funnel;
pub mod lookup;
pub mod scheduler;
pub mod stage;
pub mod stages;

pub use crate::error::{ApiError, ApiResult};

use crate::cache::CacheStore;
use crate::stages::Collaborators;
use axum::Router;
use candor_common::config::FunnelSettings;
use candor_common::events::EventBus;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Response cache shared by every adapter
    pub cache: CacheStore,
    pub collaborators: Collaborators,
    /// Defaults for requests that do not override them
    pub funnel: FunnelSettings,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last error for diagnostic purposes
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(
        cache: CacheStore,
        collaborators: Collaborators,
        funnel: FunnelSettings,
        event_bus: EventBus,
    ) -> Self {
        Self {
            cache,
            collaborators,
            funnel,
            event_bus,
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }

    pub async fn record_error(&self, message: impl Into<String>) {
        *self.last_error.write().await = Some(message.into());
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::enrich_routes())
        .merge(api::cache_routes())
        .route("/events", get(api::event_stream))
        .merge(api::health_routes())
        .with_state(state)
}
