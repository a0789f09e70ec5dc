//! HTTP API handlers for candor-enrich
//!
//! A thin surface over the funnel and the cache: request validation and
//! JSON mapping only.

pub mod cache;
pub mod enrich;
pub mod health;
pub mod sse;

pub use cache::cache_routes;
pub use enrich::enrich_routes;
pub use health::health_routes;
pub use sse::event_stream;
