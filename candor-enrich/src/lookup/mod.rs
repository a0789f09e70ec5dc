//! Lookup adapters: cache-first access to external collaborators
//!
//! Each adapter wraps one collaborator behind `fetch_or_cache`, layering
//! timeout, transient-network retry, politeness pacing and failure triage on
//! top of the shared [`CacheStore`](crate::cache::CacheStore).

pub mod adapter;
pub mod error;

pub use adapter::{AdapterConfig, AdapterStats, Fetched, LookupAdapter, Origin, RetryPolicy};
pub use error::{CriticalError, ErrorKind, LookupError};
