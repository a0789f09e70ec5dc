//! # Candor Common Library
//!
//! Shared code for the candor enrichment services:
//! - Common error type
//! - TOML bootstrap configuration and root folder resolution
//! - Atomic file writes
//! - Run progress events and the broadcast event bus

pub mod atomic_write;
pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
