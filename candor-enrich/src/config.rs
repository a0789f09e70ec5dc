//! Configuration resolution for candor-enrich
//!
//! API keys resolve with ENV → TOML priority. Blank values count as absent.
//! Everything else comes from the TOML bootstrap file.

use candor_common::config::{CacheSettings, FunnelSettings, TomlConfig};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const ENV_GITHUB_TOKEN: &str = "CANDOR_GITHUB_TOKEN";
pub const ENV_SEARCH_API_KEY: &str = "CANDOR_SEARCH_API_KEY";
pub const ENV_TEXTGEN_API_KEY: &str = "CANDOR_TEXTGEN_API_KEY";

/// Default pause before an uncached search request
pub const DEFAULT_SEARCH_POLITENESS_MS: u64 = 1000;

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

/// Resolve one API key from environment, then TOML
///
/// Returns `None` when neither source has a usable value.
pub fn resolve_api_key(label: &str, env_var: &str, toml_value: Option<&String>) -> Option<String> {
    let env_key = std::env::var(env_var).ok().filter(|k| is_valid_key(k));
    let toml_key = toml_value.filter(|k| is_valid_key(k)).cloned();

    if env_key.is_some() && toml_key.is_some() {
        warn!(
            "{} found in multiple sources: environment, TOML. Using environment (highest priority).",
            label
        );
    }

    if let Some(key) = env_key {
        info!("{} loaded from environment variable", label);
        return Some(key);
    }
    if let Some(key) = toml_key {
        info!("{} loaded from TOML config", label);
        return Some(key);
    }

    info!("{} not configured", label);
    None
}

/// Resolved service configuration
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichConfig {
    pub root_folder: PathBuf,
    pub cache_dir: PathBuf,
    pub cache: CacheSettings,
    pub funnel: FunnelSettings,
    pub bind: String,
    pub github_token: Option<String>,
    pub github_base_url: Option<String>,
    pub search_api_key: Option<String>,
    pub search_base_url: Option<String>,
    pub search_politeness_ms: u64,
    pub textgen_api_key: Option<String>,
    pub textgen_base_url: Option<String>,
    pub textgen_model: Option<String>,
}

impl Default for EnrichConfig {
    fn default() -> Self {
        let root_folder = candor_common::config::default_root_folder();
        Self {
            cache_dir: root_folder.join("cache"),
            root_folder,
            cache: CacheSettings::default(),
            funnel: FunnelSettings::default(),
            bind: candor_common::config::ServerSettings::default().bind,
            github_token: None,
            github_base_url: None,
            search_api_key: None,
            search_base_url: None,
            search_politeness_ms: DEFAULT_SEARCH_POLITENESS_MS,
            textgen_api_key: None,
            textgen_base_url: None,
            textgen_model: None,
        }
    }
}

impl EnrichConfig {
    /// Assemble from the loaded TOML and the resolved root folder
    pub fn resolve(toml_config: &TomlConfig, root_folder: &Path) -> Self {
        let cache_dir = match &toml_config.cache.directory {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => root_folder.join(dir),
            None => root_folder.join("cache"),
        };

        Self {
            root_folder: root_folder.to_path_buf(),
            cache_dir,
            cache: toml_config.cache.clone(),
            funnel: toml_config.funnel.clone(),
            bind: toml_config.server.bind.clone(),
            github_token: resolve_api_key(
                "GitHub token",
                ENV_GITHUB_TOKEN,
                toml_config.github_token.as_ref(),
            ),
            github_base_url: toml_config.github_base_url.clone(),
            search_api_key: resolve_api_key(
                "Search API key",
                ENV_SEARCH_API_KEY,
                toml_config.search_api_key.as_ref(),
            ),
            search_base_url: toml_config.search_base_url.clone(),
            search_politeness_ms: toml_config
                .search_politeness_ms
                .unwrap_or(DEFAULT_SEARCH_POLITENESS_MS),
            textgen_api_key: resolve_api_key(
                "Text-generation API key",
                ENV_TEXTGEN_API_KEY,
                toml_config.textgen_api_key.as_ref(),
            ),
            textgen_base_url: toml_config.textgen_base_url.clone(),
            textgen_model: toml_config.textgen_model.clone(),
        }
    }
}
