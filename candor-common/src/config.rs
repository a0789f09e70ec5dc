//! Configuration loading and root folder resolution
//!
//! Bootstrap configuration comes from a TOML file. Runtime knobs that a
//! request can override (funnel batch sizes, result caps) start from the
//! `[funnel]` section here.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the TOML file looked up inside the root folder
pub const CONFIG_FILE_NAME: &str = "candor-enrich.toml";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TomlConfig {
    /// Root folder for cache and config (optional)
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub cache: CacheSettings,

    #[serde(default)]
    pub funnel: FunnelSettings,

    #[serde(default)]
    pub server: ServerSettings,

    /// Code host (GitHub) API token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_token: Option<String>,

    /// Code host API base URL (GitHub Enterprise or a local mirror)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_base_url: Option<String>,

    /// Search API key (scholar / patent engines)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_api_key: Option<String>,

    /// Pause before each uncached search request, in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_politeness_ms: Option<u64>,

    /// Search API base URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_base_url: Option<String>,

    /// Text-generation service API key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub textgen_api_key: Option<String>,

    /// Text-generation service base URL (OpenAI-compatible)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub textgen_base_url: Option<String>,

    /// Text-generation model name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub textgen_model: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// Expiry policy name as written in TOML
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CachePolicyName {
    #[default]
    Ttl,
    NeverExpire,
    AlwaysExpired,
}

/// `[cache]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheSettings {
    /// Cache directory. Defaults to `<root>/cache`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,

    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: u64,

    #[serde(default)]
    pub policy: CachePolicyName,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            directory: None,
            ttl_hours: default_ttl_hours(),
            policy: CachePolicyName::Ttl,
        }
    }
}

/// `[funnel]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunnelSettings {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_inter_batch_delay_ms")]
    pub inter_batch_delay_ms: u64,

    #[serde(default = "default_per_item_timeout_secs")]
    pub per_item_timeout_secs: u64,

    /// Candidates considered = max_results * over_provision_factor
    #[serde(default = "default_over_provision_factor")]
    pub over_provision_factor: usize,

    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

impl Default for FunnelSettings {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            inter_batch_delay_ms: default_inter_batch_delay_ms(),
            per_item_timeout_secs: default_per_item_timeout_secs(),
            over_provision_factor: default_over_provision_factor(),
            max_results: default_max_results(),
        }
    }
}

/// `[server]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerSettings {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_ttl_hours() -> u64 {
    24 * 7
}

fn default_batch_size() -> usize {
    5
}

fn default_inter_batch_delay_ms() -> u64 {
    1000
}

fn default_per_item_timeout_secs() -> u64 {
    60
}

fn default_over_provision_factor() -> usize {
    3
}

fn default_max_results() -> usize {
    10
}

fn default_bind() -> String {
    "127.0.0.1:5730".to_string()
}

/// Root folder resolution, in priority order:
/// 1. Command-line argument
/// 2. Environment variable
/// 3. `root_folder` in the TOML config
/// 4. OS-dependent default
pub fn resolve_root_folder(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    toml_config: Option<&TomlConfig>,
) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(root) = toml_config.and_then(|c| c.root_folder.clone()) {
        return root;
    }

    default_root_folder()
}

/// OS-dependent default root folder
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("candor"))
        .unwrap_or_else(|| PathBuf::from("./candor_data"))
}

/// Load TOML config from `path`
///
/// A missing file yields defaults; a present but unparsable file is an error.
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "No config file, using defaults");
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed: {}", e)))?;
    toml::from_str(&content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
}
