//! API key resolution tests
//!
//! These mutate process environment variables, so each runs serially.

use std::path::Path;

use candor_common::config::TomlConfig;
use candor_enrich::config::{
    resolve_api_key, EnrichConfig, ENV_GITHUB_TOKEN, ENV_SEARCH_API_KEY, ENV_TEXTGEN_API_KEY,
};
use serial_test::serial;

fn clear_env() {
    for var in [ENV_GITHUB_TOKEN, ENV_SEARCH_API_KEY, ENV_TEXTGEN_API_KEY] {
        std::env::remove_var(var);
    }
}

#[test]
#[serial]
fn test_env_takes_priority_over_toml() {
    clear_env();
    std::env::set_var(ENV_SEARCH_API_KEY, "from-env");

    let toml_value = "from-toml".to_string();
    let key = resolve_api_key("Search API key", ENV_SEARCH_API_KEY, Some(&toml_value));

    assert_eq!(key.as_deref(), Some("from-env"));
    clear_env();
}

#[test]
#[serial]
fn test_blank_env_falls_back_to_toml() {
    clear_env();
    std::env::set_var(ENV_GITHUB_TOKEN, "   ");

    let toml_value = "ghp_toml".to_string();
    let key = resolve_api_key("GitHub token", ENV_GITHUB_TOKEN, Some(&toml_value));

    assert_eq!(key.as_deref(), Some("ghp_toml"));
    clear_env();
}

#[test]
#[serial]
fn test_missing_everywhere_is_none() {
    clear_env();

    let blank = String::new();
    assert_eq!(resolve_api_key("Text-generation API key", ENV_TEXTGEN_API_KEY, None), None);
    assert_eq!(
        resolve_api_key("Text-generation API key", ENV_TEXTGEN_API_KEY, Some(&blank)),
        None
    );
}

#[test]
#[serial]
fn test_resolve_reads_every_key() {
    clear_env();
    std::env::set_var(ENV_TEXTGEN_API_KEY, "sk-env");

    let mut toml_config = TomlConfig {
        github_token: Some("ghp_toml".to_string()),
        github_base_url: Some("https://ghe.example.com/api/v3".to_string()),
        search_api_key: Some("serp_toml".to_string()),
        search_politeness_ms: Some(250),
        textgen_api_key: Some("sk-toml".to_string()),
        textgen_model: Some("local-model".to_string()),
        ..TomlConfig::default()
    };
    toml_config.cache.directory = Some("responses".into());

    let config = EnrichConfig::resolve(&toml_config, Path::new("/srv/candor"));

    assert_eq!(config.github_token.as_deref(), Some("ghp_toml"));
    assert_eq!(config.search_api_key.as_deref(), Some("serp_toml"));
    assert_eq!(config.github_base_url.as_deref(), Some("https://ghe.example.com/api/v3"));
    assert_eq!(config.search_base_url, None);
    assert_eq!(config.textgen_api_key.as_deref(), Some("sk-env"));
    assert_eq!(config.textgen_model.as_deref(), Some("local-model"));
    assert_eq!(config.search_politeness_ms, 250);
    assert_eq!(config.cache_dir, Path::new("/srv/candor/responses"));
    clear_env();
}
