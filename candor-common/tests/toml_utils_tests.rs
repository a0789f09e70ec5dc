//! Integration tests for TOML config load and root folder resolution

use candor_common::config::{
    load_toml_config, resolve_root_folder, CachePolicyName, LoggingConfig, TomlConfig,
};
use serial_test::serial;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn sample_config() -> TomlConfig {
    let mut config = TomlConfig {
        root_folder: Some(PathBuf::from("/var/candor")),
        logging: LoggingConfig::default(),
        github_token: Some("ghp_test".to_string()),
        ..Default::default()
    };
    config.cache.policy = CachePolicyName::AlwaysExpired;
    config.funnel.batch_size = 3;
    config
}

#[test]
fn test_load_reads_every_section() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("candor-enrich.toml");
    std::fs::write(
        &path,
        r#"
root_folder = "/var/candor"
github_token = "ghp_test"

[cache]
policy = "always_expired"

[funnel]
batch_size = 3
"#,
    )
    .unwrap();

    let loaded = load_toml_config(&path).unwrap();

    assert_eq!(loaded, sample_config());
}

#[test]
fn test_missing_file_yields_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let loaded = load_toml_config(&temp_dir.path().join("absent.toml")).unwrap();
    assert_eq!(loaded, TomlConfig::default());
}

#[test]
fn test_invalid_toml_is_config_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("broken.toml");
    std::fs::write(&path, "funnel = [not valid").unwrap();

    let err = load_toml_config(&path).unwrap_err();
    assert!(err.to_string().contains("Parse TOML failed"));
}

#[test]
#[serial]
fn test_env_beats_toml_for_root_folder() {
    std::env::set_var("CANDOR_ROOT_FOLDER_TEST", "/from/env");
    let config = sample_config();

    let resolved = resolve_root_folder(None, "CANDOR_ROOT_FOLDER_TEST", Some(&config));
    assert_eq!(resolved, PathBuf::from("/from/env"));

    std::env::remove_var("CANDOR_ROOT_FOLDER_TEST");
}

#[test]
#[serial]
fn test_toml_used_when_env_unset() {
    std::env::remove_var("CANDOR_ROOT_FOLDER_TEST");
    let config = sample_config();

    let resolved = resolve_root_folder(None, "CANDOR_ROOT_FOLDER_TEST", Some(&config));
    assert_eq!(resolved, Path::new("/var/candor"));
}
