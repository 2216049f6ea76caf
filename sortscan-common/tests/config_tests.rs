//! Configuration resolution tests
//!
//! Tests touching SORTSCAN_* environment variables are marked #[serial] so
//! they never run concurrently.

use serial_test::serial;
use sortscan_common::config::{
    load_toml_config, resolve_api_key, resolve_data_folder, write_toml_config, LoggingConfig,
    TomlConfig, API_KEY_ENV, DATA_FOLDER_ENV,
};
use sortscan_common::{FileStore, SettingsStore};
use std::path::PathBuf;
use tempfile::TempDir;

#[test]
fn test_parse_full_config_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
data_folder = "/var/lib/sortscan"
gemini_api_key = "toml-key"

[logging]
level = "debug"
"#,
    )
    .unwrap();

    let config = load_toml_config(&path);
    assert_eq!(config.data_folder, Some(PathBuf::from("/var/lib/sortscan")));
    assert_eq!(config.gemini_api_key.as_deref(), Some("toml-key"));
    assert_eq!(config.logging.level, "debug");
}

#[test]
fn test_partial_config_uses_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    std::fs::write(&path, "[logging]\n").unwrap();

    let config = load_toml_config(&path);
    assert_eq!(config.data_folder, None);
    assert_eq!(config.logging, LoggingConfig::default());
}

#[test]
#[serial]
fn test_toml_data_folder_used_when_env_unset() {
    std::env::remove_var(DATA_FOLDER_ENV);
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    write_toml_config(
        &TomlConfig {
            data_folder: Some(temp_dir.path().join("scans")),
            ..Default::default()
        },
        &path,
    )
    .unwrap();

    let config = load_toml_config(&path);
    assert_eq!(resolve_data_folder(None, &config), temp_dir.path().join("scans"));
}

#[test]
#[serial]
fn test_blank_env_data_folder_is_ignored() {
    std::env::set_var(DATA_FOLDER_ENV, "  ");
    let config = TomlConfig {
        data_folder: Some(PathBuf::from("/from/toml")),
        ..Default::default()
    };
    assert_eq!(resolve_data_folder(None, &config), PathBuf::from("/from/toml"));
    std::env::remove_var(DATA_FOLDER_ENV);
}

#[test]
#[serial]
fn test_settings_file_key_wins_over_env() {
    let temp_dir = TempDir::new().unwrap();
    let settings = SettingsStore::new(FileStore::new(temp_dir.path()));
    settings.set(Some("stored-key".to_string())).unwrap();
    std::env::set_var(API_KEY_ENV, "env-key");

    let key = resolve_api_key(&settings, &TomlConfig::default()).unwrap();
    assert_eq!(key, "stored-key");

    std::env::remove_var(API_KEY_ENV);
}

#[test]
#[serial]
fn test_whitespace_env_key_falls_through_to_toml() {
    let temp_dir = TempDir::new().unwrap();
    let settings = SettingsStore::new(FileStore::new(temp_dir.path()));
    std::env::set_var(API_KEY_ENV, "   ");

    let config = TomlConfig {
        gemini_api_key: Some(" toml-key ".to_string()),
        ..Default::default()
    };
    assert_eq!(resolve_api_key(&settings, &config).unwrap(), "toml-key");

    std::env::remove_var(API_KEY_ENV);
}
