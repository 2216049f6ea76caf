//! Configuration loading, data folder resolution and API key resolution
//!
//! The TOML file is bootstrap-only: where data lives, an optional fallback
//! API key and the log level. Everything else is stored through the
//! repository and settings store.

use crate::settings::SettingsStore;
use crate::store::KeyValueStore;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable overriding the data folder
pub const DATA_FOLDER_ENV: &str = "SORTSCAN_DATA_FOLDER";

/// Environment variable carrying the analysis-service API key
pub const API_KEY_ENV: &str = "SORTSCAN_GEMINI_API_KEY";

/// Bootstrap configuration loaded from `config.toml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Directory holding `scans.json` and `settings.json`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_folder: Option<PathBuf>,

    /// Fallback API key, used when neither settings nor environment supply one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gemini_api_key: Option<String>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) or a full filter directive
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Platform config file location, e.g. `~/.config/sortscan/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("sortscan").join("config.toml"))
}

/// Platform data folder, e.g. `~/.local/share/sortscan`
pub fn default_data_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("sortscan"))
        .unwrap_or_else(|| PathBuf::from("./sortscan_data"))
}

/// Load the TOML config, falling back to defaults
///
/// A missing file is normal. An unreadable or unparsable file is logged and
/// ignored so a bad config never prevents startup.
pub fn load_toml_config(path: &Path) -> TomlConfig {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return TomlConfig::default();
        }
        Err(e) => {
            warn!("Could not read config file {}: {}; using defaults", path.display(), e);
            return TomlConfig::default();
        }
    };

    match toml::from_str(&content) {
        Ok(config) => {
            info!("Loaded configuration from {}", path.display());
            config
        }
        Err(e) => {
            warn!("Could not parse config file {}: {}; using defaults", path.display(), e);
            TomlConfig::default()
        }
    }
}

/// Write the TOML config atomically (temp file + rename)
///
/// On Unix the file is created with mode 0600 since it may hold an API key.
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, content)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&temp_path, std::fs::Permissions::from_mode(0o600))?;
    }

    if let Err(e) = std::fs::rename(&temp_path, path) {
        let _ = std::fs::remove_file(&temp_path);
        return Err(Error::Io(e));
    }

    info!("Wrote configuration to {}", path.display());
    Ok(())
}

/// Resolve the data folder
///
/// Priority: command-line argument, then [`DATA_FOLDER_ENV`], then the TOML
/// `data_folder`, then [`default_data_folder`].
pub fn resolve_data_folder(cli_arg: Option<&Path>, toml_config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(DATA_FOLDER_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &toml_config.data_folder {
        return path.clone();
    }

    default_data_folder()
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

/// Resolve the analysis-service API key
///
/// Priority: settings store, then [`API_KEY_ENV`], then the TOML
/// `gemini_api_key`. Finding keys in several places is logged.
pub fn resolve_api_key<S: KeyValueStore>(
    settings: &SettingsStore<S>,
    toml_config: &TomlConfig,
) -> Result<String> {
    let candidates = [
        ("settings", settings.get()?),
        ("environment", std::env::var(API_KEY_ENV).ok()),
        ("TOML", toml_config.gemini_api_key.clone()),
    ];

    let mut found = candidates
        .into_iter()
        .filter_map(|(source, key)| key.filter(|k| is_valid_key(k)).map(|k| (source, k)));

    let Some((source, key)) = found.next() else {
        return Err(Error::Config(format!(
            "API key not configured. Configure it using one of:\n\
             1. sortscan settings set <key>\n\
             2. Environment: {}=your-key-here\n\
             3. TOML config: gemini_api_key = \"your-key\"",
            API_KEY_ENV
        )));
    };

    let others: Vec<&str> = found.map(|(s, _)| s).collect();
    if !others.is_empty() {
        warn!(
            "API key found in multiple sources ({}, {}). Using {} (highest priority).",
            source,
            others.join(", "),
            source
        );
    }

    info!("API key loaded from {}", source);
    Ok(key.trim().to_string())
}
