//! TOML configuration file loading
//!
//! Supports `~/.config/coalesce/config.toml` (or an explicit path) as a
//! persistent config source. All fields are optional; the file is a partial
//! overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::Error;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct CoalesceConfigFile {
    #[serde(default)]
    pub server: ServerFileConfig,

    #[serde(default)]
    pub debounce: DebounceFileConfig,

    #[serde(default)]
    pub generator: GeneratorFileConfig,

    #[serde(default)]
    pub notifier: NotifierFileConfig,
}

/// HTTP server settings
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    pub port: Option<u16>,

    /// Shared secret expected in `x-coalesce-webhook-secret`
    pub webhook_secret: Option<String>,
}

/// Debounce windows in seconds
#[derive(Debug, Default, Deserialize)]
pub struct DebounceFileConfig {
    pub text_delay_secs: Option<u64>,
    pub file_delay_secs: Option<u64>,
}

/// Reply generation service
#[derive(Debug, Default, Deserialize)]
pub struct GeneratorFileConfig {
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub timeout_secs: Option<u64>,

    /// Reply sent when the service fails
    pub fallback_reply: Option<String>,
}

/// Reply delivery callback
#[derive(Debug, Default, Deserialize)]
pub struct NotifierFileConfig {
    pub url: Option<String>,
    pub max_retries: Option<u32>,
}

/// Load the TOML config file from `path`, or the standard location when `None`
///
/// # Errors
///
/// Returns error if an explicit `path` cannot be read or parsed. A missing
/// or broken file at the standard location only logs a warning and yields
/// `CoalesceConfigFile::default()`.
pub fn load_config_file(path: Option<&Path>) -> crate::Result<CoalesceConfigFile> {
    match path {
        Some(path) => load_explicit(path),
        None => Ok(load_default()),
    }
}

fn load_explicit(path: &Path) -> crate::Result<CoalesceConfigFile> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("failed to read config file {}: {e}", path.display()))
    })?;
    let config = parse_config_file(&content).map_err(|e| {
        Error::Config(format!("invalid config file {}: {e}", path.display()))
    })?;
    tracing::info!(path = %path.display(), "loaded config file");
    Ok(config)
}

fn load_default() -> CoalesceConfigFile {
    let Some(path) = config_file_path() else {
        return CoalesceConfigFile::default();
    };

    if !path.exists() {
        return CoalesceConfigFile::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match parse_config_file(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                CoalesceConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            CoalesceConfigFile::default()
        }
    }
}

/// Parse config file contents
///
/// # Errors
///
/// Returns error if the content is not valid TOML for this schema
pub fn parse_config_file(content: &str) -> crate::Result<CoalesceConfigFile> {
    Ok(toml::from_str(content)?)
}

/// Return the config file path: `~/.config/coalesce/config.toml`
#[must_use]
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("coalesce").join("config.toml"))
}
