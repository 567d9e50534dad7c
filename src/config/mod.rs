//! Configuration management for the coalesce gateway
//!
//! Precedence is env > TOML file > defaults.

pub mod file;

use std::path::Path;
use std::time::Duration;

use self::file::CoalesceConfigFile;
use crate::collaborators::RetryPolicy;
use crate::flush::DEFAULT_FALLBACK_REPLY;
use crate::scheduler::{DEFAULT_FILE_DELAY, DEFAULT_TEXT_DELAY, DebouncePolicy};
use crate::{Error, Result};

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 8080;

/// Default generator request timeout
pub const DEFAULT_GENERATOR_TIMEOUT: Duration = Duration::from_secs(60);

/// Gateway configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,

    /// Debounce windows
    pub debounce: DebouncePolicy,

    pub generator: GeneratorConfig,

    pub notifier: NotifierConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,

    /// Shared secret required on webhook requests (from `COALESCE_WEBHOOK_SECRET`)
    pub webhook_secret: Option<String>,
}

/// Reply generation service configuration
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Service URL; replies are echoed when unset
    pub url: Option<String>,

    pub api_key: Option<String>,

    pub timeout: Duration,

    /// Reply sent when the service fails
    pub fallback_reply: String,
}

/// Reply delivery configuration
#[derive(Debug, Clone)]
pub struct NotifierConfig {
    /// Callback URL; replies are only logged when unset
    pub url: Option<String>,

    pub retry: RetryPolicy,
}

impl Config {
    /// Load configuration from the environment and the config file
    ///
    /// # Errors
    ///
    /// Returns error if an explicit config file cannot be loaded, a value is
    /// malformed, or the delays are inconsistent
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let fc = file::load_config_file(config_path)?;
        Self::from_sources(fc, |key| std::env::var(key).ok())
    }

    /// Build configuration from a parsed file and an environment lookup
    ///
    /// # Errors
    ///
    /// Returns error if a value is malformed or the delays are inconsistent
    pub fn from_sources<F>(fc: CoalesceConfigFile, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let server = ServerConfig {
            port: parse_env(&env, "COALESCE_PORT")?
                .or(fc.server.port)
                .unwrap_or(DEFAULT_PORT),
            webhook_secret: env("COALESCE_WEBHOOK_SECRET")
                .or(fc.server.webhook_secret)
                .filter(|s| !s.is_empty()),
        };

        let debounce = DebouncePolicy {
            text_delay: parse_env(&env, "COALESCE_TEXT_DELAY_SECS")?
                .or(fc.debounce.text_delay_secs)
                .map_or(DEFAULT_TEXT_DELAY, Duration::from_secs),
            file_delay: parse_env(&env, "COALESCE_FILE_DELAY_SECS")?
                .or(fc.debounce.file_delay_secs)
                .map_or(DEFAULT_FILE_DELAY, Duration::from_secs),
        };

        let generator = GeneratorConfig {
            url: env("COALESCE_GENERATOR_URL").or(fc.generator.url),
            api_key: env("COALESCE_GENERATOR_API_KEY").or(fc.generator.api_key),
            timeout: parse_env(&env, "COALESCE_GENERATOR_TIMEOUT_SECS")?
                .or(fc.generator.timeout_secs)
                .map_or(DEFAULT_GENERATOR_TIMEOUT, Duration::from_secs),
            fallback_reply: env("COALESCE_FALLBACK_REPLY")
                .or(fc.generator.fallback_reply)
                .unwrap_or_else(|| DEFAULT_FALLBACK_REPLY.to_string()),
        };

        let mut retry = RetryPolicy::default();
        if let Some(max) = parse_env(&env, "COALESCE_NOTIFIER_MAX_RETRIES")?.or(fc.notifier.max_retries) {
            retry.max_retries = max;
        }
        let notifier = NotifierConfig {
            url: env("COALESCE_NOTIFIER_URL").or(fc.notifier.url),
            retry,
        };

        let config = Self {
            server,
            debounce,
            generator,
            notifier,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints
    ///
    /// # Errors
    ///
    /// Returns error if a delay is zero or the file delay is shorter than the text delay
    pub fn validate(&self) -> Result<()> {
        if self.debounce.text_delay.is_zero() || self.debounce.file_delay.is_zero() {
            return Err(Error::Config("debounce delays must be greater than zero".to_string()));
        }
        if self.debounce.file_delay < self.debounce.text_delay {
            return Err(Error::Config(format!(
                "file delay ({}s) must not be shorter than text delay ({}s)",
                self.debounce.file_delay.as_secs(),
                self.debounce.text_delay.as_secs()
            )));
        }
        Ok(())
    }
}

fn parse_env<T, F>(env: &F, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    env(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|e| Error::Config(format!("invalid {key}={raw}: {e}")))
        })
        .transpose()
}
