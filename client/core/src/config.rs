//! Client Configuration
//!
//! Configuration for the client core, loaded in priority order:
//!
//! 1. **Environment variables** (`TRIPWISE_*`)
//! 2. **Config file** (`~/.config/tripwise/client.toml`)
//! 3. **Defaults**
//!
//! # XDG Compliance
//!
//! The config file lives at `$XDG_CONFIG_HOME/tripwise/client.toml`,
//! defaulting to `~/.config/tripwise/client.toml`. A missing file is not an
//! error; a malformed one is.
//!
//! # Example Config File
//!
//! ```toml
//! [service]
//! url = "http://127.0.0.1:4943/ledger"
//! request_timeout_secs = 30
//! admin_token = "bootstrap-secret"
//!
//! [rates]
//! max_age_hours = 24
//!
//! [bootstrap]
//! first_run_prompt = true
//! message_buffer = 100
//! ```

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::time::NS_PER_SECOND;

// =============================================================================
// Error Types
// =============================================================================

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the config file
    #[error("Failed to read config file {path}: {source}")]
    ReadError {
        /// Path that could not be read
        path: PathBuf,
        /// Underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    /// A value is out of range
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Config Source Tracking
// =============================================================================

/// Where the effective configuration came from
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConfigSource {
    /// Environment variable overrides
    Env,
    /// Config file
    File,
    /// Built-in defaults
    #[default]
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "defaults"),
        }
    }
}

// =============================================================================
// TOML Schema
// =============================================================================

/// Root of the config file
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ClientToml {
    /// `[service]` section
    pub service: ServiceToml,
    /// `[rates]` section
    pub rates: RatesToml,
    /// `[bootstrap]` section
    pub bootstrap: BootstrapToml,
}

/// Remote ledger settings
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ServiceToml {
    /// Base URL of the ledger service
    pub url: Option<String>,
    /// Per-request timeout in seconds
    pub request_timeout_secs: Option<u64>,
    /// Secret passed to secret-taking init hooks
    pub admin_token: Option<String>,
}

/// Exchange-rate settings
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RatesToml {
    /// Age after which rates are refreshed automatically
    pub max_age_hours: Option<u64>,
}

/// Startup behavior
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct BootstrapToml {
    /// Prompt first-time users to create a trip
    pub first_run_prompt: Option<bool>,
    /// Capacity of the outbound message channel
    pub message_buffer: Option<usize>,
}

// =============================================================================
// Effective Configuration
// =============================================================================

/// Effective client configuration
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Ledger service URL; `None` runs against the in-memory ledger
    pub service_url: Option<String>,

    /// Timeout applied by the HTTP transport
    pub request_timeout: Duration,

    /// Secret for the secret-taking init hook
    pub admin_token: String,

    /// Rates older than this are refreshed once per session
    pub rate_max_age: Duration,

    /// Whether first-time users are prompted to create a trip
    pub first_run_prompt: bool,

    /// Capacity of the outbound message channel
    pub message_buffer: usize,

    /// Path the config was loaded from, if any
    pub config_file_path: Option<PathBuf>,

    source: ConfigSource,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            service_url: None,
            request_timeout: Duration::from_secs(30),
            admin_token: String::new(),
            rate_max_age: Duration::from_secs(24 * 60 * 60),
            first_run_prompt: true,
            message_buffer: 100,
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl ClientConfig {
    /// Default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Where the configuration came from
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Rate max age in the ledger's nanosecond unit
    #[must_use]
    pub fn rate_max_age_nanos(&self) -> i64 {
        i64::try_from(self.rate_max_age.as_secs())
            .unwrap_or(i64::MAX / NS_PER_SECOND)
            .saturating_mul(NS_PER_SECOND)
    }

    /// Set the service URL
    #[must_use]
    pub fn with_service_url(mut self, url: impl Into<String>) -> Self {
        self.service_url = Some(url.into());
        self
    }

    /// Set the rate max age
    #[must_use]
    pub fn with_rate_max_age(mut self, max_age: Duration) -> Self {
        self.rate_max_age = max_age;
        self
    }

    /// Enable or disable the first-run prompt
    #[must_use]
    pub fn with_first_run_prompt(mut self, enabled: bool) -> Self {
        self.first_run_prompt = enabled;
        self
    }

    /// Set the init-hook secret
    #[must_use]
    pub fn with_admin_token(mut self, token: impl Into<String>) -> Self {
        self.admin_token = token.into();
        self
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.rate_max_age.is_zero() {
            return Err(ConfigError::ValidationError(
                "rates.max_age_hours must be greater than 0".to_string(),
            ));
        }
        if self.message_buffer == 0 {
            return Err(ConfigError::ValidationError(
                "bootstrap.message_buffer must be greater than 0".to_string(),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "service.request_timeout_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Loading
// =============================================================================

/// Default config file path (`$XDG_CONFIG_HOME/tripwise/client.toml`)
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("tripwise").join("client.toml"))
}

/// Load configuration from the default path and the environment
pub fn load_config() -> Result<ClientConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from `path` (if it exists) and the environment
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<ClientConfig, ConfigError> {
    let mut config = ClientConfig::default();

    if let Some(config_path) = path {
        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path).map_err(|source| {
                ConfigError::ReadError {
                    path: config_path.clone(),
                    source,
                }
            })?;
            let toml: ClientToml = toml::from_str(&contents)?;
            apply_toml_config(&mut config, &toml);
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;
            tracing::info!(path = %config_path.display(), "Loaded configuration from file");
        } else {
            tracing::debug!(path = %config_path.display(), "Config file not found, using defaults");
        }
    }

    apply_env_config(&mut config);
    config.validate()?;
    Ok(config)
}

fn apply_toml_config(config: &mut ClientConfig, toml: &ClientToml) {
    if toml.service.url.is_some() {
        config.service_url.clone_from(&toml.service.url);
    }
    if let Some(secs) = toml.service.request_timeout_secs {
        config.request_timeout = Duration::from_secs(secs);
    }
    if let Some(ref token) = toml.service.admin_token {
        config.admin_token.clone_from(token);
    }

    if let Some(hours) = toml.rates.max_age_hours {
        config.rate_max_age = Duration::from_secs(hours.saturating_mul(3600));
    }

    if let Some(enabled) = toml.bootstrap.first_run_prompt {
        config.first_run_prompt = enabled;
    }
    if let Some(buffer) = toml.bootstrap.message_buffer {
        config.message_buffer = buffer;
    }
}

fn apply_env_config(config: &mut ClientConfig) {
    if let Ok(url) = std::env::var("TRIPWISE_SERVICE_URL") {
        config.service_url = if url.is_empty() { None } else { Some(url) };
        config.source = ConfigSource::Env;
    }
    if let Ok(hours) = std::env::var("TRIPWISE_RATE_MAX_AGE_HOURS") {
        if let Ok(h) = hours.parse::<u64>() {
            config.rate_max_age = Duration::from_secs(h.saturating_mul(3600));
            config.source = ConfigSource::Env;
        }
    }
    if let Ok(enabled) = std::env::var("TRIPWISE_FIRST_RUN_PROMPT") {
        config.first_run_prompt = enabled != "0" && enabled.to_lowercase() != "false";
        config.source = ConfigSource::Env;
    }
    if let Ok(token) = std::env::var("TRIPWISE_ADMIN_TOKEN") {
        config.admin_token = token;
        config.source = ConfigSource::Env;
    }
    if let Ok(buffer) = std::env::var("TRIPWISE_MESSAGE_BUFFER") {
        if let Ok(n) = buffer.parse::<usize>() {
            config.message_buffer = n;
            config.source = ConfigSource::Env;
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
