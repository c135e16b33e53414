//! TOML Configuration File Support
//!
//! Engine-wide settings live in `~/.config/adapter/engine.toml`. Profiles and
//! routing rules are data, not configuration, and never appear here.
//!
//! # Configuration Priority
//!
//! Highest first:
//! 1. CLI arguments ([`ConfigOverrides`])
//! 2. Environment variables (`ADAPTER_*`)
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [http]
//! default_timeout_ms = 60000
//! connect_timeout_ms = 10000
//! user_agent = "adapter-core/0.1"
//! default_base_url = "https://gateway.internal"
//!
//! [routing.default_models]
//! chat = "gpt-4o-mini"
//! image = "dall-e-3"
//!
//! [auth]
//! token_refresh_margin_secs = 60
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::profile::Purpose;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Tracks where a configuration value came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// `[http]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpToml {
    /// Request deadline when a profile declares none
    pub default_timeout_ms: Option<u64>,
    /// TCP/TLS connect deadline
    pub connect_timeout_ms: Option<u64>,
    /// `User-Agent` sent on every request
    pub user_agent: Option<String>,
    /// Base URL of last resort
    pub default_base_url: Option<String>,
}

/// `[routing]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingToml {
    /// Model per purpose when no rule matches (`chat = "..."`)
    pub default_models: BTreeMap<String, String>,
}

/// `[auth]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthToml {
    /// Seconds before expiry at which cached tokens are refreshed
    pub token_refresh_margin_secs: Option<u64>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineToml {
    /// HTTP section
    pub http: HttpToml,
    /// Routing section
    pub routing: RoutingToml,
    /// Auth section
    pub auth: AuthToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// HTTP client settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpSettings {
    /// Request deadline when a profile declares none
    pub default_timeout_ms: u64,
    /// TCP/TLS connect deadline
    pub connect_timeout_ms: u64,
    /// `User-Agent` sent on every request
    pub user_agent: String,
    /// Base URL of last resort
    pub default_base_url: Option<String>,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            default_timeout_ms: 60_000,
            connect_timeout_ms: 10_000,
            user_agent: format!("adapter-core/{}", env!("CARGO_PKG_VERSION")),
            default_base_url: None,
        }
    }
}

/// Engine configuration after layering every source
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// HTTP client settings
    pub http: HttpSettings,
    /// Model per purpose when no routing rule matches
    pub default_models: BTreeMap<Purpose, String>,
    /// Seconds before expiry at which cached tokens are refreshed
    pub token_refresh_margin_secs: u64,
    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,
    source: ConfigSource,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            http: HttpSettings::default(),
            default_models: BTreeMap::new(),
            token_refresh_margin_secs: 60,
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl EngineConfig {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Default model for a purpose
    #[must_use]
    pub fn default_model(&self, purpose: Purpose) -> Option<&str> {
        self.default_models.get(&purpose).map(String::as_str)
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// `$XDG_CONFIG_HOME/adapter/engine.toml`
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("adapter").join("engine.toml"))
}

/// Load configuration from the default path, env and defaults
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed.
/// A missing config file is not an error (defaults are used).
pub fn load_config() -> Result<EngineConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read, parsed or
/// validated.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<EngineConfig, ConfigError> {
    let mut config = EngineConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: EngineToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config)?;
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(path = %config_path.display(), "Loaded configuration from file");
        } else {
            tracing::debug!(path = %config_path.display(), "Config file not found, using defaults");
        }
    }

    apply_env_config(&mut config, |name| std::env::var(name).ok());

    Ok(config)
}

fn apply_toml_config(config: &mut EngineConfig, toml: &EngineToml) -> Result<(), ConfigError> {
    if let Some(timeout) = toml.http.default_timeout_ms {
        config.http.default_timeout_ms = timeout;
    }
    if let Some(timeout) = toml.http.connect_timeout_ms {
        config.http.connect_timeout_ms = timeout;
    }
    if let Some(ref agent) = toml.http.user_agent {
        config.http.user_agent = agent.clone();
    }
    if let Some(ref base) = toml.http.default_base_url {
        config.http.default_base_url = Some(base.clone()).filter(|b| !b.trim().is_empty());
    }

    for (purpose, model) in &toml.routing.default_models {
        let parsed = Purpose::ALL
            .into_iter()
            .find(|p| p.as_str() == purpose.trim().to_lowercase())
            .ok_or_else(|| {
                ConfigError::ValidationError(format!("unknown purpose '{purpose}' in [routing.default_models]"))
            })?;
        config.default_models.insert(parsed, model.clone());
    }

    if let Some(margin) = toml.auth.token_refresh_margin_secs {
        config.token_refresh_margin_secs = margin;
    }
    Ok(())
}

/// Apply `ADAPTER_*` overrides read through `lookup`
fn apply_env_config(config: &mut EngineConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(ms) = lookup("ADAPTER_HTTP_TIMEOUT_MS").and_then(|v| v.trim().parse::<u64>().ok()) {
        config.http.default_timeout_ms = ms;
        config.source = ConfigSource::Env;
    }
    if let Some(ms) = lookup("ADAPTER_CONNECT_TIMEOUT_MS").and_then(|v| v.trim().parse::<u64>().ok()) {
        config.http.connect_timeout_ms = ms;
        config.source = ConfigSource::Env;
    }
    if let Some(agent) = lookup("ADAPTER_USER_AGENT").filter(|v| !v.trim().is_empty()) {
        config.http.user_agent = agent;
        config.source = ConfigSource::Env;
    }
    if let Some(base) = lookup("ADAPTER_DEFAULT_BASE_URL").filter(|v| !v.trim().is_empty()) {
        config.http.default_base_url = Some(base);
        config.source = ConfigSource::Env;
    }
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// CLI overrides applied after [`load_config`]
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Default request deadline override (milliseconds)
    pub default_timeout_ms: Option<u64>,
    /// Connect timeout override (milliseconds)
    pub connect_timeout_ms: Option<u64>,
    /// Base URL of last resort override
    pub default_base_url: Option<String>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set default timeout override
    #[must_use]
    pub fn with_default_timeout_ms(mut self, ms: u64) -> Self {
        self.default_timeout_ms = Some(ms);
        self
    }

    /// Set connect timeout override
    #[must_use]
    pub fn with_connect_timeout_ms(mut self, ms: u64) -> Self {
        self.connect_timeout_ms = Some(ms);
        self
    }

    /// Set default base URL override
    #[must_use]
    pub fn with_default_base_url(mut self, url: String) -> Self {
        self.default_base_url = Some(url);
        self
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut EngineConfig) {
        if self.default_timeout_ms.is_some()
            || self.connect_timeout_ms.is_some()
            || self.default_base_url.is_some()
        {
            config.source = ConfigSource::Cli;
        }
        if let Some(ms) = self.default_timeout_ms {
            config.http.default_timeout_ms = ms;
        }
        if let Some(ms) = self.connect_timeout_ms {
            config.http.connect_timeout_ms = ms;
        }
        if let Some(ref url) = self.default_base_url {
            config.http.default_base_url = Some(url.clone());
        }
    }
}
