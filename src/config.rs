//! CLI configuration management.
//!
//! Settings are resolved through a priority chain, lowest first:
//!
//! 1. Built-in defaults
//! 2. Config file (`<config dir>/eaactl/config.toml` or `--config`)
//! 3. Environment variables (`EAA_*`)
//! 4. Command-line arguments
//!
//! [`ConfigBuilder`] applies the layers from the highest priority down:
//! a value already set is never overwritten by a lower layer.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::auth::Credentials;
use crate::error::{EaaError, Result};
use crate::output::DEFAULT_DELIMITER;

/// Resolved CLI configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CliConfig {
    /// Tenant API host for the current API generation, without scheme.
    pub host: String,

    /// API key id / client token.
    pub key_id: String,

    /// Secret paired with `key_id`.
    pub secret: String,

    /// Access token for signed requests.
    pub access_token: String,

    /// Request timeout in seconds.
    pub timeout: u64,

    /// Seconds between two polls in follow mode.
    pub poll_interval: u64,

    /// Seconds the window end lags behind the current time.
    pub collection_delay: u64,

    /// Output field delimiter.
    pub delimiter: String,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            key_id: String::new(),
            secret: String::new(),
            access_token: String::new(),
            timeout: 60,
            poll_interval: 15,
            collection_delay: 60,
            delimiter: DEFAULT_DELIMITER.to_string(),
        }
    }
}

impl CliConfig {
    /// Default location of the config file.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("eaactl").join("config.toml"))
    }

    /// Reads a config file. Missing keys take their default value.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            EaaError::config(format!("cannot read config file {}: {e}", path.display()))
        })?;
        toml::from_str(&content).map_err(|e| {
            EaaError::config(format!("cannot parse config file {}: {e}", path.display()))
        })
    }

    /// Signing material derived from this configuration.
    pub fn credentials(&self) -> Credentials {
        Credentials {
            host: self.host.clone(),
            key_id: self.key_id.clone(),
            secret: self.secret.clone(),
            access_token: self.access_token.clone(),
        }
    }

    /// Request timeout as a `Duration`.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// Poll interval as a `Duration`.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval)
    }

    /// Collection delay as a `Duration`.
    pub fn collection_delay(&self) -> Duration {
        Duration::from_secs(self.collection_delay)
    }

    /// Fails unless the settings needed by signed (current-generation)
    /// requests are present.
    pub fn require_signing_settings(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(EaaError::config(
                "host is required for this command (set `host` or EAA_HOST)",
            ));
        }
        if self.access_token.is_empty() {
            return Err(EaaError::config(
                "access_token is required for this command (set `access_token` or EAA_ACCESS_TOKEN)",
            ));
        }
        Ok(())
    }
}

/// Builder for CLI configuration with validation and priority chain support.
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    host: Option<String>,
    key_id: Option<String>,
    secret: Option<String>,
    access_token: Option<String>,
    timeout: Option<u64>,
    poll_interval: Option<u64>,
    collection_delay: Option<u64>,
    delimiter: Option<String>,
}

impl ConfigBuilder {
    /// Create a new configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the tenant host (with validation).
    pub fn with_host(mut self, host: impl Into<String>) -> Result<Self> {
        let host = host.into();
        Self::validate_host(&host)?;
        self.host = Some(host);
        Ok(self)
    }

    /// Set the key id.
    pub fn with_key_id(mut self, key_id: impl Into<String>) -> Self {
        self.key_id = Some(key_id.into());
        self
    }

    /// Set the secret.
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    /// Set the access token.
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// Set the request timeout in seconds (with validation).
    pub fn with_timeout(mut self, timeout: u64) -> Result<Self> {
        Self::validate_positive("timeout", timeout)?;
        self.timeout = Some(timeout);
        Ok(self)
    }

    /// Set the poll interval in seconds (with validation).
    pub fn with_poll_interval(mut self, interval: u64) -> Result<Self> {
        Self::validate_positive("poll_interval", interval)?;
        self.poll_interval = Some(interval);
        Ok(self)
    }

    /// Set the collection delay in seconds.
    pub fn with_collection_delay(mut self, delay: u64) -> Self {
        self.collection_delay = Some(delay);
        self
    }

    /// Set the output delimiter (with validation).
    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Result<Self> {
        let delimiter = delimiter.into();
        if delimiter.is_empty() {
            return Err(EaaError::config("delimiter must not be empty"));
        }
        self.delimiter = Some(delimiter);
        Ok(self)
    }

    /// Fill unset values from a config file.
    ///
    /// An explicit `path` must exist. Without one, the default location is
    /// used if present and silently skipped otherwise.
    pub fn with_config_file(self, path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => CliConfig::load_from(path)?,
            None => match CliConfig::default_path().filter(|p| p.exists()) {
                Some(default) => CliConfig::load_from(&default)?,
                None => return Ok(self),
            },
        };
        Ok(self.fill_from(config))
    }

    fn fill_from(self, config: CliConfig) -> Self {
        let non_empty = |value: String| (!value.is_empty()).then_some(value);
        Self {
            host: self.host.or(non_empty(config.host)),
            key_id: self.key_id.or(non_empty(config.key_id)),
            secret: self.secret.or(non_empty(config.secret)),
            access_token: self.access_token.or(non_empty(config.access_token)),
            timeout: self.timeout.or(Some(config.timeout)),
            poll_interval: self.poll_interval.or(Some(config.poll_interval)),
            collection_delay: self.collection_delay.or(Some(config.collection_delay)),
            delimiter: self.delimiter.or(non_empty(config.delimiter)),
        }
    }

    /// Fill unset values from `EAA_*` environment variables.
    pub fn with_env_overrides(self) -> Self {
        self.with_env_lookup(|key| std::env::var(key).ok())
    }

    /// Fill unset values from an arbitrary variable lookup.
    ///
    /// Invalid values are ignored rather than reported, as the lower layers
    /// still provide a usable value.
    pub fn with_env_lookup<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.host.is_none() {
            self.host = lookup("EAA_HOST").filter(|h| Self::validate_host(h).is_ok());
        }
        if self.key_id.is_none() {
            self.key_id = lookup("EAA_KEY_ID").filter(|v| !v.is_empty());
        }
        if self.secret.is_none() {
            self.secret = lookup("EAA_SECRET").filter(|v| !v.is_empty());
        }
        if self.access_token.is_none() {
            self.access_token = lookup("EAA_ACCESS_TOKEN").filter(|v| !v.is_empty());
        }
        if self.timeout.is_none() {
            self.timeout = lookup("EAA_TIMEOUT")
                .and_then(|v| v.parse().ok())
                .filter(|v| *v > 0);
        }
        if self.poll_interval.is_none() {
            self.poll_interval = lookup("EAA_POLL_INTERVAL")
                .and_then(|v| v.parse().ok())
                .filter(|v| *v > 0);
        }
        self
    }

    /// Build the final configuration.
    ///
    /// # Errors
    ///
    /// `EaaError::Config` if the key id or the secret is missing.
    pub fn build(self) -> Result<CliConfig> {
        let defaults = CliConfig::default();
        let key_id = self
            .key_id
            .ok_or_else(|| EaaError::config("key_id is required (config file or EAA_KEY_ID)"))?;
        let secret = self
            .secret
            .ok_or_else(|| EaaError::config("secret is required (config file or EAA_SECRET)"))?;

        let config = CliConfig {
            host: self.host.unwrap_or(defaults.host),
            key_id,
            secret,
            access_token: self.access_token.unwrap_or(defaults.access_token),
            timeout: self.timeout.unwrap_or(defaults.timeout),
            poll_interval: self.poll_interval.unwrap_or(defaults.poll_interval),
            collection_delay: self.collection_delay.unwrap_or(defaults.collection_delay),
            delimiter: self.delimiter.unwrap_or(defaults.delimiter),
        };

        // Values read from a file bypass the setters.
        Self::validate_positive("timeout", config.timeout)?;
        Self::validate_positive("poll_interval", config.poll_interval)?;
        if !config.host.is_empty() {
            Self::validate_host(&config.host)?;
        }
        Ok(config)
    }

    fn validate_host(host: &str) -> Result<()> {
        if host.is_empty() {
            return Err(EaaError::config("host must not be empty"));
        }
        if host.contains("://") || host.contains('/') {
            return Err(EaaError::config(format!(
                "host must be a bare hostname without scheme or path, got {host:?}"
            )));
        }
        Ok(())
    }

    fn validate_positive(name: &str, value: u64) -> Result<()> {
        if value == 0 {
            return Err(EaaError::config(format!("{name} must be greater than 0")));
        }
        Ok(())
    }
}
