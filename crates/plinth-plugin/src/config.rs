//! Serve configuration.
//!
//! Settings are read from `$XDG_CONFIG_HOME/plinth/plugin.toml` when that file
//! exists. Unlike a daemon config, a missing file is not created: a plugin
//! runs with defaults unless the user opts in. Handshake environment
//! variables set by the host override the file.

use crate::error::{ServeError, ServeResult};
use crate::handshake::{ENV_MAX_PORT, ENV_MIN_PORT};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Plugin server configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServeConfig {
    /// Log level (trace, debug, info, warn, error)
    /// Default: "info"
    pub log_level: String,
    /// Lowest port the RPC listener may bind
    /// Default: 10000
    pub min_port: u16,
    /// Highest port the RPC listener may bind
    /// Default: 25000
    pub max_port: u16,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            min_port: 10000,
            max_port: 25000,
        }
    }
}

impl ServeConfig {
    /// Load configuration from the specified path.
    pub fn load(path: impl AsRef<Path>) -> ServeResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            ServeError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let config: ServeConfig = toml::from_str(&content).map_err(|e| {
            ServeError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the default location, falling back to
    /// defaults when no file exists there.
    pub fn load_default() -> ServeResult<Self> {
        match Self::default_config_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Returns `$XDG_CONFIG_HOME/plinth/plugin.toml`.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "raibid-labs", "plinth")
            .map(|dirs| dirs.config_dir().join("plugin.toml"))
    }

    /// Apply host-provided port range overrides.
    pub fn apply_env<F>(&mut self, lookup: F) -> ServeResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_MIN_PORT) {
            self.min_port = parse_port(ENV_MIN_PORT, &raw)?;
        }
        if let Some(raw) = lookup(ENV_MAX_PORT) {
            self.max_port = parse_port(ENV_MAX_PORT, &raw)?;
        }
        self.validate()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> ServeResult<()> {
        if !VALID_LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(ServeError::Config(format!(
                "Invalid log_level: {}. Must be one of: {}",
                self.log_level,
                VALID_LOG_LEVELS.join(", ")
            )));
        }

        if self.min_port == 0 || self.max_port == 0 {
            return Err(ServeError::Config("Port bounds must be non-zero".to_string()));
        }

        if self.min_port > self.max_port {
            return Err(ServeError::Config(format!(
                "min_port ({}) must not exceed max_port ({})",
                self.min_port, self.max_port
            )));
        }

        Ok(())
    }
}

fn parse_port(key: &str, raw: &str) -> ServeResult<u16> {
    raw.trim()
        .parse::<u16>()
        .map_err(|_| ServeError::Config(format!("Invalid {}: {:?}", key, raw)))
}
