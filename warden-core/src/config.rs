//! Configuration management

use crate::error::{ErrorContext, WardenError, WardenResult};
use crate::lifetime::{Lifetime, MAX_LIFETIME_YEARS};
use crate::logging::LoggingConfig;
use crate::validation_error;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WardenConfig {
    pub database: DatabaseConfig,
    pub sessions: SessionConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite connection URL, e.g. `sqlite:~/.warden/warden.db` or `sqlite::memory:`
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:~/.warden/warden.db".to_string(),
            max_connections: 5,
        }
    }
}

impl DatabaseConfig {
    pub fn in_memory() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.url.contains(":memory:")
    }

    /// The connection URL with a leading `~` expanded to the home directory
    pub fn resolved_url(&self) -> String {
        match self.url.strip_prefix("sqlite:~/") {
            Some(rest) => match dirs::home_dir() {
                Some(home) => format!("sqlite:{}", home.join(rest).display()),
                None => self.url.clone(),
            },
            None => self.url.clone(),
        }
    }
}

/// Defaults applied when sessions are issued without explicit lifetimes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub lifetime: Lifetime,
    pub renewal_period: Lifetime,
    /// Seconds between background purges
    pub purge_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            lifetime: Lifetime::days(1),
            renewal_period: Lifetime::days(30),
            purge_interval_secs: 3600,
        }
    }
}

impl WardenConfig {
    /// Default configuration file location (`<config dir>/warden/config.toml`)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("warden").join("config.toml"))
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> WardenResult<Self> {
        let path = path.as_ref();
        let path_str = path.display().to_string();
        let content = std::fs::read_to_string(path).map_err(|e| WardenError::Config {
            message: format!("Failed to read config file: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("read_file")
                .with_metadata("path", &path_str)
                .with_suggestion("Check if the config file exists and is readable"),
        })?;

        let config: WardenConfig = toml::from_str(&content).map_err(|e| WardenError::Config {
            message: format!("Failed to parse config: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("parse_toml")
                .with_metadata("path", &path_str)
                .with_suggestion("Check TOML syntax in config file"),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file, creating parent directories
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> WardenResult<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self).map_err(|e| WardenError::Config {
            message: format!("Failed to serialize config: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config").with_operation("serialize_toml"),
        })?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, content).map_err(|e| WardenError::Config {
            message: format!("Failed to write config file: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("write_file")
                .with_suggestion("Check if the directory exists and is writable"),
        })?;

        Ok(())
    }

    pub fn validate(&self) -> WardenResult<()> {
        if self.database.url.trim().is_empty() {
            return Err(validation_error!(
                "Database url must not be empty",
                "database.url",
                "config"
            ));
        }

        if self.database.max_connections == 0 {
            return Err(validation_error!(
                "Database max_connections must be greater than 0",
                "database.max_connections",
                "config"
            ));
        }

        for (field, lifetime) in [
            ("sessions.lifetime", &self.sessions.lifetime),
            ("sessions.renewal_period", &self.sessions.renewal_period),
        ] {
            if !lifetime.is_in_range() {
                return Err(validation_error!(
                    format!("Lifetime must stay within {} years", MAX_LIFETIME_YEARS),
                    field,
                    "config"
                ));
            }
        }

        if self.sessions.lifetime.is_non_positive() {
            return Err(validation_error!(
                "Default session lifetime must be positive",
                "sessions.lifetime",
                "config"
            ));
        }

        if self.sessions.renewal_period.as_millis().unwrap_or_default() < 0 {
            return Err(validation_error!(
                "Default renewal period must not be negative",
                "sessions.renewal_period",
                "config"
            ));
        }

        if self.sessions.purge_interval_secs == 0 {
            return Err(validation_error!(
                "Purge interval must be greater than 0",
                "sessions.purge_interval_secs",
                "config"
            ));
        }

        Ok(())
    }
}
