//! Server configuration.
//!
//! Loaded from a JSON file. The path comes from `--config` or `WJ_CONFIG`
//! and defaults to `./config.json`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file {0} does not exist")]
    Missing(PathBuf),

    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Configuration for a Writers Jam server.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    /// Interface to bind.
    #[serde(default = "default_hostname")]
    pub hostname: String,

    /// HTTP port.
    #[serde(default = "default_port", alias = "http_port")]
    pub http_port: u16,

    /// SQLite database file.
    #[serde(default = "default_database")]
    pub database: PathBuf,

    /// JWT secrets. The first one signs; any of them verifies.
    pub secrets: Vec<String>,

    /// Allowed CORS origin. Any origin when unset.
    #[serde(default, alias = "cors_origin")]
    pub cors_origin: Option<String>,

    /// How long a composed home feed is served before recomputing.
    #[serde(default = "default_feed_cache_secs", alias = "feed_cache_secs")]
    pub feed_cache_secs: u64,
}

fn default_hostname() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_database() -> PathBuf {
    PathBuf::from("writers-jam.db")
}

fn default_feed_cache_secs() -> u64 {
    600
}

impl AppConfig {
    /// Create a config with defaults and the given signing secrets.
    pub fn new(secrets: Vec<String>) -> Self {
        Self {
            hostname: default_hostname(),
            http_port: default_port(),
            database: default_database(),
            secrets,
            cors_origin: None,
            feed_cache_secs: default_feed_cache_secs(),
        }
    }

    /// Load and validate a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::Missing(path.to_path_buf()));
        }

        let raw = fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    /// Parse and validate config JSON.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.secrets.is_empty() {
            return Err(ConfigError::Invalid("secrets must not be empty".to_string()));
        }
        if self.secrets.iter().any(|s| s.trim().is_empty()) {
            return Err(ConfigError::Invalid("secrets must not be blank".to_string()));
        }
        Ok(())
    }

    /// Address to bind the HTTP server to.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.hostname, self.http_port)
    }

    /// Home feed cache lifetime.
    pub fn feed_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.feed_cache_secs)
    }

    /// Set the database path.
    pub fn with_database(mut self, database: PathBuf) -> Self {
        self.database = database;
        self
    }

    /// Set the feed cache lifetime in seconds.
    pub fn with_feed_cache_secs(mut self, secs: u64) -> Self {
        self.feed_cache_secs = secs;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_applied() {
        let config = AppConfig::from_json(r#"{"secrets": ["abc"]}"#).unwrap();

        assert_eq!(config.hostname, "0.0.0.0");
        assert_eq!(config.http_port, 8000);
        assert_eq!(config.database, PathBuf::from("writers-jam.db"));
        assert_eq!(config.feed_cache_ttl(), Duration::from_secs(600));
        assert_eq!(config.bind_addr(), "0.0.0.0:8000");
        assert!(config.cors_origin.is_none());
    }

    #[test]
    fn test_camel_case_fields() {
        let config = AppConfig::from_json(
            r#"{"httpPort": 9000, "secrets": ["a", "b"], "corsOrigin": "https://example.org", "feedCacheSecs": 5}"#,
        )
        .unwrap();

        assert_eq!(config.http_port, 9000);
        assert_eq!(config.secrets.len(), 2);
        assert_eq!(config.cors_origin.as_deref(), Some("https://example.org"));
        assert_eq!(config.feed_cache_secs, 5);
    }

    #[test]
    fn test_empty_secrets_rejected() {
        let result = AppConfig::from_json(r#"{"secrets": []}"#);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));

        let result = AppConfig::from_json(r#"{"secrets": ["  "]}"#);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));

        let result = AppConfig::from_json(r#"{"hostname": "x"}"#);
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_from_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.json");

        assert!(matches!(AppConfig::load(&path), Err(ConfigError::Missing(_))));

        fs::write(&path, r#"{"secrets": ["s3cret"], "database": "jam.db"}"#).unwrap();
        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.database, PathBuf::from("jam.db"));
    }
}
