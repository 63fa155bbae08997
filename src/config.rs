//! Configuration management for the Google Analytics Reporting MCP Server.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Analytics Reporting API v4 base URL.
const DEFAULT_API_BASE_URL: &str = "https://analyticsreporting.googleapis.com/v4";

/// Read-only analytics scope.
const ANALYTICS_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/analytics.readonly";

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Path to the service account JSON key
    pub key_file: PathBuf,

    /// Application name sent as User-Agent
    #[serde(default = "default_application_name")]
    pub application_name: String,

    /// OAuth2 scopes requested for the access token
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,

    /// Reporting API base URL (override for testing or proxies)
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// View used by tools when the caller does not pass one
    pub default_view_id: Option<String>,

    /// Enable debug mode for MCP message logging
    #[serde(default)]
    pub debug: bool,

    /// HTTP request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Buffer before token expiration to refresh (seconds)
    #[serde(default = "default_token_buffer")]
    pub token_refresh_buffer_seconds: u64,
}

fn default_application_name() -> String {
    "GoogleAnalytics".to_string()
}

fn default_scopes() -> Vec<String> {
    vec![ANALYTICS_READONLY_SCOPE.to_string()]
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_token_buffer() -> u64 {
    60
}

impl Config {
    /// Config with defaults for everything but the key file.
    #[cfg(test)]
    pub fn with_key_file(key_file: impl Into<PathBuf>) -> Self {
        Self {
            key_file: key_file.into(),
            application_name: default_application_name(),
            scopes: default_scopes(),
            api_base_url: default_api_base_url(),
            default_view_id: None,
            debug: false,
            timeout_seconds: default_timeout(),
            token_refresh_buffer_seconds: default_token_buffer(),
        }
    }

    /// Load configuration from a file path.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.key_file.as_os_str().is_empty() {
            return Err(ConfigError::MissingField("key_file".into()));
        }

        if self.scopes.iter().all(|s| s.trim().is_empty()) {
            return Err(ConfigError::MissingField("scopes".into()));
        }

        if !self.api_base_url.starts_with("http") {
            return Err(ConfigError::Invalid(format!(
                "api_base_url must be an http(s) URL, got '{}'",
                self.api_base_url
            )));
        }

        Ok(())
    }

    /// Check that the key file exists on disk.
    pub fn ensure_key_file(&self) -> Result<(), ConfigError> {
        if self.key_file.is_file() {
            Ok(())
        } else {
            Err(ConfigError::KeyFileNotFound(self.key_file.clone()))
        }
    }

    /// Get the batchGet endpoint URL.
    pub fn batch_get_url(&self) -> String {
        format!("{}/reports:batchGet", self.api_base_url.trim_end_matches('/'))
    }

    /// Scopes joined the way the token endpoint expects them.
    pub fn scope_string(&self) -> String {
        self.scopes
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Get timeout as Duration.
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_seconds)
    }

    /// Get token refresh buffer as chrono Duration.
    pub fn token_buffer(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.token_refresh_buffer_seconds as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults_applied() {
        let file = write_config(r#"{"key_file": "/etc/ga/key.json"}"#);
        let config = Config::load(file.path()).unwrap();

        assert_eq!(config.application_name, "GoogleAnalytics");
        assert_eq!(config.scopes, vec![ANALYTICS_READONLY_SCOPE.to_string()]);
        assert_eq!(config.timeout_seconds, 30);
        assert_eq!(config.token_refresh_buffer_seconds, 60);
        assert!(config.default_view_id.is_none());
        assert!(!config.debug);
        assert_eq!(
            config.batch_get_url(),
            "https://analyticsreporting.googleapis.com/v4/reports:batchGet"
        );
    }

    #[test]
    fn test_batch_get_url_trims_trailing_slash() {
        let mut config = Config::with_key_file("key.json");
        config.api_base_url = "http://localhost:8080/v4/".to_string();
        assert_eq!(config.batch_get_url(), "http://localhost:8080/v4/reports:batchGet");
    }

    #[test]
    fn test_missing_key_file_field_rejected() {
        let file = write_config(r#"{"key_file": ""}"#);
        let err = Config::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField(ref f) if f == "key_file"));
    }

    #[test]
    fn test_empty_scopes_rejected() {
        let file = write_config(r#"{"key_file": "key.json", "scopes": ["  "]}"#);
        let err = Config::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField(ref f) if f == "scopes"));
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let file = write_config(r#"{"key_file": "key.json", "api_base_url": "ftp://x"}"#);
        let err = Config::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_scope_string_joins_with_spaces() {
        let mut config = Config::with_key_file("key.json");
        config.scopes = vec!["a".into(), "".into(), "b".into()];
        assert_eq!(config.scope_string(), "a b");
    }

    #[test]
    fn test_ensure_key_file() {
        let key = write_config("{}");
        assert!(Config::with_key_file(key.path()).ensure_key_file().is_ok());

        let err = Config::with_key_file("/definitely/not/here.json")
            .ensure_key_file()
            .unwrap_err();
        assert!(matches!(err, ConfigError::KeyFileNotFound(_)));
    }
}
