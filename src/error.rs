//! Unified error types for the Google Analytics Reporting MCP Server.

use std::path::PathBuf;

use reqwest::StatusCode;
use thiserror::Error;

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Can't find service account key file at '{}' (set key_file, e.g. ../data/analytics/analytics-key.json)", .0.display())]
    KeyFileNotFound(PathBuf),
}

/// Authentication-related errors.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("HTTP request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Failed to read key file: {0}")]
    KeyFile(#[from] std::io::Error),

    #[error("Invalid service account key: {0}")]
    InvalidKey(String),

    #[error("Failed to sign token assertion: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),

    #[error("Token request failed with status {status}: {body}")]
    TokenRequestFailed { status: StatusCode, body: String },

    #[error("Token parse error: {0}")]
    TokenParse(String),

    #[error("Failed to create HTTP client: {0}")]
    HttpClientInit(String),
}

/// Reporting API request/response errors.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("HTTP request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP error {status}: {body}")]
    HttpError { status: StatusCode, body: String },

    #[error("Google API error [{code}]: {message}")]
    GoogleError {
        status: StatusCode,
        code: String,
        message: String,
    },

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Backend returned no reports")]
    EmptyResponse,

    #[error("Invalid report request: {0}")]
    InvalidRequest(String),

    #[error("Failed to create HTTP client: {0}")]
    HttpClientInit(String),
}

/// Errors building the HTTP-backed service.
#[derive(Debug, Error)]
pub enum InitError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Api(#[from] ApiError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_missing_field_display() {
        let error = ConfigError::MissingField("key_file".to_string());
        assert_eq!(error.to_string(), "Missing required field: key_file");
    }

    #[test]
    fn test_config_error_key_file_not_found_display() {
        let error = ConfigError::KeyFileNotFound(PathBuf::from("/nowhere/key.json"));
        let display = error.to_string();
        assert!(display.contains("/nowhere/key.json"));
        assert!(display.starts_with("Can't find service account key file"));
    }

    #[test]
    fn test_config_error_io_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let config_err: ConfigError = io_err.into();
        assert!(config_err.to_string().contains("IO error"));
    }

    #[test]
    fn test_auth_error_invalid_key_display() {
        let error = AuthError::InvalidKey("missing client_email".to_string());
        assert_eq!(
            error.to_string(),
            "Invalid service account key: missing client_email"
        );
    }

    #[test]
    fn test_auth_error_token_request_failed_display() {
        let error = AuthError::TokenRequestFailed {
            status: StatusCode::BAD_REQUEST,
            body: "invalid_grant".to_string(),
        };
        let display = error.to_string();
        assert!(display.contains("400"));
        assert!(display.contains("invalid_grant"));
    }

    #[test]
    fn test_api_error_google_error_display() {
        let error = ApiError::GoogleError {
            status: StatusCode::FORBIDDEN,
            code: "PERMISSION_DENIED".to_string(),
            message: "User does not have sufficient permissions for this profile.".to_string(),
        };
        let display = error.to_string();
        assert!(display.contains("PERMISSION_DENIED"));
        assert!(display.contains("sufficient permissions"));
    }

    #[test]
    fn test_api_error_http_error_display() {
        let error = ApiError::HttpError {
            status: StatusCode::TOO_MANY_REQUESTS,
            body: "quota".to_string(),
        };
        assert!(error.to_string().contains("429"));
    }

    #[test]
    fn test_api_error_from_auth_error() {
        let auth_error = AuthError::TokenParse("no access_token".to_string());
        let api_error: ApiError = auth_error.into();
        assert!(api_error.to_string().contains("Authentication error"));
    }

    #[test]
    fn test_init_error_is_transparent() {
        let error: InitError = ConfigError::MissingField("key_file".into()).into();
        assert_eq!(error.to_string(), "Missing required field: key_file");
    }

    #[test]
    fn test_api_error_debug_format() {
        let error = ApiError::InvalidRequest("at least one metric expression is required".into());
        let debug = format!("{:?}", error);
        assert!(debug.contains("InvalidRequest"));
    }
}
