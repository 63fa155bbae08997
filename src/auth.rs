//! Service account authentication (OAuth2 JWT bearer grant) for Google APIs.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config::Config;
use crate::error::AuthError;

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Assertions are valid for at most one hour.
const ASSERTION_LIFETIME_SECONDS: i64 = 3600;

/// Fields of a service account JSON key that the token exchange needs.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl ServiceAccountKey {
    /// Read and parse a key file.
    pub fn from_file(path: &Path) -> Result<Self, AuthError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, AuthError> {
        let key: ServiceAccountKey =
            serde_json::from_str(content).map_err(|e| AuthError::InvalidKey(e.to_string()))?;
        if key.client_email.is_empty() {
            return Err(AuthError::InvalidKey("client_email is empty".into()));
        }
        if !key.private_key.contains("PRIVATE KEY") {
            return Err(AuthError::InvalidKey("private_key is not a PEM key".into()));
        }
        Ok(key)
    }
}

/// JWT claims for the bearer assertion.
#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

/// OAuth2 token response from Google.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[allow(dead_code)]
    #[serde(default)]
    token_type: String,
    expires_in: i64,
}

/// Cached token with expiration tracking.
#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    /// Check if token is expired (with buffer).
    fn is_expired(&self, buffer: Duration) -> bool {
        Utc::now() + buffer >= self.expires_at
    }
}

/// Bearer token source backed by a service account key.
#[derive(Clone)]
pub struct ServiceAccountAuth {
    key: Arc<ServiceAccountKey>,
    scope: String,
    token_buffer: Duration,
    http_client: Client,
    token_cache: Arc<RwLock<Option<CachedToken>>>,
}

impl ServiceAccountAuth {
    /// Load the key named by the config and prepare the token client.
    pub fn new(config: &Config) -> Result<Self, AuthError> {
        let key = ServiceAccountKey::from_file(&config.key_file)?;

        let http_client = Client::builder()
            .timeout(config.timeout())
            .user_agent(config.application_name.clone())
            .build()
            .map_err(|e| AuthError::HttpClientInit(e.to_string()))?;

        Ok(Self {
            key: Arc::new(key),
            scope: config.scope_string(),
            token_buffer: config.token_buffer(),
            http_client,
            token_cache: Arc::new(RwLock::new(None)),
        })
    }

    /// Service account the tokens are issued for.
    pub fn client_email(&self) -> &str {
        &self.key.client_email
    }

    /// Get a valid access token, refreshing if necessary.
    pub async fn get_token(&self) -> Result<String, AuthError> {
        {
            let cache = self.token_cache.read().await;
            if let Some(ref cached) = *cache {
                if !cached.is_expired(self.token_buffer) {
                    return Ok(cached.access_token.clone());
                }
            }
        }

        self.fetch_token().await
    }

    /// Sign an assertion and exchange it at the token endpoint.
    async fn fetch_token(&self) -> Result<String, AuthError> {
        let assertion = self.sign_assertion(Utc::now())?;

        tracing::debug!(token_uri = %self.key.token_uri, "Fetching access token");

        let response = self
            .http_client
            .post(&self.key.token_uri)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(token_request_body(&assertion))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(%status, %body, "Token request failed");
            return Err(AuthError::TokenRequestFailed { status, body });
        }

        let token_response: TokenResponse = response.json().await.map_err(|e| {
            AuthError::TokenParse(format!("Failed to parse token response: {}", e))
        })?;

        let expires_at = Utc::now() + Duration::seconds(token_response.expires_in);
        tracing::debug!(
            expires_at = %expires_at.format("%Y-%m-%d %H:%M:%S UTC"),
            "Access token acquired"
        );

        {
            let mut cache = self.token_cache.write().await;
            *cache = Some(CachedToken {
                access_token: token_response.access_token.clone(),
                expires_at,
            });
        }

        Ok(token_response.access_token)
    }

    fn sign_assertion(&self, now: DateTime<Utc>) -> Result<String, AuthError> {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.key.private_key_id.clone();

        let claims = assertion_claims(&self.key, &self.scope, now);
        let encoding_key = EncodingKey::from_rsa_pem(self.key.private_key.as_bytes())?;
        Ok(jsonwebtoken::encode(&header, &claims, &encoding_key)?)
    }
}

fn assertion_claims<'a>(
    key: &'a ServiceAccountKey,
    scope: &'a str,
    now: DateTime<Utc>,
) -> AssertionClaims<'a> {
    let iat = now.timestamp();
    AssertionClaims {
        iss: &key.client_email,
        scope,
        aud: &key.token_uri,
        iat,
        exp: iat + ASSERTION_LIFETIME_SECONDS,
    }
}

fn token_request_body(assertion: &str) -> String {
    format!(
        "grant_type={}&assertion={}",
        urlencoding::encode(JWT_BEARER_GRANT),
        urlencoding::encode(assertion)
    )
}

impl std::fmt::Debug for ServiceAccountAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountAuth")
            .field("client_email", &self.key.client_email)
            .field("scope", &self.scope)
            .finish()
    }
}
