//! Analytics Reporting API v4 wire types and the `reports:batchGet` client.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::auth::ServiceAccountAuth;
use crate::config::Config;
use crate::error::ApiError;

/// Date range in `YYYY-MM-DD` or relative (`today`, `7daysAgo`) form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    pub start_date: String,
    pub end_date: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metric {
    pub expression: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dimension {
    pub name: String,
}

/// A single report request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRequest {
    pub view_id: String,
    pub date_ranges: Vec<DateRange>,
    pub metrics: Vec<Metric>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub dimensions: Vec<Dimension>,
}

/// Body of `reports:batchGet`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetReportsRequest {
    pub report_requests: Vec<ReportRequest>,
}

/// Response of `reports:batchGet`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GetReportsResponse {
    #[serde(default)]
    pub reports: Vec<Report>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    #[serde(default)]
    pub column_header: ColumnHeader,
    #[serde(default)]
    pub data: ReportData,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnHeader {
    #[serde(default)]
    pub dimensions: Vec<String>,
    #[serde(default)]
    pub metric_header: MetricHeader,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricHeader {
    #[serde(default)]
    pub metric_header_entries: Vec<MetricHeaderEntry>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricHeaderEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub metric_type: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportData {
    #[serde(default)]
    pub rows: Vec<ReportRow>,
    #[serde(default)]
    pub totals: Vec<DateRangeValues>,
    pub row_count: Option<u64>,
    #[serde(default)]
    pub minimums: Vec<DateRangeValues>,
    #[serde(default)]
    pub maximums: Vec<DateRangeValues>,
    pub is_data_golden: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRow {
    #[serde(default)]
    pub dimensions: Vec<String>,
    #[serde(default)]
    pub metrics: Vec<DateRangeValues>,
}

/// Metric values for one date range, as decimal strings.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DateRangeValues {
    #[serde(default)]
    pub values: Vec<String>,
}

/// Google API error envelope.
#[derive(Debug, Deserialize)]
struct GoogleErrorResponse {
    error: GoogleErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorDetail {
    #[serde(default)]
    code: u16,
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
}

/// The external reporting backend: one batch call per invocation.
#[async_trait]
pub trait ReportingBackend: Send + Sync {
    async fn batch_get(&self, body: &GetReportsRequest) -> Result<GetReportsResponse, ApiError>;
}

/// HTTP client for `reports:batchGet`.
#[derive(Clone)]
pub struct HttpReportingClient {
    batch_get_url: String,
    http_client: Client,
    auth: ServiceAccountAuth,
}

impl HttpReportingClient {
    /// Create a new reporting client.
    pub fn new(config: &Config, auth: ServiceAccountAuth) -> Result<Self, ApiError> {
        let http_client = Client::builder()
            .timeout(config.timeout())
            .user_agent(config.application_name.clone())
            .build()
            .map_err(|e| ApiError::HttpClientInit(e.to_string()))?;

        Ok(Self {
            batch_get_url: config.batch_get_url(),
            http_client,
            auth,
        })
    }

    /// Execute POST request.
    async fn execute_post<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        tracing::debug!(url = %url, "Reporting API POST request");

        let token = self.auth.get_token().await?;

        let response = self
            .http_client
            .post(url)
            .bearer_auth(token)
            .header("Accept", "application/json")
            .json(body)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Handle HTTP response and parse JSON.
    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            tracing::trace!(body = %truncate(&body, 500), "Reporting API response");
            Ok(serde_json::from_str(&body)?)
        } else {
            tracing::debug!(%status, body = %truncate(&body, 500), "Reporting API error response");
            Err(parse_error_response(status, &body))
        }
    }
}

#[async_trait]
impl ReportingBackend for HttpReportingClient {
    async fn batch_get(&self, body: &GetReportsRequest) -> Result<GetReportsResponse, ApiError> {
        self.execute_post(&self.batch_get_url, body).await
    }
}

/// Map a failed response to the Google error when the body carries one.
fn parse_error_response(status: StatusCode, body: &str) -> ApiError {
    match serde_json::from_str::<GoogleErrorResponse>(body) {
        Ok(envelope) => {
            let status = StatusCode::from_u16(envelope.error.code).unwrap_or(status);
            ApiError::GoogleError {
                status,
                code: envelope
                    .error
                    .status
                    .unwrap_or_else(|| status.as_u16().to_string()),
                message: envelope.error.message,
            }
        }
        Err(_) => ApiError::HttpError {
            status,
            body: body.to_string(),
        },
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    match s.char_indices().nth(max_len) {
        Some((idx, _)) => format!("{}...(truncated)", &s[..idx]),
        None => s.to_string(),
    }
}

impl std::fmt::Debug for HttpReportingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpReportingClient")
            .field("batch_get_url", &self.batch_get_url)
            .field("auth", &self.auth)
            .finish()
    }
}
