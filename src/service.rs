//! Google Analytics reporting service: one batch call per query, flattened.

use crate::auth::ServiceAccountAuth;
use crate::config::Config;
use crate::error::{ApiError, InitError};
use crate::flatten::{FlatResult, ReportFlattener};
use crate::reporting::{HttpReportingClient, ReportingBackend};
use crate::request::{Expressions, ReportDate, ReportRequestSpec};

/// Dimension every preset breaks down by.
const DATE_DIMENSION: &str = "date";
const DEVICE_CATEGORY_DIMENSION: &str = "deviceCategory";

/// Reporting queries over a [`ReportingBackend`].
#[derive(Debug, Clone)]
pub struct AnalyticsService<B> {
    backend: B,
    flattener: ReportFlattener,
}

impl AnalyticsService<HttpReportingClient> {
    /// Build the HTTP-backed service. Fails before any network call if the
    /// key file is missing.
    pub fn from_config(config: &Config) -> Result<Self, InitError> {
        config.ensure_key_file()?;

        let auth = ServiceAccountAuth::new(config)?;
        tracing::info!(client_email = %auth.client_email(), "Loaded service account key");

        let backend = HttpReportingClient::new(config, auth)?;
        Ok(Self::new(backend))
    }
}

impl<B: ReportingBackend> AnalyticsService<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            flattener: ReportFlattener,
        }
    }

    /// Run one report request and flatten the first report returned.
    pub async fn query(&self, spec: &ReportRequestSpec) -> Result<FlatResult, ApiError> {
        let body = spec.to_batch()?;

        tracing::debug!(
            view_id = %spec.view_id,
            start = %spec.start_date,
            end = %spec.end_date,
            "Requesting report"
        );

        let response = self.backend.batch_get(&body).await?;
        let report = response.reports.first().ok_or(ApiError::EmptyResponse)?;

        if report.next_page_token.is_some() {
            tracing::debug!(view_id = %spec.view_id, "Report has further pages, using the first");
        }

        Ok(self.flattener.flatten(report))
    }

    /// Generic date-range query.
    pub async fn data_date_range(
        &self,
        view_id: &str,
        start: ReportDate,
        end: ReportDate,
        metrics: impl Into<Expressions>,
        dimensions: impl Into<Expressions>,
    ) -> Result<FlatResult, ApiError> {
        let spec = ReportRequestSpec::new(view_id, start, end, metrics, dimensions);
        self.query(&spec).await
    }

    /// Any metric by date.
    pub async fn metric_date_range(
        &self,
        view_id: &str,
        start: ReportDate,
        end: ReportDate,
        metric: &str,
    ) -> Result<FlatResult, ApiError> {
        self.data_date_range(view_id, start, end, metric, DATE_DIMENSION)
            .await
    }

    /// Any metric by date and a second dimension.
    pub async fn metric_by_dimension_date_range(
        &self,
        view_id: &str,
        start: ReportDate,
        end: ReportDate,
        metric: &str,
        dimension: &str,
    ) -> Result<FlatResult, ApiError> {
        self.data_date_range(view_id, start, end, metric, [DATE_DIMENSION, dimension])
            .await
    }

    pub async fn sessions(&self, view_id: &str, start: ReportDate, end: ReportDate) -> Result<FlatResult, ApiError> {
        self.metric_date_range(view_id, start, end, "sessions").await
    }

    pub async fn sessions_per_device(&self, view_id: &str, start: ReportDate, end: ReportDate) -> Result<FlatResult, ApiError> {
        self.metric_by_dimension_date_range(view_id, start, end, "sessions", DEVICE_CATEGORY_DIMENSION)
            .await
    }

    pub async fn bounce_rate(&self, view_id: &str, start: ReportDate, end: ReportDate) -> Result<FlatResult, ApiError> {
        self.metric_date_range(view_id, start, end, "bounceRate").await
    }

    pub async fn avg_time_on_page(&self, view_id: &str, start: ReportDate, end: ReportDate) -> Result<FlatResult, ApiError> {
        self.metric_date_range(view_id, start, end, "avgTimeOnPage").await
    }

    pub async fn pageviews_per_session(&self, view_id: &str, start: ReportDate, end: ReportDate) -> Result<FlatResult, ApiError> {
        self.metric_date_range(view_id, start, end, "pageviewsPerSession").await
    }

    pub async fn percent_new_visits(&self, view_id: &str, start: ReportDate, end: ReportDate) -> Result<FlatResult, ApiError> {
        self.metric_date_range(view_id, start, end, "percentNewVisits").await
    }

    pub async fn page_views(&self, view_id: &str, start: ReportDate, end: ReportDate) -> Result<FlatResult, ApiError> {
        self.metric_date_range(view_id, start, end, "pageviews").await
    }

    pub async fn avg_page_load_time(&self, view_id: &str, start: ReportDate, end: ReportDate) -> Result<FlatResult, ApiError> {
        self.metric_date_range(view_id, start, end, "avgPageLoadTime").await
    }

    /// Average order value is reported as revenue per transaction.
    pub async fn avg_order_value(&self, view_id: &str, start: ReportDate, end: ReportDate) -> Result<FlatResult, ApiError> {
        self.metric_date_range(view_id, start, end, "revenuePerTransaction").await
    }

    pub async fn avg_order_value_per_device(&self, view_id: &str, start: ReportDate, end: ReportDate) -> Result<FlatResult, ApiError> {
        self.metric_by_dimension_date_range(view_id, start, end, "revenuePerTransaction", DEVICE_CATEGORY_DIMENSION)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigError;
    use crate::flatten::DimensionValues;
    use crate::reporting::{GetReportsRequest, GetReportsResponse};
    use async_trait::async_trait;
    use reqwest::StatusCode;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    /// Records every batch body and answers with a canned response.
    #[derive(Clone, Default)]
    struct RecordingBackend {
        requests: Arc<Mutex<Vec<GetReportsRequest>>>,
        response: Option<serde_json::Value>,
        fail_with: Option<StatusCode>,
    }

    impl RecordingBackend {
        fn answering(response: serde_json::Value) -> Self {
            Self {
                response: Some(response),
                ..Self::default()
            }
        }

        fn last_request(&self) -> GetReportsRequest {
            self.requests.lock().unwrap().last().cloned().expect("no request recorded")
        }

        fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ReportingBackend for RecordingBackend {
        async fn batch_get(&self, body: &GetReportsRequest) -> Result<GetReportsResponse, ApiError> {
            self.requests.lock().unwrap().push(body.clone());
            if let Some(status) = self.fail_with {
                return Err(ApiError::GoogleError {
                    status,
                    code: "INVALID_ARGUMENT".into(),
                    message: "Invalid value 'ga:nope' for metric parameter.".into(),
                });
            }
            let response = self.response.clone().unwrap_or_else(|| json!({"reports": []}));
            Ok(serde_json::from_value(response).unwrap())
        }
    }

    fn sessions_response() -> serde_json::Value {
        json!({
            "reports": [{
                "columnHeader": {
                    "dimensions": ["ga:date"],
                    "metricHeader": {"metricHeaderEntries": [{"name": "sessions", "type": "INTEGER"}]}
                },
                "data": {
                    "rows": [
                        {"dimensions": ["20240101"], "metrics": [{"values": ["10"]}]},
                        {"dimensions": ["20240102"], "metrics": [{"values": ["20"]}]}
                    ],
                    "totals": [{"values": ["30"]}],
                    "rowCount": 2,
                    "minimums": [{"values": ["10"]}],
                    "maximums": [{"values": ["20"]}]
                }
            }]
        })
    }

    fn day(s: &str) -> ReportDate {
        s.parse().unwrap()
    }

    fn bound(request: &GetReportsRequest) -> (Vec<String>, Vec<String>) {
        let report = &request.report_requests[0];
        (
            report.metrics.iter().map(|m| m.expression.clone()).collect(),
            report.dimensions.iter().map(|d| d.name.clone()).collect(),
        )
    }

    #[tokio::test]
    async fn test_sessions_flattens_first_report() {
        let backend = RecordingBackend::answering(sessions_response());
        let service = AnalyticsService::new(backend.clone());

        let result = service
            .sessions("123", day("2024-01-01"), day("2024-01-02"))
            .await
            .unwrap();

        assert_eq!(backend.request_count(), 1);
        let request = backend.last_request();
        assert_eq!(request.report_requests.len(), 1);
        assert_eq!(request.report_requests[0].view_id, "123");
        assert_eq!(request.report_requests[0].date_ranges[0].start_date, "2024-01-01");

        assert_eq!(result.dimension_names, vec!["date"]);
        assert_eq!(result.metrics, vec![10.0, 20.0]);
        assert_eq!(result.date_range_values.total, 30.0);
        assert!(matches!(result.dimensions, DimensionValues::ByPrimary(_)));
    }

    #[tokio::test]
    async fn test_presets_bind_metric_and_dimensions() {
        let backend = RecordingBackend::answering(sessions_response());
        let service = AnalyticsService::new(backend.clone());
        let (start, end) = (ReportDate::DaysAgo(7), ReportDate::Today);

        let by_date = |metric: &str| (vec![format!("ga:{metric}")], vec!["ga:date".to_string()]);
        let by_device = |metric: &str| {
            (
                vec![format!("ga:{metric}")],
                vec!["ga:date".to_string(), "ga:deviceCategory".to_string()],
            )
        };

        service.sessions("v", start, end).await.unwrap();
        assert_eq!(bound(&backend.last_request()), by_date("sessions"));

        service.sessions_per_device("v", start, end).await.unwrap();
        assert_eq!(bound(&backend.last_request()), by_device("sessions"));

        service.bounce_rate("v", start, end).await.unwrap();
        assert_eq!(bound(&backend.last_request()), by_date("bounceRate"));

        service.avg_time_on_page("v", start, end).await.unwrap();
        assert_eq!(bound(&backend.last_request()), by_date("avgTimeOnPage"));

        service.pageviews_per_session("v", start, end).await.unwrap();
        assert_eq!(bound(&backend.last_request()), by_date("pageviewsPerSession"));

        service.percent_new_visits("v", start, end).await.unwrap();
        assert_eq!(bound(&backend.last_request()), by_date("percentNewVisits"));

        service.page_views("v", start, end).await.unwrap();
        assert_eq!(bound(&backend.last_request()), by_date("pageviews"));

        service.avg_page_load_time("v", start, end).await.unwrap();
        assert_eq!(bound(&backend.last_request()), by_date("avgPageLoadTime"));

        service.avg_order_value("v", start, end).await.unwrap();
        assert_eq!(bound(&backend.last_request()), by_date("revenuePerTransaction"));

        service.avg_order_value_per_device("v", start, end).await.unwrap();
        assert_eq!(bound(&backend.last_request()), by_device("revenuePerTransaction"));

        service
            .metric_by_dimension_date_range("v", start, end, "users", "country")
            .await
            .unwrap();
        assert_eq!(
            bound(&backend.last_request()),
            (vec!["ga:users".to_string()], vec!["ga:date".to_string(), "ga:country".to_string()])
        );

        assert_eq!(backend.request_count(), 11);
    }

    #[tokio::test]
    async fn test_backend_error_propagates_unmodified() {
        let backend = RecordingBackend {
            fail_with: Some(StatusCode::BAD_REQUEST),
            ..RecordingBackend::default()
        };
        let service = AnalyticsService::new(backend);

        let err = service
            .metric_date_range("v", ReportDate::Today, ReportDate::Today, "nope")
            .await
            .unwrap_err();

        match err {
            ApiError::GoogleError { status, code, .. } => {
                assert_eq!(status, StatusCode::BAD_REQUEST);
                assert_eq!(code, "INVALID_ARGUMENT");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_report_list_is_an_error() {
        let backend = RecordingBackend::answering(json!({"reports": []}));
        let service = AnalyticsService::new(backend);

        let err = service
            .sessions("v", ReportDate::Today, ReportDate::Today)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::EmptyResponse));
    }

    #[tokio::test]
    async fn test_empty_metrics_rejected_before_backend_call() {
        let backend = RecordingBackend::answering(sessions_response());
        let service = AnalyticsService::new(backend.clone());

        let err = service
            .data_date_range("v", ReportDate::Today, ReportDate::Today, Vec::<String>::new(), "date")
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::InvalidRequest(_)));
        assert_eq!(backend.request_count(), 0);
    }

    #[tokio::test]
    async fn test_zero_row_report_through_service() {
        let backend = RecordingBackend::answering(json!({
            "reports": [{
                "columnHeader": {
                    "dimensions": ["ga:date", "ga:deviceCategory"],
                    "metricHeader": {"metricHeaderEntries": [{"name": "revenuePerTransaction"}]}
                },
                "data": {"totals": [{"values": ["0.0"]}], "minimums": [{"values": ["0.0"]}], "maximums": [{"values": ["0.0"]}]}
            }]
        }));
        let service = AnalyticsService::new(backend);

        let result = service
            .avg_order_value_per_device("v", ReportDate::Yesterday, ReportDate::Today)
            .await
            .unwrap();

        assert_eq!(result.dimensions, DimensionValues::Empty);
        assert_eq!(result.metrics, vec![0.0]);
    }

    #[test]
    fn test_from_config_fails_without_key_file() {
        let config = Config::with_key_file("/no/such/analytics-key.json");
        let err = AnalyticsService::from_config(&config).unwrap_err();
        assert!(matches!(
            err,
            InitError::Config(ConfigError::KeyFileNotFound(_))
        ));
    }
}
