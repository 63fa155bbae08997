//! MCP Server implementation with Google Analytics reporting tools.

use std::borrow::Cow;
use std::sync::Arc;

use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{
        CallToolResult, Content, ErrorCode, ErrorData as McpError, Implementation,
        ProtocolVersion, ServerCapabilities, ServerInfo,
    },
    schemars::{self, JsonSchema},
    tool, tool_handler, tool_router, ServerHandler,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::debug::DebugLogger;
use crate::error::ApiError;
use crate::flatten::FlatResult;
use crate::reporting::HttpReportingClient;
use crate::request::{Expressions, ReportDate, ReportRequestSpec};
use crate::service::AnalyticsService;

/// Google Analytics Reporting MCP Server.
#[derive(Clone)]
pub struct GaReportingServer {
    service: Arc<AnalyticsService<HttpReportingClient>>,
    default_view_id: Option<String>,
    debug: Arc<DebugLogger>,
    tool_router: ToolRouter<Self>,
}

impl GaReportingServer {
    pub fn new(
        service: AnalyticsService<HttpReportingClient>,
        default_view_id: Option<String>,
        debug: Arc<DebugLogger>,
    ) -> Self {
        Self {
            service: Arc::new(service),
            default_view_id,
            debug,
            tool_router: Self::tool_router(),
        }
    }

    fn resolve(&self, params: &DateRangeParams) -> Result<(String, ReportDate, ReportDate), McpError> {
        resolve_range(params, self.default_view_id.as_deref())
    }

    /// Log and render a tool result.
    fn respond(&self, tool_name: &str, result: Result<FlatResult, ApiError>) -> Result<CallToolResult, McpError> {
        let flat = result.map_err(|e| {
            self.debug.log_error(tool_name, &e.to_string());
            to_mcp_error(e)
        })?;

        let json = serde_json::to_value(&flat).map_err(to_mcp_error)?;
        self.debug.log_tool_result(tool_name, &json);

        let text = serde_json::to_string_pretty(&json).map_err(to_mcp_error)?;
        Ok(CallToolResult::success(vec![Content::text(text)]))
    }
}

impl std::fmt::Debug for GaReportingServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GaReportingServer")
            .field("default_view_id", &self.default_view_id)
            .field("debug", &self.debug)
            .finish()
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Convert any error to McpError
fn to_mcp_error<E: std::fmt::Display>(e: E) -> McpError {
    McpError {
        code: ErrorCode::INTERNAL_ERROR,
        message: Cow::from(e.to_string()),
        data: None,
    }
}

fn invalid_params(message: impl Into<String>) -> McpError {
    McpError {
        code: ErrorCode::INVALID_PARAMS,
        message: Cow::from(message.into()),
        data: None,
    }
}

/// Pick the view and parse both date bounds.
fn resolve_range(
    params: &DateRangeParams,
    default_view_id: Option<&str>,
) -> Result<(String, ReportDate, ReportDate), McpError> {
    let view_id = params
        .view_id
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .or(default_view_id)
        .ok_or_else(|| invalid_params("view_id is required (no default_view_id configured)"))?;

    let start = params
        .start_date
        .parse::<ReportDate>()
        .map_err(|e| invalid_params(e.to_string()))?;
    let end = params
        .end_date
        .parse::<ReportDate>()
        .map_err(|e| invalid_params(e.to_string()))?;

    Ok((view_id.trim().to_string(), start, end))
}

// ============================================================================
// Tool Parameter Structs
// ============================================================================

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct DateRangeParams {
    /// Analytics view ID; falls back to the configured default_view_id
    pub view_id: Option<String>,
    /// Start date: YYYY-MM-DD, today, yesterday or NdaysAgo
    pub start_date: String,
    /// End date: YYYY-MM-DD, today, yesterday or NdaysAgo
    pub end_date: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct QueryReportParams {
    #[serde(flatten)]
    pub range: DateRangeParams,
    /// Metric names without the ga: prefix (e.g., ["sessions", "pageviews"])
    pub metrics: Vec<String>,
    /// Dimension names without the ga: prefix (e.g., ["date", "deviceCategory"])
    #[serde(default)]
    pub dimensions: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct MetricParams {
    #[serde(flatten)]
    pub range: DateRangeParams,
    /// Metric name without the ga: prefix (e.g., "users")
    pub metric: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct MetricByDimensionParams {
    #[serde(flatten)]
    pub range: DateRangeParams,
    /// Metric name without the ga: prefix (e.g., "users")
    pub metric: String,
    /// Second dimension after date, without the ga: prefix (e.g., "country")
    pub dimension: String,
}

// ============================================================================
// Tool Implementations
// ============================================================================

#[tool_router]
impl GaReportingServer {
    // ========================================================================
    // Generic Queries
    // ========================================================================

    #[tool(description = "Run a report for any metrics and dimensions over a date range. Returns dimensionNames, metricNames, dateRangeValues (total/min/max of the first metric, totalByDimensions), dimensions and per-row metrics.")]
    async fn query_report(&self, Parameters(params): Parameters<QueryReportParams>) -> Result<CallToolResult, McpError> {
        self.debug.log_tool_call("query_report", &json!(params));

        let (view_id, start, end) = self.resolve(&params.range)?;
        if params.metrics.is_empty() {
            return Err(invalid_params("at least one metric is required"));
        }

        let spec = ReportRequestSpec::new(
            view_id,
            start,
            end,
            params.metrics,
            Expressions::from(params.dimensions),
        );
        let result = self.service.query(&spec).await;
        self.respond("query_report", result)
    }

    #[tool(description = "Get one metric per day over a date range.")]
    async fn get_metric_date_range(&self, Parameters(params): Parameters<MetricParams>) -> Result<CallToolResult, McpError> {
        self.debug.log_tool_call("get_metric_date_range", &json!(params));

        let (view_id, start, end) = self.resolve(&params.range)?;
        let result = self.service.metric_date_range(&view_id, start, end, &params.metric).await;
        self.respond("get_metric_date_range", result)
    }

    #[tool(description = "Get one metric per day broken down by a second dimension. totalByDimensions sums the metric per second-dimension value.")]
    async fn get_metric_by_dimension_date_range(&self, Parameters(params): Parameters<MetricByDimensionParams>) -> Result<CallToolResult, McpError> {
        self.debug.log_tool_call("get_metric_by_dimension_date_range", &json!(params));

        let (view_id, start, end) = self.resolve(&params.range)?;
        let result = self
            .service
            .metric_by_dimension_date_range(&view_id, start, end, &params.metric, &params.dimension)
            .await;
        self.respond("get_metric_by_dimension_date_range", result)
    }

    // ========================================================================
    // Presets
    // ========================================================================

    #[tool(description = "Sessions per day over a date range.")]
    async fn get_sessions(&self, Parameters(params): Parameters<DateRangeParams>) -> Result<CallToolResult, McpError> {
        self.debug.log_tool_call("get_sessions", &json!(params));

        let (view_id, start, end) = self.resolve(&params)?;
        let result = self.service.sessions(&view_id, start, end).await;
        self.respond("get_sessions", result)
    }

    #[tool(description = "Sessions per day and device category over a date range.")]
    async fn get_sessions_per_device(&self, Parameters(params): Parameters<DateRangeParams>) -> Result<CallToolResult, McpError> {
        self.debug.log_tool_call("get_sessions_per_device", &json!(params));

        let (view_id, start, end) = self.resolve(&params)?;
        let result = self.service.sessions_per_device(&view_id, start, end).await;
        self.respond("get_sessions_per_device", result)
    }

    #[tool(description = "Bounce rate per day over a date range.")]
    async fn get_bounce_rate(&self, Parameters(params): Parameters<DateRangeParams>) -> Result<CallToolResult, McpError> {
        self.debug.log_tool_call("get_bounce_rate", &json!(params));

        let (view_id, start, end) = self.resolve(&params)?;
        let result = self.service.bounce_rate(&view_id, start, end).await;
        self.respond("get_bounce_rate", result)
    }

    #[tool(description = "Average time on page per day over a date range.")]
    async fn get_avg_time_on_page(&self, Parameters(params): Parameters<DateRangeParams>) -> Result<CallToolResult, McpError> {
        self.debug.log_tool_call("get_avg_time_on_page", &json!(params));

        let (view_id, start, end) = self.resolve(&params)?;
        let result = self.service.avg_time_on_page(&view_id, start, end).await;
        self.respond("get_avg_time_on_page", result)
    }

    #[tool(description = "Pageviews per session per day over a date range.")]
    async fn get_pageviews_per_session(&self, Parameters(params): Parameters<DateRangeParams>) -> Result<CallToolResult, McpError> {
        self.debug.log_tool_call("get_pageviews_per_session", &json!(params));

        let (view_id, start, end) = self.resolve(&params)?;
        let result = self.service.pageviews_per_session(&view_id, start, end).await;
        self.respond("get_pageviews_per_session", result)
    }

    #[tool(description = "Percentage of new visits per day over a date range.")]
    async fn get_percent_new_visits(&self, Parameters(params): Parameters<DateRangeParams>) -> Result<CallToolResult, McpError> {
        self.debug.log_tool_call("get_percent_new_visits", &json!(params));

        let (view_id, start, end) = self.resolve(&params)?;
        let result = self.service.percent_new_visits(&view_id, start, end).await;
        self.respond("get_percent_new_visits", result)
    }

    #[tool(description = "Pageviews per day over a date range.")]
    async fn get_page_views(&self, Parameters(params): Parameters<DateRangeParams>) -> Result<CallToolResult, McpError> {
        self.debug.log_tool_call("get_page_views", &json!(params));

        let (view_id, start, end) = self.resolve(&params)?;
        let result = self.service.page_views(&view_id, start, end).await;
        self.respond("get_page_views", result)
    }

    #[tool(description = "Average page load time per day over a date range.")]
    async fn get_avg_page_load_time(&self, Parameters(params): Parameters<DateRangeParams>) -> Result<CallToolResult, McpError> {
        self.debug.log_tool_call("get_avg_page_load_time", &json!(params));

        let (view_id, start, end) = self.resolve(&params)?;
        let result = self.service.avg_page_load_time(&view_id, start, end).await;
        self.respond("get_avg_page_load_time", result)
    }

    #[tool(description = "Average order value (revenue per transaction) per day over a date range.")]
    async fn get_avg_order_value(&self, Parameters(params): Parameters<DateRangeParams>) -> Result<CallToolResult, McpError> {
        self.debug.log_tool_call("get_avg_order_value", &json!(params));

        let (view_id, start, end) = self.resolve(&params)?;
        let result = self.service.avg_order_value(&view_id, start, end).await;
        self.respond("get_avg_order_value", result)
    }

    #[tool(description = "Average order value (revenue per transaction) per day and device category over a date range.")]
    async fn get_avg_order_value_per_device(&self, Parameters(params): Parameters<DateRangeParams>) -> Result<CallToolResult, McpError> {
        self.debug.log_tool_call("get_avg_order_value_per_device", &json!(params));

        let (view_id, start, end) = self.resolve(&params)?;
        let result = self.service.avg_order_value_per_device(&view_id, start, end).await;
        self.respond("get_avg_order_value_per_device", result)
    }
}

// ============================================================================
// Server Handler Implementation
// ============================================================================

#[tool_handler]
impl ServerHandler for GaReportingServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "Google Analytics Reporting MCP Server - Query Google Analytics views for sessions, \
                bounce rate, page timings, pageviews and order value by date and device category, \
                or run any metric/dimension report. Dates accept YYYY-MM-DD, today, yesterday \
                or NdaysAgo.".to_string()
            ),
        }
    }
}
