//! Report request construction.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;

use crate::error::ApiError;
use crate::reporting::{DateRange, Dimension, GetReportsRequest, Metric, ReportRequest};

/// Namespace prefix the backend expects on every expression.
pub const EXPRESSION_PREFIX: &str = "ga:";

/// A date range bound as the backend understands it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportDate {
    Date(NaiveDate),
    Today,
    Yesterday,
    DaysAgo(u32),
}

impl From<NaiveDate> for ReportDate {
    fn from(date: NaiveDate) -> Self {
        Self::Date(date)
    }
}

impl fmt::Display for ReportDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Date(date) => write!(f, "{}", date.format("%Y-%m-%d")),
            Self::Today => f.write_str("today"),
            Self::Yesterday => f.write_str("yesterday"),
            Self::DaysAgo(n) => write!(f, "{}daysAgo", n),
        }
    }
}

impl FromStr for ReportDate {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s {
            "today" => return Ok(Self::Today),
            "yesterday" => return Ok(Self::Yesterday),
            _ => {}
        }

        if let Some(n) = s.strip_suffix("daysAgo") {
            return n
                .parse()
                .map(Self::DaysAgo)
                .map_err(|_| ApiError::InvalidRequest(format!("invalid relative date '{}'", s)));
        }

        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(Self::Date)
            .map_err(|_| {
                ApiError::InvalidRequest(format!(
                    "invalid date '{}' (expected YYYY-MM-DD, today, yesterday or NdaysAgo)",
                    s
                ))
            })
    }
}

/// One or more metric/dimension expressions, unprefixed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Expressions(Vec<String>);

impl Expressions {
    #[cfg(test)]
    pub fn none() -> Self {
        Self(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl From<&str> for Expressions {
    fn from(expression: &str) -> Self {
        Self(vec![expression.to_string()])
    }
}

impl From<String> for Expressions {
    fn from(expression: String) -> Self {
        Self(vec![expression])
    }
}

impl From<Vec<String>> for Expressions {
    fn from(expressions: Vec<String>) -> Self {
        Self(expressions)
    }
}

impl From<&[&str]> for Expressions {
    fn from(expressions: &[&str]) -> Self {
        Self(expressions.iter().map(|e| e.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for Expressions {
    fn from(expressions: [&str; N]) -> Self {
        Self(expressions.iter().map(|e| e.to_string()).collect())
    }
}

/// Everything needed to build one report request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRequestSpec {
    pub view_id: String,
    pub start_date: ReportDate,
    pub end_date: ReportDate,
    pub metrics: Expressions,
    pub dimensions: Expressions,
}

impl ReportRequestSpec {
    pub fn new(
        view_id: impl Into<String>,
        start_date: ReportDate,
        end_date: ReportDate,
        metrics: impl Into<Expressions>,
        dimensions: impl Into<Expressions>,
    ) -> Self {
        Self {
            view_id: view_id.into(),
            start_date,
            end_date,
            metrics: metrics.into(),
            dimensions: dimensions.into(),
        }
    }

    /// Build the report request. Fails when no metric is given.
    pub fn to_report_request(&self) -> Result<ReportRequest, ApiError> {
        if self.metrics.is_empty() {
            return Err(ApiError::InvalidRequest(
                "at least one metric expression is required".into(),
            ));
        }

        Ok(ReportRequest {
            view_id: self.view_id.clone(),
            date_ranges: vec![DateRange {
                start_date: self.start_date.to_string(),
                end_date: self.end_date.to_string(),
            }],
            metrics: self.metrics.iter().map(create_metric).collect(),
            dimensions: self.dimensions.iter().map(create_dimension).collect(),
        })
    }

    /// Wrap the request in a single-entry batch body.
    pub fn to_batch(&self) -> Result<GetReportsRequest, ApiError> {
        Ok(GetReportsRequest {
            report_requests: vec![self.to_report_request()?],
        })
    }
}

fn create_metric(expression: &str) -> Metric {
    Metric {
        expression: format!("{}{}", EXPRESSION_PREFIX, expression),
        alias: Some(expression.to_string()),
    }
}

fn create_dimension(expression: &str) -> Dimension {
    Dimension {
        name: format!("{}{}", EXPRESSION_PREFIX, expression),
    }
}
