//! Flattens a nested report into totals, per-dimension values and a per-row series.

use std::collections::BTreeMap;

use serde::{Serialize, Serializer};

use crate::reporting::{DateRangeValues, Report};

/// Length of the backend prefix on dimension header names (`ga:`).
const DIMENSION_PREFIX_LEN: usize = 3;

/// Aggregates for the first metric over the whole date range.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRangeSummary {
    pub total: f64,
    pub min: f64,
    pub max: f64,
    /// Secondary dimension value -> summed first-metric value.
    pub total_by_dimensions: BTreeMap<String, f64>,
}

/// Per-dimension first-metric values.
#[derive(Debug, Clone, PartialEq)]
pub enum DimensionValues {
    /// The report had no rows; serializes as `[0]`.
    Empty,
    /// Primary value -> value.
    ByPrimary(BTreeMap<String, f64>),
    /// Primary value -> secondary value -> value.
    ByPrimaryAndSecondary(BTreeMap<String, BTreeMap<String, f64>>),
}

impl Serialize for DimensionValues {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Empty => [0].serialize(serializer),
            Self::ByPrimary(map) => map.serialize(serializer),
            Self::ByPrimaryAndSecondary(map) => map.serialize(serializer),
        }
    }
}

/// Flattened report, serialized with the camelCase keys callers consume.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatResult {
    pub dimension_names: Vec<String>,
    pub metric_names: Vec<String>,
    pub date_range_values: DateRangeSummary,
    pub dimensions: DimensionValues,
    /// One entry per row, in row order. `[0]` when the report had no rows.
    pub metrics: Vec<f64>,
}

/// Reshapes a raw report into a [`FlatResult`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ReportFlattener;

impl ReportFlattener {
    pub fn flatten(&self, report: &Report) -> FlatResult {
        let header = &report.column_header;
        let data = &report.data;

        let dimension_names = header
            .dimensions
            .iter()
            .map(|name| strip_prefix(name))
            .collect();
        let metric_names = header
            .metric_header
            .metric_header_entries
            .iter()
            .map(|entry| entry.name.clone())
            .collect();

        let mut summary = DateRangeSummary {
            total: first_value(&data.totals),
            min: first_value(&data.minimums),
            max: first_value(&data.maximums),
            total_by_dimensions: BTreeMap::new(),
        };

        if data.row_count.unwrap_or(0) == 0 || data.rows.is_empty() {
            return FlatResult {
                dimension_names,
                metric_names,
                date_range_values: summary,
                dimensions: DimensionValues::Empty,
                metrics: vec![0.0],
            };
        }

        let header_count = header.dimensions.len();
        let mut metrics = Vec::with_capacity(data.rows.len());

        let dimensions = if header_count > 1 {
            let mut nested: BTreeMap<String, BTreeMap<String, f64>> = BTreeMap::new();

            for row in &data.rows {
                let value = first_value(&row.metrics);
                let upper = header_count.min(row.dimensions.len());
                let Some((primary, secondaries)) = row.dimensions[..upper].split_first() else {
                    continue;
                };
                if secondaries.is_empty() {
                    continue;
                }

                let by_secondary = nested.entry(primary.clone()).or_default();
                for secondary in secondaries {
                    by_secondary.insert(secondary.clone(), value);
                    *summary
                        .total_by_dimensions
                        .entry(secondary.clone())
                        .or_insert(0.0) += value;
                }
                metrics.push(value);
            }

            DimensionValues::ByPrimaryAndSecondary(nested)
        } else {
            let mut flat = BTreeMap::new();

            if header_count == 1 {
                for row in &data.rows {
                    let Some(primary) = row.dimensions.first() else {
                        continue;
                    };
                    let value = first_value(&row.metrics);
                    flat.insert(primary.clone(), value);
                    metrics.push(value);
                }
            }

            DimensionValues::ByPrimary(flat)
        };

        FlatResult {
            dimension_names,
            metric_names,
            date_range_values: summary,
            dimensions,
            metrics,
        }
    }
}

/// Drop the first three characters of a dimension header name.
fn strip_prefix(name: &str) -> String {
    name.chars().skip(DIMENSION_PREFIX_LEN).collect()
}

/// First value of the first date range, parsed; absent or unparseable is 0.
fn first_value(ranges: &[DateRangeValues]) -> f64 {
    let Some(raw) = ranges.first().and_then(|r| r.values.first()) else {
        return 0.0;
    };
    raw.trim().parse().unwrap_or_else(|_| {
        tracing::warn!(value = %raw, "Non-numeric metric value, counting as 0");
        0.0
    })
}
