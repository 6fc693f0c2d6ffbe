//! # Dashboard Requests
//!
//! Request envelope received from the transport layer and the response it
//! gets back.

use crate::error::ValidationError;
use crate::filters::{FilterDimension, FilterSet, ViewType};
use crate::range::{DateRange, RangeClass, RangeName};
use crate::result::AggregateResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Validated dashboard request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardRequest {
    pub date_range: RangeName,
    #[serde(default)]
    pub date_from: Option<String>,
    #[serde(default)]
    pub date_to: Option<String>,
    #[serde(default)]
    pub view_type: ViewType,
    #[serde(default = "default_dimension")]
    pub filter: FilterDimension,
    #[serde(default)]
    pub filters: FilterSet,
    /// Skip auxiliary payload data; echoed back in the response meta
    #[serde(default)]
    pub minimal: bool,
}

fn default_dimension() -> FilterDimension {
    FilterDimension::Raised
}

impl DashboardRequest {
    /// Request for a symbolic range with defaults everywhere else
    pub fn new(date_range: RangeName) -> Self {
        Self {
            date_range,
            date_from: None,
            date_to: None,
            view_type: ViewType::Daily,
            filter: FilterDimension::Raised,
            filters: FilterSet::new(),
            minimal: false,
        }
    }

    /// Custom range request
    pub fn custom(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            date_from: Some(from.into()),
            date_to: Some(to.into()),
            ..Self::new(RangeName::Custom)
        }
    }

    pub fn with_view(mut self, view_type: ViewType) -> Self {
        self.view_type = view_type;
        self
    }

    pub fn with_dimension(mut self, filter: FilterDimension) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_filters(mut self, filters: FilterSet) -> Self {
        self.filters = filters;
        self
    }

    /// Parse raw string parameters as posted by the dashboard.
    ///
    /// Recognised keys are `date_range`, `date_from`, `date_to`, `view_type`,
    /// `filter`, `minimal` and `filters[<name>]`. Unknown tabs, views,
    /// ranges and filter names are rejected.
    pub fn from_params<'a, I>(params: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut fields: BTreeMap<&str, &str> = BTreeMap::new();
        let mut filter_pairs = Vec::new();
        for (key, value) in params {
            match key.strip_prefix("filters[").and_then(|k| k.strip_suffix(']')) {
                Some(name) => filter_pairs.push((name, value)),
                None => {
                    fields.insert(key, value);
                }
            }
        }

        let date_range = match fields.get("date_range").map(|v| v.trim()) {
            None | Some("") => RangeName::Last30Days,
            Some(name) => name.parse()?,
        };
        let optional = |key: &str| {
            fields
                .get(key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        Ok(Self {
            date_range,
            date_from: optional("date_from"),
            date_to: optional("date_to"),
            view_type: fields
                .get("view_type")
                .copied()
                .unwrap_or_default()
                .parse()?,
            filter: match fields.get("filter").map(|v| v.trim()) {
                None | Some("") => FilterDimension::Raised,
                Some(tab) => tab.parse()?,
            },
            filters: FilterSet::from_pairs(filter_pairs)?,
            minimal: fields
                .get("minimal")
                .is_some_and(|v| matches!(v.trim(), "1" | "true" | "yes")),
        })
    }
}

/// How a result was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingMode {
    Standard,
    /// Single full-range pass for a large range
    Optimized,
    /// Windowed passes merged together
    Chunked,
    Cached,
}

/// Metadata returned next to the result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMeta {
    pub generated_at: DateTime<Utc>,
    pub range: DateRange,
    pub range_class: RangeClass,
    pub mode: ProcessingMode,
    pub cached: bool,
    /// Chunk processing stopped early; totals cover only the processed windows
    pub partial: bool,
    pub chunks_processed: usize,
    pub chunks_total: usize,
    pub minimal: bool,
}

/// Result plus metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardResponse {
    #[serde(flatten)]
    pub result: AggregateResult,
    pub meta: ResponseMeta,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::FilterKey;

    #[test]
    fn test_from_params() {
        let request = DashboardRequest::from_params([
            ("date_range", "custom"),
            ("date_from", "2024-01-01"),
            ("date_to", " 2024-01-31 "),
            ("view_type", "weekly"),
            ("filter", "country"),
            ("filters[designation]", "Water Wells"),
            ("filters[source]", ""),
            ("minimal", "1"),
        ])
        .unwrap();

        assert_eq!(request.date_range, RangeName::Custom);
        assert_eq!(request.date_to.as_deref(), Some("2024-01-31"));
        assert_eq!(request.view_type, ViewType::Weekly);
        assert_eq!(request.filter, FilterDimension::Country);
        assert_eq!(request.filters.get(FilterKey::Designation), Some("Water Wells"));
        assert_eq!(request.filters.len(), 1);
        assert!(request.minimal);
    }

    #[test]
    fn test_defaults_and_rejections() {
        let request = DashboardRequest::from_params(Vec::<(&str, &str)>::new()).unwrap();
        assert_eq!(request, DashboardRequest::new(RangeName::Last30Days));

        assert_eq!(
            DashboardRequest::from_params([("filter", "revenue")]),
            Err(ValidationError::UnknownDimension("revenue".to_string()))
        );
        assert!(DashboardRequest::from_params([("filters[colour]", "red")]).is_err());
        assert!(DashboardRequest::from_params([("date_range", "fortnight")]).is_err());
    }

    #[test]
    fn test_deserialize_from_json() {
        let request: DashboardRequest = serde_json::from_str(
            r#"{"date_range":"last7days","filter":"daytime","filters":{"campaign":"12"}}"#,
        )
        .unwrap();
        assert_eq!(request.filter, FilterDimension::Daytime);
        assert_eq!(request.view_type, ViewType::Daily);
        assert_eq!(request.filters.get(FilterKey::Campaign), Some("12"));
    }
}
