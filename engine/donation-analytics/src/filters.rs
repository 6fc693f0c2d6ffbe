//! # Filters and Dashboard Tabs
//!
//! The set of active dimensional constraints narrowing which orders qualify,
//! the closed list of breakdown tabs, and the daily/weekly view switch.

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Dimensions an order can be constrained on
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterKey {
    /// Product / campaign identifier
    Campaign,
    /// Category or tag name
    Designation,
    /// Traffic source
    Source,
    /// Recurrence label ("Once", "Monthly", ...)
    Frequency,
}

impl FilterKey {
    pub const ALL: [FilterKey; 4] = [
        FilterKey::Campaign,
        FilterKey::Designation,
        FilterKey::Source,
        FilterKey::Frequency,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FilterKey::Campaign => "campaign",
            FilterKey::Designation => "designation",
            FilterKey::Source => "source",
            FilterKey::Frequency => "frequency",
        }
    }
}

impl FromStr for FilterKey {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "campaign" => Ok(FilterKey::Campaign),
            "designation" => Ok(FilterKey::Designation),
            "source" => Ok(FilterKey::Source),
            "frequency" => Ok(FilterKey::Frequency),
            _ => Err(ValidationError::UnknownFilter(s.to_string())),
        }
    }
}

impl fmt::Display for FilterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Active filter values for one request.
///
/// Never holds empty values: setting a blank value removes the constraint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<FilterKey, String>", into = "BTreeMap<FilterKey, String>")]
pub struct FilterSet {
    values: BTreeMap<FilterKey, String>,
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from raw key/value pairs as received from the request.
    ///
    /// Blank values are dropped; unknown keys are rejected.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut set = Self::new();
        for (key, value) in pairs {
            let key: FilterKey = key.as_ref().parse()?;
            set = set.with(key, value.as_ref());
        }
        Ok(set)
    }

    /// Parse a `key=value` assignment; unlike request pairs, a blank value is an error
    pub fn parse_assignment(raw: &str) -> Result<(FilterKey, String), ValidationError> {
        let (key, value) = raw
            .split_once('=')
            .ok_or_else(|| ValidationError::MissingFilterValue(raw.trim().to_string()))?;
        let key: FilterKey = key.parse()?;
        match value.trim() {
            "" => Err(ValidationError::MissingFilterValue(key.to_string())),
            value => Ok((key, value.to_string())),
        }
    }

    /// Return a copy with `key` set to `value` (or cleared when blank)
    pub fn with(mut self, key: FilterKey, value: impl AsRef<str>) -> Self {
        let value = value.as_ref().trim();
        if value.is_empty() {
            self.values.remove(&key);
        } else {
            self.values.insert(key, value.to_string());
        }
        self
    }

    pub fn get(&self, key: FilterKey) -> Option<&str> {
        self.values.get(&key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (FilterKey, &str)> {
        self.values.iter().map(|(k, v)| (*k, v.as_str()))
    }

    /// Stable serialization used inside cache keys
    pub fn canonical(&self) -> String {
        serde_json::to_string(&self.values).unwrap_or_default()
    }
}

impl TryFrom<BTreeMap<FilterKey, String>> for FilterSet {
    type Error = ValidationError;

    fn try_from(values: BTreeMap<FilterKey, String>) -> Result<Self, Self::Error> {
        Ok(values.into_iter().fold(FilterSet::new(), |set, (k, v)| set.with(k, v)))
    }
}

impl From<FilterSet> for BTreeMap<FilterKey, String> {
    fn from(set: FilterSet) -> Self {
        set.values
    }
}

/// Breakdown axis selected by the dashboard tab
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterDimension {
    /// Default tab: totals and time series only
    Raised,
    Payment,
    Country,
    Daytime,
    Designation,
    Url,
    Frequency,
    Customer,
}

impl FilterDimension {
    pub const ALL: [FilterDimension; 8] = [
        FilterDimension::Raised,
        FilterDimension::Payment,
        FilterDimension::Country,
        FilterDimension::Daytime,
        FilterDimension::Designation,
        FilterDimension::Url,
        FilterDimension::Frequency,
        FilterDimension::Customer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FilterDimension::Raised => "raised",
            FilterDimension::Payment => "payment",
            FilterDimension::Country => "country",
            FilterDimension::Daytime => "daytime",
            FilterDimension::Designation => "designation",
            FilterDimension::Url => "url",
            FilterDimension::Frequency => "frequency",
            FilterDimension::Customer => "customer",
        }
    }

    /// Tabs whose large-range results need exact global aggregates and
    /// therefore take a single full-range pass instead of chunking
    pub fn prefers_single_pass(&self) -> bool {
        matches!(self, FilterDimension::Raised | FilterDimension::Daytime)
    }
}

impl FromStr for FilterDimension {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        FilterDimension::ALL
            .into_iter()
            .find(|d| d.as_str() == normalized)
            .ok_or_else(|| ValidationError::UnknownDimension(s.to_string()))
    }
}

impl fmt::Display for FilterDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Time series granularity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewType {
    #[default]
    Daily,
    Weekly,
}

impl ViewType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViewType::Daily => "daily",
            ViewType::Weekly => "weekly",
        }
    }
}

impl FromStr for ViewType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "daily" => Ok(ViewType::Daily),
            "weekly" => Ok(ViewType::Weekly),
            _ => Err(ValidationError::UnknownViewType(s.to_string())),
        }
    }
}

impl fmt::Display for ViewType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_values_are_absent() {
        let set = FilterSet::from_pairs([("campaign", "42"), ("source", "   "), ("frequency", "")])
            .unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.get(FilterKey::Campaign), Some("42"));
        assert_eq!(set.get(FilterKey::Source), None);

        let cleared = set.with(FilterKey::Campaign, "");
        assert!(cleared.is_empty());
    }

    #[test]
    fn test_unknown_filter_key_rejected() {
        let err = FilterSet::from_pairs([("colour", "red")]).unwrap_err();
        assert_eq!(err, ValidationError::UnknownFilter("colour".to_string()));
    }

    #[test]
    fn test_parse_assignment() {
        assert_eq!(
            FilterSet::parse_assignment("source = newsletter"),
            Ok((FilterKey::Source, "newsletter".to_string()))
        );
        assert_eq!(
            FilterSet::parse_assignment("campaign="),
            Err(ValidationError::MissingFilterValue("campaign".to_string()))
        );
        assert_eq!(
            FilterSet::parse_assignment("frequency"),
            Err(ValidationError::MissingFilterValue("frequency".to_string()))
        );
        assert!(FilterSet::parse_assignment("colour=red").is_err());
    }

    #[test]
    fn test_canonical_is_order_independent() {
        let a = FilterSet::new()
            .with(FilterKey::Source, "google")
            .with(FilterKey::Campaign, "7");
        let b = FilterSet::new()
            .with(FilterKey::Campaign, "7")
            .with(FilterKey::Source, "google");
        assert_eq!(a.canonical(), b.canonical());
        assert_ne!(a.canonical(), FilterSet::new().canonical());
    }

    #[test]
    fn test_deserialize_drops_blank_values() {
        let set: FilterSet =
            serde_json::from_str(r#"{"designation":"Water Wells","source":""}"#).unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.get(FilterKey::Designation), Some("Water Wells"));
    }

    #[test]
    fn test_dimension_parsing() {
        for dimension in FilterDimension::ALL {
            assert_eq!(dimension.as_str().parse::<FilterDimension>(), Ok(dimension));
        }
        assert_eq!(
            "revenue".parse::<FilterDimension>(),
            Err(ValidationError::UnknownDimension("revenue".to_string()))
        );
        assert!(FilterDimension::Raised.prefers_single_pass());
        assert!(FilterDimension::Daytime.prefers_single_pass());
        assert!(!FilterDimension::Country.prefers_single_pass());
    }

    #[test]
    fn test_view_type_parsing() {
        assert_eq!("weekly".parse::<ViewType>(), Ok(ViewType::Weekly));
        assert_eq!("".parse::<ViewType>(), Ok(ViewType::Daily));
        assert!("monthly".parse::<ViewType>().is_err());
    }
}
