//! Error types for the donation analytics engine

use chrono::NaiveDate;
use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, AnalyticsError>;

/// Top-level errors surfaced by the aggregation engine
#[derive(Error, Debug)]
pub enum AnalyticsError {
    /// Malformed or out-of-policy input, reported verbatim to the caller
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Order store failures on the main metrics path
    #[error(transparent)]
    Data(#[from] DataError),

    /// Invalid configuration
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl AnalyticsError {
    /// Message safe to show to the dashboard user.
    ///
    /// Validation failures are returned verbatim; storage failures collapse
    /// into a generic message so store internals never leak.
    pub fn user_message(&self) -> String {
        match self {
            AnalyticsError::Validation(err) => err.to_string(),
            AnalyticsError::Data(_) => {
                "Unable to load dashboard data right now. Please try again.".to_string()
            }
            AnalyticsError::Config(_) => "The analytics dashboard is misconfigured.".to_string(),
        }
    }

    /// Whether the error was caused by caller input
    pub fn is_validation(&self) -> bool {
        matches!(self, AnalyticsError::Validation(_))
    }
}

/// Input validation failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Please select both a start and an end date for the custom range")]
    MissingCustomDates,

    #[error("Invalid date format '{value}', expected YYYY-MM-DD")]
    InvalidDateFormat { value: String },

    #[error("The start date {from} is after the end date {to}")]
    InvertedRange { from: NaiveDate, to: NaiveDate },

    #[error("The end date {to} is in the future (today is {today})")]
    FutureDate { to: NaiveDate, today: NaiveDate },

    #[error("The selected range spans {days} days; the maximum is {max} days")]
    RangeTooLarge { days: i64, max: i64 },

    #[error("Unknown date range '{0}'")]
    UnknownRange(String),

    #[error("Unknown dashboard tab '{0}'")]
    UnknownDimension(String),

    #[error("Unknown view type '{0}', expected daily or weekly")]
    UnknownViewType(String),

    #[error("Unknown filter '{0}'")]
    UnknownFilter(String),

    #[error("A value is required for the '{0}' filter")]
    MissingFilterValue(String),
}

/// Order store failures
#[derive(Error, Debug, Clone)]
pub enum DataError {
    /// The store call itself failed
    #[error("Order store query '{query}' failed: {message}")]
    Query {
        query: &'static str,
        message: String,
    },

    /// The store returned rows that violate the query contract
    #[error("Order store query '{query}' returned malformed rows: {message}")]
    Malformed {
        query: &'static str,
        message: String,
    },

    /// The store could not be opened or loaded
    #[error("Order store unavailable: {0}")]
    Unavailable(String),
}

impl DataError {
    /// Create a new query failure
    pub fn query(query: &'static str, message: impl Into<String>) -> Self {
        Self::Query {
            query,
            message: message.into(),
        }
    }

    /// Create a new malformed-rows failure
    pub fn malformed(query: &'static str, message: impl Into<String>) -> Self {
        Self::Malformed {
            query,
            message: message.into(),
        }
    }

    /// Create a new unavailable-store failure
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }
}

/// Calendar arithmetic failures while building date periods
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CalendarError {
    #[error("Date period {start}..{end} spans {days} days, above the {max} day limit")]
    PeriodTooLong {
        start: NaiveDate,
        end: NaiveDate,
        days: i64,
        max: i64,
    },

    #[error("Date arithmetic overflowed after {0}")]
    Overflow(NaiveDate),
}

/// Result cache failures; callers treat every one of them as a miss
#[derive(Error, Debug, Clone)]
pub enum CacheError {
    #[error("Cache unavailable: {0}")]
    Unavailable(String),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    /// Create a new invalid-configuration error
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message_is_verbatim() {
        let err = AnalyticsError::from(ValidationError::RangeTooLarge {
            days: 800,
            max: 730,
        });
        assert!(err.is_validation());
        assert_eq!(
            err.user_message(),
            "The selected range spans 800 days; the maximum is 730 days"
        );
    }

    #[test]
    fn test_data_error_message_is_generic() {
        let err = DataError::query("main_metrics", "connection reset by peer");
        let err = AnalyticsError::from(err);
        assert!(!err.is_validation());
        let message = err.user_message();
        assert!(!message.contains("connection reset"));
        assert!(!message.contains("main_metrics"));
    }
}
