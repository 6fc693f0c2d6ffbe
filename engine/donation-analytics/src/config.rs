//! # Configuration Management
//!
//! Configuration structures and management for the donation analytics engine.

use crate::error::ConfigError;
use crate::{
    DEFAULT_CACHE_TTL_SECS, DEFAULT_CHUNK_DAYS, DEFAULT_CUSTOMER_CACHE_TTL_SECS,
    DEFAULT_LARGE_RANGE_THRESHOLD_DAYS, DEFAULT_MAX_CUSTOM_SPAN_DAYS,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration for the analytics engine
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AnalyticsConfig {
    /// Date range configuration
    pub range: RangeConfig,
    /// Result cache configuration
    pub cache: CacheConfig,
    /// Resource budget configuration
    pub budget: BudgetConfig,
    /// Optional subsystems available on this store
    pub capabilities: Capabilities,
    /// Filter processor tuning
    pub processors: ProcessorConfig,
}

/// Date range configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RangeConfig {
    /// Custom ranges spanning more days than this are processed as large ranges
    pub large_range_threshold_days: i64,
    /// Window size for chunked processing
    pub chunk_days: i64,
    /// Longest custom range accepted
    pub max_custom_span_days: i64,
    /// Offset of the store timezone from UTC, in minutes
    pub utc_offset_minutes: i32,
}

impl Default for RangeConfig {
    fn default() -> Self {
        Self {
            large_range_threshold_days: DEFAULT_LARGE_RANGE_THRESHOLD_DAYS,
            chunk_days: DEFAULT_CHUNK_DAYS,
            max_custom_span_days: DEFAULT_MAX_CUSTOM_SPAN_DAYS,
            utc_offset_minutes: 0,
        }
    }
}

/// Result cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable result caching
    pub enabled: bool,
    /// TTL for dashboard payloads (seconds)
    pub ttl_secs: u64,
    /// TTL for the customer breakdown's private cache (seconds)
    pub customer_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: DEFAULT_CACHE_TTL_SECS,
            customer_ttl_secs: DEFAULT_CUSTOMER_CACHE_TTL_SECS,
        }
    }
}

impl CacheConfig {
    /// Get payload TTL as Duration
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// Get customer cache TTL as Duration
    pub fn customer_ttl(&self) -> Duration {
        Duration::from_secs(self.customer_ttl_secs)
    }
}

/// Resource budget configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    /// Memory limit for a single request (MB)
    pub memory_limit_mb: u64,
    /// Fraction of the limit at which chunked processing stops
    pub pressure_ratio: f64,
    /// Optional wall-clock budget for one request (seconds)
    pub deadline_secs: Option<u64>,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            memory_limit_mb: 512,
            pressure_ratio: 0.8,
            deadline_secs: None,
        }
    }
}

impl BudgetConfig {
    /// Memory limit in bytes
    pub fn memory_limit_bytes(&self) -> u64 {
        self.memory_limit_mb * 1024 * 1024
    }
}

/// Optional subsystems available on the order store
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Capabilities {
    /// Recurring donations (subscriptions) are installed
    pub recurring_enabled: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            recurring_enabled: true,
        }
    }
}

/// Filter processor tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    /// Number of customers kept in the donor table
    pub customer_top_n: usize,
    /// Ranges longer than this use the aggregated frequency strategy
    pub frequency_batch_threshold_days: i64,
    /// Median sample cap per frequency bucket in the aggregated strategy
    pub frequency_sample_cap: usize,
    /// Lowest assumed visitor-to-donation conversion rate
    pub estimated_conversion_min: Decimal,
    /// Highest assumed visitor-to-donation conversion rate
    pub estimated_conversion_max: Decimal,
    /// Assumed share of opened checkouts that complete
    pub estimated_checkout_completion: Decimal,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            customer_top_n: 100,
            frequency_batch_threshold_days: 7,
            frequency_sample_cap: 100,
            estimated_conversion_min: Decimal::new(2, 2),
            estimated_conversion_max: Decimal::new(5, 2),
            estimated_checkout_completion: Decimal::new(60, 2),
        }
    }
}

impl AnalyticsConfig {
    /// Load configuration from file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: AnalyticsConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.range.chunk_days <= 0 {
            return Err(ConfigError::invalid("range.chunk_days must be greater than 0"));
        }
        if self.range.large_range_threshold_days <= 0 {
            return Err(ConfigError::invalid(
                "range.large_range_threshold_days must be greater than 0",
            ));
        }
        if self.range.max_custom_span_days < self.range.large_range_threshold_days {
            return Err(ConfigError::invalid(
                "range.max_custom_span_days must not be below the large range threshold",
            ));
        }
        if self.range.utc_offset_minutes.abs() >= 24 * 60 {
            return Err(ConfigError::invalid("range.utc_offset_minutes must be within one day"));
        }
        if !(self.budget.pressure_ratio > 0.0 && self.budget.pressure_ratio <= 1.0) {
            return Err(ConfigError::invalid("budget.pressure_ratio must be in (0, 1]"));
        }
        if self.budget.memory_limit_mb == 0 {
            return Err(ConfigError::invalid("budget.memory_limit_mb must be greater than 0"));
        }
        let p = &self.processors;
        if p.estimated_conversion_min <= Decimal::ZERO
            || p.estimated_conversion_min > p.estimated_conversion_max
            || p.estimated_conversion_max > Decimal::ONE
        {
            return Err(ConfigError::invalid(
                "processors conversion range must satisfy 0 < min <= max <= 1",
            ));
        }
        if p.estimated_checkout_completion <= Decimal::ZERO
            || p.estimated_checkout_completion > Decimal::ONE
        {
            return Err(ConfigError::invalid(
                "processors.estimated_checkout_completion must be in (0, 1]",
            ));
        }
        Ok(())
    }
}
