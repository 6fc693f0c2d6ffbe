//! # Donation Analytics
//!
//! Aggregation engine behind the donation dashboard: given a date range, a
//! set of dimensional filters and a dashboard tab, it computes totals,
//! one-time and recurring splits, daily or weekly series, new donor counts
//! and the breakdown for the requested tab.
//!
//! ## Architecture
//!
//! - **DateRangeResolver**: symbolic range names to concrete dates, standard or large
//! - **OrderStore**: read-only query contract over orders, items and customers
//! - **FilterProcessors**: one breakdown per tab (payment, country, daytime, ...)
//! - **AggregationEngine**: standard, optimized and chunked computation paths
//! - **ResultCache**: results keyed by the full request shape
//!
//! ## Usage
//!
//! ```rust
//! use donation_analytics::{AggregationEngine, AnalyticsConfig, DashboardRequest, RangeName};
//! use donation_analytics::{InMemoryOrderStore, StoreFixture};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(InMemoryOrderStore::new(StoreFixture::default()));
//!     let engine = AggregationEngine::new(store, AnalyticsConfig::default());
//!
//!     let response = engine.compute(&DashboardRequest::new(RangeName::Last7Days)).await?;
//!     assert_eq!(response.result.chart_data.len(), 7);
//!     Ok(())
//! }
//! ```

pub mod budget;
pub mod cache;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod filters;
pub mod processors;
pub mod range;
pub mod request;
pub mod result;
pub mod stats;
pub mod store;
pub mod timeseries;


pub use budget::{Budget, BudgetCheck, FixedProbe, MemoryProbe, ScriptedProbe, SysinfoProbe};
pub use cache::{CacheKey, CacheStats, InvalidateScope, MemoryCache, NoCache, ResultCache};
pub use config::{AnalyticsConfig, Capabilities};
pub use engine::{Aggregation, AggregationEngine, Strategy};
pub use error::{AnalyticsError, CalendarError, CacheError, DataError, Result, ValidationError};
pub use filters::{FilterDimension, FilterKey, FilterSet, ViewType};
pub use range::{
    Clock, DateRange, DateRangeResolver, FixedClock, RangeClass, RangeName, SystemClock,
};
pub use request::{DashboardRequest, DashboardResponse, ProcessingMode, ResponseMeta};
pub use result::{
    AggregateResult, Breakdown, BreakdownEntry, CustomerBreakdown, FilterData, Heatmap,
};
pub use store::{InMemoryOrderStore, OrderStore, StoreFixture};
pub use timeseries::TimeSeries;

/// Current version of the crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Version tag mixed into every cache key
pub const CACHE_SCHEMA_VERSION: u32 = 1;

/// Default result cache TTL (1 hour)
pub const DEFAULT_CACHE_TTL_SECS: u64 = 3600;

/// Default TTL of the customer breakdown cache (5 minutes)
pub const DEFAULT_CUSTOMER_CACHE_TTL_SECS: u64 = 300;

/// Default window size for chunked processing
pub const DEFAULT_CHUNK_DAYS: i64 = 30;

/// Custom ranges spanning more days than this are large by default
pub const DEFAULT_LARGE_RANGE_THRESHOLD_DAYS: i64 = 180;

/// Default longest accepted custom range
pub const DEFAULT_MAX_CUSTOM_SPAN_DAYS: i64 = 730;

/// Longest date period that is ever materialised day by day
pub const MAX_PERIOD_DAYS: i64 = 3660;
