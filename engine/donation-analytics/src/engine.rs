//! # Aggregation Engine
//!
//! Orchestrates one dashboard request: range resolution, cache policy,
//! main and recurring metrics, the filter processor for the requested tab,
//! and for large ranges either a single optimized pass or a sequence of
//! windowed passes merged together.

use crate::budget::{Budget, BudgetCheck, MemoryProbe, SysinfoProbe};
use crate::cache::{CacheKey, CacheStats, InvalidateScope, MemoryCache, NoCache, ResultCache};
use crate::config::{AnalyticsConfig, Capabilities};
use crate::error::{DataError, Result};
use crate::filters::{FilterDimension, FilterSet, ViewType};
use crate::processors::FilterProcessors;
use crate::range::{Clock, DateRange, DateRangeResolver, RangeClass, SystemClock};
use crate::request::{DashboardRequest, DashboardResponse, ProcessingMode, ResponseMeta};
use crate::result::AggregateResult;
use crate::store::{DailyMetricRow, OrderStore};
use crate::timeseries::TimeSeries;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// How a range is walked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// One pass over the whole range
    SinglePass,
    /// Consecutive windows of `chunk_days`, merged in order
    Chunked { chunk_days: i64 },
}

/// Unfinalized result of walking a range
#[derive(Debug, Clone)]
pub struct Aggregation {
    pub result: AggregateResult,
    pub chunks_processed: usize,
    pub chunks_total: usize,
    /// The chunk loop stopped before the last window
    pub partial: bool,
}

/// The dashboard aggregation engine
pub struct AggregationEngine {
    store: Arc<dyn OrderStore>,
    cache: Arc<dyn ResultCache>,
    resolver: DateRangeResolver,
    processors: FilterProcessors,
    probe: Arc<dyn MemoryProbe>,
    capabilities: Capabilities,
    config: AnalyticsConfig,
}

impl std::fmt::Debug for AggregationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregationEngine")
            .field("resolver", &self.resolver)
            .field("capabilities", &self.capabilities)
            .field("config", &self.config)
            .finish()
    }
}

impl AggregationEngine {
    /// Create an engine with the system clock, an in-memory result cache and
    /// a process memory probe
    pub fn new(store: Arc<dyn OrderStore>, config: AnalyticsConfig) -> Self {
        let clock = SystemClock::with_offset_minutes(config.range.utc_offset_minutes);
        let cache: Arc<dyn ResultCache> = if config.cache.enabled {
            Arc::new(MemoryCache::new())
        } else {
            Arc::new(NoCache)
        };
        let capabilities = config.capabilities;

        Self {
            store,
            cache,
            resolver: DateRangeResolver::new(Box::new(clock), config.range.clone()),
            processors: FilterProcessors::new(&config, capabilities),
            probe: Arc::new(SysinfoProbe::new()),
            capabilities,
            config,
        }
    }

    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.resolver = DateRangeResolver::new(clock, self.config.range.clone());
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn ResultCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_memory_probe(mut self, probe: Arc<dyn MemoryProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self.processors = FilterProcessors::new(&self.config, capabilities);
        self
    }

    pub fn resolver(&self) -> &DateRangeResolver {
        &self.resolver
    }

    pub fn config(&self) -> &AnalyticsConfig {
        &self.config
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Clear every cached result. Safe to call repeatedly.
    pub fn invalidate_cache(&self) {
        if let Err(err) = self.cache.invalidate(InvalidateScope::All) {
            warn!(error = %err, "Failed to clear result cache");
        }
        self.processors.customer().flush();
    }

    /// Cache key a request maps to
    pub fn cache_key(&self, request: &DashboardRequest) -> Result<CacheKey> {
        let range = self.resolve(request)?;
        Ok(self.derive_key(request, &range))
    }

    fn resolve(&self, request: &DashboardRequest) -> Result<DateRange> {
        Ok(self.resolver.resolve(
            request.date_range,
            request.date_from.as_deref(),
            request.date_to.as_deref(),
        )?)
    }

    fn derive_key(&self, request: &DashboardRequest, range: &DateRange) -> CacheKey {
        CacheKey::derive(
            request.date_range,
            request.date_from.as_deref(),
            request.date_to.as_deref(),
            range,
            request.view_type,
            request.filter,
            &request.filters,
        )
    }

    /// Compute the dashboard payload for one request
    pub async fn compute(&self, request: &DashboardRequest) -> Result<DashboardResponse> {
        let range = self.resolve(request)?;
        let class = self.resolver.classify(request.date_range, &range);
        let cacheable = self.config.cache.enabled
            && request.filters.is_empty()
            && class == RangeClass::Standard;
        let key = self.derive_key(request, &range);

        if cacheable {
            match self.cache.get(&key) {
                Ok(Some(result)) => {
                    debug!(key = %key, %range, "Serving dashboard from cache");
                    let mode = ProcessingMode::Cached;
                    return Ok(self.response(request, range, class, mode, result, None));
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(key = %key, error = %err, "Result cache unavailable, computing uncached")
                }
            }
        }

        let budget = Budget::from_config(&self.config.budget, self.probe.clone());
        let (mode, strategy) = match class {
            RangeClass::Standard => (ProcessingMode::Standard, Strategy::SinglePass),
            RangeClass::Large if request.filter.prefers_single_pass() => {
                (ProcessingMode::Optimized, Strategy::SinglePass)
            }
            RangeClass::Large => (
                ProcessingMode::Chunked,
                Strategy::Chunked {
                    chunk_days: self.config.range.chunk_days,
                },
            ),
        };
        info!(
            %range,
            class = ?class,
            mode = ?mode,
            dimension = %request.filter,
            filters = request.filters.len(),
            "Computing dashboard"
        );

        let aggregation = self
            .aggregate(&range, request.filter, &request.filters, strategy, &budget)
            .await?;
        let result = Self::present(aggregation.result.clone(), &range, request.view_type);

        // only complete results are cached; a partial one is never stored
        if cacheable && !aggregation.partial {
            let ttl = self.config.cache.ttl();
            if let Err(err) = self.cache.put(key.clone(), result.clone(), ttl) {
                warn!(key = %key, error = %err, "Failed to cache dashboard result");
            }
        }

        Ok(self.response(request, range, class, mode, result, Some(&aggregation)))
    }

    /// Compute just the aggregate for a request
    pub async fn compute_result(&self, request: &DashboardRequest) -> Result<AggregateResult> {
        Ok(self.compute(request).await?.result)
    }

    /// Finalize derived figures and apply the requested view
    fn present(result: AggregateResult, range: &DateRange, view_type: ViewType) -> AggregateResult {
        let result = result.finalize(range);
        match view_type {
            ViewType::Daily => result,
            ViewType::Weekly => result.to_weekly(),
        }
    }

    fn response(
        &self,
        request: &DashboardRequest,
        range: DateRange,
        class: RangeClass,
        mode: ProcessingMode,
        result: AggregateResult,
        aggregation: Option<&Aggregation>,
    ) -> DashboardResponse {
        DashboardResponse {
            result,
            meta: ResponseMeta {
                generated_at: Utc::now(),
                range,
                range_class: class,
                mode,
                cached: mode == ProcessingMode::Cached,
                partial: aggregation.is_some_and(|a| a.partial),
                chunks_processed: aggregation.map_or(0, |a| a.chunks_processed),
                chunks_total: aggregation.map_or(0, |a| a.chunks_total),
                minimal: request.minimal,
            },
        }
    }

    /// Walk `range` with the given strategy.
    ///
    /// The result is unfinalized and daily; callers run
    /// [`AggregateResult::finalize`] once on the full range.
    pub async fn aggregate(
        &self,
        range: &DateRange,
        dimension: FilterDimension,
        filters: &FilterSet,
        strategy: Strategy,
        budget: &Budget,
    ) -> Result<Aggregation> {
        match strategy {
            Strategy::SinglePass => {
                if !self.ensure_headroom(budget) {
                    warn!(%range, "Memory pressure persists, running single pass anyway");
                }
                let result = self.compute_window(range, dimension, filters).await?;
                Ok(Aggregation {
                    result,
                    chunks_processed: 1,
                    chunks_total: 1,
                    partial: false,
                })
            }
            Strategy::Chunked { chunk_days } => {
                self.aggregate_chunked(range, dimension, filters, chunk_days, budget).await
            }
        }
    }

    async fn aggregate_chunked(
        &self,
        range: &DateRange,
        dimension: FilterDimension,
        filters: &FilterSet,
        chunk_days: i64,
        budget: &Budget,
    ) -> Result<Aggregation> {
        let windows = range.chunks(chunk_days);
        let chunks_total = windows.len();
        let mut merged = AggregateResult::zeroed(Self::skeleton(range));
        let mut chunks_processed = 0;

        for (index, window) in windows.iter().enumerate() {
            if !self.ensure_headroom(budget) {
                warn!(
                    %range,
                    chunk = index,
                    chunks_processed,
                    chunks_total,
                    "Stopping chunked processing early, returning partial result"
                );
                return Ok(Aggregation {
                    result: merged,
                    chunks_processed,
                    chunks_total,
                    partial: true,
                });
            }

            debug!(chunk = index, window = %window, "Processing chunk");
            let chunk = self.compute_window(window, dimension, filters).await?;
            merged = merged.merge(chunk);
            chunks_processed += 1;
        }

        Ok(Aggregation {
            result: merged,
            chunks_processed,
            chunks_total,
            partial: false,
        })
    }

    /// Check the budget, relieving memory pressure once if needed
    fn ensure_headroom(&self, budget: &Budget) -> bool {
        match budget.check() {
            BudgetCheck::Within => true,
            BudgetCheck::DeadlineExceeded => {
                warn!("Request deadline exceeded");
                false
            }
            BudgetCheck::MemoryPressure { used, threshold } => {
                let purged = self.cache.purge_expired();
                let flushed = self.processors.customer().flush();
                info!(used, threshold, purged, flushed, "Relieved memory pressure");
                budget.check().is_within()
            }
        }
    }

    /// Zeroed daily series for `range`; an invalid period degrades to an empty one
    fn skeleton(range: &DateRange) -> TimeSeries {
        TimeSeries::skeleton(range).unwrap_or_else(|err| {
            error!(%range, error = %err, "Failed to build date skeleton, using empty series");
            TimeSeries::new()
        })
    }

    /// Standard computation over one window
    async fn compute_window(
        &self,
        range: &DateRange,
        dimension: FilterDimension,
        filters: &FilterSet,
    ) -> Result<AggregateResult> {
        let store = self.store.as_ref();

        let main = store.main_metrics(range, filters).await.map_err(|err| {
            let filters = filters.canonical();
            error!(%range, %filters, error = %err, "Main metrics query failed");
            err
        })?;
        Self::check_rows("main_metrics", range, &main)?;

        let installments = if self.capabilities.recurring_enabled {
            let rows = store.subscription_metrics(range, filters).await.map_err(|err| {
                let filters = filters.canonical();
                error!(%range, %filters, error = %err, "Subscription metrics query failed");
                err
            })?;
            Self::check_rows("subscription_metrics", range, &rows)?;
            rows
        } else {
            Vec::new()
        };

        let new_donors = store.new_donor_count(range, filters).await.map_err(|err| {
            error!(%range, error = %err, "New donor query failed");
            err
        })?;

        let result = AggregateResult::zeroed(Self::skeleton(range))
            .with_main_metrics(&main)
            .with_installments(&installments)
            .with_new_donors(new_donors)
            .derive_onetime();

        if result.onetime_count < 0 || result.onetime_amount.is_sign_negative() {
            warn!(
                %range,
                onetime_count = result.onetime_count,
                onetime_amount = %result.onetime_amount,
                "Recurring totals exceed overall totals"
            );
        }

        let filter_data = self.processors.process(dimension, store, range, filters).await;
        Ok(result.with_filter_data(filter_data))
    }

    fn check_rows(
        query: &'static str,
        range: &DateRange,
        rows: &[DailyMetricRow],
    ) -> std::result::Result<(), DataError> {
        match rows.iter().find(|row| !range.contains(row.day)) {
            Some(row) => {
                error!(query, %range, day = %row.day, "Store returned a row outside the range");
                Err(DataError::malformed(query, format!("row for {} outside {}", row.day, range)))
            }
            None => Ok(()),
        }
    }
}
