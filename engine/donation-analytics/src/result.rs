//! # Aggregate Results
//!
//! The payload computed for one dashboard request and the breakdown shapes
//! produced by the filter processors.
//!
//! Results are built step by step, each step consuming the previous value,
//! and chunk results are combined with [`AggregateResult::merge`], a pure
//! associative reduce. Derived figures that cannot be summed (medians,
//! averages, percentages, donor classification) are only computed by
//! [`AggregateResult::finalize`] once every chunk has been merged.

use crate::range::DateRange;
use crate::stats::{average, median, percentage};
use crate::store::{DailyMetricRow, Taxonomy};
use crate::timeseries::TimeSeries;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Core output record of the aggregation engine
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateResult {
    pub total_amount: Decimal,
    pub total_count: u64,
    pub installments_amount: Decimal,
    pub installments_count: u64,
    /// `total - installments`; negative only when the store is inconsistent
    pub onetime_amount: Decimal,
    pub onetime_count: i64,
    pub chart_data: TimeSeries,
    pub installments_chart: TimeSeries,
    pub onetime_chart: TimeSeries,
    pub new_donors: u64,
    pub filter_data: FilterData,
}

impl AggregateResult {
    /// Zeroed result whose three series share the given skeleton
    pub fn zeroed(skeleton: TimeSeries) -> Self {
        Self {
            chart_data: skeleton.clone(),
            installments_chart: skeleton.clone(),
            onetime_chart: skeleton,
            ..Self::default()
        }
    }

    /// Add per-day order totals to the main series and totals
    pub fn with_main_metrics(mut self, rows: &[DailyMetricRow]) -> Self {
        for row in rows {
            self.total_amount += row.total_amount;
            self.total_count += row.order_count;
            self.chart_data.add(row.day, row.total_amount);
        }
        self
    }

    /// Add per-day recurring order totals
    pub fn with_installments(mut self, rows: &[DailyMetricRow]) -> Self {
        for row in rows {
            self.installments_amount += row.total_amount;
            self.installments_count += row.order_count;
            self.installments_chart.add(row.day, row.total_amount);
        }
        self
    }

    pub fn with_new_donors(mut self, new_donors: u64) -> Self {
        self.new_donors = new_donors;
        self
    }

    /// Derive the one-time figures as `total - installments`
    pub fn derive_onetime(mut self) -> Self {
        self.onetime_amount = self.total_amount - self.installments_amount;
        self.onetime_count = self.total_count as i64 - self.installments_count as i64;
        self.onetime_chart = self.chart_data.minus(&self.installments_chart);
        self
    }

    pub fn with_filter_data(mut self, filter_data: FilterData) -> Self {
        self.filter_data = filter_data;
        self
    }

    /// Collapse the three series into Monday-anchored weekly buckets
    pub fn to_weekly(mut self) -> Self {
        self.chart_data = self.chart_data.to_weekly();
        self.installments_chart = self.installments_chart.to_weekly();
        self.onetime_chart = self.onetime_chart.to_weekly();
        self
    }

    /// Combine two results covering disjoint date windows.
    ///
    /// Scalars are summed, series are unioned by date and breakdowns are
    /// merged entry by entry.
    pub fn merge(self, other: AggregateResult) -> AggregateResult {
        AggregateResult {
            total_amount: self.total_amount + other.total_amount,
            total_count: self.total_count + other.total_count,
            installments_amount: self.installments_amount + other.installments_amount,
            installments_count: self.installments_count + other.installments_count,
            onetime_amount: self.onetime_amount + other.onetime_amount,
            onetime_count: self.onetime_count + other.onetime_count,
            chart_data: self.chart_data.merge_overwrite(other.chart_data),
            installments_chart: self.installments_chart.merge_overwrite(other.installments_chart),
            onetime_chart: self.onetime_chart.merge_overwrite(other.onetime_chart),
            new_donors: self.new_donors + other.new_donors,
            filter_data: self.filter_data.merge(other.filter_data),
        }
    }

    /// Compute the non-additive figures for the full requested `range`
    pub fn finalize(mut self, range: &DateRange) -> Self {
        self.filter_data = self.filter_data.finalize(range);
        self
    }
}

/// Dimension-specific breakdown attached to a result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FilterData {
    /// Default tab, or a processor that degraded
    #[default]
    Empty,
    /// Keyed entries (payment, country, designation, url, frequency)
    Breakdown(Breakdown),
    Heatmap(Heatmap),
    Customers(CustomerBreakdown),
}

impl FilterData {
    pub fn is_empty(&self) -> bool {
        match self {
            FilterData::Empty => true,
            FilterData::Breakdown(b) => b.entries.is_empty(),
            FilterData::Heatmap(h) => h.total_count == 0,
            FilterData::Customers(c) => c.donors.is_empty() && c.top_customers.is_empty(),
        }
    }

    pub fn as_breakdown(&self) -> Option<&Breakdown> {
        match self {
            FilterData::Breakdown(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_heatmap(&self) -> Option<&Heatmap> {
        match self {
            FilterData::Heatmap(h) => Some(h),
            _ => None,
        }
    }

    pub fn as_customers(&self) -> Option<&CustomerBreakdown> {
        match self {
            FilterData::Customers(c) => Some(c),
            _ => None,
        }
    }

    /// Merge two breakdowns of the same shape.
    ///
    /// An empty side yields the other side unchanged; mismatched shapes keep
    /// the left-hand value.
    pub fn merge(self, other: FilterData) -> FilterData {
        match (self, other) {
            (FilterData::Empty, other) => other,
            (this, FilterData::Empty) => this,
            (FilterData::Breakdown(a), FilterData::Breakdown(b)) => {
                FilterData::Breakdown(a.merge(b))
            }
            (FilterData::Heatmap(a), FilterData::Heatmap(b)) => FilterData::Heatmap(a.merge(b)),
            (FilterData::Customers(a), FilterData::Customers(b)) => {
                FilterData::Customers(a.merge(b))
            }
            (this, other) => {
                tracing::warn!(?other, "Dropping breakdown of mismatched shape during merge");
                this
            }
        }
    }

    pub fn finalize(self, range: &DateRange) -> FilterData {
        match self {
            FilterData::Empty => FilterData::Empty,
            FilterData::Breakdown(b) => FilterData::Breakdown(b.finalize()),
            FilterData::Heatmap(h) => FilterData::Heatmap(h.finalize()),
            FilterData::Customers(c) => FilterData::Customers(c.finalize(range)),
        }
    }
}

/// Visitor and checkout figures for a product page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductPerformance {
    pub product_id: u64,
    /// Host and path of the product permalink
    pub url: Option<String>,
    pub visitors: u64,
    pub checkouts_opened: u64,
    /// Completed donations per visitor, in percent
    pub conversion_rate: Decimal,
    /// Visitor and checkout counts are estimates, not recorded counters
    pub is_estimated: bool,
}

impl ProductPerformance {
    fn merge(self, other: ProductPerformance) -> ProductPerformance {
        ProductPerformance {
            product_id: self.product_id,
            url: self.url.or(other.url),
            visitors: self.visitors + other.visitors,
            checkouts_opened: self.checkouts_opened + other.checkouts_opened,
            conversion_rate: Decimal::ZERO,
            is_estimated: self.is_estimated || other.is_estimated,
        }
    }

    /// Enforce `visitors >= checkouts_opened >= completed` and recompute the rate
    fn settle(mut self, completed: u64) -> ProductPerformance {
        if self.checkouts_opened < completed {
            tracing::debug!(
                product_id = self.product_id,
                checkouts = self.checkouts_opened,
                completed,
                "Raising checkout count to completed donations"
            );
            self.checkouts_opened = completed;
        }
        self.visitors = self.visitors.max(self.checkouts_opened);
        self.conversion_rate = percentage(Decimal::from(completed), Decimal::from(self.visitors));
        self
    }
}

/// One dimension value in a keyed breakdown
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakdownEntry {
    /// Display label
    pub label: String,
    pub count: u64,
    pub total: Decimal,
    pub chart_data: TimeSeries,
    /// Totals of one-time orders feeding the median
    #[serde(rename = "onetime_median", default, skip_serializing_if = "Vec::is_empty")]
    pub onetime_samples: Vec<Decimal>,
    /// Totals of recurring orders feeding the median
    #[serde(rename = "recurring_median", default, skip_serializing_if = "Vec::is_empty")]
    pub recurring_samples: Vec<Decimal>,
    /// Median over every sample; absent when the dimension collects none
    pub median: Option<Decimal>,
    pub average: Decimal,
    /// Share of the breakdown's grand total
    pub percentage: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub taxonomy: Option<Taxonomy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product: Option<ProductPerformance>,
}

impl BreakdownEntry {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            count: 0,
            total: Decimal::ZERO,
            chart_data: TimeSeries::new(),
            onetime_samples: Vec::new(),
            recurring_samples: Vec::new(),
            median: None,
            average: Decimal::ZERO,
            percentage: Decimal::ZERO,
            icon: None,
            code: None,
            taxonomy: None,
            item_count: None,
            product: None,
        }
    }

    /// Record `count` orders worth `amount` on `day`
    pub fn record(&mut self, day: NaiveDate, count: u64, amount: Decimal) {
        self.count += count;
        self.total += amount;
        self.chart_data.add(day, amount);
    }

    pub fn add_items(&mut self, items: u64) {
        self.item_count = Some(self.item_count.unwrap_or(0) + items);
    }

    pub fn sample_count(&self) -> usize {
        self.onetime_samples.len() + self.recurring_samples.len()
    }

    fn merge(mut self, other: BreakdownEntry) -> BreakdownEntry {
        self.count += other.count;
        self.total += other.total;
        self.chart_data = self.chart_data.merge_sum(other.chart_data);
        self.onetime_samples.extend(other.onetime_samples);
        self.recurring_samples.extend(other.recurring_samples);
        self.icon = self.icon.or(other.icon);
        self.code = self.code.or(other.code);
        self.taxonomy = self.taxonomy.or(other.taxonomy);
        self.item_count = match (self.item_count, other.item_count) {
            (None, None) => None,
            (a, b) => Some(a.unwrap_or(0) + b.unwrap_or(0)),
        };
        self.product = match (self.product, other.product) {
            (Some(a), Some(b)) => Some(a.merge(b)),
            (a, b) => a.or(b),
        };
        self
    }

    /// Keep the first `cap` samples, one-time before recurring
    fn truncate_samples(&mut self, cap: usize) {
        self.onetime_samples.truncate(cap);
        let room = cap.saturating_sub(self.onetime_samples.len());
        self.recurring_samples.truncate(room);
    }

    fn finalize(mut self, grand_total: Decimal, with_median: bool) -> BreakdownEntry {
        if with_median {
            let all: Vec<Decimal> = self
                .onetime_samples
                .iter()
                .chain(&self.recurring_samples)
                .copied()
                .collect();
            self.median = Some(median(&all));
        }
        self.average = average(self.total, self.count);
        self.percentage = percentage(self.total, grand_total);
        let completed = self.count;
        self.product = self.product.map(|p| p.settle(completed));
        self
    }
}

/// Keyed breakdown produced by the payment, country, designation, URL and
/// frequency processors
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Breakdown {
    pub entries: BTreeMap<String, BreakdownEntry>,
    /// Entries carry median samples
    #[serde(default)]
    pub with_median: bool,
    /// Entries left with a zero count or total are removed when finalizing
    #[serde(skip)]
    pub drop_empty: bool,
    /// Upper bound on median samples kept per entry, also enforced across merges
    #[serde(skip)]
    pub sample_cap: Option<usize>,
}

impl Breakdown {
    pub fn new(with_median: bool) -> Self {
        Self {
            entries: BTreeMap::new(),
            with_median,
            drop_empty: false,
            sample_cap: None,
        }
    }

    /// Entry for `key`, created with `label` on first use
    pub fn entry(
        &mut self,
        key: impl Into<String>,
        label: impl Into<String>,
    ) -> &mut BreakdownEntry {
        self.entries
            .entry(key.into())
            .or_insert_with(|| BreakdownEntry::new(label))
    }

    pub fn get(&self, key: &str) -> Option<&BreakdownEntry> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries ordered by total, largest first
    pub fn ranked(&self) -> Vec<(&str, &BreakdownEntry)> {
        let mut ranked: Vec<_> = self.entries.iter().map(|(k, v)| (k.as_str(), v)).collect();
        ranked.sort_by(|a, b| b.1.total.cmp(&a.1.total).then_with(|| a.0.cmp(b.0)));
        ranked
    }

    /// Sum of every entry total
    pub fn grand_total(&self) -> Decimal {
        self.entries.values().map(|e| e.total).sum()
    }

    pub fn merge(mut self, other: Breakdown) -> Breakdown {
        self.with_median |= other.with_median;
        self.drop_empty |= other.drop_empty;
        self.sample_cap = match (self.sample_cap, other.sample_cap) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        for (key, entry) in other.entries {
            let merged = match self.entries.remove(&key) {
                Some(existing) => existing.merge(entry),
                None => entry,
            };
            self.entries.insert(key, merged);
        }
        if let Some(cap) = self.sample_cap {
            for entry in self.entries.values_mut() {
                entry.truncate_samples(cap);
            }
        }
        self
    }

    pub fn finalize(mut self) -> Breakdown {
        if self.drop_empty {
            self.entries.retain(|_, e| e.count > 0 && !e.total.is_zero());
        }
        let grand_total = self.grand_total();
        let with_median = self.with_median;
        self.entries = std::mem::take(&mut self.entries)
            .into_iter()
            .map(|(k, e)| (k, e.finalize(grand_total, with_median)))
            .collect();
        self
    }
}

/// One weekday/hour cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeatmapCell {
    /// 0 = Monday .. 6 = Sunday
    pub day: u8,
    pub hour: u8,
    pub count: u64,
    pub amount: Decimal,
}

/// Dense 7x24 weekday/hour heatmap.
///
/// Cells sum every occurrence of the weekday/hour within the range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heatmap {
    /// `"{day}-{hour}"` to order count
    pub counts: BTreeMap<String, u64>,
    /// `"{day}-{hour}"` to amount
    pub amounts: BTreeMap<String, Decimal>,
    pub total_count: u64,
    pub total_amount: Decimal,
    pub peak: Option<HeatmapCell>,
}

impl Default for Heatmap {
    fn default() -> Self {
        Self::dense()
    }
}

impl Heatmap {
    pub const DAYS: u8 = 7;
    pub const HOURS: u8 = 24;

    /// Heatmap with every cell present and zeroed
    pub fn dense() -> Self {
        let mut counts = BTreeMap::new();
        let mut amounts = BTreeMap::new();
        for day in 0..Self::DAYS {
            for hour in 0..Self::HOURS {
                counts.insert(Self::cell_key(day, hour), 0);
                amounts.insert(Self::cell_key(day, hour), Decimal::ZERO);
            }
        }
        Self {
            counts,
            amounts,
            total_count: 0,
            total_amount: Decimal::ZERO,
            peak: None,
        }
    }

    pub fn cell_key(day: u8, hour: u8) -> String {
        format!("{day}-{hour}")
    }

    /// Add to an existing cell; returns false for coordinates off the grid
    pub fn add(&mut self, day: u8, hour: u8, count: u64, amount: Decimal) -> bool {
        if day >= Self::DAYS || hour >= Self::HOURS {
            return false;
        }
        let key = Self::cell_key(day, hour);
        *self.counts.entry(key.clone()).or_insert(0) += count;
        *self.amounts.entry(key).or_insert(Decimal::ZERO) += amount;
        self.total_count += count;
        self.total_amount += amount;
        true
    }

    pub fn cell(&self, day: u8, hour: u8) -> Option<HeatmapCell> {
        let key = Self::cell_key(day, hour);
        Some(HeatmapCell {
            day,
            hour,
            count: *self.counts.get(&key)?,
            amount: *self.amounts.get(&key)?,
        })
    }

    pub fn cell_count(&self) -> usize {
        self.counts.len()
    }

    pub fn merge(mut self, other: Heatmap) -> Heatmap {
        for (key, count) in other.counts {
            *self.counts.entry(key).or_insert(0) += count;
        }
        for (key, amount) in other.amounts {
            *self.amounts.entry(key).or_insert(Decimal::ZERO) += amount;
        }
        self.total_count += other.total_count;
        self.total_amount += other.total_amount;
        self.peak = None;
        self
    }

    /// Locate the peak cell: highest amount, then highest count, then earliest
    pub fn finalize(mut self) -> Heatmap {
        let mut peak: Option<HeatmapCell> = None;
        for day in 0..Self::DAYS {
            for hour in 0..Self::HOURS {
                let Some(cell) = self.cell(day, hour) else { continue };
                if cell.count == 0 && cell.amount.is_zero() {
                    continue;
                }
                let better = match peak {
                    None => true,
                    Some(p) => (cell.amount, cell.count) > (p.amount, p.count),
                };
                if better {
                    peak = Some(cell);
                }
            }
        }
        self.peak = peak;
        self
    }
}

/// Lifetime row of the donor table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerDetail {
    pub customer_key: String,
    pub name: String,
    pub first_order_date: NaiveDate,
    pub last_order_date: NaiveDate,
    pub order_count: u64,
    pub lifetime_value: Decimal,
}

/// In-range activity of one donor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DonorTally {
    /// First paid order across the whole store history
    pub first_order_date: NaiveDate,
    pub orders: u64,
    pub amount: Decimal,
}

impl DonorTally {
    fn merge(self, other: DonorTally) -> DonorTally {
        DonorTally {
            first_order_date: self.first_order_date.min(other.first_order_date),
            orders: self.orders + other.orders,
            amount: self.amount + other.amount,
        }
    }
}

/// New versus returning donor breakdown
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomerBreakdown {
    pub new_count: u64,
    pub returning_count: u64,
    pub new_amount: Decimal,
    pub returning_amount: Decimal,
    /// Amount of first-ever donations per day
    pub new_chart: TimeSeries,
    /// Amount of repeat donations per day
    pub returning_chart: TimeSeries,
    /// Top donors by lifetime value
    pub top_customers: Vec<CustomerDetail>,
    /// Per-donor tallies, kept so classification stays exact across chunks
    #[serde(skip)]
    pub donors: BTreeMap<String, DonorTally>,
    #[serde(skip)]
    pub limit: usize,
}

impl CustomerBreakdown {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }

    /// Sort the donor table and keep the top `limit` rows
    pub fn rank(mut self) -> Self {
        self.top_customers.sort_by(|a, b| {
            b.lifetime_value
                .cmp(&a.lifetime_value)
                .then_with(|| a.customer_key.cmp(&b.customer_key))
        });
        self.top_customers.dedup_by(|a, b| a.customer_key == b.customer_key);
        self.top_customers.truncate(self.limit);
        self
    }

    pub fn merge(mut self, other: CustomerBreakdown) -> CustomerBreakdown {
        self.limit = self.limit.max(other.limit);
        self.new_chart = self.new_chart.merge_sum(other.new_chart);
        self.returning_chart = self.returning_chart.merge_sum(other.returning_chart);
        for (key, tally) in other.donors {
            let merged = match self.donors.remove(&key) {
                Some(existing) => existing.merge(tally),
                None => tally,
            };
            self.donors.insert(key, merged);
        }
        self.top_customers.extend(other.top_customers);
        self.rank()
    }

    /// Classify every donor against the full requested range
    pub fn finalize(mut self, range: &DateRange) -> CustomerBreakdown {
        self.new_count = 0;
        self.returning_count = 0;
        self.new_amount = Decimal::ZERO;
        self.returning_amount = Decimal::ZERO;
        for tally in self.donors.values() {
            if range.contains(tally.first_order_date) {
                self.new_count += 1;
                self.new_amount += tally.amount;
            } else {
                self.returning_count += 1;
                self.returning_amount += tally.amount;
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn d(v: i64) -> Decimal {
        Decimal::from(v)
    }

    fn row(day: &str, count: u64, amount: i64) -> DailyMetricRow {
        DailyMetricRow {
            day: date(day),
            order_count: count,
            total_amount: d(amount),
        }
    }

    fn skeleton(a: &str, b: &str) -> TimeSeries {
        let range = DateRange::new(date(a), date(b)).unwrap();
        TimeSeries::skeleton(&range).unwrap()
    }

    #[test]
    fn test_builder_derives_onetime() {
        let result = AggregateResult::zeroed(skeleton("2024-01-01", "2024-01-03"))
            .with_main_metrics(&[row("2024-01-01", 3, 300), row("2024-01-03", 1, 50)])
            .with_installments(&[row("2024-01-01", 1, 100)])
            .derive_onetime();

        assert_eq!(result.total_count, 4);
        assert_eq!(result.onetime_count, 3);
        assert_eq!(result.onetime_amount, d(250));
        assert_eq!(result.onetime_chart.get(date("2024-01-01")), Some(d(200)));
        assert_eq!(result.onetime_chart.get(date("2024-01-02")), Some(Decimal::ZERO));
        assert_eq!(result.chart_data.len(), 3);
    }

    #[test]
    fn test_inconsistent_installments_are_not_clamped() {
        let result = AggregateResult::zeroed(skeleton("2024-01-01", "2024-01-01"))
            .with_main_metrics(&[row("2024-01-01", 1, 10)])
            .with_installments(&[row("2024-01-01", 2, 30)])
            .derive_onetime();
        assert_eq!(result.onetime_count, -1);
        assert_eq!(result.onetime_amount, d(-20));
    }

    #[test]
    fn test_merge_sums_scalars_and_unions_series() {
        let a = AggregateResult::zeroed(skeleton("2024-01-01", "2024-01-02"))
            .with_main_metrics(&[row("2024-01-02", 2, 20)])
            .with_new_donors(1)
            .derive_onetime();
        let b = AggregateResult::zeroed(skeleton("2024-01-03", "2024-01-04"))
            .with_main_metrics(&[row("2024-01-03", 1, 5)])
            .with_new_donors(2)
            .derive_onetime();

        let merged = a.merge(b);
        assert_eq!(merged.total_count, 3);
        assert_eq!(merged.total_amount, d(25));
        assert_eq!(merged.new_donors, 3);
        assert_eq!(merged.chart_data.len(), 4);
        assert_eq!(merged.onetime_chart.total(), d(25));
    }

    #[test]
    fn test_breakdown_merge_then_finalize() {
        let mut a = Breakdown::new(true);
        let entry = a.entry("US", "United States");
        entry.record(date("2024-01-01"), 2, d(30));
        entry.onetime_samples.extend([d(10), d(20)]);

        let mut b = Breakdown::new(true);
        let entry = b.entry("US", "United States");
        entry.record(date("2024-01-01"), 1, d(40));
        entry.recurring_samples.push(d(40));
        b.entry("CA", "Canada").record(date("2024-01-02"), 1, d(30));

        let merged = a.merge(b).finalize();
        let us = merged.get("US").unwrap();
        assert_eq!(us.count, 3);
        assert_eq!(us.total, d(70));
        assert_eq!(us.chart_data.get(date("2024-01-01")), Some(d(70)));
        assert_eq!(us.median, Some(d(20)));
        assert_eq!(us.percentage, d(70));
        assert_eq!(merged.ranked()[0].0, "US");
    }

    #[test]
    fn test_sample_cap_holds_across_merges() {
        let chunk = |first: i64| {
            let mut b = Breakdown::new(true);
            b.sample_cap = Some(3);
            let entry = b.entry("Once", "Once");
            entry.record(date("2024-01-01"), 2, d(2 * first + 1));
            entry.onetime_samples.extend([d(first), d(first + 1)]);
            b
        };

        let merged = chunk(1).merge(chunk(10)).merge(chunk(20));
        assert_eq!(merged.sample_cap, Some(3));
        let once = merged.get("Once").unwrap();
        assert_eq!(once.count, 6);
        assert_eq!(once.onetime_samples, vec![d(1), d(2), d(10)]);

        let uncapped = Breakdown::new(true).merge(chunk(5));
        assert_eq!(uncapped.sample_cap, Some(3));
    }

    #[test]
    fn test_drop_empty_entries_when_finalizing() {
        let mut b = Breakdown::new(false);
        b.drop_empty = true;
        b.entry("a", "A").record(date("2024-01-01"), 1, Decimal::ZERO);
        b.entry("b", "B").record(date("2024-01-01"), 1, d(5));
        let b = b.finalize();
        assert_eq!(b.len(), 1);
        assert!(b.get("b").unwrap().median.is_none());
    }

    #[test]
    fn test_heatmap_dense_and_peak() {
        let mut heatmap = Heatmap::dense();
        assert_eq!(heatmap.cell_count(), 168);
        assert!(heatmap.add(2, 14, 3, d(90)));
        assert!(heatmap.add(0, 9, 5, d(90)));
        assert!(!heatmap.add(7, 0, 1, d(1)));

        let heatmap = heatmap.finalize();
        let peak = heatmap.peak.unwrap();
        assert_eq!((peak.day, peak.hour), (0, 9));
        assert_eq!(heatmap.total_count, 8);
        assert_eq!(heatmap.cell_count(), 168);
    }

    #[test]
    fn test_customer_classification_uses_full_range() {
        let range = DateRange::new(date("2024-01-01"), date("2024-02-29")).unwrap();
        let mut a = CustomerBreakdown::new(10);
        a.donors.insert(
            "customer:1".to_string(),
            DonorTally {
                first_order_date: date("2024-01-10"),
                orders: 1,
                amount: d(10),
            },
        );
        let mut b = CustomerBreakdown::new(10);
        b.donors.insert(
            "customer:1".to_string(),
            DonorTally {
                first_order_date: date("2024-01-10"),
                orders: 1,
                amount: d(15),
            },
        );
        b.donors.insert(
            "customer:2".to_string(),
            DonorTally {
                first_order_date: date("2023-06-01"),
                orders: 1,
                amount: d(5),
            },
        );

        let merged = a.merge(b).finalize(&range);
        assert_eq!(merged.new_count, 1);
        assert_eq!(merged.new_amount, d(25));
        assert_eq!(merged.returning_count, 1);
        assert_eq!(merged.returning_amount, d(5));
    }

    #[test]
    fn test_product_performance_settles_invariants() {
        let mut b = Breakdown::new(false);
        let entry = b.entry("7", "Well Fund");
        entry.record(date("2024-01-01"), 10, d(500));
        entry.product = Some(ProductPerformance {
            product_id: 7,
            url: None,
            visitors: 5,
            checkouts_opened: 4,
            conversion_rate: Decimal::ZERO,
            is_estimated: false,
        });

        let b = b.finalize();
        let product = b.get("7").unwrap().product.as_ref().unwrap();
        assert_eq!(product.checkouts_opened, 10);
        assert_eq!(product.visitors, 10);
        assert_eq!(product.conversion_rate, d(100));
    }
}
