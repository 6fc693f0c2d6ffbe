//! Donation frequency breakdown

use crate::config::{Capabilities, ProcessorConfig};
use crate::filters::FilterSet;
use crate::range::DateRange;
use crate::result::{Breakdown, FilterData};
use crate::store::{OrderStore, StoreResult};
use std::collections::HashSet;
use tracing::debug;

/// Label of orders without a recurring relationship
pub const ONE_TIME_LABEL: &str = "Once";

/// Human label for a billing period and interval
pub fn cadence_label(period: &str, interval: u32) -> String {
    let period = period.trim().to_ascii_lowercase();
    let label = match (period.as_str(), interval) {
        ("day", 1) => "Daily",
        ("week", 1) => "Weekly",
        ("month", 1) => "Monthly",
        ("month", 2) => "Bimonthly",
        ("month", 3) => "Quarterly",
        ("month", 6) => "Semi-annually",
        ("year", 1) => "Annually",
        _ => return format!("Every {interval} {period}s"),
    };
    label.to_string()
}

fn label_for(period: Option<&str>, interval: Option<u32>, recurring_enabled: bool) -> String {
    match period {
        Some(period) if recurring_enabled => cadence_label(period, interval.unwrap_or(1)),
        _ => ONE_TIME_LABEL.to_string(),
    }
}

#[derive(Debug, Clone)]
pub struct FrequencyProcessor {
    batch_threshold_days: i64,
    sample_cap: usize,
    capabilities: Capabilities,
}

impl FrequencyProcessor {
    pub fn new(config: &ProcessorConfig, capabilities: Capabilities) -> Self {
        Self {
            batch_threshold_days: config.frequency_batch_threshold_days,
            sample_cap: config.frequency_sample_cap,
            capabilities,
        }
    }

    pub async fn process(
        &self,
        store: &dyn OrderStore,
        range: &DateRange,
        filters: &FilterSet,
    ) -> StoreResult<FilterData> {
        let breakdown = if range.day_count() > self.batch_threshold_days {
            self.process_batched(store, range, filters).await?
        } else {
            self.process_orders(store, range, filters).await?
        };
        Ok(FilterData::Breakdown(breakdown))
    }

    /// Per-order classification for short ranges
    async fn process_orders(
        &self,
        store: &dyn OrderStore,
        range: &DateRange,
        filters: &FilterSet,
    ) -> StoreResult<Breakdown> {
        let rows = store.order_rows(range, filters).await?;
        let mut breakdown = Breakdown::new(true);
        let mut seen = HashSet::with_capacity(rows.len());

        for row in rows {
            // parent and renewal links of the same order are enumerated separately
            if !seen.insert(row.order_id) {
                continue;
            }
            let link = row.subscription.as_ref();
            let label = label_for(
                link.map(|l| l.billing_period.as_str()),
                link.map(|l| l.billing_interval),
                self.capabilities.recurring_enabled,
            );
            let recurring = label != ONE_TIME_LABEL;
            let entry = breakdown.entry(label.clone(), label);
            entry.record(row.day, 1, row.total);
            if recurring {
                entry.recurring_samples.push(row.total);
            } else {
                entry.onetime_samples.push(row.total);
            }
        }

        Ok(breakdown)
    }

    /// Store-aggregated buckets for long ranges, with capped median samples
    async fn process_batched(
        &self,
        store: &dyn OrderStore,
        range: &DateRange,
        filters: &FilterSet,
    ) -> StoreResult<Breakdown> {
        let rows = store.frequency_batches(range, filters).await?;
        debug!(rows = rows.len(), %range, "Aggregating frequencies from batches");
        let mut breakdown = Breakdown::new(true);
        breakdown.sample_cap = Some(self.sample_cap);

        for row in rows {
            let label = label_for(
                row.billing_period.as_deref(),
                row.billing_interval,
                self.capabilities.recurring_enabled,
            );
            let recurring = label != ONE_TIME_LABEL;
            let entry = breakdown.entry(label.clone(), label);
            entry.record(row.day, row.order_count, row.total_amount);

            let room = self.sample_cap.saturating_sub(entry.sample_count());
            let samples = row.samples.into_iter().take(room);
            if recurring {
                entry.recurring_samples.extend(samples);
            } else {
                entry.onetime_samples.extend(samples);
            }
        }

        Ok(breakdown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cadence_labels() {
        assert_eq!(cadence_label("month", 1), "Monthly");
        assert_eq!(cadence_label("Month", 3), "Quarterly");
        assert_eq!(cadence_label("month", 6), "Semi-annually");
        assert_eq!(cadence_label("month", 2), "Bimonthly");
        assert_eq!(cadence_label("year", 1), "Annually");
        assert_eq!(cadence_label("week", 2), "Every 2 weeks");
        assert_eq!(cadence_label("day", 10), "Every 10 days");
    }

    #[test]
    fn test_recurring_disabled_labels_everything_once() {
        assert_eq!(label_for(Some("month"), Some(1), false), ONE_TIME_LABEL);
        assert_eq!(label_for(None, None, true), ONE_TIME_LABEL);
        assert_eq!(label_for(Some("week"), Some(1), true), "Weekly");
    }
}
