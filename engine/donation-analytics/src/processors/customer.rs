//! New versus returning donor breakdown

use crate::filters::FilterSet;
use crate::range::DateRange;
use crate::result::{CustomerBreakdown, CustomerDetail, DonorTally, FilterData};
use crate::store::{CustomerProfile, OrderStore, StoreResult};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};
use tracing::debug;

/// Customer processor with a short-lived private result cache
#[derive(Debug)]
pub struct CustomerProcessor {
    top_n: usize,
    ttl: Duration,
    cache: Mutex<HashMap<String, (Instant, CustomerBreakdown)>>,
}

impl CustomerProcessor {
    pub fn new(top_n: usize, ttl: Duration) -> Self {
        Self {
            top_n,
            ttl,
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn cache_key(range: &DateRange, filters: &FilterSet) -> String {
        format!("{}|{}", range, filters.canonical())
    }

    /// Drop every cached breakdown
    pub fn flush(&self) -> usize {
        let mut cache = self.cache.lock();
        let flushed = cache.len();
        cache.clear();
        flushed
    }

    pub fn cached_len(&self) -> usize {
        self.cache.lock().len()
    }

    pub async fn process(
        &self,
        store: &dyn OrderStore,
        range: &DateRange,
        filters: &FilterSet,
    ) -> StoreResult<FilterData> {
        let key = Self::cache_key(range, filters);
        if let Some((stored_at, cached)) = self.cache.lock().get(&key) {
            if stored_at.elapsed() < self.ttl {
                debug!(%range, "Customer breakdown served from cache");
                return Ok(FilterData::Customers(cached.clone()));
            }
        }

        let breakdown = self.compute(store, range, filters).await?;
        let mut cache = self.cache.lock();
        let before = cache.len();
        cache.retain(|_, (stored_at, _)| stored_at.elapsed() < self.ttl);
        if cache.len() < before {
            debug!(evicted = before - cache.len(), "Evicted expired customer breakdowns");
        }
        cache.insert(key, (Instant::now(), breakdown.clone()));
        Ok(FilterData::Customers(breakdown))
    }

    async fn compute(
        &self,
        store: &dyn OrderStore,
        range: &DateRange,
        filters: &FilterSet,
    ) -> StoreResult<CustomerBreakdown> {
        let orders = store.customer_orders(range, filters).await?;
        let mut keys: Vec<String> = orders.iter().map(|o| o.customer_key.clone()).collect();
        keys.sort();
        keys.dedup();

        let profiles: BTreeMap<String, CustomerProfile> = store
            .customer_profiles(&keys)
            .await?
            .into_iter()
            .map(|p| (p.customer_key.clone(), p))
            .collect();

        let mut breakdown = CustomerBreakdown::new(self.top_n);
        for order in orders {
            // a donor without a profile has no earlier history
            let first_order_date =
                profiles.get(&order.customer_key).map_or(order.day, |p| p.first_order_date);
            if order.day == first_order_date {
                breakdown.new_chart.add(order.day, order.total);
            } else {
                breakdown.returning_chart.add(order.day, order.total);
            }

            let tally = breakdown.donors.entry(order.customer_key).or_insert(DonorTally {
                first_order_date,
                orders: 0,
                amount: Default::default(),
            });
            tally.orders += 1;
            tally.amount += order.total;
        }

        breakdown.top_customers = profiles
            .into_values()
            .map(|p| CustomerDetail {
                customer_key: p.customer_key,
                name: p.name,
                first_order_date: p.first_order_date,
                last_order_date: p.last_order_date,
                order_count: p.order_count,
                lifetime_value: p.lifetime_value,
            })
            .collect();

        Ok(breakdown.rank().finalize(range))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryOrderStore, StoreFixture};
    use chrono::NaiveDate;

    fn range(from: &str, to: &str) -> DateRange {
        let parse = |s: &str| NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap();
        DateRange::new(parse(from), parse(to)).unwrap()
    }

    #[tokio::test]
    async fn test_expired_entries_evicted_on_insert() {
        let store = InMemoryOrderStore::new(StoreFixture::default());
        let filters = FilterSet::new();

        let expiring = CustomerProcessor::new(10, Duration::ZERO);
        expiring.process(&store, &range("2024-01-01", "2024-01-31"), &filters).await.unwrap();
        expiring.process(&store, &range("2024-02-01", "2024-02-29"), &filters).await.unwrap();
        expiring.process(&store, &range("2024-03-01", "2024-03-31"), &filters).await.unwrap();
        assert_eq!(expiring.cached_len(), 1);

        let lasting = CustomerProcessor::new(10, Duration::from_secs(300));
        lasting.process(&store, &range("2024-01-01", "2024-01-31"), &filters).await.unwrap();
        lasting.process(&store, &range("2024-02-01", "2024-02-29"), &filters).await.unwrap();
        assert_eq!(lasting.cached_len(), 2);
        assert_eq!(lasting.flush(), 2);
        assert_eq!(lasting.cached_len(), 0);
    }
}
