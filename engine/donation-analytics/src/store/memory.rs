//! In-memory order store backed by a JSON fixture

use super::{
    AmountSample, CountryRow, CustomerOrderRow, CustomerProfile, DailyMetricRow, DaytimeRow,
    DesignationRow, FrequencyBatchRow, OrderRow, OrderStore, PaymentRow, ProductRow, StoreResult,
    SubscriptionLink, SubscriptionRole, Taxonomy, TrafficCounters,
};
use crate::error::DataError;
use crate::filters::{FilterKey, FilterSet};
use crate::processors::frequency::{cadence_label, ONE_TIME_LABEL};
use crate::range::DateRange;
use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

/// Order lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrderStatus {
    Pending,
    Processing,
    OnHold,
    Completed,
    Cancelled,
    Refunded,
    Failed,
}

impl OrderStatus {
    /// Statuses that count as received donations
    pub fn is_paid(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Processing)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: u64,
    #[serde(default = "default_quantity")]
    pub quantity: u64,
    pub total: Decimal,
}

fn default_quantity() -> u64 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: u64,
    #[serde(default)]
    pub customer_id: Option<u64>,
    #[serde(default)]
    pub billing_email: Option<String>,
    /// Creation time in the store timezone
    pub created_at: NaiveDateTime,
    pub status: OrderStatus,
    pub total: Decimal,
    #[serde(default)]
    pub payment_method: String,
    #[serde(default)]
    pub payment_method_title: String,
    #[serde(default)]
    pub billing_country: Option<String>,
    /// Attributed traffic source
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub items: Vec<LineItem>,
}

impl Order {
    fn day(&self) -> NaiveDate {
        self.created_at.date()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub permalink: Option<String>,
    #[serde(default)]
    pub category_ids: Vec<u64>,
    #[serde(default)]
    pub tag_ids: Vec<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Term {
    pub id: u64,
    pub name: String,
    pub taxonomy: Taxonomy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: u64,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: u64,
    pub parent_order_id: u64,
    #[serde(default)]
    pub renewal_order_ids: Vec<u64>,
    pub billing_period: String,
    pub billing_interval: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductTraffic {
    pub product_id: u64,
    pub day: NaiveDate,
    pub visitors: u64,
    pub checkouts_opened: u64,
}

/// Complete store contents
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreFixture {
    pub orders: Vec<Order>,
    pub products: Vec<Product>,
    pub terms: Vec<Term>,
    pub customers: Vec<Customer>,
    pub subscriptions: Vec<Subscription>,
    pub traffic: Vec<ProductTraffic>,
    pub default_category_id: Option<u64>,
}

/// Order store holding every record in memory
#[derive(Debug)]
pub struct InMemoryOrderStore {
    fixture: StoreFixture,
    products: HashMap<u64, Product>,
    terms: HashMap<u64, Term>,
    customers: HashMap<u64, Customer>,
    links: HashMap<u64, Vec<SubscriptionLink>>,
    calls: AtomicU64,
    failing: Mutex<HashSet<&'static str>>,
}

impl InMemoryOrderStore {
    /// Create a new store from fixture data
    pub fn new(fixture: StoreFixture) -> Self {
        let products = fixture.products.iter().map(|p| (p.id, p.clone())).collect();
        let terms = fixture.terms.iter().map(|t| (t.id, t.clone())).collect();
        let customers = fixture
            .customers
            .iter()
            .map(|c| (c.id, c.clone()))
            .collect();

        let mut links: HashMap<u64, Vec<SubscriptionLink>> = HashMap::new();
        for sub in &fixture.subscriptions {
            let link = |role| SubscriptionLink {
                subscription_id: sub.id,
                role,
                billing_period: sub.billing_period.clone(),
                billing_interval: sub.billing_interval,
            };
            links
                .entry(sub.parent_order_id)
                .or_default()
                .push(link(SubscriptionRole::Parent));
            for renewal in &sub.renewal_order_ids {
                links
                    .entry(*renewal)
                    .or_default()
                    .push(link(SubscriptionRole::Renewal));
            }
        }

        Self {
            fixture,
            products,
            terms,
            customers,
            links,
            calls: AtomicU64::new(0),
            failing: Mutex::new(HashSet::new()),
        }
    }

    /// Load a store from a JSON fixture file
    pub fn from_json_file(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| DataError::unavailable(format!("{}: {}", path.display(), e)))?;
        let fixture: StoreFixture = serde_json::from_str(&content)
            .map_err(|e| DataError::unavailable(format!("{}: {}", path.display(), e)))?;
        tracing::info!(
            orders = fixture.orders.len(),
            products = fixture.products.len(),
            "Loaded order store fixture from {}",
            path.display()
        );
        Ok(Self::new(fixture))
    }

    /// Number of queries served so far
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    /// Make every subsequent call of `query` fail
    pub fn fail_on(&self, query: &'static str) {
        self.failing.lock().insert(query);
    }

    /// Stop failing `query`
    pub fn recover(&self, query: &'static str) {
        self.failing.lock().remove(query);
    }

    fn enter(&self, query: &'static str) -> StoreResult<()> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if self.failing.lock().contains(query) {
            return Err(DataError::query(query, "injected failure"));
        }
        Ok(())
    }

    /// Look up a fixture order by id
    pub fn find_order(&self, id: u64) -> Option<&Order> {
        self.fixture.orders.iter().find(|o| o.id == id)
    }

    fn is_recurring(&self, order_id: u64) -> bool {
        self.links.contains_key(&order_id)
    }

    /// Recurrence label of an order ("Once" without a subscription link)
    fn frequency_label(&self, order_id: u64) -> String {
        match self.links.get(&order_id).and_then(|links| links.first()) {
            Some(link) => cadence_label(&link.billing_period, link.billing_interval),
            None => ONE_TIME_LABEL.to_string(),
        }
    }

    /// Categories of a product, falling back to the default category
    fn categories_of(&self, product: &Product) -> Vec<u64> {
        if product.category_ids.is_empty() {
            self.fixture.default_category_id.into_iter().collect()
        } else {
            product.category_ids.clone()
        }
    }

    fn product_has_designation(&self, product: &Product, designation: &str) -> bool {
        self.categories_of(product)
            .into_iter()
            .chain(product.tag_ids.iter().copied())
            .filter_map(|id| self.terms.get(&id))
            .any(|term| term.name.eq_ignore_ascii_case(designation))
    }

    /// Whether a single line item satisfies the item-level filters
    fn item_matches(&self, item: &LineItem, filters: &FilterSet) -> bool {
        if let Some(campaign) = filters.get(FilterKey::Campaign) {
            if item.product_id.to_string() != campaign {
                return false;
            }
        }
        if let Some(designation) = filters.get(FilterKey::Designation) {
            match self.products.get(&item.product_id) {
                Some(product) if self.product_has_designation(product, designation) => {}
                _ => return false,
            }
        }
        true
    }

    fn order_matches(&self, order: &Order, filters: &FilterSet) -> bool {
        if let Some(source) = filters.get(FilterKey::Source) {
            let matches = order.source.as_deref().is_some_and(|s| s.eq_ignore_ascii_case(source));
            if !matches {
                return false;
            }
        }
        if let Some(frequency) = filters.get(FilterKey::Frequency) {
            if !self.frequency_label(order.id).eq_ignore_ascii_case(frequency) {
                return false;
            }
        }
        true
    }

    /// Distinct paid orders in `range` matching `filters`.
    ///
    /// Item-level filters join orders against their line items, which yields
    /// one row per matching item; the distinct id set collapses that fan-out.
    fn resolve_order_ids(&self, range: &DateRange, filters: &FilterSet) -> BTreeSet<u64> {
        let needs_item_join = filters.get(FilterKey::Campaign).is_some()
            || filters.get(FilterKey::Designation).is_some();

        let candidates = self
            .fixture
            .orders
            .iter()
            .filter(|o| o.status.is_paid() && range.contains(o.day()))
            .filter(|o| self.order_matches(o, filters));

        if needs_item_join {
            let joined: Vec<u64> = candidates
                .flat_map(|o| {
                    o.items
                        .iter()
                        .filter(|item| self.item_matches(item, filters))
                        .map(|_| o.id)
                })
                .collect();
            joined.into_iter().collect()
        } else {
            candidates.map(|o| o.id).collect()
        }
    }

    fn matching_orders(&self, range: &DateRange, filters: &FilterSet) -> Vec<&Order> {
        let ids = self.resolve_order_ids(range, filters);
        self.fixture
            .orders
            .iter()
            .filter(|o| ids.contains(&o.id))
            .collect()
    }

    fn daily_rows<'a>(orders: impl Iterator<Item = &'a Order>) -> Vec<DailyMetricRow> {
        let mut by_day: BTreeMap<NaiveDate, (u64, Decimal)> = BTreeMap::new();
        for order in orders {
            let entry = by_day.entry(order.day()).or_insert((0, Decimal::ZERO));
            entry.0 += 1;
            entry.1 += order.total;
        }
        by_day
            .into_iter()
            .map(|(day, (order_count, total_amount))| DailyMetricRow {
                day,
                order_count,
                total_amount,
            })
            .collect()
    }

    fn customer_key(order: &Order) -> Option<String> {
        match (order.customer_id, order.billing_email.as_deref()) {
            (Some(id), _) if id > 0 => Some(format!("customer:{id}")),
            (_, Some(email)) if !email.trim().is_empty() => {
                Some(format!("guest:{}", email.trim().to_ascii_lowercase()))
            }
            _ => None,
        }
    }

    fn customer_name(&self, order: &Order) -> String {
        let registered = order
            .customer_id
            .and_then(|id| self.customers.get(&id))
            .map(|c| {
                format!("{} {}", c.first_name, c.last_name)
                    .trim()
                    .to_string()
            })
            .filter(|name| !name.is_empty());
        registered
            .or_else(|| order.billing_email.clone())
            .unwrap_or_else(|| "Guest".to_string())
    }

    /// First paid order date of every identified donor, across all history
    fn first_order_dates(&self) -> HashMap<String, NaiveDate> {
        let mut first: HashMap<String, NaiveDate> = HashMap::new();
        for order in self.fixture.orders.iter().filter(|o| o.status.is_paid()) {
            if let Some(key) = Self::customer_key(order) {
                let day = order.day();
                first
                    .entry(key)
                    .and_modify(|d| *d = (*d).min(day))
                    .or_insert(day);
            }
        }
        first
    }

    fn samples<'a>(
        &self,
        orders: impl Iterator<Item = &'a Order>,
    ) -> Vec<AmountSample> {
        orders
            .map(|o| AmountSample {
                amount: o.total,
                recurring: self.is_recurring(o.id),
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn main_metrics(
        &self,
        range: &DateRange,
        filters: &FilterSet,
    ) -> StoreResult<Vec<DailyMetricRow>> {
        self.enter("main_metrics")?;
        Ok(Self::daily_rows(self.matching_orders(range, filters).into_iter()))
    }

    async fn subscription_metrics(
        &self,
        range: &DateRange,
        filters: &FilterSet,
    ) -> StoreResult<Vec<DailyMetricRow>> {
        self.enter("subscription_metrics")?;
        let orders = self.matching_orders(range, filters);
        Ok(Self::daily_rows(orders.into_iter().filter(|o| self.is_recurring(o.id))))
    }

    async fn new_donor_count(&self, range: &DateRange, filters: &FilterSet) -> StoreResult<u64> {
        self.enter("new_donor_count")?;
        let first = self.first_order_dates();
        let donors: HashSet<String> = self
            .matching_orders(range, filters)
            .into_iter()
            .filter_map(Self::customer_key)
            .filter(|key| first.get(key).is_some_and(|day| range.contains(*day)))
            .collect();
        Ok(donors.len() as u64)
    }

    async fn payment_rows(
        &self,
        range: &DateRange,
        filters: &FilterSet,
    ) -> StoreResult<Vec<PaymentRow>> {
        self.enter("payment_rows")?;
        let mut grouped: BTreeMap<(String, String, NaiveDate), (u64, Decimal)> = BTreeMap::new();
        for order in self.matching_orders(range, filters) {
            let key =
                (order.payment_method.clone(), order.payment_method_title.clone(), order.day());
            let entry = grouped.entry(key).or_insert((0, Decimal::ZERO));
            entry.0 += 1;
            entry.1 += order.total;
        }
        Ok(grouped
            .into_iter()
            .map(|((gateway, gateway_title, day), (order_count, total_amount))| PaymentRow {
                gateway,
                gateway_title,
                day,
                order_count,
                total_amount,
            })
            .collect())
    }

    async fn payment_samples(
        &self,
        range: &DateRange,
        filters: &FilterSet,
        gateway: &str,
        gateway_title: &str,
    ) -> StoreResult<Vec<AmountSample>> {
        self.enter("payment_samples")?;
        let orders = self.matching_orders(range, filters);
        Ok(self.samples(orders.into_iter().filter(|o| {
            o.payment_method == gateway && o.payment_method_title == gateway_title
        })))
    }

    async fn country_rows(
        &self,
        range: &DateRange,
        filters: &FilterSet,
    ) -> StoreResult<Vec<CountryRow>> {
        self.enter("country_rows")?;
        let mut grouped: BTreeMap<(String, NaiveDate), (u64, Decimal)> = BTreeMap::new();
        for order in self.matching_orders(range, filters) {
            let code = order.billing_country.clone().unwrap_or_default();
            let entry = grouped.entry((code, order.day())).or_insert((0, Decimal::ZERO));
            entry.0 += 1;
            entry.1 += order.total;
        }
        Ok(grouped
            .into_iter()
            .map(|((country_code, day), (order_count, total_amount))| CountryRow {
                country_code,
                day,
                order_count,
                total_amount,
            })
            .collect())
    }

    async fn country_samples(
        &self,
        range: &DateRange,
        filters: &FilterSet,
        country_code: &str,
    ) -> StoreResult<Vec<AmountSample>> {
        self.enter("country_samples")?;
        let orders = self.matching_orders(range, filters);
        Ok(self.samples(
            orders
                .into_iter()
                .filter(|o| o.billing_country.as_deref().unwrap_or_default() == country_code),
        ))
    }

    async fn daytime_rows(
        &self,
        range: &DateRange,
        filters: &FilterSet,
    ) -> StoreResult<Vec<DaytimeRow>> {
        self.enter("daytime_rows")?;
        let mut grouped: BTreeMap<(i32, i32), (u64, Decimal)> = BTreeMap::new();
        for order in self.matching_orders(range, filters) {
            let dow = order.created_at.weekday().number_from_sunday() as i32;
            let hour = order.created_at.hour() as i32;
            let entry = grouped.entry((dow, hour)).or_insert((0, Decimal::ZERO));
            entry.0 += 1;
            entry.1 += order.total;
        }
        Ok(grouped
            .into_iter()
            .map(|((day_of_week, hour), (order_count, total_amount))| DaytimeRow {
                day_of_week,
                hour,
                order_count,
                total_amount,
            })
            .collect())
    }

    async fn designation_rows(
        &self,
        range: &DateRange,
        filters: &FilterSet,
    ) -> StoreResult<Vec<DesignationRow>> {
        self.enter("designation_rows")?;
        let mut grouped: BTreeMap<(u64, NaiveDate), (u64, Decimal)> = BTreeMap::new();
        for order in self.matching_orders(range, filters) {
            for item in &order.items {
                let Some(product) = self.products.get(&item.product_id) else {
                    continue;
                };
                let term_ids = self
                    .categories_of(product)
                    .into_iter()
                    .chain(product.tag_ids.clone());
                for term_id in term_ids {
                    let entry = grouped
                        .entry((term_id, order.day()))
                        .or_insert((0, Decimal::ZERO));
                    entry.0 += item.quantity;
                    entry.1 += item.total;
                }
            }
        }
        Ok(grouped
            .into_iter()
            .filter_map(|((term_id, day), (item_count, total_amount))| {
                let term = self.terms.get(&term_id)?;
                Some(DesignationRow {
                    term_id,
                    name: term.name.clone(),
                    taxonomy: term.taxonomy,
                    day,
                    item_count,
                    total_amount,
                })
            })
            .collect())
    }

    fn default_designation_id(&self) -> Option<u64> {
        self.fixture.default_category_id
    }

    async fn product_rows(
        &self,
        range: &DateRange,
        filters: &FilterSet,
    ) -> StoreResult<Vec<ProductRow>> {
        self.enter("product_rows")?;
        let mut grouped: BTreeMap<(u64, NaiveDate), (BTreeSet<u64>, u64, Decimal)> =
            BTreeMap::new();
        for order in self.matching_orders(range, filters) {
            for item in &order.items {
                let entry = grouped
                    .entry((item.product_id, order.day()))
                    .or_insert((BTreeSet::new(), 0, Decimal::ZERO));
                entry.0.insert(order.id);
                entry.1 += item.quantity;
                entry.2 += item.total;
            }
        }
        Ok(grouped
            .into_iter()
            .map(|((product_id, day), (orders, item_count, total_amount))| {
                let product = self.products.get(&product_id);
                ProductRow {
                    product_id,
                    name: product
                        .map(|p| p.name.clone())
                        .unwrap_or_else(|| format!("Product #{product_id}")),
                    permalink: product.and_then(|p| p.permalink.clone()),
                    day,
                    order_count: orders.len() as u64,
                    item_count,
                    total_amount,
                }
            })
            .collect())
    }

    async fn product_traffic(
        &self,
        range: &DateRange,
        product_id: u64,
    ) -> StoreResult<Option<TrafficCounters>> {
        self.enter("product_traffic")?;
        let mut counters: Option<TrafficCounters> = None;
        for entry in self
            .fixture
            .traffic
            .iter()
            .filter(|t| t.product_id == product_id && range.contains(t.day))
        {
            let c = counters.get_or_insert_with(TrafficCounters::default);
            c.visitors += entry.visitors;
            c.checkouts_opened += entry.checkouts_opened;
        }
        Ok(counters)
    }

    async fn order_rows(
        &self,
        range: &DateRange,
        filters: &FilterSet,
    ) -> StoreResult<Vec<OrderRow>> {
        self.enter("order_rows")?;
        let mut rows = Vec::new();
        for order in self.matching_orders(range, filters) {
            match self.links.get(&order.id) {
                Some(links) => rows.extend(links.iter().map(|link| OrderRow {
                    order_id: order.id,
                    day: order.day(),
                    total: order.total,
                    subscription: Some(link.clone()),
                })),
                None => rows.push(OrderRow {
                    order_id: order.id,
                    day: order.day(),
                    total: order.total,
                    subscription: None,
                }),
            }
        }
        Ok(rows)
    }

    async fn frequency_batches(
        &self,
        range: &DateRange,
        filters: &FilterSet,
    ) -> StoreResult<Vec<FrequencyBatchRow>> {
        self.enter("frequency_batches")?;
        type BucketKey = (Option<String>, Option<u32>, NaiveDate);
        let mut grouped: BTreeMap<BucketKey, (u64, Decimal, Vec<Decimal>)> = BTreeMap::new();
        for order in self.matching_orders(range, filters) {
            let link = self.links.get(&order.id).and_then(|links| links.first());
            let key = (
                link.map(|l| l.billing_period.clone()),
                link.map(|l| l.billing_interval),
                order.day(),
            );
            let entry = grouped.entry(key).or_insert((0, Decimal::ZERO, Vec::new()));
            entry.0 += 1;
            entry.1 += order.total;
            entry.2.push(order.total);
        }
        Ok(grouped
            .into_iter()
            .map(|((billing_period, billing_interval, day), (order_count, total_amount, samples))| {
                FrequencyBatchRow {
                    billing_period,
                    billing_interval,
                    day,
                    order_count,
                    total_amount,
                    samples,
                }
            })
            .collect())
    }

    async fn customer_orders(
        &self,
        range: &DateRange,
        filters: &FilterSet,
    ) -> StoreResult<Vec<CustomerOrderRow>> {
        self.enter("customer_orders")?;
        Ok(self
            .matching_orders(range, filters)
            .into_iter()
            .filter_map(|order| {
                Some(CustomerOrderRow {
                    order_id: order.id,
                    customer_key: Self::customer_key(order)?,
                    day: order.day(),
                    total: order.total,
                })
            })
            .collect())
    }

    async fn customer_profiles(
        &self,
        customer_keys: &[String],
    ) -> StoreResult<Vec<CustomerProfile>> {
        self.enter("customer_profiles")?;
        let wanted: HashSet<&str> = customer_keys.iter().map(String::as_str).collect();
        let mut profiles: BTreeMap<String, CustomerProfile> = BTreeMap::new();

        for order in self.fixture.orders.iter().filter(|o| o.status.is_paid()) {
            let Some(key) = Self::customer_key(order).filter(|k| wanted.contains(k.as_str())) else {
                continue;
            };
            let day = order.day();
            let profile = profiles.entry(key.clone()).or_insert_with(|| CustomerProfile {
                customer_key: key,
                name: self.customer_name(order),
                first_order_date: day,
                last_order_date: day,
                order_count: 0,
                lifetime_value: Decimal::ZERO,
            });
            profile.first_order_date = profile.first_order_date.min(day);
            profile.last_order_date = profile.last_order_date.max(day);
            profile.order_count += 1;
            profile.lifetime_value += order.total;
        }

        Ok(profiles.into_values().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(day: &str, hour: u32) -> NaiveDateTime {
        NaiveDate::parse_from_str(day, "%Y-%m-%d")
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn order(id: u64, customer_id: Option<u64>, email: &str, day: &str, total: i64) -> Order {
        Order {
            id,
            customer_id,
            billing_email: Some(email.to_string()),
            created_at: at(day, 12),
            status: OrderStatus::Completed,
            total: Decimal::from(total),
            payment_method: "stripe".to_string(),
            payment_method_title: "Card".to_string(),
            billing_country: Some("US".to_string()),
            source: None,
            items: vec![
                LineItem {
                    product_id: 1,
                    quantity: 1,
                    total: Decimal::from(total),
                },
                LineItem {
                    product_id: 1,
                    quantity: 1,
                    total: Decimal::ZERO,
                },
            ],
        }
    }

    fn fixture() -> StoreFixture {
        let mut refunded = order(3, Some(7), "c@example.org", "2024-03-02", 500);
        refunded.status = OrderStatus::Refunded;
        StoreFixture {
            orders: vec![
                order(1, Some(7), "a@example.org", "2024-03-01", 40),
                order(2, None, "Guest@Example.org", "2024-03-02", 60),
                refunded,
            ],
            products: vec![Product {
                id: 1,
                name: "Water Well Appeal".to_string(),
                permalink: None,
                category_ids: vec![],
                tag_ids: vec![],
            }],
            terms: vec![Term {
                id: 15,
                name: "Water Wells".to_string(),
                taxonomy: Taxonomy::Category,
            }],
            default_category_id: Some(15),
            ..StoreFixture::default()
        }
    }

    fn range() -> DateRange {
        let from = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let to = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();
        DateRange::new(from, to).unwrap()
    }

    #[tokio::test]
    async fn test_item_join_does_not_multiply_orders() {
        let store = InMemoryOrderStore::new(fixture());
        let filters = FilterSet::new().with(FilterKey::Designation, "water wells");

        let rows = store.main_metrics(&range(), &filters).await.unwrap();
        let orders: u64 = rows.iter().map(|r| r.order_count).sum();
        let amount: Decimal = rows.iter().map(|r| r.total_amount).sum();
        assert_eq!(orders, 2);
        assert_eq!(amount, Decimal::from(100));
    }

    #[tokio::test]
    async fn test_unpaid_orders_are_ignored() {
        let store = InMemoryOrderStore::new(fixture());
        assert_eq!(store.find_order(3).map(|o| o.status), Some(OrderStatus::Refunded));

        let rows = store.country_rows(&range(), &FilterSet::new()).await.unwrap();
        assert_eq!(rows.iter().map(|r| r.order_count).sum::<u64>(), 2);
    }

    #[tokio::test]
    async fn test_guest_donors_keyed_by_email() {
        let store = InMemoryOrderStore::new(fixture());
        let rows = store.customer_orders(&range(), &FilterSet::new()).await.unwrap();
        let keys: Vec<_> = rows.iter().map(|r| r.customer_key.as_str()).collect();
        assert_eq!(keys, vec!["customer:7", "guest:guest@example.org"]);

        let profiles = store
            .customer_profiles(&["guest:guest@example.org".to_string()])
            .await
            .unwrap();
        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles[0].name, "Guest@Example.org");
    }

    #[tokio::test]
    async fn test_injected_failure_and_call_count() {
        let store = InMemoryOrderStore::new(fixture());
        store.fail_on("payment_rows");

        let err = store.payment_rows(&range(), &FilterSet::new()).await.unwrap_err();
        assert!(matches!(err, DataError::Query { query: "payment_rows", .. }));
        assert!(store.daytime_rows(&range(), &FilterSet::new()).await.is_ok());
        assert_eq!(store.call_count(), 2);

        store.recover("payment_rows");
        assert!(store.payment_rows(&range(), &FilterSet::new()).await.is_ok());
    }

    #[test]
    fn test_fixture_loads_from_json() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("store.json");
        let json = serde_json::to_string(&fixture()).unwrap();
        std::fs::write(&path, json).unwrap();

        let store = InMemoryOrderStore::from_json_file(&path).unwrap();
        assert!(store.find_order(2).is_some());
        let missing = temp_dir.path().join("missing.json");
        assert!(InMemoryOrderStore::from_json_file(missing).is_err());
    }
}
