//! # Order Store
//!
//! Read-only query contract the engine consumes from the order-management
//! datastore. Every query takes the resolved date range and the active
//! filters; implementations must resolve a distinct order set under the
//! filters before aggregating so that line-item and taxonomy joins never
//! multiply order counts.

pub mod memory;

use crate::error::DataError;
use crate::filters::FilterSet;
use crate::range::DateRange;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub use memory::{InMemoryOrderStore, StoreFixture};

/// Result type alias for store queries
pub type StoreResult<T> = std::result::Result<T, DataError>;

/// Orders and revenue for one day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyMetricRow {
    pub day: NaiveDate,
    pub order_count: u64,
    pub total_amount: Decimal,
}

/// Orders per payment gateway per day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRow {
    /// Raw gateway identifier, e.g. `stripe_cc`
    pub gateway: String,
    /// Human title configured for the gateway
    pub gateway_title: String,
    pub day: NaiveDate,
    pub order_count: u64,
    pub total_amount: Decimal,
}

/// One order total feeding a median
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmountSample {
    pub amount: Decimal,
    /// Order belongs to a recurring donation
    pub recurring: bool,
}

/// Orders per billing country per day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountryRow {
    /// ISO 3166-1 alpha-2 code; may be empty when unknown
    pub country_code: String,
    pub day: NaiveDate,
    pub order_count: u64,
    pub total_amount: Decimal,
}

/// Orders per weekday and hour
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaytimeRow {
    /// Store numbering: 1 = Sunday .. 7 = Saturday
    pub day_of_week: i32,
    pub hour: i32,
    pub order_count: u64,
    pub total_amount: Decimal,
}

/// Taxonomy a designation term belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Taxonomy {
    Category,
    Tag,
}

/// Line items per category or tag per day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesignationRow {
    pub term_id: u64,
    pub name: String,
    pub taxonomy: Taxonomy,
    pub day: NaiveDate,
    pub item_count: u64,
    pub total_amount: Decimal,
}

/// Line items per product per day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRow {
    pub product_id: u64,
    pub name: String,
    /// Canonical product URL, when the product is published
    pub permalink: Option<String>,
    pub day: NaiveDate,
    /// Distinct orders containing the product
    pub order_count: u64,
    pub item_count: u64,
    pub total_amount: Decimal,
}

/// Visitor counters recorded for a product page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TrafficCounters {
    pub visitors: u64,
    pub checkouts_opened: u64,
}

/// How an order is linked to a recurring donation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionRole {
    Parent,
    Renewal,
}

/// Recurring relationship of an order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionLink {
    pub subscription_id: u64,
    pub role: SubscriptionRole,
    /// `day`, `week`, `month` or `year`
    pub billing_period: String,
    pub billing_interval: u32,
}

/// One order as enumerated for frequency classification.
///
/// An order linked to a recurring donation both as parent and as renewal
/// may be enumerated once per relationship.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRow {
    pub order_id: u64,
    pub day: NaiveDate,
    pub total: Decimal,
    pub subscription: Option<SubscriptionLink>,
}

/// Pre-aggregated frequency bucket for long ranges
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrequencyBatchRow {
    /// `None` for one-time orders
    pub billing_period: Option<String>,
    pub billing_interval: Option<u32>,
    pub day: NaiveDate,
    pub order_count: u64,
    pub total_amount: Decimal,
    /// Order totals in the bucket, in store order
    pub samples: Vec<Decimal>,
}

/// One order attributed to an identified donor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerOrderRow {
    pub order_id: u64,
    pub customer_key: String,
    pub day: NaiveDate,
    pub total: Decimal,
}

/// Lifetime profile of a donor, independent of the requested range
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerProfile {
    pub customer_key: String,
    pub name: String,
    pub first_order_date: NaiveDate,
    pub last_order_date: NaiveDate,
    pub order_count: u64,
    pub lifetime_value: Decimal,
}

/// Read-only queries over orders, line items and customers
#[async_trait::async_trait]
pub trait OrderStore: Send + Sync {
    /// Orders and revenue per day, counted over distinct orders
    async fn main_metrics(
        &self,
        range: &DateRange,
        filters: &FilterSet,
    ) -> StoreResult<Vec<DailyMetricRow>>;

    /// Same as [`OrderStore::main_metrics`], restricted to recurring orders
    async fn subscription_metrics(
        &self,
        range: &DateRange,
        filters: &FilterSet,
    ) -> StoreResult<Vec<DailyMetricRow>>;

    /// Distinct donors whose first order ever falls inside `range`
    async fn new_donor_count(&self, range: &DateRange, filters: &FilterSet) -> StoreResult<u64>;

    async fn payment_rows(
        &self,
        range: &DateRange,
        filters: &FilterSet,
    ) -> StoreResult<Vec<PaymentRow>>;

    /// Order totals paid through `gateway` under the title `gateway_title`
    async fn payment_samples(
        &self,
        range: &DateRange,
        filters: &FilterSet,
        gateway: &str,
        gateway_title: &str,
    ) -> StoreResult<Vec<AmountSample>>;

    async fn country_rows(
        &self,
        range: &DateRange,
        filters: &FilterSet,
    ) -> StoreResult<Vec<CountryRow>>;

    /// Order totals billed to `country_code`
    async fn country_samples(
        &self,
        range: &DateRange,
        filters: &FilterSet,
        country_code: &str,
    ) -> StoreResult<Vec<AmountSample>>;

    async fn daytime_rows(
        &self,
        range: &DateRange,
        filters: &FilterSet,
    ) -> StoreResult<Vec<DaytimeRow>>;

    async fn designation_rows(
        &self,
        range: &DateRange,
        filters: &FilterSet,
    ) -> StoreResult<Vec<DesignationRow>>;

    /// Identifier of the catch-all category assigned to unclassified products
    fn default_designation_id(&self) -> Option<u64>;

    async fn product_rows(
        &self,
        range: &DateRange,
        filters: &FilterSet,
    ) -> StoreResult<Vec<ProductRow>>;

    /// Visitor counters for a product, when the store tracks them
    async fn product_traffic(
        &self,
        range: &DateRange,
        product_id: u64,
    ) -> StoreResult<Option<TrafficCounters>>;

    async fn order_rows(&self, range: &DateRange, filters: &FilterSet)
        -> StoreResult<Vec<OrderRow>>;

    async fn frequency_batches(
        &self,
        range: &DateRange,
        filters: &FilterSet,
    ) -> StoreResult<Vec<FrequencyBatchRow>>;

    async fn customer_orders(
        &self,
        range: &DateRange,
        filters: &FilterSet,
    ) -> StoreResult<Vec<CustomerOrderRow>>;

    /// Lifetime profiles for the given donors
    async fn customer_profiles(&self, customer_keys: &[String])
        -> StoreResult<Vec<CustomerProfile>>;
}
