//! # Filter Processors
//!
//! One processor per dashboard tab. Each turns order store rows for its
//! dimension, already narrowed by range and filters, into a breakdown.

pub mod country;
pub mod customer;
pub mod daytime;
pub mod designation;
pub mod frequency;
pub mod payment;
pub mod url;

use crate::config::{AnalyticsConfig, Capabilities};
use crate::filters::{FilterDimension, FilterSet};
use crate::range::DateRange;
use crate::result::FilterData;
use crate::store::OrderStore;
use tracing::warn;

pub use country::CountryProcessor;
pub use customer::CustomerProcessor;
pub use daytime::DaytimeProcessor;
pub use designation::DesignationProcessor;
pub use frequency::FrequencyProcessor;
pub use payment::{PaymentMethod, PaymentProcessor};
pub use url::UrlProcessor;

/// Registry holding one processor per dimension
#[derive(Debug)]
pub struct FilterProcessors {
    payment: PaymentProcessor,
    country: CountryProcessor,
    daytime: DaytimeProcessor,
    designation: DesignationProcessor,
    url: UrlProcessor,
    frequency: FrequencyProcessor,
    customer: CustomerProcessor,
}

impl FilterProcessors {
    pub fn new(config: &AnalyticsConfig, capabilities: Capabilities) -> Self {
        Self {
            payment: PaymentProcessor::new(capabilities),
            country: CountryProcessor::new(capabilities),
            daytime: DaytimeProcessor::new(),
            designation: DesignationProcessor::new(),
            url: UrlProcessor::new(&config.processors),
            frequency: FrequencyProcessor::new(&config.processors, capabilities),
            customer: CustomerProcessor::new(
                config.processors.customer_top_n,
                config.cache.customer_ttl(),
            ),
        }
    }

    pub fn customer(&self) -> &CustomerProcessor {
        &self.customer
    }

    /// Run the processor for `dimension`.
    ///
    /// A store failure degrades this one dimension to an empty breakdown.
    pub async fn process(
        &self,
        dimension: FilterDimension,
        store: &dyn OrderStore,
        range: &DateRange,
        filters: &FilterSet,
    ) -> FilterData {
        let outcome = match dimension {
            FilterDimension::Raised => return FilterData::Empty,
            FilterDimension::Payment => self.payment.process(store, range, filters).await,
            FilterDimension::Country => self.country.process(store, range, filters).await,
            FilterDimension::Daytime => self.daytime.process(store, range, filters).await,
            FilterDimension::Designation => self.designation.process(store, range, filters).await,
            FilterDimension::Url => self.url.process(store, range, filters).await,
            FilterDimension::Frequency => self.frequency.process(store, range, filters).await,
            FilterDimension::Customer => self.customer.process(store, range, filters).await,
        };

        outcome.unwrap_or_else(|err| {
            warn!(
                %dimension,
                %range,
                filters = %filters.canonical(),
                error = %err,
                "Filter processor failed, returning an empty breakdown"
            );
            FilterData::Empty
        })
    }
}
