//! Country breakdown

use super::payment::split_samples;
use crate::config::Capabilities;
use crate::filters::FilterSet;
use crate::range::DateRange;
use crate::result::{Breakdown, FilterData};
use crate::store::{OrderStore, StoreResult};
use std::collections::BTreeSet;

/// Label used for orders without a billing country
pub const UNKNOWN_COUNTRY: &str = "Unknown";

const COUNTRY_NAMES: &[(&str, &str)] = &[
    ("AE", "United Arab Emirates"),
    ("AF", "Afghanistan"),
    ("AL", "Albania"),
    ("AM", "Armenia"),
    ("AR", "Argentina"),
    ("AT", "Austria"),
    ("AU", "Australia"),
    ("AZ", "Azerbaijan"),
    ("BA", "Bosnia and Herzegovina"),
    ("BD", "Bangladesh"),
    ("BE", "Belgium"),
    ("BG", "Bulgaria"),
    ("BH", "Bahrain"),
    ("BR", "Brazil"),
    ("CA", "Canada"),
    ("CH", "Switzerland"),
    ("CL", "Chile"),
    ("CN", "China"),
    ("CO", "Colombia"),
    ("CY", "Cyprus"),
    ("CZ", "Czech Republic"),
    ("DE", "Germany"),
    ("DK", "Denmark"),
    ("DZ", "Algeria"),
    ("EE", "Estonia"),
    ("EG", "Egypt"),
    ("ES", "Spain"),
    ("ET", "Ethiopia"),
    ("FI", "Finland"),
    ("FR", "France"),
    ("GB", "United Kingdom"),
    ("GH", "Ghana"),
    ("GR", "Greece"),
    ("HK", "Hong Kong"),
    ("HR", "Croatia"),
    ("HU", "Hungary"),
    ("ID", "Indonesia"),
    ("IE", "Ireland"),
    ("IL", "Israel"),
    ("IN", "India"),
    ("IQ", "Iraq"),
    ("IS", "Iceland"),
    ("IT", "Italy"),
    ("JO", "Jordan"),
    ("JP", "Japan"),
    ("KE", "Kenya"),
    ("KR", "South Korea"),
    ("KW", "Kuwait"),
    ("KZ", "Kazakhstan"),
    ("LB", "Lebanon"),
    ("LK", "Sri Lanka"),
    ("LT", "Lithuania"),
    ("LU", "Luxembourg"),
    ("LV", "Latvia"),
    ("MA", "Morocco"),
    ("MT", "Malta"),
    ("MX", "Mexico"),
    ("MY", "Malaysia"),
    ("NG", "Nigeria"),
    ("NL", "Netherlands"),
    ("NO", "Norway"),
    ("NP", "Nepal"),
    ("NZ", "New Zealand"),
    ("OM", "Oman"),
    ("PE", "Peru"),
    ("PH", "Philippines"),
    ("PK", "Pakistan"),
    ("PL", "Poland"),
    ("PS", "Palestine"),
    ("PT", "Portugal"),
    ("QA", "Qatar"),
    ("RO", "Romania"),
    ("RS", "Serbia"),
    ("SA", "Saudi Arabia"),
    ("SD", "Sudan"),
    ("SE", "Sweden"),
    ("SG", "Singapore"),
    ("SI", "Slovenia"),
    ("SK", "Slovakia"),
    ("SN", "Senegal"),
    ("SO", "Somalia"),
    ("SY", "Syria"),
    ("TH", "Thailand"),
    ("TN", "Tunisia"),
    ("TR", "Turkey"),
    ("TW", "Taiwan"),
    ("TZ", "Tanzania"),
    ("UA", "Ukraine"),
    ("UG", "Uganda"),
    ("US", "United States"),
    ("UY", "Uruguay"),
    ("VN", "Vietnam"),
    ("YE", "Yemen"),
    ("ZA", "South Africa"),
    ("ZW", "Zimbabwe"),
];

/// Display name for an ISO 3166-1 alpha-2 code.
///
/// Unlisted codes are shown as the code itself.
pub fn country_name(code: &str) -> String {
    let code = code.trim().to_ascii_uppercase();
    if code.is_empty() {
        return UNKNOWN_COUNTRY.to_string();
    }
    COUNTRY_NAMES
        .binary_search_by(|(c, _)| (*c).cmp(code.as_str()))
        .map(|i| COUNTRY_NAMES[i].1.to_string())
        .unwrap_or(code)
}

#[derive(Debug, Clone)]
pub struct CountryProcessor {
    capabilities: Capabilities,
}

impl CountryProcessor {
    pub fn new(capabilities: Capabilities) -> Self {
        Self { capabilities }
    }

    pub async fn process(
        &self,
        store: &dyn OrderStore,
        range: &DateRange,
        filters: &FilterSet,
    ) -> StoreResult<FilterData> {
        let rows = store.country_rows(range, filters).await?;
        let mut breakdown = Breakdown::new(true);
        let mut codes = BTreeSet::new();

        for row in rows {
            let key = row.country_code.trim().to_ascii_uppercase();
            let key = if key.is_empty() {
                UNKNOWN_COUNTRY.to_string()
            } else {
                key
            };
            let entry = breakdown.entry(key.clone(), country_name(&row.country_code));
            entry.code.get_or_insert_with(|| key.clone());
            entry.record(row.day, row.order_count, row.total_amount);
            codes.insert((key, row.country_code));
        }

        for (key, raw_code) in codes {
            let samples = store.country_samples(range, filters, &raw_code).await?;
            let (onetime, recurring) = split_samples(samples, self.capabilities);
            let entry = breakdown.entry(key.clone(), country_name(&raw_code));
            entry.onetime_samples.extend(onetime);
            entry.recurring_samples.extend(recurring);
        }

        Ok(FilterData::Breakdown(breakdown))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_country_table_is_sorted() {
        assert!(COUNTRY_NAMES.windows(2).all(|w| w[0].0 < w[1].0));
    }

    #[test]
    fn test_country_names() {
        assert_eq!(country_name("US"), "United States");
        assert_eq!(country_name("gb"), "United Kingdom");
        assert_eq!(country_name(""), UNKNOWN_COUNTRY);
        assert_eq!(country_name("XX"), "XX");
    }
}
