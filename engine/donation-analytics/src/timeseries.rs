//! # Time Series
//!
//! Date-keyed amount series used for the dashboard charts, including the
//! Monday-anchored weekly collapse.

use crate::error::CalendarError;
use crate::range::{is_week_start, DateRange};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::btree_map;
use std::collections::BTreeMap;

/// Mapping from calendar date (or week start) to amount
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimeSeries(BTreeMap<NaiveDate, Decimal>);

impl TimeSeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero-filled series with one entry per day of `range`
    pub fn skeleton(range: &DateRange) -> Result<Self, CalendarError> {
        let days = range.days()?;
        Ok(Self(
            days.into_iter()
                .map(|day| (day, Decimal::ZERO))
                .collect(),
        ))
    }

    /// Add `amount` to the value at `day`
    pub fn add(&mut self, day: NaiveDate, amount: Decimal) {
        *self.0.entry(day).or_insert(Decimal::ZERO) += amount;
    }

    /// Overwrite the value at `day`
    pub fn set(&mut self, day: NaiveDate, amount: Decimal) {
        self.0.insert(day, amount);
    }

    pub fn get(&self, day: NaiveDate) -> Option<Decimal> {
        self.0.get(&day).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NaiveDate, Decimal)> + '_ {
        self.0.iter().map(|(d, v)| (*d, *v))
    }

    pub fn keys(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.0.keys().copied()
    }

    /// Sum of every value
    pub fn total(&self) -> Decimal {
        self.0.values().copied().sum()
    }

    /// Point-wise difference `self - other` over the union of keys
    pub fn minus(&self, other: &TimeSeries) -> TimeSeries {
        let mut out = self.clone();
        for (day, amount) in other.iter() {
            out.add(day, -amount);
        }
        out
    }

    /// Union of two series where `other` wins on shared dates.
    ///
    /// Chunk windows never share dates, so this is the plain union there.
    pub fn merge_overwrite(mut self, other: TimeSeries) -> TimeSeries {
        self.0.extend(other.0);
        self
    }

    /// Union of two series summing shared dates
    pub fn merge_sum(mut self, other: TimeSeries) -> TimeSeries {
        for (day, amount) in other.0 {
            self.add(day, amount);
        }
        self
    }

    /// Collapse a daily series into weekly buckets.
    ///
    /// A new bucket opens on every Monday and is keyed by that Monday. Days
    /// before the first Monday form a leading partial bucket keyed by the
    /// first day of the series, and the final bucket is flushed even when
    /// the week is incomplete.
    pub fn to_weekly(&self) -> TimeSeries {
        let mut weekly = BTreeMap::new();
        let mut bucket: Option<(NaiveDate, Decimal)> = None;

        for (day, amount) in self.iter() {
            bucket = match bucket {
                Some((key, sum)) if !is_week_start(day) => Some((key, sum + amount)),
                Some((key, sum)) => {
                    weekly.insert(key, sum);
                    Some((day, amount))
                }
                None => Some((day, amount)),
            };
        }
        if let Some((key, sum)) = bucket {
            weekly.insert(key, sum);
        }

        TimeSeries(weekly)
    }

    /// Keep only dates inside `range`
    pub fn restricted_to(&self, range: &DateRange) -> TimeSeries {
        TimeSeries(
            self.0
                .range(range.start()..=range.end())
                .map(|(d, v)| (*d, *v))
                .collect(),
        )
    }
}

impl IntoIterator for TimeSeries {
    type Item = (NaiveDate, Decimal);
    type IntoIter = btree_map::IntoIter<NaiveDate, Decimal>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl FromIterator<(NaiveDate, Decimal)> for TimeSeries {
    fn from_iter<T: IntoIterator<Item = (NaiveDate, Decimal)>>(iter: T) -> Self {
        let mut series = TimeSeries::new();
        for (day, amount) in iter {
            series.add(day, amount);
        }
        series
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn range(a: &str, b: &str) -> DateRange {
        DateRange::new(date(a), date(b)).unwrap()
    }

    #[test]
    fn test_skeleton_has_every_day() {
        let series = TimeSeries::skeleton(&range("2024-01-01", "2024-01-03")).unwrap();
        let keys: Vec<_> = series.keys().collect();
        assert_eq!(keys, vec![date("2024-01-01"), date("2024-01-02"), date("2024-01-03")]);
        assert!(series.iter().all(|(_, v)| v.is_zero()));
    }

    #[test]
    fn test_skeleton_spans_month_ends() {
        let series = TimeSeries::skeleton(&range("2024-02-27", "2024-03-02")).unwrap();
        assert_eq!(series.len(), 5);
        assert!(series.get(date("2024-02-29")).is_some());
    }

    #[test]
    fn test_weekly_without_monday_keeps_start_key() {
        let week = range("2024-01-03", "2024-01-07");
        let mut series = TimeSeries::skeleton(&week).unwrap();
        for day in week.days().unwrap() {
            series.set(day, Decimal::from(10));
        }

        let weekly = series.to_weekly();
        assert_eq!(weekly.len(), 1);
        assert_eq!(weekly.get(date("2024-01-03")), Some(Decimal::from(50)));
    }

    #[test]
    fn test_weekly_buckets_start_on_monday() {
        // Wed 3 Jan .. Wed 17 Jan 2024
        let mut series = TimeSeries::new();
        let days = range("2024-01-03", "2024-01-17").days().unwrap();
        for day in days {
            series.set(day, Decimal::ONE);
        }

        let weekly = series.to_weekly();
        let keys: Vec<_> = weekly.keys().collect();
        assert_eq!(keys, vec![date("2024-01-03"), date("2024-01-08"), date("2024-01-15")]);
        assert_eq!(weekly.get(date("2024-01-03")), Some(Decimal::from(5)));
        assert_eq!(weekly.get(date("2024-01-08")), Some(Decimal::from(7)));
        assert_eq!(weekly.get(date("2024-01-15")), Some(Decimal::from(3)));
        assert_eq!(weekly.total(), series.total());
    }

    #[test]
    fn test_merge_overwrite_is_union_for_disjoint_windows() {
        let mut a = TimeSeries::skeleton(&range("2024-01-01", "2024-01-02")).unwrap();
        a.add(date("2024-01-02"), Decimal::from(5));
        let mut b = TimeSeries::skeleton(&range("2024-01-03", "2024-01-04")).unwrap();
        b.add(date("2024-01-03"), Decimal::from(7));

        let merged = a.merge_overwrite(b);
        assert_eq!(merged.len(), 4);
        assert_eq!(merged.total(), Decimal::from(12));
    }

    #[test]
    fn test_merge_sum_and_minus() {
        let a: TimeSeries = [(date("2024-01-01"), Decimal::from(5))]
            .into_iter()
            .collect();
        let b: TimeSeries = [
            (date("2024-01-01"), Decimal::from(2)),
            (date("2024-01-02"), Decimal::from(3)),
        ]
        .into_iter()
        .collect();

        let summed = a.clone().merge_sum(b.clone());
        assert_eq!(summed.get(date("2024-01-01")), Some(Decimal::from(7)));
        assert_eq!(summed.get(date("2024-01-02")), Some(Decimal::from(3)));

        let diff = summed.minus(&b);
        assert_eq!(diff.get(date("2024-01-01")), Some(Decimal::from(5)));
        assert_eq!(diff.get(date("2024-01-02")), Some(Decimal::ZERO));
    }

    #[test]
    fn test_serializes_with_iso_keys() {
        let series: TimeSeries = [(date("2024-01-01"), Decimal::new(125, 1))]
            .into_iter()
            .collect();
        let json = serde_json::to_string(&series).unwrap();
        assert_eq!(json, r#"{"2024-01-01":12.5}"#);
    }
}
