//! # Date Range Resolution
//!
//! Turns symbolic range names ("last7days", "thismonth", "custom", ...) into
//! concrete inclusive calendar ranges anchored on "today" in the store
//! timezone, and classifies them as standard or large.

use crate::config::RangeConfig;
use crate::error::{CalendarError, ValidationError};
use crate::MAX_PERIOD_DAYS;
use chrono::{Datelike, Duration, FixedOffset, NaiveDate, Offset, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Inclusive calendar date range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    /// Create a new range; `start` must not be after `end`
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, ValidationError> {
        if start > end {
            return Err(ValidationError::InvertedRange {
                from: start,
                to: end,
            });
        }
        Ok(Self { start, end })
    }

    /// Single-day range
    pub fn single_day(day: NaiveDate) -> Self {
        Self {
            start: day,
            end: day,
        }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Whole days between start and end (0 for a single-day range)
    pub fn span_days(&self) -> i64 {
        (self.end - self.start).num_days()
    }

    /// Number of calendar days in the range, both ends included
    pub fn day_count(&self) -> i64 {
        self.span_days() + 1
    }

    /// Whether `day` falls inside the range
    pub fn contains(&self, day: NaiveDate) -> bool {
        day >= self.start && day <= self.end
    }

    /// Every calendar day in the range, in order.
    ///
    /// Fails instead of materialising absurdly long periods.
    pub fn days(&self) -> Result<Vec<NaiveDate>, CalendarError> {
        let days = self.day_count();
        if days > MAX_PERIOD_DAYS {
            return Err(CalendarError::PeriodTooLong {
                start: self.start,
                end: self.end,
                days,
                max: MAX_PERIOD_DAYS,
            });
        }

        let mut out = Vec::with_capacity(days as usize);
        let mut day = self.start;
        loop {
            out.push(day);
            if day == self.end {
                break;
            }
            day = day.succ_opt().ok_or(CalendarError::Overflow(day))?;
        }
        Ok(out)
    }

    /// Split into consecutive windows of at most `window_days` days.
    ///
    /// The last window is truncated to the range end.
    pub fn chunks(&self, window_days: i64) -> Vec<DateRange> {
        let window_days = window_days.max(1);
        let mut chunks = Vec::new();
        let mut start = self.start;
        loop {
            let end = start
                .checked_add_signed(Duration::days(window_days - 1))
                .map_or(self.end, |candidate| candidate.min(self.end));
            chunks.push(DateRange { start, end });
            match end.succ_opt() {
                Some(next) if end < self.end => start = next,
                _ => break,
            }
        }
        chunks
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Symbolic range names offered by the date picker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RangeName {
    Today,
    Yesterday,
    Last7Days,
    Last14Days,
    Last30Days,
    ThisWeek,
    LastWeek,
    ThisMonth,
    LastMonth,
    ThisYear,
    LastYear,
    Custom,
}

impl RangeName {
    pub fn as_str(&self) -> &'static str {
        match self {
            RangeName::Today => "today",
            RangeName::Yesterday => "yesterday",
            RangeName::Last7Days => "last7days",
            RangeName::Last14Days => "last14days",
            RangeName::Last30Days => "last30days",
            RangeName::ThisWeek => "thisweek",
            RangeName::LastWeek => "lastweek",
            RangeName::ThisMonth => "thismonth",
            RangeName::LastMonth => "lastmonth",
            RangeName::ThisYear => "thisyear",
            RangeName::LastYear => "lastyear",
            RangeName::Custom => "custom",
        }
    }
}

impl FromStr for RangeName {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = match s.trim().to_ascii_lowercase().as_str() {
            "today" => RangeName::Today,
            "yesterday" => RangeName::Yesterday,
            "last7days" => RangeName::Last7Days,
            "last14days" => RangeName::Last14Days,
            "last30days" => RangeName::Last30Days,
            "thisweek" => RangeName::ThisWeek,
            "lastweek" => RangeName::LastWeek,
            "thismonth" => RangeName::ThisMonth,
            "lastmonth" => RangeName::LastMonth,
            "thisyear" => RangeName::ThisYear,
            "lastyear" => RangeName::LastYear,
            "custom" => RangeName::Custom,
            _ => return Err(ValidationError::UnknownRange(s.to_string())),
        };
        Ok(name)
    }
}

impl fmt::Display for RangeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Processing class of a resolved range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RangeClass {
    Standard,
    Large,
}

/// Source of "today" for range arithmetic
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

/// Wall clock shifted into the store timezone
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    offset: FixedOffset,
}

impl SystemClock {
    /// Clock for a store `utc_offset_minutes` away from UTC.
    ///
    /// Out-of-range offsets fall back to UTC.
    pub fn with_offset_minutes(utc_offset_minutes: i32) -> Self {
        let offset = FixedOffset::east_opt(utc_offset_minutes * 60).unwrap_or_else(|| {
            tracing::warn!(utc_offset_minutes, "Invalid store UTC offset, using UTC");
            Utc.fix()
        });
        Self { offset }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self { offset: Utc.fix() }
    }
}

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.offset).date_naive()
    }
}

/// Clock pinned to a single day
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}

/// Resolves symbolic ranges against an injected clock
pub struct DateRangeResolver {
    clock: Box<dyn Clock>,
    config: RangeConfig,
}

impl fmt::Debug for DateRangeResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DateRangeResolver")
            .field("today", &self.clock.today())
            .field("config", &self.config)
            .finish()
    }
}

impl DateRangeResolver {
    /// Create a new resolver
    pub fn new(clock: Box<dyn Clock>, config: RangeConfig) -> Self {
        Self { clock, config }
    }

    /// Today in the store timezone
    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    /// Resolve a symbolic range into concrete dates
    pub fn resolve(
        &self,
        name: RangeName,
        custom_from: Option<&str>,
        custom_to: Option<&str>,
    ) -> Result<DateRange, ValidationError> {
        let today = self.today();
        let monday = week_start(today);

        let (start, end) = match name {
            RangeName::Today => (today, today),
            RangeName::Yesterday => {
                let yesterday = today - Duration::days(1);
                (yesterday, yesterday)
            }
            RangeName::Last7Days => (today - Duration::days(6), today),
            RangeName::Last14Days => (today - Duration::days(13), today),
            RangeName::Last30Days => (today - Duration::days(29), today),
            RangeName::ThisWeek => (monday, today),
            RangeName::LastWeek => (monday - Duration::days(7), monday - Duration::days(1)),
            RangeName::ThisMonth => (first_of_month(today), today),
            RangeName::LastMonth => {
                let last = first_of_month(today) - Duration::days(1);
                (first_of_month(last), last)
            }
            RangeName::ThisYear => (first_of_year(today.year()), today),
            RangeName::LastYear => {
                let start = first_of_year(today.year() - 1);
                (start, first_of_year(today.year()) - Duration::days(1))
            }
            RangeName::Custom => return self.resolve_custom(custom_from, custom_to, today),
        };

        DateRange::new(start, end)
    }

    fn resolve_custom(
        &self,
        from: Option<&str>,
        to: Option<&str>,
        today: NaiveDate,
    ) -> Result<DateRange, ValidationError> {
        let (from, to) = match (non_blank(from), non_blank(to)) {
            (Some(from), Some(to)) => (from, to),
            _ => return Err(ValidationError::MissingCustomDates),
        };

        let from = parse_iso_date(from)?;
        let to = parse_iso_date(to)?;

        if from > to {
            return Err(ValidationError::InvertedRange { from, to });
        }
        if to > today {
            return Err(ValidationError::FutureDate { to, today });
        }

        let days = (to - from).num_days();
        if days > self.config.max_custom_span_days {
            return Err(ValidationError::RangeTooLarge {
                days,
                max: self.config.max_custom_span_days,
            });
        }

        DateRange::new(from, to)
    }

    /// Classify a resolved range.
    ///
    /// Whole-year ranges are always large; custom ranges are large once they
    /// span more than the configured threshold.
    pub fn classify(&self, name: RangeName, range: &DateRange) -> RangeClass {
        match name {
            RangeName::ThisYear | RangeName::LastYear => RangeClass::Large,
            RangeName::Custom if range.span_days() > self.config.large_range_threshold_days => {
                RangeClass::Large
            }
            _ => RangeClass::Standard,
        }
    }
}

/// Parse a strict `YYYY-MM-DD` date
pub fn parse_iso_date(value: &str) -> Result<NaiveDate, ValidationError> {
    let trimmed = value.trim();
    let well_formed = trimmed.len() == 10
        && trimmed.bytes().enumerate().all(|(i, b)| match i {
            4 | 7 => b == b'-',
            _ => b.is_ascii_digit(),
        });
    if !well_formed {
        return Err(ValidationError::InvalidDateFormat {
            value: value.to_string(),
        });
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .map_err(|_| ValidationError::InvalidDateFormat {
            value: value.to_string(),
        })
}

/// Monday of the week containing `day`
pub fn week_start(day: NaiveDate) -> NaiveDate {
    day - Duration::days(day.weekday().num_days_from_monday() as i64)
}

/// Whether `day` starts a new weekly bucket
pub fn is_week_start(day: NaiveDate) -> bool {
    day.weekday() == Weekday::Mon
}

fn first_of_month(day: NaiveDate) -> NaiveDate {
    day - Duration::days(day.day0() as i64)
}

fn first_of_year(year: i32) -> NaiveDate {
    NaiveDate::from_yo_opt(year, 1).unwrap_or(NaiveDate::MIN)
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn range(from: &str, to: &str) -> DateRange {
        DateRange::new(date(from), date(to)).unwrap()
    }

    fn single(day: &str) -> DateRange {
        DateRange::single_day(date(day))
    }

    // Wednesday
    fn resolver() -> DateRangeResolver {
        let clock = FixedClock(date("2024-05-15"));
        DateRangeResolver::new(Box::new(clock), RangeConfig::default())
    }

    fn resolve(name: &str) -> DateRange {
        resolver()
            .resolve(name.parse().unwrap(), None, None)
            .unwrap()
    }

    fn custom(r: &DateRangeResolver, from: &str, to: &str) -> DateRange {
        r.resolve(RangeName::Custom, Some(from), Some(to)).unwrap()
    }

    #[test]
    fn test_symbolic_ranges() {
        assert_eq!(resolve("today"), single("2024-05-15"));
        assert_eq!(resolve("yesterday"), single("2024-05-14"));
        assert_eq!(resolve("last7days").start(), date("2024-05-09"));
        assert_eq!(resolve("last7days").day_count(), 7);
        assert_eq!(resolve("last14days").day_count(), 14);
        assert_eq!(resolve("last30days").start(), date("2024-04-16"));
        assert_eq!(resolve("last30days").end(), date("2024-05-15"));
    }

    #[test]
    fn test_week_ranges_start_on_monday() {
        let this_week = resolve("thisweek");
        assert_eq!(this_week.start(), date("2024-05-13"));
        assert_eq!(this_week.end(), date("2024-05-15"));

        let last_week = resolve("lastweek");
        assert_eq!(last_week.start(), date("2024-05-06"));
        assert_eq!(last_week.end(), date("2024-05-12"));
    }

    #[test]
    fn test_month_and_year_ranges() {
        assert_eq!(resolve("thismonth").start(), date("2024-05-01"));
        let last_month = resolve("lastmonth");
        assert_eq!(last_month.start(), date("2024-04-01"));
        assert_eq!(last_month.end(), date("2024-04-30"));

        assert_eq!(resolve("thisyear").start(), date("2024-01-01"));
        let last_year = resolve("lastyear");
        assert_eq!(last_year.start(), date("2023-01-01"));
        assert_eq!(last_year.end(), date("2023-12-31"));
    }

    #[test]
    fn test_last_month_across_year_boundary() {
        let resolver = DateRangeResolver::new(
            Box::new(FixedClock(date("2024-01-10"))),
            RangeConfig::default(),
        );
        let range = resolver.resolve(RangeName::LastMonth, None, None).unwrap();
        assert_eq!(range.start(), date("2023-12-01"));
        assert_eq!(range.end(), date("2023-12-31"));
    }

    #[test]
    fn test_custom_validation() {
        let r = resolver();
        assert_eq!(
            r.resolve(RangeName::Custom, Some("2024-01-01"), None),
            Err(ValidationError::MissingCustomDates)
        );
        assert_eq!(
            r.resolve(RangeName::Custom, Some("  "), Some("2024-01-01")),
            Err(ValidationError::MissingCustomDates)
        );
        assert!(matches!(
            r.resolve(RangeName::Custom, Some("2024/01/01"), Some("2024-01-05")),
            Err(ValidationError::InvalidDateFormat { .. })
        ));
        assert!(matches!(
            r.resolve(RangeName::Custom, Some("2024-1-1"), Some("2024-01-05")),
            Err(ValidationError::InvalidDateFormat { .. })
        ));
        assert!(matches!(
            r.resolve(RangeName::Custom, Some("2024-02-30"), Some("2024-03-05")),
            Err(ValidationError::InvalidDateFormat { .. })
        ));
        assert!(matches!(
            r.resolve(RangeName::Custom, Some("2024-03-05"), Some("2024-03-01")),
            Err(ValidationError::InvertedRange { .. })
        ));
        assert!(matches!(
            r.resolve(RangeName::Custom, Some("2024-05-01"), Some("2024-05-16")),
            Err(ValidationError::FutureDate { .. })
        ));
        assert_eq!(
            r.resolve(RangeName::Custom, Some("2022-01-01"), Some("2024-01-05")),
            Err(ValidationError::RangeTooLarge {
                days: 734,
                max: 730,
            })
        );

        let ok = custom(&r, "2024-01-01", "2024-01-03");
        assert_eq!(ok.day_count(), 3);
    }

    #[test]
    fn test_classification() {
        let r = resolver();
        for (name, expected) in [
            (RangeName::ThisYear, RangeClass::Large),
            (RangeName::LastYear, RangeClass::Large),
            (RangeName::Last30Days, RangeClass::Standard),
        ] {
            let resolved = r.resolve(name, None, None).unwrap();
            assert_eq!(r.classify(name, &resolved), expected, "{name}");
        }

        let exactly = custom(&r, "2023-11-17", "2024-05-15");
        assert_eq!(exactly.span_days(), 180);
        let class = r.classify(RangeName::Custom, &exactly);
        assert_eq!(class, RangeClass::Standard);

        let over = custom(&r, "2023-11-16", "2024-05-15");
        let class = r.classify(RangeName::Custom, &over);
        assert_eq!(class, RangeClass::Large);
    }

    #[test]
    fn test_unknown_range_name() {
        assert_eq!(
            "fortnight".parse::<RangeName>(),
            Err(ValidationError::UnknownRange("fortnight".to_string()))
        );
        assert_eq!("LAST7DAYS".parse::<RangeName>(), Ok(RangeName::Last7Days));
    }

    #[test]
    fn test_days_and_chunks() {
        let short = range("2024-01-01", "2024-01-03");
        assert_eq!(
            short.days().unwrap(),
            vec![date("2024-01-01"), date("2024-01-02"), date("2024-01-03")]
        );

        let long = range("2024-01-01", "2024-03-15");
        let chunks = long.chunks(30);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0], range("2024-01-01", "2024-01-30"));
        assert_eq!(chunks[1], range("2024-01-31", "2024-02-29"));
        assert_eq!(chunks[2], range("2024-03-01", "2024-03-15"));
        let covered: i64 = chunks.iter().map(DateRange::day_count).sum();
        assert_eq!(covered, long.day_count());
    }

    #[test]
    fn test_overlong_period_is_a_calendar_error() {
        let overlong = range("1900-01-01", "2024-01-01");
        assert!(matches!(overlong.days(), Err(CalendarError::PeriodTooLong { .. })));
    }

    #[test]
    fn test_week_start() {
        assert_eq!(week_start(date("2024-01-03")), date("2024-01-01"));
        assert_eq!(week_start(date("2024-01-07")), date("2024-01-01"));
        assert_eq!(week_start(date("2024-01-08")), date("2024-01-08"));
        assert!(is_week_start(date("2024-01-08")));
    }
}
