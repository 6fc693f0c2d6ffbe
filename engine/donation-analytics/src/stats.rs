//! Median and average helpers over donation amounts

use rust_decimal::Decimal;

/// Median of a list of values.
///
/// Even-length lists average the two middle values. An empty list yields zero.
pub fn median(values: &[Decimal]) -> Decimal {
    if values.is_empty() {
        return Decimal::ZERO;
    }

    let mut sorted = values.to_vec();
    sorted.sort_unstable();

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / Decimal::TWO
    } else {
        sorted[mid]
    }
}

/// Division that yields zero for a zero denominator
pub fn safe_div(numerator: Decimal, denominator: Decimal) -> Decimal {
    if denominator.is_zero() {
        Decimal::ZERO
    } else {
        numerator / denominator
    }
}

/// Arithmetic mean of `total` over `count` items, rounded to cents
pub fn average(total: Decimal, count: u64) -> Decimal {
    safe_div(total, Decimal::from(count)).round_dp(2)
}

/// `part` as a percentage of `whole`, rounded to two decimals
pub fn percentage(part: Decimal, whole: Decimal) -> Decimal {
    (safe_div(part, whole) * Decimal::ONE_HUNDRED).round_dp(2)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(v: i64) -> Decimal {
        Decimal::from(v)
    }

    #[test]
    fn test_median_odd_length() {
        assert_eq!(median(&[d(7), d(1), d(3)]), d(3));
        assert_eq!(median(&[d(42)]), d(42));
    }

    #[test]
    fn test_median_even_length() {
        assert_eq!(median(&[d(4), d(1), d(3), d(2)]), Decimal::new(25, 1));
        assert_eq!(median(&[d(10), d(20)]), d(15));
    }

    #[test]
    fn test_median_empty() {
        assert_eq!(median(&[]), Decimal::ZERO);
    }

    #[test]
    fn test_median_with_cents() {
        let values = [Decimal::new(1050, 2), Decimal::new(2575, 2)];
        assert_eq!(median(&values), Decimal::new(18125, 3));
    }

    #[test]
    fn test_safe_div_and_percentage() {
        assert_eq!(safe_div(d(10), Decimal::ZERO), Decimal::ZERO);
        assert_eq!(safe_div(d(10), d(4)), Decimal::new(25, 1));
        assert_eq!(percentage(d(1), d(3)), Decimal::new(3333, 2));
        assert_eq!(percentage(d(5), Decimal::ZERO), Decimal::ZERO);
        assert_eq!(average(d(100), 3), Decimal::new(3333, 2));
        assert_eq!(average(d(100), 0), Decimal::ZERO);
    }
}
