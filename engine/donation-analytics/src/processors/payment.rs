//! Payment method breakdown

use crate::config::Capabilities;
use crate::filters::FilterSet;
use crate::range::DateRange;
use crate::result::{Breakdown, FilterData};
use crate::store::{AmountSample, OrderStore, StoreResult};
use std::collections::BTreeMap;
use std::fmt;

/// Canonical payment method labels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PaymentMethod {
    CreditCard,
    PayPal,
    ApplePay,
    GooglePay,
    BankTransfer,
    CashOnDelivery,
    Check,
    DigitalWallet,
    Other,
}

/// Gateway ids that only ever carry one kind of payment
const KNOWN_GATEWAYS: &[(&str, PaymentMethod)] = &[
    ("2checkout", PaymentMethod::CreditCard),
    ("bacs", PaymentMethod::BankTransfer),
    ("cheque", PaymentMethod::Check),
    ("cod", PaymentMethod::CashOnDelivery),
    ("paypal", PaymentMethod::PayPal),
    ("ppcp-gateway", PaymentMethod::PayPal),
    ("ppec_paypal", PaymentMethod::PayPal),
];

const CARD_WORDS: [&str; 8] = [
    "stripe",
    "card",
    "credit",
    "debit",
    "visa",
    "mastercard",
    "authorize",
    "2checkout",
];

impl PaymentMethod {
    /// Classify a gateway from its code and title.
    ///
    /// Wallet brands win over the gateway id, since card processors such as
    /// Stripe carry Apple Pay and Google Pay under their own code. Otherwise a
    /// known gateway id decides, and anything else falls back to whole-word
    /// matches on the code and title.
    pub fn classify(gateway: &str, title: &str) -> Self {
        let haystack = format!("{} {}", gateway, title).to_ascii_lowercase();
        let words: Vec<&str> = haystack
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        let has = |needles: &[&str]| words.iter().any(|w| needles.contains(w));
        let has_phrase = |phrase: &[&str]| words.windows(phrase.len()).any(|w| w == phrase);

        if has(&["apple", "applepay"]) {
            return PaymentMethod::ApplePay;
        }
        if has(&["google", "gpay", "googlepay"]) {
            return PaymentMethod::GooglePay;
        }

        let code = gateway.trim().to_ascii_lowercase();
        if let Some((_, method)) = KNOWN_GATEWAYS.iter().find(|(id, _)| *id == code) {
            return *method;
        }

        if has(&["paypal", "ppec", "ppcp"]) {
            PaymentMethod::PayPal
        } else if has(&["cashapp", "venmo", "amazon", "wallet"]) || has_phrase(&["cash", "app"]) {
            PaymentMethod::DigitalWallet
        } else if has(&["bacs", "bank", "sepa", "ach", "wire", "transfer"]) {
            PaymentMethod::BankTransfer
        } else if has(&CARD_WORDS) {
            PaymentMethod::CreditCard
        } else if has(&["cod"]) || has_phrase(&["cash", "on", "delivery"]) {
            PaymentMethod::CashOnDelivery
        } else if has(&["cheque", "check"]) {
            PaymentMethod::Check
        } else {
            PaymentMethod::Other
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PaymentMethod::CreditCard => "Credit Card",
            PaymentMethod::PayPal => "PayPal",
            PaymentMethod::ApplePay => "Apple Pay",
            PaymentMethod::GooglePay => "Google Pay",
            PaymentMethod::BankTransfer => "Bank Transfer",
            PaymentMethod::CashOnDelivery => "Cash on Delivery",
            PaymentMethod::Check => "Check",
            PaymentMethod::DigitalWallet => "Digital Wallet",
            PaymentMethod::Other => "Other",
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            PaymentMethod::CreditCard => "credit-card",
            PaymentMethod::PayPal => "paypal",
            PaymentMethod::ApplePay => "apple",
            PaymentMethod::GooglePay => "google",
            PaymentMethod::BankTransfer => "bank",
            PaymentMethod::CashOnDelivery => "money",
            PaymentMethod::Check => "check",
            PaymentMethod::DigitalWallet => "wallet",
            PaymentMethod::Other => "other",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Split samples into one-time and recurring amounts
pub(crate) fn split_samples(
    samples: Vec<AmountSample>,
    capabilities: Capabilities,
) -> (Vec<rust_decimal::Decimal>, Vec<rust_decimal::Decimal>) {
    let mut onetime = Vec::new();
    let mut recurring = Vec::new();
    for sample in samples {
        if sample.recurring && capabilities.recurring_enabled {
            recurring.push(sample.amount);
        } else {
            onetime.push(sample.amount);
        }
    }
    (onetime, recurring)
}

#[derive(Debug, Clone)]
pub struct PaymentProcessor {
    capabilities: Capabilities,
}

impl PaymentProcessor {
    pub fn new(capabilities: Capabilities) -> Self {
        Self { capabilities }
    }

    pub async fn process(
        &self,
        store: &dyn OrderStore,
        range: &DateRange,
        filters: &FilterSet,
    ) -> StoreResult<FilterData> {
        let rows = store.payment_rows(range, filters).await?;
        let mut breakdown = Breakdown::new(true);
        let mut gateways: BTreeMap<PaymentMethod, Vec<(String, String)>> = BTreeMap::new();

        for row in rows {
            let method = PaymentMethod::classify(&row.gateway, &row.gateway_title);
            let entry = breakdown.entry(method.label(), method.label());
            entry.icon.get_or_insert_with(|| method.icon().to_string());
            entry.record(row.day, row.order_count, row.total_amount);

            // one gateway code can serve several titles, each classified on its own
            let pair = (row.gateway, row.gateway_title);
            let known = gateways.entry(method).or_default();
            if !known.contains(&pair) {
                known.push(pair);
            }
        }

        // medians cover the whole range, not individual days
        for (method, pairs) in gateways {
            let mut samples = Vec::new();
            for (code, title) in &pairs {
                samples.extend(store.payment_samples(range, filters, code, title).await?);
            }
            let (onetime, recurring) = split_samples(samples, self.capabilities);
            let entry = breakdown.entry(method.label(), method.label());
            entry.onetime_samples = onetime;
            entry.recurring_samples = recurring;
        }

        Ok(FilterData::Breakdown(breakdown))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_classified(cases: &[(&str, &str, PaymentMethod)]) {
        for (gateway, title, expected) in cases {
            let method = PaymentMethod::classify(gateway, title);
            assert_eq!(method, *expected, "{gateway} / {title}");
        }
    }

    #[test]
    fn test_classify_gateways() {
        assert_classified(&[
            ("stripe", "Credit Card (Stripe)", PaymentMethod::CreditCard),
            ("stripe_applepay", "Apple Pay", PaymentMethod::ApplePay),
            ("stripe", "Google Pay", PaymentMethod::GooglePay),
            ("ppcp-gateway", "PayPal", PaymentMethod::PayPal),
            ("bacs", "Direct bank transfer", PaymentMethod::BankTransfer),
            ("cod", "Cash on delivery", PaymentMethod::CashOnDelivery),
            ("cheque", "Check payments", PaymentMethod::Check),
            ("venmo", "Venmo", PaymentMethod::DigitalWallet),
            ("manual", "Offline", PaymentMethod::Other),
            ("", "", PaymentMethod::Other),
        ]);
    }

    #[test]
    fn test_classify_matches_whole_words() {
        assert_classified(&[
            ("2checkout", "2Checkout", PaymentMethod::CreditCard),
            ("square_cash_app", "Cash App", PaymentMethod::DigitalWallet),
            ("coaching_fund", "Coaching pledge", PaymentMethod::Other),
            ("stripe_ach", "ACH Direct Debit", PaymentMethod::BankTransfer),
            ("stripe_sepa", "SEPA Direct Debit", PaymentMethod::BankTransfer),
            ("offline", "Paid by check", PaymentMethod::Check),
            ("PPEC_PAYPAL", "Express", PaymentMethod::PayPal),
        ]);
    }

    #[test]
    fn test_split_samples_respects_capability() {
        let samples = vec![
            AmountSample {
                amount: 10.into(),
                recurring: false,
            },
            AmountSample {
                amount: 20.into(),
                recurring: true,
            },
        ];
        let (onetime, recurring) = split_samples(samples.clone(), Capabilities::default());
        assert_eq!((onetime.len(), recurring.len()), (1, 1));

        let disabled = Capabilities {
            recurring_enabled: false,
        };
        let (onetime, recurring) = split_samples(samples, disabled);
        assert_eq!((onetime.len(), recurring.len()), (2, 0));
    }
}
