//! USD-pivot conversion

use std::collections::HashMap;

use crate::models::{ExchangeRate, Timestamp};

/// The currency every rate is quoted against
pub const PIVOT_CURRENCY: &str = "USD";

/// Rates keyed by currency code plus the table's single last-updated instant
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RateTable {
    rates: HashMap<String, f64>,
    last_updated: Option<Timestamp>,
}

impl RateTable {
    /// Empty table; every lookup falls back to 1
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from the ledger's rate list
    ///
    /// The table shares one last-updated instant: the newest non-zero
    /// instant among the entries.
    #[must_use]
    pub fn from_rates(rates: &[ExchangeRate]) -> Self {
        let last_updated = rates
            .iter()
            .map(|r| r.last_updated)
            .filter(|t| !t.is_unset())
            .max();
        Self {
            rates: rates.iter().map(|r| (r.code.clone(), r.rate)).collect(),
            last_updated,
        }
    }

    /// Build from `(code, rate)` pairs with no last-updated instant
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        Self {
            rates: pairs.into_iter().map(|(c, r)| (c.into(), r)).collect(),
            last_updated: None,
        }
    }

    /// Rate for a currency; missing, zero or non-finite rates read as 1
    #[must_use]
    pub fn rate(&self, code: &str) -> f64 {
        match self.rates.get(code) {
            Some(&rate) if rate.is_finite() && rate != 0.0 => rate,
            _ => 1.0,
        }
    }

    /// Whether the table holds an entry for `code`
    #[must_use]
    pub fn contains(&self, code: &str) -> bool {
        self.rates.contains_key(code)
    }

    /// When the table was last refreshed, if ever
    #[must_use]
    pub fn last_updated(&self) -> Option<Timestamp> {
        self.last_updated
    }

    /// Number of currencies in the table
    #[must_use]
    pub fn len(&self) -> usize {
        self.rates.len()
    }

    /// Whether the table is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    /// Shorthand for [`convert`] against this table
    #[must_use]
    pub fn convert(&self, amount: f64, from: &str, to: &str) -> f64 {
        convert(amount, from, to, self)
    }
}

/// Convert `amount` from one currency to another through the USD pivot
///
/// Identical codes return `amount` untouched. Currencies missing from the
/// table convert as if their rate were 1.
#[must_use]
pub fn convert(amount: f64, from: &str, to: &str, rates: &RateTable) -> f64 {
    if from == to {
        return amount;
    }
    amount / rates.rate(from) * rates.rate(to)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_currency_is_exact() {
        let empty = RateTable::new();
        let odd = RateTable::from_pairs([("EUR", 0.3)]);
        for amount in [0.1, 1e-9, 123_456.789, -42.42] {
            assert_eq!(convert(amount, "EUR", "EUR", &empty), amount);
            assert_eq!(convert(amount, "EUR", "EUR", &odd), amount);
        }
    }

    #[test]
    fn test_converts_through_pivot() {
        let rates = RateTable::from_pairs([("A", 2.0), ("B", 4.0)]);
        assert_eq!(convert(100.0, "A", "B", &rates), 200.0);
        assert_eq!(convert(200.0, "B", "A", &rates), 100.0);
    }

    #[test]
    fn test_missing_rate_reads_as_one() {
        let rates = RateTable::from_pairs([("EUR", 0.5)]);
        assert_eq!(convert(10.0, "XYZ", "EUR", &rates), 5.0);
        assert_eq!(convert(10.0, "EUR", "XYZ", &rates), 20.0);
        assert_eq!(convert(10.0, "XYZ", "QQQ", &RateTable::new()), 10.0);
    }

    #[test]
    fn test_zero_rate_never_yields_nan() {
        let rates = RateTable::from_pairs([("BAD", 0.0), ("NAN", f64::NAN)]);
        let out = convert(10.0, "BAD", "NAN", &rates);
        assert!(out.is_finite());
        assert_eq!(out, 10.0);
    }

    #[test]
    fn test_table_from_rates_shares_last_updated() {
        let rates = vec![
            ExchangeRate {
                code: "USD".to_string(),
                rate: 1.0,
                last_updated: Timestamp(5),
            },
            ExchangeRate {
                code: "EUR".to_string(),
                rate: 0.9,
                last_updated: Timestamp(9),
            },
        ];
        let table = RateTable::from_rates(&rates);
        assert_eq!(table.len(), 2);
        assert_eq!(table.last_updated(), Some(Timestamp(9)));
        assert!(table.contains("EUR"));
        assert_eq!(RateTable::from_rates(&[]).last_updated(), None);
    }
}
