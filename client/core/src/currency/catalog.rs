//! Currency lists offered when picking a trip or expense currency

/// Shown first, in this order, whenever a currency list is presented
pub const PRIORITY_CURRENCIES: [&str; 10] = [
    "USD", "EUR", "GBP", "JPY", "AUD", "CAD", "CHF", "CNY", "INR", "MXN",
];

/// Fallback list used when the ledger reports no currencies
pub const POPULAR_CURRENCIES: [&str; 34] = [
    "USD", "EUR", "GBP", "JPY", "AUD", "CAD", "CHF", "CNY", "INR", "MXN", "SGD", "HKD", "KRW",
    "THB", "NZD", "AED", "ZAR", "SEK", "NOK", "DKK", "PLN", "CZK", "HUF", "TRY", "BRL", "ARS",
    "COP", "PEN", "CLP", "PHP", "MYR", "IDR", "VND", "TWD",
];

/// Currency list ready for display
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AvailableCurrencies {
    /// Codes in display order
    pub currencies: Vec<String>,
    /// Whether the list came from the ledger rather than the fallback
    pub from_service: bool,
}

/// Sort priority currencies first (in priority order), the rest alphabetically
#[must_use]
pub fn sort_currencies(currencies: &[String]) -> Vec<String> {
    let rank = |code: &str| PRIORITY_CURRENCIES.iter().position(|p| *p == code);
    let mut sorted = currencies.to_vec();
    sorted.sort_by(|a, b| match (rank(a), rank(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.cmp(b),
    });
    sorted
}

fn popular_currencies() -> Vec<String> {
    POPULAR_CURRENCIES.iter().map(ToString::to_string).collect()
}

/// Sorted ledger list, or the sorted popular list when the ledger returned nothing
#[must_use]
pub fn resolve_available_currencies(remote: &[String]) -> AvailableCurrencies {
    if remote.is_empty() {
        AvailableCurrencies {
            currencies: sort_currencies(&popular_currencies()),
            from_service: false,
        }
    } else {
        AvailableCurrencies {
            currencies: sort_currencies(remote),
            from_service: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn codes(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_priority_first_then_alphabetical() {
        let sorted = sort_currencies(&codes(&["ZAR", "EUR", "AED", "USD", "MXN", "BRL"]));
        assert_eq!(sorted, codes(&["USD", "EUR", "MXN", "AED", "BRL", "ZAR"]));
    }

    #[test]
    fn test_empty_remote_falls_back() {
        let resolved = resolve_available_currencies(&[]);
        assert!(!resolved.from_service);
        assert_eq!(resolved.currencies.len(), POPULAR_CURRENCIES.len());
        assert_eq!(&resolved.currencies[..10], &codes(&PRIORITY_CURRENCIES)[..]);

        let rest = &resolved.currencies[10..];
        assert_eq!(&rest[..6], &codes(&["AED", "ARS", "BRL", "CLP", "COP", "CZK"])[..]);
        assert!(rest.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_remote_list_is_sorted() {
        let resolved = resolve_available_currencies(&codes(&["THB", "GBP"]));
        assert!(resolved.from_service);
        assert_eq!(resolved.currencies, codes(&["GBP", "THB"]));
    }

    #[test]
    fn test_popular_list_contains_priority_list() {
        for code in PRIORITY_CURRENCIES {
            assert!(POPULAR_CURRENCIES.contains(&code));
        }
    }
}
