//! Currency display
//!
//! Renders amounts the way US-English locale currency formatting does: a
//! symbol (or the ISO code followed by a non-breaking space when the locale
//! has no symbol), comma grouping and exactly two fraction digits.

/// Non-breaking space the locale puts between an ISO code and the digits
const CODE_SEPARATOR: char = '\u{a0}';

/// Largest magnitude formatted with grouping; beyond this cents lose precision
const MAX_GROUPED_AMOUNT: f64 = 9.0e15;

/// US-English display symbols; codes not listed here are shown as the code
const SYMBOLS: &[(&str, &str)] = &[
    ("AUD", "A$"),
    ("BRL", "R$"),
    ("CAD", "CA$"),
    ("CNY", "CN¥"),
    ("EUR", "€"),
    ("GBP", "£"),
    ("HKD", "HK$"),
    ("ILS", "₪"),
    ("INR", "₹"),
    ("JPY", "¥"),
    ("KRW", "₩"),
    ("MXN", "MX$"),
    ("NZD", "NZ$"),
    ("PHP", "₱"),
    ("TWD", "NT$"),
    ("USD", "$"),
    ("VND", "₫"),
    ("XAF", "FCFA"),
    ("XOF", "F\u{202f}CFA"),
];

/// Uppercased ISO code, if `code` is three ASCII letters
fn normalize(code: &str) -> Option<String> {
    (code.len() == 3 && code.bytes().all(|b| b.is_ascii_alphabetic()))
        .then(|| code.to_ascii_uppercase())
}

fn symbol_for(code: &str) -> Option<&'static str> {
    SYMBOLS
        .binary_search_by(|(c, _)| (*c).cmp(code))
        .ok()
        .map(|i| SYMBOLS[i].1)
}

/// Whether `code` is a well-formed currency code (any letter case)
#[must_use]
pub fn is_known_currency(code: &str) -> bool {
    normalize(code).is_some()
}

/// Display prefix for a well-formed code: its symbol, or the uppercased code
#[must_use]
pub fn currency_symbol(code: &str) -> Option<String> {
    let code = normalize(code)?;
    Some(symbol_for(&code).map_or(code, ToString::to_string))
}

/// Format `amount` in `currency` with exactly two fraction digits
///
/// Malformed codes fall back to `"<CODE> <amount>"` with two decimals and
/// no grouping. Never panics.
#[must_use]
pub fn format_currency(amount: f64, currency: &str) -> String {
    let Some(code) = normalize(currency) else {
        return fallback(amount, currency);
    };
    let Some(digits) = grouped_digits(amount) else {
        return fallback(amount, currency);
    };

    let sign = if amount < 0.0 && digits != "0.00" { "-" } else { "" };
    match symbol_for(&code) {
        Some(symbol) => format!("{sign}{symbol}{digits}"),
        None => format!("{sign}{code}{CODE_SEPARATOR}{digits}"),
    }
}

fn fallback(amount: f64, currency: &str) -> String {
    format!("{currency} {amount:.2}")
}

/// `1234.5` -> `1,234.50`; `None` for non-finite or huge magnitudes
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn grouped_digits(amount: f64) -> Option<String> {
    let magnitude = amount.abs();
    if !magnitude.is_finite() || magnitude >= MAX_GROUPED_AMOUNT {
        return None;
    }

    let cents = (magnitude * 100.0).round() as u64;
    let whole = (cents / 100).to_string();
    let fraction = cents % 100;

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3 + 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    Some(format!("{grouped}.{fraction:02}"))
}
