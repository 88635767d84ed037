//! Currency Conversion and Formatting
//!
//! All rates are quoted against a single pivot currency (USD). Converting
//! between two currencies divides by the source rate and multiplies by the
//! target rate, which routes the conversion through the pivot implicitly.
//!
//! # Usage
//!
//! ```
//! use tripwise_core::currency::{convert, format_currency, RateTable};
//!
//! let rates = RateTable::from_pairs([("EUR", 2.0), ("GBP", 4.0)]);
//! assert_eq!(convert(100.0, "EUR", "GBP", &rates), 200.0);
//! assert_eq!(format_currency(1234.5, "USD"), "$1,234.50");
//! ```

mod catalog;
mod convert;
mod format;

pub use catalog::{
    resolve_available_currencies, sort_currencies, AvailableCurrencies, POPULAR_CURRENCIES,
    PRIORITY_CURRENCIES,
};
pub use convert::{convert, RateTable, PIVOT_CURRENCY};
pub use format::{currency_symbol, format_currency, is_known_currency};
