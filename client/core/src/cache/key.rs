//! Cache keys
//!
//! A key is a resource family followed by at most one scoping value. Keys
//! are compared structurally, so two families can never collide the way
//! ad-hoc string tuples can.

use std::fmt;

use crate::identity::IdentityScope;
use crate::models::{ExpenseId, TripId};

/// Resource name component of a cache key
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum KeyFamily {
    /// The connection handle itself
    Connection,
    /// All trips of the caller
    Trips,
    /// The caller's active trip
    ActiveTrip,
    /// One trip by id
    Trip,
    /// Expenses of a trip
    Expenses,
    /// One expense by id
    Expense,
    /// Per-category totals of a trip
    ExpensesByCategory,
    /// Aggregates of a trip
    TripSummary,
    /// The rate table
    ExchangeRates,
    /// When rates were last stored
    LastRateUpdate,
    /// The caller's API key
    ApiKey,
    /// Whether expense entry is enabled
    ExpensesEnabled,
    /// Currencies with rates
    AvailableCurrencies,
}

impl KeyFamily {
    /// Every family, connection first
    pub const ALL: [KeyFamily; 13] = [
        KeyFamily::Connection,
        KeyFamily::Trips,
        KeyFamily::ActiveTrip,
        KeyFamily::Trip,
        KeyFamily::Expenses,
        KeyFamily::Expense,
        KeyFamily::ExpensesByCategory,
        KeyFamily::TripSummary,
        KeyFamily::ExchangeRates,
        KeyFamily::LastRateUpdate,
        KeyFamily::ApiKey,
        KeyFamily::ExpensesEnabled,
        KeyFamily::AvailableCurrencies,
    ];

    /// Stable name used in logs
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connection => "actor",
            Self::Trips => "trips",
            Self::ActiveTrip => "activeTrip",
            Self::Trip => "trip",
            Self::Expenses => "expenses",
            Self::Expense => "expense",
            Self::ExpensesByCategory => "expensesByCategory",
            Self::TripSummary => "tripSummary",
            Self::ExchangeRates => "exchangeRates",
            Self::LastRateUpdate => "lastRateUpdate",
            Self::ApiKey => "apiKey",
            Self::ExpensesEnabled => "expensesEnabled",
            Self::AvailableCurrencies => "availableCurrencies",
        }
    }
}

impl fmt::Display for KeyFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scoping component of a cache key
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ScopeValue {
    /// Scoped to an identity
    Identity(IdentityScope),
    /// Scoped to a trip
    Trip(TripId),
    /// Scoped to an expense
    Expense(ExpenseId),
}

impl fmt::Display for ScopeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identity(scope) => write!(f, "{scope}"),
            Self::Trip(id) => write!(f, "{id}"),
            Self::Expense(id) => write!(f, "{id}"),
        }
    }
}

/// Family plus optional scope
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    family: KeyFamily,
    scope: Option<ScopeValue>,
}

impl CacheKey {
    /// Key with no scope; also usable as a prefix matching the whole family
    #[must_use]
    pub fn family_prefix(family: KeyFamily) -> Self {
        Self {
            family,
            scope: None,
        }
    }

    /// Key with no scope
    #[must_use]
    pub fn global(family: KeyFamily) -> Self {
        Self::family_prefix(family)
    }

    /// Key scoped to an identity
    #[must_use]
    pub fn identity(family: KeyFamily, scope: &IdentityScope) -> Self {
        Self {
            family,
            scope: Some(ScopeValue::Identity(scope.clone())),
        }
    }

    /// Key scoped to a trip
    #[must_use]
    pub fn trip(family: KeyFamily, id: TripId) -> Self {
        Self {
            family,
            scope: Some(ScopeValue::Trip(id)),
        }
    }

    /// Key scoped to an expense
    #[must_use]
    pub fn expense(family: KeyFamily, id: ExpenseId) -> Self {
        Self {
            family,
            scope: Some(ScopeValue::Expense(id)),
        }
    }

    /// Resource family
    #[must_use]
    pub fn family(&self) -> KeyFamily {
        self.family
    }

    /// Scoping value, if any
    #[must_use]
    pub fn scope(&self) -> Option<&ScopeValue> {
        self.scope.as_ref()
    }

    /// Whether `prefix` is a prefix of this key
    ///
    /// An unscoped prefix matches every key of its family.
    #[must_use]
    pub fn starts_with(&self, prefix: &CacheKey) -> bool {
        self.family == prefix.family
            && match &prefix.scope {
                None => true,
                Some(scope) => self.scope.as_ref() == Some(scope),
            }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scope {
            Some(scope) => write!(f, "[{}, {scope}]", self.family),
            None => write!(f, "[{}]", self.family),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Principal;

    #[test]
    fn test_family_prefix_matches_all_scopes() {
        let prefix = CacheKey::family_prefix(KeyFamily::Expenses);
        assert!(CacheKey::trip(KeyFamily::Expenses, TripId(1)).starts_with(&prefix));
        assert!(CacheKey::trip(KeyFamily::Expenses, TripId(2)).starts_with(&prefix));
        assert!(!CacheKey::trip(KeyFamily::TripSummary, TripId(1)).starts_with(&prefix));
    }

    #[test]
    fn test_scoped_prefix_matches_exactly() {
        let alice = IdentityScope::Principal(Principal::new("alice"));
        let prefix = CacheKey::identity(KeyFamily::Trips, &alice);
        assert!(CacheKey::identity(KeyFamily::Trips, &alice).starts_with(&prefix));
        assert!(!CacheKey::identity(KeyFamily::Trips, &IdentityScope::Anonymous).starts_with(&prefix));
        assert!(!CacheKey::global(KeyFamily::Trips).starts_with(&prefix));
    }

    #[test]
    fn test_display() {
        assert_eq!(CacheKey::trip(KeyFamily::TripSummary, TripId(7)).to_string(), "[tripSummary, 7]");
        assert_eq!(CacheKey::global(KeyFamily::ExchangeRates).to_string(), "[exchangeRates]");
    }

    #[test]
    fn test_family_names_are_unique() {
        let mut names: Vec<&str> = KeyFamily::ALL.iter().map(|f| f.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), KeyFamily::ALL.len());
    }
}
