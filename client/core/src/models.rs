//! Ledger Data Model
//!
//! Types exchanged with the remote ledger service. Field names serialize in
//! camelCase to match the service's wire shape. Timestamps are integer
//! nanoseconds since the Unix epoch, identifiers are unsigned integers and
//! amounts are decimal numbers.

use serde::{Deserialize, Serialize};

/// Nanoseconds since the Unix epoch
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Raw nanosecond value
    #[must_use]
    pub fn as_nanos(self) -> i64 {
        self.0
    }

    /// Zero means "never" on the wire
    #[must_use]
    pub fn is_unset(self) -> bool {
        self.0 == 0
    }
}

macro_rules! ledger_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u128);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u128> for $name {
            fn from(value: u128) -> Self {
                Self(value)
            }
        }
    };
}

ledger_id!(
    /// Trip identifier assigned by the ledger
    TripId
);
ledger_id!(
    /// Expense identifier assigned by the ledger
    ExpenseId
);

/// A trip with a budget in its primary currency
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trip {
    /// Ledger identifier
    pub id: TripId,
    /// Display name
    pub name: String,
    /// ISO currency code the budget is kept in
    pub primary_currency: String,
    /// Budget limit in the primary currency
    pub budget_limit: f64,
    /// Optional start instant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<Timestamp>,
    /// Optional end instant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<Timestamp>,
    /// Whether this is the identity's active trip
    pub is_active: bool,
    /// When the trip was created
    pub created_at: Timestamp,
}

/// A single expense recorded against a trip
///
/// `converted_amount` is a snapshot taken by the ledger at write time; it is
/// never recomputed when exchange rates move later.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Expense {
    /// Ledger identifier
    pub id: ExpenseId,
    /// Owning trip
    pub trip_id: TripId,
    /// Amount in the local currency
    pub amount: f64,
    /// Currency the expense was paid in
    pub local_currency: String,
    /// Amount in the trip's primary currency at write time
    pub converted_amount: f64,
    /// Rate applied at write time
    pub conversion_rate: f64,
    /// Category tag (see [`crate::categories`])
    pub category: String,
    /// Free-text note
    pub note: String,
    /// Date of the expense
    pub date: Timestamp,
    /// When the expense was recorded
    pub created_at: Timestamp,
}

/// Total spent in one category
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CategoryTotal {
    /// Category tag
    pub category: String,
    /// Sum of converted amounts
    pub total: f64,
}

impl CategoryTotal {
    /// Create a category total
    pub fn new(category: impl Into<String>, total: f64) -> Self {
        Self {
            category: category.into(),
            total,
        }
    }
}

/// Aggregate figures for a trip, computed by the ledger
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripSummary {
    /// The trip summarized
    pub trip: Trip,
    /// Total converted spend
    pub total_spent: f64,
    /// Budget left (negative when over)
    pub remaining: f64,
    /// Spend as a percentage of the budget
    pub percent_used: f64,
    /// Number of expenses
    pub expense_count: u64,
    /// Per-category totals
    pub expenses_by_category: Vec<CategoryTotal>,
}

/// Budget health bands shown on the dashboard
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BudgetStatus {
    /// At or below 80% used
    OnTrack,
    /// Above 80% and at most 100% used
    Warning,
    /// More than 100% used
    OverBudget,
}

impl BudgetStatus {
    /// Band for a percent-used figure
    #[must_use]
    pub fn from_percent_used(percent_used: f64) -> Self {
        if percent_used > 100.0 {
            Self::OverBudget
        } else if percent_used > 80.0 {
            Self::Warning
        } else {
            Self::OnTrack
        }
    }
}

impl TripSummary {
    /// Budget band for this summary
    #[must_use]
    pub fn budget_status(&self) -> BudgetStatus {
        BudgetStatus::from_percent_used(self.percent_used)
    }

    /// How far spend exceeds the budget (zero when within budget)
    #[must_use]
    pub fn over_budget_by(&self) -> f64 {
        (self.total_spent - self.trip.budget_limit).max(0.0)
    }

    /// Each category's share of total spend, in percent
    ///
    /// Categories keep the ledger's order. Shares are zero when nothing has
    /// been spent.
    #[must_use]
    pub fn category_shares(&self) -> Vec<(String, f64)> {
        self.expenses_by_category
            .iter()
            .map(|c| {
                let share = if self.total_spent > 0.0 {
                    c.total / self.total_spent * 100.0
                } else {
                    0.0
                };
                (c.category.clone(), share)
            })
            .collect()
    }
}

/// Exchange rate of one currency against the USD pivot
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeRate {
    /// ISO currency code
    pub code: String,
    /// Units of this currency per one USD
    pub rate: f64,
    /// When the table was last refreshed
    pub last_updated: Timestamp,
}

/// Fields for creating or updating a trip
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripDraft {
    /// Display name
    pub name: String,
    /// Primary currency code
    pub primary_currency: String,
    /// Budget limit in the primary currency
    pub budget_limit: f64,
    /// Optional start instant
    pub start_date: Option<Timestamp>,
    /// Optional end instant
    pub end_date: Option<Timestamp>,
}

impl TripDraft {
    /// Draft without dates
    pub fn new(name: impl Into<String>, primary_currency: impl Into<String>, budget_limit: f64) -> Self {
        Self {
            name: name.into(),
            primary_currency: primary_currency.into(),
            budget_limit,
            start_date: None,
            end_date: None,
        }
    }

    /// Set the date range
    #[must_use]
    pub fn with_dates(mut self, start: Option<Timestamp>, end: Option<Timestamp>) -> Self {
        self.start_date = start;
        self.end_date = end;
        self
    }
}

/// Fields for adding or updating an expense
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseDraft {
    /// Amount in the local currency
    pub amount: f64,
    /// Currency the expense was paid in
    pub local_currency: String,
    /// Category tag
    pub category: String,
    /// Free-text note
    pub note: String,
    /// Date of the expense
    pub date: Timestamp,
}

impl ExpenseDraft {
    /// Draft with an empty note
    pub fn new(
        amount: f64,
        local_currency: impl Into<String>,
        category: impl Into<String>,
        date: Timestamp,
    ) -> Self {
        Self {
            amount,
            local_currency: local_currency.into(),
            category: category.into(),
            note: String::new(),
            date,
        }
    }

    /// Attach a note
    #[must_use]
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = note.into();
        self
    }
}
