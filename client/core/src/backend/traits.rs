//! Ledger Service Traits
//!
//! Trait definitions for the remote ledger. The client core never stores
//! trips or expenses itself; every durable read and write goes through a
//! [`LedgerService`] handle obtained from a [`ConnectionFactory`].
//!
//! # Initialization hooks
//!
//! Some ledger deployments expect one initialization call right after an
//! authenticated handle is created, others expose none. Handles advertise
//! which [`InitHook`]s they support; the connection resolver probes them in
//! [`InitHook::PRIORITY`] order and invokes the first one present.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::identity::IdentityScope;
use crate::models::{
    CategoryTotal, ExchangeRate, Expense, ExpenseDraft, ExpenseId, Timestamp, Trip, TripDraft,
    TripId, TripSummary,
};

/// Post-authentication initialization capabilities a handle may advertise
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InitHook {
    /// Register the caller with the service's access control
    InitializeAccessControl,
    /// Same, presenting an admin secret
    InitializeAccessControlWithSecret,
}

impl InitHook {
    /// Probe order; the first advertised hook wins
    pub const PRIORITY: [InitHook; 2] = [
        InitHook::InitializeAccessControl,
        InitHook::InitializeAccessControlWithSecret,
    ];

    /// Remote method name
    #[must_use]
    pub fn method_name(self) -> &'static str {
        match self {
            Self::InitializeAccessControl => "initializeAccessControl",
            Self::InitializeAccessControlWithSecret => "_initializeAccessControlWithSecret",
        }
    }

    /// Parse a remote method name
    #[must_use]
    pub fn from_method_name(name: &str) -> Option<Self> {
        Self::PRIORITY.into_iter().find(|h| h.method_name() == name)
    }

    /// First hook in priority order that `handle` supports
    #[must_use]
    pub fn probe(handle: &dyn LedgerService) -> Option<Self> {
        Self::PRIORITY.into_iter().find(|h| handle.supports(*h))
    }
}

impl std::fmt::Display for InitHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.method_name())
    }
}

/// Authenticated channel to the remote ledger
///
/// Every method may fail with a generic remote error. Implementations are
/// bound to one identity for their whole lifetime.
#[async_trait]
pub trait LedgerService: Send + Sync {
    /// Transport name (e.g. "in-memory", "http")
    fn name(&self) -> &str;

    /// Whether this handle advertises `hook`
    fn supports(&self, _hook: InitHook) -> bool {
        false
    }

    /// Invoke an advertised initialization hook
    ///
    /// `secret` is passed to hooks that take one and ignored otherwise.
    async fn initialize(&self, hook: InitHook, _secret: &str) -> anyhow::Result<()> {
        anyhow::bail!("{} does not support {hook}", self.name())
    }

    // Trips

    /// All trips of the caller
    async fn get_all_trips(&self) -> anyhow::Result<Vec<Trip>>;

    /// The caller's active trip, if any
    async fn get_active_trip(&self) -> anyhow::Result<Option<Trip>>;

    /// One trip by id
    async fn get_trip(&self, id: TripId) -> anyhow::Result<Option<Trip>>;

    /// Create a trip; returns its id
    async fn create_trip(&self, draft: &TripDraft) -> anyhow::Result<TripId>;

    /// Replace a trip's editable fields
    async fn update_trip(&self, id: TripId, draft: &TripDraft) -> anyhow::Result<Trip>;

    /// Delete a trip and its expenses
    async fn delete_trip(&self, id: TripId) -> anyhow::Result<bool>;

    /// Make `id` the caller's only active trip
    async fn set_active_trip(&self, id: TripId) -> anyhow::Result<Trip>;

    // Expenses

    /// Expenses recorded against a trip
    async fn get_expenses_for_trip(&self, trip_id: TripId) -> anyhow::Result<Vec<Expense>>;

    /// One expense by id
    async fn get_expense(&self, id: ExpenseId) -> anyhow::Result<Option<Expense>>;

    /// Record an expense; the service snapshots the converted amount
    async fn add_expense(&self, trip_id: TripId, draft: &ExpenseDraft)
        -> anyhow::Result<ExpenseId>;

    /// Replace an expense's editable fields
    async fn update_expense(&self, id: ExpenseId, draft: &ExpenseDraft) -> anyhow::Result<Expense>;

    /// Delete an expense
    async fn delete_expense(&self, id: ExpenseId) -> anyhow::Result<bool>;

    /// Converted totals per category
    async fn get_expenses_by_category(&self, trip_id: TripId)
        -> anyhow::Result<Vec<CategoryTotal>>;

    /// Aggregate figures for a trip
    async fn get_trip_summary(&self, trip_id: TripId) -> anyhow::Result<TripSummary>;

    // Exchange rates

    /// Current USD-pivot rate table
    async fn get_exchange_rates(&self) -> anyhow::Result<Vec<ExchangeRate>>;

    /// Ask the service to pull fresh rates from its provider
    async fn fetch_and_store_exchange_rates(&self) -> anyhow::Result<bool>;

    /// When rates were last stored (zero if never)
    async fn get_last_rate_update(&self) -> anyhow::Result<Timestamp>;

    /// Store rates supplied by the caller
    async fn update_exchange_rates(&self, rates: &[(String, f64)]) -> anyhow::Result<bool>;

    // API key

    /// The caller's rate-provider API key
    async fn get_api_key(&self) -> anyhow::Result<Option<String>>;

    /// Store the caller's API key
    async fn set_api_key(&self, key: &str) -> anyhow::Result<bool>;

    /// Remove the caller's API key
    async fn delete_api_key(&self) -> anyhow::Result<bool>;

    /// Whether expense entry is enabled for the caller
    async fn get_expenses_enabled(&self) -> anyhow::Result<bool>;

    /// Currencies the service has rates for
    async fn get_available_currencies(&self) -> anyhow::Result<Vec<String>>;
}

/// Creates ledger handles bound to an identity
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    /// Open a handle for `identity`
    async fn connect(&self, identity: &IdentityScope) -> anyhow::Result<Arc<dyn LedgerService>>;
}
