//! In-memory ledger
//!
//! A self-contained [`LedgerService`] used by the headless binary and by
//! tests. Data is partitioned per principal the way the real service does it;
//! exchange rates are shared by everyone.
//!
//! Besides the service contract it records every call and can inject
//! failures or hold a method open until released, which is what tests use to
//! observe de-duplication and one-shot behavior.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use anyhow::{anyhow, bail};
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;

use super::traits::{ConnectionFactory, InitHook, LedgerService};
use crate::currency::{convert, RateTable};
use crate::identity::{IdentityScope, Principal};
use crate::models::{
    CategoryTotal, ExchangeRate, Expense, ExpenseDraft, ExpenseId, Timestamp, Trip, TripDraft,
    TripId, TripSummary,
};

/// Rates installed by `fetchAndStoreExchangeRates` unless overridden
pub const DEFAULT_RATE_SOURCE: &[(&str, f64)] = &[
    ("USD", 1.0),
    ("EUR", 0.92),
    ("GBP", 0.79),
    ("JPY", 151.5),
    ("AUD", 1.52),
    ("CAD", 1.36),
    ("CHF", 0.88),
    ("CNY", 7.23),
    ("INR", 83.4),
    ("MXN", 16.9),
    ("SGD", 1.35),
    ("THB", 36.4),
];

/// Method name used when recording `connect` calls
pub const CONNECT: &str = "connect";

/// One recorded call
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallRecord {
    /// Remote method name
    pub method: &'static str,
    /// Identity the handle was bound to
    pub scope: IdentityScope,
}

#[derive(Default)]
struct Account {
    trips: Vec<Trip>,
    expenses: Vec<Expense>,
    api_key: Option<String>,
}

struct LedgerState {
    next_id: u128,
    accounts: HashMap<Principal, Account>,
    rates: BTreeMap<String, f64>,
    last_rate_update: Timestamp,
    rate_source: Vec<(String, f64)>,
    hooks: Vec<InitHook>,
    init_calls: Vec<(IdentityScope, InitHook)>,
    calls: Vec<CallRecord>,
    failures: HashMap<&'static str, VecDeque<String>>,
    gates: HashMap<&'static str, watch::Receiver<bool>>,
}

impl Default for LedgerState {
    fn default() -> Self {
        Self {
            next_id: 1,
            accounts: HashMap::new(),
            rates: BTreeMap::new(),
            last_rate_update: Timestamp::default(),
            rate_source: DEFAULT_RATE_SOURCE
                .iter()
                .map(|(c, r)| ((*c).to_string(), *r))
                .collect(),
            hooks: Vec::new(),
            init_calls: Vec::new(),
            calls: Vec::new(),
            failures: HashMap::new(),
            gates: HashMap::new(),
        }
    }
}

impl LedgerState {
    fn allocate_id(&mut self) -> u128 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn account(&mut self, scope: &IdentityScope) -> anyhow::Result<&mut Account> {
        match scope.principal() {
            Some(p) => Ok(self.accounts.entry(p.clone()).or_default()),
            None => bail!("Unauthorized: anonymous caller"),
        }
    }

    fn rate_table(&self) -> RateTable {
        RateTable::from_pairs(self.rates.iter().map(|(c, r)| (c.clone(), *r)))
    }
}

/// Shared in-memory ledger; cloning shares the same data
#[derive(Clone, Default)]
pub struct InMemoryLedger {
    state: Arc<Mutex<LedgerState>>,
}

/// Holds calls to one method until [`Gate::open`] is called
pub struct Gate {
    method: &'static str,
    tx: watch::Sender<bool>,
    ledger: InMemoryLedger,
}

impl Gate {
    /// Let held and future calls proceed
    pub fn open(self) {
        self.ledger.state.lock().gates.remove(self.method);
        self.tx.send_replace(true);
    }
}

impl InMemoryLedger {
    /// Empty ledger with the default rate source and no init hooks
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Advertise initialization hooks on every handle
    #[must_use]
    pub fn with_init_hooks(self, hooks: &[InitHook]) -> Self {
        self.state.lock().hooks = hooks.to_vec();
        self
    }

    /// Replace the rates `fetchAndStoreExchangeRates` installs
    #[must_use]
    pub fn with_rate_source(self, rates: &[(&str, f64)]) -> Self {
        self.state.lock().rate_source = rates.iter().map(|(c, r)| ((*c).to_string(), *r)).collect();
        self
    }

    /// Install a rate table as if it had been fetched at `at`
    pub fn seed_rates(&self, rates: &[(&str, f64)], at: Timestamp) {
        let mut state = self.state.lock();
        state.rates = rates.iter().map(|(c, r)| ((*c).to_string(), *r)).collect();
        state.last_rate_update = at;
    }

    /// Create a trip for `principal` directly
    pub fn seed_trip(&self, principal: &Principal, draft: &TripDraft) -> TripId {
        let mut state = self.state.lock();
        let id = TripId(state.allocate_id());
        let trip = new_trip(id, draft);
        state.accounts.entry(principal.clone()).or_default().trips.push(trip);
        id
    }

    /// Store an API key for `principal` directly
    pub fn seed_api_key(&self, principal: &Principal, key: &str) {
        self.state
            .lock()
            .accounts
            .entry(principal.clone())
            .or_default()
            .api_key = Some(key.to_string());
    }

    /// Make the next call to `method` fail with `message`
    pub fn fail_next(&self, method: &'static str, message: &str) {
        self.state
            .lock()
            .failures
            .entry(method)
            .or_default()
            .push_back(message.to_string());
    }

    /// Hold every call to `method` until the returned gate is opened
    #[must_use]
    pub fn pause(&self, method: &'static str) -> Gate {
        let (tx, rx) = watch::channel(false);
        self.state.lock().gates.insert(method, rx);
        Gate {
            method,
            tx,
            ledger: self.clone(),
        }
    }

    /// Number of calls made to `method` by any handle
    #[must_use]
    pub fn calls(&self, method: &str) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| c.method == method)
            .count()
    }

    /// Every recorded call, oldest first
    #[must_use]
    pub fn call_log(&self) -> Vec<CallRecord> {
        self.state.lock().calls.clone()
    }

    /// Initialization hooks invoked so far
    #[must_use]
    pub fn init_calls(&self) -> Vec<(IdentityScope, InitHook)> {
        self.state.lock().init_calls.clone()
    }

    /// Open a handle without going through the factory bookkeeping
    #[must_use]
    pub fn handle(&self, scope: IdentityScope) -> InMemoryHandle {
        InMemoryHandle {
            ledger: self.clone(),
            scope,
        }
    }

    async fn enter(&self, scope: &IdentityScope, method: &'static str) -> anyhow::Result<()> {
        let gate = {
            let mut state = self.state.lock();
            state.calls.push(CallRecord {
                method,
                scope: scope.clone(),
            });
            state.gates.get(method).cloned()
        };

        if let Some(mut gate) = gate {
            // A dropped gate counts as opened.
            let _ = gate.wait_for(|open| *open).await;
        }

        let failure = self
            .state
            .lock()
            .failures
            .get_mut(method)
            .and_then(VecDeque::pop_front);
        match failure {
            Some(message) => Err(anyhow!(message)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ConnectionFactory for InMemoryLedger {
    async fn connect(&self, identity: &IdentityScope) -> anyhow::Result<Arc<dyn LedgerService>> {
        self.enter(identity, CONNECT).await?;
        Ok(Arc::new(self.handle(identity.clone())))
    }
}

/// Handle bound to one identity
pub struct InMemoryHandle {
    ledger: InMemoryLedger,
    scope: IdentityScope,
}

fn new_trip(id: TripId, draft: &TripDraft) -> Trip {
    Trip {
        id,
        name: draft.name.clone(),
        primary_currency: draft.primary_currency.clone(),
        budget_limit: draft.budget_limit,
        start_date: draft.start_date,
        end_date: draft.end_date,
        is_active: false,
        created_at: Timestamp::now(),
    }
}

fn category_totals(expenses: &[&Expense]) -> Vec<CategoryTotal> {
    let mut totals: Vec<CategoryTotal> = Vec::new();
    for expense in expenses {
        match totals.iter_mut().find(|t| t.category == expense.category) {
            Some(total) => total.total += expense.converted_amount,
            None => totals.push(CategoryTotal::new(
                expense.category.clone(),
                expense.converted_amount,
            )),
        }
    }
    totals
}

impl InMemoryHandle {
    async fn enter(&self, method: &'static str) -> anyhow::Result<()> {
        self.ledger.enter(&self.scope, method).await
    }

    fn with_account<T>(
        &self,
        f: impl FnOnce(&mut Account, &RateTable) -> anyhow::Result<T>,
    ) -> anyhow::Result<T> {
        let mut state = self.ledger.state.lock();
        let rates = state.rate_table();
        let account = state.account(&self.scope)?;
        f(account, &rates)
    }
}

#[async_trait]
impl LedgerService for InMemoryHandle {
    fn name(&self) -> &str {
        "in-memory"
    }

    fn supports(&self, hook: InitHook) -> bool {
        self.ledger.state.lock().hooks.contains(&hook)
    }

    async fn initialize(&self, hook: InitHook, _secret: &str) -> anyhow::Result<()> {
        self.enter(hook.method_name()).await?;
        let mut state = self.ledger.state.lock();
        if !state.hooks.contains(&hook) {
            bail!("in-memory ledger does not support {hook}");
        }
        state.init_calls.push((self.scope.clone(), hook));
        Ok(())
    }

    async fn get_all_trips(&self) -> anyhow::Result<Vec<Trip>> {
        self.enter("getAllTrips").await?;
        self.with_account(|a, _| Ok(a.trips.clone()))
    }

    async fn get_active_trip(&self) -> anyhow::Result<Option<Trip>> {
        self.enter("getActiveTrip").await?;
        self.with_account(|a, _| Ok(a.trips.iter().find(|t| t.is_active).cloned()))
    }

    async fn get_trip(&self, id: TripId) -> anyhow::Result<Option<Trip>> {
        self.enter("getTrip").await?;
        self.with_account(|a, _| Ok(a.trips.iter().find(|t| t.id == id).cloned()))
    }

    async fn create_trip(&self, draft: &TripDraft) -> anyhow::Result<TripId> {
        self.enter("createTrip").await?;
        let mut state = self.ledger.state.lock();
        let id = TripId(state.allocate_id());
        state.account(&self.scope)?.trips.push(new_trip(id, draft));
        Ok(id)
    }

    async fn update_trip(&self, id: TripId, draft: &TripDraft) -> anyhow::Result<Trip> {
        self.enter("updateTrip").await?;
        self.with_account(|a, _| {
            let trip = a
                .trips
                .iter_mut()
                .find(|t| t.id == id)
                .ok_or_else(|| anyhow!("Trip {id} not found"))?;
            trip.name.clone_from(&draft.name);
            trip.primary_currency.clone_from(&draft.primary_currency);
            trip.budget_limit = draft.budget_limit;
            trip.start_date = draft.start_date;
            trip.end_date = draft.end_date;
            Ok(trip.clone())
        })
    }

    async fn delete_trip(&self, id: TripId) -> anyhow::Result<bool> {
        self.enter("deleteTrip").await?;
        self.with_account(|a, _| {
            let before = a.trips.len();
            a.trips.retain(|t| t.id != id);
            a.expenses.retain(|e| e.trip_id != id);
            Ok(a.trips.len() != before)
        })
    }

    async fn set_active_trip(&self, id: TripId) -> anyhow::Result<Trip> {
        self.enter("setActiveTrip").await?;
        self.with_account(|a, _| {
            if !a.trips.iter().any(|t| t.id == id) {
                bail!("Trip {id} not found");
            }
            for trip in &mut a.trips {
                trip.is_active = trip.id == id;
            }
            a.trips
                .iter()
                .find(|t| t.id == id)
                .cloned()
                .ok_or_else(|| anyhow!("Trip {id} not found"))
        })
    }

    async fn get_expenses_for_trip(&self, trip_id: TripId) -> anyhow::Result<Vec<Expense>> {
        self.enter("getExpensesForTrip").await?;
        self.with_account(|a, _| {
            Ok(a.expenses
                .iter()
                .filter(|e| e.trip_id == trip_id)
                .cloned()
                .collect())
        })
    }

    async fn get_expense(&self, id: ExpenseId) -> anyhow::Result<Option<Expense>> {
        self.enter("getExpense").await?;
        self.with_account(|a, _| Ok(a.expenses.iter().find(|e| e.id == id).cloned()))
    }

    async fn add_expense(
        &self,
        trip_id: TripId,
        draft: &ExpenseDraft,
    ) -> anyhow::Result<ExpenseId> {
        self.enter("addExpense").await?;
        let mut state = self.ledger.state.lock();
        let id = ExpenseId(state.allocate_id());
        let rates = state.rate_table();
        let account = state.account(&self.scope)?;
        let trip = account
            .trips
            .iter()
            .find(|t| t.id == trip_id)
            .ok_or_else(|| anyhow!("Trip {trip_id} not found"))?;
        let expense = snapshot_expense(id, trip, draft, &rates);
        account.expenses.push(expense);
        Ok(id)
    }

    async fn update_expense(&self, id: ExpenseId, draft: &ExpenseDraft) -> anyhow::Result<Expense> {
        self.enter("updateExpense").await?;
        self.with_account(|a, rates| {
            let index = a
                .expenses
                .iter()
                .position(|e| e.id == id)
                .ok_or_else(|| anyhow!("Expense {id} not found"))?;
            let existing = &a.expenses[index];
            let trip = a
                .trips
                .iter()
                .find(|t| t.id == existing.trip_id)
                .ok_or_else(|| anyhow!("Trip {} not found", existing.trip_id))?;
            let mut updated = snapshot_expense(id, trip, draft, rates);
            updated.created_at = existing.created_at;
            a.expenses[index] = updated.clone();
            Ok(updated)
        })
    }

    async fn delete_expense(&self, id: ExpenseId) -> anyhow::Result<bool> {
        self.enter("deleteExpense").await?;
        self.with_account(|a, _| {
            let before = a.expenses.len();
            a.expenses.retain(|e| e.id != id);
            Ok(a.expenses.len() != before)
        })
    }

    async fn get_expenses_by_category(
        &self,
        trip_id: TripId,
    ) -> anyhow::Result<Vec<CategoryTotal>> {
        self.enter("getExpensesByCategory").await?;
        self.with_account(|a, _| {
            let expenses: Vec<&Expense> =
                a.expenses.iter().filter(|e| e.trip_id == trip_id).collect();
            Ok(category_totals(&expenses))
        })
    }

    async fn get_trip_summary(&self, trip_id: TripId) -> anyhow::Result<TripSummary> {
        self.enter("getTripSummary").await?;
        self.with_account(|a, _| {
            let trip = a
                .trips
                .iter()
                .find(|t| t.id == trip_id)
                .cloned()
                .ok_or_else(|| anyhow!("Trip {trip_id} not found"))?;
            let expenses: Vec<&Expense> =
                a.expenses.iter().filter(|e| e.trip_id == trip_id).collect();
            let total_spent: f64 = expenses.iter().map(|e| e.converted_amount).sum();
            let percent_used = if trip.budget_limit > 0.0 {
                total_spent / trip.budget_limit * 100.0
            } else {
                0.0
            };
            Ok(TripSummary {
                remaining: trip.budget_limit - total_spent,
                total_spent,
                percent_used,
                expense_count: expenses.len() as u64,
                expenses_by_category: category_totals(&expenses),
                trip,
            })
        })
    }

    async fn get_exchange_rates(&self) -> anyhow::Result<Vec<ExchangeRate>> {
        self.enter("getExchangeRates").await?;
        let state = self.ledger.state.lock();
        Ok(state
            .rates
            .iter()
            .map(|(code, rate)| ExchangeRate {
                code: code.clone(),
                rate: *rate,
                last_updated: state.last_rate_update,
            })
            .collect())
    }

    async fn fetch_and_store_exchange_rates(&self) -> anyhow::Result<bool> {
        self.enter("fetchAndStoreExchangeRates").await?;
        let mut state = self.ledger.state.lock();
        if state.account(&self.scope)?.api_key.is_none() {
            bail!("No API key configured");
        }
        state.rates = state.rate_source.iter().cloned().collect();
        state.last_rate_update = Timestamp::now();
        Ok(true)
    }

    async fn get_last_rate_update(&self) -> anyhow::Result<Timestamp> {
        self.enter("getLastRateUpdate").await?;
        Ok(self.ledger.state.lock().last_rate_update)
    }

    async fn update_exchange_rates(&self, rates: &[(String, f64)]) -> anyhow::Result<bool> {
        self.enter("updateExchangeRates").await?;
        let mut state = self.ledger.state.lock();
        for (code, rate) in rates {
            state.rates.insert(code.clone(), *rate);
        }
        state.last_rate_update = Timestamp::now();
        Ok(true)
    }

    async fn get_api_key(&self) -> anyhow::Result<Option<String>> {
        self.enter("getApiKey").await?;
        self.with_account(|a, _| Ok(a.api_key.clone()))
    }

    async fn set_api_key(&self, key: &str) -> anyhow::Result<bool> {
        self.enter("setApiKey").await?;
        if key.trim().is_empty() {
            bail!("API key must not be empty");
        }
        self.with_account(|a, _| {
            a.api_key = Some(key.to_string());
            Ok(true)
        })
    }

    async fn delete_api_key(&self) -> anyhow::Result<bool> {
        self.enter("deleteApiKey").await?;
        self.with_account(|a, _| Ok(a.api_key.take().is_some()))
    }

    async fn get_expenses_enabled(&self) -> anyhow::Result<bool> {
        self.enter("getExpensesEnabled").await?;
        self.with_account(|a, rates| Ok(a.api_key.is_some() && !rates.is_empty()))
    }

    async fn get_available_currencies(&self) -> anyhow::Result<Vec<String>> {
        self.enter("getAvailableCurrencies").await?;
        Ok(self.ledger.state.lock().rates.keys().cloned().collect())
    }
}

/// Build an expense, snapshotting the conversion at the current rates
fn snapshot_expense(id: ExpenseId, trip: &Trip, draft: &ExpenseDraft, rates: &RateTable) -> Expense {
    let to = trip.primary_currency.as_str();
    let from = draft.local_currency.as_str();
    let conversion_rate = if from == to {
        1.0
    } else {
        rates.rate(to) / rates.rate(from)
    };
    Expense {
        id,
        trip_id: trip.id,
        amount: draft.amount,
        local_currency: draft.local_currency.clone(),
        converted_amount: convert(draft.amount, from, to, rates),
        conversion_rate,
        category: draft.category.clone(),
        note: draft.note.clone(),
        date: draft.date,
        created_at: Timestamp::now(),
    }
}
