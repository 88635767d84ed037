//! Data-Access Layer
//!
//! Typed reads and writes over the ledger handle.
//!
//! Reads go through the query cache. While no handle is available, or the
//! handle itself is being fetched, reads answer with a neutral value (empty
//! list, `None`, `false`, zero) instead of an error.
//!
//! Writes fail fast with [`ClientError::NotAvailable`] when there is no
//! handle. On success each write invalidates the key families listed in
//! [`Mutation::invalidates`], unless the identity changed while the call was
//! in flight.

use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};

use crate::cache::{CacheKey, KeyFamily, Observer, QueryCache, QueryState};
use crate::connection::{ConnectionResolver, Handle};
use crate::currency::{resolve_available_currencies, AvailableCurrencies, RateTable};
use crate::error::{ClientError, ClientResult};
use crate::identity::IdentityScope;
use crate::models::{
    CategoryTotal, ExchangeRate, Expense, ExpenseDraft, ExpenseId, Timestamp, Trip, TripDraft,
    TripId, TripSummary,
};

/// Write operations and the key families they invalidate
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Mutation {
    /// Create a trip and make it active
    CreateTrip,
    /// Edit a trip
    UpdateTrip,
    /// Delete a trip
    DeleteTrip,
    /// Switch the active trip
    SetActiveTrip,
    /// Record an expense
    AddExpense,
    /// Edit an expense
    UpdateExpense,
    /// Delete an expense
    DeleteExpense,
    /// Pull fresh rates from the provider
    FetchExchangeRates,
    /// Store caller-supplied rates
    UpdateExchangeRates,
    /// Store the API key
    SetApiKey,
    /// Remove the API key
    DeleteApiKey,
}

impl Mutation {
    /// Every mutation
    pub const ALL: [Mutation; 11] = [
        Mutation::CreateTrip,
        Mutation::UpdateTrip,
        Mutation::DeleteTrip,
        Mutation::SetActiveTrip,
        Mutation::AddExpense,
        Mutation::UpdateExpense,
        Mutation::DeleteExpense,
        Mutation::FetchExchangeRates,
        Mutation::UpdateExchangeRates,
        Mutation::SetApiKey,
        Mutation::DeleteApiKey,
    ];

    /// Remote method name
    #[must_use]
    pub fn operation(self) -> &'static str {
        match self {
            Self::CreateTrip => "createTrip",
            Self::UpdateTrip => "updateTrip",
            Self::DeleteTrip => "deleteTrip",
            Self::SetActiveTrip => "setActiveTrip",
            Self::AddExpense => "addExpense",
            Self::UpdateExpense => "updateExpense",
            Self::DeleteExpense => "deleteExpense",
            Self::FetchExchangeRates => "fetchAndStoreExchangeRates",
            Self::UpdateExchangeRates => "updateExchangeRates",
            Self::SetApiKey => "setApiKey",
            Self::DeleteApiKey => "deleteApiKey",
        }
    }

    /// Key families invalidated when this mutation succeeds
    #[must_use]
    pub fn invalidates(self) -> &'static [KeyFamily] {
        use KeyFamily::{
            ActiveTrip, ApiKey, AvailableCurrencies, ExchangeRates, Expense, Expenses,
            ExpensesByCategory, ExpensesEnabled, LastRateUpdate, Trip, TripSummary, Trips,
        };
        match self {
            Self::CreateTrip => &[Trips, ActiveTrip, Trip],
            Self::UpdateTrip => &[Trips, ActiveTrip, TripSummary, Trip],
            Self::DeleteTrip => &[Trips, ActiveTrip, Expenses, TripSummary, Trip, Expense],
            Self::SetActiveTrip => &[Trips, ActiveTrip, Expenses, TripSummary, Trip],
            Self::AddExpense | Self::UpdateExpense | Self::DeleteExpense => {
                &[Expenses, TripSummary, ExpensesByCategory, Expense]
            }
            Self::FetchExchangeRates => &[
                ExchangeRates,
                LastRateUpdate,
                ExpensesEnabled,
                AvailableCurrencies,
            ],
            Self::UpdateExchangeRates => &[ExchangeRates],
            Self::SetApiKey => &[ApiKey],
            Self::DeleteApiKey => &[ApiKey, ExpensesEnabled],
        }
    }
}

/// Identity-level reads the orchestrator keeps observed
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SessionRead {
    /// All trips
    Trips,
    /// The active trip
    ActiveTrip,
    /// The API key
    ApiKey,
    /// Whether expense entry is enabled
    ExpensesEnabled,
    /// When rates were last stored
    LastRateUpdate,
}

impl SessionRead {
    /// Every session read
    pub const ALL: [SessionRead; 5] = [
        SessionRead::Trips,
        SessionRead::ActiveTrip,
        SessionRead::ApiKey,
        SessionRead::ExpensesEnabled,
        SessionRead::LastRateUpdate,
    ];

    /// Cache key for `scope`
    #[must_use]
    pub fn key(self, scope: &IdentityScope) -> CacheKey {
        match self {
            Self::Trips => CacheKey::identity(KeyFamily::Trips, scope),
            Self::ActiveTrip => CacheKey::identity(KeyFamily::ActiveTrip, scope),
            Self::ApiKey => CacheKey::identity(KeyFamily::ApiKey, scope),
            Self::ExpensesEnabled => CacheKey::identity(KeyFamily::ExpensesEnabled, scope),
            Self::LastRateUpdate => CacheKey::global(KeyFamily::LastRateUpdate),
        }
    }
}

/// Handle and identity epoch a write was bound to
///
/// A binding taken before an identity change still writes through the old
/// handle, but its result no longer invalidates anything.
#[derive(Clone)]
pub struct WriteBinding {
    handle: Handle,
    epoch: u64,
}

impl WriteBinding {
    /// Identity epoch the binding was taken in
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

/// Typed access to the ledger through the query cache
#[derive(Clone)]
pub struct LedgerClient {
    resolver: ConnectionResolver,
    cache: QueryCache,
}

impl LedgerClient {
    /// Create a client sharing the resolver's cache
    #[must_use]
    pub fn new(resolver: ConnectionResolver) -> Self {
        let cache = resolver.cache().clone();
        Self { resolver, cache }
    }

    /// The connection resolver
    #[must_use]
    pub fn resolver(&self) -> &ConnectionResolver {
        &self.resolver
    }

    /// The query cache
    #[must_use]
    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    /// Whether reads and writes can be issued right now
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.resolver.is_available()
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// All trips of the caller
    pub async fn trips(&self) -> ClientResult<Vec<Trip>> {
        let Some(scope) = self.enabled_scope() else {
            return Ok(Vec::new());
        };
        self.cache
            .read(SessionRead::Trips.key(&scope), self.trips_loader(scope))
            .await
    }

    /// The caller's active trip
    pub async fn active_trip(&self) -> ClientResult<Option<Trip>> {
        let Some(scope) = self.enabled_scope() else {
            return Ok(None);
        };
        self.cache
            .read(SessionRead::ActiveTrip.key(&scope), self.active_trip_loader(scope))
            .await
    }

    /// One trip by id
    pub async fn trip(&self, id: TripId) -> ClientResult<Option<Trip>> {
        if !self.is_available() {
            return Ok(None);
        }
        let loader = self.loader(None, "getTrip", move |h| async move { h.get_trip(id).await });
        self.cache.read(CacheKey::trip(KeyFamily::Trip, id), loader).await
    }

    /// Expenses of a trip
    pub async fn expenses(&self, trip_id: TripId) -> ClientResult<Vec<Expense>> {
        if !self.is_available() {
            return Ok(Vec::new());
        }
        let loader = self.loader(None, "getExpensesForTrip", move |h| async move {
            h.get_expenses_for_trip(trip_id).await
        });
        self.cache
            .read(CacheKey::trip(KeyFamily::Expenses, trip_id), loader)
            .await
    }

    /// One expense by id
    pub async fn expense(&self, id: ExpenseId) -> ClientResult<Option<Expense>> {
        if !self.is_available() {
            return Ok(None);
        }
        let loader =
            self.loader(None, "getExpense", move |h| async move { h.get_expense(id).await });
        self.cache
            .read(CacheKey::expense(KeyFamily::Expense, id), loader)
            .await
    }

    /// Converted totals per category for a trip
    pub async fn expenses_by_category(&self, trip_id: TripId) -> ClientResult<Vec<CategoryTotal>> {
        if !self.is_available() {
            return Ok(Vec::new());
        }
        let loader = self.loader(None, "getExpensesByCategory", move |h| async move {
            h.get_expenses_by_category(trip_id).await
        });
        self.cache
            .read(CacheKey::trip(KeyFamily::ExpensesByCategory, trip_id), loader)
            .await
    }

    /// Aggregates for a trip; `None` while reads are disabled
    pub async fn trip_summary(&self, trip_id: TripId) -> ClientResult<Option<TripSummary>> {
        if !self.is_available() {
            return Ok(None);
        }
        let loader = self.loader(None, "getTripSummary", move |h| async move {
            h.get_trip_summary(trip_id).await.map(Some)
        });
        self.cache
            .read(CacheKey::trip(KeyFamily::TripSummary, trip_id), loader)
            .await
    }

    /// The rate list as stored by the ledger
    pub async fn exchange_rates(&self) -> ClientResult<Vec<ExchangeRate>> {
        if !self.is_available() {
            return Ok(Vec::new());
        }
        let loader = self.loader(None, "getExchangeRates", |h| async move {
            h.get_exchange_rates().await
        });
        self.cache
            .read(CacheKey::global(KeyFamily::ExchangeRates), loader)
            .await
    }

    /// The rate list as a lookup table
    pub async fn rate_table(&self) -> ClientResult<RateTable> {
        Ok(RateTable::from_rates(&self.exchange_rates().await?))
    }

    /// When rates were last stored; zero means never
    pub async fn last_rate_update(&self) -> ClientResult<Timestamp> {
        let Some(scope) = self.enabled_scope() else {
            return Ok(Timestamp::default());
        };
        self.cache
            .read(
                SessionRead::LastRateUpdate.key(&scope),
                self.last_rate_update_loader(),
            )
            .await
    }

    /// The caller's API key
    pub async fn api_key(&self) -> ClientResult<Option<String>> {
        let Some(scope) = self.enabled_scope() else {
            return Ok(None);
        };
        self.cache
            .read(SessionRead::ApiKey.key(&scope), self.api_key_loader(scope))
            .await
    }

    /// Whether expense entry is enabled for the caller
    pub async fn expenses_enabled(&self) -> ClientResult<bool> {
        let Some(scope) = self.enabled_scope() else {
            return Ok(false);
        };
        self.cache
            .read(
                SessionRead::ExpensesEnabled.key(&scope),
                self.expenses_enabled_loader(scope),
            )
            .await
    }

    /// Currencies to offer, sorted for display
    pub async fn available_currencies(&self) -> ClientResult<AvailableCurrencies> {
        let remote = if self.is_available() {
            let loader = self.loader(None, "getAvailableCurrencies", |h| async move {
                h.get_available_currencies().await
            });
            self.cache
                .read(CacheKey::global(KeyFamily::AvailableCurrencies), loader)
                .await?
        } else {
            Vec::new()
        };
        Ok(resolve_available_currencies(&remote))
    }

    /// Preview of `amount` converted into `to` at the current rates
    pub async fn preview_conversion(&self, amount: f64, from: &str, to: &str) -> ClientResult<f64> {
        Ok(self.rate_table().await?.convert(amount, from, to))
    }

    // ========================================================================
    // Session reads without waiting
    // ========================================================================

    /// Register an observer of a session read for the current identity
    #[must_use]
    pub fn observe(&self, read: SessionRead) -> Option<Observer> {
        let scope = self.resolver.current_scope()?;
        Some(self.cache.observe(read.key(&scope)))
    }

    /// Start a session read if it has no usable value
    ///
    /// Does nothing while reads are disabled. Returns whether a fetch started.
    pub fn ensure(&self, read: SessionRead) -> bool {
        let Some(scope) = self.enabled_scope() else {
            return false;
        };
        let key = read.key(&scope);
        match read {
            SessionRead::Trips => self.cache.ensure(key, self.trips_loader(scope)),
            SessionRead::ActiveTrip => self.cache.ensure(key, self.active_trip_loader(scope)),
            SessionRead::ApiKey => self.cache.ensure(key, self.api_key_loader(scope)),
            SessionRead::ExpensesEnabled => {
                self.cache.ensure(key, self.expenses_enabled_loader(scope))
            }
            SessionRead::LastRateUpdate => self.cache.ensure(key, self.last_rate_update_loader()),
        }
    }

    /// Cached trip list of the current identity
    #[must_use]
    pub fn peek_trips(&self) -> QueryState<Vec<Trip>> {
        self.peek(SessionRead::Trips)
    }

    /// Cached active trip of the current identity
    #[must_use]
    pub fn peek_active_trip(&self) -> QueryState<Option<Trip>> {
        self.peek(SessionRead::ActiveTrip)
    }

    /// Cached API key of the current identity
    #[must_use]
    pub fn peek_api_key(&self) -> QueryState<Option<String>> {
        self.peek(SessionRead::ApiKey)
    }

    /// Cached expense-entry flag of the current identity
    #[must_use]
    pub fn peek_expenses_enabled(&self) -> QueryState<bool> {
        self.peek(SessionRead::ExpensesEnabled)
    }

    /// Cached last rate update
    #[must_use]
    pub fn peek_last_rate_update(&self) -> QueryState<Timestamp> {
        self.peek(SessionRead::LastRateUpdate)
    }

    fn peek<T: Clone + 'static>(&self, read: SessionRead) -> QueryState<T> {
        match self.resolver.current_scope() {
            Some(scope) => self.cache.peek(&read.key(&scope)),
            None => QueryState::default(),
        }
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Create a trip, make it active, then invalidate once
    pub async fn create_trip(&self, draft: &TripDraft) -> ClientResult<TripId> {
        let handle = self.writable()?;
        let epoch = self.cache.epoch();

        let id = handle
            .create_trip(draft)
            .await
            .map_err(|e| ClientError::remote(Mutation::CreateTrip.operation(), &e))?;
        handle
            .set_active_trip(id)
            .await
            .map_err(|e| ClientError::remote(Mutation::SetActiveTrip.operation(), &e))?;

        self.invalidate_after(Mutation::CreateTrip, epoch);
        tracing::info!(trip = %id, name = %draft.name, "Trip created");
        Ok(id)
    }

    /// Replace a trip's editable fields
    pub async fn update_trip(&self, id: TripId, draft: &TripDraft) -> ClientResult<Trip> {
        let draft = draft.clone();
        self.mutate(Mutation::UpdateTrip, move |h| async move {
            h.update_trip(id, &draft).await
        })
        .await
    }

    /// Delete a trip and its expenses
    pub async fn delete_trip(&self, id: TripId) -> ClientResult<bool> {
        self.mutate(Mutation::DeleteTrip, move |h| async move { h.delete_trip(id).await })
            .await
    }

    /// Make `id` the active trip
    pub async fn set_active_trip(&self, id: TripId) -> ClientResult<Trip> {
        self.set_active_trip_bound(self.bind()?, id).await
    }

    /// Record an expense against a trip
    pub async fn add_expense(&self, trip_id: TripId, draft: &ExpenseDraft) -> ClientResult<ExpenseId> {
        let draft = draft.clone();
        self.mutate(Mutation::AddExpense, move |h| async move {
            h.add_expense(trip_id, &draft).await
        })
        .await
    }

    /// Replace an expense's editable fields
    pub async fn update_expense(&self, id: ExpenseId, draft: &ExpenseDraft) -> ClientResult<Expense> {
        let draft = draft.clone();
        self.mutate(Mutation::UpdateExpense, move |h| async move {
            h.update_expense(id, &draft).await
        })
        .await
    }

    /// Delete an expense
    pub async fn delete_expense(&self, id: ExpenseId) -> ClientResult<bool> {
        self.mutate(Mutation::DeleteExpense, move |h| async move {
            h.delete_expense(id).await
        })
        .await
    }

    /// Bind a later write to the current handle and identity epoch
    ///
    /// Fails with [`ClientError::NotAvailable`] when there is no handle.
    pub fn bind(&self) -> ClientResult<WriteBinding> {
        Ok(WriteBinding {
            handle: self.writable()?,
            epoch: self.cache.epoch(),
        })
    }

    /// [`set_active_trip`](Self::set_active_trip) through a binding taken earlier
    pub async fn set_active_trip_bound(&self, binding: WriteBinding, id: TripId) -> ClientResult<Trip> {
        self.mutate_bound(binding, Mutation::SetActiveTrip, move |h| async move {
            h.set_active_trip(id).await
        })
        .await
    }

    /// [`fetch_exchange_rates`](Self::fetch_exchange_rates) through a binding taken earlier
    pub async fn fetch_exchange_rates_bound(&self, binding: WriteBinding) -> ClientResult<bool> {
        self.mutate_bound(binding, Mutation::FetchExchangeRates, |h| async move {
            h.fetch_and_store_exchange_rates().await
        })
        .await
    }

    /// Ask the ledger to pull fresh rates
    pub async fn fetch_exchange_rates(&self) -> ClientResult<bool> {
        self.fetch_exchange_rates_bound(self.bind()?).await
    }

    /// Store caller-supplied rates
    pub async fn update_exchange_rates(&self, rates: &[(String, f64)]) -> ClientResult<bool> {
        let rates = rates.to_vec();
        self.mutate(Mutation::UpdateExchangeRates, move |h| async move {
            h.update_exchange_rates(&rates).await
        })
        .await
    }

    /// Store the caller's API key
    pub async fn set_api_key(&self, key: &str) -> ClientResult<bool> {
        let key = key.to_string();
        self.mutate(Mutation::SetApiKey, move |h| async move { h.set_api_key(&key).await })
            .await
    }

    /// Remove the caller's API key
    pub async fn delete_api_key(&self) -> ClientResult<bool> {
        self.mutate(Mutation::DeleteApiKey, |h| async move { h.delete_api_key().await })
            .await
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn enabled_scope(&self) -> Option<IdentityScope> {
        if self.is_available() {
            self.resolver.current_scope()
        } else {
            None
        }
    }

    fn writable(&self) -> ClientResult<Handle> {
        self.resolver.ready_handle().ok_or(ClientError::NotAvailable)
    }

    async fn mutate<T, F, Fut>(&self, mutation: Mutation, call: F) -> ClientResult<T>
    where
        F: FnOnce(Handle) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let binding = self.bind()?;
        self.mutate_bound(binding, mutation, call).await
    }

    async fn mutate_bound<T, F, Fut>(
        &self,
        binding: WriteBinding,
        mutation: Mutation,
        call: F,
    ) -> ClientResult<T>
    where
        F: FnOnce(Handle) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let value = call(binding.handle)
            .await
            .map_err(|e| ClientError::remote(mutation.operation(), &e))?;
        self.invalidate_after(mutation, binding.epoch);
        Ok(value)
    }

    fn invalidate_after(&self, mutation: Mutation, epoch: u64) {
        if self.cache.epoch() != epoch {
            tracing::warn!(
                operation = mutation.operation(),
                "Identity changed during write; skipping invalidation"
            );
            return;
        }
        let families = mutation.invalidates();
        let matched = self.cache.invalidate(|key| families.contains(&key.family()));
        tracing::debug!(operation = mutation.operation(), matched, "Write invalidated cache");
    }

    /// Loader resolving the handle at fetch time
    ///
    /// With a `scope`, the fetch is refused once that identity is no longer
    /// current.
    fn loader<T, F, Fut>(
        &self,
        scope: Option<IdentityScope>,
        operation: &'static str,
        call: F,
    ) -> impl Fn() -> BoxFuture<'static, ClientResult<T>> + Send + Sync + 'static
    where
        T: Send + 'static,
        F: Fn(Handle) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let resolver = self.resolver.clone();
        let call = Arc::new(call);
        move || {
            let resolver = resolver.clone();
            let call = Arc::clone(&call);
            let scope = scope.clone();
            async move {
                let handle = match &scope {
                    Some(scope) => resolver.handle_for(scope).await?,
                    None => resolver.handle().await?,
                };
                (*call)(handle)
                    .await
                    .map_err(|e| ClientError::remote(operation, &e))
            }
            .boxed()
        }
    }

    fn trips_loader(
        &self,
        scope: IdentityScope,
    ) -> impl Fn() -> BoxFuture<'static, ClientResult<Vec<Trip>>> + Send + Sync + 'static {
        self.loader(Some(scope), "getAllTrips", |h| async move {
            h.get_all_trips().await
        })
    }

    fn active_trip_loader(
        &self,
        scope: IdentityScope,
    ) -> impl Fn() -> BoxFuture<'static, ClientResult<Option<Trip>>> + Send + Sync + 'static {
        self.loader(Some(scope), "getActiveTrip", |h| async move {
            h.get_active_trip().await
        })
    }

    fn api_key_loader(
        &self,
        scope: IdentityScope,
    ) -> impl Fn() -> BoxFuture<'static, ClientResult<Option<String>>> + Send + Sync + 'static {
        self.loader(Some(scope), "getApiKey", |h| async move { h.get_api_key().await })
    }

    fn expenses_enabled_loader(
        &self,
        scope: IdentityScope,
    ) -> impl Fn() -> BoxFuture<'static, ClientResult<bool>> + Send + Sync + 'static {
        self.loader(Some(scope), "getExpensesEnabled", |h| async move {
            h.get_expenses_enabled().await
        })
    }

    fn last_rate_update_loader(
        &self,
    ) -> impl Fn() -> BoxFuture<'static, ClientResult<Timestamp>> + Send + Sync + 'static {
        self.loader(None, "getLastRateUpdate", |h| async move {
            h.get_last_rate_update().await
        })
    }
}
