//! Bootstrap Orchestrator
//!
//! Sequences a client session from startup to a usable state:
//!
//! ```text
//! IdentityResolving ──► Unauthenticated ──(login)──► IdentityResolving
//!        │                     ▲
//!        ▼                     │ (logout)
//! ConnectionAcquiring ──► Ready ┘
//! ```
//!
//! The orchestrator never awaits a read inline. [`Bootstrap::tick`] is one
//! "render": it looks at the cache as it is right now, starts whatever reads
//! are missing, re-derives the state and evaluates the background effects.
//!
//! # Background effects
//!
//! Evaluated on every tick while `Ready`. Each one is guarded by a flag that
//! is checked and set in the same synchronous step as the decision to run:
//!
//! - **Auto-activate**: trips exist but none is active, so the first trip is
//!   made active. Runs once per transition into that condition. A failure
//!   re-arms on the next trip-list fetch.
//! - **First-run prompt**: an authenticated user with no trips is asked to
//!   create one. Once per session, even across logouts.
//! - **Rate refresh**: with an API key configured and rates older than the
//!   configured max age (or never fetched), rates are fetched once per
//!   session. Failures are logged and dropped.
//!
//! Writes are bound to the ledger handle when the guard is set, not when the
//! task first runs. Completed effects report back over an internal channel
//! and are applied on the next tick. Outcomes from before an identity change
//! are ignored.
//!
//! A failed connection is reported once and then left alone until the user
//! asks for a retry or signs in again as the same principal.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::backend::ConnectionFactory;
use crate::cache::{Observer, QueryCache, QueryState};
use crate::config::ClientConfig;
use crate::connection::ConnectionResolver;
use crate::error::ClientResult;
use crate::events::ClientEvent;
use crate::identity::{IdentityState, Principal};
use crate::ledger::{LedgerClient, SessionRead};
use crate::messages::{BootstrapState, ClientMessage, NotifyLevel};
use crate::models::{Timestamp, Trip, TripId};

/// Auto-activation guard
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum Activation {
    /// Allowed to run
    #[default]
    Idle,
    /// `setActiveTrip` in flight
    InFlight,
    /// Ran for the current condition
    Done,
    /// Last attempt failed; retried once the trip list was fetched again
    Failed {
        trips_fetched_at: Option<Timestamp>,
    },
}

#[derive(Debug, Default)]
struct Guards {
    activation: Activation,
    /// Session-wide; survives logout
    prompt_shown: bool,
    /// Session-wide; survives logout
    rate_fetch_started: bool,
}

#[derive(Debug)]
enum Effect {
    Activated(ClientResult<Trip>),
    RatesFetched(ClientResult<bool>),
}

#[derive(Debug)]
struct EffectOutcome {
    generation: u64,
    effect: Effect,
}

/// Client session orchestrator
pub struct Bootstrap {
    /// Typed ledger access
    ledger: LedgerClient,
    /// Configuration
    config: ClientConfig,
    /// Current state
    state: BootstrapState,
    /// Channel to the UI
    tx: mpsc::Sender<ClientMessage>,
    /// Session reads kept observed for the current identity
    observers: Vec<Observer>,
    /// Background effects report here
    effects_tx: mpsc::UnboundedSender<EffectOutcome>,
    effects_rx: mpsc::UnboundedReceiver<EffectOutcome>,
    /// Effects started and not yet applied
    pending_effects: usize,
    /// Bumped on every identity transition
    generation: u64,
    guards: Guards,
    connection_error_reported: bool,
}

impl Bootstrap {
    /// Create an orchestrator over an existing ledger client
    #[must_use]
    pub fn new(ledger: LedgerClient, config: ClientConfig, tx: mpsc::Sender<ClientMessage>) -> Self {
        let (effects_tx, effects_rx) = mpsc::unbounded_channel();
        Self {
            ledger,
            config,
            state: BootstrapState::default(),
            tx,
            observers: Vec::new(),
            effects_tx,
            effects_rx,
            pending_effects: 0,
            generation: 0,
            guards: Guards::default(),
            connection_error_reported: false,
        }
    }

    /// Create an orchestrator with a fresh cache over `factory`
    #[must_use]
    pub fn from_factory(
        factory: Arc<dyn ConnectionFactory>,
        config: ClientConfig,
        tx: mpsc::Sender<ClientMessage>,
    ) -> Self {
        let resolver = ConnectionResolver::new(QueryCache::new(), factory, &config.admin_token);
        Self::new(LedgerClient::new(resolver), config, tx)
    }

    /// Announce the initial state
    pub async fn start(&mut self) {
        self.send(ClientMessage::State { state: self.state }).await;
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> BootstrapState {
        self.state
    }

    /// Ledger client shared with the UI
    #[must_use]
    pub fn ledger(&self) -> &LedgerClient {
        &self.ledger
    }

    /// Whether the first-run prompt was shown this session
    #[must_use]
    pub fn prompt_shown(&self) -> bool {
        self.guards.prompt_shown
    }

    /// Whether the automatic rate refresh was started this session
    #[must_use]
    pub fn rate_fetch_started(&self) -> bool {
        self.guards.rate_fetch_started
    }

    /// Background effects not yet applied
    #[must_use]
    pub fn pending_effects(&self) -> usize {
        self.pending_effects
    }

    /// Handle an event from the identity provider or the UI
    pub async fn handle_event(&mut self, event: ClientEvent) -> anyhow::Result<()> {
        match event {
            // ============================================
            // Identity
            // ============================================
            ClientEvent::IdentityResolved { principal } => {
                self.apply_identity(principal);
            }

            ClientEvent::LoggedIn { principal } => {
                self.set_state(BootstrapState::IdentityResolving).await;
                self.apply_identity(Some(principal));
            }

            ClientEvent::LoggedOut => {
                self.observers.clear();
                self.ledger.cache().clear();
                self.apply_identity(None);
                tracing::info!("Logged out");
            }

            // ============================================
            // UI
            // ============================================
            ClientEvent::TripPromptDismissed => {
                tracing::debug!("Trip prompt dismissed");
            }

            ClientEvent::TripPromptSubmitted { draft } => match self.ledger.create_trip(&draft).await {
                Ok(trip_id) => {
                    self.send(ClientMessage::TripCreated { trip_id }).await;
                }
                Err(e) => {
                    self.notify(NotifyLevel::Error, &format!("Could not create trip: {e}"))
                        .await;
                }
            },

            ClientEvent::AddExpenseRequested => {
                self.open_expense_form().await;
            }

            ClientEvent::RefreshRatesRequested => match self.ledger.fetch_exchange_rates().await {
                Ok(_) => {
                    self.send(ClientMessage::RatesRefreshed {
                        automatic: false,
                        at: Timestamp::now(),
                    })
                    .await;
                }
                Err(e) => {
                    self.notify(NotifyLevel::Error, &format!("Could not refresh rates: {e}"))
                        .await;
                }
            },

            ClientEvent::RetryConnection => {
                self.retry_connection();
            }
        }

        self.tick().await;
        Ok(())
    }

    /// Run one evaluation pass over the current cache state
    pub async fn tick(&mut self) {
        self.drain_effects().await;

        if self.is_authenticated() {
            self.ledger.resolver().ensure_handle();
            if self.ledger.is_available() {
                for read in SessionRead::ALL {
                    self.ledger.ensure(read);
                }
            }
            self.report_connection_error().await;
        }

        let state = self.derive_state();
        if state != self.state {
            self.set_state(state).await;
        }

        if state == BootstrapState::Ready {
            self.maybe_activate();
            self.maybe_prompt().await;
            self.maybe_refresh_rates();
        }
    }

    /// Tick until no fetch or background effect is outstanding
    pub async fn settle(&mut self) {
        loop {
            self.tick().await;
            if self.pending_effects == 0 && self.ledger.cache().fetching_count() == 0 {
                return;
            }

            let cache = self.ledger.cache().clone();
            let outcome = tokio::select! {
                () = cache.changed() => None,
                outcome = self.effects_rx.recv() => outcome,
            };
            if let Some(outcome) = outcome {
                self.apply_effect(outcome).await;
            }
        }
    }

    // ========================================================================
    // State
    // ========================================================================

    fn is_authenticated(&self) -> bool {
        self.ledger
            .resolver()
            .current_scope()
            .is_some_and(|scope| scope.is_authenticated())
    }

    fn derive_state(&self) -> BootstrapState {
        match self.ledger.resolver().identity() {
            IdentityState::Resolving => BootstrapState::IdentityResolving,
            IdentityState::Resolved(None) => BootstrapState::Unauthenticated,
            IdentityState::Resolved(Some(_)) => {
                // Refetches keep the previous data, so only the first load blocks.
                if self.ledger.resolver().handle_state().data.is_none()
                    || !self.ledger.peek_trips().has_resolved()
                {
                    BootstrapState::ConnectionAcquiring
                } else {
                    BootstrapState::Ready
                }
            }
        }
    }

    fn apply_identity(&mut self, principal: Option<Principal>) {
        // Dropped first so the transition does not refetch the old identity's reads.
        self.observers.clear();
        let changed = self
            .ledger
            .resolver()
            .set_identity(IdentityState::Resolved(principal));
        if changed {
            self.generation += 1;
            self.guards.activation = Activation::Idle;
            self.connection_error_reported = false;
        } else {
            self.retry_connection();
        }

        if self.is_authenticated() {
            self.observers.extend(self.ledger.resolver().observe_handle());
            self.observers.extend(
                SessionRead::ALL
                    .into_iter()
                    .filter_map(|read| self.ledger.observe(read)),
            );
        }
    }

    fn retry_connection(&mut self) {
        if self.ledger.resolver().retry_failed() {
            self.connection_error_reported = false;
        }
    }

    async fn report_connection_error(&mut self) {
        let handle = self.ledger.resolver().handle_state();
        match handle.error {
            Some(e)
                if handle.data.is_none()
                    && !handle.is_fetching
                    && !self.connection_error_reported =>
            {
                self.connection_error_reported = true;
                tracing::warn!(error = %e, "Ledger connection failed");
                self.notify(NotifyLevel::Error, &e.to_string()).await;
            }
            None if handle.data.is_some() => self.connection_error_reported = false,
            _ => {}
        }
    }

    // ========================================================================
    // Background effects
    // ========================================================================

    fn maybe_activate(&mut self) {
        let trips = self.ledger.peek_trips();
        let active = self.ledger.peek_active_trip();
        let candidate = activation_candidate(&trips, &active);

        let Some(trip_id) = candidate else {
            if self.guards.activation != Activation::InFlight {
                self.guards.activation = Activation::Idle;
            }
            return;
        };

        let run = match self.guards.activation {
            Activation::Idle => true,
            Activation::Failed { trips_fetched_at } => trips_fetched_at != trips.last_fetched_at,
            Activation::InFlight | Activation::Done => false,
        };
        if !run {
            return;
        }

        let binding = match self.ledger.bind() {
            Ok(binding) => binding,
            Err(e) => {
                tracing::debug!(error = %e, "Ledger not writable; activation deferred");
                return;
            }
        };

        self.guards.activation = Activation::InFlight;
        tracing::info!(trip = %trip_id, "No active trip; activating the first one");
        let ledger = self.ledger.clone();
        self.spawn_effect(async move {
            Effect::Activated(ledger.set_active_trip_bound(binding, trip_id).await)
        });
    }

    async fn maybe_prompt(&mut self) {
        if self.guards.prompt_shown || !self.config.first_run_prompt || !self.is_authenticated() {
            return;
        }
        let trips = self.ledger.peek_trips();
        let empty = trips.error.is_none() && trips.data.as_ref().is_some_and(Vec::is_empty);
        if !empty {
            return;
        }

        self.guards.prompt_shown = true;
        tracing::info!("No trips yet; prompting for the first one");
        self.send(ClientMessage::ShowTripPrompt).await;
    }

    fn maybe_refresh_rates(&mut self) {
        if self.guards.rate_fetch_started || !self.ledger.is_available() {
            return;
        }
        let has_api_key = matches!(self.ledger.peek_api_key().data, Some(Some(_)));
        if !has_api_key {
            return;
        }
        let last_update = self.ledger.peek_last_rate_update();
        if !last_update.has_resolved() {
            return;
        }

        let last = match (&last_update.error, last_update.data) {
            (None, Some(at)) if !at.is_unset() => Some(at),
            _ => None,
        };
        let max_age = self.config.rate_max_age_nanos();
        let due = match last {
            Some(at) => at.elapsed_until(Timestamp::now()) > max_age,
            None => true,
        };
        if !due {
            return;
        }
        let Ok(binding) = self.ledger.bind() else {
            return;
        };

        self.guards.rate_fetch_started = true;
        tracing::info!(last_update = ?last, "Exchange rates are stale; refreshing");
        let ledger = self.ledger.clone();
        self.spawn_effect(async move {
            Effect::RatesFetched(ledger.fetch_exchange_rates_bound(binding).await)
        });
    }

    fn spawn_effect<F>(&mut self, effect: F)
    where
        F: std::future::Future<Output = Effect> + Send + 'static,
    {
        self.pending_effects += 1;
        let generation = self.generation;
        let tx = self.effects_tx.clone();
        tokio::spawn(async move {
            let effect = effect.await;
            // The receiver lives as long as the orchestrator.
            let _ = tx.send(EffectOutcome { generation, effect });
        });
    }

    async fn drain_effects(&mut self) {
        while let Ok(outcome) = self.effects_rx.try_recv() {
            self.apply_effect(outcome).await;
        }
    }

    async fn apply_effect(&mut self, outcome: EffectOutcome) {
        self.pending_effects = self.pending_effects.saturating_sub(1);
        let current = outcome.generation == self.generation;

        match outcome.effect {
            Effect::Activated(result) => {
                if !current {
                    tracing::debug!("Ignoring activation from a previous identity");
                    return;
                }
                match result {
                    Ok(trip) => {
                        self.guards.activation = Activation::Done;
                        self.send(ClientMessage::TripActivated { trip_id: trip.id }).await;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Auto-activation failed");
                        self.guards.activation = Activation::Failed {
                            trips_fetched_at: self.ledger.peek_trips().last_fetched_at,
                        };
                    }
                }
            }
            Effect::RatesFetched(result) => match result {
                Ok(_) if current => {
                    self.send(ClientMessage::RatesRefreshed {
                        automatic: true,
                        at: Timestamp::now(),
                    })
                    .await;
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "Automatic rate refresh failed"),
            },
        }
    }

    // ========================================================================
    // UI directives
    // ========================================================================

    async fn open_expense_form(&mut self) {
        match self.ledger.expenses_enabled().await {
            Ok(true) => {}
            Ok(false) => {
                self.send(ClientMessage::OpenSettings {
                    reason: "Add an exchange-rate API key to start recording expenses".to_string(),
                })
                .await;
                return;
            }
            Err(e) => {
                self.notify(NotifyLevel::Error, &e.to_string()).await;
                return;
            }
        }

        match self.ledger.active_trip().await {
            Ok(Some(trip)) => {
                self.send(ClientMessage::ShowExpenseForm { trip_id: trip.id })
                    .await;
            }
            Ok(None) => {
                self.notify(NotifyLevel::Warning, "Create or select a trip first")
                    .await;
            }
            Err(e) => {
                self.notify(NotifyLevel::Error, &e.to_string()).await;
            }
        }
    }

    /// Set state and notify UI
    async fn set_state(&mut self, state: BootstrapState) {
        tracing::info!(from = ?self.state, to = ?state, "Bootstrap state changed");
        self.state = state;
        self.send(ClientMessage::State { state }).await;
    }

    /// Send notification
    async fn notify(&self, level: NotifyLevel, message: &str) {
        self.send(ClientMessage::Notify {
            level,
            message: message.to_string(),
        })
        .await;
    }

    /// Send a message to the UI
    async fn send(&self, msg: ClientMessage) {
        if let Err(e) = self.tx.send(msg).await {
            tracing::warn!("Failed to send message to UI: {}", e);
        }
    }
}

/// First trip to activate, if the trip list calls for it
fn activation_candidate(
    trips: &QueryState<Vec<Trip>>,
    active: &QueryState<Option<Trip>>,
) -> Option<TripId> {
    if trips.error.is_some() || active.error.is_some() {
        return None;
    }
    let trips = trips.data.as_ref()?;
    let no_active = matches!(active.data, Some(None)) && !trips.iter().any(|t| t.is_active);
    if no_active {
        trips.first().map(|t| t.id)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    use crate::backend::InMemoryLedger;
    use crate::cache::QueryStatus;
    use crate::error::ClientError;
    use crate::models::TripDraft;

    fn alice() -> Principal {
        Principal::new("alice")
    }

    fn bootstrap(ledger: &InMemoryLedger) -> (Bootstrap, mpsc::Receiver<ClientMessage>) {
        let (tx, rx) = mpsc::channel(100);
        let bootstrap = Bootstrap::from_factory(Arc::new(ledger.clone()), ClientConfig::default(), tx);
        (bootstrap, rx)
    }

    fn drain(rx: &mut mpsc::Receiver<ClientMessage>) -> Vec<ClientMessage> {
        let mut messages = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            messages.push(msg);
        }
        messages
    }

    fn trip(id: u128, active: bool) -> Trip {
        Trip {
            id: TripId(id),
            name: format!("Trip {id}"),
            primary_currency: "USD".to_string(),
            budget_limit: 1000.0,
            start_date: None,
            end_date: None,
            is_active: active,
            created_at: Timestamp(0),
        }
    }

    fn resolved<T>(data: T) -> QueryState<T> {
        QueryState {
            status: QueryStatus::Success,
            data: Some(data),
            last_fetched_at: Some(Timestamp(1)),
            ..QueryState::default()
        }
    }

    #[test]
    fn test_activation_candidate() {
        let trips = resolved(vec![trip(1, false), trip(2, false)]);
        assert_eq!(activation_candidate(&trips, &resolved(None)), Some(TripId(1)));

        // Active trip query still loading
        assert_eq!(activation_candidate(&trips, &QueryState::default()), None);

        // Already active
        assert_eq!(
            activation_candidate(&trips, &resolved(Some(trip(2, true)))),
            None
        );

        // Errored trip list
        let mut failed = trips.clone();
        failed.error = Some(ClientError::NotAvailable);
        assert_eq!(activation_candidate(&failed, &resolved(None)), None);

        // Empty
        assert_eq!(activation_candidate(&resolved(Vec::new()), &resolved(None)), None);
    }

    #[tokio::test]
    async fn test_unauthenticated_after_empty_resolution() {
        let ledger = InMemoryLedger::new();
        let (mut bootstrap, mut rx) = bootstrap(&ledger);
        bootstrap.start().await;

        bootstrap
            .handle_event(ClientEvent::IdentityResolved { principal: None })
            .await
            .unwrap();
        bootstrap.settle().await;

        assert_eq!(bootstrap.state(), BootstrapState::Unauthenticated);
        assert_eq!(
            drain(&mut rx),
            vec![
                ClientMessage::State {
                    state: BootstrapState::IdentityResolving
                },
                ClientMessage::State {
                    state: BootstrapState::Unauthenticated
                },
            ]
        );
        assert_eq!(ledger.calls(crate::backend::CONNECT), 0);
    }

    #[tokio::test]
    async fn test_ready_after_login() {
        let ledger = InMemoryLedger::new();
        ledger.seed_trip(&alice(), &TripDraft::new("Lisbon", "EUR", 800.0));
        let (mut bootstrap, mut rx) = bootstrap(&ledger);

        bootstrap
            .handle_event(ClientEvent::IdentityResolved {
                principal: Some(alice()),
            })
            .await
            .unwrap();
        assert_eq!(bootstrap.state(), BootstrapState::ConnectionAcquiring);

        bootstrap.settle().await;
        assert_eq!(bootstrap.state(), BootstrapState::Ready);

        let states: Vec<_> = drain(&mut rx)
            .into_iter()
            .filter_map(|m| match m {
                ClientMessage::State { state } => Some(state),
                _ => None,
            })
            .collect();
        assert_eq!(
            states,
            vec![BootstrapState::ConnectionAcquiring, BootstrapState::Ready]
        );
    }

    #[tokio::test]
    async fn test_trip_list_error_counts_as_ready() {
        let ledger = InMemoryLedger::new();
        ledger.fail_next("getAllTrips", "boom");
        let (mut bootstrap, mut rx) = bootstrap(&ledger);

        bootstrap
            .handle_event(ClientEvent::IdentityResolved {
                principal: Some(alice()),
            })
            .await
            .unwrap();
        bootstrap.settle().await;

        assert_eq!(bootstrap.state(), BootstrapState::Ready);
        assert!(bootstrap.ledger().peek_trips().is_error());
        assert!(!bootstrap.prompt_shown());
        assert!(!drain(&mut rx).contains(&ClientMessage::ShowTripPrompt));
        assert_eq!(ledger.calls("setActiveTrip"), 0);
    }

    #[tokio::test]
    async fn test_prompt_disabled_by_config() {
        let ledger = InMemoryLedger::new();
        let (tx, mut rx) = mpsc::channel(100);
        let config = ClientConfig::default().with_first_run_prompt(false);
        let mut bootstrap = Bootstrap::from_factory(Arc::new(ledger.clone()), config, tx);

        bootstrap
            .handle_event(ClientEvent::IdentityResolved {
                principal: Some(alice()),
            })
            .await
            .unwrap();
        bootstrap.settle().await;

        assert_eq!(bootstrap.state(), BootstrapState::Ready);
        assert!(!drain(&mut rx).contains(&ClientMessage::ShowTripPrompt));
    }

    #[tokio::test]
    async fn test_failed_activation_waits_for_next_trip_fetch() {
        let ledger = InMemoryLedger::new();
        ledger.seed_trip(&alice(), &TripDraft::new("Lisbon", "EUR", 800.0));
        ledger.fail_next("setActiveTrip", "busy");
        let (mut bootstrap, _rx) = bootstrap(&ledger);

        bootstrap
            .handle_event(ClientEvent::IdentityResolved {
                principal: Some(alice()),
            })
            .await
            .unwrap();
        bootstrap.settle().await;
        assert_eq!(ledger.calls("setActiveTrip"), 1);

        // Nothing changed, so nothing is retried.
        bootstrap.settle().await;
        assert_eq!(ledger.calls("setActiveTrip"), 1);

        bootstrap.ledger().cache().invalidate_family(crate::cache::KeyFamily::Trips);
        bootstrap.settle().await;
        assert_eq!(ledger.calls("setActiveTrip"), 2);
        assert!(bootstrap.ledger().peek_active_trip().data.flatten().is_some());
    }

    #[tokio::test]
    async fn test_logout_clears_cache() {
        let ledger = InMemoryLedger::new();
        ledger.seed_trip(&alice(), &TripDraft::new("Lisbon", "EUR", 800.0));
        let (mut bootstrap, _rx) = bootstrap(&ledger);

        bootstrap
            .handle_event(ClientEvent::IdentityResolved {
                principal: Some(alice()),
            })
            .await
            .unwrap();
        bootstrap.settle().await;
        assert!(!bootstrap.ledger().cache().is_empty());

        bootstrap.handle_event(ClientEvent::LoggedOut).await.unwrap();
        bootstrap.settle().await;

        assert_eq!(bootstrap.state(), BootstrapState::Unauthenticated);
        assert!(bootstrap.ledger().cache().is_empty());
        assert!(!bootstrap.ledger().is_available());
    }

    #[tokio::test]
    async fn test_add_expense_without_api_key_opens_settings() {
        let ledger = InMemoryLedger::new();
        ledger.seed_trip(&alice(), &TripDraft::new("Lisbon", "EUR", 800.0));
        let (mut bootstrap, mut rx) = bootstrap(&ledger);

        bootstrap
            .handle_event(ClientEvent::IdentityResolved {
                principal: Some(alice()),
            })
            .await
            .unwrap();
        bootstrap.settle().await;
        drain(&mut rx);

        bootstrap
            .handle_event(ClientEvent::AddExpenseRequested)
            .await
            .unwrap();
        let messages = drain(&mut rx);
        assert!(messages
            .iter()
            .any(|m| matches!(m, ClientMessage::OpenSettings { .. })));
    }

    #[tokio::test]
    async fn test_add_expense_with_rates_opens_form() {
        let ledger = InMemoryLedger::new();
        let trip_id = ledger.seed_trip(&alice(), &TripDraft::new("Lisbon", "EUR", 800.0));
        ledger.seed_api_key(&alice(), "key");
        ledger.seed_rates(&[("USD", 1.0), ("EUR", 0.9)], Timestamp::now());
        let (mut bootstrap, mut rx) = bootstrap(&ledger);

        bootstrap
            .handle_event(ClientEvent::IdentityResolved {
                principal: Some(alice()),
            })
            .await
            .unwrap();
        bootstrap.settle().await;
        drain(&mut rx);

        bootstrap
            .handle_event(ClientEvent::AddExpenseRequested)
            .await
            .unwrap();
        assert!(drain(&mut rx).contains(&ClientMessage::ShowExpenseForm { trip_id }));
        // Rates are fresh, so no automatic refresh happened.
        assert_eq!(ledger.calls("fetchAndStoreExchangeRates"), 0);
    }

    #[tokio::test]
    async fn test_manual_refresh_failure_is_reported() {
        let ledger = InMemoryLedger::new();
        let (mut bootstrap, mut rx) = bootstrap(&ledger);

        bootstrap
            .handle_event(ClientEvent::IdentityResolved {
                principal: Some(alice()),
            })
            .await
            .unwrap();
        bootstrap.settle().await;
        drain(&mut rx);

        // No API key, so the ledger refuses.
        bootstrap
            .handle_event(ClientEvent::RefreshRatesRequested)
            .await
            .unwrap();
        assert!(drain(&mut rx).iter().any(|m| matches!(
            m,
            ClientMessage::Notify {
                level: NotifyLevel::Error,
                ..
            }
        )));
    }

    #[tokio::test]
    async fn test_prompt_submission_creates_active_trip() {
        let ledger = InMemoryLedger::new();
        let (mut bootstrap, mut rx) = bootstrap(&ledger);

        bootstrap
            .handle_event(ClientEvent::IdentityResolved {
                principal: Some(alice()),
            })
            .await
            .unwrap();
        bootstrap.settle().await;
        assert!(drain(&mut rx).contains(&ClientMessage::ShowTripPrompt));

        bootstrap
            .handle_event(ClientEvent::TripPromptSubmitted {
                draft: TripDraft::new("Kyoto", "JPY", 300_000.0),
            })
            .await
            .unwrap();
        bootstrap.settle().await;

        let messages = drain(&mut rx);
        assert!(messages
            .iter()
            .any(|m| matches!(m, ClientMessage::TripCreated { .. })));
        let active = bootstrap.ledger().peek_active_trip().data.flatten();
        assert_eq!(active.map(|t| t.name), Some("Kyoto".to_string()));
        // create_trip activated it; auto-activation had nothing to do.
        assert_eq!(ledger.calls("setActiveTrip"), 1);
    }
}
