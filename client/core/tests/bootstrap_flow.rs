//! End-to-end bootstrap behavior against the in-memory ledger

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio::sync::mpsc;

use tripwise_core::backend::CONNECT;
use tripwise_core::{
    Bootstrap, BootstrapState, CacheKey, ClientConfig, ClientEvent, ClientMessage,
    ConnectionResolver, Handle, IdentityScope, InMemoryLedger, KeyFamily, NotifyLevel, Principal,
    SessionRead, Timestamp, Trip, TripDraft,
};

fn alice() -> Principal {
    Principal::new("alice")
}

fn bob() -> Principal {
    Principal::new("bob")
}

fn start(ledger: &InMemoryLedger) -> (Bootstrap, mpsc::Receiver<ClientMessage>) {
    let (tx, rx) = mpsc::channel(256);
    let bootstrap = Bootstrap::from_factory(Arc::new(ledger.clone()), ClientConfig::default(), tx);
    (bootstrap, rx)
}

async fn sign_in(bootstrap: &mut Bootstrap, principal: Principal) {
    bootstrap
        .handle_event(ClientEvent::IdentityResolved {
            principal: Some(principal),
        })
        .await
        .unwrap();
}

fn drain(rx: &mut mpsc::Receiver<ClientMessage>) -> Vec<ClientMessage> {
    let mut messages = Vec::new();
    while let Ok(msg) = rx.try_recv() {
        messages.push(msg);
    }
    messages
}

fn count(messages: &[ClientMessage], wanted: &ClientMessage) -> usize {
    messages.iter().filter(|m| *m == wanted).count()
}

/// Tick until `done` holds, failing the test after a few seconds
async fn tick_until(bootstrap: &mut Bootstrap, done: impl Fn(&Bootstrap) -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            bootstrap.tick().await;
            if done(&*bootstrap) {
                return;
            }
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("condition not reached");
}

async fn wait_for_calls(ledger: &InMemoryLedger, method: &str, n: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while ledger.calls(method) < n {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("call not made");
}

// ============================================================================
// Auto-activation
// ============================================================================

#[tokio::test]
async fn test_first_trip_activated_exactly_once() {
    let ledger = InMemoryLedger::new();
    let t1 = ledger.seed_trip(&alice(), &TripDraft::new("Porto", "EUR", 500.0));
    ledger.seed_trip(&alice(), &TripDraft::new("Oslo", "NOK", 9000.0));
    let (mut bootstrap, mut rx) = start(&ledger);

    sign_in(&mut bootstrap, alice()).await;
    bootstrap.settle().await;
    for _ in 0..5 {
        bootstrap.tick().await;
    }
    bootstrap.settle().await;

    assert_eq!(ledger.calls("setActiveTrip"), 1);
    let active = bootstrap.ledger().active_trip().await.unwrap();
    assert_eq!(active.map(|t| t.id), Some(t1));
    assert_eq!(
        count(&drain(&mut rx), &ClientMessage::TripActivated { trip_id: t1 }),
        1
    );
}

#[tokio::test]
async fn test_activation_in_flight_is_not_repeated() {
    let ledger = InMemoryLedger::new();
    ledger.seed_trip(&alice(), &TripDraft::new("Porto", "EUR", 500.0));
    let gate = ledger.pause("setActiveTrip");
    let (mut bootstrap, _rx) = start(&ledger);

    sign_in(&mut bootstrap, alice()).await;
    tick_until(&mut bootstrap, |b| b.pending_effects() == 1).await;
    wait_for_calls(&ledger, "setActiveTrip", 1).await;
    for _ in 0..10 {
        bootstrap.tick().await;
        tokio::task::yield_now().await;
    }
    assert_eq!(ledger.calls("setActiveTrip"), 1);

    gate.open();
    bootstrap.settle().await;
    assert_eq!(ledger.calls("setActiveTrip"), 1);
    assert_eq!(bootstrap.state(), BootstrapState::Ready);
}

#[tokio::test]
async fn test_existing_active_trip_is_left_alone() {
    let ledger = InMemoryLedger::new();
    ledger.seed_trip(&alice(), &TripDraft::new("Porto", "EUR", 500.0));
    let (mut bootstrap, _rx) = start(&ledger);

    sign_in(&mut bootstrap, alice()).await;
    bootstrap.settle().await;
    assert_eq!(ledger.calls("setActiveTrip"), 1);

    // A second session over the same account finds the trip already active.
    let (mut second, _rx2) = start(&ledger);
    sign_in(&mut second, alice()).await;
    second.settle().await;
    assert_eq!(ledger.calls("setActiveTrip"), 1);
}

// ============================================================================
// First-run prompt
// ============================================================================

#[tokio::test]
async fn test_first_run_prompt_fires_once_per_session() {
    let ledger = InMemoryLedger::new();
    let (mut bootstrap, mut rx) = start(&ledger);

    sign_in(&mut bootstrap, alice()).await;
    bootstrap.settle().await;
    assert!(bootstrap.prompt_shown());
    assert_eq!(count(&drain(&mut rx), &ClientMessage::ShowTripPrompt), 1);

    bootstrap
        .handle_event(ClientEvent::TripPromptDismissed)
        .await
        .unwrap();
    bootstrap
        .ledger()
        .cache()
        .invalidate_family(KeyFamily::Trips);
    bootstrap.settle().await;
    assert!(bootstrap.ledger().peek_trips().data.unwrap().is_empty());
    assert_eq!(ledger.calls("getAllTrips"), 2);

    // Still suppressed after logging out and back in.
    bootstrap.handle_event(ClientEvent::LoggedOut).await.unwrap();
    bootstrap
        .handle_event(ClientEvent::LoggedIn { principal: alice() })
        .await
        .unwrap();
    bootstrap.settle().await;

    assert_eq!(count(&drain(&mut rx), &ClientMessage::ShowTripPrompt), 0);
}

#[tokio::test]
async fn test_no_prompt_when_trips_exist() {
    let ledger = InMemoryLedger::new();
    ledger.seed_trip(&alice(), &TripDraft::new("Porto", "EUR", 500.0));
    let (mut bootstrap, mut rx) = start(&ledger);

    sign_in(&mut bootstrap, alice()).await;
    bootstrap.settle().await;

    assert!(!bootstrap.prompt_shown());
    assert_eq!(count(&drain(&mut rx), &ClientMessage::ShowTripPrompt), 0);
}

// ============================================================================
// Rate refresh
// ============================================================================

#[tokio::test]
async fn test_missing_rates_fetched_exactly_once() {
    let ledger = InMemoryLedger::new();
    ledger.seed_api_key(&alice(), "key");
    let gate = ledger.pause("fetchAndStoreExchangeRates");
    let (mut bootstrap, mut rx) = start(&ledger);

    sign_in(&mut bootstrap, alice()).await;
    tick_until(&mut bootstrap, Bootstrap::rate_fetch_started).await;
    wait_for_calls(&ledger, "fetchAndStoreExchangeRates", 1).await;

    // More renders while the first fetch is pending.
    for _ in 0..10 {
        bootstrap.tick().await;
        tokio::task::yield_now().await;
    }
    assert_eq!(ledger.calls("fetchAndStoreExchangeRates"), 1);

    gate.open();
    bootstrap.settle().await;
    assert_eq!(ledger.calls("fetchAndStoreExchangeRates"), 1);
    assert!(drain(&mut rx)
        .iter()
        .any(|m| matches!(m, ClientMessage::RatesRefreshed { automatic: true, .. })));
    assert!(bootstrap.ledger().expenses_enabled().await.unwrap());
}

#[tokio::test]
async fn test_stale_rates_refreshed() {
    let ledger = InMemoryLedger::new();
    ledger.seed_api_key(&alice(), "key");
    let two_days_ago = Timestamp(Timestamp::now().0 - 2 * tripwise_core::time::NS_PER_DAY);
    ledger.seed_rates(&[("USD", 1.0), ("EUR", 0.9)], two_days_ago);
    let (mut bootstrap, _rx) = start(&ledger);

    sign_in(&mut bootstrap, alice()).await;
    bootstrap.settle().await;

    assert_eq!(ledger.calls("fetchAndStoreExchangeRates"), 1);
    assert!(bootstrap.ledger().last_rate_update().await.unwrap() > two_days_ago);
}

#[tokio::test]
async fn test_no_refresh_without_api_key() {
    let ledger = InMemoryLedger::new();
    let (mut bootstrap, _rx) = start(&ledger);

    sign_in(&mut bootstrap, alice()).await;
    bootstrap.settle().await;

    assert!(!bootstrap.rate_fetch_started());
    assert_eq!(ledger.calls("fetchAndStoreExchangeRates"), 0);
}

#[tokio::test]
async fn test_failed_refresh_is_silent_and_not_retried() {
    let ledger = InMemoryLedger::new();
    ledger.seed_api_key(&alice(), "key");
    ledger.fail_next("fetchAndStoreExchangeRates", "provider down");
    let (mut bootstrap, mut rx) = start(&ledger);

    sign_in(&mut bootstrap, alice()).await;
    bootstrap.settle().await;
    bootstrap.settle().await;

    assert_eq!(ledger.calls("fetchAndStoreExchangeRates"), 1);
    assert!(!drain(&mut rx).iter().any(|m| matches!(
        m,
        ClientMessage::Notify {
            level: NotifyLevel::Error,
            ..
        }
    )));

    // Manual refresh still works.
    bootstrap
        .handle_event(ClientEvent::RefreshRatesRequested)
        .await
        .unwrap();
    assert_eq!(ledger.calls("fetchAndStoreExchangeRates"), 2);
    assert!(drain(&mut rx)
        .iter()
        .any(|m| matches!(m, ClientMessage::RatesRefreshed { automatic: false, .. })));
}

// ============================================================================
// Identity transitions
// ============================================================================

#[tokio::test]
async fn test_late_result_for_previous_identity_is_discarded() {
    let ledger = InMemoryLedger::new();
    ledger.seed_trip(&alice(), &TripDraft::new("Alice trip", "EUR", 500.0));
    ledger.seed_trip(&bob(), &TripDraft::new("Bob trip", "USD", 700.0));
    let (mut bootstrap, _rx) = start(&ledger);

    sign_in(&mut bootstrap, alice()).await;
    bootstrap.settle().await;
    let alice_key = SessionRead::Trips.key(&IdentityScope::Principal(alice()));
    let alice_before: Vec<Trip> = bootstrap
        .ledger()
        .cache()
        .peek::<Vec<Trip>>(&alice_key)
        .data
        .unwrap();

    // A refetch for alice is held at the ledger while bob signs in.
    ledger.seed_trip(&alice(), &TripDraft::new("Alice second", "EUR", 100.0));
    let gate = ledger.pause("getAllTrips");
    let fetched = ledger.calls("getAllTrips");
    bootstrap.ledger().cache().invalidate_prefix(&alice_key);
    wait_for_calls(&ledger, "getAllTrips", fetched + 1).await;

    bootstrap
        .handle_event(ClientEvent::LoggedIn { principal: bob() })
        .await
        .unwrap();
    gate.open();
    bootstrap.settle().await;

    let bob_trips = bootstrap.ledger().peek_trips().data.unwrap();
    assert_eq!(
        bob_trips.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
        vec!["Bob trip"]
    );
    let alice_after = bootstrap.ledger().cache().peek::<Vec<Trip>>(&alice_key);
    assert_eq!(alice_after.data.unwrap().len(), alice_before.len());
    assert!(alice_after.is_stale);
    assert_eq!(bootstrap.state(), BootstrapState::Ready);
}

#[tokio::test]
async fn test_identity_change_invalidates_everything_but_the_handle() {
    let ledger = InMemoryLedger::new();
    ledger.seed_trip(&alice(), &TripDraft::new("Alice trip", "EUR", 500.0));
    let (mut bootstrap, _rx) = start(&ledger);

    sign_in(&mut bootstrap, alice()).await;
    bootstrap.settle().await;
    let cache = bootstrap.ledger().cache().clone();
    let epoch = cache.epoch();
    let global = CacheKey::global(KeyFamily::LastRateUpdate);
    let last_update_fetches = ledger.calls("getLastRateUpdate");

    bootstrap
        .handle_event(ClientEvent::LoggedIn { principal: bob() })
        .await
        .unwrap();
    assert_eq!(cache.epoch(), epoch + 1);

    let bob_scope = IdentityScope::Principal(bob());
    let resolver = bootstrap.ledger().resolver().clone();
    assert!(!resolver.on_identity_changed(&bob_scope));
    assert_eq!(cache.epoch(), epoch + 1);

    let alice_scope = IdentityScope::Principal(alice());
    for read in SessionRead::ALL {
        let key = read.key(&alice_scope);
        assert!(
            cache.peek::<()>(&key).is_stale || !cache.contains(&key),
            "{key} not invalidated"
        );
    }

    bootstrap.settle().await;
    let alice_handle = cache.peek::<Handle>(&ConnectionResolver::connection_key(&alice_scope));
    assert!(alice_handle.is_stale);
    let bob_handle = cache.peek::<Handle>(&ConnectionResolver::connection_key(&bob_scope));
    assert!(bob_handle.data.is_some());
    assert!(!bob_handle.is_stale);

    // The shared rate timestamp was invalidated and fetched again for bob.
    assert!(!cache.peek::<Timestamp>(&global).is_stale);
    assert_eq!(ledger.calls("getLastRateUpdate"), last_update_fetches + 1);
}

#[tokio::test]
async fn test_activation_for_previous_identity_is_ignored() {
    let ledger = InMemoryLedger::new();
    let alice_trip = ledger.seed_trip(&alice(), &TripDraft::new("Alice trip", "EUR", 500.0));
    let gate = ledger.pause("setActiveTrip");
    let (mut bootstrap, mut rx) = start(&ledger);

    sign_in(&mut bootstrap, alice()).await;
    tick_until(&mut bootstrap, |b| b.pending_effects() == 1).await;
    wait_for_calls(&ledger, "setActiveTrip", 1).await;

    bootstrap
        .handle_event(ClientEvent::LoggedIn { principal: bob() })
        .await
        .unwrap();
    gate.open();
    bootstrap.settle().await;

    assert_eq!(bootstrap.pending_effects(), 0);
    assert_eq!(
        count(
            &drain(&mut rx),
            &ClientMessage::TripActivated {
                trip_id: alice_trip
            }
        ),
        0
    );
    assert_eq!(bootstrap.ledger().peek_trips().data, Some(Vec::new()));
}

// ============================================================================
// Connection failures
// ============================================================================

fn connection_errors(messages: &[ClientMessage]) -> usize {
    messages
        .iter()
        .filter(|m| {
            matches!(
                m,
                ClientMessage::Notify {
                    level: NotifyLevel::Error,
                    ..
                }
            )
        })
        .count()
}

#[tokio::test]
async fn test_failed_connection_recovers_on_retry() {
    let ledger = InMemoryLedger::new();
    ledger.seed_trip(&alice(), &TripDraft::new("Alice trip", "EUR", 500.0));
    ledger.fail_next(CONNECT, "gateway unreachable");
    let (mut bootstrap, mut rx) = start(&ledger);

    sign_in(&mut bootstrap, alice()).await;
    bootstrap.settle().await;
    for _ in 0..20 {
        bootstrap.tick().await;
    }
    bootstrap.settle().await;
    assert_eq!(bootstrap.state(), BootstrapState::ConnectionAcquiring);
    assert_eq!(ledger.calls(CONNECT), 1);
    assert_eq!(connection_errors(&drain(&mut rx)), 1);

    bootstrap
        .handle_event(ClientEvent::RetryConnection)
        .await
        .unwrap();
    bootstrap.settle().await;

    assert_eq!(bootstrap.state(), BootstrapState::Ready);
    assert_eq!(ledger.calls(CONNECT), 2);
    assert_eq!(bootstrap.ledger().peek_trips().data.map(|t| t.len()), Some(1));
}

#[tokio::test]
async fn test_repeated_failure_is_reported_again() {
    let ledger = InMemoryLedger::new();
    ledger.fail_next(CONNECT, "gateway unreachable");
    ledger.fail_next(CONNECT, "gateway unreachable");
    let (mut bootstrap, mut rx) = start(&ledger);

    sign_in(&mut bootstrap, alice()).await;
    bootstrap.settle().await;
    bootstrap
        .handle_event(ClientEvent::RetryConnection)
        .await
        .unwrap();
    bootstrap.settle().await;

    assert_eq!(bootstrap.state(), BootstrapState::ConnectionAcquiring);
    assert_eq!(ledger.calls(CONNECT), 2);
    assert_eq!(connection_errors(&drain(&mut rx)), 2);
}

#[tokio::test]
async fn test_signing_in_again_retries_failed_connection() {
    let ledger = InMemoryLedger::new();
    ledger.fail_next(CONNECT, "gateway unreachable");
    let (mut bootstrap, _rx) = start(&ledger);

    sign_in(&mut bootstrap, alice()).await;
    bootstrap.settle().await;
    assert_eq!(bootstrap.state(), BootstrapState::ConnectionAcquiring);

    sign_in(&mut bootstrap, alice()).await;
    bootstrap.settle().await;
    assert_eq!(bootstrap.state(), BootstrapState::Ready);
    assert_eq!(ledger.calls(CONNECT), 2);
}

#[tokio::test]
async fn test_retry_leaves_a_healthy_connection_alone() {
    let ledger = InMemoryLedger::new();
    let (mut bootstrap, _rx) = start(&ledger);

    sign_in(&mut bootstrap, alice()).await;
    bootstrap.settle().await;
    bootstrap
        .handle_event(ClientEvent::RetryConnection)
        .await
        .unwrap();
    bootstrap.settle().await;

    assert_eq!(bootstrap.state(), BootstrapState::Ready);
    assert_eq!(ledger.calls(CONNECT), 1);
}
