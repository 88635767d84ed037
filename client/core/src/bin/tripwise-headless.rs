//! Tripwise Headless Client
//!
//! Runs one client session without a UI and logs every message the core
//! sends. Useful for exercising a ledger gateway, or the bootstrap flow
//! against the built-in in-memory ledger.
//!
//! # Usage
//!
//! ```bash
//! # In-memory ledger with demo data
//! tripwise-headless
//!
//! # Sign in as a specific principal
//! tripwise-headless alice
//!
//! # Against a ledger gateway
//! TRIPWISE_SERVICE_URL=http://127.0.0.1:8080 tripwise-headless alice
//!
//! # With verbose logging
//! RUST_LOG=debug tripwise-headless
//! ```
//!
//! # Environment Variables
//!
//! - `TRIPWISE_SERVICE_URL`: Ledger gateway URL (default: in-memory ledger)
//! - `TRIPWISE_PRINCIPAL`: Principal to sign in as (default: `demo-user`)
//! - `RUST_LOG`: Log level (trace, debug, info, warn, error)

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use tripwise_core::{
    backend::{ConnectionFactory, HttpLedgerFactory, InMemoryLedger},
    config::load_config,
    currency::format_currency,
    time::format_date,
    Bootstrap, ClientEvent, ClientMessage, Principal, Timestamp, TripDraft,
};

const DEFAULT_PRINCIPAL: &str = "demo-user";

/// In-memory ledger with a trip and an API key for `principal`
fn demo_ledger(principal: &Principal) -> InMemoryLedger {
    let ledger = InMemoryLedger::new();
    ledger.seed_api_key(principal, "demo-key");
    ledger.seed_trip(principal, &TripDraft::new("Lisbon weekend", "EUR", 600.0));
    ledger.seed_trip(principal, &TripDraft::new("Tokyo spring", "JPY", 250_000.0));
    ledger
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tripwise_headless=info".parse()?)
                .add_directive("tripwise_core=info".parse()?),
        )
        .with_target(true)
        .init();

    let config = load_config()?;
    info!(source = %config.source(), "Configuration loaded");

    let principal = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("TRIPWISE_PRINCIPAL").ok())
        .map_or_else(|| Principal::new(DEFAULT_PRINCIPAL), Principal::new);

    let factory: Arc<dyn ConnectionFactory> = match &config.service_url {
        Some(url) => {
            info!(url = %url, "Using ledger gateway");
            Arc::new(HttpLedgerFactory::new(url.clone(), config.request_timeout)?)
        }
        None => {
            info!("Using in-memory ledger with demo data");
            Arc::new(demo_ledger(&principal))
        }
    };

    let (tx, mut rx) = mpsc::channel(config.message_buffer);
    let printer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            match msg {
                ClientMessage::Notify { level, message } => {
                    warn!(?level, "{}", message);
                }
                other => info!(message = ?other, "UI message"),
            }
        }
    });

    let mut bootstrap = Bootstrap::from_factory(factory, config, tx);
    bootstrap.start().await;
    bootstrap
        .handle_event(ClientEvent::IdentityResolved {
            principal: Some(principal.clone()),
        })
        .await?;
    bootstrap.settle().await;

    let ledger = bootstrap.ledger().clone();
    let trips = ledger.trips().await?;
    info!(principal = %principal, trips = trips.len(), state = ?bootstrap.state(), "Session ready");
    for trip in &trips {
        let spent = match ledger.trip_summary(trip.id).await? {
            Some(summary) => summary.total_spent,
            None => 0.0,
        };
        info!(
            trip = %trip.name,
            active = trip.is_active,
            created = %format_date(trip.created_at),
            budget = %format_currency(trip.budget_limit, &trip.primary_currency),
            spent = %format_currency(spent, &trip.primary_currency),
            "Trip"
        );
    }
    let last_update = ledger.last_rate_update().await?;
    if last_update != Timestamp::default() {
        info!(at = %format_date(last_update), "Exchange rates on file");
    }

    bootstrap.handle_event(ClientEvent::LoggedOut).await?;
    bootstrap.settle().await;

    drop(bootstrap);
    drop(ledger);
    printer.await?;
    Ok(())
}
