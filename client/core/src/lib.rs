//! Tripwise Core - Headless Client for a Multi-Currency Trip Ledger
//!
//! This crate is the client-side core of tripwise. It owns everything between
//! the identity provider and the UI: the connection to the remote ledger, a
//! query cache over every remote read, the write operations and what they
//! invalidate, the startup state machine, and currency conversion. It draws
//! nothing; a UI renders from the cache and reacts to [`ClientMessage`]s.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                      Identity Provider / UI                       │
//! │                                                                   │
//! │              ClientEvent (up)        ClientMessage (down)         │
//! └──────────────────────────────┬────────────────────────────────────┘
//!                                │
//! ┌──────────────────────────────┼────────────────────────────────────┐
//! │                        TRIPWISE CORE                              │
//! │  ┌───────────────────────────┴─────────────────────────────────┐  │
//! │  │                        Bootstrap                             │  │
//! │  │   state machine · auto-activate · first-run · rate refresh   │  │
//! │  └───────────────────────────┬─────────────────────────────────┘  │
//! │  ┌───────────────────────────┴─────────────────────────────────┐  │
//! │  │                      LedgerClient                            │  │
//! │  │        typed reads · writes · per-write invalidation         │  │
//! │  └──────────────┬────────────────────────────┬─────────────────┘  │
//! │  ┌──────────────┴───────────┐  ┌─────────────┴─────────────────┐  │
//! │  │       QueryCache         │◄─┤     ConnectionResolver        │  │
//! │  │ keys · dedup · epochs    │  │  handle per identity · init   │  │
//! │  └──────────────────────────┘  └─────────────┬─────────────────┘  │
//! └──────────────────────────────────────────────┼────────────────────┘
//!                                                │
//!                              ┌─────────────────┴──────────────────┐
//!                              │   LedgerService (HTTP / in-memory) │
//!                              └────────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`Bootstrap`]: Session orchestrator driven by [`ClientEvent`]s
//! - [`LedgerClient`]: Typed, cache-backed access to the ledger
//! - [`QueryCache`]: Keyed cache with de-duplicated fetches and prefix invalidation
//! - [`ConnectionResolver`]: Identity-scoped ledger handle
//! - [`RateTable`]: USD-pivot rate table used by [`convert`]
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use tripwise_core::{
//!     backend::InMemoryLedger, Bootstrap, ClientConfig, ClientEvent, Principal,
//! };
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let (tx, mut rx) = mpsc::channel(100);
//!     let mut bootstrap =
//!         Bootstrap::from_factory(Arc::new(InMemoryLedger::new()), ClientConfig::default(), tx);
//!
//!     bootstrap.start().await;
//!     bootstrap
//!         .handle_event(ClientEvent::IdentityResolved {
//!             principal: Some(Principal::new("alice")),
//!         })
//!         .await?;
//!     bootstrap.settle().await;
//!
//!     while let Ok(msg) = rx.try_recv() {
//!         // Render message to UI
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`backend`]: Remote ledger contract, HTTP transport and in-memory ledger
//! - [`bootstrap`]: Startup state machine and background effects
//! - [`cache`]: Query cache, keys and entry state
//! - [`categories`]: Expense categories
//! - [`config`]: Configuration file and environment overrides
//! - [`connection`]: Identity-scoped connection handle
//! - [`currency`]: Conversion, formatting and the currency catalog
//! - [`error`]: Error taxonomy
//! - [`events`]: Events from the identity provider and the UI
//! - [`identity`]: Principals and identity scopes
//! - [`ledger`]: Typed reads and writes
//! - [`messages`]: Messages to the UI
//! - [`models`]: Trips, expenses, summaries and rates
//! - [`time`]: Nanosecond timestamps and date formatting

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod bootstrap;
pub mod cache;
pub mod categories;
pub mod config;
pub mod connection;
pub mod currency;
pub mod error;
pub mod events;
pub mod identity;
pub mod ledger;
pub mod messages;
pub mod models;
pub mod time;

// Re-exports for convenience
pub use backend::{ConnectionFactory, HttpLedgerFactory, InMemoryLedger, InitHook, LedgerService};
pub use bootstrap::Bootstrap;
pub use cache::{CacheKey, KeyFamily, Observer, QueryCache, QueryState, QueryStatus, ScopeValue};
pub use config::{load_config, ClientConfig, ConfigError, ConfigSource};
pub use connection::{ConnectionResolver, Handle};
pub use currency::{convert, format_currency, RateTable};
pub use error::{ClientError, ClientResult};
pub use events::ClientEvent;
pub use identity::{IdentityScope, IdentityState, Principal};
pub use ledger::{LedgerClient, Mutation, SessionRead, WriteBinding};
pub use messages::{BootstrapState, ClientMessage, NotifyLevel};
pub use models::{
    BudgetStatus, CategoryTotal, ExchangeRate, Expense, ExpenseDraft, ExpenseId, Timestamp, Trip,
    TripDraft, TripId, TripSummary,
};
