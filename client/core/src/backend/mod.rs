//! Ledger Backends
//!
//! Abstracted access to the remote trip ledger through a common trait
//! interface.
//!
//! # Available Backends
//!
//! - **HTTP**: JSON gateway in front of the ledger service
//! - **In-memory**: self-contained ledger for the headless binary and tests
//!
//! # Usage
//!
//! ```ignore
//! use tripwise_core::backend::{ConnectionFactory, InMemoryLedger};
//! use tripwise_core::identity::{IdentityScope, Principal};
//!
//! let ledger = InMemoryLedger::new();
//! let handle = ledger.connect(&IdentityScope::Principal(Principal::new("alice"))).await?;
//! let trips = handle.get_all_trips().await?;
//! ```

mod http;
mod memory;
mod traits;

pub use http::{HttpLedger, HttpLedgerFactory, PRINCIPAL_HEADER};
pub use memory::{CallRecord, Gate, InMemoryHandle, InMemoryLedger, CONNECT, DEFAULT_RATE_SOURCE};
pub use traits::{ConnectionFactory, InitHook, LedgerService};
