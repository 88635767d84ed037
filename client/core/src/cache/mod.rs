//! Query Cache
//!
//! Keyed, asynchronous, memoizing cache holding the result of every remote
//! read.
//!
//! # Keys
//!
//! A [`CacheKey`] is a [`KeyFamily`] plus an optional [`ScopeValue`]
//! (identity, trip or expense). Invalidation takes a predicate over keys;
//! [`CacheKey::starts_with`] gives the prefix match used for whole-family
//! invalidation.
//!
//! # Lifecycle of an entry
//!
//! ```text
//!   Idle ──read/ensure──► Loading ──ok──► Success ◄──┐
//!                            │                │       │ refetch
//!                            └──err──► Error  └─invalidate─► stale
//! ```
//!
//! Invalidation never deletes. Only observed entries are refetched right
//! away; the rest wait for their next read.

mod key;
mod state;
mod store;

pub use key::{CacheKey, KeyFamily, ScopeValue};
pub use state::{QueryState, QueryStatus};
pub use store::{Observer, QueryCache};
