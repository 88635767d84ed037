//! Observable entry state

use crate::error::ClientError;
use crate::models::Timestamp;

/// Coarse status of an entry, as a UI would branch on it
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum QueryStatus {
    /// Never fetched
    #[default]
    Idle,
    /// First fetch in flight, no data yet
    Loading,
    /// Last fetch succeeded
    Success,
    /// Last fetch failed
    Error,
}

/// Snapshot of one cache entry
#[derive(Clone, Debug, PartialEq)]
pub struct QueryState<T> {
    /// Coarse status
    pub status: QueryStatus,
    /// Latest successful value; kept across later failures and refetches
    pub data: Option<T>,
    /// Error of the latest fetch, if it failed
    pub error: Option<ClientError>,
    /// Whether a fetch is in flight for the current identity
    pub is_fetching: bool,
    /// Whether the entry was invalidated since its last fetch
    pub is_stale: bool,
    /// When the latest fetch completed
    pub last_fetched_at: Option<Timestamp>,
}

impl<T> Default for QueryState<T> {
    fn default() -> Self {
        Self {
            status: QueryStatus::Idle,
            data: None,
            error: None,
            is_fetching: false,
            is_stale: false,
            last_fetched_at: None,
        }
    }
}

impl<T> QueryState<T> {
    /// A first fetch is in flight
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.status == QueryStatus::Loading
    }

    /// The latest fetch succeeded
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == QueryStatus::Success
    }

    /// The latest fetch failed
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.status == QueryStatus::Error
    }

    /// At least one fetch completed, successfully or not
    ///
    /// Stays true through later refetches.
    #[must_use]
    pub fn has_resolved(&self) -> bool {
        self.last_fetched_at.is_some()
    }

    /// Map the data, keeping the rest of the state
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> QueryState<U> {
        QueryState {
            status: self.status,
            data: self.data.map(f),
            error: self.error,
            is_fetching: self.is_fetching,
            is_stale: self.is_stale,
            last_fetched_at: self.last_fetched_at,
        }
    }
}
