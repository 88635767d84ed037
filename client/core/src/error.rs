//! Client Errors
//!
//! Errors surfaced by the data-access layer, the query cache and the
//! connection resolver.
//!
//! - **NotAvailable**: an operation was attempted with no connection handle
//! - **Remote**: the ledger rejected or failed a call; carried verbatim
//! - **Connection**: acquiring or initializing a handle failed
//! - **StaleIdentity**: a result arrived for an identity that is no longer current
//! - **Cache**: a cached value had an unexpected type
//!
//! Errors are `Clone` because a single in-flight fetch is shared by every
//! reader of the same key, and each of them receives the outcome.

use thiserror::Error;

/// Error type for all client-core operations
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ClientError {
    /// No connection handle is available
    #[error("Ledger connection not available")]
    NotAvailable,

    /// The remote ledger call failed
    #[error("Ledger call `{operation}` failed: {message}")]
    Remote {
        /// Remote operation name
        operation: &'static str,
        /// Error text as reported by the transport or the service
        message: String,
    },

    /// A connection handle could not be created or initialized
    #[error("Failed to connect to ledger: {0}")]
    Connection(String),

    /// Result belongs to an identity that has since changed
    #[error("Result discarded: identity changed while the call was in flight")]
    StaleIdentity,

    /// Cached value could not be read back as the requested type
    #[error("Cache error: {0}")]
    Cache(String),
}

impl ClientError {
    /// Wrap a remote failure with the name of the operation that failed
    pub fn remote(operation: &'static str, err: &anyhow::Error) -> Self {
        Self::Remote {
            operation,
            message: format!("{err:#}"),
        }
    }

    /// Whether this is a connection-unavailable condition
    #[must_use]
    pub fn is_not_available(&self) -> bool {
        matches!(self, Self::NotAvailable)
    }
}

/// Result alias for client-core operations
pub type ClientResult<T> = Result<T, ClientError>;
