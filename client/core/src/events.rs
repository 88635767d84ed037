//! Client Events
//!
//! Events sent to the client core by the identity provider and by the UI.
//! The UI reports what the user did; the orchestrator decides what follows.

use serde::{Deserialize, Serialize};

use crate::identity::Principal;
use crate::models::TripDraft;

/// Events from the identity provider and the UI
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ClientEvent {
    // ============================================
    // Identity Provider
    // ============================================
    /// Identity resolution finished at startup
    IdentityResolved {
        /// The signed-in principal, if any
        principal: Option<Principal>,
    },

    /// A login completed
    LoggedIn {
        /// The new principal
        principal: Principal,
    },

    /// The user logged out
    LoggedOut,

    // ============================================
    // UI
    // ============================================
    /// The first-run trip prompt was closed without creating a trip
    TripPromptDismissed,

    /// The first-run trip prompt was submitted
    TripPromptSubmitted {
        /// Trip to create
        draft: TripDraft,
    },

    /// The user asked to add an expense
    AddExpenseRequested,

    /// The user asked for fresh exchange rates
    RefreshRatesRequested,

    /// The user asked to retry a failed ledger connection
    RetryConnection,
}

impl ClientEvent {
    /// Whether the event comes from the identity provider
    #[must_use]
    pub fn is_identity_event(&self) -> bool {
        matches!(
            self,
            Self::IdentityResolved { .. } | Self::LoggedIn { .. } | Self::LoggedOut
        )
    }
}
