//! Client Messages
//!
//! Messages sent from the client core to the UI. The UI renders from the
//! query cache and reacts to these directives; it holds no orchestration
//! logic of its own.

use serde::{Deserialize, Serialize};

use crate::models::{Timestamp, TripId};

/// Messages from the client core to the UI
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ClientMessage {
    // ============================================
    // Lifecycle
    // ============================================
    /// Bootstrap state changed
    State {
        /// The new state
        state: BootstrapState,
    },

    // ============================================
    // Directives
    // ============================================
    /// Open the trip-creation prompt for a first-time user
    ShowTripPrompt,

    /// Open the expense form for the active trip
    ShowExpenseForm {
        /// Trip the expense will be recorded against
        trip_id: TripId,
    },

    /// Navigate to settings
    OpenSettings {
        /// Why the user is being sent there
        reason: String,
    },

    // ============================================
    // Outcomes
    // ============================================
    /// A trip was made active without user action
    TripActivated {
        /// The activated trip
        trip_id: TripId,
    },

    /// A trip was created from the prompt
    TripCreated {
        /// The new trip
        trip_id: TripId,
    },

    /// Exchange rates were refreshed
    RatesRefreshed {
        /// Whether the refresh was started automatically
        automatic: bool,
        /// When the refresh completed
        at: Timestamp,
    },

    /// User-facing notification
    Notify {
        /// Severity
        level: NotifyLevel,
        /// Message content
        message: String,
    },
}

/// Notification levels
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotifyLevel {
    /// Informational
    Info,
    /// Warning
    Warning,
    /// Error
    Error,
    /// Success
    Success,
}

/// Bootstrap states, in the order a session passes through them
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BootstrapState {
    /// Waiting for the identity provider
    #[default]
    IdentityResolving,
    /// No identity; waiting for login
    Unauthenticated,
    /// Identity known; handle or initial trip list still loading
    ConnectionAcquiring,
    /// Handle present and initial trip list resolved
    Ready,
}

impl BootstrapState {
    /// Human-readable description
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::IdentityResolving => "Checking sign-in...",
            Self::Unauthenticated => "Signed out",
            Self::ConnectionAcquiring => "Loading your trips...",
            Self::Ready => "Ready",
        }
    }

    /// Whether the UI should show a blocking loading indicator
    #[must_use]
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::IdentityResolving | Self::ConnectionAcquiring)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loading_states() {
        assert!(BootstrapState::IdentityResolving.is_loading());
        assert!(BootstrapState::ConnectionAcquiring.is_loading());
        assert!(!BootstrapState::Unauthenticated.is_loading());
        assert!(!BootstrapState::Ready.is_loading());
    }

    #[test]
    fn test_message_serialization() {
        let msg = ClientMessage::State {
            state: BootstrapState::Ready,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"State":{"state":"Ready"}}"#);
    }
}
