//! Identity Types
//!
//! The identity provider (login, logout, principal issuance) lives outside this
//! crate. The core only observes its outcome: either identity resolution is
//! still pending, or it has resolved to a principal or to nobody.
//!
//! Reads are scoped by [`IdentityScope`], where `anonymous` is a real scope
//! value and is distinct from "not yet known" ([`IdentityState::Resolving`]).

use serde::{Deserialize, Serialize};

/// Scope value used when no principal is logged in
pub const ANONYMOUS_SCOPE: &str = "anonymous";

/// Opaque principal identifying the current user to the ledger service
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Principal(String);

impl Principal {
    /// Wrap a textual principal
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    /// Textual form of the principal
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Principal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The identity a connection handle and its cached reads are scoped to
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IdentityScope {
    /// No principal; reads go through an unauthenticated handle
    Anonymous,
    /// An authenticated principal
    Principal(Principal),
}

impl IdentityScope {
    /// Build a scope from an optional principal
    #[must_use]
    pub fn from_principal(principal: Option<&Principal>) -> Self {
        principal.map_or(Self::Anonymous, |p| Self::Principal(p.clone()))
    }

    /// Whether this scope carries an authenticated principal
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Principal(_))
    }

    /// The principal, if authenticated
    #[must_use]
    pub fn principal(&self) -> Option<&Principal> {
        match self {
            Self::Anonymous => None,
            Self::Principal(p) => Some(p),
        }
    }

    /// Textual scope value (`"anonymous"` or the principal text)
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Anonymous => ANONYMOUS_SCOPE,
            Self::Principal(p) => p.as_str(),
        }
    }
}

impl std::fmt::Display for IdentityScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What the identity provider has reported so far
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum IdentityState {
    /// Identity resolution has not completed
    #[default]
    Resolving,
    /// Resolution completed; `None` means nobody is logged in
    Resolved(Option<Principal>),
}

impl IdentityState {
    /// Whether resolution has completed
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved(_))
    }

    /// The logged-in principal, if any
    #[must_use]
    pub fn principal(&self) -> Option<&Principal> {
        match self {
            Self::Resolved(Some(p)) => Some(p),
            _ => None,
        }
    }

    /// Scope for reads; `None` while still resolving
    #[must_use]
    pub fn scope(&self) -> Option<IdentityScope> {
        match self {
            Self::Resolving => None,
            Self::Resolved(p) => Some(IdentityScope::from_principal(p.as_ref())),
        }
    }
}
