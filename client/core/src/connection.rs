//! Connection Resolver
//!
//! Owns the ledger handle for the current identity. The handle lives in the
//! query cache under the identity-scoped `actor` key, so concurrent callers
//! share one connection attempt and a failed attempt is retried by the next
//! read.
//!
//! After an authenticated handle is created, the first initialization hook
//! it advertises is invoked once per identity. A handle with no hooks needs
//! no initialization.
//!
//! Identity transitions start a new cache epoch and invalidate every
//! non-connection entry. The transition guard makes repeated notifications
//! for the same identity a no-op.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;

use crate::backend::{ConnectionFactory, InitHook, LedgerService};
use crate::cache::{CacheKey, KeyFamily, Observer, QueryCache, QueryState, ScopeValue};
use crate::error::{ClientError, ClientResult};
use crate::identity::{IdentityScope, IdentityState};

/// Shared ledger handle
pub type Handle = Arc<dyn LedgerService>;

#[derive(Default)]
struct ResolverState {
    identity: IdentityState,
    last_invalidated: Option<IdentityScope>,
    initialized: HashSet<IdentityScope>,
}

/// Derives the ledger handle from the current identity
#[derive(Clone)]
pub struct ConnectionResolver {
    cache: QueryCache,
    factory: Arc<dyn ConnectionFactory>,
    admin_token: Arc<str>,
    state: Arc<Mutex<ResolverState>>,
}

impl ConnectionResolver {
    /// Create a resolver; `admin_token` is passed to secret-taking init hooks
    pub fn new(cache: QueryCache, factory: Arc<dyn ConnectionFactory>, admin_token: &str) -> Self {
        Self {
            cache,
            factory,
            admin_token: Arc::from(admin_token),
            state: Arc::new(Mutex::new(ResolverState::default())),
        }
    }

    /// The cache the handle is stored in
    #[must_use]
    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    /// Current identity state
    #[must_use]
    pub fn identity(&self) -> IdentityState {
        self.state.lock().identity.clone()
    }

    /// Current identity scope, once resolved
    #[must_use]
    pub fn current_scope(&self) -> Option<IdentityScope> {
        self.state.lock().identity.scope()
    }

    /// Cache key of the handle for `scope`
    #[must_use]
    pub fn connection_key(scope: &IdentityScope) -> CacheKey {
        CacheKey::identity(KeyFamily::Connection, scope)
    }

    /// Record a new identity state
    ///
    /// A resolved identity runs the transition invalidation. Returns
    /// whether it ran.
    pub fn set_identity(&self, identity: IdentityState) -> bool {
        let scope = identity.scope();
        self.state.lock().identity = identity;
        match scope {
            Some(scope) => self.on_identity_changed(&scope),
            None => false,
        }
    }

    /// Invalidate identity-dependent entries once per transition to `scope`
    ///
    /// Does nothing when the last transition already targeted `scope`.
    pub fn on_identity_changed(&self, scope: &IdentityScope) -> bool {
        {
            let mut state = self.state.lock();
            if state.last_invalidated.as_ref() == Some(scope) {
                return false;
            }
            state.last_invalidated = Some(scope.clone());
        }

        let epoch = self.cache.advance_epoch();
        let invalidated = self
            .cache
            .invalidate(|key| key.family() != KeyFamily::Connection);

        // Handles of other identities are recreated if those identities return.
        let current = ScopeValue::Identity(scope.clone());
        self.cache.invalidate(|key| {
            key.family() == KeyFamily::Connection && key.scope() != Some(&current)
        });

        tracing::info!(identity = %scope, epoch, invalidated, "Identity changed");
        true
    }

    /// Start acquiring the current identity's handle if needed
    ///
    /// Returns whether an attempt was started.
    pub fn ensure_handle(&self) -> bool {
        match self.current_scope() {
            Some(scope) => self
                .cache
                .ensure(Self::connection_key(&scope), self.loader(scope)),
            None => false,
        }
    }

    /// Keep the current identity's handle observed
    ///
    /// An observed handle is refetched as soon as it is invalidated.
    #[must_use]
    pub fn observe_handle(&self) -> Option<Observer> {
        self.current_scope()
            .map(|scope| self.cache.observe(Self::connection_key(&scope)))
    }

    /// Retry the current identity's handle if its last attempt failed
    ///
    /// A handle that is present or still being fetched is left alone.
    /// Returns whether a new attempt was scheduled.
    pub fn retry_failed(&self) -> bool {
        let Some(scope) = self.current_scope() else {
            return false;
        };
        let key = Self::connection_key(&scope);
        let state = self.cache.peek::<Handle>(&key);
        if state.error.is_none() || state.data.is_some() || state.is_fetching {
            return false;
        }

        self.cache.invalidate_prefix(&key);
        self.ensure_handle();
        tracing::info!(identity = %scope, "Retrying ledger connection");
        true
    }

    /// State of the current identity's handle
    #[must_use]
    pub fn handle_state(&self) -> QueryState<Handle> {
        match self.current_scope() {
            Some(scope) => self.cache.peek(&Self::connection_key(&scope)),
            None => QueryState::default(),
        }
    }

    /// The handle, if present and not being refetched
    ///
    /// Reads are disabled whenever this is `None`.
    #[must_use]
    pub fn ready_handle(&self) -> Option<Handle> {
        let state = self.handle_state();
        if state.is_fetching {
            None
        } else {
            state.data
        }
    }

    /// Whether reads are currently enabled
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.ready_handle().is_some()
    }

    /// The current identity's handle, acquiring it if needed
    pub async fn handle(&self) -> ClientResult<Handle> {
        let scope = self.current_scope().ok_or(ClientError::NotAvailable)?;
        self.handle_for(&scope).await
    }

    /// The handle for `scope`, which must still be the current identity
    pub async fn handle_for(&self, scope: &IdentityScope) -> ClientResult<Handle> {
        if self.current_scope().as_ref() != Some(scope) {
            return Err(ClientError::StaleIdentity);
        }
        self.cache
            .read(Self::connection_key(scope), self.loader(scope.clone()))
            .await
    }

    fn loader(
        &self,
        scope: IdentityScope,
    ) -> impl Fn() -> BoxFuture<'static, ClientResult<Handle>> + Send + Sync + 'static {
        let factory = Arc::clone(&self.factory);
        let state = Arc::clone(&self.state);
        let admin_token = Arc::clone(&self.admin_token);
        move || {
            let factory = Arc::clone(&factory);
            let state = Arc::clone(&state);
            let admin_token = Arc::clone(&admin_token);
            let scope = scope.clone();
            async move {
                let handle = factory
                    .connect(&scope)
                    .await
                    .map_err(|e| ClientError::Connection(format!("{e:#}")))?;
                if scope.is_authenticated() {
                    initialize_once(&state, handle.as_ref(), &scope, &admin_token).await?;
                }
                tracing::debug!(identity = %scope, transport = handle.name(), "Ledger handle ready");
                Ok::<_, ClientError>(handle)
            }
            .boxed()
        }
    }
}

async fn initialize_once(
    state: &Mutex<ResolverState>,
    handle: &dyn LedgerService,
    scope: &IdentityScope,
    admin_token: &str,
) -> ClientResult<()> {
    if state.lock().initialized.contains(scope) {
        return Ok(());
    }

    match InitHook::probe(handle) {
        Some(hook) => {
            handle
                .initialize(hook, admin_token)
                .await
                .map_err(|e| ClientError::Connection(format!("{hook} failed: {e:#}")))?;
            tracing::info!(identity = %scope, hook = %hook, "Ledger access initialized");
        }
        None => tracing::debug!(identity = %scope, "Ledger advertises no init hook"),
    }

    state.lock().initialized.insert(scope.clone());
    Ok(())
}
