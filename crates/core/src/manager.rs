//! Multi-provider login orchestration
//!
//! [`AuthManager`] owns one adapter and at most one session per provider id.
//! Every operation on a provider runs the same way:
//!
//! 1. lock the provider's session, check the phase, apply the opening
//!    transition (e.g. `Authorizing → Exchanging`) and tag it with a fresh
//!    attempt id
//! 2. release the lock and await the adapter
//! 3. re-lock and apply the result only if the attempt id still matches;
//!    a `cancel`/`logout` in between makes the result stale and it is dropped
//!
//! The lock is never held across an `.await`. Each transition is queued on
//! the provider's [`EventQueue`] before the lock is released and delivered
//! after, so observers see a provider's transitions in the order they happened.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use socialauth_common::validate_correlation;
use socialauth_domain::{
    AuthError, AuthorizationRequest, CallbackPayload, ManagerSettings, ProviderId, Result,
    SessionPhase, Token,
};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::events::{EventHub, EventQueue, StateChange, StateObserver, SubscriptionId};
use crate::ports::ProviderAdapter;
use crate::session::{SessionInput, SessionSnapshot, SessionState, Transition};

struct ProviderSlot {
    id: ProviderId,
    adapter: Arc<dyn ProviderAdapter>,
    session: Mutex<Option<SessionState>>,
    events: EventQueue,
}

impl ProviderSlot {
    /// Queue a transition for delivery. Call with the session lock held.
    fn stage(&self, transition: Transition, error: Option<AuthError>) {
        debug!(
            provider = %self.id,
            from = %transition.from,
            to = %transition.to,
            error = error.as_ref().map(AuthError::kind),
            "Session transition"
        );
        self.events.push(StateChange::new(self.id.clone(), transition.from, transition.to, error));
    }

    /// Deliver queued transitions. Call after the session lock is released.
    fn flush(&self, hub: &EventHub) {
        self.events.deliver(hub);
    }
}

/// Single entry point the host calls for third-party logins
///
/// Cheap to share behind an `Arc`; all methods take `&self`.
pub struct AuthManager {
    providers: RwLock<HashMap<ProviderId, Arc<ProviderSlot>>>,
    events: EventHub,
    refresh_threshold_seconds: i64,
}

impl Default for AuthManager {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthManager {
    /// Create a manager with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::with_settings(&ManagerSettings::default())
    }

    #[must_use]
    pub fn with_settings(settings: &ManagerSettings) -> Self {
        Self {
            providers: RwLock::new(HashMap::new()),
            events: EventHub::with_capacity(settings.event_capacity),
            refresh_threshold_seconds: settings.refresh_threshold_seconds,
        }
    }

    // ========================================================================
    // Registry
    // ========================================================================

    /// Register an adapter under its own [`ProviderAdapter::provider_id`].
    ///
    /// # Errors
    /// `DuplicateProvider` if the id is taken.
    pub fn register_provider(&self, adapter: Arc<dyn ProviderAdapter>) -> Result<()> {
        let id = adapter.provider_id().clone();
        self.insert(id, adapter)
    }

    /// Register an adapter under an explicit id.
    ///
    /// The id must equal the adapter's own id so that tokens it issues carry
    /// the key they are stored under.
    ///
    /// # Errors
    /// `Configuration` if the ids differ, `DuplicateProvider` if the id is
    /// taken.
    pub fn register_provider_as(
        &self,
        id: impl Into<ProviderId>,
        adapter: Arc<dyn ProviderAdapter>,
    ) -> Result<()> {
        let id = id.into();
        if adapter.provider_id() != &id {
            return Err(AuthError::Configuration(format!(
                "adapter identifies as {} but was registered as {id}",
                adapter.provider_id()
            )));
        }
        self.insert(id, adapter)
    }

    fn insert(&self, id: ProviderId, adapter: Arc<dyn ProviderAdapter>) -> Result<()> {
        let mut providers = self.providers.write();
        if providers.contains_key(&id) {
            return Err(AuthError::DuplicateProvider(id.to_string()));
        }

        debug!(provider = %id, "Registered provider");
        providers.insert(
            id.clone(),
            Arc::new(ProviderSlot {
                id,
                adapter,
                session: Mutex::new(None),
                events: EventQueue::default(),
            }),
        );
        Ok(())
    }

    /// Remove a provider and drop its session without revoking.
    ///
    /// Callbacks or results that arrive for it afterwards are rejected.
    ///
    /// # Errors
    /// `UnknownProvider` if the id is not registered.
    pub fn unregister_provider(&self, id: &str) -> Result<()> {
        let slot = self
            .providers
            .write()
            .remove(id)
            .ok_or_else(|| AuthError::UnknownProvider(id.to_string()))?;

        {
            let mut guard = slot.session.lock();
            let reset = guard.take().and_then(|mut session| {
                session.apply(SessionInput::Reset).ok().filter(|t| t.from != t.to)
            });
            if let Some(transition) = reset {
                slot.stage(transition, None);
            }
        }
        slot.flush(&self.events);

        debug!(provider = %id, "Unregistered provider");
        Ok(())
    }

    /// Registered provider ids, sorted.
    #[must_use]
    pub fn providers(&self) -> Vec<ProviderId> {
        let mut ids: Vec<ProviderId> = self.providers.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    fn slot(&self, id: &str) -> Result<Arc<ProviderSlot>> {
        self.providers
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| AuthError::UnknownProvider(id.to_string()))
    }

    // ========================================================================
    // Login
    // ========================================================================

    /// Start a login and return the request the host must present
    ///
    /// Allowed from `Idle`, `Failed`, `Expired` and `Authenticated` (a new
    /// login replaces the current token once it completes).
    ///
    /// # Errors
    /// - `UnknownProvider` if the id is not registered
    /// - `OperationInProgress` if a login or refresh is outstanding
    /// - the adapter's `Configuration` error; the session is left unchanged
    pub fn login(&self, id: &str) -> Result<AuthorizationRequest> {
        let slot = self.slot(id)?;

        let request = {
            let mut guard = slot.session.lock();
            let phase = guard.as_ref().map_or(SessionPhase::Idle, SessionState::phase);
            if phase.is_pending() || phase.is_in_flight() {
                return Err(AuthError::OperationInProgress(id.to_string()));
            }

            let request = slot.adapter.begin_authorization()?;
            let session = guard.get_or_insert_with(SessionState::new);
            let transition = session.apply(SessionInput::Begin(request.clone()))?;
            slot.stage(transition, None);
            request
        };

        slot.flush(&self.events);
        info!(provider = %id, "Authorization started");
        Ok(request)
    }

    /// Route a provider callback to the pending login
    ///
    /// On success the session is `Authenticated` and the new token is
    /// returned.
    ///
    /// # Errors
    /// - `UnknownProvider` if the id is not registered
    /// - `OperationInProgress` while the code exchange is running
    /// - `NoPendingAuthorization` unless the session is `Authorizing`, or if
    ///   the login was cancelled while the exchange ran
    /// - `MalformedCallback` if the payload carries no correlation token
    ///   (session becomes `Failed`)
    /// - `CorrelationMismatch` if the correlation token differs (session
    ///   unchanged)
    /// - adapter errors; `NetworkFailure` returns the session to
    ///   `Authorizing` so the same callback can be replayed
    pub async fn handle_callback(&self, id: &str, payload: &CallbackPayload) -> Result<Token> {
        let slot = self.slot(id)?;
        let attempt = Uuid::new_v4();

        let (expected, verifier) = {
            let mut guard = slot.session.lock();
            let session = Self::pending_session(&mut guard, id)?;
            let expected = session
                .correlation()
                .map(str::to_string)
                .ok_or_else(|| AuthError::NoPendingAuthorization(id.to_string()))?;

            match payload.state() {
                None => {
                    let error = AuthError::MalformedCallback(
                        "callback carries no correlation token".to_string(),
                    );
                    let transition = session.apply(SessionInput::CallbackRejected(error.clone()))?;
                    slot.stage(transition, Some(error.clone()));
                    drop(guard);
                    slot.flush(&self.events);
                    return Err(error);
                }
                Some(actual) if !validate_correlation(&expected, actual) => {
                    session.record_error(AuthError::CorrelationMismatch);
                    warn!(provider = %id, "Rejected callback with mismatched correlation token");
                    return Err(AuthError::CorrelationMismatch);
                }
                Some(_) => {}
            }

            let verifier = session.pkce_verifier().map(str::to_string);
            let transition = session.apply(SessionInput::CallbackAccepted { attempt })?;
            slot.stage(transition, None);
            drop(guard);
            slot.flush(&self.events);
            (expected, verifier)
        };

        let outcome =
            slot.adapter.complete_authorization(payload, &expected, verifier.as_deref()).await;

        let result = {
            let mut guard = slot.session.lock();
            let session = Self::current_attempt(&mut guard, attempt, id)?;

            let (input, result) = match outcome {
                Ok(token) => (SessionInput::ExchangeSucceeded(token.clone()), Ok(token)),
                Err(error @ (AuthError::NetworkFailure(_) | AuthError::CorrelationMismatch)) => {
                    (SessionInput::ExchangeInterrupted(error.clone()), Err(error))
                }
                Err(error) => (SessionInput::ExchangeFailed(error.clone()), Err(error)),
            };
            let transition = session.apply(input)?;
            slot.stage(transition, result.as_ref().err().cloned());
            result
        };

        slot.flush(&self.events);
        match &result {
            Ok(token) => info!(provider = %id, scopes = token.scopes().len(), "Login completed"),
            Err(error) if error.is_security_rejection() => {
                warn!(provider = %id, error = %error, "Adapter rejected callback correlation");
            }
            Err(error) => warn!(provider = %id, error = %error, "Code exchange failed"),
        }
        result
    }

    /// Parse a redirect URI and route it like [`handle_callback`](Self::handle_callback).
    ///
    /// # Errors
    /// As `handle_callback`. An unparsable URI fails a pending login with
    /// `MalformedCallback`.
    pub async fn handle_callback_uri(&self, id: &str, uri: &str) -> Result<Token> {
        match CallbackPayload::from_uri(uri) {
            Ok(payload) => self.handle_callback(id, &payload).await,
            Err(error) => {
                let slot = self.slot(id)?;
                {
                    let mut guard = slot.session.lock();
                    let session = Self::pending_session(&mut guard, id)?;
                    let transition = session.apply(SessionInput::CallbackRejected(error.clone()))?;
                    slot.stage(transition, Some(error.clone()));
                }
                slot.flush(&self.events);
                Err(error)
            }
        }
    }

    /// Abandon a pending login
    ///
    /// The correlation token is invalidated, so a late callback is rejected
    /// and a running exchange's result is discarded.
    ///
    /// # Errors
    /// `UnknownProvider`, or `NoPendingAuthorization` unless the session is
    /// `Authorizing` or `Exchanging`.
    pub fn cancel(&self, id: &str) -> Result<()> {
        let slot = self.slot(id)?;

        {
            let mut guard = slot.session.lock();
            let transition = match guard.as_mut() {
                Some(session) if session.phase().is_pending() => {
                    session.apply(SessionInput::Cancel)?
                }
                _ => return Err(AuthError::NoPendingAuthorization(id.to_string())),
            };
            slot.stage(transition, None);
        }

        slot.flush(&self.events);
        info!(provider = %id, "Authorization cancelled");
        Ok(())
    }

    // ========================================================================
    // Refresh
    // ========================================================================

    /// Replace the current token using its refresh credential
    ///
    /// # Errors
    /// - `UnknownProvider` if the id is not registered
    /// - `OperationInProgress` while an exchange or refresh is running
    /// - `NotAuthenticated` unless the session is `Authenticated`
    /// - `RefreshUnsupported` if the token has no refresh credential (session
    ///   unchanged)
    /// - `TokenExpiredIrrecoverably` if the provider rejects the credential
    ///   (session becomes `Expired`)
    /// - other adapter errors; the session keeps the old token
    pub async fn refresh(&self, id: &str) -> Result<Token> {
        let slot = self.slot(id)?;
        let attempt = Uuid::new_v4();

        let current = {
            let mut guard = slot.session.lock();
            let Some(session) = guard.as_mut() else {
                return Err(AuthError::NotAuthenticated(id.to_string()));
            };
            match session.phase() {
                SessionPhase::Authenticated => {}
                SessionPhase::Exchanging | SessionPhase::Refreshing => {
                    return Err(AuthError::OperationInProgress(id.to_string()));
                }
                _ => return Err(AuthError::NotAuthenticated(id.to_string())),
            }

            let current = session
                .token()
                .cloned()
                .ok_or_else(|| AuthError::NotAuthenticated(id.to_string()))?;
            if !current.is_refreshable() {
                return Err(AuthError::RefreshUnsupported(id.to_string()));
            }

            let transition = session.apply(SessionInput::RefreshStarted { attempt })?;
            slot.stage(transition, None);
            drop(guard);
            slot.flush(&self.events);
            current
        };

        let outcome = slot.adapter.refresh(&current).await;

        let result = {
            let mut guard = slot.session.lock();
            let session = Self::current_attempt(&mut guard, attempt, id)?;

            let (input, result) = match outcome {
                Ok(token) => (SessionInput::RefreshSucceeded(token.clone()), Ok(token)),
                Err(error @ AuthError::TokenExpiredIrrecoverably(_)) => {
                    (SessionInput::RefreshFailed(error.clone()), Err(error))
                }
                Err(error) => (SessionInput::RefreshInterrupted(error.clone()), Err(error)),
            };
            let transition = session.apply(input)?;
            slot.stage(transition, result.as_ref().err().cloned());
            result
        };

        slot.flush(&self.events);
        match &result {
            Ok(_) => info!(provider = %id, "Successfully refreshed access token"),
            Err(error) => warn!(provider = %id, error = %error, "Token refresh failed"),
        }
        result
    }

    /// Access credential for `id`, refreshed first if it expires within the
    /// configured threshold
    ///
    /// # Errors
    /// - `NotAuthenticated` if no token is held
    /// - `TokenExpiredIrrecoverably` if the token has expired and cannot be
    ///   refreshed; the session moves to `Expired` and the token is dropped
    /// - any error of [`refresh`](Self::refresh)
    pub async fn access_token(&self, id: &str) -> Result<String> {
        let slot = self.slot(id)?;
        let (phase, token) = {
            let guard = slot.session.lock();
            let session = guard.as_ref();
            let token = session.and_then(SessionState::token).cloned();
            (session.map_or(SessionPhase::Idle, SessionState::phase), token)
        };
        let token = token.ok_or_else(|| AuthError::NotAuthenticated(id.to_string()))?;

        if phase == SessionPhase::Authenticated && token.needs_refresh(self.refresh_threshold_seconds)
        {
            debug!(provider = %id, "Token inside refresh window, refreshing before use");
            return self.refresh(id).await.map(|fresh| fresh.access_token().to_string());
        }
        if token.is_expired(0) && !token.is_refreshable() {
            return Err(self.expire_lapsed(&slot, &token));
        }
        Ok(token.access_token().to_string())
    }

    /// Move a session whose non-refreshable `token` ran out to `Expired`.
    ///
    /// Leaves the session alone if a login or logout replaced the token in
    /// the meantime.
    fn expire_lapsed(&self, slot: &ProviderSlot, token: &Token) -> AuthError {
        let error = AuthError::TokenExpiredIrrecoverably(slot.id.to_string());
        {
            let mut guard = slot.session.lock();
            if let Some(session) = guard.as_mut().filter(|s| {
                s.phase() == SessionPhase::Authenticated && s.token() == Some(token)
            }) {
                if let Ok(transition) = session.apply(SessionInput::TokenLapsed(error.clone())) {
                    slot.stage(transition, Some(error.clone()));
                }
            }
        }
        slot.flush(&self.events);
        warn!(provider = %slot.id, "Access token expired without a refresh credential");
        error
    }

    /// Refresh every authenticated token inside the refresh window
    ///
    /// Returns one entry per attempted refresh.
    pub async fn refresh_expiring(&self) -> Vec<(ProviderId, Result<Token>)> {
        let slots: Vec<Arc<ProviderSlot>> = self.providers.read().values().cloned().collect();
        let due: Vec<ProviderId> = slots
            .iter()
            .filter(|slot| {
                slot.session.lock().as_ref().is_some_and(|session| {
                    session.phase() == SessionPhase::Authenticated
                        && session
                            .token()
                            .is_some_and(|t| t.needs_refresh(self.refresh_threshold_seconds))
                })
            })
            .map(|slot| slot.id.clone())
            .collect();

        let mut results = Vec::with_capacity(due.len());
        for id in due {
            let outcome = self.refresh(id.as_str()).await;
            results.push((id, outcome));
        }
        results
    }

    /// Run [`refresh_expiring`](Self::refresh_expiring) every `period`
    ///
    /// The task holds a weak reference and stops once the manager is dropped.
    /// Must be called from within a tokio runtime.
    #[must_use = "dropping the handle detaches the task; abort it to stop refreshing"]
    pub fn spawn_auto_refresh(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let manager: Weak<Self> = Arc::downgrade(self);
        info!(period_secs = period.as_secs(), "Starting token auto-refresh background task");

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(manager) = manager.upgrade() else {
                    debug!("Auth manager dropped, stopping auto-refresh");
                    break;
                };
                for (provider, outcome) in manager.refresh_expiring().await {
                    if let Err(error) = outcome {
                        warn!(provider = %provider, error = %error, "Background refresh failed");
                    }
                }
            }
        })
    }

    // ========================================================================
    // Logout and queries
    // ========================================================================

    /// Destroy the session, then revoke its token best-effort
    ///
    /// Always succeeds locally for a registered provider; revocation failures
    /// are logged.
    ///
    /// # Errors
    /// `UnknownProvider` if the id is not registered.
    pub async fn logout(&self, id: &str) -> Result<()> {
        let slot = self.slot(id)?;

        let token = {
            let mut guard = slot.session.lock();
            guard.take().and_then(|mut session| {
                let token = session.token().cloned();
                if let Some(transition) =
                    session.apply(SessionInput::Reset).ok().filter(|t| t.from != t.to)
                {
                    slot.stage(transition, None);
                }
                token
            })
        };

        slot.flush(&self.events);
        info!(provider = %id, "Logged out");

        if let Some(token) = token {
            if let Err(error) = slot.adapter.revoke(&token).await {
                warn!(provider = %id, error = %error, "Token revocation failed");
            }
        }
        Ok(())
    }

    /// Current token, only while `Authenticated` or `Refreshing`.
    #[must_use]
    pub fn current_token(&self, id: &str) -> Option<Token> {
        let slot = self.slot(id).ok()?;
        let guard = slot.session.lock();
        guard.as_ref().and_then(SessionState::token).cloned()
    }

    /// `None` for unknown providers, `Idle` when there is no session.
    #[must_use]
    pub fn phase(&self, id: &str) -> Option<SessionPhase> {
        let slot = self.slot(id).ok()?;
        let guard = slot.session.lock();
        Some(guard.as_ref().map_or(SessionPhase::Idle, SessionState::phase))
    }

    #[must_use]
    pub fn snapshot(&self, id: &str) -> Option<SessionSnapshot> {
        let slot = self.slot(id).ok()?;
        let guard = slot.session.lock();
        Some(guard.as_ref().map_or_else(|| SessionState::new().snapshot(), SessionState::snapshot))
    }

    #[must_use]
    pub fn last_error(&self, id: &str) -> Option<AuthError> {
        let slot = self.slot(id).ok()?;
        let guard = slot.session.lock();
        guard.as_ref().and_then(SessionState::last_error).cloned()
    }

    // ========================================================================
    // Events
    // ========================================================================

    /// Call `observer` on every state change until unsubscribed.
    pub fn subscribe(&self, observer: Arc<dyn StateObserver>) -> SubscriptionId {
        self.events.subscribe(observer)
    }

    /// Returns `false` if the subscription was already removed.
    pub fn unsubscribe(&self, subscription: SubscriptionId) -> bool {
        self.events.unsubscribe(subscription)
    }

    /// Receiver of every state change published from now on.
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<StateChange> {
        self.events.receiver()
    }

    // ========================================================================
    // Guards
    // ========================================================================

    fn pending_session<'a>(
        guard: &'a mut Option<SessionState>,
        id: &str,
    ) -> Result<&'a mut SessionState> {
        match guard.as_mut() {
            Some(session) if session.phase() == SessionPhase::Authorizing => Ok(session),
            Some(session) if session.phase() == SessionPhase::Exchanging => {
                Err(AuthError::OperationInProgress(id.to_string()))
            }
            _ => Err(AuthError::NoPendingAuthorization(id.to_string())),
        }
    }

    fn current_attempt<'a>(
        guard: &'a mut Option<SessionState>,
        attempt: Uuid,
        id: &str,
    ) -> Result<&'a mut SessionState> {
        match guard.as_mut() {
            Some(session) if session.is_current_attempt(attempt) => Ok(session),
            _ => {
                debug!(provider = %id, "Discarding result of a superseded attempt");
                Err(AuthError::NoPendingAuthorization(id.to_string()))
            }
        }
    }
}
