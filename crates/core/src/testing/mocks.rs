//! Mock implementations of core traits
//!
//! Provides mock objects for testing purposes.

// Mocks are intentionally simple; failures are visible in their return types
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::expect_used)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use socialauth_common::{generate_correlation_token, validate_correlation};
use socialauth_domain::{
    AuthError, AuthorizationRequest, CallbackPayload, ProviderConfig, ProviderId, Result,
    SessionPhase, Token,
};
use tokio::sync::Notify;
use url::Url;

use crate::events::{StateChange, StateObserver};
use crate::ports::ProviderAdapter;

const MOCK_AUTHORIZE_URL: &str = "https://provider.test/authorize";

/// Scriptable [`ProviderAdapter`]
///
/// Without scripting it behaves like a well-formed provider: it validates the
/// correlation token, reports `error` callbacks as rejections, and exchanges
/// any code for a one-hour refreshable token.
///
/// # Examples
///
/// ```
/// use socialauth_core::testing::MockProviderAdapter;
/// use socialauth_core::ProviderAdapter;
///
/// let adapter = MockProviderAdapter::new("vk").with_correlations(["c1"]);
/// let request = adapter.begin_authorization().unwrap();
/// assert_eq!(request.correlation(), "c1");
/// ```
pub struct MockProviderAdapter {
    id: ProviderId,
    config: ProviderConfig,
    correlations: Mutex<VecDeque<String>>,
    exchange_outcomes: Mutex<VecDeque<Result<Token>>>,
    refresh_outcomes: Mutex<VecDeque<Result<Token>>>,
    revoke_outcome: Mutex<Result<()>>,
    exchange_gate: Option<Arc<Notify>>,
    refresh_gate: Option<Arc<Notify>>,
    last_pkce_verifier: Mutex<Option<String>>,
    begin_calls: AtomicUsize,
    exchange_calls: AtomicUsize,
    refresh_calls: AtomicUsize,
    revoke_calls: AtomicUsize,
}

impl MockProviderAdapter {
    /// Create a mock configured with `app123` / `s3cr3t`.
    pub fn new(id: impl Into<ProviderId>) -> Self {
        Self::with_config(id, ProviderConfig::new("app123", "s3cr3t"))
    }

    pub fn with_config(id: impl Into<ProviderId>, config: ProviderConfig) -> Self {
        Self {
            id: id.into(),
            config,
            correlations: Mutex::new(VecDeque::new()),
            exchange_outcomes: Mutex::new(VecDeque::new()),
            refresh_outcomes: Mutex::new(VecDeque::new()),
            revoke_outcome: Mutex::new(Ok(())),
            exchange_gate: None,
            refresh_gate: None,
            last_pkce_verifier: Mutex::new(None),
            begin_calls: AtomicUsize::new(0),
            exchange_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            revoke_calls: AtomicUsize::new(0),
        }
    }

    /// Correlation tokens to issue, in order; random ones afterwards.
    #[must_use]
    pub fn with_correlations<I, S>(self, correlations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.correlations.lock().extend(correlations.into_iter().map(Into::into));
        self
    }

    /// Hold every code exchange until `gate` is notified.
    #[must_use]
    pub fn with_exchange_gate(mut self, gate: Arc<Notify>) -> Self {
        self.exchange_gate = Some(gate);
        self
    }

    /// Hold every refresh until `gate` is notified.
    #[must_use]
    pub fn with_refresh_gate(mut self, gate: Arc<Notify>) -> Self {
        self.refresh_gate = Some(gate);
        self
    }

    /// Queue the result of the next code exchange that passes validation.
    pub fn push_exchange_outcome(&self, outcome: Result<Token>) {
        self.exchange_outcomes.lock().push_back(outcome);
    }

    /// Queue the result of the next refresh.
    pub fn push_refresh_outcome(&self, outcome: Result<Token>) {
        self.refresh_outcomes.lock().push_back(outcome);
    }

    pub fn set_revoke_outcome(&self, outcome: Result<()>) {
        *self.revoke_outcome.lock() = outcome;
    }

    /// A one-hour refreshable token for this provider.
    pub fn sample_token(&self, access: &str) -> Token {
        Token::builder(self.id.clone(), access)
            .refresh_token(format!("{access}-refresh"))
            .expires_in(3600)
            .build()
            .expect("sample token carries an expiry")
    }

    pub fn last_pkce_verifier(&self) -> Option<String> {
        self.last_pkce_verifier.lock().clone()
    }

    pub fn begin_calls(&self) -> usize {
        self.begin_calls.load(Ordering::SeqCst)
    }

    pub fn exchange_calls(&self) -> usize {
        self.exchange_calls.load(Ordering::SeqCst)
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn revoke_calls(&self) -> usize {
        self.revoke_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderAdapter for MockProviderAdapter {
    fn provider_id(&self) -> &ProviderId {
        &self.id
    }

    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn begin_authorization(&self) -> Result<AuthorizationRequest> {
        self.config.validate()?;
        self.begin_calls.fetch_add(1, Ordering::SeqCst);

        let correlation =
            self.correlations.lock().pop_front().unwrap_or_else(generate_correlation_token);
        let mut url = Url::parse(MOCK_AUTHORIZE_URL)
            .map_err(|e| AuthError::Configuration(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("client_id", self.config.application_id())
            .append_pair("state", &correlation);

        Ok(AuthorizationRequest::new(self.id.clone(), url, correlation)
            .with_pkce_verifier(format!("verifier-{}", self.begin_calls())))
    }

    async fn complete_authorization(
        &self,
        payload: &CallbackPayload,
        expected_correlation: &str,
        pkce_verifier: Option<&str>,
    ) -> Result<Token> {
        self.exchange_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_pkce_verifier.lock() = pkce_verifier.map(str::to_string);

        let state = payload
            .state()
            .ok_or_else(|| AuthError::MalformedCallback("missing state".to_string()))?;
        if !validate_correlation(expected_correlation, state) {
            return Err(AuthError::CorrelationMismatch);
        }
        if let Some(error) = payload.error() {
            return Err(AuthError::rejected(error, payload.error_description().map(str::to_string)));
        }
        let code = payload
            .code()
            .ok_or_else(|| AuthError::MalformedCallback("missing code".to_string()))?;

        if let Some(gate) = &self.exchange_gate {
            gate.notified().await;
        }

        let scripted = self.exchange_outcomes.lock().pop_front();
        scripted.unwrap_or_else(|| Ok(self.sample_token(&format!("access-{code}"))))
    }

    async fn refresh(&self, token: &Token) -> Result<Token> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(gate) = &self.refresh_gate {
            gate.notified().await;
        }

        let scripted = self.refresh_outcomes.lock().pop_front();
        match scripted {
            Some(outcome) => outcome,
            None if token.is_refreshable() => {
                Ok(self.sample_token(&format!("{}-refreshed", token.access_token())))
            }
            None => Err(AuthError::RefreshUnsupported(self.id.to_string())),
        }
    }

    async fn revoke(&self, _token: &Token) -> Result<()> {
        self.revoke_calls.fetch_add(1, Ordering::SeqCst);
        self.revoke_outcome.lock().clone()
    }
}

/// [`StateObserver`] that records every change it sees
#[derive(Default)]
pub struct RecordingObserver {
    changes: Mutex<Vec<StateChange>>,
}

impl RecordingObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn changes(&self) -> Vec<StateChange> {
        self.changes.lock().clone()
    }

    /// `(from, to)` pairs in the order they were observed.
    pub fn transitions(&self) -> Vec<(SessionPhase, SessionPhase)> {
        self.changes.lock().iter().map(|c| (c.from, c.to)).collect()
    }

    pub fn clear(&self) {
        self.changes.lock().clear();
    }
}

impl StateObserver for RecordingObserver {
    fn on_state_change(&self, change: &StateChange) {
        self.changes.lock().push(change.clone());
    }
}
