//! Port interfaces for third-party login providers
//!
//! Each integration (VKontakte, a standard OAuth 2.0 server, ...) implements
//! [`ProviderAdapter`]. The manager drives the session lifecycle and calls
//! into the adapter only for the provider-specific steps.

use async_trait::async_trait;
use socialauth_domain::{
    AuthorizationRequest, CallbackPayload, ProviderConfig, ProviderId, Result, Token,
};

/// Provider-specific half of a third-party login
///
/// Adapters own their [`ProviderConfig`] and never reference the manager.
/// They hold no per-session state: the correlation token and PKCE verifier
/// of a pending login are handed back on completion.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Key the adapter registers under by default.
    fn provider_id(&self) -> &ProviderId;

    fn config(&self) -> &ProviderConfig;

    /// Build the authorization URL and a fresh correlation token
    ///
    /// Pure: no network traffic and no state change.
    ///
    /// # Errors
    /// `Configuration` when the application id or secret is empty or
    /// malformed.
    fn begin_authorization(&self) -> Result<AuthorizationRequest>;

    /// Validate a callback and exchange its authorization code for a token
    ///
    /// # Errors
    /// - `CorrelationMismatch` if the echoed state differs from
    ///   `expected_correlation`
    /// - `ProviderRejected` if the provider reports a denial
    /// - `MalformedCallback` if neither a code nor an error is present
    /// - `NetworkFailure` if the code exchange cannot complete
    async fn complete_authorization(
        &self,
        payload: &CallbackPayload,
        expected_correlation: &str,
        pkce_verifier: Option<&str>,
    ) -> Result<Token>;

    /// Obtain a fresh token using the refresh credential of `token`
    ///
    /// # Errors
    /// - `RefreshUnsupported` if the token has no refresh credential or the
    ///   provider has no refresh flow
    /// - `TokenExpiredIrrecoverably` if the provider rejects the credential
    /// - `NetworkFailure` otherwise
    async fn refresh(&self, token: &Token) -> Result<Token>;

    /// Invalidate `token` at the provider
    ///
    /// Best-effort; callers log failures and carry on.
    async fn revoke(&self, token: &Token) -> Result<()>;
}
