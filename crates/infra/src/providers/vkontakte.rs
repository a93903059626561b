//! VKontakte login
//!
//! Authorization-code flow against `oauth.vk.com`:
//!
//! 1. the user is sent to `/authorize` with `client_id`, `redirect_uri`,
//!    `display`, comma-joined `scope`, `response_type=code`, API version `v`
//!    and `state`
//! 2. VK redirects back with `code` and `state` (or `error`,
//!    `error_reason`, `error_description`)
//! 3. the code is exchanged with `GET /access_token`, which answers with
//!    `access_token`, `expires_in` (0 for `offline` tokens), `user_id` and,
//!    when the `email` scope was granted, `email`
//!
//! VK issues no refresh credential. An expired token means a new login.
//! Implicit-flow redirects (`#access_token=...`) are accepted as well.

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use socialauth_common::generate_correlation_token;
use socialauth_core::ProviderAdapter;
use socialauth_domain::constants::VKONTAKTE_PROVIDER_NAME;
use socialauth_domain::{
    impl_domain_enum_conversions, AuthError, AuthorizationRequest, CallbackPayload,
    ProviderConfig, ProviderId, Result, Token,
};
use tracing::{debug, info};
use url::Url;

use super::{authorization_code, verify_callback};
use crate::errors::conversions::status_error;
use crate::errors::InfraError;
use crate::http::HttpClient;

pub const VK_AUTHORIZE_URL: &str = "https://oauth.vk.com/authorize";
pub const VK_TOKEN_URL: &str = "https://oauth.vk.com/access_token";
/// Redirect target for standalone (desktop/mobile) applications.
pub const VK_DEFAULT_REDIRECT_URI: &str = "https://oauth.vk.com/blank.html";
pub const VK_DEFAULT_API_VERSION: &str = "5.131";

/// Appearance of the VK authorization page
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum VkDisplay {
    #[default]
    Page,
    Popup,
    Mobile,
}

impl_domain_enum_conversions!(VkDisplay {
    Page => "page",
    Popup => "popup",
    Mobile => "mobile",
});

/// Access-token response of `GET /access_token`
#[derive(Debug, Deserialize)]
struct VkTokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: i64,
    #[serde(default)]
    user_id: Option<u64>,
    #[serde(default)]
    email: Option<String>,
}

/// [`ProviderAdapter`] for VKontakte
///
/// # Examples
///
/// ```
/// use socialauth_core::ProviderAdapter;
/// use socialauth_domain::ProviderConfig;
/// use socialauth_infra::providers::VkontakteAdapter;
///
/// let adapter = VkontakteAdapter::new(ProviderConfig::new("app123", "s3cr3t").with_scopes(["friends", "email"]))
///     .unwrap()
///     .with_provider_id("vk");
/// let request = adapter.begin_authorization().unwrap();
/// assert!(request.url().as_str().starts_with("https://oauth.vk.com/authorize?"));
/// assert!(request.url().as_str().contains("scope=friends%2Cemail"));
/// ```
pub struct VkontakteAdapter {
    id: ProviderId,
    config: ProviderConfig,
    http: HttpClient,
    authorize_url: Url,
    token_url: Url,
    revoke_url: Option<Url>,
    api_version: String,
    display: VkDisplay,
}

impl VkontakteAdapter {
    /// Adapter registered as `"vkontakte"` against the production endpoints.
    ///
    /// # Errors
    /// Returns [`AuthError::Configuration`] if the HTTP client cannot be built.
    pub fn new(config: ProviderConfig) -> Result<Self> {
        Ok(Self {
            id: ProviderId::new(VKONTAKTE_PROVIDER_NAME),
            config,
            http: HttpClient::new()?,
            authorize_url: Url::parse(VK_AUTHORIZE_URL).map_err(InfraError::from)?,
            token_url: Url::parse(VK_TOKEN_URL).map_err(InfraError::from)?,
            revoke_url: None,
            api_version: VK_DEFAULT_API_VERSION.to_string(),
            display: VkDisplay::default(),
        })
    }

    #[must_use]
    pub fn with_provider_id(mut self, id: impl Into<ProviderId>) -> Self {
        self.id = id.into();
        self
    }

    /// Point the adapter at other authorize and token endpoints.
    #[must_use]
    pub fn with_endpoints(mut self, authorize_url: Url, token_url: Url) -> Self {
        self.authorize_url = authorize_url;
        self.token_url = token_url;
        self
    }

    /// Endpoint called on logout with the access token.
    ///
    /// Without one, revocation is a no-op.
    #[must_use]
    pub fn with_revoke_url(mut self, revoke_url: Url) -> Self {
        self.revoke_url = Some(revoke_url);
        self
    }

    #[must_use]
    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = version.into();
        self
    }

    #[must_use]
    pub const fn with_display(mut self, display: VkDisplay) -> Self {
        self.display = display;
        self
    }

    #[must_use]
    pub fn with_http_client(mut self, http: HttpClient) -> Self {
        self.http = http;
        self
    }

    #[must_use]
    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    fn redirect_uri(&self) -> Result<Url> {
        if let Some(uri) = self.config.redirect_uri() {
            return Ok(uri.clone());
        }
        Url::parse(VK_DEFAULT_REDIRECT_URI).map_err(|e| InfraError::from(e).into())
    }

    /// `invalid_lifetime` builds the error for an `expires_in` past the
    /// representable range.
    fn token_from_response(
        &self,
        response: VkTokenResponse,
        invalid_lifetime: fn(String) -> AuthError,
    ) -> Result<Token> {
        let expires_in = response.expires_in;
        let mut builder = Token::builder(self.id.clone(), response.access_token)
            .scopes(self.config.scopes().iter().cloned())
            .try_expires_in(expires_in)
            .map_err(|_| invalid_lifetime(format!("expires_in out of range: {expires_in}")))?;
        if let Some(user_id) = response.user_id {
            builder = builder.user_id(user_id.to_string());
        }
        if let Some(email) = response.email.filter(|e| !e.is_empty()) {
            builder = builder.email(email);
        }
        builder.build()
    }

    /// Token delivered directly in an implicit-flow fragment.
    fn token_from_fragment(&self, payload: &CallbackPayload, access_token: &str) -> Result<Token> {
        let expires_in = match payload.get("expires_in") {
            Some(raw) => raw.parse::<i64>().map_err(|_| {
                AuthError::MalformedCallback(format!("expires_in is not a number: {raw}"))
            })?,
            None => 0,
        };
        let user_id = match payload.get("user_id") {
            Some(raw) => Some(raw.parse::<u64>().map_err(|_| {
                AuthError::MalformedCallback(format!("user_id is not a number: {raw}"))
            })?),
            None => None,
        };

        self.token_from_response(
            VkTokenResponse {
                access_token: access_token.to_string(),
                expires_in,
                user_id,
                email: payload.get("email").map(str::to_string),
            },
            AuthError::MalformedCallback,
        )
    }
}

#[async_trait]
impl ProviderAdapter for VkontakteAdapter {
    fn provider_id(&self) -> &ProviderId {
        &self.id
    }

    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn begin_authorization(&self) -> Result<AuthorizationRequest> {
        self.config.validate()?;

        let correlation = generate_correlation_token();
        let redirect_uri = self.redirect_uri()?;
        let display_name = self.display.to_string();

        let mut url = self.authorize_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("client_id", self.config.application_id())
                .append_pair("redirect_uri", redirect_uri.as_str())
                .append_pair("display", &display_name);
            if !self.config.scopes().is_empty() {
                query.append_pair("scope", &self.config.scopes().join(","));
            }
            query
                .append_pair("response_type", "code")
                .append_pair("v", &self.api_version)
                .append_pair("state", &correlation);
        }

        debug!(provider = %self.id, display = %display_name, "Built VK authorization url");
        Ok(AuthorizationRequest::new(self.id.clone(), url, correlation))
    }

    async fn complete_authorization(
        &self,
        payload: &CallbackPayload,
        expected_correlation: &str,
        _pkce_verifier: Option<&str>,
    ) -> Result<Token> {
        verify_callback(payload, expected_correlation)?;

        if let Some(access_token) = payload.get("access_token") {
            debug!(provider = %self.id, "VK callback carries an implicit-flow token");
            return self.token_from_fragment(payload, access_token);
        }

        let code = authorization_code(payload)?;
        let redirect_uri = self.redirect_uri()?;

        let request = self.http.request(Method::GET, self.token_url.clone()).query(&[
            ("client_id", self.config.application_id()),
            ("client_secret", self.config.application_secret()),
            ("redirect_uri", redirect_uri.as_str()),
            ("code", code),
        ]);
        let response: VkTokenResponse = self.http.send_json(request).await?;

        info!(
            provider = %self.id,
            offline = response.expires_in <= 0,
            has_email = response.email.is_some(),
            "VK code exchange completed"
        );
        self.token_from_response(response, |detail| {
            AuthError::rejected("invalid_response", Some(detail))
        })
    }

    async fn refresh(&self, _token: &Token) -> Result<Token> {
        Err(AuthError::RefreshUnsupported(self.id.to_string()))
    }

    async fn revoke(&self, token: &Token) -> Result<()> {
        let Some(revoke_url) = &self.revoke_url else {
            debug!(provider = %self.id, "No VK revocation endpoint configured; dropping token locally");
            return Ok(());
        };

        let request = self.http.request(Method::POST, revoke_url.clone()).form(&[
            ("access_token", token.access_token()),
            ("client_id", self.config.application_id()),
            ("v", self.api_version.as_str()),
        ]);
        let response = self.http.send(request).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status));
        }

        debug!(provider = %self.id, "VK token revoked");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn adapter() -> VkontakteAdapter {
        VkontakteAdapter::new(
            ProviderConfig::new("app123", "s3cr3t").with_scopes(["friends", "email", "offline"]),
        )
        .unwrap()
        .with_provider_id("vk")
    }

    fn query(url: &Url) -> HashMap<String, String> {
        url.query_pairs().into_owned().collect()
    }

    #[test]
    fn test_authorization_url() {
        let request = adapter().begin_authorization().unwrap();
        let params = query(request.url());

        assert_eq!(request.provider().as_str(), "vk");
        assert_eq!(request.url().host_str(), Some("oauth.vk.com"));
        assert_eq!(request.url().path(), "/authorize");
        assert_eq!(params["client_id"], "app123");
        assert_eq!(params["redirect_uri"], VK_DEFAULT_REDIRECT_URI);
        assert_eq!(params["display"], "page");
        assert_eq!(params["scope"], "friends,email,offline");
        assert_eq!(params["response_type"], "code");
        assert_eq!(params["v"], VK_DEFAULT_API_VERSION);
        assert_eq!(params["state"], request.correlation());
        assert!(request.pkce_verifier().is_none());
        assert!(!params.contains_key("client_secret"));
    }

    #[test]
    fn test_authorization_url_options() {
        let redirect = Url::parse("https://app.example/vk/callback").unwrap();
        let adapter = VkontakteAdapter::new(
            ProviderConfig::new("app123", "s3cr3t").with_redirect_uri(redirect),
        )
        .unwrap()
        .with_api_version("5.199")
        .with_display(VkDisplay::Mobile);

        let request = adapter.begin_authorization().unwrap();
        let params = query(request.url());
        assert_eq!(request.provider().as_str(), VKONTAKTE_PROVIDER_NAME);
        assert_eq!(params["redirect_uri"], "https://app.example/vk/callback");
        assert_eq!(params["display"], "mobile");
        assert_eq!(params["v"], "5.199");
        assert!(!params.contains_key("scope"));
    }

    #[test]
    fn test_correlation_is_fresh_per_attempt() {
        let adapter = adapter();
        let first = adapter.begin_authorization().unwrap();
        let second = adapter.begin_authorization().unwrap();
        assert_ne!(first.correlation(), second.correlation());
    }

    #[test]
    fn test_empty_secret_is_configuration_error() {
        let adapter = VkontakteAdapter::new(ProviderConfig::new("app123", "")).unwrap();
        assert!(matches!(adapter.begin_authorization(), Err(AuthError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_denied_callback() {
        let payload = CallbackPayload::from_pairs([
            ("state", "c1"),
            ("error", "access_denied"),
            ("error_reason", "user_denied"),
            ("error_description", "User denied your request"),
        ]);
        let err = adapter().complete_authorization(&payload, "c1", None).await.unwrap_err();
        assert_eq!(
            err,
            AuthError::rejected("access_denied", Some("User denied your request".into()))
        );
    }

    #[tokio::test]
    async fn test_mismatched_state() {
        let payload = CallbackPayload::from_pairs([("state", "forged"), ("code", "abc")]);
        let err = adapter().complete_authorization(&payload, "c1", None).await.unwrap_err();
        assert_eq!(err, AuthError::CorrelationMismatch);
    }

    #[tokio::test]
    async fn test_implicit_flow_fragment() {
        let payload = CallbackPayload::from_uri(
            "https://oauth.vk.com/blank.html#access_token=tok&expires_in=0&user_id=42&email=a%40b.c&state=c1",
        )
        .unwrap();
        let token = adapter().complete_authorization(&payload, "c1", None).await.unwrap();

        assert_eq!(token.access_token(), "tok");
        assert_eq!(token.expires_at(), None);
        assert_eq!(token.user_id(), Some("42"));
        assert_eq!(token.email(), Some("a@b.c"));
        assert!(token.has_scope("offline"));
    }

    #[tokio::test]
    async fn test_fragment_lifetime_out_of_range() {
        let payload = CallbackPayload::from_uri(
            "https://oauth.vk.com/blank.html#access_token=tok&expires_in=1000000000000000&state=c1",
        )
        .unwrap();
        let err = adapter().complete_authorization(&payload, "c1", None).await.unwrap_err();
        assert!(matches!(err, AuthError::MalformedCallback(ref msg) if msg.contains("expires_in")));
    }

    #[tokio::test]
    async fn test_refresh_unsupported() {
        let adapter = adapter();
        let token = Token::builder("vk", "tok").build().unwrap();
        assert_eq!(
            adapter.refresh(&token).await.unwrap_err(),
            AuthError::RefreshUnsupported("vk".into())
        );
    }

    #[tokio::test]
    async fn test_revoke_without_endpoint_is_noop() {
        let token = Token::builder("vk", "tok").build().unwrap();
        assert!(adapter().revoke(&token).await.is_ok());
    }
}
