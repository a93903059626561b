//! OAuth 2.0 adapter with PKCE support
//!
//! Works against any RFC 6749 authorization server:
//! - authorization URL with an RFC 7636 `S256` challenge
//! - authorization-code grant (form POST)
//! - refresh-token grant, keeping the old refresh credential when the server
//!   does not rotate it
//! - RFC 7009 token revocation

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use socialauth_common::{generate_correlation_token, PkceChallenge};
use socialauth_core::ProviderAdapter;
use socialauth_domain::{
    AuthError, AuthorizationRequest, CallbackPayload, ProviderConfig, ProviderId, Result, Token,
};
use tracing::{debug, info, warn};
use url::Url;

use super::{authorization_code, verify_callback};
use crate::errors::conversions::{classify_refresh_error, status_error};
use crate::http::HttpClient;

/// Successful token response (RFC 6749 §5.1)
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    scope: Option<String>,
}

/// [`ProviderAdapter`] for standard OAuth 2.0 servers
pub struct StandardOAuthAdapter {
    id: ProviderId,
    config: ProviderConfig,
    http: HttpClient,
    authorize_url: Url,
    token_url: Url,
    revoke_url: Option<Url>,
    use_pkce: bool,
    extra_authorize_params: Vec<(String, String)>,
}

impl StandardOAuthAdapter {
    /// # Errors
    /// Returns [`AuthError::Configuration`] if the HTTP client cannot be built.
    pub fn new(
        id: impl Into<ProviderId>,
        config: ProviderConfig,
        authorize_url: Url,
        token_url: Url,
    ) -> Result<Self> {
        Ok(Self {
            id: id.into(),
            config,
            http: HttpClient::new()?,
            authorize_url,
            token_url,
            revoke_url: None,
            use_pkce: true,
            extra_authorize_params: Vec::new(),
        })
    }

    #[must_use]
    pub fn with_revoke_url(mut self, revoke_url: Url) -> Self {
        self.revoke_url = Some(revoke_url);
        self
    }

    /// Leave out the PKCE challenge, for servers that reject it.
    #[must_use]
    pub const fn without_pkce(mut self) -> Self {
        self.use_pkce = false;
        self
    }

    /// Extra authorization URL parameters such as `audience` or `prompt`.
    #[must_use]
    pub fn with_authorize_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_authorize_params.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_http_client(mut self, http: HttpClient) -> Self {
        self.http = http;
        self
    }

    fn redirect_uri(&self) -> Result<&Url> {
        self.config.redirect_uri().ok_or_else(|| {
            AuthError::Configuration(format!("provider {} requires a redirect uri", self.id))
        })
    }

    /// POST a grant to the token endpoint.
    async fn request_token(&self, params: &[(&str, &str)]) -> Result<TokenResponse> {
        let request = self
            .http
            .request(Method::POST, self.token_url.clone())
            .header(reqwest::header::ACCEPT, "application/json")
            .form(params);
        self.http.send_json(request).await
    }

    fn build_token(&self, response: TokenResponse, previous_refresh: Option<&str>) -> Result<Token> {
        let mut builder = Token::builder(self.id.clone(), response.access_token);

        builder = match response.scope.as_deref() {
            Some(granted) => builder.scopes(granted.split_whitespace()),
            None => builder.scopes(self.config.scopes().iter().cloned()),
        };
        if let Some(token_type) = response.token_type {
            builder = builder.token_type(token_type);
        }
        if let Some(expires_in) = response.expires_in {
            builder = builder.try_expires_in(expires_in).map_err(|_| {
                AuthError::rejected(
                    "invalid_response",
                    Some(format!("expires_in out of range: {expires_in}")),
                )
            })?;
        }

        let refresh = response.refresh_token.as_deref().or(previous_refresh);
        match (refresh, response.expires_in.filter(|secs| *secs > 0)) {
            (Some(refresh), Some(_)) => builder = builder.refresh_token(refresh),
            (Some(_), None) => {
                warn!(provider = %self.id, "Discarding refresh credential issued without an expiry");
            }
            (None, _) => {}
        }

        builder.build()
    }
}

#[async_trait]
impl ProviderAdapter for StandardOAuthAdapter {
    fn provider_id(&self) -> &ProviderId {
        &self.id
    }

    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn begin_authorization(&self) -> Result<AuthorizationRequest> {
        self.config.validate()?;
        let redirect_uri = self.redirect_uri()?;

        let correlation = generate_correlation_token();
        let challenge = self.use_pkce.then(PkceChallenge::generate);

        let mut url = self.authorize_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("response_type", "code")
                .append_pair("client_id", self.config.application_id())
                .append_pair("redirect_uri", redirect_uri.as_str());
            if !self.config.scopes().is_empty() {
                query.append_pair("scope", &self.config.scopes().join(" "));
            }
            query.append_pair("state", &correlation);
            if let Some(challenge) = &challenge {
                query
                    .append_pair("code_challenge", &challenge.code_challenge)
                    .append_pair("code_challenge_method", challenge.challenge_method());
            }
            for (key, value) in &self.extra_authorize_params {
                query.append_pair(key, value);
            }
        }

        let request = AuthorizationRequest::new(self.id.clone(), url, correlation);
        Ok(match challenge {
            Some(challenge) => request.with_pkce_verifier(challenge.code_verifier),
            None => request,
        })
    }

    async fn complete_authorization(
        &self,
        payload: &CallbackPayload,
        expected_correlation: &str,
        pkce_verifier: Option<&str>,
    ) -> Result<Token> {
        verify_callback(payload, expected_correlation)?;
        let code = authorization_code(payload)?;
        let redirect_uri = self.redirect_uri()?;

        let mut params = vec![
            ("grant_type", "authorization_code"),
            ("client_id", self.config.application_id()),
            ("client_secret", self.config.application_secret()),
            ("code", code),
            ("redirect_uri", redirect_uri.as_str()),
        ];
        if let Some(verifier) = pkce_verifier {
            params.push(("code_verifier", verifier));
        }

        let response = self.request_token(&params).await?;
        info!(provider = %self.id, refreshable = response.refresh_token.is_some(), "Code exchange completed");
        self.build_token(response, None)
    }

    async fn refresh(&self, token: &Token) -> Result<Token> {
        let refresh_token = token
            .refresh_token()
            .ok_or_else(|| AuthError::RefreshUnsupported(self.id.to_string()))?;

        let params = [
            ("grant_type", "refresh_token"),
            ("client_id", self.config.application_id()),
            ("client_secret", self.config.application_secret()),
            ("refresh_token", refresh_token),
        ];

        let response = self
            .request_token(&params)
            .await
            .map_err(|err| classify_refresh_error(self.id.as_str(), err))?;
        debug!(provider = %self.id, rotated = response.refresh_token.is_some(), "Refresh grant completed");
        self.build_token(response, Some(refresh_token))
    }

    async fn revoke(&self, token: &Token) -> Result<()> {
        let Some(revoke_url) = &self.revoke_url else {
            debug!(provider = %self.id, "No revocation endpoint configured");
            return Ok(());
        };

        // Revoking the refresh credential invalidates the access token too
        let (value, hint) = match token.refresh_token() {
            Some(refresh) => (refresh, "refresh_token"),
            None => (token.access_token(), "access_token"),
        };

        let request = self.http.request(Method::POST, revoke_url.clone()).form(&[
            ("token", value),
            ("token_type_hint", hint),
            ("client_id", self.config.application_id()),
            ("client_secret", self.config.application_secret()),
        ]);
        let response = self.http.send(request).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status));
        }

        debug!(provider = %self.id, hint, "Token revoked");
        Ok(())
    }
}
