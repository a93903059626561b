//! Authorization requests and provider callbacks

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use url::{form_urlencoded, Url};

use super::provider::ProviderId;
use crate::errors::{AuthError, Result};

/// A login attempt the host must present to the user
///
/// Carries the provider's authorization URL and the correlation token that
/// the callback has to echo back.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthorizationRequest {
    provider: ProviderId,
    url: Url,
    correlation: String,
    pkce_verifier: Option<String>,
}

impl AuthorizationRequest {
    pub fn new(provider: impl Into<ProviderId>, url: Url, correlation: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            url,
            correlation: correlation.into(),
            pkce_verifier: None,
        }
    }

    /// Attach the PKCE verifier matching the challenge placed in the URL.
    #[must_use]
    pub fn with_pkce_verifier(mut self, verifier: impl Into<String>) -> Self {
        self.pkce_verifier = Some(verifier.into());
        self
    }

    #[must_use]
    pub fn provider(&self) -> &ProviderId {
        &self.provider
    }

    /// URL to open in a browser or web view.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    #[must_use]
    pub fn correlation(&self) -> &str {
        &self.correlation
    }

    /// Kept by the session until the code exchange; never sent to the
    /// authorization endpoint.
    #[must_use]
    pub fn pkce_verifier(&self) -> Option<&str> {
        self.pkce_verifier.as_deref()
    }
}

impl fmt::Debug for AuthorizationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizationRequest")
            .field("provider", &self.provider)
            .field("url", &self.url.as_str())
            .field("correlation", &self.correlation)
            .field("pkce_verifier", &self.pkce_verifier.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Parameters delivered by a provider redirect
///
/// Both the query and the fragment of a redirect URI are read. Implicit-flow
/// providers answer in the fragment; when a key appears in both, the
/// fragment wins.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CallbackPayload {
    params: BTreeMap<String, String>,
}

impl CallbackPayload {
    /// Parse the redirect URI the provider sent the user to.
    ///
    /// # Errors
    /// Returns [`AuthError::MalformedCallback`] if the URI does not parse or
    /// carries no parameters at all.
    pub fn from_uri(uri: &str) -> Result<Self> {
        let parsed = Url::parse(uri.trim())
            .map_err(|e| AuthError::MalformedCallback(format!("invalid redirect uri: {e}")))?;

        let mut params = BTreeMap::new();
        for source in [parsed.query(), parsed.fragment()].into_iter().flatten() {
            for (key, value) in form_urlencoded::parse(source.as_bytes()) {
                params.insert(key.into_owned(), value.into_owned());
            }
        }

        if params.is_empty() {
            return Err(AuthError::MalformedCallback(
                "redirect uri carries no parameters".to_string(),
            ));
        }

        Ok(Self { params })
    }

    /// Build a payload from already-decoded pairs (e.g. a web view's
    /// navigation delegate).
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self { params: pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect() }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str).filter(|value| !value.is_empty())
    }

    /// Authorization code.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.get("code")
    }

    /// Echoed correlation token.
    #[must_use]
    pub fn state(&self) -> Option<&str> {
        self.get("state")
    }

    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.get("error")
    }

    /// Human readable error text.
    ///
    /// Falls back to `error_reason` for providers that only send that.
    #[must_use]
    pub fn error_description(&self) -> Option<&str> {
        self.get("error_description").or_else(|| self.get("error_reason"))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

impl FromStr for CallbackPayload {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_uri(s)
    }
}

impl fmt::Debug for CallbackPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Codes and implicit-flow tokens are credentials.
        let redacted: BTreeMap<&str, &str> = self
            .params
            .iter()
            .map(|(key, value)| match key.as_str() {
                "code" | "access_token" | "refresh_token" => (key.as_str(), "[REDACTED]"),
                _ => (key.as_str(), value.as_str()),
            })
            .collect();
        f.debug_struct("CallbackPayload").field("params", &redacted).finish()
    }
}
