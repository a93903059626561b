//! Provider identity and configuration

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::errors::{AuthError, Result};

/// Unique key of a registered provider (e.g. `"vk"`, `"vkontakte"`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderId(String);

impl ProviderId {
    /// Wrap a provider name.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the provider name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProviderId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ProviderId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Borrow<str> for ProviderId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ProviderId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Credentials and request parameters of one provider application
///
/// Owned by exactly one adapter. Built once with the `with_*` methods and then
/// handed over; there are no setters afterwards.
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    application_id: String,
    application_secret: String,
    scopes: Vec<String>,
    redirect_uri: Option<Url>,
}

impl ProviderConfig {
    /// Create a configuration from the provider-issued application id and
    /// secret.
    ///
    /// Values are checked by [`validate`](Self::validate), which adapters call
    /// before building an authorization request.
    pub fn new(application_id: impl Into<String>, application_secret: impl Into<String>) -> Self {
        Self {
            application_id: application_id.into(),
            application_secret: application_secret.into(),
            scopes: Vec::new(),
            redirect_uri: None,
        }
    }

    /// Scopes to request. Blank entries are dropped, duplicates keep their
    /// first position.
    #[must_use]
    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut collected: Vec<String> = Vec::new();
        for scope in scopes {
            let scope = scope.into().trim().to_string();
            if !scope.is_empty() && !collected.contains(&scope) {
                collected.push(scope);
            }
        }
        self.scopes = collected;
        self
    }

    /// Redirect target the provider sends the user back to.
    #[must_use]
    pub fn with_redirect_uri(mut self, redirect_uri: Url) -> Self {
        self.redirect_uri = Some(redirect_uri);
        self
    }

    #[must_use]
    pub fn application_id(&self) -> &str {
        &self.application_id
    }

    #[must_use]
    pub fn application_secret(&self) -> &str {
        &self.application_secret
    }

    #[must_use]
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    #[must_use]
    pub fn redirect_uri(&self) -> Option<&Url> {
        self.redirect_uri.as_ref()
    }

    /// Check that the id and secret are present and well formed.
    ///
    /// # Errors
    /// Returns [`AuthError::Configuration`] if either credential is empty or
    /// contains whitespace or control characters, or if the redirect target
    /// cannot carry query parameters.
    pub fn validate(&self) -> Result<()> {
        validate_credential("application id", &self.application_id)?;
        validate_credential("application secret", &self.application_secret)?;

        if let Some(uri) = &self.redirect_uri {
            if uri.cannot_be_a_base() {
                return Err(AuthError::Configuration(format!(
                    "redirect uri must be hierarchical: {uri}"
                )));
            }
        }
        Ok(())
    }
}

fn validate_credential(label: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(AuthError::Configuration(format!("{label} must not be empty")));
    }
    if value.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(AuthError::Configuration(format!(
            "{label} must not contain whitespace or control characters"
        )));
    }
    Ok(())
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("application_id", &self.application_id)
            .field("application_secret", &"[REDACTED]")
            .field("scopes", &self.scopes)
            .field("redirect_uri", &self.redirect_uri.as_ref().map(Url::as_str))
            .finish()
    }
}
