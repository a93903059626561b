//! Configuration management

use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::constants::{
    DEFAULT_EVENT_CAPACITY, DEFAULT_REFRESH_THRESHOLD_SECONDS, MAX_REFRESH_THRESHOLD_SECONDS,
};
use crate::errors::{AuthError, Result};
use crate::impl_domain_enum_conversions;
use crate::types::{ProviderConfig, ProviderId};

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSettings {
    #[serde(default)]
    pub manager: ManagerSettings,
    #[serde(default)]
    pub providers: Vec<ProviderSettings>,
}

/// Manager behaviour
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerSettings {
    /// Tokens expiring within this window are refreshed before use.
    #[serde(default = "default_refresh_threshold")]
    pub refresh_threshold_seconds: i64,
    /// Broadcast channel capacity for state-change events.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            refresh_threshold_seconds: DEFAULT_REFRESH_THRESHOLD_SECONDS,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl ManagerSettings {
    /// Reject thresholds outside `0..=MAX_REFRESH_THRESHOLD_SECONDS`.
    ///
    /// # Errors
    /// Returns [`AuthError::Configuration`] naming the offending value.
    pub fn validate(&self) -> Result<()> {
        if (0..=MAX_REFRESH_THRESHOLD_SECONDS).contains(&self.refresh_threshold_seconds) {
            Ok(())
        } else {
            Err(AuthError::Configuration(format!(
                "refresh threshold must be between 0 and {MAX_REFRESH_THRESHOLD_SECONDS} seconds, got {}",
                self.refresh_threshold_seconds
            )))
        }
    }
}

const fn default_refresh_threshold() -> i64 {
    DEFAULT_REFRESH_THRESHOLD_SECONDS
}

const fn default_event_capacity() -> usize {
    DEFAULT_EVENT_CAPACITY
}

/// Which adapter implementation serves a provider entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Vkontakte,
    #[serde(rename = "oauth2")]
    OAuth2,
}

impl_domain_enum_conversions!(ProviderKind {
    Vkontakte => "vkontakte",
    OAuth2 => "oauth2",
});

/// One provider entry of the configuration file
///
/// Endpoint fields are optional for `vkontakte` (the adapter knows its
/// endpoints) and required for `oauth2`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSettings {
    pub id: ProviderId,
    pub kind: ProviderKind,
    pub application_id: String,
    #[serde(skip_serializing)]
    pub application_secret: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub redirect_uri: Option<Url>,
    #[serde(default)]
    pub authorize_url: Option<Url>,
    #[serde(default)]
    pub token_url: Option<Url>,
    #[serde(default)]
    pub revoke_url: Option<Url>,
    /// VKontakte API version (`v` parameter).
    #[serde(default)]
    pub api_version: Option<String>,
}

impl ProviderSettings {
    /// Build the adapter-facing configuration.
    #[must_use]
    pub fn to_provider_config(&self) -> ProviderConfig {
        let config = ProviderConfig::new(&self.application_id, &self.application_secret)
            .with_scopes(self.scopes.iter().cloned());
        match &self.redirect_uri {
            Some(uri) => config.with_redirect_uri(uri.clone()),
            None => config,
        }
    }
}

impl fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("application_id", &self.application_id)
            .field("application_secret", &"[REDACTED]")
            .field("scopes", &self.scopes)
            .field("redirect_uri", &self.redirect_uri.as_ref().map(Url::as_str))
            .field("api_version", &self.api_version)
            .finish_non_exhaustive()
    }
}
