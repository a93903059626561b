//! Granted credentials

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::provider::ProviderId;
use crate::constants::DEFAULT_TOKEN_TYPE;
use crate::errors::{AuthError, Result};

/// Credential granted by a provider, plus its metadata
///
/// Tokens are immutable. A refresh produces a new `Token` that replaces the
/// old one wholesale.
///
/// Invariant: a token carrying a refresh credential also carries an expiry.
/// [`TokenBuilder::build`] and deserialization both enforce it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "TokenRecord")]
pub struct Token {
    provider: ProviderId,
    access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
    token_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    expires_at: Option<DateTime<Utc>>,
    scopes: BTreeSet<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<String>,
    issued_at: DateTime<Utc>,
}

impl Token {
    /// Start building a token for `provider` with the given access credential.
    pub fn builder(provider: impl Into<ProviderId>, access_token: impl Into<String>) -> TokenBuilder {
        TokenBuilder {
            invalid_lifetime: None,
            record: TokenRecord {
                provider: provider.into(),
                access_token: access_token.into(),
                refresh_token: None,
                token_type: DEFAULT_TOKEN_TYPE.to_string(),
                expires_at: None,
                scopes: BTreeSet::new(),
                user_id: None,
                email: None,
                issued_at: Utc::now(),
            },
        }
    }

    #[must_use]
    pub fn provider(&self) -> &ProviderId {
        &self.provider
    }

    #[must_use]
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    #[must_use]
    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    #[must_use]
    pub fn token_type(&self) -> &str {
        &self.token_type
    }

    /// `None` for tokens that never expire.
    #[must_use]
    pub const fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    #[must_use]
    pub const fn scopes(&self) -> &BTreeSet<String> {
        &self.scopes
    }

    #[must_use]
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.contains(scope)
    }

    /// Provider-side account identifier, when the provider reports one.
    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    #[must_use]
    pub const fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    /// Whether a refresh credential is present.
    #[must_use]
    pub const fn is_refreshable(&self) -> bool {
        self.refresh_token.is_some()
    }

    /// Check if the token is expired or will expire within the given
    /// threshold
    ///
    /// Tokens without an expiry are never considered expired.
    #[must_use]
    pub fn is_expired(&self, threshold_seconds: i64) -> bool {
        let Some(expires_at) = self.expires_at else {
            return false;
        };
        // A horizon past the end of time covers every expiry
        match Duration::try_seconds(threshold_seconds)
            .and_then(|threshold| Utc::now().checked_add_signed(threshold))
        {
            Some(horizon) => horizon >= expires_at,
            None => threshold_seconds > 0,
        }
    }

    /// Refreshable and inside the refresh threshold.
    #[must_use]
    pub fn needs_refresh(&self, threshold_seconds: i64) -> bool {
        self.is_refreshable() && self.is_expired(threshold_seconds)
    }

    /// Seconds until expiry, `None` for non-expiring tokens.
    #[must_use]
    pub fn seconds_until_expiry(&self) -> Option<i64> {
        self.expires_at.map(|expires_at| (expires_at - Utc::now()).num_seconds())
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("provider", &self.provider)
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .field("scopes", &self.scopes)
            .field("user_id", &self.user_id)
            .field("issued_at", &self.issued_at)
            .finish_non_exhaustive()
    }
}

/// Unvalidated token fields; the wire shape of [`Token`].
#[derive(Deserialize)]
struct TokenRecord {
    provider: ProviderId,
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default = "default_token_type")]
    token_type: String,
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    scopes: BTreeSet<String>,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    email: Option<String>,
    issued_at: DateTime<Utc>,
}

fn default_token_type() -> String {
    DEFAULT_TOKEN_TYPE.to_string()
}

impl TryFrom<TokenRecord> for Token {
    type Error = AuthError;

    fn try_from(record: TokenRecord) -> Result<Self> {
        if record.access_token.is_empty() {
            return Err(AuthError::Configuration("access token must not be empty".into()));
        }
        if record.refresh_token.is_some() && record.expires_at.is_none() {
            return Err(AuthError::Configuration(
                "a token with a refresh credential must carry an expiry".into(),
            ));
        }

        Ok(Self {
            provider: record.provider,
            access_token: record.access_token,
            refresh_token: record.refresh_token,
            token_type: record.token_type,
            expires_at: record.expires_at,
            scopes: record.scopes,
            user_id: record.user_id,
            email: record.email,
            issued_at: record.issued_at,
        })
    }
}

/// Builder for [`Token`]; see [`Token::builder`].
pub struct TokenBuilder {
    record: TokenRecord,
    invalid_lifetime: Option<i64>,
}

impl TokenBuilder {
    #[must_use]
    pub fn refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.record.refresh_token = Some(refresh_token.into());
        self
    }

    #[must_use]
    pub fn token_type(mut self, token_type: impl Into<String>) -> Self {
        self.record.token_type = token_type.into();
        self
    }

    #[must_use]
    pub const fn expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.record.expires_at = Some(expires_at);
        self.invalid_lifetime = None;
        self
    }

    /// Expiry relative to the issue time. Non-positive lifetimes mean the
    /// token does not expire.
    ///
    /// A lifetime that overflows the calendar is reported by
    /// [`build`](Self::build); use [`try_expires_in`](Self::try_expires_in)
    /// to catch it here.
    #[must_use]
    pub fn expires_in(mut self, seconds: i64) -> Self {
        self.record.expires_at = None;
        self.invalid_lifetime = None;
        if seconds > 0 {
            match Duration::try_seconds(seconds)
                .and_then(|lifetime| self.record.issued_at.checked_add_signed(lifetime))
            {
                Some(expires_at) => self.record.expires_at = Some(expires_at),
                None => self.invalid_lifetime = Some(seconds),
            }
        }
        self
    }

    /// Checked form of [`expires_in`](Self::expires_in)
    ///
    /// # Errors
    /// [`AuthError::Configuration`] if `issued_at + seconds` is not a
    /// representable timestamp.
    pub fn try_expires_in(self, seconds: i64) -> Result<Self> {
        let builder = self.expires_in(seconds);
        match builder.invalid_lifetime {
            Some(seconds) => Err(lifetime_out_of_range(seconds)),
            None => Ok(builder),
        }
    }

    #[must_use]
    pub fn scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.record.scopes = scopes
            .into_iter()
            .map(Into::into)
            .filter(|scope: &String| !scope.is_empty())
            .collect();
        self
    }

    #[must_use]
    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.record.user_id = Some(user_id.into());
        self
    }

    #[must_use]
    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.record.email = Some(email.into());
        self
    }

    #[must_use]
    pub const fn issued_at(mut self, issued_at: DateTime<Utc>) -> Self {
        self.record.issued_at = issued_at;
        self
    }

    /// Validate and produce the token.
    ///
    /// # Errors
    /// Returns [`AuthError::Configuration`] if the access credential is
    /// empty, the lifetime given to [`expires_in`](Self::expires_in) is out
    /// of range, or a refresh credential is present without an expiry.
    pub fn build(self) -> Result<Token> {
        if let Some(seconds) = self.invalid_lifetime {
            return Err(lifetime_out_of_range(seconds));
        }
        Token::try_from(self.record)
    }
}

fn lifetime_out_of_range(seconds: i64) -> AuthError {
    AuthError::Configuration(format!("token lifetime of {seconds}s is out of range"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_creation() {
        let token = Token::builder("vk", "access_123")
            .refresh_token("refresh_456")
            .expires_in(3600)
            .scopes(["friends", "email"])
            .user_id("42")
            .build()
            .unwrap();

        assert_eq!(token.provider().as_str(), "vk");
        assert_eq!(token.access_token(), "access_123");
        assert_eq!(token.refresh_token(), Some("refresh_456"));
        assert_eq!(token.token_type(), "Bearer");
        assert!(token.has_scope("email"));
        assert_eq!(token.user_id(), Some("42"));
        assert!(token.is_refreshable());
        assert!(token.expires_at().is_some());
    }

    #[test]
    fn test_refresh_requires_expiry() {
        let result = Token::builder("vk", "access").refresh_token("refresh").build();
        assert!(matches!(result, Err(AuthError::Configuration(_))));
    }

    #[test]
    fn test_empty_access_rejected() {
        assert!(Token::builder("vk", "").build().is_err());
    }

    #[test]
    fn test_non_expiring_token() {
        // VKontakte returns expires_in=0 for offline tokens
        let token = Token::builder("vk", "offline").expires_in(0).build().unwrap();

        assert!(token.expires_at().is_none());
        assert!(!token.is_expired(300));
        assert!(!token.needs_refresh(300));
        assert!(token.seconds_until_expiry().is_none());
    }

    #[test]
    fn test_token_expiry_check() {
        let token = Token::builder("vk", "access")
            .refresh_token("refresh")
            .expires_in(3600)
            .build()
            .unwrap();

        assert!(!token.is_expired(300));
        assert!(token.is_expired(7200));
        assert!(token.needs_refresh(7200));

        let secs = token.seconds_until_expiry().unwrap();
        assert!(secs > 3590 && secs <= 3600);
    }

    #[test]
    fn test_out_of_range_lifetime() {
        let huge = 1_000_000_000_000_000;

        let result = Token::builder("vk", "access").expires_in(huge).build();
        assert!(matches!(result, Err(AuthError::Configuration(ref msg)) if msg.contains("out of range")));

        assert!(Token::builder("vk", "access").try_expires_in(huge).is_err());
        assert!(Token::builder("vk", "access").try_expires_in(i64::MAX).is_err());

        // A later valid lifetime supersedes the bad one
        let token = Token::builder("vk", "access").expires_in(huge).expires_in(60).build().unwrap();
        assert!(token.expires_at().is_some());
    }

    #[test]
    fn test_expiry_check_with_extreme_thresholds() {
        let token = Token::builder("vk", "access").expires_in(3600).build().unwrap();

        assert!(token.is_expired(i64::MAX));
        assert!(!token.is_expired(i64::MIN));
        assert!(!Token::builder("vk", "offline").build().unwrap().is_expired(i64::MAX));
    }

    #[test]
    fn test_debug_redacts_credentials() {
        let token = Token::builder("vk", "very-secret-access")
            .refresh_token("very-secret-refresh")
            .expires_in(60)
            .build()
            .unwrap();

        let rendered = format!("{token:?}");
        assert!(!rendered.contains("very-secret-access"));
        assert!(!rendered.contains("very-secret-refresh"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn test_serde_enforces_invariant() {
        let token = Token::builder("vk", "access")
            .refresh_token("refresh")
            .expires_in(3600)
            .build()
            .unwrap();

        let json = serde_json::to_string(&token).unwrap();
        let restored: Token = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, token);

        let broken = r#"{
            "provider": "vk",
            "access_token": "access",
            "refresh_token": "refresh",
            "issued_at": "2024-01-01T00:00:00Z"
        }"#;
        assert!(serde_json::from_str::<Token>(broken).is_err());
    }
}
