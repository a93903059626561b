//! Conversions from external infrastructure errors into domain errors.

use reqwest::Error as HttpError;
use serde::Deserialize;
use socialauth_domain::AuthError;
use thiserror::Error;
use url::ParseError as UrlError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct InfraError(pub AuthError);

impl From<InfraError> for AuthError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<AuthError> for InfraError {
    fn from(value: AuthError) -> Self {
        Self(value)
    }
}

/// Extension trait to make the conversion logic explicit in tests and within
/// this module.
trait IntoAuthError {
    fn into_auth_error(self) -> AuthError;
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → AuthError */
/* -------------------------------------------------------------------------- */

impl IntoAuthError for HttpError {
    fn into_auth_error(self) -> AuthError {
        if self.is_timeout() {
            return AuthError::NetworkFailure("HTTP request timed out".into());
        }

        if self.is_connect() {
            return AuthError::NetworkFailure("HTTP connection failure".into());
        }

        if self.is_builder() {
            return AuthError::Configuration(format!("invalid HTTP request: {self}"));
        }

        if self.is_decode() {
            return AuthError::rejected("invalid_response", Some(self.to_string()));
        }

        if let Some(status) = self.status() {
            return status_error(status);
        }

        AuthError::NetworkFailure(self.to_string())
    }
}

impl From<HttpError> for InfraError {
    fn from(value: HttpError) -> Self {
        Self(value.into_auth_error())
    }
}

/// Map a non-success status that carried no OAuth error body.
pub(crate) fn status_error(status: reqwest::StatusCode) -> AuthError {
    let code = status.as_u16();
    let message = format!("HTTP {} {}", code, status.canonical_reason().unwrap_or("unknown status"));

    match code {
        408 | 429 | 500..=599 => AuthError::NetworkFailure(message),
        _ => AuthError::rejected(format!("http_{code}"), Some(message)),
    }
}

/* -------------------------------------------------------------------------- */
/* url::ParseError → AuthError */
/* -------------------------------------------------------------------------- */

impl IntoAuthError for UrlError {
    fn into_auth_error(self) -> AuthError {
        AuthError::Configuration(format!("invalid endpoint url: {self}"))
    }
}

impl From<UrlError> for InfraError {
    fn from(value: UrlError) -> Self {
        Self(value.into_auth_error())
    }
}

/* -------------------------------------------------------------------------- */
/* OAuth error responses → AuthError */
/* -------------------------------------------------------------------------- */

/// RFC 6749 §5.2 error body (VKontakte uses the same shape)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OAuthErrorBody {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
}

impl IntoAuthError for OAuthErrorBody {
    fn into_auth_error(self) -> AuthError {
        match self.error.as_str() {
            "temporarily_unavailable" | "server_error" => AuthError::NetworkFailure(
                self.error_description.unwrap_or(self.error),
            ),
            _ => AuthError::ProviderRejected {
                code: self.error,
                description: self.error_description,
            },
        }
    }
}

impl From<OAuthErrorBody> for InfraError {
    fn from(value: OAuthErrorBody) -> Self {
        Self(value.into_auth_error())
    }
}

/// Refresh-grant rejection of the refresh credential itself.
///
/// `invalid_grant` on a refresh means the credential is dead and only a new
/// login can recover.
pub(crate) fn classify_refresh_error(provider: &str, error: AuthError) -> AuthError {
    match error {
        AuthError::ProviderRejected { code, description } if code == "invalid_grant" => {
            AuthError::TokenExpiredIrrecoverably(
                description.unwrap_or_else(|| format!("{provider}: refresh credential rejected")),
            )
        }
        other => other,
    }
}

/* -------------------------------------------------------------------------- */
/* Tests */
/* -------------------------------------------------------------------------- */
