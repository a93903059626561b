//! Error taxonomy for third-party authentication

use serde::{Deserialize, Serialize};
use socialauth_common::{ErrorClassification, ErrorSeverity};
use thiserror::Error;

use crate::types::SessionPhase;

/// Every failure the provider contract and the manager can report
///
/// Variants fall into four groups:
/// - setup: [`Configuration`](Self::Configuration)
/// - security/ordering guards: [`CorrelationMismatch`](Self::CorrelationMismatch),
///   [`NoPendingAuthorization`](Self::NoPendingAuthorization)
/// - login/refresh outcomes: [`MalformedCallback`](Self::MalformedCallback),
///   [`ProviderRejected`](Self::ProviderRejected),
///   [`NetworkFailure`](Self::NetworkFailure),
///   [`RefreshUnsupported`](Self::RefreshUnsupported),
///   [`TokenExpiredIrrecoverably`](Self::TokenExpiredIrrecoverably)
/// - host usage errors: [`DuplicateProvider`](Self::DuplicateProvider),
///   [`UnknownProvider`](Self::UnknownProvider),
///   [`OperationInProgress`](Self::OperationInProgress),
///   [`NotAuthenticated`](Self::NotAuthenticated),
///   [`InvalidTransition`](Self::InvalidTransition)
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "detail")]
pub enum AuthError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Callback correlation token does not match the pending authorization")]
    CorrelationMismatch,

    #[error("No pending authorization for provider {0}")]
    NoPendingAuthorization(String),

    #[error("Malformed callback: {0}")]
    MalformedCallback(String),

    #[error(
        "Provider rejected the request ({code}){}",
        .description.as_ref().map(|d| format!(": {d}")).unwrap_or_default()
    )]
    ProviderRejected { code: String, description: Option<String> },

    #[error("Network failure: {0}")]
    NetworkFailure(String),

    #[error("Token refresh is not supported for provider {0}")]
    RefreshUnsupported(String),

    #[error("Refresh credential rejected, full re-authorization required: {0}")]
    TokenExpiredIrrecoverably(String),

    #[error("Provider already registered: {0}")]
    DuplicateProvider(String),

    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("Another operation is in progress for provider {0}")]
    OperationInProgress(String),

    #[error("Provider {0} is not authenticated")]
    NotAuthenticated(String),

    #[error("Invalid session transition from {from} on {input}")]
    InvalidTransition { from: SessionPhase, input: String },
}

impl AuthError {
    /// Build a [`ProviderRejected`](Self::ProviderRejected) error.
    pub fn rejected(code: impl Into<String>, description: Option<String>) -> Self {
        Self::ProviderRejected { code: code.into(), description }
    }

    /// Stable label suitable for logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::CorrelationMismatch => "correlation_mismatch",
            Self::NoPendingAuthorization(_) => "no_pending_authorization",
            Self::MalformedCallback(_) => "malformed_callback",
            Self::ProviderRejected { .. } => "provider_rejected",
            Self::NetworkFailure(_) => "network_failure",
            Self::RefreshUnsupported(_) => "refresh_unsupported",
            Self::TokenExpiredIrrecoverably(_) => "token_expired_irrecoverably",
            Self::DuplicateProvider(_) => "duplicate_provider",
            Self::UnknownProvider(_) => "unknown_provider",
            Self::OperationInProgress(_) => "operation_in_progress",
            Self::NotAuthenticated(_) => "not_authenticated",
            Self::InvalidTransition { .. } => "invalid_transition",
        }
    }

    /// The host must start over from `login()` to recover.
    #[must_use]
    pub const fn requires_reauthorization(&self) -> bool {
        matches!(
            self,
            Self::RefreshUnsupported(_)
                | Self::TokenExpiredIrrecoverably(_)
                | Self::MalformedCallback(_)
                | Self::ProviderRejected { .. }
        )
    }

    /// Guards against stale, spoofed or out-of-order callbacks.
    ///
    /// These are never retried automatically.
    #[must_use]
    pub const fn is_security_rejection(&self) -> bool {
        matches!(self, Self::CorrelationMismatch | Self::NoPendingAuthorization(_))
    }

    /// Programmer or host usage errors, surfaced immediately.
    #[must_use]
    pub const fn is_usage_error(&self) -> bool {
        matches!(
            self,
            Self::DuplicateProvider(_)
                | Self::UnknownProvider(_)
                | Self::OperationInProgress(_)
                | Self::NotAuthenticated(_)
                | Self::InvalidTransition { .. }
        )
    }
}

impl ErrorClassification for AuthError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::NetworkFailure(_))
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::NetworkFailure(_) | Self::OperationInProgress(_) => ErrorSeverity::Warning,
            Self::NoPendingAuthorization(_) | Self::NotAuthenticated(_) => ErrorSeverity::Info,
            Self::CorrelationMismatch | Self::InvalidTransition { .. } => ErrorSeverity::Critical,
            _ => ErrorSeverity::Error,
        }
    }
}

/// Result type alias for authentication operations
pub type Result<T> = std::result::Result<T, AuthError>;
