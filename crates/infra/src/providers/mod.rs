//! [`ProviderAdapter`](socialauth_core::ProviderAdapter) implementations
//!
//! - [`VkontakteAdapter`]: VKontakte authorization-code flow (`oauth.vk.com`)
//! - [`StandardOAuthAdapter`]: any RFC 6749 server, with PKCE, refresh and
//!   RFC 7009 revocation

pub mod standard;
pub mod vkontakte;

use socialauth_common::validate_correlation;
use socialauth_domain::{AuthError, CallbackPayload, Result};

pub use standard::StandardOAuthAdapter;
pub use vkontakte::VkontakteAdapter;

/// Check the echoed correlation token, then surface provider-reported errors.
///
/// The state check runs first so a forged error redirect cannot fail a
/// pending login.
pub(crate) fn verify_callback(payload: &CallbackPayload, expected_correlation: &str) -> Result<()> {
    let state = payload
        .state()
        .ok_or_else(|| AuthError::MalformedCallback("callback carries no state".into()))?;

    if !validate_correlation(expected_correlation, state) {
        return Err(AuthError::CorrelationMismatch);
    }

    if let Some(error) = payload.error() {
        return Err(AuthError::rejected(error, payload.error_description().map(str::to_string)));
    }

    Ok(())
}

pub(crate) fn authorization_code(payload: &CallbackPayload) -> Result<&str> {
    payload
        .code()
        .ok_or_else(|| AuthError::MalformedCallback("callback carries neither code nor error".into()))
}
