//! Turn [`AuthSettings`] into a populated [`AuthManager`]

use std::sync::Arc;

use socialauth_core::{AuthManager, ProviderAdapter};
use socialauth_domain::{AuthError, AuthSettings, ProviderKind, ProviderSettings, Result};

use crate::providers::{StandardOAuthAdapter, VkontakteAdapter};

/// Build a manager and register one adapter per provider entry.
///
/// # Errors
/// - `Configuration` if an entry cannot produce an adapter
/// - `DuplicateProvider` if two entries share an id
pub fn build_manager(settings: &AuthSettings) -> Result<AuthManager> {
    settings.manager.validate()?;
    let manager = AuthManager::with_settings(&settings.manager);

    for entry in &settings.providers {
        let adapter = adapter_for(entry)?;
        manager.register_provider_as(entry.id.clone(), adapter)?;
        tracing::info!(provider = %entry.id, kind = %entry.kind, "Provider configured");
    }

    Ok(manager)
}

/// Build the adapter described by one provider entry.
///
/// Credentials are not validated here; `login` reports them.
///
/// # Errors
/// Returns [`AuthError::Configuration`] if an `oauth2` entry lacks its
/// authorize or token endpoint.
pub fn adapter_for(entry: &ProviderSettings) -> Result<Arc<dyn ProviderAdapter>> {
    let config = entry.to_provider_config();

    match entry.kind {
        ProviderKind::Vkontakte => {
            let mut adapter = VkontakteAdapter::new(config)?.with_provider_id(entry.id.clone());
            match (&entry.authorize_url, &entry.token_url) {
                (Some(authorize), Some(token)) => {
                    adapter = adapter.with_endpoints(authorize.clone(), token.clone());
                }
                (None, None) => {}
                _ => {
                    return Err(AuthError::Configuration(format!(
                        "provider {}: authorize_url and token_url must be overridden together",
                        entry.id
                    )));
                }
            }
            if let Some(revoke) = &entry.revoke_url {
                adapter = adapter.with_revoke_url(revoke.clone());
            }
            if let Some(version) = &entry.api_version {
                adapter = adapter.with_api_version(version.clone());
            }
            Ok(Arc::new(adapter))
        }
        ProviderKind::OAuth2 => {
            let (Some(authorize), Some(token)) = (&entry.authorize_url, &entry.token_url) else {
                return Err(AuthError::Configuration(format!(
                    "provider {}: oauth2 entries need authorize_url and token_url",
                    entry.id
                )));
            };
            let mut adapter = StandardOAuthAdapter::new(
                entry.id.clone(),
                config,
                authorize.clone(),
                token.clone(),
            )?;
            if let Some(revoke) = &entry.revoke_url {
                adapter = adapter.with_revoke_url(revoke.clone());
            }
            Ok(Arc::new(adapter))
        }
    }
}
