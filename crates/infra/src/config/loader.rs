//! Configuration loader
//!
//! Loads [`AuthSettings`] from environment variables or files.
//!
//! ## Loading Strategy
//! 1. First, attempts to load from environment variables
//! 2. If incomplete, falls back to loading from file
//! 3. Probes multiple paths for config files
//! 4. Supports JSON and TOML formats
//!
//! ## Environment Variables
//! The environment describes a single VKontakte provider:
//! - `SOCIALAUTH_VK_APP_ID`: application id (required)
//! - `SOCIALAUTH_VK_APP_SECRET`: application secret (required)
//! - `SOCIALAUTH_VK_PROVIDER_ID`: registration key (default `vkontakte`)
//! - `SOCIALAUTH_VK_SCOPES`: comma separated scopes
//! - `SOCIALAUTH_VK_REDIRECT_URI`: redirect target
//! - `SOCIALAUTH_VK_API_VERSION`: VK API version
//! - `SOCIALAUTH_REFRESH_THRESHOLD`: refresh window in seconds
//! - `SOCIALAUTH_EVENT_CAPACITY`: state-change broadcast capacity
//!
//! ## File Locations
//! The loader probes the following paths (in order):
//! 1. `./socialauth.json` or `./socialauth.toml` (current working directory)
//! 2. `./config.json` or `./config.toml` (current working directory)
//! 3. The same names next to the executable

use std::path::{Path, PathBuf};

use socialauth_domain::constants::VKONTAKTE_PROVIDER_NAME;
use socialauth_domain::{
    AuthError, AuthSettings, ManagerSettings, ProviderId, ProviderKind, ProviderSettings, Result,
};
use url::Url;

const CONFIG_FILE_NAMES: [&str; 4] =
    ["socialauth.json", "socialauth.toml", "config.json", "config.toml"];

/// Load configuration with automatic fallback strategy
///
/// First attempts to load from environment variables. If any required
/// variables are missing, falls back to loading from a config file.
///
/// # Errors
/// Returns `AuthError::Configuration` if:
/// - Configuration cannot be loaded from either source
/// - File format is invalid
/// - Required fields are missing
pub fn load() -> Result<AuthSettings> {
    match load_from_env() {
        Ok(settings) => {
            tracing::info!("Configuration loaded from environment variables");
            Ok(settings)
        }
        Err(e) => {
            tracing::debug!(error = %e, "Failed to load from environment, trying file");
            load_from_file(None)
        }
    }
}

/// Load configuration from environment variables
///
/// See module documentation for the complete list.
///
/// # Errors
/// Returns `AuthError::Configuration` if the application id or secret is
/// missing, or a numeric or URL variable does not parse.
pub fn load_from_env() -> Result<AuthSettings> {
    let application_id = env_var("SOCIALAUTH_VK_APP_ID")?;
    let application_secret = env_var("SOCIALAUTH_VK_APP_SECRET")?;

    let id = env_opt("SOCIALAUTH_VK_PROVIDER_ID")
        .map_or_else(|| ProviderId::new(VKONTAKTE_PROVIDER_NAME), ProviderId::from);

    let scopes = env_opt("SOCIALAUTH_VK_SCOPES")
        .map(|raw| {
            raw.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect()
        })
        .unwrap_or_default();

    let redirect_uri = env_opt("SOCIALAUTH_VK_REDIRECT_URI")
        .map(|raw| {
            Url::parse(&raw)
                .map_err(|e| AuthError::Configuration(format!("Invalid redirect uri: {e}")))
        })
        .transpose()?;

    let mut manager = ManagerSettings::default();
    if let Some(raw) = env_opt("SOCIALAUTH_REFRESH_THRESHOLD") {
        manager.refresh_threshold_seconds = raw
            .parse::<i64>()
            .map_err(|e| AuthError::Configuration(format!("Invalid refresh threshold: {e}")))?;
    }
    if let Some(raw) = env_opt("SOCIALAUTH_EVENT_CAPACITY") {
        manager.event_capacity = raw
            .parse::<usize>()
            .map_err(|e| AuthError::Configuration(format!("Invalid event capacity: {e}")))?;
    }
    manager.validate()?;

    Ok(AuthSettings {
        manager,
        providers: vec![ProviderSettings {
            id,
            kind: ProviderKind::Vkontakte,
            application_id,
            application_secret,
            scopes,
            redirect_uri,
            authorize_url: None,
            token_url: None,
            revoke_url: None,
            api_version: env_opt("SOCIALAUTH_VK_API_VERSION"),
        }],
    })
}

/// Load configuration from a file
///
/// If `path` is `None`, probes multiple locations for config files.
/// Supports both JSON and TOML formats (detected by file extension).
///
/// # Errors
/// Returns `AuthError::Configuration` if:
/// - File not found (when path is specified)
/// - No config file found (when path is `None`)
/// - File format is invalid
pub fn load_from_file(path: Option<PathBuf>) -> Result<AuthSettings> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(AuthError::Configuration(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            AuthError::Configuration(
                "No config file found in any of the standard locations".to_string(),
            )
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| AuthError::Configuration(format!("Failed to read config file: {e}")))?;

    parse_config(&contents, &config_path)
}

/// Parse configuration, choosing the format by file extension.
fn parse_config(contents: &str, path: &Path) -> Result<AuthSettings> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    let settings: AuthSettings = match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| AuthError::Configuration(format!("Invalid TOML format: {e}")))?,
        "json" => serde_json::from_str(contents)
            .map_err(|e| AuthError::Configuration(format!("Invalid JSON format: {e}")))?,
        _ => {
            return Err(AuthError::Configuration(format!(
                "Unsupported config format: {extension}"
            )))
        }
    };
    settings.manager.validate()?;
    Ok(settings)
}

/// Probe the working directory, then the executable's directory, for a
/// config file.
///
/// # Returns
/// The first config file found, or `None` if no file exists.
#[must_use]
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut candidates = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        candidates.extend(CONFIG_FILE_NAMES.iter().map(|name| cwd.join(name)));
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            candidates.extend(CONFIG_FILE_NAMES.iter().map(|name| exe_dir.join(name)));
        }
    }

    candidates.into_iter().find(|path| path.exists())
}

/// Get required environment variable
///
/// # Errors
/// Returns `AuthError::Configuration` if the variable is not set or blank.
fn env_var(key: &str) -> Result<String> {
    env_opt(key).ok_or_else(|| {
        AuthError::Configuration(format!("Missing required environment variable: {key}"))
    })
}

/// Optional environment variable; blank values count as unset.
fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}
