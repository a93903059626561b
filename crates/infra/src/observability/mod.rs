//! Tracing subscriber setup
//!
//! Every crate in the workspace logs through `tracing`; hosts that do not
//! install their own subscriber call [`init_tracing`] once at startup.
//!
//! - `SOCIALAUTH_LOG`: `EnvFilter` directives (default `info`)
//! - `SOCIALAUTH_LOG_FORMAT`: `json` for structured output, anything else
//!   for human readable lines

use serde::{Deserialize, Serialize};
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter};

pub const LOG_FILTER_ENV: &str = "SOCIALAUTH_LOG";
pub const LOG_FORMAT_ENV: &str = "SOCIALAUTH_LOG_FORMAT";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TracingConfig {
    #[serde(default = "default_level")]
    pub level: String,

    #[serde(default)]
    pub json_output: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self { level: default_level(), json_output: false }
    }
}

impl TracingConfig {
    /// Read [`LOG_FILTER_ENV`] and [`LOG_FORMAT_ENV`].
    #[must_use]
    pub fn from_env() -> Self {
        let level = std::env::var(LOG_FILTER_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(default_level);
        let json_output = std::env::var(LOG_FORMAT_ENV)
            .is_ok_and(|v| v.trim().eq_ignore_ascii_case("json"));
        Self { level, json_output }
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_new(&self.level).unwrap_or_else(|_| EnvFilter::new(default_level()))
    }
}

fn default_level() -> String {
    "info".to_string()
}

/// Install the global subscriber configured from the environment.
///
/// # Errors
/// Returns [`TryInitError`] if a global subscriber is already installed.
pub fn init_tracing() -> Result<(), TryInitError> {
    init_tracing_with(&TracingConfig::from_env())
}

/// Install the global subscriber with an explicit configuration.
///
/// # Errors
/// Returns [`TryInitError`] if a global subscriber is already installed.
pub fn init_tracing_with(config: &TracingConfig) -> Result<(), TryInitError> {
    let filter = config.filter();

    if config.json_output {
        tracing_subscriber::registry().with(filter).with(fmt::layer().json()).try_init()
    } else {
        tracing_subscriber::registry().with(filter).with(fmt::layer()).try_init()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_directive_falls_back_to_info() {
        let config = TracingConfig { level: "vk=notalevel".into(), json_output: false };
        assert_eq!(config.filter().to_string(), "info");
    }

    #[test]
    fn test_second_init_is_an_error() {
        let config = TracingConfig { level: "warn".into(), json_output: true };
        // Another test binary may have installed one already
        let _ = init_tracing_with(&config);
        assert!(init_tracing_with(&config).is_err());
    }
}
