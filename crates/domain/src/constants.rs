//! Domain constants
//!
//! Defaults shared by the manager, the adapters and the config loader.

/// Provider name the VKontakte adapter registers under unless told otherwise.
pub const VKONTAKTE_PROVIDER_NAME: &str = "vkontakte";

/// Refresh tokens this many seconds before they expire.
pub const DEFAULT_REFRESH_THRESHOLD_SECONDS: i64 = 300;

/// Longest accepted refresh threshold (one year).
pub const MAX_REFRESH_THRESHOLD_SECONDS: i64 = 365 * 24 * 60 * 60;

/// Buffered state-change events per broadcast receiver.
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Token type reported when a provider omits one.
pub const DEFAULT_TOKEN_TYPE: &str = "Bearer";
