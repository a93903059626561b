//! # SocialAuth Domain
//!
//! Value types shared by the session core and the provider adapters.
//!
//! This crate contains:
//! - Credentials and login artifacts (`Token`, `AuthorizationRequest`,
//!   `CallbackPayload`)
//! - Provider identity and configuration (`ProviderId`, `ProviderConfig`)
//! - The session phase enum and the `AuthError` taxonomy
//! - Serde settings structures for the config loader
//!
//! ## Architecture
//! - Depends only on `socialauth-common` among workspace crates
//! - No I/O, no async

pub mod constants;
pub mod errors;
pub mod macros;
pub mod settings;
pub mod types;

// Re-export commonly used items
pub use errors::*;
pub use settings::*;
pub use types::*;
