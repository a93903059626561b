//! # SocialAuth Infrastructure
//!
//! Network-facing implementations of the `socialauth-core` ports.
//!
//! This crate contains:
//! - Provider adapters: VKontakte and standard OAuth 2.0 with PKCE
//! - The retrying HTTP client the adapters share
//! - Configuration loading and [`AuthManager`](socialauth_core::AuthManager)
//!   assembly
//! - Tracing subscriber setup
//!
//! ## Architecture
//! - Implements traits defined in `socialauth-core`
//! - Converts reqwest/url failures into `AuthError` via [`errors::InfraError`]
//! - Contains all "impure" code (HTTP, environment, files)

pub mod config;
pub mod errors;
pub mod http;
pub mod observability;
pub mod providers;

// Re-export commonly used items
pub use config::{build_manager, load};
pub use errors::InfraError;
pub use http::HttpClient;
pub use observability::init_tracing;
pub use providers::{StandardOAuthAdapter, VkontakteAdapter};
