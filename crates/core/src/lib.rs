//! # SocialAuth Core
//!
//! Provider-agnostic login lifecycle - no HTTP, no storage.
//!
//! This crate contains:
//! - The [`ProviderAdapter`] port every integration implements
//! - The per-provider [`SessionState`] machine
//! - [`AuthManager`], the host-facing orchestration and event surface
//!
//! ## Architecture Principles
//! - Only depends on `socialauth-common` and `socialauth-domain`
//! - Network calls happen behind the port, in `socialauth-infra`
//! - Sessions are serialized per provider; providers never share state

pub mod events;
pub mod manager;
pub mod ports;
pub mod session;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use events::{StateChange, StateObserver, SubscriptionId};
pub use manager::AuthManager;
pub use ports::ProviderAdapter;
pub use session::{SessionInput, SessionSnapshot, SessionState, Transition};
