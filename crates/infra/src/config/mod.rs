//! Configuration loading and manager assembly
//!
//! [`loader`] reads [`AuthSettings`](socialauth_domain::AuthSettings) from
//! the environment or a file; [`build_manager`] turns them into a populated
//! [`AuthManager`](socialauth_core::AuthManager).

pub mod bootstrap;
pub mod loader;

// Re-export commonly used items
pub use bootstrap::{adapter_for, build_manager};
pub use loader::{load, load_from_env, load_from_file, probe_config_paths};
