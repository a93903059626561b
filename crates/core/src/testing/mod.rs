//! Test doubles for the provider port and the event surface
//!
//! Available to this crate's tests and, through the `test-utils` feature, to
//! downstream crates.

pub mod mocks;

pub use mocks::{MockProviderAdapter, RecordingObserver};
