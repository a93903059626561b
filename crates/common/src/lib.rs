//! Shared utilities for the SocialAuth crates.
//!
//! - [`auth`]: correlation tokens and PKCE material for OAuth flows
//! - [`error`]: the [`ErrorClassification`] contract every error type in the
//!   workspace implements, plus [`ErrorSeverity`]
//!
//! This crate has no knowledge of providers or sessions; it only holds the
//! primitives the domain and core crates build on.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod auth;
pub mod error;

pub use auth::{
    generate_code_challenge, generate_code_verifier, generate_correlation_token,
    validate_correlation, PkceChallenge,
};
pub use error::{ErrorClassification, ErrorSeverity};
