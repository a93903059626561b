//! OAuth primitives shared by every provider adapter.
//!
//! # Security Features
//!
//! - **Correlation tokens**: 32 random bytes, base64url encoded, issued per
//!   login attempt and echoed back by the provider as `state`
//! - **Constant-time comparison**: correlation checks do not leak the position
//!   of the first differing byte
//! - **PKCE**: RFC 7636 `S256` challenges for providers that support it

pub mod pkce;

pub use pkce::{
    generate_code_challenge, generate_code_verifier, generate_correlation_token,
    validate_correlation, PkceChallenge,
};
