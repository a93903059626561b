//! Correlation token and PKCE (Proof Key for Code Exchange) generation
//!
//! Implements RFC 7636 for providers that accept PKCE, and the random
//! correlation (`state`) token every authorization request carries.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};

const RANDOM_BYTES: usize = 32;

fn random_urlsafe() -> String {
    let mut bytes = [0u8; RANDOM_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Generate a cryptographically secure code verifier
///
/// Returns a URL-safe base64-encoded random string of 32 bytes (43
/// characters). Per RFC 7636, verifiers must be 43-128 characters long.
#[must_use]
pub fn generate_code_verifier() -> String {
    random_urlsafe()
}

/// Generate code challenge from verifier using SHA256
///
/// Per RFC 7636, the challenge is BASE64URL(SHA256(ASCII(code_verifier)))
#[must_use]
pub fn generate_code_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// Generate a random correlation token for CSRF protection
///
/// The token is sent as the `state` parameter of an authorization request and
/// must come back unchanged in the provider's callback.
#[must_use]
pub fn generate_correlation_token() -> String {
    random_urlsafe()
}

/// Compare an expected correlation token with the one echoed by a callback
///
/// Runs in time proportional to the longer input regardless of where the
/// inputs differ.
#[must_use]
pub fn validate_correlation(expected: &str, actual: &str) -> bool {
    let expected = expected.as_bytes();
    let actual = actual.as_bytes();
    let len = expected.len().max(actual.len());

    let mut diff = u8::from(expected.len() != actual.len());
    for i in 0..len {
        let a = expected.get(i).copied().unwrap_or(0);
        let b = actual.get(i).copied().unwrap_or(0);
        diff |= a ^ b;
    }
    diff == 0
}

/// PKCE verifier/challenge pair for one authorization attempt
///
/// The verifier stays with the caller until token exchange; only the
/// challenge is placed in the authorization URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkceChallenge {
    /// Random string (43 chars, base64url encoded), kept secret until
    /// token exchange
    pub code_verifier: String,

    /// SHA256 hash of `code_verifier` (base64url encoded)
    pub code_challenge: String,
}

impl PkceChallenge {
    /// Generate a new PKCE pair with cryptographically secure random values
    ///
    /// # Examples
    /// ```
    /// use socialauth_common::auth::PkceChallenge;
    ///
    /// let challenge = PkceChallenge::generate();
    /// assert!(challenge.code_verifier.len() >= 43);
    /// assert!(challenge.code_verifier.len() <= 128);
    /// ```
    #[must_use]
    pub fn generate() -> Self {
        let code_verifier = generate_code_verifier();
        let code_challenge = generate_code_challenge(&code_verifier);
        Self { code_verifier, code_challenge }
    }

    /// Get the challenge method (always "S256" for SHA256)
    #[must_use]
    pub const fn challenge_method(&self) -> &'static str {
        "S256"
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for auth::pkce.
    use super::*;

    #[test]
    fn test_generate_pkce_challenge() {
        let challenge = PkceChallenge::generate();

        // RFC 7636: 43-128 chars
        assert!(challenge.code_verifier.len() >= 43);
        assert!(challenge.code_verifier.len() <= 128);
        assert!(!challenge.code_challenge.is_empty());
        assert_eq!(challenge.challenge_method(), "S256");
    }

    #[test]
    fn test_unique_values() {
        let first = PkceChallenge::generate();
        let second = PkceChallenge::generate();

        assert_ne!(first.code_verifier, second.code_verifier);
        assert_ne!(generate_correlation_token(), generate_correlation_token());
    }

    #[test]
    fn test_base64url_encoding() {
        let challenge = PkceChallenge::generate();
        let state = generate_correlation_token();

        for value in [&challenge.code_verifier, &challenge.code_challenge, &state] {
            assert!(!value.contains('='));
            assert!(!value.contains('+'));
            assert!(!value.contains('/'));
        }
    }

    /// RFC 7636 Appendix B test vector.
    #[test]
    fn test_code_challenge_known_vector() {
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        assert_eq!(
            generate_code_challenge(verifier),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn test_validate_correlation() {
        let state = generate_correlation_token();

        assert!(validate_correlation(&state, &state));
        assert!(!validate_correlation(&state, "c1"));
        assert!(!validate_correlation("c1", "c2"));
        assert!(!validate_correlation("c1", "c1x"));
        assert!(!validate_correlation("", "c1"));
        assert!(validate_correlation("", ""));
    }
}
