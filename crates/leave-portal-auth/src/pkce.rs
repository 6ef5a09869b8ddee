//! PKCE (RFC 7636) helpers.
//!
//! The verifier is 32 bytes from the system CSPRNG, base64url encoded
//! without padding. The challenge is `BASE64URL(SHA256(verifier))`.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use ring::digest;
use ring::rand::{SecureRandom, SystemRandom};

use crate::error::{AuthError, Result};

/// Length of the PKCE code verifier in bytes (before base64 encoding).
pub const PKCE_VERIFIER_BYTES: usize = 32;

/// The only challenge method this client sends.
pub const CHALLENGE_METHOD: &str = "S256";

/// Fill `len` bytes from the system CSPRNG and base64url-encode them.
///
/// # Errors
///
/// Returns [`AuthError::Entropy`] if the system CSPRNG fails.
pub fn random_token(len: usize) -> Result<String> {
    let rng = SystemRandom::new();
    let mut bytes = vec![0u8; len];
    rng.fill(&mut bytes).map_err(|_| AuthError::Entropy)?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// Generate a PKCE code verifier.
///
/// # Errors
///
/// Returns [`AuthError::Entropy`] if the system CSPRNG fails.
pub fn generate_code_verifier() -> Result<String> {
    random_token(PKCE_VERIFIER_BYTES)
}

/// Derive the PKCE code challenge from a code verifier using SHA-256.
pub fn generate_code_challenge(verifier: &str) -> String {
    let hash = digest::digest(&digest::SHA256, verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash.as_ref())
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn verifier_is_correct_length() {
        let verifier = generate_code_verifier().unwrap();
        // 32 bytes base64url encoded = 43 characters (no padding).
        assert_eq!(verifier.len(), 43);
    }

    #[test]
    fn verifier_is_url_safe() {
        let verifier = generate_code_verifier().unwrap();
        for c in verifier.chars() {
            assert!(
                c.is_ascii_alphanumeric() || c == '-' || c == '_',
                "unexpected character in verifier: {c}"
            );
        }
    }

    #[test]
    fn verifiers_do_not_repeat() {
        let sample: HashSet<String> = (0..1000)
            .map(|_| generate_code_verifier().unwrap())
            .collect();
        assert_eq!(sample.len(), 1000);
    }

    #[test]
    fn challenge_is_deterministic() {
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        assert_eq!(
            generate_code_challenge(verifier),
            generate_code_challenge(verifier)
        );
    }

    #[test]
    fn challenge_matches_rfc7636_vector() {
        // RFC 7636 Appendix B.
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        assert_eq!(
            generate_code_challenge(verifier),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn challenge_has_no_padding_or_standard_alphabet() {
        for _ in 0..200 {
            let challenge = generate_code_challenge(&generate_code_verifier().unwrap());
            assert_eq!(challenge.len(), 43);
            assert!(!challenge.contains(['+', '/', '=']));
        }
    }

    #[test]
    fn random_token_length_scales() {
        assert_eq!(random_token(16).unwrap().len(), 22);
        assert_eq!(random_token(0).unwrap(), "");
    }
}
