//! Error types for sealgram cryptographic operations.
//!
//! One enum per failure class so callers can pattern-match instead of
//! string-matching. Variants deliberately carry no secret-dependent detail:
//! an unwrap failure does not reveal whether the key or the ciphertext was
//! at fault beyond what the underlying primitive already leaks.

use thiserror::Error;

/// Errors from cryptographic primitives.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// AEAD authentication tag did not verify; ciphertext or tag was altered
    #[error("authentication failed: ciphertext or tag rejected")]
    AuthenticationFailure,

    /// A wrapped key could not be unwrapped (truncated, malformed, or
    /// encrypted for a different key)
    #[error("key unwrap failed")]
    KeyUnwrapFailure,

    /// Key bytes could not be parsed (unknown algorithm tag, wrong length,
    /// or not a valid curve point / scalar)
    #[error("invalid key material: {reason}")]
    InvalidKeyMaterial {
        /// What made the bytes unparsable
        reason: &'static str,
    },

    /// An input had an impossible length for its field
    #[error("invalid length for {field}: expected {expected}, got {got}")]
    InvalidLength {
        /// Field being parsed
        field: &'static str,
        /// Required byte length
        expected: usize,
        /// Actual byte length
        got: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::CryptoError;

    #[test]
    fn display_does_not_mention_key_bytes() {
        let err = CryptoError::KeyUnwrapFailure;
        assert_eq!(err.to_string(), "key unwrap failed");
    }

    #[test]
    fn invalid_length_reports_both_sizes() {
        let err = CryptoError::InvalidLength { field: "nonce", expected: 12, got: 7 };
        assert!(err.to_string().contains("expected 12"));
        assert!(err.to_string().contains("got 7"));
    }
}
