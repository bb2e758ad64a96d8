//! Error taxonomy for the messaging core.
//!
//! One pattern-matchable enum instead of stringly exceptions: domain
//! validation failures, cryptographic failures, and storage faults are
//! distinct variants so callers can branch without parsing messages.
//! No error path ever substitutes default values for cryptographic
//! material.

use thiserror::Error;

use crate::storage::StorageError;

/// Errors surfaced by the messaging core.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A referenced user, group, or envelope does not exist
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Record kind ("user", "group", "envelope")
        kind: &'static str,
        /// The id that failed to resolve
        id: String,
    },

    /// A non-admin attempted an admin-only group operation
    #[error("permission denied: {action} requires group admin")]
    PermissionDenied {
        /// The attempted operation
        action: &'static str,
    },

    /// Attempt to add a user who is already a member
    #[error("user {user_id} is already a member of group {group_id}")]
    AlreadyMember {
        /// Target group
        group_id: String,
        /// The already-present user
        user_id: String,
    },

    /// Attempt to remove the group admin
    #[error("the admin of group {group_id} cannot be removed")]
    CannotRemoveAdmin {
        /// Target group
        group_id: String,
    },

    /// The user has no access to this group
    #[error("user {user_id} is not a member of group {group_id}")]
    NotAMember {
        /// Target group
        group_id: String,
        /// The non-member
        user_id: String,
    },

    /// Registration for an id that already has an identity
    #[error("user {user_id} is already registered")]
    AlreadyRegistered {
        /// The duplicate id
        user_id: String,
    },

    /// AEAD tag mismatch; the stored ciphertext or tag was altered
    #[error("message unreadable: authentication failed")]
    AuthenticationFailure,

    /// Ciphertext signature did not verify; content is withheld
    #[error("message withheld: signature invalid")]
    SignatureInvalid,

    /// A wrapped key could not be unwrapped with the caller's private key
    #[error("key unwrap failed")]
    KeyUnwrapFailure,

    /// The message requires a key generation the caller holds no grant for
    #[error("no grant for required key version {required}")]
    KeyVersionUnavailable {
        /// The generation the message was encrypted under
        required: u32,
    },

    /// Plaintext exceeds the configured limit
    #[error("message of {size} bytes exceeds limit of {limit}")]
    MessageTooLarge {
        /// Attempted plaintext size
        size: usize,
        /// Configured maximum
        limit: usize,
    },

    /// Optimistic-concurrency retries exhausted for a group mutation
    #[error("group {group_id} mutation conflicted {attempts} times, giving up")]
    MutationConflict {
        /// Contended group
        group_id: String,
        /// Retries attempted
        attempts: u32,
    },

    /// Envelope carries a format version this code has no decoder for
    #[error("unknown envelope format version {version}")]
    UnknownEnvelopeFormat {
        /// The unrecognized version byte
        version: u8,
    },

    /// Record (de)serialization failed
    #[error("serialization error: {message}")]
    Serialization {
        /// Underlying serializer message
        message: String,
    },

    /// Storage collaborator failure
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Residual cryptographic fault (unparsable key material and similar)
    #[error("crypto error: {0}")]
    Crypto(sealgram_crypto::CryptoError),
}

/// The two dedicated variants keep their meaning; everything else stays a
/// generic crypto fault.
impl From<sealgram_crypto::CryptoError> for CoreError {
    fn from(err: sealgram_crypto::CryptoError) -> Self {
        match err {
            sealgram_crypto::CryptoError::AuthenticationFailure => Self::AuthenticationFailure,
            sealgram_crypto::CryptoError::KeyUnwrapFailure => Self::KeyUnwrapFailure,
            other => Self::Crypto(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use sealgram_crypto::CryptoError;

    use super::*;

    #[test]
    fn crypto_failures_map_to_dedicated_variants() {
        assert_eq!(
            CoreError::from(CryptoError::AuthenticationFailure),
            CoreError::AuthenticationFailure
        );
        assert_eq!(CoreError::from(CryptoError::KeyUnwrapFailure), CoreError::KeyUnwrapFailure);
    }

    #[test]
    fn residual_crypto_faults_stay_wrapped() {
        let err = CoreError::from(CryptoError::InvalidKeyMaterial { reason: "bad tag" });
        assert!(matches!(err, CoreError::Crypto(_)));
    }

    #[test]
    fn storage_errors_convert() {
        let err: CoreError =
            StorageError::IndexConflict { expected: 3, got: 5 }.into();
        assert!(matches!(err, CoreError::Storage(_)));
    }
}
