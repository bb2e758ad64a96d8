//! Sealgram Cryptographic Primitives
//!
//! Cryptographic building blocks for the sealgram messaging core. Pure
//! functions and plain key types; callers provide the RNG so tests can run
//! deterministically.
//!
//! # Key Lifecycle
//!
//! Every user owns two long-lived keypairs generated at registration: an
//! X25519 encryption keypair used only to wrap symmetric keys, and a signing
//! keypair used only to authenticate ciphertext.
//!
//! ```text
//! Identity (X25519 + signing keypair)
//!        │
//!        ▼
//! Key Wrap (sealed box) → per-recipient wrapped symmetric key
//!        │
//!        ▼
//! AEAD Encryption → nonce ‖ ciphertext ‖ tag
//!        │
//!        ▼
//! Signature over ciphertext → sender authenticity
//! ```
//!
//! Symmetric keys are either single-use (one random key per direct message)
//! or group keys with a versioned lifetime managed by the caller. Nonces are
//! drawn fresh from the caller's CSPRNG for every encryption; a (key, nonce)
//! pair is never reused.
//!
//! # Security
//!
//! Confidentiality:
//! - ChaCha20-Poly1305 AEAD with 256-bit keys
//! - Symmetric keys travel only inside sealed boxes (X25519 + HKDF + AEAD)
//! - Key material is zeroized on drop
//!
//! Authenticity:
//! - Signatures are computed over the ciphertext, so tampering is detectable
//!   without the symmetric key
//! - Failed AEAD tag -> reject message, no partial plaintext
//!
//! Algorithm agility:
//! - Signing keys carry a one-byte algorithm tag (Ed25519 or ECDSA P-256)
//!   resolved once at parse time; sign/verify dispatch on the tag

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod aead;
pub mod error;
pub mod identity;
pub mod keywrap;
pub mod signing;

pub use aead::{KEY_SIZE, NONCE_SIZE, SealedMessage, SymmetricKey, TAG_SIZE, decrypt, encrypt};
pub use error::CryptoError;
pub use identity::{IdentityKeyPair, PublicIdentity, PublicKeyKind};
pub use keywrap::{WrappedKey, unwrap_key, wrap_key};
pub use signing::{Signature, SignatureAlgorithm, SigningKey, VerifyingKey};
