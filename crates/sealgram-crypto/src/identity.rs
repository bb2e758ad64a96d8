//! Per-user asymmetric identity
//!
//! Each user owns an X25519 encryption keypair (key wrapping only) and a
//! signing keypair. This module is a factory and holder: encrypt/sign live
//! in [`crate::keywrap`] and [`crate::signing`], parameterized by the key
//! material held here.
//!
//! Private halves never appear in `PublicIdentity`, the only type that is
//! safe to hand across the trust boundary.

use rand::{CryptoRng, RngCore};
use x25519_dalek::{PublicKey, StaticSecret};

use crate::signing::{SignatureAlgorithm, SigningKey, VerifyingKey};

/// Which public key to export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublicKeyKind {
    /// X25519 key-wrapping key
    Encryption,
    /// Signature verification key
    Signing,
}

/// A user's full asymmetric identity, private halves included.
#[derive(Clone)]
pub struct IdentityKeyPair {
    encryption_secret: StaticSecret,
    encryption_public: PublicKey,
    signing: SigningKey,
}

/// The public half of an identity, safe to publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicIdentity {
    /// X25519 public key used to wrap symmetric keys for this user
    pub encryption: PublicKey,
    /// Public key used to verify this user's signatures
    pub signing: VerifyingKey,
}

impl IdentityKeyPair {
    /// Generate a fresh identity: X25519 encryption keypair plus an Ed25519
    /// signing keypair.
    ///
    /// The caller supplies the CSPRNG. Production call sites hand in
    /// `OsRng`, which aborts rather than degrade if OS entropy is
    /// unavailable; there is no fallback to a weaker source.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self::generate_with_algorithm(rng, SignatureAlgorithm::Ed25519)
    }

    /// Generate an identity with an explicit signing algorithm family.
    pub fn generate_with_algorithm<R: RngCore + CryptoRng>(
        rng: &mut R,
        algorithm: SignatureAlgorithm,
    ) -> Self {
        let encryption_secret = StaticSecret::random_from_rng(&mut *rng);
        let encryption_public = PublicKey::from(&encryption_secret);
        let signing = match algorithm {
            SignatureAlgorithm::Ed25519 => SigningKey::generate_ed25519(rng),
            SignatureAlgorithm::EcdsaP256 => SigningKey::generate_p256(rng),
        };

        Self { encryption_secret, encryption_public, signing }
    }

    /// The publishable half of this identity.
    pub fn public(&self) -> PublicIdentity {
        PublicIdentity {
            encryption: self.encryption_public,
            signing: self.signing.verifying_key(),
        }
    }

    /// Export one public key as bytes.
    pub fn export_public(&self, kind: PublicKeyKind) -> Vec<u8> {
        match kind {
            PublicKeyKind::Encryption => self.encryption_public.as_bytes().to_vec(),
            PublicKeyKind::Signing => self.signing.verifying_key().to_bytes(),
        }
    }

    /// Private X25519 key, for unwrapping keys addressed to this user.
    pub fn encryption_secret(&self) -> &StaticSecret {
        &self.encryption_secret
    }

    /// Private signing key.
    pub fn signing_key(&self) -> &SigningKey {
        &self.signing
    }
}

impl std::fmt::Debug for IdentityKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Public halves only; private material must not reach logs.
        f.debug_struct("IdentityKeyPair")
            .field("encryption_public", &self.encryption_public)
            .field("signing", &self.signing)
            .finish()
    }
}
