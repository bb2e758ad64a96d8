//! Digital signatures over two algorithm families
//!
//! Keys carry a one-byte algorithm tag (Ed25519 or ECDSA P-256 with
//! SHA-256). The tag is resolved exactly once, when key bytes are parsed;
//! `sign` and `verify` are a match over the resulting variant. There is no
//! try-one-then-fall-back probing: an unknown tag is a parse error.
//!
//! `verify` returns `bool` and never errors on a bad signature; errors are
//! reserved for unparsable key material.

use ed25519_dalek::{Signer as _, Verifier as _};
use rand::{CryptoRng, RngCore};

use crate::error::CryptoError;

/// Algorithm tag byte for Ed25519
const TAG_ED25519: u8 = 0x01;

/// Algorithm tag byte for ECDSA P-256 with SHA-256
const TAG_ECDSA_P256: u8 = 0x02;

/// Supported signature algorithm families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    /// Ed25519 (EdDSA over Curve25519)
    Ed25519,
    /// ECDSA over NIST P-256 with SHA-256
    EcdsaP256,
}

impl SignatureAlgorithm {
    fn tag(self) -> u8 {
        match self {
            Self::Ed25519 => TAG_ED25519,
            Self::EcdsaP256 => TAG_ECDSA_P256,
        }
    }
}

/// A private signing key, tagged by algorithm family.
#[derive(Clone)]
pub enum SigningKey {
    /// Ed25519 private key
    Ed25519(ed25519_dalek::SigningKey),
    /// ECDSA P-256 private key
    EcdsaP256(p256::ecdsa::SigningKey),
}

/// A public verification key, tagged by algorithm family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyingKey {
    /// Ed25519 public key
    Ed25519(ed25519_dalek::VerifyingKey),
    /// ECDSA P-256 public key
    EcdsaP256(p256::ecdsa::VerifyingKey),
}

/// A detached signature, tagged by the family that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signature {
    /// Ed25519 signature (64 bytes)
    Ed25519(ed25519_dalek::Signature),
    /// ECDSA P-256 signature (64 bytes, fixed encoding)
    EcdsaP256(p256::ecdsa::Signature),
}

impl SigningKey {
    /// Generate a fresh Ed25519 signing key.
    pub fn generate_ed25519<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self::Ed25519(ed25519_dalek::SigningKey::generate(rng))
    }

    /// Generate a fresh ECDSA P-256 signing key.
    pub fn generate_p256<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self::EcdsaP256(p256::ecdsa::SigningKey::random(rng))
    }

    /// Which algorithm family this key belongs to.
    pub fn algorithm(&self) -> SignatureAlgorithm {
        match self {
            Self::Ed25519(_) => SignatureAlgorithm::Ed25519,
            Self::EcdsaP256(_) => SignatureAlgorithm::EcdsaP256,
        }
    }

    /// The matching public verification key.
    pub fn verifying_key(&self) -> VerifyingKey {
        match self {
            Self::Ed25519(key) => VerifyingKey::Ed25519(key.verifying_key()),
            Self::EcdsaP256(key) => VerifyingKey::EcdsaP256(*key.verifying_key()),
        }
    }

    /// Sign a message.
    pub fn sign(&self, message: &[u8]) -> Signature {
        match self {
            Self::Ed25519(key) => Signature::Ed25519(key.sign(message)),
            Self::EcdsaP256(key) => {
                let signature: p256::ecdsa::Signature = key.sign(message);
                Signature::EcdsaP256(signature)
            },
        }
    }

    /// Encode as `tag ‖ secret scalar` for storage inside the trust
    /// boundary. Never part of any client-visible payload.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(33);
        out.push(self.algorithm().tag());
        match self {
            Self::Ed25519(key) => out.extend_from_slice(&key.to_bytes()),
            Self::EcdsaP256(key) => out.extend_from_slice(&key.to_bytes()),
        }
        out
    }

    /// Parse from `tag ‖ secret scalar`, resolving the algorithm once.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let (&tag, rest) = bytes
            .split_first()
            .ok_or(CryptoError::InvalidKeyMaterial { reason: "empty signing key" })?;

        match tag {
            TAG_ED25519 => {
                let seed: [u8; 32] = rest.try_into().map_err(|_| {
                    CryptoError::InvalidKeyMaterial { reason: "ed25519 key must be 32 bytes" }
                })?;
                Ok(Self::Ed25519(ed25519_dalek::SigningKey::from_bytes(&seed)))
            },
            TAG_ECDSA_P256 => p256::ecdsa::SigningKey::from_slice(rest)
                .map(Self::EcdsaP256)
                .map_err(|_| CryptoError::InvalidKeyMaterial { reason: "invalid P-256 scalar" }),
            _ => Err(CryptoError::InvalidKeyMaterial { reason: "unknown signing algorithm tag" }),
        }
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SigningKey({:?})", self.algorithm())
    }
}

impl VerifyingKey {
    /// Which algorithm family this key belongs to.
    pub fn algorithm(&self) -> SignatureAlgorithm {
        match self {
            Self::Ed25519(_) => SignatureAlgorithm::Ed25519,
            Self::EcdsaP256(_) => SignatureAlgorithm::EcdsaP256,
        }
    }

    /// Verify a detached signature over `message`.
    ///
    /// Returns `false` for any cryptographically invalid signature: wrong
    /// bytes, wrong message, or a signature from a different family.
    /// Unparsable signature bytes are invalid signatures, not errors.
    pub fn verify(&self, message: &[u8], signature_bytes: &[u8]) -> bool {
        let Some((&tag, raw)) = signature_bytes.split_first() else {
            return false;
        };

        match self {
            Self::Ed25519(key) => {
                if tag != TAG_ED25519 {
                    return false;
                }
                let Ok(signature) = ed25519_dalek::Signature::from_slice(raw) else {
                    return false;
                };
                key.verify(message, &signature).is_ok()
            },
            Self::EcdsaP256(key) => {
                if tag != TAG_ECDSA_P256 {
                    return false;
                }
                let Ok(signature) = p256::ecdsa::Signature::from_slice(raw) else {
                    return false;
                };
                key.verify(message, &signature).is_ok()
            },
        }
    }

    /// Encode as `tag ‖ key bytes` (32 bytes Ed25519, 33 bytes compressed
    /// SEC1 for P-256).
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(34);
        out.push(self.algorithm().tag());
        match self {
            Self::Ed25519(key) => out.extend_from_slice(key.as_bytes()),
            Self::EcdsaP256(key) => out.extend_from_slice(key.to_encoded_point(true).as_bytes()),
        }
        out
    }

    /// Parse from `tag ‖ key bytes`, resolving the algorithm once.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let (&tag, rest) = bytes
            .split_first()
            .ok_or(CryptoError::InvalidKeyMaterial { reason: "empty verifying key" })?;

        match tag {
            TAG_ED25519 => {
                let raw: [u8; 32] = rest.try_into().map_err(|_| {
                    CryptoError::InvalidKeyMaterial { reason: "ed25519 key must be 32 bytes" }
                })?;
                ed25519_dalek::VerifyingKey::from_bytes(&raw)
                    .map(Self::Ed25519)
                    .map_err(|_| CryptoError::InvalidKeyMaterial { reason: "invalid ed25519 point" })
            },
            TAG_ECDSA_P256 => p256::ecdsa::VerifyingKey::from_sec1_bytes(rest)
                .map(Self::EcdsaP256)
                .map_err(|_| CryptoError::InvalidKeyMaterial { reason: "invalid P-256 point" }),
            _ => Err(CryptoError::InvalidKeyMaterial { reason: "unknown signing algorithm tag" }),
        }
    }
}

impl Signature {
    /// Which algorithm family produced this signature.
    pub fn algorithm(&self) -> SignatureAlgorithm {
        match self {
            Self::Ed25519(_) => SignatureAlgorithm::Ed25519,
            Self::EcdsaP256(_) => SignatureAlgorithm::EcdsaP256,
        }
    }

    /// Encode as `tag ‖ 64 signature bytes`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(65);
        out.push(self.algorithm().tag());
        match self {
            Self::Ed25519(signature) => out.extend_from_slice(&signature.to_bytes()),
            Self::EcdsaP256(signature) => out.extend_from_slice(&signature.to_bytes()),
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use super::*;

    fn test_rng() -> ChaCha20Rng {
        ChaCha20Rng::seed_from_u64(23)
    }

    fn both_families(rng: &mut ChaCha20Rng) -> [SigningKey; 2] {
        [SigningKey::generate_ed25519(rng), SigningKey::generate_p256(rng)]
    }

    #[test]
    fn sign_verify_roundtrip_both_families() {
        let mut rng = test_rng();
        for key in both_families(&mut rng) {
            let message = b"bind me to this sender";
            let signature = key.sign(message);

            assert!(key.verifying_key().verify(message, &signature.to_bytes()));
        }
    }

    #[test]
    fn altered_message_rejected() {
        let mut rng = test_rng();
        for key in both_families(&mut rng) {
            let signature = key.sign(b"original");
            assert!(!key.verifying_key().verify(b"0riginal", &signature.to_bytes()));
        }
    }

    #[test]
    fn altered_signature_rejected() {
        let mut rng = test_rng();
        for key in both_families(&mut rng) {
            let mut bytes = key.sign(b"message").to_bytes();
            bytes[40] ^= 0x01;
            assert!(!key.verifying_key().verify(b"message", &bytes));
        }
    }

    #[test]
    fn cross_family_signature_is_false_not_error() {
        let mut rng = test_rng();
        let [ed, p256] = both_families(&mut rng);

        let signature = ed.sign(b"message").to_bytes();
        assert!(!p256.verifying_key().verify(b"message", &signature));

        let signature = p256.sign(b"message").to_bytes();
        assert!(!ed.verifying_key().verify(b"message", &signature));
    }

    #[test]
    fn empty_or_garbage_signature_is_false() {
        let mut rng = test_rng();
        let key = SigningKey::generate_ed25519(&mut rng);
        let verifying = key.verifying_key();

        assert!(!verifying.verify(b"message", &[]));
        assert!(!verifying.verify(b"message", &[TAG_ED25519]));
        assert!(!verifying.verify(b"message", &[0xFF; 65]));
    }

    #[test]
    fn key_encoding_roundtrip() {
        let mut rng = test_rng();
        for key in both_families(&mut rng) {
            let restored = SigningKey::from_bytes(&key.to_bytes()).unwrap();
            assert_eq!(restored.algorithm(), key.algorithm());

            let verifying = VerifyingKey::from_bytes(&key.verifying_key().to_bytes()).unwrap();
            assert_eq!(verifying, key.verifying_key());

            // A key restored from bytes must verify signatures from the original.
            let signature = key.sign(b"message").to_bytes();
            assert!(verifying.verify(b"message", &signature));
        }
    }

    #[test]
    fn unknown_algorithm_tag_is_parse_error() {
        let result = VerifyingKey::from_bytes(&[0x7F, 0, 0, 0]);
        assert!(matches!(
            result,
            Err(CryptoError::InvalidKeyMaterial { reason: "unknown signing algorithm tag" })
        ));

        let result = SigningKey::from_bytes(&[0x7F; 33]);
        assert!(matches!(result, Err(CryptoError::InvalidKeyMaterial { .. })));
    }

    #[test]
    fn truncated_key_material_is_parse_error() {
        assert!(VerifyingKey::from_bytes(&[]).is_err());
        assert!(VerifyingKey::from_bytes(&[TAG_ED25519, 1, 2, 3]).is_err());
        assert!(SigningKey::from_bytes(&[TAG_ECDSA_P256]).is_err());
    }

    #[test]
    fn debug_never_prints_private_scalar() {
        let mut rng = test_rng();
        let key = SigningKey::generate_ed25519(&mut rng);
        assert_eq!(format!("{key:?}"), "SigningKey(Ed25519)");
    }
}
