//! Asymmetric key wrapping (sealed box over X25519)
//!
//! Transports a symmetric key to one recipient: a fresh ephemeral X25519
//! keypair is generated per wrap, Diffie-Hellman with the recipient's static
//! public key feeds HKDF-SHA256, and the derived key encrypts the raw
//! symmetric key with ChaCha20-Poly1305. The HKDF info binds both public
//! keys so a wrapped key cannot be replayed under different ones.
//!
//! Wire layout: `ephemeral_pub(32) ‖ nonce(12) ‖ ciphertext(32) ‖ tag(16)`.

use chacha20poly1305::{
    ChaCha20Poly1305, Key, Nonce,
    aead::{Aead, KeyInit},
};
use hkdf::Hkdf;
use rand::{CryptoRng, RngCore};
use sha2::Sha256;
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};

use crate::{
    aead::{KEY_SIZE, NONCE_SIZE, SymmetricKey, TAG_SIZE},
    error::CryptoError,
};

/// Domain-separation label for wrap-key derivation
const WRAP_CONTEXT: &[u8] = b"sealgram:key-wrap:v1";

/// Total size of a wrapped key on the wire
pub const WRAPPED_KEY_SIZE: usize = 32 + NONCE_SIZE + KEY_SIZE + TAG_SIZE;

/// A symmetric key encrypted under one recipient's public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrappedKey(Vec<u8>);

impl WrappedKey {
    /// Wire bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Take ownership of the wire bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// Reconstruct from stored bytes. Length is the only check here; a
    /// corrupt body surfaces as `KeyUnwrapFailure` at unwrap time.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, CryptoError> {
        if bytes.len() != WRAPPED_KEY_SIZE {
            return Err(CryptoError::InvalidLength {
                field: "wrapped_key",
                expected: WRAPPED_KEY_SIZE,
                got: bytes.len(),
            });
        }
        Ok(Self(bytes))
    }
}

/// Derive the AEAD key protecting one wrap.
fn derive_wrap_key(shared_secret: &[u8; 32], ephemeral_pub: &[u8; 32], recipient_pub: &[u8; 32]) -> [u8; KEY_SIZE] {
    let hkdf = Hkdf::<Sha256>::new(None, shared_secret);

    let mut info = Vec::with_capacity(WRAP_CONTEXT.len() + 64);
    info.extend_from_slice(WRAP_CONTEXT);
    info.extend_from_slice(ephemeral_pub);
    info.extend_from_slice(recipient_pub);

    let mut key = [0u8; KEY_SIZE];
    let Ok(()) = hkdf.expand(&info, &mut key) else {
        unreachable!("32 bytes is a valid HKDF-SHA256 output length");
    };

    key
}

/// Wrap a symmetric key for one recipient.
///
/// Randomized: every call draws a fresh ephemeral keypair and nonce, so
/// wrapping the same key twice yields different bytes.
pub fn wrap_key<R: RngCore + CryptoRng>(
    key: &SymmetricKey,
    recipient_public: &PublicKey,
    rng: &mut R,
) -> WrappedKey {
    let ephemeral = EphemeralSecret::random_from_rng(&mut *rng);
    let ephemeral_pub = PublicKey::from(&ephemeral);
    let shared = ephemeral.diffie_hellman(recipient_public);

    let wrap_key =
        derive_wrap_key(shared.as_bytes(), ephemeral_pub.as_bytes(), recipient_public.as_bytes());

    let mut nonce = [0u8; NONCE_SIZE];
    rng.fill_bytes(&mut nonce);

    let cipher = ChaCha20Poly1305::new(Key::from_slice(&wrap_key));
    let Ok(body) = cipher.encrypt(Nonce::from_slice(&nonce), key.as_bytes().as_slice()) else {
        unreachable!("ChaCha20-Poly1305 encryption cannot fail with valid inputs");
    };

    let mut out = Vec::with_capacity(WRAPPED_KEY_SIZE);
    out.extend_from_slice(ephemeral_pub.as_bytes());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&body);

    WrappedKey(out)
}

/// Unwrap a symmetric key with the recipient's private key.
///
/// # Errors
///
/// - `KeyUnwrapFailure` for every failure mode: truncation, malformed
///   header, or AEAD rejection. One uniform error, so callers cannot be
///   turned into a format oracle.
pub fn unwrap_key(wrapped: &WrappedKey, recipient_secret: &StaticSecret) -> Result<SymmetricKey, CryptoError> {
    let bytes = wrapped.as_bytes();
    if bytes.len() != WRAPPED_KEY_SIZE {
        return Err(CryptoError::KeyUnwrapFailure);
    }

    let mut ephemeral_pub_bytes = [0u8; 32];
    ephemeral_pub_bytes.copy_from_slice(&bytes[..32]);
    let ephemeral_pub = PublicKey::from(ephemeral_pub_bytes);

    let mut nonce = [0u8; NONCE_SIZE];
    nonce.copy_from_slice(&bytes[32..32 + NONCE_SIZE]);

    let body = &bytes[32 + NONCE_SIZE..];

    let recipient_pub = PublicKey::from(recipient_secret);
    let shared = recipient_secret.diffie_hellman(&ephemeral_pub);

    let wrap_key =
        derive_wrap_key(shared.as_bytes(), &ephemeral_pub_bytes, recipient_pub.as_bytes());

    let cipher = ChaCha20Poly1305::new(Key::from_slice(&wrap_key));
    let plaintext = cipher
        .decrypt(Nonce::from_slice(&nonce), body)
        .map_err(|_| CryptoError::KeyUnwrapFailure)?;

    let raw: [u8; KEY_SIZE] =
        plaintext.try_into().map_err(|_| CryptoError::KeyUnwrapFailure)?;

    Ok(SymmetricKey::from_bytes(raw))
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use super::*;

    fn test_rng() -> ChaCha20Rng {
        ChaCha20Rng::seed_from_u64(11)
    }

    fn recipient(rng: &mut ChaCha20Rng) -> (StaticSecret, PublicKey) {
        let secret = StaticSecret::random_from_rng(&mut *rng);
        let public = PublicKey::from(&secret);
        (secret, public)
    }

    #[test]
    fn wrap_unwrap_roundtrip() {
        let mut rng = test_rng();
        let (secret, public) = recipient(&mut rng);
        let key = SymmetricKey::generate(&mut rng);

        let wrapped = wrap_key(&key, &public, &mut rng);
        let unwrapped = unwrap_key(&wrapped, &secret).unwrap();

        assert_eq!(unwrapped.as_bytes(), key.as_bytes());
    }

    #[test]
    fn wrap_is_randomized() {
        let mut rng = test_rng();
        let (_, public) = recipient(&mut rng);
        let key = SymmetricKey::generate(&mut rng);

        let first = wrap_key(&key, &public, &mut rng);
        let second = wrap_key(&key, &public, &mut rng);

        assert_ne!(first, second);
    }

    #[test]
    fn wrong_recipient_cannot_unwrap() {
        let mut rng = test_rng();
        let (_, public) = recipient(&mut rng);
        let (other_secret, _) = recipient(&mut rng);
        let key = SymmetricKey::generate(&mut rng);

        let wrapped = wrap_key(&key, &public, &mut rng);

        assert_eq!(unwrap_key(&wrapped, &other_secret).unwrap_err(), CryptoError::KeyUnwrapFailure);
    }

    #[test]
    fn tampered_body_fails_uniformly() {
        let mut rng = test_rng();
        let (secret, public) = recipient(&mut rng);
        let key = SymmetricKey::generate(&mut rng);

        let wrapped = wrap_key(&key, &public, &mut rng);

        for index in [0usize, 33, WRAPPED_KEY_SIZE - 1] {
            let mut bytes = wrapped.clone().into_bytes();
            bytes[index] ^= 0x01;
            let tampered = WrappedKey::from_bytes(bytes).unwrap();
            assert_eq!(
                unwrap_key(&tampered, &secret).unwrap_err(),
                CryptoError::KeyUnwrapFailure,
                "tamper at byte {index} must fail"
            );
        }
    }

    #[test]
    fn truncated_bytes_rejected_at_parse() {
        let result = WrappedKey::from_bytes(vec![0u8; WRAPPED_KEY_SIZE - 1]);
        assert!(matches!(result, Err(CryptoError::InvalidLength { field: "wrapped_key", .. })));
    }

    #[test]
    fn wrapped_key_has_expected_size() {
        let mut rng = test_rng();
        let (_, public) = recipient(&mut rng);
        let key = SymmetricKey::generate(&mut rng);

        let wrapped = wrap_key(&key, &public, &mut rng);
        assert_eq!(wrapped.as_bytes().len(), WRAPPED_KEY_SIZE);
    }
}
