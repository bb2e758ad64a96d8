//! Authenticated message encryption using ChaCha20-Poly1305
//!
//! The IETF variant: 256-bit key, 96-bit nonce, 128-bit Poly1305 tag.
//! Nonce and tag are kept as separate fields because stored envelopes
//! persist them separately. Callers provide the RNG.

use chacha20poly1305::{
    ChaCha20Poly1305, Key, Nonce,
    aead::{Aead, KeyInit},
};
use rand::{CryptoRng, RngCore};
use zeroize::Zeroize;

use crate::error::CryptoError;

/// Symmetric key size in bytes (256 bits)
pub const KEY_SIZE: usize = 32;

/// Nonce size in bytes (96 bits)
pub const NONCE_SIZE: usize = 12;

/// Poly1305 tag size in bytes (128 bits)
pub const TAG_SIZE: usize = 16;

/// A 256-bit symmetric encryption key.
///
/// Zeroized on drop. There is deliberately no `PartialEq`: key comparison
/// outside tests is a misuse.
#[derive(Clone)]
pub struct SymmetricKey([u8; KEY_SIZE]);

impl SymmetricKey {
    /// Generate a fresh random key from the caller's CSPRNG.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Wrap existing key bytes.
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl Drop for SymmetricKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SymmetricKey(..)")
    }
}

/// An encrypted message: nonce, ciphertext, and authentication tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedMessage {
    /// The 12-byte nonce used for this encryption
    pub nonce: [u8; NONCE_SIZE],
    /// Ciphertext without the tag
    pub ciphertext: Vec<u8>,
    /// The 16-byte Poly1305 tag
    pub tag: [u8; TAG_SIZE],
}

/// Encrypt a message with a fresh random nonce.
///
/// The nonce is drawn from the caller's CSPRNG on every call. A (key, nonce)
/// pair is never reused: direct messages use a single-use random key, and
/// group keys rely on the 96-bit random nonce staying collision-free for the
/// lifetime of one key version.
pub fn encrypt<R: RngCore + CryptoRng>(
    plaintext: &[u8],
    key: &SymmetricKey,
    rng: &mut R,
) -> SealedMessage {
    let mut nonce = [0u8; NONCE_SIZE];
    rng.fill_bytes(&mut nonce);

    let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));

    let Ok(mut combined) = cipher.encrypt(Nonce::from_slice(&nonce), plaintext) else {
        unreachable!("ChaCha20-Poly1305 encryption cannot fail with valid inputs");
    };

    // The aead crate appends the tag; split it back off for storage.
    let tag_start = combined.len() - TAG_SIZE;
    let mut tag = [0u8; TAG_SIZE];
    tag.copy_from_slice(&combined[tag_start..]);
    combined.truncate(tag_start);

    SealedMessage { nonce, ciphertext: combined, tag }
}

/// Decrypt a message, verifying its authentication tag.
///
/// # Errors
///
/// - `AuthenticationFailure` if the tag does not verify. No plaintext is
///   ever returned on failure.
pub fn decrypt(sealed: &SealedMessage, key: &SymmetricKey) -> Result<Vec<u8>, CryptoError> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));

    let mut combined = Vec::with_capacity(sealed.ciphertext.len() + TAG_SIZE);
    combined.extend_from_slice(&sealed.ciphertext);
    combined.extend_from_slice(&sealed.tag);

    cipher
        .decrypt(Nonce::from_slice(&sealed.nonce), combined.as_slice())
        .map_err(|_| CryptoError::AuthenticationFailure)
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use super::*;

    fn test_rng() -> ChaCha20Rng {
        ChaCha20Rng::seed_from_u64(7)
    }

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let mut rng = test_rng();
        let key = SymmetricKey::generate(&mut rng);
        let plaintext = b"Hello, World!";

        let sealed = encrypt(plaintext, &key, &mut rng);
        let decrypted = decrypt(&sealed, &key).unwrap();

        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn encrypt_decrypt_empty_message() {
        let mut rng = test_rng();
        let key = SymmetricKey::generate(&mut rng);

        let sealed = encrypt(b"", &key, &mut rng);
        assert!(sealed.ciphertext.is_empty());

        let decrypted = decrypt(&sealed, &key).unwrap();
        assert!(decrypted.is_empty());
    }

    #[test]
    fn encrypt_decrypt_large_message() {
        let mut rng = test_rng();
        let key = SymmetricKey::generate(&mut rng);
        let plaintext = vec![0x42u8; 64 * 1024]; // 64KB

        let sealed = encrypt(&plaintext, &key, &mut rng);
        let decrypted = decrypt(&sealed, &key).unwrap();

        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn ciphertext_excludes_tag() {
        let mut rng = test_rng();
        let key = SymmetricKey::generate(&mut rng);
        let plaintext = b"test message";

        let sealed = encrypt(plaintext, &key, &mut rng);

        assert_eq!(sealed.ciphertext.len(), plaintext.len());
    }

    #[test]
    fn fresh_nonce_per_call() {
        let mut rng = test_rng();
        let key = SymmetricKey::generate(&mut rng);

        let first = encrypt(b"same plaintext", &key, &mut rng);
        let second = encrypt(b"same plaintext", &key, &mut rng);

        assert_ne!(first.nonce, second.nonce);
        assert_ne!(first.ciphertext, second.ciphertext);
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let mut rng = test_rng();
        let key = SymmetricKey::generate(&mut rng);

        let mut sealed = encrypt(b"original message", &key, &mut rng);
        sealed.ciphertext[0] ^= 0x01;

        assert_eq!(decrypt(&sealed, &key), Err(CryptoError::AuthenticationFailure));
    }

    #[test]
    fn tampered_tag_fails() {
        let mut rng = test_rng();
        let key = SymmetricKey::generate(&mut rng);

        let mut sealed = encrypt(b"original message", &key, &mut rng);
        sealed.tag[15] ^= 0x80;

        assert_eq!(decrypt(&sealed, &key), Err(CryptoError::AuthenticationFailure));
    }

    #[test]
    fn tampered_nonce_fails() {
        let mut rng = test_rng();
        let key = SymmetricKey::generate(&mut rng);

        let mut sealed = encrypt(b"original message", &key, &mut rng);
        sealed.nonce[0] ^= 0xFF;

        assert_eq!(decrypt(&sealed, &key), Err(CryptoError::AuthenticationFailure));
    }

    #[test]
    fn wrong_key_fails() {
        let mut rng = test_rng();
        let key = SymmetricKey::generate(&mut rng);
        let other = SymmetricKey::generate(&mut rng);

        let sealed = encrypt(b"secret", &key, &mut rng);

        assert_eq!(decrypt(&sealed, &other), Err(CryptoError::AuthenticationFailure));
    }

    #[test]
    fn debug_never_prints_key_bytes() {
        let mut rng = test_rng();
        let key = SymmetricKey::generate(&mut rng);
        assert_eq!(format!("{key:?}"), "SymmetricKey(..)");
    }
}
