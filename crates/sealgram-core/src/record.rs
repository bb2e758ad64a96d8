//! Persisted record types.
//!
//! These are the exact document shapes handed to the [`crate::storage`]
//! layer: groups, per-member key grants, message envelopes, and ledger
//! blocks. All of them are immutable once written except [`Group`], which
//! mutates only through the compare-and-swap update path.

use std::collections::{BTreeMap, BTreeSet};

use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

/// Envelope format: legacy, signature computed over the plaintext.
/// Read-only; never written by this code.
pub const FORMAT_SIGNED_PLAINTEXT: u8 = 1;

/// Envelope format: canonical, signature computed over the ciphertext so
/// tampering is detectable before decryption.
pub const FORMAT_SIGNED_CIPHERTEXT: u8 = 2;

fn random_hex_id<R: RngCore + CryptoRng>(rng: &mut R) -> String {
    let mut bytes = [0u8; 16];
    rng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

macro_rules! string_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Generate a random 128-bit hex id.
            pub fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
                Self(random_hex_id(rng))
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }
    };
}

string_id! {
    /// Opaque user identifier, assigned by the (out-of-scope) account system.
    UserId
}

string_id! {
    /// Opaque group identifier.
    GroupId
}

string_id! {
    /// Opaque envelope identifier.
    EnvelopeId
}

/// A messaging group and its key-version bookkeeping.
///
/// Invariants: `admin_id` is always in `members`; `key_version` starts at 1
/// and increments exactly once per rotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Group identifier
    pub id: GroupId,
    /// Human-readable group name
    pub name: String,
    /// The single admin; the only user allowed to mutate the group
    pub admin_id: UserId,
    /// Current members, admin included
    pub members: BTreeSet<UserId>,
    /// Generation of the group's symmetric key, `>= 1`
    pub key_version: u32,
    /// Unix millis at creation
    pub created_at_ms: u64,
    /// Unix millis of the last mutating operation
    pub last_activity_ms: u64,
}

impl Group {
    /// Whether `user` is currently a member.
    pub fn is_member(&self, user: &UserId) -> bool {
        self.members.contains(user)
    }
}

/// One member's access to one generation of a group's symmetric key.
///
/// The key itself is wrapped under the member's public encryption key; only
/// the member's private key can recover it. Exactly one grant exists per
/// `(group_id, user_id, key_version)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupKeyGrant {
    /// Group this grant belongs to
    pub group_id: GroupId,
    /// Member the key is wrapped for
    pub user_id: UserId,
    /// Key generation this grant carries
    pub key_version: u32,
    /// The group key, wrapped for `user_id`
    pub wrapped_key: Vec<u8>,
    /// Unix millis when the grant was issued
    pub granted_at_ms: u64,
}

/// Where a message is addressed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Destination {
    /// Direct message to one user
    User {
        /// The recipient
        recipient_id: UserId,
    },
    /// Message to every member of a group
    Group {
        /// The group
        group_id: GroupId,
    },
}

/// The stored, encrypted-and-signed representation of one message.
/// Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Envelope identifier
    pub id: EnvelopeId,
    /// Which decoder applies; see [`FORMAT_SIGNED_CIPHERTEXT`]
    pub format_version: u8,
    /// Authenticated author
    pub sender_id: UserId,
    /// Recipient user or group
    pub destination: Destination,
    /// AEAD nonce
    pub nonce: [u8; 12],
    /// Ciphertext, tag excluded
    pub ciphertext: Vec<u8>,
    /// AEAD authentication tag
    pub tag: [u8; 16],
    /// Per-party wrapped copies of the message key. Populated for direct
    /// messages (sender and recipient each get one); empty for group
    /// messages, which resolve the key through a [`GroupKeyGrant`].
    pub wrapped_keys: BTreeMap<UserId, Vec<u8>>,
    /// Group key generation this message was encrypted under; `None` for
    /// direct messages
    pub key_version: Option<u32>,
    /// Detached signature (over ciphertext for v2, plaintext for legacy v1)
    pub signature: Vec<u8>,
    /// Unix millis when the message was sent
    pub sent_at_ms: u64,
}

impl Envelope {
    /// Whether this envelope is addressed to a group.
    pub fn is_group(&self) -> bool {
        matches!(self.destination, Destination::Group { .. })
    }
}

/// One link of the tamper-evidence chain.
///
/// `hash` commits to every other field; `previous_hash` commits to the
/// predecessor. Mutating any persisted block breaks validation from that
/// block onward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Position in the chain, genesis = 0
    pub index: u64,
    /// Unix millis when the block was appended
    pub timestamp_ms: u64,
    /// Opaque metadata record; keys are hashed in sorted order
    pub payload: BTreeMap<String, String>,
    /// Hash of the predecessor, `"0"` for genesis
    pub previous_hash: String,
    /// Hex SHA-256 over the canonical form of this block
    pub hash: String,
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use super::*;

    #[test]
    fn random_ids_are_distinct_hex() {
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        let first = EnvelopeId::random(&mut rng);
        let second = EnvelopeId::random(&mut rng);

        assert_ne!(first, second);
        assert_eq!(first.0.len(), 32);
        assert!(first.0.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn destination_serde_tags_kind() {
        let destination = Destination::Group { group_id: GroupId::from("g1") };
        let json = serde_json::to_string(&destination).unwrap();

        assert!(json.contains(r#""kind":"group""#));

        let back: Destination = serde_json::from_str(&json).unwrap();
        assert_eq!(back, destination);
    }

    #[test]
    fn envelope_is_group_follows_destination() {
        let mut rng = ChaCha20Rng::seed_from_u64(4);
        let envelope = Envelope {
            id: EnvelopeId::random(&mut rng),
            format_version: FORMAT_SIGNED_CIPHERTEXT,
            sender_id: UserId::from("alice"),
            destination: Destination::User { recipient_id: UserId::from("bob") },
            nonce: [0; 12],
            ciphertext: vec![1, 2, 3],
            tag: [0; 16],
            wrapped_keys: BTreeMap::new(),
            key_version: None,
            signature: vec![],
            sent_at_ms: 0,
        };

        assert!(!envelope.is_group());
    }
}
