//! Sealgram Core
//!
//! The secure-group-messaging core: per-user identity registration, hybrid
//! message encryption, ciphertext signatures, group symmetric-key lifecycle,
//! and an append-only hash-chained ledger of message metadata.
//!
//! The surrounding HTTP/auth layers are external collaborators. They hand
//! this crate an already-authenticated [`AuthContext`], a [`UserDirectory`]
//! resolving user ids to key material, and a [`storage::Storage`] backend
//! for durable records; everything else happens here.
//!
//! # Architecture
//!
//! ```text
//! MessageService ──► GroupKeyManager ──► Storage (groups, grants)
//!       │                  │
//!       │                  └──────────► UserDirectory (public keys)
//!       ├──► sealgram-crypto (AEAD, key wrap, signatures)
//!       ├──► Storage (envelopes)
//!       └──► Ledger ──► Storage (blocks, serialized appends)
//! ```
//!
//! Send path: obtain a symmetric key (fresh per direct message, versioned
//! grant for groups), encrypt, sign the ciphertext, persist the envelope,
//! append a metadata block to the ledger. Receive path is the reverse with
//! one hard rule: the signature is checked before any decryption, and a
//! message that fails verification is never decrypted.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod config;
pub mod directory;
pub mod error;
pub mod group;
pub mod ledger;
pub mod message;
pub mod record;
pub mod storage;
pub mod time;

pub use config::CoreConfig;
pub use directory::{AuthContext, InMemoryDirectory, UserDirectory};
pub use error::CoreError;
pub use group::GroupKeyManager;
pub use ledger::{Ledger, LedgerSnapshot};
pub use message::{MessageService, MessageView, ReadFailure};
pub use record::{Block, Destination, Envelope, EnvelopeId, Group, GroupId, GroupKeyGrant, UserId};
