//! Message envelope orchestration.
//!
//! Ties identity, hybrid encryption, signatures, group keys, and the
//! ledger together into the send/read surface the routing layer consumes.
//!
//! Send: obtain a symmetric key (fresh random key per direct message, the
//! caller's current grant for groups), encrypt, sign the ciphertext,
//! persist the envelope, append a metadata block to the ledger.
//!
//! Read: resolve the key, verify, decrypt. For the canonical format the
//! signature is verified over the ciphertext *before* any decryption, and
//! an envelope that fails verification is never decrypted. Failures are
//! reported per message; one corrupt envelope does not hide the rest of a
//! conversation.

use rand::rngs::OsRng;
use sealgram_crypto::{IdentityKeyPair, SealedMessage, SymmetricKey, aead, keywrap};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::{
    config::CoreConfig,
    directory::{AuthContext, UserDirectory},
    error::CoreError,
    group::GroupKeyManager,
    ledger::{Ledger, LedgerSnapshot},
    record::{
        Destination, Envelope, EnvelopeId, FORMAT_SIGNED_CIPHERTEXT, FORMAT_SIGNED_PLAINTEXT,
        Group, GroupId, UserId,
    },
    storage::Storage,
    time::now_ms,
};

/// Why one message could not be read. Per-message: surfaced inside
/// [`MessageView`] so the rest of the conversation still decodes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReadFailure {
    /// Signature did not verify; content withheld even if decryptable
    #[error("signature invalid")]
    SignatureInvalid,

    /// AEAD tag mismatch; stored ciphertext or tag was altered
    #[error("authentication failed")]
    AuthenticationFailure,

    /// The caller's wrapped key copy would not unwrap
    #[error("key unwrap failed")]
    KeyUnwrapFailure,

    /// Message requires a key generation the caller has no grant for
    #[error("key version {required} unavailable")]
    KeyVersionUnavailable {
        /// Generation the message was encrypted under
        required: u32,
    },

    /// The caller holds no grant for this group at all
    #[error("not a member")]
    NotAMember,

    /// The sender's keys are no longer resolvable
    #[error("sender unknown")]
    SenderUnknown,

    /// Envelope carries an unsupported format version
    #[error("unknown format version {version}")]
    UnknownFormat {
        /// The unrecognized version byte
        version: u8,
    },

    /// Envelope is internally inconsistent (missing key version, non-UTF-8
    /// plaintext)
    #[error("malformed envelope")]
    MalformedEnvelope,
}

impl From<CoreError> for ReadFailure {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::AuthenticationFailure => Self::AuthenticationFailure,
            CoreError::KeyUnwrapFailure | CoreError::Crypto(_) => Self::KeyUnwrapFailure,
            CoreError::KeyVersionUnavailable { required } => Self::KeyVersionUnavailable { required },
            CoreError::NotAMember { .. } => Self::NotAMember,
            CoreError::NotFound { .. } => Self::SenderUnknown,
            CoreError::UnknownEnvelopeFormat { version } => Self::UnknownFormat { version },
            _ => Self::MalformedEnvelope,
        }
    }
}

/// One decoded message as returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageView {
    /// Envelope this view was decoded from
    pub envelope_id: EnvelopeId,
    /// Authenticated sender
    pub sender_id: UserId,
    /// Unix millis when the message was sent
    pub sent_at_ms: u64,
    /// Whether the sender's signature verified
    pub signature_valid: bool,
    /// The plaintext, or why it is being withheld
    pub content: Result<String, ReadFailure>,
}

/// Orchestrates send and read over the crypto, group-key, storage, and
/// ledger collaborators. One instance per process, constructed at the
/// dependency-injection root.
#[derive(Clone)]
pub struct MessageService<S, D> {
    storage: S,
    directory: D,
    groups: GroupKeyManager<S, D>,
    ledger: Ledger<S>,
    config: CoreConfig,
}

impl<S: Storage, D: UserDirectory> MessageService<S, D> {
    /// Build the service, loading the ledger (or creating its genesis).
    pub fn new(storage: S, directory: D, config: CoreConfig) -> Result<Self, CoreError> {
        let groups = GroupKeyManager::new(storage.clone(), directory.clone(), &config);
        let ledger = Ledger::load_or_genesis(storage.clone())?;

        Ok(Self { storage, directory, groups, ledger, config })
    }

    /// Encrypt, sign, and store a direct message; returns the envelope id.
    ///
    /// A fresh random key is generated per message and wrapped twice: once
    /// for the recipient and once for the sender, so both parties can read
    /// the stored envelope later.
    pub fn send_direct(
        &self,
        ctx: &AuthContext,
        recipient: &UserId,
        plaintext: &str,
    ) -> Result<EnvelopeId, CoreError> {
        self.check_size(plaintext)?;

        let sender_keys = self.directory.private_keys(&ctx.user_id)?;
        let recipient_public = self.directory.public_keys(recipient)?;

        let mut rng = OsRng;
        let key = SymmetricKey::generate(&mut rng);
        let sealed = aead::encrypt(plaintext.as_bytes(), &key, &mut rng);
        let signature = sender_keys.signing_key().sign(&sealed.ciphertext).to_bytes();

        let mut wrapped_keys = BTreeMap::new();
        wrapped_keys.insert(
            ctx.user_id.clone(),
            keywrap::wrap_key(&key, &sender_keys.public().encryption, &mut rng).into_bytes(),
        );
        wrapped_keys.insert(
            recipient.clone(),
            keywrap::wrap_key(&key, &recipient_public.encryption, &mut rng).into_bytes(),
        );

        let envelope = Envelope {
            id: EnvelopeId::random(&mut rng),
            format_version: FORMAT_SIGNED_CIPHERTEXT,
            sender_id: ctx.user_id.clone(),
            destination: Destination::User { recipient_id: recipient.clone() },
            nonce: sealed.nonce,
            ciphertext: sealed.ciphertext,
            tag: sealed.tag,
            wrapped_keys,
            key_version: None,
            signature,
            sent_at_ms: now_ms(),
        };
        self.storage.put_envelope(&envelope)?;

        self.record_send(&envelope, "direct_message")?;
        tracing::info!(envelope_id = %envelope.id, recipient = %recipient, "direct message sent");

        Ok(envelope.id)
    }

    /// Encrypt, sign, and store a group message; returns the envelope id.
    ///
    /// The key comes from the sender's current grant; the envelope records
    /// which `key_version` it was encrypted under so readers resolve the
    /// exact generation (or learn that they cannot).
    pub fn send_group(
        &self,
        ctx: &AuthContext,
        group_id: &GroupId,
        plaintext: &str,
    ) -> Result<EnvelopeId, CoreError> {
        self.check_size(plaintext)?;

        let group = self
            .storage
            .load_group(group_id)?
            .ok_or_else(|| CoreError::NotFound { kind: "group", id: group_id.to_string() })?;
        if !group.is_member(&ctx.user_id) {
            return Err(CoreError::NotAMember {
                group_id: group_id.to_string(),
                user_id: ctx.user_id.to_string(),
            });
        }

        let sender_keys = self.directory.private_keys(&ctx.user_id)?;
        let (key, key_version) =
            self.groups.key_for_user(group_id, &ctx.user_id, sender_keys.encryption_secret())?;

        let mut rng = OsRng;
        let sealed = aead::encrypt(plaintext.as_bytes(), &key, &mut rng);
        let signature = sender_keys.signing_key().sign(&sealed.ciphertext).to_bytes();

        let envelope = Envelope {
            id: EnvelopeId::random(&mut rng),
            format_version: FORMAT_SIGNED_CIPHERTEXT,
            sender_id: ctx.user_id.clone(),
            destination: Destination::Group { group_id: group_id.clone() },
            nonce: sealed.nonce,
            ciphertext: sealed.ciphertext,
            tag: sealed.tag,
            wrapped_keys: BTreeMap::new(),
            key_version: Some(key_version),
            signature,
            sent_at_ms: now_ms(),
        };
        self.storage.put_envelope(&envelope)?;

        self.record_send(&envelope, "group_message")?;
        tracing::info!(
            envelope_id = %envelope.id,
            group_id = %group_id,
            key_version,
            "group message sent"
        );

        Ok(envelope.id)
    }

    /// Read a conversation: all messages exchanged with a peer, or all
    /// messages of a group, oldest first.
    ///
    /// Decode failures are reported per message. For groups, callers who
    /// never held any grant get `NotAMember` for the whole call; removed
    /// members still decode the history their superseded grants cover.
    pub fn read_messages(
        &self,
        ctx: &AuthContext,
        scope: &Destination,
    ) -> Result<Vec<MessageView>, CoreError> {
        let requester_keys = self.directory.private_keys(&ctx.user_id)?;

        let envelopes = match scope {
            Destination::User { recipient_id } => {
                self.storage.envelopes_between(&ctx.user_id, recipient_id)?
            },
            Destination::Group { group_id } => {
                let group = self.storage.load_group(group_id)?.ok_or_else(|| {
                    CoreError::NotFound { kind: "group", id: group_id.to_string() }
                })?;
                let grants = self.storage.grants_for_user(group_id, &ctx.user_id)?;
                if grants.is_empty() && !group.is_member(&ctx.user_id) {
                    return Err(CoreError::NotAMember {
                        group_id: group_id.to_string(),
                        user_id: ctx.user_id.to_string(),
                    });
                }
                self.storage.envelopes_for_group(group_id)?
            },
        };

        Ok(envelopes
            .iter()
            .map(|envelope| self.decode(ctx, &requester_keys, envelope))
            .collect())
    }

    /// Decode one envelope for the requester, dispatching on its format
    /// version. Exactly one decoder per version; unknown versions are an
    /// explicit failure, not a fallback probe.
    fn decode(
        &self,
        ctx: &AuthContext,
        requester_keys: &IdentityKeyPair,
        envelope: &Envelope,
    ) -> MessageView {
        let view = |signature_valid, content| MessageView {
            envelope_id: envelope.id.clone(),
            sender_id: envelope.sender_id.clone(),
            sent_at_ms: envelope.sent_at_ms,
            signature_valid,
            content,
        };

        let sender_public = match self.directory.public_keys(&envelope.sender_id) {
            Ok(keys) => keys,
            Err(_) => return view(false, Err(ReadFailure::SenderUnknown)),
        };

        match envelope.format_version {
            FORMAT_SIGNED_CIPHERTEXT => {
                // Canonical: verify over ciphertext before touching the key.
                if !sender_public.signing.verify(&envelope.ciphertext, &envelope.signature) {
                    tracing::warn!(
                        envelope_id = %envelope.id,
                        "signature over ciphertext rejected: possible tampering"
                    );
                    return view(false, Err(ReadFailure::SignatureInvalid));
                }

                let key = match self.resolve_key(ctx, requester_keys, envelope) {
                    Ok(key) => key,
                    Err(failure) => return view(true, Err(failure)),
                };

                match decrypt_envelope(envelope, &key) {
                    Ok(plaintext) => view(true, decode_utf8(plaintext)),
                    Err(failure) => {
                        tracing::warn!(
                            envelope_id = %envelope.id,
                            "AEAD rejected envelope: possible tampering"
                        );
                        view(true, Err(failure))
                    },
                }
            },
            FORMAT_SIGNED_PLAINTEXT => {
                // Legacy: the signature covers the plaintext, so decryption
                // has to come first. Read-only; never written by this code.
                let key = match self.resolve_key(ctx, requester_keys, envelope) {
                    Ok(key) => key,
                    Err(failure) => return view(false, Err(failure)),
                };

                let plaintext = match decrypt_envelope(envelope, &key) {
                    Ok(plaintext) => plaintext,
                    Err(failure) => return view(false, Err(failure)),
                };

                if !sender_public.signing.verify(&plaintext, &envelope.signature) {
                    tracing::warn!(envelope_id = %envelope.id, "legacy signature rejected");
                    return view(false, Err(ReadFailure::SignatureInvalid));
                }

                view(true, decode_utf8(plaintext))
            },
            version => view(false, Err(ReadFailure::UnknownFormat { version })),
        }
    }

    /// Resolve the symmetric key an envelope was encrypted under, for the
    /// requesting party.
    fn resolve_key(
        &self,
        ctx: &AuthContext,
        requester_keys: &IdentityKeyPair,
        envelope: &Envelope,
    ) -> Result<SymmetricKey, ReadFailure> {
        match &envelope.destination {
            Destination::User { .. } => {
                let wrapped_bytes = envelope
                    .wrapped_keys
                    .get(&ctx.user_id)
                    .ok_or(ReadFailure::KeyUnwrapFailure)?;
                let wrapped = keywrap::WrappedKey::from_bytes(wrapped_bytes.clone())
                    .map_err(|_| ReadFailure::KeyUnwrapFailure)?;
                keywrap::unwrap_key(&wrapped, requester_keys.encryption_secret())
                    .map_err(|_| ReadFailure::KeyUnwrapFailure)
            },
            Destination::Group { group_id } => {
                let version = envelope.key_version.ok_or(ReadFailure::MalformedEnvelope)?;
                self.groups
                    .key_for_version(
                        group_id,
                        &ctx.user_id,
                        version,
                        requester_keys.encryption_secret(),
                    )
                    .map_err(ReadFailure::from)
            },
        }
    }

    /// Append an arbitrary metadata payload to the ledger.
    pub fn append_ledger_entry(
        &self,
        payload: BTreeMap<String, String>,
    ) -> Result<crate::record::Block, CoreError> {
        self.ledger.append(payload)
    }

    /// The full ledger plus its integrity verdict.
    pub fn ledger_snapshot(&self) -> Result<LedgerSnapshot, CoreError> {
        self.ledger.snapshot()
    }

    /// Create a group with the caller as admin. See [`GroupKeyManager`].
    pub fn create_group(&self, ctx: &AuthContext, name: &str) -> Result<Group, CoreError> {
        self.groups.create_group(ctx, name)
    }

    /// Add a member to a group. Admin-only.
    pub fn add_member(
        &self,
        ctx: &AuthContext,
        group_id: &GroupId,
        new_member: &UserId,
    ) -> Result<(), CoreError> {
        self.groups.add_member(ctx, group_id, new_member)
    }

    /// Remove a member, forcing a key rotation. Admin-only.
    pub fn remove_member(
        &self,
        ctx: &AuthContext,
        group_id: &GroupId,
        member: &UserId,
    ) -> Result<(), CoreError> {
        self.groups.remove_member(ctx, group_id, member)
    }

    /// Rotate a group's key. Admin-only; returns the new version.
    pub fn rotate_key(&self, ctx: &AuthContext, group_id: &GroupId) -> Result<u32, CoreError> {
        self.groups.rotate_key(ctx, group_id)
    }

    /// Groups the caller belongs to.
    pub fn list_groups(&self, ctx: &AuthContext) -> Result<Vec<Group>, CoreError> {
        self.groups.list_groups(ctx)
    }

    /// Metadata of one group, members only.
    pub fn group_info(&self, ctx: &AuthContext, group_id: &GroupId) -> Result<Group, CoreError> {
        self.groups.group_info(ctx, group_id)
    }

    fn check_size(&self, plaintext: &str) -> Result<(), CoreError> {
        if plaintext.len() > self.config.max_plaintext_bytes {
            return Err(CoreError::MessageTooLarge {
                size: plaintext.len(),
                limit: self.config.max_plaintext_bytes,
            });
        }
        Ok(())
    }

    fn record_send(&self, envelope: &Envelope, event: &str) -> Result<(), CoreError> {
        if !self.config.ledger_enabled {
            return Ok(());
        }

        // Metadata only: the ledger never sees plaintext or key material.
        let mut payload = BTreeMap::from([
            ("event".to_owned(), event.to_owned()),
            ("envelope_id".to_owned(), envelope.id.to_string()),
            ("sender".to_owned(), envelope.sender_id.to_string()),
            ("sent_at_ms".to_owned(), envelope.sent_at_ms.to_string()),
        ]);
        match &envelope.destination {
            Destination::User { recipient_id } => {
                payload.insert("recipient".to_owned(), recipient_id.to_string());
            },
            Destination::Group { group_id } => {
                payload.insert("group_id".to_owned(), group_id.to_string());
                if let Some(version) = envelope.key_version {
                    payload.insert("key_version".to_owned(), version.to_string());
                }
            },
        }

        self.ledger.append(payload)?;
        Ok(())
    }
}

fn decrypt_envelope(envelope: &Envelope, key: &SymmetricKey) -> Result<Vec<u8>, ReadFailure> {
    let sealed = SealedMessage {
        nonce: envelope.nonce,
        ciphertext: envelope.ciphertext.clone(),
        tag: envelope.tag,
    };
    aead::decrypt(&sealed, key).map_err(|_| ReadFailure::AuthenticationFailure)
}

fn decode_utf8(plaintext: Vec<u8>) -> Result<String, ReadFailure> {
    String::from_utf8(plaintext).map_err(|_| ReadFailure::MalformedEnvelope)
}
