//! Storage abstraction for the messaging core.
//!
//! Trait-based abstraction over the durable document store. The trait is
//! synchronous (no async): every core operation runs to completion before
//! returning, and callers impose their own deadlines on the collaborator.
//!
//! The two write paths with concurrency hazards get conditional semantics
//! instead of blind puts: group updates compare-and-swap on `key_version`,
//! and ledger appends are "append if tail == expected". Everything else is
//! plain puts over immutable records.

mod error;
mod memory;

pub use error::StorageError;
pub use memory::MemoryStorage;

use crate::record::{Block, Envelope, EnvelopeId, Group, GroupId, GroupKeyGrant, UserId};

/// Storage abstraction over the four persisted record kinds.
///
/// Must be `Clone` (shared by the services), `Send + Sync`, and
/// synchronous. Implementations typically share internal state via `Arc`,
/// so clones access the same underlying storage.
pub trait Storage: Clone + Send + Sync + 'static {
    /// Create a group record.
    ///
    /// Fails with [`StorageError::GroupExists`] if the id is taken.
    fn create_group(&self, group: &Group) -> Result<(), StorageError>;

    /// Load a group by id. `None` if absent.
    fn load_group(&self, group_id: &GroupId) -> Result<Option<Group>, StorageError>;

    /// Replace a group record if and only if the stored `key_version`
    /// equals `expected_version`.
    ///
    /// This is the §optimistic-concurrency guard: concurrent mutations of
    /// the same group race on this compare-and-swap and all but one fail
    /// with [`StorageError::VersionConflict`].
    fn update_group(&self, group: &Group, expected_version: u32) -> Result<(), StorageError>;

    /// All group records. Order is not guaranteed.
    fn list_groups(&self) -> Result<Vec<Group>, StorageError>;

    /// Upsert a grant, keyed by `(group_id, user_id, key_version)`.
    fn put_grant(&self, grant: &GroupKeyGrant) -> Result<(), StorageError>;

    /// Grants for one member of one group, sorted by `key_version`
    /// descending (most recent first).
    fn grants_for_user(
        &self,
        group_id: &GroupId,
        user_id: &UserId,
    ) -> Result<Vec<GroupKeyGrant>, StorageError>;

    /// Persist an envelope. Envelopes are immutable; ids never collide.
    fn put_envelope(&self, envelope: &Envelope) -> Result<(), StorageError>;

    /// Load an envelope by id. `None` if absent.
    fn load_envelope(&self, id: &EnvelopeId) -> Result<Option<Envelope>, StorageError>;

    /// Direct-message envelopes exchanged between two users, in either
    /// direction, ordered by send time ascending.
    fn envelopes_between(
        &self,
        a: &UserId,
        b: &UserId,
    ) -> Result<Vec<Envelope>, StorageError>;

    /// Envelopes addressed to a group, ordered by send time ascending.
    fn envelopes_for_group(&self, group_id: &GroupId) -> Result<Vec<Envelope>, StorageError>;

    /// Append a block if and only if `block.index` equals the current
    /// chain length.
    ///
    /// Fails with [`StorageError::IndexConflict`] otherwise, so two racing
    /// appends can never both claim the same predecessor.
    fn append_block(&self, block: &Block) -> Result<(), StorageError>;

    /// The current chain tail. `None` if no blocks exist.
    fn latest_block(&self) -> Result<Option<Block>, StorageError>;

    /// The full chain, ordered by index ascending.
    fn load_blocks(&self) -> Result<Vec<Block>, StorageError>;
}
