use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use super::{Storage, StorageError};
use crate::record::{Block, Destination, Envelope, EnvelopeId, Group, GroupId, GroupKeyGrant, UserId};

/// In-memory storage implementation for testing and embedding.
///
/// Uses `HashMap` for point lookups and Vecs for ordered records. All state
/// is wrapped in `Arc<Mutex<_>>` so clones share the same underlying store.
/// Thread-safe through the mutex, but uses `lock().expect()` which panics
/// if the mutex is poisoned - acceptable for test/embedded use.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<Mutex<MemoryStorageInner>>,
}

#[derive(Default)]
struct MemoryStorageInner {
    /// Groups by id
    groups: HashMap<GroupId, Group>,

    /// All grants, flat; queries filter by (group, user)
    grants: Vec<GroupKeyGrant>,

    /// Envelopes in insertion order
    envelopes: Vec<Envelope>,

    /// Ledger blocks in chain order
    blocks: Vec<Block>,
}

impl MemoryStorage {
    /// Create a new empty `MemoryStorage`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored envelopes, for tests.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    pub fn envelope_count(&self) -> usize {
        self.inner.lock().expect("Mutex poisoned").envelopes.len()
    }

    /// Total number of grants across all groups, for tests.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    pub fn grant_count(&self) -> usize {
        self.inner.lock().expect("Mutex poisoned").grants.len()
    }

    /// Overwrite a stored block in place, for tamper-detection tests.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    pub fn corrupt_block(&self, index: usize, block: Block) {
        let mut inner = self.inner.lock().expect("Mutex poisoned");
        if index < inner.blocks.len() {
            inner.blocks[index] = block;
        }
    }

    /// Overwrite a stored envelope in place, for tamper-detection tests.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    pub fn corrupt_envelope(&self, id: &EnvelopeId, envelope: Envelope) {
        let mut inner = self.inner.lock().expect("Mutex poisoned");
        if let Some(stored) = inner.envelopes.iter_mut().find(|e| &e.id == id) {
            *stored = envelope;
        }
    }
}

impl Storage for MemoryStorage {
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    fn create_group(&self, group: &Group) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");

        if inner.groups.contains_key(&group.id) {
            return Err(StorageError::GroupExists { group_id: group.id.to_string() });
        }

        inner.groups.insert(group.id.clone(), group.clone());
        Ok(())
    }

    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    fn load_group(&self, group_id: &GroupId) -> Result<Option<Group>, StorageError> {
        let inner = self.inner.lock().expect("Mutex poisoned");
        Ok(inner.groups.get(group_id).cloned())
    }

    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    fn update_group(&self, group: &Group, expected_version: u32) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");

        let Some(stored) = inner.groups.get_mut(&group.id) else {
            return Err(StorageError::Backend {
                message: format!("update of unknown group {}", group.id),
            });
        };

        if stored.key_version != expected_version {
            return Err(StorageError::VersionConflict {
                group_id: group.id.to_string(),
                expected: expected_version,
                found: stored.key_version,
            });
        }

        *stored = group.clone();
        Ok(())
    }

    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    fn list_groups(&self) -> Result<Vec<Group>, StorageError> {
        let inner = self.inner.lock().expect("Mutex poisoned");
        Ok(inner.groups.values().cloned().collect())
    }

    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    fn put_grant(&self, grant: &GroupKeyGrant) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");

        let existing = inner.grants.iter_mut().find(|g| {
            g.group_id == grant.group_id
                && g.user_id == grant.user_id
                && g.key_version == grant.key_version
        });

        match existing {
            Some(slot) => *slot = grant.clone(),
            None => inner.grants.push(grant.clone()),
        }
        Ok(())
    }

    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    fn grants_for_user(
        &self,
        group_id: &GroupId,
        user_id: &UserId,
    ) -> Result<Vec<GroupKeyGrant>, StorageError> {
        let inner = self.inner.lock().expect("Mutex poisoned");

        let mut grants: Vec<GroupKeyGrant> = inner
            .grants
            .iter()
            .filter(|g| &g.group_id == group_id && &g.user_id == user_id)
            .cloned()
            .collect();
        grants.sort_by(|a, b| b.key_version.cmp(&a.key_version));

        Ok(grants)
    }

    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    fn put_envelope(&self, envelope: &Envelope) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");
        inner.envelopes.push(envelope.clone());
        Ok(())
    }

    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    fn load_envelope(&self, id: &EnvelopeId) -> Result<Option<Envelope>, StorageError> {
        let inner = self.inner.lock().expect("Mutex poisoned");
        Ok(inner.envelopes.iter().find(|e| &e.id == id).cloned())
    }

    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    fn envelopes_between(&self, a: &UserId, b: &UserId) -> Result<Vec<Envelope>, StorageError> {
        let inner = self.inner.lock().expect("Mutex poisoned");

        let mut envelopes: Vec<Envelope> = inner
            .envelopes
            .iter()
            .filter(|e| match &e.destination {
                Destination::User { recipient_id } => {
                    (&e.sender_id == a && recipient_id == b)
                        || (&e.sender_id == b && recipient_id == a)
                },
                Destination::Group { .. } => false,
            })
            .cloned()
            .collect();
        envelopes.sort_by_key(|e| e.sent_at_ms);

        Ok(envelopes)
    }

    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    fn envelopes_for_group(&self, group_id: &GroupId) -> Result<Vec<Envelope>, StorageError> {
        let inner = self.inner.lock().expect("Mutex poisoned");

        let mut envelopes: Vec<Envelope> = inner
            .envelopes
            .iter()
            .filter(|e| matches!(&e.destination, Destination::Group { group_id: g } if g == group_id))
            .cloned()
            .collect();
        envelopes.sort_by_key(|e| e.sent_at_ms);

        Ok(envelopes)
    }

    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    fn append_block(&self, block: &Block) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");

        let expected = inner.blocks.len() as u64;
        if block.index != expected {
            return Err(StorageError::IndexConflict { expected, got: block.index });
        }

        inner.blocks.push(block.clone());
        Ok(())
    }

    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    fn latest_block(&self) -> Result<Option<Block>, StorageError> {
        let inner = self.inner.lock().expect("Mutex poisoned");
        Ok(inner.blocks.last().cloned())
    }

    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    fn load_blocks(&self) -> Result<Vec<Block>, StorageError> {
        let inner = self.inner.lock().expect("Mutex poisoned");
        Ok(inner.blocks.clone())
    }
}
