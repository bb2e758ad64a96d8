//! Append-only hash-chained ledger.
//!
//! A linear chain of [`Block`]s recording message metadata as tamper
//! evidence. Each block's hash commits to its index, timestamp, payload,
//! and the predecessor's hash; altering any persisted block breaks
//! validation from that point on. `validate` exists to prove tampering
//! happened, not to repair it.
//!
//! One `Ledger` instance is constructed at the dependency-injection root
//! (load-or-genesis) and shared by reference. Appends are serialized: the
//! read of the current tail and the write of the new block form a critical
//! section under the instance's append lock, backed by the storage layer's
//! conditional append.

use sha2::{Digest, Sha256};
use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};

use crate::{
    error::CoreError,
    record::Block,
    storage::{Storage, StorageError},
    time::now_ms,
};

/// `previous_hash` of the genesis block.
const GENESIS_PREVIOUS_HASH: &str = "0";

/// The full chain plus its integrity verdict, as returned to callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerSnapshot {
    /// All blocks, index ascending
    pub blocks: Vec<Block>,
    /// Whether the whole chain passed validation
    pub is_valid: bool,
}

/// Hex SHA-256 over the canonical JSON form of a block's committed fields.
///
/// `serde_json` maps serialize with sorted keys, and the payload is a
/// `BTreeMap`, so the byte encoding is independent of insertion order.
fn block_hash(
    index: u64,
    timestamp_ms: u64,
    payload: &BTreeMap<String, String>,
    previous_hash: &str,
) -> Result<String, CoreError> {
    let canonical = serde_json::json!({
        "index": index,
        "timestamp_ms": timestamp_ms,
        "payload": payload,
        "previous_hash": previous_hash,
    });
    let bytes = serde_json::to_vec(&canonical)
        .map_err(|err| CoreError::Serialization { message: err.to_string() })?;

    Ok(hex::encode(Sha256::digest(&bytes)))
}

/// Append-only hash-linked ledger over a storage backend.
#[derive(Clone)]
pub struct Ledger<S> {
    storage: S,
    append_lock: Arc<Mutex<()>>,
}

impl<S: Storage> Ledger<S> {
    /// Construct from persisted state, creating the genesis block if no
    /// chain exists yet.
    pub fn load_or_genesis(storage: S) -> Result<Self, CoreError> {
        let ledger = Self { storage, append_lock: Arc::new(Mutex::new(())) };

        if ledger.storage.latest_block()?.is_none() {
            let genesis = Self::genesis()?;
            match ledger.storage.append_block(&genesis) {
                Ok(()) => tracing::info!("ledger genesis created"),
                // Another writer created genesis between our check and write.
                Err(StorageError::IndexConflict { .. }) => {},
                Err(err) => return Err(err.into()),
            }
        }

        Ok(ledger)
    }

    /// The genesis block: index 0, sentinel payload, no predecessor.
    fn genesis() -> Result<Block, CoreError> {
        let timestamp_ms = now_ms();
        let payload = BTreeMap::from([("genesis".to_owned(), "true".to_owned())]);
        let hash = block_hash(0, timestamp_ms, &payload, GENESIS_PREVIOUS_HASH)?;

        Ok(Block {
            index: 0,
            timestamp_ms,
            payload,
            previous_hash: GENESIS_PREVIOUS_HASH.to_owned(),
            hash,
        })
    }

    /// Append a payload as a new block chained to the current tail.
    ///
    /// # Panics
    ///
    /// Panics if the append lock is poisoned.
    #[allow(clippy::expect_used)]
    pub fn append(&self, payload: BTreeMap<String, String>) -> Result<Block, CoreError> {
        let _guard = self.append_lock.lock().expect("append lock poisoned");

        let tail = match self.storage.latest_block()? {
            Some(tail) => tail,
            // Lazy genesis: first append on an empty chain.
            None => {
                let genesis = Self::genesis()?;
                self.storage.append_block(&genesis)?;
                genesis
            },
        };

        let index = tail.index + 1;
        let timestamp_ms = now_ms();
        let hash = block_hash(index, timestamp_ms, &payload, &tail.hash)?;
        let block = Block { index, timestamp_ms, payload, previous_hash: tail.hash, hash };

        self.storage.append_block(&block)?;
        tracing::info!(index, "ledger block appended");

        Ok(block)
    }

    /// The full chain, index ascending.
    pub fn blocks(&self) -> Result<Vec<Block>, CoreError> {
        Ok(self.storage.load_blocks()?)
    }

    /// Walk the chain, recomputing every hash and checking every link.
    ///
    /// `false` means the persisted record was altered after the fact.
    pub fn validate(&self) -> Result<bool, CoreError> {
        let blocks = self.storage.load_blocks()?;

        for (position, block) in blocks.iter().enumerate() {
            if block.index != position as u64 {
                return Ok(false);
            }

            let expected_previous = if position == 0 {
                GENESIS_PREVIOUS_HASH
            } else {
                blocks[position - 1].hash.as_str()
            };
            if block.previous_hash != expected_previous {
                return Ok(false);
            }

            let recomputed =
                block_hash(block.index, block.timestamp_ms, &block.payload, &block.previous_hash)?;
            if block.hash != recomputed {
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// The chain plus its validity verdict in one call.
    pub fn snapshot(&self) -> Result<LedgerSnapshot, CoreError> {
        let is_valid = self.validate()?;
        let blocks = self.storage.load_blocks()?;

        if !is_valid {
            tracing::warn!("ledger validation failed: chain was altered after the fact");
        }

        Ok(LedgerSnapshot { blocks, is_valid })
    }
}
