//! Storage error types.

use thiserror::Error;

/// Errors from the storage collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// A group with this id already exists
    #[error("group already exists: {group_id}")]
    GroupExists {
        /// The contested id
        group_id: String,
    },

    /// Compare-and-swap on a group's `key_version` failed
    #[error("version conflict on group {group_id}: expected {expected}, found {found}")]
    VersionConflict {
        /// Contended group
        group_id: String,
        /// Version the writer based its update on
        expected: u32,
        /// Version actually in storage
        found: u32,
    },

    /// Conditional block append lost the race for the chain tail
    #[error("block index conflict: chain length is {expected}, block claims {got}")]
    IndexConflict {
        /// Current chain length
        expected: u64,
        /// Index the rejected block carried
        got: u64,
    },

    /// The underlying document store failed
    #[error("storage backend error: {message}")]
    Backend {
        /// Backend-reported detail
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::StorageError;

    #[test]
    fn version_conflict_names_both_versions() {
        let err = StorageError::VersionConflict {
            group_id: "g1".to_owned(),
            expected: 2,
            found: 3,
        };
        let text = err.to_string();
        assert!(text.contains("expected 2"));
        assert!(text.contains("found 3"));
    }
}
