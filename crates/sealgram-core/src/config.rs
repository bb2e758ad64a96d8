//! Core configuration.

use serde::{Deserialize, Serialize};

/// Tunables for the messaging core. Deserialized from whatever outer config
/// mechanism the embedding service uses.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct CoreConfig {
    /// Largest accepted plaintext, in bytes
    pub max_plaintext_bytes: usize,
    /// How many times a group mutation retries after an optimistic-
    /// concurrency conflict before giving up
    pub mutation_retry_limit: u32,
    /// Whether sends append a metadata block to the ledger
    pub ledger_enabled: bool,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self { max_plaintext_bytes: 64 * 1024, mutation_retry_limit: 3, ledger_enabled: true }
    }
}

#[cfg(test)]
mod tests {
    use super::CoreConfig;

    #[test]
    fn default_allows_reasonable_messages() {
        let config = CoreConfig::default();
        assert!(config.max_plaintext_bytes >= 4096);
        assert!(config.mutation_retry_limit >= 1);
        assert!(config.ledger_enabled);
    }

    #[test]
    fn unknown_fields_rejected() {
        let json = r#"{
            "max_plaintext_bytes": 1024,
            "mutation_retry_limit": 2,
            "ledger_enabled": false,
            "surprise": true
        }"#;
        assert!(serde_json::from_str::<CoreConfig>(json).is_err());
    }
}
