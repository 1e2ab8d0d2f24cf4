//! Persisted-config hook.
//!
//! The settings file belongs to the host application. The core reads the
//! cached auth token from it and appends manually issued commands to its
//! history; it never parses or owns the file format.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::foundation::StoreResult;

/// The slice of persisted settings the core reads and writes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedConfig {
    /// Cached auth token.
    #[serde(default)]
    pub auth_token: Option<String>,
    /// Manually issued commands, oldest first.
    #[serde(default)]
    pub command_history: Vec<String>,
}

impl PersistedConfig {
    /// Appends `command` to the history, moving an existing entry to the end
    /// and keeping at most `limit` entries.
    pub fn record_command(&mut self, command: &str, limit: usize) {
        self.command_history.retain(|c| c != command);
        self.command_history.push(command.to_string());
        if self.command_history.len() > limit {
            let excess = self.command_history.len() - limit;
            self.command_history.drain(..excess);
        }
    }
}

/// Load/save hook for persisted settings.
pub trait ConfigStore: Send + Sync {
    /// Returns the current settings.
    fn current(&self) -> PersistedConfig;

    /// Persists `config`.
    fn save(&self, config: &PersistedConfig) -> StoreResult<()>;
}

/// In-memory store, used when the host does not persist settings.
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    config: RwLock<PersistedConfig>,
}

impl MemoryConfigStore {
    pub fn new(config: PersistedConfig) -> Self {
        Self {
            config: RwLock::new(config),
        }
    }
}

impl ConfigStore for MemoryConfigStore {
    fn current(&self) -> PersistedConfig {
        self.config.read().clone()
    }

    fn save(&self, config: &PersistedConfig) -> StoreResult<()> {
        *self.config.write() = config.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_command_dedupes_and_caps() {
        let mut config = PersistedConfig::default();
        config.record_command("!a", 3);
        config.record_command("!b", 3);
        config.record_command("!a", 3);
        assert_eq!(config.command_history, vec!["!b", "!a"]);

        config.record_command("!c", 3);
        config.record_command("!d", 3);
        assert_eq!(config.command_history, vec!["!a", "!c", "!d"]);
    }

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryConfigStore::default();
        assert_eq!(store.current(), PersistedConfig::default());

        let mut config = store.current();
        config.auth_token = Some("t".into());
        store.save(&config).unwrap();
        assert_eq!(store.current().auth_token.as_deref(), Some("t"));
    }

    #[test]
    fn test_deserialize_partial() {
        let config: PersistedConfig = serde_json::from_str(r#"{"auth_token":"x"}"#).unwrap();
        assert!(config.command_history.is_empty());
    }
}
