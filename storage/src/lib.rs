//! Replica-side storage: where a node keeps the rows it is a replica for.
pub mod errors;
pub mod mutation;

use errors::StorageError;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Where a replica applies the writes it receives.
pub trait StorageEngine: Send + Sync {
    /// Stores `value` under `key` in `table`, replacing any previous value.
    fn insert(&self, table: &str, key: &str, value: &str) -> Result<(), StorageError>;

    /// Current value of `key` in `table`, if any.
    fn get(&self, table: &str, key: &str) -> Option<String>;
}

/// Keeps every table in memory. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryStorageEngine {
    tables: RwLock<HashMap<String, HashMap<String, String>>>,
}

impl MemoryStorageEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows stored in `table`.
    pub fn row_count(&self, table: &str) -> usize {
        self.tables.read().get(table).map_or(0, HashMap::len)
    }
}

impl StorageEngine for MemoryStorageEngine {
    fn insert(&self, table: &str, key: &str, value: &str) -> Result<(), StorageError> {
        if table.is_empty() {
            return Err(StorageError::EmptyTable);
        }
        if key.is_empty() {
            return Err(StorageError::EmptyKey);
        }

        self.tables
            .write()
            .entry(table.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get(&self, table: &str, key: &str) -> Option<String> {
        self.tables
            .read()
            .get(table)
            .and_then(|rows| rows.get(key))
            .cloned()
    }
}
