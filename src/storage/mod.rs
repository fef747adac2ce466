//! Durable key/value storage for session data.
//!
//! A single flat namespace of string keys to string values. The portal
//! keeps only a handful of entries here (encrypted tokens, the cached
//! user profile), so the file backend rewrites the whole map on every
//! change.
//!
//! Author: kelexine (<https://github.com/kelexine>)

mod file;

pub use file::FileStore;

use crate::error::Result;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Minimal storage surface the token store needs.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    /// Removing an absent key is not an error.
    fn remove(&self, key: &str) -> Result<()>;
}

/// Process-local store, lost on exit. Used by tests and short-lived tools.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values
            .write()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.values.write().remove(key);
        Ok(())
    }
}
