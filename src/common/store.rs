//! Persistent and in-memory progress storage for ringmend
//!
//! The tracker writes every mutation through this interface before
//! returning, so a restarted process resumes from the last fully-completed
//! state. Values are scoped by a bucket name ("repairs" in practice) and a
//! hierarchical key.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use crate::common::error::Result;

/// Trait for progress storage backends
pub trait ProgressStore: Send + Sync {
    fn read_value(&self, scope: &str, key: &str) -> Result<Option<Vec<u8>>>;
    fn write_value(&self, scope: &str, key: &str, value: &[u8]) -> Result<()>;
    fn delete_value(&self, scope: &str, key: &str) -> Result<()>;

    /// Read a value, writing and returning `default` if absent.
    /// The bool is true iff the value already existed.
    fn read_or_create(&self, scope: &str, key: &str, default: &[u8]) -> Result<(Vec<u8>, bool)> {
        match self.read_value(scope, key)? {
            Some(v) => Ok((v, true)),
            None => {
                self.write_value(scope, key, default)?;
                Ok((default.to_vec(), false))
            }
        }
    }
}

/// In-memory store, the reference backend for tests
pub struct MemStore {
    scopes: Mutex<HashMap<String, HashMap<String, Vec<u8>>>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self {
            scopes: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressStore for MemStore {
    fn read_value(&self, scope: &str, key: &str) -> Result<Option<Vec<u8>>> {
        let scopes = self.scopes.lock().unwrap();
        Ok(scopes.get(scope).and_then(|m| m.get(key)).cloned())
    }

    fn write_value(&self, scope: &str, key: &str, value: &[u8]) -> Result<()> {
        let mut scopes = self.scopes.lock().unwrap();
        scopes
            .entry(scope.to_string())
            .or_default()
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete_value(&self, scope: &str, key: &str) -> Result<()> {
        let mut scopes = self.scopes.lock().unwrap();
        if let Some(m) = scopes.get_mut(scope) {
            m.remove(key);
        }
        Ok(())
    }
}

/// Sled-backed store, the production backend
///
/// Each scope maps to one sled tree; sled serializes concurrent writes to
/// the same key, which is the serialization point the tracker relies on.
pub struct SledStore {
    db: sled::Db,
}

impl SledStore {
    /// Open or create the database. Failure here is fatal at startup.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }
}

impl ProgressStore for SledStore {
    fn read_value(&self, scope: &str, key: &str) -> Result<Option<Vec<u8>>> {
        let tree = self.db.open_tree(scope)?;
        Ok(tree.get(key)?.map(|ivec| ivec.to_vec()))
    }

    fn write_value(&self, scope: &str, key: &str, value: &[u8]) -> Result<()> {
        let tree = self.db.open_tree(scope)?;
        tree.insert(key, value)?;
        tree.flush()?;
        Ok(())
    }

    fn delete_value(&self, scope: &str, key: &str) -> Result<()> {
        let tree = self.db.open_tree(scope)?;
        tree.remove(key)?;
        tree.flush()?;
        Ok(())
    }
}
