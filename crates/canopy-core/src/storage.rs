//! Key/value storage the way browsers expose it.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{PoisonError, RwLock};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::StorageError;

/// String keyed storage of JSON documents.
pub trait BrowserStorage: Send + Sync {
    /// Stores an already encoded JSON document.
    fn set_json(&self, key: &str, json: String) -> Result<(), StorageError>;

    fn get_json(&self, key: &str) -> Option<String>;

    fn del(&self, key: &str);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the key at `index`.
    fn key(&self, index: usize) -> Result<String, StorageError>;

    fn clear(&self);
}

/// Typed access on top of [`BrowserStorage`].
pub trait BrowserStorageExt: BrowserStorage {
    fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let json = serde_json::to_string(value)?;
        self.set_json(key, json)
    }

    /// Reads and decodes the value under `key`. A missing key is `Ok(None)`.
    fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        match self.get_json(key) {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }
}

impl<S: BrowserStorage + ?Sized> BrowserStorageExt for S {}

/// [`BrowserStorage`] kept in memory, ordered by key.
#[derive(Default)]
pub struct MemoryStorage {
    items: RwLock<BTreeMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BrowserStorage for MemoryStorage {
    fn set_json(&self, key: &str, json: String) -> Result<(), StorageError> {
        self.items
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_owned(), json);
        Ok(())
    }

    fn get_json(&self, key: &str) -> Option<String> {
        self.items
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn del(&self, key: &str) {
        self.items
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }

    fn len(&self) -> usize {
        self.items.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn key(&self, index: usize) -> Result<String, StorageError> {
        let items = self.items.read().unwrap_or_else(PoisonError::into_inner);
        items
            .keys()
            .nth(index)
            .cloned()
            .ok_or(StorageError::IndexOutOfRange {
                index,
                len: items.len(),
            })
    }

    fn clear(&self) {
        self.items
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl fmt::Debug for MemoryStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStorage")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
#[path = "tests/storage_tests.rs"]
mod tests;
