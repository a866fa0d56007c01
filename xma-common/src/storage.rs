//! Key/value storage abstraction
//!
//! Attribution state lives in two scopes: a durable store that survives across
//! sessions for one browser profile, and an ephemeral store scoped to a single
//! tab/session. Both are plain string key/value maps. Each operation is atomic
//! per key; nothing is transactional across keys.
//!
//! Concurrent writers to one key are arbitrated by the store itself:
//! [`KeyValueStore::set_if_absent`] lets exactly one writer create a key, and
//! [`KeyValueStore::set_if_newer`] drops a write whose version is older than
//! the stored one, so a slow request cannot undo a later one.

use async_trait::async_trait;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::Result;

/// String key/value storage
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a value, `None` if the key has never been written
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write (or overwrite) a value
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Write only if the key does not exist; `true` if this call wrote it
    async fn set_if_absent(&self, key: &str, value: &str) -> Result<bool>;

    /// Write unless the stored value carries a newer version
    ///
    /// Versions compare as strings, so callers use a sortable encoding
    /// (fixed-width RFC 3339 UTC timestamps). A value written with plain
    /// [`set`](Self::set) has no version and is always replaced. Returns
    /// `true` if this call wrote the value.
    async fn set_if_newer(&self, key: &str, value: &str, version: &str) -> Result<bool>;

    /// Delete a value; deleting a missing key is not an error
    async fn remove(&self, key: &str) -> Result<()>;
}

#[async_trait]
impl<S: KeyValueStore + ?Sized> KeyValueStore for Arc<S> {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        (**self).set(key, value).await
    }

    async fn set_if_absent(&self, key: &str, value: &str) -> Result<bool> {
        (**self).set_if_absent(key, value).await
    }

    async fn set_if_newer(&self, key: &str, value: &str, version: &str) -> Result<bool> {
        (**self).set_if_newer(key, value, version).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        (**self).remove(key).await
    }
}

#[derive(Debug, Clone)]
struct StoredValue {
    value: String,
    version: Option<String>,
}

/// In-memory store
///
/// Used for per-tab ephemeral state on the server and as the durable store in
/// tests. Clones share the same underlying map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<RwLock<HashMap<String, StoredValue>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently held
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .entries
            .read()
            .await
            .get(key)
            .map(|stored| stored.value.clone()))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries.write().await.insert(
            key.to_string(),
            StoredValue {
                value: value.to_string(),
                version: None,
            },
        );
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str) -> Result<bool> {
        match self.entries.write().await.entry(key.to_string()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(StoredValue {
                    value: value.to_string(),
                    version: None,
                });
                Ok(true)
            }
        }
    }

    async fn set_if_newer(&self, key: &str, value: &str, version: &str) -> Result<bool> {
        let mut entries = self.entries.write().await;
        let stale = entries
            .get(key)
            .and_then(|stored| stored.version.as_deref())
            .map(|stored| stored > version)
            .unwrap_or(false);
        if stale {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            StoredValue {
                value: value.to_string(),
                version: Some(version.to_string()),
            },
        );
        Ok(true)
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}
