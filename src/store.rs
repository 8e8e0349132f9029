//! Durable client-side key/value storage.
//!
//! The controller never touches the filesystem directly; it goes through a
//! [`SessionStore`] so tests can substitute [`MemoryStore`].
//!
//! # Example
//!
//! ```rust
//! use kcd_client::store::{MemoryStore, SessionStore, StoreKey};
//!
//! let store = MemoryStore::new();
//! store.set(StoreKey::Theme, "netflix").unwrap();
//! assert_eq!(store.get(StoreKey::Theme).as_deref(), Some("netflix"));
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::error::{Error, Result};

/// Keys the client persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKey {
    AccessToken,
    User,
    Theme,
    ApiBaseOverride,
}

impl StoreKey {
    pub fn as_str(self) -> &'static str {
        match self {
            StoreKey::AccessToken => "access_token",
            StoreKey::User => "user",
            StoreKey::Theme => "theme",
            StoreKey::ApiBaseOverride => "api_base_override",
        }
    }
}

/// Key/value persistence with local-storage semantics.
pub trait SessionStore: Send + Sync + std::fmt::Debug {
    /// Read a raw value. Returns `None` when missing or unreadable.
    fn get(&self, key: StoreKey) -> Option<String>;

    /// Write a raw value.
    fn set(&self, key: StoreKey, value: &str) -> Result<()>;

    /// Remove a value. Removing a missing key is not an error.
    fn remove(&self, key: StoreKey) -> Result<()>;

    /// Number of stored entries.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<RwLock<HashMap<&'static str, String>>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemoryStore {
    fn get(&self, key: StoreKey) -> Option<String> {
        self.entries.read().ok()?.get(key.as_str()).cloned()
    }

    fn set(&self, key: StoreKey, value: &str) -> Result<()> {
        let mut guard = self
            .entries
            .write()
            .map_err(|e| Error::Store(e.to_string()))?;
        guard.insert(key.as_str(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: StoreKey) -> Result<()> {
        let mut guard = self
            .entries
            .write()
            .map_err(|e| Error::Store(e.to_string()))?;
        guard.remove(key.as_str());
        Ok(())
    }

    fn len(&self) -> usize {
        self.entries.read().map(|g| g.len()).unwrap_or(0)
    }
}

/// JSON-file backed store.
///
/// The whole map is rewritten on every change through a temp file and
/// rename. A corrupt or unreadable file opens as an empty store.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
    entries: Arc<RwLock<HashMap<String, String>>>,
}

impl FileStore {
    /// Open (or lazily create) the store at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Session store is corrupt, starting empty"
                );
                HashMap::new()
            }),
            Err(_) => HashMap::new(),
        };
        Self {
            path,
            entries: Arc::new(RwLock::new(entries)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, entries: &HashMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::Store(e.to_string()))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let body = serde_json::to_string_pretty(entries)?;
        fs::write(&tmp, body).map_err(|e| Error::Store(e.to_string()))?;
        fs::rename(&tmp, &self.path).map_err(|e| Error::Store(e.to_string()))
    }
}

impl SessionStore for FileStore {
    fn get(&self, key: StoreKey) -> Option<String> {
        self.entries.read().ok()?.get(key.as_str()).cloned()
    }

    fn set(&self, key: StoreKey, value: &str) -> Result<()> {
        let mut guard = self
            .entries
            .write()
            .map_err(|e| Error::Store(e.to_string()))?;
        guard.insert(key.as_str().to_string(), value.to_string());
        self.flush(&guard)
    }

    fn remove(&self, key: StoreKey) -> Result<()> {
        let mut guard = self
            .entries
            .write()
            .map_err(|e| Error::Store(e.to_string()))?;
        if guard.remove(key.as_str()).is_some() {
            self.flush(&guard)?;
        }
        Ok(())
    }

    fn len(&self) -> usize {
        self.entries.read().map(|g| g.len()).unwrap_or(0)
    }
}

/// Default location of the file store.
pub fn default_store_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("kcd")
        .join("session.json")
}

/// Read a stored value, treating empty strings and the literals
/// `"undefined"` / `"null"` as absent.
pub fn read_clean(store: &dyn SessionStore, key: StoreKey) -> Option<String> {
    store.get(key).filter(|v| {
        let v = v.trim();
        !v.is_empty() && v != "undefined" && v != "null"
    })
}
