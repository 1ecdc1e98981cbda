use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result, bail};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::db::Database;

/// Durable medium the persisted store writes through to.
pub trait StorageBackend {
    fn read(&self, key: &str) -> Result<Option<String>>;
    fn write(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<bool>;
}

impl StorageBackend for Database {
    fn read(&self, key: &str) -> Result<Option<String>> {
        self.get_value(key)
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        self.put_value(key, value)
    }

    fn remove(&self, key: &str) -> Result<bool> {
        self.delete_value(key)
    }
}

/// Process-local medium. Can be told to reject writes, which is how quota
/// exhaustion and read-only media are exercised.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    values: Mutex<HashMap<String, String>>,
    reject_writes: AtomicBool,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }

    /// Write directly to the medium, bypassing any store on top of it.
    pub fn insert_raw(&self, key: &str, value: &str) {
        self.values
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
    }
}

impl StorageBackend for MemoryBackend {
    fn read(&self, key: &str) -> Result<Option<String>> {
        let values = self
            .values
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(values.get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        if self.reject_writes.load(Ordering::SeqCst) {
            bail!("storage quota exceeded");
        }
        self.insert_raw(key, value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool> {
        if self.reject_writes.load(Ordering::SeqCst) {
            bail!("storage is read-only");
        }
        let mut values = self
            .values
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(values.remove(key).is_some())
    }
}

/// Typed JSON values over a [`StorageBackend`].
///
/// Values written during this session are kept in memory and always win over
/// the medium. Writes go through to the medium on a best-effort basis: the
/// first failed write puts the store in degraded mode, after which it stops
/// touching the medium until [`PersistedStore::refresh`] or a restart.
pub struct PersistedStore<B> {
    backend: B,
    // `None` marks a key removed during this session.
    cache: HashMap<String, Option<String>>,
    degraded: bool,
}

impl<B: StorageBackend> PersistedStore<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            cache: HashMap::new(),
            degraded: false,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// True once a write to the medium has failed this session.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// Read `key` as `T`, falling back to `default` when the key is absent or
    /// its payload does not parse as `T`.
    pub fn get<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        let Some(raw) = self.raw(key) else {
            return default;
        };
        match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "stored value does not match expected shape, using default");
                default
            }
        }
    }

    /// Store `value` under `key`. Only fails when `value` cannot be
    /// serialized; problems with the medium are logged and absorbed.
    pub fn set<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value)
            .with_context(|| format!("Failed to serialize value for '{key}'"))?;
        self.cache.insert(key.to_string(), Some(raw.clone()));

        if self.degraded {
            debug!(key, "store degraded, keeping value in memory only");
            return Ok(());
        }
        if let Err(e) = self.backend.write(key, &raw) {
            warn!(key, error = %format!("{e:#}"), "failed to persist value, continuing in memory only");
            self.degraded = true;
        }
        Ok(())
    }

    /// Whether `key` has been explicitly written, as opposed to merely
    /// resolving to a default on read.
    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        self.raw(key).is_some()
    }

    /// Forget `key`. Returns whether it was present.
    pub fn remove(&mut self, key: &str) -> bool {
        let existed = self.has(key);
        self.cache.insert(key.to_string(), None);
        if !self.degraded {
            if let Err(e) = self.backend.remove(key) {
                warn!(key, error = %format!("{e:#}"), "failed to remove value, continuing in memory only");
                self.degraded = true;
            }
        }
        existed
    }

    /// Drop in-memory state and re-read everything from the medium, picking
    /// up changes written by other processes. Clears degraded mode.
    ///
    /// Values that only ever lived in memory are lost.
    pub fn refresh(&mut self) {
        if self.degraded {
            warn!(
                unsaved = self.cache.len(),
                "refreshing a degraded store discards values that were never persisted"
            );
        }
        self.cache.clear();
        self.degraded = false;
    }

    fn raw(&self, key: &str) -> Option<String> {
        if let Some(cached) = self.cache.get(key) {
            return cached.clone();
        }
        match self.backend.read(key) {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %format!("{e:#}"), "failed to read stored value, treating as absent");
                None
            }
        }
    }
}
