//! Ciphertext envelope persistence keyed by slot name.
//!
//! Two backends are available:
//!   - **JSON** (default): one file holding every slot, rewritten atomically
//!     via temp+rename on each change.
//!   - **Memory**: process-local, for tests and ephemeral hosts.
//!
//! Both implement [`EnvelopeStore`]. Bytes are stored as base64 and come back
//! exactly as written.

use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result};
use sealgate_core::Envelope;
use tempfile::NamedTempFile;

/// Slot-keyed envelope storage. `put` overwrites any previous envelope in
/// the same slot.
pub trait EnvelopeStore: Send + Sync {
    fn put(&self, slot: &str, envelope: &Envelope) -> Result<()>;

    fn get(&self, slot: &str) -> Result<Option<Envelope>>;

    /// Delete a slot. Returns whether it existed.
    fn remove(&self, slot: &str) -> Result<bool>;

    /// All slot names, sorted.
    fn slots(&self) -> Result<Vec<String>>;
}

/// File-backed store. The file is re-read on every call so changes made by
/// other processes (including deleting the file) are observed.
///
/// Writes never leave a partial file, but updates are read-modify-write:
/// two processes writing at the same moment can lose one update (last
/// rename wins). Within a process, calls are serialized.
pub struct JsonEnvelopeStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonEnvelopeStore {
    pub fn open(path: &Path) -> Result<Self> {
        let store = Self {
            path: path.to_path_buf(),
            lock: Mutex::new(()),
        };
        // Surface a corrupt file now rather than on first use
        store.read()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<BTreeMap<String, Envelope>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("reading envelope store: {}", self.path.display()))?;
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&content)
            .with_context(|| format!("parsing envelope store: {}", self.path.display()))
    }

    fn write(&self, entries: &BTreeMap<String, Envelope>) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating store dir: {}", dir.display()))?;

        let json = serde_json::to_string_pretty(entries).context("serializing envelope store")?;

        // Atomic write: uniquely named temp file in the same dir, then rename
        let mut tmp = NamedTempFile::new_in(dir)
            .with_context(|| format!("creating envelope store temp in: {}", dir.display()))?;
        tmp.write_all(json.as_bytes())
            .with_context(|| format!("writing envelope store temp: {}", tmp.path().display()))?;
        tmp.persist(&self.path)
            .with_context(|| format!("renaming envelope store: {}", self.path.display()))?;
        Ok(())
    }
}

impl EnvelopeStore for JsonEnvelopeStore {
    fn put(&self, slot: &str, envelope: &Envelope) -> Result<()> {
        let _guard = lock(&self.lock);
        let mut entries = self.read()?;
        let replaced = entries.insert(slot.to_string(), envelope.clone()).is_some();
        self.write(&entries)?;
        tracing::debug!(slot, replaced, "stored envelope");
        Ok(())
    }

    fn get(&self, slot: &str) -> Result<Option<Envelope>> {
        let _guard = lock(&self.lock);
        Ok(self.read()?.remove(slot))
    }

    fn remove(&self, slot: &str) -> Result<bool> {
        let _guard = lock(&self.lock);
        let mut entries = self.read()?;
        if entries.remove(slot).is_none() {
            return Ok(false);
        }
        self.write(&entries)?;
        tracing::debug!(slot, "removed envelope");
        Ok(true)
    }

    fn slots(&self) -> Result<Vec<String>> {
        let _guard = lock(&self.lock);
        Ok(self.read()?.into_keys().collect())
    }
}

#[derive(Default)]
pub struct MemoryEnvelopeStore {
    entries: Mutex<HashMap<String, Envelope>>,
}

impl MemoryEnvelopeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EnvelopeStore for MemoryEnvelopeStore {
    fn put(&self, slot: &str, envelope: &Envelope) -> Result<()> {
        lock(&self.entries).insert(slot.to_string(), envelope.clone());
        Ok(())
    }

    fn get(&self, slot: &str) -> Result<Option<Envelope>> {
        Ok(lock(&self.entries).get(slot).cloned())
    }

    fn remove(&self, slot: &str) -> Result<bool> {
        Ok(lock(&self.entries).remove(slot).is_some())
    }

    fn slots(&self) -> Result<Vec<String>> {
        let mut slots: Vec<String> = lock(&self.entries).keys().cloned().collect();
        slots.sort();
        Ok(slots)
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
