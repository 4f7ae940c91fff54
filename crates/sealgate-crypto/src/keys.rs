//! Key custody: named AES-256-GCM keys whose material never leaves the crate.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use aes_gcm::{aead::KeyInit, Aes256Gcm};
use rand::RngCore;
use sealgate_core::{GateError, GateResult};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, Zeroizing};

use crate::KEY_SIZE;

/// Attributes a named key is generated with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySpec {
    pub key_bits: u32,
    pub tag_bits: u32,
    /// Every use must pass through the authentication gate.
    pub user_authentication_required: bool,
}

impl Default for KeySpec {
    fn default() -> Self {
        Self {
            key_bits: 256,
            tag_bits: 128,
            user_authentication_required: true,
        }
    }
}

impl KeySpec {
    pub fn transformation(&self) -> &'static str {
        "AES/GCM/NoPadding"
    }
}

struct KeyMaterial {
    bytes: [u8; KEY_SIZE],
}

impl Drop for KeyMaterial {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

/// Opaque handle to a named key. Clones share the same material.
#[derive(Clone)]
pub struct KeyHandle {
    name: String,
    spec: KeySpec,
    material: Arc<KeyMaterial>,
}

impl KeyHandle {
    /// Wrap key material loaded by a store. The caller's buffer is zeroized
    /// when `bytes` drops.
    pub fn from_material(
        name: impl Into<String>,
        spec: KeySpec,
        bytes: Zeroizing<[u8; KEY_SIZE]>,
    ) -> Self {
        Self {
            name: name.into(),
            spec,
            material: Arc::new(KeyMaterial { bytes: *bytes }),
        }
    }

    /// Generate fresh random key material.
    pub fn generate(name: impl Into<String>, spec: KeySpec) -> Self {
        let mut bytes = Zeroizing::new([0u8; KEY_SIZE]);
        rand::thread_rng().fill_bytes(&mut bytes[..]);
        Self::from_material(name, spec, bytes)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn spec(&self) -> &KeySpec {
        &self.spec
    }

    /// Whether two handles refer to the same key material.
    pub fn same_key(&self, other: &KeyHandle) -> bool {
        Arc::ptr_eq(&self.material, &other.material)
            || self
                .material
                .bytes
                .iter()
                .zip(other.material.bytes.iter())
                .fold(0u8, |acc, (a, b)| acc | (a ^ b))
                == 0
    }

    pub(crate) fn aead(&self) -> Aes256Gcm {
        Aes256Gcm::new((&self.material.bytes).into())
    }
}

impl std::fmt::Debug for KeyHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyHandle")
            .field("name", &self.name)
            .field("spec", &self.spec)
            .field("material", &"[REDACTED]")
            .finish()
    }
}

/// OS-protected storage for named keys.
///
/// Implementations must be idempotent by name: `generate` for a name that
/// already exists returns the existing key.
pub trait ProtectedKeyStore: Send + Sync {
    fn load(&self, name: &str) -> anyhow::Result<Option<KeyHandle>>;

    fn generate(&self, name: &str, spec: &KeySpec) -> anyhow::Result<KeyHandle>;

    /// Delete the key. Returns false if it did not exist.
    fn revoke(&self, name: &str) -> anyhow::Result<bool>;
}

/// Fetch-or-create front end over a [`ProtectedKeyStore`].
pub struct KeyCustodian {
    store: Arc<dyn ProtectedKeyStore>,
    spec: KeySpec,
}

impl KeyCustodian {
    pub fn new(store: Arc<dyn ProtectedKeyStore>) -> Self {
        Self {
            store,
            spec: KeySpec::default(),
        }
    }

    pub fn get_or_create_key(&self, name: &str) -> GateResult<KeyHandle> {
        if name.is_empty() {
            return Err(GateError::KeyStore("key name must not be empty".into()));
        }

        if let Some(handle) = self.store.load(name).map_err(keystore_error)? {
            tracing::debug!(key = name, "using existing key");
            return Ok(handle);
        }

        let handle = self.store.generate(name, &self.spec).map_err(keystore_error)?;
        tracing::info!(key = name, transformation = self.spec.transformation(), "generated key");
        Ok(handle)
    }

    pub fn revoke(&self, name: &str) -> GateResult<bool> {
        let revoked = self.store.revoke(name).map_err(keystore_error)?;
        if revoked {
            tracing::info!(key = name, "revoked key");
        }
        Ok(revoked)
    }
}

fn keystore_error(e: anyhow::Error) -> GateError {
    GateError::KeyStore(format!("{e:#}"))
}

/// Process-local key store. Keys vanish with the process.
#[derive(Default)]
pub struct MemoryKeyStore {
    keys: Mutex<HashMap<String, KeyHandle>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.keys.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ProtectedKeyStore for MemoryKeyStore {
    fn load(&self, name: &str) -> anyhow::Result<Option<KeyHandle>> {
        let keys = self.keys.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(keys.get(name).cloned())
    }

    fn generate(&self, name: &str, spec: &KeySpec) -> anyhow::Result<KeyHandle> {
        let mut keys = self.keys.lock().unwrap_or_else(PoisonError::into_inner);
        let handle = keys
            .entry(name.to_string())
            .or_insert_with(|| KeyHandle::generate(name, spec.clone()));
        Ok(handle.clone())
    }

    fn revoke(&self, name: &str) -> anyhow::Result<bool> {
        let mut keys = self.keys.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(keys.remove(name).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn custodian() -> (Arc<MemoryKeyStore>, KeyCustodian) {
        let store = Arc::new(MemoryKeyStore::new());
        let custodian = KeyCustodian::new(store.clone());
        (store, custodian)
    }

    #[test]
    fn test_get_or_create_is_idempotent() {
        let (store, custodian) = custodian();
        let a = custodian.get_or_create_key("k1").unwrap();
        let b = custodian.get_or_create_key("k1").unwrap();

        assert!(a.same_key(&b));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_distinct_names_get_distinct_keys() {
        let (_, custodian) = custodian();
        let a = custodian.get_or_create_key("k1").unwrap();
        let b = custodian.get_or_create_key("k2").unwrap();
        assert!(!a.same_key(&b), "random keys must differ");
    }

    #[test]
    fn test_default_spec_requires_auth() {
        let (_, custodian) = custodian();
        let key = custodian.get_or_create_key("k1").unwrap();
        assert_eq!(key.spec().key_bits, 256);
        assert_eq!(key.spec().tag_bits, 128);
        assert!(key.spec().user_authentication_required);
    }

    #[test]
    fn test_empty_name_rejected() {
        let (_, custodian) = custodian();
        assert!(matches!(
            custodian.get_or_create_key(""),
            Err(GateError::KeyStore(_))
        ));
    }

    #[test]
    fn test_revoke_then_recreate() {
        let (_, custodian) = custodian();
        let old = custodian.get_or_create_key("k1").unwrap();
        assert!(custodian.revoke("k1").unwrap());
        assert!(!custodian.revoke("k1").unwrap());

        let new = custodian.get_or_create_key("k1").unwrap();
        assert!(!old.same_key(&new));
    }

    #[test]
    fn test_debug_redacts_material() {
        let key = KeyHandle::from_material("k", KeySpec::default(), Zeroizing::new([0xAB; KEY_SIZE]));
        let dbg = format!("{key:?}");
        assert!(dbg.contains("[REDACTED]"));
        assert!(!dbg.contains("171"));
    }

    struct FailingStore;

    impl ProtectedKeyStore for FailingStore {
        fn load(&self, _name: &str) -> anyhow::Result<Option<KeyHandle>> {
            anyhow::bail!("keystore locked")
        }
        fn generate(&self, _name: &str, _spec: &KeySpec) -> anyhow::Result<KeyHandle> {
            anyhow::bail!("unreachable")
        }
        fn revoke(&self, _name: &str) -> anyhow::Result<bool> {
            Ok(false)
        }
    }

    #[test]
    fn test_store_errors_become_keystore_errors() {
        let custodian = KeyCustodian::new(Arc::new(FailingStore));
        match custodian.get_or_create_key("k1") {
            Err(GateError::KeyStore(msg)) => assert!(msg.contains("keystore locked")),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
