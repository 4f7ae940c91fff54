//! Keychain-backed [`ProtectedKeyStore`].
//!
//! Each named key is one keychain entry under the configured service. The
//! entry holds a small JSON record with the key spec and base64 material.

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::RngCore;
use sealgate_crypto::{KeyHandle, KeySpec, ProtectedKeyStore, KEY_SIZE};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, Zeroizing};

const PROBE_ENTRY: &str = "__sealgate_probe__";
const PROBE_VALUE: &str = "probe";

#[derive(Serialize, Deserialize)]
struct KeyRecord {
    spec: KeySpec,
    key: String,
}

impl Drop for KeyRecord {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

pub struct KeyringKeyStore {
    service: String,
}

impl KeyringKeyStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    fn entry(&self, name: &str) -> Result<keyring::Entry> {
        keyring::Entry::new(&self.service, name)
            .map_err(|e| anyhow::anyhow!("keychain entry creation for '{name}': {e}"))
    }
}

impl ProtectedKeyStore for KeyringKeyStore {
    fn load(&self, name: &str) -> Result<Option<KeyHandle>> {
        match self.entry(name)?.get_password() {
            Ok(password) => {
                let secret = SecretString::from(password);
                decode_record(name, &secret).map(Some)
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(anyhow::anyhow!("keychain get for '{name}': {e}")),
        }
    }

    fn generate(&self, name: &str, spec: &KeySpec) -> Result<KeyHandle> {
        if let Some(existing) = self.load(name)? {
            return Ok(existing);
        }

        let mut bytes = Zeroizing::new([0u8; KEY_SIZE]);
        rand::thread_rng().fill_bytes(&mut bytes[..]);

        let record = encode_record(spec, &bytes)?;
        self.entry(name)?
            .set_password(record.expose_secret())
            .map_err(|e| anyhow::anyhow!("keychain store for '{name}': {e}"))?;
        tracing::debug!(key = name, service = %self.service, "stored key in platform keychain");

        Ok(KeyHandle::from_material(name, spec.clone(), bytes))
    }

    fn revoke(&self, name: &str) -> Result<bool> {
        match self.entry(name)?.delete_credential() {
            Ok(()) => {
                tracing::debug!(key = name, service = %self.service, "deleted key from platform keychain");
                Ok(true)
            }
            Err(keyring::Error::NoEntry) => Ok(false),
            Err(e) => Err(anyhow::anyhow!("keychain delete for '{name}': {e}")),
        }
    }
}

/// Check that the platform keychain actually persists entries for
/// `service` by writing, reading back, and deleting a probe entry.
pub fn is_available(service: &str) -> bool {
    let Ok(entry) = keyring::Entry::new(service, PROBE_ENTRY) else {
        return false;
    };
    if let Err(e) = entry.set_password(PROBE_VALUE) {
        tracing::debug!(service, error = %e, "keychain probe write failed");
        return false;
    }

    // A fresh entry must see the value, or nothing is really stored
    let readable = keyring::Entry::new(service, PROBE_ENTRY)
        .and_then(|fresh| fresh.get_password())
        .is_ok_and(|value| value == PROBE_VALUE);
    let _ = entry.delete_credential();

    if !readable {
        tracing::debug!(service, "keychain probe value not readable from a fresh entry");
    }
    readable
}

fn encode_record(spec: &KeySpec, bytes: &[u8; KEY_SIZE]) -> Result<SecretString> {
    let record = KeyRecord {
        spec: spec.clone(),
        key: BASE64.encode(bytes),
    };
    let json = serde_json::to_string(&record).context("serializing key record")?;
    Ok(SecretString::from(json))
}

fn decode_record(name: &str, secret: &SecretString) -> Result<KeyHandle> {
    let record: KeyRecord = serde_json::from_str(secret.expose_secret())
        .with_context(|| format!("parsing keychain record for '{name}'"))?;

    let decoded = Zeroizing::new(
        BASE64
            .decode(&record.key)
            .with_context(|| format!("decoding key material for '{name}'"))?,
    );
    if decoded.len() != KEY_SIZE {
        anyhow::bail!(
            "key material for '{name}' is {} bytes, expected {KEY_SIZE}",
            decoded.len()
        );
    }

    let mut bytes = Zeroizing::new([0u8; KEY_SIZE]);
    bytes.copy_from_slice(&decoded);
    Ok(KeyHandle::from_material(name, record.spec.clone(), bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyring::credential::{Credential, CredentialApi, CredentialBuilderApi};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex, Once};

    type Shared = Arc<Mutex<HashMap<(String, String), Vec<u8>>>>;

    /// Process-wide credential store where every entry for the same
    /// service and user sees the same value, like a real keychain.
    struct SharedBuilder(Shared);

    struct SharedCredential {
        id: (String, String),
        store: Shared,
    }

    impl CredentialApi for SharedCredential {
        fn set_secret(&self, secret: &[u8]) -> keyring::Result<()> {
            self.store.lock().unwrap().insert(self.id.clone(), secret.to_vec());
            Ok(())
        }

        fn get_secret(&self) -> keyring::Result<Vec<u8>> {
            self.store
                .lock()
                .unwrap()
                .get(&self.id)
                .cloned()
                .ok_or(keyring::Error::NoEntry)
        }

        fn delete_credential(&self) -> keyring::Result<()> {
            self.store
                .lock()
                .unwrap()
                .remove(&self.id)
                .map(|_| ())
                .ok_or(keyring::Error::NoEntry)
        }

        fn as_any(&self) -> &dyn std::any::Any {
            self
        }

        fn debug_fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "SharedCredential({}/{})", self.id.0, self.id.1)
        }
    }

    impl CredentialBuilderApi for SharedBuilder {
        fn build(
            &self,
            _target: Option<&str>,
            service: &str,
            user: &str,
        ) -> keyring::Result<Box<Credential>> {
            Ok(Box::new(SharedCredential {
                id: (service.to_string(), user.to_string()),
                store: self.0.clone(),
            }))
        }

        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
    }

    fn use_shared_keychain() {
        static INIT: Once = Once::new();
        INIT.call_once(|| {
            keyring::set_default_credential_builder(Box::new(SharedBuilder(Shared::default())));
        });
    }

    #[test]
    fn test_generate_then_load_returns_same_key() {
        use_shared_keychain();
        let store = KeyringKeyStore::new("sealgate-test-load");

        let generated = store.generate("k1", &KeySpec::default()).unwrap();
        let loaded = store.load("k1").unwrap().expect("generated key is loadable");
        assert!(loaded.same_key(&generated));
        assert_eq!(loaded.spec(), &KeySpec::default());

        let again = store.generate("k1", &KeySpec::default()).unwrap();
        assert!(again.same_key(&generated), "generate must be idempotent by name");
    }

    #[test]
    fn test_store_survives_new_instance() {
        use_shared_keychain();
        let generated = KeyringKeyStore::new("sealgate-test-reopen")
            .generate("k1", &KeySpec::default())
            .unwrap();

        let reopened = KeyringKeyStore::new("sealgate-test-reopen");
        assert!(reopened.load("k1").unwrap().unwrap().same_key(&generated));
    }

    #[test]
    fn test_revoke_removes_key() {
        use_shared_keychain();
        let store = KeyringKeyStore::new("sealgate-test-revoke");
        let first = store.generate("k1", &KeySpec::default()).unwrap();

        assert!(store.revoke("k1").unwrap());
        assert!(!store.revoke("k1").unwrap());
        assert!(store.load("k1").unwrap().is_none());

        let second = store.generate("k1", &KeySpec::default()).unwrap();
        assert!(!second.same_key(&first));
    }

    #[test]
    fn test_load_missing_is_none() {
        use_shared_keychain();
        let store = KeyringKeyStore::new("sealgate-test-missing");
        assert!(store.load("never").unwrap().is_none());
    }

    #[test]
    fn test_is_available_with_persistent_store() {
        use_shared_keychain();
        assert!(is_available("sealgate-test-availability"));
        let leftover = keyring::Entry::new("sealgate-test-availability", PROBE_ENTRY).unwrap();
        assert!(matches!(leftover.get_password(), Err(keyring::Error::NoEntry)));
    }

    #[test]
    fn test_record_roundtrip_preserves_key() {
        let mut bytes = Zeroizing::new([0u8; KEY_SIZE]);
        rand::thread_rng().fill_bytes(&mut bytes[..]);
        let spec = KeySpec::default();

        let secret = encode_record(&spec, &bytes).unwrap();
        let loaded = decode_record("k1", &secret).unwrap();
        let original = KeyHandle::from_material("k1", spec.clone(), bytes);

        assert_eq!(loaded.name(), "k1");
        assert_eq!(loaded.spec(), &spec);
        assert!(loaded.same_key(&original));
    }

    #[test]
    fn test_record_does_not_leak_through_debug() {
        let bytes = Zeroizing::new([7u8; KEY_SIZE]);
        let secret = encode_record(&KeySpec::default(), &bytes).unwrap();
        let shown = format!("{secret:?}");
        assert!(!shown.contains(&BASE64.encode([7u8; KEY_SIZE])));
    }

    #[test]
    fn test_short_material_rejected() {
        let json = serde_json::json!({
            "spec": KeySpec::default(),
            "key": BASE64.encode([1u8; 16]),
        })
        .to_string();
        let err = decode_record("k1", &SecretString::from(json)).unwrap_err();
        assert!(format!("{err:#}").contains("expected 32"));
    }

    #[test]
    fn test_garbage_record_rejected() {
        let err = decode_record("k1", &SecretString::from("not json".to_string())).unwrap_err();
        assert!(format!("{err:#}").contains("k1"));
    }

    #[test]
    fn test_store_keeps_service() {
        let store = KeyringKeyStore::new("sealgate-test");
        assert_eq!(store.service(), "sealgate-test");
    }
}
