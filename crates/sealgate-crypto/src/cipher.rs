//! AES-256-GCM cipher sessions bound to a named key.
//!
//! Sealed payload layout (what lands in `Envelope::ciphertext`):
//! ```text
//! [N bytes: ciphertext][16 bytes: GCM tag]
//! ```
//! The 12-byte IV travels separately in `Envelope::iv`.
//!
//! Sessions are inert until the authentication gate releases them; the
//! transform methods here are crate-private and consume the session.

use aes_gcm::{aead::Aead, Nonce};
use rand::RngCore;
use sealgate_core::{Envelope, GateError, GateResult};

use crate::keys::KeyHandle;
use crate::{IV_SIZE, KEY_SIZE, TAG_SIZE};

/// Encrypt-oriented session. The IV is drawn when the session is prepared.
pub struct SealSession {
    key: KeyHandle,
    iv: [u8; IV_SIZE],
}

/// Decrypt-oriented session parameterized with the IV from a prior seal.
pub struct OpenSession {
    key: KeyHandle,
    iv: [u8; IV_SIZE],
}

pub fn prepare_for_seal(key: &KeyHandle) -> GateResult<SealSession> {
    SealSession::prepare(key)
}

pub fn prepare_for_open(key: &KeyHandle, iv: &[u8]) -> GateResult<OpenSession> {
    OpenSession::prepare(key, iv)
}

impl SealSession {
    pub fn prepare(key: &KeyHandle) -> GateResult<Self> {
        check_spec(key)?;
        let mut iv = [0u8; IV_SIZE];
        rand::thread_rng().fill_bytes(&mut iv);
        Ok(Self {
            key: key.clone(),
            iv,
        })
    }

    pub fn key_name(&self) -> &str {
        self.key.name()
    }

    pub(crate) fn seal(self, plaintext: &str) -> GateResult<Envelope> {
        self.seal_bytes(plaintext.as_bytes())
    }

    pub(crate) fn seal_bytes(self, plaintext: &[u8]) -> GateResult<Envelope> {
        let ciphertext = self
            .key
            .aead()
            .encrypt(Nonce::from_slice(&self.iv), plaintext)
            .map_err(|e| GateError::CipherFault(format!("encryption failed: {e}")))?;

        Ok(Envelope {
            ciphertext,
            iv: self.iv.to_vec(),
        })
    }
}

impl OpenSession {
    pub fn prepare(key: &KeyHandle, iv: &[u8]) -> GateResult<Self> {
        check_spec(key)?;
        let iv: [u8; IV_SIZE] = iv.try_into().map_err(|_| {
            GateError::CipherFault(format!(
                "IV has wrong size: {} bytes (expected {IV_SIZE})",
                iv.len()
            ))
        })?;
        Ok(Self {
            key: key.clone(),
            iv,
        })
    }

    pub fn key_name(&self) -> &str {
        self.key.name()
    }

    pub fn iv(&self) -> &[u8; IV_SIZE] {
        &self.iv
    }

    pub(crate) fn open(self, ciphertext: &[u8]) -> GateResult<String> {
        if ciphertext.len() < TAG_SIZE {
            return Err(GateError::CipherFault(format!(
                "ciphertext too short: {} bytes (minimum {TAG_SIZE})",
                ciphertext.len()
            )));
        }

        let plaintext = self
            .key
            .aead()
            .decrypt(Nonce::from_slice(&self.iv), ciphertext)
            .map_err(|_| {
                GateError::CipherFault("decryption failed: wrong key or tampered ciphertext".into())
            })?;

        String::from_utf8(plaintext).map_err(|_| GateError::InvalidEncoding)
    }
}

fn check_spec(key: &KeyHandle) -> GateResult<()> {
    let spec = key.spec();
    if spec.key_bits as usize != KEY_SIZE * 8 || spec.tag_bits as usize != TAG_SIZE * 8 {
        return Err(GateError::CipherFault(format!(
            "unsupported key spec for '{}': {}-bit key, {}-bit tag",
            key.name(),
            spec.key_bits,
            spec.tag_bits
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KeySpec;
    use proptest::prelude::*;

    fn key(name: &str) -> KeyHandle {
        KeyHandle::generate(name, KeySpec::default())
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let k = key("k1");
        let env = prepare_for_seal(&k).unwrap().seal("hello").unwrap();
        let plain = prepare_for_open(&k, &env.iv).unwrap().open(&env.ciphertext).unwrap();
        assert_eq!(plain, "hello");
    }

    #[test]
    fn test_empty_plaintext() {
        let k = key("k1");
        let env = prepare_for_seal(&k).unwrap().seal("").unwrap();
        assert_eq!(env.ciphertext.len(), TAG_SIZE);
        let plain = prepare_for_open(&k, &env.iv).unwrap().open(&env.ciphertext).unwrap();
        assert_eq!(plain, "");
    }

    #[test]
    fn test_sealed_size_and_iv() {
        let k = key("k1");
        let env = prepare_for_seal(&k).unwrap().seal("hello").unwrap();
        assert_eq!(env.iv.len(), IV_SIZE);
        assert_eq!(env.ciphertext.len(), "hello".len() + TAG_SIZE);
    }

    #[test]
    fn test_fresh_iv_per_seal() {
        let k = key("k1");
        let a = prepare_for_seal(&k).unwrap().seal("same").unwrap();
        let b = prepare_for_seal(&k).unwrap().seal("same").unwrap();
        assert_ne!(a.iv, b.iv);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn test_open_with_wrong_key() {
        let env = prepare_for_seal(&key("k1")).unwrap().seal("secret").unwrap();
        let result = prepare_for_open(&key("k1"), &env.iv).unwrap().open(&env.ciphertext);
        assert!(matches!(result, Err(GateError::CipherFault(_))));
    }

    #[test]
    fn test_open_with_wrong_iv() {
        let k = key("k1");
        let env = prepare_for_seal(&k).unwrap().seal("secret").unwrap();
        let mut iv = env.iv.clone();
        iv[0] ^= 0x01;
        let result = prepare_for_open(&k, &iv).unwrap().open(&env.ciphertext);
        assert!(matches!(result, Err(GateError::CipherFault(_))));
    }

    #[test]
    fn test_iv_length_checked() {
        let k = key("k1");
        assert!(matches!(
            prepare_for_open(&k, &[0u8; 16]),
            Err(GateError::CipherFault(_))
        ));
        assert!(matches!(
            prepare_for_open(&k, &[]),
            Err(GateError::CipherFault(_))
        ));
    }

    #[test]
    fn test_truncated_ciphertext() {
        let k = key("k1");
        let env = prepare_for_seal(&k).unwrap().seal("secret").unwrap();
        let result = prepare_for_open(&k, &env.iv).unwrap().open(&env.ciphertext[..8]);
        assert!(matches!(result, Err(GateError::CipherFault(_))));
    }

    #[test]
    fn test_non_utf8_payload() {
        let k = key("k1");
        let env = prepare_for_seal(&k).unwrap().seal_bytes(&[0xff, 0xfe, 0x00]).unwrap();
        let result = prepare_for_open(&k, &env.iv).unwrap().open(&env.ciphertext);
        assert!(matches!(result, Err(GateError::InvalidEncoding)));
    }

    #[test]
    fn test_unsupported_spec() {
        let spec = KeySpec {
            key_bits: 128,
            ..KeySpec::default()
        };
        let k = KeyHandle::generate("short", spec);
        assert!(matches!(prepare_for_seal(&k), Err(GateError::CipherFault(_))));
    }

    proptest! {
        #[test]
        fn prop_roundtrip(plaintext in ".*") {
            let k = key("prop");
            let env = prepare_for_seal(&k).unwrap().seal(&plaintext).unwrap();
            let plain = prepare_for_open(&k, &env.iv).unwrap().open(&env.ciphertext).unwrap();
            prop_assert_eq!(plain, plaintext);
        }

        #[test]
        fn prop_any_bit_flip_is_detected(plaintext in ".{0,64}", bit in any::<prop::sample::Index>()) {
            let k = key("prop");
            let env = prepare_for_seal(&k).unwrap().seal(&plaintext).unwrap();
            let mut tampered = env.ciphertext.clone();
            let bit = bit.index(tampered.len() * 8);
            tampered[bit / 8] ^= 1 << (bit % 8);

            let result = prepare_for_open(&k, &env.iv).unwrap().open(&tampered);
            prop_assert!(matches!(result, Err(GateError::CipherFault(_))));
        }
    }
}
