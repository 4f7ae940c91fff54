//! sealgate-secrets: protected key storage in the platform keychain
//!
//! Uses the `keyring` crate for cross-platform access:
//! - macOS: Keychain Services
//! - Linux: GNOME Keyring / Secret Service (D-Bus)
//! - Windows: Credential Manager (DPAPI)
//!
//! The in-memory store lives in `sealgate-crypto` and is used for tests and
//! hosts without a keychain.

pub mod keychain;

pub use keychain::{is_available, KeyringKeyStore};
