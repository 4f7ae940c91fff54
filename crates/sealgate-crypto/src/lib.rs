//! sealgate-crypto: authenticated encryption gated by a biometric challenge
//!
//! Flow:
//! ```text
//! KeyCustodian::get_or_create_key(name) ──▶ KeyHandle (opaque, AES-256)
//!   ├── SealSession::prepare(key)      (fresh 96-bit IV)
//!   └── OpenSession::prepare(key, iv)  (IV from the stored envelope)
//!         │
//!         ▼
//! AuthenticationGate::present(request, session)
//!   Idle ──▶ ChallengeShown ──▶ Succeeded(Released) | Failed(session) | Errored{code, message}
//!         │
//!         ▼
//! Released::seal(plaintext) ──▶ Envelope { ciphertext || tag, iv }
//! Released::open(ciphertext) ──▶ plaintext
//! ```
//!
//! Cipher transforms are only reachable through [`Released`], and `Released`
//! is consumed by its single transform call.

pub mod cipher;
pub mod gate;
pub mod keys;

pub use cipher::{prepare_for_open, prepare_for_seal, OpenSession, SealSession};
pub use gate::{AuthenticationGate, GateOutcome, GatePhase, GatedSession, Released};
pub use keys::{KeyCustodian, KeyHandle, KeySpec, MemoryKeyStore, ProtectedKeyStore};

/// Size of an AES-256 key in bytes
pub const KEY_SIZE: usize = 32;

/// Size of a GCM nonce (96-bit)
pub const IV_SIZE: usize = 12;

/// Size of a GCM authentication tag (128-bit)
pub const TAG_SIZE: usize = 16;
