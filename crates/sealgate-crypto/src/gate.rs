//! Authentication gate: couples one authenticator outcome to one cipher use.
//!
//! ```text
//! Idle ──present()──▶ ChallengeShown ──▶ Succeeded  → Released<S> (one transform)
//!                                     ├─▶ Failed     → S handed back unreleased
//!                                     └─▶ Errored    → code + message
//! ```
//!
//! At most one challenge is outstanding per gate. Dropping the `present`
//! future abandons the challenge and returns the gate to `Idle`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use sealgate_auth::{error_codes, AuthOutcome, AuthenticatorBroker, Challenge, ChallengeResponder};
use sealgate_core::{ChallengeRequest, CipherMode, Envelope, GateError, GateResult};

use crate::cipher::{OpenSession, SealSession};

mod private {
    pub trait Sealed {}
    impl Sealed for crate::cipher::SealSession {}
    impl Sealed for crate::cipher::OpenSession {}
}

/// A prepared cipher session that can be put behind the gate.
pub trait GatedSession: Send + private::Sealed {
    const MODE: CipherMode;

    fn key_name(&self) -> &str;
}

impl GatedSession for SealSession {
    const MODE: CipherMode = CipherMode::Seal;

    fn key_name(&self) -> &str {
        SealSession::key_name(self)
    }
}

impl GatedSession for OpenSession {
    const MODE: CipherMode = CipherMode::Open;

    fn key_name(&self) -> &str {
        OpenSession::key_name(self)
    }
}

/// How a challenge ended, from the caller's side.
pub enum GateOutcome<S> {
    Succeeded(Released<S>),
    /// Recognized but rejected. The session was never released and can be
    /// presented again.
    Failed(S),
    Errored { code: i32, message: String },
}

impl<S> GateOutcome<S> {
    /// Collapse into a result, mapping `Failed` to `ChallengeRejected`.
    pub fn into_result(self) -> GateResult<Released<S>> {
        match self {
            GateOutcome::Succeeded(released) => Ok(released),
            GateOutcome::Failed(_) => Err(GateError::ChallengeRejected),
            GateOutcome::Errored { code, message } => {
                Err(GateError::ChallengeError { code, message })
            }
        }
    }
}

impl<S> std::fmt::Debug for GateOutcome<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GateOutcome::Succeeded(r) => write!(f, "Succeeded(challenge {})", r.challenge),
            GateOutcome::Failed(_) => f.write_str("Failed"),
            GateOutcome::Errored { code, message } => write!(f, "Errored({code}: {message})"),
        }
    }
}

/// A session released by a successful challenge, good for exactly one transform.
pub struct Released<S> {
    session: S,
    challenge: u64,
}

impl<S> Released<S> {
    pub fn challenge(&self) -> u64 {
        self.challenge
    }
}

impl Released<SealSession> {
    /// Encrypt the UTF-8 bytes of `plaintext` under a fresh IV.
    pub fn seal(self, plaintext: &str) -> GateResult<Envelope> {
        tracing::debug!(challenge = self.challenge, key = self.session.key_name(), "sealing");
        self.session.seal(plaintext)
    }

    pub fn seal_bytes(self, plaintext: &[u8]) -> GateResult<Envelope> {
        tracing::debug!(challenge = self.challenge, key = self.session.key_name(), "sealing");
        self.session.seal_bytes(plaintext)
    }
}

impl Released<OpenSession> {
    /// Decrypt and verify `ciphertext`, returning the UTF-8 plaintext.
    pub fn open(self, ciphertext: &[u8]) -> GateResult<String> {
        tracing::debug!(challenge = self.challenge, key = self.session.key_name(), "opening");
        self.session.open(ciphertext)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatePhase {
    Idle,
    ChallengeShown { challenge: u64 },
}

pub struct AuthenticationGate {
    broker: Arc<dyn AuthenticatorBroker>,
    active: Arc<Mutex<Option<u64>>>,
    next_id: AtomicU64,
}

impl AuthenticationGate {
    pub fn new(broker: Arc<dyn AuthenticatorBroker>) -> Self {
        Self {
            broker,
            active: Arc::new(Mutex::new(None)),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn phase(&self) -> GatePhase {
        match *lock(&self.active) {
            Some(challenge) => GatePhase::ChallengeShown { challenge },
            None => GatePhase::Idle,
        }
    }

    /// Present `request` and wait for the single outcome.
    ///
    /// Fails with `Busy` (dropping `session`) if another challenge is
    /// outstanding on this gate.
    pub async fn present<S: GatedSession>(
        &self,
        request: &ChallengeRequest,
        session: S,
    ) -> GateResult<GateOutcome<S>> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let _shown = self.enter(id)?;

        let challenge = Challenge {
            id,
            mode: S::MODE,
            key_name: session.key_name().to_string(),
            request: request.clone(),
        };
        let (responder, reply) = ChallengeResponder::channel(id);

        tracing::info!(
            challenge = id,
            key = %challenge.key_name,
            mode = ?S::MODE,
            "presenting authentication challenge"
        );
        self.broker.present(&challenge, responder);

        let outcome = reply.await.unwrap_or_else(|_| {
            tracing::warn!(challenge = id, "authenticator dropped the challenge without an outcome");
            AuthOutcome::Errored {
                code: error_codes::CANCELED,
                message: "authentication was canceled by the authenticator".into(),
            }
        });

        Ok(match outcome {
            AuthOutcome::Succeeded => {
                tracing::info!(challenge = id, "authentication succeeded");
                GateOutcome::Succeeded(Released {
                    session,
                    challenge: id,
                })
            }
            AuthOutcome::Failed => {
                tracing::info!(challenge = id, "authentication attempt rejected");
                GateOutcome::Failed(session)
            }
            AuthOutcome::Errored { code, message } => {
                tracing::info!(challenge = id, code, %message, "authentication errored");
                GateOutcome::Errored { code, message }
            }
        })
    }

    fn enter(&self, id: u64) -> GateResult<ShownGuard> {
        let mut active = lock(&self.active);
        if let Some(active) = *active {
            tracing::warn!(challenge = id, active, "challenge already outstanding");
            return Err(GateError::Busy { active });
        }
        *active = Some(id);
        Ok(ShownGuard {
            active: self.active.clone(),
            challenge: id,
        })
    }
}

/// Returns the gate to `Idle` when the challenge concludes or is abandoned.
struct ShownGuard {
    active: Arc<Mutex<Option<u64>>>,
    challenge: u64,
}

impl Drop for ShownGuard {
    fn drop(&mut self) {
        let mut active = lock(&self.active);
        if *active == Some(self.challenge) {
            *active = None;
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
