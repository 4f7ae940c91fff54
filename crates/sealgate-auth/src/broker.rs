//! Authenticator broker capability and single-resolution outcome delivery.

use std::sync::{Arc, Mutex, PoisonError};

use sealgate_core::{ChallengeRequest, CipherMode, GateError, GateResult, Modality};
use tokio::sync::oneshot;

/// Terminal prompt error codes reported by platform authenticators.
pub mod error_codes {
    pub const HW_UNAVAILABLE: i32 = 1;
    pub const TIMEOUT: i32 = 3;
    pub const CANCELED: i32 = 5;
    pub const LOCKOUT: i32 = 7;
    pub const USER_CANCELED: i32 = 10;
    pub const NO_BIOMETRICS: i32 = 11;
    pub const HW_NOT_PRESENT: i32 = 12;
    pub const NEGATIVE_BUTTON: i32 = 13;
}

/// The broker's overall answer to "can a biometric challenge succeed right now?"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerVerdict {
    Success,
    NoHardware,
    HardwareUnavailable,
    NoneEnrolled,
    Other(i32),
}

impl BrokerVerdict {
    /// Map the integer verdict a host passes across FFI.
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => BrokerVerdict::Success,
            1 => BrokerVerdict::HardwareUnavailable,
            11 => BrokerVerdict::NoneEnrolled,
            12 => BrokerVerdict::NoHardware,
            other => BrokerVerdict::Other(other),
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            BrokerVerdict::Success => 0,
            BrokerVerdict::HardwareUnavailable => 1,
            BrokerVerdict::NoneEnrolled => 11,
            BrokerVerdict::NoHardware => 12,
            BrokerVerdict::Other(code) => *code,
        }
    }
}

/// How a single challenge ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    /// The user satisfied the authenticator.
    Succeeded,
    /// Recognized but rejected attempt (e.g. fingerprint mismatch).
    Failed,
    /// Terminal error: cancellation, lockout, hardware fault.
    Errored { code: i32, message: String },
}

/// A challenge as handed to the broker.
#[derive(Debug, Clone)]
pub struct Challenge {
    pub id: u64,
    pub mode: CipherMode,
    pub key_name: String,
    pub request: ChallengeRequest,
}

/// Platform authenticator: capability queries plus the modal prompt.
pub trait AuthenticatorBroker: Send + Sync {
    /// Platform API level (compared against the configured minimum).
    fn platform_level(&self) -> u32;

    /// Human-readable platform name, e.g. "Android".
    fn platform_name(&self) -> String {
        "unknown".into()
    }

    /// Overall verdict on whether a biometric challenge can be satisfied.
    fn verdict(&self) -> BrokerVerdict;

    /// Statically declared hardware features.
    fn hardware_features(&self) -> Vec<Modality>;

    /// Show the prompt. Must not block: the outcome is reported later,
    /// from any thread, through `responder`.
    fn present(&self, challenge: &Challenge, responder: ChallengeResponder);
}

/// Reports the outcome of one challenge. Cloneable so it can cross FFI
/// callback boundaries, but only the first report is delivered.
#[derive(Clone)]
pub struct ChallengeResponder {
    challenge: u64,
    reply: Arc<Mutex<Option<oneshot::Sender<AuthOutcome>>>>,
}

impl ChallengeResponder {
    pub fn channel(challenge: u64) -> (Self, oneshot::Receiver<AuthOutcome>) {
        let (tx, rx) = oneshot::channel();
        let responder = Self {
            challenge,
            reply: Arc::new(Mutex::new(Some(tx))),
        };
        (responder, rx)
    }

    pub fn challenge(&self) -> u64 {
        self.challenge
    }

    pub fn succeed(&self) -> GateResult<()> {
        self.resolve(AuthOutcome::Succeeded)
    }

    pub fn fail(&self) -> GateResult<()> {
        self.resolve(AuthOutcome::Failed)
    }

    pub fn error(&self, code: i32, message: impl Into<String>) -> GateResult<()> {
        self.resolve(AuthOutcome::Errored {
            code,
            message: message.into(),
        })
    }

    /// Whether an outcome has already been reported (or the waiter is gone).
    pub fn is_resolved(&self) -> bool {
        match self.reply.lock().unwrap_or_else(PoisonError::into_inner).as_ref() {
            Some(tx) => tx.is_closed(),
            None => true,
        }
    }

    /// Deliver `outcome`. Only the first call for a challenge succeeds.
    pub fn resolve(&self, outcome: AuthOutcome) -> GateResult<()> {
        let sender = self
            .reply
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let Some(sender) = sender else {
            tracing::warn!(
                challenge = self.challenge,
                ?outcome,
                "dropping duplicate authentication outcome"
            );
            return Err(GateError::OutcomeAlreadyDelivered {
                challenge: self.challenge,
            });
        };

        sender.send(outcome).map_err(|outcome| {
            tracing::debug!(
                challenge = self.challenge,
                ?outcome,
                "challenge abandoned before outcome arrived"
            );
            GateError::ChallengeAbandoned {
                challenge: self.challenge,
            }
        })
    }
}

impl std::fmt::Debug for ChallengeResponder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChallengeResponder")
            .field("challenge", &self.challenge)
            .field("resolved", &self.is_resolved())
            .finish()
    }
}
