//! sealgate-bridge: the operations an application layer calls
//!
//! ```text
//! query_modality() ──▶ "FINGERPRINT" | "FACE" | ... | "UNSUPPORTED"
//! seal(params)     ──▶ slot key          | FailureReport
//! open(params)     ──▶ plaintext         | FailureReport
//! ```
//!
//! Every failure crosses the boundary as a [`FailureReport`]. Only errors
//! reported by the authenticator keep their own code and message.

pub mod params;

pub use params::{OpenParams, SealParams};

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use sealgate_auth::{AuthenticatorBroker, ModalityDetector};
use sealgate_core::config::SealgateConfig;
use sealgate_core::{
    BiometricAvailability, ChallengeRequest, FailureReport, GateError, GateResult,
};
use sealgate_crypto::{
    prepare_for_open, prepare_for_seal, AuthenticationGate, GateOutcome, GatedSession,
    KeyCustodian, ProtectedKeyStore, Released,
};
use sealgate_store::EnvelopeStore;
use secrecy::ExposeSecret;

pub struct Bridge {
    broker: Arc<dyn AuthenticatorBroker>,
    detector: ModalityDetector,
    custodian: KeyCustodian,
    gate: AuthenticationGate,
    envelopes: Arc<dyn EnvelopeStore>,
    max_attempts: u32,
    expose_failure_cause: bool,
}

impl Bridge {
    pub fn new(
        broker: Arc<dyn AuthenticatorBroker>,
        keys: Arc<dyn ProtectedKeyStore>,
        envelopes: Arc<dyn EnvelopeStore>,
        config: &SealgateConfig,
    ) -> Self {
        Self {
            detector: ModalityDetector::new(broker.clone(), config.platform.min_level),
            gate: AuthenticationGate::new(broker.clone()),
            custodian: KeyCustodian::new(keys),
            broker,
            envelopes,
            max_attempts: config.bridge.max_attempts.max(1),
            expose_failure_cause: config.bridge.expose_failure_cause,
        }
    }

    pub fn availability(&self) -> BiometricAvailability {
        self.detector.detect()
    }

    /// String-tagged modality, e.g. `"FINGERPRINT"` or `"NO_HARDWARE"`.
    pub fn query_modality(&self) -> &'static str {
        self.availability().tag()
    }

    pub fn platform_version(&self) -> String {
        format!(
            "{} {}",
            self.broker.platform_name(),
            self.broker.platform_level()
        )
    }

    pub fn custodian(&self) -> &KeyCustodian {
        &self.custodian
    }

    pub fn envelopes(&self) -> &Arc<dyn EnvelopeStore> {
        &self.envelopes
    }

    /// Encrypt `params.message` behind a challenge and store the envelope.
    /// Returns the slot key it was stored under.
    pub async fn seal(&self, params: SealParams) -> Result<String, FailureReport> {
        self.seal_inner(params)
            .await
            .map_err(|e| self.failure("seal", &e))
    }

    /// Decrypt the envelope in `params.message_key` behind a challenge.
    pub async fn open(&self, params: OpenParams) -> Result<String, FailureReport> {
        self.open_inner(params)
            .await
            .map_err(|e| self.failure("open", &e))
    }

    async fn seal_inner(&self, params: SealParams) -> GateResult<String> {
        self.ensure_available()?;
        let key = self.custodian.get_or_create_key(&params.biometric_key)?;
        let session = prepare_for_seal(&key)?;

        let released = self.authenticate(&params.challenge, session).await?;
        let envelope = released.seal(params.message.expose_secret())?;

        let slot = if params.message_key.is_empty() {
            derive_slot(&params.biometric_key)
        } else {
            params.message_key
        };
        self.envelopes
            .put(&slot, &envelope)
            .map_err(|e| GateError::Storage(format!("{e:#}")))?;

        tracing::info!(key = %params.biometric_key, slot = %slot, "sealed secret");
        Ok(slot)
    }

    async fn open_inner(&self, params: OpenParams) -> GateResult<String> {
        if params.message_key.is_empty() {
            return Err(GateError::MissingEnvelope {
                slot: params.message_key,
            });
        }

        self.ensure_available()?;

        // Envelope before key: an unknown slot must not create a key
        let envelope = self
            .envelopes
            .get(&params.message_key)
            .map_err(|e| GateError::Storage(format!("{e:#}")))?
            .ok_or_else(|| GateError::MissingEnvelope {
                slot: params.message_key.clone(),
            })?;
        let key = self.custodian.get_or_create_key(&params.biometric_key)?;
        let session = prepare_for_open(&key, &envelope.iv)?;

        let released = self.authenticate(&params.challenge, session).await?;
        let plaintext = released.open(&envelope.ciphertext)?;

        tracing::info!(key = %params.biometric_key, slot = %params.message_key, "opened secret");
        Ok(plaintext)
    }

    fn ensure_available(&self) -> GateResult<()> {
        let availability = self.availability();
        if !availability.is_usable() {
            tracing::info!(%availability, "biometric authentication not available");
        }
        availability.ensure_usable()
    }

    /// Present the challenge until it succeeds, errors, or the user has been
    /// rejected `max_attempts` times.
    async fn authenticate<S: GatedSession>(
        &self,
        request: &ChallengeRequest,
        mut session: S,
    ) -> GateResult<Released<S>> {
        for attempt in 1..=self.max_attempts {
            match self.gate.present(request, session).await? {
                GateOutcome::Succeeded(released) => return Ok(released),
                GateOutcome::Failed(unreleased) => {
                    tracing::info!(attempt, max_attempts = self.max_attempts, "challenge rejected");
                    session = unreleased;
                }
                GateOutcome::Errored { code, message } => {
                    return Err(GateError::ChallengeError { code, message });
                }
            }
        }
        Err(GateError::ChallengeRejected)
    }

    fn failure(&self, op: &str, err: &GateError) -> FailureReport {
        tracing::warn!(op, error = %err, "operation failed");
        if self.expose_failure_cause {
            err.report_with_cause()
        } else {
            err.report()
        }
    }
}

/// Slot used when the caller gives no `message_key`.
fn derive_slot(biometric_key: &str) -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    format!("{biometric_key}_{millis}")
}
