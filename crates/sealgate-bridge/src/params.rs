//! Operation parameters as the application layer sends them.
//!
//! The challenge fields sit at the top level next to the operation fields,
//! so a flat map like `{"biometric_key": "k1", "message_key": "", "message":
//! "...", "title": "Unlock", "negative_button_text": "Cancel"}` deserializes
//! directly.

use sealgate_core::ChallengeRequest;
use secrecy::SecretString;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct SealParams {
    pub biometric_key: String,
    /// Slot to store under. Empty derives `"{biometric_key}_{unix_millis}"`.
    #[serde(default)]
    pub message_key: String,
    pub message: SecretString,
    #[serde(flatten)]
    pub challenge: ChallengeRequest,
}

impl SealParams {
    pub fn new(
        biometric_key: impl Into<String>,
        message_key: impl Into<String>,
        message: impl Into<String>,
        challenge: ChallengeRequest,
    ) -> Self {
        Self {
            biometric_key: biometric_key.into(),
            message_key: message_key.into(),
            message: SecretString::from(message.into()),
            challenge,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenParams {
    pub biometric_key: String,
    pub message_key: String,
    #[serde(flatten)]
    pub challenge: ChallengeRequest,
}

impl OpenParams {
    pub fn new(
        biometric_key: impl Into<String>,
        message_key: impl Into<String>,
        challenge: ChallengeRequest,
    ) -> Self {
        Self {
            biometric_key: biometric_key.into(),
            message_key: message_key.into(),
            challenge,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_seal_params_from_flat_map() {
        let json = r#"{
            "biometric_key": "k1",
            "message": "hunter2",
            "title": "Unlock vault",
            "subtitle": "Use your fingerprint",
            "negative_button_text": "Cancel",
            "device_credential_allowed": true
        }"#;
        let params: SealParams = serde_json::from_str(json).unwrap();

        assert_eq!(params.biometric_key, "k1");
        assert_eq!(params.message_key, "");
        assert_eq!(params.message.expose_secret(), "hunter2");
        assert_eq!(params.challenge.title, "Unlock vault");
        assert_eq!(params.challenge.subtitle.as_deref(), Some("Use your fingerprint"));
        assert!(params.challenge.device_credential_allowed);
        assert!(!params.challenge.confirmation_required);
    }

    #[test]
    fn test_seal_params_debug_hides_message() {
        let params = SealParams::new("k1", "slot1", "hunter2", ChallengeRequest::new("t", "n"));
        assert!(!format!("{params:?}").contains("hunter2"));
    }

    #[test]
    fn test_open_params_requires_message_key() {
        let json = r#"{"biometric_key": "k1", "title": "t", "negative_button_text": "n"}"#;
        assert!(serde_json::from_str::<OpenParams>(json).is_err());
    }
}
