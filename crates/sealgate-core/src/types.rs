use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A biometric input type advertised as a hardware feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Fingerprint,
    Face,
    Iris,
}

impl Modality {
    /// Detection order used when listing hardware features.
    pub const ALL: [Modality; 3] = [Modality::Fingerprint, Modality::Face, Modality::Iris];

    pub fn tag(&self) -> &'static str {
        match self {
            Modality::Fingerprint => "FINGERPRINT",
            Modality::Face => "FACE",
            Modality::Iris => "IRIS",
        }
    }
}

/// Classified biometric availability. Recomputed on every query, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BiometricAvailability {
    SingleModality(Modality),
    MultipleModalities,
    NoneEnrolled,
    NoHardware,
    HardwareUnavailable,
    Unsupported,
}

impl BiometricAvailability {
    /// String tag exposed to the application layer.
    pub fn tag(&self) -> &'static str {
        match self {
            BiometricAvailability::SingleModality(m) => m.tag(),
            BiometricAvailability::MultipleModalities => "MULTIPLE",
            BiometricAvailability::NoneEnrolled => "NONE",
            BiometricAvailability::NoHardware => "NO_HARDWARE",
            BiometricAvailability::HardwareUnavailable => "UNAVAILABLE",
            BiometricAvailability::Unsupported => "UNSUPPORTED",
        }
    }

    /// True when a challenge can be presented right now.
    pub fn is_usable(&self) -> bool {
        matches!(
            self,
            BiometricAvailability::SingleModality(_) | BiometricAvailability::MultipleModalities
        )
    }

    /// Map a non-usable availability to its capability error.
    pub fn ensure_usable(&self) -> crate::GateResult<()> {
        use crate::GateError;
        match self {
            BiometricAvailability::SingleModality(_) | BiometricAvailability::MultipleModalities => {
                Ok(())
            }
            BiometricAvailability::NoneEnrolled => Err(GateError::NoEnrollment),
            BiometricAvailability::NoHardware => Err(GateError::NoHardware),
            BiometricAvailability::HardwareUnavailable => Err(GateError::TransientUnavailable),
            BiometricAvailability::Unsupported => Err(GateError::Unsupported),
        }
    }
}

impl fmt::Display for BiometricAvailability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for BiometricAvailability {
    type Err = crate::GateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "FINGERPRINT" => BiometricAvailability::SingleModality(Modality::Fingerprint),
            "FACE" => BiometricAvailability::SingleModality(Modality::Face),
            "IRIS" => BiometricAvailability::SingleModality(Modality::Iris),
            "MULTIPLE" => BiometricAvailability::MultipleModalities,
            "NONE" => BiometricAvailability::NoneEnrolled,
            "NO_HARDWARE" => BiometricAvailability::NoHardware,
            "UNAVAILABLE" => BiometricAvailability::HardwareUnavailable,
            "UNSUPPORTED" => BiometricAvailability::Unsupported,
            other => {
                return Err(crate::GateError::Config(format!(
                    "unknown availability tag: {other}"
                )))
            }
        })
    }
}

/// Orientation of a cipher session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CipherMode {
    Seal,
    Open,
}

/// What the OS prompt should show. Field names follow the application-layer
/// parameter map so the struct can be flattened into operation params.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeRequest {
    pub title: String,
    #[serde(default)]
    pub subtitle: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub negative_button_text: String,
    #[serde(default)]
    pub confirmation_required: bool,
    #[serde(default)]
    pub device_credential_allowed: bool,
}

impl ChallengeRequest {
    pub fn new(title: impl Into<String>, negative_button_text: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            subtitle: None,
            description: None,
            negative_button_text: negative_button_text.into(),
            confirmation_required: false,
            device_credential_allowed: false,
        }
    }

    pub fn subtitle(mut self, subtitle: impl Into<String>) -> Self {
        self.subtitle = Some(subtitle.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn confirmation_required(mut self, required: bool) -> Self {
        self.confirmation_required = required;
        self
    }

    pub fn device_credential_allowed(mut self, allowed: bool) -> Self {
        self.device_credential_allowed = allowed;
        self
    }
}

/// Persisted `(ciphertext, iv)` pair for one sealed secret.
///
/// Both fields are stored as standard base64 so the byte payload survives
/// any textual backend unchanged.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(with = "b64")]
    pub ciphertext: Vec<u8>,
    #[serde(with = "b64")]
    pub iv: Vec<u8>,
}

impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Envelope")
            .field("ciphertext_len", &self.ciphertext.len())
            .field("iv_len", &self.iv.len())
            .finish()
    }
}

mod b64 {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(d)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
