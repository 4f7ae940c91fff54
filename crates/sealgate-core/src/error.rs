use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type GateResult<T> = Result<T, GateError>;

/// Code reported for every failure that did not come from the authenticator.
pub const UNKNOWN_FAILURE_CODE: &str = "";

/// Message paired with [`UNKNOWN_FAILURE_CODE`].
pub const UNKNOWN_FAILURE_MESSAGE: &str = "Authentication failed for an unknown reason";

#[derive(Debug, Error)]
pub enum GateError {
    #[error("biometric authentication is not supported on this platform")]
    Unsupported,

    #[error("no biometric credentials are enrolled")]
    NoEnrollment,

    #[error("no biometric hardware present")]
    NoHardware,

    #[error("biometric hardware is temporarily unavailable")]
    TransientUnavailable,

    #[error("authentication attempt was rejected")]
    ChallengeRejected,

    #[error("authentication error {code}: {message}")]
    ChallengeError { code: i32, message: String },

    #[error("no envelope stored for slot '{slot}'")]
    MissingEnvelope { slot: String },

    #[error("cipher fault: {0}")]
    CipherFault(String),

    #[error("decrypted payload is not valid UTF-8")]
    InvalidEncoding,

    #[error("challenge {active} is already outstanding")]
    Busy { active: u64 },

    #[error("challenge {challenge} already received an outcome")]
    OutcomeAlreadyDelivered { challenge: u64 },

    #[error("challenge {challenge} was abandoned before its outcome arrived")]
    ChallengeAbandoned { challenge: u64 },

    #[error("key store error: {0}")]
    KeyStore(String),

    #[error("envelope store error: {0}")]
    Storage(String),

    #[error("config error: {0}")]
    Config(String),
}

impl GateError {
    /// Flatten into the external `(code, message)` shape.
    ///
    /// Only authenticator errors keep their own code and message; everything
    /// else collapses to the generic unknown-failure pair so platform detail
    /// does not leak across the interface.
    pub fn report(&self) -> FailureReport {
        match self {
            GateError::ChallengeError { code, message } => FailureReport {
                code: code.to_string(),
                message: message.clone(),
                rejected: false,
                cause: None,
            },
            GateError::ChallengeRejected => FailureReport {
                rejected: true,
                ..FailureReport::unknown()
            },
            _ => FailureReport::unknown(),
        }
    }

    /// Like [`GateError::report`], but keeps the inner error text in `cause`.
    pub fn report_with_cause(&self) -> FailureReport {
        let mut report = self.report();
        if !matches!(self, GateError::ChallengeError { .. }) {
            report.cause = Some(self.to_string());
        }
        report
    }
}

/// Structured failure handed back to the application layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReport {
    pub code: String,
    pub message: String,
    /// Set when the user was recognized but rejected (the "failed" signal).
    #[serde(default)]
    pub rejected: bool,
    /// Inner error text, only populated when explicitly enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

impl FailureReport {
    pub fn unknown() -> Self {
        Self {
            code: UNKNOWN_FAILURE_CODE.into(),
            message: UNKNOWN_FAILURE_MESSAGE.into(),
            rejected: false,
            cause: None,
        }
    }
}

impl std::fmt::Display for FailureReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.code.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "[{}] {}", self.code, self.message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_challenge_error_keeps_os_code() {
        let err = GateError::ChallengeError {
            code: 7,
            message: "Too many attempts".into(),
        };
        let report = err.report();
        assert_eq!(report.code, "7");
        assert_eq!(report.message, "Too many attempts");
        assert!(!report.rejected);
        assert!(report.cause.is_none());
    }

    #[test]
    fn test_internal_errors_are_generic() {
        for err in [
            GateError::CipherFault("tag mismatch".into()),
            GateError::MissingEnvelope { slot: "s1".into() },
            GateError::KeyStore("keystore locked".into()),
            GateError::InvalidEncoding,
        ] {
            let report = err.report();
            assert_eq!(report.code, UNKNOWN_FAILURE_CODE);
            assert_eq!(report.message, UNKNOWN_FAILURE_MESSAGE);
            assert!(report.cause.is_none(), "cause must stay hidden by default");
        }
    }

    #[test]
    fn test_rejection_is_flagged() {
        let report = GateError::ChallengeRejected.report();
        assert!(report.rejected);
        assert_eq!(report.message, UNKNOWN_FAILURE_MESSAGE);
    }

    #[test]
    fn test_cause_is_opt_in() {
        let report = GateError::CipherFault("aead::Error".into()).report_with_cause();
        assert_eq!(report.code, UNKNOWN_FAILURE_CODE);
        assert_eq!(report.cause.as_deref(), Some("cipher fault: aead::Error"));

        let report = GateError::ChallengeError {
            code: 10,
            message: "canceled".into(),
        }
        .report_with_cause();
        assert!(report.cause.is_none());
    }

    #[test]
    fn test_report_serializes_without_empty_cause() {
        let json = serde_json::to_string(&FailureReport::unknown()).unwrap();
        assert!(!json.contains("cause"));
    }
}
