//! sealgate-auth: the OS side of biometric authentication
//!
//! The platform authenticator is modelled as an injected capability
//! ([`AuthenticatorBroker`]). It answers two kinds of question:
//!
//! ```text
//! verdict() + hardware_features()  ──▶ ModalityDetector ──▶ BiometricAvailability
//! present(challenge, responder)    ──▶ exactly one AuthOutcome per challenge
//! ```
//!
//! [`fake`] holds deterministic brokers for tests and development hosts.

pub mod broker;
pub mod detect;
pub mod fake;

pub use broker::{
    error_codes, AuthOutcome, AuthenticatorBroker, BrokerVerdict, Challenge, ChallengeResponder,
};
pub use detect::{classify, ModalityDetector};
