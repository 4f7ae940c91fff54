pub mod config;
pub mod error;
pub mod types;

pub use error::{FailureReport, GateError, GateResult};
pub use types::{BiometricAvailability, ChallengeRequest, CipherMode, Envelope, Modality};
