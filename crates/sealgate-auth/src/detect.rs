//! Modality detection: classify what the device can authenticate with.

use std::sync::Arc;

use sealgate_core::{BiometricAvailability, Modality};

use crate::broker::{AuthenticatorBroker, BrokerVerdict};

/// Queries the broker on every call; nothing is cached.
pub struct ModalityDetector {
    broker: Arc<dyn AuthenticatorBroker>,
    min_level: u32,
}

impl ModalityDetector {
    pub fn new(broker: Arc<dyn AuthenticatorBroker>, min_level: u32) -> Self {
        Self { broker, min_level }
    }

    pub fn detect(&self) -> BiometricAvailability {
        let level = self.broker.platform_level();
        if level < self.min_level {
            tracing::debug!(level, min_level = self.min_level, "platform predates biometric prompts");
            return BiometricAvailability::Unsupported;
        }

        let verdict = self.broker.verdict();
        let features = if verdict == BrokerVerdict::Success {
            self.broker.hardware_features()
        } else {
            Vec::new()
        };
        let availability = classify(level, self.min_level, verdict, &features);
        tracing::debug!(level, ?verdict, %availability, "detected biometric availability");
        availability
    }
}

/// The detection decision table.
///
/// A success verdict with no declared features reports `NoneEnrolled`, the
/// same signal as a device with hardware but no enrollment.
pub fn classify(
    level: u32,
    min_level: u32,
    verdict: BrokerVerdict,
    features: &[Modality],
) -> BiometricAvailability {
    if level < min_level {
        return BiometricAvailability::Unsupported;
    }

    match verdict {
        BrokerVerdict::Success => {
            let declared: Vec<Modality> = Modality::ALL
                .into_iter()
                .filter(|m| features.contains(m))
                .collect();
            match declared.as_slice() {
                [] => BiometricAvailability::NoneEnrolled,
                [only] => BiometricAvailability::SingleModality(*only),
                _ => BiometricAvailability::MultipleModalities,
            }
        }
        BrokerVerdict::NoHardware => BiometricAvailability::NoHardware,
        BrokerVerdict::HardwareUnavailable => BiometricAvailability::HardwareUnavailable,
        BrokerVerdict::NoneEnrolled => BiometricAvailability::NoneEnrolled,
        BrokerVerdict::Other(_) => BiometricAvailability::Unsupported,
    }
}
