use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::types::Modality;

/// Top-level configuration (loaded from sealgate.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SealgateConfig {
    pub log: LogConfig,
    pub store: StoreConfig,
    pub keys: KeysConfig,
    pub platform: PlatformConfig,
    pub bridge: BridgeConfig,
    pub console: ConsoleConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// JSON file holding one envelope per slot
    pub path: PathBuf,
}

/// Where named keys live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyBackend {
    /// Platform keychain via the `keyring` crate
    Keyring,
    /// Process-local, lost on exit (tests and demos)
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeysConfig {
    pub backend: KeyBackend,
    /// Keychain service name keys are filed under
    pub service: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    /// Lowest platform level that supports biometric prompts (default: 23)
    pub min_level: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Challenges presented per operation while the user keeps getting rejected
    pub max_attempts: u32,
    /// Include the inner error text in failure reports
    pub expose_failure_cause: bool,
}

/// Console authenticator used by the CLI in place of an OS prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    /// Reported platform level
    pub level: u32,
    pub hardware_present: bool,
    pub hardware_available: bool,
    pub enrolled: bool,
    /// Declared hardware features
    pub features: Vec<Modality>,
    /// Device credential accepted when the challenge allows fallback
    pub device_pin: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("~/.local/share/sealgate/envelopes.json"),
        }
    }
}

impl Default for KeysConfig {
    fn default() -> Self {
        Self {
            backend: KeyBackend::Keyring,
            service: "sealgate".into(),
        }
    }
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self { min_level: 23 }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            expose_failure_cause: false,
        }
    }
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            level: 34,
            hardware_present: true,
            hardware_available: true,
            enrolled: true,
            features: vec![Modality::Fingerprint],
            device_pin: None,
        }
    }
}

impl SealgateConfig {
    /// Reject values that parse but cannot work.
    pub fn validate(&self) -> crate::GateResult<()> {
        if self.bridge.max_attempts == 0 {
            return Err(crate::GateError::Config(
                "bridge.max_attempts must be at least 1".into(),
            ));
        }
        if self.keys.service.trim().is_empty() {
            return Err(crate::GateError::Config("keys.service must not be empty".into()));
        }
        if !matches!(self.log.format.as_str(), "text" | "json") {
            return Err(crate::GateError::Config(format!(
                "log.format must be \"text\" or \"json\", got \"{}\"",
                self.log.format
            )));
        }
        Ok(())
    }
}
