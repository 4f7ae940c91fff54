//! sealgate: seal and open small secrets behind a biometric challenge
//!
//! Commands:
//!   modality                 - report which biometric modality is available
//!   platform                 - show platform name and level
//!   seal <key> [--slot S]    - encrypt a secret and store it in a slot
//!   open <key> <slot>        - decrypt a stored secret
//!   slots                    - list stored slots
//!   remove <slot>            - delete a stored slot
//!   key revoke <name>        - delete a named key
//!   config show              - display current configuration
//!
//! The challenge is answered on the console (see `console.rs`).

mod console;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use secrecy::SecretString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use sealgate_bridge::{Bridge, OpenParams, SealParams};
use sealgate_core::config::{KeyBackend, SealgateConfig};
use sealgate_core::{ChallengeRequest, FailureReport};
use sealgate_crypto::{MemoryKeyStore, ProtectedKeyStore};
use sealgate_secrets::KeyringKeyStore;
use sealgate_store::{EnvelopeStore, JsonEnvelopeStore};

use crate::console::ConsoleBroker;

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "sealgate",
    version,
    about = "Biometric-gated secret sealing",
    long_about = "sealgate: encrypt small secrets under named keys, released only by a successful authentication challenge"
)]
struct Cli {
    /// Path to sealgate.toml configuration file
    #[arg(
        long,
        short = 'c',
        env = "SEALGATE_CONFIG",
        default_value = "~/.config/sealgate/sealgate.toml"
    )]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides [log] level
    #[arg(long, env = "SEALGATE_LOG")]
    log: Option<String>,

    /// Log format; overrides [log] format
    #[arg(long, env = "SEALGATE_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Report the available biometric modality
    Modality,

    /// Show platform name and level
    Platform,

    /// Encrypt a secret under a named key and store it
    ///
    /// Prints the slot the envelope was stored under.
    Seal {
        /// Key name
        key: String,
        /// Slot to store under (default: "<key>_<unix millis>")
        #[arg(long, short = 's', default_value = "")]
        slot: String,
        /// Secret to seal (prompted without echo when omitted)
        #[arg(long, short = 'm')]
        message: Option<String>,
        #[command(flatten)]
        prompt: PromptArgs,
    },

    /// Decrypt a stored secret and print it
    Open {
        /// Key name the secret was sealed under
        key: String,
        /// Slot the envelope is stored in
        slot: String,
        #[command(flatten)]
        prompt: PromptArgs,
    },

    /// List stored slots
    Slots,

    /// Delete a stored slot
    Remove {
        slot: String,
    },

    /// Key management
    Key {
        #[command(subcommand)]
        action: KeyAction,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum KeyAction {
    /// Delete a named key. Secrets sealed under it can no longer be opened.
    Revoke { name: String },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
}

/// What the authentication prompt shows.
#[derive(Args, Debug)]
struct PromptArgs {
    #[arg(long, default_value = "sealgate")]
    title: String,
    #[arg(long)]
    subtitle: Option<String>,
    #[arg(long)]
    description: Option<String>,
    /// Label of the negative action
    #[arg(long, default_value = "Cancel")]
    negative: String,
    /// Require an explicit confirmation after a match
    #[arg(long)]
    confirm: bool,
    /// Allow the device PIN as a fallback
    #[arg(long)]
    allow_device_credential: bool,
}

impl PromptArgs {
    fn into_request(self) -> ChallengeRequest {
        ChallengeRequest {
            title: self.title,
            subtitle: self.subtitle,
            description: self.description,
            negative_button_text: self.negative,
            confirmation_required: self.confirm,
            device_credential_allowed: self.allow_device_credential,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = expand_tilde(&cli.config);
    let loaded = load_config(&config_path).await?;
    let config = loaded.clone().unwrap_or_default();

    let level = cli.log.clone().unwrap_or_else(|| config.log.level.clone());
    let format = match &cli.log_format {
        Some(format) => format.clone(),
        None if config.log.format == "json" => LogFormat::Json,
        None => LogFormat::Text,
    };
    init_logging(&level, &format);

    if loaded.is_none() {
        tracing::warn!(
            "config file not found: {}  (using defaults)",
            config_path.display()
        );
    }
    config.validate()?;

    run(&config, &config_path, cli.command).await
}

async fn run(config: &SealgateConfig, config_path: &Path, command: Commands) -> Result<()> {
    match command {
        Commands::Config {
            action: ConfigAction::Show,
        } => cmd_config_show(config, config_path),
        Commands::Modality => {
            println!("{}", build_bridge(config)?.query_modality());
            Ok(())
        }
        Commands::Platform => {
            println!("{}", build_bridge(config)?.platform_version());
            Ok(())
        }
        Commands::Seal {
            key,
            slot,
            message,
            prompt,
        } => cmd_seal(&build_bridge(config)?, key, slot, message, prompt).await,
        Commands::Open { key, slot, prompt } => {
            let plaintext = build_bridge(config)?
                .open(OpenParams::new(key, slot, prompt.into_request()))
                .await
                .map_err(|report| failure("open", report))?;
            println!("{plaintext}");
            Ok(())
        }
        Commands::Slots => {
            for slot in build_bridge(config)?.envelopes().slots()? {
                println!("{slot}");
            }
            Ok(())
        }
        Commands::Remove { slot } => cmd_remove(build_bridge(config)?.envelopes().as_ref(), &slot),
        Commands::Key {
            action: KeyAction::Revoke { name },
        } => {
            if build_bridge(config)?.custodian().revoke(&name)? {
                println!("revoked key '{name}'");
            } else {
                println!("no key named '{name}'");
            }
            Ok(())
        }
    }
}

// ── Config loading ────────────────────────────────────────────────────────────

/// `Ok(None)` when there is no file at `path`.
async fn load_config(path: &Path) -> Result<Option<SealgateConfig>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading config: {}", path.display()))?;
    let config = toml::from_str(&content)
        .with_context(|| format!("parsing config: {}", path.display()))?;
    Ok(Some(config))
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));

    // stdout carries command output; logs go to stderr
    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

/// Expand `~` in path to the user's home directory
fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    match s.strip_prefix("~/") {
        Some(rest) => {
            let home = std::env::var("HOME").unwrap_or_default();
            PathBuf::from(format!("{home}/{rest}"))
        }
        None => path.to_path_buf(),
    }
}

fn build_bridge(config: &SealgateConfig) -> Result<Bridge> {
    let broker = Arc::new(ConsoleBroker::new(config.console.clone()));

    let keys: Arc<dyn ProtectedKeyStore> = match config.keys.backend {
        KeyBackend::Keyring => {
            if !sealgate_secrets::is_available(&config.keys.service) {
                tracing::warn!(service = %config.keys.service, "platform keychain not available");
            }
            Arc::new(KeyringKeyStore::new(config.keys.service.clone()))
        }
        KeyBackend::Memory => {
            tracing::warn!("memory key backend: keys are lost when the process exits");
            Arc::new(MemoryKeyStore::new())
        }
    };

    let store_path = expand_tilde(&config.store.path);
    let envelopes = Arc::new(
        JsonEnvelopeStore::open(&store_path)
            .with_context(|| format!("opening envelope store: {}", store_path.display()))?,
    );

    Ok(Bridge::new(broker, keys, envelopes, config))
}

fn failure(op: &str, report: FailureReport) -> anyhow::Error {
    let mut text = if report.rejected {
        format!("{op}: authentication was not recognized")
    } else {
        format!("{op} failed: {report}")
    };
    if let Some(cause) = &report.cause {
        text.push_str(&format!(" ({cause})"));
    }
    anyhow::anyhow!(text)
}

// ── `sealgate seal` ───────────────────────────────────────────────────────────

async fn cmd_seal(
    bridge: &Bridge,
    key: String,
    slot: String,
    message: Option<String>,
    prompt: PromptArgs,
) -> Result<()> {
    let message = match message {
        Some(message) => SecretString::from(message),
        None => SecretString::from(
            rpassword::prompt_password("Secret to seal: ").context("reading secret")?,
        ),
    };

    let params = SealParams {
        biometric_key: key,
        message_key: slot,
        message,
        challenge: prompt.into_request(),
    };
    let slot = bridge
        .seal(params)
        .await
        .map_err(|report| failure("seal", report))?;
    println!("{slot}");
    Ok(())
}

// ── `sealgate remove` ─────────────────────────────────────────────────────────

fn cmd_remove(store: &dyn EnvelopeStore, slot: &str) -> Result<()> {
    if store.remove(slot)? {
        println!("removed '{slot}'");
    } else {
        println!("no envelope in '{slot}'");
    }
    Ok(())
}

// ── `sealgate config show` ────────────────────────────────────────────────────

fn cmd_config_show(config: &SealgateConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!(
            "# Configuration: defaults (no file at {})",
            config_path.display()
        );
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sealgate_core::Envelope;
    use sealgate_store::MemoryEnvelopeStore;

    #[test]
    fn test_expand_tilde() {
        let home = std::env::var("HOME").unwrap_or_default();
        assert_eq!(
            expand_tilde(Path::new("~/x/y.json")),
            PathBuf::from(format!("{home}/x/y.json"))
        );
        assert_eq!(expand_tilde(Path::new("/abs/p")), PathBuf::from("/abs/p"));
        assert_eq!(expand_tilde(Path::new("~user/p")), PathBuf::from("~user/p"));
    }

    #[tokio::test]
    async fn test_load_config_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config(&dir.path().join("nope.toml")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_load_config_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sealgate.toml");
        std::fs::write(&path, "[bridge]\nmax_attempts = 4\n").unwrap();

        let config = load_config(&path).await.unwrap().unwrap();
        assert_eq!(config.bridge.max_attempts, 4);
        assert_eq!(config.platform.min_level, 23);
    }

    #[tokio::test]
    async fn test_load_config_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sealgate.toml");
        std::fs::write(&path, "[bridge\n").unwrap();

        let err = load_config(&path).await.unwrap_err();
        assert!(format!("{err:#}").contains("parsing config"));
    }

    #[test]
    fn test_prompt_args_into_request() {
        let cli = Cli::parse_from([
            "sealgate",
            "open",
            "k1",
            "slot1",
            "--title",
            "Unlock",
            "--negative",
            "Not now",
            "--confirm",
        ]);
        let Commands::Open { key, slot, prompt } = cli.command else {
            panic!("expected open");
        };
        assert_eq!((key.as_str(), slot.as_str()), ("k1", "slot1"));

        let request = prompt.into_request();
        assert_eq!(request.title, "Unlock");
        assert_eq!(request.negative_button_text, "Not now");
        assert!(request.confirmation_required);
        assert!(!request.device_credential_allowed);
    }

    #[test]
    fn test_seal_slot_defaults_to_empty() {
        let cli = Cli::parse_from(["sealgate", "seal", "k1", "-m", "hello"]);
        let Commands::Seal { slot, message, .. } = cli.command else {
            panic!("expected seal");
        };
        assert_eq!(slot, "");
        assert_eq!(message.as_deref(), Some("hello"));
    }

    #[test]
    fn test_failure_text() {
        let rejected = FailureReport {
            rejected: true,
            ..FailureReport::unknown()
        };
        assert!(failure("seal", rejected).to_string().contains("not recognized"));

        let errored = FailureReport {
            code: "7".into(),
            message: "Too many attempts".into(),
            rejected: false,
            cause: None,
        };
        assert_eq!(
            failure("open", errored).to_string(),
            "open failed: [7] Too many attempts"
        );
    }

    #[test]
    fn test_remove_reports_presence() {
        let store = MemoryEnvelopeStore::new();
        store
            .put(
                "slot1",
                &Envelope {
                    ciphertext: vec![1; 17],
                    iv: vec![0; 12],
                },
            )
            .unwrap();
        cmd_remove(&store, "slot1").unwrap();
        assert!(store.get("slot1").unwrap().is_none());
        cmd_remove(&store, "slot1").unwrap();
    }
}
