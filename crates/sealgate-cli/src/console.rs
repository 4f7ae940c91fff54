//! Console authenticator: stands in for the OS prompt on desktop hosts.
//!
//! The challenge is printed to stderr and answered on stdin. Capability
//! answers come from the `[console]` config section.

use sealgate_auth::{error_codes, AuthOutcome, AuthenticatorBroker, BrokerVerdict, Challenge, ChallengeResponder};
use sealgate_core::config::ConsoleConfig;
use sealgate_core::{ChallengeRequest, Modality};
use std::io::{BufRead, Write};

const USER_CANCELED_MESSAGE: &str = "Authentication canceled by user";

pub struct ConsoleBroker {
    config: ConsoleConfig,
}

impl ConsoleBroker {
    pub fn new(config: ConsoleConfig) -> Self {
        Self { config }
    }
}

impl AuthenticatorBroker for ConsoleBroker {
    fn platform_level(&self) -> u32 {
        self.config.level
    }

    fn platform_name(&self) -> String {
        format!("Console/{}", std::env::consts::OS)
    }

    fn verdict(&self) -> BrokerVerdict {
        verdict_for(&self.config)
    }

    fn hardware_features(&self) -> Vec<Modality> {
        self.config.features.clone()
    }

    fn present(&self, challenge: &Challenge, responder: ChallengeResponder) {
        if let Some(outcome) = unavailable_outcome(&self.config) {
            tracing::debug!(challenge = challenge.id, ?outcome, "console authenticator cannot prompt");
            if let Err(e) = responder.resolve(outcome) {
                tracing::debug!(challenge = challenge.id, error = %e, "console outcome not delivered");
            }
            return;
        }

        let challenge = challenge.clone();
        let pin = self.config.device_pin.clone();
        tokio::task::spawn_blocking(move || {
            let outcome = prompt(&challenge, pin.as_deref());
            if let Err(e) = responder.resolve(outcome) {
                tracing::debug!(challenge = challenge.id, error = %e, "console outcome not delivered");
            }
        });
    }
}

fn verdict_for(config: &ConsoleConfig) -> BrokerVerdict {
    if !config.hardware_present {
        BrokerVerdict::NoHardware
    } else if !config.hardware_available {
        BrokerVerdict::HardwareUnavailable
    } else if !config.enrolled {
        BrokerVerdict::NoneEnrolled
    } else {
        BrokerVerdict::Success
    }
}

/// The prompt error a platform raises when asked to authenticate without
/// usable hardware or enrollment.
fn unavailable_outcome(config: &ConsoleConfig) -> Option<AuthOutcome> {
    let (code, message) = match verdict_for(config) {
        BrokerVerdict::Success => return None,
        BrokerVerdict::NoHardware => (error_codes::HW_NOT_PRESENT, "No biometric hardware"),
        BrokerVerdict::NoneEnrolled => (error_codes::NO_BIOMETRICS, "No biometrics enrolled"),
        BrokerVerdict::HardwareUnavailable | BrokerVerdict::Other(_) => {
            (error_codes::HW_UNAVAILABLE, "Biometric hardware unavailable")
        }
    };
    Some(AuthOutcome::Errored {
        code,
        message: message.into(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Answer {
    Match,
    Mismatch,
    Negative,
    Cancel,
    Pin,
    Unrecognized,
}

fn interpret(line: &str, pin_offered: bool) -> Answer {
    match line.trim().to_ascii_lowercase().as_str() {
        "" => Answer::Cancel,
        "y" | "yes" => Answer::Match,
        "n" | "no" => Answer::Mismatch,
        "x" => Answer::Negative,
        "p" if pin_offered => Answer::Pin,
        _ => Answer::Unrecognized,
    }
}

/// Read one line from stdin. `None` on EOF or a read error.
fn read_answer() -> Option<String> {
    let mut line = String::new();
    match std::io::stdin().lock().read_line(&mut line) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(line),
    }
}

fn canceled() -> AuthOutcome {
    AuthOutcome::Errored {
        code: error_codes::USER_CANCELED,
        message: USER_CANCELED_MESSAGE.into(),
    }
}

fn render(request: &ChallengeRequest, pin_offered: bool) -> String {
    let mut out = format!("\n== {} ==\n", request.title);
    if let Some(subtitle) = &request.subtitle {
        out.push_str(&format!("{subtitle}\n"));
    }
    if let Some(description) = &request.description {
        out.push_str(&format!("{description}\n"));
    }
    out.push_str(&format!(
        "[y] match  [n] no match  [x] {}",
        request.negative_button_text
    ));
    if pin_offered {
        out.push_str("  [p] device PIN");
    }
    out.push_str("  [enter] cancel\n> ");
    out
}

fn prompt(challenge: &Challenge, device_pin: Option<&str>) -> AuthOutcome {
    let request = &challenge.request;
    let pin_offered = request.device_credential_allowed && device_pin.is_some();

    loop {
        eprint!("{}", render(request, pin_offered));
        let _ = std::io::stderr().flush();

        let Some(line) = read_answer() else {
            return canceled();
        };

        match interpret(&line, pin_offered) {
            Answer::Match => {
                if request.confirmation_required && !confirm() {
                    return canceled();
                }
                return AuthOutcome::Succeeded;
            }
            Answer::Mismatch => return AuthOutcome::Failed,
            Answer::Negative => {
                return AuthOutcome::Errored {
                    code: error_codes::NEGATIVE_BUTTON,
                    message: request.negative_button_text.clone(),
                }
            }
            Answer::Cancel => return canceled(),
            Answer::Pin => {
                let Some(expected) = device_pin else {
                    return canceled();
                };
                return match rpassword::prompt_password("Device PIN: ") {
                    Ok(entered) if entered == expected => AuthOutcome::Succeeded,
                    Ok(_) => AuthOutcome::Failed,
                    Err(e) => AuthOutcome::Errored {
                        code: error_codes::HW_UNAVAILABLE,
                        message: format!("reading device PIN: {e}"),
                    },
                };
            }
            Answer::Unrecognized => eprintln!("unrecognized answer"),
        }
    }
}

fn confirm() -> bool {
    eprint!("Confirm? [y/N] ");
    let _ = std::io::stderr().flush();
    read_answer().is_some_and(|line| interpret(&line, false) == Answer::Match)
}
