//! Deterministic brokers for tests and development hosts.
//!
//! These never show a prompt. [`ScriptedBroker`] answers each challenge from
//! a queue of [`Script`]s; [`Script::Hold`] parks the responder so a test can
//! resolve it later, from another task, or not at all.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use sealgate_core::Modality;
use tokio::sync::Notify;

use crate::broker::{AuthOutcome, AuthenticatorBroker, BrokerVerdict, Challenge, ChallengeResponder};

/// Capability answers reported by a fake broker.
#[derive(Debug, Clone)]
pub struct FakePlatform {
    pub level: u32,
    pub verdict: BrokerVerdict,
    pub features: Vec<Modality>,
}

impl FakePlatform {
    /// A modern platform with enrolled credentials and the given hardware.
    pub fn enrolled(features: Vec<Modality>) -> Self {
        Self {
            level: 34,
            verdict: BrokerVerdict::Success,
            features,
        }
    }
}

/// What the broker does with the next challenge.
#[derive(Debug, Clone)]
pub enum Script {
    /// Report each outcome in order. Every report after the first is
    /// rejected by the responder and recorded as undelivered.
    Respond(Vec<AuthOutcome>),
    /// Keep the responder for manual resolution.
    Hold,
    /// Drop the responder without reporting anything.
    Drop,
}

impl Script {
    pub fn succeed() -> Self {
        Script::Respond(vec![AuthOutcome::Succeeded])
    }

    pub fn fail() -> Self {
        Script::Respond(vec![AuthOutcome::Failed])
    }

    pub fn error(code: i32, message: &str) -> Self {
        Script::Respond(vec![AuthOutcome::Errored {
            code,
            message: message.into(),
        }])
    }
}

/// One attempted outcome report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub challenge: u64,
    pub outcome: AuthOutcome,
    pub delivered: bool,
}

pub struct ScriptedBroker {
    platform: Mutex<FakePlatform>,
    scripts: Mutex<VecDeque<Script>>,
    fallback: Script,
    presented: Mutex<Vec<Challenge>>,
    deliveries: Mutex<Vec<Delivery>>,
    held: Mutex<VecDeque<ChallengeResponder>>,
    notify: Notify,
}

impl ScriptedBroker {
    /// A broker that succeeds every challenge unless scripted otherwise.
    pub fn new(platform: FakePlatform) -> Self {
        Self {
            platform: Mutex::new(platform),
            scripts: Mutex::new(VecDeque::new()),
            fallback: Script::succeed(),
            presented: Mutex::new(Vec::new()),
            deliveries: Mutex::new(Vec::new()),
            held: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        }
    }

    /// Script used once the queue is empty.
    pub fn with_fallback(mut self, script: Script) -> Self {
        self.fallback = script;
        self
    }

    /// Queue a script for the next unanswered challenge.
    pub fn push(&self, script: Script) {
        lock(&self.scripts).push_back(script);
    }

    pub fn set_platform(&self, platform: FakePlatform) {
        *lock(&self.platform) = platform;
    }

    /// Every challenge presented so far, oldest first.
    pub fn presented(&self) -> Vec<Challenge> {
        lock(&self.presented).clone()
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        lock(&self.deliveries).clone()
    }

    /// Oldest responder parked by [`Script::Hold`].
    pub fn take_held(&self) -> Option<ChallengeResponder> {
        lock(&self.held).pop_front()
    }

    /// Wait until at least `count` challenges have been presented.
    pub async fn wait_presented(&self, count: usize) {
        loop {
            let notified = self.notify.notified();
            if lock(&self.presented).len() >= count {
                return;
            }
            notified.await;
        }
    }

    fn record(&self, challenge: u64, outcome: AuthOutcome, delivered: bool) {
        lock(&self.deliveries).push(Delivery {
            challenge,
            outcome,
            delivered,
        });
    }
}

impl AuthenticatorBroker for ScriptedBroker {
    fn platform_level(&self) -> u32 {
        lock(&self.platform).level
    }

    fn platform_name(&self) -> String {
        "Scripted".into()
    }

    fn verdict(&self) -> BrokerVerdict {
        lock(&self.platform).verdict
    }

    fn hardware_features(&self) -> Vec<Modality> {
        lock(&self.platform).features.clone()
    }

    fn present(&self, challenge: &Challenge, responder: ChallengeResponder) {
        let script = lock(&self.scripts)
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        tracing::trace!(challenge = challenge.id, ?script, "scripted broker presenting");
        lock(&self.presented).push(challenge.clone());

        match script {
            Script::Respond(outcomes) => {
                for outcome in outcomes {
                    let delivered = responder.resolve(outcome.clone()).is_ok();
                    self.record(challenge.id, outcome, delivered);
                }
            }
            Script::Hold => lock(&self.held).push_back(responder),
            Script::Drop => drop(responder),
        }

        self.notify.notify_waiters();
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
