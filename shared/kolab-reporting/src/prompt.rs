//! Prompt de-duplication
//!
//! Per page load: `Idle -> Prompted(fp) -> Sent | Dismissed`. A payload whose
//! fingerprint equals the last prompted one never reaches the handler again;
//! a different fingerprint prompts from any state.

use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::payload::ErrorPayload;

pub type PromptHandler = Arc<dyn Fn(ErrorPayload) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptState {
    Idle,
    Prompted(String),
    Sent(String),
    Dismissed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PromptOutcome {
    Shown(ErrorPayload),
    /// Same fingerprint as the last prompt.
    Suppressed { fingerprint: String },
    /// No handler registered yet; dedup state untouched.
    NoHandler(ErrorPayload),
    /// No reporter installed in the global facade.
    Unavailable,
}

impl PromptOutcome {
    pub fn was_shown(&self) -> bool {
        matches!(self, Self::Shown(_))
    }
}

struct DedupState {
    last_fingerprint: Option<String>,
    has_prompted_once: bool,
    state: PromptState,
}

pub struct PromptGate {
    dedup: Mutex<DedupState>,
    handler: Mutex<Option<PromptHandler>>,
}

impl PromptGate {
    pub fn new() -> Self {
        Self {
            dedup: Mutex::new(DedupState {
                last_fingerprint: None,
                has_prompted_once: false,
                state: PromptState::Idle,
            }),
            handler: Mutex::new(None),
        }
    }

    /// Install the UI callback; a later registration replaces the earlier one.
    pub fn register_handler(&self, handler: PromptHandler) {
        if self.handler.lock().replace(handler).is_some() {
            warn!("Prompt handler replaced");
        }
    }

    /// Show `payload` unless it repeats the last prompted fingerprint.
    pub fn open(&self, payload: ErrorPayload) -> PromptOutcome {
        let Some(handler) = self.handler.lock().clone() else {
            warn!(fingerprint = %payload.fingerprint, "No prompt handler registered");
            return PromptOutcome::NoHandler(payload);
        };

        {
            // check-and-set without yielding in between
            let mut dedup = self.dedup.lock();
            if dedup.has_prompted_once
                && dedup.last_fingerprint.as_deref() == Some(payload.fingerprint.as_str())
            {
                debug!(fingerprint = %payload.fingerprint, "Duplicate error prompt suppressed");
                return PromptOutcome::Suppressed {
                    fingerprint: payload.fingerprint,
                };
            }
            dedup.last_fingerprint = Some(payload.fingerprint.clone());
            dedup.has_prompted_once = true;
            dedup.state = PromptState::Prompted(payload.fingerprint.clone());
        }

        // the handler is UI code; a panic there must not reach the caller
        if catch_unwind(AssertUnwindSafe(|| handler(payload.clone()))).is_err() {
            warn!(fingerprint = %payload.fingerprint, "Prompt handler panicked");
        }
        PromptOutcome::Shown(payload)
    }

    pub fn mark_sent(&self) {
        let mut dedup = self.dedup.lock();
        let next = match &dedup.state {
            PromptState::Prompted(fp) => PromptState::Sent(fp.clone()),
            _ => return,
        };
        dedup.state = next;
    }

    pub fn dismiss(&self) {
        let mut dedup = self.dedup.lock();
        let next = match &dedup.state {
            PromptState::Prompted(fp) => PromptState::Dismissed(fp.clone()),
            _ => return,
        };
        dedup.state = next;
    }

    pub fn state(&self) -> PromptState {
        self.dedup.lock().state.clone()
    }
}

impl Default for PromptGate {
    fn default() -> Self {
        Self::new()
    }
}
