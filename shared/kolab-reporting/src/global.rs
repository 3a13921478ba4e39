//! Process-wide entry points
//!
//! Window error listeners and image `onerror` hooks have no reference to any
//! component, so the reporter created at bootstrap is installed here once and
//! reached through free functions.

use std::sync::{Arc, OnceLock};
use tracing::warn;

use crate::payload::{ErrorSource, RawError};
use crate::prompt::{PromptHandler, PromptOutcome};
use crate::reporter::ErrorReporter;

static REPORTER: OnceLock<Arc<ErrorReporter>> = OnceLock::new();

/// Install the page-load reporter. Returns false if one is already installed.
pub fn install(reporter: Arc<ErrorReporter>) -> bool {
    REPORTER.set(reporter).is_ok()
}

pub fn reporter() -> Option<Arc<ErrorReporter>> {
    REPORTER.get().cloned()
}

pub fn register_prompt_handler(handler: PromptHandler) -> bool {
    match REPORTER.get() {
        Some(reporter) => {
            reporter.register_prompt_handler(handler);
            true
        }
        None => {
            warn!("register_prompt_handler called before a reporter was installed");
            false
        }
    }
}

pub fn open_error_prompt_for(raw: impl Into<RawError>, source: ErrorSource) -> PromptOutcome {
    match REPORTER.get() {
        Some(reporter) => reporter.open_prompt_for(raw, source),
        None => {
            warn!("open_error_prompt_for called before a reporter was installed");
            PromptOutcome::Unavailable
        }
    }
}

/// Hook for failed image loads anywhere on the page.
pub fn report_image_failure(src: &str) -> PromptOutcome {
    open_error_prompt_for(RawError::image_load(src), ErrorSource::Automatic)
}
