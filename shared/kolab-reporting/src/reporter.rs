//! Error reporter: the bootstrap-created owner of the whole pipeline

use kolab_guard::{RateLimitResult, RateLimiter};
use kolab_telemetry::Counter;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::ReportingConfig;
use crate::context::ReportingContext;
use crate::delivery::{send_report, DeliveryReport, NotificationDispatcher, ReportStore};
use crate::payload::{ErrorPayload, ErrorSource, RawError};
use crate::prompt::{PromptGate, PromptHandler, PromptOutcome, PromptState};

/// Result of a user-initiated submit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Send attempted; shown to the user as success whatever the transport did.
    Sent(DeliveryReport),
    /// Too many reports from this session; tell the user when to retry.
    RateLimited { retry_after: Duration },
}

pub struct ErrorReporter {
    context: ReportingContext,
    gate: PromptGate,
    store: Arc<dyn ReportStore>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    limiter: RateLimiter,
    config: ReportingConfig,
    prompts_shown: Counter,
    prompts_suppressed: Counter,
    reports_sent: Counter,
}

impl ErrorReporter {
    pub fn new(
        context: ReportingContext,
        store: Arc<dyn ReportStore>,
        dispatcher: Arc<dyn NotificationDispatcher>,
        config: ReportingConfig,
    ) -> Self {
        let limiter = RateLimiter::with_clock(config.report_bucket, context.clock().clone());
        Self {
            context,
            gate: PromptGate::new(),
            store,
            dispatcher,
            limiter,
            config,
            prompts_shown: Counter::new("error_prompts_shown"),
            prompts_suppressed: Counter::new("error_prompts_suppressed"),
            reports_sent: Counter::new("error_reports_sent"),
        }
    }

    pub fn session_id(&self) -> &str {
        self.context.session_id()
    }

    pub fn build_payload(&self, raw: &RawError, source: ErrorSource) -> ErrorPayload {
        self.context.build_payload(raw, source)
    }

    pub fn register_prompt_handler(&self, handler: PromptHandler) {
        self.gate.register_handler(handler);
    }

    /// Build a payload and prompt the user unless it repeats the last prompt.
    pub fn open_prompt_for(&self, raw: impl Into<RawError>, source: ErrorSource) -> PromptOutcome {
        let payload = self.build_payload(&raw.into(), source);
        let outcome = self.gate.open(payload);
        match &outcome {
            PromptOutcome::Shown(_) => self.prompts_shown.inc(),
            PromptOutcome::Suppressed { .. } => self.prompts_suppressed.inc(),
            _ => {}
        }
        outcome
    }

    /// Best-effort delivery; never fails.
    pub async fn send_report(&self, payload: &ErrorPayload, description: Option<&str>) -> DeliveryReport {
        let report = send_report(
            self.store.as_ref(),
            self.dispatcher.as_ref(),
            &self.config,
            payload,
            description,
        )
        .await;
        self.reports_sent.inc();
        report
    }

    /// User pressed "send" on the prompt. Rate limited per session.
    pub async fn submit(&self, payload: &ErrorPayload, description: Option<&str>) -> SubmitOutcome {
        if let RateLimitResult::Exceeded { retry_after } = self.limiter.check(self.session_id()) {
            info!(
                session_id = %self.session_id(),
                retry_after_ms = retry_after.as_millis() as u64,
                "Error report rate limited"
            );
            return SubmitOutcome::RateLimited { retry_after };
        }

        let report = self.send_report(payload, description).await;
        self.gate.mark_sent();
        SubmitOutcome::Sent(report)
    }

    /// User closed the prompt without sending.
    pub fn dismiss(&self) {
        self.gate.dismiss();
    }

    pub fn prompt_state(&self) -> PromptState {
        self.gate.state()
    }

    pub fn prompts_shown(&self) -> u64 {
        self.prompts_shown.get()
    }

    pub fn prompts_suppressed(&self) -> u64 {
        self.prompts_suppressed.get()
    }

    pub fn reports_sent(&self) -> u64 {
        self.reports_sent.get()
    }
}
