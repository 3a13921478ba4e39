//! Reporting context
//!
//! The one object that owns page-load scoped reporting state: the lazily
//! created session id, plus the clock and environment probe used to stamp
//! payloads. Created once at bootstrap and shared from there.

use kolab_core::{Clock, SystemClock};
use std::sync::{Arc, OnceLock};
use uuid::Uuid;

use crate::fingerprint::fingerprint;
use crate::payload::{Dimensions, ErrorPayload, ErrorSource, RawError};

pub const UNKNOWN: &str = "unknown";

/// Read access to the host environment. Every method may come back empty.
pub trait EnvironmentProbe: Send + Sync {
    fn url(&self) -> Option<String>;
    fn user_agent(&self) -> Option<String>;
    fn viewport(&self) -> Option<Dimensions>;
    fn screen(&self) -> Option<Dimensions>;
}

/// Fixed environment values.
#[derive(Debug, Clone, Default)]
pub struct StaticEnvironment {
    pub url: Option<String>,
    pub user_agent: Option<String>,
    pub viewport: Option<Dimensions>,
    pub screen: Option<Dimensions>,
}

impl StaticEnvironment {
    pub fn new(url: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            user_agent: Some(user_agent.into()),
            viewport: None,
            screen: None,
        }
    }
}

impl EnvironmentProbe for StaticEnvironment {
    fn url(&self) -> Option<String> {
        self.url.clone()
    }

    fn user_agent(&self) -> Option<String> {
        self.user_agent.clone()
    }

    fn viewport(&self) -> Option<Dimensions> {
        self.viewport
    }

    fn screen(&self) -> Option<Dimensions> {
        self.screen
    }
}

pub struct ReportingContext {
    environment: Arc<dyn EnvironmentProbe>,
    clock: Arc<dyn Clock>,
    session_id: OnceLock<String>,
}

impl ReportingContext {
    pub fn new(environment: Arc<dyn EnvironmentProbe>) -> Self {
        Self::with_clock(environment, Arc::new(SystemClock))
    }

    pub fn with_clock(environment: Arc<dyn EnvironmentProbe>, clock: Arc<dyn Clock>) -> Self {
        Self {
            environment,
            clock,
            session_id: OnceLock::new(),
        }
    }

    /// Stable for the lifetime of this context; created on first use.
    pub fn session_id(&self) -> &str {
        self.session_id
            .get_or_init(|| format!("sess_{}", Uuid::new_v4().simple()))
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Build a complete payload. Never fails: missing pieces fall back to
    /// "Unknown error" / "unknown" and an absent stack is omitted.
    pub fn build_payload(&self, raw: &RawError, source: ErrorSource) -> ErrorPayload {
        let message = raw.message();
        let url = non_empty(self.environment.url());
        let user_agent = non_empty(self.environment.user_agent());
        let fingerprint = fingerprint(&message, &url, &user_agent);

        ErrorPayload {
            stack_trace: raw.stack(),
            viewport_size: self.environment.viewport(),
            screen_size: self.environment.screen(),
            timestamp: self.clock.now(),
            session_id: self.session_id().to_string(),
            severity: raw.default_severity(source),
            source,
            fingerprint,
            message,
            url,
            user_agent,
        }
    }
}

fn non_empty(value: Option<String>) -> String {
    value
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| UNKNOWN.to_string())
}
