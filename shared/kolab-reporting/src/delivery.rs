//! Report delivery
//!
//! Persistence and notification are attempted independently and in
//! parallel. Neither failure rolls back the other, and neither reaches the
//! caller: the outcome is logged and summarized in a [`DeliveryReport`].

use async_trait::async_trait;
use kolab_guard::{escape_html, sanitize_text};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::config::ReportingConfig;
use crate::payload::{ErrorPayload, ErrorSource};

const MAX_TITLE_CHARS: usize = 200;
const MAX_DESCRIPTION_CHARS: usize = 5_000;

#[derive(Debug, thiserror::Error)]
pub enum CollaboratorError {
    #[error("Store error: {0}")]
    Store(String),

    #[error("Dispatch error: {0}")]
    Dispatch(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

/// Database collaborator: insert one record, get the stored row back.
#[async_trait]
pub trait ReportStore: Send + Sync {
    async fn insert(&self, table: &str, record: Value) -> Result<Value, CollaboratorError>;
}

/// Serverless function collaborator, fire-and-forget from our side.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn invoke(&self, function_name: &str, payload: Value) -> Result<(), CollaboratorError>;
}

/// Column layout of the error-reports table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReportRow {
    pub title: String,
    pub description: String,
    pub url: String,
    pub user_agent: String,
    pub browser_info: Value,
    pub error_details: Value,
    pub severity: String,
    pub status: String,
}

impl ErrorReportRow {
    pub const STATUS_NEW: &'static str = "new";

    pub fn from_payload(payload: &ErrorPayload, description: Option<&str>) -> Self {
        let prefix = match payload.source {
            ErrorSource::Automatic => "Automatic error report",
            ErrorSource::Manual => "User error report",
        };
        let title = sanitize_text(&format!("{}: {}", prefix, payload.message), MAX_TITLE_CHARS);
        let description = description
            .map(|d| sanitize_text(d, MAX_DESCRIPTION_CHARS))
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| sanitize_text(&payload.message, MAX_DESCRIPTION_CHARS));

        Self {
            title,
            description,
            url: payload.url.clone(),
            user_agent: payload.user_agent.clone(),
            browser_info: json!({
                "user_agent": payload.user_agent,
                "viewport": payload.viewport_size.map(|d| d.to_string()),
                "screen": payload.screen_size.map(|d| d.to_string()),
                "session_id": payload.session_id,
            }),
            error_details: serde_json::to_value(payload).unwrap_or(Value::Null),
            severity: payload.severity.as_str().to_string(),
            status: Self::STATUS_NEW.to_string(),
        }
    }

    pub fn to_record(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// What happened to each half of a send. Informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeliveryReport {
    pub persisted: bool,
    pub notified: bool,
}

fn notification_payload(payload: &ErrorPayload, row: &ErrorReportRow) -> Value {
    json!({
        "type": "error_report",
        "title": row.title,
        "title_html": escape_html(&row.title),
        "description_html": escape_html(&row.description),
        "severity": row.severity,
        "url": payload.url,
        "fingerprint": payload.fingerprint,
        "session_id": payload.session_id,
        "timestamp": payload.timestamp,
    })
}

/// Persist and notify; always resolves.
pub async fn send_report(
    store: &dyn ReportStore,
    dispatcher: &dyn NotificationDispatcher,
    config: &ReportingConfig,
    payload: &ErrorPayload,
    description: Option<&str>,
) -> DeliveryReport {
    let row = ErrorReportRow::from_payload(payload, description);
    let notice = notification_payload(payload, &row);

    let (stored, notified) = tokio::join!(
        store.insert(&config.table, row.to_record()),
        dispatcher.invoke(&config.notify_function, notice),
    );

    let persisted = match stored {
        Ok(_) => true,
        Err(e) => {
            warn!(fingerprint = %payload.fingerprint, error = %e, "Failed to persist error report");
            false
        }
    };
    let notified = match notified {
        Ok(()) => true,
        Err(e) => {
            warn!(fingerprint = %payload.fingerprint, error = %e, "Failed to dispatch error report notification");
            false
        }
    };

    info!(
        fingerprint = %payload.fingerprint,
        severity = %payload.severity,
        persisted,
        notified,
        "Error report sent"
    );

    DeliveryReport {
        persisted,
        notified,
    }
}
