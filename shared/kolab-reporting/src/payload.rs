//! Error payloads

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const UNKNOWN_ERROR: &str = "Unknown error";

/// How the report was triggered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSource {
    Automatic,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure signal as it arrives from the UI layer.
#[derive(Debug, Clone, PartialEq)]
pub enum RawError {
    /// A thrown error object; either part may be missing.
    Error {
        message: Option<String>,
        stack: Option<String>,
    },
    /// Anything else that was thrown.
    Value(serde_json::Value),
    /// Plain text, typically from a manual report.
    Message(String),
    ImageLoad { src: String },
}

impl RawError {
    /// Capture a Rust error; the source chain stands in for a stack.
    pub fn from_error(err: &(dyn std::error::Error + 'static)) -> Self {
        let mut chain = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            chain.push(format!("caused by: {}", cause));
            source = cause.source();
        }
        RawError::Error {
            message: Some(err.to_string()),
            stack: (!chain.is_empty()).then(|| chain.join("\n")),
        }
    }

    pub fn image_load(src: impl Into<String>) -> Self {
        RawError::ImageLoad { src: src.into() }
    }

    /// Message text with the "Unknown error" fallback applied.
    pub fn message(&self) -> String {
        let text = match self {
            RawError::Error { message, .. } => message.clone().unwrap_or_default(),
            RawError::Value(serde_json::Value::Null) => String::new(),
            RawError::Value(serde_json::Value::String(s)) => s.clone(),
            RawError::Value(other) => other.to_string(),
            RawError::Message(s) => s.clone(),
            RawError::ImageLoad { src } => format!("Failed to load image: {}", src),
        };
        if text.trim().is_empty() {
            UNKNOWN_ERROR.to_string()
        } else {
            text
        }
    }

    pub fn stack(&self) -> Option<String> {
        match self {
            RawError::Error {
                stack: Some(stack), ..
            } if !stack.trim().is_empty() => Some(stack.clone()),
            _ => None,
        }
    }

    /// Severity used when the caller does not pick one.
    pub fn default_severity(&self, source: ErrorSource) -> Severity {
        match (source, self) {
            (ErrorSource::Manual, _) => Severity::Medium,
            (ErrorSource::Automatic, RawError::ImageLoad { .. }) => Severity::Low,
            (ErrorSource::Automatic, _) => Severity::High,
        }
    }
}

impl From<&str> for RawError {
    fn from(message: &str) -> Self {
        RawError::Message(message.to_string())
    }
}

impl From<String> for RawError {
    fn from(message: String) -> Self {
        RawError::Message(message)
    }
}

impl From<serde_json::Value> for RawError {
    fn from(value: serde_json::Value) -> Self {
        RawError::Value(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Fully populated report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
    pub url: String,
    pub user_agent: String,
    #[serde(default)]
    pub viewport_size: Option<Dimensions>,
    #[serde(default)]
    pub screen_size: Option<Dimensions>,
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    pub fingerprint: String,
    pub source: ErrorSource,
    pub severity: Severity,
}

impl ErrorPayload {
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }
}
