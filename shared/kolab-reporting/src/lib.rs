//! Kolab Error Reporting
//!
//! Turns raw failures (UI exceptions, failed image loads, manual user
//! reports) into structured payloads, prompts the user at most once per
//! repeated fingerprint within a page load, and hands reports to a
//! persistence store and a notification dispatcher on a best-effort basis.

pub mod config;
pub mod context;
pub mod delivery;
pub mod dispatch;
pub mod fingerprint;
pub mod global;
pub mod payload;
pub mod prompt;
pub mod reporter;

#[cfg(test)]
mod tests;

pub use config::ReportingConfig;
pub use context::{EnvironmentProbe, ReportingContext, StaticEnvironment};
pub use delivery::{
    CollaboratorError, DeliveryReport, ErrorReportRow, NotificationDispatcher, ReportStore,
};
pub use dispatch::HttpDispatcher;
pub use fingerprint::fingerprint;
pub use payload::{Dimensions, ErrorPayload, ErrorSource, RawError, Severity};
pub use prompt::{PromptGate, PromptHandler, PromptOutcome, PromptState};
pub use reporter::{ErrorReporter, SubmitOutcome};
