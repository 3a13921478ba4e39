//! Reporting configuration

use kolab_core::config::env_parse;
use kolab_core::Result;
use kolab_guard::BucketConfig;
use std::time::Duration;

pub const ERROR_REPORT_BUCKET: &str = "error-report";

#[derive(Debug, Clone)]
pub struct ReportingConfig {
    pub table: String,
    pub notify_function: String,
    pub report_bucket: BucketConfig,
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            table: "error_reports".to_string(),
            notify_function: "send-error-report".to_string(),
            report_bucket: BucketConfig::preset(ERROR_REPORT_BUCKET).unwrap_or_default(),
        }
    }
}

impl ReportingConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            table: std::env::var("REPORT_TABLE").unwrap_or(defaults.table),
            notify_function: std::env::var("REPORT_NOTIFY_FUNCTION")
                .unwrap_or(defaults.notify_function),
            report_bucket: BucketConfig::new(
                env_parse("REPORT_RATE_LIMIT_MAX", defaults.report_bucket.max_attempts)?,
                Duration::from_millis(env_parse(
                    "REPORT_RATE_LIMIT_WINDOW_MS",
                    defaults.report_bucket.window.as_millis() as u64,
                )?),
            ),
        })
    }
}
