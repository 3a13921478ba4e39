//! Error-report collaborators backed by LumaDB

use async_trait::async_trait;
use kolab_lumadb::LumaDbPool;
use kolab_reporting::{CollaboratorError, NotificationDispatcher, ReportStore};
use serde_json::Value;
use tracing::debug;

use crate::state::DependencyCheck;

/// Persists report rows through the shared LumaDB pool.
#[derive(Clone)]
pub struct LumaDbReportStore {
    pool: LumaDbPool,
}

impl LumaDbReportStore {
    pub fn new(pool: LumaDbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DependencyCheck for LumaDbReportStore {
    fn name(&self) -> &str {
        "lumadb"
    }

    async fn is_available(&self) -> bool {
        self.pool.is_healthy().await
    }
}

#[async_trait]
impl ReportStore for LumaDbReportStore {
    async fn insert(&self, table: &str, record: Value) -> Result<Value, CollaboratorError> {
        self.pool
            .insert_json(table, &record)
            .await
            .map_err(|e| CollaboratorError::Store(e.to_string()))
    }
}

/// Used when no functions endpoint is configured. Every call fails so the
/// delivery summary shows the notification was not sent.
#[derive(Debug, Clone, Copy, Default)]
pub struct SkipDispatcher;

#[async_trait]
impl NotificationDispatcher for SkipDispatcher {
    async fn invoke(&self, function_name: &str, _payload: Value) -> Result<(), CollaboratorError> {
        debug!(function_name, "No functions endpoint configured");
        Err(CollaboratorError::Dispatch(
            "functions endpoint not configured".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_skip_dispatcher_reports_failure() {
        let result = SkipDispatcher.invoke("send-error-report", Value::Null).await;
        assert!(matches!(result, Err(CollaboratorError::Dispatch(_))));
    }
}
