//! Realtime hub configuration

use kolab_core::{KolabError, Result};
use kolab_lumadb::PoolConfig;
use kolab_reporting::ReportingConfig;

#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    pub http_bind: String,
    pub lumadb: PoolConfig,
    /// Base URL of the hosted functions endpoint; notifications are skipped when unset.
    pub functions_url: Option<String>,
    pub functions_key: Option<String>,
    pub reporting: ReportingConfig,
}

impl RealtimeConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            http_bind: std::env::var("HTTP_BIND").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            lumadb: PoolConfig::from_env().map_err(|e| KolabError::Config(e.to_string()))?,
            functions_url: std::env::var("FUNCTIONS_URL").ok().filter(|v| !v.trim().is_empty()),
            functions_key: std::env::var("FUNCTIONS_KEY").ok().filter(|v| !v.trim().is_empty()),
            reporting: ReportingConfig::from_env()?,
        })
    }
}
