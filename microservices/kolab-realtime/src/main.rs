//! Kolab Realtime Hub
//!
//! Hosts presence rooms over WebSocket and accepts error reports over REST.
//! Reports are rate limited per session, persisted to LumaDB, and forwarded
//! to the notification function when one is configured.

use kolab_core::{
    HealthStatus, KolabError, KolabService, MicroserviceRuntime, ReadinessStatus, Result,
};
use kolab_lumadb::LumaDbPool;
use kolab_reporting::{HttpDispatcher, NotificationDispatcher};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

mod api;
mod config;
mod infrastructure;
mod state;


pub use config::RealtimeConfig;
pub use state::AppState;

use infrastructure::{LumaDbReportStore, SkipDispatcher};

const PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    let _telemetry = kolab_telemetry::init("kolab-realtime")
        .map_err(|e| KolabError::Config(e.to_string()))?;

    info!("Starting Kolab Realtime hub");

    let service = Arc::new(RealtimeService::new()?);
    MicroserviceRuntime::run(service).await
}

pub struct RealtimeService {
    config: RealtimeConfig,
    state: Arc<AppState>,
}

impl RealtimeService {
    pub fn new() -> Result<Self> {
        let config = RealtimeConfig::from_env()?;

        let pool = LumaDbPool::new(config.lumadb.clone())
            .map_err(|e| KolabError::Database(e.to_string()))?;
        let store = Arc::new(LumaDbReportStore::new(pool));

        let dispatcher: Arc<dyn NotificationDispatcher> = match &config.functions_url {
            Some(url) => Arc::new(
                HttpDispatcher::new(url, config.functions_key.clone())
                    .map_err(|e| KolabError::Config(e.to_string()))?,
            ),
            None => Arc::new(SkipDispatcher),
        };

        let state = Arc::new(
            AppState::new(store.clone(), dispatcher, config.reporting.clone())
                .with_dependency(store),
        );

        Ok(Self { config, state })
    }
}

#[async_trait::async_trait]
impl KolabService for RealtimeService {
    fn service_id(&self) -> &'static str {
        state::SERVICE_ID
    }

    async fn health(&self) -> HealthStatus {
        self.state.health()
    }

    async fn ready(&self) -> ReadinessStatus {
        self.state.readiness().await
    }

    async fn shutdown(&self) -> Result<()> {
        info!(
            rooms = self.state.hub.channel_count(),
            reports_accepted = self.state.reports_accepted.get(),
            reports_rejected = self.state.reports_rejected.get(),
            "Shutting down Kolab Realtime hub"
        );
        Ok(())
    }

    async fn start(self: Arc<Self>) -> Result<()> {
        info!(http = %self.config.http_bind, "Starting Kolab Realtime server");

        let state = self.state.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(PURGE_INTERVAL);
            loop {
                ticker.tick().await;
                let purged = state.limits.purge_idle();
                if purged > 0 {
                    debug!(purged, "Purged idle rate-limit keys");
                }
            }
        });

        let app = api::create_router(self.state.clone());

        let listener = tokio::net::TcpListener::bind(&self.config.http_bind).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }
}
