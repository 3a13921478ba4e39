//! Shared handler state

use async_trait::async_trait;
use kolab_core::{Clock, DependencyStatus, HealthStatus, ReadinessStatus, SystemClock};
use kolab_guard::RateLimiterRegistry;
use kolab_presence_sdk::InMemoryChannel;
use kolab_reporting::config::ERROR_REPORT_BUCKET;
use kolab_reporting::{NotificationDispatcher, ReportStore, ReportingConfig};
use kolab_telemetry::{Counter, Gauge};
use std::sync::Arc;
use std::time::Instant;

pub const SERVICE_ID: &str = "kolab-realtime";

/// A backing service the hub needs before it can take traffic.
#[async_trait]
pub trait DependencyCheck: Send + Sync {
    fn name(&self) -> &str;

    async fn is_available(&self) -> bool;
}

pub struct AppState {
    pub hub: InMemoryChannel,
    pub limits: RateLimiterRegistry,
    pub store: Arc<dyn ReportStore>,
    pub dispatcher: Arc<dyn NotificationDispatcher>,
    pub reporting: ReportingConfig,
    pub clock: Arc<dyn Clock>,
    pub open_rooms: Gauge,
    pub reports_accepted: Counter,
    pub reports_rejected: Counter,
    dependencies: Vec<Arc<dyn DependencyCheck>>,
    started_at: Instant,
}

impl AppState {
    pub fn new(
        store: Arc<dyn ReportStore>,
        dispatcher: Arc<dyn NotificationDispatcher>,
        reporting: ReportingConfig,
    ) -> Self {
        Self::with_clock(store, dispatcher, reporting, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: Arc<dyn ReportStore>,
        dispatcher: Arc<dyn NotificationDispatcher>,
        reporting: ReportingConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let limits = RateLimiterRegistry::with_clock(clock.clone())
            .with_override(ERROR_REPORT_BUCKET, reporting.report_bucket);

        Self {
            hub: InMemoryChannel::new(),
            limits,
            store,
            dispatcher,
            reporting,
            clock,
            open_rooms: Gauge::new("realtime_open_rooms"),
            reports_accepted: Counter::new("realtime_reports_accepted"),
            reports_rejected: Counter::new("realtime_reports_rejected"),
            dependencies: Vec::new(),
            started_at: Instant::now(),
        }
    }

    pub fn with_dependency(mut self, dependency: Arc<dyn DependencyCheck>) -> Self {
        self.dependencies.push(dependency);
        self
    }

    pub fn health(&self) -> HealthStatus {
        HealthStatus {
            healthy: true,
            service_id: SERVICE_ID.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: self.started_at.elapsed().as_secs(),
        }
    }

    /// Ready once every registered dependency answers.
    pub async fn readiness(&self) -> ReadinessStatus {
        let mut dependencies = Vec::with_capacity(self.dependencies.len());
        for dependency in &self.dependencies {
            let started = Instant::now();
            let available = dependency.is_available().await;
            dependencies.push(DependencyStatus {
                name: dependency.name().to_string(),
                available,
                latency_ms: Some(started.elapsed().as_millis() as u64),
            });
        }

        ReadinessStatus {
            ready: dependencies.iter().all(|d| d.available),
            dependencies,
        }
    }

    pub fn refresh_room_gauge(&self) {
        self.open_rooms.set(self.hub.channel_count() as u64);
    }
}
