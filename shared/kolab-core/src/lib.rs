//! Kolab Core - Shared service infrastructure
//!
//! This crate provides:
//! - Standard service trait and runtime bootstrap
//! - Error handling utilities
//! - Environment configuration helpers
//! - Clock abstraction shared by the realtime and reporting crates

pub mod clock;
pub mod config;
pub mod error;
pub mod service;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::env_parse;
pub use error::{KolabError, Result};
pub use service::{DependencyStatus, HealthStatus, KolabService, MicroserviceRuntime, ReadinessStatus};
