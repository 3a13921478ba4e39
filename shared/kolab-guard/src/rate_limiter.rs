//! Rate Limiter
//!
//! Sliding-window limiting per client key. Each key keeps the timestamps of
//! its admitted attempts; an attempt is admitted only while fewer than
//! `max_attempts` of them fall inside the trailing window.

use dashmap::DashMap;
use kolab_core::{Clock, KolabError, SystemClock};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use crate::bucket::BucketConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitResult {
    Allowed { remaining: u32 },
    Exceeded { retry_after: Duration },
}

impl RateLimitResult {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }

    /// Convert into the shared error type, for callers that propagate.
    pub fn into_result(self) -> kolab_core::Result<u32> {
        match self {
            Self::Allowed { remaining } => Ok(remaining),
            Self::Exceeded { retry_after } => Err(KolabError::RateLimited { retry_after }),
        }
    }
}

#[derive(Clone)]
pub struct RateLimiter {
    attempts: Arc<DashMap<String, VecDeque<i64>>>,
    config: BucketConfig,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(config: BucketConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: BucketConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            attempts: Arc::new(DashMap::new()),
            config,
            clock,
        }
    }

    pub fn config(&self) -> BucketConfig {
        self.config
    }

    fn window_millis(&self) -> i64 {
        self.config.window.as_millis() as i64
    }

    /// Admit and record an attempt for `key` if the window has room.
    ///
    /// The entry guard holds the key's shard lock for the whole
    /// prune-count-record sequence, so concurrent callers sharing a key
    /// cannot both take the last slot.
    pub fn check(&self, key: &str) -> RateLimitResult {
        let now = self.clock.now_millis();
        let window = self.window_millis();
        let max = self.config.max_attempts;

        let mut entry = self.attempts.entry(key.to_string()).or_default();
        prune(&mut entry, now, window);

        let used = entry.len() as u32;
        if used < max {
            entry.push_back(now);
            RateLimitResult::Allowed {
                remaining: max - used - 1,
            }
        } else {
            RateLimitResult::Exceeded {
                retry_after: retry_after(entry.front().copied(), now, window),
            }
        }
    }

    /// True (and recorded) iff the attempt is admitted.
    pub fn is_allowed(&self, key: &str) -> bool {
        self.check(key).is_allowed()
    }

    /// Time until `key` would be admitted again; zero if it is admitted now.
    pub fn remaining_time(&self, key: &str) -> Duration {
        let now = self.clock.now_millis();
        let window = self.window_millis();

        let Some(entry) = self.attempts.get(key) else {
            return if self.config.max_attempts == 0 {
                self.config.window
            } else {
                Duration::ZERO
            };
        };

        let live: Vec<i64> = entry
            .iter()
            .copied()
            .filter(|ts| now - ts < window)
            .collect();

        if (live.len() as u32) < self.config.max_attempts {
            Duration::ZERO
        } else {
            retry_after(live.first().copied(), now, window)
        }
    }

    /// Forget all attempts recorded for `key`.
    pub fn reset(&self, key: &str) {
        self.attempts.remove(key);
    }

    /// Drop keys whose attempts have all aged out.
    pub fn purge_idle(&self) -> usize {
        let now = self.clock.now_millis();
        let window = self.window_millis();
        let before = self.attempts.len();
        self.attempts.retain(|_, stamps| {
            prune(stamps, now, window);
            !stamps.is_empty()
        });
        before - self.attempts.len()
    }

    pub fn tracked_keys(&self) -> usize {
        self.attempts.len()
    }
}

fn prune(stamps: &mut VecDeque<i64>, now: i64, window: i64) {
    while let Some(&oldest) = stamps.front() {
        if now - oldest >= window {
            stamps.pop_front();
        } else {
            break;
        }
    }
}

fn retry_after(oldest: Option<i64>, now: i64, window: i64) -> Duration {
    match oldest {
        Some(ts) => Duration::from_millis((ts + window - now).max(0) as u64),
        // zero-capacity bucket: nothing ever ages out, report a full window
        None => Duration::from_millis(window.max(0) as u64),
    }
}

/// User-facing text for a rejected attempt.
pub fn retry_message(retry_after: Duration) -> String {
    let secs = retry_after.as_millis().div_ceil(1000).max(1);
    if secs == 1 {
        "Too many attempts. Please try again in 1 second.".to_string()
    } else {
        format!("Too many attempts. Please try again in {} seconds.", secs)
    }
}

/// Named buckets shared by every call site that uses the same name.
#[derive(Clone)]
pub struct RateLimiterRegistry {
    buckets: Arc<DashMap<String, RateLimiter>>,
    overrides: Arc<HashMap<String, BucketConfig>>,
    clock: Arc<dyn Clock>,
}

impl RateLimiterRegistry {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            buckets: Arc::new(DashMap::new()),
            overrides: Arc::new(HashMap::new()),
            clock,
        }
    }

    /// Replace the preset for `name`. Must be called before the bucket is first used.
    pub fn with_override(mut self, name: &str, config: BucketConfig) -> Self {
        Arc::make_mut(&mut self.overrides).insert(name.to_string(), config);
        self
    }

    /// Limiter for `name`, created on first use from override, preset or default.
    pub fn bucket(&self, name: &str) -> RateLimiter {
        self.buckets
            .entry(name.to_string())
            .or_insert_with(|| {
                let config = self
                    .overrides
                    .get(name)
                    .copied()
                    .or_else(|| BucketConfig::preset(name))
                    .unwrap_or_default();
                tracing::debug!(
                    bucket = name,
                    max_attempts = config.max_attempts,
                    window_ms = config.window.as_millis() as u64,
                    "Rate limit bucket created"
                );
                RateLimiter::with_clock(config, self.clock.clone())
            })
            .value()
            .clone()
    }

    pub fn purge_idle(&self) -> usize {
        self.buckets.iter().map(|b| b.value().purge_idle()).sum()
    }
}

impl Default for RateLimiterRegistry {
    fn default() -> Self {
        Self::new()
    }
}
