//! Bucket presets

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Max attempts allowed per client key within a sliding window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketConfig {
    pub max_attempts: u32,
    #[serde(with = "window_millis")]
    pub window: Duration,
}

impl BucketConfig {
    pub const fn new(max_attempts: u32, window: Duration) -> Self {
        Self {
            max_attempts,
            window,
        }
    }

    /// Built-in configuration for a named bucket, if one exists.
    pub fn preset(name: &str) -> Option<Self> {
        let config = match name {
            "signup" => Self::new(3, Duration::from_secs(60)),
            "login" => Self::new(5, Duration::from_secs(60)),
            "contact" => Self::new(3, Duration::from_secs(300)),
            "error-report" => Self::new(5, Duration::from_secs(60)),
            _ => return None,
        };
        Some(config)
    }
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(60))
    }
}

mod window_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(window: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(window.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
