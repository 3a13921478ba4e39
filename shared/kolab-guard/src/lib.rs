//! Kolab Guard
//!
//! Client-side admission utilities: a sliding-window rate limiter keyed by
//! caller-supplied client keys, named bucket presets, and text sanitizing
//! for user-supplied strings that end up in presence broadcasts or reports.

pub mod bucket;
pub mod rate_limiter;
pub mod sanitize;

pub use bucket::BucketConfig;
pub use rate_limiter::{retry_message, RateLimitResult, RateLimiter, RateLimiterRegistry};
pub use sanitize::{escape_html, sanitize_location, sanitize_text};
