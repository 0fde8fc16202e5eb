//! Common utilities shared by every exchange-facing component
//!
//! - Multi-tier rate limiter (per-class and global sliding windows)
//! - Exponential backoff with jitter for the retry client

pub mod backoff;
pub mod rate_limiter;

pub use backoff::BackoffPolicy;
pub use rate_limiter::{RateLimit, RateLimiter};
