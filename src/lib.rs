//! Symbol Rotator
//!
//! Keeps the directional scalper's list of tradeable symbols fresh. The list
//! comes from a remote ranking feed, is fetched through a retrying HTTP
//! client, filtered by the operator's coin rules and served from an
//! in-memory cache that refreshes itself in the background. A sliding-window
//! rate limiter keeps every exchange-facing call under the account limits.

pub mod common;
pub mod config;
pub mod error;
pub mod http;
pub mod ranking;

pub use common::{BackoffPolicy, RateLimit, RateLimiter};
pub use config::RotatorConfig;
pub use error::{FetchError, FilterError, RefreshError};
pub use http::{ClientConfig, FetchRequest, FetchResponse, RetryClient, Transport};
pub use ranking::{CacheState, SymbolCacheManager, SymbolFilter};
