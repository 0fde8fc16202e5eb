//! Rotator symbol ranking: feed parsing, coin filters and the refreshing cache

pub mod cache;
pub mod feed;
pub mod filter;

pub use cache::{
    CacheConfig, CacheState, RefreshHandle, RefreshMode, SymbolCache, SymbolCacheManager,
    SymbolSnapshot, DEFAULT_TTL, FEED_LIMIT_CLASS,
};
pub use feed::{parse_feed, FeedSource, SymbolRecord};
pub use filter::{FilterConfig, SymbolFilter, Verdict};
