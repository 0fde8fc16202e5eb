pub mod once;
pub mod watch;

use anyhow::{Context, Result};
use symbol_rotator::ranking::SymbolCacheManager;
use symbol_rotator::{RateLimiter, RetryClient, RotatorConfig};
use tracing::info;

/// Wire a cache manager from the loaded configuration
fn build_manager(config: &RotatorConfig) -> Result<SymbolCacheManager> {
    let client =
        RetryClient::new(config.client_config()).context("Failed to build HTTP client")?;
    let filter = config.symbol_filter()?;

    let mut manager =
        SymbolCacheManager::new(client, config.feed_url(), filter, config.cache_config());
    if let Some(limit) = config.rate_limit()? {
        info!(
            "Feed fetches limited to {} per {:?}",
            limit.max_calls_single, limit.single_period
        );
        manager = manager.with_rate_limiter(RateLimiter::new(), limit);
    }

    Ok(manager)
}
