//! Symbol cache end to end over real HTTP

mod common;

use common::{feed, Reply, Responder};
use std::sync::Arc;
use std::time::Duration;
use symbol_rotator::ranking::{CacheConfig, FeedSource, FilterConfig, FEED_LIMIT_CLASS};
use symbol_rotator::{
    BackoffPolicy, CacheState, ClientConfig, RateLimit, RateLimiter, RetryClient,
    RotatorConfig, SymbolCacheManager, SymbolFilter,
};
use tokio_util::sync::CancellationToken;

fn client(max_retries: u32) -> RetryClient {
    RetryClient::new(
        ClientConfig::default()
            .with_max_retries(max_retries)
            .with_timeout(Duration::from_secs(5))
            .with_backoff(
                BackoffPolicy::default()
                    .with_base_delay(Duration::from_millis(10))
                    .with_jitter(Duration::ZERO),
            ),
    )
    .unwrap()
}

fn blacklist(patterns: &[&str]) -> SymbolFilter {
    SymbolFilter::new(&FilterConfig {
        blacklist: patterns.iter().map(|p| p.to_string()).collect(),
        ..Default::default()
    })
    .unwrap()
}

async fn wait_for<F: Fn() -> bool>(condition: F) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    false
}

#[tokio::test]
async fn test_refresh_applies_blacklist() {
    let server = Responder::start(
        vec![],
        Reply::ok(feed(&[("BTCUSDT", 60000.0), ("SHIBUSDT", 0.00001)])),
    )
    .await;
    let source = FeedSource::new(server.base_url());
    let manager = SymbolCacheManager::new(
        client(1),
        source.feed_url(),
        blacklist(&["SHIB*"]),
        CacheConfig::default(),
    );

    assert_eq!(manager.refresh().await.unwrap(), 1);
    assert_eq!(manager.get_symbols(), vec!["BTCUSDT"]);
    assert_eq!(server.requests(), vec!["/rotatorsymbols_bybit.json"]);
}

#[tokio::test]
async fn test_background_task_replaces_list_after_ttl() {
    let server = Responder::start(
        vec![Reply::ok(feed(&[("BTCUSDT", 60000.0)]))],
        Reply::ok(feed(&[("ETHUSDT", 3000.0), ("SOLUSDT", 150.0)])),
    )
    .await;
    let manager = Arc::new(SymbolCacheManager::new(
        client(3),
        FeedSource::new(server.base_url()).feed_url(),
        SymbolFilter::unrestricted(),
        CacheConfig::default().with_ttl(Duration::from_millis(300)),
    ));

    let handle = manager.spawn(CancellationToken::new());

    assert!(wait_for(|| manager.get_symbols() == vec!["BTCUSDT"]).await);
    assert!(wait_for(|| manager.get_symbols() == vec!["ETHUSDT", "SOLUSDT"]).await);
    assert_ne!(manager.state(), CacheState::Empty);

    handle.shutdown().await;
}

#[tokio::test]
async fn test_server_errors_keep_previous_list() {
    let server = Responder::start(vec![Reply::ok(feed(&[("BTCUSDT", 60000.0)]))], Reply::Status(500, "{}".to_string())).await;
    let manager = SymbolCacheManager::new(
        client(2),
        FeedSource::new(server.base_url()).feed_url(),
        SymbolFilter::unrestricted(),
        CacheConfig::default(),
    );

    manager.refresh().await.unwrap();
    assert!(manager.refresh().await.is_err());
    assert_eq!(manager.get_symbols(), vec!["BTCUSDT"]);

    server.push(Reply::ok(r#"{"retCode": 10001}"#));
    assert!(manager.refresh().await.is_err());
    assert_eq!(manager.get_symbols(), vec!["BTCUSDT"]);
}

#[tokio::test]
async fn test_manager_from_config_file_settings() {
    let server = Responder::start(
        vec![],
        Reply::ok(feed(&[("BTCUSDT", 60000.0), ("DOGEUSDT", 0.1), ("PEPEUSDT", 0.00001)])),
    )
    .await;
    let json = format!(
        r#"{{
            "ranking": {{"url": "{}", "data_source_exchange": "binance_futures"}},
            "coin_filter": {{"blacklist": ["PEPE*"], "max_usd_value": 10}},
            "http": {{"max_retries": 2, "base_delay_ms": 10}},
            "rate_limit": {{
                "max_calls_single": 10, "single_period_secs": 5,
                "max_calls_global": 550, "global_period_secs": 60
            }}
        }}"#,
        server.base_url()
    );
    let config = RotatorConfig::from_json(&json).unwrap();
    let limiter = RateLimiter::new();

    let manager = SymbolCacheManager::new(
        RetryClient::new(config.client_config()).unwrap(),
        config.feed_url(),
        config.symbol_filter().unwrap(),
        config.cache_config(),
    )
    .with_rate_limiter(limiter.clone(), config.rate_limit().unwrap().unwrap_or_default());

    manager.refresh().await.unwrap();

    assert_eq!(manager.get_symbols(), vec!["DOGEUSDT"]);
    assert_eq!(server.requests(), vec!["/rotatorsymbols_binancefutures.json"]);
    assert_eq!(limiter.usage(FEED_LIMIT_CLASS), 1);
    assert_eq!(RateLimit::default(), config.rate_limit().unwrap().unwrap());
}
