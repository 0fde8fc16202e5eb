//! Run the background refresh task and report list changes until Ctrl+C

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use symbol_rotator::RotatorConfig;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::build_manager;

pub fn run(config_path: String) -> Result<()> {
    dotenv::dotenv().ok();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    runtime.block_on(run_async(config_path))
}

async fn run_async(config_path: String) -> Result<()> {
    let config = RotatorConfig::from_file(&config_path)
        .context(format!("Failed to load config from {}", config_path))?;
    let manager = Arc::new(build_manager(&config)?);

    info!("Feed: {}", manager.feed_url());
    info!(
        "TTL: {}s, mode: {:?}",
        config.ranking.cache_ttl_secs, config.ranking.refresh_mode
    );
    if !config.coin_filter.blacklist.is_empty() {
        info!("Blacklist: {}", config.coin_filter.blacklist.join(", "));
    }
    if !config.coin_filter.whitelist.is_empty() {
        info!("Whitelist: {}", config.coin_filter.whitelist.join(", "));
    }

    let handle = manager.spawn(CancellationToken::new());

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut ticker = interval(Duration::from_secs(1));
    let mut last: Vec<String> = Vec::new();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let symbols = manager.get_symbols();
                if symbols != last {
                    info!(
                        "Symbol list now has {} entries: {}",
                        symbols.len(),
                        symbols.join(", ")
                    );
                    last = symbols;
                }
            }
            signal = &mut shutdown => {
                match signal {
                    Ok(()) => info!("Received Ctrl+C, initiating shutdown..."),
                    Err(e) => error!("Error setting up signal handler: {}", e),
                }
                break;
            }
        }
    }

    handle.shutdown().await;
    info!("Symbol watcher stopped");
    Ok(())
}
