//! One refresh cycle, printed to stdout

use anyhow::{Context, Result};
use symbol_rotator::RotatorConfig;
use tracing::info;

use super::build_manager;

pub fn run(config_path: String) -> Result<()> {
    dotenv::dotenv().ok();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    runtime.block_on(run_async(config_path))
}

async fn run_async(config_path: String) -> Result<()> {
    let config = RotatorConfig::from_file(&config_path)
        .context(format!("Failed to load config from {}", config_path))?;
    let manager = build_manager(&config)?;

    info!("Fetching rotator symbols from {}", manager.feed_url());
    let count = manager
        .refresh()
        .await
        .context("Failed to refresh rotator symbols")?;

    info!("{} symbols passed the coin filter", count);
    for symbol in manager.get_symbols() {
        println!("{}", symbol);
    }

    Ok(())
}
