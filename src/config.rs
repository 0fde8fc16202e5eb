//! Configuration management
//!
//! Loads the rotator's JSON configuration file. The feed URL can be
//! overridden from the environment (`ROTATOR_FEED_URL`), which is also read
//! from a `.env` file by the binary.

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::common::{BackoffPolicy, RateLimit};
use crate::http::{ClientConfig, DEFAULT_MAX_RETRIES};
use crate::ranking::{
    CacheConfig, FeedSource, FilterConfig, RefreshMode, SymbolFilter, DEFAULT_TTL,
};

/// Environment variable that replaces `ranking.url`
pub const FEED_URL_ENV: &str = "ROTATOR_FEED_URL";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotatorConfig {
    pub ranking: RankingConfig,
    #[serde(default)]
    pub coin_filter: FilterConfig,
    #[serde(default)]
    pub http: HttpConfig,
    /// Throttle feed fetches; unthrottled when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimitConfig>,
}

impl RotatorConfig {
    /// Load configuration from JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref()).context("Failed to read config file")?;
        let mut config = Self::from_json(&contents)?;
        config.apply_overrides(std::env::var(FEED_URL_ENV).ok());
        Ok(config)
    }

    pub fn from_json(contents: &str) -> Result<Self> {
        let config: RotatorConfig =
            serde_json::from_str(contents).context("Failed to parse config JSON")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would disable throttling or make the refresh loop spin
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.ranking.cache_ttl_secs > 0,
            "ranking.cache_ttl_secs must be greater than zero"
        );
        ensure!(
            self.ranking.failure_cooldown_secs != Some(0),
            "ranking.failure_cooldown_secs must be greater than zero"
        );
        ensure!(
            self.http.timeout_secs > 0,
            "http.timeout_secs must be greater than zero"
        );
        self.rate_limit()
            .context("Invalid rate_limit section")
            .map(|_| ())
    }

    fn apply_overrides(&mut self, feed_url: Option<String>) {
        if let Some(url) = feed_url.filter(|u| !u.trim().is_empty()) {
            self.ranking.feed.url = url;
        }
    }

    pub fn feed_url(&self) -> String {
        self.ranking.feed.feed_url()
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            ttl: Duration::from_secs(self.ranking.cache_ttl_secs),
            mode: self.ranking.refresh_mode,
            failure_cooldown: self.ranking.failure_cooldown_secs.map(Duration::from_secs),
        }
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig::default()
            .with_max_retries(self.http.max_retries)
            .with_timeout(Duration::from_secs(self.http.timeout_secs))
            .with_backoff(
                BackoffPolicy::default()
                    .with_base_delay(Duration::from_millis(self.http.base_delay_ms)),
            )
    }

    pub fn symbol_filter(&self) -> Result<SymbolFilter> {
        SymbolFilter::new(&self.coin_filter).context("Invalid coin_filter section")
    }

    pub fn rate_limit(&self) -> Result<Option<RateLimit>> {
        self.rate_limit
            .as_ref()
            .map(RateLimitConfig::to_rate_limit)
            .transpose()
    }
}

/// `ranking` section: where the feed lives and how long it stays fresh
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingConfig {
    #[serde(flatten)]
    pub feed: FeedSource,
    #[serde(default = "default_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default)]
    pub refresh_mode: RefreshMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_cooldown_secs: Option<u64>,
}

fn default_ttl_secs() -> u64 {
    DEFAULT_TTL.as_secs()
}

/// `http` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for HttpConfig {
    fn default() -> Self {
        HttpConfig {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// `rate_limit` section, windows in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub max_calls_single: usize,
    pub single_period_secs: f64,
    pub max_calls_global: usize,
    pub global_period_secs: f64,
}

impl RateLimitConfig {
    pub fn to_rate_limit(&self) -> Result<RateLimit> {
        ensure!(self.max_calls_single > 0, "max_calls_single must be at least 1");
        ensure!(self.max_calls_global > 0, "max_calls_global must be at least 1");
        Ok(RateLimit::default()
            .with_single(
                self.max_calls_single,
                window("single_period_secs", self.single_period_secs)?,
            )
            .with_global(
                self.max_calls_global,
                window("global_period_secs", self.global_period_secs)?,
            ))
    }
}

fn window(name: &str, secs: f64) -> Result<Duration> {
    ensure!(
        secs.is_finite() && secs > 0.0,
        "{} must be a positive number of seconds, got {}",
        name,
        secs
    );
    Duration::try_from_secs_f64(secs).with_context(|| format!("{} is out of range", name))
}
