//! Self-refreshing cache of rotator symbols
//!
//! The cache moves through `Empty -> Refreshing -> Valid -> Stale ->
//! Refreshing -> ...`. Readers always get the last good snapshot without
//! waiting on the network; a refresh either replaces the snapshot wholesale
//! or leaves it untouched.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use symbol_rotator::http::{ClientConfig, RetryClient};
//! use symbol_rotator::ranking::{CacheConfig, FeedSource, SymbolCacheManager, SymbolFilter};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = RetryClient::new(ClientConfig::default())?;
//!     let feed = FeedSource::new("https://ranking.example.com/volumedata");
//!     let manager = Arc::new(SymbolCacheManager::new(
//!         client,
//!         feed.feed_url(),
//!         SymbolFilter::unrestricted(),
//!         CacheConfig::default(),
//!     ));
//!
//!     let handle = manager.spawn(CancellationToken::new());
//!     println!("{:?}", manager.get_symbols());
//!     handle.shutdown().await;
//!     Ok(())
//! }
//! ```

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::feed::{parse_feed, SymbolRecord};
use super::filter::SymbolFilter;
use crate::common::{RateLimit, RateLimiter};
use crate::error::RefreshError;
use crate::http::{FetchRequest, HttpTransport, RetryClient, Transport};

pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

/// Limit class used when feed fetches go through a [`RateLimiter`]
pub const FEED_LIMIT_CLASS: &str = "GET_rotator-symbols";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    /// Nothing fetched yet
    Empty,
    /// A fetch is in flight; readers get the previous snapshot
    Refreshing,
    Valid,
    /// Older than the TTL, due for a refresh
    Stale,
}

/// What triggers a refresh once the snapshot is stale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshMode {
    /// Refresh as soon as the TTL expires
    #[default]
    Periodic,
    /// Refresh when a reader finds the snapshot stale
    OnDemand,
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub ttl: Duration,
    pub mode: RefreshMode,
    /// Idle time after an unsuccessful cycle; one TTL when unset
    pub failure_cooldown: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            mode: RefreshMode::Periodic,
            failure_cooldown: None,
        }
    }
}

impl CacheConfig {
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_mode(mut self, mode: RefreshMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_failure_cooldown(mut self, cooldown: Duration) -> Self {
        self.failure_cooldown = Some(cooldown);
        self
    }
}

/// Immutable result of one successful refresh
#[derive(Debug, Clone, Default)]
pub struct SymbolSnapshot {
    /// Filtered symbols, feed order, no duplicates
    pub symbols: Vec<String>,
    /// Records behind `symbols`
    pub records: Vec<SymbolRecord>,
    pub fetched_at: Option<Instant>,
    pub fetched_at_utc: Option<DateTime<Utc>>,
}

impl SymbolSnapshot {
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn age(&self) -> Option<Duration> {
        self.fetched_at.map(|t| t.elapsed())
    }
}

/// Shared snapshot plus the in-flight flag
#[derive(Debug)]
pub struct SymbolCache {
    snapshot: RwLock<Arc<SymbolSnapshot>>,
    refreshing: AtomicBool,
    ttl: Duration,
}

struct RefreshGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

impl SymbolCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(SymbolSnapshot::default())),
            refreshing: AtomicBool::new(false),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn snapshot(&self) -> Arc<SymbolSnapshot> {
        Arc::clone(&self.snapshot.read())
    }

    pub fn symbols(&self) -> Vec<String> {
        self.snapshot().symbols.clone()
    }

    pub fn len(&self) -> usize {
        self.snapshot().symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_refreshing(&self) -> bool {
        self.refreshing.load(Ordering::Acquire)
    }

    /// When the current snapshot goes stale; `None` before the first fetch
    pub fn expires_at(&self) -> Option<Instant> {
        self.snapshot().fetched_at.map(|t| t + self.ttl)
    }

    pub fn is_stale(&self) -> bool {
        match self.expires_at() {
            Some(expiry) => Instant::now() >= expiry,
            None => true,
        }
    }

    pub fn state(&self) -> CacheState {
        if self.is_refreshing() {
            CacheState::Refreshing
        } else if self.snapshot().fetched_at.is_none() {
            CacheState::Empty
        } else if self.is_stale() {
            CacheState::Stale
        } else {
            CacheState::Valid
        }
    }

    fn begin_refresh(&self) -> Option<RefreshGuard<'_>> {
        self.refreshing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RefreshGuard {
                flag: &self.refreshing,
            })
    }

    fn replace(&self, snapshot: SymbolSnapshot) {
        *self.snapshot.write() = Arc::new(snapshot);
    }
}

#[derive(Debug, Clone)]
struct FeedGate {
    limiter: RateLimiter,
    limit: RateLimit,
}

/// Owns the cache and the task that keeps it fresh
pub struct SymbolCacheManager<T = HttpTransport> {
    cache: Arc<SymbolCache>,
    client: RetryClient<T>,
    filter: SymbolFilter,
    request: FetchRequest,
    mode: RefreshMode,
    failure_cooldown: Duration,
    wake: Notify,
    gate: Option<FeedGate>,
}

impl<T: Transport + 'static> SymbolCacheManager<T> {
    pub fn new(
        client: RetryClient<T>,
        feed_url: impl Into<String>,
        filter: SymbolFilter,
        config: CacheConfig,
    ) -> Self {
        Self {
            cache: Arc::new(SymbolCache::new(config.ttl)),
            client,
            filter,
            request: FetchRequest::get(feed_url),
            mode: config.mode,
            failure_cooldown: config.failure_cooldown.unwrap_or(config.ttl),
            wake: Notify::new(),
            gate: None,
        }
    }

    /// Admit every feed fetch through `limiter` under [`FEED_LIMIT_CLASS`]
    pub fn with_rate_limiter(mut self, limiter: RateLimiter, limit: RateLimit) -> Self {
        self.gate = Some(FeedGate { limiter, limit });
        self
    }

    pub fn cache(&self) -> Arc<SymbolCache> {
        Arc::clone(&self.cache)
    }

    pub fn client(&self) -> &RetryClient<T> {
        &self.client
    }

    pub fn feed_url(&self) -> &str {
        &self.request.url
    }

    pub fn state(&self) -> CacheState {
        self.cache.state()
    }

    /// Last good filtered symbol list; never waits on the network
    pub fn get_symbols(&self) -> Vec<String> {
        if self.mode == RefreshMode::OnDemand
            && self.cache.is_stale()
            && !self.cache.is_refreshing()
        {
            self.wake.notify_one();
        }
        self.cache.symbols()
    }

    /// Run one fetch-filter-replace cycle now
    ///
    /// On any error the previous snapshot stays in place.
    pub async fn refresh(&self) -> Result<usize, RefreshError> {
        let Some(_guard) = self.cache.begin_refresh() else {
            debug!("Refresh skipped, another one is in flight");
            return Err(RefreshError::AlreadyRefreshing);
        };

        let outcome = self.fetch_and_replace().await;
        if let Err(e) = &outcome {
            warn!(
                "Symbol refresh failed, keeping {} cached symbols: {}",
                self.cache.len(),
                e
            );
        }
        outcome
    }

    async fn fetch_and_replace(&self) -> Result<usize, RefreshError> {
        if let Some(gate) = &self.gate {
            gate.limiter.admit(FEED_LIMIT_CLASS, &gate.limit).await;
        }

        info!("Sending request to {}", self.request.url);
        let response = self.client.fetch(&self.request).await?;
        let records = parse_feed(&response.body)?;
        info!("Received {} assets from feed", records.len());

        let kept = self.filter.apply(&records);
        if kept.is_empty() {
            return Err(RefreshError::NothingToCache {
                received: records.len(),
            });
        }

        let symbols: Vec<String> = kept.iter().map(|r| r.symbol.clone()).collect();
        let count = symbols.len();
        self.cache.replace(SymbolSnapshot {
            symbols,
            records: kept,
            fetched_at: Some(Instant::now()),
            fetched_at_utc: Some(Utc::now()),
        });
        info!("Cached {} symbols", count);

        Ok(count)
    }

    /// Start the background refresh task
    pub fn spawn(self: &Arc<Self>, cancel: CancellationToken) -> RefreshHandle {
        let manager = Arc::clone(self);
        let token = cancel.clone();
        let task = tokio::spawn(async move { manager.run(token).await });
        RefreshHandle { cancel, task }
    }

    async fn run(&self, cancel: CancellationToken) {
        info!(
            "Symbol refresh task started ({:?}, ttl {}s)",
            self.mode,
            self.cache.ttl().as_secs()
        );

        let mut last_failed = false;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.wait_for_next_cycle(last_failed) => {}
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                outcome = self.refresh() => last_failed = outcome.is_err(),
            }
        }

        info!("Symbol refresh task stopped");
    }

    async fn wait_for_next_cycle(&self, after_failure: bool) {
        if after_failure {
            sleep(self.failure_cooldown).await;
        }

        match self.mode {
            RefreshMode::Periodic => {
                if let Some(expiry) = self.cache.expires_at() {
                    sleep_until(expiry).await;
                }
            }
            RefreshMode::OnDemand => {
                if self.cache.snapshot().fetched_at.is_some() {
                    self.wake.notified().await;
                }
            }
        }
    }
}

/// Handle to the background refresh task
#[derive(Debug)]
pub struct RefreshHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl RefreshHandle {
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancel the task and wait for it to exit
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!("Symbol refresh task ended abnormally: {}", e);
        }
    }
}
