//! Sliding-window rate limiter shared by every exchange call in the bot
//!
//! Calls are grouped into limit classes (one per exchange endpoint, e.g.
//! `GET_wallet-balance`). Each class keeps a ledger of admission timestamps
//! and is capped on its own, while a global budget caps the sum of every
//! ledger so the bot as a whole stays under the exchange's account limit.
//!
//! A full class waits until its newest call leaves the class window and is
//! then cleared. Cleared calls keep counting against the global budget.
//!
//! The global ceiling is a safety valve: when it trips, the caller waits
//! until the newest recorded call has left every window and then the whole
//! ledger is reset.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

/// Limits applied to a single call site
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    /// Maximum calls admitted for the class within `single_period`
    pub max_calls_single: usize,
    /// Sliding window for the per-class ceiling
    pub single_period: Duration,
    /// Maximum calls admitted across every class within `global_period`
    pub max_calls_global: usize,
    /// Window for the global ceiling
    pub global_period: Duration,
}

impl Default for RateLimit {
    fn default() -> Self {
        Self {
            max_calls_single: 10,
            single_period: Duration::from_secs(5),
            max_calls_global: 550,
            global_period: Duration::from_secs(60),
        }
    }
}

impl RateLimit {
    /// Set the per-class ceiling
    pub fn with_single(mut self, max_calls: usize, period: Duration) -> Self {
        self.max_calls_single = max_calls;
        self.single_period = period;
        self
    }

    /// Set the global ceiling
    pub fn with_global(mut self, max_calls: usize, period: Duration) -> Self {
        self.max_calls_global = max_calls;
        self.global_period = period;
        self
    }
}

fn prune_expired(calls: &mut VecDeque<Instant>, window: Duration, now: Instant) {
    while let Some(&oldest) = calls.front() {
        if now.saturating_duration_since(oldest) < window {
            break;
        }
        calls.pop_front();
    }
}

#[derive(Debug)]
struct ClassLedger {
    window: Duration,
    epoch: u64,
    calls: VecDeque<Instant>,
}

impl ClassLedger {
    fn prune(&mut self, now: Instant) {
        prune_expired(&mut self.calls, self.window, now);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Granted,
    GlobalExhausted { until: Instant, epoch: u64 },
    ClassExhausted { until: Instant, epoch: u64 },
}

/// Call timestamps for every limit class, guarded as one unit
#[derive(Debug, Default)]
struct CallLedger {
    classes: HashMap<String, ClassLedger>,
    /// Every admitted call across classes, kept for the global window
    global: VecDeque<Instant>,
    global_window: Duration,
    /// Also serves as the epoch of the whole ledger
    global_resets: u64,
    class_epochs: u64,
}

impl CallLedger {
    /// Drop expired calls, and class ledgers left with none
    fn prune(&mut self, now: Instant) {
        prune_expired(&mut self.global, self.global_window, now);
        self.classes.retain(|_, ledger| {
            ledger.prune(now);
            !ledger.calls.is_empty()
        });
    }

    fn try_admit(&mut self, class: &str, limit: &RateLimit, now: Instant) -> Admission {
        let max_single = limit.max_calls_single.max(1);
        let max_global = limit.max_calls_global.max(1);

        self.global_window = limit.global_period;
        self.prune(now);

        if self.global.len() >= max_global {
            // Past this point every recorded call is outside every window,
            // so the full reset cannot over-admit
            let settle = self
                .classes
                .values()
                .map(|ledger| ledger.window)
                .fold(limit.global_period.max(limit.single_period), Duration::max);
            let newest = self.global.back().copied().unwrap_or(now);
            return Admission::GlobalExhausted {
                until: newest + settle,
                epoch: self.global_resets,
            };
        }

        let epochs = &mut self.class_epochs;
        let ledger = self.classes.entry(class.to_owned()).or_insert_with(|| {
            *epochs += 1;
            ClassLedger {
                window: limit.single_period,
                epoch: *epochs,
                calls: VecDeque::new(),
            }
        });
        ledger.window = limit.single_period;
        ledger.prune(now);

        if ledger.calls.len() >= max_single {
            let newest = ledger.calls.back().copied().unwrap_or(now);
            return Admission::ClassExhausted {
                until: newest + limit.single_period,
                epoch: ledger.epoch,
            };
        }

        ledger.calls.push_back(now);
        self.global.push_back(now);
        Admission::Granted
    }

    /// Clear every class, unless another waiter already did since `epoch`
    fn reset_all(&mut self, epoch: u64) -> bool {
        if self.global_resets != epoch {
            return false;
        }
        self.classes.clear();
        self.global.clear();
        self.global_resets += 1;
        true
    }

    /// Clear one class; its calls still count against the global budget
    fn reset_class(&mut self, class: &str, epoch: u64) -> bool {
        match self.classes.get_mut(class) {
            Some(ledger) if ledger.epoch == epoch => {
                self.class_epochs += 1;
                ledger.calls.clear();
                ledger.epoch = self.class_epochs;
                true
            }
            _ => false,
        }
    }
}

/// Multi-tier rate limiter
///
/// Constructed once at startup and cloned into every component that issues
/// exchange calls; clones share the same ledger.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use symbol_rotator::common::{RateLimit, RateLimiter};
///
/// #[tokio::main]
/// async fn main() {
///     let limiter = RateLimiter::new();
///     let limit = RateLimit::default().with_single(5, Duration::from_secs(5));
///
///     limiter.admit("GET_wallet-balance", &limit).await;
///     // Issue the exchange call...
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct RateLimiter {
    ledger: Arc<Mutex<CallLedger>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until a call in `class` fits both the class and the global budget,
    /// then record it.
    ///
    /// A single admission can wait twice in a row (once on the global budget,
    /// once on the class), so this loops until both checks pass.
    pub async fn admit(&self, class: &str, limit: &RateLimit) {
        loop {
            let decision = self.ledger.lock().try_admit(class, limit, Instant::now());

            match decision {
                Admission::Granted => return,
                Admission::GlobalExhausted { until, epoch } => {
                    warn!(
                        "Global rate limit reached, waiting {:.2} seconds to clean the ledger",
                        until
                            .saturating_duration_since(Instant::now())
                            .as_secs_f64()
                    );
                    sleep_until(until).await;
                    if self.ledger.lock().reset_all(epoch) {
                        info!("Global call ledger cleaned");
                    }
                }
                Admission::ClassExhausted { until, epoch } => {
                    warn!(
                        "{} rate reached its limit, waiting {:.2} seconds",
                        class,
                        until
                            .saturating_duration_since(Instant::now())
                            .as_secs_f64()
                    );
                    sleep_until(until).await;
                    if self.ledger.lock().reset_class(class, epoch) {
                        debug!("{} call ledger cleared", class);
                    }
                }
            }
        }
    }

    /// Admit a call in `class`, then run it
    pub async fn call<F, Fut, T>(&self, class: &str, limit: &RateLimit, operation: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        self.admit(class, limit).await;
        operation().await
    }

    /// Calls currently counted against `class`
    pub fn usage(&self, class: &str) -> usize {
        let mut ledger = self.ledger.lock();
        ledger.prune(Instant::now());
        ledger.classes.get(class).map_or(0, |c| c.calls.len())
    }

    /// Calls currently counted against the global budget
    pub fn total_usage(&self) -> usize {
        let mut ledger = self.ledger.lock();
        ledger.prune(Instant::now());
        ledger.global.len()
    }

    /// Number of times the global budget forced a full ledger reset
    pub fn global_resets(&self) -> u64 {
        self.ledger.lock().global_resets
    }

    #[cfg(test)]
    fn tracked_classes(&self) -> usize {
        self.ledger.lock().classes.len()
    }
}
