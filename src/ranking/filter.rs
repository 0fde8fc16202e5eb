//! Coin filters applied to every freshly fetched feed
//!
//! Order is fixed and short-circuits per symbol: blacklist, whitelist, then
//! maximum USD price.

use glob::Pattern;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

use super::feed::SymbolRecord;
use crate::error::FilterError;

/// `coin_filter` section of the configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Glob patterns (`SHIB*`, `1000?USDT`) of symbols never traded
    #[serde(default)]
    pub blacklist: Vec<String>,
    /// Exact symbols allowed; empty allows everything
    #[serde(default)]
    pub whitelist: Vec<String>,
    /// Skip symbols priced above this many USD
    #[serde(default)]
    pub max_usd_value: Option<f64>,
}

/// Outcome of running one record through the filters
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Keep,
    Blacklisted { pattern: String },
    NotWhitelisted,
    AboveMaxPrice { price: f64, max: f64 },
}

/// Compiled form of [`FilterConfig`]
#[derive(Debug, Clone, Default)]
pub struct SymbolFilter {
    blacklist: Vec<Pattern>,
    whitelist: HashSet<String>,
    max_usd_value: Option<f64>,
}

impl SymbolFilter {
    pub fn new(config: &FilterConfig) -> Result<Self, FilterError> {
        let blacklist = config
            .blacklist
            .iter()
            .map(|p| {
                Pattern::new(p).map_err(|e| FilterError::InvalidPattern {
                    pattern: p.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        if let Some(max) = config.max_usd_value {
            if max.is_nan() || max < 0.0 {
                return Err(FilterError::InvalidMaxUsdValue(max));
            }
        }

        Ok(Self {
            blacklist,
            whitelist: config.whitelist.iter().cloned().collect(),
            max_usd_value: config.max_usd_value,
        })
    }

    /// Filter that keeps every symbol
    pub fn unrestricted() -> Self {
        Self::default()
    }

    pub fn verdict(&self, record: &SymbolRecord) -> Verdict {
        if let Some(pattern) = self.blacklist.iter().find(|p| p.matches(&record.symbol)) {
            return Verdict::Blacklisted {
                pattern: pattern.as_str().to_string(),
            };
        }

        if !self.whitelist.is_empty() && !self.whitelist.contains(&record.symbol) {
            return Verdict::NotWhitelisted;
        }

        if let Some(max) = self.max_usd_value {
            if record.usd_price > max {
                return Verdict::AboveMaxPrice {
                    price: record.usd_price,
                    max,
                };
            }
        }

        Verdict::Keep
    }

    pub fn keeps(&self, record: &SymbolRecord) -> bool {
        match self.verdict(record) {
            Verdict::Keep => {
                debug!(
                    "Processing symbol {} of price {}USDT",
                    record.symbol, record.usd_price
                );
                true
            }
            Verdict::Blacklisted { pattern } => {
                debug!("Skipping {} as it matches blacklist {}", record.symbol, pattern);
                false
            }
            Verdict::NotWhitelisted => {
                debug!("Skipping {} as it's not in whitelist", record.symbol);
                false
            }
            Verdict::AboveMaxPrice { price, max } => {
                debug!(
                    "Skipping {} as its USD price {} is greater than the max allowed {}",
                    record.symbol, price, max
                );
                false
            }
        }
    }

    /// Records that pass every filter, in feed order, first occurrence of
    /// each symbol only
    pub fn apply(&self, records: &[SymbolRecord]) -> Vec<SymbolRecord> {
        records
            .iter()
            .filter(|r| self.keeps(r))
            .unique_by(|r| r.symbol.clone())
            .cloned()
            .collect()
    }

    /// Symbol names that pass every filter
    pub fn symbols(&self, records: &[SymbolRecord]) -> Vec<String> {
        self.apply(records).into_iter().map(|r| r.symbol).collect()
    }
}
