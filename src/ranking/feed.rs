//! Rotator symbol feed: location and record format
//!
//! The feed is a JSON array published per exchange:
//!
//! ```json
//! [{"Asset": "BTCUSDT", "Min qty": 0.001, "Price": 60000.0}, ...]
//! ```

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::RefreshError;

pub const DEFAULT_RESOURCE: &str = "rotatorsymbols";
pub const DEFAULT_DATA_SOURCE: &str = "bybit";

fn default_resource() -> String {
    DEFAULT_RESOURCE.to_string()
}

fn default_data_source() -> String {
    DEFAULT_DATA_SOURCE.to_string()
}

/// Where the ranking feed lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSource {
    /// Base URL of the feed host
    pub url: String,
    #[serde(default = "default_resource")]
    pub resource: String,
    /// Exchange whose ranking is fetched, e.g. `bybit` or `binance_futures`
    #[serde(default = "default_data_source")]
    pub data_source_exchange: String,
}

impl FeedSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            resource: default_resource(),
            data_source_exchange: default_data_source(),
        }
    }

    pub fn with_data_source(mut self, exchange: impl Into<String>) -> Self {
        self.data_source_exchange = exchange.into();
        self
    }

    /// `<base>/<resource>_<exchange without underscores>.json`
    pub fn feed_url(&self) -> String {
        let exchange = self.data_source_exchange.trim();
        let exchange = if exchange.is_empty() {
            DEFAULT_DATA_SOURCE.to_string()
        } else {
            exchange.replace('_', "")
        };
        format!(
            "{}/{}_{}.json",
            self.url.trim_end_matches('/'),
            self.resource,
            exchange
        )
    }
}

/// One tradeable asset from the feed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SymbolRecord {
    pub symbol: String,
    /// Smallest order quantity; zero when the feed omits it
    pub min_qty: Decimal,
    /// Price in quote currency; infinite when the feed omits it
    pub usd_price: f64,
}

#[derive(Debug, Deserialize)]
struct RawAsset {
    #[serde(rename = "Asset", default)]
    asset: Option<String>,
    #[serde(rename = "Min qty", default)]
    min_qty: Option<Decimal>,
    #[serde(rename = "Price", default)]
    price: Option<f64>,
}

impl SymbolRecord {
    pub fn new(symbol: impl Into<String>, min_qty: Decimal, usd_price: f64) -> Self {
        Self {
            symbol: symbol.into(),
            min_qty,
            usd_price,
        }
    }

    /// Build a record from one feed entry. Entries that are not objects or
    /// carry no asset name yield `None`.
    pub fn from_value(value: &Value) -> Option<Self> {
        let raw: RawAsset = match serde_json::from_value(value.clone()) {
            Ok(raw) => raw,
            Err(e) => {
                debug!("Skipping malformed feed entry {}: {}", value, e);
                return None;
            }
        };

        let symbol = raw.asset.filter(|s| !s.trim().is_empty())?;
        let usd_price = raw.price.filter(|p| !p.is_nan()).unwrap_or(f64::INFINITY);

        Some(Self {
            symbol,
            min_qty: raw.min_qty.unwrap_or(Decimal::ZERO),
            usd_price,
        })
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Parse a feed body into records, rejecting anything but an array
pub fn parse_feed(body: &Value) -> Result<Vec<SymbolRecord>, RefreshError> {
    let Value::Array(entries) = body else {
        return Err(RefreshError::Shape(json_type(body)));
    };
    Ok(entries.iter().filter_map(SymbolRecord::from_value).collect())
}
