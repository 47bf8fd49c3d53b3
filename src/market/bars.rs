//! Price bars and quotes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One OHLCV interval (daily or one-minute)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    /// Vendor-supplied VWAP for the interval, when available
    #[serde(default)]
    pub vwap: Option<f64>,
}

impl PriceBar {
    pub fn new(
        timestamp: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
            vwap: None,
        }
    }

    /// Close below open
    pub fn is_red(&self) -> bool {
        self.close < self.open
    }

    /// Typical price used for VWAP accumulation when no vendor VWAP is supplied
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }

    /// High-low range as a percentage of close (spread-widening proxy)
    pub fn range_pct(&self) -> f64 {
        if self.close <= 0.0 {
            return 0.0;
        }
        (self.high - self.low) / self.close * 100.0
    }

    /// Percent change from open to close
    pub fn change_pct(&self) -> f64 {
        if self.open <= 0.0 {
            return 0.0;
        }
        (self.close - self.open) / self.open * 100.0
    }
}

/// Latest top-of-book quote
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub bid: f64,
    pub ask: f64,
    /// Bid size in shares
    pub bid_size: f64,
    /// Ask size in shares
    pub ask_size: f64,
    pub last: f64,
    pub timestamp: DateTime<Utc>,
}

impl Quote {
    pub fn mid(&self) -> f64 {
        if self.bid > 0.0 && self.ask > 0.0 {
            (self.bid + self.ask) / 2.0
        } else {
            self.last
        }
    }
}
