//! Options flow, dark-pool prints and positioning snapshots

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::options::OptionType;

/// Where an options trade printed relative to the quote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeSide {
    Bid,
    Ask,
    Mid,
}

/// Vendor sentiment tag on a flow event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowSentiment {
    Bullish,
    Bearish,
    Neutral,
}

/// One reported options trade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionsFlowEvent {
    pub underlying: String,
    pub option_type: OptionType,
    pub strike: f64,
    pub expiration: NaiveDate,
    pub side: TradeSide,
    /// Total premium in dollars
    pub premium: f64,
    /// Contracts traded
    pub size: u64,
    /// Underlying price at the time of the trade
    #[serde(default)]
    pub underlying_price: f64,
    #[serde(default)]
    pub delta: f64,
    #[serde(default)]
    pub gamma: f64,
    #[serde(default)]
    pub vega: f64,
    pub sentiment: FlowSentiment,
    #[serde(default)]
    pub is_sweep: bool,
    #[serde(default)]
    pub is_block: bool,
    pub timestamp: DateTime<Utc>,
}

impl OptionsFlowEvent {
    /// Put bought at the ask or call sold at the bid
    pub fn is_bearish_aggression(&self) -> bool {
        matches!(
            (self.option_type, self.side),
            (OptionType::Put, TradeSide::Ask) | (OptionType::Call, TradeSide::Bid)
        )
    }
}

/// Inferred aggressor of an off-exchange print
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrintDirection {
    Buy,
    Sell,
    Unknown,
}

/// One off-exchange (dark pool) print
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DarkPoolPrint {
    pub symbol: String,
    pub price: f64,
    /// Shares
    pub size: f64,
    pub direction: PrintDirection,
    /// Quoted bid depth (shares) at the time of the print
    #[serde(default)]
    pub bid_depth: f64,
    /// Quoted ask depth (shares) at the time of the print
    #[serde(default)]
    pub ask_depth: f64,
    pub timestamp: DateTime<Utc>,
}

impl DarkPoolPrint {
    /// Print size dwarfs the displayed book on either side
    pub fn is_violent(&self, depth_multiple: f64) -> bool {
        (self.bid_depth > 0.0 && self.size > depth_multiple * self.bid_depth)
            || (self.ask_depth > 0.0 && self.size > depth_multiple * self.ask_depth)
    }
}

/// Open-interest and volume changes for a symbol's options
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptionsActivity {
    /// Day-over-day put open-interest change in percent
    pub put_oi_change_pct: f64,
    /// Day-over-day call open-interest change in percent
    #[serde(default)]
    pub call_oi_change_pct: f64,
    /// Put contracts traded this session
    #[serde(default)]
    pub put_volume: f64,
    /// Trailing average daily put volume
    #[serde(default)]
    pub avg_put_volume: f64,
}

impl OptionsActivity {
    /// Put volume relative to its trailing average
    pub fn put_volume_ratio(&self) -> f64 {
        if self.avg_put_volume <= 0.0 {
            return 0.0;
        }
        self.put_volume / self.avg_put_volume
    }
}

/// Volatility skew today versus the prior session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SkewSnapshot {
    /// 25-delta put IV minus ATM IV, in vol points
    pub put_skew: f64,
    pub put_skew_prev: f64,
    /// 25-delta call IV minus 25-delta put IV, in vol points
    pub risk_reversal: f64,
    pub risk_reversal_prev: f64,
}

impl SkewSnapshot {
    pub fn skew_change(&self) -> f64 {
        self.put_skew - self.put_skew_prev
    }

    /// Risk reversal flipped from call-bid to put-bid since yesterday
    pub fn risk_reversal_flipped_bearish(&self) -> bool {
        self.risk_reversal_prev >= 0.0 && self.risk_reversal < 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_violent_print() {
        let print = DarkPoolPrint {
            symbol: "XYZ".to_string(),
            price: 10.0,
            size: 60_000.0,
            direction: PrintDirection::Sell,
            bid_depth: 10_000.0,
            ask_depth: 20_000.0,
            timestamp: Utc::now(),
        };
        assert!(print.is_violent(5.0));

        let calm = DarkPoolPrint {
            bid_depth: 15_000.0,
            ..print
        };
        assert!(!calm.is_violent(5.0));
    }

    #[test]
    fn test_risk_reversal_flip() {
        let skew = SkewSnapshot {
            put_skew: 4.0,
            put_skew_prev: 3.5,
            risk_reversal: -0.4,
            risk_reversal_prev: 0.2,
        };
        assert!(skew.risk_reversal_flipped_bearish());
        assert!((skew.skew_change() - 0.5).abs() < 1e-9);
    }
}
