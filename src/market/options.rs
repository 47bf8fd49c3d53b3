//! Options contracts, greeks and implied-volatility snapshots

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionType {
    Put,
    Call,
}

impl fmt::Display for OptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionType::Put => write!(f, "P"),
            OptionType::Call => write!(f, "C"),
        }
    }
}

/// Option sensitivities as reported by the chain vendor
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Greeks {
    pub delta: f64,
    pub gamma: f64,
    pub theta: f64,
    pub vega: f64,
    /// Implied volatility as a decimal (0.35 = 35%)
    #[serde(default)]
    pub iv: Option<f64>,
}

/// One tradable put or call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionsContract {
    /// OCC-style contract symbol
    pub symbol: String,
    pub underlying: String,
    pub option_type: OptionType,
    pub strike: f64,
    pub expiration: NaiveDate,
    pub bid: f64,
    pub ask: f64,
    #[serde(default)]
    pub last: f64,
    pub open_interest: u64,
    pub volume: u64,
    #[serde(default)]
    pub greeks: Greeks,
    pub days_to_expiry: i64,
}

impl OptionsContract {
    pub fn mid(&self) -> f64 {
        if self.bid > 0.0 && self.ask > 0.0 {
            (self.bid + self.ask) / 2.0
        } else if self.ask > 0.0 {
            self.ask / 2.0
        } else {
            self.last
        }
    }

    pub fn spread(&self) -> f64 {
        (self.ask - self.bid).max(0.0)
    }

    /// Bid-ask spread as a fraction of mid (0.10 = 10%)
    pub fn spread_pct(&self) -> f64 {
        let mid = self.mid();
        if mid <= 0.0 {
            return f64::INFINITY;
        }
        self.spread() / mid
    }

    /// Strictly out of the money for the given spot
    pub fn is_otm(&self, spot: f64) -> bool {
        match self.option_type {
            OptionType::Put => self.strike < spot,
            OptionType::Call => self.strike > spot,
        }
    }

    pub fn abs_delta(&self) -> f64 {
        self.greeks.delta.abs()
    }

    /// Daily volume relative to open interest
    pub fn volume_oi_ratio(&self) -> f64 {
        if self.open_interest == 0 {
            return if self.volume > 0 { f64::INFINITY } else { 0.0 };
        }
        self.volume as f64 / self.open_interest as f64
    }
}

/// Implied volatility state for an underlying
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IvSnapshot {
    /// Current ATM implied volatility (decimal)
    pub current_iv: f64,
    /// 52-week IV high, when the vendor keeps history
    #[serde(default)]
    pub iv_high_52w: Option<f64>,
    /// 52-week IV low, when the vendor keeps history
    #[serde(default)]
    pub iv_low_52w: Option<f64>,
    /// Vendor IV rank (0-100), when supplied directly
    #[serde(default)]
    pub iv_rank: Option<f64>,
    /// Same-session IV change in percent (relative)
    #[serde(default)]
    pub iv_change_pct: f64,
}

impl IvSnapshot {
    /// IV rank from the 52-week range, falling back to the vendor rank
    pub fn rank(&self) -> Option<f64> {
        match (self.iv_high_52w, self.iv_low_52w) {
            (Some(high), Some(low)) if high > low => {
                Some(((self.current_iv - low) / (high - low) * 100.0).clamp(0.0, 100.0))
            }
            _ => self.iv_rank,
        }
    }

    pub fn is_expanding(&self) -> bool {
        self.iv_change_pct > 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contract(bid: f64, ask: f64) -> OptionsContract {
        OptionsContract {
            symbol: "XYZ250117P00045000".to_string(),
            underlying: "XYZ".to_string(),
            option_type: OptionType::Put,
            strike: 45.0,
            expiration: NaiveDate::from_ymd_opt(2025, 1, 17).unwrap(),
            bid,
            ask,
            last: 0.0,
            open_interest: 200,
            volume: 50,
            greeks: Greeks::default(),
            days_to_expiry: 10,
        }
    }

    #[test]
    fn test_mid_and_spread() {
        let c = contract(1.0, 1.2);
        assert!((c.mid() - 1.1).abs() < 1e-9);
        assert!((c.spread_pct() - 0.2 / 1.1).abs() < 1e-9);
        assert!(c.is_otm(50.0));
        assert!(!c.is_otm(45.0));
    }

    #[test]
    fn test_zero_mid_spread_is_infinite() {
        let c = contract(0.0, 0.0);
        assert!(c.spread_pct().is_infinite());
    }

    #[test]
    fn test_iv_rank_from_range() {
        let iv = IvSnapshot {
            current_iv: 0.40,
            iv_high_52w: Some(0.60),
            iv_low_52w: Some(0.20),
            iv_rank: Some(10.0),
            iv_change_pct: 0.0,
        };
        assert!((iv.rank().unwrap() - 50.0).abs() < 1e-9);

        let vendor_only = IvSnapshot {
            iv_rank: Some(72.0),
            ..Default::default()
        };
        assert_eq!(vendor_only.rank(), Some(72.0));
    }
}
