//! Market Regime Gate - market-wide kill switch
//!
//! Evaluated once per scan before any symbol is looked at. Any hard blocker
//! makes the day non-tradeable. Only an extreme positive-gamma reading stops
//! the scan itself.
//!
//! Hard blockers:
//! - Aggregate benchmark GEX above 1.5x the neutral threshold
//! - Every benchmark above VWAP
//! - Passive inflow window (month start/end, quarter end)
//! - No benchmark below VWAP
//! - Volatility index collapsing

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

use super::block::{push_unique, BlockReason};

/// Regime gate configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeConfig {
    /// Benchmarks whose VWAP position defines market weakness
    #[serde(default = "default_benchmarks")]
    pub benchmarks: Vec<String>,

    /// Volatility index symbol
    #[serde(default = "default_volatility_symbol")]
    pub volatility_symbol: String,

    /// Aggregate benchmark GEX considered neutral (dollars per 1% move)
    #[serde(default = "default_gex_neutral_threshold")]
    pub gex_neutral_threshold: f64,

    /// Blocks trading above this multiple of the neutral threshold
    #[serde(default = "default_positive_gamma_multiple")]
    pub positive_gamma_multiple: f64,

    /// Stops scanning above this multiple of the neutral threshold
    #[serde(default = "default_unscannable_gamma_multiple")]
    pub unscannable_gamma_multiple: f64,

    /// Volatility index 1-day change (%) below which volatility is collapsing
    #[serde(default = "default_volatility_collapse_pct")]
    pub volatility_collapse_pct: f64,
}

fn default_benchmarks() -> Vec<String> {
    vec!["SPY".to_string(), "QQQ".to_string()]
}
fn default_volatility_symbol() -> String {
    "VIX".to_string()
}
fn default_gex_neutral_threshold() -> f64 {
    1_000_000_000.0
}
fn default_positive_gamma_multiple() -> f64 {
    1.5
}
fn default_unscannable_gamma_multiple() -> f64 {
    3.0
}
fn default_volatility_collapse_pct() -> f64 {
    -5.0
}

impl Default for RegimeConfig {
    fn default() -> Self {
        Self {
            benchmarks: default_benchmarks(),
            volatility_symbol: default_volatility_symbol(),
            gex_neutral_threshold: default_gex_neutral_threshold(),
            positive_gamma_multiple: default_positive_gamma_multiple(),
            unscannable_gamma_multiple: default_unscannable_gamma_multiple(),
            volatility_collapse_pct: default_volatility_collapse_pct(),
        }
    }
}

/// Overall market tone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RegimeLabel {
    BearishExpansion,
    BearishNeutral,
    Neutral,
    Pinned,
    BullishNeutral,
    BullishExpansion,
}

impl RegimeLabel {
    pub fn is_bearish(&self) -> bool {
        matches!(self, RegimeLabel::BearishExpansion | RegimeLabel::BearishNeutral)
    }
}

impl fmt::Display for RegimeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RegimeLabel::BearishExpansion => "bearish-expansion",
            RegimeLabel::BearishNeutral => "bearish-neutral",
            RegimeLabel::Neutral => "neutral",
            RegimeLabel::Pinned => "pinned",
            RegimeLabel::BullishNeutral => "bullish-neutral",
            RegimeLabel::BullishExpansion => "bullish-expansion",
        };
        f.write_str(s)
    }
}

/// One benchmark's position relative to its session VWAP
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkPosition {
    pub symbol: String,
    pub price: f64,
    pub vwap: f64,
}

impl BenchmarkPosition {
    pub fn is_below_vwap(&self) -> bool {
        self.price < self.vwap
    }

    pub fn is_above_vwap(&self) -> bool {
        self.price > self.vwap
    }
}

/// Raw inputs for one regime evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct RegimeInputs {
    pub date: NaiveDate,
    pub benchmarks: Vec<BenchmarkPosition>,
    /// GEX summed across the benchmarks
    pub aggregate_gex: f64,
    pub volatility_level: f64,
    /// Volatility index 1-day change in percent
    pub volatility_change_pct: f64,
}

/// Benchmark VWAP flag stored on the snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkState {
    pub symbol: String,
    pub price: f64,
    pub vwap: f64,
    pub below_vwap: bool,
}

/// Result of a regime evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketRegimeSnapshot {
    pub date: NaiveDate,
    pub tradeable: bool,
    pub scannable: bool,
    pub block_reasons: Vec<BlockReason>,
    pub label: RegimeLabel,
    pub benchmarks: Vec<BenchmarkState>,
    pub aggregate_gex: f64,
    pub volatility_level: f64,
    pub volatility_change_pct: f64,
    pub evaluated_at: DateTime<Utc>,
}

impl MarketRegimeSnapshot {
    /// Conservative default used when no regime data can be obtained
    pub fn neutral(date: NaiveDate, at: DateTime<Utc>) -> Self {
        Self {
            date,
            tradeable: false,
            scannable: true,
            block_reasons: vec![BlockReason::MarketRegime],
            label: RegimeLabel::Neutral,
            benchmarks: Vec::new(),
            aggregate_gex: 0.0,
            volatility_level: 0.0,
            volatility_change_pct: 0.0,
            evaluated_at: at,
        }
    }

    pub fn benchmarks_below_vwap(&self) -> usize {
        self.benchmarks.iter().filter(|b| b.below_vwap).count()
    }
}

/// Days in the month containing `date`
pub fn days_in_month(date: NaiveDate) -> u32 {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|first| first.pred_opt())
        .map(|last| last.day())
        .unwrap_or(28)
}

/// Month start/end or quarter-end rebalancing window
pub fn is_passive_inflow_window(date: NaiveDate) -> bool {
    let day = date.day();
    let dim = days_in_month(date);
    let quarter_end = matches!(date.month(), 3 | 6 | 9 | 12);
    day <= 3 || day >= dim - 3 || (quarter_end && day >= dim - 6)
}

/// Market regime gate
pub struct MarketRegimeGate {
    config: RegimeConfig,
}

impl MarketRegimeGate {
    pub fn new(config: RegimeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RegimeConfig {
        &self.config
    }

    /// Pure evaluation of the regime
    pub fn evaluate(&self, inputs: &RegimeInputs, at: DateTime<Utc>) -> MarketRegimeSnapshot {
        let total = inputs.benchmarks.len();
        let below = inputs.benchmarks.iter().filter(|b| b.is_below_vwap()).count();
        let all_above = total > 0 && inputs.benchmarks.iter().all(|b| b.is_above_vwap());
        let threshold = self.config.gex_neutral_threshold;
        let gex = inputs.aggregate_gex;

        let label = Self::label(below, total, gex, inputs.volatility_change_pct);

        let mut reasons = Vec::new();
        if gex > self.config.positive_gamma_multiple * threshold {
            push_unique(&mut reasons, BlockReason::PositiveGammaRegime);
        }
        if all_above {
            push_unique(&mut reasons, BlockReason::BenchmarksPinned);
        }
        if is_passive_inflow_window(inputs.date) {
            push_unique(&mut reasons, BlockReason::PassiveInflowWindow);
        }
        if below == 0 {
            push_unique(&mut reasons, BlockReason::NoBenchmarkWeakness);
        }
        if inputs.volatility_change_pct < self.config.volatility_collapse_pct {
            push_unique(&mut reasons, BlockReason::VolatilityCollapse);
        }

        let tradeable = reasons.is_empty();
        let scannable = gex <= self.config.unscannable_gamma_multiple * threshold;

        if tradeable {
            info!(label = %label, below, gex, "Market regime tradeable");
        } else {
            debug!(label = %label, reasons = ?reasons, "Market regime blocked");
        }

        MarketRegimeSnapshot {
            date: inputs.date,
            tradeable,
            scannable,
            block_reasons: reasons,
            label,
            benchmarks: inputs
                .benchmarks
                .iter()
                .map(|b| BenchmarkState {
                    symbol: b.symbol.clone(),
                    price: b.price,
                    vwap: b.vwap,
                    below_vwap: b.is_below_vwap(),
                })
                .collect(),
            aggregate_gex: gex,
            volatility_level: inputs.volatility_level,
            volatility_change_pct: inputs.volatility_change_pct,
            evaluated_at: at,
        }
    }

    fn label(below: usize, total: usize, gex: f64, vol_change: f64) -> RegimeLabel {
        if total > 0 && below == total {
            if gex < 0.0 && vol_change > 0.0 {
                RegimeLabel::BearishExpansion
            } else {
                RegimeLabel::BearishNeutral
            }
        } else if below > 0 {
            if gex < 0.0 {
                RegimeLabel::BearishNeutral
            } else {
                RegimeLabel::Neutral
            }
        } else if gex > 0.0 {
            if vol_change > 0.0 {
                RegimeLabel::BullishNeutral
            } else {
                RegimeLabel::Pinned
            }
        } else {
            RegimeLabel::BullishExpansion
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bench(symbol: &str, price: f64, vwap: f64) -> BenchmarkPosition {
        BenchmarkPosition {
            symbol: symbol.to_string(),
            price,
            vwap,
        }
    }

    fn bearish_inputs(date: NaiveDate) -> RegimeInputs {
        RegimeInputs {
            date,
            benchmarks: vec![bench("SPY", 500.0, 503.0), bench("QQQ", 430.0, 433.0)],
            aggregate_gex: -2.0e9,
            volatility_level: 22.0,
            volatility_change_pct: 8.0,
        }
    }

    fn mid_month() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 4, 15).unwrap()
    }

    #[test]
    fn test_bearish_day_is_tradeable() {
        let gate = MarketRegimeGate::new(RegimeConfig::default());
        let snap = gate.evaluate(&bearish_inputs(mid_month()), Utc::now());
        assert!(snap.tradeable);
        assert!(snap.scannable);
        assert!(snap.block_reasons.is_empty());
        assert_eq!(snap.label, RegimeLabel::BearishExpansion);
        assert_eq!(snap.benchmarks_below_vwap(), 2);
    }

    #[test]
    fn test_second_of_month_blocks_regardless() {
        let gate = MarketRegimeGate::new(RegimeConfig::default());
        let date = NaiveDate::from_ymd_opt(2025, 4, 2).unwrap();
        let snap = gate.evaluate(&bearish_inputs(date), Utc::now());
        assert!(!snap.tradeable);
        assert_eq!(snap.block_reasons, vec![BlockReason::PassiveInflowWindow]);
    }

    #[test]
    fn test_passive_inflow_calendar() {
        let d = |m, day| NaiveDate::from_ymd_opt(2025, m, day).unwrap();
        assert!(is_passive_inflow_window(d(4, 1)));
        assert!(is_passive_inflow_window(d(4, 3)));
        assert!(!is_passive_inflow_window(d(4, 4)));
        assert!(!is_passive_inflow_window(d(4, 26)));
        assert!(is_passive_inflow_window(d(4, 27)));
        // Quarter-end month widens the tail
        assert!(is_passive_inflow_window(d(3, 25)));
        assert!(!is_passive_inflow_window(d(3, 24)));
        assert!(is_passive_inflow_window(d(2, 25)));
        assert_eq!(days_in_month(d(12, 10)), 31);
        assert_eq!(days_in_month(NaiveDate::from_ymd_opt(2024, 2, 10).unwrap()), 29);
    }

    #[test]
    fn test_pinned_benchmarks() {
        let gate = MarketRegimeGate::new(RegimeConfig::default());
        let mut inputs = bearish_inputs(mid_month());
        inputs.benchmarks = vec![bench("SPY", 505.0, 503.0), bench("QQQ", 435.0, 433.0)];
        inputs.aggregate_gex = 5.0e8;
        inputs.volatility_change_pct = -1.0;
        let snap = gate.evaluate(&inputs, Utc::now());
        assert!(!snap.tradeable);
        assert_eq!(snap.label, RegimeLabel::Pinned);
        assert!(snap.block_reasons.contains(&BlockReason::BenchmarksPinned));
        assert!(snap.block_reasons.contains(&BlockReason::NoBenchmarkWeakness));
    }

    #[test]
    fn test_positive_gamma_and_scannable() {
        let gate = MarketRegimeGate::new(RegimeConfig::default());
        let mut inputs = bearish_inputs(mid_month());
        inputs.aggregate_gex = 2.0e9;
        let snap = gate.evaluate(&inputs, Utc::now());
        assert!(!snap.tradeable);
        assert!(snap.scannable);
        assert_eq!(snap.block_reasons, vec![BlockReason::PositiveGammaRegime]);

        inputs.aggregate_gex = 3.5e9;
        let snap = gate.evaluate(&inputs, Utc::now());
        assert!(!snap.scannable);
    }

    #[test]
    fn test_volatility_collapse_blocks() {
        let gate = MarketRegimeGate::new(RegimeConfig::default());
        let mut inputs = bearish_inputs(mid_month());
        inputs.volatility_change_pct = -6.0;
        let snap = gate.evaluate(&inputs, Utc::now());
        assert_eq!(snap.block_reasons, vec![BlockReason::VolatilityCollapse]);
        assert_eq!(snap.label, RegimeLabel::BearishNeutral);
    }

    #[test]
    fn test_label_table() {
        use RegimeLabel::*;
        assert_eq!(MarketRegimeGate::label(1, 2, -1.0, -3.0), BearishNeutral);
        assert_eq!(MarketRegimeGate::label(1, 2, 1.0, 3.0), Neutral);
        assert_eq!(MarketRegimeGate::label(0, 2, 1.0, 3.0), BullishNeutral);
        assert_eq!(MarketRegimeGate::label(0, 2, 0.0, 3.0), BullishExpansion);
        assert_eq!(MarketRegimeGate::label(2, 2, 1.0, 3.0), BearishNeutral);
    }
}
