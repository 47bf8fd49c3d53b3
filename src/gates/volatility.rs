//! Volatility-Regime Structure Gate
//!
//! Chooses the trade structure and size multiplier from where implied
//! volatility sits in its own history. Expensive premium shrinks the position
//! or moves it into a spread. Extreme premium rejects the trade.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::market::indicators::realized_volatility;
use crate::market::{EarlyWarningLevel, IvSnapshot};

/// Volatility gate configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolatilityConfig {
    /// Upper bound of the optimal band
    #[serde(default = "default_optimal_max")]
    pub optimal_max: f64,
    /// Upper bound of the elevated band
    #[serde(default = "default_elevated_max")]
    pub elevated_max: f64,
    /// Upper bound of the extreme band; above this the trade is rejected
    #[serde(default = "default_extreme_max")]
    pub extreme_max: f64,
    /// Rank above which an `Act` early warning forces a spread
    #[serde(default = "default_coupling_rank")]
    pub coupling_rank: f64,
    /// Realized-vol window for the proxy rank
    #[serde(default = "default_realized_window")]
    pub realized_window: usize,
}

fn default_optimal_max() -> f64 {
    60.0
}
fn default_elevated_max() -> f64 {
    80.0
}
fn default_extreme_max() -> f64 {
    95.0
}
fn default_coupling_rank() -> f64 {
    85.0
}
fn default_realized_window() -> usize {
    20
}

impl Default for VolatilityConfig {
    fn default() -> Self {
        Self {
            optimal_max: default_optimal_max(),
            elevated_max: default_elevated_max(),
            extreme_max: default_extreme_max(),
            coupling_rank: default_coupling_rank(),
            realized_window: default_realized_window(),
        }
    }
}

/// Where the rank came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankSource {
    /// 52-week implied-volatility range or vendor rank
    Implied,
    /// Realized volatility ranked within its trailing year
    RealizedProxy,
    Unavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolatilityRegime {
    Optimal,
    Elevated,
    Extreme,
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeStructure {
    LongPut,
    BearPutSpread,
    NoTrade,
}

/// Structure decision for one candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolatilityDecision {
    pub iv_rank: Option<f64>,
    pub rank_source: RankSource,
    pub regime: VolatilityRegime,
    pub structure: TradeStructure,
    pub size_multiplier: f64,
    /// Days added to the expiry window
    pub dte_adjustment: i64,
    /// Early-warning coupling overrode the table
    pub coupled: bool,
}

impl VolatilityDecision {
    pub fn is_rejected(&self) -> bool {
        self.regime == VolatilityRegime::Reject && self.structure == TradeStructure::NoTrade
    }
}

/// Volatility-regime gate
pub struct VolatilityGate {
    config: VolatilityConfig,
}

impl VolatilityGate {
    pub fn new(config: VolatilityConfig) -> Self {
        Self { config }
    }

    /// Rank 0-100 from IV history, falling back to a realized-vol proxy
    pub fn rank(&self, iv: Option<&IvSnapshot>, daily_closes: &[f64]) -> (Option<f64>, RankSource) {
        if let Some(rank) = iv.and_then(|iv| iv.rank()) {
            return (Some(rank), RankSource::Implied);
        }
        match self.realized_rank(daily_closes) {
            Some(rank) => (Some(rank), RankSource::RealizedProxy),
            None => (None, RankSource::Unavailable),
        }
    }

    /// Current realized vol ranked within the rolling series over the closes
    fn realized_rank(&self, closes: &[f64]) -> Option<f64> {
        let window = self.config.realized_window;
        if closes.len() < window * 2 {
            return None;
        }
        let series: Vec<f64> = (window + 1..=closes.len())
            .filter_map(|end| realized_volatility(&closes[..end], window))
            .collect();
        let current = *series.last()?;
        let low = series.iter().copied().fold(f64::INFINITY, f64::min);
        let high = series.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if high <= low {
            return Some(50.0);
        }
        Some(((current - low) / (high - low) * 100.0).clamp(0.0, 100.0))
    }

    pub fn evaluate(
        &self,
        iv: Option<&IvSnapshot>,
        daily_closes: &[f64],
        early_warning: EarlyWarningLevel,
    ) -> VolatilityDecision {
        let (rank, source) = self.rank(iv, daily_closes);
        let c = &self.config;

        // Unknown rank is sized as elevated
        let effective = rank.unwrap_or(c.optimal_max);
        let (regime, structure, size_multiplier, dte_adjustment) = if effective < c.optimal_max {
            (VolatilityRegime::Optimal, TradeStructure::LongPut, 1.0, 0)
        } else if effective < c.elevated_max {
            (VolatilityRegime::Elevated, TradeStructure::LongPut, 0.6, 5)
        } else if effective <= c.extreme_max {
            (VolatilityRegime::Extreme, TradeStructure::BearPutSpread, 0.3, 7)
        } else {
            (VolatilityRegime::Reject, TradeStructure::NoTrade, 0.0, 0)
        };

        let coupled = early_warning == EarlyWarningLevel::Act && effective > c.coupling_rank;
        let decision = if coupled {
            VolatilityDecision {
                iv_rank: rank,
                rank_source: source,
                regime,
                structure: TradeStructure::BearPutSpread,
                size_multiplier: 0.3,
                dte_adjustment: 7,
                coupled: true,
            }
        } else {
            VolatilityDecision {
                iv_rank: rank,
                rank_source: source,
                regime,
                structure,
                size_multiplier,
                dte_adjustment,
                coupled: false,
            }
        };

        debug!(
            rank = ?decision.iv_rank,
            regime = ?decision.regime,
            structure = ?decision.structure,
            "Volatility gate evaluated"
        );
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iv_rank(rank: f64) -> IvSnapshot {
        IvSnapshot {
            current_iv: 0.5,
            iv_rank: Some(rank),
            ..Default::default()
        }
    }

    fn gate() -> VolatilityGate {
        VolatilityGate::new(VolatilityConfig::default())
    }

    #[test]
    fn test_band_table() {
        let d = gate().evaluate(Some(&iv_rank(40.0)), &[], EarlyWarningLevel::None);
        assert_eq!(d.structure, TradeStructure::LongPut);
        assert_eq!(d.size_multiplier, 1.0);

        let d = gate().evaluate(Some(&iv_rank(70.0)), &[], EarlyWarningLevel::None);
        assert_eq!(d.regime, VolatilityRegime::Elevated);
        assert_eq!((d.size_multiplier, d.dte_adjustment), (0.6, 5));

        let d = gate().evaluate(Some(&iv_rank(90.0)), &[], EarlyWarningLevel::Watch);
        assert_eq!(d.structure, TradeStructure::BearPutSpread);
        assert_eq!((d.size_multiplier, d.dte_adjustment), (0.3, 7));

        let d = gate().evaluate(Some(&iv_rank(97.0)), &[], EarlyWarningLevel::None);
        assert!(d.is_rejected());
    }

    #[test]
    fn test_act_warning_forces_spread() {
        let d = gate().evaluate(Some(&iv_rank(90.0)), &[], EarlyWarningLevel::Act);
        assert!(d.coupled);
        assert_eq!(d.structure, TradeStructure::BearPutSpread);
        assert_eq!(d.size_multiplier, 0.3);

        // Coupling also overrides the reject band
        let d = gate().evaluate(Some(&iv_rank(97.0)), &[], EarlyWarningLevel::Act);
        assert!(!d.is_rejected());
        assert_eq!(d.structure, TradeStructure::BearPutSpread);

        // Not above the coupling rank
        let d = gate().evaluate(Some(&iv_rank(84.0)), &[], EarlyWarningLevel::Act);
        assert!(!d.coupled);
    }

    #[test]
    fn test_realized_proxy_when_no_iv_history() {
        // Calm year, then a volatile final stretch
        let mut closes: Vec<f64> = (0..200).map(|i| 100.0 + (i % 2) as f64 * 0.1).collect();
        for i in 0..20 {
            closes.push(if i % 2 == 0 { 108.0 } else { 96.0 });
        }
        let (rank, source) = gate().rank(None, &closes);
        assert_eq!(source, RankSource::RealizedProxy);
        assert!(rank.unwrap() > 95.0);

        let (rank, source) = gate().rank(None, &closes[..10]);
        assert_eq!((rank, source), (None, RankSource::Unavailable));
    }

    #[test]
    fn test_unknown_rank_sized_as_elevated() {
        let d = gate().evaluate(None, &[], EarlyWarningLevel::None);
        assert_eq!(d.rank_source, RankSource::Unavailable);
        assert_eq!(d.regime, VolatilityRegime::Elevated);
    }
}
