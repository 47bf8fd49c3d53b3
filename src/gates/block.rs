//! Typed block reasons
//!
//! A block is not an error. It is a first-class outcome surfaced on the
//! candidate, and any block forces the composite score to zero.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a candidate (or the whole market) is not tradeable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlockReason {
    // === Market regime ===
    /// Aggregate dealer gamma is strongly positive
    PositiveGammaRegime,
    /// Every benchmark trades above VWAP
    BenchmarksPinned,
    /// Month-start, month-end or quarter-end passive inflow window
    PassiveInflowWindow,
    /// No benchmark trades below VWAP
    NoBenchmarkWeakness,
    /// Volatility index collapsing on the day
    VolatilityCollapse,
    /// Market regime is scannable but not tradeable
    MarketRegime,

    // === Dealer positioning ===
    /// Price is sitting on a defended put wall
    PutWallSupport,
    /// Symbol-level dealer gamma above its neutral threshold
    DealerGammaPositive,
    /// Pinned next to the gamma flip while gamma is positive
    NearGammaFlip,

    // === Catalyst ===
    /// Earnings too close without a front-run setup
    EarningsProximity,
    /// Hard to borrow with elevated short interest
    HardToBorrowSqueezeRisk,

    // === Timing ===
    /// Only the overextension archetype fired
    SnapbackOnly,
    /// The move is already under way
    LateEntry,
    /// Implied volatility already spiking from a high rank
    IvUnreasonable,
    /// Not enough weakness to confirm a window
    WindowUnconfirmed,

    // === Volatility ===
    /// IV rank above the tradeable ceiling
    VolatilityRegimeReject,

    // === Data ===
    /// Upstream data failed or timed out
    DataUnavailable,
}

impl BlockReason {
    /// Stable kebab-case tag
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockReason::PositiveGammaRegime => "positive-gamma-regime",
            BlockReason::BenchmarksPinned => "benchmarks-pinned",
            BlockReason::PassiveInflowWindow => "passive-inflow-window",
            BlockReason::NoBenchmarkWeakness => "no-benchmark-weakness",
            BlockReason::VolatilityCollapse => "volatility-collapse",
            BlockReason::MarketRegime => "market-regime",
            BlockReason::PutWallSupport => "put-wall-support",
            BlockReason::DealerGammaPositive => "dealer-gamma-positive",
            BlockReason::NearGammaFlip => "near-gamma-flip",
            BlockReason::EarningsProximity => "earnings-proximity",
            BlockReason::HardToBorrowSqueezeRisk => "hard-to-borrow-squeeze-risk",
            BlockReason::SnapbackOnly => "snapback-only",
            BlockReason::LateEntry => "late-entry",
            BlockReason::IvUnreasonable => "iv-unreasonable",
            BlockReason::WindowUnconfirmed => "window-unconfirmed",
            BlockReason::VolatilityRegimeReject => "volatility-regime-reject",
            BlockReason::DataUnavailable => "data-unavailable",
        }
    }

    /// Get human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            BlockReason::PositiveGammaRegime => "Dealers long gamma across benchmarks, moves get dampened",
            BlockReason::BenchmarksPinned => "Both benchmarks holding above VWAP",
            BlockReason::PassiveInflowWindow => "Passive inflow window around month or quarter boundary",
            BlockReason::NoBenchmarkWeakness => "No benchmark trading below VWAP",
            BlockReason::VolatilityCollapse => "Volatility index down more than 5% on the day",
            BlockReason::MarketRegime => "Market regime not tradeable",
            BlockReason::PutWallSupport => "Price resting on put-wall support",
            BlockReason::DealerGammaPositive => "Dealer gamma positive for the symbol",
            BlockReason::NearGammaFlip => "Price pinned near the gamma flip level",
            BlockReason::EarningsProximity => "Earnings within 3 days",
            BlockReason::HardToBorrowSqueezeRisk => "Hard to borrow with high short interest",
            BlockReason::SnapbackOnly => "Overextension snapback is the only active archetype",
            BlockReason::LateEntry => "Move already under way",
            BlockReason::IvUnreasonable => "IV rank high and still expanding",
            BlockReason::WindowUnconfirmed => "Acceleration window not confirmed",
            BlockReason::VolatilityRegimeReject => "IV rank above 95",
            BlockReason::DataUnavailable => "Upstream data unavailable",
        }
    }

    /// Blocks raised by the market regime gate
    pub fn is_market_level(&self) -> bool {
        matches!(
            self,
            BlockReason::PositiveGammaRegime
                | BlockReason::BenchmarksPinned
                | BlockReason::PassiveInflowWindow
                | BlockReason::NoBenchmarkWeakness
                | BlockReason::VolatilityCollapse
                | BlockReason::MarketRegime
        )
    }
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append a reason unless already present
pub fn push_unique(reasons: &mut Vec<BlockReason>, reason: BlockReason) {
    if !reasons.contains(&reason) {
        reasons.push(reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serde_tag_matches_as_str() {
        for reason in [
            BlockReason::PassiveInflowWindow,
            BlockReason::HardToBorrowSqueezeRisk,
            BlockReason::SnapbackOnly,
            BlockReason::VolatilityRegimeReject,
        ] {
            let json = serde_json::to_string(&reason).unwrap();
            assert_eq!(json, format!("\"{}\"", reason.as_str()));
            let back: BlockReason = serde_json::from_str(&json).unwrap();
            assert_eq!(back, reason);
        }
    }

    #[test]
    fn test_push_unique() {
        let mut reasons = vec![BlockReason::LateEntry];
        push_unique(&mut reasons, BlockReason::LateEntry);
        push_unique(&mut reasons, BlockReason::PutWallSupport);
        assert_eq!(reasons.len(), 2);
        assert!(!BlockReason::PutWallSupport.is_market_level());
        assert!(BlockReason::BenchmarksPinned.is_market_level());
    }
}
