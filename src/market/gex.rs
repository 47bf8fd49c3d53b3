//! Dealer gamma-exposure snapshot

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Dealer positioning state for one symbol.
///
/// Shared read-only (behind an `Arc`) by the dealer gate and the acceleration
/// classifier within a scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GammaExposureSnapshot {
    pub symbol: String,
    /// Net dealer gamma exposure in dollars per 1% move
    pub net_gex: f64,
    #[serde(default)]
    pub call_gex: f64,
    #[serde(default)]
    pub put_gex: f64,
    /// Price where dealer gamma changes sign
    #[serde(default)]
    pub flip_level: Option<f64>,
    #[serde(default)]
    pub put_wall: Option<f64>,
    #[serde(default)]
    pub call_wall: Option<f64>,
    /// Dealer delta exposure in dollars
    #[serde(default)]
    pub dealer_delta: f64,
    /// Net options-market delta (customer side) in dollars
    #[serde(default)]
    pub net_delta: f64,
    pub timestamp: DateTime<Utc>,
}

impl GammaExposureSnapshot {
    /// Neutral snapshot used when the vendor call fails
    pub fn neutral(symbol: &str, at: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.to_string(),
            net_gex: 0.0,
            call_gex: 0.0,
            put_gex: 0.0,
            flip_level: None,
            put_wall: None,
            call_wall: None,
            dealer_delta: 0.0,
            net_delta: 0.0,
            timestamp: at,
        }
    }

    pub fn is_short_gamma(&self) -> bool {
        self.net_gex < 0.0
    }

    /// Spot below the gamma flip level
    pub fn is_below_flip(&self, spot: f64) -> bool {
        self.flip_level.map_or(false, |flip| spot < flip)
    }

    /// Distance from spot to flip level as a fraction of spot
    pub fn flip_distance_pct(&self, spot: f64) -> Option<f64> {
        if spot <= 0.0 {
            return None;
        }
        self.flip_level.map(|flip| (spot - flip).abs() / spot)
    }
}
