//! Price-tiered strike targeting
//!
//! Cheap names target a percentage distance below spot, expensive names a
//! dollar distance. When ATR(14) is known it overrides the static table with
//! `multiple * ATR` and a ±30% band.

use serde::{Deserialize, Serialize};

/// Static distance below spot
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrikeDistance {
    /// Fractions of spot (0.07 = 7%)
    Percent { min: f64, max: f64 },
    /// Dollars below spot
    Dollars { min: f64, max: f64 },
}

impl StrikeDistance {
    /// (nearest, farthest) distance in dollars
    pub fn dollars(&self, spot: f64) -> (f64, f64) {
        match *self {
            StrikeDistance::Percent { min, max } => (spot * min, spot * max),
            StrikeDistance::Dollars { min, max } => (min, max),
        }
    }
}

/// One row of the strike table
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceTier {
    pub distance: StrikeDistance,
    pub atr_multiple: f64,
    pub delta_min: f64,
    pub delta_max: f64,
}

impl PriceTier {
    /// Ideal |delta| for ranking
    pub fn delta_sweet_spot(&self) -> f64 {
        (self.delta_min + self.delta_max) / 2.0
    }

    pub fn delta_in_range(&self, abs_delta: f64) -> bool {
        abs_delta >= self.delta_min && abs_delta <= self.delta_max
    }
}

/// Strike table row for a spot price
pub fn tier_for(spot: f64) -> PriceTier {
    let (distance, atr_multiple, delta_min, delta_max) = if spot < 30.0 {
        (StrikeDistance::Percent { min: 0.10, max: 0.16 }, 2.0, 0.20, 0.30)
    } else if spot < 100.0 {
        (StrikeDistance::Percent { min: 0.07, max: 0.12 }, 1.8, 0.22, 0.32)
    } else if spot < 300.0 {
        (StrikeDistance::Percent { min: 0.05, max: 0.09 }, 1.6, 0.25, 0.35)
    } else if spot < 600.0 {
        (StrikeDistance::Dollars { min: 15.0, max: 35.0 }, 1.5, 0.28, 0.38)
    } else if spot < 1200.0 {
        (StrikeDistance::Dollars { min: 25.0, max: 60.0 }, 1.3, 0.30, 0.40)
    } else {
        (StrikeDistance::Dollars { min: 40.0, max: 90.0 }, 1.2, 0.30, 0.40)
    };
    PriceTier {
        distance,
        atr_multiple,
        delta_min,
        delta_max,
    }
}

/// How a band was derived
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BandMode {
    Static,
    Atr,
}

/// Acceptable strikes, as an open interval
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrikeBand {
    pub lower: f64,
    pub upper: f64,
    pub mode: BandMode,
}

impl StrikeBand {
    pub fn contains(&self, strike: f64) -> bool {
        strike > self.lower && strike < self.upper
    }

    pub fn target(&self) -> f64 {
        (self.lower + self.upper) / 2.0
    }
}

/// Band fraction applied around the ATR distance
pub const ATR_BAND: f64 = 0.30;

/// Strike band below spot for a tier, ATR-adaptive when ATR is available
pub fn strike_band(spot: f64, atr: Option<f64>) -> StrikeBand {
    let tier = tier_for(spot);
    match atr.filter(|a| a.is_finite() && *a > 0.0) {
        Some(atr) => {
            let distance = tier.atr_multiple * atr;
            StrikeBand {
                lower: spot - distance * (1.0 + ATR_BAND),
                upper: spot - distance * (1.0 - ATR_BAND),
                mode: BandMode::Atr,
            }
        }
        None => {
            let (near, far) = tier.distance.dollars(spot);
            StrikeBand {
                lower: spot - far,
                upper: spot - near,
                mode: BandMode::Static,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifty_dollar_static_band() {
        let band = strike_band(50.0, None);
        assert_eq!(band.mode, BandMode::Static);
        assert!((band.lower - 44.0).abs() < 1e-9);
        assert!((band.upper - 46.5).abs() < 1e-9);
        assert!(band.contains(45.0));
        assert!(!band.contains(46.5));
        assert!(!band.contains(44.0));
    }

    #[test]
    fn test_expensive_name_uses_dollar_distance() {
        let band = strike_band(1500.0, None);
        assert!((band.lower - 1410.0).abs() < 1e-9);
        assert!((band.upper - 1460.0).abs() < 1e-9);
        assert!(band.contains(1435.0));
    }

    #[test]
    fn test_atr_band() {
        // $200 name, ATR 5 -> distance 8, band (189.6, 194.4)
        let band = strike_band(200.0, Some(5.0));
        assert_eq!(band.mode, BandMode::Atr);
        assert!((band.lower - 189.6).abs() < 1e-9);
        assert!((band.upper - 194.4).abs() < 1e-9);
        assert_eq!(strike_band(200.0, Some(0.0)).mode, BandMode::Static);
    }

    #[test]
    fn test_tier_boundaries() {
        assert_eq!(tier_for(29.99).atr_multiple, 2.0);
        assert_eq!(tier_for(30.0).atr_multiple, 1.8);
        assert_eq!(tier_for(300.0).atr_multiple, 1.5);
        assert_eq!(tier_for(1200.0).atr_multiple, 1.2);
        assert!((tier_for(50.0).delta_sweet_spot() - 0.27).abs() < 1e-9);
    }
}
