//! Dealer-Positioning Gate
//!
//! Overrides every analysis engine. A defended put wall or long dealer gamma
//! means hedging flows will absorb the move, so the symbol is blocked no matter
//! how good the distribution picture looks.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::block::{push_unique, BlockReason};
use crate::market::{GammaExposureSnapshot, IvSnapshot, OptionType, OptionsContract, PriceBar};

/// Dealer gate configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DealerConfig {
    /// Symbol GEX considered neutral (dollars per 1% move)
    #[serde(default = "default_gex_neutral_threshold")]
    pub gex_neutral_threshold: f64,

    /// Per-symbol overrides of the neutral threshold
    #[serde(default)]
    pub gex_thresholds: HashMap<String, f64>,

    /// Walls further than this fraction below spot are ignored
    #[serde(default = "default_wall_max_distance")]
    pub wall_max_distance: f64,

    /// Wall proximity signal (fraction of spot)
    #[serde(default = "default_wall_proximity")]
    pub wall_proximity: f64,

    /// Share of chain put OI at one strike that counts as concentrated
    #[serde(default = "default_oi_concentration")]
    pub oi_concentration: f64,

    /// Bounces off the wall in the lookback that count as defended
    #[serde(default = "default_min_bounces")]
    pub min_bounces: u32,

    #[serde(default = "default_bounce_lookback_days")]
    pub bounce_lookback_days: usize,

    /// IV rank below which a flat/falling IV corroborates the wall
    #[serde(default = "default_iv_rank_ceiling")]
    pub iv_rank_ceiling: f64,

    /// Distance to the flip level that counts as pinned (fraction of spot)
    #[serde(default = "default_flip_proximity")]
    pub flip_proximity: f64,
}

fn default_gex_neutral_threshold() -> f64 {
    50_000_000.0
}
fn default_wall_max_distance() -> f64 {
    0.05
}
fn default_wall_proximity() -> f64 {
    0.02
}
fn default_oi_concentration() -> f64 {
    0.15
}
fn default_min_bounces() -> u32 {
    3
}
fn default_bounce_lookback_days() -> usize {
    30
}
fn default_iv_rank_ceiling() -> f64 {
    50.0
}
fn default_flip_proximity() -> f64 {
    0.01
}

impl Default for DealerConfig {
    fn default() -> Self {
        Self {
            gex_neutral_threshold: default_gex_neutral_threshold(),
            gex_thresholds: HashMap::new(),
            wall_max_distance: default_wall_max_distance(),
            wall_proximity: default_wall_proximity(),
            oi_concentration: default_oi_concentration(),
            min_bounces: default_min_bounces(),
            bounce_lookback_days: default_bounce_lookback_days(),
            iv_rank_ceiling: default_iv_rank_ceiling(),
            flip_proximity: default_flip_proximity(),
        }
    }
}

impl DealerConfig {
    /// Per-symbol neutral threshold; config keys may arrive lower-cased
    pub fn threshold_for(&self, symbol: &str) -> f64 {
        self.gex_thresholds
            .get(symbol)
            .or_else(|| {
                self.gex_thresholds
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(symbol))
                    .map(|(_, v)| v)
            })
            .copied()
            .unwrap_or(self.gex_neutral_threshold)
    }
}

/// Put-wall support detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PutWall {
    pub level: f64,
    /// Distance below spot as a fraction of spot
    pub distance_pct: f64,
    pub near_price: bool,
    pub oi_concentrated: bool,
    pub bounces: u32,
    pub defended: bool,
    pub iv_compressing: bool,
    /// Count of corroborating signals (0-4)
    pub strength: u8,
}

impl PutWall {
    pub fn is_support(&self) -> bool {
        self.strength > 0
    }
}

/// Inputs for one dealer evaluation
#[derive(Debug, Clone)]
pub struct DealerInputs<'a> {
    pub symbol: &'a str,
    pub spot: f64,
    pub gex: Arc<GammaExposureSnapshot>,
    /// Put side of the chain
    pub puts: &'a [OptionsContract],
    /// Daily bars covering the bounce lookback
    pub daily_bars: &'a [PriceBar],
    pub iv: Option<&'a IvSnapshot>,
}

/// Dealer gate verdict
#[derive(Debug, Clone, Serialize)]
pub struct DealerAnalysis {
    pub blocked: bool,
    pub reasons: Vec<BlockReason>,
    #[serde(skip)]
    pub gex: Arc<GammaExposureSnapshot>,
    pub put_wall: Option<PutWall>,
    /// Scorer input, 0.0-1.0
    pub score: f64,
    pub notes: Vec<String>,
}

/// Dealer-positioning gate
pub struct DealerGate {
    config: DealerConfig,
}

impl DealerGate {
    pub fn new(config: DealerConfig) -> Self {
        Self { config }
    }

    pub fn evaluate(&self, inputs: &DealerInputs<'_>) -> DealerAnalysis {
        let gex = &inputs.gex;
        let spot = inputs.spot;
        let threshold = self.config.threshold_for(inputs.symbol);
        let mut reasons = Vec::new();
        let mut notes = Vec::new();

        let put_wall = self.detect_put_wall(inputs);
        if let Some(wall) = put_wall.as_ref().filter(|w| w.is_support()) {
            push_unique(&mut reasons, BlockReason::PutWallSupport);
            notes.push(format!(
                "Put wall at {:.2} ({:.1}% below), strength {}/4",
                wall.level,
                wall.distance_pct * 100.0,
                wall.strength
            ));
        }

        if gex.net_gex > threshold {
            push_unique(&mut reasons, BlockReason::DealerGammaPositive);
            notes.push(format!("Net GEX {:.0} above neutral {:.0}", gex.net_gex, threshold));
        }

        if gex.net_gex > 0.0 {
            if let Some(distance) = gex.flip_distance_pct(spot) {
                if distance <= self.config.flip_proximity {
                    push_unique(&mut reasons, BlockReason::NearGammaFlip);
                    notes.push(format!("{:.2}% from gamma flip", distance * 100.0));
                }
            }
        }

        let score = Self::score(gex, spot, threshold);
        debug!(
            symbol = %inputs.symbol,
            blocked = !reasons.is_empty(),
            score,
            "Dealer gate evaluated"
        );

        DealerAnalysis {
            blocked: !reasons.is_empty(),
            reasons,
            gex: Arc::clone(&inputs.gex),
            put_wall,
            score,
            notes,
        }
    }

    /// Dealer pressure score used by the composite scorer
    pub fn score(gex: &GammaExposureSnapshot, spot: f64, threshold: f64) -> f64 {
        let mut score: f64 = 0.0;
        if gex.net_gex < 0.0 {
            score += 0.30;
        }
        if gex.net_gex < -2.0 * threshold {
            score += 0.20;
        }
        if gex.dealer_delta < 0.0 {
            score += 0.25;
        }
        if gex.is_below_flip(spot) {
            score += 0.25;
        }
        score.min(1.0)
    }

    fn wall_level(inputs: &DealerInputs<'_>) -> Option<f64> {
        inputs.gex.put_wall.or_else(|| {
            inputs
                .puts
                .iter()
                .filter(|c| c.option_type == OptionType::Put && c.open_interest > 0)
                .max_by(|a, b| {
                    a.open_interest
                        .cmp(&b.open_interest)
                        .then(b.strike.total_cmp(&a.strike))
                })
                .map(|c| c.strike)
        })
    }

    fn detect_put_wall(&self, inputs: &DealerInputs<'_>) -> Option<PutWall> {
        let spot = inputs.spot;
        if spot <= 0.0 {
            return None;
        }
        let level = Self::wall_level(inputs)?;
        let distance_pct = (spot - level) / spot;
        if !(0.0..=self.config.wall_max_distance).contains(&distance_pct) {
            return None;
        }

        let near_price = distance_pct <= self.config.wall_proximity;

        let total_oi: u64 = inputs
            .puts
            .iter()
            .filter(|c| c.option_type == OptionType::Put)
            .map(|c| c.open_interest)
            .sum();
        let wall_oi: u64 = inputs
            .puts
            .iter()
            .filter(|c| c.option_type == OptionType::Put && (c.strike - level).abs() < 1e-6)
            .map(|c| c.open_interest)
            .sum();
        let oi_concentrated =
            total_oi > 0 && wall_oi as f64 / total_oi as f64 > self.config.oi_concentration;

        let start = inputs
            .daily_bars
            .len()
            .saturating_sub(self.config.bounce_lookback_days);
        let bounces = count_bounces(&inputs.daily_bars[start..], level);
        let defended = bounces >= self.config.min_bounces;

        let iv_compressing = inputs.iv.map_or(false, |iv| {
            iv.iv_change_pct <= 0.0 && iv.rank().map_or(false, |r| r < self.config.iv_rank_ceiling)
        });

        let strength = [near_price, oi_concentrated, defended, iv_compressing]
            .iter()
            .filter(|s| **s)
            .count() as u8;

        Some(PutWall {
            level,
            distance_pct,
            near_price,
            oi_concentrated,
            bounces,
            defended,
            iv_compressing,
            strength,
        })
    }
}

/// Sessions that tagged the level (low within 1%) and closed more than 1% above it
pub fn count_bounces(bars: &[PriceBar], level: f64) -> u32 {
    if level <= 0.0 {
        return 0;
    }
    bars.iter()
        .filter(|b| (b.low - level).abs() / level <= 0.01 && b.close > level * 1.01)
        .count() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::indicators::test_bars::daily_from_closes;
    use crate::market::Greeks;
    use chrono::{NaiveDate, Utc};

    fn put(strike: f64, oi: u64) -> OptionsContract {
        OptionsContract {
            symbol: format!("XYZ250425P{:08}", (strike * 1000.0) as u64),
            underlying: "XYZ".to_string(),
            option_type: OptionType::Put,
            strike,
            expiration: NaiveDate::from_ymd_opt(2025, 4, 25).unwrap(),
            bid: 1.0,
            ask: 1.1,
            last: 1.05,
            open_interest: oi,
            volume: 10,
            greeks: Greeks::default(),
            days_to_expiry: 10,
        }
    }

    fn gex(net: f64) -> Arc<GammaExposureSnapshot> {
        let mut snap = GammaExposureSnapshot::neutral("XYZ", Utc::now());
        snap.net_gex = net;
        Arc::new(snap)
    }

    fn inputs<'a>(
        gex: Arc<GammaExposureSnapshot>,
        puts: &'a [OptionsContract],
        bars: &'a [PriceBar],
    ) -> DealerInputs<'a> {
        DealerInputs {
            symbol: "XYZ",
            spot: 100.0,
            gex,
            puts,
            daily_bars: bars,
            iv: None,
        }
    }

    #[test]
    fn test_near_put_wall_blocks() {
        let mut snap = GammaExposureSnapshot::neutral("XYZ", Utc::now());
        snap.net_gex = -1.0e7;
        snap.put_wall = Some(98.5);
        let puts = vec![put(98.5, 100), put(95.0, 100)];
        let bars = daily_from_closes(&[100.0; 30], 1_000.0);

        let gate = DealerGate::new(DealerConfig::default());
        let result = gate.evaluate(&inputs(Arc::new(snap), &puts, &bars));
        assert!(result.blocked);
        assert_eq!(result.reasons, vec![BlockReason::PutWallSupport]);
        let wall = result.put_wall.unwrap();
        // near price and half the chain OI at the wall
        assert!(wall.near_price);
        assert!(wall.oi_concentrated);
        assert_eq!(wall.strength, 2);
    }

    #[test]
    fn test_distant_wall_is_ignored() {
        let puts = vec![put(90.0, 5_000), put(85.0, 100)];
        let bars = daily_from_closes(&[100.0; 30], 1_000.0);
        let gate = DealerGate::new(DealerConfig::default());
        let result = gate.evaluate(&inputs(gex(-1.5e8), &puts, &bars));
        assert!(result.put_wall.is_none());
        assert!(!result.blocked);
        // short gamma, deep short gamma
        assert!((result.score - 0.50).abs() < 1e-9);
    }

    #[test]
    fn test_max_oi_strike_fallback_with_weak_signals() {
        // Wall at 96: 4% below spot, OI spread evenly so not concentrated
        let puts: Vec<OptionsContract> = (0..10).map(|i| put(96.0 - i as f64, 109 - i)).collect();
        let bars = daily_from_closes(&[100.0; 30], 1_000.0);
        let gate = DealerGate::new(DealerConfig::default());
        let result = gate.evaluate(&inputs(gex(-1.0), &puts, &bars));
        let wall = result.put_wall.unwrap();
        assert_eq!(wall.level, 96.0);
        assert!(!wall.is_support());
    }

    #[test]
    fn test_positive_gamma_and_flip() {
        let mut snap = GammaExposureSnapshot::neutral("XYZ", Utc::now());
        snap.net_gex = 8.0e7;
        snap.flip_level = Some(100.5);
        let gate = DealerGate::new(DealerConfig::default());
        let result = gate.evaluate(&inputs(Arc::new(snap), &[], &[]));
        assert!(result.reasons.contains(&BlockReason::DealerGammaPositive));
        assert!(result.reasons.contains(&BlockReason::NearGammaFlip));
        // below flip only
        assert!((result.score - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_bounce_counting() {
        let ts = Utc::now();
        let bounce = PriceBar::new(ts, 101.0, 102.0, 95.2, 97.0, 1.0);
        let fail = PriceBar::new(ts, 101.0, 102.0, 95.2, 95.5, 1.0);
        let far = PriceBar::new(ts, 101.0, 102.0, 99.0, 100.0, 1.0);
        assert_eq!(count_bounces(&[bounce.clone(), bounce, fail, far], 95.0), 2);
    }

    #[test]
    fn test_dealer_score_caps_at_one() {
        let mut snap = GammaExposureSnapshot::neutral("XYZ", Utc::now());
        snap.net_gex = -2.0e8;
        snap.dealer_delta = -1.0;
        snap.flip_level = Some(110.0);
        assert!((DealerGate::score(&snap, 100.0, 5.0e7) - 1.0).abs() < 1e-9);
    }
}
