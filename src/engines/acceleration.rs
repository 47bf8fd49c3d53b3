//! Acceleration-Window Classifier
//!
//! Decides whether the next few sessions are a window where downside can
//! accelerate, and which mechanism would drive it. Rules run in a fixed
//! order and earlier rules short-circuit later ones:
//!
//! 1. Late entry (move already under way)
//! 2. IV unreasonable (premium already bid)
//! 3. Gamma drain: customers short delta, dealers short gamma, puts active
//! 4. Distribution trap: failed reclaim with broad weakness
//! 5. Snapback: overbought with a lower high
//! 6. Snapback alone never validates a window
//! 7. Validity needs weakness, confirmation and a real archetype

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::gates::BlockReason;
use crate::market::indicators::{
    count_failed_reclaims, ema, has_lower_high, relative_volume, rsi, session_vwap,
};
use crate::market::{GammaExposureSnapshot, IvSnapshot, OptionsActivity, PriceBar};

/// Acceleration classifier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccelerationConfig {
    /// Same-session IV change (%) that means the move is priced
    #[serde(default = "default_late_iv_change_pct")]
    pub late_iv_change_pct: f64,
    #[serde(default = "default_late_volume_multiple")]
    pub late_volume_multiple: f64,
    /// Last-hour drop (%) that, with heavy volume, means the move happened
    #[serde(default = "default_late_drop_pct")]
    pub late_drop_pct: f64,
    /// Distance below the session high (%) that means the move happened
    #[serde(default = "default_late_below_high_pct")]
    pub late_below_high_pct: f64,
    #[serde(default = "default_iv_rank_ceiling")]
    pub iv_rank_ceiling: f64,
    #[serde(default = "default_iv_change_ceiling")]
    pub iv_change_ceiling_pct: f64,
    /// Put volume over its average that counts as rising
    #[serde(default = "default_put_volume_ratio")]
    pub put_volume_ratio: f64,
    #[serde(default = "default_rsi_overbought")]
    pub rsi_overbought: f64,
    #[serde(default = "default_min_weakness")]
    pub min_weakness: usize,
}

fn default_late_iv_change_pct() -> f64 {
    20.0
}
fn default_late_volume_multiple() -> f64 {
    2.0
}
fn default_late_drop_pct() -> f64 {
    3.0
}
fn default_late_below_high_pct() -> f64 {
    5.0
}
fn default_iv_rank_ceiling() -> f64 {
    80.0
}
fn default_iv_change_ceiling() -> f64 {
    10.0
}
fn default_put_volume_ratio() -> f64 {
    1.2
}
fn default_rsi_overbought() -> f64 {
    75.0
}
fn default_min_weakness() -> usize {
    2
}

impl Default for AccelerationConfig {
    fn default() -> Self {
        Self {
            late_iv_change_pct: default_late_iv_change_pct(),
            late_volume_multiple: default_late_volume_multiple(),
            late_drop_pct: default_late_drop_pct(),
            late_below_high_pct: default_late_below_high_pct(),
            iv_rank_ceiling: default_iv_rank_ceiling(),
            iv_change_ceiling_pct: default_iv_change_ceiling(),
            put_volume_ratio: default_put_volume_ratio(),
            rsi_overbought: default_rsi_overbought(),
            min_weakness: default_min_weakness(),
        }
    }
}

/// Mechanism expected to drive the move
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngineArchetype {
    GammaDrain,
    DistributionTrap,
    Snapback,
    #[default]
    None,
}

/// Which archetype conditions hold
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchetypeFlags {
    pub gamma_drain: bool,
    pub distribution_trap: bool,
    pub snapback: bool,
}

impl ArchetypeFlags {
    /// Snapback is the only active archetype
    pub fn is_snapback_only(&self) -> bool {
        self.snapback && !self.gamma_drain && !self.distribution_trap
    }
}

/// Highest-priority active archetype
pub fn classify(flags: &ArchetypeFlags) -> EngineArchetype {
    if flags.gamma_drain {
        EngineArchetype::GammaDrain
    } else if flags.distribution_trap {
        EngineArchetype::DistributionTrap
    } else if flags.snapback {
        EngineArchetype::Snapback
    } else {
        EngineArchetype::None
    }
}

/// Price weakness relative to intraday and daily references
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeaknessFlags {
    pub below_vwap: bool,
    pub below_ema20: bool,
    pub below_prior_low: bool,
}

impl WeaknessFlags {
    pub fn count(&self) -> usize {
        [self.below_vwap, self.below_ema20, self.below_prior_low]
            .iter()
            .filter(|w| **w)
            .count()
    }
}

/// Classifier output
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccelerationWindow {
    pub weakness: WeaknessFlags,
    pub failed_reclaim: bool,
    pub rising_put_volume: bool,
    pub iv_reasonable: bool,
    pub late_entry: bool,
    pub flags: ArchetypeFlags,
    pub archetype: EngineArchetype,
    pub is_valid: bool,
    pub reasons: Vec<BlockReason>,
    pub rsi: Option<f64>,
}

impl AccelerationWindow {
    pub fn has_archetype(&self) -> bool {
        matches!(
            self.archetype,
            EngineArchetype::GammaDrain | EngineArchetype::DistributionTrap
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct AccelerationInputs<'a> {
    /// Daily bars; the last bar is the current session
    pub daily_bars: &'a [PriceBar],
    /// Current-session one-minute bars
    pub minute_bars: &'a [PriceBar],
    pub gex: Option<&'a GammaExposureSnapshot>,
    pub iv: Option<&'a IvSnapshot>,
    pub activity: Option<&'a OptionsActivity>,
}

/// Acceleration-window classifier
pub struct AccelerationClassifier {
    config: AccelerationConfig,
}

impl AccelerationClassifier {
    pub fn new(config: AccelerationConfig) -> Self {
        Self { config }
    }

    pub fn classify(&self, inputs: &AccelerationInputs<'_>) -> AccelerationWindow {
        let c = &self.config;
        let daily = inputs.daily_bars;
        let minutes = inputs.minute_bars;
        let price = minutes.last().or_else(|| daily.last()).map(|b| b.close);

        let closes: Vec<f64> = daily.iter().map(|b| b.close).collect();
        let weakness = match price {
            Some(price) => WeaknessFlags {
                below_vwap: session_vwap(minutes).map_or(false, |v| price < v),
                below_ema20: ema(&closes, 20).map_or(false, |e| price < e),
                below_prior_low: daily
                    .len()
                    .checked_sub(2)
                    .map_or(false, |i| price < daily[i].low),
            },
            None => WeaknessFlags::default(),
        };
        let failed_reclaim = weakness.below_vwap && count_failed_reclaims(minutes) >= 1;
        let rising_put_volume = inputs
            .activity
            .map_or(false, |a| a.put_volume_ratio() >= c.put_volume_ratio);
        let rsi_value = rsi(&closes, 14);

        let mut window = AccelerationWindow {
            weakness,
            failed_reclaim,
            rising_put_volume,
            iv_reasonable: true,
            rsi: rsi_value,
            ..Default::default()
        };

        // 1. Late entry
        if self.is_late_entry(inputs, price) {
            window.late_entry = true;
            window.reasons.push(BlockReason::LateEntry);
            return window;
        }

        // 2. IV unreasonable
        if let Some(iv) = inputs.iv {
            let rank_high = iv.rank().map_or(false, |r| r >= c.iv_rank_ceiling);
            if rank_high && iv.iv_change_pct >= c.iv_change_ceiling_pct {
                window.iv_reasonable = false;
                window.reasons.push(BlockReason::IvUnreasonable);
                return window;
            }
        }

        // 3-5. Archetype conditions
        let mut flags = ArchetypeFlags {
            gamma_drain: inputs.gex.map_or(false, |g| g.net_delta < 0.0 && g.net_gex < 0.0)
                && rising_put_volume,
            distribution_trap: failed_reclaim && weakness.count() >= 2,
            snapback: rsi_value.map_or(false, |r| r > c.rsi_overbought)
                && self.lower_high_formed(daily, minutes),
        };

        // 6. Snapback alone
        if flags.is_snapback_only() {
            flags.snapback = false;
            window.flags = flags;
            window.archetype = classify(&flags);
            window.reasons.push(BlockReason::SnapbackOnly);
            return window;
        }

        window.flags = flags;
        window.archetype = classify(&flags);

        // 7. Validity
        window.is_valid = weakness.count() >= c.min_weakness
            && (failed_reclaim || rising_put_volume)
            && window.has_archetype();
        if !window.is_valid {
            window.reasons.push(BlockReason::WindowUnconfirmed);
        }

        debug!(
            archetype = ?window.archetype,
            valid = window.is_valid,
            weakness = weakness.count(),
            "Acceleration window classified"
        );
        window
    }

    fn is_late_entry(&self, inputs: &AccelerationInputs<'_>, price: Option<f64>) -> bool {
        let c = &self.config;
        if inputs
            .iv
            .map_or(false, |iv| iv.iv_change_pct >= c.late_iv_change_pct)
        {
            return true;
        }

        let minutes = inputs.minute_bars;
        let heavy_volume =
            relative_volume(inputs.daily_bars, 20).map_or(false, |r| r >= c.late_volume_multiple);
        if heavy_volume && !minutes.is_empty() {
            let start = minutes.len().saturating_sub(60);
            let from = if start > 0 {
                minutes[start - 1].close
            } else {
                minutes[0].open
            };
            if let Some(last) = minutes.last() {
                if from > 0.0 && (from - last.close) / from * 100.0 > c.late_drop_pct {
                    return true;
                }
            }
        }

        let session_high = if minutes.is_empty() {
            inputs.daily_bars.last().map(|b| b.high)
        } else {
            minutes.iter().map(|b| b.high).reduce(f64::max)
        };
        match (price, session_high) {
            (Some(price), Some(high)) if high > 0.0 => {
                (high - price) / high * 100.0 > c.late_below_high_pct
            }
            _ => false,
        }
    }

    fn lower_high_formed(&self, daily: &[PriceBar], minutes: &[PriceBar]) -> bool {
        let minute_highs: Vec<f64> = minutes.iter().map(|b| b.high).collect();
        let start = daily.len().saturating_sub(20);
        let daily_highs: Vec<f64> = daily[start..].iter().map(|b| b.high).collect();
        has_lower_high(&minute_highs) || has_lower_high(&daily_highs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::indicators::test_bars::{daily_from_closes, minute_bars};
    use chrono::Utc;

    fn declining_daily() -> Vec<PriceBar> {
        let mut closes: Vec<f64> = (0..30).map(|i| 110.0 - i as f64 * 0.3).collect();
        closes.push(100.0);
        daily_from_closes(&closes, 1_000_000.0)
    }

    fn fading_minutes() -> Vec<PriceBar> {
        minute_bars(&[
            (100.5, 99.5, 100.0, 50_000.0),
            (99.6, 98.8, 99.0, 1_000.0),
            (100.1, 98.9, 99.1, 1_000.0),
            (99.2, 98.6, 98.7, 1_000.0),
            (100.2, 98.7, 98.9, 1_000.0),
            (99.0, 98.4, 98.5, 1_000.0),
        ])
    }

    fn short_gamma() -> GammaExposureSnapshot {
        let mut gex = GammaExposureSnapshot::neutral("XYZ", Utc::now());
        gex.net_delta = -1_000_000.0;
        gex.net_gex = -50_000_000.0;
        gex.flip_level = Some(102.0);
        gex
    }

    fn rising_puts() -> OptionsActivity {
        OptionsActivity {
            put_volume: 30_000.0,
            avg_put_volume: 20_000.0,
            ..Default::default()
        }
    }

    fn classifier() -> AccelerationClassifier {
        AccelerationClassifier::new(AccelerationConfig::default())
    }

    #[test]
    fn test_gamma_drain_window() {
        let daily = declining_daily();
        let minutes = fading_minutes();
        let gex = short_gamma();
        let activity = rising_puts();
        let window = classifier().classify(&AccelerationInputs {
            daily_bars: &daily,
            minute_bars: &minutes,
            gex: Some(&gex),
            activity: Some(&activity),
            ..Default::default()
        });
        assert_eq!(window.archetype, EngineArchetype::GammaDrain);
        assert!(window.is_valid);
        assert!(window.failed_reclaim);
        assert!(window.weakness.count() >= 2);
        assert!(window.reasons.is_empty());
    }

    #[test]
    fn test_snapback_only_is_invalid() {
        let closes: Vec<f64> = (0..30).map(|i| 80.0 + i as f64).collect();
        let mut daily = daily_from_closes(&closes, 1_000_000.0);
        let n = daily.len();
        daily[n - 6].high = 130.0;
        daily[n - 3].high = 125.0;

        let window = classifier().classify(&AccelerationInputs {
            daily_bars: &daily,
            ..Default::default()
        });
        assert!(!window.is_valid);
        assert_eq!(window.reasons, vec![BlockReason::SnapbackOnly]);
        assert!(!window.flags.snapback);
        assert_ne!(window.archetype, EngineArchetype::Snapback);
    }

    #[test]
    fn test_late_entry_short_circuits() {
        let daily = declining_daily();
        let minutes = fading_minutes();
        let gex = short_gamma();
        let activity = rising_puts();
        let iv = IvSnapshot {
            current_iv: 0.6,
            iv_change_pct: 25.0,
            ..Default::default()
        };
        let window = classifier().classify(&AccelerationInputs {
            daily_bars: &daily,
            minute_bars: &minutes,
            gex: Some(&gex),
            iv: Some(&iv),
            activity: Some(&activity),
        });
        assert!(window.late_entry);
        assert_eq!(window.reasons, vec![BlockReason::LateEntry]);
        assert_eq!(window.archetype, EngineArchetype::None);
    }

    fn late_check(last_volume: f64, closes: &[f64]) -> AccelerationWindow {
        let mut daily = daily_from_closes(&[100.0; 21], 1_000_000.0);
        if let Some(today) = daily.last_mut() {
            today.volume = last_volume;
        }
        let rows: Vec<(f64, f64, f64, f64)> = closes.iter().map(|c| (c + 0.05, c - 0.05, *c, 1_000.0)).collect();
        let minutes = minute_bars(&rows);
        classifier().classify(&AccelerationInputs {
            daily_bars: &daily,
            minute_bars: &minutes,
            ..Default::default()
        })
    }

    fn slide(from: f64, to: f64, bars: usize) -> Vec<f64> {
        (0..bars)
            .map(|i| from + (to - from) * i as f64 / (bars - 1) as f64)
            .collect()
    }

    #[test]
    fn test_late_entry_on_heavy_volume_selloff() {
        // 2.5x volume and 3.5% off in the last hour
        let window = late_check(2_500_000.0, &slide(100.0, 96.5, 60));
        assert!(window.late_entry);
        assert_eq!(window.reasons, vec![BlockReason::LateEntry]);

        // Same drop on ordinary volume
        assert!(!late_check(1_000_000.0, &slide(100.0, 96.5, 60)).late_entry);
        // Heavy volume, modest drop
        assert!(!late_check(2_500_000.0, &slide(100.0, 98.0, 60)).late_entry);
    }

    #[test]
    fn test_late_entry_far_below_session_high() {
        let mut closes = slide(100.0, 105.0, 10);
        closes.extend(slide(104.5, 99.0, 20));
        // 5.8% under the 105.05 high
        assert!(late_check(1_000_000.0, &closes).late_entry);

        let mut closes = slide(100.0, 105.0, 10);
        closes.extend(slide(104.5, 100.5, 20));
        assert!(!late_check(1_000_000.0, &closes).late_entry);
    }

    #[test]
    fn test_iv_unreasonable() {
        let daily = declining_daily();
        let iv = IvSnapshot {
            current_iv: 0.6,
            iv_rank: Some(85.0),
            iv_change_pct: 12.0,
            ..Default::default()
        };
        let window = classifier().classify(&AccelerationInputs {
            daily_bars: &daily,
            iv: Some(&iv),
            ..Default::default()
        });
        assert!(!window.iv_reasonable);
        assert_eq!(window.reasons, vec![BlockReason::IvUnreasonable]);
    }

    #[test]
    fn test_weakness_without_confirmation_is_unconfirmed() {
        let daily = declining_daily();
        let window = classifier().classify(&AccelerationInputs {
            daily_bars: &daily,
            ..Default::default()
        });
        assert_eq!(window.weakness.count(), 2);
        assert!(!window.is_valid);
        assert_eq!(window.reasons, vec![BlockReason::WindowUnconfirmed]);
    }

    #[test]
    fn test_classify_priority() {
        let all = ArchetypeFlags {
            gamma_drain: true,
            distribution_trap: true,
            snapback: true,
        };
        assert_eq!(classify(&all), EngineArchetype::GammaDrain);
        let trap = ArchetypeFlags {
            distribution_trap: true,
            snapback: true,
            ..Default::default()
        };
        assert_eq!(classify(&trap), EngineArchetype::DistributionTrap);
        assert_eq!(classify(&ArchetypeFlags::default()), EngineArchetype::None);
    }
}
