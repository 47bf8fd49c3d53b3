//! Liquidity-Vacuum Detector
//!
//! Buyers stepping away shows up before price gaps lower: the bid thins out,
//! one-minute ranges widen, volume stops moving price, and VWAP reclaims fail.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::market::indicators::{count_failed_reclaims, mean, median, session_vwap};
use crate::market::{PriceBar, Quote};

/// Liquidity detector configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidityConfig {
    /// Bid size below this fraction of the average print size
    #[serde(default = "default_bid_print_ratio")]
    pub bid_print_ratio: f64,
    /// Bid size below this fraction of 20-day ADV
    #[serde(default = "default_bid_adv_ratio")]
    pub bid_adv_ratio: f64,
    /// One-minute bars averaged for the print size
    #[serde(default = "default_print_window")]
    pub print_window: usize,
    /// Recent bars examined for spread widening and progress
    #[serde(default = "default_recent_window")]
    pub recent_window: usize,
    #[serde(default = "default_spread_multiple")]
    pub spread_multiple: f64,
    /// Absolute range (%) used when there is no earlier baseline
    #[serde(default = "default_spread_floor_pct")]
    pub spread_floor_pct: f64,
    /// Share of recent bars that must be wide
    #[serde(default = "default_spread_share")]
    pub spread_share: f64,
    #[serde(default = "default_volume_multiple")]
    pub volume_multiple: f64,
    /// Max price progress (%) for volume-without-progress
    #[serde(default = "default_progress_max_pct")]
    pub progress_max_pct: f64,
    #[serde(default = "default_min_failed_reclaims")]
    pub min_failed_reclaims: usize,
}

fn default_bid_print_ratio() -> f64 {
    0.30
}
fn default_bid_adv_ratio() -> f64 {
    0.005
}
fn default_print_window() -> usize {
    30
}
fn default_recent_window() -> usize {
    15
}
fn default_spread_multiple() -> f64 {
    1.5
}
fn default_spread_floor_pct() -> f64 {
    0.25
}
fn default_spread_share() -> f64 {
    0.6
}
fn default_volume_multiple() -> f64 {
    1.5
}
fn default_progress_max_pct() -> f64 {
    0.5
}
fn default_min_failed_reclaims() -> usize {
    2
}

impl Default for LiquidityConfig {
    fn default() -> Self {
        Self {
            bid_print_ratio: default_bid_print_ratio(),
            bid_adv_ratio: default_bid_adv_ratio(),
            print_window: default_print_window(),
            recent_window: default_recent_window(),
            spread_multiple: default_spread_multiple(),
            spread_floor_pct: default_spread_floor_pct(),
            spread_share: default_spread_share(),
            volume_multiple: default_volume_multiple(),
            progress_max_pct: default_progress_max_pct(),
            min_failed_reclaims: default_min_failed_reclaims(),
        }
    }
}

/// The four vacuum signals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquiditySignals {
    pub bid_collapse: bool,
    pub spread_widening: bool,
    pub volume_without_progress: bool,
    pub failed_reclaims: bool,
}

impl LiquiditySignals {
    pub fn count(&self) -> usize {
        [
            self.bid_collapse,
            self.spread_widening,
            self.volume_without_progress,
            self.failed_reclaims,
        ]
        .iter()
        .filter(|s| **s)
        .count()
    }

    pub fn any(&self) -> bool {
        self.count() > 0
    }

    /// Both sets have at least one signal in common
    pub fn shares_any(&self, other: &LiquiditySignals) -> bool {
        (self.bid_collapse && other.bid_collapse)
            || (self.spread_widening && other.spread_widening)
            || (self.volume_without_progress && other.volume_without_progress)
            || (self.failed_reclaims && other.failed_reclaims)
    }
}

/// Peer market-cap tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectorTier {
    Mega,
    Large,
    Mid,
    Small,
}

impl SectorTier {
    pub fn weight(&self) -> f64 {
        match self {
            SectorTier::Mega => 1.0,
            SectorTier::Large => 0.8,
            SectorTier::Mid => 0.5,
            SectorTier::Small => 0.3,
        }
    }
}

/// A sector peer's vacuum signals
#[derive(Debug, Clone, PartialEq)]
pub struct SectorPeer {
    pub symbol: String,
    pub tier: SectorTier,
    pub signals: LiquiditySignals,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectorAgreement {
    SectorWide,
    Mixed,
    Idiosyncratic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorContext {
    pub peers: usize,
    /// Tier-weighted share of agreeing peers
    pub ratio: f64,
    pub agreement: SectorAgreement,
    pub adjustment: f64,
}

/// Liquidity detector output
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LiquidityVacuumSignal {
    pub score: f64,
    pub signals: LiquiditySignals,
    pub failed_reclaim_count: usize,
    pub sector: Option<SectorContext>,
}

impl LiquidityVacuumSignal {
    pub fn is_active(&self) -> bool {
        self.signals.any()
    }
}

#[derive(Debug, Clone, Default)]
pub struct LiquidityInputs<'a> {
    pub quote: Option<&'a Quote>,
    /// Current-session one-minute bars
    pub minute_bars: &'a [PriceBar],
    /// Daily bars; the last bar is the current session
    pub daily_bars: &'a [PriceBar],
}

/// Liquidity-vacuum detector
pub struct LiquidityDetector {
    config: LiquidityConfig,
}

impl LiquidityDetector {
    pub fn new(config: LiquidityConfig) -> Self {
        Self { config }
    }

    pub fn analyze(&self, inputs: &LiquidityInputs<'_>) -> LiquidityVacuumSignal {
        let minutes = inputs.minute_bars;
        let failed_reclaim_count = count_failed_reclaims(minutes);
        let below_vwap = match (session_vwap(minutes), minutes.last()) {
            (Some(vwap), Some(last)) => last.close < vwap,
            _ => false,
        };

        let signals = LiquiditySignals {
            bid_collapse: self.bid_collapse(inputs),
            spread_widening: self.spread_widening(minutes),
            volume_without_progress: self.volume_without_progress(minutes),
            failed_reclaims: below_vwap && failed_reclaim_count >= self.config.min_failed_reclaims,
        };
        let score = 0.25 * signals.count() as f64;

        debug!(score, signals = ?signals, "Liquidity analyzed");
        LiquidityVacuumSignal {
            score,
            signals,
            failed_reclaim_count,
            sector: None,
        }
    }

    /// Adjust the score by how many sector peers show the same vacuum
    pub fn apply_sector(&self, mut signal: LiquidityVacuumSignal, peers: &[SectorPeer]) -> LiquidityVacuumSignal {
        if peers.is_empty() {
            return signal;
        }
        let total: f64 = peers.iter().map(|p| p.tier.weight()).sum();
        let agreeing: f64 = peers
            .iter()
            .filter(|p| p.signals.shares_any(&signal.signals))
            .map(|p| p.tier.weight())
            .sum();
        let ratio = if total > 0.0 { agreeing / total } else { 0.0 };

        let (agreement, adjustment) = if ratio >= 0.6 {
            (SectorAgreement::SectorWide, 0.10)
        } else if ratio > 0.0 {
            (SectorAgreement::Mixed, 0.05)
        } else if signal.signals.any() {
            (SectorAgreement::Idiosyncratic, -0.03)
        } else {
            (SectorAgreement::Idiosyncratic, 0.0)
        };

        signal.score = (signal.score + adjustment).clamp(0.0, 1.0);
        signal.sector = Some(SectorContext {
            peers: peers.len(),
            ratio,
            agreement,
            adjustment,
        });
        signal
    }

    /// Thin bid against both recent print size and daily volume
    fn bid_collapse(&self, inputs: &LiquidityInputs<'_>) -> bool {
        let Some(quote) = inputs.quote else {
            return false;
        };
        let minutes = inputs.minute_bars;
        if minutes.is_empty() {
            return false;
        }
        let start = minutes.len().saturating_sub(self.config.print_window);
        let volumes: Vec<f64> = minutes[start..].iter().map(|b| b.volume).collect();
        let Some(avg_print) = mean(&volumes) else {
            return false;
        };

        // 20-day ADV excluding the current session
        let daily = inputs.daily_bars;
        let prior = &daily[..daily.len().saturating_sub(1)];
        let adv_start = prior.len().saturating_sub(20);
        let Some(adv) = mean(&prior[adv_start..].iter().map(|b| b.volume).collect::<Vec<_>>())
        else {
            return false;
        };

        let print_thin = quote.bid_size < self.config.bid_print_ratio * avg_print;
        let adv_thin = quote.bid_size < self.config.bid_adv_ratio * adv;
        print_thin && adv_thin
    }

    fn spread_widening(&self, minutes: &[PriceBar]) -> bool {
        let window = self.config.recent_window;
        if window == 0 || minutes.len() < window {
            return false;
        }
        let split = minutes.len() - window;
        let earlier: Vec<f64> = minutes[..split].iter().map(|b| b.range_pct()).collect();
        let threshold = match median(&earlier) {
            Some(baseline) if baseline > 0.0 => self.config.spread_multiple * baseline,
            _ => self.config.spread_floor_pct,
        };
        let wide = minutes[split..]
            .iter()
            .filter(|b| b.range_pct() > threshold)
            .count();
        wide as f64 / window as f64 >= self.config.spread_share
    }

    fn volume_without_progress(&self, minutes: &[PriceBar]) -> bool {
        let window = self.config.recent_window;
        if window == 0 || minutes.len() < window {
            return false;
        }
        let split = minutes.len() - window;
        let recent_volume: f64 = minutes[split..].iter().map(|b| b.volume).sum();
        let session_volume: f64 = minutes.iter().map(|b| b.volume).sum();
        let windows = minutes.len() as f64 / window as f64;
        let avg_window_volume = session_volume / windows;
        if avg_window_volume <= 0.0 {
            return false;
        }

        let start_price = if split > 0 {
            minutes[split - 1].close
        } else {
            minutes[0].open
        };
        let Some(end) = minutes.last() else {
            return false;
        };
        if start_price <= 0.0 {
            return false;
        }
        let progress = ((end.close - start_price) / start_price * 100.0).abs();

        recent_volume >= self.config.volume_multiple * avg_window_volume
            && progress < self.config.progress_max_pct
    }
}
