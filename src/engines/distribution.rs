//! Distribution Detector
//!
//! Looks for institutions unloading into strength before price breaks. Each
//! signal sits in one of two buckets:
//! - PRE: distribution still under way (options positioning, dark-pool blocks,
//!   stalling price on heavy volume). Weighted 1.5x.
//! - POST: breakdown already visible on the tape. Weighted 0.7x.
//!
//! Catalysts only confirm. They add a capped boost when something already
//! fired and never trigger a signal on their own.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::gates::{push_unique, BlockReason};
use crate::market::indicators::{
    count_failed_reclaims, has_lower_high, mean, relative_volume, rsi_series, session_vwap,
    swing_highs,
};
use crate::market::{
    CatalystContext, DarkPoolPrint, OptionType, OptionsActivity, OptionsFlowEvent, PriceBar,
    PrintDirection, SkewSnapshot, TradeSide,
};

/// Distribution detector configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributionConfig {
    /// Minimum aggressive premium for the call-selling and put-buying signals
    #[serde(default = "default_flow_premium")]
    pub flow_premium_threshold: f64,

    /// Put open-interest change (%) for the rising-put-OI signal
    #[serde(default = "default_put_oi_change_pct")]
    pub put_oi_change_pct: f64,

    /// Put skew change in vol points for the skew signal
    #[serde(default = "default_skew_change_points")]
    pub skew_change_points: f64,

    #[serde(default = "default_delta_dollars")]
    pub delta_dollars: f64,
    #[serde(default = "default_gamma_dollars")]
    pub gamma_dollars: f64,
    #[serde(default = "default_vega_dollars")]
    pub vega_dollars: f64,

    /// Sell prints at one level for the repeated-blocks signal
    #[serde(default = "default_min_block_prints")]
    pub min_block_prints: usize,

    /// Total shares across the repeated blocks
    #[serde(default = "default_min_block_shares")]
    pub min_block_shares: f64,

    /// Print size over quoted depth that counts as violent
    #[serde(default = "default_violence_multiple")]
    pub violence_depth_multiple: f64,

    /// Earnings inside this many days block unless front-run
    #[serde(default = "default_earnings_block_days")]
    pub earnings_block_days: i64,

    /// Days after a negative-guidance report that still boost
    #[serde(default = "default_post_earnings_window")]
    pub post_earnings_window_days: i64,

    /// Short interest (% of float) that makes a hard-to-borrow name a squeeze risk
    #[serde(default = "default_squeeze_short_interest")]
    pub squeeze_short_interest_pct: f64,
}

fn default_flow_premium() -> f64 {
    500_000.0
}
fn default_put_oi_change_pct() -> f64 {
    10.0
}
fn default_skew_change_points() -> f64 {
    2.0
}
fn default_delta_dollars() -> f64 {
    5_000_000.0
}
fn default_gamma_dollars() -> f64 {
    500_000.0
}
fn default_vega_dollars() -> f64 {
    250_000.0
}
fn default_min_block_prints() -> usize {
    3
}
fn default_min_block_shares() -> f64 {
    50_000.0
}
fn default_violence_multiple() -> f64 {
    5.0
}
fn default_earnings_block_days() -> i64 {
    3
}
fn default_post_earnings_window() -> i64 {
    10
}
fn default_squeeze_short_interest() -> f64 {
    20.0
}

impl Default for DistributionConfig {
    fn default() -> Self {
        Self {
            flow_premium_threshold: default_flow_premium(),
            put_oi_change_pct: default_put_oi_change_pct(),
            skew_change_points: default_skew_change_points(),
            delta_dollars: default_delta_dollars(),
            gamma_dollars: default_gamma_dollars(),
            vega_dollars: default_vega_dollars(),
            min_block_prints: default_min_block_prints(),
            min_block_shares: default_min_block_shares(),
            violence_depth_multiple: default_violence_multiple(),
            earnings_block_days: default_earnings_block_days(),
            post_earnings_window_days: default_post_earnings_window(),
            squeeze_short_interest_pct: default_squeeze_short_interest(),
        }
    }
}

/// Signal bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    Pre,
    Post,
}

const PRE_MULTIPLIER: f64 = 1.5;
const POST_MULTIPLIER: f64 = 0.7;
const DOMINANCE_BONUS: f64 = 0.10;
const VIOLENCE_WEIGHT: f64 = 0.05;
const FRONT_RUN_BONUS: f64 = 0.05;
const MAX_BOOST: f64 = 0.25;

/// Strength of a high relative-volume red day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RvolTier {
    /// RVOL >= 2.0 and red
    Extreme,
    /// RVOL >= 1.5 and down more than 1.5%
    High,
    /// RVOL >= 1.3 and down more than 3%
    Elevated,
}

impl RvolTier {
    pub fn weight(&self) -> f64 {
        match self {
            RvolTier::Extreme => 0.15,
            RvolTier::High => 0.12,
            RvolTier::Elevated => 0.10,
        }
    }
}

/// Every distribution signal, by name
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DistributionSignals {
    // Price-volume
    pub flat_price_rising_volume: bool,
    pub failed_breakout: bool,
    pub lower_highs_flat_momentum: bool,
    pub vwap_loss: bool,
    pub high_rvol_red_day: bool,
    pub rvol_tier: Option<RvolTier>,
    pub gap_down_no_recovery: bool,
    pub gap_up_reversal: bool,
    pub multi_day_weakness: bool,
    // Options flow
    pub call_selling_at_bid: bool,
    pub put_buying_at_ask: bool,
    pub rising_put_oi: bool,
    pub skew_steepening: bool,
    pub greek_weighted_bearish_flow: bool,
    // Dark pool
    pub repeated_sell_blocks: bool,
}

impl DistributionSignals {
    /// (fired, bucket, base weight) for each signal
    fn table(&self) -> [(bool, Bucket, f64); 14] {
        let rvol_weight = self.rvol_tier.map_or(RvolTier::Extreme.weight(), |t| t.weight());
        [
            (self.flat_price_rising_volume, Bucket::Pre, 0.10),
            (self.failed_breakout, Bucket::Pre, 0.12),
            (self.lower_highs_flat_momentum, Bucket::Pre, 0.10),
            (self.call_selling_at_bid, Bucket::Pre, 0.10),
            (self.put_buying_at_ask, Bucket::Pre, 0.10),
            (self.rising_put_oi, Bucket::Pre, 0.08),
            (self.skew_steepening, Bucket::Pre, 0.08),
            (self.greek_weighted_bearish_flow, Bucket::Pre, 0.10),
            (self.repeated_sell_blocks, Bucket::Pre, 0.12),
            (self.vwap_loss, Bucket::Post, 0.12),
            (self.high_rvol_red_day, Bucket::Post, rvol_weight),
            (self.gap_down_no_recovery, Bucket::Post, 0.10),
            (self.gap_up_reversal, Bucket::Post, 0.15),
            (self.multi_day_weakness, Bucket::Post, 0.08),
        ]
    }

    pub fn count(&self, bucket: Bucket) -> usize {
        self.table()
            .iter()
            .filter(|(fired, b, _)| *fired && *b == bucket)
            .count()
    }

    pub fn weight(&self, bucket: Bucket) -> f64 {
        self.table()
            .iter()
            .filter(|(fired, b, _)| *fired && *b == bucket)
            .map(|(_, _, w)| w)
            .sum()
    }

    pub fn any(&self) -> bool {
        self.table().iter().any(|(fired, _, _)| *fired)
    }

    /// At least one signal read from the price tape
    pub fn has_price_signal(&self) -> bool {
        self.flat_price_rising_volume
            || self.failed_breakout
            || self.lower_highs_flat_momentum
            || self.vwap_loss
            || self.high_rvol_red_day
            || self.gap_down_no_recovery
            || self.gap_up_reversal
            || self.multi_day_weakness
    }

    /// Names of the fired signals, for reports
    pub fn fired(&self) -> Vec<&'static str> {
        let names = [
            (self.flat_price_rising_volume, "flat_price_rising_volume"),
            (self.failed_breakout, "failed_breakout"),
            (self.lower_highs_flat_momentum, "lower_highs_flat_momentum"),
            (self.call_selling_at_bid, "call_selling_at_bid"),
            (self.put_buying_at_ask, "put_buying_at_ask"),
            (self.rising_put_oi, "rising_put_oi"),
            (self.skew_steepening, "skew_steepening"),
            (self.greek_weighted_bearish_flow, "greek_weighted_bearish_flow"),
            (self.repeated_sell_blocks, "repeated_sell_blocks"),
            (self.vwap_loss, "vwap_loss"),
            (self.high_rvol_red_day, "high_rvol_red_day"),
            (self.gap_down_no_recovery, "gap_down_no_recovery"),
            (self.gap_up_reversal, "gap_up_reversal"),
            (self.multi_day_weakness, "multi_day_weakness"),
        ];
        names
            .iter()
            .filter(|(fired, _)| *fired)
            .map(|(_, name)| *name)
            .collect()
    }
}

/// Which bucket dominates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistributionPriority {
    PreBreakdown,
    PostBreakdown,
    Mixed,
    #[default]
    None,
}

/// Repeated dark-pool selling at one level
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DarkPoolCluster {
    pub level: f64,
    pub prints: usize,
    pub shares: f64,
    /// Pattern present but suppressed by the price-context guard
    pub suppressed: bool,
    /// Share of prints larger than the violence multiple of quoted depth
    pub violence: f64,
}

/// Distribution detector output
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DistributionSignal {
    pub score: f64,
    pub signals: DistributionSignals,
    pub priority: DistributionPriority,
    pub relative_volume: Option<f64>,
    pub dark_pool: Option<DarkPoolCluster>,
    pub boost: f64,
    /// Earnings close but PRE distribution plus VWAP loss already in place
    pub front_run_setup: bool,
    pub blocks: Vec<BlockReason>,
    pub notes: Vec<String>,
}

impl DistributionSignal {
    pub fn is_blocked(&self) -> bool {
        !self.blocks.is_empty()
    }
}

/// Everything the detector reads for one symbol
#[derive(Debug, Clone, Default)]
pub struct DistributionInputs<'a> {
    /// Daily bars, oldest first; the last bar is the current session
    pub daily_bars: &'a [PriceBar],
    /// Current-session one-minute bars
    pub minute_bars: &'a [PriceBar],
    pub put_flow: &'a [OptionsFlowEvent],
    pub call_flow: &'a [OptionsFlowEvent],
    pub dark_pool: &'a [DarkPoolPrint],
    pub activity: Option<&'a OptionsActivity>,
    pub skew: Option<&'a SkewSnapshot>,
    pub catalysts: Option<&'a CatalystContext>,
}

impl DistributionInputs<'_> {
    fn price(&self) -> Option<f64> {
        self.minute_bars
            .last()
            .or_else(|| self.daily_bars.last())
            .map(|b| b.close)
    }

    fn session_high(&self) -> Option<f64> {
        if self.minute_bars.is_empty() {
            return self.daily_bars.last().map(|b| b.high);
        }
        self.minute_bars
            .iter()
            .map(|b| b.high)
            .fold(None, |acc: Option<f64>, h| Some(acc.map_or(h, |a| a.max(h))))
    }
}

/// Distribution detector
pub struct DistributionDetector {
    config: DistributionConfig,
}

impl DistributionDetector {
    pub fn new(config: DistributionConfig) -> Self {
        Self { config }
    }

    pub fn analyze(&self, inputs: &DistributionInputs<'_>) -> DistributionSignal {
        let mut signals = DistributionSignals::default();
        let mut notes = Vec::new();

        let rvol = relative_volume(inputs.daily_bars, 20);
        self.price_volume(inputs, rvol, &mut signals);
        self.options_flow(inputs, &mut signals);
        let dark_pool = self.dark_pool(inputs);
        signals.repeated_sell_blocks = dark_pool.as_ref().map_or(false, |c| !c.suppressed);
        if let Some(cluster) = dark_pool.as_ref() {
            if cluster.suppressed {
                notes.push(format!(
                    "Dark-pool blocks at {:.2} suppressed by price context",
                    cluster.level
                ));
            }
        }

        let violence = if signals.repeated_sell_blocks {
            dark_pool.as_ref().map_or(0.0, |c| c.violence)
        } else {
            0.0
        };
        let boost = if signals.any() {
            self.catalyst_boost(inputs.catalysts)
        } else {
            0.0
        };
        let mut score = Self::score_signals(&signals, violence, boost);

        let mut blocks = Vec::new();
        let mut front_run_setup = false;
        if let Some(catalysts) = inputs.catalysts {
            if catalysts.earnings_within(self.config.earnings_block_days) {
                if signals.count(Bucket::Pre) >= 2 && signals.vwap_loss {
                    front_run_setup = true;
                    score = (score + FRONT_RUN_BONUS).min(1.0);
                    notes.push("Front-running earnings with PRE distribution".to_string());
                } else {
                    push_unique(&mut blocks, BlockReason::EarningsProximity);
                }
            }
            if catalysts.hard_to_borrow
                && catalysts.short_interest_pct >= self.config.squeeze_short_interest_pct
            {
                push_unique(&mut blocks, BlockReason::HardToBorrowSqueezeRisk);
            }
        }

        let priority = Self::priority(&signals);
        debug!(
            score,
            pre = signals.count(Bucket::Pre),
            post = signals.count(Bucket::Post),
            priority = ?priority,
            "Distribution analyzed"
        );

        DistributionSignal {
            score,
            signals,
            priority,
            relative_volume: rvol,
            dark_pool,
            boost,
            front_run_setup,
            blocks,
            notes,
        }
    }

    /// Weighted score for a signal set, clamped to [0, 1]
    pub fn score_signals(signals: &DistributionSignals, violence: f64, boost: f64) -> f64 {
        let pre = signals.weight(Bucket::Pre);
        let post = signals.weight(Bucket::Post);
        let mut score = PRE_MULTIPLIER * pre + POST_MULTIPLIER * post;

        if signals.count(Bucket::Pre) > signals.count(Bucket::Post) && pre > post {
            score += DOMINANCE_BONUS;
        }
        score += VIOLENCE_WEIGHT * violence.clamp(0.0, 1.0);
        score += boost.clamp(0.0, MAX_BOOST);
        score.clamp(0.0, 1.0)
    }

    fn priority(signals: &DistributionSignals) -> DistributionPriority {
        let pre = signals.count(Bucket::Pre);
        let post = signals.count(Bucket::Post);
        match (pre, post) {
            (0, 0) => DistributionPriority::None,
            (p, q) if p > q => DistributionPriority::PreBreakdown,
            (p, q) if q > p => DistributionPriority::PostBreakdown,
            _ => DistributionPriority::Mixed,
        }
    }

    fn price_volume(
        &self,
        inputs: &DistributionInputs<'_>,
        rvol: Option<f64>,
        signals: &mut DistributionSignals,
    ) {
        let daily = inputs.daily_bars;
        let n = daily.len();
        let price = inputs.price();

        // Flat price on rising volume
        if n >= 25 {
            let last5 = &daily[n - 5..];
            let closes: Vec<f64> = last5.iter().map(|b| b.close).collect();
            let low = closes.iter().copied().fold(f64::INFINITY, f64::min);
            let high = closes.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let recent_volume = mean(&last5.iter().map(|b| b.volume).collect::<Vec<_>>());
            let prior_volume = mean(&daily[n - 25..n - 5].iter().map(|b| b.volume).collect::<Vec<_>>());
            if let (Some(recent), Some(prior)) = (recent_volume, prior_volume) {
                signals.flat_price_rising_volume =
                    low > 0.0 && (high - low) / low < 0.02 && prior > 0.0 && recent >= 1.2 * prior;
            }
        }

        let (Some(current), Some(price)) = (daily.last(), price) else {
            return;
        };

        // Failed breakout against the prior 20-session high
        if n >= 21 {
            let prior_high = daily[n - 21..n - 1]
                .iter()
                .map(|b| b.high)
                .fold(f64::NEG_INFINITY, f64::max);
            let session_high = inputs.session_high().unwrap_or(current.high);
            signals.failed_breakout = session_high >= 0.995 * prior_high
                && price <= 0.98 * prior_high
                && rvol.map_or(false, |r| r >= 1.3);
        }

        // Lower highs while RSI holds up
        if n >= 20 {
            let start = n - 20;
            let highs: Vec<f64> = daily[start..].iter().map(|b| b.high).collect();
            if has_lower_high(&highs) {
                let swings = swing_highs(&highs);
                let closes: Vec<f64> = daily.iter().map(|b| b.close).collect();
                let rsi = rsi_series(&closes, 14);
                if let [.., (first, _), (second, _)] = swings.as_slice() {
                    if let (Some(a), Some(b)) = (rsi[start + first], rsi[start + second]) {
                        signals.lower_highs_flat_momentum = b >= a;
                    }
                }
            }
        }

        // VWAP loss with failed reclaims
        if let Some(vwap) = session_vwap(inputs.minute_bars) {
            signals.vwap_loss = price < vwap && count_failed_reclaims(inputs.minute_bars) >= 2;
        }

        let Some(prev) = n.checked_sub(2).map(|i| &daily[i]) else {
            return;
        };
        let change_pct = if prev.close > 0.0 {
            (price - prev.close) / prev.close * 100.0
        } else {
            0.0
        };

        // High relative-volume red day
        if let Some(rvol) = rvol {
            let red = price < current.open;
            let tier = if rvol >= 2.0 && red {
                Some(RvolTier::Extreme)
            } else if rvol >= 1.5 && change_pct < -1.5 {
                Some(RvolTier::High)
            } else if rvol >= 1.3 && change_pct < -3.0 {
                Some(RvolTier::Elevated)
            } else {
                None
            };
            signals.high_rvol_red_day = tier.is_some();
            signals.rvol_tier = tier;
        }

        // Gap down that never fills
        signals.gap_down_no_recovery = current.open <= 0.98 * prev.close
            && price <= current.open
            && inputs.session_high().unwrap_or(current.high) < prev.close;

        // Gap up that reverses through VWAP
        if current.open >= 1.01 * prev.close && price <= current.open * 0.98 {
            let opening_volume: f64 = inputs.minute_bars.iter().take(30).map(|b| b.volume).sum();
            let start = n.saturating_sub(21);
            let adv = mean(&daily[start..n - 1].iter().map(|b| b.volume).collect::<Vec<_>>());
            let opening_rvol = adv
                .filter(|a| *a > 0.0)
                .map(|a| opening_volume / (a * 30.0 / 390.0));
            let vwap_lost = session_vwap(inputs.minute_bars).map_or(false, |v| price < v);
            signals.gap_up_reversal = opening_rvol.map_or(false, |r| r >= 1.3) && vwap_lost;
        }

        // Three lower closes or three red sessions in a row
        if n >= 4 {
            let closes: Vec<f64> = daily[n - 4..].iter().map(|b| b.close).collect();
            let lower_closes = closes.windows(2).all(|w| w[1] < w[0]);
            let red_days = daily[n - 3..].iter().all(|b| b.is_red());
            signals.multi_day_weakness = lower_closes || red_days;
        }
    }

    fn options_flow(&self, inputs: &DistributionInputs<'_>, signals: &mut DistributionSignals) {
        let c = &self.config;

        let call_bid_premium: f64 = inputs
            .call_flow
            .iter()
            .filter(|e| e.option_type == OptionType::Call && e.side == TradeSide::Bid)
            .map(|e| e.premium)
            .sum();
        signals.call_selling_at_bid = call_bid_premium >= c.flow_premium_threshold;

        let put_ask_premium: f64 = inputs
            .put_flow
            .iter()
            .filter(|e| e.option_type == OptionType::Put && e.side == TradeSide::Ask)
            .map(|e| e.premium)
            .sum();
        signals.put_buying_at_ask = put_ask_premium >= c.flow_premium_threshold;

        signals.rising_put_oi = inputs
            .activity
            .map_or(false, |a| a.put_oi_change_pct >= c.put_oi_change_pct);

        signals.skew_steepening = inputs.skew.map_or(false, |s| {
            s.skew_change() >= c.skew_change_points || s.risk_reversal_flipped_bearish()
        });

        let (delta, gamma, vega) = greek_dollars(inputs.put_flow.iter().chain(inputs.call_flow));
        let hits = [
            delta >= c.delta_dollars,
            gamma >= c.gamma_dollars,
            vega >= c.vega_dollars,
        ]
        .iter()
        .filter(|h| **h)
        .count();
        signals.greek_weighted_bearish_flow = hits >= 2;
    }

    /// Largest qualifying cluster of sell prints, with the context guard applied
    fn dark_pool(&self, inputs: &DistributionInputs<'_>) -> Option<DarkPoolCluster> {
        let price = inputs.price()?;
        let sells: Vec<&DarkPoolPrint> = inputs
            .dark_pool
            .iter()
            .filter(|p| p.direction == PrintDirection::Sell && p.price > 0.0)
            .collect();

        let best = sells
            .iter()
            .map(|anchor| {
                let members: Vec<&&DarkPoolPrint> = sells
                    .iter()
                    .filter(|p| (p.price - anchor.price).abs() / anchor.price <= 0.001)
                    .collect();
                let shares: f64 = members.iter().map(|p| p.size).sum();
                (anchor.price, members.len(), shares)
            })
            .filter(|(_, count, shares)| {
                *count >= self.config.min_block_prints && *shares >= self.config.min_block_shares
            })
            .max_by(|a, b| a.2.total_cmp(&b.2))?;

        let (level, prints, shares) = best;
        if price > level * 1.002 {
            return None;
        }

        let below_vwap = session_vwap(inputs.minute_bars).map_or(false, |v| price < v);
        let failed_new_high = inputs.session_high().map_or(false, |h| price < 0.995 * h);
        let suppressed = !(below_vwap || failed_new_high);

        let violent = inputs
            .dark_pool
            .iter()
            .filter(|p| p.is_violent(self.config.violence_depth_multiple))
            .count();
        let violence = if inputs.dark_pool.is_empty() {
            0.0
        } else {
            violent as f64 / inputs.dark_pool.len() as f64
        };

        Some(DarkPoolCluster {
            level,
            prints,
            shares,
            suppressed,
            violence,
        })
    }

    fn catalyst_boost(&self, catalysts: Option<&CatalystContext>) -> f64 {
        let Some(ctx) = catalysts else {
            return 0.0;
        };
        let mut insider: f64 = 0.0;
        if ctx.has_c_level_sale() {
            insider += 0.10;
        }
        if ctx.insider_seller_count() >= 3 {
            insider += 0.10;
        }
        let mut boost = insider.min(0.15);
        // Sector-filtered upstream
        if ctx.congressional_sells >= 2 {
            boost += 0.05;
        }
        if ctx.is_post_earnings_negative(self.config.post_earnings_window_days) {
            boost += 0.10;
        }
        boost.min(MAX_BOOST)
    }
}

/// Delta, gamma (per 1% move) and vega dollars over bearish-aggression flow
pub fn greek_dollars<'a>(events: impl Iterator<Item = &'a OptionsFlowEvent>) -> (f64, f64, f64) {
    events
        .filter(|e| e.is_bearish_aggression())
        .fold((0.0, 0.0, 0.0), |(d, g, v), e| {
            let contracts = e.size as f64 * 100.0;
            let spot = e.underlying_price;
            (
                d + e.delta.abs() * contracts * spot,
                g + e.gamma.abs() * contracts * spot * spot * 0.01,
                v + e.vega.abs() * contracts,
            )
        })
}
