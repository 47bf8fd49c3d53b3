//! Composite scorer
//!
//! Folds the layer outputs into one 0.0-1.0 score. A blocked candidate always
//! scores exactly zero.

use serde::{Deserialize, Serialize};

use crate::engines::{AccelerationWindow, DistributionSignal, LiquidityVacuumSignal};
use crate::market::{CatalystContext, FlowSentiment, OptionsFlowEvent};

/// Component weights; they sum to 1.0
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringWeights {
    #[serde(default = "default_distribution")]
    pub distribution: f64,
    #[serde(default = "default_dealer")]
    pub dealer: f64,
    #[serde(default = "default_liquidity")]
    pub liquidity: f64,
    #[serde(default = "default_flow")]
    pub options_flow: f64,
    #[serde(default = "default_catalyst")]
    pub catalyst: f64,
    #[serde(default = "default_sentiment")]
    pub sentiment: f64,
    #[serde(default = "default_technical")]
    pub technical: f64,
}

fn default_distribution() -> f64 {
    0.30
}
fn default_dealer() -> f64 {
    0.20
}
fn default_liquidity() -> f64 {
    0.15
}
fn default_flow() -> f64 {
    0.15
}
fn default_catalyst() -> f64 {
    0.10
}
fn default_sentiment() -> f64 {
    0.05
}
fn default_technical() -> f64 {
    0.05
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            distribution: default_distribution(),
            dealer: default_dealer(),
            liquidity: default_liquidity(),
            options_flow: default_flow(),
            catalyst: default_catalyst(),
            sentiment: default_sentiment(),
            technical: default_technical(),
        }
    }
}

impl ScoringWeights {
    pub fn total(&self) -> f64 {
        self.distribution
            + self.dealer
            + self.liquidity
            + self.options_flow
            + self.catalyst
            + self.sentiment
            + self.technical
    }
}

/// Scoring configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default)]
    pub weights: ScoringWeights,

    /// Minimum score for an actionable (Class A eligible) candidate
    #[serde(default = "default_actionable_threshold")]
    pub actionable_threshold: f64,

    /// Session change (%) above which the day counts as flat or up
    #[serde(default = "default_flat_session_pct")]
    pub flat_session_pct: f64,
}

fn default_actionable_threshold() -> f64 {
    0.68
}
fn default_flat_session_pct() -> f64 {
    -0.5
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: ScoringWeights::default(),
            actionable_threshold: default_actionable_threshold(),
            flat_session_pct: default_flat_session_pct(),
        }
    }
}

/// Per-component sub-scores, each 0.0-1.0
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreComponents {
    pub distribution: f64,
    pub dealer: f64,
    pub liquidity: f64,
    pub options_flow: f64,
    pub catalyst: f64,
    pub sentiment: f64,
    pub technical: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CompositeScore {
    pub score: f64,
    pub components: ScoreComponents,
    pub actionable: bool,
}

/// Everything the scorer reads
#[derive(Debug, Clone)]
pub struct CompositeInputs<'a> {
    pub blocked: bool,
    pub distribution: &'a DistributionSignal,
    pub dealer_score: f64,
    pub liquidity: &'a LiquidityVacuumSignal,
    pub acceleration: &'a AccelerationWindow,
    pub catalysts: Option<&'a CatalystContext>,
    /// Share of flow premium tagged bearish, when any flow exists
    pub bearish_premium_share: Option<f64>,
    /// Current session change in percent
    pub session_change_pct: f64,
}

/// Composite scorer
pub struct CompositeScorer {
    config: ScoringConfig,
}

impl CompositeScorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn actionable_threshold(&self) -> f64 {
        self.config.actionable_threshold
    }

    pub fn score(&self, inputs: &CompositeInputs<'_>) -> CompositeScore {
        let components = self.components(inputs);
        if inputs.blocked {
            return CompositeScore {
                score: 0.0,
                components,
                actionable: false,
            };
        }

        let w = &self.config.weights;
        let score = (w.distribution * components.distribution
            + w.dealer * components.dealer
            + w.liquidity * components.liquidity
            + w.options_flow * components.options_flow
            + w.catalyst * components.catalyst
            + w.sentiment * components.sentiment
            + w.technical * components.technical)
            .clamp(0.0, 1.0);

        CompositeScore {
            score,
            components,
            actionable: score >= self.config.actionable_threshold,
        }
    }

    fn components(&self, inputs: &CompositeInputs<'_>) -> ScoreComponents {
        let signals = &inputs.distribution.signals;

        let mut flow: f64 = 0.0;
        if signals.put_buying_at_ask {
            flow += 0.30;
        }
        if signals.call_selling_at_bid {
            flow += 0.30;
        }
        if signals.rising_put_oi {
            flow += 0.20;
        }
        if signals.skew_steepening {
            flow += 0.20;
        }

        let accel = inputs.acceleration;
        let technical = 0.25
            * [
                accel.weakness.below_vwap,
                accel.weakness.below_ema20,
                accel.weakness.below_prior_low,
                accel.failed_reclaim,
            ]
            .iter()
            .filter(|t| **t)
            .count() as f64;

        let sentiment = match inputs.bearish_premium_share {
            Some(share) if inputs.session_change_pct > self.config.flat_session_pct => {
                ((share - 0.5) * 2.0).clamp(0.0, 1.0)
            }
            _ => 0.0,
        };

        ScoreComponents {
            distribution: inputs.distribution.score.clamp(0.0, 1.0),
            dealer: inputs.dealer_score.clamp(0.0, 1.0),
            liquidity: inputs.liquidity.score.clamp(0.0, 1.0),
            options_flow: flow.min(1.0),
            catalyst: catalyst_score(inputs.catalysts),
            sentiment,
            technical,
        }
    }
}

/// Catalyst sub-score from guidance and earnings timing
pub fn catalyst_score(catalysts: Option<&CatalystContext>) -> f64 {
    let Some(ctx) = catalysts else {
        return 0.0;
    };
    if ctx.is_post_earnings_negative(10) {
        return 1.0;
    }
    match ctx.days_to_earnings {
        Some(4..=7) => 1.0,
        Some(8..=14) => 0.5,
        _ => 0.0,
    }
}

/// Share of total flow premium that is bearish, `None` without flow
pub fn bearish_premium_share<'a>(events: impl Iterator<Item = &'a OptionsFlowEvent>) -> Option<f64> {
    let (bearish, total) = events.fold((0.0, 0.0), |(b, t), e| {
        let is_bearish = e.sentiment == FlowSentiment::Bearish
            || (e.sentiment == FlowSentiment::Neutral && e.is_bearish_aggression());
        (if is_bearish { b + e.premium } else { b }, t + e.premium)
    });
    if total > 0.0 {
        Some(bearish / total)
    } else {
        None
    }
}
