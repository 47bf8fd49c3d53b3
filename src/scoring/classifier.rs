//! Trade classifier
//!
//! Buckets a scored candidate into Class A (actionable), Class B (small
//! speculative size on high-beta names) or Class C (watch only), and
//! converts the class into a contract count.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::gates::BlockReason;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TradeClass {
    A,
    B,
    #[default]
    C,
}

impl TradeClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeClass::A => "A",
            TradeClass::B => "B",
            TradeClass::C => "C",
        }
    }

    pub fn is_tradeable(&self) -> bool {
        !matches!(self, TradeClass::C)
    }
}

impl fmt::Display for TradeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifier thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default = "default_class_a_min")]
    pub class_a_min_score: f64,
    #[serde(default = "default_class_b_min")]
    pub class_b_min_score: f64,
    #[serde(default = "default_class_b_max")]
    pub class_b_max_score: f64,
    /// Class B score at which size steps from 1 to 2 contracts
    #[serde(default = "default_class_b_upgrade")]
    pub class_b_upgrade_score: f64,
    #[serde(default = "default_full_contracts")]
    pub class_a_full_contracts: u32,
    #[serde(default = "default_partial_contracts")]
    pub class_a_contracts: u32,
}

fn default_class_a_min() -> f64 {
    0.68
}
fn default_class_b_min() -> f64 {
    0.25
}
fn default_class_b_max() -> f64 {
    0.45
}
fn default_class_b_upgrade() -> f64 {
    0.35
}
fn default_full_contracts() -> u32 {
    5
}
fn default_partial_contracts() -> u32 {
    3
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            class_a_min_score: default_class_a_min(),
            class_b_min_score: default_class_b_min(),
            class_b_max_score: default_class_b_max(),
            class_b_upgrade_score: default_class_b_upgrade(),
            class_a_full_contracts: default_full_contracts(),
            class_a_contracts: default_partial_contracts(),
        }
    }
}

/// What the classifier looks at for one candidate
#[derive(Debug, Clone, Default)]
pub struct ClassifierInputs<'a> {
    pub block_reasons: &'a [BlockReason],
    pub score: f64,
    pub has_archetype: bool,
    pub has_price_signal: bool,
    pub liquidity_vacuum: bool,
    pub dark_pool_blocks: bool,
    pub vwap_loss: bool,
    pub high_beta: bool,
    /// Size multiplier from the volatility gate
    pub size_multiplier: f64,
}

impl ClassifierInputs<'_> {
    fn confirmed(&self) -> bool {
        self.liquidity_vacuum || (self.dark_pool_blocks && self.vwap_loss)
    }

    fn fully_confirmed(&self) -> bool {
        self.liquidity_vacuum && self.dark_pool_blocks && self.vwap_loss
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TradeClassification {
    pub class: TradeClass,
    /// Contracts allowed by the class before volatility sizing
    pub max_contracts: u32,
    /// Contracts after the volatility size multiplier
    pub recommended_contracts: u32,
    pub reason: String,
}

impl TradeClassification {
    fn watch(reason: impl Into<String>) -> Self {
        Self {
            class: TradeClass::C,
            max_contracts: 0,
            recommended_contracts: 0,
            reason: reason.into(),
        }
    }
}

pub struct TradeClassifier {
    config: ClassifierConfig,
}

impl TradeClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    pub fn classify(&self, inputs: &ClassifierInputs<'_>) -> TradeClassification {
        if !inputs.block_reasons.is_empty() {
            let names: Vec<&str> = inputs.block_reasons.iter().map(|r| r.as_str()).collect();
            return TradeClassification::watch(format!("blocked: {}", names.join(", ")));
        }

        let cfg = &self.config;

        if inputs.score >= cfg.class_a_min_score
            && inputs.has_archetype
            && inputs.has_price_signal
            && inputs.confirmed()
        {
            let (max, label) = if inputs.fully_confirmed() {
                (cfg.class_a_full_contracts, "full confirmation")
            } else {
                (cfg.class_a_contracts, "partial confirmation")
            };
            return Self::sized(
                TradeClass::A,
                max,
                inputs.size_multiplier,
                format!("score {:.2} with archetype, {}", inputs.score, label),
            );
        }

        if inputs.score >= cfg.class_b_min_score
            && inputs.score <= cfg.class_b_max_score
            && inputs.high_beta
            && inputs.has_price_signal
        {
            let max = if inputs.score >= cfg.class_b_upgrade_score { 2 } else { 1 };
            return Self::sized(
                TradeClass::B,
                max,
                inputs.size_multiplier,
                format!("high-beta speculative at score {:.2}", inputs.score),
            );
        }

        TradeClassification::watch(self.watch_reason(inputs))
    }

    fn sized(class: TradeClass, max_contracts: u32, multiplier: f64, reason: String) -> TradeClassification {
        TradeClassification {
            class,
            max_contracts,
            recommended_contracts: recommended_size(max_contracts, multiplier),
            reason,
        }
    }

    fn watch_reason(&self, inputs: &ClassifierInputs<'_>) -> String {
        if inputs.dark_pool_blocks && !inputs.liquidity_vacuum && !inputs.vwap_loss {
            return "dark-pool-only setup without price confirmation".to_string();
        }
        if !inputs.has_price_signal {
            return "no price-based distribution signal".to_string();
        }
        if inputs.score >= self.config.class_a_min_score {
            if !inputs.has_archetype {
                return "no engine archetype".to_string();
            }
            return "no liquidity or dark-pool confirmation".to_string();
        }
        if inputs.score >= self.config.class_b_min_score
            && inputs.score <= self.config.class_b_max_score
        {
            return "speculative range but not a high-beta name".to_string();
        }
        format!("score {:.2} outside actionable ranges", inputs.score)
    }
}

/// `max(1, floor(max_contracts * multiplier))`, or zero when nothing is allowed
pub fn recommended_size(max_contracts: u32, multiplier: f64) -> u32 {
    if max_contracts == 0 {
        return 0;
    }
    let scaled = (max_contracts as f64 * multiplier.max(0.0)).floor() as u32;
    scaled.max(1)
}
