//! Candidate aggregate
//!
//! One candidate per analyzed symbol, filled in layer by layer. Any block
//! reason forces the score to zero.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::engines::{AccelerationWindow, DistributionSignal, LiquidityVacuumSignal};
use crate::gates::{push_unique, BlockReason, DealerAnalysis, RegimeLabel, VolatilityDecision};
use crate::market::EarlyWarningLevel;
use crate::scoring::{CompositeScore, TradeClass, TradeClassification};
use crate::selection::SelectedContract;

#[derive(Debug, Clone, Serialize)]
pub struct Candidate {
    pub symbol: String,
    pub evaluated_at: DateTime<Utc>,
    pub spot: Option<f64>,
    pub regime_label: Option<RegimeLabel>,
    pub dealer: Option<DealerAnalysis>,
    pub distribution: DistributionSignal,
    pub liquidity: LiquidityVacuumSignal,
    pub acceleration: AccelerationWindow,
    pub composite: CompositeScore,
    /// Final score; 0.0 whenever any block reason is present
    pub score: f64,
    pub block_reasons: Vec<BlockReason>,
    pub volatility: Option<VolatilityDecision>,
    pub early_warning: EarlyWarningLevel,
    pub classification: TradeClassification,
    pub contract: Option<SelectedContract>,
    pub notes: Vec<String>,
}

impl Candidate {
    pub fn new(symbol: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.into(),
            evaluated_at: at,
            spot: None,
            regime_label: None,
            dealer: None,
            distribution: DistributionSignal::default(),
            liquidity: LiquidityVacuumSignal::default(),
            acceleration: AccelerationWindow::default(),
            composite: CompositeScore::default(),
            score: 0.0,
            block_reasons: Vec::new(),
            volatility: None,
            early_warning: EarlyWarningLevel::None,
            classification: TradeClassification::default(),
            contract: None,
            notes: Vec::new(),
        }
    }

    /// Zero-score candidate for a symbol whose analysis could not complete
    pub fn unavailable(symbol: impl Into<String>, at: DateTime<Utc>, note: impl Into<String>) -> Self {
        let mut candidate = Self::new(symbol, at);
        candidate.notes.push(note.into());
        candidate.block(BlockReason::DataUnavailable);
        candidate.classification.reason = "data unavailable".to_string();
        candidate
    }

    /// Attach a block reason and zero the score
    pub fn block(&mut self, reason: BlockReason) {
        push_unique(&mut self.block_reasons, reason);
        self.score = 0.0;
        self.composite.score = 0.0;
        self.composite.actionable = false;
    }

    pub fn is_blocked(&self) -> bool {
        !self.block_reasons.is_empty()
    }

    /// Priced and past the shortlist screen, whether or not analysis completed
    pub fn passed_screen(&self) -> bool {
        self.spot.is_some()
    }

    pub fn passed_gates(&self) -> bool {
        self.block_reasons.is_empty()
    }

    pub fn is_actionable(&self) -> bool {
        !self.is_blocked() && self.composite.actionable
    }

    pub fn trade_class(&self) -> TradeClass {
        self.classification.class
    }

    /// One-line summary for logs and terminal output
    pub fn summary(&self) -> String {
        let contract = self
            .contract
            .as_ref()
            .map(|c| format!(" {} x{}", c.contract.symbol, self.classification.recommended_contracts))
            .unwrap_or_default();
        if self.is_blocked() {
            let reasons: Vec<&str> = self.block_reasons.iter().map(|r| r.as_str()).collect();
            format!("{:<6} {:.3} [{}] blocked: {}", self.symbol, self.score, self.trade_class(), reasons.join(", "))
        } else {
            format!("{:<6} {:.3} [{}]{}", self.symbol, self.score, self.trade_class(), contract)
        }
    }
}
