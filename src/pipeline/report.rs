//! Daily scan report

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cmp::Ordering;
use uuid::Uuid;

use super::candidate::Candidate;
use crate::cache::RegimeSource;
use crate::gates::MarketRegimeSnapshot;
use crate::scoring::TradeClass;

#[derive(Debug, Clone, Serialize)]
pub struct DailyReport {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub regime: MarketRegimeSnapshot,
    pub regime_source: RegimeSource,
    /// Symbols in the requested universe
    pub scanned: usize,
    /// Symbols that passed the shortlist screen and were analyzed
    pub shortlisted: usize,
    /// Analyzed symbols without any block reason
    pub passed_gates: usize,
    /// Analytics calls left in today's budget after the scan
    pub budget_remaining: u32,
    /// Ranked by score, then symbol
    pub candidates: Vec<Candidate>,
}

impl DailyReport {
    pub fn new(
        generated_at: DateTime<Utc>,
        regime: MarketRegimeSnapshot,
        regime_source: RegimeSource,
        scanned: usize,
        mut candidates: Vec<Candidate>,
        budget_remaining: u32,
    ) -> Self {
        rank(&mut candidates);
        let shortlisted = candidates.iter().filter(|c| c.passed_screen()).count();
        let passed_gates = candidates.iter().filter(|c| c.passed_gates()).count();
        Self {
            run_id: Uuid::new_v4(),
            generated_at,
            regime,
            regime_source,
            scanned,
            shortlisted,
            passed_gates,
            budget_remaining,
            candidates,
        }
    }

    pub fn actionable(&self) -> impl Iterator<Item = &Candidate> {
        self.candidates.iter().filter(|c| c.trade_class().is_tradeable())
    }

    pub fn count_class(&self, class: TradeClass) -> usize {
        self.candidates.iter().filter(|c| c.trade_class() == class).count()
    }

    pub fn top(&self, n: usize) -> &[Candidate] {
        &self.candidates[..n.min(self.candidates.len())]
    }

    pub fn summary(&self) -> String {
        format!(
            "run {} | regime {} (tradeable: {}, {:?}) | scanned {} | shortlisted {} | passed gates {} | A {} B {} C {}",
            self.run_id,
            self.regime.label,
            self.regime.tradeable,
            self.regime_source,
            self.scanned,
            self.shortlisted,
            self.passed_gates,
            self.count_class(TradeClass::A),
            self.count_class(TradeClass::B),
            self.count_class(TradeClass::C),
        )
    }
}

/// Score descending, then symbol ascending
pub fn rank(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.symbol.cmp(&b.symbol))
    });
}
