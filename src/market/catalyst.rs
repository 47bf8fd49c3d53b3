//! Catalyst context and early-warning levels
//!
//! Confirmatory inputs: these never trigger a candidate on their own, they only
//! boost or block what the analysis layers already found.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One reported insider sale
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsiderSale {
    pub insider: String,
    /// CEO/CFO/COO and similar
    #[serde(default)]
    pub is_c_level: bool,
    pub shares: f64,
    pub filed: NaiveDate,
}

/// Earnings, insider and borrow context for a symbol
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalystContext {
    /// Calendar days until the next earnings report
    #[serde(default)]
    pub days_to_earnings: Option<i64>,
    /// Calendar days since the last earnings report
    #[serde(default)]
    pub days_since_earnings: Option<i64>,
    /// Last report lowered guidance
    #[serde(default)]
    pub negative_guidance: bool,
    /// Insider sales in the last 30 days
    #[serde(default)]
    pub insider_sales: Vec<InsiderSale>,
    /// Congressional sell disclosures over the last 30 days, already filtered
    /// to the symbol's sector by the provider. Detectors count it as is.
    #[serde(default)]
    pub congressional_sells: u32,
    #[serde(default)]
    pub hard_to_borrow: bool,
    /// Short interest as percent of float
    #[serde(default)]
    pub short_interest_pct: f64,
}

impl CatalystContext {
    pub fn has_c_level_sale(&self) -> bool {
        self.insider_sales.iter().any(|s| s.is_c_level)
    }

    /// Distinct insiders selling
    pub fn insider_seller_count(&self) -> usize {
        let mut names: Vec<&str> = self.insider_sales.iter().map(|s| s.insider.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        names.len()
    }

    pub fn earnings_within(&self, days: i64) -> bool {
        self.days_to_earnings.map_or(false, |d| (0..=days).contains(&d))
    }

    pub fn is_post_earnings_negative(&self, window_days: i64) -> bool {
        self.negative_guidance
            && self
                .days_since_earnings
                .map_or(false, |d| (0..=window_days).contains(&d))
    }
}

/// Urgency reported by the upstream early-warning subsystem
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EarlyWarningLevel {
    #[default]
    None,
    Watch,
    Prepare,
    /// Highest urgency
    Act,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EarlyWarning {
    pub level: EarlyWarningLevel,
    /// Institutional pressure index, if reported
    #[serde(default)]
    pub pressure_index: Option<f64>,
}
