//! Upstream data providers
//!
//! The scanner never talks to a vendor directly. Price history, options
//! reference data and flow analytics arrive through these async traits, and
//! every method returns an explicit [`ProviderError`] that the analysis layers
//! map to a neutral default.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::market::{
    CatalystContext, DarkPoolPrint, EarlyWarning, GammaExposureSnapshot, IvSnapshot,
    OptionType, OptionsActivity, OptionsContract, OptionsFlowEvent, PriceBar, Quote,
    SkewSnapshot,
};

pub mod snapshot;

pub use snapshot::{MarketSnapshot, SnapshotProvider, SymbolSnapshot};

/// Failure talking to an upstream vendor
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("upstream timeout after {0}ms")]
    Timeout(u64),

    #[error("malformed upstream response: {0}")]
    Malformed(String),

    #[error("upstream unavailable: {0}")]
    Unavailable(String),

    #[error("no data for {0}")]
    NotFound(String),

    #[error("daily call quota exhausted")]
    QuotaExhausted,
}

impl ProviderError {
    /// Transient failures worth retrying on the next scan
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Timeout(_) | ProviderError::Unavailable(_))
    }
}

pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Filter for an options chain request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChainQuery {
    pub expiration: Option<NaiveDate>,
    pub option_type: Option<OptionType>,
    pub min_strike: Option<f64>,
    pub max_strike: Option<f64>,
}

impl ChainQuery {
    pub fn puts() -> Self {
        Self {
            option_type: Some(OptionType::Put),
            ..Default::default()
        }
    }

    pub fn with_strikes(mut self, min: f64, max: f64) -> Self {
        self.min_strike = Some(min);
        self.max_strike = Some(max);
        self
    }

    /// Whether a contract passes this filter
    pub fn matches(&self, contract: &OptionsContract) -> bool {
        self.expiration.map_or(true, |e| contract.expiration == e)
            && self.option_type.map_or(true, |t| contract.option_type == t)
            && self.min_strike.map_or(true, |s| contract.strike >= s)
            && self.max_strike.map_or(true, |s| contract.strike <= s)
    }
}

/// Daily and intraday price history
#[async_trait]
pub trait PriceHistory: Send + Sync {
    /// Most recent `days` daily bars, oldest first; the last bar is the current session
    async fn get_daily_bars(&self, symbol: &str, days: usize) -> ProviderResult<Vec<PriceBar>>;

    /// Most recent `minutes` one-minute bars of the current session, oldest first
    async fn get_minute_bars(&self, symbol: &str, minutes: usize)
        -> ProviderResult<Vec<PriceBar>>;

    async fn get_latest_quote(&self, symbol: &str) -> ProviderResult<Quote>;

    async fn get_latest_bar(&self, symbol: &str) -> ProviderResult<PriceBar>;
}

/// Options reference data and quotes
#[async_trait]
pub trait OptionsData: Send + Sync {
    async fn get_options_chain(
        &self,
        underlying: &str,
        query: &ChainQuery,
    ) -> ProviderResult<Vec<OptionsContract>>;

    async fn get_options_quotes(&self, symbols: &[String]) -> ProviderResult<Vec<OptionsContract>>;
}

/// Flow and positioning analytics
#[async_trait]
pub trait FlowAnalytics: Send + Sync {
    async fn get_put_flow(&self, symbol: &str) -> ProviderResult<Vec<OptionsFlowEvent>>;

    async fn get_call_selling_flow(&self, symbol: &str) -> ProviderResult<Vec<OptionsFlowEvent>>;

    async fn get_dark_pool_flow(&self, symbol: &str) -> ProviderResult<Vec<DarkPoolPrint>>;

    async fn get_gex_data(&self, symbol: &str) -> ProviderResult<GammaExposureSnapshot>;

    async fn get_oi_change(&self, symbol: &str) -> ProviderResult<OptionsActivity>;

    async fn get_skew(&self, symbol: &str) -> ProviderResult<SkewSnapshot>;

    async fn get_iv_rank(&self, symbol: &str) -> ProviderResult<IvSnapshot>;

    /// Earnings, insider and borrow context (not every vendor carries it)
    async fn get_catalysts(&self, symbol: &str) -> ProviderResult<CatalystContext> {
        Err(ProviderError::NotFound(format!("{} catalysts", symbol)))
    }

    /// Early-warning level from the upstream alert subsystem
    async fn get_early_warning(&self, symbol: &str) -> ProviderResult<EarlyWarning> {
        Err(ProviderError::NotFound(format!("{} early warning", symbol)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::Greeks;

    #[test]
    fn test_chain_query_matches() {
        let contract = OptionsContract {
            symbol: "XYZ250321P00045000".to_string(),
            underlying: "XYZ".to_string(),
            option_type: OptionType::Put,
            strike: 45.0,
            expiration: NaiveDate::from_ymd_opt(2025, 3, 21).unwrap(),
            bid: 1.0,
            ask: 1.1,
            last: 1.05,
            open_interest: 500,
            volume: 20,
            greeks: Greeks::default(),
            days_to_expiry: 9,
        };

        assert!(ChainQuery::default().matches(&contract));
        assert!(ChainQuery::puts().with_strikes(40.0, 46.0).matches(&contract));
        assert!(!ChainQuery::puts().with_strikes(46.0, 50.0).matches(&contract));

        let calls = ChainQuery {
            option_type: Some(OptionType::Call),
            ..Default::default()
        };
        assert!(!calls.matches(&contract));
    }

    #[test]
    fn test_transient_errors() {
        assert!(ProviderError::Timeout(500).is_transient());
        assert!(!ProviderError::QuotaExhausted.is_transient());
        assert!(!ProviderError::NotFound("x".into()).is_transient());
    }
}
