//! JSON snapshot provider
//!
//! Serves every provider trait from a single pre-fetched [`MarketSnapshot`].
//! Used by the CLI for offline scans and by the test suites.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info};

use super::{ChainQuery, FlowAnalytics, OptionsData, PriceHistory, ProviderError, ProviderResult};
use crate::error::{Error, Result};
use crate::market::{
    CatalystContext, DarkPoolPrint, EarlyWarning, GammaExposureSnapshot, IvSnapshot,
    OptionsActivity, OptionsContract, OptionsFlowEvent, PriceBar, Quote, SkewSnapshot,
};

/// Everything known about one symbol at snapshot time
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SymbolSnapshot {
    #[serde(default)]
    pub daily_bars: Vec<PriceBar>,
    #[serde(default)]
    pub minute_bars: Vec<PriceBar>,
    #[serde(default)]
    pub quote: Option<Quote>,
    #[serde(default)]
    pub chain: Vec<OptionsContract>,
    #[serde(default)]
    pub put_flow: Vec<OptionsFlowEvent>,
    #[serde(default)]
    pub call_selling_flow: Vec<OptionsFlowEvent>,
    #[serde(default)]
    pub dark_pool: Vec<DarkPoolPrint>,
    #[serde(default)]
    pub gex: Option<GammaExposureSnapshot>,
    #[serde(default)]
    pub oi_change: Option<OptionsActivity>,
    #[serde(default)]
    pub skew: Option<SkewSnapshot>,
    #[serde(default)]
    pub iv: Option<IvSnapshot>,
    #[serde(default)]
    pub catalysts: Option<CatalystContext>,
    #[serde(default)]
    pub early_warning: Option<EarlyWarning>,
}

/// A full market snapshot keyed by symbol
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketSnapshot {
    #[serde(default)]
    pub as_of: Option<DateTime<Utc>>,
    #[serde(default)]
    pub symbols: HashMap<String, SymbolSnapshot>,
}

impl MarketSnapshot {
    pub fn with_symbol(mut self, symbol: &str, data: SymbolSnapshot) -> Self {
        self.symbols.insert(symbol.to_uppercase(), data);
        self
    }
}

/// Provider backed by an in-memory [`MarketSnapshot`]
pub struct SnapshotProvider {
    snapshot: MarketSnapshot,
    requests: AtomicUsize,
}

impl SnapshotProvider {
    pub fn new(snapshot: MarketSnapshot) -> Self {
        Self {
            snapshot,
            requests: AtomicUsize::new(0),
        }
    }

    /// Load a snapshot from a JSON file
    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::SnapshotLoad(format!("{}: {}", path.display(), e)))?;
        let snapshot: MarketSnapshot = serde_json::from_str(&content)
            .map_err(|e| Error::SnapshotLoad(format!("{}: {}", path.display(), e)))?;

        info!(
            path = %path.display(),
            symbols = snapshot.symbols.len(),
            "Loaded market snapshot"
        );
        Ok(Self::new(snapshot))
    }

    /// Symbols present in the snapshot, sorted
    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.snapshot.symbols.keys().cloned().collect();
        symbols.sort();
        symbols
    }

    /// Number of provider calls served so far
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::Relaxed)
    }

    fn symbol(&self, symbol: &str) -> ProviderResult<&SymbolSnapshot> {
        self.requests.fetch_add(1, Ordering::Relaxed);
        debug!(symbol = %symbol, "Snapshot lookup");
        self.snapshot
            .symbols
            .get(&symbol.to_uppercase())
            .ok_or_else(|| ProviderError::NotFound(symbol.to_string()))
    }

    fn field<T: Clone>(value: &Option<T>, symbol: &str, what: &str) -> ProviderResult<T> {
        value
            .clone()
            .ok_or_else(|| ProviderError::NotFound(format!("{} {}", symbol, what)))
    }
}

fn tail(bars: &[PriceBar], count: usize) -> Vec<PriceBar> {
    bars[bars.len().saturating_sub(count)..].to_vec()
}

#[async_trait]
impl PriceHistory for SnapshotProvider {
    async fn get_daily_bars(&self, symbol: &str, days: usize) -> ProviderResult<Vec<PriceBar>> {
        let data = self.symbol(symbol)?;
        if data.daily_bars.is_empty() {
            return Err(ProviderError::NotFound(format!("{} daily bars", symbol)));
        }
        Ok(tail(&data.daily_bars, days))
    }

    async fn get_minute_bars(
        &self,
        symbol: &str,
        minutes: usize,
    ) -> ProviderResult<Vec<PriceBar>> {
        let data = self.symbol(symbol)?;
        if data.minute_bars.is_empty() {
            return Err(ProviderError::NotFound(format!("{} minute bars", symbol)));
        }
        Ok(tail(&data.minute_bars, minutes))
    }

    async fn get_latest_quote(&self, symbol: &str) -> ProviderResult<Quote> {
        let data = self.symbol(symbol)?;
        Self::field(&data.quote, symbol, "quote")
    }

    async fn get_latest_bar(&self, symbol: &str) -> ProviderResult<PriceBar> {
        let data = self.symbol(symbol)?;
        data.minute_bars
            .last()
            .or_else(|| data.daily_bars.last())
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(format!("{} latest bar", symbol)))
    }
}

#[async_trait]
impl OptionsData for SnapshotProvider {
    async fn get_options_chain(
        &self,
        underlying: &str,
        query: &ChainQuery,
    ) -> ProviderResult<Vec<OptionsContract>> {
        let data = self.symbol(underlying)?;
        Ok(data
            .chain
            .iter()
            .filter(|c| query.matches(c))
            .cloned()
            .collect())
    }

    async fn get_options_quotes(&self, symbols: &[String]) -> ProviderResult<Vec<OptionsContract>> {
        self.requests.fetch_add(1, Ordering::Relaxed);
        let found: Vec<OptionsContract> = self
            .snapshot
            .symbols
            .values()
            .flat_map(|s| s.chain.iter())
            .filter(|c| symbols.contains(&c.symbol))
            .cloned()
            .collect();
        Ok(found)
    }
}

#[async_trait]
impl FlowAnalytics for SnapshotProvider {
    async fn get_put_flow(&self, symbol: &str) -> ProviderResult<Vec<OptionsFlowEvent>> {
        Ok(self.symbol(symbol)?.put_flow.clone())
    }

    async fn get_call_selling_flow(&self, symbol: &str) -> ProviderResult<Vec<OptionsFlowEvent>> {
        Ok(self.symbol(symbol)?.call_selling_flow.clone())
    }

    async fn get_dark_pool_flow(&self, symbol: &str) -> ProviderResult<Vec<DarkPoolPrint>> {
        Ok(self.symbol(symbol)?.dark_pool.clone())
    }

    async fn get_gex_data(&self, symbol: &str) -> ProviderResult<GammaExposureSnapshot> {
        let data = self.symbol(symbol)?;
        Self::field(&data.gex, symbol, "gex")
    }

    async fn get_oi_change(&self, symbol: &str) -> ProviderResult<OptionsActivity> {
        let data = self.symbol(symbol)?;
        Self::field(&data.oi_change, symbol, "oi change")
    }

    async fn get_skew(&self, symbol: &str) -> ProviderResult<SkewSnapshot> {
        let data = self.symbol(symbol)?;
        Self::field(&data.skew, symbol, "skew")
    }

    async fn get_iv_rank(&self, symbol: &str) -> ProviderResult<IvSnapshot> {
        let data = self.symbol(symbol)?;
        Self::field(&data.iv, symbol, "iv")
    }

    async fn get_catalysts(&self, symbol: &str) -> ProviderResult<CatalystContext> {
        let data = self.symbol(symbol)?;
        Self::field(&data.catalysts, symbol, "catalysts")
    }

    async fn get_early_warning(&self, symbol: &str) -> ProviderResult<EarlyWarning> {
        let data = self.symbol(symbol)?;
        Self::field(&data.early_warning, symbol, "early warning")
    }
}
