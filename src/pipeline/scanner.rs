//! Scanner orchestration
//!
//! One regime lookup per scan, then one bounded task per symbol:
//! fetch (budgeted) -> dealer gate -> distribution -> liquidity (+sector
//! peers) -> acceleration -> composite score -> volatility gate -> trade
//! class -> contract selection. A failing symbol degrades to a zero-score
//! candidate and never aborts the batch.

use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::candidate::Candidate;
use super::report::DailyReport;
use crate::cache::{CallBudget, Clock, MarketHours, RegimeCache, RegimeSource};
use crate::config::{is_valid_ticker, Config, UniverseConfig};
use crate::engines::{
    AccelerationClassifier, AccelerationInputs, DistributionDetector, DistributionInputs,
    LiquidityDetector, LiquidityInputs, LiquiditySignals, SectorPeer,
};
use crate::error::{Error, Result};
use crate::gates::{
    BenchmarkPosition, BlockReason, DealerGate, DealerInputs, MarketRegimeGate,
    MarketRegimeSnapshot, RegimeInputs, VolatilityGate,
};
use crate::market::indicators::{atr, pct_change, session_vwap};
use crate::market::{GammaExposureSnapshot, PriceBar};
use crate::provider::{
    ChainQuery, FlowAnalytics, OptionsData, PriceHistory, ProviderError, ProviderResult,
};
use crate::scoring::{
    bearish_premium_share, ClassifierInputs, CompositeInputs, CompositeScorer, TradeClassifier,
};
use crate::selection::{ContractSelector, SelectionRequest};

/// Scan orchestration settings
#[derive(Debug, Clone, Deserialize)]
pub struct ScannerConfig {
    /// Symbols analyzed concurrently
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Per-symbol analysis deadline (seconds)
    #[serde(default = "default_symbol_timeout_secs")]
    pub symbol_timeout_secs: u64,

    #[serde(default = "default_daily_lookback")]
    pub daily_lookback: usize,

    #[serde(default = "default_minute_lookback")]
    pub minute_lookback: usize,

    /// Budget reserved per symbol before its analytics fan-out
    #[serde(default = "default_analytics_calls")]
    pub analytics_calls_per_symbol: u32,

    /// Shortlist screen: minimum spot price
    #[serde(default = "default_min_price")]
    pub min_price: f64,

    /// Shortlist screen: minimum 20-day average daily volume
    #[serde(default = "default_min_avg_volume")]
    pub min_avg_volume: f64,

    /// Put chain depth below spot, as a fraction of spot
    #[serde(default = "default_chain_depth")]
    pub chain_depth: f64,

    #[serde(default = "default_max_sector_peers")]
    pub max_sector_peers: usize,

    /// Bypass the regime cache on every scan
    #[serde(default)]
    pub force_regime_refresh: bool,
}

fn default_max_concurrency() -> usize {
    8
}
fn default_symbol_timeout_secs() -> u64 {
    20
}
fn default_daily_lookback() -> usize {
    260
}
fn default_minute_lookback() -> usize {
    390
}
fn default_analytics_calls() -> u32 {
    9
}
fn default_min_price() -> f64 {
    5.0
}
fn default_min_avg_volume() -> f64 {
    250_000.0
}
fn default_chain_depth() -> f64 {
    0.25
}
fn default_max_sector_peers() -> usize {
    5
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            symbol_timeout_secs: default_symbol_timeout_secs(),
            daily_lookback: default_daily_lookback(),
            minute_lookback: default_minute_lookback(),
            analytics_calls_per_symbol: default_analytics_calls(),
            min_price: default_min_price(),
            min_avg_volume: default_min_avg_volume(),
            chain_depth: default_chain_depth(),
            max_sector_peers: default_max_sector_peers(),
            force_regime_refresh: false,
        }
    }
}

/// Upstream handles the scanner reads from
#[derive(Clone)]
pub struct Providers {
    pub prices: Arc<dyn PriceHistory>,
    pub options: Arc<dyn OptionsData>,
    pub flow: Arc<dyn FlowAnalytics>,
}

impl Providers {
    /// One backend serving every trait
    pub fn shared<P>(provider: Arc<P>) -> Self
    where
        P: PriceHistory + OptionsData + FlowAnalytics + 'static,
    {
        Self {
            prices: provider.clone(),
            options: provider.clone(),
            flow: provider,
        }
    }
}

/// Per-scan memo tables, dropped when the scan ends
#[derive(Default)]
struct ScanContext {
    gex: DashMap<String, Arc<GammaExposureSnapshot>>,
    liquidity: DashMap<String, Option<LiquiditySignals>>,
}

/// Gate reasons from the timing layer that block a candidate outright
fn is_timing_block(reason: BlockReason) -> bool {
    matches!(
        reason,
        BlockReason::LateEntry | BlockReason::IvUnreasonable | BlockReason::SnapbackOnly
    )
}

/// Put scanner
pub struct PutScanner {
    scanner: ScannerConfig,
    universe: UniverseConfig,
    providers: Providers,
    clock: Arc<dyn Clock>,
    hours: Arc<dyn MarketHours>,
    budget: Arc<CallBudget>,
    cache: RegimeCache,
    regime_gate: MarketRegimeGate,
    dealer_gate: DealerGate,
    volatility_gate: VolatilityGate,
    distribution: DistributionDetector,
    liquidity: LiquidityDetector,
    acceleration: AccelerationClassifier,
    scorer: CompositeScorer,
    classifier: TradeClassifier,
    selector: ContractSelector,
}

impl PutScanner {
    pub fn new(
        config: &Config,
        providers: Providers,
        clock: Arc<dyn Clock>,
        hours: Arc<dyn MarketHours>,
    ) -> Self {
        let budget = Arc::new(CallBudget::new(
            config.cache.daily_call_limit,
            Arc::clone(&clock),
            Arc::clone(&hours),
        ));
        let cache = RegimeCache::new(
            config.cache.clone(),
            Arc::clone(&clock),
            Arc::clone(&hours),
            Arc::clone(&budget),
        );

        Self {
            scanner: config.scanner.clone(),
            universe: config.universe.clone(),
            providers,
            clock,
            hours,
            budget,
            cache,
            regime_gate: MarketRegimeGate::new(config.regime.clone()),
            dealer_gate: DealerGate::new(config.dealer.clone()),
            volatility_gate: VolatilityGate::new(config.volatility.clone()),
            distribution: DistributionDetector::new(config.distribution.clone()),
            liquidity: LiquidityDetector::new(config.liquidity.clone()),
            acceleration: AccelerationClassifier::new(config.acceleration.clone()),
            scorer: CompositeScorer::new(config.scoring.clone()),
            classifier: TradeClassifier::new(config.classifier.clone()),
            selector: ContractSelector::new(config.selection.clone(), config.scoring.actionable_threshold),
        }
    }

    pub fn budget(&self) -> &Arc<CallBudget> {
        &self.budget
    }

    pub fn cache(&self) -> &RegimeCache {
        &self.cache
    }

    /// Current regime, from cache when possible
    pub async fn get_cached_regime(&self, force_refresh: bool) -> MarketRegimeSnapshot {
        let ctx = ScanContext::default();
        self.regime(force_refresh, &ctx).await.0
    }

    /// Scan a universe (the configured one when `None`) and rank the results
    pub async fn run_daily_pipeline(&self, universe: Option<Vec<String>>) -> DailyReport {
        let requested = universe.unwrap_or_else(|| self.universe.symbols.clone());
        let scanned = requested.len();
        let symbols = normalize_universe(requested);
        let ctx = ScanContext::default();

        let (regime, source) = self.regime(self.scanner.force_regime_refresh, &ctx).await;
        info!(
            label = %regime.label,
            tradeable = regime.tradeable,
            scannable = regime.scannable,
            source = ?source,
            symbols = symbols.len(),
            "Starting scan"
        );

        if !regime.scannable {
            warn!(reasons = ?regime.block_reasons, "Regime not scannable, skipping symbol analysis");
            let remaining = self.budget.remaining().await;
            return DailyReport::new(self.clock.now(), regime, source, scanned, Vec::new(), remaining);
        }

        let timeout = Duration::from_secs(self.scanner.symbol_timeout_secs);
        let regime_ref = &regime;
        let ctx_ref = &ctx;
        let outcomes: Vec<Option<Candidate>> = stream::iter(symbols.iter())
            .map(|symbol| async move {
                match tokio::time::timeout(timeout, self.evaluate_symbol(symbol, regime_ref, ctx_ref, true)).await {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        warn!(symbol = %symbol, timeout_secs = timeout.as_secs(), "Symbol analysis timed out");
                        Some(Candidate::unavailable(symbol.clone(), self.clock.now(), "analysis timed out"))
                    }
                }
            })
            .buffer_unordered(self.scanner.max_concurrency.max(1))
            .collect()
            .await;

        let candidates: Vec<Candidate> = outcomes.into_iter().flatten().collect();
        let remaining = self.budget.remaining().await;
        let report = DailyReport::new(self.clock.now(), regime, source, scanned, candidates, remaining);
        info!("{}", report.summary());
        report
    }

    /// Analyze one symbol without the shortlist screen
    pub async fn run_single_symbol(&self, symbol: &str) -> Result<Candidate> {
        let symbol = symbol.trim().to_uppercase();
        if !is_valid_ticker(&symbol) {
            return Err(Error::InvalidSymbol(symbol));
        }

        let ctx = ScanContext::default();
        let (regime, _) = self.regime(self.scanner.force_regime_refresh, &ctx).await;
        let timeout = Duration::from_secs(self.scanner.symbol_timeout_secs);

        let candidate = match tokio::time::timeout(timeout, self.evaluate_symbol(&symbol, &regime, &ctx, false)).await {
            Ok(Some(candidate)) => candidate,
            Ok(None) => Candidate::unavailable(symbol.as_str(), self.clock.now(), "screened out"),
            Err(_) => {
                warn!(symbol = %symbol, "Symbol analysis timed out");
                Candidate::unavailable(symbol.as_str(), self.clock.now(), "analysis timed out")
            }
        };
        Ok(candidate)
    }

    async fn regime(&self, force_refresh: bool, ctx: &ScanContext) -> (MarketRegimeSnapshot, RegimeSource) {
        let calls = self.regime_gate.config().benchmarks.len() as u32;
        self.cache
            .get_or_fetch(force_refresh, calls, || self.fetch_regime(ctx))
            .await
    }

    async fn fetch_regime(&self, ctx: &ScanContext) -> ProviderResult<MarketRegimeSnapshot> {
        let config = self.regime_gate.config();
        let now = self.clock.now();

        let lookups = config.benchmarks.iter().map(|symbol| async move {
            let (minutes, gex) = tokio::join!(
                self.providers.prices.get_minute_bars(symbol, self.scanner.minute_lookback),
                self.gex_for(symbol, ctx),
            );
            let minutes = minutes?;
            let gex = gex?;
            let price = minutes
                .last()
                .map(|b| b.close)
                .ok_or_else(|| ProviderError::NotFound(format!("{} minute bars", symbol)))?;
            let vwap = session_vwap(&minutes)
                .ok_or_else(|| ProviderError::Malformed(format!("{} has no session volume", symbol)))?;
            Ok::<_, ProviderError>((
                BenchmarkPosition {
                    symbol: symbol.clone(),
                    price,
                    vwap,
                },
                gex.net_gex,
            ))
        });

        let (benchmarks, volatility) = tokio::join!(
            futures::future::try_join_all(lookups),
            self.providers.prices.get_daily_bars(&config.volatility_symbol, 2),
        );
        let benchmarks = benchmarks?;
        let volatility = volatility?;

        let (volatility_level, volatility_change_pct) = match volatility.as_slice() {
            [.., prev, last] => (last.close, pct_change(prev.close, last.close)),
            [last] => (last.close, 0.0),
            [] => {
                return Err(ProviderError::NotFound(format!(
                    "{} daily bars",
                    config.volatility_symbol
                )))
            }
        };

        let aggregate_gex = benchmarks.iter().map(|(_, gex)| gex).sum();
        let inputs = RegimeInputs {
            date: self.hours.exchange_date(now),
            benchmarks: benchmarks.into_iter().map(|(b, _)| b).collect(),
            aggregate_gex,
            volatility_level,
            volatility_change_pct,
        };
        Ok(self.regime_gate.evaluate(&inputs, now))
    }

    /// One shared GEX snapshot per symbol per scan
    async fn gex_for(&self, symbol: &str, ctx: &ScanContext) -> ProviderResult<Arc<GammaExposureSnapshot>> {
        if let Some(cached) = ctx.gex.get(symbol).map(|g| Arc::clone(g.value())) {
            return Ok(cached);
        }
        let fetched = Arc::new(self.providers.flow.get_gex_data(symbol).await?);
        let shared = ctx
            .gex
            .entry(symbol.to_string())
            .or_insert(fetched)
            .value()
            .clone();
        Ok(shared)
    }

    /// Full analysis of one symbol; `None` when the shortlist screen drops it
    async fn evaluate_symbol(
        &self,
        symbol: &str,
        regime: &MarketRegimeSnapshot,
        ctx: &ScanContext,
        screen: bool,
    ) -> Option<Candidate> {
        let at = self.clock.now();
        let today = self.hours.exchange_date(at);
        let prices = &self.providers.prices;

        let (daily, minutes, quote) = tokio::join!(
            prices.get_daily_bars(symbol, self.scanner.daily_lookback),
            prices.get_minute_bars(symbol, self.scanner.minute_lookback),
            prices.get_latest_quote(symbol),
        );
        let daily = or_empty(symbol, "daily bars", daily);
        let minutes = or_empty(symbol, "minute bars", minutes);
        let quote = or_none(symbol, "quote", quote);

        let spot = minutes
            .last()
            .map(|b| b.close)
            .or_else(|| quote.as_ref().map(|q| q.last))
            .or_else(|| daily.last().map(|b| b.close))
            .filter(|p| *p > 0.0);
        let Some(spot) = spot else {
            warn!(symbol = %symbol, "No price data");
            return Some(Candidate::unavailable(symbol, at, "no price data"));
        };

        if screen {
            if let Some(reason) = self.screen_out(spot, &daily) {
                debug!(symbol = %symbol, reason = %reason, "Dropped by shortlist screen");
                return None;
            }
        }

        if let Err(e) = self.budget.try_acquire(self.scanner.analytics_calls_per_symbol).await {
            warn!(symbol = %symbol, error = %e, "Analytics skipped");
            let mut candidate = Candidate::unavailable(symbol, at, e.to_string());
            candidate.spot = Some(spot);
            return Some(candidate);
        }

        let flow = &self.providers.flow;
        let chain_query = ChainQuery::puts().with_strikes(spot * (1.0 - self.scanner.chain_depth), spot);
        let (put_flow, call_flow, dark_pool, gex, activity, skew, iv, catalysts, warning, chain) = tokio::join!(
            flow.get_put_flow(symbol),
            flow.get_call_selling_flow(symbol),
            flow.get_dark_pool_flow(symbol),
            self.gex_for(symbol, ctx),
            flow.get_oi_change(symbol),
            flow.get_skew(symbol),
            flow.get_iv_rank(symbol),
            flow.get_catalysts(symbol),
            flow.get_early_warning(symbol),
            self.providers.options.get_options_chain(symbol, &chain_query),
        );
        let put_flow = or_empty(symbol, "put flow", put_flow);
        let call_flow = or_empty(symbol, "call selling flow", call_flow);
        let dark_pool = or_empty(symbol, "dark pool", dark_pool);
        let activity = or_none(symbol, "open interest change", activity);
        let skew = or_none(symbol, "skew", skew);
        let iv = or_none(symbol, "iv rank", iv);
        let catalysts = or_none(symbol, "catalysts", catalysts);
        let warning = or_none(symbol, "early warning", warning);
        let chain = or_empty(symbol, "options chain", chain);

        let mut candidate = Candidate::new(symbol, at);
        candidate.spot = Some(spot);
        candidate.regime_label = Some(regime.label);
        candidate.early_warning = warning.map(|w| w.level).unwrap_or_default();

        let gex = match gex {
            Ok(gex) => gex,
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "GEX unavailable, assuming neutral dealers");
                candidate.notes.push("dealer positioning unavailable".to_string());
                Arc::new(GammaExposureSnapshot::neutral(symbol, at))
            }
        };

        if !regime.tradeable {
            candidate.block(BlockReason::MarketRegime);
        }

        // Gates before scores
        let dealer = self.dealer_gate.evaluate(&DealerInputs {
            symbol,
            spot,
            gex: Arc::clone(&gex),
            puts: &chain,
            daily_bars: &daily,
            iv: iv.as_ref(),
        });
        for reason in &dealer.reasons {
            candidate.block(*reason);
        }

        let distribution = self.distribution.analyze(&DistributionInputs {
            daily_bars: &daily,
            minute_bars: &minutes,
            put_flow: &put_flow,
            call_flow: &call_flow,
            dark_pool: &dark_pool,
            activity: activity.as_ref(),
            skew: skew.as_ref(),
            catalysts: catalysts.as_ref(),
        });
        for reason in &distribution.blocks {
            candidate.block(*reason);
        }

        let own = self.liquidity.analyze(&LiquidityInputs {
            quote: quote.as_ref(),
            minute_bars: &minutes,
            daily_bars: &daily,
        });
        ctx.liquidity.insert(symbol.to_string(), Some(own.signals));
        let peers = self.sector_peers(symbol, ctx).await;
        let liquidity = self.liquidity.apply_sector(own, &peers);

        let acceleration = self.acceleration.classify(&AccelerationInputs {
            daily_bars: &daily,
            minute_bars: &minutes,
            gex: Some(gex.as_ref()),
            iv: iv.as_ref(),
            activity: activity.as_ref(),
        });
        for reason in acceleration.reasons.iter().copied().filter(|r| is_timing_block(*r)) {
            candidate.block(reason);
        }

        let composite = self.scorer.score(&CompositeInputs {
            blocked: candidate.is_blocked(),
            distribution: &distribution,
            dealer_score: dealer.score,
            liquidity: &liquidity,
            acceleration: &acceleration,
            catalysts: catalysts.as_ref(),
            bearish_premium_share: bearish_premium_share(put_flow.iter().chain(call_flow.iter())),
            session_change_pct: session_change_pct(&daily, spot),
        });
        candidate.composite = composite;
        candidate.score = composite.score;

        let closes: Vec<f64> = daily.iter().map(|b| b.close).collect();
        let volatility = self
            .volatility_gate
            .evaluate(iv.as_ref(), &closes, candidate.early_warning);
        if volatility.is_rejected() {
            candidate.block(BlockReason::VolatilityRegimeReject);
        }

        let classification = self.classifier.classify(&ClassifierInputs {
            block_reasons: &candidate.block_reasons,
            score: candidate.score,
            has_archetype: acceleration.has_archetype(),
            has_price_signal: distribution.signals.has_price_signal(),
            liquidity_vacuum: liquidity.is_active(),
            dark_pool_blocks: distribution.signals.repeated_sell_blocks,
            vwap_loss: distribution.signals.vwap_loss,
            high_beta: self.universe.is_high_beta(symbol),
            size_multiplier: volatility.size_multiplier,
        });

        if classification.class.is_tradeable() {
            let request = SelectionRequest {
                spot,
                atr: atr(&daily, 14),
                score: candidate.score,
                dte_adjustment: volatility.dte_adjustment,
                today,
                gex_put_wall: gex.put_wall,
                daily_bars: &daily,
                iv_expanding: iv.as_ref().map_or(false, |v| v.is_expanding()),
            };
            candidate.contract = self.selector.select(&chain, &request);
            if candidate.contract.is_none() {
                candidate.notes.push("no contract passed selection".to_string());
            }
        }

        debug!(
            symbol = %symbol,
            score = candidate.score,
            class = %classification.class,
            blocks = ?candidate.block_reasons,
            "Symbol analyzed"
        );

        candidate.dealer = Some(dealer);
        candidate.distribution = distribution;
        candidate.liquidity = liquidity;
        candidate.acceleration = acceleration;
        candidate.volatility = Some(volatility);
        candidate.classification = classification;
        Some(candidate)
    }

    /// Cheap pre-filter on price and average volume
    fn screen_out(&self, spot: f64, daily: &[PriceBar]) -> Option<String> {
        if spot < self.scanner.min_price {
            return Some(format!("price {:.2} below {:.2}", spot, self.scanner.min_price));
        }
        let recent = &daily[daily.len().saturating_sub(21)..daily.len().saturating_sub(1)];
        if !recent.is_empty() {
            let avg = recent.iter().map(|b| b.volume).sum::<f64>() / recent.len() as f64;
            if avg < self.scanner.min_avg_volume {
                return Some(format!("average volume {:.0} below {:.0}", avg, self.scanner.min_avg_volume));
            }
        }
        None
    }

    async fn sector_peers(&self, symbol: &str, ctx: &ScanContext) -> Vec<SectorPeer> {
        let members = self.universe.peers_of(symbol, self.scanner.max_sector_peers);
        let lookups = members.into_iter().map(|member| async move {
            self.peer_signals(&member.symbol, ctx)
                .await
                .map(|signals| SectorPeer {
                    symbol: member.symbol.clone(),
                    tier: member.tier,
                    signals,
                })
        });
        futures::future::join_all(lookups)
            .await
            .into_iter()
            .flatten()
            .collect()
    }

    /// Liquidity signals of a peer, computed once per scan
    async fn peer_signals(&self, symbol: &str, ctx: &ScanContext) -> Option<LiquiditySignals> {
        if let Some(cached) = ctx.liquidity.get(symbol).map(|s| *s.value()) {
            return cached;
        }
        let prices = &self.providers.prices;
        let (daily, minutes, quote) = tokio::join!(
            prices.get_daily_bars(symbol, 30),
            prices.get_minute_bars(symbol, self.scanner.minute_lookback),
            prices.get_latest_quote(symbol),
        );
        let signals = match minutes {
            Ok(minutes) if !minutes.is_empty() => {
                let daily = daily.unwrap_or_default();
                let quote = quote.ok();
                Some(
                    self.liquidity
                        .analyze(&LiquidityInputs {
                            quote: quote.as_ref(),
                            minute_bars: &minutes,
                            daily_bars: &daily,
                        })
                        .signals,
                )
            }
            _ => None,
        };
        ctx.liquidity.insert(symbol.to_string(), signals);
        signals
    }
}

/// Upper-cased, de-duplicated, valid tickers in request order
fn normalize_universe(symbols: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    symbols
        .into_iter()
        .map(|s| s.trim().to_uppercase())
        .filter(|s| {
            if !is_valid_ticker(s) {
                warn!(symbol = %s, "Skipping invalid ticker");
                return false;
            }
            seen.insert(s.clone())
        })
        .collect()
}

/// Current price against the prior session close, in percent
fn session_change_pct(daily: &[PriceBar], spot: f64) -> f64 {
    match daily {
        [.., prev, _] => pct_change(prev.close, spot),
        _ => 0.0,
    }
}

fn or_empty<T>(symbol: &str, what: &str, result: ProviderResult<Vec<T>>) -> Vec<T> {
    or_none(symbol, what, result).unwrap_or_default()
}

fn or_none<T>(symbol: &str, what: &str, result: ProviderResult<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(ProviderError::NotFound(_)) => {
            debug!(symbol = %symbol, what, "Not available");
            None
        }
        Err(e) => {
            warn!(symbol = %symbol, what, error = %e, "Provider call failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::clock::testing::{FixedHours, ManualClock};
    use crate::cache::CacheConfig;
    use crate::market::indicators::test_bars::{daily_from_closes, minute_bars};
    use crate::market::{Greeks, IvSnapshot, OptionType, OptionsContract, Quote};
    use crate::provider::{MarketSnapshot, SnapshotProvider, SymbolSnapshot};
    use crate::scoring::TradeClass;
    use chrono::{DateTime, NaiveDate, TimeZone, Utc};

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 15, 0, 0).unwrap()
    }

    fn gex(symbol: &str, net: f64) -> GammaExposureSnapshot {
        GammaExposureSnapshot {
            net_gex: net,
            ..GammaExposureSnapshot::neutral(symbol, at(2025, 3, 12))
        }
    }

    /// Session drifting lower from `open` by `drop` (fraction)
    fn fading_session(open: f64, drop: f64) -> Vec<PriceBar> {
        let rows: Vec<(f64, f64, f64, f64)> = (0..60)
            .map(|i| {
                let close = open * (1.0 - drop * i as f64 / 59.0);
                (close * 1.001, close * 0.999, close, 20_000.0)
            })
            .collect();
        minute_bars(&rows)
    }

    fn benchmark(symbol: &str, price: f64, net_gex: f64) -> SymbolSnapshot {
        SymbolSnapshot {
            minute_bars: fading_session(price, 0.01),
            gex: Some(gex(symbol, net_gex)),
            ..Default::default()
        }
    }

    fn stock(symbol: &str, price: f64, net_gex: f64) -> SymbolSnapshot {
        let closes: Vec<f64> = (0..60).map(|i| price * (1.10 - 0.001 * i as f64)).collect();
        let minutes = fading_session(price * 1.01, 0.01);
        let last = minutes.last().map(|b| b.close).unwrap_or(price);
        SymbolSnapshot {
            daily_bars: daily_from_closes(&closes, 1_000_000.0),
            quote: Some(Quote {
                symbol: symbol.to_string(),
                bid: last - 0.01,
                ask: last + 0.01,
                bid_size: 500.0,
                ask_size: 500.0,
                last,
                timestamp: at(2025, 3, 12),
            }),
            minute_bars: minutes,
            gex: Some(gex(symbol, net_gex)),
            iv: Some(IvSnapshot {
                current_iv: 0.30,
                iv_high_52w: Some(0.60),
                iv_low_52w: Some(0.20),
                iv_rank: None,
                iv_change_pct: 0.0,
            }),
            ..Default::default()
        }
    }

    fn market(benchmark_gex: f64) -> MarketSnapshot {
        MarketSnapshot::default()
            .with_symbol("SPY", benchmark("SPY", 560.0, benchmark_gex))
            .with_symbol("QQQ", benchmark("QQQ", 480.0, benchmark_gex))
            .with_symbol(
                "VIX",
                SymbolSnapshot {
                    daily_bars: daily_from_closes(&[18.0, 19.5], 0.0),
                    ..Default::default()
                },
            )
            .with_symbol("BEAR", stock("BEAR", 50.0, -5e8))
            .with_symbol("BULL", stock("BULL", 80.0, 2e8))
            .with_symbol("THIN", stock("THIN", 3.0, -5e8))
    }

    fn scanner_with(snapshot: MarketSnapshot, now: DateTime<Utc>, daily_call_limit: u32) -> PutScanner {
        let mut config = Config::default();
        config.cache = CacheConfig {
            path: None,
            daily_call_limit,
            ..CacheConfig::default()
        };
        let clock = Arc::new(ManualClock::new(now));
        PutScanner::new(
            &config,
            Providers::shared(Arc::new(SnapshotProvider::new(snapshot))),
            clock,
            Arc::new(FixedHours(true)),
        )
    }

    fn universe() -> Option<Vec<String>> {
        Some(
            ["BEAR", "BULL", "THIN", "GHOST", "bear"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_daily_pipeline_ranks_and_counts() {
        let scanner = scanner_with(market(-2e9), at(2025, 3, 12), 5_000);
        let report = scanner.run_daily_pipeline(universe()).await;

        assert!(report.regime.tradeable);
        assert_eq!(report.scanned, 5);
        // THIN is screened out, GHOST has no prices, the duplicate is dropped
        assert_eq!(report.shortlisted, 2);
        assert_eq!(report.candidates.len(), 3);
        assert_eq!(report.passed_gates, 1);
        assert_eq!(report.candidates[0].symbol, "BEAR");
        assert!(report.candidates[0].score > 0.0);

        let bull = report.candidates.iter().find(|c| c.symbol == "BULL").unwrap();
        assert!(bull.block_reasons.contains(&BlockReason::DealerGammaPositive));
        assert_eq!(bull.score, 0.0);
        assert_eq!(bull.trade_class(), TradeClass::C);

        let ghost = report.candidates.iter().find(|c| c.symbol == "GHOST").unwrap();
        assert_eq!(ghost.block_reasons, vec![BlockReason::DataUnavailable]);
    }

    #[tokio::test]
    async fn test_blocked_candidates_always_score_zero() {
        let scanner = scanner_with(market(-2e9), at(2025, 3, 12), 5_000);
        let report = scanner.run_daily_pipeline(universe()).await;
        for candidate in &report.candidates {
            if candidate.is_blocked() {
                assert_eq!(candidate.score, 0.0, "{}", candidate.symbol);
            }
        }
    }

    #[tokio::test]
    async fn test_passive_inflow_window_blocks_candidates() {
        let scanner = scanner_with(market(-2e9), at(2025, 4, 2), 5_000);
        let report = scanner.run_daily_pipeline(universe()).await;

        assert!(!report.regime.tradeable);
        assert!(report.regime.scannable);
        assert_eq!(report.regime.block_reasons, vec![BlockReason::PassiveInflowWindow]);
        let bear = report.candidates.iter().find(|c| c.symbol == "BEAR").unwrap();
        assert!(bear.block_reasons.contains(&BlockReason::MarketRegime));
        assert_eq!(bear.score, 0.0);
        assert_eq!(report.passed_gates, 0);
    }

    #[tokio::test]
    async fn test_extreme_gamma_skips_scan() {
        let scanner = scanner_with(market(2e9), at(2025, 3, 12), 5_000);
        let report = scanner.run_daily_pipeline(universe()).await;
        assert!(!report.regime.scannable);
        assert!(report.candidates.is_empty());
        assert_eq!(report.scanned, 5);
    }

    #[tokio::test]
    async fn test_budget_exhaustion_degrades_symbols() {
        // Regime takes 2 calls, leaving too few for one symbol's fan-out
        let scanner = scanner_with(market(-2e9), at(2025, 3, 12), 6);
        let report = scanner.run_daily_pipeline(universe()).await;

        assert!(report.regime.tradeable);
        let bear = report.candidates.iter().find(|c| c.symbol == "BEAR").unwrap();
        assert_eq!(bear.block_reasons, vec![BlockReason::DataUnavailable]);
        // Priced and screened before the budget ran out
        assert_eq!(report.shortlisted, 2);
        assert_eq!(scanner.budget().used().await, 2);
        assert_eq!(report.budget_remaining, 4);
    }

    #[tokio::test]
    async fn test_regime_served_from_memory_on_second_scan() {
        let scanner = scanner_with(market(-2e9), at(2025, 3, 12), 5_000);
        let first = scanner.get_cached_regime(false).await;
        let used = scanner.budget().used().await;
        let second = scanner.get_cached_regime(false).await;
        assert_eq!(first, second);
        assert_eq!(scanner.budget().used().await, used);
    }

    #[tokio::test]
    async fn test_single_symbol() {
        let scanner = scanner_with(market(-2e9), at(2025, 3, 12), 5_000);

        // No shortlist screen for direct lookups
        let thin = scanner.run_single_symbol("thin").await.unwrap();
        assert_eq!(thin.symbol, "THIN");
        assert!(thin.volatility.is_some());

        assert!(matches!(
            scanner.run_single_symbol("not a ticker").await,
            Err(Error::InvalidSymbol(_))
        ));
    }

    /// Sessions near 48 with an average true range of 2.8 that tagged 45.3 three times
    fn wall_history() -> Vec<PriceBar> {
        (0..30)
            .map(|i| {
                let ts = Utc.with_ymd_and_hms(2025, 1, 2, 21, 0, 0).unwrap() + chrono::Duration::days(i);
                if matches!(i, 5 | 10 | 14) {
                    PriceBar::new(ts, 48.0, 48.5, 45.3, 47.0, 1_000_000.0)
                } else {
                    PriceBar::new(ts, 48.0, 49.5, 46.7, 48.0, 1_000_000.0)
                }
            })
            .collect()
    }

    fn wall_put(strike: f64, delta: f64, bid: f64, ask: f64) -> OptionsContract {
        let expiration = NaiveDate::from_ymd_opt(2025, 3, 21).unwrap();
        OptionsContract {
            symbol: format!("WALL250321P{:08}", (strike * 1000.0) as u64),
            underlying: "WALL".to_string(),
            option_type: OptionType::Put,
            strike,
            expiration,
            bid,
            ask,
            last: 0.0,
            open_interest: 900,
            volume: 200,
            greeks: Greeks {
                delta: -delta,
                ..Default::default()
            },
            days_to_expiry: 9,
        }
    }

    #[tokio::test]
    async fn test_defended_wall_beyond_dealer_range_rejects_strike() {
        let scanner = scanner_with(market(-2e9), at(2025, 3, 12), 5_000);
        let today = NaiveDate::from_ymd_opt(2025, 3, 12).unwrap();
        let spot = 50.0;
        let daily = wall_history();
        let mut chain = vec![wall_put(45.0, 0.27, 0.45, 0.48), wall_put(44.5, 0.24, 0.30, 0.32)];
        for strike in [43.0, 42.0, 41.0, 40.0, 39.0, 38.0] {
            chain.push(wall_put(strike, 0.16, 0.15, 0.16));
        }
        let gex = Arc::new(GammaExposureSnapshot {
            put_wall: Some(45.2),
            ..gex("WALL", 0.0)
        });

        // Nearly 10% below spot: outside the dealer gate's wall range
        let dealer = scanner.dealer_gate.evaluate(&DealerInputs {
            symbol: "WALL",
            spot,
            gex: Arc::clone(&gex),
            puts: &chain,
            daily_bars: &daily,
            iv: None,
        });
        assert!(!dealer.blocked);
        assert!(dealer.put_wall.is_none());

        let mut request = SelectionRequest {
            spot,
            atr: atr(&daily, 14),
            score: 0.75,
            dte_adjustment: 0,
            today,
            gex_put_wall: gex.put_wall,
            daily_bars: &daily,
            iv_expanding: false,
        };
        let selected = scanner.selector.select(&chain, &request).unwrap();
        assert_eq!(selected.contract.strike, 44.5);

        request.gex_put_wall = None;
        let selected = scanner.selector.select(&chain, &request).unwrap();
        assert_eq!(selected.contract.strike, 45.0);
    }

    #[test]
    fn test_normalize_universe() {
        let symbols = normalize_universe(vec![
            "aapl".to_string(),
            " MSFT ".to_string(),
            "AAPL".to_string(),
            "bad ticker".to_string(),
        ]);
        assert_eq!(symbols, vec!["AAPL".to_string(), "MSFT".to_string()]);
    }
}
