//! CLI command implementations

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::cache::{SystemClock, UsEquityHours};
use crate::config::Config;
use crate::gates::MarketRegimeSnapshot;
use crate::pipeline::{Candidate, DailyReport, Providers, PutScanner};
use crate::provider::SnapshotProvider;

/// Build a scanner over the configured market snapshot
pub async fn build_scanner(config: &Config, data: Option<&str>) -> Result<PutScanner> {
    let path = data
        .or(config.data.snapshot_path.as_deref())
        .context("No market data source: pass --data or set data.snapshot_path")?;

    let provider = SnapshotProvider::load(Path::new(path))
        .await
        .with_context(|| format!("Failed to load market snapshot from {}", path))?;
    info!(symbols = provider.symbols().len(), "Market data ready");

    Ok(PutScanner::new(
        config,
        Providers::shared(Arc::new(provider)),
        Arc::new(SystemClock),
        Arc::new(UsEquityHours),
    ))
}

/// Run the daily pipeline over the given symbols (or the configured universe)
pub async fn scan(config: &Config, data: Option<&str>, symbols: Vec<String>, json: bool, force: bool) -> Result<()> {
    let mut config = config.clone();
    config.scanner.force_regime_refresh |= force;
    let scanner = build_scanner(&config, data).await?;

    let universe = if symbols.is_empty() { None } else { Some(symbols) };
    let report = scanner.run_daily_pipeline(universe).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

/// Analyze a single symbol
pub async fn symbol(config: &Config, data: Option<&str>, symbol: &str, json: bool) -> Result<()> {
    let scanner = build_scanner(config, data).await?;
    let candidate = scanner.run_single_symbol(symbol).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&candidate)?);
    } else {
        print_candidate(&candidate);
    }
    Ok(())
}

/// Show the market regime
pub async fn regime(config: &Config, data: Option<&str>, force: bool, json: bool) -> Result<()> {
    let scanner = build_scanner(config, data).await?;
    let snapshot = scanner.get_cached_regime(force).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        print_regime(&snapshot);
    }
    Ok(())
}

/// Show current configuration (data locations masked)
pub fn show_config(config: &Config) -> Result<()> {
    println!("{}", config.masked_display());
    Ok(())
}

fn print_regime(regime: &MarketRegimeSnapshot) {
    println!("\n=== MARKET REGIME {} ===\n", regime.date);
    println!("Label: {}", regime.label);
    println!("Tradeable: {}", regime.tradeable);
    println!("Scannable: {}", regime.scannable);
    for b in &regime.benchmarks {
        println!(
            "  {:<5} {:>9.2} vs VWAP {:>9.2}{}",
            b.symbol,
            b.price,
            b.vwap,
            if b.below_vwap { "  (below)" } else { "" }
        );
    }
    println!("Aggregate GEX: {:.0}", regime.aggregate_gex);
    println!(
        "Volatility index: {:.2} ({:+.2}%)",
        regime.volatility_level, regime.volatility_change_pct
    );
    if !regime.block_reasons.is_empty() {
        let reasons: Vec<&str> = regime.block_reasons.iter().map(|r| r.as_str()).collect();
        println!("Blocked: {}", reasons.join(", "));
    }
}

fn print_candidate(candidate: &Candidate) {
    println!("{}", candidate.summary());
    println!("  class: {}", candidate.classification.reason);
    if let Some(contract) = &candidate.contract {
        println!(
            "  contract: {} strike {:.2} exp {} ({} DTE) delta {:.2} mid {:.2}",
            contract.contract.symbol,
            contract.contract.strike,
            contract.contract.expiration,
            contract.days_to_expiry,
            contract.contract.greeks.delta,
            contract.contract.mid(),
        );
    }
    for note in &candidate.notes {
        println!("  note: {}", note);
    }
}

fn print_report(report: &DailyReport) {
    print_regime(&report.regime);
    println!("\n=== CANDIDATES ===\n");
    println!("{}", report.summary());
    println!("Budget remaining: {}", report.budget_remaining);
    if report.candidates.is_empty() {
        println!("No candidates.");
        return;
    }
    for candidate in &report.candidates {
        print_candidate(candidate);
    }
}
