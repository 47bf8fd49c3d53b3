//! Configuration loading and validation

use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;

pub use crate::cache::CacheConfig;
pub use crate::engines::{AccelerationConfig, DistributionConfig, LiquidityConfig, SectorTier};
pub use crate::gates::{DealerConfig, RegimeConfig, VolatilityConfig};
pub use crate::pipeline::ScannerConfig;
pub use crate::scoring::{ClassifierConfig, ScoringConfig};
pub use crate::selection::SelectionConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub universe: UniverseConfig,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub scanner: ScannerConfig,
    #[serde(default)]
    pub regime: RegimeConfig,
    #[serde(default)]
    pub dealer: DealerConfig,
    #[serde(default)]
    pub distribution: DistributionConfig,
    #[serde(default)]
    pub liquidity: LiquidityConfig,
    #[serde(default)]
    pub acceleration: AccelerationConfig,
    #[serde(default)]
    pub volatility: VolatilityConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub selection: SelectionConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

/// Symbols to scan and how they relate
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UniverseConfig {
    /// Default scan universe
    #[serde(default)]
    pub symbols: Vec<String>,

    /// Names eligible for Class B speculative size
    #[serde(default)]
    pub high_beta: Vec<String>,

    /// Sector name -> members, used for liquidity peer context
    #[serde(default)]
    pub sectors: HashMap<String, Vec<SectorMember>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SectorMember {
    pub symbol: String,
    #[serde(default = "default_sector_tier")]
    pub tier: SectorTier,
}

fn default_sector_tier() -> SectorTier {
    SectorTier::Mid
}

impl UniverseConfig {
    pub fn is_high_beta(&self, symbol: &str) -> bool {
        self.high_beta.iter().any(|s| s.eq_ignore_ascii_case(symbol))
    }

    /// Up to `max` other members of the symbol's sector
    pub fn peers_of(&self, symbol: &str, max: usize) -> Vec<SectorMember> {
        let mut sectors: Vec<(&String, &Vec<SectorMember>)> = self.sectors.iter().collect();
        sectors.sort_by(|a, b| a.0.cmp(b.0));
        sectors
            .into_iter()
            .find(|(_, members)| members.iter().any(|m| m.symbol.eq_ignore_ascii_case(symbol)))
            .map(|(_, members)| {
                members
                    .iter()
                    .filter(|m| !m.symbol.eq_ignore_ascii_case(symbol))
                    .take(max)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Where market data comes from
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DataConfig {
    /// JSON market snapshot served by the snapshot provider
    #[serde(default)]
    pub snapshot_path: Option<String>,
}

fn ticker_regex() -> Option<&'static Regex> {
    static TICKER: OnceLock<Option<Regex>> = OnceLock::new();
    TICKER
        .get_or_init(|| Regex::new(r"^[A-Z]{1,5}([.\-][A-Z]{1,2})?$").ok())
        .as_ref()
}

/// Exchange ticker check (upper-case, optional share-class suffix)
pub fn is_valid_ticker(symbol: &str) -> bool {
    ticker_regex().map_or(false, |re| re.is_match(symbol))
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            // Load from file if exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (prefix PUTSCAN_)
            .add_source(
                config::Environment::with_prefix("PUTSCAN")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let mut config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.normalize();
        config.validate()?;

        Ok(config)
    }

    /// Upper-case every ticker
    fn normalize(&mut self) {
        for symbol in self
            .universe
            .symbols
            .iter_mut()
            .chain(self.universe.high_beta.iter_mut())
            .chain(self.regime.benchmarks.iter_mut())
        {
            *symbol = symbol.trim().to_uppercase();
        }
        for members in self.universe.sectors.values_mut() {
            for member in members.iter_mut() {
                member.symbol = member.symbol.trim().to_uppercase();
            }
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        for symbol in self
            .universe
            .symbols
            .iter()
            .chain(self.universe.high_beta.iter())
            .chain(self.regime.benchmarks.iter())
            .chain(self.universe.sectors.values().flatten().map(|m| &m.symbol))
        {
            if !is_valid_ticker(symbol) {
                anyhow::bail!("Invalid ticker in configuration: {}", symbol);
            }
        }

        if self.regime.benchmarks.is_empty() {
            anyhow::bail!("At least one regime benchmark is required");
        }

        if self.scanner.max_concurrency == 0 {
            anyhow::bail!("scanner.max_concurrency must be at least 1");
        }

        if self.scanner.symbol_timeout_secs == 0 {
            anyhow::bail!("scanner.symbol_timeout_secs must be positive");
        }

        let weights = self.scoring.weights.total();
        if (weights - 1.0).abs() > 1e-6 {
            anyhow::bail!("scoring weights must sum to 1.0, got {:.4}", weights);
        }

        if !(0.0..=1.0).contains(&self.scoring.actionable_threshold) {
            anyhow::bail!("scoring.actionable_threshold must be within 0.0-1.0");
        }

        if self.classifier.class_b_min_score > self.classifier.class_b_max_score {
            anyhow::bail!("classifier Class B band is inverted");
        }

        let v = &self.volatility;
        if !(v.optimal_max < v.elevated_max && v.elevated_max < v.extreme_max) {
            anyhow::bail!("volatility bands must be increasing");
        }

        if self.selection.max_spread_pct <= 0.0 {
            anyhow::bail!("selection.max_spread_pct must be positive");
        }

        if self.cache.daily_call_limit == 0 {
            tracing::warn!("cache.daily_call_limit is 0 - every analytics call will be refused");
        }

        Ok(())
    }

    /// Get configuration summary for display
    pub fn masked_display(&self) -> String {
        format!(
            r#"Configuration:
  Universe:
    symbols: {}
    high_beta: {:?}
    sectors: {}
  Data:
    snapshot: {}
  Scanner:
    max_concurrency: {}
    symbol_timeout: {}s
    analytics_calls_per_symbol: {}
    min_price: ${}
  Regime:
    benchmarks: {:?}
    volatility_index: {}
    gex_neutral_threshold: {}
  Scoring:
    actionable_threshold: {}
  Volatility:
    bands: <{} / <{} / <={}
  Cache:
    memory_ttl: {}s
    file_ttl: {}s
    path: {}
    daily_call_limit: {}
"#,
            self.universe.symbols.len(),
            self.universe.high_beta,
            self.universe.sectors.len(),
            self.data.snapshot_path.as_deref().map(mask_path).unwrap_or_else(|| "(not set)".to_string()),
            self.scanner.max_concurrency,
            self.scanner.symbol_timeout_secs,
            self.scanner.analytics_calls_per_symbol,
            self.scanner.min_price,
            self.regime.benchmarks,
            self.regime.volatility_symbol,
            self.regime.gex_neutral_threshold,
            self.scoring.actionable_threshold,
            self.volatility.optimal_max,
            self.volatility.elevated_max,
            self.volatility.extreme_max,
            self.cache.memory_ttl_secs,
            self.cache.file_ttl_secs,
            self.cache.path.as_deref().unwrap_or("(memory only)"),
            self.cache.daily_call_limit,
        )
    }
}

/// Mask a data location for display (hide query-string credentials)
fn mask_path(path: &str) -> String {
    if let Some(idx) = path.find('?') {
        format!("{}?***", &path[..idx])
    } else {
        path.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.regime.benchmarks, vec!["SPY".to_string(), "QQQ".to_string()]);
        assert_eq!(config.scoring.actionable_threshold, 0.68);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_ticker_validation() {
        assert!(is_valid_ticker("AAPL"));
        assert!(is_valid_ticker("BRK.B"));
        assert!(!is_valid_ticker("aapl"));
        assert!(!is_valid_ticker("TOOLONG"));
        assert!(!is_valid_ticker(""));

        let mut config = Config::default();
        config.universe.symbols = vec!["AAPL".to_string(), "bad ticker".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_toml() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[universe]
symbols = ["nvda", "AMD"]
high_beta = ["AMD"]

[[universe.sectors.semis]]
symbol = "NVDA"
tier = "mega"

[[universe.sectors.semis]]
symbol = "AMD"
tier = "large"

[scanner]
max_concurrency = 4

[cache]
path = "/tmp/regime.json"
"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.universe.symbols, vec!["NVDA".to_string(), "AMD".to_string()]);
        assert_eq!(config.scanner.max_concurrency, 4);
        assert!(config.universe.is_high_beta("amd"));
        let peers = config.universe.peers_of("NVDA", 5);
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].tier, SectorTier::Large);
        assert!(config.masked_display().contains("/tmp/regime.json"));
    }

    #[test]
    fn test_weights_must_sum_to_one() {
        let mut config = Config::default();
        config.scoring.weights.distribution = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_mask_path() {
        assert_eq!(mask_path("https://data.example.com/snap.json?token=x"), "https://data.example.com/snap.json?***");
        assert_eq!(mask_path("data/snapshot.json"), "data/snapshot.json");
    }
}
