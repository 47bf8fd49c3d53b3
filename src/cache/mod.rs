//! Budget-aware two-tier regime cache
//!
//! Memory tier (short TTL) in front of a JSON file tier (longer TTL). A single
//! async mutex serialises lookups so concurrent scans never double-spend the
//! call budget or race on the cache file.
//!
//! Lookup order:
//! 1. fresh memory entry
//! 2. fresh persisted entry
//! 3. market closed and not forced: stale entry or neutral default
//! 4. budget check
//! 5. upstream fetch, stored in both tiers

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::gates::MarketRegimeSnapshot;
use crate::provider::ProviderResult;

pub mod budget;
pub mod clock;

pub use budget::CallBudget;
pub use clock::{Clock, MarketHours, SystemClock, UsEquityHours};

/// Configuration for the regime cache
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Memory tier TTL (seconds)
    #[serde(default = "default_memory_ttl_secs")]
    pub memory_ttl_secs: u64,

    /// File tier TTL (seconds)
    #[serde(default = "default_file_ttl_secs")]
    pub file_ttl_secs: u64,

    /// Cache file; no file tier when unset
    #[serde(default = "default_path")]
    pub path: Option<String>,

    /// Daily upstream call quota shared by the whole pipeline
    #[serde(default = "default_daily_call_limit")]
    pub daily_call_limit: u32,
}

fn default_memory_ttl_secs() -> u64 {
    300 // 5 minutes
}
fn default_file_ttl_secs() -> u64 {
    1800 // 30 minutes
}
fn default_path() -> Option<String> {
    Some("data/regime_cache.json".to_string())
}
fn default_daily_call_limit() -> u32 {
    5_000
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_ttl_secs: default_memory_ttl_secs(),
            file_ttl_secs: default_file_ttl_secs(),
            path: default_path(),
            daily_call_limit: default_daily_call_limit(),
        }
    }
}

/// On-disk format of the file tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedRegime {
    pub cached_at: DateTime<Utc>,
    pub snapshot: MarketRegimeSnapshot,
}

impl PersistedRegime {
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now - self.cached_at > ttl
    }
}

/// Where a regime lookup was served from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegimeSource {
    Memory,
    Persisted,
    Upstream,
    /// Expired entry served because fetching was skipped or failed
    Stale,
    /// Nothing cached and nothing fetched
    Neutral,
}

/// Two-tier cache for the market regime snapshot
pub struct RegimeCache {
    config: CacheConfig,
    clock: Arc<dyn Clock>,
    hours: Arc<dyn MarketHours>,
    budget: Arc<CallBudget>,
    memory: Mutex<Option<PersistedRegime>>,
}

impl RegimeCache {
    pub fn new(
        config: CacheConfig,
        clock: Arc<dyn Clock>,
        hours: Arc<dyn MarketHours>,
        budget: Arc<CallBudget>,
    ) -> Self {
        Self {
            config,
            clock,
            hours,
            budget,
            memory: Mutex::new(None),
        }
    }

    pub fn budget(&self) -> &Arc<CallBudget> {
        &self.budget
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn hours(&self) -> &Arc<dyn MarketHours> {
        &self.hours
    }

    fn memory_ttl(&self) -> Duration {
        Duration::seconds(self.config.memory_ttl_secs as i64)
    }

    fn file_ttl(&self) -> Duration {
        Duration::seconds(self.config.file_ttl_secs as i64)
    }

    /// Look up the regime, fetching upstream (at a cost of `calls`) when needed
    pub async fn get_or_fetch<F, Fut>(
        &self,
        force_refresh: bool,
        calls: u32,
        fetch: F,
    ) -> (MarketRegimeSnapshot, RegimeSource)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ProviderResult<MarketRegimeSnapshot>>,
    {
        let mut memory = self.memory.lock().await;
        let now = self.clock.now();

        if !force_refresh {
            if let Some(entry) = memory.as_ref() {
                if !entry.is_expired(now, self.memory_ttl()) {
                    debug!("Regime served from memory");
                    return (entry.snapshot.clone(), RegimeSource::Memory);
                }
            }
        }

        let persisted = self.load_persisted().await;

        if !force_refresh {
            if let Some(entry) = persisted.as_ref() {
                if !entry.is_expired(now, self.file_ttl()) {
                    debug!(cached_at = %entry.cached_at, "Regime served from file");
                    *memory = Some(entry.clone());
                    return (entry.snapshot.clone(), RegimeSource::Persisted);
                }
            }

            if !self.hours.is_open(now) {
                debug!("Market closed, skipping upstream regime fetch");
                return self.fallback(memory.as_ref(), persisted.as_ref(), now);
            }
        }

        if let Err(e) = self.budget.try_acquire(calls).await {
            warn!(error = %e, "Regime refresh skipped");
            return self.fallback(memory.as_ref(), persisted.as_ref(), now);
        }

        match fetch().await {
            Ok(snapshot) => {
                let entry = PersistedRegime {
                    cached_at: now,
                    snapshot: snapshot.clone(),
                };
                if let Err(e) = self.persist(&entry).await {
                    warn!(error = %e, "Failed to persist regime cache");
                }
                *memory = Some(entry);
                info!(
                    tradeable = snapshot.tradeable,
                    label = %snapshot.label,
                    "Regime refreshed from upstream"
                );
                (snapshot, RegimeSource::Upstream)
            }
            Err(e) => {
                warn!(error = %e, "Regime fetch failed, degrading to cached data");
                self.fallback(memory.as_ref(), persisted.as_ref(), now)
            }
        }
    }

    fn fallback(
        &self,
        memory: Option<&PersistedRegime>,
        persisted: Option<&PersistedRegime>,
        now: DateTime<Utc>,
    ) -> (MarketRegimeSnapshot, RegimeSource) {
        let newest = match (memory, persisted) {
            (Some(m), Some(p)) => Some(if m.cached_at >= p.cached_at { m } else { p }),
            (m, p) => m.or(p),
        };
        match newest {
            Some(entry) => (entry.snapshot.clone(), RegimeSource::Stale),
            None => {
                let date = self.hours.exchange_date(now);
                (MarketRegimeSnapshot::neutral(date, now), RegimeSource::Neutral)
            }
        }
    }

    /// Drop the memory tier
    pub async fn invalidate(&self) {
        *self.memory.lock().await = None;
    }

    fn path(&self) -> Option<PathBuf> {
        self.config.path.as_ref().map(PathBuf::from)
    }

    async fn load_persisted(&self) -> Option<PersistedRegime> {
        let path = self.path()?;
        match read_persisted(&path).await {
            Ok(entry) => entry,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring unreadable regime cache");
                None
            }
        }
    }

    async fn persist(&self, entry: &PersistedRegime) -> Result<()> {
        match self.path() {
            Some(path) => write_persisted(&path, entry).await,
            None => Ok(()),
        }
    }
}

/// Read the file tier; `Ok(None)` when no file exists
pub async fn read_persisted(path: &Path) -> Result<Option<PersistedRegime>> {
    let data = match tokio::fs::read_to_string(path).await {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::CachePersistence(e.to_string())),
    };
    let entry = serde_json::from_str(&data).map_err(|e| Error::CachePersistence(e.to_string()))?;
    Ok(Some(entry))
}

/// Write the file tier, creating parent directories
pub async fn write_persisted(path: &Path, entry: &PersistedRegime) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::CachePersistence(e.to_string()))?;
    }
    let data =
        serde_json::to_string_pretty(entry).map_err(|e| Error::CachePersistence(e.to_string()))?;
    tokio::fs::write(path, data)
        .await
        .map_err(|e| Error::CachePersistence(e.to_string()))?;
    debug!(path = %path.display(), "Saved regime cache");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::clock::testing::{FixedHours, ManualClock};
    use super::*;
    use crate::gates::{BenchmarkState, BlockReason, RegimeLabel};
    use crate::provider::ProviderError;
    use chrono::{NaiveDate, TimeZone};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 4, 15, 14, 0, 0).unwrap()
    }

    fn snapshot(at: DateTime<Utc>) -> MarketRegimeSnapshot {
        MarketRegimeSnapshot {
            date: NaiveDate::from_ymd_opt(2025, 4, 15).unwrap(),
            tradeable: true,
            scannable: true,
            block_reasons: vec![],
            label: RegimeLabel::BearishExpansion,
            benchmarks: vec![BenchmarkState {
                symbol: "SPY".to_string(),
                price: 500.1,
                vwap: 502.3,
                below_vwap: true,
            }],
            aggregate_gex: -1.25e9,
            volatility_level: 21.7,
            volatility_change_pct: 6.3,
            evaluated_at: at,
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        path: String,
        clock: Arc<ManualClock>,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("cache/regime.json").display().to_string();
            Self {
                _dir: dir,
                path,
                clock: Arc::new(ManualClock::new(start())),
            }
        }

        fn cache(&self, open: bool, limit: u32) -> RegimeCache {
            let hours: Arc<dyn MarketHours> = Arc::new(FixedHours(open));
            let budget = Arc::new(CallBudget::new(limit, self.clock.clone(), hours.clone()));
            let config = CacheConfig {
                path: Some(self.path.clone()),
                ..Default::default()
            };
            RegimeCache::new(config, self.clock.clone(), hours, budget)
        }
    }

    async fn lookup(
        cache: &RegimeCache,
        force: bool,
        fetches: &Arc<AtomicUsize>,
        result: ProviderResult<MarketRegimeSnapshot>,
    ) -> (MarketRegimeSnapshot, RegimeSource) {
        let counter = fetches.clone();
        cache
            .get_or_fetch(force, 5, move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                result
            })
            .await
    }

    #[tokio::test]
    async fn test_fetch_then_memory_hit() {
        let fx = Fixture::new();
        let cache = fx.cache(true, 100);
        let fetches = Arc::new(AtomicUsize::new(0));

        let (_, source) = lookup(&cache, false, &fetches, Ok(snapshot(start()))).await;
        assert_eq!(source, RegimeSource::Upstream);
        let (_, source) = lookup(&cache, false, &fetches, Ok(snapshot(start()))).await;
        assert_eq!(source, RegimeSource::Memory);
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
        assert_eq!(cache.budget().used().await, 5);
    }

    #[tokio::test]
    async fn test_file_tier_survives_restart() {
        let fx = Fixture::new();
        let fetches = Arc::new(AtomicUsize::new(0));
        {
            let cache = fx.cache(true, 100);
            lookup(&cache, false, &fetches, Ok(snapshot(start()))).await;
        }

        fx.clock.advance(Duration::minutes(10));
        let cache = fx.cache(true, 100);
        let (snap, source) = lookup(&cache, false, &fetches, Ok(snapshot(start()))).await;
        assert_eq!(source, RegimeSource::Persisted);
        assert_eq!(snap, snapshot(start()));
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_closed_market_skips_upstream() {
        let fx = Fixture::new();
        let cache = fx.cache(false, 100);
        let fetches = Arc::new(AtomicUsize::new(0));

        let (snap, source) = lookup(&cache, false, &fetches, Ok(snapshot(start()))).await;
        assert_eq!(source, RegimeSource::Neutral);
        assert!(!snap.tradeable);
        assert_eq!(snap.block_reasons, vec![BlockReason::MarketRegime]);
        assert_eq!(fetches.load(Ordering::SeqCst), 0);

        // Forced refresh ignores market hours
        let (_, source) = lookup(&cache, true, &fetches, Ok(snapshot(start()))).await;
        assert_eq!(source, RegimeSource::Upstream);
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_closed_market_serves_stale_entry() {
        let fx = Fixture::new();
        let fetches = Arc::new(AtomicUsize::new(0));
        lookup(&fx.cache(true, 100), false, &fetches, Ok(snapshot(start()))).await;

        fx.clock.advance(Duration::hours(3));
        let cache = fx.cache(false, 100);
        let (snap, source) = lookup(&cache, false, &fetches, Ok(snapshot(start()))).await;
        assert_eq!(source, RegimeSource::Stale);
        assert!(snap.tradeable);
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_budget_exhaustion_degrades() {
        let fx = Fixture::new();
        let cache = fx.cache(true, 3);
        let fetches = Arc::new(AtomicUsize::new(0));

        let (_, source) = lookup(&cache, false, &fetches, Ok(snapshot(start()))).await;
        assert_eq!(source, RegimeSource::Neutral);
        assert_eq!(fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fetch_error_degrades() {
        let fx = Fixture::new();
        let cache = fx.cache(true, 100);
        let fetches = Arc::new(AtomicUsize::new(0));

        let (_, source) = lookup(
            &cache,
            false,
            &fetches,
            Err(ProviderError::Timeout(2_000)),
        )
        .await;
        assert_eq!(source, RegimeSource::Neutral);
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_persisted_round_trip_is_exact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("regime.json");
        let mut snap = snapshot(start());
        snap.tradeable = false;
        snap.scannable = false;
        snap.block_reasons = vec![
            BlockReason::PassiveInflowWindow,
            BlockReason::PositiveGammaRegime,
        ];
        snap.label = RegimeLabel::Pinned;
        snap.aggregate_gex = 0.1 + 0.2;
        snap.volatility_level = 1.0 / 3.0;
        snap.volatility_change_pct = -5.000000000000001;
        snap.evaluated_at = Utc.timestamp_nanos(1_744_725_600_123_456_789);

        let entry = PersistedRegime {
            cached_at: start(),
            snapshot: snap,
        };
        write_persisted(&path, &entry).await.unwrap();
        let back = read_persisted(&path).await.unwrap().unwrap();
        assert_eq!(back, entry);
        assert_eq!(
            back.snapshot.aggregate_gex.to_bits(),
            entry.snapshot.aggregate_gex.to_bits()
        );
    }

    #[tokio::test]
    async fn test_missing_file_reads_none() {
        let dir = tempfile::tempdir().unwrap();
        let result = read_persisted(&dir.path().join("absent.json")).await.unwrap();
        assert!(result.is_none());

        // Unreadable or corrupt files are errors, not misses
        assert!(read_persisted(dir.path()).await.is_err());
        let corrupt = dir.path().join("corrupt.json");
        tokio::fs::write(&corrupt, "{not json").await.unwrap();
        assert!(read_persisted(&corrupt).await.is_err());
    }
}
