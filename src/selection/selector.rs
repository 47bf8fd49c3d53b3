//! Contract selection
//!
//! Filters a put chain down to tradable contracts inside the strike band and
//! expiry window, then ranks the survivors.

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::debug;

use super::expiry::{days_to_expiry, dte_window, resolve_window, DteWindow};
use super::strikes::{strike_band, tier_for, PriceTier, StrikeBand};
use crate::gates::dealer::count_bounces;
use crate::market::{OptionType, OptionsContract, PriceBar};

/// Universal contract filters and ranking preferences
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionConfig {
    /// Shallower than this is a lottery ticket
    #[serde(default = "default_min_abs_delta")]
    pub min_abs_delta: f64,

    /// Maximum bid-ask spread as a fraction of mid
    #[serde(default = "default_max_spread_pct")]
    pub max_spread_pct: f64,

    #[serde(default = "default_min_open_interest")]
    pub min_open_interest: u64,

    /// Thin open interest is accepted at this volume...
    #[serde(default = "default_escape_min_volume")]
    pub escape_min_volume: u64,

    /// ...and this volume/OI ratio
    #[serde(default = "default_escape_volume_oi_ratio")]
    pub escape_volume_oi_ratio: f64,

    /// Per-share premium range that ranks best
    #[serde(default = "default_premium_low")]
    pub premium_sweet_low: f64,
    #[serde(default = "default_premium_high")]
    pub premium_sweet_high: f64,

    /// Combined OI + volume at which liquidity ranks full
    #[serde(default = "default_liquidity_full")]
    pub liquidity_full: f64,

    /// Strikes within this fraction of a defended put wall are rejected
    #[serde(default = "default_wall_proximity")]
    pub wall_proximity: f64,

    #[serde(default = "default_wall_min_bounces")]
    pub wall_min_bounces: u32,

    /// Share of chain put OI at one strike that makes it a wall candidate
    #[serde(default = "default_wall_oi_concentration")]
    pub wall_oi_concentration: f64,

    /// Daily bars searched for bounces
    #[serde(default = "default_wall_lookback_days")]
    pub wall_lookback_days: usize,
}

fn default_min_abs_delta() -> f64 {
    0.15
}
fn default_max_spread_pct() -> f64 {
    0.10
}
fn default_min_open_interest() -> u64 {
    100
}
fn default_escape_min_volume() -> u64 {
    50
}
fn default_escape_volume_oi_ratio() -> f64 {
    0.5
}
fn default_premium_low() -> f64 {
    3.0
}
fn default_premium_high() -> f64 {
    8.0
}
fn default_liquidity_full() -> f64 {
    2000.0
}
fn default_wall_proximity() -> f64 {
    0.01
}
fn default_wall_min_bounces() -> u32 {
    3
}
fn default_wall_oi_concentration() -> f64 {
    0.15
}
fn default_wall_lookback_days() -> usize {
    30
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            min_abs_delta: default_min_abs_delta(),
            max_spread_pct: default_max_spread_pct(),
            min_open_interest: default_min_open_interest(),
            escape_min_volume: default_escape_min_volume(),
            escape_volume_oi_ratio: default_escape_volume_oi_ratio(),
            premium_sweet_low: default_premium_low(),
            premium_sweet_high: default_premium_high(),
            liquidity_full: default_liquidity_full(),
            wall_proximity: default_wall_proximity(),
            wall_min_bounces: default_wall_min_bounces(),
            wall_oi_concentration: default_wall_oi_concentration(),
            wall_lookback_days: default_wall_lookback_days(),
        }
    }
}

/// Why a contract was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Rejection {
    NotPut,
    NotOtm,
    OutsideStrikeBand,
    OutsideDteWindow,
    NotFriday,
    DeltaTooShallow,
    DeltaOutsideTier,
    SpreadTooWide,
    ThinOpenInterest,
    NearPutWall,
}

/// Context for one selection
#[derive(Debug, Clone)]
pub struct SelectionRequest<'a> {
    pub spot: f64,
    /// ATR(14) of the underlying
    pub atr: Option<f64>,
    pub score: f64,
    /// DTE shift from the volatility gate
    pub dte_adjustment: i64,
    pub today: NaiveDate,
    /// Put wall from the GEX snapshot, at any distance below spot
    pub gex_put_wall: Option<f64>,
    /// Daily bars of the underlying, for bounce counting
    pub daily_bars: &'a [PriceBar],
    /// Expanding IV overrides wall safety
    pub iv_expanding: bool,
}

/// Winning contract plus the criteria it was picked against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedContract {
    pub contract: OptionsContract,
    pub rank: f64,
    pub strike_band: StrikeBand,
    pub dte_window: DteWindow,
    pub days_to_expiry: i64,
    /// Strike distance below spot as a fraction of spot
    pub distance_pct: f64,
}

pub struct ContractSelector {
    config: SelectionConfig,
    /// Composite score at which the near expiry window applies
    actionable_threshold: f64,
}

impl ContractSelector {
    pub fn new(config: SelectionConfig, actionable_threshold: f64) -> Self {
        Self {
            config,
            actionable_threshold,
        }
    }

    pub fn config(&self) -> &SelectionConfig {
        &self.config
    }

    /// Strike band and expiry window a request will be matched against
    pub fn criteria(&self, req: &SelectionRequest<'_>) -> (StrikeBand, DteWindow) {
        let band = strike_band(req.spot, req.atr);
        let window = resolve_window(
            req.today,
            dte_window(req.score, self.actionable_threshold, req.dte_adjustment),
        );
        (band, window)
    }

    /// Best contract on the earliest qualifying Friday; rank decides within that expiry
    pub fn select(&self, chain: &[OptionsContract], req: &SelectionRequest<'_>) -> Option<SelectedContract> {
        let tier = tier_for(req.spot);
        let (band, window) = self.criteria(req);
        let walls = self.defended_walls(chain, req);

        let mut best: Option<(f64, &OptionsContract)> = None;
        let mut rejected = 0usize;
        for contract in chain {
            if let Err(reason) = self.check(contract, req, &tier, &band, &window, &walls) {
                rejected += 1;
                debug!(contract = %contract.symbol, reason = ?reason, "Contract rejected");
                continue;
            }
            let rank = self.rank(contract, &tier, &window, days_to_expiry(req.today, contract.expiration));
            let better = match best {
                None => true,
                Some((best_rank, best_contract)) => match contract.expiration.cmp(&best_contract.expiration) {
                    Ordering::Less => true,
                    Ordering::Greater => false,
                    Ordering::Equal => {
                        rank > best_rank || (rank == best_rank && contract.symbol < best_contract.symbol)
                    }
                },
            };
            if better {
                best = Some((rank, contract));
            }
        }

        debug!(
            spot = req.spot,
            lower = band.lower,
            upper = band.upper,
            dte_min = window.min,
            dte_max = window.max,
            considered = chain.len(),
            rejected,
            walls = walls.len(),
            "Contract selection complete"
        );

        best.map(|(rank, contract)| SelectedContract {
            contract: contract.clone(),
            rank,
            strike_band: band,
            dte_window: window,
            days_to_expiry: days_to_expiry(req.today, contract.expiration),
            distance_pct: (req.spot - contract.strike) / req.spot,
        })
    }

    /// Universal filters, independent of band and window
    pub fn passes_filters(&self, contract: &OptionsContract, spot: f64) -> Result<(), Rejection> {
        if contract.option_type != OptionType::Put {
            return Err(Rejection::NotPut);
        }
        if !contract.is_otm(spot) {
            return Err(Rejection::NotOtm);
        }
        if contract.abs_delta() < self.config.min_abs_delta {
            return Err(Rejection::DeltaTooShallow);
        }
        if contract.spread_pct() > self.config.max_spread_pct {
            return Err(Rejection::SpreadTooWide);
        }
        if contract.open_interest < self.config.min_open_interest {
            let escape = contract.volume >= self.config.escape_min_volume
                && contract.volume_oi_ratio() >= self.config.escape_volume_oi_ratio;
            if !escape {
                return Err(Rejection::ThinOpenInterest);
            }
        }
        Ok(())
    }

    fn check(
        &self,
        contract: &OptionsContract,
        req: &SelectionRequest<'_>,
        tier: &PriceTier,
        band: &StrikeBand,
        window: &DteWindow,
        walls: &[f64],
    ) -> Result<(), Rejection> {
        self.passes_filters(contract, req.spot)?;
        if !tier.delta_in_range(contract.abs_delta()) {
            return Err(Rejection::DeltaOutsideTier);
        }
        if !band.contains(contract.strike) {
            return Err(Rejection::OutsideStrikeBand);
        }
        if !window.contains(days_to_expiry(req.today, contract.expiration)) {
            return Err(Rejection::OutsideDteWindow);
        }
        if contract.expiration.weekday() != Weekday::Fri {
            return Err(Rejection::NotFriday);
        }
        if self.near_defended_wall(contract.strike, walls) {
            return Err(Rejection::NearPutWall);
        }
        Ok(())
    }

    /// Put-wall levels below spot that price has bounced off enough times.
    ///
    /// Candidates are the GEX put wall and every strike holding more than
    /// `wall_oi_concentration` of the chain's put open interest. Distance from
    /// spot is not capped: a wall far below spot still pins a strike sitting on
    /// it. Empty while IV is expanding.
    pub fn defended_walls(&self, chain: &[OptionsContract], req: &SelectionRequest<'_>) -> Vec<f64> {
        if req.iv_expanding || req.spot <= 0.0 {
            return Vec::new();
        }

        let mut levels: Vec<f64> = req
            .gex_put_wall
            .filter(|l| *l > 0.0 && *l < req.spot)
            .into_iter()
            .collect();

        // Strikes keyed in tenths of a cent so expirations aggregate
        let mut by_strike: BTreeMap<i64, (f64, u64)> = BTreeMap::new();
        let mut total_oi = 0u64;
        for contract in chain.iter().filter(|c| c.option_type == OptionType::Put) {
            let entry = by_strike
                .entry((contract.strike * 1000.0).round() as i64)
                .or_insert((contract.strike, 0));
            entry.1 += contract.open_interest;
            total_oi += contract.open_interest;
        }
        if total_oi > 0 {
            levels.extend(
                by_strike
                    .values()
                    .filter(|(strike, oi)| {
                        *strike < req.spot
                            && *oi as f64 / total_oi as f64 > self.config.wall_oi_concentration
                    })
                    .map(|(strike, _)| *strike),
            );
        }
        levels.sort_by(|a, b| a.total_cmp(b));
        levels.dedup_by(|a, b| (*a - *b).abs() < 1e-6);

        let bars = &req.daily_bars[req.daily_bars.len().saturating_sub(self.config.wall_lookback_days)..];
        levels.retain(|level| count_bounces(bars, *level) >= self.config.wall_min_bounces);
        levels
    }

    fn near_defended_wall(&self, strike: f64, walls: &[f64]) -> bool {
        walls
            .iter()
            .any(|level| (strike - level).abs() / level <= self.config.wall_proximity)
    }

    fn rank(&self, contract: &OptionsContract, tier: &PriceTier, window: &DteWindow, dte: i64) -> f64 {
        let half_delta = ((tier.delta_max - tier.delta_min) / 2.0).max(f64::EPSILON);
        let delta = 1.0 - ((contract.abs_delta() - tier.delta_sweet_spot()).abs() / half_delta);

        let spread = 1.0 - contract.spread_pct() / self.config.max_spread_pct;

        let half_window = ((window.max - window.min) as f64 / 2.0).max(1.0);
        let dte_fit = 1.0 - (dte as f64 - window.midpoint()).abs() / half_window;

        let liquidity = (contract.open_interest + contract.volume) as f64 / self.config.liquidity_full;

        0.30 * delta.clamp(0.0, 1.0)
            + 0.25 * spread.clamp(0.0, 1.0)
            + 0.15 * dte_fit.clamp(0.0, 1.0)
            + 0.15 * liquidity.clamp(0.0, 1.0)
            + 0.15 * self.premium_preference(contract.mid())
    }

    /// Peaks across the sweet range, tapering on both sides
    fn premium_preference(&self, premium: f64) -> f64 {
        let (low, high) = (self.config.premium_sweet_low, self.config.premium_sweet_high);
        if premium <= 0.0 {
            0.0
        } else if premium < low {
            premium / low
        } else if premium <= high {
            1.0
        } else {
            (1.0 - (premium - high) / high).max(0.0)
        }
    }
}
