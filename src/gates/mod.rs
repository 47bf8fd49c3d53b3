//! Hard gates
//!
//! Gates never score. They either let a candidate through or attach a typed
//! [`BlockReason`], and any block overrides every engine downstream.

pub mod block;
pub mod dealer;
pub mod regime;
pub mod volatility;

pub use block::{push_unique, BlockReason};
pub use dealer::{DealerAnalysis, DealerConfig, DealerGate, DealerInputs, PutWall};
pub use regime::{
    BenchmarkPosition, BenchmarkState, MarketRegimeGate, MarketRegimeSnapshot, RegimeConfig,
    RegimeInputs, RegimeLabel,
};
pub use volatility::{
    RankSource, TradeStructure, VolatilityConfig, VolatilityDecision, VolatilityGate,
    VolatilityRegime,
};
