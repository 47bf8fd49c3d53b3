//! Per-symbol analysis engines
//!
//! Each engine is a pure function of already-fetched market data. Engines
//! never fetch and never fail: missing inputs simply leave signals unset.

pub mod acceleration;
pub mod distribution;
pub mod liquidity;

pub use acceleration::{
    classify, AccelerationClassifier, AccelerationConfig, AccelerationInputs, AccelerationWindow,
    ArchetypeFlags, EngineArchetype, WeaknessFlags,
};
pub use distribution::{
    Bucket, DarkPoolCluster, DistributionConfig, DistributionDetector, DistributionInputs,
    DistributionPriority, DistributionSignal, DistributionSignals, RvolTier,
};
pub use liquidity::{
    LiquidityConfig, LiquidityDetector, LiquidityInputs, LiquiditySignals, LiquidityVacuumSignal,
    SectorAgreement, SectorContext, SectorPeer, SectorTier,
};
