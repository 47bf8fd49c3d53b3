//! Composite scoring and trade classification
//!
//! The composite scorer turns layer outputs into a single 0.0-1.0 score; the
//! classifier turns score plus confirmation into a trade class and size.

pub mod classifier;
pub mod composite;

pub use classifier::{
    recommended_size, ClassifierConfig, ClassifierInputs, TradeClass, TradeClassification,
    TradeClassifier,
};
pub use composite::{
    bearish_premium_share, catalyst_score, CompositeInputs, CompositeScore, CompositeScorer,
    ScoreComponents, ScoringConfig, ScoringWeights,
};
