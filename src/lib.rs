//! Put Scanner Library
//!
//! Deterministic bearish-options candidate scanner: market regime gate,
//! dealer/distribution/liquidity/acceleration layers, composite scoring,
//! volatility gate, trade classification and put contract selection.

pub mod cache;
pub mod cli;
pub mod config;
pub mod engines;
pub mod error;
pub mod gates;
pub mod market;
pub mod pipeline;
pub mod provider;
pub mod scoring;
pub mod selection;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};
pub use pipeline::{Candidate, DailyReport, PutScanner};
