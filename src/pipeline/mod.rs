//! Scan pipeline: per-symbol orchestration, candidates and the daily report

pub mod candidate;
pub mod report;
pub mod scanner;

pub use candidate::Candidate;
pub use report::{rank, DailyReport};
pub use scanner::{Providers, PutScanner, ScannerConfig};
