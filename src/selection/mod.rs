//! Strike and expiry selection

pub mod expiry;
pub mod selector;
pub mod strikes;

pub use expiry::{days_to_expiry, dte_window, resolve_window, target_friday, DteWindow};
pub use selector::{ContractSelector, Rejection, SelectedContract, SelectionConfig, SelectionRequest};
pub use strikes::{strike_band, tier_for, BandMode, PriceTier, StrikeBand, StrikeDistance};
