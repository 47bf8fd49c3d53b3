//! Market domain model
//!
//! Immutable value types handed to the pipeline by upstream adapters, plus the
//! indicator math shared by the analysis layers.

pub mod bars;
pub mod catalyst;
pub mod flow;
pub mod gex;
pub mod indicators;
pub mod options;

pub use bars::{PriceBar, Quote};
pub use catalyst::{CatalystContext, EarlyWarning, EarlyWarningLevel, InsiderSale};
pub use flow::{
    DarkPoolPrint, FlowSentiment, OptionsActivity, OptionsFlowEvent, PrintDirection,
    SkewSnapshot, TradeSide,
};
pub use gex::GammaExposureSnapshot;
pub use options::{Greeks, IvSnapshot, OptionType, OptionsContract};
