// Library crate - digit pattern detection and martingale trade sequencing

pub mod types;
pub mod error;
pub mod trading_core;
pub mod execution;
pub mod deriv;
pub mod report;

// Re-export commonly used types
pub use types::*;
pub use error::EngineError;
pub use execution::{EngineConfig, EngineEvent, TradeEngine};
pub use trading_core::{StrategyId, StrategyKey};
