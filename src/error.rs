//! Engine error types

use crate::trading_core::StrategyId;

/// Faults raised by the core engine. Transport and startup code uses `anyhow`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("cannot extract a digit from price {price}")]
    InvalidPrice { price: f64 },

    #[error("invalid stake {stake}: must be a positive finite amount")]
    InvalidStake { stake: f64 },

    #[error("invalid window {window} for {strategy}: must be at least 1")]
    InvalidWindow { strategy: StrategyId, window: usize },

    #[error("unknown strategy '{0}'")]
    UnknownStrategy(String),

    #[error("invalid config value {key}: {reason}")]
    ConfigInvalid { key: String, reason: String },
}

impl EngineError {
    pub fn config(key: &str, reason: impl Into<String>) -> Self {
        Self::ConfigInvalid {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}
