//! Configuration for the trade engine

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::EngineError;
use crate::trading_core::{PatternWindows, StrategyId};
use crate::types::{default_markets, MarketSpec};

/// Which Deriv account the session trades on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountMode {
    /// Virtual-money demo account
    Demo,
    /// Real-money account
    Real,
}

impl Default for AccountMode {
    fn default() -> Self {
        Self::Demo
    }
}

impl std::fmt::Display for AccountMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Demo => write!(f, "Demo"),
            Self::Real => write!(f, "Real"),
        }
    }
}

impl std::str::FromStr for AccountMode {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "demo" => Ok(Self::Demo),
            "real" => Ok(Self::Real),
            other => Err(EngineError::config(
                "account",
                format!("expected demo or real, got '{}'", other),
            )),
        }
    }
}

/// Configuration for the trade engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Markets to analyse and trade
    pub markets: Vec<MarketSpec>,

    /// Strategies evaluated on every tick
    pub strategies: Vec<StrategyId>,

    /// Pattern window per strategy
    pub windows: PatternWindows,

    /// Stake of the opening trade in a sequence
    pub base_stake: f64,

    /// Stake multiplier applied per consecutive loss
    pub martingale_multiplier: f64,

    /// Step at which the stake reverts to base
    pub martingale_max_level: u32,

    /// Cumulative loss that halts the session
    pub max_loss: f64,

    /// Cumulative profit that halts the session
    pub target_profit: f64,

    /// Consecutive losses after which a strategy is paused
    pub pause_after_step: u32,

    /// Seconds a strategy is ignored after a loss
    pub loss_cooldown_secs: u64,

    /// Contract duration in ticks
    pub duration_ticks: u32,

    /// Arm a follow-up on the next tick after a mid-sequence loss
    pub follow_up_on_loss: bool,

    /// Contract subscription retries before the trade is force-closed
    pub max_subscription_retries: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            markets: default_markets(),
            strategies: StrategyId::ALL.to_vec(),
            windows: PatternWindows::default(),
            base_stake: 0.35,           // Deriv minimum stake
            martingale_multiplier: 2.0,
            martingale_max_level: 5,
            max_loss: 50.0,
            target_profit: 10.0,
            pause_after_step: 3,
            loss_cooldown_secs: 5,
            duration_ticks: 1,
            follow_up_on_loss: false,
            max_subscription_retries: 3,
        }
    }
}

impl EngineConfig {
    /// Smaller ladder and tighter session limits
    pub fn conservative() -> Self {
        Self {
            martingale_max_level: 3,
            max_loss: 10.0,
            target_profit: 5.0,
            pause_after_step: 2,
            ..Default::default()
        }
    }

    /// Load a JSON config; missing fields take their defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw).context("Failed to parse engine config")?;
        config.validate()?;
        Ok(config)
    }

    /// Check every numeric option is in range; returns the first offender
    pub fn validate(&self) -> Result<(), EngineError> {
        if !(self.base_stake.is_finite() && self.base_stake > 0.0) {
            return Err(EngineError::InvalidStake {
                stake: self.base_stake,
            });
        }
        if !(self.martingale_multiplier.is_finite() && self.martingale_multiplier > 1.0) {
            return Err(EngineError::config("martingale_multiplier", "must be greater than 1"));
        }
        if self.martingale_max_level == 0 {
            return Err(EngineError::config("martingale_max_level", "must be at least 1"));
        }
        if !(self.max_loss > 0.0) {
            return Err(EngineError::config("max_loss", "must be positive"));
        }
        if !(self.target_profit > 0.0) {
            return Err(EngineError::config("target_profit", "must be positive"));
        }
        if self.pause_after_step == 0 {
            return Err(EngineError::config("pause_after_step", "must be at least 1"));
        }
        if self.pause_after_step > self.martingale_max_level {
            // The loss count wraps at max level and would never reach the pause step
            return Err(EngineError::config(
                "pause_after_step",
                format!("must not exceed martingale_max_level ({})", self.martingale_max_level),
            ));
        }
        if self.duration_ticks == 0 {
            return Err(EngineError::config("duration_ticks", "must be at least 1"));
        }
        if self.markets.is_empty() {
            return Err(EngineError::config("markets", "no markets configured"));
        }
        for (strategy, window) in self.windows.iter() {
            if window == 0 {
                return Err(EngineError::InvalidWindow { strategy, window });
            }
        }
        Ok(())
    }

    pub fn symbols(&self) -> Vec<String> {
        self.markets.iter().map(|m| m.symbol.clone()).collect()
    }

    pub fn market_name<'a>(&'a self, symbol: &'a str) -> &'a str {
        self.markets
            .iter()
            .find(|m| m.symbol == symbol)
            .map(|m| m.name.as_str())
            .unwrap_or(symbol)
    }
}
