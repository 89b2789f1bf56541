//! Martingale stake ladder per (symbol, strategy)

use std::collections::HashMap;
use tracing::info;

use crate::error::EngineError;
use crate::trading_core::StrategyKey;

/// Round to cents the way the broker prices stakes
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MartingaleState {
    pub base_stake: f64,
    pub step: u32,
}

/// Result of booking a loss
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LossOutcome {
    /// Consecutive losses including this one, before any wrap to base
    pub losses: u32,
    /// Step after the update
    pub step: u32,
    /// The ladder hit its max level and reverted to base
    pub reverted: bool,
}

#[derive(Debug)]
pub struct MartingaleLedger {
    base_stake: f64,
    multiplier: f64,
    max_level: u32,
    states: HashMap<StrategyKey, MartingaleState>,
}

impl MartingaleLedger {
    pub fn new(base_stake: f64, multiplier: f64, max_level: u32) -> Self {
        Self {
            base_stake,
            multiplier,
            max_level,
            states: HashMap::new(),
        }
    }

    pub fn base_stake(&self) -> f64 {
        self.base_stake
    }

    pub fn state(&self, key: &StrategyKey) -> MartingaleState {
        self.states.get(key).copied().unwrap_or(MartingaleState {
            base_stake: self.base_stake,
            step: 0,
        })
    }

    pub fn step(&self, key: &StrategyKey) -> u32 {
        self.state(key).step
    }

    /// base × multiplier^step, rounded to cents
    pub fn stake_for(&self, key: &StrategyKey) -> Result<f64, EngineError> {
        let state = self.state(key);
        let exponent = i32::try_from(state.step).unwrap_or(i32::MAX);
        let stake = round2(state.base_stake * self.multiplier.powi(exponent));
        if !stake.is_finite() || stake <= 0.0 {
            return Err(EngineError::InvalidStake { stake });
        }
        Ok(stake)
    }

    pub fn on_loss(&mut self, key: &StrategyKey) -> LossOutcome {
        let base = self.base_stake;
        let state = self.states.entry(key.clone()).or_insert(MartingaleState {
            base_stake: base,
            step: 0,
        });

        state.step += 1;
        let losses = state.step;
        let reverted = state.step >= self.max_level;
        if reverted {
            info!(
                "Martingale level limit ({}) reached for {}. Reverting to base stake.",
                self.max_level, key
            );
            state.step = 0;
        }

        LossOutcome {
            losses,
            step: state.step,
            reverted,
        }
    }

    pub fn on_win(&mut self, key: &StrategyKey) {
        if let Some(state) = self.states.get_mut(key) {
            state.step = 0;
        }
    }

    /// Global operator action: new base for every key, all steps zeroed
    pub fn set_base_stake(&mut self, amount: f64) -> Result<(), EngineError> {
        if !amount.is_finite() || amount <= 0.0 {
            return Err(EngineError::InvalidStake { stake: amount });
        }
        self.base_stake = amount;
        for state in self.states.values_mut() {
            state.base_stake = amount;
            state.step = 0;
        }
        info!("Base stake set to {:.2} for all strategies", amount);
        Ok(())
    }

    pub fn reset_steps(&mut self) {
        for state in self.states.values_mut() {
            state.step = 0;
        }
    }
}
