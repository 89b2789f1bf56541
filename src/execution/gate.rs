//! Trade gating: locks after wins, pauses after loss streaks, loss cooldowns
//!
//! Locks and pauses are cleared only by round-level resets:
//! - every (symbol, strategy) locked: all locks clear and a new round starts
//! - no symbol mid-trade and every symbol reached the pause step (paused a key
//!   or won since the last release): all pauses and pause markers clear together
//!
//! Cooldowns are a separate axis; neither reset touches them.

use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

use crate::trading_core::{StrategyId, StrategyKey};

/// Why a key is not allowed to trade right now
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateBlock {
    Paused,
    Locked,
}

impl std::fmt::Display for GateBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Paused => write!(f, "paused"),
            Self::Locked => write!(f, "locked"),
        }
    }
}

#[derive(Debug, Default)]
pub struct TradeGate {
    locked: HashSet<StrategyKey>,
    paused: HashSet<StrategyKey>,
    cooldowns: HashMap<StrategyKey, DateTime<Utc>>,
    active_symbols: HashSet<String>,
    reached_pause_step: HashSet<String>,
}

impl TradeGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pause is checked before lock
    pub fn check(&self, key: &StrategyKey) -> Result<(), GateBlock> {
        if self.paused.contains(key) {
            return Err(GateBlock::Paused);
        }
        if self.locked.contains(key) {
            return Err(GateBlock::Locked);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Locks
    // ------------------------------------------------------------------

    pub fn is_locked(&self, key: &StrategyKey) -> bool {
        self.locked.contains(key)
    }

    pub fn lock(&mut self, key: &StrategyKey) {
        if self.locked.insert(key.clone()) {
            info!("Locked {} after win", key);
        }
    }

    pub fn unlock(&mut self, key: &StrategyKey) -> bool {
        let removed = self.locked.remove(key);
        if removed {
            info!("Unlocked {}", key);
        }
        removed
    }

    pub fn unlock_all(&mut self) {
        self.locked.clear();
    }

    pub fn locked_count(&self) -> usize {
        self.locked.len()
    }

    /// Clear every lock once all symbol × strategy combinations are locked
    pub fn check_all_locked(&mut self, symbols: &[String], strategies: &[StrategyId]) -> bool {
        if symbols.is_empty() || strategies.is_empty() {
            return false;
        }
        let all_locked = symbols.iter().all(|symbol| {
            strategies
                .iter()
                .all(|s| self.locked.contains(&StrategyKey::new(symbol, *s)))
        });
        if all_locked {
            info!("All markets locked for all strategies. Starting a new round.");
            self.locked.clear();
        }
        all_locked
    }

    // ------------------------------------------------------------------
    // Pauses
    // ------------------------------------------------------------------

    pub fn is_paused(&self, key: &StrategyKey) -> bool {
        self.paused.contains(key)
    }

    pub fn paused_count(&self) -> usize {
        self.paused.len()
    }

    /// Pause a key that hit the loss threshold; its symbol counts as having reached it
    pub fn pause(&mut self, key: &StrategyKey) {
        self.paused.insert(key.clone());
        self.reached_pause_step.insert(key.symbol.clone());
        info!(
            "Paused {} at pause step ({} symbols reached)",
            key,
            self.reached_pause_step.len()
        );
    }

    pub fn has_reached_pause_step(&self, symbol: &str) -> bool {
        self.reached_pause_step.contains(symbol)
    }

    pub fn reached_count(&self) -> usize {
        self.reached_pause_step.len()
    }

    /// A win also counts its symbol toward the pause barrier
    pub fn record_win(&mut self, symbol: &str, known_symbols: &[String]) -> bool {
        self.reached_pause_step.insert(symbol.to_string());
        self.try_resume(known_symbols)
    }

    // ------------------------------------------------------------------
    // Activity
    // ------------------------------------------------------------------

    pub fn mark_active(&mut self, symbol: &str) {
        self.active_symbols.insert(symbol.to_string());
    }

    /// Symbol finished its trade; may release the pause barrier
    pub fn mark_inactive(&mut self, symbol: &str, known_symbols: &[String]) -> bool {
        self.active_symbols.remove(symbol);
        self.try_resume(known_symbols)
    }

    pub fn is_active(&self, symbol: &str) -> bool {
        self.active_symbols.contains(symbol)
    }

    pub fn any_active(&self) -> bool {
        !self.active_symbols.is_empty()
    }

    fn try_resume(&mut self, known_symbols: &[String]) -> bool {
        if self.paused.is_empty() || self.any_active() || known_symbols.is_empty() {
            return false;
        }
        if !known_symbols
            .iter()
            .all(|s| self.reached_pause_step.contains(s))
        {
            debug!(
                "Pause barrier holding: {}/{} symbols reached pause step",
                self.reached_pause_step.len(),
                known_symbols.len()
            );
            return false;
        }

        info!(
            "All markets reached the pause step. Resuming {} paused strategies.",
            self.paused.len()
        );
        self.paused.clear();
        self.reached_pause_step.clear();
        true
    }

    // ------------------------------------------------------------------
    // Cooldowns
    // ------------------------------------------------------------------

    pub fn start_cooldown(&mut self, key: &StrategyKey, now: DateTime<Utc>, seconds: u64) {
        if seconds == 0 {
            return;
        }
        // Capped at a day
        let until = now + Duration::seconds(seconds.min(86_400) as i64);
        self.cooldowns.insert(key.clone(), until);
    }

    pub fn on_cooldown(&self, key: &StrategyKey, now: DateTime<Utc>) -> bool {
        self.cooldowns.get(key).is_some_and(|until| now < *until)
    }

    /// Full session reset used by an operator restart
    pub fn reset(&mut self) {
        self.locked.clear();
        self.paused.clear();
        self.cooldowns.clear();
        self.active_symbols.clear();
        self.reached_pause_step.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbols() -> Vec<String> {
        vec!["R_10".to_string(), "R_25".to_string()]
    }

    #[test]
    fn test_pause_checked_before_lock() {
        let mut gate = TradeGate::new();
        let key = StrategyKey::new("R_10", StrategyId::Even);
        assert_eq!(gate.check(&key), Ok(()));
        gate.lock(&key);
        assert_eq!(gate.check(&key), Err(GateBlock::Locked));
        gate.pause(&key);
        assert_eq!(gate.check(&key), Err(GateBlock::Paused));
    }

    #[test]
    fn test_all_locked_starts_new_round() {
        let mut gate = TradeGate::new();
        let strategies = [StrategyId::Even, StrategyId::Odd];
        gate.lock(&StrategyKey::new("R_10", StrategyId::Even));
        gate.lock(&StrategyKey::new("R_10", StrategyId::Odd));
        gate.lock(&StrategyKey::new("R_25", StrategyId::Even));
        assert!(!gate.check_all_locked(&symbols(), &strategies));
        assert_eq!(gate.locked_count(), 3);

        gate.lock(&StrategyKey::new("R_25", StrategyId::Odd));
        assert!(gate.check_all_locked(&symbols(), &strategies));
        assert_eq!(gate.locked_count(), 0);
    }

    #[test]
    fn test_pause_barrier_waits_for_every_symbol() {
        let mut gate = TradeGate::new();
        let a = StrategyKey::new("R_10", StrategyId::Over3);
        let b = StrategyKey::new("R_25", StrategyId::Under7);

        gate.mark_active("R_10");
        gate.pause(&a);
        assert!(!gate.mark_inactive("R_10", &symbols()));
        assert!(gate.is_paused(&a));

        gate.mark_active("R_25");
        gate.pause(&b);
        gate.mark_active("R_10");
        // R_10 still mid-trade
        assert!(!gate.mark_inactive("R_25", &symbols()));
        assert!(gate.is_paused(&b));

        assert!(gate.mark_inactive("R_10", &symbols()));
        assert!(!gate.is_paused(&a));
        assert!(!gate.is_paused(&b));
        assert!(!gate.has_reached_pause_step("R_10"));
        assert_eq!(gate.reached_count(), 0);
    }

    #[test]
    fn test_win_counts_toward_pause_barrier() {
        let mut gate = TradeGate::new();
        let a = StrategyKey::new("R_10", StrategyId::Over3);
        gate.pause(&a);

        gate.mark_active("R_25");
        // R_25 still mid-trade
        assert!(!gate.record_win("R_25", &symbols()));
        assert!(gate.has_reached_pause_step("R_25"));
        assert!(gate.mark_inactive("R_25", &symbols()));
        assert!(!gate.is_paused(&a));
    }

    #[test]
    fn test_cooldown_is_independent_of_resets() {
        let mut gate = TradeGate::new();
        let key = StrategyKey::new("R_10", StrategyId::Even);
        let now = Utc::now();
        gate.start_cooldown(&key, now, 5);
        assert!(gate.on_cooldown(&key, now + Duration::seconds(4)));
        assert!(!gate.on_cooldown(&key, now + Duration::seconds(5)));

        gate.lock(&key);
        gate.check_all_locked(&["R_10".to_string()], &[StrategyId::Even]);
        assert!(gate.on_cooldown(&key, now + Duration::seconds(1)));
    }
}
