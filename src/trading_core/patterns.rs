//! Pattern detection
//!
//! One detector parameterized by [`PatternRule`] and a per-strategy window.
//! Digit rules are pure predicates over the history; run rules read the
//! price-movement counters and consume them on a match.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::path::Path;
use tracing::info;

use super::movement::PriceMovement;
use super::strategy::{PatternRule, StrategyId};
use crate::error::EngineError;

/// Operator-adjustable window length per strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatternWindows(BTreeMap<StrategyId, usize>);

impl Default for PatternWindows {
    fn default() -> Self {
        Self(
            StrategyId::ALL
                .iter()
                .map(|id| (*id, id.default_window()))
                .collect(),
        )
    }
}

impl PatternWindows {
    pub fn get(&self, strategy: StrategyId) -> usize {
        self.0
            .get(&strategy)
            .copied()
            .unwrap_or_else(|| strategy.default_window())
    }

    pub fn set(&mut self, strategy: StrategyId, window: usize) -> Result<(), EngineError> {
        if window == 0 {
            return Err(EngineError::InvalidWindow { strategy, window });
        }
        self.0.insert(strategy, window);
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (StrategyId, usize)> + '_ {
        self.0.iter().map(|(k, v)| (*k, *v))
    }

    /// Load windows saved by [`PatternWindows::save`]; a missing file yields defaults
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read pattern windows from {}", path.display()))?;
        let saved: PatternWindows =
            serde_json::from_str(&raw).context("Failed to parse pattern windows")?;

        let mut windows = Self::default();
        for (strategy, window) in saved.iter() {
            windows.set(strategy, window)?;
        }
        info!("Loaded pattern windows from {}", path.display());
        Ok(windows)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write pattern windows to {}", path.display()))?;
        Ok(())
    }
}

/// True when the most recent `window` digits all satisfy a digit rule
pub fn digits_match(rule: PatternRule, window: usize, digits: &VecDeque<u8>) -> bool {
    if window == 0 || digits.len() < window {
        return false;
    }
    let mut recent = digits.iter().rev().take(window);
    match rule {
        PatternRule::AllOdd => recent.all(|d| d % 2 == 1),
        PatternRule::AllEven => recent.all(|d| d % 2 == 0),
        PatternRule::AllAtMost(barrier) => recent.all(|d| *d <= barrier),
        PatternRule::AllAtLeast(barrier) => recent.all(|d| *d >= barrier),
        PatternRule::Run(_) => false,
    }
}

#[derive(Debug, Default)]
pub struct PatternDetectors {
    windows: PatternWindows,
    movement: PriceMovement,
}

impl PatternDetectors {
    pub fn new(windows: PatternWindows) -> Self {
        Self {
            windows,
            movement: PriceMovement::new(),
        }
    }

    pub fn windows(&self) -> &PatternWindows {
        &self.windows
    }

    pub fn set_window(&mut self, strategy: StrategyId, window: usize) -> Result<(), EngineError> {
        self.windows.set(strategy, window)
    }

    pub fn movement(&self) -> &PriceMovement {
        &self.movement
    }

    /// Feed a live price to the rise/fall counters
    pub fn observe_tick(&mut self, symbol: &str, price: f64) {
        self.movement.update(symbol, price);
    }

    pub fn observe_history(&mut self, symbol: &str, last_price: f64) {
        self.movement.seed(symbol, last_price);
    }

    /// Evaluate one strategy for a symbol. Run rules are consumed on a match.
    pub fn evaluate(
        &mut self,
        strategy: StrategyId,
        symbol: &str,
        digits: Option<&VecDeque<u8>>,
    ) -> bool {
        let window = self.windows.get(strategy);
        match strategy.rule() {
            PatternRule::Run(direction) => self.movement.take_match(symbol, direction, window),
            rule => digits.is_some_and(|d| digits_match(rule, window, d)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(digits: &[u8]) -> VecDeque<u8> {
        digits.iter().copied().collect()
    }

    #[test]
    fn test_over_requires_all_at_or_below_barrier() {
        let rule = StrategyId::Over3.rule();
        assert!(digits_match(rule, 3, &window(&[9, 1, 1, 1])));
        assert!(digits_match(rule, 3, &window(&[3, 0, 3])));
        // Window slides: [1,2,3] then 4 leaves 2,3,4
        assert!(!digits_match(rule, 3, &window(&[1, 2, 3, 4])));
    }

    #[test]
    fn test_under_requires_all_at_or_above_barrier() {
        let rule = StrategyId::Under6.rule();
        assert!(digits_match(rule, 2, &window(&[0, 6, 9])));
        assert!(!digits_match(rule, 2, &window(&[6, 5])));
    }

    #[test]
    fn test_parity_is_a_reversal_bet() {
        let odd_run = window(&[2, 1, 3, 5]);
        assert!(digits_match(StrategyId::Even.rule(), 3, &odd_run));
        assert!(!digits_match(StrategyId::Odd.rule(), 3, &odd_run));
        assert!(digits_match(StrategyId::Odd.rule(), 2, &window(&[0, 8])));
    }

    #[test]
    fn test_short_history_never_matches() {
        assert!(!digits_match(PatternRule::AllAtMost(9), 5, &window(&[1, 1])));
        assert!(!digits_match(PatternRule::AllAtMost(9), 0, &window(&[1, 1])));
    }

    #[test]
    fn test_rise_matches_once_at_threshold() {
        let mut detectors = PatternDetectors::default();
        detectors.set_window(StrategyId::Rise, 6).unwrap();

        detectors.observe_tick("R_10", 100.0);
        let mut fired = Vec::new();
        for i in 1..=6 {
            detectors.observe_tick("R_10", 100.0 + i as f64);
            fired.push(detectors.evaluate(StrategyId::Rise, "R_10", None));
        }
        assert_eq!(fired, vec![false, false, false, false, false, true]);
        assert_eq!(detectors.movement().run("R_10").unwrap().count, 0);

        // A flat tick after the match neither matches nor counts
        detectors.observe_tick("R_10", 106.0);
        assert!(!detectors.evaluate(StrategyId::Rise, "R_10", None));
        assert_eq!(detectors.movement().run("R_10").unwrap().count, 0);

        detectors.observe_tick("R_10", 105.0);
        assert!(!detectors.evaluate(StrategyId::Rise, "R_10", None));
    }

    #[test]
    fn test_windows_reject_zero() {
        let mut windows = PatternWindows::default();
        assert_eq!(windows.get(StrategyId::Under6), 8);
        assert!(windows.set(StrategyId::Under6, 0).is_err());
        windows.set(StrategyId::Under6, 4).unwrap();
        assert_eq!(windows.get(StrategyId::Under6), 4);
    }

    #[test]
    fn test_windows_persist() {
        let path = std::env::temp_dir().join(format!("digitflow-windows-{}.json", uuid::Uuid::new_v4()));
        let mut windows = PatternWindows::default();
        windows.set(StrategyId::Over5, 3).unwrap();
        windows.save(&path).unwrap();

        let loaded = PatternWindows::load(&path).unwrap();
        assert_eq!(loaded.get(StrategyId::Over5), 3);
        assert_eq!(loaded.get(StrategyId::Fall), 11);
        std::fs::remove_file(&path).unwrap();

        assert_eq!(PatternWindows::load(&path).unwrap(), PatternWindows::default());
    }
}
