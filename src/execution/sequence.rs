//! Sequence lifecycle per (symbol, strategy) and the next-tick continuation
//!
//! A sequence opens on the first placed trade after a pattern match, stays
//! open across losses and closes on a win. A [`PendingContinuation`] carries
//! a follow-up trade over to the next tick of the same symbol.

use std::collections::HashMap;
use tracing::{debug, info};

use crate::trading_core::{StrategyId, StrategyKey};
use crate::types::ContractType;

#[derive(Debug, Clone, PartialEq)]
pub struct Sequence {
    pub active: bool,
    pub consecutive_losses: u32,
    pub contract_type: ContractType,
    pub barrier: Option<u8>,
}

/// Whether a trade opens a sequence or continues one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencePhase {
    Opening,
    Continuation,
}

impl std::fmt::Display for SequencePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Opening => write!(f, "opening"),
            Self::Continuation => write!(f, "continuation"),
        }
    }
}

/// Follow-up trade armed for the next tick of `symbol`
#[derive(Debug, Clone, PartialEq)]
pub struct PendingContinuation {
    pub symbol: String,
    pub strategy: StrategyId,
    pub contract_type: ContractType,
    pub barrier: Option<u8>,
    pub duration_ticks: u32,
}

impl PendingContinuation {
    pub fn key(&self) -> StrategyKey {
        StrategyKey::new(&self.symbol, self.strategy)
    }
}

#[derive(Debug, Default)]
pub struct SequenceCoordinator {
    sequences: HashMap<StrategyKey, Sequence>,
    pending: Option<PendingContinuation>,
}

impl SequenceCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &StrategyKey) -> Option<&Sequence> {
        self.sequences.get(key)
    }

    pub fn is_active(&self, key: &StrategyKey) -> bool {
        self.sequences.get(key).is_some_and(|s| s.active)
    }

    pub fn phase(&self, key: &StrategyKey) -> SequencePhase {
        if self.is_active(key) {
            SequencePhase::Continuation
        } else {
            SequencePhase::Opening
        }
    }

    /// Open a sequence once its first trade has actually been placed
    pub fn start(&mut self, key: &StrategyKey, contract_type: ContractType, barrier: Option<u8>) {
        info!("Starting new sequence for {}", key);
        self.sequences.insert(
            key.clone(),
            Sequence {
                active: true,
                consecutive_losses: 0,
                contract_type,
                barrier,
            },
        );
    }

    /// A loss keeps the sequence open; returns the loss count so far
    pub fn record_loss(&mut self, key: &StrategyKey) -> u32 {
        match self.sequences.get_mut(key) {
            Some(seq) if seq.active => {
                seq.consecutive_losses += 1;
                seq.consecutive_losses
            }
            _ => 0,
        }
    }

    /// A win closes the sequence
    pub fn end(&mut self, key: &StrategyKey) {
        if let Some(seq) = self.sequences.get_mut(key) {
            if seq.active {
                info!(
                    "Sequence for {} ended after {} losses",
                    key, seq.consecutive_losses
                );
            }
            seq.active = false;
            seq.consecutive_losses = 0;
        }
    }

    /// Drop all in-flight state for one key, including a continuation it armed
    pub fn reset(&mut self, key: &StrategyKey) {
        self.sequences.remove(key);
        if self.pending.as_ref().is_some_and(|p| &p.key() == key) {
            self.pending = None;
        }
    }

    pub fn active_count(&self) -> usize {
        self.sequences.values().filter(|s| s.active).count()
    }

    // ------------------------------------------------------------------
    // Next-tick continuation
    // ------------------------------------------------------------------

    pub fn arm(&mut self, pending: PendingContinuation) {
        if let Some(previous) = self.pending.replace(pending) {
            debug!("Replaced pending continuation for {}", previous.key());
        }
    }

    pub fn pending(&self) -> Option<&PendingContinuation> {
        self.pending.as_ref()
    }

    /// Consume the continuation if it belongs to `symbol`
    pub fn take_for(&mut self, symbol: &str) -> Option<PendingContinuation> {
        if self.pending.as_ref()?.symbol == symbol {
            self.pending.take()
        } else {
            None
        }
    }

    pub fn clear_pending(&mut self) {
        self.pending = None;
    }

    pub fn clear_all(&mut self) {
        self.sequences.clear();
        self.pending = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> StrategyKey {
        StrategyKey::new("R_10", StrategyId::Over3)
    }

    fn pending(symbol: &str) -> PendingContinuation {
        PendingContinuation {
            symbol: symbol.to_string(),
            strategy: StrategyId::Over3,
            contract_type: ContractType::DigitOver,
            barrier: Some(3),
            duration_ticks: 1,
        }
    }

    #[test]
    fn test_lifecycle() {
        let mut seqs = SequenceCoordinator::new();
        assert_eq!(seqs.phase(&key()), SequencePhase::Opening);

        seqs.start(&key(), ContractType::DigitOver, Some(3));
        assert_eq!(seqs.phase(&key()), SequencePhase::Continuation);
        assert_eq!(seqs.record_loss(&key()), 1);
        assert_eq!(seqs.record_loss(&key()), 2);
        assert!(seqs.is_active(&key()));

        seqs.end(&key());
        assert_eq!(seqs.phase(&key()), SequencePhase::Opening);
        assert_eq!(seqs.record_loss(&key()), 0);
    }

    #[test]
    fn test_continuation_waits_for_its_symbol() {
        let mut seqs = SequenceCoordinator::new();
        seqs.arm(pending("R_10"));
        assert!(seqs.take_for("R_25").is_none());
        assert!(seqs.pending().is_some());

        let taken = seqs.take_for("R_10").unwrap();
        assert_eq!(taken.barrier, Some(3));
        assert!(seqs.pending().is_none());
        assert!(seqs.take_for("R_10").is_none());
    }

    #[test]
    fn test_reset_drops_own_continuation_only() {
        let mut seqs = SequenceCoordinator::new();
        seqs.start(&key(), ContractType::DigitOver, Some(3));
        seqs.arm(pending("R_25"));
        seqs.reset(&key());
        assert!(!seqs.is_active(&key()));
        assert!(seqs.pending().is_some());

        seqs.arm(pending("R_10"));
        seqs.reset(&key());
        assert!(seqs.pending().is_none());
    }
}
