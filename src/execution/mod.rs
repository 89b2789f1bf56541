//! Execution module for martingale trade sequencing
//!
//! This module takes strategy matches from the trading core and decides
//! whether, what and at what stake to trade, keeping at most one contract
//! open across all markets.

mod config;
mod engine;
mod gate;
mod martingale;
mod order;
mod position;
mod sequence;

pub use config::{AccountMode, EngineConfig};
pub use engine::{EngineEvent, EngineStatus, HaltReason, LogEvent, TradeEngine};
pub use gate::{GateBlock, TradeGate};
pub use martingale::{round2, LossOutcome, MartingaleLedger, MartingaleState};
pub use order::{CurrentTrade, TradeOutcome, TradeState};
pub use position::{CompletedTradeRecord, SessionLedger, SessionPnL};
pub use sequence::{PendingContinuation, Sequence, SequenceCoordinator, SequencePhase};
