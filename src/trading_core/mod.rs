//! Trading Core - signal side of the engine
//!
//! This module turns ticks into strategy matches:
//! - Last-digit history per symbol
//! - Rise/fall movement counters
//! - Strategy table (rule, contract, default window)
//! - Parameterized pattern detector
//!
//! It holds no broker or sequencing state.

pub mod digits;
pub mod movement;
pub mod patterns;
pub mod strategy;

// Re-export commonly used types
pub use digits::{extract_last_digit, DigitHistory, MAX_DIGITS};
pub use movement::{MovementRun, PriceMovement};
pub use patterns::{digits_match, PatternDetectors, PatternWindows};
pub use strategy::{Direction, PatternRule, StrategyId, StrategyKey};
