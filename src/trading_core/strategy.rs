//! Strategy table
//!
//! Every strategy is a row: which digit rule triggers it, which contract it
//! buys and the default pattern window. Detection is shared and driven by
//! [`PatternRule`], so adding a strategy means adding a row here.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::EngineError;
use crate::types::ContractType;

/// Direction of a run of consecutive price moves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Rise,
    Fall,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rise => write!(f, "rise"),
            Self::Fall => write!(f, "fall"),
        }
    }
}

/// Predicate a strategy applies to its window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternRule {
    /// Every digit in the window is odd
    AllOdd,
    /// Every digit in the window is even
    AllEven,
    /// Every digit in the window is <= the barrier
    AllAtMost(u8),
    /// Every digit in the window is >= the barrier
    AllAtLeast(u8),
    /// Consecutive price moves in one direction reached the window length
    Run(Direction),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyId {
    Even,
    Odd,
    Over3,
    Over4,
    Over5,
    Over6,
    Over7,
    Over8,
    Under3,
    Under4,
    Under5,
    Under6,
    Under7,
    Rise,
    Fall,
}

impl StrategyId {
    /// All strategies in evaluation order
    pub const ALL: [StrategyId; 15] = [
        Self::Even,
        Self::Odd,
        Self::Over3,
        Self::Over4,
        Self::Over5,
        Self::Over6,
        Self::Over7,
        Self::Over8,
        Self::Under3,
        Self::Under4,
        Self::Under5,
        Self::Under6,
        Self::Under7,
        Self::Rise,
        Self::Fall,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Even => "even",
            Self::Odd => "odd",
            Self::Over3 => "over3",
            Self::Over4 => "over4",
            Self::Over5 => "over5",
            Self::Over6 => "over6",
            Self::Over7 => "over7",
            Self::Over8 => "over8",
            Self::Under3 => "under3",
            Self::Under4 => "under4",
            Self::Under5 => "under5",
            Self::Under6 => "under6",
            Self::Under7 => "under7",
            Self::Rise => "rise",
            Self::Fall => "fall",
        }
    }

    /// Barrier digit for over/under contracts
    pub fn barrier(&self) -> Option<u8> {
        match self {
            Self::Over3 | Self::Under3 => Some(3),
            Self::Over4 | Self::Under4 => Some(4),
            Self::Over5 | Self::Under5 => Some(5),
            Self::Over6 | Self::Under6 => Some(6),
            Self::Over7 | Self::Under7 => Some(7),
            Self::Over8 => Some(8),
            _ => None,
        }
    }

    pub fn rule(&self) -> PatternRule {
        match self {
            // Reversal bets: a long odd run buys EVEN and vice versa
            Self::Even => PatternRule::AllOdd,
            Self::Odd => PatternRule::AllEven,
            Self::Over3 | Self::Over4 | Self::Over5 | Self::Over6 | Self::Over7 | Self::Over8 => {
                PatternRule::AllAtMost(self.barrier().unwrap_or(0))
            }
            Self::Under3 | Self::Under4 | Self::Under5 | Self::Under6 | Self::Under7 => {
                PatternRule::AllAtLeast(self.barrier().unwrap_or(9))
            }
            Self::Rise => PatternRule::Run(Direction::Rise),
            Self::Fall => PatternRule::Run(Direction::Fall),
        }
    }

    pub fn contract_type(&self) -> ContractType {
        match self {
            Self::Even => ContractType::DigitEven,
            Self::Odd => ContractType::DigitOdd,
            Self::Over3 | Self::Over4 | Self::Over5 | Self::Over6 | Self::Over7 | Self::Over8 => {
                ContractType::DigitOver
            }
            Self::Under3 | Self::Under4 | Self::Under5 | Self::Under6 | Self::Under7 => {
                ContractType::DigitUnder
            }
            // Bet against the run
            Self::Rise => ContractType::Put,
            Self::Fall => ContractType::Call,
        }
    }

    /// Default pattern window (digits, or consecutive moves for rise/fall)
    pub fn default_window(&self) -> usize {
        match self {
            Self::Even => 11,
            Self::Odd => 10,
            Self::Over3 => 12,
            Self::Over4 => 10,
            Self::Over5 => 14,
            Self::Over6 => 18,
            Self::Over7 => 20,
            Self::Over8 => 25,
            Self::Under3 => 15,
            Self::Under4 => 14,
            Self::Under5 => 11,
            Self::Under6 => 8,
            Self::Under7 => 10,
            Self::Rise => 6,
            Self::Fall => 11,
        }
    }
}

impl std::fmt::Display for StrategyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for StrategyId {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|id| id.as_str() == wanted)
            .ok_or_else(|| EngineError::UnknownStrategy(s.to_string()))
    }
}

/// (symbol, strategy) pair that owns martingale, gate and sequence state
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StrategyKey {
    pub symbol: String,
    pub strategy: StrategyId,
}

impl StrategyKey {
    pub fn new(symbol: &str, strategy: StrategyId) -> Self {
        Self {
            symbol: symbol.to_string(),
            strategy,
        }
    }
}

impl std::fmt::Display for StrategyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.strategy, self.symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_strategy_names() {
        assert_eq!("over5".parse::<StrategyId>().unwrap(), StrategyId::Over5);
        assert_eq!(" Rise ".parse::<StrategyId>().unwrap(), StrategyId::Rise);
        assert!(matches!(
            "over9".parse::<StrategyId>(),
            Err(EngineError::UnknownStrategy(_))
        ));
    }

    #[test]
    fn test_table_rows() {
        assert_eq!(StrategyId::Over3.rule(), PatternRule::AllAtMost(3));
        assert_eq!(StrategyId::Over3.contract_type(), ContractType::DigitOver);
        assert_eq!(StrategyId::Under7.rule(), PatternRule::AllAtLeast(7));
        assert_eq!(StrategyId::Under7.barrier(), Some(7));
        assert_eq!(StrategyId::Even.rule(), PatternRule::AllOdd);
        assert_eq!(StrategyId::Even.barrier(), None);
        assert_eq!(StrategyId::Rise.contract_type(), ContractType::Put);
        assert_eq!(StrategyId::Fall.contract_type(), ContractType::Call);
    }

    #[test]
    fn test_every_strategy_has_a_window() {
        for id in StrategyId::ALL {
            assert!(id.default_window() > 0, "{} has no window", id);
            assert_eq!(id.as_str().parse::<StrategyId>().unwrap(), id);
        }
    }
}
