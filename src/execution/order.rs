//! The single open trade and its state machine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::sequence::SequencePhase;
use crate::trading_core::{StrategyId, StrategyKey};
use crate::types::{ContractType, ContractUpdate, PlaceOrder};

/// Trade state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeState {
    /// Buy request sent, no contract id yet
    Submitted,
    /// Contract bought, waiting for lifecycle updates
    Open,
    /// Close requested after subscription retries ran out
    Closing,
    /// Settlement booked
    Settled,
}

impl std::fmt::Display for TradeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Submitted => write!(f, "SUBMITTED"),
            Self::Open => write!(f, "OPEN"),
            Self::Closing => write!(f, "CLOSING"),
            Self::Settled => write!(f, "SETTLED"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeOutcome {
    Win,
    Loss,
}

impl TradeOutcome {
    /// A zero profit counts as a loss
    pub fn from_profit(profit: f64) -> Self {
        if profit > 0.0 {
            Self::Win
        } else {
            Self::Loss
        }
    }
}

impl std::fmt::Display for TradeOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Win => write!(f, "WIN"),
            Self::Loss => write!(f, "LOSS"),
        }
    }
}

/// The process-wide open trade. While one exists no other order is placed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentTrade {
    /// Client-side id
    pub id: Uuid,

    pub symbol: String,
    pub strategy: StrategyId,
    pub contract_type: ContractType,
    pub barrier: Option<u8>,
    pub duration_ticks: u32,
    pub stake: f64,

    /// Opening or continuation trade of its sequence
    #[serde(skip)]
    pub phase: Option<SequencePhase>,

    /// Broker contract id (set on buy confirmation)
    pub contract_id: Option<u64>,
    pub buy_price: Option<f64>,
    pub entry_spot: Option<f64>,
    pub exit_spot: Option<f64>,
    pub profit: Option<f64>,

    pub state: TradeState,
    pub subscription_retries: u32,
    pub opened_at: DateTime<Utc>,
}

impl CurrentTrade {
    pub fn new(order: &PlaceOrder, strategy: StrategyId, phase: SequencePhase, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            symbol: order.symbol.clone(),
            strategy,
            contract_type: order.contract_type,
            barrier: order.barrier,
            duration_ticks: order.duration_ticks,
            stake: order.stake,
            phase: Some(phase),
            contract_id: None,
            buy_price: None,
            entry_spot: None,
            exit_spot: None,
            profit: None,
            state: TradeState::Submitted,
            subscription_retries: 0,
            opened_at: now,
        }
    }

    pub fn key(&self) -> StrategyKey {
        StrategyKey::new(&self.symbol, self.strategy)
    }

    pub fn accept(&mut self, contract_id: u64, buy_price: f64) {
        self.contract_id = Some(contract_id);
        self.buy_price = Some(buy_price);
        self.state = TradeState::Open;
    }

    /// Copy whatever spots the update carries
    pub fn apply_spots(&mut self, update: &ContractUpdate) {
        if update.entry_tick.is_some() {
            self.entry_spot = update.entry_tick;
        }
        if update.exit_tick.is_some() {
            self.exit_spot = update.exit_tick;
        }
    }

    /// Sold, with profit and entry spot known, and not booked yet
    pub fn ready_to_settle(&self, update: &ContractUpdate) -> Option<f64> {
        if self.state == TradeState::Settled || self.profit.is_some() {
            return None;
        }
        if !update.is_sold || self.entry_spot.is_none() {
            return None;
        }
        update.profit
    }

    pub fn is_terminal(&self) -> bool {
        self.state == TradeState::Settled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trade() -> CurrentTrade {
        let order = PlaceOrder {
            symbol: "R_10".to_string(),
            contract_type: ContractType::DigitOver,
            stake: 0.35,
            duration_ticks: 1,
            barrier: Some(3),
        };
        CurrentTrade::new(&order, StrategyId::Over3, SequencePhase::Opening, Utc::now())
    }

    #[test]
    fn test_settlement_waits_for_complete_data() {
        let mut t = trade();
        t.accept(42, 0.35);
        assert_eq!(t.state, TradeState::Open);

        let sold_without_entry = ContractUpdate {
            contract_id: 42,
            is_sold: true,
            profit: Some(0.3),
            ..Default::default()
        };
        t.apply_spots(&sold_without_entry);
        assert_eq!(t.ready_to_settle(&sold_without_entry), None);

        let full = ContractUpdate {
            entry_tick: Some(1234.567),
            exit_tick: Some(1234.561),
            ..sold_without_entry
        };
        t.apply_spots(&full);
        assert_eq!(t.ready_to_settle(&full), Some(0.3));

        t.profit = Some(0.3);
        assert_eq!(t.ready_to_settle(&full), None);
    }

    #[test]
    fn test_zero_profit_is_loss() {
        assert_eq!(TradeOutcome::from_profit(0.0), TradeOutcome::Loss);
        assert_eq!(TradeOutcome::from_profit(0.01), TradeOutcome::Win);
        assert_eq!(TradeOutcome::from_profit(-0.35), TradeOutcome::Loss);
    }
}
