//! Session P&L tracking and completed-trade history

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use super::order::TradeOutcome;
use crate::trading_core::StrategyId;
use crate::types::ContractType;

/// Settled trade, as handed to the reporting side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedTradeRecord {
    pub symbol: String,
    pub strategy: StrategyId,
    pub contract_type: ContractType,
    pub contract_id: Option<u64>,
    pub entry_spot: f64,
    pub exit_spot: Option<f64>,
    pub stake: f64,
    pub profit: f64,
    pub outcome: TradeOutcome,
    /// Martingale step the stake was placed at
    pub step: u32,
    /// Session P&L after this trade
    pub cumulative: f64,
    pub opened_at: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
}

/// Session P&L summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionPnL {
    /// Session date (YYYY-MM-DD)
    pub date: String,
    pub cumulative: f64,
    pub trade_count: u32,
    pub wins: u32,
    pub losses: u32,
    pub largest_win: f64,
    pub largest_loss: f64,
    /// Deepest fall from the session high
    pub max_drawdown: f64,
    pub peak: f64,
}

impl Default for SessionPnL {
    fn default() -> Self {
        Self {
            date: Local::now().format("%Y-%m-%d").to_string(),
            cumulative: 0.0,
            trade_count: 0,
            wins: 0,
            losses: 0,
            largest_win: 0.0,
            largest_loss: 0.0,
            max_drawdown: 0.0,
            peak: 0.0,
        }
    }
}

/// Session ledger tracks cumulative profit and recent trades
#[derive(Debug)]
pub struct SessionLedger {
    pnl: SessionPnL,
    history: VecDeque<CompletedTradeRecord>,
    max_history: usize,
}

impl Default for SessionLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionLedger {
    pub fn new() -> Self {
        Self {
            pnl: SessionPnL::default(),
            history: VecDeque::new(),
            max_history: 1000,
        }
    }

    pub fn cumulative(&self) -> f64 {
        self.pnl.cumulative
    }

    /// Book a settled profit and return the new cumulative P&L
    pub fn record_profit(&mut self, profit: f64) -> f64 {
        self.pnl.cumulative += profit;
        self.pnl.trade_count += 1;

        if profit > 0.0 {
            self.pnl.wins += 1;
            if profit > self.pnl.largest_win {
                self.pnl.largest_win = profit;
            }
        } else {
            self.pnl.losses += 1;
            if profit < self.pnl.largest_loss {
                self.pnl.largest_loss = profit;
            }
        }

        if self.pnl.cumulative > self.pnl.peak {
            self.pnl.peak = self.pnl.cumulative;
        }
        let dd = self.pnl.peak - self.pnl.cumulative;
        if dd > self.pnl.max_drawdown {
            self.pnl.max_drawdown = dd;
        }

        self.pnl.cumulative
    }

    pub fn push_record(&mut self, record: CompletedTradeRecord) {
        self.history.push_back(record);
        if self.history.len() > self.max_history {
            self.history.pop_front();
        }
    }

    pub fn history(&self) -> &VecDeque<CompletedTradeRecord> {
        &self.history
    }

    pub fn summary(&self) -> &SessionPnL {
        &self.pnl
    }

    pub fn win_rate(&self) -> f64 {
        if self.pnl.trade_count == 0 {
            0.0
        } else {
            self.pnl.wins as f64 / self.pnl.trade_count as f64
        }
    }

    /// Start a fresh session; history is kept
    pub fn reset(&mut self) {
        self.pnl = SessionPnL::default();
    }

    pub fn stats_summary(&self) -> String {
        format!(
            "P&L: ${:.2} | Trades: {} ({}W/{}L) | WR: {:.1}% | Max DD: ${:.2}",
            self.pnl.cumulative,
            self.pnl.trade_count,
            self.pnl.wins,
            self.pnl.losses,
            self.win_rate() * 100.0,
            self.pnl.max_drawdown
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_cumulative_and_drawdown() {
        let mut ledger = SessionLedger::new();
        ledger.record_profit(0.33);
        ledger.record_profit(-0.35);
        ledger.record_profit(-0.70);
        let cumulative = ledger.record_profit(1.33);

        assert_relative_eq!(cumulative, 0.61, epsilon = 1e-9);
        let summary = ledger.summary();
        assert_eq!(summary.trade_count, 4);
        assert_eq!(summary.wins, 2);
        assert_relative_eq!(summary.largest_loss, -0.70);
        assert_relative_eq!(summary.max_drawdown, 1.05, epsilon = 1e-9);
        assert_relative_eq!(ledger.win_rate(), 0.5);
    }

    #[test]
    fn test_reset_keeps_history() {
        let mut ledger = SessionLedger::new();
        ledger.record_profit(-2.0);
        ledger.push_record(CompletedTradeRecord {
            symbol: "R_10".to_string(),
            strategy: StrategyId::Even,
            contract_type: ContractType::DigitEven,
            contract_id: Some(1),
            entry_spot: 1.0,
            exit_spot: Some(1.1),
            stake: 2.0,
            profit: -2.0,
            outcome: TradeOutcome::Loss,
            step: 0,
            cumulative: -2.0,
            opened_at: Utc::now(),
            closed_at: Utc::now(),
        });
        ledger.reset();
        assert_eq!(ledger.cumulative(), 0.0);
        assert_eq!(ledger.history().len(), 1);
    }
}
