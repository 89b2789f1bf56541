//! CSV log of settled trades

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::path::Path;

use crate::execution::{CompletedTradeRecord, TradeOutcome};

#[derive(Debug, Serialize)]
struct TradeRow<'a> {
    closed_at: String,
    symbol: &'a str,
    strategy: &'a str,
    contract_type: &'a str,
    contract_id: Option<u64>,
    entry_spot: f64,
    exit_spot: Option<f64>,
    stake: f64,
    step: u32,
    profit: f64,
    outcome: &'static str,
    cumulative: f64,
}

impl<'a> From<&'a CompletedTradeRecord> for TradeRow<'a> {
    fn from(r: &'a CompletedTradeRecord) -> Self {
        Self {
            closed_at: r.closed_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            symbol: &r.symbol,
            strategy: r.strategy.as_str(),
            contract_type: r.contract_type.as_str(),
            contract_id: r.contract_id,
            entry_spot: r.entry_spot,
            exit_spot: r.exit_spot,
            stake: r.stake,
            step: r.step,
            profit: r.profit,
            outcome: match r.outcome {
                TradeOutcome::Win => "WIN",
                TradeOutcome::Loss => "LOSS",
            },
            cumulative: r.cumulative,
        }
    }
}

/// Appends completed trades to a CSV file
pub struct TradeLogger {
    writer: csv::Writer<File>,
}

impl TradeLogger {
    /// Open `path` for appending; the header is written only to a new or empty file
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open trade log {}", path.display()))?;
        let empty = file.metadata()?.len() == 0;

        let writer = csv::WriterBuilder::new()
            .has_headers(empty)
            .from_writer(file);
        Ok(Self { writer })
    }

    pub fn log(&mut self, record: &CompletedTradeRecord) -> Result<()> {
        self.writer
            .serialize(TradeRow::from(record))
            .context("Failed to write trade row")?;
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trading_core::StrategyId;
    use crate::types::ContractType;
    use chrono::Utc;

    fn record(profit: f64) -> CompletedTradeRecord {
        CompletedTradeRecord {
            symbol: "R_50".to_string(),
            strategy: StrategyId::Over3,
            contract_type: ContractType::DigitOver,
            contract_id: Some(42),
            entry_spot: 123.4567,
            exit_spot: Some(123.4581),
            stake: 0.35,
            profit,
            outcome: TradeOutcome::from_profit(profit),
            step: 0,
            cumulative: profit,
            opened_at: Utc::now(),
            closed_at: Utc::now(),
        }
    }

    #[test]
    fn test_header_written_once() {
        let path = std::env::temp_dir().join(format!("digitflow-trades-{}.csv", uuid::Uuid::new_v4()));

        let mut logger = TradeLogger::new(&path).unwrap();
        logger.log(&record(0.33)).unwrap();
        drop(logger);

        let mut logger = TradeLogger::new(&path).unwrap();
        logger.log(&record(-0.35)).unwrap();
        drop(logger);

        let contents = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).ok();

        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("closed_at,symbol,strategy,contract_type"));
        assert!(lines[1].contains("R_50,over3,DIGITOVER,42"));
        assert!(lines[1].ends_with("WIN,0.33"));
        assert!(lines[2].ends_with("LOSS,-0.35"));
    }
}
