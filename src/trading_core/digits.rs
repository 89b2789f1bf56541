//! Per-symbol last-digit history
//!
//! Both the history backfill and the live tick path go through
//! [`extract_last_digit`], so a quote yields the same digit whichever way it
//! arrived.

use std::collections::{HashMap, VecDeque};
use tracing::debug;

use crate::error::EngineError;
use crate::types::{MarketSpec, DEFAULT_DECIMALS};

/// Maximum digits retained per symbol
pub const MAX_DIGITS: usize = 1000;

/// Last digit of `price` printed at `decimals` places
pub fn extract_last_digit(price: f64, decimals: usize) -> Result<u8, EngineError> {
    if !price.is_finite() {
        return Err(EngineError::InvalidPrice { price });
    }
    let formatted = format!("{:.*}", decimals, price);
    formatted
        .chars()
        .last()
        .and_then(|c| c.to_digit(10))
        .map(|d| d as u8)
        .ok_or(EngineError::InvalidPrice { price })
}

#[derive(Debug, Default)]
struct SymbolDigits {
    digits: VecDeque<u8>,
    last_price: Option<f64>,
}

impl SymbolDigits {
    fn push(&mut self, digit: u8) {
        self.digits.push_back(digit);
        while self.digits.len() > MAX_DIGITS {
            self.digits.pop_front();
        }
    }
}

#[derive(Debug)]
pub struct DigitHistory {
    decimals: HashMap<String, usize>,
    symbols: HashMap<String, SymbolDigits>,
}

impl DigitHistory {
    pub fn new(markets: &[MarketSpec]) -> Self {
        Self {
            decimals: markets
                .iter()
                .map(|m| (m.symbol.clone(), m.decimals))
                .collect(),
            symbols: HashMap::new(),
        }
    }

    pub fn decimals_for(&self, symbol: &str) -> usize {
        self.decimals.get(symbol).copied().unwrap_or(DEFAULT_DECIMALS)
    }

    /// Replace the symbol's digits with a backfilled price series (oldest first)
    pub fn ingest_history(&mut self, symbol: &str, prices: &[f64]) -> Result<usize, EngineError> {
        let decimals = self.decimals_for(symbol);
        let start = prices.len().saturating_sub(MAX_DIGITS);

        let mut fresh = SymbolDigits::default();
        for &price in &prices[start..] {
            fresh.push(extract_last_digit(price, decimals)?);
        }
        fresh.last_price = prices.last().copied();

        let count = fresh.digits.len();
        self.symbols.insert(symbol.to_string(), fresh);
        debug!("Backfilled {} digits for {}", count, symbol);
        Ok(count)
    }

    /// Append the digit of a live tick, evicting the oldest beyond the cap
    pub fn ingest_tick(&mut self, symbol: &str, price: f64) -> Result<u8, EngineError> {
        let digit = extract_last_digit(price, self.decimals_for(symbol))?;
        let entry = self.symbols.entry(symbol.to_string()).or_default();
        entry.push(digit);
        entry.last_price = Some(price);
        Ok(digit)
    }

    pub fn digits(&self, symbol: &str) -> Option<&VecDeque<u8>> {
        self.symbols.get(symbol).map(|s| &s.digits)
    }

    pub fn last_price(&self, symbol: &str) -> Option<f64> {
        self.symbols.get(symbol).and_then(|s| s.last_price)
    }

    pub fn len(&self, symbol: &str) -> usize {
        self.digits(symbol).map_or(0, |d| d.len())
    }

    pub fn is_empty(&self, symbol: &str) -> bool {
        self.len(symbol) == 0
    }

    /// Percentage frequency of each digit 0-9 over the retained window
    pub fn digit_distribution(&self, symbol: &str) -> [f64; 10] {
        let mut counts = [0usize; 10];
        let Some(digits) = self.digits(symbol) else {
            return [0.0; 10];
        };
        for &d in digits {
            counts[d as usize] += 1;
        }
        let total = digits.len().max(1) as f64;
        counts.map(|c| c as f64 * 100.0 / total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::default_markets;
    use approx::assert_relative_eq;

    #[test]
    fn test_extract_pads_to_precision() {
        // 1234.5 at 3 decimals prints as 1234.500
        assert_eq!(extract_last_digit(1234.5, 3).unwrap(), 0);
        assert_eq!(extract_last_digit(6543.217, 3).unwrap(), 7);
        assert_eq!(extract_last_digit(812.44, 2).unwrap(), 4);
        assert_eq!(extract_last_digit(100.0, 0).unwrap(), 0);
    }

    #[test]
    fn test_extract_rejects_nan() {
        assert!(matches!(
            extract_last_digit(f64::NAN, 2),
            Err(EngineError::InvalidPrice { .. })
        ));
    }

    #[test]
    fn test_history_and_tick_agree() {
        let mut history = DigitHistory::new(&default_markets());
        history.ingest_history("R_50", &[101.2345, 101.2346]).unwrap();
        let backfilled = *history.digits("R_50").unwrap().back().unwrap();

        let live = history.ingest_tick("R_50", 101.2346).unwrap();
        assert_eq!(backfilled, live);
        assert_eq!(live, 6);
    }

    #[test]
    fn test_history_replaces_and_caps() {
        let mut history = DigitHistory::new(&default_markets());
        history.ingest_tick("R_10", 5.001).unwrap();

        let prices: Vec<f64> = (0..1500).map(|i| 1000.0 + i as f64 * 0.001).collect();
        let count = history.ingest_history("R_10", &prices).unwrap();
        assert_eq!(count, MAX_DIGITS);
        // Oldest kept price is index 500 -> 1000.500
        assert_eq!(*history.digits("R_10").unwrap().front().unwrap(), 0);
        assert_eq!(history.last_price("R_10"), Some(prices[1499]));
    }

    #[test]
    fn test_tick_evicts_oldest() {
        let mut history = DigitHistory::new(&default_markets());
        for _ in 0..MAX_DIGITS {
            history.ingest_tick("R_100", 10.11).unwrap();
        }
        history.ingest_tick("R_100", 10.17).unwrap();
        assert_eq!(history.len("R_100"), MAX_DIGITS);
        assert_eq!(*history.digits("R_100").unwrap().back().unwrap(), 7);
    }

    #[test]
    fn test_unknown_symbol_uses_default_precision() {
        let history = DigitHistory::new(&default_markets());
        assert_eq!(history.decimals_for("BOOM500"), DEFAULT_DECIMALS);
        assert!(history.is_empty("BOOM500"));
    }

    #[test]
    fn test_distribution() {
        let mut history = DigitHistory::new(&default_markets());
        for price in [1.11, 1.11, 1.13, 1.14] {
            history.ingest_tick("R_100", price).unwrap();
        }
        let dist = history.digit_distribution("R_100");
        assert_relative_eq!(dist[1], 50.0);
        assert_relative_eq!(dist[3], 25.0);
        assert_relative_eq!(dist[0], 0.0);
    }
}
