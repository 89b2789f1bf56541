//! Consecutive price-move counters for the rise/fall strategies

use std::collections::HashMap;

use super::strategy::Direction;

/// Running count of strictly rising or falling ticks for one symbol
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MovementRun {
    pub last_price: Option<f64>,
    pub direction: Option<Direction>,
    pub count: u32,
}

impl MovementRun {
    /// Fold one price into the run. The first price only seeds `last_price`.
    pub fn update(&mut self, price: f64) {
        if let Some(last) = self.last_price {
            let moved = if price > last {
                Some(Direction::Rise)
            } else if price < last {
                Some(Direction::Fall)
            } else {
                None
            };

            match moved {
                Some(dir) if self.direction == Some(dir) => self.count += 1,
                Some(dir) => {
                    self.direction = Some(dir);
                    self.count = 1;
                }
                None => {
                    self.direction = None;
                    self.count = 0;
                }
            }
        }
        self.last_price = Some(price);
    }

    pub fn reached(&self, direction: Direction, threshold: usize) -> bool {
        threshold > 0 && self.direction == Some(direction) && self.count as usize >= threshold
    }

    /// Consume the run so the same moves cannot trigger twice
    pub fn consume(&mut self) {
        self.count = 0;
        self.direction = None;
    }
}

#[derive(Debug, Default)]
pub struct PriceMovement {
    runs: HashMap<String, MovementRun>,
}

impl PriceMovement {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, symbol: &str, price: f64) {
        self.runs.entry(symbol.to_string()).or_default().update(price);
    }

    /// Start tracking from a backfilled price without counting a move
    pub fn seed(&mut self, symbol: &str, price: f64) {
        self.runs.insert(
            symbol.to_string(),
            MovementRun {
                last_price: Some(price),
                ..Default::default()
            },
        );
    }

    pub fn run(&self, symbol: &str) -> Option<&MovementRun> {
        self.runs.get(symbol)
    }

    /// True when the run matches; a match consumes the run
    pub fn take_match(&mut self, symbol: &str, direction: Direction, threshold: usize) -> bool {
        match self.runs.get_mut(symbol) {
            Some(run) if run.reached(direction, threshold) => {
                run.consume();
                true
            }
            _ => false,
        }
    }
}
