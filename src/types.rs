//! Shared types passed between the engine and the Deriv transport

use serde::{Deserialize, Serialize};

/// Decimal precision assumed for symbols missing from the market table
pub const DEFAULT_DECIMALS: usize = 2;

/// A tradeable synthetic index and the precision its quotes are printed at
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketSpec {
    pub symbol: String,
    pub name: String,
    pub decimals: usize,
}

impl MarketSpec {
    pub fn new(symbol: &str, name: &str, decimals: usize) -> Self {
        Self {
            symbol: symbol.to_string(),
            name: name.to_string(),
            decimals,
        }
    }
}

/// Volatility indices traded by default
pub fn default_markets() -> Vec<MarketSpec> {
    vec![
        MarketSpec::new("R_10", "Volatility 10 Index", 3),
        MarketSpec::new("R_25", "Volatility 25 Index", 3),
        MarketSpec::new("R_50", "Volatility 50 Index", 4),
        MarketSpec::new("R_75", "Volatility 75 Index", 4),
        MarketSpec::new("R_100", "Volatility 100 Index", 2),
        MarketSpec::new("1HZ10V", "Volatility 10 (1s) Index", 2),
        MarketSpec::new("1HZ25V", "Volatility 25 (1s) Index", 2),
        MarketSpec::new("1HZ50V", "Volatility 50 (1s) Index", 2),
        MarketSpec::new("1HZ75V", "Volatility 75 (1s) Index", 2),
        MarketSpec::new("1HZ100V", "Volatility 100 (1s) Index", 2),
    ]
}

/// Broker contract types the engine can buy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ContractType {
    DigitOver,
    DigitUnder,
    DigitEven,
    DigitOdd,
    Call,
    Put,
}

impl ContractType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DigitOver => "DIGITOVER",
            Self::DigitUnder => "DIGITUNDER",
            Self::DigitEven => "DIGITEVEN",
            Self::DigitOdd => "DIGITODD",
            Self::Call => "CALL",
            Self::Put => "PUT",
        }
    }
}

impl std::fmt::Display for ContractType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Inbound events (transport -> engine)
// ============================================================================

/// Lifecycle update for an open contract
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ContractUpdate {
    pub contract_id: u64,
    pub entry_tick: Option<f64>,
    pub exit_tick: Option<f64>,
    pub is_sold: bool,
    pub profit: Option<f64>,
}

/// Parsed message handed to the engine by the transport layer
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    Tick {
        symbol: String,
        price: f64,
        epoch: i64,
    },
    History {
        symbol: String,
        prices: Vec<f64>,
        times: Vec<i64>,
    },
    OrderAccepted {
        contract_id: u64,
        buy_price: f64,
    },
    OrderRejected {
        message: String,
    },
    ContractUpdate(ContractUpdate),
    /// The contract subscription request came back with an error
    SubscriptionFailed {
        contract_id: u64,
        message: String,
    },
    SellConfirmed {
        contract_id: u64,
    },
    /// Any other broker error while a trade may be open
    ContractError {
        message: String,
    },
    Connected,
    Disconnected,
}

// ============================================================================
// Outbound commands (engine -> transport)
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct PlaceOrder {
    pub symbol: String,
    pub contract_type: ContractType,
    pub stake: f64,
    pub duration_ticks: u32,
    pub barrier: Option<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    PlaceOrder(PlaceOrder),
    SubscribeContract { contract_id: u64 },
    CloseContract { contract_id: u64 },
}

impl Command {
    pub fn is_place_order(&self) -> bool {
        matches!(self, Self::PlaceOrder(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contract_type_wire_names() {
        let json = serde_json::to_string(&ContractType::DigitOver).unwrap();
        assert_eq!(json, "\"DIGITOVER\"");
        let parsed: ContractType = serde_json::from_str("\"PUT\"").unwrap();
        assert_eq!(parsed, ContractType::Put);
        assert_eq!(ContractType::DigitEven.to_string(), "DIGITEVEN");
    }

    #[test]
    fn test_default_markets_precision() {
        let markets = default_markets();
        assert_eq!(markets.len(), 10);
        let r50 = markets.iter().find(|m| m.symbol == "R_50").unwrap();
        assert_eq!(r50.decimals, 4);
    }
}
