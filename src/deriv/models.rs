//! Deriv API Data Models
//!
//! Request and response types for the Deriv WebSocket API, and the mapping
//! between them and the engine's events and commands.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::types::{Command, ContractUpdate, InboundEvent, PlaceOrder};

/// Ticks requested per symbol when subscribing
pub const HISTORY_COUNT: u32 = 1000;

// ============================================================================
// Requests
// ============================================================================

#[derive(Debug, Serialize)]
pub struct AuthorizeRequest {
    pub authorize: String,
}

#[derive(Debug, Serialize)]
pub struct BalanceRequest {
    pub balance: u8,
    pub subscribe: u8,
}

/// Backfill plus live tick subscription for one symbol
#[derive(Debug, Serialize)]
pub struct TicksHistoryRequest {
    pub ticks_history: String,
    pub count: u32,
    pub end: String,
    pub style: String,
    pub adjust_start_time: u8,
    pub subscribe: u8,
}

impl TicksHistoryRequest {
    pub fn subscribe(symbol: &str) -> Self {
        Self {
            ticks_history: symbol.to_string(),
            count: HISTORY_COUNT,
            end: "latest".to_string(),
            style: "ticks".to_string(),
            adjust_start_time: 1,
            subscribe: 1,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BuyParameters {
    pub amount: f64,
    pub basis: String,
    pub contract_type: String,
    pub currency: String,
    pub duration: u32,
    pub duration_unit: String,
    pub symbol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub barrier: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BuyRequest {
    pub buy: u8,
    /// Maximum price accepted for the contract
    pub price: f64,
    pub parameters: BuyParameters,
}

impl BuyRequest {
    pub fn from_order(order: &PlaceOrder, currency: &str) -> Self {
        Self {
            buy: 1,
            price: order.stake,
            parameters: BuyParameters {
                amount: order.stake,
                basis: "stake".to_string(),
                contract_type: order.contract_type.as_str().to_string(),
                currency: currency.to_string(),
                duration: order.duration_ticks,
                duration_unit: "t".to_string(),
                symbol: order.symbol.clone(),
                barrier: order.barrier.map(|b| b.to_string()),
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Passthrough {
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Serialize)]
pub struct ProposalOpenContractRequest {
    pub proposal_open_contract: u8,
    pub contract_id: u64,
    pub subscribe: u8,
    pub passthrough: Passthrough,
}

impl ProposalOpenContractRequest {
    pub fn subscribe(contract_id: u64) -> Self {
        Self {
            proposal_open_contract: 1,
            contract_id,
            subscribe: 1,
            passthrough: Passthrough {
                kind: "contract_subscription".to_string(),
            },
        }
    }
}

/// Sell at market (price 0 accepts any bid)
#[derive(Debug, Serialize)]
pub struct SellRequest {
    pub sell: u64,
    pub price: f64,
}

#[derive(Debug, Serialize)]
pub struct PingRequest {
    pub ping: u8,
}

/// Serialize an engine command into its API request
pub fn request_for(command: &Command, currency: &str) -> Result<String> {
    let json = match command {
        Command::PlaceOrder(order) => serde_json::to_string(&BuyRequest::from_order(order, currency)),
        Command::SubscribeContract { contract_id } => {
            serde_json::to_string(&ProposalOpenContractRequest::subscribe(*contract_id))
        }
        Command::CloseContract { contract_id } => serde_json::to_string(&SellRequest {
            sell: *contract_id,
            price: 0.0,
        }),
    };
    json.context("Failed to serialize request")
}

// ============================================================================
// Responses
// ============================================================================

#[derive(Debug, Deserialize, Clone)]
pub struct ApiError {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthorizeData {
    pub loginid: String,
    #[serde(default)]
    pub balance: f64,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub is_virtual: u8,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BalanceData {
    pub balance: f64,
    #[serde(default)]
    pub currency: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TickData {
    pub symbol: String,
    pub quote: f64,
    pub epoch: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HistoryData {
    #[serde(default)]
    pub prices: Vec<f64>,
    #[serde(default)]
    pub times: Vec<i64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BuyData {
    pub contract_id: u64,
    pub buy_price: f64,
    #[serde(default)]
    pub balance_after: Option<f64>,
}

/// Contract lifecycle snapshot; an empty object when nothing is open
#[derive(Debug, Deserialize, Clone, Default)]
pub struct OpenContract {
    #[serde(default)]
    pub contract_id: Option<u64>,
    #[serde(default)]
    pub underlying: Option<String>,
    #[serde(default)]
    pub entry_tick: Option<f64>,
    #[serde(default)]
    pub entry_spot: Option<f64>,
    #[serde(default)]
    pub exit_tick: Option<f64>,
    #[serde(default)]
    pub exit_spot: Option<f64>,
    #[serde(default)]
    pub current_spot: Option<f64>,
    #[serde(default)]
    pub is_sold: u8,
    #[serde(default)]
    pub profit: Option<f64>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SellData {
    pub contract_id: u64,
    #[serde(default)]
    pub sold_for: f64,
}

/// Any message received from the API. Only the field named by `msg_type` is set.
#[derive(Debug, Deserialize, Clone)]
pub struct Envelope {
    #[serde(default)]
    pub msg_type: String,
    #[serde(default)]
    pub error: Option<ApiError>,
    #[serde(default)]
    pub echo_req: serde_json::Value,
    #[serde(default)]
    pub authorize: Option<AuthorizeData>,
    #[serde(default)]
    pub balance: Option<BalanceData>,
    #[serde(default)]
    pub tick: Option<TickData>,
    #[serde(default)]
    pub history: Option<HistoryData>,
    #[serde(default)]
    pub buy: Option<BuyData>,
    #[serde(default)]
    pub proposal_open_contract: Option<OpenContract>,
    #[serde(default)]
    pub sell: Option<SellData>,
}

impl Envelope {
    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("Failed to parse Deriv message")
    }

    /// Translate into an engine event; `None` for messages the engine does not consume
    pub fn into_event(self) -> Option<InboundEvent> {
        if let Some(error) = &self.error {
            return self.error_event(error);
        }

        match self.msg_type.as_str() {
            "tick" => self.tick.map(|t| InboundEvent::Tick {
                symbol: t.symbol,
                price: t.quote,
                epoch: t.epoch,
            }),
            "history" => {
                let symbol = self.echo_req.get("ticks_history")?.as_str()?.to_string();
                self.history.map(|h| InboundEvent::History {
                    symbol,
                    prices: h.prices,
                    times: h.times,
                })
            }
            "buy" => self.buy.map(|b| InboundEvent::OrderAccepted {
                contract_id: b.contract_id,
                buy_price: b.buy_price,
            }),
            "proposal_open_contract" => {
                let poc = self.proposal_open_contract?;
                let contract_id = poc.contract_id?;
                Some(InboundEvent::ContractUpdate(ContractUpdate {
                    contract_id,
                    entry_tick: poc.entry_tick.or(poc.entry_spot),
                    exit_tick: poc.exit_tick.or(poc.exit_spot).or(poc.current_spot),
                    is_sold: poc.is_sold == 1,
                    profit: poc.profit,
                }))
            }
            "sell" => self.sell.map(|s| InboundEvent::SellConfirmed {
                contract_id: s.contract_id,
            }),
            other => {
                debug!("Ignoring {} message", other);
                None
            }
        }
    }

    fn error_event(&self, error: &ApiError) -> Option<InboundEvent> {
        let message = format!("{} ({})", error.message, error.code);
        match self.msg_type.as_str() {
            "buy" => Some(InboundEvent::OrderRejected { message }),
            "proposal_open_contract" => match self.echo_req.get("contract_id").and_then(|v| v.as_u64()) {
                Some(contract_id) => Some(InboundEvent::SubscriptionFailed {
                    contract_id,
                    message,
                }),
                None => Some(InboundEvent::ContractError { message }),
            },
            "sell" => Some(InboundEvent::ContractError { message }),
            other => {
                warn!("Deriv {} error: {}", other, message);
                None
            }
        }
    }
}
