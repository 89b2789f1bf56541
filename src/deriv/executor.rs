//! Deriv Trade Executor
//!
//! Translates engine commands to Deriv API requests and decodes the
//! responses back into engine events.

use anyhow::Result;
use tracing::{debug, info, warn};

use super::client::DerivClient;
use super::models::{request_for, Envelope, TicksHistoryRequest};
use crate::types::{Command, InboundEvent};

/// Deriv trade executor
///
/// Owns the WebSocket client and the market subscriptions.
pub struct DerivExecutor {
    client: DerivClient,
    symbols: Vec<String>,
    currency: String,
}

impl DerivExecutor {
    /// Connect, authorize and subscribe to every market
    pub async fn new(mut client: DerivClient, symbols: Vec<String>) -> Result<Self> {
        client.connect().await?;
        let currency = client
            .account()
            .map(|a| a.currency.clone())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| "USD".to_string());

        let mut executor = Self {
            client,
            symbols,
            currency,
        };
        executor.subscribe_markets().await?;
        Ok(executor)
    }

    /// Request tick history with a live subscription for each market
    pub async fn subscribe_markets(&mut self) -> Result<()> {
        for symbol in &self.symbols {
            self.client.send(&TicksHistoryRequest::subscribe(symbol)).await?;
            debug!("Subscribed to {}", symbol);
        }
        info!("Subscribed to {} markets", self.symbols.len());
        Ok(())
    }

    /// Send one engine command
    pub async fn execute(&mut self, command: &Command) -> Result<()> {
        match command {
            Command::PlaceOrder(order) => info!(
                "Buying {} on {} - stake {:.2}, {} ticks, barrier {:?}",
                order.contract_type, order.symbol, order.stake, order.duration_ticks, order.barrier
            ),
            Command::SubscribeContract { contract_id } => {
                info!("Subscribing to contract {}", contract_id)
            }
            Command::CloseContract { contract_id } => warn!("Selling contract {}", contract_id),
        }

        let json = request_for(command, &self.currency)?;
        self.client.send_text(json).await
    }

    /// Send every command in order
    pub async fn execute_all(&mut self, commands: &[Command]) -> Result<()> {
        for command in commands {
            self.execute(command).await?;
        }
        Ok(())
    }

    /// Next engine event
    ///
    /// Returns `Ok(None)` once the connection has closed. Messages the engine
    /// does not consume are skipped.
    pub async fn next_event(&mut self) -> Result<Option<InboundEvent>> {
        loop {
            let Some(text) = self.client.next_text().await? else {
                return Ok(None);
            };
            let envelope = match Envelope::parse(&text) {
                Ok(envelope) => envelope,
                Err(e) => {
                    warn!("{:#}", e);
                    continue;
                }
            };
            if let Some(balance) = &envelope.balance {
                debug!("Balance: {:.2} {}", balance.balance, balance.currency);
            }
            if let Some(event) = envelope.into_event() {
                return Ok(Some(event));
            }
        }
    }

    pub async fn ping(&mut self) -> Result<()> {
        self.client.ping().await
    }

    /// Reconnect with backoff and restore the market subscriptions
    pub async fn reconnect(&mut self) -> Result<()> {
        self.client.reconnect().await?;
        self.client.reset_reconnect_counter();
        self.subscribe_markets().await
    }

    pub async fn disconnect(&mut self) -> Result<()> {
        self.client.disconnect().await
    }

    pub fn reconnects_exhausted(&self) -> bool {
        self.client.reconnects_exhausted()
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_connected()
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }
}
