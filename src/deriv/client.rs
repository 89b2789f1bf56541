//! Deriv API Client
//!
//! WebSocket connection with token authorization and exponential-backoff
//! reconnect.

use anyhow::{anyhow, bail, Context, Result};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::models::{AuthorizeData, AuthorizeRequest, BalanceRequest, Envelope, PingRequest};
use crate::execution::AccountMode;

/// Public WebSocket endpoint
pub const WS_URL: &str = "wss://ws.binaryws.com/websockets/v3";

/// App id Deriv assigns to unregistered applications
pub const DEFAULT_APP_ID: &str = "1089";

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Failed,
}

/// Deriv WebSocket client
pub struct DerivClient {
    url: String,
    token: String,
    mode: AccountMode,
    ws: Option<WsStream>,
    state: ConnectionState,
    account: Option<AuthorizeData>,
    reconnect_attempts: u32,
    max_reconnect_attempts: u32,
}

impl DerivClient {
    /// Create a new client from environment variables
    ///
    /// Expects:
    /// - `DERIV_DEMO_TOKEN` or `DERIV_REAL_TOKEN` - API token for the chosen account
    /// - `DERIV_TOKEN` (optional) - Fallback token for either account
    /// - `DERIV_APP_ID` (optional) - Registered app id, defaults to 1089
    pub fn from_env(mode: AccountMode) -> Result<Self> {
        let var = match mode {
            AccountMode::Demo => "DERIV_DEMO_TOKEN",
            AccountMode::Real => "DERIV_REAL_TOKEN",
        };
        let token = std::env::var(var)
            .or_else(|_| std::env::var("DERIV_TOKEN"))
            .with_context(|| format!("{} environment variable not set", var))?;
        let app_id = std::env::var("DERIV_APP_ID").unwrap_or_else(|_| DEFAULT_APP_ID.to_string());

        Ok(Self::new(&app_id, token, mode))
    }

    pub fn new(app_id: &str, token: String, mode: AccountMode) -> Self {
        Self {
            url: format!("{}?app_id={}", WS_URL, app_id),
            token,
            mode,
            ws: None,
            state: ConnectionState::Disconnected,
            account: None,
            reconnect_attempts: 0,
            max_reconnect_attempts: 5,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Account details from the last successful authorization
    pub fn account(&self) -> Option<&AuthorizeData> {
        self.account.as_ref()
    }

    /// Open the socket and authorize
    pub async fn connect(&mut self) -> Result<()> {
        self.state = ConnectionState::Connecting;
        info!("Connecting to Deriv {} account at {}...", self.mode, WS_URL);

        let (ws, _) = connect_async(self.url.as_str())
            .await
            .with_context(|| format!("Failed to connect to {}", WS_URL))?;
        self.ws = Some(ws);

        let account = match self.authorize().await {
            Ok(account) => account,
            Err(e) => {
                self.state = ConnectionState::Failed;
                self.ws = None;
                return Err(e);
            }
        };

        match (self.mode, account.is_virtual) {
            (AccountMode::Demo, 0) => warn!("Demo mode selected but {} is a real account", account.loginid),
            (AccountMode::Real, 1) => warn!("Real mode selected but {} is a virtual account", account.loginid),
            _ => {}
        }
        info!(
            "Authorized as {} - balance {:.2} {}",
            account.loginid, account.balance, account.currency
        );

        self.account = Some(account);
        self.state = ConnectionState::Connected;
        self.send(&BalanceRequest {
            balance: 1,
            subscribe: 1,
        })
        .await?;
        Ok(())
    }

    async fn authorize(&mut self) -> Result<AuthorizeData> {
        self.send(&AuthorizeRequest {
            authorize: self.token.clone(),
        })
        .await?;

        loop {
            let text = self
                .next_text()
                .await?
                .ok_or_else(|| anyhow!("Connection closed during authorization"))?;
            let envelope = Envelope::parse(&text)?;
            if envelope.msg_type != "authorize" {
                continue;
            }
            if let Some(error) = envelope.error {
                bail!("Authorization failed: {} ({})", error.message, error.code);
            }
            return envelope
                .authorize
                .ok_or_else(|| anyhow!("Authorization response missing account"));
        }
    }

    /// Serialize and send one request
    pub async fn send<T: Serialize>(&mut self, request: &T) -> Result<()> {
        let json = serde_json::to_string(request).context("Failed to serialize request")?;
        self.send_text(json).await
    }

    pub async fn send_text(&mut self, json: String) -> Result<()> {
        let ws = self.ws.as_mut().ok_or_else(|| anyhow!("Not connected to Deriv"))?;
        debug!("-> {}", json);
        ws.send(Message::Text(json))
            .await
            .context("Failed to send to Deriv")
    }

    pub async fn ping(&mut self) -> Result<()> {
        self.send(&PingRequest { ping: 1 }).await
    }

    /// Next text frame; `None` once the socket is closed
    pub async fn next_text(&mut self) -> Result<Option<String>> {
        let ws = self.ws.as_mut().ok_or_else(|| anyhow!("Not connected to Deriv"))?;
        while let Some(frame) = ws.next().await {
            match frame.context("WebSocket read failed")? {
                Message::Text(text) => return Ok(Some(text)),
                Message::Close(reason) => {
                    info!("Deriv closed the connection: {:?}", reason);
                    break;
                }
                _ => {}
            }
        }
        self.state = ConnectionState::Disconnected;
        self.ws = None;
        Ok(None)
    }

    pub async fn disconnect(&mut self) -> Result<()> {
        if let Some(mut ws) = self.ws.take() {
            info!("Disconnecting from Deriv...");
            if let Err(e) = ws.close(None).await {
                warn!("Error during Deriv disconnect: {}", e);
            }
        }
        self.state = ConnectionState::Disconnected;
        Ok(())
    }

    /// Attempt to reconnect
    pub async fn reconnect(&mut self) -> Result<()> {
        if self.reconnect_attempts >= self.max_reconnect_attempts {
            self.state = ConnectionState::Failed;
            bail!("Max reconnect attempts ({}) exceeded", self.max_reconnect_attempts);
        }

        self.state = ConnectionState::Reconnecting;
        self.ws = None;
        self.reconnect_attempts += 1;

        let delay = Duration::from_secs(2u64.pow(self.reconnect_attempts));
        warn!(
            "Reconnecting to Deriv (attempt {}/{}) in {:?}...",
            self.reconnect_attempts, self.max_reconnect_attempts, delay
        );

        tokio::time::sleep(delay).await;
        self.connect().await
    }

    pub fn reconnects_exhausted(&self) -> bool {
        self.reconnect_attempts >= self.max_reconnect_attempts
    }

    /// Reset reconnect counter (call after successful operation)
    pub fn reset_reconnect_counter(&mut self) {
        self.reconnect_attempts = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_client_url() {
        let client = DerivClient::new("1089", "token".to_string(), AccountMode::Demo);
        assert_eq!(client.url, "wss://ws.binaryws.com/websockets/v3?app_id=1089");
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_send_requires_connection() {
        let mut client = DerivClient::new("1089", "token".to_string(), AccountMode::Demo);
        assert!(client.ping().await.is_err());
        assert!(client.next_text().await.is_err());
    }
}
