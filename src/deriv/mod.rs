//! Deriv API Integration
//!
//! This module connects the trade engine to the Deriv WebSocket API for
//! synthetic index ticks and digit/rise-fall contracts.
//!
//! # Components
//!
//! - [`client`] - WebSocket client with token authorization and reconnect
//! - [`models`] - Request/response data types and event mapping
//! - [`executor`] - Command to API request translation
//!
//! # Environment Variables
//!
//! - `DERIV_DEMO_TOKEN` - API token for the virtual account
//! - `DERIV_REAL_TOKEN` - API token for the real account
//! - `DERIV_TOKEN` (optional) - Fallback token for either account
//! - `DERIV_APP_ID` (optional) - Registered app id, defaults to 1089
//!
//! # Usage
//!
//! ```rust,ignore
//! use digitflow::deriv::{DerivClient, DerivExecutor};
//!
//! let client = DerivClient::from_env(AccountMode::Demo)?;
//! let mut executor = DerivExecutor::new(client, engine.config().symbols()).await?;
//!
//! while let Some(event) = executor.next_event().await? {
//!     let commands = engine.handle(event);
//!     executor.execute_all(&commands).await?;
//! }
//! ```
//!
//! # API Calls Used
//!
//! - `authorize` - Token login
//! - `balance` - Account balance stream
//! - `ticks_history` - Last 1000 ticks plus live tick stream
//! - `buy` - Purchase a contract
//! - `proposal_open_contract` - Open contract updates
//! - `sell` - Sell an open contract at market

pub mod client;
pub mod executor;
pub mod models;

pub use client::{ConnectionState, DerivClient};
pub use executor::DerivExecutor;
pub use models::{request_for, Envelope};
