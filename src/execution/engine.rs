//! Trade engine - one context object owning all signal and sequencing state
//!
//! Every inbound event is handled to completion on `&mut self` and returns
//! the commands the transport must send. Nothing here awaits.

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::config::EngineConfig;
use super::gate::TradeGate;
use super::martingale::MartingaleLedger;
use super::order::{CurrentTrade, TradeOutcome, TradeState};
use super::position::{CompletedTradeRecord, SessionLedger};
use super::sequence::{PendingContinuation, SequenceCoordinator, SequencePhase};
use crate::error::EngineError;
use crate::trading_core::{DigitHistory, PatternDetectors, PatternRule, StrategyId, StrategyKey};
use crate::types::{Command, ContractType, ContractUpdate, InboundEvent, PlaceOrder};

/// Why the session stopped trading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltReason {
    StopLoss,
    TakeProfit,
    Operator,
}

impl std::fmt::Display for HaltReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StopLoss => write!(f, "max loss reached"),
            Self::TakeProfit => write!(f, "target profit reached"),
            Self::Operator => write!(f, "stopped by operator"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineStatus {
    Running,
    Halted(HaltReason),
}

/// Operator-visible diagnostic line
#[derive(Debug, Clone, PartialEq)]
pub struct LogEvent {
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Events emitted by the trade engine
#[derive(Debug, Clone)]
pub enum EngineEvent {
    Log(LogEvent),
    /// Buy request handed to the transport
    OrderPlaced {
        key: StrategyKey,
        phase: SequencePhase,
        stake: f64,
        step: u32,
    },
    TradeCompleted(CompletedTradeRecord),
    /// Stop-loss, take-profit or operator stop
    Halted {
        reason: HaltReason,
        cumulative: f64,
    },
}

/// Trade engine orchestrates detection, gating, sequencing and settlement
pub struct TradeEngine {
    config: EngineConfig,
    symbols: Vec<String>,
    strategies: Vec<StrategyId>,
    history: DigitHistory,
    detectors: PatternDetectors,
    ledger: MartingaleLedger,
    gate: TradeGate,
    sequences: SequenceCoordinator,
    session: SessionLedger,
    current: Option<CurrentTrade>,
    connected: bool,
    status: EngineStatus,
    event_tx: broadcast::Sender<EngineEvent>,
}

impl TradeEngine {
    /// Create a new engine; the transport starts out disconnected
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;

        let (event_tx, _) = broadcast::channel(1000);
        let strategies = StrategyId::ALL
            .into_iter()
            .filter(|s| config.strategies.contains(s))
            .collect();

        Ok(Self {
            symbols: config.symbols(),
            strategies,
            history: DigitHistory::new(&config.markets),
            detectors: PatternDetectors::new(config.windows.clone()),
            ledger: MartingaleLedger::new(
                config.base_stake,
                config.martingale_multiplier,
                config.martingale_max_level,
            ),
            gate: TradeGate::new(),
            sequences: SequenceCoordinator::new(),
            session: SessionLedger::new(),
            current: None,
            connected: false,
            status: EngineStatus::Running,
            event_tx,
            config,
        })
    }

    /// Subscribe to engine events
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.event_tx.subscribe()
    }

    /// Handle one inbound event at the current wall-clock time
    pub fn handle(&mut self, event: InboundEvent) -> Vec<Command> {
        self.handle_at(event, Utc::now())
    }

    pub fn handle_at(&mut self, event: InboundEvent, now: DateTime<Utc>) -> Vec<Command> {
        match event {
            InboundEvent::Tick { symbol, price, .. } => self.on_tick(&symbol, price, now),
            InboundEvent::History { symbol, prices, .. } => {
                self.on_history(&symbol, &prices);
                Vec::new()
            }
            InboundEvent::OrderAccepted {
                contract_id,
                buy_price,
            } => self.on_order_accepted(contract_id, buy_price),
            InboundEvent::OrderRejected { message } => {
                self.on_order_rejected(&message);
                Vec::new()
            }
            InboundEvent::ContractUpdate(update) => self.on_contract_update(&update, now),
            InboundEvent::SubscriptionFailed {
                contract_id,
                message,
            } => self.on_subscription_failed(contract_id, &message),
            InboundEvent::SellConfirmed { contract_id } => {
                info!("Sell confirmed for contract {}", contract_id);
                Vec::new()
            }
            InboundEvent::ContractError { message } => {
                self.on_contract_error(&message);
                Vec::new()
            }
            InboundEvent::Connected => {
                self.set_connected(true);
                Vec::new()
            }
            InboundEvent::Disconnected => {
                self.set_connected(false);
                Vec::new()
            }
        }
    }

    // ========================================================================
    // Market data
    // ========================================================================

    fn on_history(&mut self, symbol: &str, prices: &[f64]) {
        match self.history.ingest_history(symbol, prices) {
            Ok(count) => {
                if let Some(last) = prices.last() {
                    self.detectors.observe_history(symbol, *last);
                }
                info!(
                    "Loaded {} historical digits for {}",
                    count,
                    self.config.market_name(symbol)
                );
            }
            Err(e) => warn!("Rejected history for {}: {}", symbol, e),
        }
    }

    fn on_tick(&mut self, symbol: &str, price: f64, now: DateTime<Utc>) -> Vec<Command> {
        if !self.symbols.iter().any(|s| s == symbol) {
            debug!("Ignoring tick for unconfigured symbol {}", symbol);
            return Vec::new();
        }

        if let Err(e) = self.history.ingest_tick(symbol, price) {
            warn!("Dropping tick for {}: {}", symbol, e);
            return Vec::new();
        }
        self.detectors.observe_tick(symbol, price);

        if self.is_halted() {
            return Vec::new();
        }

        let mut commands = Vec::new();

        if let Some(command) = self.try_continuation(symbol, now) {
            commands.push(command);
        }

        for strategy in self.strategies.clone() {
            let key = StrategyKey::new(symbol, strategy);
            if self.gate.on_cooldown(&key, now) {
                continue;
            }
            match self.evaluate_strategy(&key, now) {
                Ok(Some(command)) => commands.push(command),
                Ok(None) => {}
                Err(e) => {
                    warn!("Strategy {} failed: {}", key, e);
                    self.log(format!("Error in {} strategy for {}: {}", strategy, symbol, e));
                    self.sequences.reset(&key);
                }
            }
        }

        commands
    }

    /// Place a follow-up armed by the previous settlement, if it is for this symbol
    fn try_continuation(&mut self, symbol: &str, now: DateTime<Utc>) -> Option<Command> {
        if self.current.is_some() {
            // Stays armed until the open trade clears
            return None;
        }
        let pending = self.sequences.take_for(symbol)?;
        let key = pending.key();
        info!("Attempting follow-up trade in sequence for {}", key);

        match self.try_place(
            &key,
            pending.contract_type,
            pending.duration_ticks,
            pending.barrier,
            now,
        ) {
            Ok(command) => command,
            Err(e) => {
                warn!("Follow-up for {} failed: {}", key, e);
                self.sequences.reset(&key);
                None
            }
        }
    }

    fn evaluate_strategy(
        &mut self,
        key: &StrategyKey,
        now: DateTime<Utc>,
    ) -> Result<Option<Command>, EngineError> {
        let strategy = key.strategy;

        // Runs are consumed on a match, so only look while a trade could be placed
        if matches!(strategy.rule(), PatternRule::Run(_)) && self.current.is_some() {
            return Ok(None);
        }

        let matched = self
            .detectors
            .evaluate(strategy, &key.symbol, self.history.digits(&key.symbol));
        if !matched {
            return Ok(None);
        }

        debug!("Pattern matched for {}", key);
        self.try_place(
            key,
            strategy.contract_type(),
            self.config.duration_ticks,
            strategy.barrier(),
            now,
        )
    }

    // ========================================================================
    // Order placement
    // ========================================================================

    /// Place an order for `key` if nothing forbids it. Policy refusals are
    /// logged and return `Ok(None)`.
    pub fn try_place(
        &mut self,
        key: &StrategyKey,
        contract_type: ContractType,
        duration_ticks: u32,
        barrier: Option<u8>,
        now: DateTime<Utc>,
    ) -> Result<Option<Command>, EngineError> {
        if let EngineStatus::Halted(reason) = self.status {
            debug!("Not trading {}: {}", key, reason);
            return Ok(None);
        }
        if let Err(block) = self.gate.check(key) {
            debug!("Skipping {}: {}", key, block);
            return Ok(None);
        }
        if let Some(open) = &self.current {
            debug!("Skipping {}: trade open on {}", key, open.key());
            return Ok(None);
        }
        if !self.connected {
            warn!("Skipping {}: not connected", key);
            return Ok(None);
        }

        let stake = self.ledger.stake_for(key)?;
        let step = self.ledger.step(key);
        let phase = self.sequences.phase(key);

        let order = PlaceOrder {
            symbol: key.symbol.clone(),
            contract_type,
            stake,
            duration_ticks,
            barrier,
        };

        if phase == SequencePhase::Opening {
            self.sequences.start(key, contract_type, barrier);
        }
        self.current = Some(CurrentTrade::new(&order, key.strategy, phase, now));
        self.gate.mark_active(&key.symbol);

        self.log(format!(
            "{} strategy: placing {} {} trade on {} (step {}, stake {:.2})",
            key.strategy,
            phase,
            contract_type,
            self.config.market_name(&key.symbol),
            step,
            stake
        ));
        let _ = self.event_tx.send(EngineEvent::OrderPlaced {
            key: key.clone(),
            phase,
            stake,
            step,
        });

        Ok(Some(Command::PlaceOrder(order)))
    }

    // ========================================================================
    // Broker responses
    // ========================================================================

    fn on_order_accepted(&mut self, contract_id: u64, buy_price: f64) -> Vec<Command> {
        let Some(trade) = self.current.as_mut() else {
            warn!("Buy confirmation for contract {} with no open trade", contract_id);
            return Vec::new();
        };
        trade.accept(contract_id, buy_price);
        info!(
            "Trade placed: contract {} on {} for {:.2}",
            contract_id, trade.symbol, buy_price
        );
        vec![Command::SubscribeContract { contract_id }]
    }

    fn on_order_rejected(&mut self, message: &str) {
        self.log(format!("Order rejected: {}", message));
        let Some(trade) = self.current.take() else {
            return;
        };
        let key = trade.key();
        if trade.phase == Some(SequencePhase::Opening) {
            // The sequence never got its opening trade
            self.sequences.reset(&key);
        }
        self.sequences.clear_pending();
        self.gate.mark_inactive(&trade.symbol, &self.symbols);
    }

    fn on_contract_error(&mut self, message: &str) {
        if self.current.is_none() {
            warn!("Broker error: {}", message);
            return;
        }
        self.on_order_rejected(message);
    }

    fn on_subscription_failed(&mut self, contract_id: u64, message: &str) -> Vec<Command> {
        let max_retries = self.config.max_subscription_retries;
        let Some(trade) = self.current.as_mut() else {
            return Vec::new();
        };
        if trade.contract_id != Some(contract_id) {
            return Vec::new();
        }

        trade.subscription_retries += 1;
        if trade.subscription_retries <= max_retries {
            warn!(
                "Contract {} subscription failed ({}), retry {}/{}",
                contract_id, message, trade.subscription_retries, max_retries
            );
            return vec![Command::SubscribeContract { contract_id }];
        }

        trade.state = TradeState::Closing;
        self.log(format!(
            "Subscription for contract {} failed {} times. Forcing close.",
            contract_id, max_retries
        ));
        self.force_reset();
        vec![Command::CloseContract { contract_id }]
    }

    /// Drop the open trade and anything waiting on it
    fn force_reset(&mut self) {
        if let Some(trade) = self.current.take() {
            self.gate.mark_inactive(&trade.symbol, &self.symbols);
        }
        self.sequences.clear_pending();
    }

    fn on_contract_update(&mut self, update: &ContractUpdate, now: DateTime<Utc>) -> Vec<Command> {
        let Some(trade) = self.current.as_mut() else {
            debug!("Update for contract {} with no open trade", update.contract_id);
            return Vec::new();
        };
        if trade.contract_id != Some(update.contract_id) {
            debug!("Ignoring update for contract {}", update.contract_id);
            return Vec::new();
        }

        trade.apply_spots(update);
        match trade.ready_to_settle(update) {
            Some(profit) => self.settle(profit, now),
            None => {
                if update.is_sold {
                    debug!(
                        "Contract {} sold but settlement data incomplete",
                        update.contract_id
                    );
                }
                Vec::new()
            }
        }
    }

    // ========================================================================
    // Settlement
    // ========================================================================

    fn settle(&mut self, profit: f64, now: DateTime<Utc>) -> Vec<Command> {
        let Some(mut trade) = self.current.take() else {
            return Vec::new();
        };
        let Some(entry_spot) = trade.entry_spot else {
            self.current = Some(trade);
            return Vec::new();
        };
        trade.profit = Some(profit);
        trade.state = TradeState::Settled;

        let key = trade.key();
        let step = self.ledger.step(&key);
        let outcome = TradeOutcome::from_profit(profit);

        match outcome {
            TradeOutcome::Win => {
                self.ledger.on_win(&key);
                self.gate.record_win(&key.symbol, &self.symbols);
                self.sequences.end(&key);
                self.gate.lock(&key);
                self.log(format!(
                    "Trade won on {} ({}): +{:.2}. Locked until a new round.",
                    self.config.market_name(&key.symbol),
                    key.strategy,
                    profit
                ));
                if self.gate.check_all_locked(&self.symbols, &self.strategies) {
                    self.log("All strategies locked in all markets. Starting a new round.".to_string());
                }
            }
            TradeOutcome::Loss => {
                let loss = self.ledger.on_loss(&key);
                self.sequences.record_loss(&key);
                self.gate
                    .start_cooldown(&key, now, self.config.loss_cooldown_secs);

                let next_stake = self.ledger.stake_for(&key).unwrap_or(self.ledger.base_stake());
                self.log(format!(
                    "Trade lost on {} ({}): {:.2}. Martingale step {}, next stake {:.2}",
                    self.config.market_name(&key.symbol),
                    key.strategy,
                    profit,
                    loss.step,
                    next_stake
                ));

                if loss.losses == self.config.pause_after_step {
                    self.gate.pause(&key);
                    self.log(format!(
                        "{} paused after {} consecutive losses",
                        key, loss.losses
                    ));
                } else if self.config.follow_up_on_loss && self.sequences.is_active(&key) {
                    self.sequences.arm(PendingContinuation {
                        symbol: key.symbol.clone(),
                        strategy: key.strategy,
                        contract_type: trade.contract_type,
                        barrier: trade.barrier,
                        duration_ticks: trade.duration_ticks,
                    });
                    debug!("Follow-up armed for next {} tick", key.symbol);
                }
            }
        }

        let cumulative = self.session.record_profit(profit);
        let record = CompletedTradeRecord {
            symbol: trade.symbol.clone(),
            strategy: trade.strategy,
            contract_type: trade.contract_type,
            contract_id: trade.contract_id,
            entry_spot,
            exit_spot: trade.exit_spot,
            stake: trade.stake,
            profit,
            outcome,
            step,
            cumulative,
            opened_at: trade.opened_at,
            closed_at: now,
        };
        self.session.push_record(record.clone());
        let _ = self.event_tx.send(EngineEvent::TradeCompleted(record));

        if self.gate.mark_inactive(&trade.symbol, &self.symbols) {
            self.log("All markets reached the pause step. Paused strategies resumed.".to_string());
        }

        self.check_session_limits(cumulative);
        Vec::new()
    }

    fn check_session_limits(&mut self, cumulative: f64) {
        if self.is_halted() {
            return;
        }
        if cumulative <= -self.config.max_loss {
            warn!(
                "Max loss reached: {:.2} (limit: -{:.2})",
                cumulative, self.config.max_loss
            );
            self.halt(HaltReason::StopLoss);
        } else if cumulative >= self.config.target_profit {
            info!(
                "Target profit reached: {:.2} (target: {:.2})",
                cumulative, self.config.target_profit
            );
            self.halt(HaltReason::TakeProfit);
        }
    }

    fn halt(&mut self, reason: HaltReason) {
        self.status = EngineStatus::Halted(reason);
        self.sequences.clear_pending();
        let cumulative = self.session.cumulative();
        self.log(format!(
            "Trading halted: {} (session P&L {:.2})",
            reason, cumulative
        ));
        let _ = self.event_tx.send(EngineEvent::Halted { reason, cumulative });
    }

    // ========================================================================
    // Operator actions
    // ========================================================================

    pub fn set_connected(&mut self, connected: bool) {
        if self.connected != connected {
            info!("Transport {}", if connected { "connected" } else { "disconnected" });
        }
        self.connected = connected;
    }

    /// Halt trading; an open contract is sold
    pub fn stop(&mut self) -> Vec<Command> {
        if !self.is_halted() {
            self.halt(HaltReason::Operator);
        }
        match self.current.as_ref().and_then(|t| t.contract_id) {
            Some(contract_id) => vec![Command::CloseContract { contract_id }],
            None => Vec::new(),
        }
    }

    /// Clear a hard stop and start a fresh session
    pub fn restart(&mut self) {
        self.gate.reset();
        self.ledger.reset_steps();
        self.sequences.clear_all();
        self.session.reset();
        self.status = EngineStatus::Running;
        self.log("Trading restarted".to_string());
    }

    pub fn set_base_stake(&mut self, amount: f64) -> Result<(), EngineError> {
        self.ledger.set_base_stake(amount)?;
        self.config.base_stake = amount;
        Ok(())
    }

    pub fn set_window(&mut self, strategy: StrategyId, window: usize) -> Result<(), EngineError> {
        self.detectors.set_window(strategy, window)?;
        self.config.windows = self.detectors.windows().clone();
        info!("{} window set to {}", strategy, window);
        Ok(())
    }

    pub fn enable_strategy(&mut self, strategy: StrategyId) {
        if !self.strategies.contains(&strategy) {
            self.strategies.push(strategy);
            self.strategies.sort();
            info!("Strategy {} enabled", strategy);
        }
    }

    pub fn disable_strategy(&mut self, strategy: StrategyId) {
        self.strategies.retain(|s| *s != strategy);
        info!("Strategy {} disabled", strategy);
    }

    pub fn unlock(&mut self, key: &StrategyKey) -> bool {
        self.gate.unlock(key)
    }

    pub fn unlock_all(&mut self) {
        self.gate.unlock_all();
        info!("All strategy locks cleared");
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn status(&self) -> EngineStatus {
        self.status
    }

    pub fn is_halted(&self) -> bool {
        matches!(self.status, EngineStatus::Halted(_))
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn strategies(&self) -> &[StrategyId] {
        &self.strategies
    }

    pub fn current_trade(&self) -> Option<&CurrentTrade> {
        self.current.as_ref()
    }

    pub fn pending_continuation(&self) -> Option<&PendingContinuation> {
        self.sequences.pending()
    }

    pub fn history(&self) -> &DigitHistory {
        &self.history
    }

    pub fn ledger(&self) -> &MartingaleLedger {
        &self.ledger
    }

    pub fn gate(&self) -> &TradeGate {
        &self.gate
    }

    pub fn sequences(&self) -> &SequenceCoordinator {
        &self.sequences
    }

    pub fn session(&self) -> &SessionLedger {
        &self.session
    }

    /// One-line status for the periodic log
    pub fn status_summary(&self) -> String {
        let state = match self.status {
            EngineStatus::Running => "running".to_string(),
            EngineStatus::Halted(reason) => format!("halted ({})", reason),
        };
        format!(
            "{} | {} strategies | {} sequences | {} locked | {} paused ({}/{} markets at pause step) | {}",
            state,
            self.strategies.len(),
            self.sequences.active_count(),
            self.gate.locked_count(),
            self.gate.paused_count(),
            self.gate.reached_count(),
            self.symbols.len(),
            self.session.stats_summary()
        )
    }

    fn log(&self, message: String) {
        info!("{}", message);
        let _ = self.event_tx.send(EngineEvent::Log(LogEvent {
            message,
            at: Utc::now(),
        }));
    }
}
