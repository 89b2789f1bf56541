use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

use digitflow::deriv::{DerivClient, DerivExecutor};
use digitflow::execution::{AccountMode, EngineConfig, EngineEvent, TradeEngine};
use digitflow::report::TradeLogger;
use digitflow::trading_core::{PatternWindows, StrategyId, StrategyKey};
use digitflow::types::{default_markets, Command, InboundEvent, MarketSpec, DEFAULT_DECIMALS};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Account to trade on (demo or real)
    #[arg(short, long, env = "DERIV_ACCOUNT", default_value = "demo")]
    account: AccountMode,

    /// JSON engine config; command-line options override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Markets to trade (comma-separated symbols, default: all volatility indices)
    #[arg(short, long)]
    markets: Option<String>,

    /// Strategies to enable (comma-separated, e.g. over3,under6,rise)
    #[arg(short, long)]
    strategies: Option<String>,

    /// Base stake in account currency
    #[arg(long)]
    stake: Option<f64>,

    /// Martingale stake multiplier
    #[arg(long)]
    multiplier: Option<f64>,

    /// Martingale level at which the stake wraps back to base
    #[arg(long)]
    max_level: Option<u32>,

    /// Session loss that halts trading
    #[arg(long)]
    max_loss: Option<f64>,

    /// Session profit that halts trading
    #[arg(long)]
    target_profit: Option<f64>,

    /// Consecutive losses that pause a strategy
    #[arg(long)]
    pause_after: Option<u32>,

    /// Seconds a strategy waits after a loss
    #[arg(long)]
    cooldown: Option<u64>,

    /// Retry a lost sequence on the next tick of the same market
    #[arg(long)]
    follow_up: bool,

    /// Pattern window file, loaded on start and saved on exit
    #[arg(long, default_value = "pattern_windows.json")]
    windows: PathBuf,

    /// CSV file for completed trades
    #[arg(long, default_value = "trades.csv")]
    trade_log: PathBuf,
}

impl Args {
    fn engine_config(&self) -> Result<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::from_file(path)?,
            None => EngineConfig::default(),
        };

        if let Some(markets) = &self.markets {
            config.markets = parse_markets(markets);
        }
        if let Some(strategies) = &self.strategies {
            config.strategies = strategies
                .split(',')
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(|s| s.parse::<StrategyId>())
                .collect::<Result<_, _>>()?;
        }
        if self.windows.exists() {
            config.windows = PatternWindows::load(&self.windows)?;
        }

        if let Some(v) = self.stake {
            config.base_stake = v;
        }
        if let Some(v) = self.multiplier {
            config.martingale_multiplier = v;
        }
        if let Some(v) = self.max_level {
            config.martingale_max_level = v;
        }
        if let Some(v) = self.max_loss {
            config.max_loss = v;
        }
        if let Some(v) = self.target_profit {
            config.target_profit = v;
        }
        if let Some(v) = self.pause_after {
            config.pause_after_step = v;
        }
        if let Some(v) = self.cooldown {
            config.loss_cooldown_secs = v;
        }
        if self.follow_up {
            config.follow_up_on_loss = true;
        }

        config.validate()?;
        Ok(config)
    }
}

/// Known symbols keep their catalogue precision; others default to two decimals
fn parse_markets(list: &str) -> Vec<MarketSpec> {
    let known = default_markets();
    list.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|symbol| {
            known
                .iter()
                .find(|m| m.symbol == symbol)
                .cloned()
                .unwrap_or_else(|| MarketSpec::new(symbol, symbol, DEFAULT_DECIMALS))
        })
        .collect()
}

/// Operator commands read from stdin
#[derive(Debug, Clone, PartialEq)]
enum OperatorCommand {
    Status,
    Stop,
    Restart,
    Unlock(StrategyKey),
    UnlockAll,
    Stake(f64),
    Window(StrategyId, usize),
    Enable(StrategyId),
    Disable(StrategyId),
}

impl std::str::FromStr for OperatorCommand {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> Result<Self> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let cmd = match parts.as_slice() {
            ["status"] => Self::Status,
            ["stop"] => Self::Stop,
            ["restart"] => Self::Restart,
            ["unlock"] | ["unlock", "all"] => Self::UnlockAll,
            ["unlock", key] => {
                let (strategy, symbol) = key
                    .split_once('/')
                    .context("expected unlock <strategy>/<symbol>")?;
                Self::Unlock(StrategyKey::new(symbol, strategy.parse::<StrategyId>()?))
            }
            ["stake", amount] => Self::Stake(amount.parse::<f64>().context("invalid stake")?),
            ["window", strategy, size] => Self::Window(
                strategy.parse::<StrategyId>()?,
                size.parse::<usize>().context("invalid window")?,
            ),
            ["enable", strategy] => Self::Enable(strategy.parse::<StrategyId>()?),
            ["disable", strategy] => Self::Disable(strategy.parse::<StrategyId>()?),
            _ => bail!(
                "unknown command '{}' (status, stop, restart, unlock [all|strategy/symbol], \
                 stake <amount>, window <strategy> <n>, enable <strategy>, disable <strategy>)",
                line.trim()
            ),
        };
        Ok(cmd)
    }
}

/// Apply an operator command; returns commands for the transport
fn apply_operator(engine: &mut TradeEngine, command: OperatorCommand) -> Result<Vec<Command>> {
    match command {
        OperatorCommand::Status => info!("{}", engine.status_summary()),
        OperatorCommand::Stop => return Ok(engine.stop()),
        OperatorCommand::Restart => engine.restart(),
        OperatorCommand::Unlock(key) => {
            if engine.unlock(&key) {
                info!("Unlocked {}", key);
            } else {
                info!("{} was not locked", key);
            }
        }
        OperatorCommand::UnlockAll => engine.unlock_all(),
        OperatorCommand::Stake(amount) => {
            engine.set_base_stake(amount)?;
            info!("Base stake set to {:.2}", amount);
        }
        OperatorCommand::Window(strategy, size) => engine.set_window(strategy, size)?,
        OperatorCommand::Enable(strategy) => engine.enable_strategy(strategy),
        OperatorCommand::Disable(strategy) => engine.disable_strategy(strategy),
    }
    Ok(Vec::new())
}

/// One turn of the main loop
enum Action {
    Event(Option<InboundEvent>),
    Operator(Option<String>),
    Ping,
    Status,
    Shutdown,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("digitflow=info".parse()?),
        )
        .init();

    let args = Args::parse();
    let config = args.engine_config()?;

    info!("Starting digitflow on {} account", args.account);
    info!("Markets: {}", config.symbols().join(","));
    info!(
        "Stake {:.2} x{} up to level {} | max loss {:.2} | target {:.2}",
        config.base_stake,
        config.martingale_multiplier,
        config.martingale_max_level,
        config.max_loss,
        config.target_profit
    );

    let mut engine = TradeEngine::new(config)?;
    info!(
        "Strategies: {}",
        engine
            .strategies()
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(",")
    );

    // Report engine events
    let mut events = engine.subscribe();
    let mut trade_logger = match TradeLogger::new(&args.trade_log) {
        Ok(logger) => {
            info!("Trade logger initialized - logging to {}", args.trade_log.display());
            Some(logger)
        }
        Err(e) => {
            warn!("Failed to create trade logger: {:#} - trades will not be logged to CSV", e);
            None
        }
    };
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(EngineEvent::TradeCompleted(record)) => {
                    info!(
                        "{} {} on {}: {:+.2} (session {:.2})",
                        record.strategy, record.contract_type, record.symbol, record.profit, record.cumulative
                    );
                    if let Some(logger) = trade_logger.as_mut() {
                        if let Err(e) = logger.log(&record) {
                            warn!("{:#}", e);
                        }
                    }
                }
                Ok(EngineEvent::Halted { reason, cumulative }) => {
                    warn!("Trading halted: {} (session P&L {:.2})", reason, cumulative);
                }
                Ok(_) => {}
                Err(RecvError::Lagged(n)) => warn!("Event reporter lagged by {} events", n),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let client = DerivClient::from_env(args.account)?;
    let mut executor = DerivExecutor::new(client, engine.config().symbols()).await?;
    engine.handle(InboundEvent::Connected);

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut ping = tokio::time::interval(Duration::from_secs(30));
    let mut status = tokio::time::interval(Duration::from_secs(120));

    loop {
        let action = tokio::select! {
            event = executor.next_event() => match event {
                Ok(event) => Action::Event(event),
                Err(e) => {
                    warn!("Deriv stream error: {:#}", e);
                    Action::Event(None)
                }
            },
            line = stdin.next_line(), if stdin_open => Action::Operator(line.unwrap_or(None)),
            _ = ping.tick() => Action::Ping,
            _ = status.tick() => Action::Status,
            _ = tokio::signal::ctrl_c() => Action::Shutdown,
        };

        match action {
            Action::Event(Some(event)) => {
                let commands = engine.handle(event);
                if let Err(e) = executor.execute_all(&commands).await {
                    warn!("Failed to send commands: {:#}", e);
                }
            }
            Action::Event(None) => {
                engine.handle(InboundEvent::Disconnected);
                loop {
                    match executor.reconnect().await {
                        Ok(()) => break,
                        Err(e) if executor.reconnects_exhausted() => {
                            error!("Giving up on Deriv connection: {:#}", e);
                            return Err(e);
                        }
                        Err(e) => warn!("Reconnect failed: {:#}", e),
                    }
                }
                engine.handle(InboundEvent::Connected);
            }
            Action::Operator(None) => stdin_open = false,
            Action::Operator(Some(line)) if line.trim().is_empty() => {}
            Action::Operator(Some(line)) => {
                let commands = line
                    .parse::<OperatorCommand>()
                    .and_then(|command| apply_operator(&mut engine, command));
                match commands {
                    Ok(commands) => {
                        if let Err(e) = executor.execute_all(&commands).await {
                            warn!("Failed to send commands: {:#}", e);
                        }
                    }
                    Err(e) => warn!("{:#}", e),
                }
            }
            Action::Ping => {
                if let Err(e) = executor.ping().await {
                    warn!("Ping failed: {:#}", e);
                }
            }
            Action::Status => info!("{}", engine.status_summary()),
            Action::Shutdown => {
                info!("Shutting down...");
                let commands = engine.stop();
                if let Err(e) = executor.execute_all(&commands).await {
                    warn!("Failed to close open contract: {:#}", e);
                }
                break;
            }
        }
    }

    if let Err(e) = engine.config().windows.save(&args.windows) {
        warn!("{:#}", e);
    }
    executor.disconnect().await?;
    info!("{}", engine.session().stats_summary());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_operator_commands() {
        assert_eq!("status".parse::<OperatorCommand>().unwrap(), OperatorCommand::Status);
        assert_eq!("unlock".parse::<OperatorCommand>().unwrap(), OperatorCommand::UnlockAll);
        assert_eq!(
            "unlock over3/R_50".parse::<OperatorCommand>().unwrap(),
            OperatorCommand::Unlock(StrategyKey::new("R_50", StrategyId::Over3))
        );
        assert_eq!(
            "window under6 9".parse::<OperatorCommand>().unwrap(),
            OperatorCommand::Window(StrategyId::Under6, 9)
        );
        assert_eq!("stake 1.5".parse::<OperatorCommand>().unwrap(), OperatorCommand::Stake(1.5));
        assert!("unlock over3".parse::<OperatorCommand>().is_err());
        assert!("window over9 4".parse::<OperatorCommand>().is_err());
        assert!("fly".parse::<OperatorCommand>().is_err());
    }

    #[test]
    fn test_parse_markets_keeps_precision() {
        let markets = parse_markets("R_50, 1HZ100V,CUSTOM");
        assert_eq!(markets.len(), 3);
        assert_eq!(markets[0].decimals, 4);
        assert_eq!(markets[1].decimals, 2);
        assert_eq!(markets[2].decimals, DEFAULT_DECIMALS);
    }

    #[test]
    fn test_cli_overrides() {
        let args = Args::parse_from([
            "digitflow",
            "--markets",
            "R_10",
            "--strategies",
            "even,rise",
            "--stake",
            "1",
            "--windows",
            "/nonexistent/windows.json",
        ]);
        let config = args.engine_config().unwrap();
        assert_eq!(config.symbols(), vec!["R_10".to_string()]);
        assert_eq!(config.strategies, vec![StrategyId::Even, StrategyId::Rise]);
        assert_eq!(config.base_stake, 1.0);
    }
}
