use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use backtest::{load_candles, BacktestRunner};
use common::{
    AccountSource, Config, EngineCommand, MarketDataSource, OrderSink, TradingMode,
};
use engine::{spawn_ticker, BinanceClient, DecisionCycle, Engine, PlanExecutor};
use paper::PaperClient;
use risk::{RiskConfig, RiskManager};
use strategy::{StrategyFileConfig, StrategyRegistry};

#[derive(Parser)]
#[command(name = "sigbot", about = "Signal-driven crypto trading bot")]
struct Cli {
    /// Strategy file. Overrides STRATEGY_CONFIG_PATH.
    #[arg(long, global = true)]
    strategies: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Poll the exchange and trade every configured strategy (default).
    Run,
    /// Classify historical bars by trailing mean return and print the summary.
    Backtest {
        /// Strategy whose primary instrument and timeframe are replayed.
        /// Defaults to the first one in the file.
        #[arg(long)]
        strategy: Option<String>,

        /// Read candles from this CSV instead of the exchange.
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Trailing window in bars. Defaults to the strategy's window.
        #[arg(long)]
        window: Option<usize>,

        /// Candles to fetch from the exchange.
        #[arg(long, default_value_t = 200)]
        count: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let strategies = cli.strategies.map(|p| p.to_string_lossy().into_owned());

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => {
            let cfg = Config::from_env().context("invalid configuration")?;
            let strategy_path = strategies.unwrap_or_else(|| cfg.strategy_config_path.clone());
            run(cfg, &strategy_path).await
        }
        // Backtests only read public market data, so no credentials are loaded.
        Command::Backtest {
            strategy,
            csv,
            window,
            count,
        } => {
            let strategy_path = strategies.unwrap_or_else(Config::strategy_path_from_env);
            backtest(&strategy_path, strategy.as_deref(), csv, window, count).await
        }
    }
}

async fn run(cfg: Config, strategy_path: &str) -> Result<()> {
    info!(mode = %cfg.trading_mode, "SigBot starting");

    // ── Config ────────────────────────────────────────────────────────────────
    let strategy_file = StrategyFileConfig::load(strategy_path)?;
    let risk_manager = RiskManager::new(&RiskConfig::load(strategy_path)?)?;
    let registry = StrategyRegistry::from_config(&strategy_file)?;

    // ── Exchange wiring (injected based on TRADING_MODE) ─────────────────────
    let market: Arc<dyn MarketDataSource>;
    let account: Arc<dyn AccountSource>;
    let sink: Arc<dyn OrderSink>;
    let mut paper_sync = None;

    match cfg.trading_mode {
        TradingMode::Live => {
            info!("Live trading mode; orders go to Binance");
            let client = Arc::new(BinanceClient::new(&cfg.binance_api_key, &cfg.binance_secret)?);
            market = client.clone();
            account = client.clone();
            sink = client;
        }
        TradingMode::Paper => {
            info!(
                balance = cfg.paper_balance,
                slippage_bps = cfg.paper_slippage_bps,
                "Paper trading mode; Binance market data, simulated fills"
            );
            let public = Arc::new(BinanceClient::public()?);
            let paper = Arc::new(PaperClient::new(
                &cfg.quote_asset,
                cfg.paper_balance,
                cfg.paper_slippage_bps,
            ));
            paper_sync = Some(spawn_paper_price_sync(
                public.clone(),
                paper.clone(),
                strategy_file.instruments(),
                cfg.poll_interval,
            ));
            market = public;
            account = paper.clone();
            sink = paper;
        }
    }

    // ── Engine ────────────────────────────────────────────────────────────────
    let cycle = DecisionCycle::new(
        market,
        account,
        risk_manager,
        PlanExecutor::new(sink),
        cfg.quote_asset.clone(),
    );
    let (engine, handle) = Engine::new(registry, cycle);
    let engine_task = tokio::spawn(engine.run());

    handle.send(EngineCommand::Start).await?;
    let ticker = spawn_ticker(handle.clone(), cfg.poll_interval);
    info!(interval_secs = cfg.poll_interval.as_secs(), "All subsystems started. Waiting for shutdown signal.");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    ticker.abort();
    if let Some(sync) = paper_sync {
        sync.abort();
    }
    handle.send(EngineCommand::Stop).await?;
    drop(handle);
    engine_task.await?;
    info!("Engine stopped. Exiting.");
    Ok(())
}

/// Keep the paper exchange's prices current so resting stops can fire.
fn spawn_paper_price_sync(
    market: Arc<BinanceClient>,
    paper: Arc<PaperClient>,
    instruments: Vec<String>,
    period: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            for instrument in &instruments {
                match market.current_price(instrument).await {
                    Ok(price) => {
                        for fill in paper.update_price(instrument, price).await {
                            warn!(
                                instrument = %fill.instrument,
                                price = fill.price,
                                qty = fill.quantity,
                                "Paper stop-loss filled"
                            );
                        }
                    }
                    Err(e) => warn!(%instrument, error = %e, "Paper price refresh failed"),
                }
            }
        }
    })
}

async fn backtest(
    strategy_path: &str,
    name: Option<&str>,
    csv: Option<PathBuf>,
    window: Option<usize>,
    count: usize,
) -> Result<()> {
    let file = StrategyFileConfig::load(strategy_path)?;
    let strategy = match name {
        Some(name) => file
            .strategies
            .iter()
            .find(|s| s.name == name)
            .with_context(|| format!("no strategy named '{name}' in {strategy_path}"))?,
        None => file
            .strategies
            .first()
            .context("strategy file has no strategies")?,
    };
    let Some(instrument) = strategy.instruments.first() else {
        bail!("strategy '{}' has no instruments", strategy.name);
    };
    let runner = BacktestRunner::new(window.map_or_else(|| strategy.window(), Ok)?)?;

    let candles = match csv {
        Some(path) => load_candles(&path)?,
        None => {
            BinanceClient::public()?
                .historical_candles(instrument, &strategy.timeframe, count)
                .await?
        }
    };
    info!(
        strategy = %strategy.name,
        instrument = %instrument,
        candles = candles.len(),
        window = runner.window(),
        "Running backtest"
    );

    let result = runner.run(&candles);
    println!("Backtest: {} {} ({} candles)", strategy.name, instrument, candles.len());
    println!("{result}");
    Ok(())
}
