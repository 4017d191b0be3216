//! Trading engine simulation.
//!
//! Runs scripted scenarios against an in-memory ledger and a scripted mock
//! oracle: ticker creation and curve trading, a perp round trip, and the
//! background sweeper liquidating a position after a price drop.
//!
//! `--scenario serve` instead runs the sweeper against the configured oracle
//! until ctrl-c, logging sweep health as it goes.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use curveperp_core::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Scenario {
    All,
    Curve,
    Perps,
    Sweeper,
    /// Long-running sweeper against the configured oracle
    Serve,
}

#[derive(Parser)]
#[command(name = "curveperp-sim")]
#[command(about = "Bonding curve and perpetuals engine simulation")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "curveperp.toml")]
    config: String,

    /// Environment preset used when no config file exists
    #[arg(long, default_value = "development")]
    env: String,

    #[arg(long, value_enum, default_value_t = Scenario::All)]
    scenario: Scenario,

    /// Sweeper ticks to wait for in the sweeper scenario
    #[arg(long, default_value_t = 5)]
    ticks: u32,

    /// Override log filter
    #[arg(long)]
    log_level: Option<String>,

    /// Validate config and exit
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_missing = !Path::new(&cli.config).exists();
    let mut config = if config_missing {
        cli.env.parse::<Environment>()?.config()
    } else {
        PlatformConfig::load(&cli.config).with_context(|| format!("loading {}", cli.config))?
    };
    if let Some(level) = cli.log_level {
        config.log_filter = level;
    }

    init_logging(&config);
    if config_missing {
        warn!("Config file not found, using {:?} preset: {}", config.environment, cli.config);
    }
    config.validate()?;
    info!(environment = ?config.environment, pairs = config.engine.pairs.len(), "configuration validated");

    if cli.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        return Ok(());
    }

    if cli.scenario == Scenario::Serve {
        return serve(&config).await;
    }

    println!("Curve + Perps Engine Simulation\n");
    if matches!(cli.scenario, Scenario::All | Scenario::Curve) {
        scenario_curve_trading(&config).await?;
    }
    if matches!(cli.scenario, Scenario::All | Scenario::Perps) {
        scenario_perp_round_trip(&config).await?;
    }
    if matches!(cli.scenario, Scenario::All | Scenario::Sweeper) {
        scenario_sweeper(&config, cli.ticks).await?;
    }
    println!("All simulations completed.");
    Ok(())
}

fn init_logging(config: &PlatformConfig) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_filter.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn setup(config: &PlatformConfig) -> (Engine, Arc<MockPriceFeed>) {
    let feed = Arc::new(config.oracle.mock_feed());
    let engine = Engine::new(config.engine.clone(), Arc::new(MemoryLedger::new()), feed.clone());
    (engine, feed)
}

/// Ticker creation, a buy, and a partial sell on the same curve.
async fn scenario_curve_trading(config: &PlatformConfig) -> Result<()> {
    println!("Scenario 1: Bonding Curve Trading\n");
    let (engine, _) = setup(config);
    let creator = AccountId(100);
    let trader = AccountId(101);

    engine.deposit(creator, dec!(50_000)).await?;
    engine.deposit(trader, dec!(1_000_000)).await?;

    let created = engine
        .create_ticker(
            creator,
            CreateTickerRequest {
                name: "Jollof Index".to_string(),
                symbol: "jlf".to_string(),
                icon: None,
                initial_market_cap: dec!(1_000_000),
                initial_supply: dec!(1_000_000_000),
                initial_buy: Some(dec!(10_000)),
            },
        )
        .await?;
    println!(
        "  Creator lists JLF, fee {}, opening buy {} tokens, price {}",
        created.creation_fee, created.tokens_out, created.price
    );

    let quote = engine.quote_buy(created.ticker_id, dec!(100_000))?;
    println!("  Quote for 100,000: {} tokens, fee {}", quote.tokens_out, quote.fee);

    let bought = engine.buy(trader, created.ticker_id, dec!(100_000)).await?;
    println!(
        "  Trader buys {} tokens at {} each, price now {}",
        bought.tokens_out, bought.price_per_token, bought.new_price
    );

    let half = bought.tokens_out / Decimal::TWO;
    let sold = engine.sell(trader, created.ticker_id, half).await?;
    println!(
        "  Trader sells {} tokens for {}, price now {}, balance {}\n",
        sold.tokens_sold, sold.proceeds, sold.new_price, sold.new_balance
    );

    let stats = engine.stats()?;
    println!(
        "  Fees collected: user {}, admin {}\n",
        stats.total_user_fees, stats.total_admin_fees
    );
    Ok(())
}

/// Preview, open, price move, close.
async fn scenario_perp_round_trip(config: &PlatformConfig) -> Result<()> {
    println!("Scenario 2: Perpetual Round Trip\n");
    let (engine, feed) = setup(config);
    let trader = AccountId(200);
    engine.deposit(trader, dec!(5_000_000)).await?;

    let request = OpenPositionRequest {
        pair: "BTCUSD".to_string(),
        collateral: dec!(1_500_000),
        leverage: dec!(10),
        side: Side::Long,
    };
    let preview = engine.preview_position(&request).await?;
    println!(
        "  Preview: {} lots @ {}, liquidation {}, margin {}, fee {}",
        preview.lots, preview.entry_price, preview.liquidation_price, preview.margin, preview.fee
    );

    let opened = engine.open_position(trader, request).await?;
    println!("  Opened {}, balance {}", opened.position.id, opened.new_balance);

    let oracle = config.oracle.mock_prices.get("bitcoin").copied().unwrap_or(dec!(60000));
    feed.set_price("bitcoin", oracle * dec!(1.05));
    println!("  BTC moves +5%");

    let closed = engine.close_position(trader, opened.position.id).await?;
    println!(
        "  Closed @ {}, pnl {}, payout {}, balance {}\n",
        closed.exit_price, closed.realized_pnl, closed.payout, closed.new_balance
    );
    Ok(())
}

/// Background sweeper catches a breached long.
async fn scenario_sweeper(config: &PlatformConfig, ticks: u32) -> Result<()> {
    println!("Scenario 3: Liquidation Sweeper\n");
    let (engine, feed) = setup(config);
    let trader = AccountId(300);
    engine.deposit(trader, dec!(5_000_000)).await?;

    let opened = engine
        .open_position(
            trader,
            OpenPositionRequest {
                pair: "ETHUSD".to_string(),
                collateral: dec!(1_500_000),
                leverage: dec!(20),
                side: Side::Long,
            },
        )
        .await?;
    println!(
        "  Long ETH 20x, entry {}, liquidation {}",
        opened.position.entry_price, opened.position.liquidation_price
    );

    let sweeper_config = SweeperConfig {
        interval_ms: config.sweeper.interval_ms.min(200),
        ..config.sweeper.clone()
    };
    let interval = sweeper_config.interval_ms;
    let (handle, stop) = Sweeper::new(engine.clone(), sweeper_config).spawn();

    let crash = opened.position.liquidation_price.value() * dec!(0.99);
    feed.set_price("ethereum", crash);
    println!("  ETH drops to {}", crash);

    tokio::time::sleep(Duration::from_millis(interval * u64::from(ticks.max(1)))).await;
    stop.send(true)?;
    handle.await?;

    let position = engine
        .get_position(trader, opened.position.id)?
        .context("position vanished")?;
    let stats = engine.stats()?;
    println!(
        "  Position status: {}, liquidations recorded: {}, last sweep: {:?}\n",
        position.status,
        stats.perp_liquidations,
        stats.last_perp_sweep_at
    );
    Ok(())
}

/// Runs the sweeper until ctrl-c, warning whenever the last sweep is older
/// than `stale_after_ms`.
async fn serve(config: &PlatformConfig) -> Result<()> {
    if !config.sweeper.enabled {
        info!("Sweeper disabled in configuration, nothing to serve");
        return Ok(());
    }

    let oracle = config.oracle.build().context("building price oracle")?;
    info!(source = ?config.oracle.source, "price oracle ready");
    let engine = Engine::new(config.engine.clone(), Arc::new(MemoryLedger::new()), oracle);
    let (handle, stop) = Sweeper::new(engine.clone(), config.sweeper.clone()).spawn();

    let stale_after_ms = config.sweeper.stale_after_ms;
    let mut health = tokio::time::interval(Duration::from_millis(stale_after_ms.max(1).unsigned_abs()));
    health.tick().await;

    loop {
        tokio::select! {
            _ = health.tick() => {
                let stats = engine.stats()?;
                if stats.sweep_is_stale(engine.time(), stale_after_ms) {
                    warn!(last_sweep = ?stats.last_perp_sweep_at, stale_after_ms, "liquidation sweeper is stale");
                } else {
                    info!(last_sweep = ?stats.last_perp_sweep_at, liquidations = stats.perp_liquidations, "liquidation sweeper healthy");
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("listening for ctrl-c")?;
                info!("Shutdown requested");
                break;
            }
        }
    }

    stop.send(true)?;
    handle.await?;
    info!("Sweeper stopped");
    Ok(())
}
