//! The tradeit simulator binary.
//!
//! Wires the configured strategy into the simulator, replays the tick
//! file through the router, and runs until the replay finishes or SIGINT
//! arrives. Shutdown stops the feed, then the strategies, then writes the
//! run summary to `logs/summary.json`.

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tradeit_bins::common::Args;
use tradeit_core::prelude::*;
use tradeit_strategies::{ArbitrageTrader, MarketMaker, MomentumTrader};

/// Primary traded instrument.
const SYMBOL: &str = "ETH-USD";
/// Second leg of the arbitrage pair.
const PAIR_SYMBOL: &str = "BTC-USD";

const CONFIG_FILE: &str = "config.json";
const LOG_DIR: &str = "logs";

fn main() -> Result<()> {
    let args = Args::parse();
    init_logger(&args.log_level);

    let config = args.merge_into(Config::load_or_default(CONFIG_FILE))?;
    tracing::info!(
        strategy = %config.strategy,
        file = %config.file,
        spread = %config.spread,
        size = config.size,
        max_loss = %config.risk,
        "starting simulator"
    );

    std::fs::create_dir_all(LOG_DIR).context("creating logs directory")?;

    let simulator = Arc::new(Simulator::new());
    let submit = simulator.submitter();

    let strategy: Arc<dyn Strategy> = match config.strategy.as_str() {
        "marketmaker" => Arc::new(MarketMaker::new(
            SYMBOL,
            simulator.book(SYMBOL),
            submit,
            config.risk,
        )),
        "momentum" => Arc::new(MomentumTrader::new(SYMBOL, submit, config.risk)),
        "arbitrage" => Arc::new(ArbitrageTrader::new(
            SYMBOL,
            PAIR_SYMBOL,
            submit,
            config.spread,
            config.size,
            config.risk,
        )),
        other => bail!("unknown strategy: {other}"),
    };

    simulator.register_strategy(Arc::clone(&strategy));
    simulator.start();

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        ctrlc::set_handler(move || {
            tracing::warn!("interrupt received, shutting down");
            running.store(false, Ordering::Release);
        })
        .context("installing SIGINT handler")?;
    }

    let mut feed = MarketFeed::new(&config.file);
    {
        let simulator = Arc::clone(&simulator);
        let strategy = Arc::clone(&strategy);
        feed.start(Arc::new(move |order: Order| {
            simulator.on_order(order.clone());
            strategy.on_market_data(&order);
        }));
    }

    while running.load(Ordering::Acquire) && !feed.is_finished() {
        thread::sleep(Duration::from_secs(1));
    }

    feed.stop();
    simulator.stop();

    strategy.print_summary();
    strategy.export_summary(Path::new(LOG_DIR).join("summary.json").as_path())?;

    tracing::info!("shutdown complete");
    Ok(())
}
