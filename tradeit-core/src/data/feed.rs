//! CSV tick feed: replays historical order flow into a callback.
//!
//! Row grammar: `timestamp,symbol,side,price,quantity,type` with an
//! optional header line (detected by the token `timestamp`). Malformed
//! rows are skipped with a warning; every accepted row becomes an
//! [`Order`] with a freshly allocated id.

use crate::core::{next_order_id, Order, OrderType, Side};
use anyhow::{bail, Context, Result};
use rust_decimal::Decimal;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};

/// Callback receiving each parsed order.
pub type OrderCallback = Arc<dyn Fn(Order) + Send + Sync>;

/// Pause between replayed ticks, the feed's coarse pacing knob.
const TICK_THROTTLE: Duration = Duration::from_millis(10);

/// Replays a tick CSV file on a worker thread.
pub struct MarketFeed {
    path: PathBuf,
    running: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
    worker: Option<thread::JoinHandle<()>>,
}

impl MarketFeed {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            running: Arc::new(AtomicBool::new(false)),
            finished: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    /// Spawn the replay worker. Each accepted row is handed to `callback`
    /// with a throttle between ticks; the worker stops at end of file or
    /// when [`stop`](Self::stop) clears the flag.
    pub fn start(&mut self, callback: OrderCallback) {
        self.running.store(true, Ordering::Release);
        self.finished.store(false, Ordering::Release);

        let path = self.path.clone();
        let running = Arc::clone(&self.running);
        let finished = Arc::clone(&self.finished);

        self.worker = Some(thread::spawn(move || {
            if let Err(err) = feed_loop(&path, &running, &*callback) {
                error!(path = %path.display(), %err, "market data feed failed");
            }
            finished.store(true, Ordering::Release);
        }));
    }

    /// Clear the run flag and join the worker.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }

    /// Whether the replay worker has run to completion.
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Synchronous full replay without throttling. Returns the number of
    /// accepted rows. Used by tests and batch runs.
    pub fn load(&self, mut callback: impl FnMut(Order)) -> Result<usize> {
        let reader = open_reader(&self.path)?;
        let mut accepted = 0usize;
        for line in body_lines(reader) {
            match parse_tick(&line) {
                Ok(order) => {
                    callback(order);
                    accepted += 1;
                }
                Err(err) => warn!(%err, line, "skipping malformed tick row"),
            }
        }
        Ok(accepted)
    }
}

impl Drop for MarketFeed {
    fn drop(&mut self) {
        self.stop();
    }
}

fn feed_loop(path: &Path, running: &AtomicBool, callback: &(dyn Fn(Order) + Send + Sync)) -> Result<()> {
    let reader = open_reader(path)?;

    for line in body_lines(reader) {
        if !running.load(Ordering::Acquire) {
            break;
        }
        match parse_tick(&line) {
            Ok(order) => {
                info!(
                    instrument = %order.instrument,
                    side = %order.side,
                    price = %order.price,
                    quantity = order.quantity,
                    timestamp = order.timestamp,
                    "tick replayed"
                );
                callback(order);
            }
            Err(err) => warn!(%err, line, "skipping malformed tick row"),
        }
        thread::sleep(TICK_THROTTLE);
    }

    info!(path = %path.display(), "market data replay finished");
    Ok(())
}

fn open_reader(path: &Path) -> Result<BufReader<File>> {
    let file = File::open(path)
        .with_context(|| format!("opening market data file {}", path.display()))?;
    Ok(BufReader::new(file))
}

/// Iterate non-empty body lines, skipping a header line if the first line
/// carries the `timestamp` token.
fn body_lines(reader: BufReader<File>) -> impl Iterator<Item = String> {
    reader
        .lines()
        .map_while(|line| line.ok())
        .enumerate()
        .filter(|(index, line)| !(*index == 0 && line.contains("timestamp")))
        .map(|(_, line)| line)
        .filter(|line| !line.trim().is_empty())
}

/// Parse one body row into an order with a freshly allocated id.
///
/// Unknown side tokens fall back to SELL and unknown type tokens to
/// MARKET; numeric fields must parse or the row is rejected.
fn parse_tick(line: &str) -> Result<Order> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() != 6 {
        bail!("expected 6 fields, found {}", fields.len());
    }

    let timestamp: u64 = fields[0].parse().context("timestamp")?;
    let instrument = fields[1].to_string();
    let side = if fields[2] == "BUY" { Side::Buy } else { Side::Sell };
    let price: Decimal = fields[3].parse().context("price")?;
    let quantity: u32 = fields[4].parse().context("quantity")?;
    let order_type = if fields[5] == "LIMIT" {
        OrderType::Limit
    } else {
        OrderType::Market
    };

    Ok(Order::with_id(
        next_order_id(),
        instrument,
        order_type,
        side,
        price,
        quantity,
        timestamp,
    ))
}
