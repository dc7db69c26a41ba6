//! Passive quoting strategy: keep a bid and an ask alive around the
//! mid-price, within inventory and loss limits.
//!
//! A worker refreshes the quotes every 500 ms. A quote is replaced when it
//! has aged past 500 ms or the target price has drifted more than 0.02
//! away from it; replacement cancels the resting order directly in the
//! book. Fills are attributed by matching trade order ids against the
//! strategy's own outstanding quote ids.

use anyhow::Result;
use chrono::Local;
use parking_lot::Mutex;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tradeit_core::prelude::*;
use tracing::{info, warn};

/// Quote refresh period.
const QUOTE_REFRESH: Duration = Duration::from_millis(500);
/// A quote older than this is replaced.
const QUOTE_MAX_AGE_US: u64 = 500_000;
/// A quote whose price has drifted further than this from the current
/// target is replaced.
const MAX_PRICE_DRIFT: Decimal = dec!(0.02);
/// Floor on the quoted half-spread.
const MIN_HALF_SPREAD: Decimal = dec!(0.01);
/// Units per quote.
const QUOTE_QTY: u32 = 1;
/// Absolute inventory bound; exceeding it latches the risk flag.
const INVENTORY_LIMIT: i64 = 10;

const METRICS_HEADER: &str = "timestamp,inventory,pnl,spread,bid_id,ask_id";
const TRADES_HEADER: &str =
    "trade_id,instrument,price,quantity,pnl,inventory,timestamp,risk_breached";

struct QuoteState {
    inventory: i64,
    /// Own outstanding quotes by order id.
    active_orders: HashMap<u64, Order>,
    /// Cumulative fills per own order id.
    filled_quantity: HashMap<u64, u32>,
    /// Current quote slots; 0 means no quote outstanding on that side.
    current_bid_id: u64,
    current_ask_id: u64,
}

struct MakerShared {
    symbol: String,
    book: Arc<OrderBook>,
    submit: SubmitOrder,
    max_loss: Decimal,
    inventory_limit: i64,
    running: AtomicBool,
    total_quotes: AtomicU64,
    tracker: PerfTracker,
    quotes: Mutex<QuoteState>,
    metrics_log: Mutex<Option<CsvSink>>,
    trade_log: Mutex<Option<CsvSink>>,
}

/// Market-making strategy for a single instrument.
pub struct MarketMaker {
    shared: Arc<MakerShared>,
    log_dir: PathBuf,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
}

impl MarketMaker {
    pub fn new(
        symbol: impl Into<String>,
        book: Arc<OrderBook>,
        submit: SubmitOrder,
        max_loss: Decimal,
    ) -> Self {
        let symbol = symbol.into();
        info!(%symbol, %max_loss, inventory_limit = INVENTORY_LIMIT, "initialized MarketMaker");
        Self {
            shared: Arc::new(MakerShared {
                symbol,
                book,
                submit,
                max_loss,
                inventory_limit: INVENTORY_LIMIT,
                running: AtomicBool::new(false),
                total_quotes: AtomicU64::new(0),
                tracker: PerfTracker::new(),
                quotes: Mutex::new(QuoteState {
                    inventory: 0,
                    active_orders: HashMap::new(),
                    filled_quantity: HashMap::new(),
                    current_bid_id: 0,
                    current_ask_id: 0,
                }),
                metrics_log: Mutex::new(None),
                trade_log: Mutex::new(None),
            }),
            log_dir: PathBuf::from("logs"),
            worker: Mutex::new(None),
        }
    }

    /// Redirect the report sinks (default `logs/`).
    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = dir.into();
        self
    }

    pub fn inventory(&self) -> i64 {
        self.shared.quotes.lock().inventory
    }

    pub fn realized_pnl(&self) -> Decimal {
        self.shared.tracker.realized_pnl()
    }

    pub fn total_quotes(&self) -> u64 {
        self.shared.total_quotes.load(Ordering::Relaxed)
    }

    fn quote_to_trade_ratio(&self) -> f64 {
        let trades = self.shared.tracker.total_trades();
        if trades == 0 {
            return 0.0;
        }
        self.total_quotes() as f64 / trades as f64
    }
}

impl Strategy for MarketMaker {
    fn start(&self) {
        if self.shared.running.swap(true, Ordering::AcqRel) {
            warn!("MarketMaker already running");
            return;
        }

        *self.shared.metrics_log.lock() =
            CsvSink::create_or_warn(self.log_dir.join("market_maker_metrics.csv"), METRICS_HEADER);
        *self.shared.trade_log.lock() =
            CsvSink::create_or_warn(self.log_dir.join("market_maker_trades.csv"), TRADES_HEADER);

        let shared = Arc::clone(&self.shared);
        *self.worker.lock() = Some(thread::spawn(move || {
            while shared.running.load(Ordering::Acquire) {
                shared.place_quotes();
                thread::sleep(QUOTE_REFRESH);
            }
        }));
    }

    fn stop(&self) {
        self.shared.running.store(false, Ordering::Release);
        if let Some(handle) = self.worker.lock().take() {
            // A risk latch inside the worker's own call stack must not
            // join itself; the cleared flag already ends the loop.
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
        *self.shared.metrics_log.lock() = None;
        *self.shared.trade_log.lock() = None;

        info!(
            quotes = self.total_quotes(),
            trades = self.shared.tracker.total_trades(),
            quote_to_trade_ratio = self.quote_to_trade_ratio(),
            "MarketMaker stopped"
        );
    }

    fn on_market_data(&self, _order: &Order) {}

    fn on_trade(&self, trade: &Trade) {
        if trade.instrument != self.shared.symbol {
            return;
        }
        self.shared.tracker.record_trade();

        let mut delta = Decimal::ZERO;
        let inventory;
        {
            let mut quotes = self.shared.quotes.lock();

            if let Some(own_qty) = quotes.active_orders.get(&trade.buy_order_id).map(|o| o.quantity) {
                let filled = {
                    let entry = quotes.filled_quantity.entry(trade.buy_order_id).or_insert(0);
                    *entry += trade.quantity;
                    *entry
                };
                quotes.inventory += i64::from(trade.quantity);
                delta -= trade.price * Decimal::from(trade.quantity);
                self.shared.tracker.add_quantity(trade.quantity);
                if filled >= own_qty {
                    quotes.active_orders.remove(&trade.buy_order_id);
                    quotes.filled_quantity.remove(&trade.buy_order_id);
                }
            }

            if let Some(own_qty) = quotes.active_orders.get(&trade.sell_order_id).map(|o| o.quantity) {
                let filled = {
                    let entry = quotes.filled_quantity.entry(trade.sell_order_id).or_insert(0);
                    *entry += trade.quantity;
                    *entry
                };
                quotes.inventory -= i64::from(trade.quantity);
                delta += trade.price * Decimal::from(trade.quantity);
                self.shared.tracker.add_quantity(trade.quantity);
                if filled >= own_qty {
                    quotes.active_orders.remove(&trade.sell_order_id);
                    quotes.filled_quantity.remove(&trade.sell_order_id);
                }
            }

            inventory = quotes.inventory;
        }

        let realized = self.shared.tracker.apply_pnl(delta);

        if realized <= self.shared.max_loss || inventory.abs() > self.shared.inventory_limit {
            warn!(
                pnl = %realized,
                inventory,
                "risk violation detected post-trade, stopping strategy"
            );
            self.shared.tracker.latch_risk();
            self.shared.running.store(false, Ordering::Release);
            return;
        }

        info!(inventory, pnl = %realized, "trade processed");

        if let Some(sink) = self.shared.trade_log.lock().as_ref() {
            sink.write_row(format!(
                "{},{},{},{},{},{},{},{}",
                trade.trade_id,
                trade.instrument,
                trade.price,
                trade.quantity,
                delta,
                inventory,
                trade.timestamp,
                self.shared.tracker.risk_violated()
            ));
        }
    }

    fn name(&self) -> &str {
        "MarketMaker"
    }

    fn print_summary(&self) {
        info!("=== MarketMaker summary ===");
        info!("realized PnL: {}", self.realized_pnl());
        info!("inventory [{}]: {}", self.shared.symbol, self.inventory());
        info!("total quotes: {}", self.total_quotes());
        info!("total trades: {}", self.total_trades());
        info!("average trade size: {}", self.average_trade_size());
        info!("quote-to-trade ratio: {}", self.quote_to_trade_ratio());
        info!("max drawdown: {}", self.max_drawdown());
        info!("risk breached: {}", if self.risk_violated() { "yes" } else { "no" });
    }

    fn export_summary(&self, path: &Path) -> Result<()> {
        write_summary_json(
            path,
            vec![
                ("strategy".to_string(), json!("marketmaker")),
                (
                    "pnl".to_string(),
                    json!(self.realized_pnl().to_f64().unwrap_or(0.0)),
                ),
                (
                    format!("inventory_{}", self.shared.symbol),
                    json!(self.inventory()),
                ),
                ("total_quotes".to_string(), json!(self.total_quotes())),
                ("total_trades".to_string(), json!(self.total_trades())),
                (
                    "average_trade_size".to_string(),
                    json!(self.average_trade_size().to_f64().unwrap_or(0.0)),
                ),
                (
                    "quote_to_trade_ratio".to_string(),
                    json!(self.quote_to_trade_ratio()),
                ),
                (
                    "max_drawdown".to_string(),
                    json!(self.max_drawdown().to_f64().unwrap_or(0.0)),
                ),
                ("risk_breached".to_string(), json!(self.risk_violated())),
            ],
        )
    }

    fn total_trades(&self) -> u64 {
        self.shared.tracker.total_trades()
    }

    fn average_trade_size(&self) -> Decimal {
        self.shared.tracker.average_trade_size()
    }

    fn max_drawdown(&self) -> Decimal {
        self.shared.tracker.max_drawdown()
    }

    fn risk_violated(&self) -> bool {
        self.shared.tracker.risk_violated()
    }
}

impl MakerShared {
    /// One quoting cycle: risk pre-check, quote targets from the live
    /// book, stale-quote replacement, metrics row.
    fn place_quotes(&self) {
        {
            let quotes = self.quotes.lock();
            let realized = self.tracker.realized_pnl();
            if realized <= self.max_loss || quotes.inventory.abs() > self.inventory_limit {
                warn!(
                    pnl = %realized,
                    inventory = quotes.inventory,
                    "risk limits exceeded, stopping strategy"
                );
                self.tracker.latch_risk();
                self.running.store(false, Ordering::Release);
                return;
            }
        }

        let best_bid = self.book.best_bid();
        let best_ask = self.book.best_ask();
        let (Some(best_bid), Some(best_ask)) = (best_bid, best_ask) else {
            // Cannot compute a mid without both sides; skip this cycle.
            return;
        };

        let mid = (best_bid.price + best_ask.price) / dec!(2);
        let half = ((best_ask.price - best_bid.price) / dec!(2)).max(MIN_HALF_SPREAD);
        let bid_price = mid - half;
        let ask_price = mid + half;
        let now = now_micros();

        let mut cancels: Vec<u64> = Vec::new();
        let mut submissions: Vec<Order> = Vec::new();
        let metrics_row;
        {
            let mut quotes = self.quotes.lock();

            refresh_slot(&mut quotes, QuoteSide::Bid, bid_price, now, &mut cancels);
            refresh_slot(&mut quotes, QuoteSide::Ask, ask_price, now, &mut cancels);

            if quotes.current_bid_id == 0 {
                let order = Order::with_id(
                    next_order_id(),
                    &self.symbol,
                    OrderType::Limit,
                    Side::Buy,
                    bid_price,
                    QUOTE_QTY,
                    now,
                );
                quotes.filled_quantity.insert(order.id, 0);
                quotes.current_bid_id = order.id;
                quotes.active_orders.insert(order.id, order.clone());
                submissions.push(order);
            }
            if quotes.current_ask_id == 0 {
                let order = Order::with_id(
                    next_order_id(),
                    &self.symbol,
                    OrderType::Limit,
                    Side::Sell,
                    ask_price,
                    QUOTE_QTY,
                    now,
                );
                quotes.filled_quantity.insert(order.id, 0);
                quotes.current_ask_id = order.id;
                quotes.active_orders.insert(order.id, order.clone());
                submissions.push(order);
            }

            metrics_row = format!(
                "{},{},{},{},{},{}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                quotes.inventory,
                self.tracker.realized_pnl(),
                half,
                quotes.current_bid_id,
                quotes.current_ask_id
            );
        }

        for id in cancels {
            self.book.cancel_order(id);
        }
        self.total_quotes
            .fetch_add(submissions.len() as u64, Ordering::Relaxed);
        for order in submissions {
            (self.submit)(order);
        }

        if let Some(sink) = self.metrics_log.lock().as_ref() {
            sink.write_row(metrics_row);
        }
    }
}

enum QuoteSide {
    Bid,
    Ask,
}

/// Clear the slot when its quote is gone (fully filled) or stale; a stale
/// quote is also queued for cancellation in the book.
fn refresh_slot(
    quotes: &mut QuoteState,
    side: QuoteSide,
    new_price: Decimal,
    now: u64,
    cancels: &mut Vec<u64>,
) {
    let id = match side {
        QuoteSide::Bid => quotes.current_bid_id,
        QuoteSide::Ask => quotes.current_ask_id,
    };
    if id == 0 {
        return;
    }

    let cleared = match quotes.active_orders.get(&id) {
        None => true,
        Some(old) => {
            let expired = now > old.timestamp + QUOTE_MAX_AGE_US;
            let drifted = (old.price - new_price).abs() > MAX_PRICE_DRIFT;
            if expired || drifted {
                quotes.active_orders.remove(&id);
                quotes.filled_quantity.remove(&id);
                cancels.push(id);
                true
            } else {
                false
            }
        }
    };

    if cleared {
        match side {
            QuoteSide::Bid => quotes.current_bid_id = 0,
            QuoteSide::Ask => quotes.current_ask_id = 0,
        }
    }
}
