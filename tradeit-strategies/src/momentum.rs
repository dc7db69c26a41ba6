//! Short-window momentum strategy: fire a market order in the direction
//! of the recent price drift, rate-limited to one action per second.
//!
//! The signal window holds the last five prices observed on the feed for
//! the strategy's instrument and is defined once three are buffered: if
//! the latest price exceeds the mean of the earlier ones the strategy
//! buys, otherwise it sells.

use anyhow::Result;
use parking_lot::Mutex;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::json;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tradeit_core::prelude::*;
use tracing::{debug, info, warn};

/// Signal evaluation period.
const EVAL_PERIOD: Duration = Duration::from_millis(200);
/// Pause after each submission.
const COOLDOWN_US: u64 = 1_000_000;
/// Price window length.
const WINDOW: usize = 5;
/// Prices required before the signal is defined.
const MIN_SIGNAL_PRICES: usize = 3;

const TRADES_HEADER: &str =
    "trade_id,instrument,price,quantity,pnl,position,timestamp,risk_breached";

struct SignalWindow {
    prices: VecDeque<Decimal>,
    /// Next time (µs since epoch) an action is allowed.
    cooldown_end: u64,
}

struct MomentumShared {
    symbol: String,
    submit: SubmitOrder,
    max_loss: Decimal,
    running: AtomicBool,
    position: AtomicI64,
    tracker: PerfTracker,
    window: Mutex<SignalWindow>,
    trade_log: Mutex<Option<CsvSink>>,
}

/// Momentum strategy for a single instrument.
pub struct MomentumTrader {
    shared: Arc<MomentumShared>,
    log_dir: PathBuf,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
}

impl MomentumTrader {
    pub fn new(symbol: impl Into<String>, submit: SubmitOrder, max_loss: Decimal) -> Self {
        let symbol = symbol.into();
        info!(%symbol, %max_loss, "initialized MomentumTrader");
        Self {
            shared: Arc::new(MomentumShared {
                symbol,
                submit,
                max_loss,
                running: AtomicBool::new(false),
                position: AtomicI64::new(0),
                tracker: PerfTracker::new(),
                window: Mutex::new(SignalWindow {
                    prices: VecDeque::with_capacity(WINDOW),
                    cooldown_end: 0,
                }),
                trade_log: Mutex::new(None),
            }),
            log_dir: PathBuf::from("logs"),
            worker: Mutex::new(None),
        }
    }

    /// Redirect the report sink (default `logs/`).
    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = dir.into();
        self
    }

    pub fn position(&self) -> i64 {
        self.shared.position.load(Ordering::Relaxed)
    }

    pub fn realized_pnl(&self) -> Decimal {
        self.shared.tracker.realized_pnl()
    }

    /// Most recent observed price, if any.
    pub fn latest_price(&self) -> Option<Decimal> {
        self.shared.window.lock().prices.back().copied()
    }
}

impl Strategy for MomentumTrader {
    fn start(&self) {
        if self.shared.running.swap(true, Ordering::AcqRel) {
            warn!("MomentumTrader already running");
            return;
        }

        *self.shared.trade_log.lock() =
            CsvSink::create_or_warn(self.log_dir.join("momentum_trades.csv"), TRADES_HEADER);

        let shared = Arc::clone(&self.shared);
        *self.worker.lock() = Some(thread::spawn(move || {
            while shared.running.load(Ordering::Acquire) {
                shared.evaluate();
                thread::sleep(EVAL_PERIOD);
            }
        }));
    }

    fn stop(&self) {
        self.shared.running.store(false, Ordering::Release);
        if let Some(handle) = self.worker.lock().take() {
            // A risk latch raised on the worker's own call stack must not
            // join itself; the cleared flag already ends the loop.
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
        *self.shared.trade_log.lock() = None;
    }

    fn on_market_data(&self, order: &Order) {
        if order.instrument != self.shared.symbol {
            return;
        }
        let mut window = self.shared.window.lock();
        window.prices.push_back(order.price);
        while window.prices.len() > WINDOW {
            window.prices.pop_front();
        }
    }

    fn on_trade(&self, trade: &Trade) {
        if trade.instrument != self.shared.symbol {
            return;
        }

        // Direction heuristic inherited from the reference behavior: the
        // order with the smaller id is assumed to be ours. Holds only
        // while our id was allocated before the counterparty's.
        let qty: i64 = if trade.buy_order_id < trade.sell_order_id {
            i64::from(trade.quantity)
        } else {
            -i64::from(trade.quantity)
        };
        let position = self.shared.position.fetch_add(qty, Ordering::AcqRel) + qty;
        let delta = -Decimal::from(qty) * trade.price;

        let realized = self.shared.tracker.apply_pnl(delta);
        self.shared.tracker.record_trade();
        self.shared.tracker.add_quantity(trade.quantity);

        if realized < self.shared.max_loss {
            warn!(pnl = %realized, "max loss breached, stopping strategy");
            self.shared.tracker.latch_risk();
            self.stop();
            // The sink is closed; the breaching trade is not logged.
            return;
        }

        if let Some(sink) = self.shared.trade_log.lock().as_ref() {
            sink.write_row(format!(
                "{},{},{},{},{},{},{},{}",
                trade.trade_id,
                trade.instrument,
                trade.price,
                trade.quantity,
                delta,
                position,
                trade.timestamp,
                self.shared.tracker.risk_violated()
            ));
        }
    }

    fn name(&self) -> &str {
        "MomentumTrader"
    }

    fn print_summary(&self) {
        info!("=== MomentumTrader summary ===");
        info!("realized PnL: {}", self.realized_pnl());
        info!("position [{}]: {}", self.shared.symbol, self.position());
        info!("total trades: {}", self.total_trades());
        info!("average trade size: {}", self.average_trade_size());
        info!("max drawdown: {}", self.max_drawdown());
        info!("risk breached: {}", if self.risk_violated() { "yes" } else { "no" });
    }

    fn export_summary(&self, path: &Path) -> Result<()> {
        write_summary_json(
            path,
            vec![
                ("strategy".to_string(), json!("momentum")),
                (
                    "pnl".to_string(),
                    json!(self.realized_pnl().to_f64().unwrap_or(0.0)),
                ),
                (
                    format!("position_{}", self.shared.symbol),
                    json!(self.position()),
                ),
                ("total_trades".to_string(), json!(self.total_trades())),
                (
                    "average_trade_size".to_string(),
                    json!(self.average_trade_size().to_f64().unwrap_or(0.0)),
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

impl MomentumShared {
    /// One evaluation cycle: compare the latest price against the mean of
    /// the earlier window and submit a market order in that direction,
    /// unless still cooling down.
    fn evaluate(&self) {
        let order = {
            let mut window = self.window.lock();
            if window.prices.len() < MIN_SIGNAL_PRICES {
                return;
            }
            let now = now_micros();
            if now < window.cooldown_end {
                return;
            }

            let Some(&current) = window.prices.back() else {
                return;
            };
            let earlier = window.prices.len() - 1;
            let sum: Decimal = window.prices.iter().take(earlier).copied().sum();
            let average = sum / Decimal::from(earlier as u64);
            let side = if current > average { Side::Buy } else { Side::Sell };

            window.cooldown_end = now + COOLDOWN_US;
            Order::new(&self.symbol, OrderType::Market, side, current, 1, now)
        };

        debug!(
            side = %order.side,
            price = %order.price,
            "momentum signal fired"
        );
        (self.submit)(order);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{trade, SubmittedOrders};
    use rust_decimal_macros::dec;

    fn tick(id: u64, price: Decimal) -> Order {
        Order::with_id(id, "ETH-USD", OrderType::Limit, Side::Buy, price, 1, id)
    }

    #[test]
    fn no_signal_below_three_prices() {
        let submitted = SubmittedOrders::new();
        let trader = MomentumTrader::new("ETH-USD", submitted.callback(), dec!(-500.0));

        trader.on_market_data(&tick(1, dec!(100.0)));
        trader.on_market_data(&tick(2, dec!(101.0)));

        trader.shared.evaluate();
        assert!(submitted.is_empty());
    }

    #[test]
    fn rising_prices_trigger_a_market_buy() {
        let submitted = SubmittedOrders::new();
        let trader = MomentumTrader::new("ETH-USD", submitted.callback(), dec!(-500.0));

        trader.on_market_data(&tick(1, dec!(100.0)));
        trader.on_market_data(&tick(2, dec!(101.0)));
        trader.on_market_data(&tick(3, dec!(103.0)));

        trader.shared.evaluate();

        let orders = submitted.take();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].instrument, "ETH-USD");
        assert_eq!(orders[0].order_type, OrderType::Market);
        assert_eq!(orders[0].side, Side::Buy);
        assert_eq!(orders[0].quantity, 1);
    }

    #[test]
    fn falling_prices_trigger_a_market_sell() {
        let submitted = SubmittedOrders::new();
        let trader = MomentumTrader::new("ETH-USD", submitted.callback(), dec!(-500.0));

        trader.on_market_data(&tick(1, dec!(103.0)));
        trader.on_market_data(&tick(2, dec!(101.0)));
        trader.on_market_data(&tick(3, dec!(99.0)));

        trader.shared.evaluate();

        let orders = submitted.take();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].side, Side::Sell);
    }

    #[test]
    fn cooldown_suppresses_back_to_back_signals() {
        let submitted = SubmittedOrders::new();
        let trader = MomentumTrader::new("ETH-USD", submitted.callback(), dec!(-500.0));

        for (id, price) in [(1, dec!(100.0)), (2, dec!(101.0)), (3, dec!(103.0))] {
            trader.on_market_data(&tick(id, price));
        }

        trader.shared.evaluate();
        trader.shared.evaluate();
        assert_eq!(submitted.len(), 1);
    }

    #[test]
    fn window_keeps_only_the_last_five_prices() {
        let submitted = SubmittedOrders::new();
        let trader = MomentumTrader::new("ETH-USD", submitted.callback(), dec!(-500.0));

        for id in 1..=8u64 {
            trader.on_market_data(&tick(id, Decimal::from(100 + id)));
        }

        assert_eq!(trader.shared.window.lock().prices.len(), WINDOW);
        assert_eq!(trader.latest_price(), Some(dec!(108)));
    }

    #[test]
    fn losses_past_the_floor_latch_the_risk_flag() {
        let submitted = SubmittedOrders::new();
        let trader = MomentumTrader::new("ETH-USD", submitted.callback(), dec!(-10.0));

        // buy_order_id < sell_order_id: attributed as our buy, PnL -100.
        let losing = trade(1, 100, 101, "ETH-USD", dec!(100.0), 1, Side::Sell);
        trader.on_trade(&losing);
        trader.on_trade(&losing);
        trader.on_trade(&losing);

        assert!(trader.risk_violated());
        assert_eq!(trader.realized_pnl(), dec!(-300.0));
    }

    #[test]
    fn heuristic_sign_convention() {
        let submitted = SubmittedOrders::new();
        let trader = MomentumTrader::new("ETH-USD", submitted.callback(), dec!(-10_000.0));

        // Smaller buy id: counted as our buy.
        trader.on_trade(&trade(1, 10, 20, "ETH-USD", dec!(50.0), 2, Side::Buy));
        assert_eq!(trader.position(), 2);
        assert_eq!(trader.realized_pnl(), dec!(-100.0));

        // Smaller sell id: counted as our sell.
        trader.on_trade(&trade(2, 30, 25, "ETH-USD", dec!(60.0), 2, Side::Sell));
        assert_eq!(trader.position(), 0);
        assert_eq!(trader.realized_pnl(), dec!(20.0));
    }

    #[test]
    fn foreign_instruments_are_ignored() {
        let submitted = SubmittedOrders::new();
        let trader = MomentumTrader::new("ETH-USD", submitted.callback(), dec!(-10.0));

        trader.on_market_data(&tick(1, dec!(1.0)));
        trader.on_trade(&trade(1, 1, 2, "BTC-USD", dec!(30000.0), 1, Side::Buy));

        assert_eq!(trader.total_trades(), 0);
        assert_eq!(trader.position(), 0);
    }
}
