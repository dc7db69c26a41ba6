//! Pair strategy: watch two instruments and fire paired limit orders when
//! the cross-spread clears a hard floor.
//!
//! Purely event-driven: quote tracking and the opportunity check both run
//! inside `on_market_data`, so the strategy needs no worker thread.

use anyhow::Result;
use parking_lot::Mutex;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tradeit_core::prelude::*;
use tracing::{info, warn};

/// Minimum profitable cross-spread. A hard floor, deliberately
/// independent of the constructor's `spread_threshold` parameter.
const OPPORTUNITY_THRESHOLD: Decimal = dec!(0.05);
/// Quantity of each leg of a fired pair.
const PAIR_ORDER_QTY: u32 = 10;

struct PairState {
    /// Highest buy-side price seen per instrument.
    best_bid: HashMap<String, Decimal>,
    /// Lowest sell-side price seen per instrument.
    best_ask: HashMap<String, Decimal>,
    positions: HashMap<String, i64>,
}

/// Cross-instrument arbitrage between two instruments.
pub struct ArbitrageTrader {
    symbol1: String,
    symbol2: String,
    submit: SubmitOrder,
    spread_threshold: Decimal,
    order_size: u32,
    max_loss: Decimal,
    log_dir: PathBuf,
    running: AtomicBool,
    tracker: PerfTracker,
    state: Mutex<PairState>,
    trade_log: Mutex<Option<CsvSink>>,
}

impl ArbitrageTrader {
    pub fn new(
        symbol1: impl Into<String>,
        symbol2: impl Into<String>,
        submit: SubmitOrder,
        spread_threshold: Decimal,
        order_size: u32,
        max_loss: Decimal,
    ) -> Self {
        let symbol1 = symbol1.into();
        let symbol2 = symbol2.into();
        info!(%symbol1, %symbol2, %max_loss, "initialized ArbitrageTrader");
        Self {
            symbol1,
            symbol2,
            submit,
            spread_threshold,
            order_size,
            max_loss,
            log_dir: PathBuf::from("logs"),
            running: AtomicBool::new(false),
            tracker: PerfTracker::new(),
            state: Mutex::new(PairState {
                best_bid: HashMap::new(),
                best_ask: HashMap::new(),
                positions: HashMap::new(),
            }),
            trade_log: Mutex::new(None),
        }
    }

    /// Redirect the report sink (default `logs/`).
    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = dir.into();
        self
    }

    pub fn position(&self, symbol: &str) -> i64 {
        self.state
            .lock()
            .positions
            .get(symbol)
            .copied()
            .unwrap_or(0)
    }

    pub fn realized_pnl(&self) -> Decimal {
        self.tracker.realized_pnl()
    }

    /// Constructor parameter, stored but not consulted by the opportunity
    /// rule, which uses the hard [`OPPORTUNITY_THRESHOLD`] floor.
    pub fn spread_threshold(&self) -> Decimal {
        self.spread_threshold
    }

    /// Constructor parameter, stored but not consulted by the opportunity
    /// rule, which fires fixed-size pairs.
    pub fn order_size(&self) -> u32 {
        self.order_size
    }

    /// Fire paired limit orders when either cross exceeds the floor.
    /// Requires a full set of quotes on both instruments.
    fn check_opportunity(&self, state: &PairState) -> Vec<Order> {
        let (Some(&ask1), Some(&bid1), Some(&ask2), Some(&bid2)) = (
            state.best_ask.get(&self.symbol1),
            state.best_bid.get(&self.symbol1),
            state.best_ask.get(&self.symbol2),
            state.best_bid.get(&self.symbol2),
        ) else {
            return Vec::new();
        };

        let now = now_micros();
        let mut pending = Vec::new();

        if bid2 - ask1 > OPPORTUNITY_THRESHOLD {
            info!(
                buy = %self.symbol1, buy_at = %ask1,
                sell = %self.symbol2, sell_at = %bid2,
                "arbitrage opportunity"
            );
            pending.push(Order::limit(&self.symbol1, Side::Buy, ask1, PAIR_ORDER_QTY, now));
            pending.push(Order::limit(&self.symbol2, Side::Sell, bid2, PAIR_ORDER_QTY, now));
        }

        if bid1 - ask2 > OPPORTUNITY_THRESHOLD {
            info!(
                buy = %self.symbol2, buy_at = %ask2,
                sell = %self.symbol1, sell_at = %bid1,
                "arbitrage opportunity"
            );
            pending.push(Order::limit(&self.symbol2, Side::Buy, ask2, PAIR_ORDER_QTY, now));
            pending.push(Order::limit(&self.symbol1, Side::Sell, bid1, PAIR_ORDER_QTY, now));
        }

        pending
    }
}

impl Strategy for ArbitrageTrader {
    fn start(&self) {
        if self.running.swap(true, Ordering::AcqRel) {
            warn!("ArbitrageTrader already running");
            return;
        }
        info!(
            symbol1 = %self.symbol1,
            symbol2 = %self.symbol2,
            "started arbitrage pair"
        );
        let header = format!(
            "trade_id,instrument,price,quantity,pnl,position_{},position_{},total_pnl,risk_breached,timestamp",
            self.symbol1, self.symbol2
        );
        *self.trade_log.lock() =
            CsvSink::create_or_warn(self.log_dir.join("arbitrage_trades.csv"), &header);
    }

    fn stop(&self) {
        self.running.store(false, Ordering::Release);
        *self.trade_log.lock() = None;
        info!("ArbitrageTrader stopped");
    }

    fn on_market_data(&self, order: &Order) {
        if !self.running.load(Ordering::Acquire) {
            return;
        }

        let pending = {
            let mut state = self.state.lock();
            match order.side {
                Side::Buy => {
                    let best = state
                        .best_bid
                        .entry(order.instrument.clone())
                        .or_insert(order.price);
                    *best = (*best).max(order.price);
                }
                Side::Sell => {
                    let best = state
                        .best_ask
                        .entry(order.instrument.clone())
                        .or_insert(order.price);
                    *best = (*best).min(order.price);
                }
            }
            self.check_opportunity(&state)
        };

        // Submissions go out after the state lock is dropped: a leg that
        // crosses immediately re-enters `on_trade` on this same thread.
        for order in pending {
            (self.submit)(order);
        }
    }

    fn on_trade(&self, trade: &Trade) {
        if !self.running.load(Ordering::Acquire) {
            return;
        }
        if trade.instrument != self.symbol1 && trade.instrument != self.symbol2 {
            return;
        }

        let qty: i64 = if trade.side == Side::Buy {
            i64::from(trade.quantity)
        } else {
            -i64::from(trade.quantity)
        };
        let delta = Decimal::from(qty) * trade.price;

        let (position1, position2) = {
            let mut state = self.state.lock();
            *state.positions.entry(trade.instrument.clone()).or_insert(0) += qty;
            (
                state.positions.get(&self.symbol1).copied().unwrap_or(0),
                state.positions.get(&self.symbol2).copied().unwrap_or(0),
            )
        };

        let realized = self.tracker.apply_pnl(delta);
        self.tracker.record_trade();
        self.tracker.add_quantity(trade.quantity);

        if realized < self.max_loss {
            warn!(pnl = %realized, "max loss breached, stopping strategy");
            self.tracker.latch_risk();
            self.stop();
        }

        info!(
            trade_id = trade.trade_id,
            instrument = %trade.instrument,
            price = %trade.price,
            quantity = trade.quantity,
            pnl = %delta,
            position1,
            position2,
            total_pnl = %realized,
            "trade received"
        );

        // After a risk stop the sink is gone and the breaching trade is
        // not logged.
        if let Some(sink) = self.trade_log.lock().as_ref() {
            sink.write_row(format!(
                "{},{},{},{},{},{},{},{},{},{}",
                trade.trade_id,
                trade.instrument,
                trade.price,
                trade.quantity,
                delta,
                position1,
                position2,
                realized,
                self.tracker.risk_violated(),
                trade.timestamp
            ));
        }
    }

    fn name(&self) -> &str {
        "ArbitrageTrader"
    }

    fn print_summary(&self) {
        info!("=== ArbitrageTrader summary ===");
        info!("realized PnL: {}", self.realized_pnl());
        info!("position [{}]: {}", self.symbol1, self.position(&self.symbol1));
        info!("position [{}]: {}", self.symbol2, self.position(&self.symbol2));
        info!("total trades: {}", self.total_trades());
        info!("average trade size: {}", self.average_trade_size());
        info!("max drawdown: {}", self.max_drawdown());
        info!("risk breached: {}", if self.risk_violated() { "yes" } else { "no" });
    }

    fn export_summary(&self, path: &Path) -> Result<()> {
        write_summary_json(
            path,
            vec![
                ("strategy".to_string(), json!("arbitrage")),
                (
                    "pnl".to_string(),
                    json!(self.realized_pnl().to_f64().unwrap_or(0.0)),
                ),
                (
                    format!("position_{}", self.symbol1),
                    json!(self.position(&self.symbol1)),
                ),
                (
                    format!("position_{}", self.symbol2),
                    json!(self.position(&self.symbol2)),
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
        self.tracker.total_trades()
    }

    fn average_trade_size(&self) -> Decimal {
        self.tracker.average_trade_size()
    }

    fn max_drawdown(&self) -> Decimal {
        self.tracker.max_drawdown()
    }

    fn risk_violated(&self) -> bool {
        self.tracker.risk_violated()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{trade, SubmittedOrders};

    fn pair(max_loss: Decimal) -> (ArbitrageTrader, SubmittedOrders) {
        let submitted = SubmittedOrders::new();
        let trader = ArbitrageTrader::new(
            "ETH-USD",
            "BTC-USD",
            submitted.callback(),
            dec!(0.03),
            15,
            max_loss,
        );
        (trader, submitted)
    }

    fn quote(instrument: &str, side: Side, price: Decimal) -> Order {
        Order::limit(instrument, side, price, 1, 1_000)
    }

    #[test]
    fn accumulated_losses_latch_the_risk_flag() {
        let (trader, _submitted) = pair(dec!(-100.0));
        trader.start();

        // Two sells: -50 then -400 push realized PnL to -450.
        trader.on_trade(&trade(1, 100, 101, "ETH-USD", dec!(50.0), 1, Side::Sell));
        assert!(!trader.risk_violated());
        trader.on_trade(&trade(2, 102, 103, "ETH-USD", dec!(200.0), 2, Side::Sell));

        assert!(trader.risk_violated());
        assert_eq!(trader.realized_pnl(), dec!(-450.0));
    }

    #[test]
    fn positions_and_pnl_follow_the_trade_side() {
        let (trader, _submitted) = pair(dec!(-1000.0));
        trader.start();

        trader.on_trade(&trade(1, 1, 2, "ETH-USD", dec!(100.0), 2, Side::Sell));
        trader.on_trade(&trade(2, 3, 4, "BTC-USD", dec!(101.0), 2, Side::Buy));
        trader.stop();

        assert_eq!(trader.position("ETH-USD"), -2);
        assert_eq!(trader.position("BTC-USD"), 2);
        assert_eq!(trader.realized_pnl(), dec!(2.0));
    }

    #[test]
    fn unrelated_instruments_leave_state_untouched() {
        let (trader, _submitted) = pair(dec!(-1000.0));
        trader.start();

        trader.on_trade(&trade(1, 1, 2, "DOGE-USD", dec!(10.0), 1, Side::Buy));
        trader.stop();

        assert_eq!(trader.position("ETH-USD"), 0);
        assert_eq!(trader.position("BTC-USD"), 0);
        assert_eq!(trader.realized_pnl(), Decimal::ZERO);
        assert_eq!(trader.total_trades(), 0);
    }

    #[test]
    fn wide_cross_spread_fires_a_pair() {
        let (trader, submitted) = pair(dec!(-1000.0));
        trader.start();

        // Build both quote sets; symbol2's bid clears symbol1's ask by 0.10.
        trader.on_market_data(&quote("ETH-USD", Side::Buy, dec!(99.95)));
        trader.on_market_data(&quote("ETH-USD", Side::Sell, dec!(100.00)));
        trader.on_market_data(&quote("BTC-USD", Side::Sell, dec!(100.20)));
        assert!(submitted.is_empty());
        trader.on_market_data(&quote("BTC-USD", Side::Buy, dec!(100.10)));

        let orders = submitted.take();
        assert_eq!(orders.len(), 2);
        let buy = &orders[0];
        let sell = &orders[1];
        assert_eq!(buy.instrument, "ETH-USD");
        assert_eq!(buy.side, Side::Buy);
        assert_eq!(buy.price, dec!(100.00));
        assert_eq!(buy.quantity, PAIR_ORDER_QTY);
        assert_eq!(sell.instrument, "BTC-USD");
        assert_eq!(sell.side, Side::Sell);
        assert_eq!(sell.price, dec!(100.10));
    }

    #[test]
    fn narrow_cross_spread_stays_quiet() {
        let (trader, submitted) = pair(dec!(-1000.0));
        trader.start();

        // Cross of exactly 0.05 does not clear the strict threshold.
        trader.on_market_data(&quote("ETH-USD", Side::Buy, dec!(99.95)));
        trader.on_market_data(&quote("ETH-USD", Side::Sell, dec!(100.00)));
        trader.on_market_data(&quote("BTC-USD", Side::Sell, dec!(100.20)));
        trader.on_market_data(&quote("BTC-USD", Side::Buy, dec!(100.05)));

        assert!(submitted.is_empty());
    }

    #[test]
    fn quotes_track_extremes_per_instrument() {
        let (trader, _submitted) = pair(dec!(-1000.0));
        trader.start();

        trader.on_market_data(&quote("ETH-USD", Side::Buy, dec!(99.0)));
        trader.on_market_data(&quote("ETH-USD", Side::Buy, dec!(98.0)));
        trader.on_market_data(&quote("ETH-USD", Side::Sell, dec!(101.0)));
        trader.on_market_data(&quote("ETH-USD", Side::Sell, dec!(102.0)));

        let state = trader.state.lock();
        assert_eq!(state.best_bid["ETH-USD"], dec!(99.0));
        assert_eq!(state.best_ask["ETH-USD"], dec!(101.0));
    }

    #[test]
    fn market_data_is_ignored_while_stopped() {
        let (trader, submitted) = pair(dec!(-1000.0));

        trader.on_market_data(&quote("ETH-USD", Side::Buy, dec!(99.95)));
        trader.on_market_data(&quote("ETH-USD", Side::Sell, dec!(100.00)));
        trader.on_market_data(&quote("BTC-USD", Side::Sell, dec!(100.20)));
        trader.on_market_data(&quote("BTC-USD", Side::Buy, dec!(100.50)));

        assert!(submitted.is_empty());
        assert!(trader.state.lock().best_bid.is_empty());
    }

    #[test]
    fn constructor_parameters_are_exposed_but_inert() {
        let (trader, submitted) = pair(dec!(-1000.0));
        trader.start();
        assert_eq!(trader.spread_threshold(), dec!(0.03));
        assert_eq!(trader.order_size(), 15);

        // A cross of 0.04 would clear the 0.03 constructor threshold but
        // not the hard 0.05 floor actually applied.
        trader.on_market_data(&quote("ETH-USD", Side::Buy, dec!(99.95)));
        trader.on_market_data(&quote("ETH-USD", Side::Sell, dec!(100.00)));
        trader.on_market_data(&quote("BTC-USD", Side::Sell, dec!(100.20)));
        trader.on_market_data(&quote("BTC-USD", Side::Buy, dec!(100.04)));

        assert!(submitted.is_empty());
    }
}
