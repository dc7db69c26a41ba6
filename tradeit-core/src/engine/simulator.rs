//! Central router: one order book per instrument, fan-out of trades to
//! every registered strategy.

use crate::core::Order;
use crate::engine::order_book::OrderBook;
use crate::strategy::{Strategy, SubmitOrder};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

struct SimulatorInner {
    books: HashMap<String, Arc<OrderBook>>,
    strategies: Vec<Arc<dyn Strategy>>,
}

/// Routes every incoming order into the book for its instrument and
/// forwards every resulting trade to every registered strategy.
///
/// `on_order` holds the router lock across book lookup, matching, and
/// trade fan-out, so strategies observe trades in exactly the order the
/// book emitted them and a strategy's `on_trade` is never invoked
/// concurrently with itself from router dispatch. The contract on
/// strategies is that `on_trade` never calls back into `on_order`
/// synchronously; submissions happen from worker loops or after the
/// strategy has released its own locks.
pub struct Simulator {
    inner: Mutex<SimulatorInner>,
}

impl Simulator {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(SimulatorInner {
                books: HashMap::new(),
                strategies: Vec::new(),
            }),
        }
    }

    /// Register a strategy. Strategies receive trades in registration
    /// order.
    pub fn register_strategy(&self, strategy: Arc<dyn Strategy>) {
        debug!(strategy = strategy.name(), "strategy registered");
        self.inner.lock().strategies.push(strategy);
    }

    /// The shared book for `instrument`, created on first sight.
    ///
    /// This is the same book `on_order` routes into, so a strategy holding
    /// the handle observes live top-of-book state.
    pub fn book(&self, instrument: &str) -> Arc<OrderBook> {
        let mut inner = self.inner.lock();
        Arc::clone(
            inner
                .books
                .entry(instrument.to_string())
                .or_insert_with(|| Arc::new(OrderBook::new(instrument))),
        )
    }

    /// Route an order into its book and fan out any resulting trades.
    ///
    /// Safe to call from any thread; the whole pipeline is serialized by
    /// the router lock.
    pub fn on_order(&self, order: Order) {
        let mut inner = self.inner.lock();
        let book = Arc::clone(
            inner
                .books
                .entry(order.instrument.clone())
                .or_insert_with(|| Arc::new(OrderBook::new(order.instrument.clone()))),
        );

        let trades = book.add_order(order);
        for trade in &trades {
            for strategy in &inner.strategies {
                strategy.on_trade(trade);
            }
        }
    }

    /// Start every registered strategy, in registration order.
    pub fn start(&self) {
        for strategy in self.strategy_handles() {
            strategy.start();
        }
    }

    /// Stop every registered strategy, in registration order.
    pub fn stop(&self) {
        for strategy in self.strategy_handles() {
            strategy.stop();
        }
    }

    /// A submit callback wired to `on_order`, for handing to strategies.
    pub fn submitter(self: &Arc<Self>) -> SubmitOrder {
        let simulator = Arc::clone(self);
        Arc::new(move |order: Order| simulator.on_order(order))
    }

    // Strategy lifecycle calls run outside the router lock: `stop` joins
    // worker threads that may themselves be blocked on `on_order`.
    fn strategy_handles(&self) -> Vec<Arc<dyn Strategy>> {
        self.inner.lock().strategies.clone()
    }
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new()
    }
}
