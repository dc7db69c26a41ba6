//! Central limit order book with price-time priority matching.
//!
//! One book per instrument. Resting liquidity lives in per-price FIFO
//! queues; an incoming market order, or a limit order that crosses the
//! opposite side, is matched immediately and the resulting trades are
//! emitted through the registered sink in generation order.
//!
//! Level queues hold order *ids*; the id index holds the canonical
//! resting order. An id is present in exactly one level queue iff it is
//! present in the index, so the book can never disagree with itself about
//! what is resting.

use crate::core::{Order, OrderType, Side, Trade};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, trace};

/// Callback invoked once per emitted trade, in generation order.
pub type TradeSink = Arc<dyn Fn(&Trade) + Send + Sync>;

/// One side's depth entry: price level and resting order count.
pub type DepthLevel = (Decimal, usize);

struct BookInner {
    /// Buy side, keyed by price. Best bid is the *last* key.
    bids: BTreeMap<Decimal, VecDeque<u64>>,
    /// Sell side, keyed by price. Best ask is the *first* key.
    asks: BTreeMap<Decimal, VecDeque<u64>>,
    /// Canonical resting orders by id.
    orders: HashMap<u64, Order>,
    next_trade_id: u64,
    trade_sink: Option<TradeSink>,
}

/// Price-time priority order book for a single instrument.
pub struct OrderBook {
    instrument: String,
    inner: Mutex<BookInner>,
}

impl OrderBook {
    pub fn new(instrument: impl Into<String>) -> Self {
        Self {
            instrument: instrument.into(),
            inner: Mutex::new(BookInner {
                bids: BTreeMap::new(),
                asks: BTreeMap::new(),
                orders: HashMap::new(),
                next_trade_id: 1,
                trade_sink: None,
            }),
        }
    }

    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    /// Register the trade sink. Replaces any previous sink.
    pub fn set_trade_sink(&self, sink: TradeSink) {
        self.inner.lock().trade_sink = Some(sink);
    }

    /// Add an order to the book, matching it against resting liquidity if
    /// it is a market order or a crossing limit order.
    ///
    /// Returns the trades produced, in generation order. Residual limit
    /// quantity after a partial aggressive match is rested at the limit
    /// price; unfilled market remainder is discarded. The trade sink runs
    /// after the book lock is released, so a sink may call back into the
    /// book.
    pub fn add_order(&self, order: Order) -> Vec<Trade> {
        let (trades, sink) = {
            let mut inner = self.inner.lock();

            let crosses = match order.side {
                Side::Buy => inner
                    .asks
                    .first_key_value()
                    .is_some_and(|(best, _)| order.price >= *best),
                Side::Sell => inner
                    .bids
                    .last_key_value()
                    .is_some_and(|(best, _)| order.price <= *best),
            };

            if order.order_type == OrderType::Market || crosses {
                let trades = inner.match_order(&self.instrument, &order);
                let sink = inner.trade_sink.clone();
                (trades, sink)
            } else {
                inner.insert_resting(order);
                return Vec::new();
            }
        };

        if let Some(sink) = sink {
            for trade in &trades {
                sink(trade);
            }
        }

        trades
    }

    /// Cancel a resting order by id.
    ///
    /// Returns `true` iff the order was found. Cancelling an unknown id is
    /// a no-op.
    pub fn cancel_order(&self, order_id: u64) -> bool {
        let mut inner = self.inner.lock();

        let Some(order) = inner.orders.remove(&order_id) else {
            trace!(instrument = %self.instrument, order_id, "cancel of unknown order");
            return false;
        };

        let levels = match order.side {
            Side::Buy => &mut inner.bids,
            Side::Sell => &mut inner.asks,
        };
        if let Some(queue) = levels.get_mut(&order.price) {
            queue.retain(|&id| id != order_id);
            if queue.is_empty() {
                levels.remove(&order.price);
            }
        }

        debug!(instrument = %self.instrument, order_id, "order cancelled");
        true
    }

    /// Snapshot of the head-of-book order on the buy side, if any.
    pub fn best_bid(&self) -> Option<Order> {
        let inner = self.inner.lock();
        inner
            .bids
            .last_key_value()
            .and_then(|(_, queue)| queue.front())
            .and_then(|id| inner.orders.get(id))
            .cloned()
    }

    /// Snapshot of the head-of-book order on the sell side, if any.
    pub fn best_ask(&self) -> Option<Order> {
        let inner = self.inner.lock();
        inner
            .asks
            .first_key_value()
            .and_then(|(_, queue)| queue.front())
            .and_then(|id| inner.orders.get(id))
            .cloned()
    }

    /// Snapshot of every resting order, keyed by id.
    pub fn orders(&self) -> HashMap<u64, Order> {
        self.inner.lock().orders.clone()
    }

    /// Per-side depth: `(price, resting order count)` with bids sorted
    /// best-first (descending) and asks best-first (ascending).
    pub fn depth(&self) -> (Vec<DepthLevel>, Vec<DepthLevel>) {
        let inner = self.inner.lock();
        let bids = inner
            .bids
            .iter()
            .rev()
            .map(|(price, queue)| (*price, queue.len()))
            .collect();
        let asks = inner
            .asks
            .iter()
            .map(|(price, queue)| (*price, queue.len()))
            .collect();
        (bids, asks)
    }
}

impl BookInner {
    fn insert_resting(&mut self, order: Order) {
        debug!(
            order_id = order.id,
            side = %order.side,
            price = %order.price,
            quantity = order.quantity,
            "resting order added"
        );
        let levels = match order.side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        };
        levels.entry(order.price).or_default().push_back(order.id);
        self.orders.insert(order.id, order);
    }

    /// Match an aggressive order against the opposite side.
    ///
    /// The aggressor's remaining quantity is tracked locally; the input
    /// order is never mutated. Limit aggressors stop at their limit price
    /// and any residual is rested; market residual is discarded.
    fn match_order(&mut self, instrument: &str, order: &Order) -> Vec<Trade> {
        let mut trades = Vec::new();
        let mut remaining = order.quantity;

        match order.side {
            Side::Buy => {
                while remaining > 0 {
                    let Some(mut level) = self.asks.first_entry() else {
                        break;
                    };
                    let level_price = *level.key();
                    if order.order_type == OrderType::Limit && order.price < level_price {
                        break;
                    }

                    let queue = level.get_mut();
                    while remaining > 0 {
                        let Some(&resting_id) = queue.front() else {
                            break;
                        };
                        let resting = self
                            .orders
                            .get_mut(&resting_id)
                            .expect("resting id present in level queue but not in index");
                        let traded = remaining.min(resting.quantity);

                        trades.push(Trade::new(
                            self.next_trade_id,
                            order.id,
                            resting_id,
                            instrument,
                            level_price,
                            traded,
                            order.timestamp,
                            Side::Buy,
                        ));
                        self.next_trade_id += 1;

                        resting.quantity -= traded;
                        remaining -= traded;
                        if resting.quantity == 0 {
                            queue.pop_front();
                            self.orders.remove(&resting_id);
                        }
                    }

                    if level.get().is_empty() {
                        level.remove();
                    }
                }
            }
            Side::Sell => {
                while remaining > 0 {
                    let Some(mut level) = self.bids.last_entry() else {
                        break;
                    };
                    let level_price = *level.key();
                    if order.order_type == OrderType::Limit && order.price > level_price {
                        break;
                    }

                    let queue = level.get_mut();
                    while remaining > 0 {
                        let Some(&resting_id) = queue.front() else {
                            break;
                        };
                        let resting = self
                            .orders
                            .get_mut(&resting_id)
                            .expect("resting id present in level queue but not in index");
                        let traded = remaining.min(resting.quantity);

                        trades.push(Trade::new(
                            self.next_trade_id,
                            resting_id,
                            order.id,
                            instrument,
                            level_price,
                            traded,
                            order.timestamp,
                            Side::Sell,
                        ));
                        self.next_trade_id += 1;

                        resting.quantity -= traded;
                        remaining -= traded;
                        if resting.quantity == 0 {
                            queue.pop_front();
                            self.orders.remove(&resting_id);
                        }
                    }

                    if level.get().is_empty() {
                        level.remove();
                    }
                }
            }
        }

        for trade in &trades {
            debug!(
                trade_id = trade.trade_id,
                buy_order_id = trade.buy_order_id,
                sell_order_id = trade.sell_order_id,
                price = %trade.price,
                quantity = trade.quantity,
                "trade executed"
            );
        }

        if remaining > 0 {
            match order.order_type {
                OrderType::Limit => {
                    let mut residual = order.clone();
                    residual.quantity = remaining;
                    self.insert_resting(residual);
                }
                OrderType::Market => {
                    debug!(
                        order_id = order.id,
                        unfilled = remaining,
                        "market order remainder discarded"
                    );
                }
            }
        }

        trades
    }
}
