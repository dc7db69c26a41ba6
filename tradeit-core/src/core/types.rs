use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide order id allocator. Starts at 1 and never repeats.
static NEXT_ORDER_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate a fresh order id.
///
/// Ids are unique and monotonically increasing across every producer in
/// the process (feed rows, strategy quotes, test fixtures).
#[inline]
pub fn next_order_id() -> u64 {
    NEXT_ORDER_ID.fetch_add(1, Ordering::Relaxed)
}

/// Order side (Buy or Sell)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Order type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    /// Limit order with a specified price
    Limit,
    /// Market order (executes against the best available price)
    Market,
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderType::Limit => write!(f, "LIMIT"),
            OrderType::Market => write!(f, "MARKET"),
        }
    }
}

/// An order submitted into the simulator.
///
/// Once resting in a book, `instrument`, `side`, and `price` never change;
/// only the remaining `quantity` decreases as fills occur.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: u64,
    pub instrument: String,
    pub order_type: OrderType,
    pub side: Side,
    /// Price per unit. Ignored by the matching engine for market orders,
    /// but preserved from the feed so strategies can observe it.
    pub price: Decimal,
    pub quantity: u32,
    /// Microseconds since the Unix epoch, stamped by the producer.
    pub timestamp: u64,
}

impl Order {
    /// Create an order with a freshly allocated id.
    pub fn new(
        instrument: impl Into<String>,
        order_type: OrderType,
        side: Side,
        price: Decimal,
        quantity: u32,
        timestamp: u64,
    ) -> Self {
        Self::with_id(next_order_id(), instrument, order_type, side, price, quantity, timestamp)
    }

    /// Create an order with a caller-chosen id.
    ///
    /// Used by strategies that track their own quote ids and by tests that
    /// need deterministic ids.
    pub fn with_id(
        id: u64,
        instrument: impl Into<String>,
        order_type: OrderType,
        side: Side,
        price: Decimal,
        quantity: u32,
        timestamp: u64,
    ) -> Self {
        Self {
            id,
            instrument: instrument.into(),
            order_type,
            side,
            price,
            quantity,
            timestamp,
        }
    }

    /// Convenience constructor for a limit order with a fresh id.
    pub fn limit(
        instrument: impl Into<String>,
        side: Side,
        price: Decimal,
        quantity: u32,
        timestamp: u64,
    ) -> Self {
        Self::new(instrument, OrderType::Limit, side, price, quantity, timestamp)
    }
}

/// A completed match between a buy and a sell order.
///
/// `side` is the aggressor's side; `price` is always the resting order's
/// limit price. Trade ids are monotonic within a single book, starting
/// at 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub trade_id: u64,
    pub buy_order_id: u64,
    pub sell_order_id: u64,
    pub instrument: String,
    pub price: Decimal,
    pub quantity: u32,
    /// The aggressor's timestamp (microseconds since epoch).
    pub timestamp: u64,
    pub side: Side,
}

impl Trade {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        trade_id: u64,
        buy_order_id: u64,
        sell_order_id: u64,
        instrument: impl Into<String>,
        price: Decimal,
        quantity: u32,
        timestamp: u64,
        side: Side,
    ) -> Self {
        Self {
            trade_id,
            buy_order_id,
            sell_order_id,
            instrument: instrument.into(),
            price,
            quantity,
            timestamp,
            side,
        }
    }

    /// Notional value of the trade (price * quantity).
    pub fn notional(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }
}
