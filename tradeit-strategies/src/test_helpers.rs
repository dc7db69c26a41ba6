//! Shared fixtures for strategy tests.

use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::sync::Arc;
use tradeit_core::{Order, Side, SubmitOrder, Trade};

/// Records every order a strategy submits.
#[derive(Clone, Default)]
pub struct SubmittedOrders {
    orders: Arc<Mutex<Vec<Order>>>,
}

impl SubmittedOrders {
    pub fn new() -> Self {
        Self::default()
    }

    /// A submit callback that appends into this recorder.
    pub fn callback(&self) -> SubmitOrder {
        let orders = Arc::clone(&self.orders);
        Arc::new(move |order: Order| orders.lock().push(order))
    }

    pub fn take(&self) -> Vec<Order> {
        std::mem::take(&mut *self.orders.lock())
    }

    pub fn snapshot(&self) -> Vec<Order> {
        self.orders.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.orders.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.lock().is_empty()
    }
}

/// A trade with explicit ids, the way the matching engine would emit it.
pub fn trade(
    trade_id: u64,
    buy_order_id: u64,
    sell_order_id: u64,
    instrument: &str,
    price: Decimal,
    quantity: u32,
    side: Side,
) -> Trade {
    Trade::new(
        trade_id,
        buy_order_id,
        sell_order_id,
        instrument,
        price,
        quantity,
        123_456,
        side,
    )
}
