//! End-to-end order book scenarios.

use parking_lot::Mutex;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tradeit_core::{next_order_id, Order, OrderBook, OrderType, Side, Trade};

fn collect_trades(book: &OrderBook) -> Arc<Mutex<Vec<Trade>>> {
    let trades: Arc<Mutex<Vec<Trade>>> = Arc::new(Mutex::new(Vec::new()));
    let sink_trades = Arc::clone(&trades);
    book.set_trade_sink(Arc::new(move |t: &Trade| {
        sink_trades.lock().push(t.clone());
    }));
    trades
}

#[test]
fn simple_crossing_limit_orders() {
    let book = OrderBook::new("ETH-USD");
    let trades = collect_trades(&book);

    // Resting sell liquidity, then a crossing buy.
    book.add_order(Order::with_id(
        1, "ETH-USD", OrderType::Limit, Side::Sell, dec!(100.0), 2, 1_000_000,
    ));
    let returned = book.add_order(Order::with_id(
        2, "ETH-USD", OrderType::Limit, Side::Buy, dec!(101.0), 1, 1_000_100,
    ));

    assert_eq!(returned.len(), 1);
    let seen = trades.lock();
    assert_eq!(seen.len(), 1);
    let trade = &seen[0];
    assert_eq!(trade.price, dec!(100.0));
    assert_eq!(trade.quantity, 1);
    assert_eq!(trade.instrument, "ETH-USD");
    assert_eq!(trade.buy_order_id, 2);
    assert_eq!(trade.sell_order_id, 1);
    assert_eq!(trade.side, Side::Buy);
    assert_eq!(trade.timestamp, 1_000_100);

    // Remaining sell quantity is still on the book.
    let best_ask = book.best_ask().expect("ask survives partial fill");
    assert_eq!(best_ask.price, dec!(100.0));
    assert_eq!(best_ask.quantity, 1);
}

#[test]
fn non_crossing_orders_rest_quietly() {
    let book = OrderBook::new("BTC-USD");
    let trades = collect_trades(&book);

    book.add_order(Order::with_id(
        1, "BTC-USD", OrderType::Limit, Side::Buy, dec!(29900.0), 1, 123,
    ));
    book.add_order(Order::with_id(
        2, "BTC-USD", OrderType::Limit, Side::Sell, dec!(30100.0), 1, 124,
    ));

    assert!(trades.lock().is_empty());
    let bid = book.best_bid().unwrap();
    let ask = book.best_ask().unwrap();
    assert!(bid.price < ask.price);
}

#[test]
fn market_order_sweeps_resting_liquidity() {
    let book = OrderBook::new("ETH-USD");
    let trades = collect_trades(&book);

    book.add_order(Order::with_id(
        1, "ETH-USD", OrderType::Limit, Side::Sell, dec!(200.0), 2, 2_000_000,
    ));
    book.add_order(Order::with_id(
        2, "ETH-USD", OrderType::Market, Side::Buy, dec!(0), 2, 2_000_010,
    ));

    let seen = trades.lock();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].price, dec!(200.0));
    assert_eq!(seen[0].quantity, 2);
    assert!(book.best_ask().is_none());
}

#[test]
fn sell_aggressor_walks_bids_highest_first() {
    let book = OrderBook::new("ETH-USD");
    book.add_order(Order::with_id(
        1, "ETH-USD", OrderType::Limit, Side::Buy, dec!(99.0), 1, 10,
    ));
    book.add_order(Order::with_id(
        2, "ETH-USD", OrderType::Limit, Side::Buy, dec!(100.0), 1, 11,
    ));

    let trades = book.add_order(Order::with_id(
        3, "ETH-USD", OrderType::Limit, Side::Sell, dec!(99.0), 2, 12,
    ));

    assert_eq!(trades.len(), 2);
    // Best (highest) bid fills first, at the resting price each time.
    assert_eq!(trades[0].price, dec!(100.0));
    assert_eq!(trades[0].buy_order_id, 2);
    assert_eq!(trades[0].side, Side::Sell);
    assert_eq!(trades[1].price, dec!(99.0));
    assert_eq!(trades[1].buy_order_id, 1);
    assert!(book.best_bid().is_none());
}

#[test]
fn cancellation_updates_best_quotes() {
    let book = OrderBook::new("ETH-USD");
    book.add_order(Order::with_id(
        1, "ETH-USD", OrderType::Limit, Side::Sell, dec!(101.0), 1, 1,
    ));
    book.add_order(Order::with_id(
        2, "ETH-USD", OrderType::Limit, Side::Sell, dec!(102.0), 1, 2,
    ));

    assert_eq!(book.best_ask().unwrap().id, 1);
    assert!(book.cancel_order(1));
    assert_eq!(book.best_ask().unwrap().id, 2);
    assert!(!book.orders().contains_key(&1));
}

#[test]
fn trades_against_allocated_ids_round_trip() {
    // The same flow a feed would produce: fresh ids everywhere.
    let book = OrderBook::new("ETH-USD");
    let sell = Order::limit("ETH-USD", Side::Sell, dec!(50.0), 3, 500);
    let sell_id = sell.id;
    book.add_order(sell);

    let buy = Order::with_id(next_order_id(), "ETH-USD", OrderType::Limit, Side::Buy, dec!(50.0), 3, 501);
    let buy_id = buy.id;
    let trades = book.add_order(buy);

    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].buy_order_id, buy_id);
    assert_eq!(trades[0].sell_order_id, sell_id);
    assert!(book.orders().is_empty());
}
