//! Matching and routing: the order book and the simulator that drives it.

pub mod order_book;
pub mod simulator;

pub use order_book::{OrderBook, TradeSink};
pub use simulator::Simulator;
