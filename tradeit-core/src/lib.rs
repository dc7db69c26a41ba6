//! tradeit-core - deterministic matching and execution pipeline for the
//! tradeit simulator.
//!
//! Drives one or more strategies against per-instrument central limit
//! order books fed from a replay of historical tick data, with no live
//! venue anywhere in the loop.
//!
//! ## Data flow
//!
//! ```text
//! tick CSV ──▶ MarketFeed ──▶ Simulator::on_order ──▶ OrderBook::add_order
//!                                   │                        │
//!                                   │                   0..n Trade
//!                                   ▼                        │
//!                         Strategy::on_market_data           ▼
//!                                              Strategy::on_trade (fan-out)
//!                                   ▲                        │
//!                                   └── submit callback ◀────┘
//!                                       (strategy workers)
//! ```
//!
//! Matching is price-time priority: levels are price-ordered, and orders
//! within a level fill FIFO by arrival. The trade price is always the
//! resting order's limit price. The router lock serializes the entire
//! match-and-fan-out pipeline, which keeps trade delivery ordered and the
//! model observable at the cost of parallel matching (a deliberate
//! simplicity/safety tradeoff).
//!
//! ## Modules
//!
//! - [`core`] - `Order` / `Trade` value types and the order id allocator
//! - [`engine`] - [`OrderBook`] matching and the [`Simulator`] router
//! - [`data`] - the [`MarketFeed`] CSV replayer
//! - [`strategy`] - the [`Strategy`] capability and shared `PerfTracker`
//! - [`reporting`] - CSV report sinks and the JSON summary writer
//! - [`config`] - `config.json` loading
//! - [`utils`] - logging bootstrap, clock helpers
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tradeit_core::prelude::*;
//!
//! let simulator = Arc::new(Simulator::new());
//! let book = simulator.book("ETH-USD");
//! let submit = simulator.submitter();
//! // register strategies, then:
//! simulator.start();
//! let mut feed = MarketFeed::new("data/ticks.csv");
//! let sim = Arc::clone(&simulator);
//! feed.start(Arc::new(move |order| sim.on_order(order)));
//! ```

pub mod config;
pub mod core;
pub mod data;
pub mod engine;
pub mod reporting;
pub mod strategy;
pub mod utils;

pub use crate::core::{next_order_id, Order, OrderType, Side, Trade};
pub use config::Config;
pub use data::{MarketFeed, OrderCallback};
pub use engine::{OrderBook, Simulator, TradeSink};
pub use strategy::{PerfTracker, Strategy, SubmitOrder};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::core::{next_order_id, Order, OrderType, Side, Trade};
    pub use crate::data::{MarketFeed, OrderCallback};
    pub use crate::engine::{OrderBook, Simulator, TradeSink};
    pub use crate::reporting::{write_summary_json, CsvSink};
    pub use crate::strategy::{PerfTracker, Strategy, SubmitOrder};
    pub use crate::utils::{init_logger, now_micros};
}
