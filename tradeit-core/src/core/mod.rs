//! Core value types flowing through the simulator.
//!
//! Everything in here is an immutable record once constructed: orders are
//! stamped with a process-wide monotonic id at creation and trades are
//! produced only by the matching engine.

pub mod types;

pub use types::{next_order_id, Order, OrderType, Side, Trade};
