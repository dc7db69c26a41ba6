//! Market data ingestion.

pub mod feed;

pub use feed::{MarketFeed, OrderCallback};
