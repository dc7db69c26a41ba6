//! tradeit-strategies - concrete strategies for the tradeit simulator.
//!
//! Three strategies share the [`Strategy`](tradeit_core::Strategy)
//! capability:
//!
//! - [`MarketMaker`] - quotes a bid and an ask around the mid-price on a
//!   500 ms refresh cycle, bounded by inventory and loss limits.
//! - [`MomentumTrader`] - fires a market order in the direction of a
//!   short-window price signal, rate-limited to one action per second.
//! - [`ArbitrageTrader`] - watches two instruments and fires paired limit
//!   orders when the cross-spread clears a hard threshold.
//!
//! Each strategy owns its report sinks and latches a one-way risk flag
//! when its loss (or, for the market maker, inventory) limit is breached;
//! a latched strategy stops itself while the rest of the simulator keeps
//! running.

pub mod arbitrage;
pub mod market_maker;
pub mod momentum;
pub mod test_helpers;

pub use arbitrage::ArbitrageTrader;
pub use market_maker::MarketMaker;
pub use momentum::MomentumTrader;
