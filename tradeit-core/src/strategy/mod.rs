//! The strategy capability and the performance tracker shared by every
//! concrete strategy.
//!
//! Strategies are registered with the [`Simulator`](crate::engine::Simulator)
//! as trait objects and are driven from three directions at once: their own
//! worker thread, the feed thread delivering `on_market_data`, and the
//! router thread delivering `on_trade`. All methods therefore take `&self`
//! and implementations guard their state internally.

use crate::core::{Order, Trade};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Callback a strategy uses to submit an order back into the simulator.
pub type SubmitOrder = Arc<dyn Fn(Order) + Send + Sync>;

/// The capability every trading strategy exposes to the simulator.
///
/// `start` spawns the strategy's worker (if it has one) and opens its
/// report sinks; `stop` clears the running flag, joins the worker, and
/// closes the sinks. `start`/`stop` pair exactly once per lifetime;
/// calling them out of order must not corrupt state.
pub trait Strategy: Send + Sync {
    fn start(&self);
    fn stop(&self);

    /// A market data tick: an order observed on the feed.
    fn on_market_data(&self, order: &Order);

    /// A trade executed somewhere in the simulator. Strategies filter by
    /// instrument and attribute fills themselves.
    ///
    /// Must not call back into the simulator synchronously; the router
    /// dispatches trades while holding its lock.
    fn on_trade(&self, trade: &Trade);

    fn name(&self) -> &str;

    /// Log a human-readable performance summary.
    fn print_summary(&self);

    /// Write the JSON summary document to `path`.
    fn export_summary(&self, path: &Path) -> anyhow::Result<()>;

    fn total_trades(&self) -> u64;
    fn average_trade_size(&self) -> Decimal;
    fn max_drawdown(&self) -> Decimal;
    fn risk_violated(&self) -> bool;
}

#[derive(Default)]
struct PnlState {
    realized: Decimal,
    peak: Decimal,
    max_drawdown: Decimal,
}

/// Trade counters, realized PnL, drawdown, and the risk latch.
///
/// The latch is one-way: once set it stays set for the lifetime of the
/// strategy. The PnL state sits behind its own mutex so `on_trade`
/// accounting and worker-loop risk checks see a consistent
/// realized/peak/drawdown triple.
pub struct PerfTracker {
    total_trades: AtomicU64,
    total_quantity: AtomicU64,
    risk_violated: AtomicBool,
    pnl: Mutex<PnlState>,
}

impl PerfTracker {
    pub fn new() -> Self {
        Self {
            total_trades: AtomicU64::new(0),
            total_quantity: AtomicU64::new(0),
            risk_violated: AtomicBool::new(false),
            pnl: Mutex::new(PnlState::default()),
        }
    }

    /// Count one observed trade.
    pub fn record_trade(&self) {
        self.total_trades.fetch_add(1, Ordering::Relaxed);
    }

    /// Add quantity attributed to this strategy.
    pub fn add_quantity(&self, quantity: u32) {
        self.total_quantity
            .fetch_add(u64::from(quantity), Ordering::Relaxed);
    }

    /// Fold a PnL delta into realized PnL, updating the peak and maximum
    /// drawdown. Returns the new realized PnL.
    pub fn apply_pnl(&self, delta: Decimal) -> Decimal {
        let mut pnl = self.pnl.lock();
        pnl.realized += delta;
        pnl.peak = pnl.peak.max(pnl.realized);
        let drawdown = pnl.peak - pnl.realized;
        pnl.max_drawdown = pnl.max_drawdown.max(drawdown);
        pnl.realized
    }

    pub fn realized_pnl(&self) -> Decimal {
        self.pnl.lock().realized
    }

    pub fn max_drawdown(&self) -> Decimal {
        self.pnl.lock().max_drawdown
    }

    pub fn total_trades(&self) -> u64 {
        self.total_trades.load(Ordering::Relaxed)
    }

    pub fn total_quantity(&self) -> u64 {
        self.total_quantity.load(Ordering::Relaxed)
    }

    /// `total_quantity / total_trades`, or zero before the first trade.
    pub fn average_trade_size(&self) -> Decimal {
        let trades = self.total_trades();
        if trades == 0 {
            return Decimal::ZERO;
        }
        Decimal::from(self.total_quantity()) / Decimal::from(trades)
    }

    /// Latch the risk flag. Irreversible.
    pub fn latch_risk(&self) {
        self.risk_violated.store(true, Ordering::Release);
    }

    pub fn risk_violated(&self) -> bool {
        self.risk_violated.load(Ordering::Acquire)
    }
}

impl Default for PerfTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn average_trade_size_is_zero_without_trades() {
        let tracker = PerfTracker::new();
        assert_eq!(tracker.average_trade_size(), Decimal::ZERO);
    }

    #[test]
    fn average_trade_size_divides_quantity_by_count() {
        let tracker = PerfTracker::new();
        tracker.record_trade();
        tracker.add_quantity(3);
        tracker.record_trade();
        tracker.add_quantity(5);
        assert_eq!(tracker.average_trade_size(), dec!(4));
    }

    #[test]
    fn drawdown_tracks_shortfall_from_peak() {
        let tracker = PerfTracker::new();
        tracker.apply_pnl(dec!(100));
        tracker.apply_pnl(dec!(-30));
        assert_eq!(tracker.realized_pnl(), dec!(70));
        assert_eq!(tracker.max_drawdown(), dec!(30));

        // Recovery does not shrink the recorded maximum.
        tracker.apply_pnl(dec!(50));
        assert_eq!(tracker.max_drawdown(), dec!(30));

        tracker.apply_pnl(dec!(-200));
        assert_eq!(tracker.max_drawdown(), dec!(200));
    }

    #[test]
    fn drawdown_never_negative() {
        let tracker = PerfTracker::new();
        tracker.apply_pnl(dec!(10));
        tracker.apply_pnl(dec!(10));
        assert_eq!(tracker.max_drawdown(), Decimal::ZERO);
    }

    #[test]
    fn risk_latch_is_one_way() {
        let tracker = PerfTracker::new();
        assert!(!tracker.risk_violated());
        tracker.latch_risk();
        assert!(tracker.risk_violated());
        tracker.latch_risk();
        assert!(tracker.risk_violated());
    }
}
