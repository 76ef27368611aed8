//! Structured counters per §7: orders_placed, orders_filled,
//! orders_timeout_cancel, skip_counts by reason, slippage_bps histogram.
//! Plain atomics behind a shared struct, logged periodically by the
//! UI/metrics worker via `tracing::info!`, the same way `report.rs`
//! attaches structured fields to position snapshots.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Metrics {
    pub orders_placed: AtomicU64,
    pub orders_filled: AtomicU64,
    pub orders_timeout_cancel: AtomicU64,
    pub skip_counts: DashMap<&'static str, AtomicU64>,
    slippage_bps_sum: AtomicU64,
    slippage_bps_count: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_placed(&self) {
        self.orders_placed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_filled(&self) {
        self.orders_filled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_timeout_cancel(&self) {
        self.orders_timeout_cancel.fetch_add(1, Ordering::Relaxed);
    }

    pub fn skip(&self, reason: &'static str) {
        self.skip_counts
            .entry(reason)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn observe_slippage_bps(&self, bps: i64) {
        self.slippage_bps_sum
            .fetch_add(bps.unsigned_abs(), Ordering::Relaxed);
        self.slippage_bps_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn avg_slippage_bps(&self) -> f64 {
        let n = self.slippage_bps_count.load(Ordering::Relaxed);
        if n == 0 {
            return 0.0;
        }
        self.slippage_bps_sum.load(Ordering::Relaxed) as f64 / n as f64
    }

    pub fn log_snapshot(&self) {
        let skips: Vec<(String, u64)> = self
            .skip_counts
            .iter()
            .map(|e| (e.key().to_string(), e.value().load(Ordering::Relaxed)))
            .collect();
        tracing::info!(
            orders_placed = self.orders_placed.load(Ordering::Relaxed),
            orders_filled = self.orders_filled.load(Ordering::Relaxed),
            orders_timeout_cancel = self.orders_timeout_cancel.load(Ordering::Relaxed),
            avg_slippage_bps = self.avg_slippage_bps(),
            skips = ?skips,
            "metrics snapshot"
        );
    }
}
