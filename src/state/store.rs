//! Position store (§4.B). A single `tokio::sync::RwLock<PositionStore>`
//! behind an `Arc` — the direct generalization of the teacher's per-ticker
//! `RwLock<Market>` (`state/ticker.rs`) to the one coarse writer lock §5
//! calls for across positions and the auxiliary sets.

use chrono::Utc;

use crate::state::persist;
use crate::state::position::{aggregate_side, Position};
use crate::types::Side;

#[derive(Debug, Default)]
pub struct PositionStore {
    positions: Vec<Position>,
}

impl PositionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_open_positions(&self) -> Vec<&Position> {
        self.positions.iter().filter(|p| p.is_open()).collect()
    }

    pub fn get_by_event(&self, event_ticker: &str) -> Vec<&Position> {
        self.positions.iter().filter(|p| p.event_ticker == event_ticker).collect()
    }

    pub fn get_by_market(&self, market_ticker: &str) -> Vec<&Position> {
        self.positions.iter().filter(|p| p.market_ticker == market_ticker).collect()
    }

    fn find_open_mut(&mut self, market_ticker: &str, side: Side) -> Option<&mut Position> {
        self.positions
            .iter_mut()
            .find(|p| p.market_ticker == market_ticker && p.side == side && p.is_open())
    }

    pub fn get_open_position(&self, market_ticker: &str, side: Side) -> Option<&Position> {
        self.positions
            .iter()
            .find(|p| p.market_ticker == market_ticker && p.side == side && p.is_open())
    }

    /// Aggregates a fill into the single non-settled position for
    /// `(market, side)` (P2), or inserts a new one. Must be called holding
    /// the store's write lock (the caller holds `RwLockWriteGuard`).
    pub fn upsert_fill(&mut self, event_ticker: &str, market_ticker: &str, side: Side, filled_qty: i64, filled_price: f64) {
        if let Some(existing) = self.find_open_mut(market_ticker, side) {
            existing.apply_fill(filled_qty, filled_price);
            return;
        }
        self.positions.push(Position::new(
            event_ticker.to_string(),
            market_ticker.to_string(),
            side,
            filled_qty,
            filled_price,
            Utc::now(),
        ));
    }

    pub fn mark_closing(&mut self, market_ticker: &str, side: Side) {
        if let Some(p) = self.find_open_mut(market_ticker, side) {
            p.closing_in_progress = true;
            p.closing_initiated_at = Some(Utc::now());
        }
    }

    pub fn clear_closing(&mut self, market_ticker: &str, side: Side) {
        if let Some(p) = self.find_open_mut(market_ticker, side) {
            p.closing_in_progress = false;
            p.closing_initiated_at = None;
        }
    }

    pub fn decrement_stake(&mut self, market_ticker: &str, side: Side, qty: i64) {
        if let Some(p) = self.find_open_mut(market_ticker, side) {
            p.decrement_stake(qty);
        }
    }

    /// Reaps stale `closing_in_progress` flags older than `max_age` (§5).
    pub fn reap_stale_closing(&mut self, max_age: chrono::Duration) {
        let now = Utc::now();
        for p in self.positions.iter_mut() {
            p.reap_if_stale(now, max_age);
        }
    }

    pub fn aggregate_market_side(&self, market_ticker: &str, side: Side) -> (f64, f64, f64) {
        let matches: Vec<&Position> = self
            .positions
            .iter()
            .filter(|p| p.market_ticker == market_ticker && p.side == side)
            .collect();
        aggregate_side(&matches)
    }

    /// Replaces local stake/price for `(market, side)` with the exchange's
    /// reported truth; inserts if missing, settles if the exchange no
    /// longer reports it. Used by reconciliation (§4.C).
    pub fn reconcile_one(&mut self, event_ticker: &str, market_ticker: &str, side: Side, live_stake: i64, live_avg_price: f64) {
        if let Some(existing) = self.find_open_mut(market_ticker, side) {
            if existing.closing_in_progress {
                return; // avoid thrashing an in-flight close
            }
            existing.stake = live_stake;
            existing.entry_price = live_avg_price;
            if live_stake == 0 {
                existing.settled = true;
            }
            return;
        }
        if live_stake > 0 {
            self.positions.push(Position::new(
                event_ticker.to_string(),
                market_ticker.to_string(),
                side,
                live_stake,
                live_avg_price,
                Utc::now(),
            ));
        }
    }

    /// Marks every locally-open position not present in `live` as settled
    /// with stake 0 (reconciliation step 3).
    pub fn settle_missing(&mut self, live_keys: &std::collections::HashSet<(String, Side)>) {
        for p in self.positions.iter_mut() {
            if p.is_open() && !live_keys.contains(&(p.market_ticker.clone(), p.side)) {
                p.stake = 0;
                p.settled = true;
            }
        }
    }

    pub fn persist(&self, path: &std::path::Path) -> Result<(), crate::error::PersistError> {
        persist::write_json_atomic(path, &self.positions)
    }

    pub fn load(path: &std::path::Path) -> Result<Self, crate::error::PersistError> {
        let positions: Vec<Position> = persist::read_json(path)?;
        Ok(Self { positions })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_fill_aggregates_cost_weighted() {
        let mut store = PositionStore::new();
        store.upsert_fill("EVT", "EVT-A", Side::Yes, 10, 0.40);
        store.upsert_fill("EVT", "EVT-A", Side::Yes, 10, 0.60);
        let opens = store.get_open_positions();
        assert_eq!(opens.len(), 1);
        assert_eq!(opens[0].stake, 20);
        assert!((opens[0].entry_price - 0.50).abs() < 1e-9);
    }

    #[test]
    fn reconcile_drift_scenario_s6() {
        let mut store = PositionStore::new();
        store.upsert_fill("EVT", "M", Side::Yes, 100, 0.50);
        store.reconcile_one("EVT", "M", Side::Yes, 80, 0.52);
        let opens = store.get_open_positions();
        assert_eq!(opens[0].stake, 80);
        assert!((opens[0].entry_price - 0.52).abs() < 1e-9);
    }

    #[test]
    fn closing_in_progress_skipped_on_reconcile() {
        let mut store = PositionStore::new();
        store.upsert_fill("EVT", "M", Side::Yes, 100, 0.50);
        store.mark_closing("M", Side::Yes);
        store.reconcile_one("EVT", "M", Side::Yes, 40, 0.55);
        let opens = store.get_open_positions();
        assert_eq!(opens[0].stake, 100, "closing_in_progress must suppress reconcile");
    }
}
