//! Position entity (§3) and its invariants P1-P3.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::Side;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: Uuid,
    pub event_ticker: String,
    pub market_ticker: String,
    pub side: Side,
    pub stake: i64,
    pub entry_price: f64,
    pub entry_time: DateTime<Utc>,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub max_seen_bid: f64,
    pub settled: bool,
    pub closing_in_progress: bool,
    pub closing_initiated_at: Option<DateTime<Utc>>,
}

impl Position {
    pub fn new(event_ticker: String, market_ticker: String, side: Side, stake: i64, price: f64, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_ticker,
            market_ticker,
            side,
            stake,
            entry_price: price,
            entry_time: now,
            stop_loss: None,
            take_profit: None,
            max_seen_bid: price,
            settled: false,
            closing_in_progress: false,
            closing_initiated_at: None,
        }
    }

    /// P1: a position is "open" only while stake > 0 and not settled.
    pub fn is_open(&self) -> bool {
        self.stake > 0 && !self.settled
    }

    /// Aggregates a new fill into this position: stake sums, entry_price
    /// becomes the cost-weighted average (P2).
    pub fn apply_fill(&mut self, filled_qty: i64, filled_price: f64) {
        let total_cost = self.entry_price * self.stake as f64 + filled_price * filled_qty as f64;
        self.stake += filled_qty;
        self.entry_price = if self.stake > 0 {
            total_cost / self.stake as f64
        } else {
            0.0
        };
    }

    pub fn decrement_stake(&mut self, qty: i64) {
        self.stake = (self.stake - qty).max(0);
        if self.stake == 0 {
            self.settled = true;
        }
    }

    /// P3: a stale in-flight close (older than `max_age`) is reaped so the
    /// next tick treats the position as active again.
    pub fn reap_if_stale(&mut self, now: DateTime<Utc>, max_age: chrono::Duration) {
        if let Some(started) = self.closing_initiated_at {
            if self.closing_in_progress && now - started > max_age {
                self.closing_in_progress = false;
                self.closing_initiated_at = None;
            }
        }
    }
}

/// `(total_qty, weighted_avg_entry, total_cost)` over open positions on one
/// market+side, skipping settled positions.
pub fn aggregate_side(positions: &[&Position]) -> (f64, f64, f64) {
    let mut total_qty = 0.0;
    let mut total_cost = 0.0;
    for p in positions {
        if p.settled || p.stake <= 0 {
            continue;
        }
        total_qty += p.stake as f64;
        total_cost += p.stake as f64 * p.entry_price;
    }
    if total_qty <= 0.0 {
        (0.0, 0.0, 0.0)
    } else {
        (total_qty, total_cost / total_qty, total_cost)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_aggregation_cost_weighted() {
        let mut p = Position::new("EVT".into(), "EVT-A".into(), Side::Yes, 10, 0.40, Utc::now());
        p.apply_fill(10, 0.60);
        assert_eq!(p.stake, 20);
        assert!((p.entry_price - 0.50).abs() < 1e-9);
    }

    #[test]
    fn decrement_to_zero_settles() {
        let mut p = Position::new("EVT".into(), "EVT-A".into(), Side::Yes, 10, 0.40, Utc::now());
        p.decrement_stake(10);
        assert!(p.settled);
        assert_eq!(p.stake, 0);
    }

    #[test]
    fn stale_closing_flag_is_reaped() {
        let mut p = Position::new("EVT".into(), "EVT-A".into(), Side::Yes, 10, 0.40, Utc::now());
        p.closing_in_progress = true;
        p.closing_initiated_at = Some(Utc::now() - chrono::Duration::minutes(6));
        p.reap_if_stale(Utc::now(), chrono::Duration::minutes(5));
        assert!(!p.closing_in_progress);
    }
}
