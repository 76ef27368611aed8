//! Engine loop (§4.I). Three cooperative workers — strategy, stop-loss,
//! UI/metrics — plus the quote subscriber spawned separately by
//! `exchange::spawn_quote_subscriber`. All share `state::Shared` under its
//! single writer lock.

pub mod stop_loss;
pub mod strategy;
pub mod task;
pub mod ui;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Observed by every worker; set once on shutdown signal. Workers finish
/// their current iteration (bounded by the order-wait timeout) before
/// persisting and exiting (§4.I "Shutdown").
#[derive(Clone, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One odds-feed event matched to its exchange markets (§4.E output),
/// tracked by the strategy worker across ticks. `home`/`away` are the two
/// YES markets; the engine is YES-only, so "NO exposure" is simply holding
/// YES on the opposite market.
#[derive(Debug, Clone)]
pub struct ActiveMatch {
    /// Odds-provider event id (`OddsSnapshot::event_id`) — the key into
    /// `OddsAdapter`, distinct from `event_ticker` below (the exchange's
    /// own ticker).
    pub event_id: String,
    pub event_ticker: String,
    pub home_team: String,
    pub away_team: String,
    pub home_market: String,
    pub away_market: String,
    pub sport: String,
    pub is_nba: bool,
    pub is_womens: bool,
}

impl ActiveMatch {
    pub fn market_for(&self, home_side: bool) -> &str {
        if home_side {
            &self.home_market
        } else {
            &self.away_market
        }
    }
}
