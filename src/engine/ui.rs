//! UI / metrics worker (§4.I UI tick). Read-only: logs a structured
//! position snapshot and the running metrics counters on an interval, the
//! same "attach fields to `tracing::info!`" shape as the teacher's
//! `report.rs`, generalized from the old cents-based position to the
//! current stake/entry_price model.

use std::sync::Arc;

use tracing::info;

use crate::config::Config;
use crate::engine::ShutdownFlag;
use crate::metrics::Metrics;
use crate::state::Shared;

pub struct UiWorker {
    cfg: Config,
    shared: Shared,
    metrics: Arc<Metrics>,
    shutdown: ShutdownFlag,
}

impl UiWorker {
    pub fn new(cfg: Config, shared: Shared, metrics: Arc<Metrics>, shutdown: ShutdownFlag) -> Self {
        Self {
            cfg,
            shared,
            metrics,
            shutdown,
        }
    }

    pub async fn run(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.cfg.ui_tick);
        while !self.shutdown.is_set() {
            ticker.tick().await;
            if self.shutdown.is_set() {
                break;
            }
            self.tick().await;
        }
    }

    async fn tick(&self) {
        let guard = self.shared.store.read().await;
        for pos in guard.positions.get_open_positions() {
            info!(
                event_ticker = %pos.event_ticker,
                market_ticker = %pos.market_ticker,
                side = pos.side.as_str(),
                stake = pos.stake,
                entry_price = pos.entry_price,
                max_seen_bid = pos.max_seen_bid,
                "position snapshot"
            );
        }
        drop(guard);

        self.metrics.log_snapshot();

        // §5: clears `closing_in_progress` flags a crashed or hung close
        // left stuck, so reconcile doesn't suppress drift-correction on
        // that position forever.
        let reap_max_age = chrono::Duration::from_std(self.cfg.closing_stale_reap).unwrap_or(chrono::Duration::minutes(5));
        self.shared.store.write().await.positions.reap_stale_closing(reap_max_age);
    }
}
