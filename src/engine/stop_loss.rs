//! Stop-loss / profit-protector worker (§4.H, §4.I stop-loss tick). Hedged
//! positions (both sides open) go through the profit protector; one-sided
//! positions go through the hard/soft stop-loss ladder. Runs on its own
//! faster tick (`Config::stop_loss_tick`) since exits are time-sensitive in
//! a way new entries aren't.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use kalshi_rs::KalshiClient;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::engine::strategy::StrategyWorker;
use crate::engine::{ActiveMatch, ShutdownFlag};
use crate::exchange::orders::{place_order, wait_for_fill, FillStatus};
use crate::exchange::reconcile::reconcile;
use crate::metrics::Metrics;
use crate::odds::OddsAdapter;
use crate::profit_protector::{evaluate, revalidate, ExitAction, GameClock, PartialSide, PeakProfitTracker};
use crate::state::Shared;
use crate::types::{OrderAction, PriceCents, Side, Tif};

/// Two ticks off the touched bid, floored at a cent, so a sell order still
/// crosses a thinning book (§4.I "fire = sell at best_bid - 2 ticks").
fn sell_price(bid: f64) -> f64 {
    (bid - 0.02).max(0.01)
}

pub struct StopLossWorker {
    cfg: Config,
    shared: Shared,
    client: Arc<KalshiClient>,
    odds: Arc<OddsAdapter>,
    strategy: Arc<StrategyWorker>,
    peaks: Arc<PeakProfitTracker>,
    metrics: Arc<Metrics>,
    shutdown: ShutdownFlag,
}

impl StopLossWorker {
    pub fn new(
        cfg: Config,
        shared: Shared,
        client: Arc<KalshiClient>,
        odds: Arc<OddsAdapter>,
        strategy: Arc<StrategyWorker>,
        peaks: Arc<PeakProfitTracker>,
        metrics: Arc<Metrics>,
        shutdown: ShutdownFlag,
    ) -> Self {
        Self {
            cfg,
            shared,
            client,
            odds,
            strategy,
            peaks,
            metrics,
            shutdown,
        }
    }

    pub async fn run(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.cfg.stop_loss_tick);
        while !self.shutdown.is_set() {
            ticker.tick().await;
            if self.shutdown.is_set() {
                break;
            }
            if let Err(e) = self.tick().await {
                warn!("stop-loss tick failed: {e}");
            }
        }
    }

    async fn tick(&self) -> anyhow::Result<()> {
        // §5 "after every strategy tick AND before every exit tick, the
        // engine MUST call reconcile": this worker ticks on its own, faster
        // interval, so it can't rely solely on the strategy tick's call.
        if let Err(e) = reconcile(&self.shared, &self.client).await {
            warn!("pre-tick reconcile failed: {e}");
        }

        let events: HashSet<String> = {
            let guard = self.shared.store.read().await;
            guard.positions.get_open_positions().iter().map(|p| p.event_ticker.clone()).collect()
        };

        let matches = self.strategy.active_matches().await;

        for event_ticker in events {
            let Some(m) = matches.iter().find(|m| m.event_ticker == event_ticker) else {
                continue;
            };

            let Some(quote_a) = self.shared.quotes.get(&m.home_market) else { continue };
            let Some(quote_b) = self.shared.quotes.get(&m.away_market) else { continue };

            let (qty_a, price_a, _) = {
                let guard = self.shared.store.read().await;
                guard.positions.aggregate_market_side(&m.home_market, Side::Yes)
            };
            let (qty_b, price_b, _) = {
                let guard = self.shared.store.read().await;
                guard.positions.aggregate_market_side(&m.away_market, Side::Yes)
            };

            let odds_snapshot = self.odds.get(&m.event_id).await;
            let period_clock = odds_snapshot.as_ref().and_then(|s| s.clock.clone());

            if qty_a > 0.0 && qty_b > 0.0 {
                self.run_profit_protector(&event_ticker, m, qty_a, price_a, qty_b, price_b, quote_a.yes_bid, quote_b.yes_bid, period_clock.as_deref())
                    .await;
            } else if qty_a > 0.0 {
                let true_prob = odds_snapshot.as_ref().map(|s| s.home_prob);
                self.run_stop_loss(&event_ticker, &m.home_market, qty_a, price_a, quote_a.yes_bid, true_prob).await;
            } else if qty_b > 0.0 {
                let true_prob = odds_snapshot.as_ref().map(|s| s.away_prob);
                self.run_stop_loss(&event_ticker, &m.away_market, qty_b, price_b, quote_b.yes_bid, true_prob).await;
            }
        }

        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_profit_protector(
        &self,
        event_ticker: &str,
        m: &ActiveMatch,
        qa: f64,
        pa: f64,
        qb: f64,
        pb: f64,
        bid_a: f64,
        bid_b: f64,
        period_clock: Option<&str>,
    ) {
        let most_recent_entry_age = {
            let guard = self.shared.store.read().await;
            let entry_a = guard.positions.get_open_position(&m.home_market, Side::Yes).map(|p| p.entry_time);
            let entry_b = guard.positions.get_open_position(&m.away_market, Side::Yes).map(|p| p.entry_time);
            entry_a.into_iter().chain(entry_b).max().map(|t| (Utc::now() - t).to_std().unwrap_or(Duration::ZERO))
        };

        let clock = GameClock {
            period_clock,
            is_nba: m.is_nba,
            is_womens: m.is_womens,
        };

        let decision = evaluate(&self.cfg, &self.peaks, event_ticker, qa, pa, qb, pb, bid_a, bid_b, most_recent_entry_age, clock);

        match decision.action {
            ExitAction::Hold => {}
            ExitAction::ClosePartial(side) => {
                if !revalidate(&self.cfg, &self.peaks, event_ticker, decision, qa, pa, qb, pb, bid_a, bid_b, most_recent_entry_age, clock) {
                    return;
                }
                let (market, qty, bid) = match side {
                    PartialSide::A => (&m.home_market, qa, bid_a),
                    PartialSide::B => (&m.away_market, qb, bid_b),
                };
                info!(event = event_ticker, market, reason = decision.reason, "aggressive partial exit firing");
                self.close_position(market, qty, bid).await;
                self.shared.store.write().await.aux.mark_seven_pct_exited(event_ticker);
            }
            ExitAction::CloseBoth => {
                if !revalidate(&self.cfg, &self.peaks, event_ticker, decision, qa, pa, qb, pb, bid_a, bid_b, most_recent_entry_age, clock) {
                    return;
                }
                info!(event = event_ticker, reason = decision.reason, profit = decision.current_profit_pct, "profit-protector closing both sides");
                self.close_position(&m.home_market, qa, bid_a).await;
                self.close_position(&m.away_market, qb, bid_b).await;
                self.peaks.clear(event_ticker);
                self.shared.store.write().await.aux.set_half_hedge_lock(event_ticker, false);
            }
        }
    }

    /// Hard stop fires unconditionally past `hard_stop_pct`. Soft stop only
    /// fires once sportsbook and exchange prices agree (within
    /// `odds_diff_threshold`), the position has been held at least
    /// `stop_loss_min_hold`, and this event hasn't already tripped the
    /// absolute-exit rule (§4.I).
    async fn run_stop_loss(&self, event_ticker: &str, market_ticker: &str, qty: f64, entry_price: f64, bid: f64, true_prob: Option<f64>) {
        if entry_price <= 0.0 {
            return;
        }
        let loss_pct = ((entry_price - bid) / entry_price).max(0.0);

        let entry_time = {
            let guard = self.shared.store.read().await;
            guard.positions.get_open_position(market_ticker, Side::Yes).map(|p| p.entry_time)
        };
        let Some(entry_time) = entry_time else { return };
        let held = (Utc::now() - entry_time).to_std().unwrap_or(Duration::ZERO);

        if loss_pct >= self.cfg.hard_stop_pct {
            info!(event_ticker, market_ticker, loss_pct, "hard stop firing");
            self.close_position(market_ticker, qty, bid).await;
            self.shared.store.write().await.aux.mark_stop_lossed(event_ticker, entry_price);
            return;
        }

        if loss_pct < self.cfg.soft_stop_pct {
            return;
        }

        let odds_agree = match true_prob {
            Some(p) => (p - bid).abs() <= self.cfg.odds_diff_threshold,
            None => false,
        };
        if !odds_agree {
            return;
        }
        if held < self.cfg.stop_loss_min_hold {
            return;
        }
        if self.shared.store.read().await.aux.is_seven_pct_exited(event_ticker) {
            return;
        }

        info!(event_ticker, market_ticker, loss_pct, "soft stop firing");
        self.close_position(market_ticker, qty, bid).await;
        self.shared.store.write().await.aux.mark_stop_lossed(event_ticker, entry_price);
    }

    async fn close_position(&self, market_ticker: &str, qty: f64, bid: f64) {
        if qty <= 0.0 {
            return;
        }
        let qty = qty.round() as u64;
        let price = sell_price(bid);
        let price_cents = PriceCents::from_frac(price).0;

        // §5: same per-market lock the strategy worker's buy path holds, so
        // a new entry can't land on a market this worker is mid-flight
        // closing. `mark_closing` additionally tells `reconcile_one` not to
        // thrash the position's stake while the sell is in flight.
        let market_lock = self.shared.market_locks.get(market_ticker);
        let _market_guard = market_lock.lock().await;
        self.shared.store.write().await.positions.mark_closing(market_ticker, Side::Yes);

        let filled = if self.cfg.exec_mode.is_paper() {
            qty
        } else {
            let client_order_id = Uuid::new_v4().to_string();
            match place_order(&self.client, market_ticker, OrderAction::Sell, Side::Yes, price_cents, qty, Tif::Ioc, &client_order_id, false).await {
                Ok(order_id) => {
                    self.shared.applied_fills.record_if_new(&order_id);
                    match wait_for_fill(&self.client, &order_id, self.cfg.order_wait_timeout_taker, false, qty).await {
                        Ok(outcome) => {
                            if matches!(outcome.status, FillStatus::Filled | FillStatus::Partial) {
                                self.metrics.inc_filled();
                            }
                            outcome.filled_qty
                        }
                        Err(e) => {
                            warn!(market_ticker, "close order wait failed: {e}");
                            0
                        }
                    }
                }
                Err(e) => {
                    warn!(market_ticker, "close order placement failed: {e}");
                    0
                }
            }
        };

        if filled > 0 {
            self.shared.store.write().await.positions.decrement_stake(market_ticker, Side::Yes, filled as i64);
        }
        self.shared.store.write().await.positions.clear_closing(market_ticker, Side::Yes);
    }
}
