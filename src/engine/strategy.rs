//! Strategy worker (§4.I strategy tick). Per tick: refresh odds for every
//! configured sport, re-discover markets on `discovery_interval`, then for
//! each tracked (event, side) run the pricing stack (§4.A) through the risk
//! gate (§4.F), size via Kelly / the hedge planner / pyramid-on-winner, and
//! submit.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use kalshi_rs::KalshiClient;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::engine::{ActiveMatch, ShutdownFlag};
use crate::exchange::orders::{place_order, wait_for_fill, FillOutcome, FillStatus};
use crate::exchange::reconcile::reconcile;
use crate::hedge::{plan_first_hedge, plan_incremental_hedge, HedgePlan};
use crate::matcher::{self, MatchCache};
use crate::metrics::Metrics;
use crate::odds::OddsAdapter;
use crate::pricing::{choose_maker_vs_taker, ev_at_settlement, kelly_fraction, parse_period_clock};
use crate::risk::{check_entry, game_clock_gate_pass, GateAction, RiskContext};
use crate::state::Shared;
use crate::types::{OrderAction, PriceCents, Side, Tif};

/// Odds older than this are treated as stale for gating purposes (§4.F
/// "stale_odds"); distinct from `Config::odds_fetch_min_interval`, which
/// only throttles how often a fetch is *issued*.
const ODDS_MAX_AGE: Duration = Duration::from_secs(60);

/// Translates the engine's canonical sport token into the Odds API's
/// `sport_key` path segment. The canonical token is what the matcher and
/// risk gate key off of throughout; this mapping is the one place that
/// needs to know the upstream provider's own naming.
fn oddsapi_sport_key(sport: &str) -> &'static str {
    match sport.to_ascii_uppercase().as_str() {
        "NFL" => "americanfootball_nfl",
        "NBA" => "basketball_nba",
        "CBBM" => "basketball_ncaab",
        "CBBW" => "basketball_wncaab",
        "MLB" => "baseball_mlb",
        "NHL" => "icehockey_nhl",
        other => other,
    }
}

fn is_womens_sport(sport: &str) -> bool {
    sport.eq_ignore_ascii_case("CBBW")
}

fn is_nba_sport(sport: &str) -> bool {
    sport.eq_ignore_ascii_case("NBA")
}

pub struct StrategyWorker {
    cfg: Config,
    shared: Shared,
    client: Arc<KalshiClient>,
    odds: Arc<OddsAdapter>,
    match_cache: Arc<MatchCache>,
    metrics: Arc<Metrics>,
    shutdown: ShutdownFlag,
    active: Mutex<HashMap<String, ActiveMatch>>,
    last_discovery: Mutex<Instant>,
}

impl StrategyWorker {
    pub fn new(
        cfg: Config,
        shared: Shared,
        client: Arc<KalshiClient>,
        odds: Arc<OddsAdapter>,
        match_cache: Arc<MatchCache>,
        metrics: Arc<Metrics>,
        shutdown: ShutdownFlag,
    ) -> Self {
        Self {
            cfg,
            shared,
            client,
            odds,
            match_cache,
            metrics,
            shutdown,
            active: Mutex::new(HashMap::new()),
            last_discovery: Mutex::new(Instant::now() - Duration::from_secs(3600)),
        }
    }

    pub async fn run(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.cfg.strategy_tick);
        while !self.shutdown.is_set() {
            ticker.tick().await;
            if self.shutdown.is_set() {
                break;
            }
            if let Err(e) = self.tick().await {
                warn!("strategy tick failed: {e}");
            }
        }
    }

    pub async fn active_matches(&self) -> Vec<ActiveMatch> {
        self.active.lock().await.values().cloned().collect()
    }

    async fn tick(&self) -> anyhow::Result<()> {
        for sport in self.cfg.sports.clone() {
            let sport_key = oddsapi_sport_key(&sport);
            if let Err(e) = self.odds.refresh_sport(&self.cfg, &sport, sport_key).await {
                warn!("odds refresh failed for {sport}: {e}");
            }
        }

        let tracked_events: Vec<String> = self.active.lock().await.keys().cloned().collect();
        for event_id in &tracked_events {
            if let Err(e) = self.odds.refresh_event_moneyline(&self.cfg, event_id).await {
                warn!("event moneyline refresh failed for {event_id}: {e}");
            }
        }

        self.maybe_discover().await;

        let matches: Vec<ActiveMatch> = self.active.lock().await.values().cloned().collect();
        for m in &matches {
            for home_side in [true, false] {
                if let Err(e) = self.evaluate_side(m, home_side).await {
                    warn!(event = %m.event_ticker, "evaluate_side failed: {e}");
                }
            }
        }

        if let Err(e) = reconcile(&self.shared, &self.client).await {
            warn!("post-tick reconcile failed: {e}");
        }

        Ok(())
    }

    /// §4.E: re-discovers markets for any odds-feed event not yet tracked,
    /// throttled to `discovery_interval`.
    async fn maybe_discover(&self) {
        {
            let mut last = self.last_discovery.lock().await;
            if last.elapsed() < self.cfg.discovery_interval {
                return;
            }
            *last = Instant::now();
        }

        self.match_cache.sweep_expired().await;

        let today = Utc::now().date_naive();
        let events = self.odds.all_events().await;
        let mut active = self.active.lock().await;

        for snap in events {
            if active.contains_key(&snap.event_id) {
                continue;
            }

            let resolved = match matcher::resolve_event(
                &self.client,
                &self.match_cache,
                &snap.sport,
                &snap.home_team,
                &snap.away_team,
                today,
            )
            .await
            {
                Ok(r) => r,
                Err(e) => {
                    self.metrics.skip("discovery_no_match");
                    warn!(event = %snap.event_id, "market discovery failed: {e}");
                    continue;
                }
            };

            // The two YES markets are whichever of the event's markets carry
            // the home/away sub-titles; absent a richer market-title match
            // here, the first two returned tickers stand in for home/away in
            // ticker order (home second per `build_candidates`' convention).
            let (home_market, away_market) = match resolved.market_tickers.as_slice() {
                [a, b, ..] => (a.clone(), b.clone()),
                [a] => (a.clone(), a.clone()),
                [] => continue,
            };

            self.shared
                .store
                .write()
                .await
                .aux
                .note_first_detection(&resolved.event_ticker);

            info!(event = %resolved.event_ticker, home = %snap.home_team, away = %snap.away_team, "discovered match");

            active.insert(
                snap.event_id.clone(),
                ActiveMatch {
                    event_id: snap.event_id.clone(),
                    event_ticker: resolved.event_ticker,
                    home_team: snap.home_team.clone(),
                    away_team: snap.away_team.clone(),
                    home_market,
                    away_market,
                    sport: snap.sport.clone(),
                    is_nba: is_nba_sport(&snap.sport),
                    is_womens: is_womens_sport(&snap.sport),
                },
            );
        }
    }

    /// §4.I steps 3-5 for one (event, side): price, gate, size, submit.
    async fn evaluate_side(&self, m: &ActiveMatch, home_side: bool) -> anyhow::Result<()> {
        let this_market = m.market_for(home_side).to_string();
        let opp_market = m.market_for(!home_side).to_string();

        let Some(quote) = self.shared.quotes.get_fresh(&this_market, Duration::from_secs(self.cfg.quote_stale_secs as u64)) else {
            self.metrics.skip("no_quote");
            return Ok(());
        };

        let Some(odds_snapshot) = self.odds.get(&m.event_id).await else {
            self.metrics.skip("no_odds");
            return Ok(());
        };
        let fresh_odds = !odds_snapshot.is_stale(ODDS_MAX_AGE);
        let true_prob = if home_side { odds_snapshot.home_prob } else { odds_snapshot.away_prob };

        let (qty_this, price_this, _) = {
            let guard = self.shared.store.read().await;
            guard.positions.aggregate_market_side(&this_market, Side::Yes)
        };
        let (qty_opp, price_opp, _) = {
            let guard = self.shared.store.read().await;
            guard.positions.aggregate_market_side(&opp_market, Side::Yes)
        };

        let is_first_entry = qty_this <= 0.0 && qty_opp <= 0.0;
        let is_hedge_leg = qty_opp > 0.0;
        let is_pyramid = qty_this > 0.0;

        let bid = quote.yes_bid;
        let ask = quote.yes_ask;
        let mid = (bid + ask) / 2.0;
        let spread = quote.spread();
        let period_clock = odds_snapshot.clock.as_deref();

        // First pass: price discovery at a nominal quantity, to drive Kelly
        // sizing before the risk gate settles on a final quantity.
        let preview = choose_maker_vs_taker(&self.cfg, true_prob, Some(bid), Some(ask), 1, Some(mid), Some(spread), period_clock, m.is_womens);

        let candidate_qty = if is_hedge_leg {
            let plan = if qty_this <= 0.0 {
                plan_first_hedge(&self.cfg, qty_opp, price_opp, preview.order_price, false, preview.use_maker)
            } else {
                let kelly = kelly_fraction(true_prob, preview.order_price, self.cfg.roundtrip_cost) * self.cfg.kelly_fraction_scaler;
                let target_total = (kelly * self.cfg.capital / preview.order_price.max(1e-6)) + qty_this;
                plan_incremental_hedge(&self.cfg, qty_opp, price_opp, qty_this, preview.order_price, target_total, false, preview.use_maker)
            };
            match plan {
                HedgePlan::Order { qty, .. } => qty,
                HedgePlan::Skip => {
                    self.metrics.skip("hedge_band_empty");
                    return Ok(());
                }
            }
        } else if is_pyramid {
            if !self.cfg.pyramid_on_winner_enabled {
                self.metrics.skip("pyramiding_disabled");
                return Ok(());
            }
            let edge = ev_at_settlement(true_prob, price_this);
            if edge < self.cfg.pyramid_min_increase {
                self.metrics.skip("pyramid_insufficient_edge");
                return Ok(());
            }
            let kelly = kelly_fraction(true_prob, preview.order_price, self.cfg.roundtrip_cost) * self.cfg.kelly_fraction_scaler;
            let target_total = kelly * self.cfg.capital / preview.order_price.max(1e-6);
            let incremental = (target_total - qty_this).max(0.0);
            if incremental < 1.0 {
                self.metrics.skip("pyramid_no_room");
                return Ok(());
            }
            incremental.floor() as u64
        } else {
            let kelly = kelly_fraction(true_prob, preview.order_price, self.cfg.roundtrip_cost) * self.cfg.kelly_fraction_scaler;
            let stake_value = kelly * self.cfg.capital;
            (stake_value / preview.order_price.max(1e-6)).floor() as u64
        };

        if candidate_qty == 0 {
            self.metrics.skip("zero_candidate_qty");
            return Ok(());
        }

        let (period, minutes_remaining) = period_clock
            .and_then(parse_period_clock)
            .map_or((None, None), |(p, mins)| (Some(p), Some(mins)));
        let final_period = if m.is_nba || m.is_womens { 4 } else { 2 };
        let clock_gate_pass = game_clock_gate_pass(&self.cfg, period, minutes_remaining, final_period);

        let (half_hedge_lock_active, stop_loss_cooldown_active, seven_pct_exited, time_since_first_detection) = {
            let mut guard = self.shared.store.write().await;
            let cooldown = guard.aux.check_stop_loss_cooldown(
                &m.event_ticker,
                Some(preview.order_price),
                self.cfg.stop_loss_cooldown_minutes,
                self.cfg.allow_stop_loss_price_recovery,
            );
            (
                guard.aux.is_half_hedge_locked(&m.event_ticker),
                cooldown,
                guard.aux.is_seven_pct_exited(&m.event_ticker),
                guard
                    .aux
                    .time_since_first_detection(&m.event_ticker)
                    .and_then(|d| d.to_std().ok()),
            )
        };

        let (total_event_exposure, total_exposure_all_events) = {
            let guard = self.shared.store.read().await;
            let event_exposure: f64 = guard
                .positions
                .get_by_event(&m.event_ticker)
                .iter()
                .filter(|p| p.is_open())
                .map(|p| p.stake as f64 * p.entry_price)
                .sum();
            let total_exposure: f64 = guard
                .positions
                .get_open_positions()
                .iter()
                .map(|p| p.stake as f64 * p.entry_price)
                .sum();
            (event_exposure, total_exposure)
        };

        let ctx = RiskContext {
            is_first_entry,
            is_hedge_leg,
            is_pyramid,
            spread,
            ev: true_prob - preview.order_price,
            entry_price: preview.order_price,
            kelly: kelly_fraction(true_prob, preview.order_price, self.cfg.roundtrip_cost),
            event_volume_24h: quote.volume_24h,
            candidate_stake_value: candidate_qty as f64 * preview.order_price,
            current_side_exposure: qty_this * price_this,
            total_event_exposure,
            total_exposure_all_events,
            half_hedge_lock_active,
            pyramiding_allowed: self.cfg.pyramid_on_winner_enabled,
            stop_loss_cooldown_active,
            seven_pct_exited,
            time_since_first_detection,
            game_clock_gate_pass: clock_gate_pass,
            fresh_odds,
            is_nba: m.is_nba,
        };

        let gate = check_entry(&self.cfg, &ctx, candidate_qty);
        if gate.action == GateAction::Veto {
            self.metrics.skip(gate.reason);
            return Ok(());
        }

        // Second pass: final order_price/use_maker at the gated quantity.
        let choice = choose_maker_vs_taker(&self.cfg, true_prob, Some(bid), Some(ask), gate.qty, Some(mid), Some(spread), period_clock, m.is_womens);

        let price_cents = PriceCents::from_frac(choice.order_price).0;
        let tif = if choice.use_maker { Tif::Gtc } else { Tif::Ioc };

        // §5: one market, one in-flight order at a time, across both
        // workers. Held for the whole submit->wait->upsert span so the
        // stop-loss worker can't start closing this market mid-fill.
        let market_lock = self.shared.market_locks.get(&this_market);
        let _market_guard = market_lock.lock().await;

        self.metrics.inc_placed();
        let outcome = self.submit_and_fill(&this_market, Side::Yes, price_cents, gate.qty, tif, choice.use_maker).await?;

        if outcome.filled_qty > 0 {
            let slippage_bps = ((choice.order_price - true_prob) * 10_000.0).round() as i64;
            self.metrics.observe_slippage_bps(slippage_bps);
            self.shared.store.write().await.positions.upsert_fill(
                &m.event_ticker,
                &this_market,
                Side::Yes,
                outcome.filled_qty as i64,
                choice.order_price,
            );
        }
        drop(_market_guard);

        match outcome.status {
            FillStatus::Filled | FillStatus::Partial => self.metrics.inc_filled(),
            FillStatus::Timeout => self.metrics.inc_timeout_cancel(),
            FillStatus::Cancelled => {}
        }

        // Keep the half-hedge lock in sync: exactly one side open -> locked.
        let (qty_this_after, _, _) = {
            let guard = self.shared.store.read().await;
            guard.positions.aggregate_market_side(&this_market, Side::Yes)
        };
        let one_sided = (qty_this_after > 0.0) != (qty_opp > 0.0);
        self.shared
            .store
            .write()
            .await
            .aux
            .set_half_hedge_lock(&m.event_ticker, one_sided);

        Ok(())
    }

    async fn submit_and_fill(
        &self,
        ticker: &str,
        side: Side,
        price_cents: u8,
        qty: u64,
        tif: Tif,
        post_only: bool,
    ) -> anyhow::Result<FillOutcome> {
        if self.cfg.exec_mode.is_paper() {
            info!(ticker, price_cents, qty, "paper order filled optimistically");
            return Ok(FillOutcome {
                status: FillStatus::Filled,
                filled_qty: qty,
            });
        }

        let client_order_id = Uuid::new_v4().to_string();
        let order_id = place_order(&self.client, ticker, OrderAction::Buy, side, price_cents, qty, tif, &client_order_id, post_only).await?;
        // Claim this order_id now, before the WS `fill` channel can
        // possibly deliver it, so `exchange::quotes::handle_fill` skips it
        // once this REST-confirmed fill is applied below by the caller.
        self.shared.applied_fills.record_if_new(&order_id);

        let timeout = if post_only {
            self.cfg.order_wait_timeout_maker
        } else {
            self.cfg.order_wait_timeout_taker
        };
        // wait_for_fill already cancels on timeout; nothing further to do here.
        wait_for_fill(&self.client, &order_id, timeout, false, qty).await.map_err(Into::into)
    }
}
