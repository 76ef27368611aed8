//! Risk gate (§4.F). Consulted before every order submission. Hard gates
//! veto an entry outright; soft caps scale the candidate quantity down
//! before a floor check turns into a veto. Translated into a
//! `Decision{action, reason, qty}` per the §9 "exception-for-control-flow"
//! design note, so callers act on a value instead of threading `continue`.

use std::time::Duration;

use crate::config::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateAction {
    Allow,
    Veto,
}

#[derive(Debug, Clone, Copy)]
pub struct GateResult {
    pub action: GateAction,
    pub qty: u64,
    pub reason: &'static str,
}

/// Everything the gate table needs to evaluate one candidate order.
/// `is_hedge_leg` changes which exposure caps and which floors apply.
pub struct RiskContext {
    pub is_first_entry: bool,
    pub is_hedge_leg: bool,
    pub is_pyramid: bool,

    pub spread: f64,
    pub ev: f64,
    pub entry_price: f64,
    pub kelly: f64,

    pub event_volume_24h: u64,

    pub candidate_stake_value: f64,
    pub current_side_exposure: f64,
    pub total_event_exposure: f64,
    pub total_exposure_all_events: f64,

    pub half_hedge_lock_active: bool,
    pub pyramiding_allowed: bool,

    pub stop_loss_cooldown_active: bool,
    pub seven_pct_exited: bool,

    pub time_since_first_detection: Option<Duration>,
    pub game_clock_gate_pass: bool,

    pub fresh_odds: bool,

    pub is_nba: bool,
}

/// Runs the full hard-gate table (§4.F) against a candidate order of
/// `candidate_qty` contracts. Gates that would allow a smaller quantity
/// scale `qty` down; if that drop takes a first entry below
/// `first_entry_min_qty`, the candidate is vetoed instead of shrunk to
/// zero.
pub fn check_entry(cfg: &Config, ctx: &RiskContext, candidate_qty: u64) -> GateResult {
    // Seven-pct-exited set: permanent block for the session.
    if ctx.seven_pct_exited {
        return veto("seven_pct_exited");
    }

    // NBA master switch.
    if ctx.is_nba && !cfg.enable_nba_trading {
        return veto("nba_trading_disabled");
    }

    // Stop-loss cooldown.
    if ctx.stop_loss_cooldown_active {
        return veto("stop_loss_cooldown");
    }

    // Spread sanity.
    if ctx.spread > cfg.max_spread_absolute {
        return veto("spread_too_wide");
    }
    if ctx.ev > 0.0 && ctx.spread > cfg.max_spread_ev_ratio * ctx.ev {
        return veto("spread_exceeds_ev_ratio");
    }

    // Price range, first entry only.
    if ctx.is_first_entry && (ctx.entry_price < cfg.min_price || ctx.entry_price > cfg.max_price) {
        return veto("price_out_of_range");
    }

    // Volume floor.
    if ctx.event_volume_24h < cfg.min_volume_24h {
        return veto("volume_floor");
    }

    // Kelly floor, bypassed for hedge legs.
    if !ctx.is_hedge_leg && ctx.kelly < cfg.min_kelly {
        return veto("kelly_floor");
    }

    // Half-hedge lock.
    if ctx.half_hedge_lock_active && !ctx.is_hedge_leg && !ctx.pyramiding_allowed {
        return veto("half_hedge_lock");
    }

    // Entry time window / game-clock gate (first entries only).
    if ctx.is_first_entry {
        let within_window = ctx
            .time_since_first_detection
            .map(|d| d <= cfg.first_trade_window)
            .unwrap_or(true);
        if !within_window && !ctx.game_clock_gate_pass {
            return veto("entry_window_closed");
        }
        if !ctx.fresh_odds {
            return veto("stale_odds");
        }
    }

    let mut qty = candidate_qty;

    // Per-side exposure cap.
    let side_cap_pct = if ctx.is_hedge_leg { cfg.hedge_max_stake_pct } else { cfg.max_stake_pct };
    let side_cap = side_cap_pct * cfg.capital;
    let side_room = (side_cap - ctx.current_side_exposure).max(0.0);
    qty = scale_to_room(qty, ctx.entry_price, side_room);

    // Per-event exposure cap.
    let event_cap = cfg.max_exposure_per_game_pct * cfg.capital;
    let event_room = (event_cap - ctx.total_event_exposure).max(0.0);
    qty = scale_to_room(qty, ctx.entry_price, event_room);

    // Total exposure cap (hedge legs get the wider ceiling).
    let total_cap_pct = if ctx.is_hedge_leg { cfg.max_total_exposure_hedge_pct } else { cfg.max_total_exposure_pct };
    let total_cap = total_cap_pct * cfg.capital;
    let total_room = (total_cap - ctx.total_exposure_all_events).max(0.0);
    qty = scale_to_room(qty, ctx.entry_price, total_room);

    if qty == 0 {
        return veto("exposure_cap_exhausted");
    }

    if ctx.is_first_entry && qty < cfg.first_entry_min_qty {
        return veto("below_first_entry_min_qty");
    }

    GateResult {
        action: GateAction::Allow,
        qty,
        reason: "ok",
    }
}

fn scale_to_room(qty: u64, price: f64, room: f64) -> u64 {
    if price <= 0.0 {
        return qty;
    }
    let max_affordable = (room / price).floor().max(0.0) as u64;
    qty.min(max_affordable)
}

fn veto(reason: &'static str) -> GateResult {
    GateResult {
        action: GateAction::Veto,
        qty: 0,
        reason,
    }
}

/// Game-clock gate used to populate `RiskContext::game_clock_gate_pass`
/// (§4.F): blocks entries too early in period 1 or too late in the final
/// period, thresholds differing by sport per §4.F's table. `period`/
/// `minutes_remaining_in_period` come from `OddsAdapter::refresh_event_moneyline`'s
/// per-event live clock; `None` only when that feed hasn't populated a
/// clock yet for this event (pre-kickoff or a missed refresh), in which
/// case the gate fails open like the rest of the clock-dependent rules.
pub fn game_clock_gate_pass(
    cfg: &Config,
    period: Option<u32>,
    minutes_remaining_in_period: Option<f64>,
    final_period: u32,
) -> bool {
    let (Some(period), Some(minutes)) = (period, minutes_remaining_in_period) else {
        return true;
    };
    if period == 1 {
        // "below threshold elapsed" in period 1 == still above the
        // early-game minutes-remaining threshold.
        return minutes <= cfg.game_clock_early_threshold_minutes;
    }
    if period == final_period {
        return minutes >= cfg.game_clock_late_threshold_minutes;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_ctx() -> RiskContext {
        RiskContext {
            is_first_entry: true,
            is_hedge_leg: false,
            is_pyramid: false,
            spread: 0.02,
            ev: 0.05,
            entry_price: 0.45,
            kelly: 0.10,
            event_volume_24h: 10_000,
            candidate_stake_value: 45.0,
            current_side_exposure: 0.0,
            total_event_exposure: 0.0,
            total_exposure_all_events: 0.0,
            half_hedge_lock_active: false,
            pyramiding_allowed: false,
            stop_loss_cooldown_active: false,
            seven_pct_exited: false,
            time_since_first_detection: Some(Duration::from_secs(60)),
            game_clock_gate_pass: true,
            fresh_odds: true,
            is_nba: false,
        }
    }

    #[test]
    fn allows_clean_first_entry() {
        let cfg = Config::default();
        let ctx = base_ctx();
        let result = check_entry(&cfg, &ctx, 10);
        assert_eq!(result.action, GateAction::Allow);
        assert_eq!(result.qty, 10);
    }

    #[test]
    fn vetoes_seven_pct_exited_permanently() {
        let cfg = Config::default();
        let mut ctx = base_ctx();
        ctx.seven_pct_exited = true;
        let result = check_entry(&cfg, &ctx, 10);
        assert_eq!(result.action, GateAction::Veto);
        assert_eq!(result.reason, "seven_pct_exited");
    }

    #[test]
    fn half_hedge_lock_blocks_same_side_but_not_hedge_leg() {
        let cfg = Config::default();
        let mut ctx = base_ctx();
        ctx.half_hedge_lock_active = true;
        let result = check_entry(&cfg, &ctx, 10);
        assert_eq!(result.reason, "half_hedge_lock");

        ctx.is_hedge_leg = true;
        let result = check_entry(&cfg, &ctx, 10);
        assert_eq!(result.action, GateAction::Allow);
    }

    #[test]
    fn scales_down_then_vetoes_below_min_qty() {
        let cfg = Config::default();
        let mut ctx = base_ctx();
        ctx.current_side_exposure = cfg.max_stake_pct * cfg.capital - 1.0; // almost exhausted
        let result = check_entry(&cfg, &ctx, 100);
        assert_eq!(result.action, GateAction::Veto);
        assert_eq!(result.reason, "below_first_entry_min_qty");
    }

    #[test]
    fn kelly_floor_bypassed_for_hedge_legs() {
        let cfg = Config::default();
        let mut ctx = base_ctx();
        ctx.kelly = 0.0;
        assert_eq!(check_entry(&cfg, &ctx, 5).reason, "kelly_floor");
        ctx.is_hedge_leg = true;
        assert_eq!(check_entry(&cfg, &ctx, 5).action, GateAction::Allow);
    }
}
