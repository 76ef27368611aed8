//! Profit protector (§4.H). Grounded in
//! `examples/original_source/myles_repo/risk/profit_protection.py`.

use dashmap::DashMap;

use crate::config::Config;
use crate::hedge::hedge_outcome_rois;
use crate::pricing::{fee_per_contract, parse_period_clock};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitAction {
    /// Only one side closes; used by the absolute aggressive exit (rule 1).
    ClosePartial(PartialSide),
    /// Both sides close (rules 5, 6).
    CloseBoth,
    Hold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartialSide {
    A,
    B,
}

#[derive(Debug, Clone, Copy)]
pub struct ExitDecision {
    pub action: ExitAction,
    pub reason: &'static str,
    pub current_profit_pct: f64,
}

/// Per-event monotonic peak mark-to-bid profit, keyed by `event_ticker`.
/// Owning component for `peak_profit_pct` per §9 ("extension fields move
/// to owning components").
#[derive(Debug, Default)]
pub struct PeakProfitTracker {
    peaks: DashMap<String, f64>,
}

impl PeakProfitTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn update(&self, event_ticker: &str, current_profit_pct: f64) -> f64 {
        let mut entry = self.peaks.entry(event_ticker.to_string()).or_insert(current_profit_pct);
        if current_profit_pct > *entry {
            *entry = current_profit_pct;
        }
        *entry
    }

    pub fn clear(&self, event_ticker: &str) {
        self.peaks.remove(event_ticker);
    }
}

/// Settlement ROI for each outcome given current cost-weighted positions.
pub fn settlement_rois(qa: f64, pa: f64, qb: f64, pb: f64) -> (f64, f64) {
    hedge_outcome_rois(qa, pa, qb, pb, false, false)
}

/// Mark-to-bid unrealized profit, as a fraction of total entry cost.
pub fn current_profit_mtm(qa: f64, pa: f64, qb: f64, pb: f64, bid_a: f64, bid_b: f64) -> f64 {
    let fa_entry = fee_per_contract(pa, false);
    let fb_entry = fee_per_contract(pb, false);
    let fa_sell = fee_per_contract(bid_a, true);
    let fb_sell = fee_per_contract(bid_b, true);

    let net_proceeds = qa * bid_a - qa * fa_sell + qb * bid_b - qb * fb_sell;
    let total_entry_cost = qa * (pa + fa_entry) + qb * (pb + fb_entry);
    if total_entry_cost <= 0.0 {
        return 0.0;
    }
    (net_proceeds - total_entry_cost) / total_entry_cost
}

/// Maximum attainable ROI at settlement given current cost basis.
pub fn theoretical_max_profit(qa: f64, pa: f64, qb: f64, pb: f64) -> f64 {
    let locked = qa * pa + qb * pb;
    if locked <= 0.0 {
        return 0.0;
    }
    let (roi_a, roi_b) = settlement_rois(qa, pa, qb, pb);
    roi_a.max(roi_b)
}

/// Whether either side of this event received a fill within the last
/// `window`. Grounded in `check_if_positions_growing_recently`.
pub fn positions_growing_recently(
    most_recent_entry_age: Option<std::time::Duration>,
    window: std::time::Duration,
) -> bool {
    match most_recent_entry_age {
        Some(age) => age < window,
        None => false,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GameClock<'a> {
    pub period_clock: Option<&'a str>,
    pub is_nba: bool,
    pub is_womens: bool,
}

/// Clock gate for the rule-1 aggressive exit: only active in the final
/// period with remaining minutes <= `exit_time_minutes`. `clock.period_clock`
/// comes from `OddsAdapter::refresh_event_moneyline`'s per-event live feed
/// and is populated for essentially every in-play event; the no-data
/// "always allowed" fallback below only covers the genuine gap (pre-kickoff
/// or a single missed refresh), and mirrors `_can_trigger_7pct_exit`'s
/// identical no-data-means-allow default.
fn can_trigger_absolute_exit(cfg: &Config, clock: &GameClock) -> bool {
    let Some(raw) = clock.period_clock else {
        return true;
    };
    let Some((period, minutes_remaining)) = parse_period_clock(raw) else {
        return true;
    };
    let final_period = if clock.is_nba || clock.is_womens { 4 } else { 2 };
    period == final_period && minutes_remaining <= cfg.exit_time_minutes
}

#[allow(clippy::too_many_arguments)]
pub fn evaluate(
    cfg: &Config,
    peaks: &PeakProfitTracker,
    event_ticker: &str,
    qa: f64,
    pa: f64,
    qb: f64,
    pb: f64,
    bid_a: f64,
    bid_b: f64,
    most_recent_entry_age: Option<std::time::Duration>,
    clock: GameClock,
) -> ExitDecision {
    if qa <= 0.0 || qb <= 0.0 {
        return ExitDecision {
            action: ExitAction::Hold,
            reason: "not_hedged",
            current_profit_pct: 0.0,
        };
    }

    // Rule 1: absolute aggressive exit (partial), bypasses everything else.
    if can_trigger_absolute_exit(cfg, &clock) {
        if bid_a <= cfg.exit_max && bid_a >= cfg.exit_min {
            return ExitDecision {
                action: ExitAction::ClosePartial(PartialSide::A),
                reason: "absolute_exit_side_a",
                current_profit_pct: 0.0,
            };
        }
        if bid_b <= cfg.exit_max && bid_b >= cfg.exit_min {
            return ExitDecision {
                action: ExitAction::ClosePartial(PartialSide::B),
                reason: "absolute_exit_side_b",
                current_profit_pct: 0.0,
            };
        }
    }

    // Rule 2: hedge-balance sanity.
    let hedge_ratio = qa.min(qb) / qa.max(qb);
    if hedge_ratio < cfg.hedge_balance_sanity_ratio {
        return ExitDecision {
            action: ExitAction::Hold,
            reason: "unbalanced_hedge",
            current_profit_pct: 0.0,
        };
    }

    // Rule 3: pyramiding freeze.
    let is_growing = positions_growing_recently(most_recent_entry_age, cfg.pyramiding_window);
    if is_growing {
        return ExitDecision {
            action: ExitAction::Hold,
            reason: "active_pyramiding",
            current_profit_pct: 0.0,
        };
    }

    let (roi_a, roi_b) = settlement_rois(qa, pa, qb, pb);
    let current_profit_pct = current_profit_mtm(qa, pa, qb, pb, bid_a, bid_b);

    let total_price = bid_a + bid_b;
    let (prob_a, prob_b) = if total_price > 0.0 {
        (bid_a / total_price, bid_b / total_price)
    } else {
        (0.5, 0.5)
    };
    let weighted_settlement_roi = prob_a * roi_a + prob_b * roi_b;

    // Rule 4: settlement-dominates check.
    if current_profit_pct < weighted_settlement_roi {
        return ExitDecision {
            action: ExitAction::Hold,
            reason: "worse_than_settlement",
            current_profit_pct,
        };
    }

    let peak_profit_pct = peaks.update(event_ticker, current_profit_pct);

    // Rule 5: theoretical-max trigger.
    let max_settlement_roi = theoretical_max_profit(qa, pa, qb, pb);
    if max_settlement_roi > 0.0 {
        let max_profit_ratio = current_profit_pct / max_settlement_roi;
        if max_profit_ratio >= cfg.max_profit_threshold {
            let margin = cfg.profit_protection_min_margin_above_settlement * 0.33;
            let required = weighted_settlement_roi + margin;
            if current_profit_pct >= required && current_profit_pct >= cfg.profit_protection_min_absolute_profit {
                return ExitDecision {
                    action: ExitAction::CloseBoth,
                    reason: "max_profit_no_pyramiding",
                    current_profit_pct,
                };
            }
        }
    }

    // Rule 6: trailing-stop trigger.
    if current_profit_pct >= cfg.min_profit_for_trailing_stop {
        let trailing_stop_pct = if peak_profit_pct >= cfg.trailing_stop_tighten_threshold {
            cfg.trailing_stop_pct * 0.5
        } else {
            cfg.trailing_stop_pct
        };
        let drop_from_peak = (peak_profit_pct - current_profit_pct).max(0.0);
        if drop_from_peak >= trailing_stop_pct {
            let margin = (cfg.profit_protection_min_margin_above_settlement * 0.5).min(0.0075);
            let required = weighted_settlement_roi + margin;
            if current_profit_pct > required && current_profit_pct >= cfg.profit_protection_min_absolute_profit {
                return ExitDecision {
                    action: ExitAction::CloseBoth,
                    reason: "trailing_stop_no_pyramiding",
                    current_profit_pct,
                };
            }
        }
    }

    // Rule 7: hold.
    ExitDecision {
        action: ExitAction::Hold,
        reason: "hold",
        current_profit_pct,
    }
}

/// Re-validation before executing a queued close (§4.H): re-fetch live
/// bids, recompute the rule that fired. Rule 1 (absolute exit) explicitly
/// skips this and executes regardless.
pub fn revalidate(
    cfg: &Config,
    peaks: &PeakProfitTracker,
    event_ticker: &str,
    original: ExitDecision,
    qa: f64,
    pa: f64,
    qb: f64,
    pb: f64,
    bid_a: f64,
    bid_b: f64,
    most_recent_entry_age: Option<std::time::Duration>,
    clock: GameClock,
) -> bool {
    if matches!(original.action, ExitAction::ClosePartial(_)) && original.reason.starts_with("absolute_exit") {
        return true;
    }
    let fresh = evaluate(
        cfg,
        peaks,
        event_ticker,
        qa,
        pa,
        qb,
        pb,
        bid_a,
        bid_b,
        most_recent_entry_age,
        clock,
    );
    fresh.action == original.action
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_clock() -> GameClock<'static> {
        GameClock {
            period_clock: None,
            is_nba: false,
            is_womens: false,
        }
    }

    #[test]
    fn scenario_s4_seven_pct_exit_fires() {
        let cfg = Config::default();
        let peaks = PeakProfitTracker::new();
        let clock = GameClock {
            period_clock: Some("Q2 1:00"),
            is_nba: false,
            is_womens: false,
        };
        let decision = evaluate(
            &cfg, &peaks, "EVT", 80.0, 0.55, 60.0, 0.48, 0.06, 0.55, None, clock,
        );
        assert_eq!(decision.action, ExitAction::ClosePartial(PartialSide::A));
    }

    #[test]
    fn unbalanced_hedge_blocks_exit() {
        let cfg = Config::default();
        let peaks = PeakProfitTracker::new();
        let decision = evaluate(&cfg, &peaks, "EVT2", 100.0, 0.5, 10.0, 0.5, 0.9, 0.5, None, no_clock());
        assert_eq!(decision.action, ExitAction::Hold);
        assert_eq!(decision.reason, "unbalanced_hedge");
    }

    #[test]
    fn pyramiding_freeze_blocks_exit() {
        let cfg = Config::default();
        let peaks = PeakProfitTracker::new();
        let decision = evaluate(
            &cfg,
            &peaks,
            "EVT3",
            100.0,
            0.45,
            100.0,
            0.45,
            0.9,
            0.9,
            Some(std::time::Duration::from_secs(5)),
            no_clock(),
        );
        assert_eq!(decision.reason, "active_pyramiding");
    }

    #[test]
    fn holds_when_worse_than_settlement() {
        let cfg = Config::default();
        let peaks = PeakProfitTracker::new();
        // Bids equal to entry prices => zero MTM profit, but settlement ROI
        // from a well-priced hedge is positive, so it should hold.
        let decision = evaluate(&cfg, &peaks, "EVT4", 100.0, 0.40, 90.0, 0.45, 0.40, 0.45, None, no_clock());
        assert_eq!(decision.reason, "worse_than_settlement");
    }
}
