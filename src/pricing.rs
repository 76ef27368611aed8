//! Pricing & EV kernel (§4.A). Pure functions, no I/O — grounded in
//! `examples/original_source/myles_repo/math_calculations/ev.py`.

use crate::config::{Config, DevigMethod};

const EPS: f64 = 1e-6;

fn clamp_prob(p: f64) -> f64 {
    p.clamp(EPS, 1.0 - EPS)
}

fn logit(p: f64) -> f64 {
    let p = clamp_prob(p);
    (p / (1.0 - p)).ln()
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// De-vig by shifting both logits by a common `lambda` until the fair
/// probabilities sum to 1. Bisection over `lambda in [-50, 50]`; falls back
/// to proportional normalization if the bracket doesn't converge.
pub fn de_vig_logit(p1: f64, p2: f64) -> (f64, f64) {
    let p1 = clamp_prob(p1);
    let p2 = clamp_prob(p2);
    let l1 = logit(p1);
    let l2 = logit(p2);

    let f = |lambda: f64| sigmoid(l1 - lambda) + sigmoid(l2 - lambda) - 1.0;

    let mut lo = -50.0_f64;
    let mut hi = 50.0_f64;
    let mut flo = f(lo);
    let fhi = f(hi);
    if flo.signum() == fhi.signum() {
        return de_vig_proportional(p1, p2);
    }

    let mut lambda = 0.0;
    for _ in 0..200 {
        lambda = (lo + hi) / 2.0;
        let fm = f(lambda);
        if fm.abs() < 1e-12 {
            break;
        }
        if fm.signum() == flo.signum() {
            lo = lambda;
            flo = fm;
        } else {
            hi = lambda;
        }
    }

    let q1 = sigmoid(l1 - lambda);
    let q2 = sigmoid(l2 - lambda);
    let s = q1 + q2;
    if s.is_finite() && s > 0.0 {
        (q1 / s, q2 / s)
    } else {
        de_vig_proportional(p1, p2)
    }
}

/// Proportional-normalization fallback: `p_i / (p1 + p2)`.
pub fn de_vig_proportional(p1: f64, p2: f64) -> (f64, f64) {
    let s = p1 + p2;
    if s <= 0.0 {
        (0.5, 0.5)
    } else {
        (p1 / s, p2 / s)
    }
}

/// Two-way Shin model de-vig, an alternative strategy selectable via
/// `Config::devig_method` (Q2). Newton iteration on the insider-trading
/// parameter `z`, matching `devig_shin_two_way` in `ev.py`.
pub fn de_vig_shin(dec_home: f64, dec_away: f64) -> (f64, f64) {
    let ph = 1.0 / dec_home;
    let pa = 1.0 / dec_away;
    let s = ph + pa;
    let (qh, qa) = (ph / s, pa / s);
    let mut z = 0.0_f64;

    let fair_q = |q: f64, z: f64| (z * z + 4.0 * (1.0 - z) * q).sqrt().max(0.0) - z;
    let fair_q = |q: f64, z: f64| fair_q(q, z) / (2.0 * (1.0 - z) + 1e-12);

    let (mut fh, mut fa) = (qh, qa);
    for _ in 0..100 {
        fh = fair_q(qh, z);
        fa = fair_q(qa, z);
        let f_val = fh + fa - 1.0;
        if f_val.abs() < 1e-9 {
            break;
        }
        let dz = 1e-5;
        let f_prime = fair_q(qh, z + dz) + fair_q(qa, z + dz) - 1.0;
        let d_f = if (f_prime - f_val).abs() > 1e-15 {
            (f_prime - f_val) / dz
        } else {
            0.0
        };
        if d_f.abs() < 1e-12 {
            break;
        }
        z = (z - f_val / d_f).clamp(0.0, 0.999_999);
    }
    (fh, fa)
}

/// De-vig raw moneyline-implied probabilities using the configured method.
/// `p1, p2` are `1/decimal_odds` for the two sides.
pub fn de_vig(cfg: &Config, p1: f64, p2: f64) -> (f64, f64) {
    match cfg.devig_method {
        DevigMethod::Logit => de_vig_logit(p1, p2),
        DevigMethod::Shin => {
            // Shin needs decimal odds, not implied probs; invert.
            if p1 <= 0.0 || p2 <= 0.0 {
                return de_vig_proportional(p1, p2);
            }
            de_vig_shin(1.0 / p1, 1.0 / p2)
        }
    }
}

/// Fee schedule, treated as opaque per §4.A/Q4: a concave bowl, symmetric
/// about 0.5, bounded in `[0, ~0.04]`, maker cheaper than taker at the same
/// price.
pub fn fee_per_contract(price: f64, is_maker: bool) -> f64 {
    let price = price.clamp(0.0, 1.0);
    let bowl = 0.07 * price * (1.0 - price);
    let fee = if is_maker { bowl * 0.35 } else { bowl };
    fee.clamp(0.0, 0.04)
}

pub fn ev_at_buy(true_prob: f64, ask_price: f64, is_maker: bool) -> f64 {
    true_prob - ask_price - fee_per_contract(ask_price, is_maker)
}

pub fn ev_at_settlement(true_prob: f64, entry_price: f64) -> f64 {
    true_prob - entry_price - fee_per_contract(entry_price, false)
}

/// Kelly fraction using the effective price `price + roundtrip_cost`,
/// clamped into `[eps, 1-eps]`.
pub fn kelly_fraction(p: f64, price: f64, roundtrip_cost: f64) -> f64 {
    let p_eff = clamp_prob(price + roundtrip_cost);
    let b = 1.0 / p_eff - 1.0;
    if b <= 0.0 {
        return 0.0;
    }
    let q = 1.0 - p;
    ((b * p - q) / b).max(0.0)
}

/// Parses a period/clock string like `"Q4 2:15"` or `"P2 00:45"` into
/// `(period, minutes_remaining)`. Grounded in
/// `odds_feed.formatting._parse_period_clock`.
pub fn parse_period_clock(s: &str) -> Option<(u32, f64)> {
    let s = s.trim();
    let mut parts = s.split_whitespace();
    let period_tok = parts.next()?;
    let clock_tok = parts.next()?;

    let digits: String = period_tok.chars().filter(|c| c.is_ascii_digit()).collect();
    let period: u32 = digits.parse().ok()?;

    let mut clock_parts = clock_tok.split(':');
    let mins: f64 = clock_parts.next()?.parse().ok()?;
    let secs: f64 = clock_parts.next().unwrap_or("0").parse().unwrap_or(0.0);
    Some((period, mins + secs / 60.0))
}

/// Estimate the probability a passive limit order fills (§4.A). `side`
/// selects which side of the book the order rests on.
#[allow(clippy::too_many_arguments)]
pub fn fill_probability(
    cfg: &Config,
    limit_price: f64,
    bid: Option<f64>,
    ask: Option<f64>,
    side_is_yes: bool,
    spread: Option<f64>,
    period_clock: Option<&str>,
    is_womens: bool,
) -> f64 {
    let (Some(bid), Some(ask)) = (bid, ask) else {
        return 0.0;
    };
    let spread_width = spread.unwrap_or(ask - bid);
    if spread_width <= 0.0 {
        return 0.0;
    }

    let base = if side_is_yes {
        if limit_price >= ask {
            return 1.0;
        }
        let distance = ask - limit_price;
        if distance >= spread_width {
            return 0.0;
        }
        1.0 - distance / spread_width
    } else {
        if limit_price <= bid {
            return 1.0;
        }
        let distance = limit_price - bid;
        if distance >= spread_width {
            return 0.0;
        }
        1.0 - distance / spread_width
    };

    let mut probability = base.powf(cfg.fill_prob_exponent) * cfg.fill_prob_penalty;

    if spread_width > cfg.fill_prob_wide_spread_threshold {
        probability *= 1.0 - cfg.fill_prob_wide_spread_penalty;
    }

    if let Some(clock) = period_clock {
        if let Some((period, minutes_remaining)) = parse_period_clock(clock) {
            let final_period = if is_womens { 4 } else { 2 };
            let near_end =
                period == final_period && minutes_remaining <= cfg.fill_prob_near_end_threshold_minutes;
            if near_end {
                probability *= 1.0 - cfg.fill_prob_near_end_penalty;
            }
        }
    }

    probability.clamp(0.0, 1.0)
}

#[derive(Debug, Clone, Copy)]
pub struct MakerTakerChoice {
    pub use_maker: bool,
    pub best_expected_ev: f64,
    pub fill_prob: f64,
    pub order_price: f64,
}

/// Compares maker vs taker expected value and picks an order strategy
/// (§4.A). Grounded in `ev.py::choose_maker_vs_taker`.
#[allow(clippy::too_many_arguments)]
pub fn choose_maker_vs_taker(
    cfg: &Config,
    true_prob: f64,
    bid: Option<f64>,
    ask: Option<f64>,
    qty: u64,
    mid: Option<f64>,
    spread: Option<f64>,
    period_clock: Option<&str>,
    is_womens: bool,
) -> MakerTakerChoice {
    let (Some(bid), Some(ask)) = (bid, ask) else {
        let order_price = ask.unwrap_or(0.5);
        return MakerTakerChoice {
            use_maker: false,
            best_expected_ev: ev_at_buy(true_prob, order_price, false),
            fill_prob: 0.0,
            order_price,
        };
    };

    let mid = mid.unwrap_or((bid + ask) / 2.0);
    let spread = spread.unwrap_or(ask - bid);

    let ev_taker = ev_at_buy(true_prob, ask, false);
    let ev_maker = ev_at_buy(true_prob, mid, true);

    let fill_prob_maker = fill_probability(
        cfg,
        mid,
        Some(bid),
        Some(ask),
        true,
        Some(spread),
        period_clock,
        is_womens,
    );

    let mut expected_ev_maker = ev_maker * fill_prob_maker;
    let expected_ev_taker = ev_taker;

    if qty > 50 && fill_prob_maker < 0.40 {
        expected_ev_maker *= 0.8;
    }

    if fill_prob_maker < 0.20 {
        return MakerTakerChoice {
            use_maker: false,
            best_expected_ev: ev_taker,
            fill_prob: fill_prob_maker,
            order_price: ask,
        };
    }

    if fill_prob_maker > 0.60 && expected_ev_maker > expected_ev_taker * 0.9 {
        return MakerTakerChoice {
            use_maker: true,
            best_expected_ev: expected_ev_maker,
            fill_prob: fill_prob_maker,
            order_price: mid,
        };
    }

    let use_maker = expected_ev_maker > expected_ev_taker;
    MakerTakerChoice {
        use_maker,
        best_expected_ev: expected_ev_maker.max(expected_ev_taker),
        fill_prob: fill_prob_maker,
        order_price: if use_maker { mid } else { ask },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn devig_logit_sums_to_one() {
        // S1: p1=0.555, p2=0.500 (book total 1.055)
        let (q1, q2) = de_vig_logit(0.555, 0.500);
        assert!((q1 + q2 - 1.0).abs() < 1e-9);
        assert!((q1 - 0.528).abs() < 0.01, "q1={q1}");
    }

    #[test]
    fn devig_proportional_sums_to_one() {
        let (q1, q2) = de_vig_proportional(0.6, 0.5);
        assert!((q1 + q2 - 1.0).abs() < 1e-12);
    }

    #[test]
    fn kelly_fraction_nonnegative() {
        let f = kelly_fraction(0.6, 0.50, 0.01);
        assert!(f > 0.0);
        let f_losing = kelly_fraction(0.3, 0.50, 0.01);
        assert_eq!(f_losing, 0.0);
    }

    #[test]
    fn fill_probability_monotone_and_bounds() {
        let cfg = Config::default();
        let p_at_ask = fill_probability(&cfg, 0.60, Some(0.50), Some(0.60), true, None, None, false);
        assert_eq!(p_at_ask, 1.0);

        let p_outside =
            fill_probability(&cfg, 0.39, Some(0.50), Some(0.60), true, None, None, false);
        assert_eq!(p_outside, 0.0);

        let p_mid = fill_probability(&cfg, 0.55, Some(0.50), Some(0.60), true, None, None, false);
        let p_near_bid = fill_probability(&cfg, 0.51, Some(0.50), Some(0.60), true, None, None, false);
        assert!(p_mid >= p_near_bid, "fill prob should rise toward the ask");
    }

    #[test]
    fn fee_symmetric_about_half() {
        let f_low = fee_per_contract(0.30, false);
        let f_high = fee_per_contract(0.70, false);
        assert!((f_low - f_high).abs() < 1e-9);
    }

    #[test]
    fn maker_forced_taker_on_thin_fill_prob() {
        let cfg = Config::default();
        // Very wide spread pushes maker fill probability well below 0.20.
        let choice = choose_maker_vs_taker(
            &cfg, 0.70, Some(0.10), Some(0.90), 10, None, None, None, false,
        );
        assert!(!choice.use_maker);
    }

    #[test]
    fn parses_period_clock() {
        assert_eq!(parse_period_clock("Q4 2:15"), Some((4, 2.25)));
        assert_eq!(parse_period_clock("P2 00:45"), Some((2, 0.75)));
        assert_eq!(parse_period_clock("garbage"), None);
    }
}
