use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecMode {
    Live,
    Paper,
}

impl ExecMode {
    pub fn is_paper(self) -> bool {
        matches!(self, ExecMode::Paper)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DevigMethod {
    Logit,
    Shin,
}

/// All tunable thresholds named throughout spec §4. Plain struct + a
/// concrete `Default`, following `config.rs` in the teacher; a
/// `--config <path>` TOML overlay (§6) is applied on top by `ConfigFile`
/// in `main.rs`.
#[derive(Debug, Clone)]
pub struct Config {
    pub exec_mode: ExecMode,
    pub devig_method: DevigMethod,

    // --- tick intervals (§4.I, §5) ---
    pub strategy_tick: Duration,
    pub stop_loss_tick: Duration,
    pub ui_tick: Duration,
    pub discovery_interval: Duration,

    // --- pricing & EV kernel (§4.A) ---
    pub fill_prob_exponent: f64,
    pub fill_prob_penalty: f64,
    pub fill_prob_wide_spread_threshold: f64,
    pub fill_prob_wide_spread_penalty: f64,
    pub fill_prob_near_end_threshold_minutes: f64,
    pub fill_prob_near_end_penalty: f64,
    pub roundtrip_cost: f64,
    pub kelly_fraction_scaler: f64,

    // --- risk gate (§4.F) ---
    pub max_spread_absolute: f64,
    pub max_spread_ev_ratio: f64,
    pub min_price: f64,
    pub max_price: f64,
    pub min_volume_24h: u64,
    pub min_kelly: f64,
    pub max_stake_pct: f64,
    pub hedge_max_stake_pct: f64,
    pub max_exposure_per_game_pct: f64,
    pub max_total_exposure_pct: f64,
    pub max_total_exposure_hedge_pct: f64,
    pub first_entry_min_qty: u64,
    pub first_trade_window: Duration,
    pub game_clock_early_threshold_minutes: f64,
    pub game_clock_late_threshold_minutes: f64,
    pub enable_nba_trading: bool,
    pub capital: f64,

    // --- hedge planner (§4.G) ---
    pub min_hedge_return: f64,
    pub hedge_overlevered_ratio: f64,
    pub hedge_balance_fraction: f64,

    // --- profit protector (§4.H) ---
    pub exit_min: f64,
    pub exit_max: f64,
    pub exit_time_minutes: f64,
    pub hedge_balance_sanity_ratio: f64,
    pub pyramiding_window: Duration,
    pub max_profit_threshold: f64,
    pub profit_protection_min_margin_above_settlement: f64,
    pub profit_protection_min_absolute_profit: f64,
    pub min_profit_for_trailing_stop: f64,
    pub trailing_stop_pct: f64,
    pub trailing_stop_tighten_threshold: f64,
    pub profit_protection_min_hold_seconds: f64,
    pub profit_protection_min_time_remaining: f64,

    // --- stop-loss worker (§4.I) ---
    pub hard_stop_pct: f64,
    pub soft_stop_pct: f64,
    pub odds_diff_threshold: f64,
    pub stop_loss_min_hold: Duration,
    pub stop_loss_cooldown_minutes: f64,
    pub allow_stop_loss_price_recovery: bool,

    // --- pyramiding (§4.I) ---
    pub pyramid_on_winner_enabled: bool,
    pub pyramid_min_increase: f64,

    // --- odds adapter (§4.D) ---
    pub odds_fetch_min_interval: Duration,
    pub sports: Vec<String>,

    // --- exchange adapter (§4.C) ---
    pub quote_stale_secs: i64,
    pub max_reconnect_delay: Duration,
    pub order_wait_timeout_taker: Duration,
    pub order_wait_timeout_maker: Duration,

    // --- market matcher (§4.E) ---
    pub match_cache_ttl: Duration,

    // --- concurrency (§5) ---
    pub closing_stale_reap: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            exec_mode: ExecMode::Paper,
            devig_method: DevigMethod::Logit,

            strategy_tick: Duration::from_secs(12),
            stop_loss_tick: Duration::from_secs(3),
            ui_tick: Duration::from_secs(5),
            discovery_interval: Duration::from_secs(300),

            fill_prob_exponent: 1.5,
            fill_prob_penalty: 0.9,
            fill_prob_wide_spread_threshold: 0.06,
            fill_prob_wide_spread_penalty: 0.25,
            fill_prob_near_end_threshold_minutes: 3.0,
            fill_prob_near_end_penalty: 0.40,
            roundtrip_cost: 0.01,
            kelly_fraction_scaler: 0.25,

            max_spread_absolute: 0.08,
            max_spread_ev_ratio: 3.0,
            min_price: 0.03,
            max_price: 0.92,
            min_volume_24h: 500,
            min_kelly: 0.02,
            max_stake_pct: 0.03,
            hedge_max_stake_pct: 0.06,
            max_exposure_per_game_pct: 0.10,
            max_total_exposure_pct: 0.40,
            max_total_exposure_hedge_pct: 0.60,
            first_entry_min_qty: 2,
            first_trade_window: Duration::from_secs(20 * 60),
            game_clock_early_threshold_minutes: 9.0,
            game_clock_late_threshold_minutes: 2.0,
            enable_nba_trading: true,
            capital: 2_000.0,

            min_hedge_return: 0.02,
            hedge_overlevered_ratio: 0.625,
            hedge_balance_fraction: 0.80,

            exit_min: 0.02,
            exit_max: 0.10,
            exit_time_minutes: 3.0,
            hedge_balance_sanity_ratio: 0.30,
            pyramiding_window: Duration::from_secs(300),
            max_profit_threshold: 0.80,
            profit_protection_min_margin_above_settlement: 0.03,
            profit_protection_min_absolute_profit: 0.015,
            min_profit_for_trailing_stop: 0.03,
            trailing_stop_pct: 0.02,
            trailing_stop_tighten_threshold: 0.15,
            profit_protection_min_hold_seconds: 45.0,
            profit_protection_min_time_remaining: 30.0,

            hard_stop_pct: 0.50,
            soft_stop_pct: 0.225,
            odds_diff_threshold: 0.08,
            stop_loss_min_hold: Duration::from_secs(60),
            stop_loss_cooldown_minutes: 180.0,
            allow_stop_loss_price_recovery: true,

            pyramid_on_winner_enabled: true,
            pyramid_min_increase: 0.04,

            odds_fetch_min_interval: Duration::from_millis(120),
            sports: vec!["NFL".into(), "NBA".into(), "CBBM".into(), "CBBW".into()],

            quote_stale_secs: 8,
            max_reconnect_delay: Duration::from_secs(30),
            order_wait_timeout_taker: Duration::from_secs(5),
            order_wait_timeout_maker: Duration::from_secs(20),

            match_cache_ttl: Duration::from_secs(3600),

            closing_stale_reap: Duration::from_secs(5 * 60),
        }
    }
}

/// `--config <path>` overlay (§6). Every field optional; present fields
/// override `Config::default()`. Loaded via `toml` the way sibling
/// prediction-market bots (`leodid68-poly5m`, `usealtoal-edgelord`) load
/// their file-based config, since the teacher has no such layer.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    pub capital: Option<f64>,
    pub sports: Option<Vec<String>>,
    pub enable_nba_trading: Option<bool>,
    pub min_kelly: Option<f64>,
    pub max_total_exposure_pct: Option<f64>,
    pub devig_method: Option<String>,
}

impl ConfigFile {
    pub fn apply(self, mut cfg: Config) -> Config {
        if let Some(v) = self.capital {
            cfg.capital = v;
        }
        if let Some(v) = self.sports {
            cfg.sports = v;
        }
        if let Some(v) = self.enable_nba_trading {
            cfg.enable_nba_trading = v;
        }
        if let Some(v) = self.min_kelly {
            cfg.min_kelly = v;
        }
        if let Some(v) = self.max_total_exposure_pct {
            cfg.max_total_exposure_pct = v;
        }
        if let Some(v) = self.devig_method {
            cfg.devig_method = match v.to_lowercase().as_str() {
                "shin" => DevigMethod::Shin,
                _ => DevigMethod::Logit,
            };
        }
        cfg
    }
}
