//! Engine orchestrator (§4.I). Spawns the strategy, stop-loss, and
//! UI/metrics workers plus the quote subscriber, and drives the shutdown
//! sequence on Ctrl-C: each worker finishes its current tick, the store is
//! persisted, then the process exits.

use std::sync::Arc;

use kalshi_rs::{KalshiClient, KalshiWebsocketClient};
use tokio::signal;
use tracing::info;

use crate::config::Config;
use crate::engine::stop_loss::StopLossWorker;
use crate::engine::strategy::StrategyWorker;
use crate::engine::ui::UiWorker;
use crate::engine::ShutdownFlag;
use crate::exchange::spawn_quote_subscriber;
use crate::matcher::MatchCache;
use crate::metrics::Metrics;
use crate::odds::OddsAdapter;
use crate::profit_protector::PeakProfitTracker;
use crate::state::Shared;

pub async fn run_engine(
    cfg: Config,
    shared: Shared,
    client: Arc<KalshiClient>,
    ws: KalshiWebsocketClient,
    odds: Arc<OddsAdapter>,
) -> anyhow::Result<()> {
    let metrics = Arc::new(Metrics::new());
    let match_cache = Arc::new(MatchCache::new(cfg.match_cache_ttl));
    let peaks = Arc::new(PeakProfitTracker::new());
    let shutdown = ShutdownFlag::new();

    // Keep the returned handle alive: dropping it would close the control
    // channel the subscriber reads subscription updates from.
    let _quote_handle = spawn_quote_subscriber(ws, cfg.clone(), shared.clone(), shared.quotes.subscribed_tickers());

    let strategy = Arc::new(StrategyWorker::new(
        cfg.clone(),
        shared.clone(),
        client.clone(),
        odds.clone(),
        match_cache.clone(),
        metrics.clone(),
        shutdown.clone(),
    ));
    let stop_loss = Arc::new(StopLossWorker::new(
        cfg.clone(),
        shared.clone(),
        client.clone(),
        odds.clone(),
        strategy.clone(),
        peaks.clone(),
        metrics.clone(),
        shutdown.clone(),
    ));
    let ui = Arc::new(UiWorker::new(cfg.clone(), shared.clone(), metrics.clone(), shutdown.clone()));

    let strategy_handle = tokio::spawn(strategy.clone().run());
    let stop_loss_handle = tokio::spawn(stop_loss.clone().run());
    let ui_handle = tokio::spawn(ui.clone().run());

    signal::ctrl_c().await?;
    info!("shutdown signal received; draining workers");
    shutdown.trigger();

    let _ = tokio::join!(strategy_handle, stop_loss_handle, ui_handle);

    shared.persist().await?;
    info!("state persisted; exiting");
    Ok(())
}
