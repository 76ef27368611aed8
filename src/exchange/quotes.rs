//! Quote subscription (§4.C). Subscribes to the `ticker` and `fill`
//! channels, maintains `Shared::quotes`, and reconnects with exponential
//! backoff capped at `cfg.max_reconnect_delay`, re-subscribing to the
//! current required-ticker set on every reconnect. Adapted from the
//! teacher's `ws/task.rs`, which did the analogous thing for the
//! orderbook-delta/trade/fill channels.

use std::collections::{HashMap, HashSet};

use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};
use tracing::{info, warn};

use kalshi_rs::websocket::models::{KalshiSocketMessage, SubscribedResponse, TickerUpdate, UserFill};
use kalshi_rs::KalshiWebsocketClient;

use crate::config::Config;
use crate::state::Shared;
use crate::types::{Side, WsMarketCommand};

const CHANNELS: [&str; 2] = ["ticker", "fill"];

pub async fn run_quote_subscriber(
    mut ws: KalshiWebsocketClient,
    cfg: Config,
    shared: Shared,
    initial_tickers: Vec<String>,
    mut ctl_rx: mpsc::Receiver<WsMarketCommand>,
) -> anyhow::Result<()> {
    let mut markets: HashSet<String> = initial_tickers.into_iter().collect();
    let mut sids: HashMap<String, u64> = HashMap::new();
    let mut pending: Vec<WsMarketCommand> = Vec::new();
    let mut backoff = Duration::from_millis(500);

    loop {
        while let Ok(cmd) = ctl_rx.try_recv() {
            apply_ctl_local(&mut markets, &cmd);
            pending.push(cmd);
        }

        if let Err(e) = ws.connect().await {
            warn!("quote ws connect failed: {e:?}, retrying in {backoff:?}");
            sleep(backoff).await;
            backoff = (backoff * 2).min(cfg.max_reconnect_delay);
            continue;
        }

        sids.clear();
        let trefs: Vec<String> = markets.iter().cloned().collect();
        let trefs_ref: Vec<&str> = trefs.iter().map(|s| s.as_str()).collect();

        if let Err(e) = ws.subscribe(CHANNELS.to_vec(), trefs_ref).await {
            warn!("quote ws subscribe failed: {e:?}, retrying in {backoff:?}");
            sleep(backoff).await;
            backoff = (backoff * 2).min(cfg.max_reconnect_delay);
            continue;
        }

        info!("quote ws connected+subscribed to {} tickers", markets.len());
        backoff = Duration::from_millis(500);

        loop {
            tokio::select! {
                msg = ws.next_message() => {
                    let msg = match msg {
                        Ok(m) => m,
                        Err(e) => {
                            warn!("quote ws read error: {e:?} (reconnecting)");
                            break;
                        }
                    };

                    match msg {
                        KalshiSocketMessage::SubscribedResponse(sr) => {
                            handle_subscribed(&mut sids, sr);
                            if has_all_sids(&sids) && !pending.is_empty() {
                                let pend = std::mem::take(&mut pending);
                                for cmd in pend {
                                    if let Err(e) = apply_update_subscription(&ws, &sids, &cmd).await {
                                        warn!("apply pending quote subscription update failed: {e:?}");
                                    }
                                }
                            }
                        }
                        KalshiSocketMessage::TickerUpdate(tu) => handle_ticker(&shared, tu),
                        KalshiSocketMessage::UserFill(uf) => handle_fill(&shared, uf).await,
                        _ => {}
                    }
                }

                cmd = ctl_rx.recv() => {
                    let Some(cmd) = cmd else { return Ok(()); };
                    apply_ctl_local(&mut markets, &cmd);

                    if !has_all_sids(&sids) {
                        pending.push(cmd);
                        continue;
                    }
                    if let Err(e) = apply_update_subscription(&ws, &sids, &cmd).await {
                        warn!("quote ws update_subscription failed: {e:?}");
                    }
                }
            }
        }
    }
}

fn handle_subscribed(sids: &mut HashMap<String, u64>, sr: SubscribedResponse) {
    sids.insert(sr.msg.channel, sr.msg.sid as u64);
}

fn has_all_sids(sids: &HashMap<String, u64>) -> bool {
    CHANNELS.iter().all(|c| sids.contains_key(*c))
}

fn apply_ctl_local(markets: &mut HashSet<String>, cmd: &WsMarketCommand) {
    match cmd {
        WsMarketCommand::UpdateMarkets { add, remove } => {
            for t in add {
                markets.insert(t.clone());
            }
            for t in remove {
                markets.remove(t);
            }
        }
    }
}

async fn apply_update_subscription(
    ws: &KalshiWebsocketClient,
    sids: &HashMap<String, u64>,
    cmd: &WsMarketCommand,
) -> anyhow::Result<()> {
    let (add, remove) = match cmd {
        WsMarketCommand::UpdateMarkets { add, remove } => (add, remove),
    };
    for ch in CHANNELS {
        let Some(&sid) = sids.get(ch) else { continue };
        if !add.is_empty() {
            let refs: Vec<&str> = add.iter().map(|s| s.as_str()).collect();
            ws.add_markets(vec![sid], refs).await?;
        }
        if !remove.is_empty() {
            let refs: Vec<&str> = remove.iter().map(|s| s.as_str()).collect();
            ws.del_markets(vec![sid], refs).await?;
        }
    }
    Ok(())
}

fn handle_ticker(shared: &Shared, tu: TickerUpdate) {
    let m = tu.msg;
    shared.quotes.update(
        &m.market_ticker,
        m.yes_bid as f64 / 100.0,
        m.yes_ask as f64 / 100.0,
        0.0,
        m.volume.max(0) as u64,
    );
    shared.notify.notify_one();
}

/// Applies a live fill from the WS `fill` channel. Every order placed by
/// this engine is also confirmed over REST by the worker that placed it
/// (`wait_for_fill`, applied directly by `strategy.rs`/`stop_loss.rs`);
/// whichever side sees the `order_id` first via `Shared::applied_fills`
/// wins, so this never double-applies a fill already recorded there. Buys
/// add to the position, sells subtract — `action` distinguishes them since
/// both arrive on the same channel.
async fn handle_fill(shared: &Shared, uf: UserFill) {
    let m = uf.msg;
    if !shared.applied_fills.record_if_new(&m.order_id) {
        return;
    }

    let Some(side) = parse_side(&m.purchased_side) else { return };
    let qty = m.count.max(0);
    let price = match side {
        Side::Yes => m.yes_price as f64 / 100.0,
        Side::No => (100u8.saturating_sub(m.yes_price)) as f64 / 100.0,
    };

    let mut guard = shared.store.write().await;
    match m.action.to_ascii_lowercase().as_str() {
        "sell" => guard.positions.decrement_stake(&m.market_ticker, side, qty),
        _ => {
            let event_ticker = derive_event_ticker(&m.market_ticker);
            guard.positions.upsert_fill(&event_ticker, &m.market_ticker, side, qty, price);
        }
    }
    drop(guard);
    shared.notify.notify_one();
}

fn parse_side(s: &str) -> Option<Side> {
    match s.to_ascii_lowercase().as_str() {
        "yes" => Some(Side::Yes),
        "no" => Some(Side::No),
        _ => None,
    }
}

/// §4.C step 5: derive `event_ticker` from `market_ticker` when the
/// exchange message doesn't carry one — first two hyphen-separated
/// segments.
pub fn derive_event_ticker(market_ticker: &str) -> String {
    market_ticker
        .splitn(3, '-')
        .take(2)
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_event_ticker_from_market_ticker() {
        assert_eq!(derive_event_ticker("NFLGAME-25JUL26DETGB-DET"), "NFLGAME-25JUL26DETGB");
    }
}
