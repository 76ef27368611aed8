//! Exchange adapter (§4.C). Wraps `kalshi-rs` behind the neutral
//! `place_order` / `wait_for_fill` / `cancel_order` / `fetch_live_positions`
//! surface the engine is written against, the same wrapping shape the
//! teacher uses in `exec/http.rs` and `ws/task.rs`.

pub mod orders;
pub mod quotes;
pub mod reconcile;

use std::sync::Arc;

use kalshi_rs::{KalshiClient, KalshiWebsocketClient};

/// Holds the authenticated REST client; the websocket client is owned
/// separately by the quote-subscriber task (it needs `&mut self` to drive
/// the socket read loop, so it can't live behind a shared `Arc`).
#[derive(Clone)]
pub struct ExchangeAdapter {
    pub http: Arc<KalshiClient>,
}

impl ExchangeAdapter {
    pub fn new(http: Arc<KalshiClient>) -> Self {
        Self { http }
    }
}

pub struct QuoteSubscriberHandle {
    pub ctl_tx: tokio::sync::mpsc::Sender<crate::types::WsMarketCommand>,
}

pub fn spawn_quote_subscriber(
    ws: KalshiWebsocketClient,
    cfg: crate::config::Config,
    shared: crate::state::Shared,
    initial_tickers: Vec<String>,
) -> QuoteSubscriberHandle {
    let (ctl_tx, ctl_rx) = tokio::sync::mpsc::channel(64);
    tokio::spawn(quotes::run_quote_subscriber(ws, cfg, shared, initial_tickers, ctl_rx));
    QuoteSubscriberHandle { ctl_tx }
}
