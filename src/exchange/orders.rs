//! Order placement, polling, and cancellation (§4.C "Order placement" /
//! "Order wait"). Adapted from the teacher's `exec/http.rs` +
//! `exec/task.rs`, collapsed into direct async calls instead of an
//! `mpsc`-driven executor task — the spec calls these as ordinary
//! functions, not as a command queue.

use std::time::Duration;

use kalshi_rs::portfolio::models::CreateOrderRequest;
use kalshi_rs::KalshiClient;
use tokio::time::{sleep, Instant};
use tracing::warn;

use crate::error::ExchangeError;
use crate::types::{OrderAction, Side, Tif};

fn tif_str(t: Tif) -> &'static str {
    match t {
        Tif::Ioc => "ioc",
        Tif::Gtc => "gtc",
    }
}

fn action_str(a: OrderAction) -> &'static str {
    match a {
        OrderAction::Buy => "buy",
        OrderAction::Sell => "sell",
    }
}

/// Submits a limit order and returns the exchange's `order_id`.
pub async fn place_order(
    client: &KalshiClient,
    ticker: &str,
    action: OrderAction,
    side: Side,
    price_cents: u8,
    qty: u64,
    tif: Tif,
    client_order_id: &str,
    post_only: bool,
) -> Result<String, ExchangeError> {
    let (yes_price, no_price) = match side {
        Side::Yes => (Some(price_cents as u64), None),
        Side::No => (None, Some(price_cents as u64)),
    };

    let req = CreateOrderRequest {
        ticker: ticker.to_string(),
        side: side.as_str().to_string(),
        action: action_str(action).to_string(),
        count: qty,

        client_order_id: Some(client_order_id.to_string()),
        type_: Some("limit".to_string()),
        yes_price,
        no_price,

        yes_price_dollars: None,
        no_price_dollars: None,
        expiration_ts: None,
        time_in_force: Some(tif_str(tif).to_string()),
        buy_max_cost: None,

        post_only: Some(post_only),
        reduce_only: None,
        self_trade_prevention_type: None,
        order_group_id: None,
        cancel_order_on_pause: None,
    };

    let resp = client
        .create_order(&req)
        .await
        .map_err(|e| classify(&e.to_string()))?;
    Ok(resp.order.order_id)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillStatus {
    Filled,
    Partial,
    Cancelled,
    Timeout,
}

#[derive(Debug, Clone, Copy)]
pub struct FillOutcome {
    pub status: FillStatus,
    pub filled_qty: u64,
}

/// Polls order status at >=1Hz until it terminates, `require_full` is
/// satisfied, or `timeout` elapses. On timeout, attempts a best-effort
/// cancel (the exchange's DELETE, falling back to treating a 404 as
/// already-filled) and returns whatever filled in the interim (§4.C "Order
/// wait").
pub async fn wait_for_fill(
    client: &KalshiClient,
    order_id: &str,
    timeout: Duration,
    require_full: bool,
    requested_qty: u64,
) -> Result<FillOutcome, ExchangeError> {
    let deadline = Instant::now() + timeout;
    let poll_interval = Duration::from_millis(900);

    loop {
        match client.get_order(order_id).await {
            Ok(resp) => {
                let order = resp.order;
                let filled = order.fill_count.unwrap_or(0);
                match order.status.as_str() {
                    "canceled" => {
                        return Ok(FillOutcome {
                            status: FillStatus::Cancelled,
                            filled_qty: filled,
                        })
                    }
                    "filled" | "executed" => {
                        return Ok(FillOutcome {
                            status: FillStatus::Filled,
                            filled_qty: filled,
                        })
                    }
                    _ => {
                        if filled > 0 && !require_full {
                            return Ok(FillOutcome {
                                status: FillStatus::Partial,
                                filled_qty: filled,
                            });
                        }
                    }
                }
            }
            Err(e) => {
                let msg = e.to_string();
                if msg.contains("404") {
                    // Order vanished; if it disappeared because it filled,
                    // treat it as fully filled rather than erroring the tick.
                    return Ok(FillOutcome {
                        status: FillStatus::Filled,
                        filled_qty: requested_qty,
                    });
                }
                warn!("get_order poll failed for {order_id}: {msg}");
            }
        }

        if Instant::now() >= deadline {
            break;
        }
        sleep(poll_interval).await;
    }

    let filled_before_cancel = cancel_order(client, order_id).await.unwrap_or(0);
    Ok(FillOutcome {
        status: FillStatus::Timeout,
        filled_qty: filled_before_cancel,
    })
}

/// Best-effort cancel: DELETE the order, returning the quantity filled
/// before cancellation took effect. A 404 means the order is already gone
/// (filled or previously cancelled) and is not an error.
pub async fn cancel_order(client: &KalshiClient, order_id: &str) -> Result<u64, ExchangeError> {
    match client.cancel_order(order_id.to_string()).await {
        Ok(resp) => Ok(resp.order.fill_count.unwrap_or(0)),
        Err(e) => {
            let msg = e.to_string();
            if msg.contains("404") {
                return Ok(0);
            }
            Err(classify(&msg))
        }
    }
}

fn classify(msg: &str) -> ExchangeError {
    if msg.contains("429") {
        ExchangeError::RateLimited
    } else if msg.contains("401") || msg.contains("403") {
        ExchangeError::Auth(msg.to_string())
    } else if msg.to_lowercase().contains("rejected") {
        ExchangeError::OrderRejected(msg.to_string())
    } else {
        ExchangeError::Transient(msg.to_string())
    }
}
