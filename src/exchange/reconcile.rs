//! Live-position reconciliation (§4.C). `fetch_live_positions` translates
//! the exchange's market-position representation into the engine's
//! canonical `(market, side, contracts, avg_price, event)` shape; `reconcile`
//! then applies the 6-step contract against the position store.

use std::collections::HashSet;

use kalshi_rs::portfolio::models::{GetPositionsParams, MarketPosition};
use kalshi_rs::KalshiClient;

use crate::error::ExchangeError;
use crate::exchange::quotes::derive_event_ticker;
use crate::state::Shared;
use crate::types::Side;

#[derive(Debug, Clone)]
pub struct LivePosition {
    pub market_ticker: String,
    pub event_ticker: String,
    pub side: Side,
    pub contracts: i64,
    pub avg_price: f64,
}

/// §9: `market_exposure` and `total_traded` both report in integer cents;
/// `position` is the signed resting-YES contract count (negative means a
/// net NO position). Average price is `market_exposure / position` when
/// position is nonzero, falling back to `total_traded`-derived cost when
/// the exchange has already closed the exposure out.
fn normalize(mp: &MarketPosition) -> Option<LivePosition> {
    let ticker = mp.market_ticker.clone()?;
    let signed_position = mp.position.unwrap_or(0);
    if signed_position == 0 {
        return None;
    }

    let side = if signed_position > 0 { Side::Yes } else { Side::No };
    let contracts = signed_position.abs();

    let exposure_cents = mp.market_exposure.unwrap_or(0).abs();
    let avg_price = if contracts > 0 && exposure_cents > 0 {
        (exposure_cents as f64 / contracts as f64) / 100.0
    } else if let Some(total_traded) = mp.total_traded.filter(|&t| t > 0) {
        (exposure_cents as f64 / total_traded as f64).clamp(0.0, 1.0)
    } else {
        0.0
    };

    Some(LivePosition {
        event_ticker: derive_event_ticker(&ticker),
        market_ticker: ticker,
        side,
        contracts,
        avg_price,
    })
}

pub async fn fetch_live_positions(client: &KalshiClient) -> Result<Vec<LivePosition>, ExchangeError> {
    let params = GetPositionsParams {
        cursor: None,
        limit: None,
        count_filter: Some("position".to_string()),
        settlement_status: Some("unsettled".to_string()),
        ticker: None,
        event_ticker: None,
    };
    let resp = client
        .get_positions(&params)
        .await
        .map_err(|e| ExchangeError::Transient(e.to_string()))?;

    Ok(resp.market_positions.iter().filter_map(normalize).collect())
}

/// Applies the full reconciliation contract (§4.C) against the shared
/// store. Must be called after every strategy tick and before every exit
/// tick.
pub async fn reconcile(shared: &Shared, client: &KalshiClient) -> Result<(), ExchangeError> {
    let live = fetch_live_positions(client).await?;
    let live_keys: HashSet<(String, Side)> =
        live.iter().map(|p| (p.market_ticker.clone(), p.side)).collect();

    let mut guard = shared.store.write().await;
    for p in &live {
        guard
            .positions
            .reconcile_one(&p.event_ticker, &p.market_ticker, p.side, p.contracts, p.avg_price);
    }
    guard.positions.settle_missing(&live_keys);
    Ok(())
}
