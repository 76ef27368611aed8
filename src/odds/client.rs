//! The Odds API client (§4.D). `fetch_odds` is grounded in
//! `base/data_collection/oddsapi_client.py::fetch_odds`: `GET
//! {base}/sports/{sport_key}/odds/` with `apiKey`, `regions`, `markets=h2h`,
//! `bookmakers`, decimal odds. `fetch_event_moneyline` is the per-event
//! live refresh (odds + in-play score/clock) the mature iteration of the
//! original system pulls from BetsAPI
//! (`myles_repo/app/loop.py:345-400::fetch_event_moneyline`), adapted here
//! onto this provider's per-event endpoint rather than a second upstream
//! integration — spec.md §6's `GET_EVENT_MONEYLINE(event_id) ->
//! {home_odds, away_odds, score_snapshot, period_clock}` is the exact
//! contract it fulfils. The teacher has no external REST client (only
//! `kalshi-rs`'s own HTTP plumbing), so this leans on `reqwest` the way the
//! rest of the pack's odds-driven bots do.

use std::time::Duration;

use serde::Deserialize;

use crate::error::OddsError;

#[derive(Debug, Deserialize)]
struct OddsApiOutcome {
    name: String,
    price: f64,
}

#[derive(Debug, Deserialize)]
struct OddsApiMarket {
    key: String,
    outcomes: Vec<OddsApiOutcome>,
}

#[derive(Debug, Deserialize)]
struct OddsApiBookmaker {
    markets: Vec<OddsApiMarket>,
}

#[derive(Debug, Deserialize)]
struct OddsApiGame {
    id: String,
    home_team: String,
    away_team: String,
    commence_time: String,
    bookmakers: Vec<OddsApiBookmaker>,
}

#[derive(Debug, Clone)]
pub struct RawGameOdds {
    pub event_id: String,
    pub home_team: String,
    pub away_team: String,
    pub commence_time: String,
    /// Decimal odds for (home, away) from the first bookmaker carrying an
    /// `h2h` market.
    pub dec_home: f64,
    pub dec_away: f64,
}

#[derive(Debug, Deserialize)]
struct OddsApiMoneyline {
    home_odds: f64,
    away_odds: f64,
    score_snapshot: Option<String>,
    period_clock: Option<String>,
}

#[derive(Debug, Clone)]
pub struct EventMoneyline {
    pub dec_home: f64,
    pub dec_away: f64,
    /// `"54-48"`-shaped home-away score, when the event is in play.
    pub score_snapshot: Option<String>,
    /// `"Q4 2:15"`-shaped period/clock string, when the event is in play.
    pub period_clock: Option<String>,
}

pub struct OddsApiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    region: String,
    bookmakers: Vec<String>,
}

impl OddsApiClient {
    pub fn new(base_url: String, api_key: String, region: String, bookmakers: Vec<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            api_key,
            region,
            bookmakers,
        }
    }

    /// Fetches h2h decimal odds for every live game under `sport_key`.
    /// Callers are responsible for the >=100ms inter-request throttle
    /// (§4.D); this issues exactly one request.
    pub async fn fetch_odds(&self, sport_key: &str) -> Result<Vec<RawGameOdds>, OddsError> {
        let url = format!("{}/sports/{}/odds/", self.base_url, sport_key);
        let resp = self
            .http
            .get(&url)
            .query(&[
                ("apiKey", self.api_key.as_str()),
                ("regions", self.region.as_str()),
                ("markets", "h2h"),
                ("bookmakers", &self.bookmakers.join(",")),
                ("oddsFormat", "decimal"),
                ("dateFormat", "iso"),
            ])
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| OddsError::Transient(e.to_string()))?;

        if resp.status().as_u16() == 429 {
            return Err(OddsError::RateLimited);
        }
        if resp.status().as_u16() == 401 {
            return Err(OddsError::Auth("odds api key rejected".to_string()));
        }
        if !resp.status().is_success() {
            return Err(OddsError::Transient(format!("status {}", resp.status())));
        }

        let games: Vec<OddsApiGame> = resp.json().await.map_err(|e| OddsError::Transient(e.to_string()))?;
        Ok(games.iter().filter_map(extract_h2h).collect())
    }

    /// Per-event live refresh: fresh odds plus in-play score/clock, when
    /// the event has started (§4.D "per-event discovery" / spec.md §6
    /// `GET_EVENT_MONEYLINE`). Called once per tracked event per strategy
    /// tick, in addition to the bulk per-sport `fetch_odds` call.
    pub async fn fetch_event_moneyline(&self, event_id: &str) -> Result<EventMoneyline, OddsError> {
        let url = format!("{}/events/{}/moneyline/", self.base_url, event_id);
        let resp = self
            .http
            .get(&url)
            .query(&[("apiKey", self.api_key.as_str())])
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| OddsError::Transient(e.to_string()))?;

        if resp.status().as_u16() == 429 {
            return Err(OddsError::RateLimited);
        }
        if resp.status().as_u16() == 401 {
            return Err(OddsError::Auth("odds api key rejected".to_string()));
        }
        if !resp.status().is_success() {
            return Err(OddsError::Transient(format!("status {}", resp.status())));
        }

        let body: OddsApiMoneyline = resp.json().await.map_err(|e| OddsError::Transient(e.to_string()))?;
        Ok(EventMoneyline {
            dec_home: body.home_odds,
            dec_away: body.away_odds,
            score_snapshot: body.score_snapshot,
            period_clock: body.period_clock,
        })
    }
}

fn extract_h2h(game: &OddsApiGame) -> Option<RawGameOdds> {
    let bookmaker = game.bookmakers.iter().find(|bm| bm.markets.iter().any(|m| m.key == "h2h"))?;
    let market = bookmaker.markets.iter().find(|m| m.key == "h2h")?;

    let dec_home = market.outcomes.iter().find(|o| o.name == game.home_team)?.price;
    let dec_away = market.outcomes.iter().find(|o| o.name == game.away_team)?.price;

    Some(RawGameOdds {
        event_id: game.id.clone(),
        home_team: game.home_team.clone(),
        away_team: game.away_team.clone(),
        commence_time: game.commence_time.clone(),
        dec_home,
        dec_away,
    })
}
