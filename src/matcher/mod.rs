//! Market matcher (§4.E). Resolves an odds-feed event (home, away, date)
//! into an exchange `event_ticker` + market list. Grounded in
//! `utils/tickers.py` (candidate ticker construction) and
//! `base/data_collection/market_matcher.py` (caching, fuzzy fallback).

pub mod fuzzy;
pub mod teams;

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use chrono::{Duration as ChronoDuration, NaiveDate};
use kalshi_rs::markets::models::MarketsQuery;
use kalshi_rs::KalshiClient;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::warn;

use crate::error::MatchError;

#[derive(Debug, Clone)]
pub struct MatchedEvent {
    pub event_ticker: String,
    pub market_tickers: Vec<String>,
}

struct CacheEntry {
    resolved: MatchedEvent,
    inserted_at: Instant,
}

/// event-date key -> resolved ticker + market list, TTL-expired on sweep
/// (§4.E step 3).
pub struct MatchCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    ttl: Duration,
}

impl MatchCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    async fn get(&self, key: &str) -> Option<MatchedEvent> {
        let guard = self.entries.lock().await;
        guard
            .get(key)
            .filter(|e| e.inserted_at.elapsed() < self.ttl)
            .map(|e| e.resolved.clone())
    }

    async fn insert(&self, key: String, resolved: MatchedEvent) {
        let mut guard = self.entries.lock().await;
        guard.insert(
            key,
            CacheEntry {
                resolved,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Sweeps expired entries. Call periodically from the discovery loop.
    pub async fn sweep_expired(&self) {
        let mut guard = self.entries.lock().await;
        guard.retain(|_, e| e.inserted_at.elapsed() < self.ttl);
    }
}

fn date_code(date: NaiveDate) -> String {
    date.format("%y%b%d").to_string().to_uppercase()
}

/// Builds every candidate ticker for a (sport, home, away, date) tuple:
/// permuted team order, today's and the prior day's date code (§4.E step
/// 1).
fn build_candidates(sport: &str, home: &str, away: &str, date: NaiveDate) -> Vec<String> {
    let prefix = teams::series_prefix(sport);
    let home_code = resolve_code(home);
    let away_code = resolve_code(away);

    let dates = [date, date - ChronoDuration::days(1)];
    let mut candidates = Vec::with_capacity(dates.len() * 2);
    for d in dates {
        let dc = date_code(d);
        candidates.push(format!("{prefix}-{dc}{away_code}{home_code}"));
        candidates.push(format!("{prefix}-{dc}{home_code}{away_code}"));
    }
    candidates
}

fn resolve_code(team: &str) -> String {
    match teams::smart_lookup(team) {
        Some((code, _)) => code.to_string(),
        None => teams::fallback_code(team, 4),
    }
}

/// Resolves one odds-feed event to an exchange event + market list.
/// Queries candidates in order, first non-empty result wins; on a
/// throttle response, sleeps then retries once before moving to the next
/// candidate (§4.E "Rate-limit handling").
pub async fn resolve_event(
    client: &KalshiClient,
    cache: &MatchCache,
    sport: &str,
    home: &str,
    away: &str,
    date: NaiveDate,
) -> Result<MatchedEvent, MatchError> {
    let cache_key = format!("{sport}|{home}|{away}|{date}");
    if let Some(hit) = cache.get(&cache_key).await {
        return Ok(hit);
    }

    let candidates = build_candidates(sport, home, away, date);

    for candidate in &candidates {
        match query_markets_for_event(client, candidate).await {
            Ok(markets) if !markets.is_empty() => {
                let resolved = MatchedEvent {
                    event_ticker: candidate.clone(),
                    market_tickers: markets,
                };
                cache.insert(cache_key, resolved.clone()).await;
                return Ok(resolved);
            }
            Ok(_) => continue,
            Err(Throttled) => {
                sleep(Duration::from_millis(500)).await;
                match query_markets_for_event(client, candidate).await {
                    Ok(markets) if !markets.is_empty() => {
                        let resolved = MatchedEvent {
                            event_ticker: candidate.clone(),
                            market_tickers: markets,
                        };
                        cache.insert(cache_key, resolved.clone()).await;
                        return Ok(resolved);
                    }
                    _ => {
                        warn!("still throttled after retry for {candidate}; skipping remaining candidates");
                        break;
                    }
                }
            }
        }
    }

    // §4.E step 4: mandatory fuzzy fallback once every direct ticker
    // candidate has failed (or the candidate loop broke early on repeated
    // throttling).
    let active = list_active_events(client, sport).await;
    if let Some(resolved) = fuzzy_fallback(home, away, &active) {
        cache.insert(cache_key, resolved.clone()).await;
        return Ok(resolved);
    }

    Err(MatchError::NoMatch {
        home: home.to_string(),
        away: away.to_string(),
    })
}

/// Bulk active-market scan backing the fuzzy fallback: one
/// `(event_ticker, title)` pair per currently open market under `sport`'s
/// series prefix (§4.E step 4's "current active tickers"). Collapses to
/// one entry per event since a single event's markets share a title.
async fn list_active_events(client: &KalshiClient, sport: &str) -> Vec<(String, String)> {
    let query = MarketsQuery {
        series_ticker: Some(teams::series_prefix(sport).to_string()),
        status: Some("open".to_string()),
        ..Default::default()
    };
    match client.get_all_markets(&query).await {
        Ok(resp) => {
            let mut seen = HashSet::new();
            resp.markets
                .into_iter()
                .filter(|m| seen.insert(m.event_ticker.clone()))
                .map(|m| (m.event_ticker, m.title))
                .collect()
        }
        Err(e) => {
            warn!("active-markets scan failed for {sport}: {e}");
            Vec::new()
        }
    }
}

/// §4.E step 4: when no direct ticker candidate resolves, fuzzy-match
/// `home`/`away` against the display names of currently active tickers
/// (e.g. from a bulk `GET /markets?status=open` scan the caller already
/// did) and return whichever ticker's title contains both team names.
pub fn fuzzy_fallback(home: &str, away: &str, active: &[(String, String)]) -> Option<MatchedEvent> {
    let home_hit = fuzzy::find_fuzzy_match(home, active)?;
    let away_hit = fuzzy::find_fuzzy_match(away, active)?;
    if home_hit != away_hit {
        return None;
    }
    Some(MatchedEvent {
        event_ticker: home_hit.to_string(),
        market_tickers: vec![home_hit.to_string()],
    })
}

struct Throttled;

async fn query_markets_for_event(client: &KalshiClient, event_ticker: &str) -> Result<Vec<String>, Throttled> {
    let query = MarketsQuery {
        event_ticker: Some(event_ticker.to_string()),
        status: Some("open".to_string()),
        ..Default::default()
    };
    match client.get_all_markets(&query).await {
        Ok(resp) => Ok(resp.markets.into_iter().map(|m| m.ticker).collect()),
        Err(e) => {
            let msg = e.to_string();
            if msg.contains("429") {
                Err(Throttled)
            } else {
                Ok(Vec::new())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn builds_permuted_candidates_across_two_dates() {
        let date = NaiveDate::from_ymd_opt(2026, 7, 26).unwrap();
        let candidates = build_candidates("NBA", "Boston Celtics", "Miami Heat", date);
        assert_eq!(candidates.len(), 4);
        assert!(candidates.iter().all(|c| c.starts_with("KXNBAGAME-")));
    }

    #[test]
    fn date_code_matches_kalshi_format() {
        let date = NaiveDate::from_ymd_opt(2026, 7, 26).unwrap();
        assert_eq!(date_code(date), "26JUL26");
    }
}
