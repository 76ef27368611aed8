//! Odds adapter (§4.D). De-vigs raw bookmaker decimal odds into fair
//! probabilities via 4.A, caches the latest snapshot per event, and
//! preserves the prior snapshot on a failed fetch rather than erroring the
//! caller out.

pub mod client;

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::warn;

use crate::config::Config;
use crate::error::OddsError;
use crate::pricing::de_vig;

#[derive(Debug, Clone)]
pub struct OddsSnapshot {
    pub event_id: String,
    /// Canonical sport token ("NBA", "CBBW", ...), not the OddsAPI
    /// `sport_key` used to fetch it — callers translate between the two at
    /// the fetch boundary so the rest of the engine only ever sees the
    /// canonical token the matcher and risk gate key off of.
    pub sport: String,
    pub home_team: String,
    pub away_team: String,
    pub home_prob: f64,
    pub away_prob: f64,
    /// In-play score/clock, populated by `refresh_event_moneyline` once the
    /// event has started; `None` before kickoff or while the per-event
    /// refresh hasn't run yet.
    pub score: Option<(u32, u32)>,
    pub clock: Option<String>,
    pub odds_ts: Instant,
}

impl OddsSnapshot {
    pub fn is_stale(&self, max_age: Duration) -> bool {
        self.odds_ts.elapsed() > max_age
    }
}

/// Per-event latest snapshot, throttled fetch gate, and discovery list.
/// Mirrors the teacher's `DashMap`-of-state shape (`state/ticker.rs`)
/// generalized to odds snapshots instead of market books.
pub struct OddsAdapter {
    client: client::OddsApiClient,
    snapshots: Mutex<HashMap<String, OddsSnapshot>>,
    last_fetch: Mutex<Instant>,
    min_interval: Duration,
}

impl OddsAdapter {
    pub fn new(client: client::OddsApiClient, min_interval: Duration) -> Self {
        Self {
            client,
            snapshots: Mutex::new(HashMap::new()),
            last_fetch: Mutex::new(Instant::now() - min_interval),
            min_interval,
        }
    }

    async fn throttle(&self) {
        let mut last = self.last_fetch.lock().await;
        let elapsed = last.elapsed();
        if elapsed < self.min_interval {
            sleep(self.min_interval - elapsed).await;
        }
        *last = Instant::now();
    }

    /// Fetches and de-vigs odds for every live event under `sport_key`. On
    /// a failed fetch, existing snapshots are left untouched (§4.D "A
    /// failed fetch preserves the prior snapshot").
    pub async fn refresh_sport(&self, cfg: &Config, sport: &str, sport_key: &str) -> Result<usize, OddsError> {
        self.throttle().await;

        let raw = match self.client.fetch_odds(sport_key).await {
            Ok(games) => games,
            Err(e) => {
                warn!("odds fetch failed for {sport_key}: {e}; preserving prior snapshots");
                return Err(e);
            }
        };

        let mut guard = self.snapshots.lock().await;
        for game in &raw {
            let implied_home = 1.0 / game.dec_home;
            let implied_away = 1.0 / game.dec_away;
            let (home_prob, away_prob) = de_vig(cfg, implied_home, implied_away);

            // The bulk per-sport feed carries no score/clock; carry forward
            // whatever the per-event moneyline refresh last observed rather
            // than clobbering it back to `None` every sport-wide refresh.
            let (score, clock) = guard
                .get(&game.event_id)
                .map(|prev| (prev.score, prev.clock.clone()))
                .unwrap_or((None, None));

            guard.insert(
                game.event_id.clone(),
                OddsSnapshot {
                    event_id: game.event_id.clone(),
                    sport: sport.to_string(),
                    home_team: game.home_team.clone(),
                    away_team: game.away_team.clone(),
                    home_prob,
                    away_prob,
                    score,
                    clock,
                    odds_ts: Instant::now(),
                },
            );
        }
        Ok(raw.len())
    }

    /// Per-event live refresh (§4.D "per-event discovery", spec.md §6
    /// `GET_EVENT_MONEYLINE`): re-devigs odds and updates in-play
    /// score/clock for one tracked event. Silently no-ops if the event
    /// isn't in the cache yet (the bulk sport refresh hasn't seen it) —
    /// there's nothing to merge the moneyline onto. On a failed fetch every
    /// existing field is left untouched, same as `refresh_sport`.
    pub async fn refresh_event_moneyline(&self, cfg: &Config, event_id: &str) -> Result<(), OddsError> {
        let moneyline = match self.client.fetch_event_moneyline(event_id).await {
            Ok(m) => m,
            Err(e) => {
                warn!("event moneyline fetch failed for {event_id}: {e}; preserving prior snapshot");
                return Err(e);
            }
        };

        let mut guard = self.snapshots.lock().await;
        let Some(existing) = guard.get_mut(event_id) else {
            return Ok(());
        };

        if moneyline.dec_home > 0.0 && moneyline.dec_away > 0.0 {
            let implied_home = 1.0 / moneyline.dec_home;
            let implied_away = 1.0 / moneyline.dec_away;
            let (home_prob, away_prob) = de_vig(cfg, implied_home, implied_away);
            existing.home_prob = home_prob;
            existing.away_prob = away_prob;
        }
        existing.score = moneyline.score_snapshot.as_deref().and_then(parse_score_snapshot);
        existing.clock = moneyline.period_clock;
        existing.odds_ts = Instant::now();
        Ok(())
    }

    pub async fn get(&self, event_id: &str) -> Option<OddsSnapshot> {
        self.snapshots.lock().await.get(event_id).cloned()
    }

    pub async fn all_events(&self) -> Vec<OddsSnapshot> {
        self.snapshots.lock().await.values().cloned().collect()
    }
}

/// Parses a `"54-48"`-shaped home-away score snapshot.
fn parse_score_snapshot(s: &str) -> Option<(u32, u32)> {
    let mut parts = s.split('-');
    let home: u32 = parts.next()?.trim().parse().ok()?;
    let away: u32 = parts.next()?.trim().parse().ok()?;
    Some((home, away))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staleness_is_elapsed_based() {
        let snap = OddsSnapshot {
            event_id: "e1".into(),
            sport: "NBA".into(),
            home_team: "A".into(),
            away_team: "B".into(),
            home_prob: 0.5,
            away_prob: 0.5,
            score: None,
            clock: None,
            odds_ts: Instant::now() - Duration::from_secs(60),
        };
        assert!(snap.is_stale(Duration::from_secs(30)));
        assert!(!snap.is_stale(Duration::from_secs(120)));
    }
}
