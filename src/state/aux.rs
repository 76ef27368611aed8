//! Auxiliary persisted collections (§3): EventLock, StopLossCooldown,
//! SevenPctExitedSet, FirstDetectionTimes. Guarded by the same writer lock
//! as the position store (§5); persisted alongside it.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::state::persist;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopLossCooldownEntry {
    pub timestamp: DateTime<Utc>,
    pub entry_price_at_stop: f64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct AuxState {
    /// Events with exactly one side open ("half-hedged lock").
    pub event_locks: HashSet<String>,
    /// event_ticker -> {timestamp, entry_price_at_stop}.
    pub stop_loss_cooldowns: HashMap<String, StopLossCooldownEntry>,
    /// Events where an aggressive absolute-exit fired; permanently blocked
    /// this session.
    pub seven_pct_exited: HashSet<String>,
    /// event_ticker -> first_seen_timestamp.
    pub first_detection_times: HashMap<String, DateTime<Utc>>,
}

impl AuxState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_half_hedge_lock(&mut self, event_ticker: &str, locked: bool) {
        if locked {
            self.event_locks.insert(event_ticker.to_string());
        } else {
            self.event_locks.remove(event_ticker);
        }
    }

    pub fn is_half_hedge_locked(&self, event_ticker: &str) -> bool {
        self.event_locks.contains(event_ticker)
    }

    pub fn mark_stop_lossed(&mut self, event_ticker: &str, entry_price_at_stop: f64) {
        self.stop_loss_cooldowns.insert(
            event_ticker.to_string(),
            StopLossCooldownEntry {
                timestamp: Utc::now(),
                entry_price_at_stop,
            },
        );
    }

    /// I3: if `current_price >= entry_price_at_stop`, clear the cooldown
    /// and allow entries to resume. Otherwise, still-in-cooldown iff the
    /// configured cooldown window hasn't elapsed. Grounded in
    /// `stop_loss.py::is_event_in_stop_loss_cooldown`.
    pub fn check_stop_loss_cooldown(
        &mut self,
        event_ticker: &str,
        current_price: Option<f64>,
        cooldown_minutes: f64,
        allow_price_recovery: bool,
    ) -> bool {
        let Some(entry) = self.stop_loss_cooldowns.get(event_ticker).cloned() else {
            return false;
        };

        if allow_price_recovery {
            if let Some(price) = current_price {
                if entry.entry_price_at_stop > 0.0 && price >= entry.entry_price_at_stop {
                    self.stop_loss_cooldowns.remove(event_ticker);
                    return false;
                }
            }
        }

        let elapsed_minutes = (Utc::now() - entry.timestamp).num_seconds() as f64 / 60.0;
        elapsed_minutes < cooldown_minutes
    }

    pub fn mark_seven_pct_exited(&mut self, event_ticker: &str) {
        self.seven_pct_exited.insert(event_ticker.to_string());
    }

    pub fn is_seven_pct_exited(&self, event_ticker: &str) -> bool {
        self.seven_pct_exited.contains(event_ticker)
    }

    pub fn note_first_detection(&mut self, event_ticker: &str) {
        self.first_detection_times
            .entry(event_ticker.to_string())
            .or_insert_with(Utc::now);
    }

    pub fn time_since_first_detection(&self, event_ticker: &str) -> Option<chrono::Duration> {
        self.first_detection_times
            .get(event_ticker)
            .map(|ts| Utc::now() - *ts)
    }

    pub fn persist(&self, path: &std::path::Path) -> Result<(), crate::error::PersistError> {
        persist::write_json_atomic(path, self)
    }

    pub fn load(path: &std::path::Path) -> Result<Self, crate::error::PersistError> {
        persist::read_json(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cooldown_blocks_until_elapsed() {
        let mut aux = AuxState::new();
        aux.mark_stop_lossed("EVT", 0.60);
        assert!(aux.check_stop_loss_cooldown("EVT", Some(0.50), 180.0, true));
    }

    #[test]
    fn cooldown_clears_on_price_recovery() {
        let mut aux = AuxState::new();
        aux.mark_stop_lossed("EVT", 0.60);
        let in_cooldown = aux.check_stop_loss_cooldown("EVT", Some(0.61), 180.0, true);
        assert!(!in_cooldown);
        assert!(!aux.stop_loss_cooldowns.contains_key("EVT"));
    }

    #[test]
    fn seven_pct_exit_is_permanent_for_session() {
        let mut aux = AuxState::new();
        aux.mark_seven_pct_exited("EVT");
        assert!(aux.is_seven_pct_exited("EVT"));
    }
}
