//! Error taxonomy (§7). Each component gets a `thiserror` enum so call
//! sites can match on kind; `main.rs` and task boundaries collapse these
//! into `anyhow::Result` the way the teacher does at its own task
//! boundaries.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("transient exchange I/O error: {0}")]
    Transient(String),
    #[error("rate limited by exchange")]
    RateLimited,
    #[error("exchange auth failure: {0}")]
    Auth(String),
    #[error("order rejected: {0}")]
    OrderRejected(String),
    #[error("order wait timed out")]
    OrderWaitTimeout,
    #[error("market or price missing for {0}")]
    MarketMissing(String),
}

#[derive(Debug, Error)]
pub enum OddsError {
    #[error("transient odds-provider I/O error: {0}")]
    Transient(String),
    #[error("rate limited by odds provider")]
    RateLimited,
    #[error("odds provider auth failure: {0}")]
    Auth(String),
    #[error("no odds snapshot available for {0}")]
    NoSnapshot(String),
}

#[derive(Debug, Error)]
pub enum MatchError {
    #[error("no candidate ticker matched for {home} vs {away}")]
    NoMatch { home: String, away: String },
    #[error("ambiguous match for {home} vs {away}: {candidates} candidates")]
    Ambiguous {
        home: String,
        away: String,
        candidates: usize,
    },
}

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("failed to persist durable state: {0}")]
    Write(String),
    #[error("failed to load durable state: {0}")]
    Read(String),
}

/// A logic invariant was about to be violated. Handling per §7: log and
/// refuse the action, never panic the tick loop.
#[derive(Debug, Error)]
#[error("invariant violated: {0}")]
pub struct InvariantError(pub String);
