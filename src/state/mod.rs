pub mod aux;
pub mod book;
pub mod persist;
pub mod position;
pub mod store;

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{Mutex, Notify, RwLock};

use aux::AuxState;
use book::QuoteCache;
use store::PositionStore;

/// Per-market async mutex registry (§5 "no two workers may place
/// simultaneous orders on the same market"). The writer-lock bracket
/// around a full submit-wait-upsert sequence is scoped to one market at a
/// time rather than the single coarse `RwLock<EngineStore>` — holding that
/// lock across a network round trip as long as `order_wait_timeout_maker`
/// would serialize every market's bookkeeping behind one order. Same
/// DashMap-of-keyed-state shape as `book::QuoteCache`.
#[derive(Debug, Default)]
pub struct MarketLocks {
    locks: dashmap::DashMap<String, Arc<Mutex<()>>>,
}

impl MarketLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the mutex for `market_ticker`, creating it on first use.
    pub fn get(&self, market_ticker: &str) -> Arc<Mutex<()>> {
        self.locks.entry(market_ticker.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }
}

/// Dedup set for live `order_id`s already applied to `PositionStore` (§4.C).
/// Every real order eventually produces both a REST-confirmed fill (via
/// `wait_for_fill`, applied by the worker that placed it) and a WS `fill`
/// channel message (`exchange::quotes::handle_fill`) — whichever side sees
/// the `order_id` first applies it, the other skips it.
#[derive(Debug, Default)]
pub struct AppliedFills {
    seen: dashmap::DashSet<String>,
}

impl AppliedFills {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `order_id` and returns whether this is the first time it's
    /// been seen (i.e. whether the caller should apply the fill).
    pub fn record_if_new(&self, order_id: &str) -> bool {
        self.seen.insert(order_id.to_string())
    }
}

/// Everything guarded by the single coarse writer lock (§5): positions and
/// the four auxiliary sets. The quote cache lives outside it (its own
/// `DashMap`, like the teacher's `book.rs`) since quote updates are
/// high-frequency and independent of position bookkeeping.
#[derive(Debug, Default)]
pub struct EngineStore {
    pub positions: PositionStore,
    pub aux: AuxState,
}

impl EngineStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[derive(Clone)]
pub struct Shared {
    pub store: Arc<RwLock<EngineStore>>,
    pub quotes: Arc<QuoteCache>,
    pub market_locks: Arc<MarketLocks>,
    pub applied_fills: Arc<AppliedFills>,
    pub notify: Arc<Notify>,
    pub data_dir: PathBuf,
}

impl Shared {
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            store: Arc::new(RwLock::new(EngineStore::new())),
            quotes: Arc::new(QuoteCache::new()),
            market_locks: Arc::new(MarketLocks::new()),
            applied_fills: Arc::new(AppliedFills::new()),
            notify: Arc::new(Notify::new()),
            data_dir,
        }
    }

    fn positions_path(&self) -> PathBuf {
        self.data_dir.join("positions.json")
    }

    fn aux_path(&self) -> PathBuf {
        self.data_dir.join("aux_state.json")
    }

    /// Loads persisted positions and auxiliary state from `data_dir`,
    /// defaulting to empty collections if no prior state exists.
    pub async fn load(data_dir: PathBuf) -> Result<Self, crate::error::PersistError> {
        let shared = Self::new(data_dir);
        let positions = PositionStore::load(&shared.positions_path())?;
        let aux = AuxState::load(&shared.aux_path())?;
        {
            let mut guard = shared.store.write().await;
            *guard = EngineStore { positions, aux };
        }
        Ok(shared)
    }

    /// Persists both halves of the guarded store atomically-per-file (§9).
    pub async fn persist(&self) -> Result<(), crate::error::PersistError> {
        let guard = self.store.read().await;
        guard.positions.persist(&self.positions_path())?;
        guard.aux.persist(&self.aux_path())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_through_shared_persist() {
        let dir = std::env::temp_dir().join(format!("odds_arb_shared_{}", uuid::Uuid::new_v4()));
        let shared = Shared::new(dir.clone());
        {
            let mut guard = shared.store.write().await;
            guard
                .positions
                .upsert_fill("EVT", "EVT-A", crate::types::Side::Yes, 10, 0.40);
            guard.aux.note_first_detection("EVT");
        }
        shared.persist().await.unwrap();

        let reloaded = Shared::load(dir.clone()).await.unwrap();
        let guard = reloaded.store.read().await;
        assert_eq!(guard.positions.get_open_positions().len(), 1);
        assert!(guard.aux.time_since_first_detection("EVT").is_some());

        let _ = std::fs::remove_dir_all(dir);
    }
}
