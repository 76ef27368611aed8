//! In-memory quote cache (§4.C "Quote subscription"). Keyed by
//! `market_ticker`; each entry tracks `last_update` so a stale cache can be
//! distinguished from a live one. Replaces the teacher's full L2
//! `yes_bids`/`no_bids` ladder — the spec's quote feed is already a
//! top-of-book snapshot, not raw deltas.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
pub struct Quote {
    pub yes_bid: f64,
    pub yes_ask: f64,
    pub liquidity: f64,
    pub volume_24h: u64,
    pub last_update: Instant,
}

impl Quote {
    pub fn is_stale(&self, stale_after: Duration) -> bool {
        self.last_update.elapsed() > stale_after
    }

    pub fn no_bid(&self) -> f64 {
        1.0 - self.yes_ask
    }

    pub fn no_ask(&self) -> f64 {
        1.0 - self.yes_bid
    }

    pub fn spread(&self) -> f64 {
        (self.yes_ask - self.yes_bid).max(0.0)
    }
}

#[derive(Debug, Default)]
pub struct QuoteCache {
    quotes: dashmap::DashMap<String, Quote>,
}

impl QuoteCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, market_ticker: &str, yes_bid: f64, yes_ask: f64, liquidity: f64, volume_24h: u64) {
        self.quotes.insert(
            market_ticker.to_string(),
            Quote {
                yes_bid,
                yes_ask,
                liquidity,
                volume_24h,
                last_update: Instant::now(),
            },
        );
    }

    /// Returns the cached quote only if it isn't older than `stale_after`.
    pub fn get_fresh(&self, market_ticker: &str, stale_after: Duration) -> Option<Quote> {
        self.quotes
            .get(market_ticker)
            .map(|q| *q.value())
            .filter(|q| !q.is_stale(stale_after))
    }

    pub fn get(&self, market_ticker: &str) -> Option<Quote> {
        self.quotes.get(market_ticker).map(|q| *q.value())
    }

    pub fn remove(&self, market_ticker: &str) {
        self.quotes.remove(market_ticker);
    }

    pub fn subscribed_tickers(&self) -> Vec<String> {
        self.quotes.iter().map(|e| e.key().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_quote_is_retrievable() {
        let cache = QuoteCache::new();
        cache.update("EVT-A", 0.45, 0.48, 500.0, 10_000);
        let q = cache.get_fresh("EVT-A", Duration::from_secs(5)).unwrap();
        assert!((q.yes_bid - 0.45).abs() < 1e-9);
    }

    #[test]
    fn stale_quote_is_not_returned() {
        let cache = QuoteCache::new();
        cache.update("EVT-A", 0.45, 0.48, 500.0, 10_000);
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get_fresh("EVT-A", Duration::from_millis(1)).is_none());
        assert!(cache.get("EVT-A").is_some());
    }

    #[test]
    fn no_side_is_derived_from_yes() {
        let cache = QuoteCache::new();
        cache.update("EVT-A", 0.45, 0.48, 500.0, 10_000);
        let q = cache.get("EVT-A").unwrap();
        assert!((q.no_bid() - 0.52).abs() < 1e-9);
        assert!((q.no_ask() - 0.55).abs() < 1e-9);
    }
}
