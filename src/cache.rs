//! TTL-keyed cache for provider responses.
//!
//! Keys are (ticker, data kind); the kind selects the typed map. Entries are
//! reusable only while `now - created_at < ttl`; expired entries are treated
//! as absent and evicted lazily on read.

use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::config::CacheTtlConfig;
use crate::model::{HistoricalSeries, MarketSnapshot, SentimentReport, TechnicalReport};

#[derive(Clone, Debug)]
struct CacheEntry<V> {
    value: V,
    created_at: Instant,
    ttl: Duration,
}

impl<V> CacheEntry<V> {
    fn is_fresh(&self) -> bool {
        self.created_at.elapsed() < self.ttl
    }
}

/// Concurrent TTL map. DashMap gives entry-level locking, so readers see
/// either a fully written entry or none.
#[derive(Debug)]
pub struct TtlCache<V: Clone> {
    entries: DashMap<String, CacheEntry<V>>,
}

impl<V: Clone> Default for TtlCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone> TtlCache<V> {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Returns the payload only if an unexpired entry exists. Expired entries
    /// are removed on the way out.
    pub fn get(&self, key: &str) -> Option<V> {
        if let Some(entry) = self.entries.get(key) {
            if entry.is_fresh() {
                return Some(entry.value.clone());
            }
        }
        // Drop the read guard before removing, then re-check freshness so a
        // concurrent overwrite is not evicted by mistake.
        self.entries.remove_if(key, |_, entry| !entry.is_fresh());
        None
    }

    /// Unconditionally overwrites any existing entry for `key`.
    pub fn put(&self, key: impl Into<String>, value: V, ttl: Duration) {
        self.entries.insert(
            key.into(),
            CacheEntry {
                value,
                created_at: Instant::now(),
                ttl,
            },
        );
    }

    /// Reclaims memory held by expired entries. Optional; correctness only
    /// depends on the lazy eviction in `get`.
    pub fn sweep(&self) {
        self.entries.retain(|_, entry| entry.is_fresh());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// All provider caches, with per-kind TTLs from configuration. Owned by the
/// orchestrator and shared across concurrent pipelines.
#[derive(Debug)]
pub struct MarketCache {
    pub snapshots: TtlCache<MarketSnapshot>,
    pub history: TtlCache<HistoricalSeries>,
    pub technical: TtlCache<TechnicalReport>,
    pub sentiment: TtlCache<SentimentReport>,
    ttl: CacheTtlConfig,
}

impl MarketCache {
    pub fn new(ttl: CacheTtlConfig) -> Self {
        Self {
            snapshots: TtlCache::new(),
            history: TtlCache::new(),
            technical: TtlCache::new(),
            sentiment: TtlCache::new(),
            ttl,
        }
    }

    pub fn get_snapshot(&self, ticker: &str) -> Option<MarketSnapshot> {
        self.snapshots.get(ticker)
    }

    pub fn put_snapshot(&self, ticker: &str, snapshot: MarketSnapshot) {
        self.snapshots
            .put(ticker, snapshot, Duration::from_secs(self.ttl.snapshot_secs));
    }

    pub fn get_history(&self, ticker: &str) -> Option<HistoricalSeries> {
        self.history.get(ticker)
    }

    pub fn put_history(&self, ticker: &str, series: HistoricalSeries) {
        self.history
            .put(ticker, series, Duration::from_secs(self.ttl.history_secs));
    }

    pub fn get_technical(&self, ticker: &str) -> Option<TechnicalReport> {
        self.technical.get(ticker)
    }

    pub fn put_technical(&self, ticker: &str, report: TechnicalReport) {
        self.technical
            .put(ticker, report, Duration::from_secs(self.ttl.technical_secs));
    }

    pub fn get_sentiment(&self, ticker: &str) -> Option<SentimentReport> {
        self.sentiment.get(ticker)
    }

    pub fn put_sentiment(&self, ticker: &str, report: SentimentReport) {
        self.sentiment
            .put(ticker, report, Duration::from_secs(self.ttl.sentiment_secs));
    }

    pub fn sweep(&self) {
        self.snapshots.sweep();
        self.history.sweep();
        self.technical.sweep();
        self.sentiment.sweep();
    }
}
