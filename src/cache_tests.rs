//! Unit tests for the TTL cache.

#[cfg(test)]
mod cache_tests {
    use std::time::Duration;

    use chrono::Utc;

    use crate::cache::{MarketCache, TtlCache};
    use crate::config::CacheTtlConfig;
    use crate::model::MarketSnapshot;

    fn snapshot(ticker: &str, price: f64) -> MarketSnapshot {
        MarketSnapshot {
            ticker: ticker.to_string(),
            timestamp: Utc::now(),
            current_price: price,
            open: price,
            high: price * 1.01,
            low: price * 0.99,
            volume: 1000,
            previous_close: price,
            change: 0.0,
            change_percent: 0.0,
        }
    }

    #[test]
    fn test_round_trip() {
        let cache: TtlCache<i32> = TtlCache::new();
        cache.put("AAPL", 42, Duration::from_secs(60));
        assert_eq!(cache.get("AAPL"), Some(42));
        assert_eq!(cache.get("MSFT"), None);
    }

    #[test]
    fn test_expired_entry_is_absent() {
        let cache: TtlCache<i32> = TtlCache::new();
        cache.put("AAPL", 42, Duration::from_millis(20));
        assert_eq!(cache.get("AAPL"), Some(42));

        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(cache.get("AAPL"), None);
        // Lazy eviction removed the entry on read.
        assert!(cache.is_empty());
    }

    #[test]
    fn test_put_overwrites_unconditionally() {
        let cache: TtlCache<i32> = TtlCache::new();
        cache.put("AAPL", 1, Duration::from_secs(60));
        cache.put("AAPL", 2, Duration::from_secs(60));
        assert_eq!(cache.get("AAPL"), Some(2));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_overwrite_refreshes_expired_entry() {
        let cache: TtlCache<i32> = TtlCache::new();
        cache.put("AAPL", 1, Duration::from_millis(10));
        std::thread::sleep(Duration::from_millis(30));
        cache.put("AAPL", 2, Duration::from_secs(60));
        assert_eq!(cache.get("AAPL"), Some(2));
    }

    #[test]
    fn test_sweep_reclaims_expired_entries() {
        let cache: TtlCache<i32> = TtlCache::new();
        cache.put("A", 1, Duration::from_millis(10));
        cache.put("B", 2, Duration::from_secs(60));
        std::thread::sleep(Duration::from_millis(30));

        cache.sweep();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("B"), Some(2));
    }

    #[test]
    fn test_market_cache_keys_by_data_kind() {
        let cache = MarketCache::new(CacheTtlConfig::default());
        cache.put_snapshot("AAPL", snapshot("AAPL", 170.5));

        // Same ticker, different kind: no crosstalk.
        assert!(cache.get_snapshot("AAPL").is_some());
        assert!(cache.get_history("AAPL").is_none());
        assert!(cache.get_technical("AAPL").is_none());
        assert!(cache.get_sentiment("AAPL").is_none());
    }

    #[test]
    fn test_market_cache_honors_configured_ttl() {
        let ttl = CacheTtlConfig {
            snapshot_secs: 0,
            ..CacheTtlConfig::default()
        };
        let cache = MarketCache::new(ttl);
        cache.put_snapshot("AAPL", snapshot("AAPL", 170.5));
        // Zero TTL means immediately stale.
        assert!(cache.get_snapshot("AAPL").is_none());
    }

    #[test]
    fn test_concurrent_readers_and_writers() {
        use std::sync::Arc;

        let cache: Arc<TtlCache<u64>> = Arc::new(TtlCache::new());
        let mut handles = Vec::new();
        for t in 0..8u64 {
            let cache = cache.clone();
            handles.push(std::thread::spawn(move || {
                for i in 0..100u64 {
                    cache.put(format!("k{}", i % 10), t * 1000 + i, Duration::from_secs(60));
                    let _ = cache.get(&format!("k{}", i % 10));
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        // Every surviving entry is one that some writer fully wrote.
        for i in 0..10u64 {
            assert!(cache.get(&format!("k{i}")).is_some());
        }
    }
}
