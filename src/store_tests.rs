//! Unit tests for the result stores.

#[cfg(test)]
mod store_tests {
    use chrono::Utc;
    use serde_json::Value;
    use uuid::Uuid;

    use crate::model::{Recommendation, RiskLevels, Signal};
    use crate::store::{FileResultStore, MemoryResultStore, ResultStore};

    fn risk_levels(ticker: &str, price: f64) -> RiskLevels {
        RiskLevels {
            ticker: ticker.to_string(),
            current_price: price,
            stop_loss: price * 0.95,
            take_profit_1: price * 1.10,
            take_profit_2: price * 1.20,
            stop_loss_percent: -5.0,
            take_profit_1_percent: 10.0,
            take_profit_2_percent: 20.0,
            risk_reward_ratio_1: 2.0,
            risk_reward_ratio_2: 4.0,
            valid: true,
            low_confidence: false,
            volatility: 0.02,
            atr: 1.5,
            timestamp: Utc::now(),
        }
    }

    fn recommendation(ticker: &str, signal: Signal, confidence: f64) -> Recommendation {
        Recommendation {
            id: Uuid::new_v4().to_string(),
            ticker: ticker.to_string(),
            timestamp: Utc::now(),
            current_price: 170.5,
            signal,
            confidence,
            reasoning: "test reasoning".to_string(),
            key_factors: vec!["factor".to_string()],
            risk: risk_levels(ticker, 170.5),
            technical: None,
            sentiment: Some("positive".to_string()),
            sentiment_score: Some(0.4),
            degraded: false,
            extras: Value::Null,
        }
    }

    #[test]
    fn test_memory_store_append_and_latest() {
        let store = MemoryResultStore::new();
        let first = recommendation("AAPL", Signal::Buy, 80.0);
        let second = recommendation("AAPL", Signal::Hold, 55.0);

        store.append(&first).unwrap();
        store.append(&second).unwrap();

        let latest = store.latest("AAPL").unwrap().unwrap();
        assert_eq!(latest.id, second.id);
        assert_eq!(store.history("AAPL", 7).unwrap().len(), 2);
        assert!(store.latest("MSFT").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_append_grows_history_not_latest() {
        // Simulated retry: same record twice. History is append-only,
        // latest is overwrite-only.
        let store = MemoryResultStore::new();
        let rec = recommendation("AAPL", Signal::Buy, 80.0);

        store.append(&rec).unwrap();
        store.append(&rec).unwrap();

        let history = store.history("AAPL", 7).unwrap();
        assert_eq!(history.len(), 2);
        let latest = store.latest("AAPL").unwrap().unwrap();
        assert_eq!(latest.id, rec.id);
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileResultStore::new(dir.path()).unwrap();
        let rec = recommendation("AAPL", Signal::Buy, 82.0);

        store.append(&rec).unwrap();

        let latest = store.latest("AAPL").unwrap().unwrap();
        assert_eq!(latest.id, rec.id);
        assert_eq!(latest.signal, Signal::Buy);
        assert_eq!(latest.risk.take_profit_1, rec.risk.take_profit_1);

        let history = store.history("AAPL", 1).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, rec.id);
    }

    #[test]
    fn test_file_store_history_is_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileResultStore::new(dir.path()).unwrap();

        let mut older = recommendation("AAPL", Signal::Hold, 50.0);
        older.timestamp = Utc::now() - chrono::Duration::hours(2);
        let newer = recommendation("AAPL", Signal::Buy, 90.0);

        store.append(&older).unwrap();
        store.append(&newer).unwrap();

        // Two days back in case the older record crossed a UTC date boundary.
        let history = store.history("AAPL", 2).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, newer.id);
        assert_eq!(history[1].id, older.id);
    }

    #[test]
    fn test_file_store_duplicate_append() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileResultStore::new(dir.path()).unwrap();
        let rec = recommendation("AAPL", Signal::Buy, 82.0);

        store.append(&rec).unwrap();
        store.append(&rec).unwrap();

        assert_eq!(store.history("AAPL", 1).unwrap().len(), 2);
        assert_eq!(store.latest("AAPL").unwrap().unwrap().id, rec.id);
    }

    #[test]
    fn test_file_store_skips_corrupt_history_lines() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileResultStore::new(dir.path()).unwrap();
        let rec = recommendation("AAPL", Signal::Buy, 82.0);
        store.append(&rec).unwrap();

        // Corrupt today's history file with a garbage line.
        let date = Utc::now().format("%Y%m%d").to_string();
        let path = dir.path().join("history").join(format!("AAPL_{date}.jsonl"));
        let mut content = std::fs::read_to_string(&path).unwrap();
        content.push_str("{not json}\n");
        std::fs::write(&path, content).unwrap();

        let history = store.history("AAPL", 1).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, rec.id);
    }

    #[test]
    fn test_file_store_tickers_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileResultStore::new(dir.path()).unwrap();

        store.append(&recommendation("AAPL", Signal::Buy, 82.0)).unwrap();
        store.append(&recommendation("MSFT", Signal::Sell, 75.0)).unwrap();

        assert_eq!(store.history("AAPL", 1).unwrap().len(), 1);
        assert_eq!(store.history("MSFT", 1).unwrap().len(), 1);
        assert_eq!(
            store.latest("MSFT").unwrap().unwrap().signal,
            Signal::Sell
        );
    }

    #[test]
    fn test_concurrent_appends_do_not_corrupt_records() {
        use std::sync::Arc;

        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileResultStore::new(dir.path()).unwrap());

        let mut handles = Vec::new();
        for _ in 0..4 {
            let store = store.clone();
            handles.push(std::thread::spawn(move || {
                for _ in 0..10 {
                    store
                        .append(&recommendation("AAPL", Signal::Hold, 60.0))
                        .unwrap();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        // Every line parses back; nothing interleaved mid-record.
        assert_eq!(store.history("AAPL", 1).unwrap().len(), 40);
    }
}
