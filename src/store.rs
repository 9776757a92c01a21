//! Recommendation persistence.
//!
//! Append-only history plus a per-ticker "latest" snapshot. The file-backed
//! store mirrors the output layout of the agent: one JSON file per
//! recommendation, a daily JSONL history per ticker, and a latest pointer
//! that is overwritten in place.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{Duration as ChronoDuration, Utc};
use tracing::warn;

use crate::error::AgentError;
use crate::model::Recommendation;

pub trait ResultStore: Send + Sync {
    /// Appends to history and replaces the latest pointer. Appending the
    /// same recommendation twice grows history twice; latest is simply
    /// overwritten.
    fn append(&self, recommendation: &Recommendation) -> Result<(), AgentError>;

    fn latest(&self, ticker: &str) -> Result<Option<Recommendation>, AgentError>;

    /// History for the last `days` days, newest first.
    fn history(&self, ticker: &str, days: u32) -> Result<Vec<Recommendation>, AgentError>;
}

pub struct FileResultStore {
    recommendations_dir: PathBuf,
    history_dir: PathBuf,
    latest_dir: PathBuf,
    // Serializes history appends so concurrent pipeline writers never
    // interleave within a record.
    append_lock: Mutex<()>,
}

impl FileResultStore {
    pub fn new(output_dir: impl Into<PathBuf>) -> Result<Self, AgentError> {
        let root: PathBuf = output_dir.into();
        let recommendations_dir = root.join("recommendations");
        let history_dir = root.join("history");
        let latest_dir = root.join("latest");
        fs::create_dir_all(&recommendations_dir)?;
        fs::create_dir_all(&history_dir)?;
        fs::create_dir_all(&latest_dir)?;

        Ok(Self {
            recommendations_dir,
            history_dir,
            latest_dir,
            append_lock: Mutex::new(()),
        })
    }

    fn history_file(&self, ticker: &str, date: &str) -> PathBuf {
        self.history_dir.join(format!("{ticker}_{date}.jsonl"))
    }
}

impl ResultStore for FileResultStore {
    fn append(&self, recommendation: &Recommendation) -> Result<(), AgentError> {
        let ticker = &recommendation.ticker;
        let json = serde_json::to_string_pretty(recommendation)?;

        // Individual file, named by timestamp + id so retries never clobber.
        let filename = format!(
            "{}_{}_{}.json",
            ticker,
            recommendation.timestamp.format("%Y%m%d_%H%M%S"),
            &recommendation.id[..8.min(recommendation.id.len())]
        );
        fs::write(self.recommendations_dir.join(filename), &json)?;

        // Daily JSONL history, one full line per record.
        let date = recommendation.timestamp.format("%Y%m%d").to_string();
        let line = serde_json::to_string(recommendation)?;
        {
            let _guard = self.append_lock.lock().expect("append lock poisoned");
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.history_file(ticker, &date))?;
            file.write_all(line.as_bytes())?;
            file.write_all(b"\n")?;
        }

        // Latest pointer, overwrite only.
        fs::write(self.latest_dir.join(format!("{ticker}.json")), &json)?;
        Ok(())
    }

    fn latest(&self, ticker: &str) -> Result<Option<Recommendation>, AgentError> {
        let path = self.latest_dir.join(format!("{ticker}.json"));
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    fn history(&self, ticker: &str, days: u32) -> Result<Vec<Recommendation>, AgentError> {
        let mut records = Vec::new();
        let today = Utc::now();
        for offset in 0..days {
            let date = (today - ChronoDuration::days(i64::from(offset)))
                .format("%Y%m%d")
                .to_string();
            let path = self.history_file(ticker, &date);
            if !path.exists() {
                continue;
            }
            for line in fs::read_to_string(path)?.lines() {
                match serde_json::from_str::<Recommendation>(line) {
                    Ok(rec) => records.push(rec),
                    Err(e) => warn!("[{}] skipping corrupt history line: {}", ticker, e),
                }
            }
        }
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(records)
    }
}

/// In-memory store for tests and dry runs.
#[derive(Default)]
pub struct MemoryResultStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    history: HashMap<String, Vec<Recommendation>>,
    latest: HashMap<String, Recommendation>,
}

impl MemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResultStore for MemoryResultStore {
    fn append(&self, recommendation: &Recommendation) -> Result<(), AgentError> {
        let mut inner = self.inner.lock().expect("memory store lock poisoned");
        inner
            .history
            .entry(recommendation.ticker.clone())
            .or_default()
            .push(recommendation.clone());
        inner
            .latest
            .insert(recommendation.ticker.clone(), recommendation.clone());
        Ok(())
    }

    fn latest(&self, ticker: &str) -> Result<Option<Recommendation>, AgentError> {
        let inner = self.inner.lock().expect("memory store lock poisoned");
        Ok(inner.latest.get(ticker).cloned())
    }

    fn history(&self, ticker: &str, days: u32) -> Result<Vec<Recommendation>, AgentError> {
        let cutoff = Utc::now() - ChronoDuration::days(i64::from(days));
        let inner = self.inner.lock().expect("memory store lock poisoned");
        let mut records: Vec<Recommendation> = inner
            .history
            .get(ticker)
            .map(|v| {
                v.iter()
                    .filter(|r| r.timestamp >= cutoff)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(records)
    }
}
