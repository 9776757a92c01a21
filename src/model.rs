//! Domain types shared across the pipeline and orchestrator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Market classification for an instrument.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Market {
    Equity,
    Forex,
    Crypto,
    Index,
}

/// A tradable symbol tracked by the agent. Loaded once from configuration
/// and immutable for the lifetime of a run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Instrument {
    pub ticker: String,
    pub name: String,
    pub market: Market,
}

impl Instrument {
    pub fn new(ticker: impl Into<String>, name: impl Into<String>, market: Market) -> Self {
        Self {
            ticker: ticker.into(),
            name: name.into(),
            market,
        }
    }
}

/// A point-in-time view of an instrument's price. Superseded by the next
/// snapshot, never merged.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub ticker: String,
    pub timestamp: DateTime<Utc>,
    pub current_price: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub volume: u64,
    pub previous_close: f64,
    pub change: f64,
    pub change_percent: f64,
}

impl MarketSnapshot {
    /// Derive change fields from the previous close.
    pub fn with_change(mut self) -> Self {
        if self.previous_close > 0.0 {
            self.change = self.current_price - self.previous_close;
            self.change_percent = (self.change / self.previous_close) * 100.0;
        }
        self
    }
}

/// A single OHLCV bar.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

/// Ordered OHLCV history for one instrument, read-only once fetched.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HistoricalSeries {
    pub ticker: String,
    pub period: String,
    pub interval: String,
    pub bars: Vec<Bar>,
}

impl HistoricalSeries {
    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }
}

/// Support/resistance levels the risk engine can clamp against.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TechnicalLevels {
    pub support_levels: Vec<f64>,
    pub resistance_levels: Vec<f64>,
}

/// Structured technical judgment from the analysis provider. The `detail`
/// payload is carried opaquely; the core only reads the typed fields.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TechnicalReport {
    pub ticker: String,
    pub timestamp: DateTime<Utc>,
    /// "bullish" | "bearish" | "neutral"
    pub overall_signal: String,
    pub levels: TechnicalLevels,
    pub detail: Value,
}

/// Structured sentiment judgment from the analysis provider.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SentimentReport {
    pub ticker: String,
    pub timestamp: DateTime<Utc>,
    /// "positive" | "negative" | "neutral"
    pub overall_sentiment: String,
    /// -1.0 (very negative) to +1.0 (very positive)
    pub sentiment_score: f64,
    pub detail: Value,
}

/// Stop-loss / take-profit levels computed by the risk engine.
/// Recomputed every cycle from fresh inputs, never patched.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RiskLevels {
    pub ticker: String,
    pub current_price: f64,
    pub stop_loss: f64,
    pub take_profit_1: f64,
    pub take_profit_2: f64,
    pub stop_loss_percent: f64,
    pub take_profit_1_percent: f64,
    pub take_profit_2_percent: f64,
    pub risk_reward_ratio_1: f64,
    pub risk_reward_ratio_2: f64,
    /// True iff risk_reward_ratio_1 meets the configured minimum.
    pub valid: bool,
    /// Set when the history was too short for a volatility estimate and
    /// percentage defaults were used instead.
    pub low_confidence: bool,
    /// Stddev of close-to-close returns over the lookback window.
    pub volatility: f64,
    /// Average True Range over the configured period.
    pub atr: f64,
    pub timestamp: DateTime<Utc>,
}

/// Directional trading signal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Signal {
    #[serde(rename = "BUY")]
    Buy,
    #[serde(rename = "SELL")]
    Sell,
    #[serde(rename = "HOLD")]
    Hold,
}

impl Signal {
    pub fn parse(s: &str) -> Option<Signal> {
        match s.trim().to_uppercase().as_str() {
            "BUY" => Some(Signal::Buy),
            "SELL" => Some(Signal::Sell),
            "HOLD" => Some(Signal::Hold),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::Buy => "BUY",
            Signal::Sell => "SELL",
            Signal::Hold => "HOLD",
        }
    }
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully synthesized trading recommendation. Appended to history once;
/// only the per-ticker "latest" pointer is ever replaced.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Recommendation {
    pub id: String,
    pub ticker: String,
    pub timestamp: DateTime<Utc>,
    pub current_price: f64,
    pub signal: Signal,
    /// 0-100
    pub confidence: f64,
    pub reasoning: String,
    #[serde(default)]
    pub key_factors: Vec<String>,
    pub risk: RiskLevels,
    /// Compact technical summary (overall signal plus provider extras).
    pub technical: Option<Value>,
    /// "positive" | "negative" | "neutral", when sentiment was available.
    pub sentiment: Option<String>,
    pub sentiment_score: Option<f64>,
    /// Set when one of the analysis legs failed and the recommendation was
    /// synthesized from partial inputs.
    pub degraded: bool,
    /// Extra fields passed through from the synthesis provider
    /// (timeframe, risk_level, entry/exit strategy, warnings, ...).
    #[serde(default)]
    pub extras: Value,
}

/// Why an instrument produced no recommendation this cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    DataUnavailable,
    AnalysisUnavailable,
    RiskComputationError,
    MalformedProviderResponse,
    RateLimitExhausted,
    StoreError,
    Timeout,
    Cancelled,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FailureReason::DataUnavailable => "DataUnavailable",
            FailureReason::AnalysisUnavailable => "AnalysisUnavailable",
            FailureReason::RiskComputationError => "RiskComputationError",
            FailureReason::MalformedProviderResponse => "MalformedProviderResponse",
            FailureReason::RateLimitExhausted => "RateLimitExhausted",
            FailureReason::StoreError => "StoreError",
            FailureReason::Timeout => "Timeout",
            FailureReason::Cancelled => "Cancelled",
        };
        f.write_str(s)
    }
}

/// Terminal outcome of one instrument's pipeline run.
#[derive(Clone, Debug)]
pub enum PipelineOutcome {
    Persisted(Box<Recommendation>),
    Skipped {
        ticker: String,
        reason: FailureReason,
        detail: String,
    },
}

impl PipelineOutcome {
    pub fn ticker(&self) -> &str {
        match self {
            PipelineOutcome::Persisted(rec) => &rec.ticker,
            PipelineOutcome::Skipped { ticker, .. } => ticker,
        }
    }
}

/// Per-cycle accounting reported by the orchestrator.
#[derive(Clone, Debug, Default)]
pub struct CycleSummary {
    pub cycle: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub persisted: Vec<Recommendation>,
    pub skipped: Vec<(String, FailureReason, String)>,
}

impl CycleSummary {
    pub fn persisted_count(&self) -> usize {
        self.persisted.len()
    }

    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }

    pub fn count_signal(&self, signal: Signal) -> usize {
        self.persisted.iter().filter(|r| r.signal == signal).count()
    }
}
