//! External collaborators: market data and LLM-backed analysis.
//!
//! The orchestrator and pipeline only see these traits; production
//! implementations live in the submodules and deterministic substitutes are
//! used in tests.

pub mod llm;
pub mod market;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::AgentError;
use crate::model::{
    HistoricalSeries, MarketSnapshot, RiskLevels, SentimentReport, Signal, TechnicalReport,
};

pub use llm::{LlmAnalysisProvider, LlmClient};
pub use market::AlpacaMarketData;

/// Fetches live and historical prices.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    async fn fetch_snapshot(&self, ticker: &str) -> Result<MarketSnapshot, AgentError>;

    async fn fetch_history(
        &self,
        ticker: &str,
        period: &str,
        interval: &str,
    ) -> Result<HistoricalSeries, AgentError>;
}

/// Everything the synthesis stage needs in one place.
#[derive(Clone, Debug)]
pub struct SynthesisInput {
    pub ticker: String,
    pub name: String,
    pub current_price: f64,
    pub risk: RiskLevels,
    pub technical: Option<TechnicalReport>,
    pub sentiment: Option<SentimentReport>,
    /// True when one analysis leg failed and the synthesis runs on partial
    /// inputs.
    pub degraded: bool,
}

/// Schema-validated output of the synthesis provider. The pipeline turns this
/// into a full `Recommendation`.
#[derive(Clone, Debug)]
pub struct RecommendationDraft {
    pub signal: Signal,
    /// 0-100, already clamped.
    pub confidence: f64,
    pub reasoning: String,
    pub key_factors: Vec<String>,
    /// Pass-through provider fields (timeframe, warnings, ...).
    pub extras: Value,
}

/// Produces technical/sentiment judgments and synthesizes recommendations.
/// May be a remote reasoning service; output is opaque but schema-validated.
#[async_trait]
pub trait AnalysisProvider: Send + Sync {
    async fn analyze_technical(
        &self,
        ticker: &str,
        series: &HistoricalSeries,
    ) -> Result<TechnicalReport, AgentError>;

    async fn analyze_sentiment(
        &self,
        ticker: &str,
        name: &str,
    ) -> Result<SentimentReport, AgentError>;

    async fn synthesize(&self, input: &SynthesisInput) -> Result<RecommendationDraft, AgentError>;
}
