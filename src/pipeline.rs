//! Per-instrument analysis pipeline.
//!
//! One run walks `Pending -> Fetching -> Analyzing -> RiskComputed ->
//! Synthesizing -> Persisted | Failed` for a single instrument. Failures are
//! fully isolated: whatever happens here is reported as an outcome, never
//! propagated into a sibling pipeline.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::cache::MarketCache;
use crate::config::{AppConfig, DenyPolicy};
use crate::error::AgentError;
use crate::limiter::{RateLimiter, PROVIDER_ANALYSIS, PROVIDER_MARKET_DATA};
use crate::model::{
    FailureReason, HistoricalSeries, Instrument, MarketSnapshot, PipelineOutcome, Recommendation,
    SentimentReport, Signal, TechnicalReport,
};
use crate::providers::{AnalysisProvider, MarketDataProvider, SynthesisInput};
use crate::risk;
use crate::shutdown::Shutdown;
use crate::store::ResultStore;

/// Multiplier applied to provider confidence when one analysis leg failed.
const DEGRADED_CONFIDENCE_FACTOR: f64 = 0.75;

/// Pipeline stages, mostly for logging and tests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Pending,
    Fetching,
    Analyzing,
    RiskComputed,
    Synthesizing,
    Persisted,
    Failed,
}

/// Shared dependencies handed to every pipeline run. Cache and limiter are
/// the only cross-pipeline mutable state; both are safe under concurrency.
#[derive(Clone)]
pub struct PipelineContext {
    pub market: Arc<dyn MarketDataProvider>,
    pub analysis: Arc<dyn AnalysisProvider>,
    pub store: Arc<dyn ResultStore>,
    pub cache: Arc<MarketCache>,
    pub limiter: RateLimiter,
    pub config: Arc<AppConfig>,
    pub shutdown: Shutdown,
}

impl PipelineContext {
    /// Admission check for one outbound provider call, honoring the
    /// configured deny policy.
    async fn admit(&self, provider: &str) -> bool {
        match self.config.rate_limit.deny_policy {
            DenyPolicy::Defer => self.limiter.try_acquire(provider),
            DenyPolicy::Wait => {
                let timeout = Duration::from_secs(self.config.rate_limit.wait_timeout_secs);
                self.limiter.acquire(provider, timeout).await
            }
        }
    }
}

fn skipped(ticker: &str, reason: FailureReason, detail: impl Into<String>) -> PipelineOutcome {
    PipelineOutcome::Skipped {
        ticker: ticker.to_string(),
        reason,
        detail: detail.into(),
    }
}

/// Runs the full pipeline for one instrument and returns its terminal state.
pub async fn run(instrument: &Instrument, ctx: &PipelineContext) -> PipelineOutcome {
    let ticker = instrument.ticker.as_str();
    let mut stage = Stage::Pending;
    info!("[{}] stage {:?}", ticker, stage);

    if ctx.shutdown.is_cancelled() {
        return skipped(ticker, FailureReason::Cancelled, "cancelled before start");
    }

    // Fetching
    stage = Stage::Fetching;
    info!("[{}] stage {:?}", ticker, stage);

    let snapshot = match fetch_snapshot(ticker, ctx).await {
        Ok(snapshot) => snapshot,
        Err(AgentError::RateLimitExhausted { provider }) => {
            return skipped(
                ticker,
                FailureReason::RateLimitExhausted,
                format!("{provider} budget exhausted, deferred to next cycle"),
            );
        }
        Err(e) => {
            return skipped(ticker, FailureReason::DataUnavailable, e.to_string());
        }
    };
    let history = match fetch_history(ticker, ctx).await {
        Ok(history) => history,
        Err(AgentError::RateLimitExhausted { provider }) => {
            return skipped(
                ticker,
                FailureReason::RateLimitExhausted,
                format!("{provider} budget exhausted, deferred to next cycle"),
            );
        }
        Err(e) => {
            return skipped(ticker, FailureReason::DataUnavailable, e.to_string());
        }
    };

    if ctx.shutdown.is_cancelled() {
        return skipped(ticker, FailureReason::Cancelled, "cancelled after fetch");
    }

    // Analyzing: each leg may fail independently; one failure degrades,
    // both failing abort.
    stage = Stage::Analyzing;
    info!("[{}] stage {:?}", ticker, stage);

    let technical = match fetch_technical(ticker, &history, ctx).await {
        Ok(report) => Some(report),
        Err(e) => {
            warn!("[{}] technical analysis failed: {}", ticker, e);
            None
        }
    };
    let sentiment = match fetch_sentiment(instrument, ctx).await {
        Ok(report) => Some(report),
        Err(e) => {
            warn!("[{}] sentiment analysis failed: {}", ticker, e);
            None
        }
    };

    if technical.is_none() && sentiment.is_none() {
        return skipped(
            ticker,
            FailureReason::AnalysisUnavailable,
            "both technical and sentiment analysis failed",
        );
    }
    let degraded = technical.is_none() || sentiment.is_none();

    if ctx.shutdown.is_cancelled() {
        return skipped(ticker, FailureReason::Cancelled, "cancelled after analysis");
    }

    // RiskComputed
    stage = Stage::RiskComputed;
    info!("[{}] stage {:?}", ticker, stage);

    let levels = technical.as_ref().map(|t| &t.levels);
    let risk_levels = match risk::compute(
        ticker,
        snapshot.current_price,
        &history,
        levels,
        &ctx.config.risk,
    ) {
        Ok(levels) => levels,
        Err(e) => {
            return skipped(ticker, FailureReason::RiskComputationError, e.to_string());
        }
    };
    if risk_levels.low_confidence {
        warn!(
            "[{}] low-confidence risk levels: history shorter than lookback, using default percentages",
            ticker
        );
    }

    // Synthesizing
    stage = Stage::Synthesizing;
    info!("[{}] stage {:?}", ticker, stage);

    if !ctx.admit(PROVIDER_ANALYSIS).await {
        return skipped(
            ticker,
            FailureReason::RateLimitExhausted,
            "analysis budget exhausted before synthesis, deferred to next cycle",
        );
    }

    let input = SynthesisInput {
        ticker: ticker.to_string(),
        name: instrument.name.clone(),
        current_price: snapshot.current_price,
        risk: risk_levels.clone(),
        technical: technical.clone(),
        sentiment: sentiment.clone(),
        degraded,
    };
    let draft = match ctx.analysis.synthesize(&input).await {
        Ok(draft) => draft,
        Err(e @ AgentError::MalformedProviderResponse { .. }) => {
            return skipped(
                ticker,
                FailureReason::MalformedProviderResponse,
                e.to_string(),
            );
        }
        Err(e) => {
            return skipped(ticker, FailureReason::AnalysisUnavailable, e.to_string());
        }
    };

    let mut confidence = draft.confidence;
    if degraded {
        confidence = (confidence * DEGRADED_CONFIDENCE_FACTOR).clamp(0.0, 100.0);
    }

    // Below-threshold recommendations are downgraded to HOLD but still
    // persisted, never dropped.
    let mut signal = draft.signal;
    if confidence < ctx.config.confidence_threshold && signal != Signal::Hold {
        info!(
            "[{}] confidence {:.0} below threshold {:.0}, downgrading {} to HOLD",
            ticker, confidence, ctx.config.confidence_threshold, signal
        );
        signal = Signal::Hold;
    }

    let recommendation = Recommendation {
        id: Uuid::new_v4().to_string(),
        ticker: ticker.to_string(),
        timestamp: Utc::now(),
        current_price: snapshot.current_price,
        signal,
        confidence,
        reasoning: draft.reasoning,
        key_factors: draft.key_factors,
        risk: risk_levels,
        technical: technical.as_ref().map(technical_summary),
        sentiment: sentiment.as_ref().map(|s| s.overall_sentiment.clone()),
        sentiment_score: sentiment.as_ref().map(|s| s.sentiment_score),
        degraded,
        extras: draft.extras,
    };

    // A cancelled pipeline must not persist partial state.
    if ctx.shutdown.is_cancelled() {
        return skipped(ticker, FailureReason::Cancelled, "cancelled before persist");
    }

    // Persisted
    stage = Stage::Persisted;
    if let Err(e) = ctx.store.append(&recommendation) {
        warn!("[{}] failed to persist recommendation: {}", ticker, e);
        return skipped(ticker, FailureReason::StoreError, e.to_string());
    }
    info!(
        "[{}] stage {:?}: {} at {:.0}% confidence",
        ticker, stage, recommendation.signal, recommendation.confidence
    );

    PipelineOutcome::Persisted(Box::new(recommendation))
}

fn technical_summary(report: &TechnicalReport) -> serde_json::Value {
    json!({
        "overall_signal": report.overall_signal,
        "support_levels": report.levels.support_levels,
        "resistance_levels": report.levels.resistance_levels,
    })
}

async fn fetch_snapshot(
    ticker: &str,
    ctx: &PipelineContext,
) -> Result<MarketSnapshot, AgentError> {
    if let Some(snapshot) = ctx.cache.get_snapshot(ticker) {
        info!("[{}] using cached snapshot", ticker);
        return Ok(snapshot);
    }
    if !ctx.admit(PROVIDER_MARKET_DATA).await {
        return Err(AgentError::RateLimitExhausted {
            provider: PROVIDER_MARKET_DATA.to_string(),
        });
    }
    let snapshot = ctx.market.fetch_snapshot(ticker).await?;
    ctx.cache.put_snapshot(ticker, snapshot.clone());
    Ok(snapshot)
}

async fn fetch_history(
    ticker: &str,
    ctx: &PipelineContext,
) -> Result<HistoricalSeries, AgentError> {
    if let Some(series) = ctx.cache.get_history(ticker) {
        info!("[{}] using cached history", ticker);
        return Ok(series);
    }
    if !ctx.admit(PROVIDER_MARKET_DATA).await {
        return Err(AgentError::RateLimitExhausted {
            provider: PROVIDER_MARKET_DATA.to_string(),
        });
    }
    let series = ctx
        .market
        .fetch_history(
            ticker,
            &ctx.config.history.period,
            &ctx.config.history.interval,
        )
        .await?;
    ctx.cache.put_history(ticker, series.clone());
    Ok(series)
}

async fn fetch_technical(
    ticker: &str,
    history: &HistoricalSeries,
    ctx: &PipelineContext,
) -> Result<TechnicalReport, AgentError> {
    if let Some(report) = ctx.cache.get_technical(ticker) {
        info!("[{}] using cached technical report", ticker);
        return Ok(report);
    }
    if !ctx.admit(PROVIDER_ANALYSIS).await {
        return Err(AgentError::RateLimitExhausted {
            provider: PROVIDER_ANALYSIS.to_string(),
        });
    }
    let report = ctx.analysis.analyze_technical(ticker, history).await?;
    ctx.cache.put_technical(ticker, report.clone());
    Ok(report)
}

async fn fetch_sentiment(
    instrument: &Instrument,
    ctx: &PipelineContext,
) -> Result<SentimentReport, AgentError> {
    let ticker = instrument.ticker.as_str();
    if let Some(report) = ctx.cache.get_sentiment(ticker) {
        info!("[{}] using cached sentiment report", ticker);
        return Ok(report);
    }
    if !ctx.admit(PROVIDER_ANALYSIS).await {
        return Err(AgentError::RateLimitExhausted {
            provider: PROVIDER_ANALYSIS.to_string(),
        });
    }
    let report = ctx
        .analysis
        .analyze_sentiment(ticker, &instrument.name)
        .await?;
    ctx.cache.put_sentiment(ticker, report.clone());
    Ok(report)
}
