//! Cycle orchestration.
//!
//! Drives repeated analysis cycles over the watch set: fans out one pipeline
//! per instrument under a concurrency cap, waits for every pipeline to reach
//! a terminal state (or time out), reports a cycle summary, sleeps, repeats
//! until cancelled. Cycles never overlap.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::cache::MarketCache;
use crate::config::AppConfig;
use crate::limiter::RateLimiter;
use crate::model::{CycleSummary, FailureReason, Instrument, Market, PipelineOutcome};
use crate::pipeline::{self, PipelineContext};
use crate::providers::{AnalysisProvider, MarketDataProvider};
use crate::report;
use crate::shutdown::Shutdown;
use crate::store::ResultStore;

pub struct Orchestrator {
    ctx: PipelineContext,
    instruments: Vec<Instrument>,
}

impl Orchestrator {
    pub fn new(
        config: Arc<AppConfig>,
        market: Arc<dyn MarketDataProvider>,
        analysis: Arc<dyn AnalysisProvider>,
        store: Arc<dyn ResultStore>,
        shutdown: Shutdown,
    ) -> Self {
        let instruments = config.watch_set();
        let ctx = PipelineContext {
            market,
            analysis,
            store,
            cache: Arc::new(MarketCache::new(config.cache_ttl.clone())),
            limiter: RateLimiter::new(&config.rate_limit),
            config,
            shutdown,
        };
        Self { ctx, instruments }
    }

    pub fn instruments(&self) -> &[Instrument] {
        &self.instruments
    }

    /// One full pass over the watch set, bounded by `max_concurrency`.
    pub async fn run_cycle(&self, cycle: u64) -> CycleSummary {
        let started_at = Utc::now();
        info!(
            "Starting cycle #{} over {} instruments (concurrency <= {})",
            cycle,
            self.instruments.len(),
            self.ctx.config.max_concurrency
        );

        let semaphore = Arc::new(Semaphore::new(self.ctx.config.max_concurrency));
        let per_instrument_timeout = self.ctx.config.instrument_timeout();

        let mut handles = Vec::with_capacity(self.instruments.len());
        for instrument in self.instruments.clone() {
            let ctx = self.ctx.clone();
            let semaphore = semaphore.clone();
            handles.push(tokio::spawn(async move {
                let ticker = instrument.ticker.clone();
                let permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return PipelineOutcome::Skipped {
                            ticker,
                            reason: FailureReason::Cancelled,
                            detail: "scheduler shut down".to_string(),
                        }
                    }
                };
                if ctx.shutdown.is_cancelled() {
                    return PipelineOutcome::Skipped {
                        ticker,
                        reason: FailureReason::Cancelled,
                        detail: "cancelled while queued".to_string(),
                    };
                }
                let outcome = match timeout(per_instrument_timeout, pipeline::run(&instrument, &ctx))
                    .await
                {
                    Ok(outcome) => outcome,
                    Err(_) => PipelineOutcome::Skipped {
                        ticker,
                        reason: FailureReason::Timeout,
                        detail: format!("exceeded {}s pipeline timeout", per_instrument_timeout.as_secs()),
                    },
                };
                drop(permit);
                outcome
            }));
        }

        let grace = self.ctx.config.shutdown_grace();
        let mut summary = CycleSummary {
            cycle,
            started_at: Some(started_at),
            ..Default::default()
        };

        for (handle, instrument) in handles.into_iter().zip(self.instruments.iter()) {
            let mut handle = handle;
            // After a cancellation request, in-flight pipelines get the grace
            // period to reach a terminal state, then are abandoned.
            let join = if self.ctx.shutdown.is_cancelled() {
                match timeout(grace, &mut handle).await {
                    Ok(join) => join,
                    Err(_) => {
                        handle.abort();
                        warn!(
                            "[{}] abandoned after shutdown grace period",
                            instrument.ticker
                        );
                        summary.skipped.push((
                            instrument.ticker.clone(),
                            FailureReason::Cancelled,
                            "abandoned after shutdown grace period".to_string(),
                        ));
                        continue;
                    }
                }
            } else {
                handle.await
            };

            match join {
                Ok(PipelineOutcome::Persisted(rec)) => {
                    report::print_recommendation(&rec);
                    summary.persisted.push(*rec);
                }
                Ok(PipelineOutcome::Skipped {
                    ticker,
                    reason,
                    detail,
                }) => {
                    warn!("[{}] skipped this cycle: {} ({})", ticker, reason, detail);
                    summary.skipped.push((ticker, reason, detail));
                }
                Err(e) => {
                    warn!("[{}] pipeline task aborted: {}", instrument.ticker, e);
                    summary.skipped.push((
                        instrument.ticker.clone(),
                        FailureReason::Cancelled,
                        format!("task aborted: {e}"),
                    ));
                }
            }
        }

        summary
    }

    /// Continuous mode: cycle, report, sleep, repeat until cancelled.
    pub async fn run_continuous(&self) -> u64 {
        let interval = self.ctx.config.update_interval();
        let mut cycle = 0u64;

        while !self.ctx.shutdown.is_cancelled() {
            cycle += 1;
            let summary = self.run_cycle(cycle).await;
            report::log_cycle_summary(&summary);
            self.ctx.cache.sweep();

            if self.ctx.shutdown.is_cancelled() {
                break;
            }
            info!("Sleeping {}s until next cycle", interval.as_secs());
            tokio::select! {
                _ = self.ctx.shutdown.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        info!("Scheduler stopped after {} cycle(s)", cycle);
        cycle
    }

    /// Single-shot mode: exactly one cycle.
    pub async fn run_single(&self) -> CycleSummary {
        let summary = self.run_cycle(1).await;
        report::log_cycle_summary(&summary);
        summary
    }

    /// Analyzes one ticker once, outside the regular watch set if necessary.
    pub async fn run_single_instrument(&self, ticker: &str) -> PipelineOutcome {
        let instrument = self
            .instruments
            .iter()
            .find(|i| i.ticker.eq_ignore_ascii_case(ticker))
            .cloned()
            .unwrap_or_else(|| Instrument::new(ticker, ticker, Market::Equity));
        pipeline::run(&instrument, &self.ctx).await
    }
}
