//! Portfolio Sentinel - AI-assisted portfolio monitoring agent
//!
//! This library provides the core functionality for continuous instrument
//! analysis: cycle orchestration under bounded concurrency, TTL caching and
//! per-provider rate limiting, deterministic risk-level derivation, and
//! LLM-backed technical/sentiment synthesis.

pub mod cache;
pub mod config;
pub mod error;
pub mod limiter;
pub mod model;
pub mod pipeline;
pub mod providers;
pub mod report;
pub mod risk;
pub mod scheduler;
pub mod shutdown;
pub mod store;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::AgentError;
pub use model::{CycleSummary, Instrument, PipelineOutcome, Recommendation, RiskLevels, Signal};
pub use scheduler::Orchestrator;

#[cfg(test)]
mod cache_tests;
#[cfg(test)]
mod config_tests;
#[cfg(test)]
mod store_tests;
