//! Custom error types for the portfolio agent
//!
//! Provides structured, typed errors instead of generic Box<dyn Error>

use thiserror::Error;

/// Top-level agent errors
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Invalid price {price} for {ticker}")]
    InvalidPriceInput { ticker: String, price: f64 },

    #[error("Degenerate risk input for {ticker}: {reason}")]
    DegenerateRiskInput { ticker: String, reason: String },

    #[error("Market data unavailable for {ticker}: {reason}")]
    DataUnavailable { ticker: String, reason: String },

    #[error("Analysis unavailable for {ticker}: {reason}")]
    AnalysisUnavailable { ticker: String, reason: String },

    #[error("Malformed provider response: {reason}")]
    MalformedProviderResponse { reason: String },

    #[error("Rate limit exhausted for provider {provider}")]
    RateLimitExhausted { provider: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("LLM provider error: {0}")]
    Llm(#[from] async_openai::error::OpenAIError),

    #[error("Deserialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AgentError {
    pub fn data_unavailable(ticker: impl Into<String>, reason: impl Into<String>) -> Self {
        AgentError::DataUnavailable {
            ticker: ticker.into(),
            reason: reason.into(),
        }
    }

    pub fn analysis_unavailable(ticker: impl Into<String>, reason: impl Into<String>) -> Self {
        AgentError::AnalysisUnavailable {
            ticker: ticker.into(),
            reason: reason.into(),
        }
    }

    pub fn malformed(reason: impl Into<String>) -> Self {
        AgentError::MalformedProviderResponse {
            reason: reason.into(),
        }
    }
}

impl From<String> for AgentError {
    fn from(err: String) -> Self {
        AgentError::Configuration(err)
    }
}

impl From<&str> for AgentError {
    fn from(err: &str) -> Self {
        AgentError::Configuration(err.to_string())
    }
}
