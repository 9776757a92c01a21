use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::time::Duration;

use crate::error::AgentError;
use crate::model::{Instrument, Market};

fn default_update_interval_secs() -> u64 {
    60
}
fn default_max_concurrency() -> usize {
    10
}
fn default_confidence_threshold() -> f64 {
    70.0
}
fn default_instrument_timeout_secs() -> u64 {
    120
}
fn default_shutdown_grace_secs() -> u64 {
    30
}
fn default_output_dir() -> String {
    "output".to_string()
}

#[derive(Clone, Debug, Deserialize)]
pub struct RiskConfig {
    #[serde(default = "RiskConfig::default_stop_loss_pct")]
    pub stop_loss_pct: f64,
    #[serde(default = "RiskConfig::default_take_profit_1_pct")]
    pub take_profit_1_pct: f64,
    #[serde(default = "RiskConfig::default_take_profit_2_pct")]
    pub take_profit_2_pct: f64,
    #[serde(default = "RiskConfig::default_min_risk_reward")]
    pub min_risk_reward: f64,
    #[serde(default = "RiskConfig::default_volatility_lookback")]
    pub volatility_lookback: usize,
    #[serde(default = "RiskConfig::default_atr_period")]
    pub atr_period: usize,
    /// Scales the return-stddev before comparing against stop_loss_pct.
    #[serde(default = "RiskConfig::default_volatility_multiplier")]
    pub volatility_multiplier: f64,
}

impl RiskConfig {
    fn default_stop_loss_pct() -> f64 {
        5.0
    }
    fn default_take_profit_1_pct() -> f64 {
        10.0
    }
    fn default_take_profit_2_pct() -> f64 {
        20.0
    }
    fn default_min_risk_reward() -> f64 {
        1.5
    }
    fn default_volatility_lookback() -> usize {
        20
    }
    fn default_atr_period() -> usize {
        14
    }
    fn default_volatility_multiplier() -> f64 {
        1.0
    }
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            stop_loss_pct: Self::default_stop_loss_pct(),
            take_profit_1_pct: Self::default_take_profit_1_pct(),
            take_profit_2_pct: Self::default_take_profit_2_pct(),
            min_risk_reward: Self::default_min_risk_reward(),
            volatility_lookback: Self::default_volatility_lookback(),
            atr_period: Self::default_atr_period(),
            volatility_multiplier: Self::default_volatility_multiplier(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct CacheTtlConfig {
    #[serde(default = "CacheTtlConfig::default_snapshot_secs")]
    pub snapshot_secs: u64,
    #[serde(default = "CacheTtlConfig::default_history_secs")]
    pub history_secs: u64,
    #[serde(default = "CacheTtlConfig::default_technical_secs")]
    pub technical_secs: u64,
    #[serde(default = "CacheTtlConfig::default_sentiment_secs")]
    pub sentiment_secs: u64,
}

impl CacheTtlConfig {
    fn default_snapshot_secs() -> u64 {
        60
    }
    fn default_history_secs() -> u64 {
        3600
    }
    fn default_technical_secs() -> u64 {
        900
    }
    fn default_sentiment_secs() -> u64 {
        900
    }
}

impl Default for CacheTtlConfig {
    fn default() -> Self {
        Self {
            snapshot_secs: Self::default_snapshot_secs(),
            history_secs: Self::default_history_secs(),
            technical_secs: Self::default_technical_secs(),
            sentiment_secs: Self::default_sentiment_secs(),
        }
    }
}

/// Token-bucket parameters for one provider.
#[derive(Clone, Debug, Deserialize)]
pub struct RateBudgetConfig {
    pub capacity: u32,
    pub refill_per_sec: f64,
}

/// What a pipeline stage does when the bucket is empty.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DenyPolicy {
    /// Skip the call this cycle and reuse stale data where allowed.
    #[default]
    Defer,
    /// Block on refill up to `wait_timeout_secs`.
    Wait,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "RateLimitConfig::default_budgets")]
    pub budgets: HashMap<String, RateBudgetConfig>,
    #[serde(default)]
    pub deny_policy: DenyPolicy,
    #[serde(default = "RateLimitConfig::default_wait_timeout_secs")]
    pub wait_timeout_secs: u64,
}

impl RateLimitConfig {
    fn default_budgets() -> HashMap<String, RateBudgetConfig> {
        let mut budgets = HashMap::new();
        budgets.insert(
            crate::limiter::PROVIDER_MARKET_DATA.to_string(),
            RateBudgetConfig {
                capacity: 10,
                refill_per_sec: 1.0,
            },
        );
        budgets.insert(
            crate::limiter::PROVIDER_ANALYSIS.to_string(),
            RateBudgetConfig {
                capacity: 5,
                refill_per_sec: 0.5,
            },
        );
        budgets
    }

    fn default_wait_timeout_secs() -> u64 {
        10
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            budgets: Self::default_budgets(),
            deny_policy: DenyPolicy::default(),
            wait_timeout_secs: Self::default_wait_timeout_secs(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "HistoryConfig::default_period")]
    pub period: String,
    #[serde(default = "HistoryConfig::default_interval")]
    pub interval: String,
}

impl HistoryConfig {
    fn default_period() -> String {
        "1y".to_string()
    }
    fn default_interval() -> String {
        "1d".to_string()
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            period: Self::default_period(),
            interval: Self::default_interval(),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    #[serde(default = "LlmConfig::default_model")]
    pub model: String,
}

impl LlmConfig {
    fn default_model() -> String {
        "gpt-4o-mini".to_string()
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct MarketDataConfig {
    pub api_key: Option<String>,
    pub secret_key: Option<String>,
    #[serde(default = "MarketDataConfig::default_base_url")]
    pub base_url: String,
}

impl MarketDataConfig {
    fn default_base_url() -> String {
        "https://data.alpaca.markets".to_string()
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct InstrumentConfig {
    pub ticker: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "InstrumentConfig::default_market")]
    pub market: Market,
}

impl InstrumentConfig {
    fn default_market() -> Market {
        Market::Equity
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub instruments: Vec<InstrumentConfig>,

    #[serde(default = "default_update_interval_secs")]
    pub update_interval_secs: u64,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    #[serde(default = "default_instrument_timeout_secs")]
    pub instrument_timeout_secs: u64,
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub cache_ttl: CacheTtlConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub market_data: MarketDataConfig,
}

impl AppConfig {
    pub fn load(path: &str) -> Result<Self, AgentError> {
        let content = fs::read_to_string(path)
            .map_err(|e| AgentError::Configuration(format!("failed to read {path}: {e}")))?;

        // Strip BOM if present
        let content = content.strip_prefix('\u{feff}').unwrap_or(&content);

        let mut config: AppConfig = serde_yaml::from_str(content)
            .map_err(|e| AgentError::Configuration(format!("failed to parse {path}: {e}")))?;

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self, AgentError> {
        let mut config: AppConfig = serde_yaml::from_str(content)
            .map_err(|e| AgentError::Configuration(format!("failed to parse config: {e}")))?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// API keys come from the environment when not set in the file, so the
    /// config file can be committed without secrets.
    fn apply_env_overrides(&mut self) {
        if self.llm.api_key.is_none() {
            self.llm.api_key = std::env::var("OPENAI_API_KEY").ok();
        }
        if let Ok(url) = std::env::var("OPENAI_BASE_URL") {
            self.llm.base_url = Some(url);
        }
        if self.market_data.api_key.is_none() {
            self.market_data.api_key = std::env::var("APCA_API_KEY_ID").ok();
        }
        if self.market_data.secret_key.is_none() {
            self.market_data.secret_key = std::env::var("APCA_API_SECRET_KEY").ok();
        }
    }

    pub fn validate(&self) -> Result<(), AgentError> {
        if self.instruments.is_empty() {
            return Err(AgentError::Configuration(
                "watch set is empty: at least one instrument is required".into(),
            ));
        }
        if self.update_interval_secs == 0 {
            return Err(AgentError::Configuration(
                "update_interval_secs must be >= 1".into(),
            ));
        }
        if self.max_concurrency == 0 {
            return Err(AgentError::Configuration(
                "max_concurrency must be >= 1".into(),
            ));
        }
        if !(0.0..=100.0).contains(&self.confidence_threshold) {
            return Err(AgentError::Configuration(
                "confidence_threshold must be within 0..=100".into(),
            ));
        }
        if self.risk.stop_loss_pct <= 0.0 {
            return Err(AgentError::Configuration(
                "risk.stop_loss_pct must be positive".into(),
            ));
        }
        if self.risk.take_profit_1_pct <= 0.0
            || self.risk.take_profit_2_pct <= self.risk.take_profit_1_pct
        {
            return Err(AgentError::Configuration(
                "take-profit percentages must be positive with tp2 > tp1".into(),
            ));
        }
        if self.risk.volatility_lookback < 2 {
            return Err(AgentError::Configuration(
                "risk.volatility_lookback must be >= 2".into(),
            ));
        }
        for (provider, budget) in &self.rate_limit.budgets {
            if budget.capacity == 0 || budget.refill_per_sec <= 0.0 {
                return Err(AgentError::Configuration(format!(
                    "rate budget for {provider} must have capacity >= 1 and a positive refill rate"
                )));
            }
        }
        Ok(())
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_secs)
    }

    pub fn instrument_timeout(&self) -> Duration {
        Duration::from_secs(self.instrument_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    /// Materialize the watch set, falling back to the ticker as display name.
    pub fn watch_set(&self) -> Vec<Instrument> {
        self.instruments
            .iter()
            .map(|ic| {
                Instrument::new(
                    ic.ticker.clone(),
                    ic.name.clone().unwrap_or_else(|| ic.ticker.clone()),
                    ic.market,
                )
            })
            .collect()
    }
}
