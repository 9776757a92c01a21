//! LLM-backed analysis provider.
//!
//! Technical and sentiment judgments, and final recommendation synthesis,
//! are delegated to an OpenAI-compatible chat model. Responses must follow a
//! JSON schema contract; anything missing the required fields is rejected as
//! `MalformedProviderResponse`.

use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::config::LlmConfig;
use crate::error::AgentError;
use crate::model::{
    HistoricalSeries, SentimentReport, Signal, TechnicalLevels, TechnicalReport,
};
use crate::providers::{AnalysisProvider, RecommendationDraft, SynthesisInput};

/// How many trailing bars are rendered into the technical-analysis prompt.
const PROMPT_BAR_WINDOW: usize = 60;

#[derive(Clone)]
pub struct LlmClient {
    client: Client<OpenAIConfig>,
    model: String,
}

impl LlmClient {
    pub fn new(api_key: String, base_url: Option<String>, model: String) -> Self {
        let mut config = OpenAIConfig::new().with_api_key(api_key);
        if let Some(url) = base_url {
            config = config.with_api_base(url);
        }
        Self {
            client: Client::with_config(config),
            model,
        }
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, AgentError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| AgentError::Configuration("llm.api_key not set".into()))?;
        Ok(Self::new(
            api_key,
            config.base_url.clone(),
            config.model.clone(),
        ))
    }

    pub async fn chat(&self, system_prompt: &str, user_input: &str) -> Result<String, AgentError> {
        debug!("Sending request to LLM (model: {})", self.model);

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages([
                ChatCompletionRequestMessage::System(
                    ChatCompletionRequestSystemMessageArgs::default()
                        .content(system_prompt)
                        .build()?,
                ),
                ChatCompletionRequestMessage::User(
                    ChatCompletionRequestUserMessageArgs::default()
                        .content(user_input)
                        .build()?,
                ),
            ])
            .build()?;

        let response = self.client.chat().create(request).await?;
        let content = response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();

        debug!("LLM response received ({} bytes)", content.len());
        Ok(content)
    }
}

/// Pulls a JSON object out of a chat response, tolerating markdown fences
/// and surrounding prose.
pub fn extract_json(text: &str) -> Result<Value, AgentError> {
    let trimmed = text.trim();
    let trimmed = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    let trimmed = trimmed.strip_suffix("```").unwrap_or(trimmed).trim();

    let candidate = match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => {
            return Err(AgentError::malformed(
                "response contains no JSON object",
            ))
        }
    };

    serde_json::from_str(candidate)
        .map_err(|e| AgentError::malformed(format!("invalid JSON in response: {e}")))
}

fn require_str(value: &Value, field: &str) -> Result<String, AgentError> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| AgentError::malformed(format!("missing required field: {field}")))
}

fn require_f64(value: &Value, field: &str) -> Result<f64, AgentError> {
    value
        .get(field)
        .and_then(Value::as_f64)
        .ok_or_else(|| AgentError::malformed(format!("missing required field: {field}")))
}

fn f64_list(value: &Value, path: &[&str]) -> Vec<f64> {
    let mut cursor = value;
    for key in path {
        match cursor.get(key) {
            Some(next) => cursor = next,
            None => return Vec::new(),
        }
    }
    cursor
        .as_array()
        .map(|arr| arr.iter().filter_map(Value::as_f64).collect())
        .unwrap_or_default()
}

pub struct LlmAnalysisProvider {
    client: LlmClient,
}

impl LlmAnalysisProvider {
    pub fn new(client: LlmClient) -> Self {
        Self { client }
    }

    fn render_bars(series: &HistoricalSeries) -> String {
        let skip = series.bars.len().saturating_sub(PROMPT_BAR_WINDOW);
        let mut table = String::from("date,open,high,low,close,volume\n");
        for bar in series.bars.iter().skip(skip) {
            table.push_str(&format!(
                "{},{:.4},{:.4},{:.4},{:.4},{}\n",
                bar.timestamp.format("%Y-%m-%d"),
                bar.open,
                bar.high,
                bar.low,
                bar.close,
                bar.volume
            ));
        }
        table
    }
}

const TECHNICAL_SYSTEM_PROMPT: &str = r#"You are an expert technical analyst.
You will receive recent OHLCV bars for one instrument as CSV.
Compute RSI(14), MACD(12/26/9), Bollinger Bands(20, 2.0), moving averages,
at least two support and two resistance levels, and the overall trend.

Output JSON only:
{
  "rsi": {"value": <float>, "signal": "overbought|neutral|oversold"},
  "macd": {"macd_line": <float>, "signal_line": <float>, "crossover": "bullish|bearish|none"},
  "support_resistance": {"support_levels": [<float>], "resistance_levels": [<float>]},
  "trend": {"direction": "uptrend|downtrend|sideways", "strength": "strong|moderate|weak"},
  "overall_signal": "bullish|bearish|neutral"
}
"#;

const SENTIMENT_SYSTEM_PROMPT: &str = r#"You are an expert financial news analyst.
Assess the current news and market sentiment for the given instrument over the
last 24 hours: earnings, product news, analyst ratings, regulatory updates.

Output JSON only:
{
  "overall_sentiment": "positive|negative|neutral",
  "sentiment_score": <float between -1.0 and 1.0>,
  "key_themes": ["<theme>"],
  "summary": "<brief explanation>"
}
"#;

const SYNTHESIS_SYSTEM_PROMPT: &str = r#"You are an expert portfolio manager.
Synthesize the provided technical analysis, news sentiment, and risk levels
into one trading recommendation.

Decision criteria:
- BUY: bullish technicals AND positive sentiment, risk/reward >= 1.5
- SELL: bearish signals, negative sentiment, or poor risk/reward
- HOLD: mixed or unclear signals

Output JSON only:
{
  "recommendation": "BUY|SELL|HOLD",
  "confidence_score": <0-100>,
  "reasoning": "<explanation combining technical, sentiment, and risk factors>",
  "key_factors": ["<factor>"],
  "timeframe": "short_term|medium_term|long_term",
  "risk_level": "low|medium|high",
  "warnings": ["<risk or concern>"]
}

Confidence must be data-driven. When signals conflict, recommend HOLD.
"#;

#[async_trait]
impl AnalysisProvider for LlmAnalysisProvider {
    async fn analyze_technical(
        &self,
        ticker: &str,
        series: &HistoricalSeries,
    ) -> Result<TechnicalReport, AgentError> {
        let user_input = format!(
            "Instrument: {}\nInterval: {}\n\n{}",
            ticker,
            series.interval,
            Self::render_bars(series)
        );
        let response = self.client.chat(TECHNICAL_SYSTEM_PROMPT, &user_input).await?;
        let detail = extract_json(&response)?;

        let overall_signal = require_str(&detail, "overall_signal")?;
        let levels = TechnicalLevels {
            support_levels: f64_list(&detail, &["support_resistance", "support_levels"]),
            resistance_levels: f64_list(&detail, &["support_resistance", "resistance_levels"]),
        };

        info!("[{}] technical analysis: {}", ticker, overall_signal);
        Ok(TechnicalReport {
            ticker: ticker.to_string(),
            timestamp: Utc::now(),
            overall_signal,
            levels,
            detail,
        })
    }

    async fn analyze_sentiment(
        &self,
        ticker: &str,
        name: &str,
    ) -> Result<SentimentReport, AgentError> {
        let user_input = format!("Instrument: {name} (ticker: {ticker})");
        let response = self.client.chat(SENTIMENT_SYSTEM_PROMPT, &user_input).await?;
        let detail = extract_json(&response)?;

        let overall_sentiment = require_str(&detail, "overall_sentiment")?;
        let sentiment_score = require_f64(&detail, "sentiment_score")?.clamp(-1.0, 1.0);

        info!(
            "[{}] sentiment: {} ({:.2})",
            ticker, overall_sentiment, sentiment_score
        );
        Ok(SentimentReport {
            ticker: ticker.to_string(),
            timestamp: Utc::now(),
            overall_sentiment,
            sentiment_score,
            detail,
        })
    }

    async fn synthesize(&self, input: &SynthesisInput) -> Result<RecommendationDraft, AgentError> {
        let technical = input
            .technical
            .as_ref()
            .map(|t| t.detail.clone())
            .unwrap_or(Value::Null);
        let sentiment = input
            .sentiment
            .as_ref()
            .map(|s| s.detail.clone())
            .unwrap_or(Value::Null);

        let user_input = serde_json::to_string_pretty(&json!({
            "ticker": input.ticker,
            "name": input.name,
            "current_price": input.current_price,
            "technical_analysis": technical,
            "sentiment_analysis": sentiment,
            "degraded_inputs": input.degraded,
            "risk_management": {
                "stop_loss": input.risk.stop_loss,
                "take_profit_1": input.risk.take_profit_1,
                "take_profit_2": input.risk.take_profit_2,
                "risk_reward_ratio_1": input.risk.risk_reward_ratio_1,
                "risk_reward_ratio_2": input.risk.risk_reward_ratio_2,
                "meets_min_risk_reward": input.risk.valid,
                "volatility": input.risk.volatility,
            },
        }))?;

        let response = self.client.chat(SYNTHESIS_SYSTEM_PROMPT, &user_input).await?;
        let detail = extract_json(&response)?;

        let raw_signal = require_str(&detail, "recommendation")?;
        let signal = Signal::parse(&raw_signal)
            .ok_or_else(|| AgentError::malformed(format!("invalid recommendation: {raw_signal}")))?;
        let confidence = require_f64(&detail, "confidence_score")?.clamp(0.0, 100.0);
        let reasoning = require_str(&detail, "reasoning")?;
        let key_factors = detail
            .get("key_factors")
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(RecommendationDraft {
            signal,
            confidence,
            reasoning,
            key_factors,
            extras: detail,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_json_plain_object() {
        let value = extract_json(r#"{"overall_signal": "bullish"}"#).unwrap();
        assert_eq!(value["overall_signal"], "bullish");
    }

    #[test]
    fn test_extract_json_strips_markdown_fence() {
        let text = "```json\n{\"sentiment_score\": 0.4}\n```";
        let value = extract_json(text).unwrap();
        assert_eq!(value["sentiment_score"], 0.4);
    }

    #[test]
    fn test_extract_json_tolerates_surrounding_prose() {
        let text = "Here is my analysis:\n{\"recommendation\": \"BUY\"}\nHope that helps!";
        let value = extract_json(text).unwrap();
        assert_eq!(value["recommendation"], "BUY");
    }

    #[test]
    fn test_extract_json_rejects_plain_prose() {
        let err = extract_json("I could not analyze this ticker.").unwrap_err();
        assert!(matches!(err, AgentError::MalformedProviderResponse { .. }));
    }

    #[test]
    fn test_extract_json_rejects_truncated_object() {
        let err = extract_json(r#"{"recommendation": "BUY", "confidence_scor"#).unwrap_err();
        assert!(matches!(err, AgentError::MalformedProviderResponse { .. }));
    }

    #[test]
    fn test_f64_list_walks_nested_path() {
        let value = json!({"support_resistance": {"support_levels": [168.0, "n/a", 165.5]}});
        let levels = f64_list(&value, &["support_resistance", "support_levels"]);
        assert_eq!(levels, vec![168.0, 165.5]);
        assert!(f64_list(&value, &["support_resistance", "missing"]).is_empty());
    }

    #[test]
    fn test_require_fields() {
        let value = json!({"recommendation": "BUY", "confidence_score": 82});
        assert_eq!(require_str(&value, "recommendation").unwrap(), "BUY");
        assert_eq!(require_f64(&value, "confidence_score").unwrap(), 82.0);
        assert!(require_str(&value, "reasoning").is_err());
    }
}
