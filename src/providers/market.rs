//! Alpaca Market Data client.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::Client;
use serde::Deserialize;

use async_trait::async_trait;

use crate::config::MarketDataConfig;
use crate::error::AgentError;
use crate::model::{Bar, HistoricalSeries, MarketSnapshot};
use crate::providers::MarketDataProvider;

#[derive(Clone)]
pub struct AlpacaMarketData {
    client: Client,
    base_url: String,
    api_key: String,
    secret_key: String,
}

#[derive(Deserialize, Debug)]
struct AlpacaBar {
    #[serde(rename = "t")]
    timestamp: DateTime<Utc>,
    #[serde(rename = "o")]
    open: f64,
    #[serde(rename = "h")]
    high: f64,
    #[serde(rename = "l")]
    low: f64,
    #[serde(rename = "c")]
    close: f64,
    #[serde(rename = "v")]
    volume: u64,
}

#[derive(Deserialize, Debug)]
struct AlpacaBarsResponse {
    #[serde(default)]
    bars: Vec<AlpacaBar>,
}

#[derive(Deserialize, Debug)]
struct AlpacaTrade {
    #[serde(rename = "p")]
    price: f64,
}

#[derive(Deserialize, Debug)]
struct AlpacaSnapshot {
    #[serde(rename = "latestTrade")]
    latest_trade: Option<AlpacaTrade>,
    #[serde(rename = "dailyBar")]
    daily_bar: Option<AlpacaBar>,
    #[serde(rename = "prevDailyBar")]
    prev_daily_bar: Option<AlpacaBar>,
}

impl AlpacaMarketData {
    pub fn new(config: &MarketDataConfig) -> Result<Self, AgentError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| AgentError::Configuration("market_data.api_key not set".into()))?;
        let secret_key = config
            .secret_key
            .clone()
            .ok_or_else(|| AgentError::Configuration("market_data.secret_key not set".into()))?;

        Ok(Self {
            client: Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            secret_key,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        ticker: &str,
        url: &str,
    ) -> Result<T, AgentError> {
        let resp = self
            .client
            .get(url)
            .header("APCA-API-KEY-ID", &self.api_key)
            .header("APCA-API-SECRET-KEY", &self.secret_key)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AgentError::data_unavailable(
                ticker,
                format!("HTTP {status}: {body}"),
            ));
        }
        Ok(resp.json::<T>().await?)
    }
}

#[async_trait]
impl MarketDataProvider for AlpacaMarketData {
    async fn fetch_snapshot(&self, ticker: &str) -> Result<MarketSnapshot, AgentError> {
        let url = format!("{}/v2/stocks/{}/snapshot", self.base_url, ticker);
        let snapshot: AlpacaSnapshot = self.get_json(ticker, &url).await?;

        let daily = snapshot
            .daily_bar
            .ok_or_else(|| AgentError::data_unavailable(ticker, "no daily bar in snapshot"))?;
        let current_price = snapshot
            .latest_trade
            .map(|t| t.price)
            .unwrap_or(daily.close);
        let previous_close = snapshot
            .prev_daily_bar
            .map(|b| b.close)
            .unwrap_or(daily.close);

        Ok(MarketSnapshot {
            ticker: ticker.to_string(),
            timestamp: Utc::now(),
            current_price,
            open: daily.open,
            high: daily.high,
            low: daily.low,
            volume: daily.volume,
            previous_close,
            change: 0.0,
            change_percent: 0.0,
        }
        .with_change())
    }

    async fn fetch_history(
        &self,
        ticker: &str,
        period: &str,
        interval: &str,
    ) -> Result<HistoricalSeries, AgentError> {
        let start = Utc::now() - period_lookback(period);
        let url = format!(
            "{}/v2/stocks/{}/bars?timeframe={}&start={}&limit=10000",
            self.base_url,
            ticker,
            interval_timeframe(interval),
            start.format("%Y-%m-%dT%H:%M:%SZ"),
        );
        let resp: AlpacaBarsResponse = self.get_json(ticker, &url).await?;

        if resp.bars.is_empty() {
            return Err(AgentError::data_unavailable(ticker, "empty bar history"));
        }

        let bars = resp
            .bars
            .into_iter()
            .map(|b| Bar {
                timestamp: b.timestamp,
                open: b.open,
                high: b.high,
                low: b.low,
                close: b.close,
                volume: b.volume,
            })
            .collect();

        Ok(HistoricalSeries {
            ticker: ticker.to_string(),
            period: period.to_string(),
            interval: interval.to_string(),
            bars,
        })
    }
}

/// Maps a period descriptor ("1y", "6mo", "5d", ...) to a lookback window.
pub(crate) fn period_lookback(period: &str) -> ChronoDuration {
    match period {
        "1d" => ChronoDuration::days(1),
        "5d" => ChronoDuration::days(5),
        "1mo" => ChronoDuration::days(30),
        "3mo" => ChronoDuration::days(90),
        "6mo" => ChronoDuration::days(182),
        "2y" => ChronoDuration::days(730),
        "5y" => ChronoDuration::days(1825),
        _ => ChronoDuration::days(365),
    }
}

/// Maps an interval descriptor to Alpaca's timeframe parameter.
pub(crate) fn interval_timeframe(interval: &str) -> &'static str {
    match interval {
        "1m" => "1Min",
        "5m" => "5Min",
        "15m" => "15Min",
        "1h" => "1Hour",
        "1wk" => "1Week",
        _ => "1Day",
    }
}
