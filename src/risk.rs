//! Deterministic stop-loss / take-profit derivation.
//!
//! Everything here is a pure function of its inputs: no I/O, no provider
//! calls. The pipeline invokes `compute` once per instrument per cycle on
//! already-fetched data.

use chrono::Utc;

use crate::config::RiskConfig;
use crate::error::AgentError;
use crate::model::{HistoricalSeries, RiskLevels, TechnicalLevels};

/// Floor below which a stop distance counts as degenerate.
const PRICE_EPSILON: f64 = 1e-9;

/// Sample standard deviation of close-to-close returns over the last
/// `lookback` returns. None when the series is too short.
pub fn return_volatility(closes: &[f64], lookback: usize) -> Option<f64> {
    if closes.len() < lookback + 1 {
        return None;
    }
    let returns: Vec<f64> = closes
        .windows(2)
        .filter(|w| w[0] != 0.0)
        .map(|w| (w[1] - w[0]) / w[0])
        .collect();
    if returns.len() < lookback || lookback < 2 {
        return None;
    }
    let tail = &returns[returns.len() - lookback..];
    let mean = tail.iter().sum::<f64>() / tail.len() as f64;
    let var = tail.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (tail.len() - 1) as f64;
    Some(var.sqrt())
}

/// Average True Range over the last `period` bars. Falls back to the mean
/// high-low range when there are not enough bars for true-range pairs.
pub fn average_true_range(series: &HistoricalSeries, period: usize) -> f64 {
    if period == 0 || series.bars.is_empty() {
        return 0.0;
    }
    if series.bars.len() >= period + 1 {
        let mut true_ranges = Vec::with_capacity(series.bars.len() - 1);
        for pair in series.bars.windows(2) {
            let prev_close = pair[0].close;
            let bar = &pair[1];
            let tr = (bar.high - bar.low)
                .max((bar.high - prev_close).abs())
                .max((bar.low - prev_close).abs());
            true_ranges.push(tr);
        }
        let tail = &true_ranges[true_ranges.len() - period..];
        return tail.iter().sum::<f64>() / tail.len() as f64;
    }
    let take = series.bars.len().min(period);
    let tail = &series.bars[series.bars.len() - take..];
    tail.iter().map(|b| b.high - b.low).sum::<f64>() / tail.len() as f64
}

/// Compute stop-loss, two take-profit tiers, and risk-reward ratios.
///
/// A series shorter than the lookback window falls back to the configured
/// percentage defaults and flags the result low-confidence instead of
/// failing. A non-positive price or a zero-distance stop is an error.
pub fn compute(
    ticker: &str,
    current_price: f64,
    series: &HistoricalSeries,
    technical: Option<&TechnicalLevels>,
    config: &RiskConfig,
) -> Result<RiskLevels, AgentError> {
    if !current_price.is_finite() || current_price <= 0.0 {
        return Err(AgentError::InvalidPriceInput {
            ticker: ticker.to_string(),
            price: current_price,
        });
    }

    let closes = series.closes();
    let volatility = return_volatility(&closes, config.volatility_lookback);
    let low_confidence = volatility.is_none();
    let volatility = volatility.unwrap_or(0.0);
    let atr = average_true_range(series, config.atr_period);

    let min_stop_pct = config.stop_loss_pct / 100.0;
    let vol_stop_pct = volatility * config.volatility_multiplier;
    let stop_pct = vol_stop_pct.max(min_stop_pct);

    let mut stop_loss = current_price * (1.0 - stop_pct);

    // Nearer-wins: a support level between the volatility stop and the price
    // gives a smaller loss magnitude, so it takes precedence.
    if let Some(support) = nearest_support_below(technical, current_price) {
        if support > stop_loss {
            stop_loss = support;
        }
    }

    let mut take_profit_1 = current_price * (1.0 + config.take_profit_1_pct / 100.0);
    let mut take_profit_2 = current_price * (1.0 + config.take_profit_2_pct / 100.0);

    if let Some(resistance) = nearest_resistance_above(technical, current_price) {
        if resistance < take_profit_1 {
            take_profit_1 = resistance;
        }
    }
    if let Some(resistance) = nearest_resistance_above(technical, take_profit_1) {
        if resistance < take_profit_2 {
            take_profit_2 = resistance;
        }
    }
    // Keep the tier ordering; a clamp that inverts it is discarded.
    if take_profit_2 <= take_profit_1 {
        take_profit_2 = current_price * (1.0 + config.take_profit_2_pct / 100.0);
    }

    let risk = current_price - stop_loss;
    if risk.abs() < PRICE_EPSILON {
        return Err(AgentError::DegenerateRiskInput {
            ticker: ticker.to_string(),
            reason: "stop-loss equals current price (zero-volatility input)".to_string(),
        });
    }

    let risk_reward_ratio_1 = (take_profit_1 - current_price) / risk;
    let risk_reward_ratio_2 = (take_profit_2 - current_price) / risk;
    let valid = risk_reward_ratio_1 >= config.min_risk_reward;

    Ok(RiskLevels {
        ticker: ticker.to_string(),
        current_price,
        stop_loss,
        take_profit_1,
        take_profit_2,
        stop_loss_percent: (stop_loss - current_price) / current_price * 100.0,
        take_profit_1_percent: (take_profit_1 - current_price) / current_price * 100.0,
        take_profit_2_percent: (take_profit_2 - current_price) / current_price * 100.0,
        risk_reward_ratio_1,
        risk_reward_ratio_2,
        valid,
        low_confidence,
        volatility,
        atr,
        timestamp: Utc::now(),
    })
}

fn nearest_support_below(technical: Option<&TechnicalLevels>, price: f64) -> Option<f64> {
    technical?
        .support_levels
        .iter()
        .copied()
        .filter(|s| s.is_finite() && *s > 0.0 && *s < price)
        .fold(None, |best: Option<f64>, s| match best {
            Some(b) if b >= s => Some(b),
            _ => Some(s),
        })
}

fn nearest_resistance_above(technical: Option<&TechnicalLevels>, price: f64) -> Option<f64> {
    technical?
        .resistance_levels
        .iter()
        .copied()
        .filter(|r| r.is_finite() && *r > price)
        .fold(None, |best: Option<f64>, r| match best {
            Some(b) if b <= r => Some(b),
            _ => Some(r),
        })
}
