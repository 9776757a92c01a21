//! Console rendering of recommendations and cycle summaries.

use tracing::info;

use crate::model::{CycleSummary, Recommendation, Signal};

/// Pretty-prints a single recommendation to stdout.
pub fn print_recommendation(rec: &Recommendation) {
    println!("\n{}", "=".repeat(80));
    println!("TRADING RECOMMENDATION - {}", rec.ticker);
    println!("{}", "=".repeat(80));

    println!("\nCurrent Price: ${:.2}", rec.current_price);
    println!("Timestamp:     {}", rec.timestamp.to_rfc3339());
    println!("\nRECOMMENDATION: {}", rec.signal);
    println!("Confidence:     {:.0}%", rec.confidence);
    if rec.degraded {
        println!("(degraded: synthesized from partial analysis inputs)");
    }

    println!("\nReasoning:\n{}", rec.reasoning);

    if !rec.key_factors.is_empty() {
        println!("\nKey Factors:");
        for (i, factor) in rec.key_factors.iter().enumerate() {
            println!("  {}. {}", i + 1, factor);
        }
    }

    println!("\nRisk Management:");
    println!(
        "  Stop Loss:     ${:.2} ({:+.2}%)",
        rec.risk.stop_loss, rec.risk.stop_loss_percent
    );
    println!(
        "  Take Profit 1: ${:.2} ({:+.2}%)",
        rec.risk.take_profit_1, rec.risk.take_profit_1_percent
    );
    println!(
        "  Take Profit 2: ${:.2} ({:+.2}%)",
        rec.risk.take_profit_2, rec.risk.take_profit_2_percent
    );
    println!("  Risk/Reward:   {:.2}", rec.risk.risk_reward_ratio_1);
    if rec.risk.low_confidence {
        println!("  (low confidence: defaults used, history shorter than lookback)");
    }

    if let (Some(sentiment), Some(score)) = (&rec.sentiment, rec.sentiment_score) {
        println!("\nSentiment: {} ({:+.2})", sentiment.to_uppercase(), score);
    }

    println!("\n{}", "-".repeat(80));
    println!("DISCLAIMER: AI-generated analysis, not professional financial advice.");
    println!("{}\n", "=".repeat(80));
}

/// Renders the end-of-cycle summary as a printable block.
pub fn render_summary(summary: &CycleSummary) -> String {
    let mut out = String::new();
    out.push_str(&format!("\n{}\n", "=".repeat(80)));
    out.push_str(&format!("CYCLE #{} SUMMARY\n", summary.cycle));
    if let Some(started) = summary.started_at {
        out.push_str(&format!("Started: {}\n", started.to_rfc3339()));
    }
    out.push_str(&format!("{}\n", "=".repeat(80)));

    out.push_str(&format!(
        "Persisted: {}   Skipped: {}\n",
        summary.persisted_count(),
        summary.skipped_count()
    ));
    out.push_str(&format!(
        "BUY: {}   SELL: {}   HOLD: {}\n",
        summary.count_signal(Signal::Buy),
        summary.count_signal(Signal::Sell),
        summary.count_signal(Signal::Hold)
    ));

    for signal in [Signal::Buy, Signal::Sell, Signal::Hold] {
        let mut group: Vec<&Recommendation> = summary
            .persisted
            .iter()
            .filter(|r| r.signal == signal)
            .collect();
        if group.is_empty() {
            continue;
        }
        group.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        out.push_str(&format!("\n{signal} recommendations:\n"));
        for rec in group {
            out.push_str(&format!(
                "  {}: ${:.2} (confidence {:.0}%{})\n",
                rec.ticker,
                rec.current_price,
                rec.confidence,
                if rec.degraded { ", degraded" } else { "" }
            ));
        }
    }

    if !summary.skipped.is_empty() {
        out.push_str("\nSkipped instruments:\n");
        for (ticker, reason, detail) in &summary.skipped {
            out.push_str(&format!("  {ticker}: {reason} ({detail})\n"));
        }
    }

    out.push_str(&format!("{}\n", "=".repeat(80)));
    out
}

pub fn log_cycle_summary(summary: &CycleSummary) {
    info!(
        "Cycle #{} complete: {} persisted, {} skipped",
        summary.cycle,
        summary.persisted_count(),
        summary.skipped_count()
    );
    println!("{}", render_summary(summary));
}
