//! Unit tests for configuration parsing and validation.

#[cfg(test)]
mod config_tests {
    use crate::config::{AppConfig, DenyPolicy};
    use crate::error::AgentError;
    use crate::model::Market;

    const MINIMAL: &str = r#"
instruments:
  - ticker: AAPL
    name: Apple Inc.
  - ticker: "EURUSD=X"
    market: forex
"#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = AppConfig::from_yaml(MINIMAL).unwrap();

        assert_eq!(config.update_interval_secs, 60);
        assert_eq!(config.max_concurrency, 10);
        assert_eq!(config.confidence_threshold, 70.0);
        assert_eq!(config.risk.stop_loss_pct, 5.0);
        assert_eq!(config.risk.take_profit_1_pct, 10.0);
        assert_eq!(config.risk.take_profit_2_pct, 20.0);
        assert_eq!(config.risk.min_risk_reward, 1.5);
        assert_eq!(config.risk.volatility_lookback, 20);
        assert_eq!(config.cache_ttl.snapshot_secs, 60);
        assert_eq!(config.cache_ttl.history_secs, 3600);
        assert_eq!(config.rate_limit.deny_policy, DenyPolicy::Defer);
        assert_eq!(config.history.period, "1y");
        assert_eq!(config.history.interval, "1d");
    }

    #[test]
    fn test_watch_set_name_and_market_fallbacks() {
        let config = AppConfig::from_yaml(MINIMAL).unwrap();
        let watch_set = config.watch_set();

        assert_eq!(watch_set.len(), 2);
        assert_eq!(watch_set[0].name, "Apple Inc.");
        assert_eq!(watch_set[0].market, Market::Equity);
        // Name falls back to the ticker when unset.
        assert_eq!(watch_set[1].name, "EURUSD=X");
        assert_eq!(watch_set[1].market, Market::Forex);
    }

    #[test]
    fn test_overrides_are_parsed() {
        let yaml = r#"
instruments:
  - ticker: BTC-USD
    market: crypto
update_interval_secs: 300
max_concurrency: 4
confidence_threshold: 60
risk:
  stop_loss_pct: 3.0
  take_profit_1_pct: 6.0
  take_profit_2_pct: 12.0
  volatility_lookback: 30
rate_limit:
  deny_policy: wait
  wait_timeout_secs: 5
  budgets:
    market_data:
      capacity: 20
      refill_per_sec: 2.0
"#;
        let config = AppConfig::from_yaml(yaml).unwrap();

        assert_eq!(config.update_interval_secs, 300);
        assert_eq!(config.max_concurrency, 4);
        assert_eq!(config.risk.stop_loss_pct, 3.0);
        assert_eq!(config.risk.volatility_lookback, 30);
        assert_eq!(config.rate_limit.deny_policy, DenyPolicy::Wait);
        assert_eq!(config.rate_limit.wait_timeout_secs, 5);
        let budget = &config.rate_limit.budgets["market_data"];
        assert_eq!(budget.capacity, 20);
        assert_eq!(budget.refill_per_sec, 2.0);
    }

    #[test]
    fn test_empty_watch_set_is_rejected() {
        let err = AppConfig::from_yaml("instruments: []\n").unwrap_err();
        assert!(matches!(err, AgentError::Configuration(_)));
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        let yaml = format!("{MINIMAL}update_interval_secs: 0\n");
        assert!(AppConfig::from_yaml(&yaml).is_err());
    }

    #[test]
    fn test_out_of_range_confidence_threshold_is_rejected() {
        let yaml = format!("{MINIMAL}confidence_threshold: 140\n");
        assert!(AppConfig::from_yaml(&yaml).is_err());
    }

    #[test]
    fn test_inverted_take_profit_tiers_are_rejected() {
        let yaml = format!(
            "{MINIMAL}risk:\n  take_profit_1_pct: 20.0\n  take_profit_2_pct: 10.0\n"
        );
        assert!(AppConfig::from_yaml(&yaml).is_err());
    }

    #[test]
    fn test_zero_capacity_budget_is_rejected() {
        let yaml = format!(
            "{MINIMAL}rate_limit:\n  budgets:\n    market_data:\n      capacity: 0\n      refill_per_sec: 1.0\n"
        );
        assert!(AppConfig::from_yaml(&yaml).is_err());
    }

    #[test]
    fn test_unparseable_yaml_is_a_configuration_error() {
        let err = AppConfig::from_yaml("instruments: [").unwrap_err();
        assert!(matches!(err, AgentError::Configuration(_)));
    }
}
