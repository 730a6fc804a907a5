//! Tests for core types

#[cfg(test)]
mod tests {
    use super::super::types::*;

    fn sample_finding() -> Finding {
        Finding {
            primary_signal: PrimarySignal::new(Indicator::OpenInterest, "Sudden Change Alert")
                .with_field("value", "$1,050,000")
                .with_field("change_1_period", "+5.00%")
                .with_field("price", "100.40"),
            market_context: MarketContext {
                recent_klines: vec![KlineSummary {
                    open: 100.0,
                    high: 101.0,
                    low: 99.5,
                    close: 100.4,
                    volume: 1234.0,
                }],
                key_indicators: KeyIndicators {
                    oi: "$1,050,000".into(),
                    price: "100.40".into(),
                    volume: "1,234".into(),
                    cvd: "-56".into(),
                    long_short_ratio: "1.502".into(),
                },
                technical_indicators: TechnicalIndicators {
                    rsi_14: "55.10".into(),
                    ema_12: "100.21".into(),
                    ema_26: "100.05".into(),
                },
            },
        }
    }

    #[test]
    fn test_indicator_display() {
        assert_eq!(Indicator::Volume.to_string(), "Volume");
        assert_eq!(Indicator::OpenInterest.to_string(), "Open Interest");
        assert_eq!(Indicator::LongShortRatio.to_string(), "Long/Short Ratio");
    }

    #[test]
    fn test_indicator_serialization() {
        assert_eq!(serde_json::to_string(&Indicator::OpenInterest).unwrap(), "\"OpenInterest\"");
        let parsed: Indicator = serde_json::from_str("\"LongShortRatio\"").unwrap();
        assert_eq!(parsed, Indicator::LongShortRatio);
    }

    #[test]
    fn test_signal_fields() {
        let signal = PrimarySignal::new(Indicator::Volume, "Spike Alert").with_field("z_score", "2.50");
        assert_eq!(signal.field("z_score"), Some("2.50"));
        assert_eq!(signal.field("missing"), None);

        // Later values replace earlier ones
        let signal = signal.with_field("z_score", "3.00");
        assert_eq!(signal.field("z_score"), Some("3.00"));
        assert_eq!(signal.fields.len(), 1);
    }

    #[test]
    fn test_finding_accessors() {
        let finding = sample_finding();
        assert_eq!(finding.indicator(), Indicator::OpenInterest);
        assert_eq!(finding.signal_type(), "Sudden Change Alert");
        assert_eq!(finding.field("change_1_period"), Some("+5.00%"));
    }

    #[test]
    fn test_finding_json_shape() {
        let value = serde_json::to_value(sample_finding()).unwrap();
        assert_eq!(value["primary_signal"]["indicator"], "OpenInterest");
        assert_eq!(value["primary_signal"]["fields"]["price"], "100.40");
        assert_eq!(value["market_context"]["key_indicators"]["long_short_ratio"], "1.502");
        assert_eq!(value["market_context"]["technical_indicators"]["rsi_14"], "55.10");
        assert_eq!(value["market_context"]["recent_klines"][0]["close"], 100.4);

        let back: Finding = serde_json::from_value(value).unwrap();
        assert_eq!(back, sample_finding());
    }
}
