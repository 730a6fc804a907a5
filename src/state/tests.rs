//! Unit tests for the alert state manager

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::config::StateConfig;
    use crate::types::{KeyIndicators, MarketContext, TechnicalIndicators};
    use chrono::TimeZone;
    use std::sync::Arc;

    fn manager(cooldown_minutes: i64) -> AlertStateManager {
        AlertStateManager::new(&StateConfig {
            cooldown_minutes,
            z_score_change: 0.5,
            percentage_change: 0.05,
        })
    }

    fn t0() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    fn empty_context() -> MarketContext {
        MarketContext {
            recent_klines: vec![],
            key_indicators: KeyIndicators {
                oi: "$0".into(),
                price: "0.00".into(),
                volume: "0".into(),
                cvd: "0".into(),
                long_short_ratio: "0.000".into(),
            },
            technical_indicators: TechnicalIndicators {
                rsi_14: "N/A".into(),
                ema_12: "N/A".into(),
                ema_26: "N/A".into(),
            },
        }
    }

    fn volume_finding(z: &str) -> Finding {
        Finding {
            primary_signal: PrimarySignal::new(Indicator::Volume, "Spike Alert")
                .with_field("value", "12,345")
                .with_field("z_score", z),
            market_context: empty_context(),
        }
    }

    fn oi_finding(change: &str) -> Finding {
        Finding {
            primary_signal: PrimarySignal::new(Indicator::OpenInterest, "24H Change Alert")
                .with_field("value", "$1,000,000")
                .with_field("change_24h", change)
                .with_field("price", "100.00"),
            market_context: empty_context(),
        }
    }

    #[test]
    fn test_first_finding_is_allowed() {
        let state = manager(60);
        let decision = state.decide_at("BTCUSDT", &volume_finding("2.50"), t0());
        assert!(decision.allow);
        assert!(decision.previous.is_none());
        assert_eq!(decision.reason, DecisionReason::FirstSeen);
        assert_eq!(state.len(), 1);
    }

    #[test]
    fn test_identical_repeat_in_cooldown_is_suppressed() {
        let state = manager(60);
        let finding = volume_finding("2.50");
        state.decide_at("BTCUSDT", &finding, t0());

        let decision = state.decide_at("BTCUSDT", &finding, t0() + Duration::minutes(5));
        assert!(!decision.allow);
        assert_eq!(decision.reason, DecisionReason::Suppressed);
        assert_eq!(decision.previous, Some(finding));
    }

    #[test]
    fn test_z_score_jump_in_cooldown_is_allowed() {
        let state = manager(60);
        let first = volume_finding("2.50");
        state.decide_at("BTCUSDT", &first, t0());

        let second = volume_finding("3.10");
        let decision = state.decide_at("BTCUSDT", &second, t0() + Duration::minutes(5));
        assert!(decision.allow);
        assert_eq!(decision.reason, DecisionReason::SignificantChange);
        assert_eq!(decision.previous, Some(first));

        // The record now holds the second finding
        let key = AlertKey::new("BTCUSDT", &second);
        assert_eq!(state.record(&key).unwrap().finding, second);
    }

    #[test]
    fn test_z_score_change_at_threshold_is_suppressed() {
        let state = manager(60);
        state.decide_at("BTCUSDT", &volume_finding("2.50"), t0());
        let decision = state.decide_at("BTCUSDT", &volume_finding("3.00"), t0() + Duration::minutes(1));
        assert!(!decision.allow);
    }

    #[test]
    fn test_cooldown_expiry_allows_identical_finding() {
        let state = manager(60);
        let finding = volume_finding("2.50");
        state.decide_at("BTCUSDT", &finding, t0());

        let decision = state.decide_at("BTCUSDT", &finding, t0() + Duration::minutes(60));
        assert!(decision.allow);
        assert_eq!(decision.reason, DecisionReason::CooldownExpired);
        assert_eq!(decision.previous, Some(finding));
    }

    #[test]
    fn test_suppression_does_not_refresh_record() {
        let state = manager(60);
        let finding = volume_finding("2.50");
        state.decide_at("BTCUSDT", &finding, t0());
        state.decide_at("BTCUSDT", &finding, t0() + Duration::minutes(30));

        // Cooldown still counts from the first notification
        let decision = state.decide_at("BTCUSDT", &finding, t0() + Duration::minutes(61));
        assert!(decision.allow);
    }

    #[test]
    fn test_keys_are_independent() {
        let state = manager(60);
        let finding = volume_finding("2.50");
        state.decide_at("BTCUSDT", &finding, t0());

        assert!(state.decide_at("ETHUSDT", &finding, t0()).allow);
        assert!(state.decide_at("BTCUSDT", &oi_finding("+12.00%"), t0()).allow);
        assert_eq!(state.len(), 3);
    }

    #[test]
    fn test_percentage_change_in_cooldown() {
        let state = manager(60);
        state.decide_at("BTCUSDT", &oi_finding("+12.00%"), t0());

        let small = state.decide_at("BTCUSDT", &oi_finding("+15.00%"), t0() + Duration::minutes(10));
        assert!(!small.allow);

        let large = state.decide_at("BTCUSDT", &oi_finding("+18.50%"), t0() + Duration::minutes(20));
        assert!(large.allow);
        assert_eq!(large.reason, DecisionReason::SignificantChange);
    }

    #[test]
    fn test_sign_flip_counts_as_change() {
        let state = manager(60);
        state.decide_at("BTCUSDT", &oi_finding("+11.00%"), t0());
        let decision = state.decide_at("BTCUSDT", &oi_finding("-11.00%"), t0() + Duration::minutes(1));
        assert!(decision.allow);
    }

    #[test]
    fn test_unparsable_previous_is_suppressed() {
        let state = manager(60);
        state.decide_at("BTCUSDT", &volume_finding("garbage"), t0());

        let decision = state.decide_at("BTCUSDT", &volume_finding("9.99"), t0() + Duration::minutes(1));
        assert!(!decision.allow);
        assert!(decision.previous.is_some());
    }

    #[test]
    fn test_significant_change_reports_corruption() {
        let state = manager(60);
        let err = state
            .significant_change(
                &volume_finding("n/a").primary_signal,
                &volume_finding("3.00").primary_signal,
            )
            .unwrap_err();
        assert!(matches!(err, MonitorError::StateCorruption(_)));
    }

    #[test]
    fn test_finding_without_comparable_fields_is_suppressed() {
        let state = manager(60);
        let rise = Finding {
            primary_signal: PrimarySignal::new(Indicator::OpenInterest, "Continuous Rise (4 periods)")
                .with_field("value", "$1,000,000")
                .with_field("price", "100.00"),
            market_context: empty_context(),
        };
        state.decide_at("BTCUSDT", &rise, t0());

        let decision = state.decide_at("BTCUSDT", &rise, t0() + Duration::minutes(1));
        assert!(!decision.allow);
        assert!(state.significant_change(&rise.primary_signal, &rise.primary_signal).is_ok());
    }

    #[test]
    fn test_price_change_field_is_compared_as_percentage() {
        let state = manager(60);
        let with_price = |z: &str, pc: &str| Finding {
            primary_signal: volume_finding(z).primary_signal.with_field("price_change", pc),
            market_context: empty_context(),
        };
        state.decide_at("BTCUSDT", &with_price("2.50", "+0.50%"), t0());

        let decision = state.decide_at("BTCUSDT", &with_price("2.60", "+6.00%"), t0() + Duration::minutes(1));
        assert!(decision.allow);
    }

    #[test]
    fn test_prune_drops_stale_records() {
        let state = manager(60);
        state.decide_at("BTCUSDT", &volume_finding("2.50"), t0());
        state.decide_at("ETHUSDT", &volume_finding("2.50"), t0() + Duration::minutes(90));

        let removed = state.prune(t0() + Duration::minutes(121));
        assert_eq!(removed, 1);
        assert_eq!(state.len(), 1);

        // A pruned key behaves as unseen
        let decision = state.decide_at("BTCUSDT", &volume_finding("2.50"), t0() + Duration::minutes(122));
        assert_eq!(decision.reason, DecisionReason::FirstSeen);
    }

    #[test]
    fn test_oversized_cooldown_saturates() {
        let state = manager(i64::MAX);
        assert_eq!(state.cooldown(), Duration::MAX);

        let finding = volume_finding("2.50");
        assert!(state.decide_at("BTCUSDT", &finding, t0()).allow);
        let repeat = state.decide_at("BTCUSDT", &finding, t0() + Duration::days(3650));
        assert!(!repeat.allow);

        assert_eq!(state.prune(t0() + Duration::days(3650)), 0);
        assert_eq!(state.len(), 1);
    }

    #[test]
    fn test_zero_cooldown_always_allows() {
        let state = manager(0);
        let finding = volume_finding("2.50");
        assert!(state.decide_at("BTCUSDT", &finding, t0()).allow);
        assert!(state.decide_at("BTCUSDT", &finding, t0()).allow);
    }

    #[test]
    fn test_concurrent_decisions_allow_once() {
        let state = Arc::new(manager(60));
        let finding = volume_finding("2.50");

        let allowed: usize = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let state = state.clone();
                    let finding = finding.clone();
                    s.spawn(move || state.decide_at("BTCUSDT", &finding, t0()).allow)
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap() as usize).sum()
        });

        assert_eq!(allowed, 1);
    }

    #[test]
    fn test_key_display() {
        let key = AlertKey::new("DOGEUSDT", &volume_finding("2.50"));
        assert_eq!(key.to_string(), "DOGEUSDT-Volume-Spike Alert");
    }
}
