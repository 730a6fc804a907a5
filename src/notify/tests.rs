//! Unit tests for notification formatting and fan-out

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::config::{GotifyConfig, TelegramConfig, ThresholdConfig};
    use crate::detector::{OpenInterestDetector, SignalDetector};
    use crate::interpret::TemplateInterpreter;
    use crate::testing::{RecordingChannel, TableBuilder};

    fn oi_finding() -> Finding {
        let mut oi = vec![1_000_000.0; 96];
        oi[95] = 850_000.0;
        let table = TableBuilder::new(96).open_interest(oi).build("ETHUSDT");
        OpenInterestDetector::from_config(&ThresholdConfig::default())
            .check(&table)
            .unwrap()
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("change_24h"), "Change 24H");
        assert_eq!(title_case("change_1_period"), "Change 1 Period");
        assert_eq!(title_case("z_score"), "Z Score");
        assert_eq!(title_case("value"), "Value");
    }

    #[test]
    fn test_format_interpretation_sections() {
        let text = "intro text 【Signal】 volume spike \n【Empty】   【Trend】\nrising";
        assert_eq!(
            format_interpretation(text),
            "【Signal】\nvolume spike\n\n【Trend】\nrising"
        );
    }

    #[test]
    fn test_format_interpretation_plain_text() {
        assert_eq!(format_interpretation("  just prose \n"), "just prose");
    }

    #[test]
    fn test_format_alert() {
        let finding = oi_finding();
        let (title, body) = format_alert("ETHUSDT", &finding, "【Signal】\nOI dropped");

        assert_eq!(title, "ETHUSDT Market Anomaly Alert");
        assert!(body.contains("**Indicator:** Open Interest"));
        assert!(body.contains("**Signal Type:** 24H Change Alert"));
        assert!(body.contains("**Change 24H:** `-15.00%`"));
        assert!(body.contains(" | "));
        assert!(body.ends_with("【Signal】\nOI dropped"));
    }

    /// Count of each legacy-Markdown entity character not preceded by `\`
    fn unescaped(text: &str) -> [usize; 3] {
        let mut counts = [0; 3];
        let mut chars = text.chars();
        while let Some(c) = chars.next() {
            match c {
                '\\' => {
                    chars.next();
                }
                '*' => counts[0] += 1,
                '_' => counts[1] += 1,
                '`' => counts[2] += 1,
                _ => {}
            }
        }
        counts
    }

    fn assert_balanced(text: &str) {
        let counts = unescaped(text);
        assert!(counts.iter().all(|n| n % 2 == 0), "unbalanced entities {:?} in {:?}", counts, text);
    }

    #[test]
    fn test_telegram_text_from_template_is_balanced() {
        let finding = oi_finding();
        let interpretation = TemplateInterpreter::render("ETHUSDT", "15m", &finding, Some(&finding));
        let (title, body) = format_alert("ETHUSDT", &finding, &interpretation);
        let text = telegram_markdown(&title, &body);

        assert!(text.starts_with("*ETHUSDT Market Anomaly Alert*\n\n"));
        assert!(text.contains("Change 24H: `-15.00%`"));
        assert!(!text.contains("**"));
        assert_balanced(&text);
    }

    #[test]
    fn test_telegram_text_escapes_free_text() {
        let text = telegram_markdown("BTC_USDT", "funding_rate looks odd, a*b [see] `oi` and a stray `");
        assert_eq!(
            text,
            "*BTC\\_USDT*\n\nfunding\\_rate looks odd, a\\*b \\[see] \\`oi\\` and a stray \\`"
        );
        assert_balanced(&text);

        let paired = telegram_markdown("t", "value `snake_case` here");
        assert!(paired.ends_with("value `snake_case` here"));
    }

    #[tokio::test]
    async fn test_send_reaches_all_channels() {
        let a = RecordingChannel::new("a");
        let b = RecordingChannel::new("b");
        let (log_a, log_b) = (a.log(), b.log());
        let notifier = Notifier::new(vec![Box::new(a), Box::new(b)], Duration::ZERO);

        let report = notifier.send("title", "body").await;
        assert_eq!(report, DeliveryReport { delivered: 2, failed: 0 });
        assert_eq!(log_a.lock()[0], ("title".to_string(), "body".to_string()));
        assert_eq!(log_b.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_failing_channel_does_not_block_others() {
        let bad = RecordingChannel::failing("bad");
        let good = RecordingChannel::new("good");
        let log_good = good.log();
        let notifier = Notifier::new(vec![Box::new(bad), Box::new(good)], Duration::ZERO);

        let report = notifier.send("title", "body").await;
        assert_eq!(report, DeliveryReport { delivered: 1, failed: 1 });
        assert_eq!(log_good.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_between_channels() {
        let notifier = Notifier::new(
            vec![
                Box::new(RecordingChannel::new("a")),
                Box::new(RecordingChannel::new("b")),
                Box::new(RecordingChannel::new("c")),
            ],
            Duration::from_millis(1000),
        );

        let start = tokio::time::Instant::now();
        notifier.send("title", "body").await;
        assert!(start.elapsed() >= Duration::from_millis(2000));
    }

    #[tokio::test]
    async fn test_disabled_notifier() {
        let notifier = Notifier::disabled();
        assert!(notifier.is_empty());
        assert_eq!(notifier.send_test().await, DeliveryReport::default());
    }

    #[test]
    fn test_from_config_builds_channels() {
        let config = NotifyConfig {
            webhook_urls: vec!["https://notify.example/a".into(), "  ".into()],
            gotify: Some(GotifyConfig {
                url: "https://gotify.example/".into(),
                token: "tok".into(),
            }),
            telegram: Some(TelegramConfig {
                bot_token: "123:abc".into(),
                chat_id: "42".into(),
            }),
            send_delay_ms: 0,
        };
        let notifier = Notifier::from_config(&config).unwrap();
        assert_eq!(notifier.channel_names(), vec!["webhook", "gotify", "telegram"]);
    }

    #[test]
    fn test_gotify_endpoint() {
        let channel = GotifyChannel::new(Client::new(), "https://gotify.example/", "tok");
        assert_eq!(channel.endpoint(), "https://gotify.example/message?token=tok");
    }
}
