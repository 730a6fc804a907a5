//! Alert delivery
//!
//! A [`Notifier`] fans one message out to every configured channel. A failing
//! channel is logged and skipped; the others still receive the message.

#[cfg(test)]
mod tests;

use crate::config::NotifyConfig;
use crate::error::{MonitorError, Result};
use crate::types::Finding;
use crate::utils::title_case;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, error, info};

#[async_trait]
pub trait NotifyChannel: Send + Sync {
    async fn deliver(&self, title: &str, body: &str) -> Result<()>;

    fn name(&self) -> &str;
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failed: usize,
}

pub struct Notifier {
    channels: Vec<Box<dyn NotifyChannel>>,
    send_delay: Duration,
}

impl Notifier {
    pub fn new(channels: Vec<Box<dyn NotifyChannel>>, send_delay: Duration) -> Self {
        Self { channels, send_delay }
    }

    /// Notifier with no channels; alerts are only logged
    pub fn disabled() -> Self {
        Self::new(Vec::new(), Duration::ZERO)
    }

    pub fn from_config(config: &NotifyConfig) -> Result<Self> {
        let http = Client::builder().timeout(Duration::from_secs(15)).build()?;
        let mut channels: Vec<Box<dyn NotifyChannel>> = Vec::new();

        for url in config.webhook_urls.iter().filter(|u| !u.trim().is_empty()) {
            channels.push(Box::new(WebhookChannel::new(http.clone(), url.trim())));
        }
        if let Some(gotify) = &config.gotify {
            channels.push(Box::new(GotifyChannel::new(http.clone(), &gotify.url, &gotify.token)));
        }
        if let Some(tg) = &config.telegram {
            channels.push(Box::new(TelegramChannel::new(http.clone(), &tg.bot_token, &tg.chat_id)));
        }

        Ok(Self::new(channels, Duration::from_millis(config.send_delay_ms)))
    }

    pub fn channel_names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Deliver to every channel in order, pausing between channels
    pub async fn send(&self, title: &str, body: &str) -> DeliveryReport {
        let mut report = DeliveryReport::default();

        if self.channels.is_empty() {
            info!("[Notify] No channels configured, alert not delivered: {}", title);
            return report;
        }

        for (i, channel) in self.channels.iter().enumerate() {
            if i > 0 && !self.send_delay.is_zero() {
                tokio::time::sleep(self.send_delay).await;
            }

            match channel.deliver(title, body).await {
                Ok(()) => {
                    debug!("[Notify] {} delivered: {}", channel.name(), title);
                    report.delivered += 1;
                }
                Err(e) => {
                    error!("[Notify] {}", e);
                    report.failed += 1;
                }
            }
        }

        report
    }

    pub async fn send_test(&self) -> DeliveryReport {
        self.send(
            "Anomaly Monitor Test",
            "🧪 Test notification from the market anomaly monitor. If you can read this, delivery works.",
        )
        .await
    }
}

/// NotifyX-style JSON webhook
pub struct WebhookChannel {
    http: Client,
    url: String,
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    message: &'a str,
    title: &'a str,
    priority: &'a str,
}

impl WebhookChannel {
    pub fn new(http: Client, url: &str) -> Self {
        Self {
            http,
            url: url.to_string(),
        }
    }
}

#[async_trait]
impl NotifyChannel for WebhookChannel {
    async fn deliver(&self, title: &str, body: &str) -> Result<()> {
        let payload = WebhookPayload {
            message: body,
            title,
            priority: "high",
        };
        post_json(&self.http, self.name(), &self.url, &payload).await
    }

    fn name(&self) -> &str {
        "webhook"
    }
}

pub struct GotifyChannel {
    http: Client,
    url: String,
    token: String,
}

#[derive(Serialize)]
struct GotifyPayload<'a> {
    title: &'a str,
    message: &'a str,
    priority: u8,
}

impl GotifyChannel {
    pub fn new(http: Client, url: &str, token: &str) -> Self {
        Self {
            http,
            url: url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}/message?token={}", self.url, self.token)
    }
}

#[async_trait]
impl NotifyChannel for GotifyChannel {
    async fn deliver(&self, title: &str, body: &str) -> Result<()> {
        let payload = GotifyPayload {
            title,
            message: body,
            priority: 8,
        };
        post_json(&self.http, self.name(), &self.endpoint(), &payload).await
    }

    fn name(&self) -> &str {
        "gotify"
    }
}

pub struct TelegramChannel {
    http: Client,
    bot_token: String,
    chat_id: String,
}

#[derive(Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: String,
    parse_mode: &'a str,
}

impl TelegramChannel {
    pub fn new(http: Client, bot_token: &str, chat_id: &str) -> Self {
        Self {
            http,
            bot_token: bot_token.to_string(),
            chat_id: chat_id.to_string(),
        }
    }
}

#[async_trait]
impl NotifyChannel for TelegramChannel {
    async fn deliver(&self, title: &str, body: &str) -> Result<()> {
        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.bot_token);
        let request = SendMessageRequest {
            chat_id: &self.chat_id,
            text: telegram_markdown(title, body),
            parse_mode: "Markdown",
        };
        post_json(&self.http, self.name(), &url, &request).await
    }

    fn name(&self) -> &str {
        "telegram"
    }
}

async fn post_json<T: Serialize + Sync>(http: &Client, channel: &str, url: &str, payload: &T) -> Result<()> {
    let failed = |reason: String| MonitorError::NotificationFailed {
        channel: channel.to_string(),
        reason,
    };

    let resp = http
        .post(url)
        .json(payload)
        .send()
        .await
        .map_err(|e| failed(e.to_string()))?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(failed(format!("HTTP {}: {}", status, body)));
    }
    Ok(())
}

/// Text for Telegram's legacy `Markdown` parse mode. The title is bolded,
/// `**` markers are dropped from the body, and paired backtick spans stay
/// code. Every other `_`, `*`, `` ` `` and `[` is escaped so an unpaired one
/// never makes the Bot API reject the message.
pub fn telegram_markdown(title: &str, body: &str) -> String {
    let body = body.replace("**", "");
    let mut text = format!("*{}*\n\n", escape_markdown(title));

    if body.matches('`').count() % 2 == 0 {
        for (i, part) in body.split('`').enumerate() {
            if i % 2 == 1 && !part.is_empty() {
                text.push('`');
                text.push_str(part);
                text.push('`');
            } else {
                text.push_str(&escape_markdown(part));
            }
        }
    } else {
        text.push_str(&escape_markdown(&body));
    }

    text
}

fn escape_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '_' | '*' | '`' | '[') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Title and body of an alert message
pub fn format_alert(symbol: &str, finding: &Finding, interpretation: &str) -> (String, String) {
    let signal = &finding.primary_signal;
    let details = signal
        .fields
        .iter()
        .map(|(key, value)| format!("**{}:** `{}`", title_case(key), value))
        .collect::<Vec<_>>()
        .join(" | ");

    let title = format!("{} Market Anomaly Alert", symbol);
    let body = format!(
        "🚨 **{}** 🚨\n\n**Indicator:** {}\n**Signal Type:** {}\n**Signal Details:** {}\n\n{}",
        title,
        signal.indicator,
        signal.signal_type,
        details,
        format_interpretation(interpretation)
    );

    (title, body)
}

/// Re-join `【title】content` sections with blank lines; text without
/// sections is returned trimmed
pub fn format_interpretation(text: &str) -> String {
    let sections: Vec<String> = text
        .split('【')
        .filter_map(|section| {
            let (title, content) = section.split_once('】')?;
            let content = content.trim();
            (!content.is_empty()).then(|| format!("【{}】\n{}", title, content))
        })
        .collect();

    if sections.is_empty() {
        text.trim().to_string()
    } else {
        sections.join("\n\n")
    }
}
