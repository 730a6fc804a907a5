//! Natural-language interpretation of findings
//!
//! Interpretation is best-effort: callers go through [`interpret_or_template`],
//! which falls back to the deterministic [`TemplateInterpreter`] whenever the
//! configured interpreter fails.


use crate::config::LlmConfig;
use crate::error::{MonitorError, Result};
use crate::types::Finding;
use crate::utils::title_case;
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[async_trait]
pub trait Interpreter: Send + Sync {
    /// Turn a finding (and the previously notified one for the same key, if
    /// any) into prose for the notification body
    async fn interpret(
        &self,
        symbol: &str,
        interval: &str,
        finding: &Finding,
        previous: Option<&Finding>,
    ) -> Result<String>;

    fn name(&self) -> &str;
}

/// Build the interpreter for this deployment: LLM-backed when an LLM is
/// configured, template-only otherwise
pub fn from_config(config: Option<&LlmConfig>) -> Result<Arc<dyn Interpreter>> {
    match config {
        Some(llm) if llm.is_usable() => Ok(Arc::new(LlmInterpreter::new(llm)?)),
        _ => Ok(Arc::new(TemplateInterpreter)),
    }
}

/// Interpret, degrading to the template text on failure. Never fails.
pub async fn interpret_or_template(
    interpreter: &dyn Interpreter,
    symbol: &str,
    interval: &str,
    finding: &Finding,
    previous: Option<&Finding>,
) -> String {
    match interpreter.interpret(symbol, interval, finding, previous).await {
        Ok(text) if !text.trim().is_empty() => text,
        Ok(_) => {
            warn!("[Interpret] {} returned empty text for {}, using template", interpreter.name(), symbol);
            TemplateInterpreter::render(symbol, interval, finding, previous)
        }
        Err(e) => {
            warn!("[Interpret] {} failed for {}: {}, using template", interpreter.name(), symbol, e);
            TemplateInterpreter::render(symbol, interval, finding, previous)
        }
    }
}

/// OpenAI-compatible chat-completions client (DeepSeek by default)
pub struct LlmInterpreter {
    http: Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl LlmInterpreter {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let (base_url, model) = resolve_endpoint(config);
        let http = Client::builder().timeout(Duration::from_secs(60)).build()?;
        Ok(Self {
            http,
            base_url,
            model,
            api_key: config.api_key.clone(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn completions_url(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }
}

#[async_trait]
impl Interpreter for LlmInterpreter {
    async fn interpret(
        &self,
        symbol: &str,
        interval: &str,
        finding: &Finding,
        previous: Option<&Finding>,
    ) -> Result<String> {
        let prompt = build_prompt(symbol, interval, finding, previous)?;

        let request = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": prompt}
            ],
            "temperature": 0.3
        });

        let mut req = self
            .http
            .post(self.completions_url())
            .header("content-type", "application/json");

        if !self.api_key.is_empty() {
            req = req.header("Authorization", format!("Bearer {}", self.api_key));
        }

        let resp = req
            .json(&request)
            .send()
            .await
            .map_err(|e| MonitorError::InterpretationFailed(format!("request failed: {}", e)))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(MonitorError::InterpretationFailed(format!("HTTP {}: {}", status, body)));
        }

        let value: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| MonitorError::InterpretationFailed(format!("bad response body: {}", e)))?;

        debug!("[Interpret] {} answered for {}", self.model, symbol);
        extract_content(&value)
    }

    fn name(&self) -> &str {
        "llm"
    }
}

const SYSTEM_PROMPT: &str = "You are a crypto derivatives market analyst. \
Explain statistical anomalies in perpetual futures markets to traders concisely. \
Do not give financial advice or price targets.";

/// Provider defaults, overridable by `base_url` and `model`
pub fn resolve_endpoint(config: &LlmConfig) -> (String, String) {
    let (default_base, default_model) = match config.provider.to_lowercase().as_str() {
        "openai" | "gpt" => ("https://api.openai.com", "gpt-4o-mini"),
        "ollama" => ("http://localhost:11434", "qwen2.5:14b"),
        _ => ("https://api.deepseek.com", "deepseek-chat"),
    };

    let base = config
        .base_url
        .clone()
        .unwrap_or_else(|| default_base.to_string());
    let model = config
        .model
        .clone()
        .unwrap_or_else(|| default_model.to_string());

    // Older deployments configure the base with the `/v1` prefix included
    let base = base.trim_end_matches('/');
    let base = base.strip_suffix("/v1").unwrap_or(base);

    (base.to_string(), model)
}

pub fn build_prompt(
    symbol: &str,
    interval: &str,
    finding: &Finding,
    previous: Option<&Finding>,
) -> Result<String> {
    let mut prompt = format!(
        "Symbol: {}\nBar interval: {}\n\nCurrent signal (JSON):\n{}\n",
        symbol,
        interval,
        serde_json::to_string_pretty(finding)?
    );

    match previous {
        Some(prev) => {
            prompt.push_str(&format!(
                "\nPreviously notified signal for the same indicator (JSON):\n{}\n",
                serde_json::to_string_pretty(&prev.primary_signal)?
            ));
        }
        None => prompt.push_str("\nNo previous signal has been notified for this indicator.\n"),
    }

    prompt.push_str(
        "\nAnswer in plain text using exactly these section headers:\n\
         【Signal】 what the anomaly is and how unusual it is\n\
         【Context】 what price, open interest, CVD, RSI and EMAs say about it\n\
         【Trend】 how it compares with the previous signal, if any\n\
         【Watch】 what to monitor next\n\
         Keep each section under 60 words.",
    );

    Ok(prompt)
}

/// `choices[0].message.content` of a chat-completions response
pub fn extract_content(resp: &serde_json::Value) -> Result<String> {
    resp["choices"][0]["message"]["content"]
        .as_str()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| MonitorError::InterpretationFailed("Empty LLM response".into()))
}

/// Deterministic rendering of a finding, no network involved
pub struct TemplateInterpreter;

impl TemplateInterpreter {
    pub fn render(symbol: &str, interval: &str, finding: &Finding, previous: Option<&Finding>) -> String {
        let signal = &finding.primary_signal;
        let details = signal
            .fields
            .iter()
            .map(|(k, v)| format!("{}: {}", title_case(k), v))
            .collect::<Vec<_>>()
            .join(", ");

        let key = &finding.market_context.key_indicators;
        let tech = &finding.market_context.technical_indicators;

        let mut text = format!(
            "【Signal】\n{} {} on {} ({}). {}\n\n\
             【Context】\nPrice {}, open interest {}, volume {}, CVD {}, long/short ratio {}. \
             RSI-14 {}, EMA-12 {}, EMA-26 {}.",
            signal.indicator,
            signal.signal_type,
            symbol,
            interval,
            details,
            key.price,
            key.oi,
            key.volume,
            key.cvd,
            key.long_short_ratio,
            tech.rsi_14,
            tech.ema_12,
            tech.ema_26,
        );

        if let Some(prev) = previous {
            let prev_details = prev
                .primary_signal
                .fields
                .iter()
                .map(|(k, v)| format!("{}: {}", title_case(k), v))
                .collect::<Vec<_>>()
                .join(", ");
            text.push_str(&format!(
                "\n\n【Trend】\nPrevious {}: {}",
                prev.primary_signal.signal_type, prev_details
            ));
        }

        text
    }
}

#[async_trait]
impl Interpreter for TemplateInterpreter {
    async fn interpret(
        &self,
        symbol: &str,
        interval: &str,
        finding: &Finding,
        previous: Option<&Finding>,
    ) -> Result<String> {
        Ok(Self::render(symbol, interval, finding, previous))
    }

    fn name(&self) -> &str {
        "template"
    }
}
