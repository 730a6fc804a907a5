//! Configuration loading
//!
//! Values come from an optional TOML file, then `MONITOR__SECTION__KEY`
//! environment variables, then the flat variables used by older deployments
//! (`NOTIFYX_WEBHOOK_URL`, `GOTIFY_URL`, `DEEPSEEK_API_KEY`, ...).

use crate::error::{MonitorError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub thresholds: ThresholdConfig,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub exchange: ExchangeConfig,
    pub llm: Option<LlmConfig>,
    #[serde(default)]
    pub notify: NotifyConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MonitorConfig {
    /// Static symbol list (also the fallback when dynamic discovery fails)
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,
    /// Use the top-N USDT pairs by 24h quote volume instead of `symbols`
    #[serde(default)]
    pub dynamic_symbols: bool,
    #[serde(default = "default_top_n")]
    pub top_n_symbols: usize,
    /// Bar interval, e.g. "15m"
    #[serde(default = "default_interval")]
    pub interval: String,
    /// Bars requested per fetch
    #[serde(default = "default_fetch_limit")]
    pub fetch_limit: usize,
    #[serde(default = "default_cycle_interval")]
    pub cycle_interval_secs: u64,
    /// Simultaneous in-flight instrument pipelines
    #[serde(default = "default_concurrency")]
    pub concurrency_limit: usize,
    /// Simultaneous interpret + notify tasks
    #[serde(default = "default_dispatch_concurrency")]
    pub dispatch_concurrency: usize,
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_cycle_timeout")]
    pub cycle_timeout_secs: u64,
}

fn default_symbols() -> Vec<String> {
    ["BTCUSDT", "ETHUSDT", "SOLUSDT", "DOGEUSDT"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_top_n() -> usize {
    20
}

fn default_interval() -> String {
    "15m".to_string()
}

fn default_fetch_limit() -> usize {
    200
}

fn default_cycle_interval() -> u64 {
    900 // 15 minutes
}

fn default_concurrency() -> usize {
    5
}

fn default_dispatch_concurrency() -> usize {
    4
}

fn default_fetch_timeout() -> u64 {
    30
}

fn default_cycle_timeout() -> u64 {
    600
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            symbols: default_symbols(),
            dynamic_symbols: false,
            top_n_symbols: default_top_n(),
            interval: default_interval(),
            fetch_limit: default_fetch_limit(),
            cycle_interval_secs: default_cycle_interval(),
            concurrency_limit: default_concurrency(),
            dispatch_concurrency: default_dispatch_concurrency(),
            fetch_timeout_secs: default_fetch_timeout(),
            cycle_timeout_secs: default_cycle_timeout(),
        }
    }
}

impl MonitorConfig {
    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.cycle_interval_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn cycle_timeout(&self) -> Duration {
        Duration::from_secs(self.cycle_timeout_secs)
    }
}

/// Detector thresholds
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ThresholdConfig {
    #[serde(default = "default_z_threshold")]
    pub volume_z_score: f64,
    /// Lookback in bars (96 x 15m = 24h). Also used as the OI 24h offset.
    #[serde(default = "default_lookback")]
    pub volume_lookback: usize,
    #[serde(default = "default_oi_24h_change")]
    pub oi_24h_change: f64,
    #[serde(default = "default_oi_continuous_periods")]
    pub oi_continuous_periods: usize,
    #[serde(default = "default_oi_sudden_change")]
    pub oi_sudden_change: f64,
    #[serde(default = "default_z_threshold")]
    pub ls_ratio_z_score: f64,
    #[serde(default = "default_lookback")]
    pub ls_ratio_lookback: usize,
}

fn default_z_threshold() -> f64 {
    2.0
}

fn default_lookback() -> usize {
    96
}

fn default_oi_24h_change() -> f64 {
    0.10
}

fn default_oi_continuous_periods() -> usize {
    4
}

fn default_oi_sudden_change() -> f64 {
    0.035
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            volume_z_score: default_z_threshold(),
            volume_lookback: default_lookback(),
            oi_24h_change: default_oi_24h_change(),
            oi_continuous_periods: default_oi_continuous_periods(),
            oi_sudden_change: default_oi_sudden_change(),
            ls_ratio_z_score: default_z_threshold(),
            ls_ratio_lookback: default_lookback(),
        }
    }
}

/// Alert deduplication settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StateConfig {
    #[serde(default = "default_cooldown")]
    pub cooldown_minutes: i64,
    /// Minimum |Δz| to re-alert inside the cooldown
    #[serde(default = "default_z_change")]
    pub z_score_change: f64,
    /// Minimum |Δ%| (as a fraction) to re-alert inside the cooldown
    #[serde(default = "default_pct_change")]
    pub percentage_change: f64,
}

/// One year
pub const MAX_COOLDOWN_MINUTES: i64 = 525_600;

fn default_cooldown() -> i64 {
    60
}

fn default_z_change() -> f64 {
    0.5
}

fn default_pct_change() -> f64 {
    0.05
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            cooldown_minutes: default_cooldown(),
            z_score_change: default_z_change(),
            percentage_change: default_pct_change(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExchangeConfig {
    #[serde(default = "default_exchange_url")]
    pub base_url: String,
    /// http://, https:// or socks5:// proxy
    pub proxy_url: Option<String>,
}

fn default_exchange_url() -> String {
    "https://fapi.binance.com".to_string()
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            base_url: default_exchange_url(),
            proxy_url: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default)]
    pub api_key: String,
    pub model: Option<String>,
    pub base_url: Option<String>,
}

fn default_llm_provider() -> String {
    "deepseek".to_string()
}

impl LlmConfig {
    /// Hosted providers need a key; a local ollama does not
    pub fn is_usable(&self) -> bool {
        !self.api_key.is_empty() || self.provider.eq_ignore_ascii_case("ollama")
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotifyConfig {
    /// NotifyX-style webhook endpoints
    #[serde(default)]
    pub webhook_urls: Vec<String>,
    pub gotify: Option<GotifyConfig>,
    pub telegram: Option<TelegramConfig>,
    /// Pause between endpoints when several are configured
    #[serde(default = "default_send_delay")]
    pub send_delay_ms: u64,
}

fn default_send_delay() -> u64 {
    1000
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            webhook_urls: Vec::new(),
            gotify: None,
            telegram: None,
            send_delay_ms: default_send_delay(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GotifyConfig {
    pub url: String,
    pub token: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
}

impl Config {
    /// Load configuration from `path` (optional) and the environment
    pub fn load(path: &str) -> Result<Self> {
        let _ = dotenvy::dotenv();

        let path = shellexpand::tilde(path).into_owned();
        let raw = config::Config::builder()
            .add_source(config::File::with_name(&path).required(false))
            .add_source(
                config::Environment::with_prefix("MONITOR")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("monitor.symbols")
                    .with_list_parse_key("notify.webhook_urls")
                    .try_parsing(true),
            )
            .build()?;

        let mut cfg: Config = raw.try_deserialize()?;
        cfg.apply_legacy_env(|key| std::env::var(key).ok());
        cfg.validate()?;
        Ok(cfg)
    }

    /// Apply the flat environment variables of older deployments
    pub fn apply_legacy_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(urls) = lookup("NOTIFYX_WEBHOOK_URL") {
            for url in urls.split(',').map(str::trim).filter(|u| !u.is_empty()) {
                if !self.notify.webhook_urls.iter().any(|u| u == url) {
                    self.notify.webhook_urls.push(url.to_string());
                }
            }
        }

        if let (Some(url), Some(token)) = (lookup("GOTIFY_URL"), lookup("GOTIFY_TOKEN")) {
            if !url.trim().is_empty() && !token.trim().is_empty() {
                self.notify.gotify = Some(GotifyConfig { url, token });
            }
        }

        if let Some(api_key) = lookup("DEEPSEEK_API_KEY").filter(|k| !k.is_empty()) {
            let llm = self.llm.get_or_insert_with(|| LlmConfig {
                provider: default_llm_provider(),
                api_key: String::new(),
                model: None,
                base_url: None,
            });
            llm.api_key = api_key;
            if let Some(model) = lookup("DEEPSEEK_MODEL_NAME") {
                llm.model = Some(model);
            }
            if let Some(base_url) = lookup("DEEPSEEK_API_BASE_URL") {
                llm.base_url = Some(base_url);
            }
        }

        if let Some(proxy) = lookup("PROXY_URL").filter(|p| !p.is_empty()) {
            self.exchange.proxy_url = Some(proxy);
        }
    }

    pub fn validate(&self) -> Result<()> {
        let t = &self.thresholds;
        if t.volume_lookback < 2 || t.ls_ratio_lookback < 2 {
            return Err(MonitorError::Config(
                "lookback periods must be at least 2 bars".into(),
            ));
        }
        if t.oi_continuous_periods == 0 {
            return Err(MonitorError::Config(
                "oi_continuous_periods must be positive".into(),
            ));
        }
        for (name, value) in [
            ("volume_z_score", t.volume_z_score),
            ("oi_24h_change", t.oi_24h_change),
            ("oi_sudden_change", t.oi_sudden_change),
            ("ls_ratio_z_score", t.ls_ratio_z_score),
            ("z_score_change", self.state.z_score_change),
            ("percentage_change", self.state.percentage_change),
        ] {
            if value.is_nan() || value <= 0.0 {
                return Err(MonitorError::Config(format!("{} must be positive", name)));
            }
        }
        if !(0..=MAX_COOLDOWN_MINUTES).contains(&self.state.cooldown_minutes) {
            return Err(MonitorError::Config(format!(
                "cooldown_minutes must be between 0 and {}",
                MAX_COOLDOWN_MINUTES
            )));
        }
        if self.monitor.concurrency_limit == 0 || self.monitor.dispatch_concurrency == 0 {
            return Err(MonitorError::Config("concurrency limits must be positive".into()));
        }
        if self.monitor.cycle_interval_secs == 0 {
            return Err(MonitorError::Config("cycle_interval_secs must be positive".into()));
        }
        if !self.monitor.dynamic_symbols && self.monitor.symbols.is_empty() {
            return Err(MonitorError::Config("no symbols configured".into()));
        }
        Ok(())
    }
}
