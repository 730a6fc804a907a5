//! Binance USDⓈ-M futures REST client
//!
//! Klines, open interest history and the global long/short account ratio.

use super::table::{Kline, Sample, TimeSeriesTable};
use super::MarketDataSource;
use crate::config::ExchangeConfig;
use crate::error::{MonitorError, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

#[derive(Clone)]
pub struct BinanceFuturesClient {
    http: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct OpenInterestHist {
    #[serde(rename = "sumOpenInterestValue")]
    sum_open_interest_value: String,
    timestamp: i64,
}

#[derive(Debug, Deserialize)]
struct LongShortRatio {
    #[serde(rename = "longShortRatio")]
    long_short_ratio: String,
    timestamp: i64,
}

#[derive(Debug, Deserialize)]
struct Ticker24h {
    symbol: String,
    #[serde(rename = "quoteVolume")]
    quote_volume: String,
}

impl BinanceFuturesClient {
    pub fn new(config: &ExchangeConfig) -> Result<Self> {
        let mut builder = Client::builder().timeout(std::time::Duration::from_secs(30));
        if let Some(proxy_url) = &config.proxy_url {
            let proxy = reqwest::Proxy::all(proxy_url)
                .map_err(|e| MonitorError::Config(format!("Invalid proxy URL {}: {}", proxy_url, e)))?;
            builder = builder.proxy(proxy);
        }

        Ok(Self {
            http: builder.build()?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .http
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| MonitorError::DataUnavailable(format!("{}: {}", path, e)))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(MonitorError::DataUnavailable(format!("{}: HTTP {}", path, status)));
        }

        resp.json()
            .await
            .map_err(|e| MonitorError::DataUnavailable(format!("{}: invalid body: {}", path, e)))
    }

    pub async fn get_klines(&self, symbol: &str, interval: &str, limit: usize) -> Result<Vec<Kline>> {
        let rows: Vec<Vec<serde_json::Value>> = self
            .get_json(
                "/fapi/v1/klines",
                &[
                    ("symbol", symbol.to_string()),
                    ("interval", interval.to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;

        rows.iter().map(|row| parse_kline_row(row)).collect()
    }

    pub async fn get_open_interest(&self, symbol: &str, period: &str, limit: usize) -> Result<Vec<Sample>> {
        let rows: Vec<OpenInterestHist> = self
            .get_json(
                "/futures/data/openInterestHist",
                &[
                    ("symbol", symbol.to_string()),
                    ("period", period.to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;

        rows.into_iter()
            .map(|r| -> Result<Sample> {
                Ok(Sample::new(millis_to_utc(r.timestamp)?, parse_num(&r.sum_open_interest_value)?))
            })
            .collect()
    }

    pub async fn get_long_short_ratio(&self, symbol: &str, period: &str, limit: usize) -> Result<Vec<Sample>> {
        let rows: Vec<LongShortRatio> = self
            .get_json(
                "/futures/data/globalLongShortAccountRatio",
                &[
                    ("symbol", symbol.to_string()),
                    ("period", period.to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;

        rows.into_iter()
            .map(|r| -> Result<Sample> {
                Ok(Sample::new(millis_to_utc(r.timestamp)?, parse_num(&r.long_short_ratio)?))
            })
            .collect()
    }
}

#[async_trait]
impl MarketDataSource for BinanceFuturesClient {
    async fn fetch(&self, symbol: &str, interval: &str, limit: usize) -> Result<TimeSeriesTable> {
        let (klines, oi, ls) = tokio::try_join!(
            self.get_klines(symbol, interval, limit),
            self.get_open_interest(symbol, interval, limit),
            self.get_long_short_ratio(symbol, interval, limit),
        )?;

        if klines.is_empty() || oi.is_empty() || ls.is_empty() {
            return Err(MonitorError::DataUnavailable(format!(
                "{}: incomplete data (klines={}, oi={}, ls={})",
                symbol,
                klines.len(),
                oi.len(),
                ls.len()
            )));
        }

        debug!(
            "Fetched {} klines, {} OI, {} L/S samples for {}",
            klines.len(),
            oi.len(),
            ls.len(),
            symbol
        );

        TimeSeriesTable::from_sources(symbol, klines, oi, ls)
    }

    async fn top_symbols(&self, n: usize) -> Result<Vec<String>> {
        let tickers: Vec<Ticker24h> = self.get_json("/fapi/v1/ticker/24hr", &[]).await?;
        Ok(rank_by_quote_volume(tickers, n))
    }

    fn name(&self) -> &str {
        "binance-futures"
    }
}

fn rank_by_quote_volume(tickers: Vec<Ticker24h>, n: usize) -> Vec<String> {
    let mut usdt: Vec<(String, f64)> = tickers
        .into_iter()
        .filter(|t| t.symbol.ends_with("USDT"))
        .filter_map(|t| t.quote_volume.parse::<f64>().ok().map(|v| (t.symbol, v)))
        .collect();

    usdt.sort_by(|a, b| b.1.total_cmp(&a.1));
    usdt.into_iter().take(n).map(|(s, _)| s).collect()
}

fn parse_kline_row(row: &[serde_json::Value]) -> Result<Kline> {
    if row.len() < 10 {
        return Err(MonitorError::DataUnavailable(format!(
            "kline row has {} columns, expected 12",
            row.len()
        )));
    }

    let open_time = row[0]
        .as_i64()
        .ok_or_else(|| MonitorError::DataUnavailable("kline open time is not an integer".into()))?;

    Ok(Kline {
        open_time: millis_to_utc(open_time)?,
        open: value_to_f64(&row[1])?,
        high: value_to_f64(&row[2])?,
        low: value_to_f64(&row[3])?,
        close: value_to_f64(&row[4])?,
        volume: value_to_f64(&row[5])?,
        taker_buy_volume: value_to_f64(&row[9])?,
    })
}

/// Binance sends decimals as strings; accept plain numbers too
fn value_to_f64(value: &serde_json::Value) -> Result<f64> {
    match value {
        serde_json::Value::String(s) => parse_num(s),
        serde_json::Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| MonitorError::DataUnavailable(format!("unrepresentable number {}", n))),
        other => Err(MonitorError::DataUnavailable(format!("expected number, got {}", other))),
    }
}

fn parse_num(s: &str) -> Result<f64> {
    s.parse::<f64>()
        .map_err(|e| MonitorError::DataUnavailable(format!("invalid number {:?}: {}", s, e)))
}

fn millis_to_utc(ms: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| MonitorError::DataUnavailable(format!("invalid timestamp {}", ms)))
}
