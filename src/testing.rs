//! Test fixtures: synthetic tables and in-memory collaborators

use crate::data::{MarketDataSource, TimeSeriesTable};
use crate::error::{MonitorError, Result};
use crate::interpret::Interpreter;
use crate::notify::NotifyChannel;
use crate::types::{Bar, Finding};
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Builds a table of `n` 15-minute bars with mildly varying default columns
pub struct TableBuilder {
    n: usize,
    start: DateTime<Utc>,
    closes: Vec<f64>,
    volumes: Vec<f64>,
    open_interest: Vec<f64>,
    ls_ratios: Vec<f64>,
}

impl TableBuilder {
    pub fn new(n: usize) -> Self {
        Self {
            n,
            start: Utc.timestamp_opt(1_700_000_000, 0).single().unwrap_or_else(Utc::now),
            closes: (0..n).map(|i| 100.0 + (i % 5) as f64 * 0.1).collect(),
            volumes: wobble(n, 1000.0, 50.0),
            open_interest: vec![1_000_000.0; n],
            ls_ratios: wobble(n, 1.5, 0.01),
        }
    }

    pub fn closes(mut self, closes: Vec<f64>) -> Self {
        self.closes = closes;
        self
    }

    pub fn volumes(mut self, volumes: Vec<f64>) -> Self {
        self.volumes = volumes;
        self
    }

    pub fn open_interest(mut self, oi: Vec<f64>) -> Self {
        self.open_interest = oi;
        self
    }

    pub fn ls_ratios(mut self, ls: Vec<f64>) -> Self {
        self.ls_ratios = ls;
        self
    }

    pub fn bars(&self) -> Vec<Bar> {
        let mut cvd = 0.0;
        (0..self.n)
            .map(|i| {
                let close = self.closes[i];
                let volume = self.volumes[i];
                let taker_buy = volume * 0.5;
                cvd += taker_buy - (volume - taker_buy);
                Bar {
                    timestamp: self.start + Duration::minutes(15 * i as i64),
                    open: close,
                    high: close * 1.001,
                    low: close * 0.999,
                    close,
                    volume,
                    taker_buy_volume: taker_buy,
                    open_interest: self.open_interest[i],
                    ls_ratio: self.ls_ratios[i],
                    cvd,
                }
            })
            .collect()
    }

    pub fn build(&self, symbol: &str) -> TimeSeriesTable {
        match TimeSeriesTable::from_bars(symbol, self.bars()) {
            Ok(table) => table,
            Err(e) => panic!("fixture table is invalid: {}", e),
        }
    }
}

/// Deterministic non-constant series around `base`
pub fn wobble(n: usize, base: f64, amplitude: f64) -> Vec<f64> {
    (0..n)
        .map(|i| base + amplitude * (((i * 7) % 13) as f64 - 6.0) / 6.0)
        .collect()
}

/// `n` values whose last element has exactly z-score `z` against the whole
/// window (sample std, window includes the last value)
pub fn series_with_last_z(n: usize, z: f64) -> Vec<f64> {
    let mut values = wobble(n - 1, 1000.0, 50.0);
    let m = values.len() as f64;
    let total = n as f64;

    let mean = values.iter().sum::<f64>() / m;
    let ss = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>();

    // Adding x = mean + d gives SS' = ss + d^2 m/n and x - mean' = d m/n
    let d2 = z * z * ss / m / (m * m / (total * total) - z * z / total);
    let d = d2.sqrt() * z.signum();
    values.push(mean + d);
    values
}

/// Market data source serving prebuilt tables
#[derive(Default)]
pub struct StaticSource {
    tables: HashMap<String, TimeSeriesTable>,
    top: Vec<String>,
    fetches: Mutex<Vec<String>>,
    delay: Option<std::time::Duration>,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, table: TimeSeriesTable) -> Self {
        self.tables.insert(table.symbol().to_string(), table);
        self
    }

    pub fn with_top(mut self, symbols: &[&str]) -> Self {
        self.top = symbols.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetches.lock().clone()
    }
}

#[async_trait]
impl MarketDataSource for StaticSource {
    async fn fetch(&self, symbol: &str, _interval: &str, _limit: usize) -> Result<TimeSeriesTable> {
        self.fetches.lock().push(symbol.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.tables
            .get(symbol)
            .cloned()
            .ok_or_else(|| MonitorError::DataUnavailable(format!("{}: no fixture", symbol)))
    }

    async fn top_symbols(&self, n: usize) -> Result<Vec<String>> {
        if self.top.is_empty() {
            return Err(MonitorError::DataUnavailable("no ranking fixture".into()));
        }
        Ok(self.top.iter().take(n).cloned().collect())
    }

    fn name(&self) -> &str {
        "static"
    }
}

/// Interpreter returning a fixed reply, or failing when there is none
pub struct ScriptedInterpreter {
    reply: Option<String>,
    calls: Mutex<Vec<(String, Option<Finding>)>>,
}

impl ScriptedInterpreter {
    pub fn replying(text: &str) -> Self {
        Self {
            reply: Some(text.to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// (symbol, previous finding) per call
    pub fn calls(&self) -> Vec<(String, Option<Finding>)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl Interpreter for ScriptedInterpreter {
    async fn interpret(
        &self,
        symbol: &str,
        _interval: &str,
        _finding: &Finding,
        previous: Option<&Finding>,
    ) -> Result<String> {
        self.calls.lock().push((symbol.to_string(), previous.cloned()));
        self.reply
            .clone()
            .ok_or_else(|| MonitorError::InterpretationFailed("scripted failure".into()))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Channel recording every (title, body) it is asked to deliver
pub struct RecordingChannel {
    name: String,
    fail: bool,
    sent: Arc<Mutex<Vec<(String, String)>>>,
}

impl RecordingChannel {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fail: false,
            sent: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing(name: &str) -> Self {
        Self {
            fail: true,
            ..Self::new(name)
        }
    }

    /// Handle to the delivery log that survives boxing the channel
    pub fn log(&self) -> Arc<Mutex<Vec<(String, String)>>> {
        self.sent.clone()
    }
}

#[async_trait]
impl NotifyChannel for RecordingChannel {
    async fn deliver(&self, title: &str, body: &str) -> Result<()> {
        self.sent.lock().push((title.to_string(), body.to_string()));
        if self.fail {
            return Err(MonitorError::NotificationFailed {
                channel: self.name.clone(),
                reason: "scripted failure".into(),
            });
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
