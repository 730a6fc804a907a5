//! Time-indexed bar table for one instrument
//!
//! Klines define the row index. Open interest and long/short ratio samples
//! are joined onto kline timestamps, then gaps are filled backward and
//! forward so every row has a value in every column.

use crate::error::{MonitorError, Result};
use crate::types::Bar;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Raw kline row as delivered by the exchange
#[derive(Debug, Clone, PartialEq)]
pub struct Kline {
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub taker_buy_volume: f64,
}

/// Timestamped scalar sample (open interest, long/short ratio)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl Sample {
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// Ordered, gap-free bars for one symbol. Rebuilt every cycle.
#[derive(Debug, Clone)]
pub struct TimeSeriesTable {
    symbol: String,
    bars: Vec<Bar>,
}

impl TimeSeriesTable {
    /// Merge the three sources into a table
    pub fn from_sources(
        symbol: &str,
        klines: Vec<Kline>,
        open_interest: Vec<Sample>,
        ls_ratio: Vec<Sample>,
    ) -> Result<Self> {
        if klines.is_empty() {
            return Err(MonitorError::DataUnavailable(format!("{}: no klines", symbol)));
        }

        // Last write wins per timestamp; BTreeMap keeps them sorted
        let klines: BTreeMap<DateTime<Utc>, Kline> =
            klines.into_iter().map(|k| (k.open_time, k)).collect();
        let oi = dedup_samples(open_interest);
        let ls = dedup_samples(ls_ratio);

        let timestamps: Vec<DateTime<Utc>> = klines.keys().copied().collect();
        let oi_column = align_and_fill(&timestamps, &oi).ok_or_else(|| {
            MonitorError::DataUnavailable(format!("{}: open interest does not overlap klines", symbol))
        })?;
        let ls_column = align_and_fill(&timestamps, &ls).ok_or_else(|| {
            MonitorError::DataUnavailable(format!("{}: long/short ratio does not overlap klines", symbol))
        })?;

        let mut cvd = 0.0;
        let bars = klines
            .into_values()
            .zip(oi_column.into_iter().zip(ls_column))
            .map(|(k, (open_interest, ls_ratio))| {
                cvd += k.taker_buy_volume - (k.volume - k.taker_buy_volume);
                Bar {
                    timestamp: k.open_time,
                    open: k.open,
                    high: k.high,
                    low: k.low,
                    close: k.close,
                    volume: k.volume,
                    taker_buy_volume: k.taker_buy_volume,
                    open_interest,
                    ls_ratio,
                    cvd,
                }
            })
            .collect();

        Ok(Self {
            symbol: symbol.to_string(),
            bars,
        })
    }

    /// Wrap already-aligned bars. Timestamps must be strictly increasing.
    pub fn from_bars(symbol: &str, bars: Vec<Bar>) -> Result<Self> {
        if bars.windows(2).any(|w| w[1].timestamp <= w[0].timestamp) {
            return Err(MonitorError::DataUnavailable(format!(
                "{}: bar timestamps are not strictly increasing",
                symbol
            )));
        }
        Ok(Self {
            symbol: symbol.to_string(),
            bars,
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn latest(&self) -> Option<&Bar> {
        self.bars.last()
    }

    /// Last `n` bars (fewer if the table is shorter)
    pub fn tail(&self, n: usize) -> &[Bar] {
        &self.bars[self.bars.len().saturating_sub(n)..]
    }

    pub fn closes(&self) -> Vec<f64> {
        self.column(|b| b.close)
    }

    pub fn volumes(&self) -> Vec<f64> {
        self.column(|b| b.volume)
    }

    pub fn open_interest(&self) -> Vec<f64> {
        self.column(|b| b.open_interest)
    }

    pub fn ls_ratios(&self) -> Vec<f64> {
        self.column(|b| b.ls_ratio)
    }

    fn column<F: Fn(&Bar) -> f64>(&self, f: F) -> Vec<f64> {
        self.bars.iter().map(f).collect()
    }
}

fn dedup_samples(samples: Vec<Sample>) -> BTreeMap<DateTime<Utc>, f64> {
    samples
        .into_iter()
        .filter(|s| s.value.is_finite())
        .map(|s| (s.timestamp, s.value))
        .collect()
}

/// Join samples onto `index`, back-fill then forward-fill. `None` when no
/// sample lands on any index timestamp.
fn align_and_fill(index: &[DateTime<Utc>], samples: &BTreeMap<DateTime<Utc>, f64>) -> Option<Vec<f64>> {
    let mut column: Vec<Option<f64>> = index.iter().map(|ts| samples.get(ts).copied()).collect();

    let mut next: Option<f64> = None;
    for cell in column.iter_mut().rev() {
        if cell.is_some() {
            next = *cell;
        } else {
            *cell = next;
        }
    }

    let mut prev: Option<f64> = None;
    for cell in column.iter_mut() {
        if cell.is_some() {
            prev = *cell;
        } else {
            *cell = prev;
        }
    }

    column.into_iter().collect()
}
