//! Core types shared across detection, state and dispatch

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One OHLCV bar plus the derivatives-market columns joined onto it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub taker_buy_volume: f64,
    /// Open interest value (quote currency)
    pub open_interest: f64,
    pub ls_ratio: f64,
    /// Cumulative volume delta up to and including this bar
    pub cvd: f64,
}

/// Which statistical test produced a finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Indicator {
    Volume,
    OpenInterest,
    LongShortRatio,
}

impl Indicator {
    pub fn display_name(&self) -> &'static str {
        match self {
            Indicator::Volume => "Volume",
            Indicator::OpenInterest => "Open Interest",
            Indicator::LongShortRatio => "Long/Short Ratio",
        }
    }
}

impl fmt::Display for Indicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// The detector output before market context is attached
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimarySignal {
    pub indicator: Indicator,
    /// Short label, e.g. "Spike Alert"
    pub signal_type: String,
    /// Display-formatted values keyed by field name (`z_score`, `change_24h`, ...)
    pub fields: BTreeMap<String, String>,
}

impl PrimarySignal {
    pub fn new(indicator: Indicator, signal_type: impl Into<String>) -> Self {
        Self {
            indicator,
            signal_type: signal_type.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: &str, value: impl Into<String>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// OHLCV subset of a bar as shown in the context block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KlineSummary {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyIndicators {
    pub oi: String,
    pub price: String,
    pub volume: String,
    pub cvd: String,
    pub long_short_ratio: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechnicalIndicators {
    pub rsi_14: String,
    pub ema_12: String,
    pub ema_26: String,
}

/// Market snapshot attached to every finding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketContext {
    pub recent_klines: Vec<KlineSummary>,
    pub key_indicators: KeyIndicators,
    pub technical_indicators: TechnicalIndicators,
}

/// A detector finding enriched with its market context. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub primary_signal: PrimarySignal,
    pub market_context: MarketContext,
}

impl Finding {
    pub fn indicator(&self) -> Indicator {
        self.primary_signal.indicator
    }

    pub fn signal_type(&self) -> &str {
        &self.primary_signal.signal_type
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.primary_signal.field(name)
    }
}
