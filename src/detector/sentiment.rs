//! Long/short account ratio extremes

use super::SignalDetector;
use crate::config::ThresholdConfig;
use crate::data::TimeSeriesTable;
use crate::indicators::latest_z_score;
use crate::snapshot;
use crate::types::{Finding, Indicator, PrimarySignal};

pub const EXTREMELY_BULLISH: &str = "Extremely Bullish (Contrarian Bearish)";
pub const EXTREMELY_BEARISH: &str = "Extremely Bearish (Contrarian Bullish)";

pub struct SentimentRatioDetector {
    pub lookback: usize,
    pub z_threshold: f64,
}

impl SentimentRatioDetector {
    pub fn new(lookback: usize, z_threshold: f64) -> Self {
        Self { lookback, z_threshold }
    }

    pub fn from_config(config: &ThresholdConfig) -> Self {
        Self::new(config.ls_ratio_lookback, config.ls_ratio_z_score)
    }
}

impl SignalDetector for SentimentRatioDetector {
    fn check(&self, table: &TimeSeriesTable) -> Option<Finding> {
        if table.len() < self.lookback {
            return None;
        }

        let z = latest_z_score(&table.ls_ratios(), self.lookback)?;
        if z.abs() <= self.z_threshold {
            return None;
        }

        let latest = table.latest()?;
        let sentiment = if z > 0.0 { EXTREMELY_BULLISH } else { EXTREMELY_BEARISH };

        let signal = PrimarySignal::new(Indicator::LongShortRatio, "Sentiment Extreme Alert")
            .with_field("value", format!("{:.3}", latest.ls_ratio))
            .with_field("z_score", format!("{:.2}", z))
            .with_field("sentiment", sentiment);

        Some(snapshot::attach(table, signal))
    }

    fn name(&self) -> &str {
        "long_short_ratio"
    }
}
