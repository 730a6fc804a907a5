//! Volume spike detection via rolling z-score

use super::SignalDetector;
use crate::config::ThresholdConfig;
use crate::data::TimeSeriesTable;
use crate::indicators::latest_z_score;
use crate::snapshot;
use crate::types::{Finding, Indicator, PrimarySignal};
use crate::utils::{format_signed_pct, format_thousands};

pub struct VolumeDetector {
    /// Bars in the rolling window
    pub lookback: usize,
    /// Emit when |z| is strictly above this
    pub z_threshold: f64,
}

impl VolumeDetector {
    pub fn new(lookback: usize, z_threshold: f64) -> Self {
        Self { lookback, z_threshold }
    }

    pub fn from_config(config: &ThresholdConfig) -> Self {
        Self::new(config.volume_lookback, config.volume_z_score)
    }
}

impl SignalDetector for VolumeDetector {
    fn check(&self, table: &TimeSeriesTable) -> Option<Finding> {
        if table.len() < self.lookback {
            return None;
        }

        let z = latest_z_score(&table.volumes(), self.lookback)?;
        if z.abs() <= self.z_threshold {
            return None;
        }

        let bars = table.bars();
        let latest = &bars[bars.len() - 1];
        let price_change = bars
            .len()
            .checked_sub(2)
            .map(|i| latest.close / bars[i].close - 1.0)
            .filter(|c| c.is_finite())
            .map(format_signed_pct)
            .unwrap_or_else(|| "N/A".to_string());

        let signal = PrimarySignal::new(Indicator::Volume, "Spike Alert")
            .with_field("value", format_thousands(latest.volume, 0))
            .with_field("z_score", format!("{:.2}", z))
            .with_field("price_change", price_change);

        Some(snapshot::attach(table, signal))
    }

    fn name(&self) -> &str {
        "volume"
    }
}
