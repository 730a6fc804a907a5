//! Open interest anomalies
//!
//! Checks run in order and the first match wins:
//! 1. 24h change against the value one lookback ago
//! 2. N consecutive rising (or falling) periods
//! 3. Sudden single-period change

use super::SignalDetector;
use crate::config::ThresholdConfig;
use crate::data::TimeSeriesTable;
use crate::indicators::pct_change;
use crate::snapshot;
use crate::types::{Finding, Indicator, PrimarySignal};
use crate::utils::{format_signed_pct, format_thousands};

pub struct OpenInterestDetector {
    /// Bars per 24h at the configured interval
    pub lookback: usize,
    pub change_24h_threshold: f64,
    pub continuous_periods: usize,
    pub sudden_change_threshold: f64,
}

impl OpenInterestDetector {
    pub fn from_config(config: &ThresholdConfig) -> Self {
        Self {
            lookback: config.volume_lookback,
            change_24h_threshold: config.oi_24h_change,
            continuous_periods: config.oi_continuous_periods,
            sudden_change_threshold: config.oi_sudden_change,
        }
    }

    fn signal(&self, table: &TimeSeriesTable, signal_type: String) -> Option<PrimarySignal> {
        let latest = table.latest()?;
        Some(
            PrimarySignal::new(Indicator::OpenInterest, signal_type)
                .with_field("value", format!("${}", format_thousands(latest.open_interest, 0)))
                .with_field("price", format!("{:.2}", latest.close)),
        )
    }

    fn change_24h(&self, oi: &[f64]) -> Option<f64> {
        // Same bar the lookback window starts on
        let then = *oi.get(oi.len().checked_sub(self.lookback)?)?;
        let now = *oi.last()?;
        let change = now / then - 1.0;
        change.is_finite().then_some(change)
    }
}

impl SignalDetector for OpenInterestDetector {
    fn check(&self, table: &TimeSeriesTable) -> Option<Finding> {
        if table.len() < self.lookback {
            return None;
        }

        let oi = table.open_interest();

        if let Some(change) = self.change_24h(&oi) {
            if change.abs() > self.change_24h_threshold {
                let signal = self
                    .signal(table, "24H Change Alert".to_string())?
                    .with_field("change_24h", format_signed_pct(change));
                return Some(snapshot::attach(table, signal));
            }
        }

        let changes = pct_change(&oi);
        let n = self.continuous_periods;
        if n > 0 && changes.len() >= n {
            let trailing = &changes[changes.len() - n..];
            if trailing.iter().all(|c| matches!(c, Some(v) if *v > 0.0)) {
                let signal = self.signal(table, format!("Continuous Rise ({} periods)", n))?;
                return Some(snapshot::attach(table, signal));
            }
            if trailing.iter().all(|c| matches!(c, Some(v) if *v < 0.0)) {
                let signal = self.signal(table, format!("Continuous Fall ({} periods)", n))?;
                return Some(snapshot::attach(table, signal));
            }
        }

        if let Some(Some(last)) = changes.last() {
            if last.abs() > self.sudden_change_threshold {
                let signal = self
                    .signal(table, "Sudden Change Alert".to_string())?
                    .with_field("change_1_period", format_signed_pct(*last));
                return Some(snapshot::attach(table, signal));
            }
        }

        None
    }

    fn name(&self) -> &str {
        "open_interest"
    }
}
