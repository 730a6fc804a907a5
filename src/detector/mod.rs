//! Signal detectors
//!
//! Each detector inspects one symbol's table and yields at most one finding.
//! Detectors are stateless and cheap; the monitor runs all of them in turn.

mod open_interest;
mod sentiment;
mod volume;

pub use open_interest::OpenInterestDetector;
pub use sentiment::SentimentRatioDetector;
pub use volume::VolumeDetector;

use crate::config::ThresholdConfig;
use crate::data::TimeSeriesTable;
use crate::types::Finding;

/// A rolling-window statistical test
pub trait SignalDetector: Send + Sync {
    /// Evaluate the latest bar. `None` when nothing qualifies or history is
    /// too short for the statistic to be defined.
    fn check(&self, table: &TimeSeriesTable) -> Option<Finding>;

    /// Detector name for logging
    fn name(&self) -> &str;
}

/// The standard detector set: volume, open interest, long/short ratio
pub fn default_detectors(config: &ThresholdConfig) -> Vec<Box<dyn SignalDetector>> {
    vec![
        Box::new(VolumeDetector::from_config(config)),
        Box::new(OpenInterestDetector::from_config(config)),
        Box::new(SentimentRatioDetector::from_config(config)),
    ]
}
