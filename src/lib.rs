//! Perpetual Futures Anomaly Monitor
//!
//! Flags statistical anomalies in volume, open interest and long/short ratio
//! on Binance USDⓈ-M futures and notifies external channels, with cooldown
//! based deduplication.
//!
//! ## Architecture
//!
//! ```text
//! MarketDataSource → TimeSeriesTable → Detectors → Finding (+ snapshot)
//!                                                      ↓
//!                                          AlertStateManager.decide
//!                                                      ↓ allow
//!                                         Interpreter → Notifier
//! ```

pub mod config;
pub mod data;
pub mod detector;
pub mod error;
pub mod indicators;
pub mod interpret;
pub mod monitor;
pub mod notify;
pub mod snapshot;
pub mod state;
pub mod testing;
pub mod types;
pub mod utils;

#[cfg(test)]
mod types_tests;
