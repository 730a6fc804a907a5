//! Market data acquisition
//!
//! The monitor only sees the [`MarketDataSource`] trait; the Binance USDⓈ-M
//! futures client is the production implementation.

mod binance;
mod table;

pub use binance::BinanceFuturesClient;
pub use table::{Kline, Sample, TimeSeriesTable};

use crate::error::Result;
use async_trait::async_trait;

/// Source of aligned per-symbol bar tables
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Fetch klines, open interest and long/short ratio and merge them.
    /// Any failure is `MonitorError::DataUnavailable`.
    async fn fetch(&self, symbol: &str, interval: &str, limit: usize) -> Result<TimeSeriesTable>;

    /// Most liquid symbols, highest 24h quote volume first
    async fn top_symbols(&self, n: usize) -> Result<Vec<String>>;

    /// Source name for logging
    fn name(&self) -> &str;
}
