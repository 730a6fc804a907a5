//! Market context snapshot attached to findings
//!
//! Pure function of the table: the last 16 bars, display-formatted latest
//! values and RSI-14 / EMA-12 / EMA-26 on closes.

use crate::data::TimeSeriesTable;
use crate::indicators::{ema, rsi};
use crate::types::{Finding, KeyIndicators, KlineSummary, MarketContext, PrimarySignal, TechnicalIndicators};
use crate::utils::format_thousands;

pub const RECENT_KLINES: usize = 16;
pub const RSI_LENGTH: usize = 14;
pub const EMA_FAST: usize = 12;
pub const EMA_SLOW: usize = 26;

const NOT_AVAILABLE: &str = "N/A";

/// Attach market context to a detector's primary signal
pub fn attach(table: &TimeSeriesTable, primary_signal: PrimarySignal) -> Finding {
    Finding {
        primary_signal,
        market_context: build_context(table),
    }
}

pub fn build_context(table: &TimeSeriesTable) -> MarketContext {
    let recent_klines = table
        .tail(RECENT_KLINES)
        .iter()
        .map(|b| KlineSummary {
            open: b.open,
            high: b.high,
            low: b.low,
            close: b.close,
            volume: b.volume,
        })
        .collect();

    let key_indicators = match table.latest() {
        Some(bar) => KeyIndicators {
            oi: format!("${}", format_thousands(bar.open_interest, 0)),
            price: format!("{:.2}", bar.close),
            volume: format_thousands(bar.volume, 0),
            cvd: format_thousands(bar.cvd, 0),
            long_short_ratio: format!("{:.3}", bar.ls_ratio),
        },
        None => KeyIndicators {
            oi: NOT_AVAILABLE.to_string(),
            price: NOT_AVAILABLE.to_string(),
            volume: NOT_AVAILABLE.to_string(),
            cvd: NOT_AVAILABLE.to_string(),
            long_short_ratio: NOT_AVAILABLE.to_string(),
        },
    };

    let closes = table.closes();
    let latest_rsi = rsi(&closes, RSI_LENGTH).last().copied().flatten();
    let latest_fast = ema(&closes, EMA_FAST).last().copied();
    let latest_slow = ema(&closes, EMA_SLOW).last().copied();

    MarketContext {
        recent_klines,
        key_indicators,
        technical_indicators: TechnicalIndicators {
            rsi_14: format_opt(latest_rsi),
            ema_12: format_opt(latest_fast),
            ema_26: format_opt(latest_slow),
        },
    }
}

fn format_opt(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_finite() => format!("{:.2}", v),
        _ => NOT_AVAILABLE.to_string(),
    }
}
