//! Rolling statistics over ordered series
//!
//! All functions are pure and return one output per input element. Positions
//! where a statistic is undefined (not enough history, zero variance) are
//! `None` rather than NaN.

/// Exponential moving average with smoothing factor `2 / (length + 1)`,
/// seeded by the first value
pub fn ema(series: &[f64], length: usize) -> Vec<f64> {
    let alpha = 2.0 / (length as f64 + 1.0);
    let mut out = Vec::with_capacity(series.len());
    let mut prev: Option<f64> = None;

    for &x in series {
        let value = match prev {
            None => x,
            Some(p) => alpha * x + (1.0 - alpha) * p,
        };
        out.push(value);
        prev = Some(value);
    }

    out
}

/// Relative strength index using a simple rolling mean of gains and losses.
///
/// Undefined for the first `length` bars. With zero average loss the ratio is
/// +inf and the result is 100; with no movement at all the result is undefined.
pub fn rsi(series: &[f64], length: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; series.len()];
    if length == 0 || series.len() <= length {
        return out;
    }

    let gains: Vec<f64> = series.windows(2).map(|w| (w[1] - w[0]).max(0.0)).collect();
    let losses: Vec<f64> = series.windows(2).map(|w| (w[0] - w[1]).max(0.0)).collect();
    let n = length as f64;

    // deltas[j] belongs to bar j + 1
    for (i, slot) in out.iter_mut().enumerate().skip(length) {
        let window = (i - length)..i;
        let avg_gain = gains[window.clone()].iter().sum::<f64>() / n;
        let avg_loss = losses[window].iter().sum::<f64>() / n;

        let rs = avg_gain / avg_loss;
        let value = 100.0 - 100.0 / (1.0 + rs);
        if !value.is_nan() {
            *slot = Some(value);
        }
    }

    out
}

/// Rolling z-score `(x - mean) / std` over the trailing `lookback` values
/// (including `x`), using the sample standard deviation.
pub fn z_score(series: &[f64], lookback: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; series.len()];
    if lookback < 2 || series.len() < lookback {
        return out;
    }

    for end in lookback..=series.len() {
        let window = &series[end - lookback..end];
        if let Some(z) = window_z_score(window) {
            out[end - 1] = Some(z);
        }
    }

    out
}

/// Z-score of the last element of `window` against the whole window
pub fn window_z_score(window: &[f64]) -> Option<f64> {
    let n = window.len();
    if n < 2 {
        return None;
    }
    let last = *window.last()?;

    let mean = window.iter().sum::<f64>() / n as f64;
    let var = window.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    let std = var.sqrt();

    if !std.is_finite() || std == 0.0 {
        return None;
    }

    let z = (last - mean) / std;
    z.is_finite().then_some(z)
}

/// Latest value of the rolling z-score, if defined
pub fn latest_z_score(series: &[f64], lookback: usize) -> Option<f64> {
    if lookback < 2 || series.len() < lookback {
        return None;
    }
    window_z_score(&series[series.len() - lookback..])
}

/// Period-over-period fractional change; the first element has no predecessor
pub fn pct_change(series: &[f64]) -> Vec<Option<f64>> {
    let mut out = Vec::with_capacity(series.len());
    if series.is_empty() {
        return out;
    }
    out.push(None);
    for w in series.windows(2) {
        let change = w[1] / w[0] - 1.0;
        out.push(change.is_finite().then_some(change));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_ema_seeded_by_first_value() {
        let out = ema(&[10.0, 20.0, 30.0], 3);
        // alpha = 0.5
        assert!(approx(out[0], 10.0));
        assert!(approx(out[1], 15.0));
        assert!(approx(out[2], 22.5));
    }

    #[test]
    fn test_ema_constant_series() {
        let out = ema(&[5.0; 30], 12);
        assert!(out.iter().all(|v| approx(*v, 5.0)));
    }

    #[test]
    fn test_ema_empty() {
        assert!(ema(&[], 12).is_empty());
    }

    #[test]
    fn test_rsi_warm_up_is_undefined() {
        let series: Vec<f64> = (0..20).map(|i| 100.0 + (i % 3) as f64).collect();
        let out = rsi(&series, 14);
        assert!(out[..14].iter().all(Option::is_none));
        assert!(out[14].is_some());
    }

    #[test]
    fn test_rsi_all_gains_is_100() {
        let series: Vec<f64> = (0..20).map(|i| i as f64).collect();
        let out = rsi(&series, 14);
        assert!(approx(out[19].unwrap(), 100.0));
    }

    #[test]
    fn test_rsi_all_losses_is_0() {
        let series: Vec<f64> = (0..20).map(|i| 100.0 - i as f64).collect();
        let out = rsi(&series, 14);
        assert!(approx(out[19].unwrap(), 0.0));
    }

    #[test]
    fn test_rsi_flat_series_is_undefined() {
        let out = rsi(&[50.0; 20], 14);
        assert!(out.iter().all(Option::is_none));
    }

    #[test]
    fn test_rsi_balanced_moves() {
        // +1, -1 alternating: equal average gain and loss
        let series: Vec<f64> = (0..30).map(|i| if i % 2 == 0 { 10.0 } else { 11.0 }).collect();
        let out = rsi(&series, 14);
        assert!(approx(out[29].unwrap(), 50.0));
    }

    #[test]
    fn test_z_score_known_window() {
        // mean 3, sample std sqrt(2.5)
        let out = z_score(&[1.0, 2.0, 3.0, 4.0, 5.0], 5);
        let expected = (5.0 - 3.0) / 2.5f64.sqrt();
        assert!(out[..4].iter().all(Option::is_none));
        assert!(approx(out[4].unwrap(), expected));
    }

    #[test]
    fn test_z_score_short_series() {
        assert!(z_score(&[1.0, 2.0], 5).iter().all(Option::is_none));
        assert!(latest_z_score(&[1.0, 2.0], 5).is_none());
    }

    #[test]
    fn test_z_score_zero_std_is_undefined() {
        assert!(latest_z_score(&[7.0; 10], 10).is_none());
    }

    #[test]
    fn test_latest_matches_rolling() {
        let series: Vec<f64> = (0..50).map(|i| ((i * 37) % 11) as f64).collect();
        let rolling = z_score(&series, 20);
        assert_eq!(rolling.last().copied().flatten(), latest_z_score(&series, 20));
    }

    #[test]
    fn test_pct_change() {
        let out = pct_change(&[100.0, 110.0, 99.0]);
        assert!(out[0].is_none());
        assert!(approx(out[1].unwrap(), 0.10));
        assert!(approx(out[2].unwrap(), -0.10));
    }

    #[test]
    fn test_pct_change_from_zero_is_undefined() {
        let out = pct_change(&[0.0, 5.0]);
        assert!(out[1].is_none());
    }
}
