//! Rolling statistics over date-aligned series.
//!
//! Every function returns a new series of the same length as its input, with
//! `None` for periods where the statistic is undefined. Inputs are never mutated.

use crate::domain::dataset::Series;
use crate::domain::error::EngineError;
use serde::Serialize;

/// Trailing window used for z-scores.
pub const ZSCORE_LOOKBACK: usize = 252;
/// Trailing window used for percentile ranks.
pub const PERCENTILE_LOOKBACK: usize = 252;

/// ROC windows in trading days, keyed by the suffix used in field names.
pub const ROC_WINDOWS: [(&str, usize); 4] = [("1m", 21), ("3m", 63), ("6m", 126), ("1y", 252)];

const ZERO_VARIANCE_EPS: f64 = 1e-12;

/// Keep finite values only.
pub fn finite(x: f64) -> Option<f64> {
    if x.is_finite() { Some(x) } else { None }
}

/// Carry the last observed value forward across gaps. Leading gaps stay `None`.
pub fn forward_fill(series: &[Option<f64>]) -> Series {
    let mut last = None;
    series
        .iter()
        .map(|v| {
            if v.is_some() {
                last = *v;
            }
            last
        })
        .collect()
}

/// `series[t] / series[t - window] - 1` on the forward-filled series.
///
/// The first `window` entries are `None`, as is any point whose base is zero or missing.
pub fn rolling_roc(series: &[Option<f64>], window_days: usize) -> Series {
    let filled = forward_fill(series);
    (0..filled.len())
        .map(|t| {
            if t < window_days || window_days == 0 {
                return None;
            }
            match (filled[t], filled[t - window_days]) {
                (Some(cur), Some(base)) if base != 0.0 => finite(cur / base - 1.0),
                _ => None,
            }
        })
        .collect()
}

/// Difference `series[t] - series[t - window]` on the forward-filled series.
pub fn rolling_change(series: &[Option<f64>], window_days: usize) -> Series {
    let filled = forward_fill(series);
    (0..filled.len())
        .map(|t| {
            if t < window_days {
                return None;
            }
            match (filled[t], filled[t - window_days]) {
                (Some(cur), Some(base)) => finite(cur - base),
                _ => None,
            }
        })
        .collect()
}

/// The `lookback` values ending at `end`, or `None` if any is missing or the
/// window starts before the series does.
fn full_window(series: &[Option<f64>], end: usize, lookback: usize) -> Option<Vec<f64>> {
    if lookback == 0 || end + 1 < lookback {
        return None;
    }
    series[end + 1 - lookback..=end].iter().copied().collect()
}

fn mean_std(window: &[f64]) -> (f64, f64) {
    let n = window.len() as f64;
    let mean = window.iter().sum::<f64>() / n;
    let variance = window.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

/// `(x - rolling_mean) / rolling_std` using the population standard deviation.
///
/// `None` while fewer than `lookback` observations exist and wherever the
/// window has zero variance.
pub fn rolling_zscore(series: &[Option<f64>], lookback: usize) -> Series {
    (0..series.len())
        .map(|t| {
            let window = full_window(series, t, lookback)?;
            let (mean, std) = mean_std(&window);
            if std <= ZERO_VARIANCE_EPS * mean.abs().max(1.0) {
                return None;
            }
            finite((window[window.len() - 1] - mean) / std)
        })
        .collect()
}

/// Rolling population standard deviation.
pub fn rolling_std(series: &[Option<f64>], lookback: usize) -> Series {
    (0..series.len())
        .map(|t| full_window(series, t, lookback).map(|w| mean_std(&w).1))
        .collect()
}

/// Rank of the current value within its trailing window, scaled to [0, 100].
///
/// Ties take their average rank, so the window maximum scores 100 and the
/// minimum scores 0.
pub fn rolling_percentile(series: &[Option<f64>], lookback: usize) -> Series {
    (0..series.len())
        .map(|t| {
            if lookback < 2 {
                return None;
            }
            let window = full_window(series, t, lookback)?;
            let current = window[window.len() - 1];
            let below = window.iter().filter(|&&x| x < current).count() as f64;
            let equal = window.iter().filter(|&&x| x == current).count() as f64;
            let avg_rank = below + (equal + 1.0) / 2.0;
            Some((avg_rank - 1.0) / (lookback as f64 - 1.0) * 100.0)
        })
        .collect()
}

/// Natural-log returns of the forward-filled series. Index 0 is always `None`.
pub fn log_returns(series: &[Option<f64>]) -> Series {
    let filled = forward_fill(series);
    (0..filled.len())
        .map(|t| {
            if t == 0 {
                return None;
            }
            match (filled[t], filled[t - 1]) {
                (Some(cur), Some(prev)) if cur > 0.0 && prev > 0.0 => finite((cur / prev).ln()),
                _ => None,
            }
        })
        .collect()
}

/// Rolling Pearson correlation between two aligned series.
pub fn rolling_correlation(a: &[Option<f64>], b: &[Option<f64>], lookback: usize) -> Series {
    let n = a.len().min(b.len());
    (0..n)
        .map(|t| {
            let wa = full_window(a, t, lookback)?;
            let wb = full_window(b, t, lookback)?;
            let (ma, sa) = mean_std(&wa);
            let (mb, sb) = mean_std(&wb);
            if sa <= ZERO_VARIANCE_EPS || sb <= ZERO_VARIANCE_EPS {
                return None;
            }
            let cov = wa
                .iter()
                .zip(&wb)
                .map(|(x, y)| (x - ma) * (y - mb))
                .sum::<f64>()
                / lookback as f64;
            finite(cov / (sa * sb))
        })
        .collect()
}

/// Index and value of the last observation, if any.
pub fn last_observation(series: &[Option<f64>]) -> Option<(usize, f64)> {
    series
        .iter()
        .enumerate()
        .rev()
        .find_map(|(i, v)| v.map(|x| (i, x)))
}

/// Convert any serializable value to a JSON-safe document.
///
/// Non-finite floats become `null`; numbers, strings, booleans and nested
/// sequences or mappings pass through unchanged.
pub fn normalize_for_serialization<T: Serialize + ?Sized>(
    value: &T,
) -> Result<serde_json::Value, EngineError> {
    Ok(serde_json::to_value(value)?)
}
