//! Property tests for the rolling statistics.

use approx::assert_relative_eq;
use macropulse::domain::composite::CompositeSpec;
use macropulse::domain::processors::{credit_liquidity, macro_regime, treasury};
use macropulse::domain::timeseries::{
    forward_fill, rolling_change, rolling_percentile, rolling_roc, rolling_zscore,
};
use proptest::prelude::*;

fn series_strategy(max_len: usize) -> impl Strategy<Value = Vec<Option<f64>>> {
    prop::collection::vec(prop::option::weighted(0.85, 1.0f64..1_000.0), 0..max_len)
}

proptest! {
    #[test]
    fn roc_keeps_length_and_leading_nulls(series in series_strategy(120), window in 1usize..40) {
        let roc = rolling_roc(&series, window);
        prop_assert_eq!(roc.len(), series.len());
        for v in roc.iter().take(window) {
            prop_assert!(v.is_none());
        }
        prop_assert!(roc.iter().flatten().all(|v| v.is_finite()));
    }

    #[test]
    fn change_keeps_length_and_leading_nulls(series in series_strategy(120), window in 1usize..40) {
        let change = rolling_change(&series, window);
        prop_assert_eq!(change.len(), series.len());
        prop_assert!(change.iter().take(window).all(|v| v.is_none()));
    }

    #[test]
    fn constant_window_has_null_zscore(value in -1.0e6f64..1.0e6, lookback in 2usize..60, extra in 0usize..20) {
        let series = vec![Some(value); lookback + extra];
        let z = rolling_zscore(&series, lookback);
        prop_assert_eq!(z.len(), series.len());
        prop_assert!(z.iter().all(|v| v.is_none()));
    }

    #[test]
    fn zscore_is_null_before_lookback(series in series_strategy(80), lookback in 2usize..30) {
        let z = rolling_zscore(&series, lookback);
        prop_assert!(z.iter().take(lookback - 1).all(|v| v.is_none()));
    }

    #[test]
    fn window_extremes_rank_at_the_bounds(
        history in prop::collection::vec(-100.0f64..100.0, 1..50),
    ) {
        let lookback = history.len() + 1;
        let top = history.iter().cloned().fold(f64::MIN, f64::max) + 1.0;
        let bottom = history.iter().cloned().fold(f64::MAX, f64::min) - 1.0;

        let mut rising: Vec<Option<f64>> = history.iter().map(|v| Some(*v)).collect();
        rising.push(Some(top));
        let mut falling: Vec<Option<f64>> = history.iter().map(|v| Some(*v)).collect();
        falling.push(Some(bottom));

        let high = rolling_percentile(&rising, lookback)[lookback - 1].unwrap();
        let low = rolling_percentile(&falling, lookback)[lookback - 1].unwrap();
        prop_assert!((high - 100.0).abs() < 1e-9);
        prop_assert!(low.abs() < 1e-9);
    }

    #[test]
    fn percentile_stays_in_range(series in series_strategy(100), lookback in 2usize..30) {
        for v in rolling_percentile(&series, lookback).into_iter().flatten() {
            prop_assert!((0.0..=100.0).contains(&v));
        }
    }

    #[test]
    fn forward_fill_never_adds_leading_values(series in series_strategy(60)) {
        let filled = forward_fill(&series);
        let first = series.iter().position(|v| v.is_some());
        match first {
            Some(i) => {
                prop_assert!(filled[..i].iter().all(|v| v.is_none()));
                prop_assert!(filled[i..].iter().all(|v| v.is_some()));
            }
            None => prop_assert!(filled.iter().all(|v| v.is_none())),
        }
    }
}

#[test]
fn released_composites_have_unit_weights() {
    let specs: [&CompositeSpec; 3] = [
        &credit_liquidity::SIGNAL,
        &treasury::REFINANCING_SIGNAL,
        &macro_regime::SIGNAL,
    ];
    for spec in specs {
        assert_relative_eq!(spec.weight_sum(), 1.0, epsilon = 1e-6);
    }
}

#[test]
fn neutral_components_give_neutral_composite() {
    let inputs: Vec<(&str, Option<f64>)> = macro_regime::SIGNAL
        .components
        .iter()
        .map(|c| (c.name, Some(0.0)))
        .collect();
    let signal = macro_regime::SIGNAL.score(&inputs);
    assert_relative_eq!(signal.composite.unwrap(), 0.0);
    assert_eq!(signal.regime, "neutral");
}
