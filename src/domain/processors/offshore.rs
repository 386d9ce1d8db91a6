//! Offshore dollar funding: cross-currency basis and Fed swap-line usage.

use crate::domain::composite::{AlertBands, AlertLevel};
use crate::domain::dataset::{Dataset, Series};
use crate::domain::error::EngineError;
use crate::domain::processors::ProcessContext;
use crate::domain::processors::common::{latest, require_any, LatestValue, DATES};
use crate::domain::result::{DomainResult, SharedRef};
use crate::domain::schema::{DomainSchema, FieldKind};
use crate::domain::timeseries::{forward_fill, rolling_change, rolling_zscore, ZSCORE_LOOKBACK};
use serde::Serialize;

pub const NAME: &str = "offshore";

pub const DXY: SharedRef = SharedRef::of("currencies", "dxy");
pub const UPSTREAM: &[SharedRef] = &[DATES, DXY];

const BASIS_COLUMNS: [&str; 2] = ["xccy_basis_eur", "xccy_basis_jpy"];
/// A more negative basis means scarcer offshore dollars.
const BASIS_BANDS: AlertBands = AlertBands::low(1.0, 2.0, 2.5);
const SWAP_CHANGE_WINDOW: usize = 21;

#[derive(Serialize)]
struct Latest {
    basis_avg: LatestValue,
    basis_zscore: LatestValue,
    swap_lines: LatestValue,
    alert: Option<AlertLevel>,
}

pub fn schema() -> DomainSchema {
    DomainSchema::new(NAME)
        .field("basis_avg", FieldKind::Series)
        .field("basis_zscore", FieldKind::Series)
        .field("basis_alert", FieldKind::Labels)
        .field("swap_lines", FieldKind::Series)
        .field("swap_lines_change_1m", FieldKind::Series)
        .field("latest", FieldKind::Object)
        .reference("dxy_ref")
        .reference("dates_ref")
}

/// Mean of whichever basis series report on each date.
pub fn basis_average(series: &[Series]) -> Series {
    let n = series.first().map_or(0, |s| s.len());
    (0..n)
        .map(|t| {
            let present: Vec<f64> = series.iter().filter_map(|s| s[t]).collect();
            if present.is_empty() {
                None
            } else {
                Some(present.iter().sum::<f64>() / present.len() as f64)
            }
        })
        .collect()
}

fn filled(ds: &Dataset, column: &str) -> Series {
    ds.column(column)
        .map(forward_fill)
        .unwrap_or_else(|| vec![None; ds.len()])
}

pub fn process(ctx: &ProcessContext<'_>) -> Result<DomainResult, EngineError> {
    let ds = ctx.dataset;
    let mut result = DomainResult::new(NAME);

    let bases: Vec<Series> = BASIS_COLUMNS.iter().map(|c| filled(ds, c)).collect();
    let slices: Vec<&[Option<f64>]> = bases.iter().map(|s| s.as_slice()).collect();
    require_any(NAME, &slices, "cross-currency basis")?;

    let basis_avg = basis_average(&bases);
    let basis_z = rolling_zscore(&basis_avg, ZSCORE_LOOKBACK);
    let alerts: Vec<Option<AlertLevel>> = basis_z.iter().map(|z| z.map(|z| BASIS_BANDS.level(z))).collect();
    let swap_lines = filled(ds, "fed_swap_lines");

    let summary = Latest {
        basis_avg: latest(&basis_avg, ds.dates()),
        basis_zscore: latest(&basis_z, ds.dates()),
        swap_lines: latest(&swap_lines, ds.dates()),
        alert: alerts.iter().rev().find_map(|a| *a),
    };
    if let Some(level) = summary.alert.filter(|a| *a >= AlertLevel::Warning) {
        tracing::warn!(domain = NAME, alert = level.as_str(), "offshore dollar funding stress");
    }
    result.insert_scalar("latest", &summary)?;

    result.insert_labels(
        "basis_alert",
        alerts.iter().map(|a| a.map(|a| a.as_str().to_string())).collect(),
    );
    result.insert_series("swap_lines_change_1m", rolling_change(&swap_lines, SWAP_CHANGE_WINDOW));
    result.insert_series("swap_lines", swap_lines);
    result.insert_series("basis_zscore", basis_z);
    result.insert_series("basis_avg", basis_avg);

    result.insert("dxy_ref", ctx.upstream.reference(&DXY)?);
    result.insert("dates_ref", ctx.upstream.reference(&DATES)?);
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::processors::test_support::{dataset, results, run, run_with, upstream};
    use crate::domain::processors::{DomainKind, EngineSettings};
    use crate::domain::result::Field;

    #[test]
    fn averages_available_bases() {
        let avg = basis_average(&[
            vec![Some(-10.0), None, Some(-20.0)],
            vec![Some(-30.0), Some(-40.0), None],
        ]);
        assert_eq!(avg, vec![Some(-20.0), Some(-40.0), Some(-20.0)]);
    }

    #[test]
    fn basis_blowout_raises_alert() {
        let n = 260;
        let mut eur: Series = (0..n).map(|i| Some(-10.0 - (i % 3) as f64)).collect();
        eur[n - 1] = Some(-60.0);
        let ds = dataset(n, &[("xccy_basis_eur", eur)]);
        let currencies = upstream("currencies", &[("dxy", vec![Some(100.0); n])]);
        let r = run(DomainKind::Offshore, &ds, &results(vec![currencies]));

        assert_eq!(r.get("basis_alert").unwrap().to_json()[n - 1], "critical");
        assert_eq!(r.get("latest").unwrap().to_json()["alert"], "critical");
        assert_eq!(r.get("dxy_ref"), Some(&Field::Reference(DXY)));
        assert!(r.series("swap_lines").unwrap().iter().all(|v| v.is_none()));
    }

    #[test]
    fn no_basis_is_a_computation_error() {
        let ds = dataset(3, &[("fed_swap_lines", vec![Some(1.0); 3])]);
        let (r, _) = run_with(DomainKind::Offshore, &ds, &results(vec![]), &EngineSettings::default());
        assert!(matches!(r, Err(EngineError::Computation { .. })));
    }
}
