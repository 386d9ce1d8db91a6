//! Policy-rate expectations implied by futures and the real policy rate.

use crate::domain::dataset::{Dataset, Series};
use crate::domain::error::EngineError;
use crate::domain::processors::ProcessContext;
use crate::domain::processors::common::{latest, LatestValue, DATES};
use crate::domain::result::{DomainResult, SharedRef};
use crate::domain::schema::{DomainSchema, FieldKind};
use crate::domain::timeseries::{forward_fill, rolling_zscore, ZSCORE_LOOKBACK};
use serde::Serialize;

pub const NAME: &str = "fed_forecasts";
pub const UPSTREAM: &[SharedRef] = &[DATES];

const CUT_SIZE_BPS: f64 = 25.0;

#[derive(Serialize)]
struct Latest {
    fed_funds: LatestValue,
    implied_change_bps: LatestValue,
    real_rate: LatestValue,
    policy_stance: Option<&'static str>,
}

pub fn schema() -> DomainSchema {
    DomainSchema::new(NAME)
        .field("fed_funds", FieldKind::Series)
        .field("implied_change_bps", FieldKind::Series)
        .field("expected_cuts", FieldKind::Series)
        .field("real_rate", FieldKind::Series)
        .field("real_rate_zscore", FieldKind::Series)
        .field("policy_stance", FieldKind::Labels)
        .field("latest", FieldKind::Object)
        .reference("dates_ref")
}

/// Stance implied by the expected twelve-month change in basis points.
pub fn policy_stance(change_bps: Option<f64>) -> Option<&'static str> {
    change_bps.map(|bps| {
        if bps <= -50.0 {
            "easing"
        } else if bps <= -10.0 {
            "mild_easing"
        } else if bps < 10.0 {
            "on_hold"
        } else if bps < 50.0 {
            "mild_tightening"
        } else {
            "tightening"
        }
    })
}

fn filled(ds: &Dataset, column: &str) -> Series {
    ds.column(column)
        .map(forward_fill)
        .unwrap_or_else(|| vec![None; ds.len()])
}

fn combine(a: &[Option<f64>], b: &[Option<f64>], f: impl Fn(f64, f64) -> f64) -> Series {
    a.iter()
        .zip(b)
        .map(|(x, y)| match (x, y) {
            (Some(x), Some(y)) => Some(f(*x, *y)),
            _ => None,
        })
        .collect()
}

pub fn process(ctx: &ProcessContext<'_>) -> Result<DomainResult, EngineError> {
    let ds = ctx.dataset;
    let mut result = DomainResult::new(NAME);

    let fed_funds = forward_fill(ds.require("fed_funds")?);
    let futures = filled(ds, "fed_funds_12m");
    let core_pce = filled(ds, "core_pce_yoy");

    let implied = combine(&futures, &fed_funds, |fut, spot| (fut - spot) * 100.0);
    let expected_cuts: Series = implied.iter().map(|v| v.map(|bps| -bps / CUT_SIZE_BPS)).collect();
    let real_rate = combine(&fed_funds, &core_pce, |rate, inflation| rate - inflation);
    let stance: Vec<Option<String>> = implied
        .iter()
        .map(|v| policy_stance(*v).map(String::from))
        .collect();

    let summary = Latest {
        fed_funds: latest(&fed_funds, ds.dates()),
        implied_change_bps: latest(&implied, ds.dates()),
        real_rate: latest(&real_rate, ds.dates()),
        policy_stance: policy_stance(implied.last().copied().flatten()),
    };
    result.insert_scalar("latest", &summary)?;

    result.insert_series("real_rate_zscore", rolling_zscore(&real_rate, ZSCORE_LOOKBACK));
    result.insert_series("fed_funds", fed_funds);
    result.insert_series("implied_change_bps", implied);
    result.insert_series("expected_cuts", expected_cuts);
    result.insert_series("real_rate", real_rate);
    result.insert_labels("policy_stance", stance);
    result.insert("dates_ref", ctx.upstream.reference(&DATES)?);
    Ok(result)
}
