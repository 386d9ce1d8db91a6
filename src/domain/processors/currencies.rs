//! Dollar strength: DXY statistics and references to the shared FX crosses.

use crate::domain::error::EngineError;
use crate::domain::processors::ProcessContext;
use crate::domain::processors::common::{
    insert_rolling, latest, DATES, FX_EURUSD, FX_GBPUSD, FX_USDCNY, FX_USDJPY,
};
use crate::domain::result::{DomainResult, SharedRef};
use crate::domain::schema::{DomainSchema, FieldKind};
use crate::domain::timeseries::{forward_fill, rolling_roc, rolling_zscore, ZSCORE_LOOKBACK};

pub const NAME: &str = "currencies";
pub const UPSTREAM: &[SharedRef] = &[DATES, FX_EURUSD, FX_GBPUSD, FX_USDJPY, FX_USDCNY];

const PAIRS: [(&str, SharedRef); 4] = [
    ("eurusd", FX_EURUSD),
    ("gbpusd", FX_GBPUSD),
    ("usdjpy", FX_USDJPY),
    ("usdcny", FX_USDCNY),
];

/// One-month ROC window reported for each cross.
const PAIR_ROC_WINDOW: usize = 21;
/// DXY z-score beyond which the dollar is called strong or weak.
const REGIME_Z: f64 = 1.0;

pub fn schema() -> DomainSchema {
    let mut schema = DomainSchema::new(NAME)
        .rolling("dxy")
        .field("dollar_regime", FieldKind::Labels)
        .field("latest", FieldKind::Object)
        .reference("dates_ref");
    for (pair, _) in PAIRS {
        schema = schema
            .reference(format!("{pair}_ref"))
            .field(format!("{pair}_roc_1m"), FieldKind::Series)
            .field(format!("{pair}_zscore"), FieldKind::Series);
    }
    schema
}

pub fn dollar_regime(z: Option<f64>) -> Option<&'static str> {
    z.map(|z| {
        if z > REGIME_Z {
            "strong_dollar"
        } else if z < -REGIME_Z {
            "weak_dollar"
        } else {
            "neutral"
        }
    })
}

pub fn process(ctx: &ProcessContext<'_>) -> Result<DomainResult, EngineError> {
    let ds = ctx.dataset;
    let n = ds.len();
    let mut result = DomainResult::new(NAME);

    let dxy = forward_fill(ds.require("dxy")?);
    let dxy_z = rolling_zscore(&dxy, ZSCORE_LOOKBACK);
    result.insert_labels(
        "dollar_regime",
        dxy_z.iter().map(|z| dollar_regime(*z).map(String::from)).collect(),
    );
    result.insert_scalar("latest", &latest(&dxy, ds.dates()))?;
    insert_rolling(&mut result, "dxy", dxy);

    for (pair, reference) in PAIRS {
        let rate = ctx.upstream.series_or_null(&reference, n)?;
        result.insert_series(format!("{pair}_roc_1m"), rolling_roc(&rate, PAIR_ROC_WINDOW));
        result.insert_series(format!("{pair}_zscore"), rolling_zscore(&rate, ZSCORE_LOOKBACK));
        result.insert(format!("{pair}_ref"), ctx.upstream.reference(&reference)?);
    }
    result.insert("dates_ref", ctx.upstream.reference(&DATES)?);
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::processors::test_support::{dataset, results, run, upstream};
    use crate::domain::processors::DomainKind;
    use crate::domain::result::Field;

    #[test]
    fn regime_thresholds() {
        assert_eq!(dollar_regime(Some(1.5)), Some("strong_dollar"));
        assert_eq!(dollar_regime(Some(-1.5)), Some("weak_dollar"));
        assert_eq!(dollar_regime(Some(1.0)), Some("neutral"));
        assert_eq!(dollar_regime(None), None);
    }

    #[test]
    fn references_shared_crosses() {
        let n = 25;
        let ds = dataset(n, &[("dxy", (0..n).map(|i| Some(100.0 + i as f64)).collect())]);
        let shared = upstream("shared", &[("fx_eurusd", vec![Some(1.0); n])]);
        let r = run(DomainKind::Currencies, &ds, &results(vec![shared]));

        assert_eq!(r.get("eurusd_ref"), Some(&Field::Reference(FX_EURUSD)));
        assert_eq!(r.get("usdjpy_ref"), Some(&Field::Null));
        assert_eq!(r.series("eurusd_roc_1m").unwrap()[21], Some(0.0));
        assert_eq!(r.series("dxy").unwrap()[n - 1], Some(124.0));
        assert!(r.get("eurusd").is_none());
    }
}
