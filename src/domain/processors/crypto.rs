//! Crypto market state: BTC momentum, realized volatility and its
//! co-movement with global liquidity.

use crate::domain::dataset::Series;
use crate::domain::error::EngineError;
use crate::domain::processors::ProcessContext;
use crate::domain::processors::common::{
    insert_rolling, insert_rolling_stats, latest, LatestValue, BTC_PRICE, DATES,
};
use crate::domain::result::{DomainResult, SharedRef};
use crate::domain::schema::{DomainSchema, FieldKind};
use crate::domain::timeseries::{forward_fill, log_returns, rolling_correlation, rolling_std};
use serde::Serialize;

pub const NAME: &str = "crypto";

pub const GLI_TOTAL: SharedRef = SharedRef::of("gli", "total");
pub const UPSTREAM: &[SharedRef] = &[DATES, BTC_PRICE, GLI_TOTAL];

const VOL_WINDOW: usize = 30;
const CORRELATION_WINDOW: usize = 90;
const TRADING_DAYS: f64 = 252.0;

#[derive(Serialize)]
struct Latest {
    btc: LatestValue,
    eth: LatestValue,
    eth_btc: LatestValue,
}

pub fn schema() -> DomainSchema {
    DomainSchema::new(NAME)
        .rolling_stats("btc")
        .field("btc_realized_vol_30d", FieldKind::Series)
        .field("btc_gli_correlation_90d", FieldKind::Series)
        .rolling("eth_price")
        .field("eth_btc", FieldKind::Series)
        .field("latest", FieldKind::Object)
        .reference("btc_price_ref")
        .reference("gli_total_ref")
        .reference("dates_ref")
}

/// Annualized rolling standard deviation of log returns.
pub fn realized_vol(prices: &[Option<f64>], window: usize) -> Series {
    let scale = TRADING_DAYS.sqrt();
    rolling_std(&log_returns(prices), window)
        .into_iter()
        .map(|v| v.map(|s| s * scale))
        .collect()
}

fn ratio(a: &[Option<f64>], b: &[Option<f64>]) -> Series {
    a.iter()
        .zip(b)
        .map(|(x, y)| match (x, y) {
            (Some(x), Some(y)) if *y != 0.0 => Some(x / y),
            _ => None,
        })
        .collect()
}

pub fn process(ctx: &ProcessContext<'_>) -> Result<DomainResult, EngineError> {
    let ds = ctx.dataset;
    let n = ds.len();
    let mut result = DomainResult::new(NAME);

    // The BTC price lives in the shared domain; only derived series are stored here.
    let btc = ctx.upstream.series_or_null(&BTC_PRICE, n)?;
    let gli = ctx.upstream.series_or_null(&GLI_TOTAL, n)?;
    let eth = ds
        .column("eth_price")
        .map(forward_fill)
        .unwrap_or_else(|| vec![None; n]);
    let eth_btc = ratio(&eth, &btc);

    insert_rolling_stats(&mut result, "btc", &btc);
    result.insert_series("btc_realized_vol_30d", realized_vol(&btc, VOL_WINDOW));
    result.insert_series(
        "btc_gli_correlation_90d",
        rolling_correlation(&log_returns(&btc), &log_returns(&gli), CORRELATION_WINDOW),
    );

    let summary = Latest {
        btc: latest(&btc, ds.dates()),
        eth: latest(&eth, ds.dates()),
        eth_btc: latest(&eth_btc, ds.dates()),
    };
    result.insert_scalar("latest", &summary)?;
    result.insert_series("eth_btc", eth_btc);
    insert_rolling(&mut result, "eth_price", eth);

    result.insert("btc_price_ref", ctx.upstream.reference(&BTC_PRICE)?);
    result.insert("gli_total_ref", ctx.upstream.reference(&GLI_TOTAL)?);
    result.insert("dates_ref", ctx.upstream.reference(&DATES)?);
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::processors::test_support::{dataset, results, run, upstream};
    use crate::domain::processors::DomainKind;
    use crate::domain::result::Field;
    use approx::assert_relative_eq;

    #[test]
    fn references_btc_instead_of_copying() {
        let n = 30;
        let btc: Series = (0..n).map(|i| Some(100.0 * 1.01_f64.powi(i as i32))).collect();
        let shared = upstream("shared", &[("btc_price", btc)]);
        let ds = dataset(n, &[("eth_price", vec![Some(5.0); n])]);
        let r = run(DomainKind::Crypto, &ds, &results(vec![shared]));

        assert!(r.get("btc_price").is_none());
        assert_eq!(r.get("btc_price_ref"), Some(&Field::Reference(BTC_PRICE)));
        assert_relative_eq!(r.series("btc_roc_1m").unwrap()[21].unwrap(), 1.01_f64.powi(21) - 1.0, epsilon = 1e-9);
        assert_relative_eq!(r.series("eth_btc").unwrap()[0].unwrap(), 0.05);
    }

    #[test]
    fn constant_growth_has_no_volatility() {
        let prices: Series = (0..40).map(|i| Some(2.0_f64.powi(i))).collect();
        let vol = realized_vol(&prices, VOL_WINDOW);
        assert_eq!(vol[VOL_WINDOW - 1], None);
        assert_relative_eq!(vol[VOL_WINDOW].unwrap(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn missing_shared_price_leaves_nulls() {
        let ds = dataset(3, &[]);
        let r = run(DomainKind::Crypto, &ds, &results(vec![]));
        assert_eq!(r.get("btc_price_ref"), Some(&Field::Null));
        assert!(r.series("btc_roc_1m").unwrap().iter().all(|v| v.is_none()));
        assert!(r.series("btc_zscore").unwrap().iter().all(|v| v.is_none()));
    }
}
