//! Stablecoin supply: aggregate float and per-issuer dominance.

use crate::domain::dataset::Series;
use crate::domain::error::EngineError;
use crate::domain::processors::ProcessContext;
use crate::domain::processors::common::{
    aggregate, insert_rolling, latest, require_any, Constituent, BTC_PRICE, DATES,
};
use crate::domain::result::{DomainResult, SharedRef};
use crate::domain::schema::{DomainSchema, FieldKind};
use crate::domain::timeseries::forward_fill;

pub const NAME: &str = "stablecoins";
pub const UPSTREAM: &[SharedRef] = &[DATES, BTC_PRICE];

/// Issuer name and supply column.
pub const COINS: [(&str, &str); 3] = [
    ("usdt", "usdt_supply"),
    ("usdc", "usdc_supply"),
    ("dai", "dai_supply"),
];

pub fn schema() -> DomainSchema {
    let mut schema = DomainSchema::new(NAME)
        .rolling("total")
        .field("constituent_count", FieldKind::Series)
        .field("composition_note", FieldKind::Text)
        .field("constituents", FieldKind::Object)
        .field("latest", FieldKind::Object)
        .reference("btc_price_ref")
        .reference("dates_ref");
    for (coin, column) in COINS {
        schema = schema
            .field(column, FieldKind::Series)
            .field(format!("{coin}_dominance"), FieldKind::Series);
    }
    schema
}

/// Share of `part` in `total`, in percent.
pub fn dominance(part: &[Option<f64>], total: &[Option<f64>]) -> Series {
    part.iter()
        .zip(total)
        .map(|(p, t)| match (p, t) {
            (Some(p), Some(t)) if *t > 0.0 => Some(p / t * 100.0),
            _ => None,
        })
        .collect()
}

pub fn process(ctx: &ProcessContext<'_>) -> Result<DomainResult, EngineError> {
    let ds = ctx.dataset;
    let mut result = DomainResult::new(NAME);

    let supplies: Vec<Series> = COINS
        .iter()
        .map(|(_, column)| {
            ds.column(column)
                .map(forward_fill)
                .unwrap_or_else(|| vec![None; ds.len()])
        })
        .collect();
    let slices: Vec<&[Option<f64>]> = supplies.iter().map(|s| s.as_slice()).collect();
    require_any(NAME, &slices, "stablecoin supply")?;

    let constituents: Vec<Constituent<'_>> = COINS
        .iter()
        .zip(&supplies)
        .map(|((coin, _), series)| Constituent {
            name: *coin,
            series: series.as_slice(),
        })
        .collect();
    let agg = aggregate(&constituents, ds.dates(), ctx.settings.aggregation);

    for ((coin, column), supply) in COINS.iter().zip(supplies) {
        result.insert_series(format!("{coin}_dominance"), dominance(&supply, &agg.total));
        result.insert_series(*column, supply);
    }

    result.insert_scalar("latest", &latest(&agg.total, ds.dates()))?;
    result.insert_scalar("constituents", &agg.first_seen)?;
    result.insert_scalar("composition_note", &agg.note)?;
    result.insert_series("constituent_count", agg.count);
    insert_rolling(&mut result, "total", agg.total);

    result.insert("btc_price_ref", ctx.upstream.reference(&BTC_PRICE)?);
    result.insert("dates_ref", ctx.upstream.reference(&DATES)?);
    Ok(result)
}
