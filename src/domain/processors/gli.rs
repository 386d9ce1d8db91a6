//! Global liquidity index: the sum of central-bank balance sheets in USD.

use crate::domain::dataset::Series;
use crate::domain::error::EngineError;
use crate::domain::processors::ProcessContext;
use crate::domain::processors::common::{
    aggregate, insert_rolling, latest, require_any, Constituent, BTC_PRICE, DATES,
};
use crate::domain::result::{DomainResult, SharedRef};
use crate::domain::schema::{DomainSchema, FieldKind};

pub const NAME: &str = "gli";

const BANK_REFS: [(&str, SharedRef); 5] = [
    ("fed", SharedRef::of("shared", "fed_usd")),
    ("ecb", SharedRef::of("shared", "ecb_usd")),
    ("boj", SharedRef::of("shared", "boj_usd")),
    ("pboc", SharedRef::of("shared", "pboc_usd")),
    ("boe", SharedRef::of("shared", "boe_usd")),
];

pub const UPSTREAM: &[SharedRef] = &[
    DATES,
    BTC_PRICE,
    SharedRef::of("shared", "fed_usd"),
    SharedRef::of("shared", "ecb_usd"),
    SharedRef::of("shared", "boj_usd"),
    SharedRef::of("shared", "pboc_usd"),
    SharedRef::of("shared", "boe_usd"),
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
    for (bank, _) in &BANK_REFS {
        schema = schema.reference(format!("{bank}_ref"));
    }
    schema
}

pub fn process(ctx: &ProcessContext<'_>) -> Result<DomainResult, EngineError> {
    let dates = ctx.dataset.dates();
    let mut result = DomainResult::new(NAME);

    let mut banks: Vec<(&'static str, Series)> = Vec::with_capacity(BANK_REFS.len());
    for (bank, reference) in BANK_REFS {
        result.insert(format!("{bank}_ref"), ctx.upstream.reference(&reference)?);
        banks.push((bank, ctx.upstream.series_or_null(&reference, dates.len())?));
    }

    let slices: Vec<&[Option<f64>]> = banks.iter().map(|(_, s)| s.as_slice()).collect();
    require_any(NAME, &slices, "central-bank balance sheets")?;

    let constituents: Vec<Constituent<'_>> = banks
        .iter()
        .map(|(name, series)| Constituent {
            name: *name,
            series: series.as_slice(),
        })
        .collect();
    let agg = aggregate(&constituents, dates, ctx.settings.aggregation);
    tracing::debug!(domain = NAME, note = %agg.note, "aggregated balance sheets");

    result.insert_scalar("latest", &latest(&agg.total, dates))?;
    result.insert_scalar("constituents", &agg.first_seen)?;
    result.insert_scalar("composition_note", &agg.note)?;
    result.insert_series("constituent_count", agg.count);
    insert_rolling(&mut result, "total", agg.total);

    result.insert("btc_price_ref", ctx.upstream.reference(&BTC_PRICE)?);
    result.insert("dates_ref", ctx.upstream.reference(&DATES)?);
    Ok(result)
}
