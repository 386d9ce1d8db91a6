//! Global broad money: M2 of the major economies converted with the shared FX series.

use crate::domain::dataset::Series;
use crate::domain::error::EngineError;
use crate::domain::processors::ProcessContext;
use crate::domain::processors::common::{
    aggregate, convert_to_usd, insert_rolling, latest, require_any, Constituent, Currency, DATES,
    FX_EURUSD, FX_GBPUSD, FX_USDCNY, FX_USDJPY,
};
use crate::domain::result::{DomainResult, SharedRef};
use crate::domain::schema::{DomainSchema, FieldKind};
use rayon::prelude::*;

pub const NAME: &str = "m2";
pub const UPSTREAM: &[SharedRef] = &[DATES, FX_EURUSD, FX_GBPUSD, FX_USDJPY, FX_USDCNY];

pub struct Economy {
    pub name: &'static str,
    pub column: &'static str,
    pub currency: Currency,
}

pub const ECONOMIES: [Economy; 5] = [
    Economy { name: "us", column: "m2_us", currency: Currency::Usd },
    Economy { name: "eu", column: "m2_eu", currency: Currency::Eur },
    Economy { name: "cn", column: "m2_cn", currency: Currency::Cny },
    Economy { name: "jp", column: "m2_jp", currency: Currency::Jpy },
    Economy { name: "uk", column: "m2_uk", currency: Currency::Gbp },
];

const FX_REFS: [(&str, SharedRef); 4] = [
    ("fx_eurusd_ref", FX_EURUSD),
    ("fx_gbpusd_ref", FX_GBPUSD),
    ("fx_usdjpy_ref", FX_USDJPY),
    ("fx_usdcny_ref", FX_USDCNY),
];

fn usd_field(economy: &Economy) -> String {
    format!("{}_usd", economy.column)
}

pub fn schema() -> DomainSchema {
    let mut schema = DomainSchema::new(NAME)
        .rolling("total")
        .field("constituent_count", FieldKind::Series)
        .field("composition_note", FieldKind::Text)
        .field("constituents", FieldKind::Object)
        .field("latest", FieldKind::Object)
        .reference("dates_ref");
    for economy in &ECONOMIES {
        schema = schema.field(usd_field(economy), FieldKind::Series);
    }
    for (field, _) in FX_REFS {
        schema = schema.reference(field);
    }
    schema
}

pub fn process(ctx: &ProcessContext<'_>) -> Result<DomainResult, EngineError> {
    let ds = ctx.dataset;
    let mut result = DomainResult::new(NAME);

    // Resolve rates up front; the view is not shared across workers.
    let mut rates = Vec::with_capacity(ECONOMIES.len());
    for economy in &ECONOMIES {
        let rate = match economy.currency.fx_ref() {
            Some(reference) => ctx.upstream.series(&reference)?,
            None => None,
        };
        rates.push(rate);
    }

    let converted: Vec<Series> = ECONOMIES
        .par_iter()
        .zip(rates.par_iter())
        .map(|(economy, rate)| match ds.column(economy.column) {
            Some(local) => convert_to_usd(local, *rate, economy.currency),
            None => vec![None; ds.len()],
        })
        .collect();

    let slices: Vec<&[Option<f64>]> = converted.iter().map(|s| s.as_slice()).collect();
    require_any(NAME, &slices, "money supply")?;

    let constituents: Vec<Constituent<'_>> = ECONOMIES
        .iter()
        .zip(&converted)
        .map(|(economy, series)| Constituent {
            name: economy.name,
            series: series.as_slice(),
        })
        .collect();
    let agg = aggregate(&constituents, ds.dates(), ctx.settings.aggregation);

    result.insert_scalar("latest", &latest(&agg.total, ds.dates()))?;
    result.insert_scalar("constituents", &agg.first_seen)?;
    result.insert_scalar("composition_note", &agg.note)?;
    result.insert_series("constituent_count", agg.count);
    insert_rolling(&mut result, "total", agg.total);

    for (economy, series) in ECONOMIES.iter().zip(converted) {
        result.insert_series(usd_field(economy), series);
    }
    for (field, reference) in FX_REFS {
        result.insert(field, ctx.upstream.reference(&reference)?);
    }
    result.insert("dates_ref", ctx.upstream.reference(&DATES)?);
    Ok(result)
}
