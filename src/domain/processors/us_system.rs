//! US net liquidity: Fed balance sheet less the Treasury General Account and
//! the overnight reverse repo facility.

use crate::domain::dataset::Series;
use crate::domain::error::EngineError;
use crate::domain::processors::ProcessContext;
use crate::domain::processors::common::{insert_rolling, latest, BTC_PRICE, DATES};
use crate::domain::result::{DomainResult, SharedRef};
use crate::domain::schema::{DomainSchema, FieldKind};
use crate::domain::timeseries::{forward_fill, rolling_change, ROC_WINDOWS};

pub const NAME: &str = "us_system";

pub const FED_ASSETS: SharedRef = SharedRef::of("shared", "fed_usd");
pub const UPSTREAM: &[SharedRef] = &[DATES, BTC_PRICE, FED_ASSETS];

pub fn schema() -> DomainSchema {
    let mut schema = DomainSchema::new(NAME)
        .field("tga", FieldKind::Series)
        .field("rrp", FieldKind::Series)
        .rolling("net_liquidity")
        .field("latest", FieldKind::Object)
        .reference("fed_assets_ref")
        .reference("btc_price_ref")
        .reference("dates_ref");
    for (w, _) in ROC_WINDOWS {
        schema = schema
            .field(format!("net_liquidity_change_{w}"), FieldKind::Series)
            .field(format!("fed_contribution_{w}"), FieldKind::Series)
            .field(format!("tga_contribution_{w}"), FieldKind::Series)
            .field(format!("rrp_contribution_{w}"), FieldKind::Series);
    }
    schema
}

/// `fed - tga - rrp`, null wherever any input is unknown.
pub fn net_liquidity(fed: &[Option<f64>], tga: &[Option<f64>], rrp: &[Option<f64>]) -> Series {
    fed.iter()
        .zip(tga)
        .zip(rrp)
        .map(|((f, t), r)| match (f, t, r) {
            (Some(f), Some(t), Some(r)) => Some(f - t - r),
            _ => None,
        })
        .collect()
}

fn negate(series: Series) -> Series {
    series.into_iter().map(|v| v.map(|x| -x)).collect()
}

pub fn process(ctx: &ProcessContext<'_>) -> Result<DomainResult, EngineError> {
    let ds = ctx.dataset;
    let mut result = DomainResult::new(NAME);

    let tga = forward_fill(ds.require("tga")?);
    let rrp = forward_fill(ds.require("rrp")?);
    let fed = forward_fill(&ctx.upstream.series_or_null(&FED_ASSETS, ds.len())?);

    let net = net_liquidity(&fed, &tga, &rrp);

    // The change in net liquidity splits additively into the three legs.
    for (w, days) in ROC_WINDOWS {
        result.insert_series(format!("net_liquidity_change_{w}"), rolling_change(&net, days));
        result.insert_series(format!("fed_contribution_{w}"), rolling_change(&fed, days));
        result.insert_series(format!("tga_contribution_{w}"), negate(rolling_change(&tga, days)));
        result.insert_series(format!("rrp_contribution_{w}"), negate(rolling_change(&rrp, days)));
    }

    result.insert_scalar("latest", &latest(&net, ds.dates()))?;
    insert_rolling(&mut result, "net_liquidity", net);
    result.insert_series("tga", tga);
    result.insert_series("rrp", rrp);

    result.insert("fed_assets_ref", ctx.upstream.reference(&FED_ASSETS)?);
    result.insert("btc_price_ref", ctx.upstream.reference(&BTC_PRICE)?);
    result.insert("dates_ref", ctx.upstream.reference(&DATES)?);
    Ok(result)
}
