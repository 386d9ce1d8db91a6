//! Shared reference data: master dates, BTC reference price, forward-filled FX
//! and central-bank balance sheets normalized to USD.

use crate::domain::dataset::Series;
use crate::domain::error::EngineError;
use crate::domain::processors::ProcessContext;
use crate::domain::processors::common::{convert_to_usd, Currency};
use crate::domain::result::{DomainResult, SharedRef};
use crate::domain::schema::{DomainSchema, FieldKind};
use crate::domain::timeseries::forward_fill;
use rayon::prelude::*;
use std::collections::BTreeMap;

pub const NAME: &str = "shared";
pub const UPSTREAM: &[SharedRef] = &[];

pub struct Bank {
    pub name: &'static str,
    pub column: &'static str,
    pub currency: Currency,
}

pub const BANKS: [Bank; 5] = [
    Bank { name: "fed", column: "fed_assets", currency: Currency::Usd },
    Bank { name: "ecb", column: "ecb_assets", currency: Currency::Eur },
    Bank { name: "boj", column: "boj_assets", currency: Currency::Jpy },
    Bank { name: "pboc", column: "pboc_assets", currency: Currency::Cny },
    Bank { name: "boe", column: "boe_assets", currency: Currency::Gbp },
];

/// Source column and output field for each FX pair.
pub const FX_PAIRS: [(&str, &str); 4] = [
    ("eurusd", "fx_eurusd"),
    ("gbpusd", "fx_gbpusd"),
    ("usdjpy", "fx_usdjpy"),
    ("usdcny", "fx_usdcny"),
];

pub fn bank_field(bank: &Bank) -> String {
    format!("{}_usd", bank.name)
}

pub fn schema() -> DomainSchema {
    let mut schema = DomainSchema::new(NAME)
        .field("dates", FieldKind::Labels)
        .field("btc_price", FieldKind::Series)
        .field("date_count", FieldKind::Number)
        .field("coverage", FieldKind::Object);
    for (_, field) in FX_PAIRS {
        schema = schema.field(field, FieldKind::Series);
    }
    for bank in &BANKS {
        schema = schema.field(bank_field(bank), FieldKind::Series);
    }
    schema
}

pub fn process(ctx: &ProcessContext<'_>) -> Result<DomainResult, EngineError> {
    let ds = ctx.dataset;
    let n = ds.len();
    let mut result = DomainResult::new(NAME);

    result.insert_labels("dates", ds.date_labels());
    result.insert_scalar("date_count", &n)?;

    // A missing reference price leaves the field out; validation rejects the result.
    if let Some(btc) = ds.column("btc_price") {
        result.insert_series("btc_price", forward_fill(btc));
    } else {
        tracing::warn!(domain = NAME, "btc_price column missing");
    }

    let mut fx: BTreeMap<&str, Series> = BTreeMap::new();
    for (column, field) in FX_PAIRS {
        let series = ds
            .column(column)
            .map(forward_fill)
            .unwrap_or_else(|| vec![None; n]);
        fx.insert(field, series);
    }

    // Per-bank conversion is independent; the collect is the join point.
    let converted: Vec<(String, Series)> = BANKS
        .par_iter()
        .map(|bank| {
            let local = ds.column(bank.column).map(|c| c.to_vec()).unwrap_or_else(|| vec![None; n]);
            let rate = bank
                .currency
                .fx_field()
                .and_then(|f| fx.get(f))
                .map(|s| s.as_slice());
            (bank_field(bank), convert_to_usd(&local, rate, bank.currency))
        })
        .collect();

    let mut coverage: BTreeMap<&str, usize> = BTreeMap::new();
    for name in ds.column_names() {
        let observed = ds.column(name).map_or(0, |c| c.iter().filter(|v| v.is_some()).count());
        coverage.insert(name, observed);
    }
    result.insert_scalar("coverage", &coverage)?;

    for (field, series) in fx {
        result.insert_series(field, series);
    }
    for (field, series) in converted {
        result.insert_series(field, series);
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::dataset::Dataset;
    use crate::domain::processors::{DomainKind, DomainProcessor, EngineSettings};
    use crate::domain::result::{ResultsMap, UpstreamView};
    use chrono::NaiveDate;

    fn dataset(cols: &[(&str, Series)]) -> Dataset {
        let dates = (0..3)
            .map(|i| NaiveDate::from_ymd_opt(2024, 1, 1 + i).unwrap())
            .collect();
        Dataset::new(dates, cols.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()).unwrap()
    }

    fn run(ds: &Dataset) -> DomainResult {
        let results = ResultsMap::new();
        let view = UpstreamView::new(NAME, &results, UPSTREAM);
        let settings = EngineSettings::default();
        process(&ProcessContext { dataset: ds, upstream: &view, settings: &settings }).unwrap()
    }

    #[test]
    fn converts_banks_to_usd() {
        let ds = dataset(&[
            ("btc_price", vec![Some(40_000.0), None, Some(42_000.0)]),
            ("ecb_assets", vec![Some(100.0), Some(100.0), None]),
            ("eurusd", vec![Some(1.5), None, Some(2.0)]),
            ("boj_assets", vec![None, Some(15_000.0), Some(15_000.0)]),
            ("usdjpy", vec![Some(150.0), Some(150.0), Some(150.0)]),
        ]);
        let r = run(&ds);

        assert_eq!(r.series("btc_price").unwrap(), &[Some(40_000.0), Some(40_000.0), Some(42_000.0)]);
        assert_eq!(r.series("ecb_usd").unwrap(), &[Some(150.0), Some(150.0), Some(200.0)]);
        assert_eq!(r.series("boj_usd").unwrap(), &[None, Some(100.0), Some(100.0)]);
        assert_eq!(r.series("fed_usd").unwrap(), &[None, None, None]);
        assert!(DomainKind::Shared.validate(&r, &ds).is_ok());
    }

    #[test]
    fn missing_btc_fails_validation() {
        let ds = dataset(&[("fed_assets", vec![Some(1.0); 3])]);
        let r = run(&ds);
        assert!(r.get("btc_price").is_none());
        assert!(DomainKind::Shared.validate(&r, &ds).is_err());
    }

    #[test]
    fn coverage_counts_observations() {
        let ds = dataset(&[("btc_price", vec![Some(1.0), None, Some(2.0)])]);
        let r = run(&ds);
        assert_eq!(r.get("coverage").unwrap().to_json(), serde_json::json!({"btc_price": 2}));
    }
}
