//! Helpers shared by the domain processors.

use crate::domain::composite::{CompositeSeries, CompositeSignal, CompositeSpec};
use crate::domain::dataset::{Dataset, Series};
use crate::domain::error::EngineError;
use crate::domain::processors::AggregationPolicy;
use crate::domain::result::{DomainResult, SharedRef};
use crate::domain::schema::{DomainSchema, FieldKind};
use crate::domain::timeseries::{
    forward_fill, last_observation, rolling_percentile, rolling_roc, rolling_zscore,
    PERCENTILE_LOOKBACK, ROC_WINDOWS, ZSCORE_LOOKBACK,
};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

/// Every non-shared domain points back at the master dates.
pub const DATES: SharedRef = SharedRef::of("shared", "dates");
pub const BTC_PRICE: SharedRef = SharedRef::of("shared", "btc_price");
pub const FX_EURUSD: SharedRef = SharedRef::of("shared", "fx_eurusd");
pub const FX_GBPUSD: SharedRef = SharedRef::of("shared", "fx_gbpusd");
pub const FX_USDJPY: SharedRef = SharedRef::of("shared", "fx_usdjpy");
pub const FX_USDCNY: SharedRef = SharedRef::of("shared", "fx_usdcny");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Currency {
    Usd,
    Eur,
    Gbp,
    Jpy,
    Cny,
}

impl Currency {
    /// Shared-domain field holding the forward-filled FX rate for this currency.
    pub fn fx_field(self) -> Option<&'static str> {
        match self {
            Currency::Usd => None,
            Currency::Eur => Some("fx_eurusd"),
            Currency::Gbp => Some("fx_gbpusd"),
            Currency::Jpy => Some("fx_usdjpy"),
            Currency::Cny => Some("fx_usdcny"),
        }
    }

    pub fn fx_ref(self) -> Option<SharedRef> {
        self.fx_field().map(|field| SharedRef::of("shared", field))
    }

    /// Convert a local-currency amount to USD. EUR and GBP are quoted as USD
    /// per unit, JPY and CNY as units per USD.
    pub fn to_usd(self, value: f64, rate: Option<f64>) -> Option<f64> {
        match self {
            Currency::Usd => Some(value),
            Currency::Eur | Currency::Gbp => rate.map(|r| value * r),
            Currency::Jpy | Currency::Cny => rate.filter(|r| *r != 0.0).map(|r| value / r),
        }
    }
}

/// Forward-fill a local series and its FX rate independently, then convert.
pub fn convert_to_usd(local: &[Option<f64>], fx: Option<&[Option<f64>]>, currency: Currency) -> Series {
    let local = forward_fill(local);
    let fx = fx.map(forward_fill).unwrap_or_else(|| vec![None; local.len()]);
    local
        .iter()
        .zip(&fx)
        .map(|(v, r)| v.and_then(|v| currency.to_usd(v, *r)))
        .collect()
}

/// Dataset column, or an all-null series when the column is absent.
pub fn column_or_null(dataset: &Dataset, name: &str) -> Series {
    dataset
        .column(name)
        .map(|c| c.to_vec())
        .unwrap_or_else(|| vec![None; dataset.len()])
}

/// Insert `prefix` plus its ROC, z-score and percentile companions.
pub fn insert_rolling(result: &mut DomainResult, prefix: &str, series: Series) {
    insert_rolling_stats(result, prefix, &series);
    result.insert_series(prefix, series);
}

/// Insert only the derived companions of `series`, for series owned elsewhere.
pub fn insert_rolling_stats(result: &mut DomainResult, prefix: &str, series: &[Option<f64>]) {
    for (suffix, window) in ROC_WINDOWS {
        result.insert_series(format!("{prefix}_roc_{suffix}"), rolling_roc(series, window));
    }
    result.insert_series(format!("{prefix}_zscore"), rolling_zscore(series, ZSCORE_LOOKBACK));
    result.insert_series(
        format!("{prefix}_percentile"),
        rolling_percentile(series, PERCENTILE_LOOKBACK),
    );
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatestValue {
    pub value: Option<f64>,
    pub as_of: Option<String>,
    /// True when the last observation predates the last master date.
    pub stale: bool,
}

pub fn latest(series: &[Option<f64>], dates: &[NaiveDate]) -> LatestValue {
    match last_observation(series) {
        Some((i, value)) => LatestValue {
            value: Some(value),
            as_of: dates.get(i).map(|d| d.format("%Y-%m-%d").to_string()),
            stale: i + 1 < dates.len(),
        },
        None => LatestValue {
            value: None,
            as_of: None,
            stale: false,
        },
    }
}

pub fn date_label(dates: &[NaiveDate], index: Option<usize>) -> Option<String> {
    index
        .and_then(|i| dates.get(i))
        .map(|d| d.format("%Y-%m-%d").to_string())
}

pub struct Constituent<'a> {
    pub name: &'static str,
    pub series: &'a [Option<f64>],
}

#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    pub total: Series,
    pub count: Series,
    /// First date each constituent reports, `None` if it never does.
    pub first_seen: BTreeMap<&'static str, Option<String>>,
    pub note: String,
}

/// Sum constituents per date under `policy`.
pub fn aggregate(
    constituents: &[Constituent<'_>],
    dates: &[NaiveDate],
    policy: AggregationPolicy,
) -> Aggregate {
    let n = dates.len();
    let mut total = Vec::with_capacity(n);
    let mut count = Vec::with_capacity(n);

    for t in 0..n {
        let present: Vec<f64> = constituents
            .iter()
            .filter_map(|c| c.series.get(t).copied().flatten())
            .collect();
        let all_present = present.len() == constituents.len();
        let value = match policy {
            _ if present.is_empty() => None,
            AggregationPolicy::RequireAll if !all_present => None,
            _ => Some(present.iter().sum::<f64>()),
        };
        total.push(value);
        count.push(Some(present.len() as f64));
    }

    let first_seen: BTreeMap<&'static str, Option<String>> = constituents
        .iter()
        .map(|c| {
            let first = c.series.iter().position(|v| v.is_some());
            (c.name, date_label(dates, first))
        })
        .collect();

    let note = composition_note(constituents, &first_seen, &count, policy);

    Aggregate {
        total,
        count,
        first_seen,
        note,
    }
}

fn composition_note(
    constituents: &[Constituent<'_>],
    first_seen: &BTreeMap<&'static str, Option<String>>,
    count: &[Option<f64>],
    policy: AggregationPolicy,
) -> String {
    let expected = constituents.len() as f64;
    let constant = count.iter().all(|c| *c == Some(expected));
    if constant {
        return format!("constant composition: {} constituents", constituents.len());
    }

    let parts: Vec<String> = constituents
        .iter()
        .map(|c| match first_seen.get(c.name).cloned().flatten() {
            Some(date) => format!("{} from {}", c.name, date),
            None => format!("{} unavailable", c.name),
        })
        .collect();

    match policy {
        AggregationPolicy::ExcludeMissing => {
            format!("composition varies over time: {}", parts.join(", "))
        }
        AggregationPolicy::RequireAll => format!(
            "total is null until all {} constituents report: {}",
            constituents.len(),
            parts.join(", ")
        ),
    }
}

#[derive(Serialize)]
struct LatestSignal<'a> {
    as_of: Option<String>,
    #[serde(flatten)]
    signal: &'a CompositeSignal,
}

/// Composite output fields, each name prefixed with `prefix`.
pub fn composite_schema(schema: DomainSchema, prefix: &str) -> DomainSchema {
    schema
        .field(format!("{prefix}composite"), FieldKind::Series)
        .field(format!("{prefix}regime"), FieldKind::Labels)
        .field(format!("{prefix}signal"), FieldKind::Labels)
        .field(format!("{prefix}alert"), FieldKind::Labels)
        .field(format!("{prefix}latest"), FieldKind::Object)
        .field(format!("{prefix}weights"), FieldKind::Object)
}

pub fn insert_composite(
    result: &mut DomainResult,
    prefix: &str,
    spec: &CompositeSpec,
    scored: CompositeSeries,
    dates: &[NaiveDate],
) -> Result<(), EngineError> {
    let latest = LatestSignal {
        as_of: date_label(dates, scored.latest_index),
        signal: &scored.latest,
    };
    result.insert_scalar(format!("{prefix}latest"), &latest)?;

    let weights: BTreeMap<&str, f64> = spec.components.iter().map(|c| (c.name, c.weight)).collect();
    result.insert_scalar(format!("{prefix}weights"), &weights)?;

    result.insert_series(format!("{prefix}composite"), scored.composite);
    result.insert_labels(format!("{prefix}regime"), scored.regimes);
    result.insert_labels(format!("{prefix}signal"), scored.signals);
    result.insert_labels(format!("{prefix}alert"), scored.alerts);
    Ok(())
}

/// Fail with a computation error when a domain has nothing to work with.
pub fn require_any(domain: &str, series: &[&[Option<f64>]], what: &str) -> Result<(), EngineError> {
    if series.iter().any(|s| s.iter().any(|v| v.is_some())) {
        Ok(())
    } else {
        Err(EngineError::computation(domain, format!("no observations for {what}")))
    }
}
