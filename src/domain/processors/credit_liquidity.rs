//! Credit liquidity index: credit spreads, volatility and financial conditions
//! scored against their own history, plus global liquidity momentum.

use crate::domain::composite::{
    zscore_component, AlertBands, ComponentSpec, CompositeSpec, Polarity, RegimeLadder,
};
use crate::domain::dataset::Series;
use crate::domain::error::EngineError;
use crate::domain::processors::ProcessContext;
use crate::domain::processors::common::{composite_schema, insert_composite, require_any, DATES};
use crate::domain::result::{DomainResult, SharedRef};
use crate::domain::schema::{DomainSchema, FieldKind};
use crate::domain::timeseries::{forward_fill, rolling_zscore, ZSCORE_LOOKBACK};

pub const NAME: &str = "cli";

pub const GLI_MOMENTUM: SharedRef = SharedRef::of("gli", "total_roc_3m");
pub const UPSTREAM: &[SharedRef] = &[DATES, GLI_MOMENTUM];

const SCORE_SCALE: f64 = 3.0;
const BANDS: AlertBands = AlertBands::low(1.0, 2.0, 2.5);

/// Market inputs, all inverted: wider spreads and higher volatility tighten liquidity.
const MARKET_INPUTS: [&str; 4] = ["hy_oas", "ig_oas", "vix", "nfci"];

pub const SIGNAL: CompositeSpec = CompositeSpec {
    signal: "credit_liquidity",
    components: &[
        ComponentSpec { name: "hy_oas", weight: 0.30, bands: BANDS },
        ComponentSpec { name: "ig_oas", weight: 0.20, bands: BANDS },
        ComponentSpec { name: "vix", weight: 0.20, bands: BANDS },
        ComponentSpec { name: "nfci", weight: 0.15, bands: BANDS },
        ComponentSpec { name: "gli_momentum", weight: 0.15, bands: BANDS },
    ],
    score_scale: SCORE_SCALE,
    output_scale: 100.0,
    dead_band: 15.0,
    residual_weight: 0.05,
    residual_bands: BANDS,
    ladder: RegimeLadder {
        steps: &[(-50.0, "tight"), (-15.0, "tightening"), (15.0, "neutral"), (50.0, "easing")],
        top: "loose",
    },
    polarity: Polarity::Positive,
};

pub fn schema() -> DomainSchema {
    let mut schema = DomainSchema::new(NAME);
    for input in MARKET_INPUTS {
        schema = schema.field(format!("{input}_zscore"), FieldKind::Series);
    }
    schema = schema
        .field("gli_momentum_zscore", FieldKind::Series)
        .field("unavailable_components", FieldKind::Text)
        .reference("gli_momentum_ref")
        .reference("dates_ref");
    composite_schema(schema, "")
}

pub fn process(ctx: &ProcessContext<'_>) -> Result<DomainResult, EngineError> {
    let ds = ctx.dataset;
    let n = ds.len();
    let mut result = DomainResult::new(NAME);

    let mut zscores: Vec<(&'static str, Series)> = MARKET_INPUTS
        .iter()
        .map(|input| {
            let z = ds
                .column(input)
                .map(|c| rolling_zscore(&forward_fill(c), ZSCORE_LOOKBACK))
                .unwrap_or_else(|| vec![None; n]);
            (*input, z)
        })
        .collect();

    let raw: Vec<&[Option<f64>]> = MARKET_INPUTS.iter().filter_map(|c| ds.column(c)).collect();
    require_any(NAME, &raw, "credit and volatility inputs")?;

    let momentum = ctx.upstream.series_or_null(&GLI_MOMENTUM, n)?;
    zscores.push(("gli_momentum", rolling_zscore(&momentum, ZSCORE_LOOKBACK)));

    let scores: Vec<(&'static str, Series)> = zscores
        .iter()
        .map(|(name, z)| {
            let inverted = *name != "gli_momentum";
            let s = z.iter().map(|v| zscore_component(*v, inverted, SCORE_SCALE)).collect();
            (*name, s)
        })
        .collect();

    let unavailable: Vec<&str> = scores
        .iter()
        .filter(|(_, s)| s.iter().all(|v| v.is_none()))
        .map(|(name, _)| *name)
        .collect();
    if !unavailable.is_empty() {
        tracing::warn!(domain = NAME, components = ?unavailable, "components without history");
    }
    result.insert_scalar("unavailable_components", &unavailable.join(","))?;

    let inputs: Vec<(&str, &[Option<f64>])> =
        scores.iter().map(|(name, s)| (*name, s.as_slice())).collect();
    let scored = SIGNAL.score_series(&inputs, n);
    insert_composite(&mut result, "", &SIGNAL, scored, ds.dates())?;

    for (name, z) in zscores {
        result.insert_series(format!("{name}_zscore"), z);
    }
    result.insert("gli_momentum_ref", ctx.upstream.reference(&GLI_MOMENTUM)?);
    result.insert("dates_ref", ctx.upstream.reference(&DATES)?);
    Ok(result)
}
