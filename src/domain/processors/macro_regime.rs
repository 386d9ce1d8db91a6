//! Macro regime: liquidity, credit and policy brakes blended into one composite.

use crate::domain::composite::{
    zscore_component, AlertBands, ComponentSpec, CompositeSpec, Polarity, RegimeLadder,
};
use crate::domain::dataset::Series;
use crate::domain::error::EngineError;
use crate::domain::processors::ProcessContext;
use crate::domain::processors::common::{composite_schema, insert_composite, DATES};
use crate::domain::result::{DomainResult, SharedRef};
use crate::domain::schema::{DomainSchema, FieldKind};

pub const NAME: &str = "macro_regime";

pub const NET_LIQUIDITY_Z: SharedRef = SharedRef::of("us_system", "net_liquidity_zscore");
pub const HY_OAS_Z: SharedRef = SharedRef::of("cli", "hy_oas_zscore");
pub const REAL_RATE_Z: SharedRef = SharedRef::of("fed_forecasts", "real_rate_zscore");
pub const UPSTREAM: &[SharedRef] = &[DATES, NET_LIQUIDITY_Z, HY_OAS_Z, REAL_RATE_Z];

const SCORE_SCALE: f64 = 3.0;
const BANDS: AlertBands = AlertBands::low(1.0, 2.0, 2.5);

pub const SIGNAL: CompositeSpec = CompositeSpec {
    signal: "macro_regime",
    components: &[
        ComponentSpec { name: "liquidity", weight: 0.40, bands: BANDS },
        ComponentSpec { name: "credit", weight: 0.35, bands: BANDS },
        ComponentSpec { name: "brakes", weight: 0.25, bands: BANDS },
    ],
    score_scale: SCORE_SCALE,
    output_scale: 100.0,
    dead_band: 15.0,
    residual_weight: 0.05,
    residual_bands: BANDS,
    ladder: RegimeLadder {
        steps: &[
            (-50.0, "contraction"),
            (-15.0, "slowdown"),
            (15.0, "neutral"),
            (50.0, "recovery"),
        ],
        top: "expansion",
    },
    polarity: Polarity::Positive,
};

/// Component name, source z-score, and whether a high reading is restrictive.
const COMPONENTS: [(&str, SharedRef, bool); 3] = [
    ("liquidity", NET_LIQUIDITY_Z, false),
    ("credit", HY_OAS_Z, true),
    ("brakes", REAL_RATE_Z, true),
];

pub fn schema() -> DomainSchema {
    let schema = DomainSchema::new(NAME)
        .field("liquidity_score", FieldKind::Series)
        .field("credit_score", FieldKind::Series)
        .field("brakes_score", FieldKind::Series)
        .reference("net_liquidity_zscore_ref")
        .reference("hy_oas_zscore_ref")
        .reference("real_rate_zscore_ref")
        .reference("dates_ref");
    composite_schema(schema, "")
}

pub fn process(ctx: &ProcessContext<'_>) -> Result<DomainResult, EngineError> {
    let n = ctx.dataset.len();
    let mut result = DomainResult::new(NAME);

    let mut scores: Vec<(&'static str, Series)> = Vec::with_capacity(COMPONENTS.len());
    for (name, reference, inverted) in COMPONENTS {
        let z = ctx.upstream.series_or_null(&reference, n)?;
        let score = z.iter().map(|v| zscore_component(*v, inverted, SCORE_SCALE)).collect();
        scores.push((name, score));
        result.insert(format!("{}_ref", reference.field), ctx.upstream.reference(&reference)?);
    }

    let inputs: Vec<(&str, &[Option<f64>])> =
        scores.iter().map(|(name, s)| (*name, s.as_slice())).collect();
    let scored = SIGNAL.score_series(&inputs, n);
    tracing::debug!(
        domain = NAME,
        regime = scored.latest.regime,
        composite = ?scored.latest.composite,
        "macro regime scored"
    );
    insert_composite(&mut result, "", &SIGNAL, scored, ctx.dataset.dates())?;

    for (name, score) in scores {
        result.insert_series(format!("{name}_score"), score);
    }
    result.insert("dates_ref", ctx.upstream.reference(&DATES)?);
    Ok(result)
}
