//! Treasury curve and refinancing pressure.
//!
//! The refinancing signal is a stress gauge: a high composite means funding
//! markets are struggling to absorb supply, so its direction is inverted.

use crate::domain::composite::{
    zscore_component, AlertBands, ComponentSpec, CompositeSpec, Polarity, RegimeLadder,
};
use crate::domain::dataset::{Dataset, Series};
use crate::domain::error::EngineError;
use crate::domain::processors::ProcessContext;
use crate::domain::processors::common::{composite_schema, insert_composite, latest, DATES};
use crate::domain::result::{DomainResult, SharedRef};
use crate::domain::schema::{DomainSchema, FieldKind};
use crate::domain::timeseries::{forward_fill, rolling_change, rolling_zscore, ZSCORE_LOOKBACK};

pub const NAME: &str = "treasury";

pub const TGA: SharedRef = SharedRef::of("us_system", "tga");
pub const RRP: SharedRef = SharedRef::of("us_system", "rrp");
pub const UPSTREAM: &[SharedRef] = &[DATES, TGA, RRP];

const SCORE_SCALE: f64 = 3.0;
const BANDS: AlertBands = AlertBands::high(1.0, 2.0, 2.5);
/// Trading days over which a TGA rebuild is measured.
const TGA_REBUILD_WINDOW: usize = 21;
/// Below this 2s10s spread (percentage points) the curve is flat.
const FLAT_CURVE: f64 = 0.5;

pub const REFINANCING_SIGNAL: CompositeSpec = CompositeSpec {
    signal: "refinancing",
    components: &[
        ComponentSpec { name: "funding_spread", weight: 0.35, bands: BANDS },
        ComponentSpec { name: "bill_spread", weight: 0.20, bands: BANDS },
        ComponentSpec { name: "tga_rebuild", weight: 0.25, bands: BANDS },
        ComponentSpec { name: "rrp_buffer", weight: 0.20, bands: BANDS },
    ],
    score_scale: SCORE_SCALE,
    output_scale: 100.0,
    dead_band: 15.0,
    residual_weight: 0.05,
    residual_bands: BANDS,
    ladder: RegimeLadder {
        steps: &[
            (-20.0, "liquidity_surplus"),
            (20.0, "healthy_absorption"),
            (40.0, "mild_pressure"),
            (60.0, "supply_stress"),
        ],
        top: "funding_crisis",
    },
    polarity: Polarity::Inverted,
};

pub fn schema() -> DomainSchema {
    let mut schema = DomainSchema::new(NAME)
        .field("curve_2s10s", FieldKind::Series)
        .field("curve_2s10s_zscore", FieldKind::Series)
        .field("curve_3m10y", FieldKind::Series)
        .field("curve_3m10y_zscore", FieldKind::Series)
        .field("curve_state", FieldKind::Labels)
        .field("funding_spread", FieldKind::Series)
        .field("bill_spread", FieldKind::Series)
        .field("latest", FieldKind::Object);
    for component in REFINANCING_SIGNAL.components {
        schema = schema.field(format!("{}_score", component.name), FieldKind::Series);
    }
    schema = schema
        .reference("tga_ref")
        .reference("rrp_ref")
        .reference("dates_ref");
    composite_schema(schema, "refinancing_")
}

fn spread(a: &[Option<f64>], b: &[Option<f64>]) -> Series {
    a.iter()
        .zip(b)
        .map(|(x, y)| match (x, y) {
            (Some(x), Some(y)) => Some(x - y),
            _ => None,
        })
        .collect()
}

fn filled(ds: &Dataset, column: &str) -> Series {
    ds.column(column)
        .map(forward_fill)
        .unwrap_or_else(|| vec![None; ds.len()])
}

pub fn curve_state(spread: Option<f64>) -> Option<&'static str> {
    spread.map(|s| {
        if s < 0.0 {
            "inverted"
        } else if s < FLAT_CURVE {
            "flat"
        } else {
            "normal"
        }
    })
}

fn scores(z: &[Option<f64>], inverted: bool) -> Series {
    z.iter().map(|v| zscore_component(*v, inverted, SCORE_SCALE)).collect()
}

pub fn process(ctx: &ProcessContext<'_>) -> Result<DomainResult, EngineError> {
    let ds = ctx.dataset;
    let n = ds.len();
    let mut result = DomainResult::new(NAME);

    let dgs10 = forward_fill(ds.require("dgs10")?);
    let dgs2 = forward_fill(ds.require("dgs2")?);
    let curve_2s10s = spread(&dgs10, &dgs2);
    let curve_3m10y = spread(&dgs10, &filled(ds, "dgs3mo"));

    result.insert_labels(
        "curve_state",
        curve_2s10s.iter().map(|s| curve_state(*s).map(String::from)).collect(),
    );
    result.insert_scalar("latest", &latest(&curve_2s10s, ds.dates()))?;

    let funding_spread = spread(&filled(ds, "sofr"), &filled(ds, "iorb"));
    let bill_spread = spread(&filled(ds, "tbill_3m"), &filled(ds, "fed_funds"));
    let tga = ctx.upstream.series_or_null(&TGA, n)?;
    let rrp = ctx.upstream.series_or_null(&RRP, n)?;

    // Positive scores mean stress; a shrinking RRP buffer is stress.
    let components: [(&str, Series); 4] = [
        ("funding_spread", scores(&rolling_zscore(&funding_spread, ZSCORE_LOOKBACK), false)),
        ("bill_spread", scores(&rolling_zscore(&bill_spread, ZSCORE_LOOKBACK), false)),
        (
            "tga_rebuild",
            scores(&rolling_zscore(&rolling_change(&tga, TGA_REBUILD_WINDOW), ZSCORE_LOOKBACK), false),
        ),
        ("rrp_buffer", scores(&rolling_zscore(&rrp, ZSCORE_LOOKBACK), true)),
    ];

    let inputs: Vec<(&str, &[Option<f64>])> =
        components.iter().map(|(name, s)| (*name, s.as_slice())).collect();
    let scored = REFINANCING_SIGNAL.score_series(&inputs, n);
    tracing::debug!(
        domain = NAME,
        regime = scored.latest.regime,
        "refinancing signal scored"
    );
    insert_composite(&mut result, "refinancing_", &REFINANCING_SIGNAL, scored, ds.dates())?;

    for (name, series) in components {
        result.insert_series(format!("{name}_score"), series);
    }
    result.insert_series("curve_2s10s_zscore", rolling_zscore(&curve_2s10s, ZSCORE_LOOKBACK));
    result.insert_series("curve_3m10y_zscore", rolling_zscore(&curve_3m10y, ZSCORE_LOOKBACK));
    result.insert_series("curve_2s10s", curve_2s10s);
    result.insert_series("curve_3m10y", curve_3m10y);
    result.insert_series("funding_spread", funding_spread);
    result.insert_series("bill_spread", bill_spread);

    result.insert("tga_ref", ctx.upstream.reference(&TGA)?);
    result.insert("rrp_ref", ctx.upstream.reference(&RRP)?);
    result.insert("dates_ref", ctx.upstream.reference(&DATES)?);
    Ok(result)
}
