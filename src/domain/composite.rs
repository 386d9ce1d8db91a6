//! Composite signal scoring.
//!
//! A signal is a fixed set of weighted components. Each component carries a raw
//! score on a symmetric scale (typically [-3, 3]). The composite is the weighted
//! sum rescaled to the published range (typically [-100, 100]) and is then
//! classified into a regime and a direction. Alert levels come from each
//! component's raw score, never from the composite.

use crate::domain::dataset::Series;
use crate::domain::error::EngineError;
use serde::Serialize;

/// Regime reported when no component is available.
pub const UNKNOWN_REGIME: &str = "unknown";
/// Number of drivers surfaced per signal.
pub const TOP_DRIVERS: usize = 3;
/// Allowed deviation of declared weights from 1.
pub const WEIGHT_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Normal,
    Caution,
    Warning,
    Critical,
}

impl AlertLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            AlertLevel::Normal => "normal",
            AlertLevel::Caution => "caution",
            AlertLevel::Warning => "warning",
            AlertLevel::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalDirection {
    Bullish,
    Bearish,
    Neutral,
}

/// Whether a rising composite is good (`Positive`) or a stress reading (`Inverted`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    Positive,
    Inverted,
}

/// Which side of a raw score counts as stress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StressSide {
    Low,
    High,
}

/// Monotonic severity thresholds on a component's raw score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlertBands {
    pub stress: StressSide,
    pub caution: f64,
    pub warning: f64,
    pub critical: f64,
}

impl AlertBands {
    /// Stress when the raw score falls to `-caution` and below.
    pub const fn low(caution: f64, warning: f64, critical: f64) -> Self {
        Self {
            stress: StressSide::Low,
            caution,
            warning,
            critical,
        }
    }

    /// Stress when the raw score rises to `caution` and above.
    pub const fn high(caution: f64, warning: f64, critical: f64) -> Self {
        Self {
            stress: StressSide::High,
            caution,
            warning,
            critical,
        }
    }

    pub fn level(&self, raw: f64) -> AlertLevel {
        let severity = match self.stress {
            StressSide::Low => -raw,
            StressSide::High => raw,
        };
        if severity >= self.critical {
            AlertLevel::Critical
        } else if severity >= self.warning {
            AlertLevel::Warning
        } else if severity >= self.caution {
            AlertLevel::Caution
        } else {
            AlertLevel::Normal
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComponentSpec {
    pub name: &'static str,
    pub weight: f64,
    pub bands: AlertBands,
}

/// Ordered upper bounds: the first step whose bound is `>=` the composite wins.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegimeLadder {
    pub steps: &'static [(f64, &'static str)],
    pub top: &'static str,
}

impl RegimeLadder {
    pub fn classify(&self, composite: f64) -> &'static str {
        self.steps
            .iter()
            .find(|(bound, _)| composite <= *bound)
            .map(|(_, label)| *label)
            .unwrap_or(self.top)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompositeSpec {
    pub signal: &'static str,
    pub components: &'static [ComponentSpec],
    /// Maximum absolute raw score; scores are clamped to it.
    pub score_scale: f64,
    /// Maximum absolute composite.
    pub output_scale: f64,
    /// Composites within `±dead_band` are neutral.
    pub dead_band: f64,
    /// Weight given to components the signal does not declare.
    pub residual_weight: f64,
    pub residual_bands: AlertBands,
    pub ladder: RegimeLadder,
    pub polarity: Polarity,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentReading {
    pub name: String,
    pub weight: f64,
    pub score: Option<f64>,
    /// Weighted contribution in composite units.
    pub contribution: Option<f64>,
    pub alert: Option<AlertLevel>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Driver {
    pub name: String,
    pub contribution: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompositeSignal {
    pub composite: Option<f64>,
    pub regime: &'static str,
    pub signal: Option<SignalDirection>,
    pub alert: AlertLevel,
    pub drivers: Vec<Driver>,
    pub components: Vec<ComponentReading>,
}

/// Per-date composite output plus the latest reading.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeSeries {
    pub composite: Series,
    pub regimes: Vec<Option<String>>,
    pub signals: Vec<Option<String>>,
    pub alerts: Vec<Option<String>>,
    pub latest: CompositeSignal,
    /// Date index of `latest`, the last date with a composite.
    pub latest_index: Option<usize>,
}

impl CompositeSpec {
    pub fn weight_sum(&self) -> f64 {
        self.components.iter().map(|c| c.weight).sum()
    }

    pub fn validate_weights(&self) -> Result<(), EngineError> {
        let sum = self.weight_sum();
        if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(EngineError::InvalidWeights {
                signal: self.signal.to_string(),
                sum,
            });
        }
        Ok(())
    }

    fn direction(&self, composite: f64) -> SignalDirection {
        let oriented = match self.polarity {
            Polarity::Positive => composite,
            Polarity::Inverted => -composite,
        };
        if oriented.abs() <= self.dead_band {
            SignalDirection::Neutral
        } else if oriented > 0.0 {
            SignalDirection::Bullish
        } else {
            SignalDirection::Bearish
        }
    }

    /// Score one observation. Inputs not named by the signal get the residual weight.
    pub fn score(&self, inputs: &[(&str, Option<f64>)]) -> CompositeSignal {
        let lookup = |name: &str| {
            inputs
                .iter()
                .find(|(n, _)| *n == name)
                .and_then(|(_, s)| *s)
                .filter(|s| s.is_finite())
        };

        let mut readings: Vec<(ComponentReading, AlertBands)> = self
            .components
            .iter()
            .map(|c| {
                let reading = ComponentReading {
                    name: c.name.to_string(),
                    weight: c.weight,
                    score: lookup(c.name),
                    contribution: None,
                    alert: None,
                };
                (reading, c.bands)
            })
            .collect();

        for (name, score) in inputs {
            if self.components.iter().any(|c| c.name == *name) {
                continue;
            }
            readings.push((
                ComponentReading {
                    name: name.to_string(),
                    weight: self.residual_weight,
                    score: score.filter(|s| s.is_finite()),
                    contribution: None,
                    alert: None,
                },
                self.residual_bands,
            ));
        }

        let rescale = self.output_scale / self.score_scale;
        let mut sum = 0.0;
        let mut available = 0usize;
        let mut alert = AlertLevel::Normal;

        for (reading, bands) in readings.iter_mut() {
            if let Some(raw) = reading.score {
                let clamped = raw.clamp(-self.score_scale, self.score_scale);
                let weighted = reading.weight * clamped;
                sum += weighted;
                available += 1;
                reading.contribution = Some(weighted * rescale);
                let level = bands.level(raw);
                reading.alert = Some(level);
                alert = alert.max(level);
            }
        }

        let components: Vec<ComponentReading> = readings.into_iter().map(|(r, _)| r).collect();

        if available == 0 {
            return CompositeSignal {
                composite: None,
                regime: UNKNOWN_REGIME,
                signal: None,
                alert,
                drivers: Vec::new(),
                components,
            };
        }

        let composite = (sum * rescale).clamp(-self.output_scale, self.output_scale);

        // Stable sort keeps declaration order on ties.
        let mut ranked: Vec<Driver> = components
            .iter()
            .filter_map(|c| {
                c.contribution.map(|contribution| Driver {
                    name: c.name.clone(),
                    contribution,
                })
            })
            .collect();
        ranked.sort_by(|a, b| b.contribution.abs().total_cmp(&a.contribution.abs()));
        ranked.truncate(TOP_DRIVERS);

        CompositeSignal {
            composite: Some(composite),
            regime: self.ladder.classify(composite),
            signal: Some(self.direction(composite)),
            alert,
            drivers: ranked,
            components,
        }
    }

    /// Score every date of aligned component series.
    pub fn score_series(&self, inputs: &[(&str, &[Option<f64>])], len: usize) -> CompositeSeries {
        let mut composite = Vec::with_capacity(len);
        let mut regimes = Vec::with_capacity(len);
        let mut signals = Vec::with_capacity(len);
        let mut alerts = Vec::with_capacity(len);
        let mut latest = None;

        for t in 0..len {
            let point: Vec<(&str, Option<f64>)> = inputs
                .iter()
                .map(|(name, series)| (*name, series.get(t).copied().flatten()))
                .collect();
            let signal = self.score(&point);

            composite.push(signal.composite);
            regimes.push(Some(signal.regime.to_string()));
            signals.push(signal.signal.map(|s| direction_label(s).to_string()));
            alerts.push(signal.composite.map(|_| signal.alert.as_str().to_string()));
            if signal.composite.is_some() {
                latest = Some((t, signal));
            }
        }

        let (latest_index, latest) = match latest {
            Some((t, signal)) => (Some(t), signal),
            None => {
                let empty: Vec<(&str, Option<f64>)> =
                    inputs.iter().map(|(name, _)| (*name, None)).collect();
                (None, self.score(&empty))
            }
        };

        CompositeSeries {
            composite,
            regimes,
            signals,
            alerts,
            latest,
            latest_index,
        }
    }
}

pub fn direction_label(direction: SignalDirection) -> &'static str {
    match direction {
        SignalDirection::Bullish => "bullish",
        SignalDirection::Bearish => "bearish",
        SignalDirection::Neutral => "neutral",
    }
}

/// Map a z-score onto a [-scale, scale] component score, flipping sign when
/// a high reading is bad for the signal.
pub fn zscore_component(z: Option<f64>, inverted: bool, scale: f64) -> Option<f64> {
    z.map(|v| {
        let v = if inverted { -v } else { v };
        v.clamp(-scale, scale)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const BANDS: AlertBands = AlertBands::low(1.0, 2.0, 2.5);

    const LADDER: RegimeLadder = RegimeLadder {
        steps: &[(-50.0, "contraction"), (-15.0, "slowdown"), (15.0, "neutral"), (50.0, "recovery")],
        top: "expansion",
    };

    const COMPONENTS: [ComponentSpec; 3] = [
        ComponentSpec { name: "liquidity", weight: 0.5, bands: BANDS },
        ComponentSpec { name: "credit", weight: 0.3, bands: BANDS },
        ComponentSpec { name: "brakes", weight: 0.2, bands: BANDS },
    ];

    const SPEC: CompositeSpec = CompositeSpec {
        signal: "test",
        components: &COMPONENTS,
        score_scale: 3.0,
        output_scale: 100.0,
        dead_band: 15.0,
        residual_weight: 0.05,
        residual_bands: BANDS,
        ladder: LADDER,
        polarity: Polarity::Positive,
    };

    #[test]
    fn weights_sum_to_one() {
        assert!(SPEC.validate_weights().is_ok());
        assert_relative_eq!(SPEC.weight_sum(), 1.0, epsilon = WEIGHT_TOLERANCE);
    }

    #[test]
    fn invalid_weights_are_rejected() {
        const HEAVY: [ComponentSpec; 1] = [ComponentSpec { name: "a", weight: 0.9, bands: BANDS }];
        let spec = CompositeSpec { components: &HEAVY, ..SPEC };
        let err = spec.validate_weights().unwrap_err();
        assert!(matches!(err, EngineError::InvalidWeights { .. }));
    }

    #[test]
    fn weighted_sum_is_rescaled() {
        let s = SPEC.score(&[("liquidity", Some(2.0)), ("credit", Some(-1.0)), ("brakes", Some(0.0))]);
        let expected = (0.5 * 2.0 + 0.3 * -1.0 + 0.2 * 0.0) * (100.0 / 3.0);
        assert_relative_eq!(s.composite.unwrap(), expected, epsilon = 1e-9);
        assert_relative_eq!(s.composite.unwrap(), 23.333_333, epsilon = 1e-5);
        assert_eq!(s.signal, Some(SignalDirection::Bullish));
        assert_eq!(s.regime, "recovery");
    }

    #[test]
    fn all_neutral_components_give_zero_and_neutral() {
        let s = SPEC.score(&[("liquidity", Some(0.0)), ("credit", Some(0.0)), ("brakes", Some(0.0))]);
        assert_eq!(s.composite, Some(0.0));
        assert_eq!(s.regime, "neutral");
        assert_eq!(s.signal, Some(SignalDirection::Neutral));
        assert_eq!(s.alert, AlertLevel::Normal);
    }

    #[test]
    fn all_missing_components_give_unknown() {
        let s = SPEC.score(&[("liquidity", None), ("credit", None)]);
        assert_eq!(s.composite, None);
        assert_eq!(s.regime, UNKNOWN_REGIME);
        assert_eq!(s.signal, None);
        assert!(s.drivers.is_empty());
    }

    #[test]
    fn dead_band_separates_neutral_from_directional() {
        // 0.5 * 0.6 * 100/3 = 10, inside the band
        let s = SPEC.score(&[("liquidity", Some(0.6))]);
        assert_eq!(s.signal, Some(SignalDirection::Neutral));

        let s = SPEC.score(&[("liquidity", Some(-1.2))]);
        assert_relative_eq!(s.composite.unwrap(), -20.0, epsilon = 1e-9);
        assert_eq!(s.signal, Some(SignalDirection::Bearish));
        assert_eq!(s.regime, "slowdown");
    }

    #[test]
    fn scores_are_clamped_to_scale() {
        let s = SPEC.score(&[("liquidity", Some(10.0)), ("credit", Some(10.0)), ("brakes", Some(10.0))]);
        assert_relative_eq!(s.composite.unwrap(), 100.0, epsilon = 1e-9);
        assert_eq!(s.regime, "expansion");
    }

    #[test]
    fn unlisted_components_get_residual_weight() {
        let s = SPEC.score(&[("liquidity", Some(0.0)), ("momentum", Some(3.0))]);
        let extra = s.components.iter().find(|c| c.name == "momentum").unwrap();
        assert_relative_eq!(extra.weight, 0.05);
        assert_relative_eq!(s.composite.unwrap(), 0.05 * 3.0 * 100.0 / 3.0, epsilon = 1e-9);
    }

    #[test]
    fn alert_is_most_severe_component() {
        let s = SPEC.score(&[("liquidity", Some(-1.2)), ("credit", Some(-2.6)), ("brakes", Some(3.0))]);
        let alerts: Vec<Option<AlertLevel>> = s.components.iter().map(|c| c.alert).collect();
        assert_eq!(
            alerts,
            vec![Some(AlertLevel::Caution), Some(AlertLevel::Critical), Some(AlertLevel::Normal)]
        );
        assert_eq!(s.alert, AlertLevel::Critical);
    }

    #[test]
    fn alert_uses_raw_score_not_contribution() {
        // brakes has the smallest weight but a critical raw score
        let s = SPEC.score(&[("brakes", Some(-2.5))]);
        assert_eq!(s.alert, AlertLevel::Critical);
    }

    #[test]
    fn drivers_rank_by_absolute_contribution() {
        let s = SPEC.score(&[("liquidity", Some(0.2)), ("credit", Some(-3.0)), ("brakes", Some(1.0))]);
        let names: Vec<&str> = s.drivers.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["credit", "brakes", "liquidity"]);
    }

    #[test]
    fn driver_ties_keep_declaration_order() {
        // 0.5 * 0.6 == 0.3 * 1.0
        let s = SPEC.score(&[("brakes", Some(0.0)), ("credit", Some(1.0)), ("liquidity", Some(0.6))]);
        let names: Vec<&str> = s.drivers.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["liquidity", "credit", "brakes"]);
    }

    #[test]
    fn inverted_polarity_flips_direction_only() {
        let spec = CompositeSpec { polarity: Polarity::Inverted, ..SPEC };
        let s = spec.score(&[("liquidity", Some(3.0))]);
        assert_eq!(s.signal, Some(SignalDirection::Bearish));
        assert_eq!(s.regime, "recovery");
    }

    #[test]
    fn alert_bands_high_side() {
        let bands = AlertBands::high(20.0, 40.0, 60.0);
        assert_eq!(bands.level(10.0), AlertLevel::Normal);
        assert_eq!(bands.level(20.0), AlertLevel::Caution);
        assert_eq!(bands.level(45.0), AlertLevel::Warning);
        assert_eq!(bands.level(90.0), AlertLevel::Critical);
        assert_eq!(bands.level(-90.0), AlertLevel::Normal);
    }

    #[test]
    fn score_series_tracks_latest_available() {
        let liquidity = [Some(1.0), Some(2.0), None];
        let s = SPEC.score_series(&[("liquidity", &liquidity)], 3);
        assert_eq!(s.composite.len(), 3);
        assert_eq!(s.composite[2], None);
        assert_eq!(s.regimes[2].as_deref(), Some(UNKNOWN_REGIME));
        assert_eq!(s.alerts[2], None);
        assert_eq!(s.latest_index, Some(1));
        assert_relative_eq!(s.latest.composite.unwrap(), 0.5 * 2.0 * 100.0 / 3.0, epsilon = 1e-9);
        assert_eq!(s.signals[1].as_deref(), Some("bullish"));
    }

    #[test]
    fn score_series_with_no_data() {
        let empty: [Option<f64>; 2] = [None, None];
        let s = SPEC.score_series(&[("liquidity", &empty)], 2);
        assert_eq!(s.latest_index, None);
        assert_eq!(s.latest.regime, UNKNOWN_REGIME);
    }

    #[test]
    fn zscore_component_inverts_and_clamps() {
        assert_eq!(zscore_component(Some(4.0), true, 3.0), Some(-3.0));
        assert_eq!(zscore_component(Some(-1.0), false, 3.0), Some(-1.0));
        assert_eq!(zscore_component(None, true, 3.0), None);
    }
}
