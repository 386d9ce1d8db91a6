//! Domain processors.
//!
//! The domain set is closed: [`DomainKind`] enumerates every processor and
//! dispatches to its module. [`DomainKind::ALL`] lists them in dependency order.

pub mod common;
pub mod credit_liquidity;
pub mod crypto;
pub mod currencies;
pub mod fed_forecasts;
pub mod gli;
pub mod m2;
pub mod macro_regime;
pub mod offshore;
pub mod shared;
pub mod stablecoins;
pub mod treasury;
pub mod us_system;

use crate::domain::dataset::Dataset;
use crate::domain::error::EngineError;
use crate::domain::result::{DomainResult, SharedRef, UpstreamView};
use crate::domain::schema::DomainSchema;
use crate::ports::result_store_port::ResultStore;
use std::fmt;
use std::str::FromStr;

/// How aggregates treat a constituent with no data yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AggregationPolicy {
    /// Sum whatever constituents are present and tag the composition.
    #[default]
    ExcludeMissing,
    /// Null the aggregate until every constituent reports.
    RequireAll,
}

impl FromStr for AggregationPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "exclude_missing" => Ok(AggregationPolicy::ExcludeMissing),
            "require_all" => Ok(AggregationPolicy::RequireAll),
            other => Err(format!(
                "unknown aggregation policy {other:?} (expected exclude_missing or require_all)"
            )),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EngineSettings {
    pub aggregation: AggregationPolicy,
}

/// Everything a domain may read while processing.
pub struct ProcessContext<'a> {
    pub dataset: &'a Dataset,
    pub upstream: &'a UpstreamView<'a>,
    pub settings: &'a EngineSettings,
}

/// The unit of work run by the pipeline.
pub trait DomainProcessor {
    /// Persistence key and reference namespace.
    fn name(&self) -> &'static str;

    /// Upstream fields this domain may read.
    fn upstream(&self) -> &'static [SharedRef];

    fn schema(&self) -> DomainSchema;

    fn process(&self, ctx: &ProcessContext<'_>) -> Result<DomainResult, EngineError>;

    fn validate(&self, result: &DomainResult, dataset: &Dataset) -> Result<(), EngineError> {
        let errors = self.schema().validate(result, dataset.len());
        if errors.is_empty() {
            Ok(())
        } else {
            Err(EngineError::SchemaValidation {
                domain: self.name().to_string(),
                errors,
            })
        }
    }

    fn persist(
        &self,
        result: &DomainResult,
        dataset: &Dataset,
        store: &dyn ResultStore,
    ) -> Result<(), EngineError> {
        store.save(&self.schema(), dataset.dates(), result)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Core,
    Feature,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DomainKind {
    Shared,
    Gli,
    M2,
    UsSystem,
    CreditLiquidity,
    Treasury,
    Stablecoins,
    Currencies,
    Crypto,
    FedForecasts,
    MacroRegime,
    Offshore,
}

impl DomainKind {
    /// Every domain, shared-data producers first and composite consumers last.
    pub const ALL: [DomainKind; 12] = [
        DomainKind::Shared,
        DomainKind::Gli,
        DomainKind::M2,
        DomainKind::UsSystem,
        DomainKind::CreditLiquidity,
        DomainKind::Treasury,
        DomainKind::Stablecoins,
        DomainKind::Currencies,
        DomainKind::Crypto,
        DomainKind::FedForecasts,
        DomainKind::MacroRegime,
        DomainKind::Offshore,
    ];

    pub fn tier(self) -> Tier {
        match self {
            DomainKind::Shared | DomainKind::Gli | DomainKind::M2 | DomainKind::UsSystem => {
                Tier::Core
            }
            _ => Tier::Feature,
        }
    }

    /// Domains whose fields this one references.
    pub fn depends_on(self) -> Vec<&'static str> {
        let mut domains: Vec<&'static str> = Vec::new();
        for r in self.upstream() {
            let name = DomainKind::ALL
                .iter()
                .map(|k| k.name())
                .find(|n| *n == r.domain);
            match name {
                Some(name) if !domains.contains(&name) => domains.push(name),
                _ => {}
            }
        }
        domains
    }
}

impl fmt::Display for DomainKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DomainKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        DomainKind::ALL
            .into_iter()
            .find(|k| k.name() == wanted)
            .ok_or_else(|| format!("unknown domain {wanted:?}"))
    }
}

impl DomainProcessor for DomainKind {
    fn name(&self) -> &'static str {
        match self {
            DomainKind::Shared => shared::NAME,
            DomainKind::Gli => gli::NAME,
            DomainKind::M2 => m2::NAME,
            DomainKind::UsSystem => us_system::NAME,
            DomainKind::CreditLiquidity => credit_liquidity::NAME,
            DomainKind::Treasury => treasury::NAME,
            DomainKind::Stablecoins => stablecoins::NAME,
            DomainKind::Currencies => currencies::NAME,
            DomainKind::Crypto => crypto::NAME,
            DomainKind::FedForecasts => fed_forecasts::NAME,
            DomainKind::MacroRegime => macro_regime::NAME,
            DomainKind::Offshore => offshore::NAME,
        }
    }

    fn upstream(&self) -> &'static [SharedRef] {
        match self {
            DomainKind::Shared => shared::UPSTREAM,
            DomainKind::Gli => gli::UPSTREAM,
            DomainKind::M2 => m2::UPSTREAM,
            DomainKind::UsSystem => us_system::UPSTREAM,
            DomainKind::CreditLiquidity => credit_liquidity::UPSTREAM,
            DomainKind::Treasury => treasury::UPSTREAM,
            DomainKind::Stablecoins => stablecoins::UPSTREAM,
            DomainKind::Currencies => currencies::UPSTREAM,
            DomainKind::Crypto => crypto::UPSTREAM,
            DomainKind::FedForecasts => fed_forecasts::UPSTREAM,
            DomainKind::MacroRegime => macro_regime::UPSTREAM,
            DomainKind::Offshore => offshore::UPSTREAM,
        }
    }

    fn schema(&self) -> DomainSchema {
        match self {
            DomainKind::Shared => shared::schema(),
            DomainKind::Gli => gli::schema(),
            DomainKind::M2 => m2::schema(),
            DomainKind::UsSystem => us_system::schema(),
            DomainKind::CreditLiquidity => credit_liquidity::schema(),
            DomainKind::Treasury => treasury::schema(),
            DomainKind::Stablecoins => stablecoins::schema(),
            DomainKind::Currencies => currencies::schema(),
            DomainKind::Crypto => crypto::schema(),
            DomainKind::FedForecasts => fed_forecasts::schema(),
            DomainKind::MacroRegime => macro_regime::schema(),
            DomainKind::Offshore => offshore::schema(),
        }
    }

    fn process(&self, ctx: &ProcessContext<'_>) -> Result<DomainResult, EngineError> {
        match self {
            DomainKind::Shared => shared::process(ctx),
            DomainKind::Gli => gli::process(ctx),
            DomainKind::M2 => m2::process(ctx),
            DomainKind::UsSystem => us_system::process(ctx),
            DomainKind::CreditLiquidity => credit_liquidity::process(ctx),
            DomainKind::Treasury => treasury::process(ctx),
            DomainKind::Stablecoins => stablecoins::process(ctx),
            DomainKind::Currencies => currencies::process(ctx),
            DomainKind::Crypto => crypto::process(ctx),
            DomainKind::FedForecasts => fed_forecasts::process(ctx),
            DomainKind::MacroRegime => macro_regime::process(ctx),
            DomainKind::Offshore => offshore::process(ctx),
        }
    }
}
