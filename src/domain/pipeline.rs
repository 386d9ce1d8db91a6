//! Dependency-ordered orchestration of the domain processors.
//!
//! Domains run one at a time in registration order. Each sees only the results
//! of the domains before it, through an [`UpstreamView`] limited to the fields
//! it declares. A domain that fails is recorded as failed and the run goes on.

use crate::domain::dataset::Dataset;
use crate::domain::error::EngineError;
use crate::domain::processors::{DomainKind, DomainProcessor, EngineSettings, ProcessContext, Tier};
use crate::domain::result::{resolve, DomainOutcome, Field, ResultsMap, UpstreamView, REF_SUFFIX};
use crate::ports::result_store_port::ResultStore;
use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainStatus {
    Succeeded,
    /// Computed, but with one or more upstream fields substituted by null.
    Degraded,
    Failed,
    ValidationFailed,
    /// Removed from the pipeline by configuration.
    Skipped,
}

impl DomainStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DomainStatus::Succeeded => "succeeded",
            DomainStatus::Degraded => "degraded",
            DomainStatus::Failed => "failed",
            DomainStatus::ValidationFailed => "validation_failed",
            DomainStatus::Skipped => "skipped",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManifestEntry {
    pub domain: String,
    pub status: DomainStatus,
    pub persisted: bool,
    pub missing_upstream: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Outcome of every domain in one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunManifest {
    pub entries: Vec<ManifestEntry>,
}

impl RunManifest {
    pub fn entry(&self, domain: &str) -> Option<&ManifestEntry> {
        self.entries.iter().find(|e| e.domain == domain)
    }

    pub fn status(&self, domain: &str) -> Option<DomainStatus> {
        self.entry(domain).map(|e| e.status)
    }

    pub fn count(&self, status: DomainStatus) -> usize {
        self.entries.iter().filter(|e| e.status == status).count()
    }

    /// True when every registered domain computed and validated.
    pub fn all_computed(&self) -> bool {
        self.entries.iter().all(|e| {
            matches!(
                e.status,
                DomainStatus::Succeeded | DomainStatus::Degraded | DomainStatus::Skipped
            )
        })
    }
}

pub struct RunReport {
    pub results: ResultsMap,
    pub manifest: RunManifest,
}

impl RunReport {
    pub fn merged_document(&self) -> Value {
        merge_documents(&self.results)
    }
}

#[derive(Debug, Clone)]
pub struct Pipeline {
    domains: Vec<DomainKind>,
    skipped: Vec<DomainKind>,
}

impl Pipeline {
    /// A pipeline over `domains`, which must already be in dependency order.
    pub fn new(domains: Vec<DomainKind>) -> Result<Self, EngineError> {
        check_order(&domains)?;
        Ok(Self {
            domains,
            skipped: Vec::new(),
        })
    }

    /// Every domain, in the canonical order.
    pub fn standard() -> Self {
        Self {
            domains: DomainKind::ALL.to_vec(),
            skipped: Vec::new(),
        }
    }

    /// Drop `disabled` feature-tier domains. Core domains cannot be removed.
    pub fn without(&self, disabled: &[DomainKind]) -> Result<Self, EngineError> {
        if let Some(core) = disabled.iter().find(|k| k.tier() == Tier::Core) {
            return Err(EngineError::PipelineOrder {
                reason: format!("core domain {core} cannot be disabled"),
            });
        }
        let domains: Vec<DomainKind> = self
            .domains
            .iter()
            .copied()
            .filter(|k| !disabled.contains(k))
            .collect();
        check_order(&domains)?;
        let mut skipped = self.skipped.clone();
        skipped.extend(self.domains.iter().copied().filter(|k| disabled.contains(k)));
        Ok(Self { domains, skipped })
    }

    pub fn domains(&self) -> &[DomainKind] {
        &self.domains
    }

    pub fn run(
        &self,
        dataset: &Dataset,
        settings: &EngineSettings,
        store: &dyn ResultStore,
    ) -> Result<RunReport, EngineError> {
        tracing::info!(
            domains = self.domains.len(),
            dates = dataset.len(),
            policy = ?settings.aggregation,
            "pipeline starting"
        );

        let mut results = ResultsMap::new();
        let mut manifest = RunManifest::default();

        for kind in &self.domains {
            let entry = run_domain(*kind, dataset, settings, store, &mut results)?;
            manifest.entries.push(entry);
        }

        for kind in &self.skipped {
            tracing::info!(domain = kind.name(), "domain disabled");
            manifest.entries.push(ManifestEntry {
                domain: kind.name().to_string(),
                status: DomainStatus::Skipped,
                persisted: false,
                missing_upstream: Vec::new(),
                reason: Some("disabled by configuration".to_string()),
            });
        }

        tracing::info!(
            succeeded = manifest.count(DomainStatus::Succeeded),
            degraded = manifest.count(DomainStatus::Degraded),
            failed = manifest.count(DomainStatus::Failed) + manifest.count(DomainStatus::ValidationFailed),
            "pipeline finished"
        );
        Ok(RunReport { results, manifest })
    }
}

fn run_domain(
    kind: DomainKind,
    dataset: &Dataset,
    settings: &EngineSettings,
    store: &dyn ResultStore,
    results: &mut ResultsMap,
) -> Result<ManifestEntry, EngineError> {
    let name = kind.name();
    let span = tracing::info_span!("domain", domain = name);
    let _guard = span.enter();

    let (processed, missing_upstream) = {
        let view = UpstreamView::new(name, results, kind.upstream());
        let ctx = ProcessContext {
            dataset,
            upstream: &view,
            settings,
        };
        let processed = kind.process(&ctx);
        (processed, view.missing())
    };

    for reference in &missing_upstream {
        let err = EngineError::MissingUpstreamField {
            reference: reference.clone(),
        };
        tracing::debug!(error = %err, "substituted null");
    }

    let mut entry = ManifestEntry {
        domain: name.to_string(),
        status: DomainStatus::Failed,
        persisted: false,
        missing_upstream,
        reason: None,
    };

    let result = match processed {
        Ok(result) => result,
        Err(e) => {
            tracing::warn!(error = %e, "domain failed");
            entry.reason = Some(e.to_string());
            results.insert(name, DomainOutcome::Failed { reason: e.to_string() })?;
            return Ok(entry);
        }
    };

    if let Err(e) = kind.validate(&result, dataset) {
        tracing::warn!(error = %e, "domain failed validation, output discarded");
        entry.status = DomainStatus::ValidationFailed;
        entry.reason = Some(e.to_string());
        results.insert(name, DomainOutcome::Failed { reason: e.to_string() })?;
        return Ok(entry);
    }

    match kind.persist(&result, dataset, store) {
        Ok(()) => entry.persisted = true,
        Err(e) => {
            tracing::warn!(error = %e, "persistence failed");
            entry.reason = Some(e.to_string());
        }
    }

    entry.status = if entry.missing_upstream.is_empty() {
        DomainStatus::Succeeded
    } else {
        DomainStatus::Degraded
    };
    tracing::info!(status = ?entry.status, persisted = entry.persisted, "domain computed");
    results.insert(name, DomainOutcome::Computed(result))?;
    Ok(entry)
}

/// Every referenced domain must be registered, and registered earlier.
pub fn check_order(domains: &[DomainKind]) -> Result<(), EngineError> {
    for (i, kind) in domains.iter().enumerate() {
        if domains[..i].contains(kind) {
            return Err(EngineError::PipelineOrder {
                reason: format!("{kind} is registered twice"),
            });
        }
        for dep in kind.depends_on() {
            match domains.iter().position(|k| k.name() == dep) {
                Some(pos) if pos < i => {}
                Some(_) => {
                    return Err(EngineError::PipelineOrder {
                        reason: format!("{kind} references {dep}, which runs after it"),
                    });
                }
                None => {
                    return Err(EngineError::PipelineOrder {
                        reason: format!("{kind} references {dep}, which is not registered"),
                    });
                }
            }
        }
    }
    Ok(())
}

/// Flatten every computed result into one document keyed `"<domain>.<field>"`.
///
/// Reference fields are resolved and inlined under their name without the
/// `_ref` suffix. Failed domains contribute nothing.
pub fn merge_documents(results: &ResultsMap) -> Value {
    let mut merged = Map::new();
    for (domain, outcome) in results.iter() {
        let DomainOutcome::Computed(result) = outcome else {
            continue;
        };
        for (name, field) in result.fields() {
            match name.strip_suffix(REF_SUFFIX) {
                Some(base) => {
                    let value = match field {
                        Field::Reference(r) => resolve(r, results).map_or(Value::Null, Field::to_json),
                        _ => Value::Null,
                    };
                    merged.insert(format!("{domain}.{base}"), value);
                }
                None => {
                    merged.insert(format!("{domain}.{name}"), field.to_json());
                }
            }
        }
    }
    Value::Object(merged)
}
