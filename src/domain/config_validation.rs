//! Run configuration: validation and typed loading.
//!
//! Every key is checked before a run starts; the first problem is reported as
//! `ConfigMissing` or `ConfigInvalid`.

use crate::domain::error::EngineError;
use crate::domain::pipeline::Pipeline;
use crate::domain::processors::{AggregationPolicy, DomainKind};
use crate::ports::config_port::ConfigPort;
use std::path::PathBuf;

pub const DEFAULT_OUTPUT_DIR: &str = "out";
pub const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_SQLITE_POOL_SIZE: i64 = 4;
const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, PartialEq)]
pub enum StoreKind {
    Json,
    Sqlite { path: PathBuf, pool_size: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub input: PathBuf,
    pub output_dir: PathBuf,
    pub store: StoreKind,
    pub write_merged: bool,
    pub aggregation: AggregationPolicy,
    pub disabled: Vec<DomainKind>,
    pub log_level: String,
    pub log_format: LogFormat,
}

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> EngineError {
    EngineError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

pub fn validate_run_config(config: &dyn ConfigPort) -> Result<(), EngineError> {
    load_run_config(config).map(|_| ())
}

/// Validate `config` and read it into a [`RunConfig`].
pub fn load_run_config(config: &dyn ConfigPort) -> Result<RunConfig, EngineError> {
    Ok(RunConfig {
        input: input_path(config)?,
        output_dir: config
            .get_string("output", "dir")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
        store: store_kind(config)?,
        write_merged: config.get_bool("output", "merged", true),
        aggregation: aggregation_policy(config)?,
        disabled: disabled_domains(config)?,
        log_level: log_level(config)?,
        log_format: log_format(config)?,
    })
}

fn input_path(config: &dyn ConfigPort) -> Result<PathBuf, EngineError> {
    config
        .get_string("input", "path")
        .map(PathBuf::from)
        .ok_or_else(|| EngineError::ConfigMissing {
            section: "input".to_string(),
            key: "path".to_string(),
        })
}

pub fn store_kind(config: &dyn ConfigPort) -> Result<StoreKind, EngineError> {
    let kind = config
        .get_string("output", "store")
        .unwrap_or_else(|| "json".to_string());
    match kind.trim().to_lowercase().as_str() {
        "json" => Ok(StoreKind::Json),
        "sqlite" => {
            if !cfg!(feature = "sqlite") {
                return Err(invalid("output", "store", "built without sqlite support"));
            }
            let path = config
                .get_string("output", "sqlite_path")
                .ok_or_else(|| EngineError::ConfigMissing {
                    section: "output".to_string(),
                    key: "sqlite_path".to_string(),
                })?;
            let pool_size = config.get_int("output", "sqlite_pool_size", DEFAULT_SQLITE_POOL_SIZE);
            if !(1..=64).contains(&pool_size) {
                return Err(invalid(
                    "output",
                    "sqlite_pool_size",
                    "sqlite_pool_size must be between 1 and 64",
                ));
            }
            Ok(StoreKind::Sqlite {
                path: PathBuf::from(path),
                pool_size: pool_size as u32,
            })
        }
        other => Err(invalid(
            "output",
            "store",
            format!("unknown store {other:?} (expected json or sqlite)"),
        )),
    }
}

pub fn aggregation_policy(config: &dyn ConfigPort) -> Result<AggregationPolicy, EngineError> {
    match config.get_string("aggregation", "policy") {
        Some(raw) => raw
            .parse::<AggregationPolicy>()
            .map_err(|reason| invalid("aggregation", "policy", reason)),
        None => Ok(AggregationPolicy::default()),
    }
}

/// Feature domains to drop. Each must be known, and no remaining domain may depend on it.
pub fn disabled_domains(config: &dyn ConfigPort) -> Result<Vec<DomainKind>, EngineError> {
    let Some(raw) = config.get_string("pipeline", "disabled") else {
        return Ok(Vec::new());
    };
    let mut disabled = Vec::new();
    for name in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let kind = name
            .parse::<DomainKind>()
            .map_err(|reason| invalid("pipeline", "disabled", reason))?;
        if !disabled.contains(&kind) {
            disabled.push(kind);
        }
    }
    Pipeline::standard()
        .without(&disabled)
        .map_err(|e| invalid("pipeline", "disabled", e.to_string()))?;
    Ok(disabled)
}

fn log_level(config: &dyn ConfigPort) -> Result<String, EngineError> {
    let level = config
        .get_string("logging", "level")
        .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string())
        .trim()
        .to_lowercase();
    if LOG_LEVELS.contains(&level.as_str()) {
        Ok(level)
    } else {
        Err(invalid(
            "logging",
            "level",
            format!("unknown level {level:?} (expected one of {})", LOG_LEVELS.join(", ")),
        ))
    }
}

pub fn log_format(config: &dyn ConfigPort) -> Result<LogFormat, EngineError> {
    match config.get_string("logging", "format") {
        None => Ok(LogFormat::default()),
        Some(raw) => match raw.trim().to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(invalid(
                "logging",
                "format",
                format!("unknown format {other:?} (expected pretty or json)"),
            )),
        },
    }
}
