//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::{fmt, EnvFilter};

use crate::adapters::csv_adapter::CsvDatasetAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::json_store_adapter::JsonFileStore;
use crate::domain::config_validation::{load_run_config, LogFormat, RunConfig, StoreKind};
use crate::domain::dataset::Dataset;
use crate::domain::error::EngineError;
use crate::domain::pipeline::{DomainStatus, Pipeline, RunManifest, RunReport};
use crate::domain::processors::{DomainKind, DomainProcessor, EngineSettings};
use crate::ports::config_port::ConfigPort;
use crate::ports::dataset_port::DatasetPort;
use crate::ports::result_store_port::ResultStore;

pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Parser, Debug)]
#[command(name = "macropulse", about = "Macro-liquidity analytics engine")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run every enabled domain over a dataset and persist the results
    Run {
        #[arg(short, long)]
        config: PathBuf,
        /// Overrides [input] path
        #[arg(short, long)]
        input: Option<PathBuf>,
        /// Overrides [output] dir
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Skip the merged document
        #[arg(long)]
        no_merged: bool,
    },
    /// Validate a run configuration without running
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Print domain output schemas
    Schema {
        #[arg(short, long)]
        domain: Option<String>,
        /// Print CREATE TABLE statements instead of JSON schemas
        #[arg(long)]
        sql: bool,
    },
    /// Show date range and column coverage of a dataset
    Info {
        #[arg(short, long)]
        input: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Run {
            config,
            input,
            output,
            no_merged,
        } => run_pipeline(&config, input, output, no_merged),
        Command::Validate { config } => run_validate(&config),
        Command::Schema { domain, sql } => run_schema(domain.as_deref(), sql),
        Command::Info { input } => run_info(&input),
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| {
        let err = EngineError::ConfigParse {
            file: path.display().to_string(),
            reason: e.to_string(),
        };
        eprintln!("error: {err}");
        ExitCode::from(&err)
    })
}

/// Command-line values layered over a config file.
pub struct ConfigOverrides<'a> {
    base: &'a dyn ConfigPort,
    values: Vec<(&'static str, &'static str, String)>,
}

impl<'a> ConfigOverrides<'a> {
    pub fn new(base: &'a dyn ConfigPort) -> Self {
        Self {
            base,
            values: Vec::new(),
        }
    }

    pub fn set(mut self, section: &'static str, key: &'static str, value: impl Into<String>) -> Self {
        self.values.push((section, key, value.into()));
        self
    }

    fn lookup(&self, section: &str, key: &str) -> Option<&str> {
        self.values
            .iter()
            .rev()
            .find(|(s, k, _)| *s == section && *k == key)
            .map(|(_, _, v)| v.as_str())
    }
}

impl ConfigPort for ConfigOverrides<'_> {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        match self.lookup(section, key) {
            Some(v) => Some(v.to_string()),
            None => self.base.get_string(section, key),
        }
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        match self.lookup(section, key).map(|v| v.parse::<i64>()) {
            Some(Ok(v)) => v,
            _ => self.base.get_int(section, key, default),
        }
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        match self.lookup(section, key).map(|v| v.parse::<bool>()) {
            Some(Ok(v)) => v,
            _ => self.base.get_bool(section, key, default),
        }
    }
}

/// Install the global subscriber. `RUST_LOG` takes precedence over `level`.
pub fn init_logging(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // A subscriber may already be installed when running in-process.
    let _ = match format {
        LogFormat::Json => fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init(),
        LogFormat::Pretty => fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init(),
    };
}

pub fn open_store(config: &RunConfig) -> Result<Box<dyn ResultStore>, EngineError> {
    match &config.store {
        StoreKind::Json => Ok(Box::new(JsonFileStore::new(&config.output_dir)?)),
        #[cfg(feature = "sqlite")]
        StoreKind::Sqlite { path, pool_size } => {
            use crate::adapters::sqlite_adapter::SqliteStore;
            Ok(Box::new(SqliteStore::from_path(path, *pool_size)?))
        }
        #[cfg(not(feature = "sqlite"))]
        StoreKind::Sqlite { .. } => Err(EngineError::ConfigInvalid {
            section: "output".to_string(),
            key: "store".to_string(),
            reason: "built without sqlite support".to_string(),
        }),
    }
}

pub fn write_manifest(dir: &Path, manifest: &RunManifest) -> Result<PathBuf, EngineError> {
    fs::create_dir_all(dir)?;
    let path = dir.join(MANIFEST_FILE);
    let mut text = serde_json::to_string_pretty(manifest)?;
    text.push('\n');
    fs::write(&path, text)?;
    Ok(path)
}

/// Run the configured pipeline over `dataset` and persist its outputs.
pub fn execute(config: &RunConfig, dataset: &Dataset) -> Result<RunReport, EngineError> {
    let pipeline = Pipeline::standard().without(&config.disabled)?;
    let settings = EngineSettings {
        aggregation: config.aggregation,
    };
    let store = open_store(config)?;

    let report = pipeline.run(dataset, &settings, store.as_ref())?;

    if config.write_merged {
        if let Err(e) = store.save_merged(&report.merged_document()) {
            tracing::warn!(error = %e, "merged document not persisted");
        }
    }
    write_manifest(&config.output_dir, &report.manifest)?;
    Ok(report)
}

fn print_summary(manifest: &RunManifest) {
    for entry in &manifest.entries {
        let status = entry.status.as_str();
        match &entry.reason {
            Some(reason) if entry.status != DomainStatus::Succeeded => {
                eprintln!("  {:<16} {:<18} {}", entry.domain, status, reason)
            }
            _ => eprintln!("  {:<16} {}", entry.domain, status),
        }
    }
}

fn run_pipeline(
    config_path: &Path,
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    no_merged: bool,
) -> ExitCode {
    // Stage 1: Load config
    eprintln!("Loading config from {}", config_path.display());
    let file_config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let mut layered = ConfigOverrides::new(&file_config);
    if let Some(input) = input {
        layered = layered.set("input", "path", input.display().to_string());
    }
    if let Some(output) = output {
        layered = layered.set("output", "dir", output.display().to_string());
    }
    if no_merged {
        layered = layered.set("output", "merged", "false");
    }

    // Stage 2: Validate config
    let run_config = match load_run_config(&layered) {
        Ok(rc) => rc,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };
    init_logging(&run_config.log_level, run_config.log_format);

    // Stage 3: Load dataset
    let dataset = match CsvDatasetAdapter::new(run_config.input.clone()).load_dataset() {
        Ok(ds) => ds,
        Err(e) => {
            eprintln!("error: {}: {e}", run_config.input.display());
            return (&e).into();
        }
    };
    eprintln!(
        "Loaded {} dates x {} columns",
        dataset.len(),
        dataset.column_names().count()
    );

    // Stage 4: Run pipeline and persist
    let report = match execute(&run_config, &dataset) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    // Stage 5: Summary
    eprintln!("\nDomains:");
    print_summary(&report.manifest);
    eprintln!(
        "\nManifest written to {}",
        run_config.output_dir.join(MANIFEST_FILE).display()
    );
    ExitCode::SUCCESS
}

fn run_validate(config_path: &Path) -> ExitCode {
    eprintln!("Validating config: {}", config_path.display());
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };

    let run_config = match load_run_config(&config) {
        Ok(rc) => rc,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    let pipeline = match Pipeline::standard().without(&run_config.disabled) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    eprintln!("\nInput:       {}", run_config.input.display());
    eprintln!("Output:      {}", run_config.output_dir.display());
    match &run_config.store {
        StoreKind::Json => eprintln!("Store:       json"),
        StoreKind::Sqlite { path, pool_size } => {
            eprintln!("Store:       sqlite {} (pool {pool_size})", path.display())
        }
    }
    eprintln!("Aggregation: {:?}", run_config.aggregation);
    eprintln!("\nDomains:");
    for kind in pipeline.domains() {
        eprintln!("  {kind}");
    }
    for kind in &run_config.disabled {
        eprintln!("  {kind} (disabled)");
    }

    eprintln!("\nConfiguration is valid");
    ExitCode::SUCCESS
}

/// JSON schemas keyed by domain, or CREATE TABLE statements.
pub fn render_schemas(kinds: &[DomainKind], sql: bool) -> Result<String, EngineError> {
    if sql {
        let statements: Vec<String> = kinds.iter().map(|k| k.schema().create_table_sql()).collect();
        return Ok(statements.join("\n\n"));
    }
    let schemas: Map<String, Value> = kinds
        .iter()
        .map(|k| (k.name().to_string(), k.schema().to_json_schema()))
        .collect();
    Ok(serde_json::to_string_pretty(&Value::Object(schemas))?)
}

fn run_schema(domain: Option<&str>, sql: bool) -> ExitCode {
    let kinds: Vec<DomainKind> = match domain {
        Some(name) => match name.parse::<DomainKind>() {
            Ok(k) => vec![k],
            Err(e) => {
                eprintln!("error: {e}");
                return ExitCode::from(2);
            }
        },
        None => DomainKind::ALL.to_vec(),
    };

    match render_schemas(&kinds, sql) {
        Ok(text) => {
            println!("{text}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

/// Per-column count of dates with a value.
pub fn column_coverage(dataset: &Dataset) -> Vec<(String, usize)> {
    dataset
        .column_names()
        .map(|name| {
            let present = dataset
                .column(name)
                .map_or(0, |s| s.iter().filter(|v| v.is_some()).count());
            (name.to_string(), present)
        })
        .collect()
}

fn run_info(input: &Path) -> ExitCode {
    let dataset = match CsvDatasetAdapter::new(input.to_path_buf()).load_dataset() {
        Ok(ds) => ds,
        Err(e) => {
            eprintln!("error: {}: {e}", input.display());
            return (&e).into();
        }
    };

    match dataset.date_range() {
        Some((first, last, count)) => println!("dates: {first} .. {last} ({count})"),
        None => {
            println!("dates: none");
            return ExitCode::SUCCESS;
        }
    }
    let coverage = column_coverage(&dataset);
    println!("columns: {}", coverage.len());
    for (name, present) in coverage {
        println!("  {name:<20} {present}/{}", dataset.len());
    }
    ExitCode::SUCCESS
}
